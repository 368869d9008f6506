pub mod input_types;
pub mod output_types;

pub use input_types::*;
pub use output_types::*;
