pub mod interface;
pub mod marian;
pub mod service;

pub use interface::{ModelInfo, TranslateError, Translator};
pub use marian::MarianTranslator;
pub use service::{ModelStatus, TranslationService};
