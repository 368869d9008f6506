//! HTTP gateway in front of a MarianMT translation model.
//!
//! `POST /translate` accepts either a direct `{ "source": ... }` payload or an
//! OpenAI-style `{ "messages": [...] }` payload and answers with a minimal
//! chat-completion envelope, so chat clients can use the model as if it were
//! a chat endpoint.

pub mod api;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod translate;
pub mod utils;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use crate::config::Settings;
pub use error::AppError;
pub use state::AppState;

/// Router with all routes and layers, ready to serve
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .merge(routes::create_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
