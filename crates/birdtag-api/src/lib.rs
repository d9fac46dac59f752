//! Birdtag API Library
//!
//! HTTP handlers, error rendering and application setup. The binary in
//! `main.rs` only loads configuration and starts the server.

mod api_doc;
pub mod constants;
mod handlers;
pub mod identity;
pub mod setup;

pub mod error;
pub mod state;

pub use api_doc::get_openapi_spec;
pub use error::{ErrorResponse, HttpAppError, ValidatedJson};
pub use identity::CallerIdentity;
pub use state::AppState;
