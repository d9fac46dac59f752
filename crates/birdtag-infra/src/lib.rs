//! Birdtag Infrastructure Library
//!
//! Shared plumbing for the HTTP service: request-id middleware, tracing
//! initialisation and the wire format of error responses.

pub mod error;
pub mod middleware;
pub mod telemetry;

// Re-export commonly used types
pub use error::ErrorResponse;
pub use middleware::{get_request_id, request_id_middleware, RequestId, REQUEST_ID_HEADER};
pub use telemetry::{init_telemetry, LogFormat};
