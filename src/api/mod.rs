//! HTTP surface of the reconciliation service.
//!
//! Handlers are thin: each one parses the request, hands blocking work to
//! [`ApiContext::run_blocking`], and maps [`ApiError`](error::ApiError)
//! to a JSON error body.

pub mod endpoints;
pub mod error;
pub mod router;
pub mod types;

pub use router::api_router;
pub use types::ApiContext;
