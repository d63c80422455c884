//! The HTTP surface: a thin Axum layer translating wire requests into
//! `qbfleet-core` calls and rendering RFC 9457 problem details on failure.

pub mod error;
pub(crate) mod http;
pub(crate) mod state;

pub use error::{ApiServerError, ApiServerResult};
pub use http::router::ApiServer;
