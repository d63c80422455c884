//! Top-level error type for constructing and running the HTTP server.

use std::net::SocketAddr;

use thiserror::Error;

/// Failure constructing or serving the API.
#[derive(Debug, Error)]
pub enum ApiServerError {
    /// The configured listen address could not be bound.
    #[error("failed to bind {addr}")]
    Bind {
        /// Address that could not be bound.
        addr: SocketAddr,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The `axum::serve` loop returned an error.
    #[error("server loop failed")]
    Serve {
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
}

/// Convenience alias for server construction/run results.
pub type ApiServerResult<T> = Result<T, ApiServerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn bind_error_reports_address_and_source() {
        let addr: SocketAddr = "127.0.0.1:8080".parse().expect("valid addr");
        let err = ApiServerError::Bind {
            addr,
            source: io::Error::from(io::ErrorKind::AddrInUse),
        };
        assert_eq!(err.to_string(), "failed to bind 127.0.0.1:8080");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn serve_error_reports_source() {
        let err = ApiServerError::Serve {
            source: io::Error::from(io::ErrorKind::BrokenPipe),
        };
        assert_eq!(err.to_string(), "server loop failed");
        assert!(std::error::Error::source(&err).is_some());
    }
}
