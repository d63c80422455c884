#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Fleet proxy application bootstrap wiring.
//!
//! Layout: `bootstrap.rs` assembles configuration, the Postgres-backed
//! instance store, the core composition root, and the HTTP server, then
//! blocks serving requests until the process is asked to stop.

/// Application bootstrap and environment loading.
pub mod bootstrap;
/// Top-level bootstrap error type.
pub mod error;

pub use bootstrap::run_app;
