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
    clippy::cargo,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::multiple_crate_versions)]

//! Postgres-backed `InstanceStore` implementation for the fleet proxy.

pub mod error;
pub mod instance_store;

pub use error::{DataError, Result as DataResult};
pub use instance_store::PgInstanceStore;
