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

//! Loads a [`qbfleet_core::ProxyConfig`] from the environment, with an
//! optional JSON file for lower-precedence defaults.

mod defaults;
mod error;
mod loader;

pub use error::ConfigError;
pub use loader::load;
