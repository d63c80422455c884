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

//! Binary entrypoint that wires the fleet proxy services together and
//! launches the HTTP server.

use anyhow::Result;

/// Bootstraps the fleet proxy application and blocks until shutdown.
#[tokio::main]
async fn main() -> Result<()> {
    Ok(qbfleet_app::run_app().await?)
}
