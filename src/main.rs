//! nanogrip — personal AI assistant gateway
//!
//! All CLI logic lives in the `cli` module. This file is just the entry
//! point; a non-zero exit code signals configuration or startup failure.

use nanogrip::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::run().await
}
