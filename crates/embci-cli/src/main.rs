//! `embci` - embedded CI orchestrator
//!
//! ```text
//! embci <command> [flags...]
//! ```
//!
//! Commands come from `plugins.yaml`; `embci help` lists them.

use anyhow::{Context, Result};
use embci_cli::dispatch::{dispatch, load_registry};
use embci_core::config::AppPaths;
use embci_core::telemetry::{init_tracing, json_requested};
use embci_core::AppContext;
use embci_gate::builtin_extensions;
use tracing::Level;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing(json_requested(), Level::INFO);

    let paths = AppPaths::from_env().context("Failed to resolve the application root")?;
    let registry = load_registry(&paths)?;
    let extensions = builtin_extensions(paths.app_root.clone()).into_shared();
    let ctx = AppContext::new(paths, extensions);

    let argv: Vec<String> = std::env::args().skip(1).collect();
    dispatch(&registry, &ctx, &argv).await?;
    Ok(())
}
