//! Two-phase dispatch.
//!
//! The first pass looks only at the command name. Everything after it is
//! parsed by the command's own flag declarations, so commands never see each
//! other's flags.

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use embci_core::command::parse_remaining;
use embci_core::config::{AppPaths, PLUGINS_CONF};
use embci_core::{AppContext, PluginRegistry};
use tracing::{debug, info, warn};

use crate::commands;

/// Plugin list compiled into the binary; `conf/plugins.yaml` replaces it.
pub const DEFAULT_PLUGINS: &str = include_str!("../../../conf/plugins.yaml");

/// Reserved command name that always prints usage.
pub const HELP_COMMAND: &str = "help";

/// What a dispatch did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Usage or command help was printed; nothing ran.
    Help,
    /// The named command ran to completion.
    Ran(String),
}

/// Load the plugin list from the conf directory, or the built-in one.
pub fn load_registry(paths: &AppPaths) -> Result<PluginRegistry> {
    let path = paths.conf_file(PLUGINS_CONF);
    if path.is_file() {
        debug!(path = %path.display(), "loading plugin list");
        PluginRegistry::load_file(&path, commands::table())
            .with_context(|| format!("Failed to load plugin list {}", path.display()))
    } else {
        PluginRegistry::load(DEFAULT_PLUGINS, commands::table())
            .context("Failed to load the built-in plugin list")
    }
}

/// Top-level usage text listing every registered command.
pub fn usage(registry: &PluginRegistry) -> String {
    let mut out = String::from("usage: embci <command> [flags...]\n\ncommands:\n");
    for name in registry.names() {
        let help = registry
            .resolve_spec_for(name)
            .map(|c| c.help())
            .unwrap_or_default();
        out.push_str(&format!("  {:<16}{}\n", name, help));
    }
    out.push_str("\nrun `embci <command> --help` for the flags of a command\n");
    out
}

/// Run the command named by `argv[0]` with the rest of `argv`.
///
/// A missing, unknown or `help` command prints usage and succeeds.
pub async fn dispatch(
    registry: &PluginRegistry,
    ctx: &AppContext,
    argv: &[String],
) -> Result<Dispatch> {
    let Some((name, remaining)) = argv.split_first() else {
        print!("{}", usage(registry));
        return Ok(Dispatch::Help);
    };
    if name == HELP_COMMAND || name.starts_with('-') {
        print!("{}", usage(registry));
        return Ok(Dispatch::Help);
    }
    let Some(command) = registry.resolve_spec_for(name) else {
        warn!(command = %name, "unknown command");
        print!("{}", usage(registry));
        return Ok(Dispatch::Help);
    };

    let matches = match parse_remaining(command.as_ref(), remaining)? {
        Ok(m) => m,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            print!("{}", e.render());
            return Ok(Dispatch::Help);
        }
        Err(e) => {
            return Err(anyhow::Error::new(e).context(format!("Invalid flags for {}", name)));
        }
    };

    info!(command = %name, "running command");
    command
        .execute(ctx, &matches)
        .await
        .with_context(|| format!("Command {} failed", name))?;
    Ok(Dispatch::Ran(name.clone()))
}
