//! Command abstraction.
//!
//! Argument parsing is two-phase. The dispatcher only extracts the command
//! name; each command declares and parses its own flag surface from the
//! remaining arguments.

use std::sync::Arc;

use async_trait::async_trait;
use clap::ArgMatches;

use crate::config::AppPaths;
use crate::error::ConfigError;
use crate::extension::ExtensionLoader;

/// Process-wide state handed to every command.
#[derive(Clone)]
pub struct AppContext {
    pub paths: AppPaths,
    pub extensions: Arc<ExtensionLoader>,
}

impl AppContext {
    pub fn new(paths: AppPaths, extensions: Arc<ExtensionLoader>) -> Self {
        Self { paths, extensions }
    }
}

/// Contract every subcommand implements.
#[async_trait]
pub trait CiCommand: Send + Sync {
    /// Name used on the command line and in `plugins.yaml`.
    fn name(&self) -> &'static str;

    /// One-line summary for the top-level help.
    fn help(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Add this command's flags to `parser` and return it.
    fn declare_flags(&self, parser: clap::Command) -> clap::Command;

    /// Run the command against its parsed flags.
    async fn execute(&self, ctx: &AppContext, args: &ArgMatches) -> anyhow::Result<()>;
}

/// Build the sub-parser for `command`.
///
/// Fails when `declare_flags` hands back a parser for some other command.
pub fn command_parser(command: &dyn CiCommand) -> Result<clap::Command, ConfigError> {
    let base = clap::Command::new(command.name())
        .about(command.help())
        .long_about(command.description());
    let parser = command.declare_flags(base);
    if parser.get_name() != command.name() {
        return Err(ConfigError::FlagRegistration(command.name().to_string()));
    }
    Ok(parser)
}

/// Parse `remaining` (arguments after the command name) with the command's
/// own parser.
pub fn parse_remaining(
    command: &dyn CiCommand,
    remaining: &[String],
) -> anyhow::Result<Result<ArgMatches, clap::Error>> {
    let parser = command_parser(command)?;
    let argv = std::iter::once(command.name().to_string()).chain(remaining.iter().cloned());
    Ok(parser.try_get_matches_from(argv))
}
