//! embci-cli: the `embci` dispatcher and its built-in commands
//!
//! [`dispatch`] resolves the first argument against the plugin list and hands
//! the remaining arguments to the command; [`commands`] holds every command
//! linked into the binary.

pub mod commands;
pub mod dispatch;

pub use dispatch::{dispatch, load_registry, usage, Dispatch};
