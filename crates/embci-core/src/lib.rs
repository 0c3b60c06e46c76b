//! embci-core: building blocks of the embedded CI orchestrator
//!
//! - [`plugin`] and [`command`]: command registry and the two-phase command
//!   contract used by the `embci` dispatcher.
//! - [`capability`] and [`extension`]: Build/Check/Test interfaces and the
//!   loader that resolves task paths to linked-in implementations.
//! - [`classify`], [`result`], [`report`]: docs/code classification, outcome
//!   aggregation and PR reporting.
//! - [`config`] and [`telemetry`]: process configuration and tracing setup.

pub mod capability;
pub mod classify;
pub mod command;
pub mod config;
pub mod error;
pub mod extension;
pub mod plugin;
pub mod report;
pub mod result;
pub mod telemetry;

pub use capability::{
    build, check, test, Arch, Board, Build, BuildParameter, BuildRes, Check, CheckParameter,
    Test, TestParameter,
};
pub use classify::{classify, ChangeKind};
pub use command::{AppContext, CiCommand};
pub use config::{AppPaths, RunContext};
pub use error::{BuildError, CheckError, ConfigError, TestError};
pub use extension::{Extension, ExtensionLoader};
pub use plugin::{CommandTable, PluginDescriptor, PluginRegistry};
pub use report::{CheckRow, CheckTable};
pub use result::{aggregate, Outcome};
