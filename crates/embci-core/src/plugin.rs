//! Plugin registry: command name -> command implementation.
//!
//! The plugin list is declarative YAML (`plugins: [{name, class, path}]`).
//! Implementation classes are looked up in a table of constructors that the
//! binary links in, so an unknown class is caught at load time instead of
//! when the command is first used.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::command::CiCommand;
use crate::error::ConfigError;

/// Zero-argument command constructor.
pub type CommandCtor = fn() -> Box<dyn CiCommand>;

/// Constructors keyed by implementation class name.
pub type CommandTable = HashMap<&'static str, CommandCtor>;

/// One entry of `plugins.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    pub name: String,
    #[serde(rename = "class")]
    pub implementation_type: String,
    #[serde(rename = "path")]
    pub source_path: String,
}

#[derive(Debug, Deserialize)]
struct PluginList {
    plugins: Vec<PluginDescriptor>,
}

/// Immutable view of the plugin list for one process.
pub struct PluginRegistry {
    descriptors: Vec<PluginDescriptor>,
    table: CommandTable,
}

impl PluginRegistry {
    /// Parse a plugin list and check every class against `table`.
    pub fn load(yaml: &str, table: CommandTable) -> Result<Self, ConfigError> {
        let list: PluginList =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::PluginList(e.to_string()))?;

        let mut seen = std::collections::HashSet::new();
        for d in &list.plugins {
            if d.name.trim().is_empty() {
                return Err(ConfigError::PluginList("plugin with empty name".to_string()));
            }
            if !seen.insert(d.name.as_str()) {
                return Err(ConfigError::PluginList(format!(
                    "plugin {} declared twice",
                    d.name
                )));
            }
            if !table.contains_key(d.implementation_type.as_str()) {
                return Err(ConfigError::UnknownImplementation {
                    name: d.name.clone(),
                    class: d.implementation_type.clone(),
                });
            }
        }
        debug!(count = list.plugins.len(), "plugin list loaded");

        Ok(Self {
            descriptors: list.plugins,
            table,
        })
    }

    /// Load from a file.
    pub fn load_file(path: &Path, table: CommandTable) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::load(&raw, table)
    }

    pub fn descriptors(&self) -> &[PluginDescriptor] {
        &self.descriptors
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.descriptors.iter().map(|d| d.name.as_str())
    }

    pub fn descriptor(&self, command: &str) -> Option<&PluginDescriptor> {
        self.descriptors.iter().find(|d| d.name == command)
    }

    /// Instantiate the handler for `command`; `None` means no such command.
    pub fn resolve_spec_for(&self, command: &str) -> Option<Box<dyn CiCommand>> {
        let descriptor = self.descriptor(command)?;
        let ctor = self.table.get(descriptor.implementation_type.as_str())?;
        Some(ctor())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::AppContext;
    use async_trait::async_trait;
    use clap::ArgMatches;

    struct Hello;

    #[async_trait]
    impl CiCommand for Hello {
        fn name(&self) -> &'static str {
            "hello"
        }
        fn help(&self) -> &'static str {
            "say hello"
        }
        fn description(&self) -> &'static str {
            "say hello"
        }
        fn declare_flags(&self, parser: clap::Command) -> clap::Command {
            parser
        }
        async fn execute(&self, _ctx: &AppContext, _args: &ArgMatches) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn table() -> CommandTable {
        let mut t = CommandTable::new();
        t.insert("Hello", || Box::new(Hello) as Box<dyn CiCommand>);
        t
    }

    const LIST: &str = r#"
plugins:
  - name: hello
    class: Hello
    path: plugins/hello/hello.py
"#;

    #[test]
    fn test_load_and_resolve() {
        let registry = PluginRegistry::load(LIST, table()).unwrap();
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["hello"]);
        let cmd = registry.resolve_spec_for("hello").unwrap();
        assert_eq!(cmd.name(), "hello");
        assert_eq!(
            registry.descriptor("hello").unwrap().source_path,
            "plugins/hello/hello.py"
        );
    }

    #[test]
    fn test_unknown_command_is_none() {
        let registry = PluginRegistry::load(LIST, table()).unwrap();
        assert!(registry.resolve_spec_for("gate").is_none());
    }

    #[test]
    fn test_unknown_class_fails_load() {
        let yaml = "plugins:\n  - name: gate\n    class: Gate\n    path: plugins/gate/gate.py\n";
        let err = PluginRegistry::load(yaml, table()).err().unwrap();
        assert!(matches!(err, ConfigError::UnknownImplementation { class, .. } if class == "Gate"));
    }

    #[test]
    fn test_malformed_list_fails_load() {
        for yaml in ["plugins: 3", "nothing: []", "plugins:\n  - name: x\n"] {
            let err = PluginRegistry::load(yaml, table()).err().unwrap();
            assert!(matches!(err, ConfigError::PluginList(_)), "yaml {yaml:?}");
        }
    }

    #[test]
    fn test_duplicate_name_fails_load() {
        let yaml = format!("{LIST}  - name: hello\n    class: Hello\n    path: x\n");
        assert!(PluginRegistry::load(&yaml, table()).is_err());
    }
}
