//! Process configuration.
//!
//! Everything the job runner injects through the environment is resolved
//! once into [`RunContext`] and [`AppPaths`] and passed down explicitly.
//! YAML configuration files live in the conf directory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const HOME_ENV: &str = "EMBCI_HOME";
pub const CONF_DIR_ENV: &str = "EMBCI_CONF_DIR";

pub const GATE_CONF: &str = "gate.yaml";
pub const CRON_CONF: &str = "cron.yaml";
/// Daily build matrix; same layout as `cron.yaml`.
pub const CI_CONF: &str = "ci.yaml";
pub const COMMON_CONF: &str = "comm.yaml";
pub const PLUGINS_CONF: &str = "plugins.yaml";
pub const GITLINT_CONF: &str = ".gitlint";

/// Toolchain root; `-t` arguments are resolved under it.
pub const GCC_DIR: &str = "/usr1/openeuler/gcc";
/// Native SDK passed to `oebuild generate -n`.
pub const NATIVE_SDK_DIR: &str = "/opt/buildtools/nativesdk";

// ---------------------------------------------------------------------------
// Run identity
// ---------------------------------------------------------------------------

/// Identity of the job-runner build executing this process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunContext {
    pub job_name: String,
    pub build_number: u64,
    /// Build page, e.g. `https://ci.example.org/job/gate/42/`
    pub build_url: String,
}

impl RunContext {
    pub fn new(job_name: &str, build_number: u64, build_url: &str) -> Self {
        Self {
            job_name: job_name.to_string(),
            build_number,
            build_url: build_url.to_string(),
        }
    }

    /// Read `JOB_NAME`, `BUILD_NUMBER` and `BUILD_URL`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let job_name = require_env("JOB_NAME")?;
        let raw_number = require_env("BUILD_NUMBER")?;
        let build_number = raw_number
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue {
                key: "BUILD_NUMBER".to_string(),
                value: raw_number.clone(),
            })?;
        let build_url = require_env("BUILD_URL")?;
        Ok(Self {
            job_name,
            build_number,
            build_url,
        })
    }

    /// Link to `path` below the build page.
    pub fn link(&self, path: &str) -> String {
        let base = self.build_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            format!("{}/", base)
        } else {
            format!("{}/{}", base, path)
        }
    }

    /// Console log of this build.
    pub fn console_url(&self) -> String {
        self.link("console")
    }
}

fn require_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnv(key.to_string()))
}

// ---------------------------------------------------------------------------
// Filesystem layout
// ---------------------------------------------------------------------------

/// Application root and configuration directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub app_root: PathBuf,
    pub conf_dir: PathBuf,
}

impl AppPaths {
    pub fn new(app_root: impl Into<PathBuf>) -> Self {
        let app_root = app_root.into();
        let conf_dir = app_root.join("conf");
        Self { app_root, conf_dir }
    }

    pub fn with_conf_dir(mut self, conf_dir: impl Into<PathBuf>) -> Self {
        self.conf_dir = conf_dir.into();
        self
    }

    /// `EMBCI_HOME` or the current directory; `EMBCI_CONF_DIR` overrides
    /// the conf directory.
    pub fn from_env() -> Result<Self, ConfigError> {
        let app_root = match std::env::var_os(HOME_ENV) {
            Some(root) => PathBuf::from(root),
            None => std::env::current_dir().map_err(|source| ConfigError::Read {
                path: PathBuf::from("."),
                source,
            })?,
        };
        let paths = Self::new(app_root);
        Ok(match std::env::var_os(CONF_DIR_ENV) {
            Some(conf) => paths.with_conf_dir(conf),
            None => paths,
        })
    }

    pub fn conf_file(&self, name: &str) -> PathBuf {
        self.conf_dir.join(name)
    }
}

/// Read and deserialize a YAML file.
pub fn load_yaml<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_yaml::from_str(&raw)?)
}

// ---------------------------------------------------------------------------
// gate.yaml / cron.yaml
// ---------------------------------------------------------------------------

/// `{name: ...}` list item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Named {
    pub name: String,
}

/// `{target: ...}` list item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitbakeTarget {
    pub target: String,
}

/// One board (build directory) of an architecture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardTarget {
    pub name: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub directory: String,
    #[serde(default)]
    pub image: Vec<Named>,
    #[serde(default)]
    pub feature: Vec<Named>,
    /// `|`-separated cache directories removed before a cron build.
    #[serde(default)]
    pub delete_cache: Option<String>,
    #[serde(default)]
    pub bitbake: Vec<BitbakeTarget>,
}

impl BoardTarget {
    pub fn delete_cache_dirs(&self) -> Vec<&str> {
        self.delete_cache
            .as_deref()
            .map(|s| {
                s.split('|')
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchTarget {
    pub arch: String,
    #[serde(default)]
    pub toolchain: String,
    #[serde(default)]
    pub board: Vec<BoardTarget>,
}

impl ArchTarget {
    pub fn toolchain_dir(&self) -> PathBuf {
        Path::new(GCC_DIR).join(&self.toolchain)
    }
}

/// Documentation root of a repository, relative to its top.
pub const DEFAULT_DOCS_PREFIX: &str = "docs/";

fn default_docs_prefix() -> String {
    DEFAULT_DOCS_PREFIX.to_string()
}

/// Build matrix of one gate target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetMatrix {
    #[serde(default)]
    pub build_check: Vec<ArchTarget>,
}

/// `gate.yaml`
///
/// `build_check` is the matrix of the default target; `targets` overrides
/// it per gate target (e.g. `UniProton`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateConfig {
    #[serde(default = "default_docs_prefix")]
    pub docs_prefix: String,
    #[serde(default)]
    pub build_check: Vec<ArchTarget>,
    #[serde(default)]
    pub targets: BTreeMap<String, TargetMatrix>,
}

impl GateConfig {
    pub fn build_check_for(&self, target: &str) -> &[ArchTarget] {
        match self.targets.get(target) {
            Some(m) => &m.build_check,
            None => &self.build_check,
        }
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            docs_prefix: default_docs_prefix(),
            build_check: Vec::new(),
            targets: BTreeMap::new(),
        }
    }
}

/// `cron.yaml`, also the layout of `ci.yaml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CronConfig {
    #[serde(default)]
    pub build_list: Vec<ArchTarget>,
}

// ---------------------------------------------------------------------------
// comm.yaml
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JenkinsSection {
    #[serde(default)]
    pub base_url: String,
}

fn default_api_url() -> String {
    embci_forge::gitee::DEFAULT_API_URL.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForgeSection {
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

impl Default for ForgeSection {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
        }
    }
}

/// `comm.yaml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommonConfig {
    #[serde(default)]
    pub jenkins: JenkinsSection,
    #[serde(default)]
    pub forge: ForgeSection,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_context_links() {
        let ctx = RunContext::new("gate", 42, "https://ci.example.org/job/gate/42/");
        assert_eq!(
            ctx.console_url(),
            "https://ci.example.org/job/gate/42/console"
        );
        assert_eq!(
            ctx.link("/artifact/log.txt"),
            "https://ci.example.org/job/gate/42/artifact/log.txt"
        );
        assert_eq!(ctx.link(""), "https://ci.example.org/job/gate/42/");
    }

    #[test]
    fn test_app_paths_default_conf_dir() {
        let paths = AppPaths::new("/opt/embci");
        assert_eq!(paths.conf_file(GATE_CONF), PathBuf::from("/opt/embci/conf/gate.yaml"));
        let paths = paths.with_conf_dir("/etc/embci");
        assert_eq!(paths.conf_file(GATE_CONF), PathBuf::from("/etc/embci/gate.yaml"));
    }

    #[test]
    fn test_gate_config_parses() {
        let yaml = r#"
build_check:
  - arch: aarch64
    toolchain: openeuler_gcc_arm64le
    board:
      - name: qemu-aarch64
        platform: qemu-aarch64
        directory: build-qemu-aarch64
        image:
          - name: openeuler-image
"#;
        let conf: GateConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(conf.docs_prefix, "docs/");
        assert_eq!(conf.build_check[0].board[0].image[0].name, "openeuler-image");
        assert_eq!(
            conf.build_check[0].toolchain_dir(),
            PathBuf::from("/usr1/openeuler/gcc/openeuler_gcc_arm64le")
        );
    }

    #[test]
    fn test_target_matrix_override() {
        let yaml = r#"
build_check:
  - arch: aarch64
    toolchain: openeuler_gcc_arm64le
targets:
  UniProton:
    build_check:
      - arch: arm
        board:
          - name: m4
"#;
        let conf: GateConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(conf.build_check_for("yocto-meta-openeuler")[0].arch, "aarch64");
        let uni = conf.build_check_for("UniProton");
        assert_eq!(uni[0].board[0].name, "m4");
        assert!(uni[0].board[0].platform.is_empty());
    }

    #[test]
    fn test_delete_cache_split() {
        let board = BoardTarget {
            name: "b".to_string(),
            platform: "p".to_string(),
            directory: "d".to_string(),
            image: vec![],
            feature: vec![],
            delete_cache: Some("tmp| sstate-cache ||cache".to_string()),
            bitbake: vec![],
        };
        assert_eq!(board.delete_cache_dirs(), vec!["tmp", "sstate-cache", "cache"]);
    }

    #[test]
    fn test_common_config_defaults() {
        let conf: CommonConfig = serde_yaml::from_str("jenkins:\n  base_url: https://ci/\n").unwrap();
        assert_eq!(conf.jenkins.base_url, "https://ci/");
        assert_eq!(conf.forge.api_url, embci_forge::gitee::DEFAULT_API_URL);
    }

    #[test]
    fn test_load_yaml_missing_file() {
        let err = load_yaml::<GateConfig>(Path::new("/nonexistent/gate.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
