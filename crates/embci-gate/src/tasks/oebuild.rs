//! Thin wrapper over the `oebuild` command line.

use std::path::{Path, PathBuf};

use embci_core::config::NATIVE_SDK_DIR;
use serde_yaml::Value;
use tracing::info;

use crate::error::{GateError, GateResult};
use crate::runner::{CommandSpec, SubprocessRunner};

/// Workspace directory name created by `oebuild init` under a job home.
pub const WORKSPACE_NAME: &str = "oebuild_workspace";

/// `oebuild generate` options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerateOptions {
    pub platform: String,
    pub toolchain_dir: PathBuf,
    pub directory: String,
    pub features: Vec<String>,
    pub tmp_dir: Option<PathBuf>,
    pub sstate_in: Option<PathBuf>,
    pub sstate_out: Option<PathBuf>,
}

impl GenerateOptions {
    pub fn new(platform: &str, toolchain_dir: impl Into<PathBuf>, directory: &str) -> Self {
        Self {
            platform: platform.to_string(),
            toolchain_dir: toolchain_dir.into(),
            directory: directory.to_string(),
            ..Default::default()
        }
    }

    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "generate".to_string(),
            "-p".to_string(),
            self.platform.clone(),
            "-n".to_string(),
            NATIVE_SDK_DIR.to_string(),
            "-t".to_string(),
            self.toolchain_dir.display().to_string(),
        ];
        if let Some(tmp) = &self.tmp_dir {
            args.push("-m".to_string());
            args.push(tmp.display().to_string());
        }
        args.push("-b_in".to_string());
        args.push("host".to_string());
        args.push("-d".to_string());
        args.push(self.directory.clone());
        for f in &self.features {
            args.push("-f".to_string());
            args.push(f.clone());
        }
        if let Some(s) = &self.sstate_in {
            args.push("-s".to_string());
            args.push(s.display().to_string());
        }
        if let Some(s) = &self.sstate_out {
            args.push("-s_dir".to_string());
            args.push(s.display().to_string());
        }
        args
    }
}

/// The build tool.
#[derive(Debug, Clone)]
pub struct Oebuild {
    program: String,
}

impl Default for Oebuild {
    fn default() -> Self {
        Self::new("oebuild")
    }
}

impl Oebuild {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn spec(&self, cwd: &Path) -> CommandSpec {
        CommandSpec::new(&self.program).current_dir(cwd)
    }

    /// `oebuild init [-b branch] <name>` run in `parent`.
    pub async fn init(&self, parent: &Path, name: &str, branch: Option<&str>) -> GateResult<()> {
        let mut spec = self.spec(parent).arg("init");
        if let Some(b) = branch {
            spec = spec.arg("-b").arg(b);
        }
        info!(workspace = %parent.join(name).display(), "oebuild init");
        SubprocessRunner::checked(&spec.arg(name)).await.map(|_| ())
    }

    /// `oebuild update -e meta`
    pub async fn update_meta(&self, workspace: &Path) -> GateResult<()> {
        let spec = self.spec(workspace).args(["update", "-e", "meta"]);
        SubprocessRunner::checked(&spec).await.map(|_| ())
    }

    /// `oebuild generate ...` run in the workspace. Non-zero exit is an error.
    pub async fn generate(&self, workspace: &Path, opts: &GenerateOptions) -> GateResult<()> {
        let spec = self.spec(workspace).args(opts.to_args());
        info!(platform = %opts.platform, directory = %opts.directory, "oebuild generate");
        SubprocessRunner::checked(&spec).await.map(|_| ())
    }

    /// The generate invocation as a shell line, for reports.
    pub fn generate_line(&self, opts: &GenerateOptions) -> String {
        format!("{} {}", self.program, opts.to_args().join(" "))
    }

    /// `oebuild bitbake <target> [extra..]` in a build directory.
    pub fn bitbake(&self, build_dir: &Path, target: &str, extra: &[&str]) -> CommandSpec {
        self.spec(build_dir)
            .arg("bitbake")
            .arg(target)
            .args(extra.iter().copied())
    }
}

/// Whether `dir` was initialised by `oebuild init`.
pub async fn is_workspace(dir: &Path) -> bool {
    super::is_dir(&dir.join(".oebuild")).await
}

/// `<workspace>/build/<directory>/compile.yaml`
pub fn compile_yaml(workspace: &Path, directory: &str) -> PathBuf {
    workspace.join("build").join(directory).join("compile.yaml")
}

/// Read a YAML document as an untyped value.
pub async fn read_value(path: &Path) -> GateResult<Value> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| GateError::io(path, e))?;
    Ok(serde_yaml::from_str(&raw)?)
}

/// Layer names listed under `repos` in a compile.yaml, as a list or map.
pub fn layer_names(compile: &Value) -> Vec<String> {
    match compile.get("repos") {
        Some(Value::Sequence(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Some(Value::Mapping(map)) => map
            .keys()
            .filter_map(|k| k.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

/// Key that stops `oebuild bitbake` from fetching the layers itself.
pub const NOT_USE_REPOS: &str = "not_use_repos: true";

/// Put [`NOT_USE_REPOS`] on the first line of a compile.yaml. The rest of
/// the file is kept as written.
pub async fn disable_repo_fetch(compile_path: &Path) -> GateResult<()> {
    let raw = tokio::fs::read_to_string(compile_path)
        .await
        .map_err(|e| GateError::io(compile_path, e))?;
    if raw.lines().next() == Some(NOT_USE_REPOS) {
        return Ok(());
    }
    tokio::fs::write(compile_path, format!("{}\n{}", NOT_USE_REPOS, raw))
        .await
        .map_err(|e| GateError::io(compile_path, e))
}

/// Append lines to the `local_conf` block of a compile.yaml document.
pub fn append_local_conf(compile: &mut Value, extra: &str) -> GateResult<()> {
    let map = compile.as_mapping_mut().ok_or_else(|| GateError::Command {
        command: "compile.yaml".to_string(),
        output: "document is not a mapping".to_string(),
    })?;
    let key = Value::String("local_conf".to_string());
    let current = map
        .get(&key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    map.insert(key, Value::String(format!("{}{}", current, extra)));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_args_order() {
        let mut opts = GenerateOptions::new("qemu-aarch64", "/usr1/openeuler/gcc/arm64", "build-a");
        opts.features = vec!["systemd".to_string()];
        opts.sstate_in = Some(PathBuf::from("/cache/in"));
        let args = opts.to_args().join(" ");
        assert_eq!(
            args,
            "generate -p qemu-aarch64 -n /opt/buildtools/nativesdk -t /usr1/openeuler/gcc/arm64 \
             -b_in host -d build-a -f systemd -s /cache/in"
        );
    }

    #[tokio::test]
    async fn test_disable_repo_fetch_prepends_once() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("compile.yaml");
        std::fs::write(&path, "# generated\nrepos: [yocto-poky]\n").unwrap();

        disable_repo_fetch(&path).await.unwrap();
        disable_repo_fetch(&path).await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(raw, "not_use_repos: true\n# generated\nrepos: [yocto-poky]\n");
        let value: Value = serde_yaml::from_str(&raw).unwrap();
        assert_eq!(value.get("not_use_repos").and_then(Value::as_bool), Some(true));
        assert!(disable_repo_fetch(&tmp.path().join("missing.yaml")).await.is_err());
    }

    #[test]
    fn test_layer_names_list_or_map() {
        let list: Value = serde_yaml::from_str("repos: [yocto-poky, meta-openeuler]").unwrap();
        assert_eq!(layer_names(&list), vec!["yocto-poky", "meta-openeuler"]);
        let map: Value =
            serde_yaml::from_str("repos:\n  yocto-poky:\n    version: x\n").unwrap();
        assert_eq!(layer_names(&map), vec!["yocto-poky"]);
        assert!(layer_names(&Value::Null).is_empty());
    }

    #[test]
    fn test_append_local_conf() {
        let mut doc: Value = serde_yaml::from_str("local_conf: |\n  A = \"1\"\n").unwrap();
        append_local_conf(&mut doc, "INHERIT += \"rm_work\"\n").unwrap();
        let conf = doc.get("local_conf").and_then(Value::as_str).unwrap();
        assert_eq!(conf, "A = \"1\"\nINHERIT += \"rm_work\"\n");
    }
}
