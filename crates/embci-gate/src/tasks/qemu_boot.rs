//! Boot test of a built image under QEMU.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use embci_core::capability::{Test, TestParameter};
use embci_core::{Outcome, TestError};
use regex::Regex;
use tracing::{info, warn};

use super::is_dir;
use crate::runner::CommandSpec;
use crate::test_run::{MarkerCriteria, TestInvocation, DEFAULT_WATCHDOG};

/// Console line printed once the image reaches its login prompt.
pub const LOGIN_MARKER: &str = "openEuler Embedded(openEuler Embedded Reference Distro)";

const INITRD_PATTERN: &str = r"rootfs\.cpio\.gz$";

/// QEMU settings of one architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QemuProfile {
    pub qemu_arch: &'static str,
    pub kernel: &'static str,
    pub cpu: &'static str,
    pub machine: &'static str,
    pub console: &'static str,
}

impl QemuProfile {
    pub fn for_arch(arch: &str) -> Option<Self> {
        let p = match arch {
            "aarch64" => Self {
                qemu_arch: "aarch64",
                kernel: "zImage",
                cpu: "cortex-a57",
                machine: "virt-4.0",
                console: "console=ttyAMA0",
            },
            "x86-64" => Self {
                qemu_arch: "x86_64",
                kernel: "bzImage",
                cpu: "qemu64",
                machine: "pc",
                console: "console=ttyS0",
            },
            "riscv64" => Self {
                qemu_arch: "riscv64",
                kernel: "Image",
                cpu: "rv64",
                machine: "virt",
                console: "console=ttyS0",
            },
            "arm32" => Self {
                qemu_arch: "arm",
                kernel: "zImage",
                cpu: "cortex-a15",
                machine: "virt-4.0",
                console: "console=ttyAMA0",
            },
            _ => return None,
        };
        Some(p)
    }

    pub fn command(&self, kernel: &Path, initrd: &Path) -> CommandSpec {
        CommandSpec::new(format!("qemu-system-{}", self.qemu_arch))
            .args(["-M", self.machine, "-cpu", self.cpu, "-m", "1024", "-nographic"])
            .arg("-kernel")
            .arg(kernel.display().to_string())
            .arg("-initrd")
            .arg(initrd.display().to_string())
            .arg("-append")
            .arg(self.console)
    }
}

/// Only QEMU and standard targets can boot without hardware.
pub fn bootable(target_dir: &Path) -> bool {
    let name = target_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.contains("qemu") || name.contains("-std")
}

/// Files under `dir` (recursively) whose name satisfies `matches`.
pub fn find_files(dir: &Path, matches: &dyn Fn(&str) -> bool) -> std::io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in std::fs::read_dir(&current)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                pending.push(path);
            } else if matches(&entry.file_name().to_string_lossy()) {
                found.push(path);
            }
        }
    }
    found.sort();
    Ok(found)
}

fn exactly_one(mut files: Vec<PathBuf>, what: &str, dir: &Path) -> Result<PathBuf, TestError> {
    if files.len() != 1 {
        return Err(TestError::MissingAsset(format!(
            "expected one {} under {}, found {}",
            what,
            dir.display(),
            files.len()
        )));
    }
    Ok(files.remove(0))
}

/// Test task registered at `tasks/test/qemu_boot`.
#[derive(Debug, Clone, Default)]
pub struct QemuBoot;

#[async_trait]
impl Test for QemuBoot {
    async fn do_test(&self, param: &TestParameter) -> Result<Outcome, TestError> {
        if !bootable(&param.target_dir) {
            warn!(
                arch = %param.arch,
                dir = %param.target_dir.display(),
                "target cannot boot in qemu, skipping"
            );
            return Ok(Outcome::Success);
        }
        let profile = QemuProfile::for_arch(&param.arch)
            .ok_or_else(|| TestError::Unsupported(param.arch.clone()))?;

        let output = param.target_dir.join("output");
        if !is_dir(&output).await {
            return Err(TestError::MissingAsset(output.display().to_string()));
        }
        let initrd_re = Regex::new(INITRD_PATTERN).map_err(|e| TestError::Failed(e.to_string()))?;
        let (kernels, initrds) = {
            let out = output.clone();
            let kernel_name = profile.kernel;
            tokio::task::spawn_blocking(move || -> std::io::Result<_> {
                let kernels = find_files(&out, &|n: &str| n == kernel_name)?;
                let initrds = find_files(&out, &|n: &str| initrd_re.is_match(n))?;
                Ok((kernels, initrds))
            })
            .await
            .map_err(|e| TestError::Failed(e.to_string()))??
        };
        let kernel = exactly_one(kernels, profile.kernel, &output)?;
        let initrd = exactly_one(initrds, "rootfs.cpio.gz", &output)?;

        let marker = param.marker.clone().unwrap_or_else(|| LOGIN_MARKER.to_string());
        let watchdog = param.watchdog.unwrap_or(DEFAULT_WATCHDOG);
        info!(arch = %param.arch, kernel = %kernel.display(), initrd = %initrd.display(), "booting");

        let mut invocation = TestInvocation::new(
            profile.command(&kernel, &initrd),
            Box::new(MarkerCriteria::new(marker)),
            watchdog,
        );
        Ok(invocation.run().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arch_map() {
        assert_eq!(QemuProfile::for_arch("x86-64").unwrap().kernel, "bzImage");
        assert_eq!(QemuProfile::for_arch("arm32").unwrap().qemu_arch, "arm");
        assert!(QemuProfile::for_arch("mips").is_none());
    }

    #[test]
    fn test_bootable_targets() {
        assert!(bootable(Path::new("/out/qemu-aarch64")));
        assert!(bootable(Path::new("/out/x86-64-std")));
        assert!(!bootable(Path::new("/out/raspberrypi4-64")));
    }

    #[tokio::test]
    async fn test_non_qemu_target_is_skipped() {
        let param = TestParameter {
            arch: "aarch64".to_string(),
            target_dir: PathBuf::from("/nonexistent/raspberrypi4-64"),
            ..Default::default()
        };
        assert_eq!(QemuBoot.do_test(&param).await.unwrap(), Outcome::Success);
    }

    #[tokio::test]
    async fn test_unknown_arch_is_unsupported() {
        let param = TestParameter {
            arch: "mips".to_string(),
            target_dir: PathBuf::from("/nonexistent/qemu-mips"),
            ..Default::default()
        };
        let err = QemuBoot.do_test(&param).await.unwrap_err();
        assert!(matches!(err, TestError::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_ambiguous_kernel_is_missing_asset() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("qemu-aarch64");
        let out = target.join("output");
        std::fs::create_dir_all(out.join("a")).unwrap();
        std::fs::create_dir_all(out.join("b")).unwrap();
        std::fs::write(out.join("a/zImage"), "").unwrap();
        std::fs::write(out.join("b/zImage"), "").unwrap();
        std::fs::write(out.join("a/image-rootfs.cpio.gz"), "").unwrap();

        let param = TestParameter {
            arch: "aarch64".to_string(),
            target_dir: target,
            ..Default::default()
        };
        let err = QemuBoot.do_test(&param).await.unwrap_err();
        assert!(matches!(err, TestError::MissingAsset(_)));
    }

    #[test]
    fn test_find_files_recurses() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("x/y")).unwrap();
        std::fs::write(tmp.path().join("x/y/openeuler-image-rootfs.cpio.gz"), "").unwrap();
        std::fs::write(tmp.path().join("x/rootfs.cpio.gz.sig"), "").unwrap();
        let re = Regex::new(INITRD_PATTERN).unwrap();
        let found = find_files(tmp.path(), &|n: &str| re.is_match(n)).unwrap();
        assert_eq!(found.len(), 1);
    }
}
