//! Task paths of the built-in tasks and the loader that serves them.
//!
//! Paths are relative to the application root and mirror where pipeline
//! configuration expects each task. Every task exports its entry under the
//! symbol [`RUN_SYMBOL`].

use std::path::{Path, PathBuf};

use embci_core::{Extension, ExtensionLoader};

use crate::tasks::{
    BoardSuite, CodeLint, CommitMsg, CommitScope, OebuildWheel, OpenEulerDoc, OpenEulerImage,
    QemuBoot, UniProtonGate, YoctoGate,
};

pub const RUN_SYMBOL: &str = "Run";

pub const YOCTO_GATE: &str = "gate/yocto-meta-openeuler/run";
pub const UNIPROTON_GATE: &str = "gate/UniProton/run";

pub const BUILD_OPENEULER_IMAGE: &str = "tasks/build/openeuler_image";
pub const BUILD_OPENEULER_DOC: &str = "tasks/build/openeuler_doc";
pub const BUILD_OEBUILD_WHEEL: &str = "tasks/build/oebuild_wheel";

pub const CHECK_COMMIT_SCOPE: &str = "tasks/check/commit_scope";
pub const CHECK_COMMIT_MSG: &str = "tasks/check/commit_msg";
pub const CHECK_CODE: &str = "tasks/check/code_check";

pub const TEST_QEMU_BOOT: &str = "tasks/test/qemu_boot";
pub const TEST_BOARD_SUITE: &str = "tasks/test/board_suite";

/// Gate build task of a target repository: `gate/<target>/run`.
pub fn gate_task_path(target: &str) -> PathBuf {
    Path::new("gate").join(target).join("run")
}

pub fn build_task_path(target: &str) -> PathBuf {
    Path::new("tasks/build").join(target)
}

pub fn check_task_path(target: &str) -> PathBuf {
    Path::new("tasks/check").join(target)
}

pub fn test_task_path(target: &str) -> PathBuf {
    Path::new("tasks/test").join(target)
}

/// Every built-in task, rooted at `app_root`.
pub fn builtin_extensions(app_root: impl Into<PathBuf>) -> ExtensionLoader {
    let mut loader = ExtensionLoader::new(app_root);
    loader
        .register(YOCTO_GATE, RUN_SYMBOL, || Extension::Build(Box::new(YoctoGate::new())))
        .register(UNIPROTON_GATE, RUN_SYMBOL, || {
            Extension::Build(Box::new(UniProtonGate::new()))
        })
        .register(BUILD_OPENEULER_IMAGE, RUN_SYMBOL, || {
            Extension::Build(Box::new(OpenEulerImage::new()))
        })
        .register(BUILD_OPENEULER_DOC, RUN_SYMBOL, || {
            Extension::Build(Box::new(OpenEulerDoc::new()))
        })
        .register(BUILD_OEBUILD_WHEEL, RUN_SYMBOL, || {
            Extension::Build(Box::new(OebuildWheel))
        })
        .register(CHECK_COMMIT_SCOPE, RUN_SYMBOL, || {
            Extension::Check(Box::new(CommitScope))
        })
        .register(CHECK_COMMIT_MSG, RUN_SYMBOL, || {
            Extension::Check(Box::new(CommitMsg::new()))
        })
        .register(CHECK_CODE, RUN_SYMBOL, || Extension::Check(Box::new(CodeLint)))
        .register(TEST_QEMU_BOOT, RUN_SYMBOL, || Extension::Test(Box::new(QemuBoot)))
        .register(TEST_BOARD_SUITE, RUN_SYMBOL, || {
            Extension::Test(Box::new(BoardSuite))
        });
    loader
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_capabilities() {
        let loader = builtin_extensions("/opt/embci");
        assert!(loader.load_build(&gate_task_path("yocto-meta-openeuler"), RUN_SYMBOL).is_ok());
        assert!(loader.load_build(&gate_task_path("UniProton"), RUN_SYMBOL).is_ok());
        assert!(loader.load_check(&check_task_path("commit_msg"), RUN_SYMBOL).is_ok());
        assert!(loader.load_check(&check_task_path("code_check"), RUN_SYMBOL).is_ok());
        assert!(loader.load_test(&test_task_path("qemu_boot"), RUN_SYMBOL).is_ok());
        assert!(loader.load_build(&build_task_path("openeuler_doc.py"), RUN_SYMBOL).is_ok());
        assert!(loader.load_build(&check_task_path("commit_scope"), RUN_SYMBOL).is_err());
        assert_eq!(loader.keys().len(), 10);
    }

    #[test]
    fn test_unknown_gate_target() {
        let loader = builtin_extensions("/opt/embci");
        assert!(loader.load_build(&gate_task_path("kernel"), RUN_SYMBOL).is_err());
    }
}
