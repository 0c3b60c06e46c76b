//! Yocto gate build against a scripted build tool.

use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use embci_core::capability::{build, BuildParameter};
use embci_core::config::GateConfig;
use embci_core::Outcome;
use embci_gate::tasks::YoctoGate;

/// `init` makes the workspace, `generate -d D` makes `build/D`, `bitbake`
/// prints the failure marker last for `bad-image` and exits 3 for
/// `crash-image` without it.
const FAKE_OEBUILD: &str = r#"#!/bin/sh
cmd="$1"; shift
case "$cmd" in
  init)
    for last; do :; done
    mkdir -p "$last/.oebuild" ;;
  generate)
    while [ $# -gt 0 ]; do
      if [ "$1" = "-d" ]; then mkdir -p "build/$2"; fi
      shift
    done ;;
  bitbake)
    echo "Loading cache: 100%"
    if [ "$1" = crash-image ]; then exit 3; fi
    if [ "$1" = bad-image ]; then
      echo "ERROR: Task do_compile failed"
      echo "Summary: 1 task failed: returning a non-zero exit code."
    fi ;;
esac
exit 0
"#;

fn write_tool(dir: &Path) -> String {
    let tool = dir.join("oebuild");
    std::fs::write(&tool, FAKE_OEBUILD).unwrap();
    std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();
    tool.display().to_string()
}

/// Test: board results follow the last output line, not the exit code
#[tokio::test]
async fn test_failure_marker_overrides_exit_code() {
    let tmp = tempfile::tempdir().unwrap();
    let tool = write_tool(tmp.path());
    let code = tmp.path().join("checkout/yocto-meta-openeuler");
    std::fs::create_dir_all(&code).unwrap();
    std::fs::write(code.join("README.md"), "meta layer").unwrap();

    let config: GateConfig = serde_yaml::from_str(
        r#"
build_check:
  - arch: aarch64
    toolchain: openeuler_gcc_arm64le
    board:
      - name: qemu
        platform: qemu-aarch64
        directory: qemu-aarch64
        image: [{name: good-image}, {name: bad-image}, {name: crash-image}]
"#,
    )
    .unwrap();
    let workspace = tmp.path().join("ws");
    let param = BuildParameter {
        workspace: workspace.clone(),
        build_code: code.clone(),
        share_dir: tmp.path().join("share"),
        branch: "master".to_string(),
        build_check: config.build_check_for("yocto-meta-openeuler").to_vec(),
        delete_tmp: true,
        ..Default::default()
    };

    let task = YoctoGate::new().with_tool(tool);
    let res = build(&task, &param).await.unwrap();

    let boards: Vec<_> = res
        .leaves()
        .map(|(arch, b)| (arch, b.name.as_str(), b.result))
        .collect();
    assert_eq!(
        boards,
        vec![
            ("aarch64", "good-image(qemu)", Outcome::Success),
            ("aarch64", "bad-image(qemu)", Outcome::Failure),
            ("aarch64", "crash-image(qemu)", Outcome::Success),
        ]
    );
    assert_eq!(res.outcome(), Outcome::Failure);

    let moved = workspace.join("oebuild_workspace/src/yocto-meta-openeuler/README.md");
    assert!(moved.exists(), "checkout moved into the workspace");
    assert!(!code.exists());
}

/// Test: common layers are copied from the branch cron workspace
#[tokio::test]
async fn test_common_layers_come_from_cron_workspace() {
    let tmp = tempfile::tempdir().unwrap();
    let tool = write_tool(tmp.path());
    let code = tmp.path().join("checkout/yocto-meta-openeuler");
    std::fs::create_dir_all(code.join(".oebuild")).unwrap();
    std::fs::write(
        code.join(".oebuild/common.yaml"),
        "repos:\n  yocto-poky:\n    version: v4.0\n  meta-absent:\n    version: v1\n",
    )
    .unwrap();

    let share = tmp.path().join("share");
    let cron_poky = share.join("cron/openeuler_openEuler-24.03-LTS/src/yocto-poky");
    std::fs::create_dir_all(cron_poky.join("meta")).unwrap();
    std::fs::write(cron_poky.join("meta/layer.conf"), "from cron").unwrap();

    let workspace = tmp.path().join("ws");
    let param = BuildParameter {
        workspace: workspace.clone(),
        build_code: code,
        share_dir: share,
        branch: "openEuler-24.03-LTS".to_string(),
        ..Default::default()
    };

    let res = build(&YoctoGate::new().with_tool(tool), &param).await.unwrap();
    assert_eq!(res.outcome(), Outcome::Success);

    let src = workspace.join("oebuild_workspace/src");
    let copied = std::fs::read_to_string(src.join("yocto-poky/meta/layer.conf")).unwrap();
    assert_eq!(copied, "from cron");
    assert!(cron_poky.join("meta/layer.conf").exists(), "cron copy left in place");
    assert!(!src.join("meta-absent").exists());
}
