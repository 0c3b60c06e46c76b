//! Two-phase dispatch through the real plugin list and built-in tasks.

use std::path::Path;

use embci_cli::commands;
use embci_cli::dispatch::DEFAULT_PLUGINS;
use embci_cli::{dispatch, load_registry, usage, Dispatch};
use embci_core::config::AppPaths;
use embci_core::{AppContext, PluginRegistry};
use embci_gate::builtin_extensions;

fn context(root: &Path) -> AppContext {
    let paths = AppPaths::new(root);
    AppContext::new(paths, builtin_extensions(root).into_shared())
}

fn registry() -> PluginRegistry {
    PluginRegistry::load(DEFAULT_PLUGINS, commands::table()).unwrap()
}

fn argv(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

/// Test: the shipped plugin list resolves every built-in command
#[test]
fn test_default_plugin_list() {
    let registry = registry();
    let names: Vec<_> = registry.names().collect();
    assert_eq!(
        names,
        vec![
            "gate",
            "cron",
            "codeCheck",
            "buildPlatform",
            "testPlatform",
            "comment",
            "pr_check",
            "cloneRepo",
            "pre",
            "ci"
        ]
    );
    let text = usage(&registry);
    assert!(text.contains("buildPlatform"));
    assert!(text.contains("Handle pull request business"));
}

/// Test: no command, `help`, a bare flag and unknown commands print usage and succeed
#[tokio::test]
async fn test_help_and_unknown_commands_exit_cleanly() {
    let tmp = tempfile::tempdir().unwrap();
    let ctx = context(tmp.path());
    let registry = registry();

    for args in [vec![], vec!["help"], vec!["--help"], vec!["serial"], vec!["put_to_dst", "-x"]] {
        let res = dispatch(&registry, &ctx, &argv(&args)).await.unwrap();
        assert_eq!(res, Dispatch::Help, "argv {args:?}");
    }
}

/// Test: command-level help is not an error; unknown flags are
#[tokio::test]
async fn test_command_flags_are_parsed_per_command() {
    let tmp = tempfile::tempdir().unwrap();
    let ctx = context(tmp.path());
    let registry = registry();

    let res = dispatch(&registry, &ctx, &argv(&["gate", "--help"])).await.unwrap();
    assert_eq!(res, Dispatch::Help);

    let err = dispatch(&registry, &ctx, &argv(&["cron", "--pr_num", "3"]))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Invalid flags for cron"), "{err:#}");
}

/// Test: conf/plugins.yaml replaces the built-in list
#[test]
fn test_conf_plugin_list_overrides_default() {
    let tmp = tempfile::tempdir().unwrap();
    let conf = tmp.path().join("conf");
    std::fs::create_dir_all(&conf).unwrap();
    std::fs::write(
        conf.join("plugins.yaml"),
        "plugins:\n  - name: kinds\n    class: PrCheck\n    path: pr_check.rs\n",
    )
    .unwrap();

    let registry = load_registry(&AppPaths::new(tmp.path())).unwrap();
    assert_eq!(registry.names().collect::<Vec<_>>(), vec!["kinds"]);
    assert_eq!(registry.resolve_spec_for("kinds").unwrap().name(), "pr_check");

    std::fs::write(
        conf.join("plugins.yaml"),
        "plugins:\n  - name: rtest\n    class: RTest\n    path: rtest.rs\n",
    )
    .unwrap();
    assert!(load_registry(&AppPaths::new(tmp.path())).is_err());
}

/// Test: testPlatform runs the board suite with the command after `--`
#[tokio::test]
async fn test_test_platform_board_suite() {
    let tmp = tempfile::tempdir().unwrap();
    let ctx = context(tmp.path());
    let registry = registry();
    let target = tmp.path().display().to_string();

    let pass = argv(&[
        "testPlatform",
        "-a",
        "aarch64",
        "--target",
        "board_suite",
        "--target_directory",
        &target,
        "--marker",
        "result",
        "--watchdog",
        "10",
        "--",
        "sh",
        "-c",
        "echo 'result pass: 2 fail: 0'",
    ]);
    let res = dispatch(&registry, &ctx, &pass).await.unwrap();
    assert_eq!(res, Dispatch::Ran("testPlatform".to_string()));

    let mut fail = pass.clone();
    *fail.last_mut().unwrap() = "echo 'result pass: 2 fail: 1'".to_string();
    assert!(dispatch(&registry, &ctx, &fail).await.is_err());
}

/// Test: codeCheck judges a local file list without talking to the forge
#[tokio::test]
async fn test_code_check_commit_scope_from_diff_files() {
    let tmp = tempfile::tempdir().unwrap();
    let ctx = context(tmp.path());
    let registry = registry();
    let code = tmp.path().display().to_string();
    let run = |files: &str| {
        argv(&[
            "codeCheck",
            "--target",
            "commit_scope",
            "-c",
            &code,
            "-p",
            "yocto-meta-openeuler",
            "--diff_files",
            files,
        ])
    };

    let ok = dispatch(&registry, &ctx, &run("docs/a.md docs/b.md")).await.unwrap();
    assert_eq!(ok, Dispatch::Ran("codeCheck".to_string()));
    assert!(dispatch(&registry, &ctx, &run("docs/a.md src/main.c")).await.is_err());
}

/// Test: buildPlatform refuses a missing source tree and an unknown task
#[tokio::test]
async fn test_build_platform_input_errors() {
    let tmp = tempfile::tempdir().unwrap();
    let ctx = context(tmp.path());
    let registry = registry();
    let code = tmp.path().display().to_string();

    let missing = argv(&["buildPlatform", "-c", "/nonexistent/src", "--target", "openeuler_doc", "-w", &code]);
    let err = dispatch(&registry, &ctx, &missing).await.unwrap_err();
    assert!(format!("{err:#}").contains("does not exist"), "{err:#}");

    let unknown = argv(&["buildPlatform", "-c", &code, "--target", "kernel", "-w", &code]);
    assert!(dispatch(&registry, &ctx, &unknown).await.is_err());
}
