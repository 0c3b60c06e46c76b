//! Watchdog behaviour of test invocations against real child processes.

use std::path::Path;
use std::time::{Duration, Instant};

use embci_core::Outcome;
use embci_gate::test_run::{MarkerCriteria, PassFailCriteria};
use embci_gate::{CommandSpec, InvocationState, TestInvocation};

/// Test: a silent child is killed once the watchdog elapses
#[tokio::test]
async fn test_watchdog_kills_silent_child() {
    let watchdog = Duration::from_millis(500);
    let mut inv = TestInvocation::new(
        CommandSpec::new("sleep").arg("30"),
        Box::new(MarkerCriteria::new("login:")),
        watchdog,
    );

    let started = Instant::now();
    let outcome = inv.run().await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(outcome, Outcome::Failure);
    assert_eq!(inv.state(), InvocationState::Failed);
    assert!(elapsed >= watchdog, "failed before the watchdog: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(10), "child was waited for: {elapsed:?}");

    let pid = inv.pid().unwrap();
    assert!(
        !Path::new(&format!("/proc/{pid}")).exists(),
        "child {pid} still running"
    );
}

/// Test: run without reset is a failing no-op, reset makes it runnable again
#[tokio::test]
async fn test_rerun_requires_reset() {
    let mut inv = TestInvocation::new(
        CommandSpec::new("sh").arg("-c").arg("echo 'result pass: 3 fail: 0'"),
        Box::new(PassFailCriteria::new("result").unwrap()),
        Duration::from_secs(5),
    );
    assert_eq!(inv.run().await.unwrap(), Outcome::Success);
    let pid = inv.pid();

    assert_eq!(inv.run().await.unwrap(), Outcome::Failure);
    assert_eq!(inv.state(), InvocationState::Succeeded);
    assert_eq!(inv.pid(), pid, "no new child spawned");

    inv.reset_state();
    assert_eq!(inv.state(), InvocationState::NotRun);
    assert_eq!(inv.run().await.unwrap(), Outcome::Success);
}
