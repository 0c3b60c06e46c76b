//! Concurrent preemption of the same pull request.

use std::sync::Arc;

use embci_core::config::RunContext;
use embci_forge::fakes::{MemoryForge, MemoryJobRunner};
use embci_gate::preempt::{preempt, read_record, PreemptOutcome, RunLockKey};

fn run(build: u64) -> RunContext {
    RunContext::new("gate", build, "https://ci.example.org/job/gate/")
}

/// Test: two concurrent takeovers leave one owner and stop the old build once
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_preempt_single_owner() {
    let dir = tempfile::tempdir().unwrap();
    let key = Arc::new(RunLockKey::new(dir.path(), "yocto-meta-openeuler", "openeuler", 42));
    let forge = Arc::new(MemoryForge::default());
    let jobs = Arc::new(MemoryJobRunner::new());

    preempt(&key, &run(1), forge.as_ref(), jobs.as_ref()).await.unwrap();
    jobs.set_building("gate", 1, true);

    let mut handles = Vec::new();
    for build in [2u64, 3] {
        let (key, forge, jobs) = (key.clone(), forge.clone(), jobs.clone());
        handles.push(tokio::spawn(async move {
            preempt(&key, &run(build), forge.as_ref(), jobs.as_ref()).await.unwrap()
        }));
    }
    let mut outcomes = Vec::new();
    for h in handles {
        outcomes.push(h.await.unwrap());
    }

    // Exactly one saw the still-building run 1; the other saw the winner's record.
    let cancelled: Vec<_> = outcomes
        .iter()
        .filter(|o| matches!(o, PreemptOutcome::PreviousCancelled(r) if r.build_num == 1))
        .collect();
    assert_eq!(cancelled.len(), 1, "outcomes: {outcomes:?}");
    assert_eq!(jobs.stops(), vec![("gate".to_string(), 1)]);
    assert_eq!(forge.comments(42).len(), 1);

    let first_writer = outcomes
        .iter()
        .position(|o| matches!(o, PreemptOutcome::PreviousCancelled(_)))
        .unwrap();
    let last_writer = [2u64, 3][1 - first_writer];
    let record = read_record(&key.path()).unwrap().unwrap();
    assert_eq!(record.build_num, last_writer);
}

/// Test: an unreachable job runner does not block the takeover
#[tokio::test]
async fn test_job_runner_down_still_takes_over() {
    let dir = tempfile::tempdir().unwrap();
    let key = RunLockKey::new(dir.path(), "r", "o", 7);
    let forge = MemoryForge::default();

    preempt(&key, &run(1), &forge, &MemoryJobRunner::new()).await.unwrap();
    let outcome = preempt(&key, &run(2), &forge, &MemoryJobRunner::failing())
        .await
        .unwrap();

    assert!(matches!(outcome, PreemptOutcome::PreviousUnknown(ref r) if r.build_num == 1));
    assert_eq!(read_record(&key.path()).unwrap().unwrap().build_num, 2);
    assert!(forge.comments(7).is_empty());
}
