//! Contract tests for the in-memory forge and job-runner fakes

use embci_forge::fakes::{MemoryForge, MemoryJobRunner};
use embci_forge::{ForgeClient, JobRunner, PrFile};

#[tokio::test]
async fn test_seeded_pr_exposes_commits_in_first_seen_order() {
    let forge = MemoryForge::new("openeuler", "yocto-meta-openeuler").with_pr(
        5,
        vec![
            PrFile::new("c1", "docs/a.md"),
            PrFile::new("c2", "src/main.c"),
            PrFile::new("c1", "docs/b.md"),
        ],
    );

    let commits = forge.pr_commits(5).await.unwrap();
    let shas: Vec<_> = commits.iter().map(|c| c.sha.as_str()).collect();
    assert_eq!(shas, vec!["c1", "c2"]);
    assert_eq!(forge.pr_files(5).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_unknown_pr_is_an_error() {
    let forge = MemoryForge::default();
    assert!(forge.pr_files(99).await.is_err());
    assert!(forge.pr_commits(99).await.is_err());
}

#[tokio::test]
async fn test_labels_add_and_remove() {
    let forge = MemoryForge::default();
    assert!(forge.add_labels(1, &["ci_processing"]).await);
    assert!(forge.add_labels(1, &["ci_successful"]).await);
    assert!(forge.remove_labels(1, &["ci_processing"]).await);

    let labels = forge.labels(1);
    assert!(labels.contains("ci_successful"));
    assert!(!labels.contains("ci_processing"));
}

#[tokio::test]
async fn test_comments_and_issues_are_recorded() {
    let forge = MemoryForge::default();
    forge.comment_pr(3, "first").await;
    forge.comment_pr(4, "other").await;
    forge.comment_pr(3, "second").await;
    forge.create_issue("cron failed", "details").await;

    assert_eq!(forge.comments(3), vec!["first", "second"]);
    assert_eq!(forge.issues().len(), 1);
}

#[tokio::test]
async fn test_job_runner_stop_clears_building() {
    let runner = MemoryJobRunner::new();
    runner.set_building("gate", 7, true);
    assert!(runner.build_info("gate", 7).await.unwrap().building);

    runner.stop_build("gate", 7).await.unwrap();
    assert!(!runner.build_info("gate", 7).await.unwrap().building);
    assert_eq!(runner.stops(), vec![("gate".to_string(), 7)]);
}

#[tokio::test]
async fn test_failing_job_runner_errors_on_query() {
    let runner = MemoryJobRunner::failing();
    assert!(runner.build_info("gate", 1).await.is_err());
}
