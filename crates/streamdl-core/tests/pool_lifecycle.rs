//! Integration tests: worker pool with a scripted executor against a real
//! on-disk ledger, exclusion lists and storage directories.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{start_pool, storage, test_options, Behavior, FakeExecutor};
use streamdl_core::dedup::{ExclusionList, Rejection};
use streamdl_core::ledger::{source_key, JobStatus, Ledger};
use streamdl_core::pool::{PoolState, SubmitOutcome};
use streamdl_core::retry::RetryPolicy;
use tempfile::tempdir;

const MASTER: &str = "https://x/abc123456789/master.m3u8";
const ALT: &str = "https://x/abc123456789/alt.m3u8";

fn rejection(outcomes: &[SubmitOutcome]) -> Rejection {
    match outcomes {
        [SubmitOutcome::Rejected { reason, .. }] => reason.clone(),
        other => panic!("expected one rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn completed_title_blocks_alternate_url_next_run() {
    let root = tempdir().unwrap();
    let storage = storage(root.path());

    let exec = Arc::new(FakeExecutor::succeeding());
    let pool = start_pool(&storage, exec.clone(), test_options(2)).await;
    let outcomes = pool.submit_job(MASTER, "T1", "site").await;
    assert!(outcomes[0].is_queued());
    let report = pool.drain().await;
    assert_eq!(report.succeeded, 1);
    assert!(!report.timed_out);
    assert_eq!(exec.calls(), 1);

    let ledger = Ledger::open_at(&storage.ledger_path).await.unwrap();
    let rec = ledger.get_record(&source_key(MASTER)).await.unwrap();
    assert_eq!(rec.status, JobStatus::Completed);
    let final_path = rec.final_path.clone().unwrap();
    assert_eq!(final_path, storage.videos_dir.join("site").join("T1.mp4"));
    assert_eq!(std::fs::read(&final_path).unwrap(), b"video-bytes");
    assert_eq!(rec.size_bytes, Some(11));
    assert!(!rec.temp_path.unwrap().exists());
    assert_eq!(
        ExclusionList::new(&storage.title_exclusions).load().unwrap(),
        ["T1"]
    );
    ledger.close().await;

    let exec2 = Arc::new(FakeExecutor::succeeding());
    let pool = start_pool(&storage, exec2.clone(), test_options(2)).await;
    let outcomes = pool.submit_job(ALT, "T1", "site").await;
    assert_eq!(rejection(&outcomes), Rejection::TitleExcluded);
    let report = pool.drain().await;
    assert_eq!(report.skipped, 1);
    assert_eq!(exec2.calls(), 0);
}

#[tokio::test]
async fn same_url_twice_in_one_run_admits_once() {
    let root = tempdir().unwrap();
    let exec = Arc::new(FakeExecutor::succeeding().with_delay(Duration::from_millis(50)));
    let pool = start_pool(&storage(root.path()), exec.clone(), test_options(4)).await;

    assert!(pool.submit_job(MASTER, "T1", "s").await[0].is_queued());
    assert_eq!(
        rejection(&pool.submit_job(MASTER, "T1", "s").await),
        Rejection::SeenThisRun
    );

    let report = pool.drain().await;
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(exec.calls(), 1);
}

#[tokio::test]
async fn completed_record_rejected_next_run_without_fetch() {
    let root = tempdir().unwrap();
    let storage = storage(root.path());

    let pool = start_pool(&storage, Arc::new(FakeExecutor::succeeding()), test_options(1)).await;
    pool.submit_job(MASTER, "T1", "s").await;
    pool.drain().await;
    let expected = storage.videos_dir.join("s").join("T1.mp4");

    let exec = Arc::new(FakeExecutor::succeeding());
    let pool = start_pool(&storage, exec.clone(), test_options(1)).await;
    assert_eq!(
        rejection(&pool.submit_job(MASTER, "other title", "s").await),
        Rejection::AlreadyCompleted {
            final_path: expected
        }
    );
    pool.drain().await;
    assert_eq!(exec.calls(), 0);
}

#[tokio::test]
async fn deleted_artifact_is_fetched_again() {
    let root = tempdir().unwrap();
    let mut storage = storage(root.path());

    let pool = start_pool(&storage, Arc::new(FakeExecutor::succeeding()), test_options(1)).await;
    pool.submit_job(MASTER, "T1", "s").await;
    pool.drain().await;
    std::fs::remove_file(storage.videos_dir.join("s").join("T1.mp4")).unwrap();

    // Fresh exclusion lists: only the ledger remembers the job.
    storage.title_exclusions = root.path().join("titles-2.txt");
    storage.url_exclusions = root.path().join("urls-2.txt");

    let exec = Arc::new(FakeExecutor::succeeding());
    let pool = start_pool(&storage, exec.clone(), test_options(1)).await;
    assert!(pool.submit_job(MASTER, "T1", "s").await[0].is_queued());
    assert_eq!(pool.drain().await.succeeded, 1);
    assert_eq!(exec.calls(), 1);

    let ledger = Ledger::open_at(&storage.ledger_path).await.unwrap();
    let rec = ledger.get_record(&source_key(MASTER)).await.unwrap();
    assert_eq!(rec.status, JobStatus::Completed);
    assert!(rec.final_path.unwrap().exists());
}

#[tokio::test]
async fn never_more_than_capacity_fetches_at_once() {
    let root = tempdir().unwrap();
    let exec = Arc::new(FakeExecutor::succeeding().with_delay(Duration::from_millis(80)));
    let pool = start_pool(&storage(root.path()), exec.clone(), test_options(2)).await;

    for i in 0..6 {
        let url = format!("https://cdn.example/v/clip{i}.m3u8");
        let out = pool.submit_job(url, &format!("clip {i}"), "s").await;
        assert!(out[0].is_queued(), "{out:?}");
    }
    assert_eq!(pool.active_count(), 6);

    let report = pool.drain().await;
    assert_eq!(report.succeeded, 6);
    assert_eq!(report.still_queued, 0);
    assert_eq!(exec.calls(), 6);
    assert!(exec.max_running() <= 2, "peak {}", exec.max_running());
    assert_eq!(exec.max_running(), 2);
}

#[tokio::test]
async fn failed_fetch_keeps_temp_file_and_allows_retry() {
    let root = tempdir().unwrap();
    let storage = storage(root.path());
    let exec = Arc::new(
        FakeExecutor::succeeding().with_rule("broken", Behavior::FailPartial(b"half".to_vec())),
    );
    let pool = start_pool(&storage, exec.clone(), test_options(1)).await;
    let url = "https://cdn.example/broken/master.m3u8";

    pool.submit_job(url, "Broken", "s").await;
    while pool.active_count() > 0 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let key = source_key(url);
    let rec = pool.ledger().get_record(&key).await.unwrap();
    assert_eq!(rec.status, JobStatus::Failed);
    let temp = rec.temp_path.unwrap();
    assert_eq!(std::fs::read(&temp).unwrap(), b"half");
    assert_eq!(pool.status().await.temp_files, 1);

    // Released on failure: the same run may submit it again.
    assert!(pool.submit_job(url, "Broken", "s").await[0].is_queued());
    let report = pool.drain().await;
    assert_eq!(report.failed, 2);
    assert_eq!(report.succeeded, 0);

    let requests = exec.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].options.overwrite);
    // Leftover partial file, but the executor cannot resume: restart.
    assert!(requests[1].options.overwrite);
    assert_eq!(requests[1].dest, temp);

    assert!(ExclusionList::new(&storage.title_exclusions)
        .load()
        .unwrap()
        .is_empty());
    assert!(temp.exists());
}

#[tokio::test]
async fn resume_capable_executor_continues_partial_file() {
    let root = tempdir().unwrap();
    let storage = storage(root.path());
    let url = "https://cdn.example/broken/master.m3u8";

    let exec = Arc::new(
        FakeExecutor::new(Behavior::FailPartial(b"half".to_vec())).with_resume(),
    );
    let pool = start_pool(&storage, exec.clone(), test_options(1)).await;
    pool.submit_job(url, "Clip", "s").await;
    pool.drain().await;

    let exec2 = Arc::new(FakeExecutor::succeeding().with_resume());
    let pool = start_pool(&storage, exec2.clone(), test_options(1)).await;
    pool.submit_job(url, "Clip", "s").await;
    assert_eq!(pool.drain().await.succeeded, 1);

    let requests = exec2.requests();
    assert_eq!(requests.len(), 1);
    assert!(!requests[0].options.overwrite);
    assert_eq!(requests[0].dest, exec.requests()[0].dest);
}

#[tokio::test]
async fn empty_output_is_a_failure() {
    let root = tempdir().unwrap();
    let exec = Arc::new(FakeExecutor::new(Behavior::Empty));
    let pool = start_pool(&storage(root.path()), exec, test_options(1)).await;
    pool.submit_job(MASTER, "T1", "s").await;
    let report = pool.drain().await;
    assert_eq!(report.failed, 1);
    assert_eq!(report.succeeded, 0);
}

#[tokio::test]
async fn success_without_output_is_recorded_as_failed() {
    let root = tempdir().unwrap();
    let storage = storage(root.path());
    let exec = Arc::new(FakeExecutor::new(Behavior::HollowSuccess));
    let pool = start_pool(&storage, exec, test_options(1)).await;
    assert!(pool.submit_job(MASTER, "T1", "s").await[0].is_queued());
    let report = pool.drain().await;
    assert_eq!(report.failed, 1);
    assert_eq!(report.errored, 0);
    assert_eq!(report.succeeded, 0);

    let ledger = Ledger::open_at(&storage.ledger_path).await.unwrap();
    let rec = ledger.get_record(&source_key(MASTER)).await.unwrap();
    assert_eq!(rec.status, JobStatus::Failed);
    assert!(rec.final_path.is_none());
    assert!(ExclusionList::new(&storage.title_exclusions)
        .load()
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn timeout_is_recorded_as_error() {
    let root = tempdir().unwrap();
    let storage = storage(root.path());
    let pool = start_pool(&storage, Arc::new(FakeExecutor::new(Behavior::Timeout)), test_options(1)).await;
    pool.submit_job(MASTER, "T1", "s").await;
    let report = pool.drain().await;
    assert_eq!(report.errored, 1);
    assert_eq!(report.failed, 0);

    let ledger = Ledger::open_at(&storage.ledger_path).await.unwrap();
    let rec = ledger.get_record(&source_key(MASTER)).await.unwrap();
    assert_eq!(rec.status, JobStatus::Error);
    assert!(rec.temp_path.unwrap().exists());
}

#[tokio::test]
async fn panicking_job_is_error_and_siblings_finish() {
    let root = tempdir().unwrap();
    let storage = storage(root.path());
    let exec = Arc::new(FakeExecutor::succeeding().with_rule("boom", Behavior::Panic));
    let pool = start_pool(&storage, exec, test_options(2)).await;

    pool.submit_job("https://cdn.example/boom/a.m3u8", "Boom", "s").await;
    pool.submit_job("https://cdn.example/fine/b.m3u8", "Fine", "s").await;
    let report = pool.drain().await;
    assert_eq!(report.errored, 1);
    assert_eq!(report.succeeded, 1);

    let ledger = Ledger::open_at(&storage.ledger_path).await.unwrap();
    let boom = ledger
        .get_record(&source_key("https://cdn.example/boom/a.m3u8"))
        .await
        .unwrap();
    let fine = ledger
        .get_record(&source_key("https://cdn.example/fine/b.m3u8"))
        .await
        .unwrap();
    assert_eq!(boom.status, JobStatus::Error);
    assert_eq!(fine.status, JobStatus::Completed);
}

#[tokio::test]
async fn retry_policy_reinvokes_until_success() {
    let root = tempdir().unwrap();
    let exec = Arc::new(FakeExecutor::new(Behavior::Flaky { failures: 2 }));
    let mut options = test_options(1);
    options.retry = RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
    };
    let pool = start_pool(&storage(root.path()), exec.clone(), options).await;
    pool.submit_job(MASTER, "T1", "s").await;
    let report = pool.drain().await;
    assert_eq!(report.succeeded, 1);
    assert_eq!(exec.calls(), 3);
}

#[tokio::test]
async fn mirrored_url_rejected_by_structural_key() {
    let root = tempdir().unwrap();
    let exec = Arc::new(FakeExecutor::succeeding());
    let pool = start_pool(&storage(root.path()), exec.clone(), test_options(2)).await;

    assert!(pool.submit_job(MASTER, "T1", "s").await[0].is_queued());
    let reason = rejection(
        &pool
            .submit_job("https://mirror.example/hls/abc123456789/720p.m3u8", "T1 (mirror)", "s")
            .await,
    );
    assert_eq!(
        reason,
        Rejection::UrlKeyExcluded {
            key: "run:abc123456789".into()
        }
    );
    pool.drain().await;
    assert_eq!(exec.calls(), 1);
}

#[tokio::test]
async fn url_list_is_deduplicated_before_admission() {
    let root = tempdir().unwrap();
    let storage = storage(root.path());
    let exec = Arc::new(FakeExecutor::succeeding());
    let pool = start_pool(&storage, exec.clone(), test_options(2)).await;

    let outcomes = pool
        .submit_job(
            vec![
                "https://a.example/one/x.m3u8",
                "https://a.example/one/x.m3u8",
                "https://a.example/two/y.m3u8",
            ],
            "Multi",
            "s",
        )
        .await;
    assert_eq!(outcomes.len(), 2);
    // Both distinct URLs pass: the title list only grows on success.
    assert!(outcomes.iter().all(SubmitOutcome::is_queued), "{outcomes:?}");
    let report = pool.drain().await;
    assert_eq!(report.succeeded, 2);
    assert_eq!(exec.calls(), 2);

    let mut names: Vec<String> = std::fs::read_dir(storage.videos_dir.join("s"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, ["Multi.mp4", "Multi_1.mp4"]);
}

#[tokio::test]
async fn drain_with_no_work_stops_immediately() {
    let root = tempdir().unwrap();
    let pool = start_pool(&storage(root.path()), Arc::new(FakeExecutor::succeeding()), test_options(1)).await;
    assert_eq!(pool.state(), PoolState::Running);
    let status = pool.status().await;
    assert_eq!(status.active, 0);
    assert_eq!(status.ledger.total, 0);

    let ledger = pool.ledger().clone();
    let report = pool.drain().await;
    assert_eq!(report, Default::default());
    assert!(ledger.is_closed());
}

#[tokio::test]
async fn closed_intake_rejects_submissions() {
    let root = tempdir().unwrap();
    let exec = Arc::new(FakeExecutor::succeeding());
    let pool = start_pool(&storage(root.path()), exec.clone(), test_options(1)).await;
    pool.close_intake();
    assert_eq!(pool.state(), PoolState::Draining);
    assert_eq!(
        rejection(&pool.submit_job(MASTER, "T1", "s").await),
        Rejection::Draining
    );
    let report = pool.drain().await;
    assert_eq!(report.skipped, 1);
    assert_eq!(exec.calls(), 0);
}

#[tokio::test]
async fn drain_timeout_abandons_running_job() {
    let root = tempdir().unwrap();
    let storage = storage(root.path());
    let exec = Arc::new(FakeExecutor::new(Behavior::Hang));
    let mut options = test_options(1);
    options.drain_timeout = Duration::from_millis(200);
    let pool = start_pool(&storage, exec.clone(), options).await;

    pool.submit_job("https://cdn.example/a/slow.m3u8", "Slow", "s").await;
    pool.submit_job("https://cdn.example/b/queued.m3u8", "Queued", "s").await;
    while exec.calls() == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let report = pool.drain().await;
    assert!(report.timed_out);
    assert_eq!(report.abandoned, 1);
    assert_eq!(report.still_queued, 1);
    assert_eq!(exec.calls(), 1);

    // The next run finds the abandoned records and marks them for retry.
    let pool = start_pool(&storage, Arc::new(FakeExecutor::succeeding()), test_options(1)).await;
    let slow = pool
        .ledger()
        .get_record(&source_key("https://cdn.example/a/slow.m3u8"))
        .await
        .unwrap();
    assert_eq!(slow.status, JobStatus::Error);
    assert!(pool
        .submit_job("https://cdn.example/a/slow.m3u8", "Slow", "s")
        .await[0]
        .is_queued());
    assert_eq!(pool.drain().await.succeeded, 1);
}
