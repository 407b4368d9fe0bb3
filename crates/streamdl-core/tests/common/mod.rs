#![allow(dead_code)]

pub mod fake_executor;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use streamdl_core::config::StoragePaths;
use streamdl_core::dedup::{ExclusionList, ExclusionSet};
use streamdl_core::executor::FetchExecutor;
use streamdl_core::ledger::Ledger;
use streamdl_core::paths::PathManager;
use streamdl_core::pool::{PoolOptions, WorkerPool};
use streamdl_core::retry::RetryPolicy;

pub use fake_executor::{Behavior, FakeExecutor};

/// Pool options with short intervals for tests.
pub fn test_options(capacity: usize) -> PoolOptions {
    PoolOptions {
        capacity,
        fetch_threads: 4,
        user_agent: "streamdl-test".into(),
        fetch_timeout: Duration::from_secs(5),
        drain_timeout: Duration::from_secs(10),
        temp_retention: Duration::from_secs(7 * 24 * 3600),
        monitor_interval: Duration::from_millis(50),
        retry: RetryPolicy::default(),
    }
}

/// Storage layout rooted in a temp dir.
pub fn storage(root: &Path) -> StoragePaths {
    StoragePaths::under(root)
}

/// Open everything the pool needs from `storage` and start it.
pub async fn start_pool(
    storage: &StoragePaths,
    executor: Arc<dyn FetchExecutor>,
    options: PoolOptions,
) -> WorkerPool {
    let ledger = Ledger::open_at(&storage.ledger_path).await.unwrap();
    let exclusions = ExclusionSet::load(
        ExclusionList::new(&storage.title_exclusions),
        ExclusionList::new(&storage.url_exclusions),
    )
    .unwrap();
    let paths = Arc::new(PathManager::from_storage(storage));
    WorkerPool::start(ledger, exclusions, paths, executor, options)
        .await
        .unwrap()
}
