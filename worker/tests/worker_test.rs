//! Integration tests for the hygiene worker.
//!
//! Each test works on a snapshot file inside its own temporary directory.

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tidy_engine::{
    Account, Blog, CachedLikeUser, Error, FixedClock, LikeTarget, MemoryStore, Post,
    PurgeReport, ReconcileReport, SanitizeReport, Transaction,
};
use tidy_worker::{
    load_store, save_store, Config, HygieneJob, HygienePasses, ReconcileService, WorkerError,
};

fn config(path: &Path, run_once: bool) -> Config {
    Config {
        snapshot_path: path.to_path_buf(),
        like_retention: TimeDelta::days(7),
        purge_interval: Duration::from_secs(3600),
        run_once,
    }
}

/// Two copies of the same account, each with a copy of the same site.
fn duplicated_store() -> MemoryStore {
    let store = MemoryStore::new();
    let mut tx = store.begin();
    let a = tx.insert(Account::new(7, "ann").as_default()).unwrap();
    let b = tx.insert(Account::new(7, "ann")).unwrap();
    tx.insert(Blog::new("site").owned_by(a).with_dot_com_id(42)).unwrap();
    let copy = tx.insert(Blog::new("site").owned_by(b).with_dot_com_id(42)).unwrap();
    tx.insert(Post::draft(copy, "unsynced")).unwrap();
    tx.commit().unwrap();
    store
}

/// A real service whose orphan sanitizing always fails.
#[derive(Debug)]
struct FailingSanitize(ReconcileService);

#[async_trait]
impl HygienePasses for FailingSanitize {
    fn store(&self) -> &MemoryStore {
        self.0.store()
    }

    async fn reconcile_accounts(&self) -> tidy_worker::Result<ReconcileReport> {
        self.0.reconcile_accounts().await
    }

    async fn sanitize_orphans(&self) -> tidy_worker::Result<SanitizeReport> {
        Err(Error::LockPoisoned.into())
    }

    async fn purge_stale_cached_users(
        &self,
        retention: TimeDelta,
    ) -> tidy_worker::Result<PurgeReport> {
        self.0.purge_stale_cached_users(retention).await
    }
}

fn add_like_user(store: &MemoryStore, fetched: DateTime<Utc>) {
    let mut tx = store.begin();
    tx.insert(CachedLikeUser::new(1, 2, LikeTarget::Post(3), fetched))
        .unwrap();
    tx.commit().unwrap();
}

// ============================================================================
// Snapshot Persistence
// ============================================================================

#[tokio::test]
async fn missing_snapshot_loads_empty_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = load_store(&dir.path().join("absent.json")).await.unwrap();
    assert_eq!(store.count::<Account>().unwrap(), 0);
}

#[tokio::test]
async fn saved_store_loads_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let store = duplicated_store();

    save_store(&store, &path).await.unwrap();
    let loaded = load_store(&path).await.unwrap();

    assert_eq!(
        loaded.export_state().unwrap(),
        store.export_state().unwrap()
    );
}

#[tokio::test]
async fn corrupt_snapshot_is_an_engine_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    tokio::fs::write(&path, "{ not json").await.unwrap();

    let result = load_store(&path).await;
    assert!(matches!(result, Err(WorkerError::Engine(_))));
}

// ============================================================================
// Service
// ============================================================================

#[tokio::test]
async fn service_reconciles_off_the_runtime() {
    let service = ReconcileService::new(duplicated_store());

    let report = service.reconcile_accounts().await.unwrap();

    assert!(report.committed);
    assert_eq!(report.merged.len(), 2);
    assert_eq!(service.store().count::<Account>().unwrap(), 1);
    assert_eq!(service.store().count::<Blog>().unwrap(), 1);
    assert_eq!(service.store().count::<Post>().unwrap(), 1);
}

#[tokio::test]
async fn service_surfaces_engine_errors() {
    let service = ReconcileService::new(MemoryStore::new());
    let result = service.reconcile_blogs(42).await;
    assert!(matches!(result, Err(WorkerError::Engine(_))));
}

#[tokio::test]
async fn service_purges_with_injected_clock() {
    let now = Utc.with_ymd_and_hms(2024, 6, 15, 9, 0, 0).unwrap();
    let store = MemoryStore::new();
    let mut tx = store.begin();
    tx.insert(CachedLikeUser::new(1, 2, LikeTarget::Post(3), now - TimeDelta::days(8)))
        .unwrap();
    tx.insert(CachedLikeUser::new(4, 2, LikeTarget::Post(3), now)).unwrap();
    tx.commit().unwrap();

    let service = ReconcileService::with_clock(store, Arc::new(FixedClock::new(now)));
    let report = service
        .purge_stale_cached_users(TimeDelta::days(7))
        .await
        .unwrap();

    assert_eq!(report.purged.len(), 1);
    assert_eq!(service.store().count::<CachedLikeUser>().unwrap(), 1);
}

#[tokio::test]
async fn service_purges_a_single_unused_account() {
    let store = MemoryStore::new();
    let mut tx = store.begin();
    tx.insert(Account::new(1, "default").as_default()).unwrap();
    let idle = tx.insert(Account::new(2, "idle")).unwrap();
    tx.commit().unwrap();
    let service = ReconcileService::new(store);

    assert!(service.purge_account_if_unused(idle).await.unwrap());
    assert_eq!(service.store().count::<Account>().unwrap(), 1);
}

// ============================================================================
// Hygiene Job
// ============================================================================

#[tokio::test]
async fn startup_repairs_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let job = HygieneJob::new(ReconcileService::new(duplicated_store()), config(&path, true));

    let report = job.startup().await.unwrap();

    assert!(report.reconcile.committed);
    let reloaded = load_store(&path).await.unwrap();
    assert_eq!(reloaded.count::<Account>().unwrap(), 1);
    assert_eq!(reloaded.count::<Blog>().unwrap(), 1);
}

#[tokio::test]
async fn clean_startup_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let job = HygieneJob::new(ReconcileService::new(MemoryStore::new()), config(&path, true));

    job.startup().await.unwrap();

    assert!(!path.exists());
}

#[tokio::test]
async fn purge_once_persists_deletions() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let now = Utc::now();

    let store = MemoryStore::new();
    let mut tx = store.begin();
    tx.insert(CachedLikeUser::new(1, 2, LikeTarget::Comment(3), now - TimeDelta::days(30)))
        .unwrap();
    tx.commit().unwrap();

    let job = HygieneJob::new(ReconcileService::new(store), config(&path, true));
    let report = job.purge_once().await.unwrap();

    assert_eq!(report.purged.len(), 1);
    let reloaded = load_store(&path).await.unwrap();
    assert_eq!(reloaded.count::<CachedLikeUser>().unwrap(), 0);
}

#[tokio::test]
async fn run_once_returns_after_a_single_pass() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let service = ReconcileService::new(duplicated_store());
    let store = service.store().clone();

    HygieneJob::new(service, config(&path, true))
        .run(std::future::pending())
        .await;

    assert_eq!(store.count::<Account>().unwrap(), 1);
    assert!(path.exists());
}

#[tokio::test]
async fn run_stops_on_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    let job = HygieneJob::new(ReconcileService::new(MemoryStore::new()), config(&path, false));
    let handle = tokio::spawn(job.run(async {
        let _ = rx.await;
    }));

    tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn startup_keeps_accounts_without_blogs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let store = MemoryStore::new();
    let mut tx = store.begin();
    tx.insert(Account::new(1, "default").as_default()).unwrap();
    tx.insert(Account::new(2, "no sites yet")).unwrap();
    tx.commit().unwrap();

    let job = HygieneJob::new(ReconcileService::new(store.clone()), config(&path, true));
    job.startup().await.unwrap();

    assert_eq!(store.count::<Account>().unwrap(), 2);
}

#[tokio::test]
async fn merge_is_saved_when_a_later_startup_pass_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let passes = FailingSanitize(ReconcileService::new(duplicated_store()));
    let job = HygieneJob::new(passes, config(&path, true));

    let result = job.startup().await;

    assert!(matches!(
        result,
        Err(WorkerError::Engine(Error::LockPoisoned))
    ));
    let reloaded = load_store(&path).await.unwrap();
    assert_eq!(reloaded.count::<Account>().unwrap(), 1);
    assert_eq!(reloaded.count::<Blog>().unwrap(), 1);
    assert_eq!(reloaded.count::<Post>().unwrap(), 1);
}

#[tokio::test]
async fn failed_purge_is_swallowed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let store = MemoryStore::new();
    add_like_user(&store, Utc::now());

    // A week before the earliest representable instant cannot be computed.
    let clock = Arc::new(FixedClock::new(DateTime::<Utc>::MIN_UTC));
    let service = ReconcileService::with_clock(store.clone(), clock);
    let job = HygieneJob::new(service, config(&path, true));

    assert!(job.purge_once().await.is_none());
    assert_eq!(store.count::<CachedLikeUser>().unwrap(), 1);
    assert!(!path.exists());
}

#[tokio::test]
async fn purge_schedule_starts_after_failed_startup() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let store = duplicated_store();
    add_like_user(&store, Utc::now() - TimeDelta::days(30));

    let passes = FailingSanitize(ReconcileService::new(store.clone()));
    let job = HygieneJob::new(passes, config(&path, false));
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let handle = tokio::spawn(job.run(async {
        let _ = rx.await;
    }));

    // The first interval tick fires right after start-up.
    tokio::time::timeout(Duration::from_secs(5), async {
        while store.count::<CachedLikeUser>().unwrap() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();

    let reloaded = load_store(&path).await.unwrap();
    assert_eq!(reloaded.count::<Account>().unwrap(), 1);
    assert_eq!(reloaded.count::<CachedLikeUser>().unwrap(), 0);
}
