//! Async front end over the reconciliation engine.
//!
//! Every pass is synchronous inside the engine. The service moves each one
//! onto tokio's blocking pool and hands the result back as a future, so
//! callers on the runtime are never blocked by a pass.

use crate::error::Result;
use async_trait::async_trait;
use chrono::TimeDelta;
use std::sync::Arc;
use tidy_engine::{
    Clock, MemoryStore, ObjectId, PurgeReport, ReconcileReport, SanitizeReport, SystemClock,
};

/// The passes a [`HygieneJob`](crate::HygieneJob) drives.
#[async_trait]
pub trait HygienePasses: Send + Sync {
    /// The store whose snapshot is saved after a committed pass.
    fn store(&self) -> &MemoryStore;

    async fn reconcile_accounts(&self) -> Result<ReconcileReport>;
    async fn sanitize_orphans(&self) -> Result<SanitizeReport>;
    async fn purge_stale_cached_users(&self, retention: TimeDelta) -> Result<PurgeReport>;
}

/// Runs engine passes against a shared store off the async threads.
#[derive(Clone)]
pub struct ReconcileService {
    store: MemoryStore,
    clock: Arc<dyn Clock>,
}

impl ReconcileService {
    /// Service over `store` using the system clock.
    pub fn new(store: MemoryStore) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: MemoryStore, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    async fn run<R, F>(&self, pass: F) -> Result<R>
    where
        F: FnOnce(MemoryStore) -> tidy_engine::error::Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let store = self.store.clone();
        Ok(tokio::task::spawn_blocking(move || pass(store)).await??)
    }

    /// Merge duplicate accounts and their blogs.
    pub async fn reconcile_accounts(&self) -> Result<ReconcileReport> {
        self.run(|store| store.reconcile_accounts()).await
    }

    /// Merge duplicate blogs owned by one account.
    pub async fn reconcile_blogs(&self, account_id: ObjectId) -> Result<ReconcileReport> {
        self.run(move |store| store.reconcile_blogs(account_id)).await
    }

    /// Delete cached like users older than `retention`.
    pub async fn purge_stale_cached_users(&self, retention: TimeDelta) -> Result<PurgeReport> {
        let clock = Arc::clone(&self.clock);
        self.run(move |store| store.purge_stale_cached_users(retention, clock.as_ref()))
            .await
    }

    pub async fn sanitize_orphans(&self) -> Result<SanitizeReport> {
        self.run(|store| store.sanitize_orphans()).await
    }

    /// Delete `account_id` if it is not the default and owns no blogs.
    pub async fn purge_account_if_unused(&self, account_id: ObjectId) -> Result<bool> {
        self.run(move |store| store.purge_account_if_unused(account_id))
            .await
    }
}

#[async_trait]
impl HygienePasses for ReconcileService {
    fn store(&self) -> &MemoryStore {
        &self.store
    }

    async fn reconcile_accounts(&self) -> Result<ReconcileReport> {
        ReconcileService::reconcile_accounts(self).await
    }

    async fn sanitize_orphans(&self) -> Result<SanitizeReport> {
        ReconcileService::sanitize_orphans(self).await
    }

    async fn purge_stale_cached_users(&self, retention: TimeDelta) -> Result<PurgeReport> {
        ReconcileService::purge_stale_cached_users(self, retention).await
    }
}

impl std::fmt::Debug for ReconcileService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconcileService")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}
