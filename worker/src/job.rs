//! The periodic hygiene job.
//!
//! On start-up the job repairs the store: duplicate accounts and blogs are
//! merged and orphans are sanitized. Afterwards it purges stale cached like
//! users on a fixed interval. Every pass that commits is followed by a
//! snapshot save.

use crate::config::Config;
use crate::error::Result;
use crate::persist::save_store;
use crate::service::{HygienePasses, ReconcileService};
use std::future::Future;
use tidy_engine::{PurgeReport, ReconcileReport, SanitizeReport};

/// Reports of the start-up passes.
#[derive(Debug, Clone)]
pub struct StartupReport {
    pub reconcile: ReconcileReport,
    pub sanitize: SanitizeReport,
}

/// Drives hygiene passes for one store and keeps its snapshot file current.
#[derive(Debug)]
pub struct HygieneJob<P = ReconcileService> {
    passes: P,
    config: Config,
}

impl<P: HygienePasses> HygieneJob<P> {
    pub fn new(passes: P, config: Config) -> Self {
        Self { passes, config }
    }

    pub fn passes(&self) -> &P {
        &self.passes
    }

    async fn save_if(&self, committed: bool) -> Result<()> {
        if committed {
            save_store(self.passes.store(), &self.config.snapshot_path).await?;
        }
        Ok(())
    }

    /// Reconcile accounts, then sanitize orphans.
    ///
    /// Stops at the first failing pass. Passes that already committed stay
    /// committed and are already saved.
    pub async fn startup(&self) -> Result<StartupReport> {
        let reconcile = self.passes.reconcile_accounts().await?;
        self.save_if(reconcile.committed).await?;

        let sanitize = self.passes.sanitize_orphans().await?;
        self.save_if(sanitize.committed).await?;

        tracing::info!(
            merged = reconcile.merged.len(),
            skipped_blogs = reconcile.skipped_blogs.len(),
            deleted_posts = sanitize.deleted_posts.len(),
            kept_drafts = sanitize.kept_drafts.len(),
            "start-up hygiene finished"
        );
        Ok(StartupReport {
            reconcile,
            sanitize,
        })
    }

    /// One staleness purge. Failures are logged and swallowed.
    pub async fn purge_once(&self) -> Option<PurgeReport> {
        let report = match self
            .passes
            .purge_stale_cached_users(self.config.like_retention)
            .await
        {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(error = %e, "cached like user purge failed");
                return None;
            }
        };

        if let Err(e) = self.save_if(report.committed).await {
            tracing::warn!(error = %e, "failed to save snapshot after purge");
        }
        Some(report)
    }

    /// Run start-up hygiene, then purge on every interval tick until
    /// `shutdown` resolves. With `run_once` set, a single purge follows
    /// start-up and the job returns.
    ///
    /// A failed start-up pass is logged and the purge schedule still starts.
    pub async fn run(self, shutdown: impl Future<Output = ()>) {
        if let Err(e) = self.startup().await {
            tracing::error!(error = %e, "start-up hygiene failed");
        }

        if self.config.run_once {
            self.purge_once().await;
            return;
        }

        let mut interval = tokio::time::interval(self.config.purge_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.purge_once().await;
                }
                _ = &mut shutdown => {
                    tracing::info!("shutting down hygiene job");
                    break;
                }
            }
        }
    }
}
