//! Sync Engine - Orchestrates bounded-concurrency repository synchronization
//!
//! The engine reads the listing page by page, filters each repository against
//! the exclusion set, and hands survivors to a [`WorkerPool`]. Page N+1 is not
//! requested until every repository on page N has been submitted. Outcomes flow
//! to a single [`OutcomeAggregator`]; the run's [`RunReport`] is assembled once
//! the pool has drained.

use anyhow::Result;
use futures::{pin_mut, FutureExt, StreamExt};
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::discovery::{repo_pages, RepoDescriptor, RepoLister};
use crate::error::ListError;
use crate::filter::ExclusionSet;
use crate::git::{Synchronizer, NO_EXIT_CODE};
use crate::outcome::{OutcomeAggregator, RunSummary, SyncOutcome};
use crate::pool::WorkerPool;

pub const TIMED_OUT: &str = "timed out";
pub const WORKER_PANICKED: &str = "worker panicked";

/// Everything a run produced
#[derive(Debug)]
pub struct RunReport {
    pub summary: RunSummary,
    /// Set when the listing stopped early; dispatched work still completed
    pub listing_error: Option<ListError>,
    pub duration: Duration,
}

/// What a dry run would do with a repository
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannedAction {
    Clone,
    Update,
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedSync {
    pub name: String,
    pub target: PathBuf,
    pub action: PlannedAction,
}

/// The main sync engine that orchestrates repository synchronization
#[derive(Clone)]
pub struct SyncEngine {
    synchronizer: Arc<dyn Synchronizer>,
    exclusions: ExclusionSet,
    max_parallel: usize,
    operation_timeout: Option<Duration>,
}

impl SyncEngine {
    pub fn new(
        synchronizer: Arc<dyn Synchronizer>,
        exclusions: ExclusionSet,
        max_parallel: usize,
        operation_timeout: Option<Duration>,
    ) -> Self {
        Self {
            synchronizer,
            exclusions,
            max_parallel,
            operation_timeout,
        }
    }

    /// List, filter and synchronize every repository the lister returns
    pub async fn run(&self, lister: &dyn RepoLister) -> Result<RunReport> {
        let start_time = Instant::now();
        let (aggregator, sink) = OutcomeAggregator::spawn();
        let mut pool = WorkerPool::new(self.max_parallel);

        info!(
            "Syncing repositories of {} with max_parallel={}",
            lister.source_name(),
            pool.max_parallel()
        );

        let mut listing_error = None;
        let pages = repo_pages(lister);
        pin_mut!(pages);

        while let Some(page) = pages.next().await {
            let repos = match page {
                Ok(repos) => repos,
                Err(e) => {
                    warn!("Listing aborted: {}", e);
                    listing_error = Some(e);
                    break;
                }
            };

            for repo in repos {
                if self.exclusions.should_exclude(&repo.name) {
                    debug!("Excluding repository: {}", repo.name);
                    sink.record(repo.name, SyncOutcome::Skipped);
                    continue;
                }

                let sink = sink.clone();
                let synchronizer = Arc::clone(&self.synchronizer);
                let limit = self.operation_timeout;
                pool.submit(async move {
                    let outcome = sync_one(synchronizer.as_ref(), &repo, limit).await;
                    sink.record(repo.name, outcome);
                })
                .await?;
            }
        }

        let panicked = pool.join().await;
        if panicked > 0 {
            error!("{} worker tasks did not report an outcome", panicked);
        }

        drop(sink);
        let summary = aggregator.finish().await?;
        let duration = start_time.elapsed();

        info!(
            "Sync completed in {:.2}s: {} processed, {} failed, {} skipped",
            duration.as_secs_f64(),
            summary.total_processed,
            summary.failures.len(),
            summary.skipped
        );

        Ok(RunReport {
            summary,
            listing_error,
            duration,
        })
    }

    /// Dry run: list and filter without touching any working copy
    pub async fn plan(&self, lister: &dyn RepoLister) -> Result<Vec<PlannedSync>, ListError> {
        let mut planned = Vec::new();
        let pages = repo_pages(lister);
        pin_mut!(pages);

        while let Some(page) = pages.next().await {
            for repo in page? {
                let target = self.synchronizer.target_dir(&repo);
                let action = if self.exclusions.should_exclude(&repo.name) {
                    PlannedAction::Skip
                } else if tokio::fs::metadata(&target)
                    .await
                    .map(|m| m.is_dir())
                    .unwrap_or(false)
                {
                    PlannedAction::Update
                } else {
                    PlannedAction::Clone
                };
                planned.push(PlannedSync {
                    name: repo.name,
                    target,
                    action,
                });
            }
        }

        info!("Dry-run analysis completed for {} repositories", planned.len());
        Ok(planned)
    }
}

/// Run one synchronizer call, turning timeouts and panics into failures
async fn sync_one(
    synchronizer: &dyn Synchronizer,
    repo: &RepoDescriptor,
    limit: Option<Duration>,
) -> SyncOutcome {
    let work = AssertUnwindSafe(synchronizer.sync(repo)).catch_unwind();

    let result = match limit {
        Some(limit) => match timeout(limit, work).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "Sync operation timed out for repository: {} after {}s",
                    repo.name,
                    limit.as_secs()
                );
                return SyncOutcome::failed(TIMED_OUT, NO_EXIT_CODE);
            }
        },
        None => work.await,
    };

    result.unwrap_or_else(|_| {
        error!("Worker panicked while syncing {}", repo.name);
        SyncOutcome::failed(WORKER_PANICKED, NO_EXIT_CODE)
    })
}
