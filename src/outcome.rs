//! Outcome aggregation
//!
//! Workers never touch shared counters. Each one sends its outcome through an
//! [`OutcomeSink`] to a single task that owns the [`RunSummary`], so every
//! outcome is counted exactly once regardless of completion order.

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Terminal result of processing one repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Repository cloned or updated
    Success,
    /// Clone or pull failed
    Failed { cause: String, exit_code: i32 },
    /// Repository excluded before any work
    Skipped,
}

impl SyncOutcome {
    pub fn failed(cause: impl Into<String>, exit_code: i32) -> Self {
        SyncOutcome::Failed {
            cause: cause.into(),
            exit_code,
        }
    }
}

/// A failed repository, as reported at the end of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub name: String,
    pub cause: String,
    pub exit_code: i32,
}

/// Counters for a complete run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Repositories handed to the synchronizer (successes and failures)
    pub total_processed: usize,
    pub skipped: usize,
    /// Failures in arrival order
    pub failures: Vec<Failure>,
}

impl RunSummary {
    fn apply(&mut self, name: String, outcome: SyncOutcome) {
        match outcome {
            SyncOutcome::Success => self.total_processed += 1,
            SyncOutcome::Failed { cause, exit_code } => {
                self.total_processed += 1;
                self.failures.push(Failure {
                    name,
                    cause,
                    exit_code,
                });
            }
            SyncOutcome::Skipped => self.skipped += 1,
        }
    }

    pub fn succeeded(&self) -> usize {
        self.total_processed - self.failures.len()
    }

    /// Every repository the listing returned
    pub fn total_listed(&self) -> usize {
        self.total_processed + self.skipped
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Cloneable handle workers use to report outcomes
#[derive(Debug, Clone)]
pub struct OutcomeSink {
    tx: mpsc::UnboundedSender<(String, SyncOutcome)>,
}

impl OutcomeSink {
    pub fn record(&self, name: impl Into<String>, outcome: SyncOutcome) {
        let name = name.into();
        if let Err(mpsc::error::SendError((name, _))) = self.tx.send((name, outcome)) {
            warn!("Outcome aggregator stopped, dropping outcome for {}", name);
        }
    }
}

/// Single owner of the run's [`RunSummary`]
pub struct OutcomeAggregator {
    handle: JoinHandle<RunSummary>,
}

impl OutcomeAggregator {
    /// Start the owning task and return it with the first sink
    pub fn spawn() -> (Self, OutcomeSink) {
        let (tx, mut rx) = mpsc::unbounded_channel::<(String, SyncOutcome)>();

        let handle = tokio::spawn(async move {
            let mut summary = RunSummary::default();
            while let Some((name, outcome)) = rx.recv().await {
                debug!("Outcome for {}: {:?}", name, outcome);
                summary.apply(name, outcome);
            }
            summary
        });

        (Self { handle }, OutcomeSink { tx })
    }

    /// Wait for every sink to be dropped and return the final summary
    pub async fn finish(self) -> Result<RunSummary> {
        self.handle.await.context("Outcome aggregator task failed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts() {
        let mut summary = RunSummary::default();
        summary.apply("a".into(), SyncOutcome::Success);
        summary.apply("b".into(), SyncOutcome::failed("pull failed", 1));
        summary.apply("c".into(), SyncOutcome::Skipped);
        summary.apply("d".into(), SyncOutcome::failed("clone failed", 128));

        assert_eq!(summary.total_processed, 3);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.succeeded(), 1);
        assert_eq!(summary.total_listed(), 4);
        assert!(summary.has_failures());
        assert_eq!(
            summary.failures,
            vec![
                Failure {
                    name: "b".into(),
                    cause: "pull failed".into(),
                    exit_code: 1
                },
                Failure {
                    name: "d".into(),
                    cause: "clone failed".into(),
                    exit_code: 128
                },
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_delivery_counts_each_outcome_once() {
        let (aggregator, sink) = OutcomeAggregator::spawn();

        let mut workers = Vec::new();
        for worker in 0..8 {
            let sink = sink.clone();
            workers.push(tokio::spawn(async move {
                for i in 0..250 {
                    let outcome = match i % 5 {
                        0 => SyncOutcome::Skipped,
                        1 => SyncOutcome::failed("pull failed", 1),
                        _ => SyncOutcome::Success,
                    };
                    sink.record(format!("repo-{}-{}", worker, i), outcome);
                    if i % 50 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            }));
        }
        drop(sink);

        for worker in workers {
            worker.await.unwrap();
        }
        let summary = aggregator.finish().await.unwrap();

        assert_eq!(summary.total_listed(), 2000);
        assert_eq!(summary.skipped, 400);
        assert_eq!(summary.failures.len(), 400);
        assert_eq!(summary.total_processed, 1600);
    }

    #[tokio::test]
    async fn test_finish_with_no_outcomes() {
        let (aggregator, sink) = OutcomeAggregator::spawn();
        drop(sink);
        assert_eq!(aggregator.finish().await.unwrap(), RunSummary::default());
    }
}
