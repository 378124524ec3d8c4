//! Stateless parallel queries.
//!
//! Every query runs in its own task with the shared options and no session
//! continuity. Results are slotted back by input position, so the report
//! order never depends on completion order.

use crate::error::SiftError;
use crate::executor::{QueryExecutor, QueryOptions};
use serde::Serialize;
use sift_common::util::query_preview;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;

/// Largest batch accepted.
pub const MAX_BATCH_QUERIES: usize = 10;

/// Outcome of one batch item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum BatchOutcome {
    Success { query: String, text: String },
    Failure { query: String, error: String },
}

impl BatchOutcome {
    pub fn query(&self) -> &str {
        match self {
            Self::Success { query, .. } | Self::Failure { query, .. } => query,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Ordered outcomes plus a tally.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub outcomes: Vec<BatchOutcome>,
    pub succeeded: usize,
    pub failed: usize,
    pub elapsed_ms: u64,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }
}

/// Fans a batch out over the executor.
pub struct BatchCoordinator {
    executor: Arc<QueryExecutor>,
}

impl BatchCoordinator {
    pub fn new(executor: Arc<QueryExecutor>) -> Self {
        Self { executor }
    }

    /// Run 1..=10 non-blank queries concurrently.
    pub async fn run(
        &self,
        queries: &[String],
        options: &QueryOptions,
    ) -> Result<BatchReport, SiftError> {
        validate_batch(queries)?;

        let start = Instant::now();
        let mut slots: Vec<BatchOutcome> = queries
            .iter()
            .map(|query| BatchOutcome::Failure {
                query: query.clone(),
                error: "Query did not complete".into(),
            })
            .collect();

        let mut join_set: JoinSet<(usize, BatchOutcome)> = JoinSet::new();
        for (index, query) in queries.iter().enumerate() {
            let executor = Arc::clone(&self.executor);
            let options = options.clone();
            let query = query.clone();

            join_set.spawn(async move {
                let result = executor.execute(query.trim(), &options, None).await;
                if !result.is_success() {
                    tracing::warn!(index, query = %query_preview(&query), "Batch query failed");
                }
                let outcome = match result.failure {
                    None => BatchOutcome::Success {
                        query,
                        text: result.text,
                    },
                    Some(_) => BatchOutcome::Failure {
                        query,
                        error: result.text,
                    },
                };
                (index, outcome)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, outcome)) => slots[index] = outcome,
                // The slot keeps its placeholder failure.
                Err(e) => tracing::warn!(error = %e, "Batch task failed"),
            }
        }

        let succeeded = slots.iter().filter(|o| o.is_success()).count();
        let report = BatchReport {
            failed: slots.len() - succeeded,
            succeeded,
            outcomes: slots,
            elapsed_ms: start.elapsed().as_millis() as u64,
        };

        tracing::info!(
            total = report.total(),
            succeeded = report.succeeded,
            failed = report.failed,
            latency_ms = report.elapsed_ms,
            "Batch completed"
        );
        Ok(report)
    }
}

fn validate_batch(queries: &[String]) -> Result<(), SiftError> {
    if queries.is_empty() || queries.len() > MAX_BATCH_QUERIES {
        return Err(SiftError::InvalidInput(format!(
            "batch must contain between 1 and {MAX_BATCH_QUERIES} queries, got {}",
            queries.len()
        )));
    }
    if let Some(position) = queries.iter().position(|q| q.trim().is_empty()) {
        return Err(SiftError::InvalidInput(format!(
            "query {} must not be empty",
            position + 1
        )));
    }
    Ok(())
}
