//! Settle-all fan-out of connector sub-operations.
//!
//! Every task runs to completion; failures are collected afterwards, so one failing
//! group call never abandons its siblings.

use crate::connector::ConnectorResult;
use crate::error::GatewayError;
use futures::future::join_all;
use std::future::Future;

/// Outcome of one labelled sub-operation.
pub type Settled<T> = (String, ConnectorResult<T>);

/// Run labelled tasks `batch_size` at a time, keeping every outcome in input order.
pub async fn settle_batched<T, F>(tasks: Vec<(String, F)>, batch_size: usize) -> Vec<Settled<T>>
where
    F: Future<Output = ConnectorResult<T>>,
{
    let mut settled = Vec::with_capacity(tasks.len());
    let mut pending = tasks.into_iter().peekable();
    while pending.peek().is_some() {
        let (labels, futures): (Vec<String>, Vec<F>) =
            pending.by_ref().take(batch_size.max(1)).unzip();
        let outcomes = join_all(futures).await;
        settled.extend(labels.into_iter().zip(outcomes));
    }
    settled
}

/// Run all labelled tasks concurrently.
pub async fn settle_all<T, F>(tasks: Vec<(String, F)>) -> Vec<Settled<T>>
where
    F: Future<Output = ConnectorResult<T>>,
{
    let size = tasks.len();
    settle_batched(tasks, size).await
}

/// One line per failed task: `<label>: <message>`.
pub fn failures<T>(settled: &[Settled<T>]) -> Vec<String> {
    settled
        .iter()
        .filter_map(|(label, outcome)| {
            outcome
                .as_ref()
                .err()
                .map(|error| format!("{}: {}", label, error))
        })
        .collect()
}

/// Successful values, or an aggregated error naming every failure.
pub fn collect<T>(action: &str, settled: Vec<Settled<T>>) -> Result<Vec<T>, GatewayError> {
    let failed = failures(&settled);
    if !failed.is_empty() {
        return Err(GatewayError::PartialFailure {
            action: action.to_string(),
            failures: failed,
        });
    }
    Ok(settled
        .into_iter()
        .filter_map(|(_, outcome)| outcome.ok())
        .collect())
}
