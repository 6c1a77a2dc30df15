//! Multi-entity preparation on a bounded worker pool.
//!
//! Provider traffic is already spaced by the shared rate limiter, so the
//! worker count bounds parallel disk and CPU work, not request rate.

use crate::assembler::{DatasetAssembler, PrepareOptions};
use crate::bundle::PreparedDataset;
use crate::error::AccessError;
use asof_core::domain::EntityId;
use chrono::NaiveDate;
use rayon::prelude::*;

/// Callbacks for batch progress. Called from worker threads.
pub trait BatchProgress: Sync {
    fn on_start(&self, entity: &EntityId, index: usize, total: usize);

    fn on_complete(&self, entity: &EntityId, index: usize, total: usize, result: &Result<PreparedDataset, AccessError>);

    fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize);
}

/// Discards progress.
pub struct SilentProgress;

impl BatchProgress for SilentProgress {
    fn on_start(&self, _: &EntityId, _: usize, _: usize) {}

    fn on_complete(&self, _: &EntityId, _: usize, _: usize, _: &Result<PreparedDataset, AccessError>) {}

    fn on_batch_complete(&self, _: usize, _: usize, _: usize) {}
}

/// Prints one line per entity to stderr.
pub struct StderrProgress;

impl BatchProgress for StderrProgress {
    fn on_start(&self, entity: &EntityId, index: usize, total: usize) {
        eprintln!("[{}/{}] Preparing {entity}...", index + 1, total);
    }

    fn on_complete(&self, entity: &EntityId, _: usize, _: usize, result: &Result<PreparedDataset, AccessError>) {
        match result {
            Ok(ds) => eprintln!(
                "  OK: {entity} ({} price rows, {} financial rows)",
                ds.prices.row_count(),
                ds.financials.row_count()
            ),
            Err(e) => eprintln!("  FAIL: {entity}: {e}"),
        }
    }

    fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize) {
        eprintln!("\nBatch complete: {succeeded}/{total} succeeded, {failed} failed");
    }
}

/// Per-entity outcomes, in input order.
#[derive(Debug)]
pub struct BatchSummary {
    pub results: Vec<(EntityId, Result<PreparedDataset, AccessError>)>,
}

impl BatchSummary {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|(_, r)| r.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&EntityId, &AccessError)> {
        self.results
            .iter()
            .filter_map(|(e, r)| r.as_ref().err().map(|err| (e, err)))
    }
}

/// Prepare every entity as of `as_of`. One entity's failure does not stop
/// the others. `workers <= 1` runs sequentially on the calling thread.
pub fn prepare_many(
    assembler: &DatasetAssembler,
    entities: &[EntityId],
    as_of: NaiveDate,
    opts: &PrepareOptions,
    workers: usize,
    progress: &dyn BatchProgress,
) -> Result<BatchSummary, AccessError> {
    let total = entities.len();
    let run_one = |(index, entity): (usize, &EntityId)| {
        progress.on_start(entity, index, total);
        let result = assembler.prepare_dataset_on(entity, as_of, opts);
        progress.on_complete(entity, index, total, &result);
        (entity.clone(), result)
    };

    let results: Vec<_> = if workers > 1 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| AccessError::WorkerPool(e.to_string()))?;
        pool.install(|| entities.par_iter().enumerate().map(run_one).collect())
    } else {
        entities.iter().enumerate().map(run_one).collect()
    };

    let summary = BatchSummary { results };
    progress.on_batch_complete(summary.succeeded(), summary.failed(), total);
    Ok(summary)
}
