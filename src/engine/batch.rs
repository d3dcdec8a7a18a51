use super::progress::{ProgressReporter, SilentProgress};
use crate::error::ApiError;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One failed batch, addressed by its half-open index range in the input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchError {
    pub start: usize,
    pub end: usize,
    pub status: Option<u16>,
    pub message: String,
}

impl BatchError {
    /// `start-end` as written to the error ledger
    #[must_use]
    pub fn range(&self) -> String {
        format!("{}-{}", self.start, self.end)
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.end - self.start
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Aggregate outcome of one batched operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationResult {
    /// Identifiers in batches that succeeded
    pub success_count: usize,
    /// Identifiers supplied
    pub total_count: usize,
    /// One entry per failed batch, in submission order
    pub errors: Vec<BatchError>,
    /// Set when cancellation stopped the run before every batch was submitted
    pub cancelled: bool,
}

impl OperationResult {
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.errors.iter().map(BatchError::len).sum()
    }

    /// Identifiers never submitted because the run was cancelled
    #[must_use]
    pub fn skipped_count(&self) -> usize {
        self.total_count - self.success_count - self.failed_count()
    }
}

/// Drives a list of identifiers through a bulk action in fixed-size batches.
///
/// Batches run one at a time in input order. A failed batch is recorded and
/// the run moves on; nothing is retried.
pub struct BatchProcessor<'a> {
    batch_size: usize,
    cancel: Option<CancellationToken>,
    progress: Option<&'a mut dyn ProgressReporter>,
}

impl<'a> BatchProcessor<'a> {
    /// `batch_size` is clamped to at least 1
    #[must_use]
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            cancel: None,
            progress: None,
        }
    }

    /// Checks `cancel` before each batch
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: &'a mut dyn ProgressReporter) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Runs `op` once per batch and accumulates the outcome
    pub async fn run<F, Fut>(self, items: &[String], mut op: F) -> OperationResult
    where
        F: FnMut(Vec<String>) -> Fut,
        Fut: Future<Output = Result<(), ApiError>>,
    {
        let mut silent = SilentProgress;
        let progress: &mut dyn ProgressReporter = match self.progress {
            Some(p) => p,
            None => &mut silent,
        };

        let mut result = OperationResult {
            total_count: items.len(),
            ..OperationResult::default()
        };
        if items.is_empty() {
            return result;
        }

        let batch_count = items.len().div_ceil(self.batch_size);
        info!(
            total = items.len(),
            batch_size = self.batch_size,
            batches = batch_count,
            "Processing batches"
        );

        for (index, batch) in items.chunks(self.batch_size).enumerate() {
            if self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
                warn!(completed = index, batches = batch_count, "Cancelled between batches");
                result.cancelled = true;
                break;
            }

            let start = index * self.batch_size;
            let end = start + batch.len();
            match op(batch.to_vec()).await {
                Ok(()) => {
                    debug!(start, end, "Batch succeeded");
                    result.success_count += batch.len();
                }
                Err(err) => {
                    warn!(start, end, status = ?err.status, error = %err.message, "Batch failed");
                    result.errors.push(BatchError {
                        start,
                        end,
                        status: err.status,
                        message: err.message,
                    });
                }
            }
            progress.advance(batch.len() as u64);
        }

        result
    }
}

/// Partitions `items` into batches of `batch_size` and applies `op` to each.
///
/// An empty input performs no calls.
pub async fn process_batches<F, Fut>(items: &[String], batch_size: usize, op: F) -> OperationResult
where
    F: FnMut(Vec<String>) -> Fut,
    Fut: Future<Output = Result<(), ApiError>>,
{
    BatchProcessor::new(batch_size).run(items, op).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::progress::recording::RecordingProgress;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| i.to_string()).collect()
    }

    #[tokio::test]
    async fn test_empty_input_makes_no_calls() {
        let calls = RefCell::new(0);
        let result = process_batches(&[], 100, |_batch| {
            *calls.borrow_mut() += 1;
            async { Ok(()) }
        })
        .await;

        assert_eq!(*calls.borrow(), 0);
        assert_eq!(result, OperationResult::default());
    }

    #[tokio::test]
    async fn test_batches_cover_input_in_order() {
        let items = ids(250);
        let seen = RefCell::new(Vec::new());
        let result = process_batches(&items, 100, |batch| {
            seen.borrow_mut().push(batch);
            async { Ok(()) }
        })
        .await;

        let seen = seen.into_inner();
        assert_eq!(
            seen.iter().map(Vec::len).collect::<Vec<_>>(),
            vec![100, 100, 50]
        );
        assert_eq!(seen.concat(), items);
        assert_eq!(result.success_count, 250);
        assert_eq!(result.total_count, 250);
        assert!(result.errors.is_empty());
    }

    #[tokio::test]
    async fn test_duplicates_are_passed_through() {
        let items = vec!["1".to_string(), "1".to_string(), "2".to_string()];
        let seen = RefCell::new(Vec::new());
        process_batches(&items, 2, |batch| {
            seen.borrow_mut().extend(batch);
            async { Ok(()) }
        })
        .await;
        assert_eq!(seen.into_inner(), items);
    }

    #[tokio::test]
    async fn test_failed_batch_is_recorded_and_run_continues() {
        let items = ids(250);
        let call = RefCell::new(0);
        let result = process_batches(&items, 100, |_batch| {
            let n = {
                let mut c = call.borrow_mut();
                *c += 1;
                *c
            };
            async move {
                if n == 2 {
                    Err(ApiError::http(500, "internal error"))
                } else {
                    Ok(())
                }
            }
        })
        .await;

        assert_eq!(*call.borrow(), 3);
        assert_eq!(result.success_count, 150);
        assert_eq!(result.total_count, 250);
        assert_eq!(
            result.errors,
            vec![BatchError {
                start: 100,
                end: 200,
                status: Some(500),
                message: "internal error".to_string(),
            }]
        );
        assert_eq!(result.errors[0].range(), "100-200");
        assert_eq!(result.failed_count(), 100);
        assert_eq!(result.skipped_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_stops_before_next_batch() {
        let items = ids(30);
        let cancel = CancellationToken::new();
        let calls = RefCell::new(0);
        let result = BatchProcessor::new(10)
            .with_cancel(cancel.clone())
            .run(&items, |_batch| {
                *calls.borrow_mut() += 1;
                cancel.cancel();
                async { Ok(()) }
            })
            .await;

        assert_eq!(*calls.borrow(), 1);
        assert!(result.cancelled);
        assert_eq!(result.success_count, 10);
        assert_eq!(result.skipped_count(), 20);
    }

    #[tokio::test]
    async fn test_progress_advances_per_batch() {
        let items = ids(25);
        let mut progress = RecordingProgress::default();
        BatchProcessor::new(10)
            .with_progress(&mut progress)
            .run(&items, |_batch| async { Ok(()) })
            .await;
        assert_eq!(progress.advanced, 25);
    }

    #[tokio::test]
    async fn test_zero_batch_size_is_clamped() {
        let items = ids(3);
        let calls = RefCell::new(0);
        process_batches(&items, 0, |_batch| {
            *calls.borrow_mut() += 1;
            async { Ok(()) }
        })
        .await;
        assert_eq!(*calls.borrow(), 3);
    }
}
