//! Chunked batch execution over the store's bounded atomic batches.

use std::sync::Arc;

use futures::StreamExt;
use futures::stream;
use serde::Serialize;
use tracing::{debug, info, warn};

use docrepo_core::config::repository::BatchConfig;
use docrepo_core::error::AppError;
use docrepo_core::result::AppResult;
use docrepo_core::traits::store::DocumentStore;
use docrepo_core::types::batch::{BatchFailure, BatchFailureReport, BatchOperation, WriteBatch};

/// Result of a batch in which every chunk committed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    /// Number of operations submitted.
    pub attempted: usize,
    /// Number of operations written.
    pub written_count: usize,
    /// Number of chunks committed.
    pub chunk_count: usize,
}

/// Result of one chunk.
struct ChunkResult {
    chunk_index: usize,
    first_index: usize,
    operations: Vec<BatchOperation>,
    result: AppResult<usize>,
}

/// Splits write sets into chunks no larger than the store's batch limit
/// and commits each chunk as one atomic store batch.
///
/// Chunks are independent: a failed chunk does not roll back chunks that
/// already committed, and remaining chunks are still attempted.
#[derive(Debug, Clone)]
pub struct BatchWriter {
    store: Arc<dyn DocumentStore>,
    chunk_size: usize,
    max_concurrent_chunks: usize,
}

impl BatchWriter {
    /// Create a writer. The chunk size is clamped to the store's batch limit.
    pub fn new(store: Arc<dyn DocumentStore>, config: &BatchConfig) -> Self {
        let store_limit = store.capabilities().batch_limit.max(1);
        let chunk_size = if config.chunk_size > store_limit {
            warn!(
                configured = config.chunk_size,
                store_limit, "Batch chunk size exceeds the store limit, clamping"
            );
            store_limit
        } else {
            config.chunk_size.max(1)
        };
        Self {
            store,
            chunk_size,
            max_concurrent_chunks: config.max_concurrent_chunks.max(1),
        }
    }

    /// Effective chunk size.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of chunks `operations` operations are split into.
    pub fn chunk_count(&self, operations: usize) -> usize {
        operations.div_ceil(self.chunk_size)
    }

    /// Execute `operations` in input order, chunk by chunk.
    ///
    /// Returns the outcome when every chunk committed. Otherwise returns an
    /// error carrying a [`BatchFailureReport`] that lists every operation of
    /// every failed chunk; see [`AppError::from_batch_report`] for its kind.
    pub async fn execute(&self, operations: Vec<BatchOperation>) -> AppResult<BatchOutcome> {
        if operations.is_empty() {
            return Ok(BatchOutcome::default());
        }

        let attempted = operations.len();
        let mut chunks = Vec::with_capacity(self.chunk_count(attempted));
        let mut remaining = operations.into_iter();
        loop {
            let chunk: Vec<BatchOperation> = remaining.by_ref().take(self.chunk_size).collect();
            if chunk.is_empty() {
                break;
            }
            chunks.push(chunk);
        }
        let chunk_count = chunks.len();

        let mut results: Vec<ChunkResult> = stream::iter(chunks.into_iter().enumerate())
            .map(|(chunk_index, chunk)| self.commit_chunk(chunk_index, chunk_index * self.chunk_size, chunk))
            .buffer_unordered(self.max_concurrent_chunks)
            .collect()
            .await;
        results.sort_by_key(|r| r.chunk_index);

        let mut written_count = 0;
        let mut failures = Vec::new();
        for chunk in results {
            match chunk.result {
                Ok(written) => written_count += written,
                Err(err) => {
                    failures.extend(chunk.operations.iter().enumerate().map(|(offset, op)| {
                        BatchFailure {
                            index: chunk.first_index + offset,
                            kind: op.kind(),
                            collection: op.collection().to_string(),
                            id: op.id().clone(),
                            error: err.clone(),
                        }
                    }));
                }
            }
        }

        if failures.is_empty() {
            info!(attempted, written = written_count, chunks = chunk_count, "Batch committed");
            return Ok(BatchOutcome {
                attempted,
                written_count,
                chunk_count,
            });
        }

        warn!(
            attempted,
            written = written_count,
            failed = failures.len(),
            chunks = chunk_count,
            "Batch failed"
        );
        Err(AppError::from_batch_report(BatchFailureReport {
            attempted,
            written_count,
            chunk_count,
            failures,
        }))
    }

    async fn commit_chunk(
        &self,
        chunk_index: usize,
        first_index: usize,
        operations: Vec<BatchOperation>,
    ) -> ChunkResult {
        let mut batch = WriteBatch::new(self.chunk_size);
        let staged = operations
            .iter()
            .cloned()
            .try_for_each(|op| batch.push(op));
        let result = match staged {
            Ok(()) => self.store.commit_batch(batch).await,
            Err(e) => Err(e),
        };
        debug!(chunk = chunk_index, size = operations.len(), ok = result.is_ok(), "Batch chunk done");
        ChunkResult {
            chunk_index,
            first_index,
            operations,
            result,
        }
    }
}
