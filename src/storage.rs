use std::path::Path;

use anyhow::Result;
use catalog_proto::BatchReport;
use sled::{Batch, Config, Db};
use tracing::{debug, warn};

/// Upper bound on operations applied in one atomic batch.
pub const MAX_BATCH_OPS: usize = 500;

pub struct StorageEngine {
    pub db: Db,
}

#[derive(Debug, Clone)]
pub enum WriteOp {
    Insert(Vec<u8>, Vec<u8>),
    Remove(Vec<u8>),
}

/// A batched write that failed part way. Batches before the failing one
/// stay committed.
#[derive(Debug, thiserror::Error)]
#[error("batched write failed after {} committed batches: {source}", .applied.batches)]
pub struct BatchError {
    pub applied: BatchReport,
    #[source]
    pub source: sled::Error,
}

impl StorageEngine {
    pub fn new(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;

        let dbpath = dir.join("sled");

        let db = sled::open(&dbpath)?;

        Ok(Self { db })
    }

    pub fn new_test() -> Result<Self> {
        let db = Config::new()
            .temporary(true)
            .flush_every_ms(None)
            .open()?;

        Ok(Self { db })
    }

    // Automatically creates a tree if it does not exist and returns a handle
    pub fn subtree(&self, name: &str) -> Result<sled::Tree> {
        let tree = self.db.open_tree(name)?;
        Ok(tree)
    }

    /// Applies `ops` in order, at most [`MAX_BATCH_OPS`] per atomic batch.
    pub fn apply_batched(
        tree: &sled::Tree,
        ops: impl IntoIterator<Item = WriteOp>,
    ) -> Result<BatchReport, BatchError> {
        let mut report = BatchReport::default();
        let mut batch = Batch::default();
        let mut pending = 0;

        for op in ops {
            match op {
                WriteOp::Insert(key, value) => batch.insert(key, value),
                WriteOp::Remove(key) => batch.remove(key),
            }
            pending += 1;

            if pending == MAX_BATCH_OPS {
                Self::commit(tree, std::mem::take(&mut batch), pending, &mut report)?;
                pending = 0;
            }
        }

        if pending > 0 {
            Self::commit(tree, batch, pending, &mut report)?;
        }

        Ok(report)
    }

    fn commit(
        tree: &sled::Tree,
        batch: Batch,
        ops: usize,
        report: &mut BatchReport,
    ) -> Result<(), BatchError> {
        if let Err(source) = tree.apply_batch(batch) {
            warn!(
                committed_batches = report.batches,
                committed_ops = report.operations,
                "batch write failed: {source}"
            );
            return Err(BatchError {
                applied: BatchReport {
                    batches: report.batches,
                    operations: report.operations,
                },
                source,
            });
        }
        report.batches += 1;
        report.operations += ops;
        debug!(batch = report.batches, ops, "batch committed");
        Ok(())
    }
}
