//! Duplicate-key guard for promoting staging rows into the committed dataset.
//!
//! Two keys per row. The strict key (`PEDIDO|||ITEM`) blocks a candidate that
//! collides with the committed dataset or with an earlier candidate of the
//! same batch. The soft key (`PEDIDO|||SINIESTRO`) only warns.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{info, warn};

use ordersync_core::{BatchId, Row, RowKey, Schema};
use ordersync_storage::{RowHandle, RowStore, StoredRow};

use crate::error::EngineError;
use crate::remote::{MutationResponse, Notifier, PromotionBatch, PromotionService};

const CHANGE_CHANNEL_CAPACITY: usize = 16;

// ============================================================================
// Key sets
// ============================================================================

/// Composite keys present in the committed dataset.
#[derive(Debug, Clone, Default)]
pub struct CommittedKeys {
    strict: HashSet<RowKey>,
    soft: HashSet<RowKey>,
}

impl CommittedKeys {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows<'a>(rows: impl IntoIterator<Item = &'a Row>, schema: &Schema) -> Self {
        let mut keys = Self::new();
        for row in rows {
            keys.insert(row, schema);
        }
        keys
    }

    pub fn insert(&mut self, row: &Row, schema: &Schema) {
        if let Some(key) = schema.strict_key().key_for(row) {
            self.strict.insert(key);
        }
        if let Some(key) = schema.soft_key().key_for(row) {
            self.soft.insert(key);
        }
    }

    pub fn contains_strict(&self, key: &RowKey) -> bool {
        self.strict.contains(key)
    }

    pub fn contains_soft(&self, key: &RowKey) -> bool {
        self.soft.contains(key)
    }

    pub fn len(&self) -> usize {
        self.strict.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strict.is_empty()
    }
}

// ============================================================================
// Partition
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    /// Strict key already in the committed dataset.
    Committed,
    /// Strict key used by an earlier candidate in this batch.
    Batch,
    /// No strict key at all.
    MissingKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blocked {
    pub candidate: StoredRow,
    pub key: Option<RowKey>,
    pub reason: BlockReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoftScope {
    Committed,
    Batch,
}

/// A promoted row whose soft key is already taken. Informational only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftWarning {
    pub handle: RowHandle,
    pub key: RowKey,
    pub scope: SoftScope,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    pub to_promote: Vec<StoredRow>,
    pub blocked: Vec<Blocked>,
    pub warnings: Vec<SoftWarning>,
}

/// Split candidates into rows safe to promote and rows blocked as duplicates.
/// Candidate order decides which of two batch duplicates passes: the first.
pub fn partition(candidates: Vec<StoredRow>, committed: &CommittedKeys, schema: &Schema) -> Partition {
    let mut out = Partition::default();
    let mut batch_strict: HashSet<RowKey> = HashSet::new();
    let mut batch_soft: HashSet<RowKey> = HashSet::new();

    for candidate in candidates {
        let Some(key) = schema.strict_key().key_for(&candidate.row) else {
            out.blocked.push(Blocked {
                candidate,
                key: None,
                reason: BlockReason::MissingKey,
            });
            continue;
        };
        let reason = if committed.contains_strict(&key) {
            Some(BlockReason::Committed)
        } else if batch_strict.contains(&key) {
            Some(BlockReason::Batch)
        } else {
            None
        };
        if let Some(reason) = reason {
            out.blocked.push(Blocked {
                candidate,
                key: Some(key),
                reason,
            });
            continue;
        }

        if let Some(soft) = schema.soft_key().key_for(&candidate.row) {
            let scope = if committed.contains_soft(&soft) {
                Some(SoftScope::Committed)
            } else if batch_soft.contains(&soft) {
                Some(SoftScope::Batch)
            } else {
                None
            };
            if let Some(scope) = scope {
                out.warnings.push(SoftWarning {
                    handle: candidate.handle,
                    key: soft.clone(),
                    scope,
                });
            }
            batch_soft.insert(soft);
        }
        batch_strict.insert(key);
        out.to_promote.push(candidate);
    }
    out
}

// ============================================================================
// Promoter
// ============================================================================

/// Signal for views holding a copy of the committed dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetChanged {
    Committed { batch_id: BatchId, rows: usize },
}

#[derive(Debug, Clone)]
pub struct PromotionReport {
    pub batch_id: BatchId,
    /// Rows as sent, shaped to the committed columns.
    pub promoted: Vec<Row>,
    pub blocked: Vec<Blocked>,
    pub warnings: Vec<SoftWarning>,
    /// False when every candidate was blocked and nothing went out.
    pub sent: bool,
    key_fields: Vec<String>,
}

impl PromotionReport {
    /// Operator-facing text: counts, then one line per blocked row.
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();
        if self.sent {
            lines.push(format!("{} row(s) promoted.", self.promoted.len()));
        } else {
            lines.push("No rows promoted.".to_string());
        }
        if !self.blocked.is_empty() {
            lines.push(format!("{} row(s) skipped as duplicates:", self.blocked.len()));
            for blocked in &self.blocked {
                let parts: Vec<String> = self
                    .key_fields
                    .iter()
                    .map(|f| format!("{f}: {}", blocked.candidate.row.get(f).normalize().trim()))
                    .collect();
                let why = match blocked.reason {
                    BlockReason::Committed => "already committed",
                    BlockReason::Batch => "repeated in this batch",
                    BlockReason::MissingKey => "missing key",
                };
                lines.push(format!("{} ({why})", parts.join(" | ")));
            }
        }
        if !self.warnings.is_empty() {
            lines.push(format!(
                "{} promoted row(s) share an order and claim with another row.",
                self.warnings.len()
            ));
        }
        lines.join("\n")
    }
}

/// Moves staging rows into the committed dataset through the promotion
/// service, one batch at a time.
pub struct Promoter {
    schema: Arc<Schema>,
    staging: Arc<dyn RowStore>,
    service: Arc<dyn PromotionService>,
    notifier: Arc<dyn Notifier>,
    committed: Mutex<CommittedKeys>,
    changes: broadcast::Sender<DatasetChanged>,
    in_flight: tokio::sync::Mutex<()>,
}

impl Promoter {
    pub fn new(
        schema: Arc<Schema>,
        staging: Arc<dyn RowStore>,
        service: Arc<dyn PromotionService>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            schema,
            staging,
            service,
            notifier,
            committed: Mutex::new(CommittedKeys::new()),
            changes,
            in_flight: tokio::sync::Mutex::new(()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DatasetChanged> {
        self.changes.subscribe()
    }

    /// Rebuild the committed key set from a fresh load of the committed
    /// dataset.
    pub fn refresh_committed(&self, rows: &[Row]) {
        let keys = CommittedKeys::from_rows(rows, &self.schema);
        info!(keys = keys.len(), "committed keys refreshed");
        *self.committed.lock() = keys;
    }

    pub fn committed_len(&self) -> usize {
        self.committed.lock().len()
    }

    /// What `promote` would do right now, without sending anything.
    pub fn preview(&self) -> Result<Partition, EngineError> {
        let candidates = self.staging.snapshot()?;
        Ok(self.split(candidates))
    }

    /// Like `preview`, restricted to the given staging rows.
    pub fn preview_selected(&self, handles: &[RowHandle]) -> Result<Partition, EngineError> {
        let candidates = self.selected(handles)?;
        Ok(self.split(candidates))
    }

    /// Promote every non-duplicate staging row.
    ///
    /// Blocked rows stay in staging and are listed in the report. Once the
    /// service accepts the batch the promoted keys join the committed set,
    /// the rows leave staging and `DatasetChanged::Committed` is broadcast.
    pub async fn promote(&self) -> Result<PromotionReport, EngineError> {
        let _serial = self.in_flight.lock().await;
        let candidates = self.staging.snapshot()?;
        self.promote_candidates(candidates).await
    }

    /// Promote only the given staging rows. Unselected rows are neither sent
    /// nor removed. Handles no longer in staging are ignored.
    pub async fn promote_selected(
        &self,
        handles: &[RowHandle],
    ) -> Result<PromotionReport, EngineError> {
        let _serial = self.in_flight.lock().await;
        let candidates = self.selected(handles)?;
        self.promote_candidates(candidates).await
    }

    /// Staging rows matching `handles`, in dataset order.
    fn selected(&self, handles: &[RowHandle]) -> Result<Vec<StoredRow>, EngineError> {
        let wanted: HashSet<RowHandle> = handles.iter().copied().collect();
        let mut rows = self.staging.snapshot()?;
        rows.retain(|stored| wanted.contains(&stored.handle));
        Ok(rows)
    }

    fn split(&self, candidates: Vec<StoredRow>) -> Partition {
        let committed = self.committed.lock();
        partition(candidates, &committed, &self.schema)
    }

    async fn promote_candidates(
        &self,
        candidates: Vec<StoredRow>,
    ) -> Result<PromotionReport, EngineError> {
        let batch_id = BatchId::new();
        let split = self.split(candidates);

        let promoted: Vec<Row> = split
            .to_promote
            .iter()
            .map(|stored| self.schema.shape_for_commit(&stored.row))
            .collect();
        let mut report = PromotionReport {
            batch_id,
            promoted,
            blocked: split.blocked,
            warnings: split.warnings,
            sent: false,
            key_fields: self.schema.strict_key().fields().to_vec(),
        };

        if report.promoted.is_empty() {
            info!(%batch_id, blocked = report.blocked.len(), "nothing to promote");
            self.notifier.alert(&report.summary());
            return Ok(report);
        }

        let batch = PromotionBatch::from_rows(&report.promoted);
        if let Err(e) = self
            .service
            .insert(&batch)
            .await
            .and_then(MutationResponse::into_result)
        {
            warn!(%batch_id, rows = batch.len(), error = %e, "promotion rejected");
            self.notifier.alert(&format!("Could not promote rows: {e}"));
            return Err(EngineError::Promotion(e.to_string()));
        }

        // The backend has the rows now. Record their keys before touching
        // staging so a failed cleanup can never send them a second time.
        {
            let mut committed = self.committed.lock();
            for row in &report.promoted {
                committed.insert(row, &self.schema);
            }
        }
        report.sent = true;
        info!(
            %batch_id,
            promoted = report.promoted.len(),
            blocked = report.blocked.len(),
            "promotion committed"
        );

        let handles: Vec<RowHandle> = split.to_promote.iter().map(|s| s.handle).collect();
        if let Err(e) = self.staging.remove_rows(&handles) {
            warn!(%batch_id, rows = handles.len(), error = %e, "promoted rows left in staging");
            self.notifier
                .alert(&format!("Promoted rows could not be removed from staging: {e}"));
        }

        // No subscribers is fine.
        let _ = self.changes.send(DatasetChanged::Committed {
            batch_id,
            rows: report.promoted.len(),
        });
        if !report.blocked.is_empty() {
            self.notifier.alert(&report.summary());
        }
        Ok(report)
    }
}
