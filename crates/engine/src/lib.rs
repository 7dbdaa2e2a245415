pub mod config;
pub mod edit;
pub mod error;
pub mod guard;
pub mod overlay;
pub mod push;
pub mod remote;
pub mod resolver;
pub mod scheduler;
pub mod suppression;
pub mod undo;

pub use config::EngineConfig;
pub use edit::{CellKey, EditOutcome, EditRequest, Origin, UndoOutcome};
pub use error::{EditError, EngineError};
pub use guard::{
    BlockReason, Blocked, CommittedKeys, DatasetChanged, Partition, PromotionReport, Promoter,
    SoftScope, SoftWarning, partition,
};
pub use overlay::project_status_overlay;
pub use push::{FieldUpdate, PushDisposition, PushEvent};
pub use remote::{
    MutationRequest, MutationResponse, MutationService, Notifier, PromotionBatch,
    PromotionService, RemoteError, SilentNotifier,
};
pub use resolver::{Resolution, RowIdentity, locate};
pub use scheduler::{DebounceScheduler, Dispatch, Job};
pub use suppression::EchoSuppression;
pub use undo::{UndoEntry, UndoStack};

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use ordersync_core::{Clock, EditId, FieldSpec, FieldValue, Role, Row, RowId, Schema, SystemClock};
use ordersync_storage::{RowHandle, RowStore};

type WriteResult = Result<(), RemoteError>;

// ============================================================================
// Engine
// ============================================================================

/// Edit pipeline for one client session. Cheap to clone; clones share all
/// state, so edits to different cells can be driven concurrently.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

struct Inner {
    schema: Arc<Schema>,
    role: Role,
    store: Arc<dyn RowStore>,
    remote: Arc<dyn MutationService>,
    notifier: Arc<dyn Notifier>,
    scheduler: DebounceScheduler<CellKey, WriteResult>,
    suppression: EchoSuppression,
    undo: Mutex<UndoStack>,
    /// Value a cell held before its current burst of debounced edits.
    bases: Mutex<HashMap<CellKey, FieldValue>>,
    config: EngineConfig,
}

pub struct EngineBuilder {
    store: Arc<dyn RowStore>,
    remote: Arc<dyn MutationService>,
    schema: Schema,
    role: Role,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl EngineBuilder {
    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }

    pub fn role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Engine {
        let config = self.config;
        Engine {
            inner: Arc::new(Inner {
                schema: Arc::new(self.schema),
                role: self.role,
                store: self.store,
                remote: self.remote,
                notifier: self.notifier,
                scheduler: DebounceScheduler::new(config.debounce()),
                suppression: EchoSuppression::new(self.clock, config.suppression_window_ms),
                undo: Mutex::new(UndoStack::new(config.undo_depth)),
                bases: Mutex::new(HashMap::new()),
                config,
            }),
        }
    }
}

impl Engine {
    /// Parts-order schema, viewer role, wall clock, default config and no
    /// alerts until overridden.
    pub fn builder(store: Arc<dyn RowStore>, remote: Arc<dyn MutationService>) -> EngineBuilder {
        EngineBuilder {
            store,
            remote,
            schema: Schema::parts_orders(),
            role: Role::Viewer,
            notifier: Arc::new(SilentNotifier),
            clock: Arc::new(SystemClock),
            config: EngineConfig::default(),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.inner.schema
    }

    pub fn role(&self) -> Role {
        self.inner.role
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<dyn RowStore> {
        &self.inner.store
    }

    pub fn can_undo(&self) -> bool {
        self.inner.undo.lock().can_undo()
    }

    pub fn undo_depth(&self) -> usize {
        self.inner.undo.lock().depth()
    }

    pub fn is_suppressed(&self) -> bool {
        self.inner.suppression.is_suppressed()
    }

    pub fn pending_writes(&self) -> usize {
        self.inner.scheduler.pending_count()
    }

    /// Replace the working dataset, e.g. after a push asked for a reload.
    pub fn reload(&self, rows: Vec<Row>) -> Result<(), EngineError> {
        let count = rows.len();
        self.inner.store.replace_all(rows)?;
        info!(rows = count, "dataset reloaded");
        Ok(())
    }

    /// Reload from the backend's flat JSON records.
    pub fn reload_json(&self, records: &[serde_json::Value]) -> Result<(), EngineError> {
        let rows = records
            .iter()
            .map(Row::from_json)
            .collect::<Result<Vec<_>, _>>()?;
        self.reload(rows)
    }

    // ========================================================================
    // Edit pipeline
    // ========================================================================

    /// Run one cell change to a terminal state.
    ///
    /// Recoverable failures come back as `EditOutcome::RolledBack`; `Err` is
    /// reserved for the row store itself failing. An undo replay that does
    /// not commit, for any reason, puts its entry back on the stack.
    pub async fn submit_edit(&self, request: EditRequest) -> Result<EditOutcome, EngineError> {
        let edit_id = EditId::new();
        let EditRequest {
            row,
            field,
            old_value,
            new_value,
            live,
            origin,
        } = request;

        let replayed = match origin {
            Origin::UserEdit => None,
            Origin::UndoReplay(entry) => Some(entry),
        };
        let result = self
            .run_edit(
                edit_id,
                &row,
                &field,
                &old_value,
                &new_value,
                live,
                replayed.is_none(),
            )
            .await;

        if let Some(entry) = replayed {
            let committed = matches!(&result, Ok(outcome) if outcome.is_success());
            if !committed {
                debug!(%edit_id, field = %field, "undo replay failed, entry restored");
                self.inner.undo.lock().restore(entry);
            }
        }
        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_edit(
        &self,
        edit_id: EditId,
        row: &Row,
        field: &str,
        old_value: &FieldValue,
        new_value: &FieldValue,
        live: Option<bool>,
        record_history: bool,
    ) -> Result<EditOutcome, EngineError> {
        let inner = &self.inner;

        let Some(spec) = inner
            .schema
            .field(field)
            .filter(|spec| inner.role.may_edit(spec.access()))
        else {
            debug!(%edit_id, field, role = inner.role.as_str(), "edit refused by field access");
            return Ok(rolled_back(
                EditError::PermissionDenied {
                    field: field.to_string(),
                },
                old_value,
            ));
        };

        let identity = RowIdentity::resolve(row, inner.schema.strict_key());
        let Some(row_id) = identity.id else {
            debug!(%edit_id, field, "edit refused, row has no id");
            return Ok(rolled_back(EditError::IdentityMissing, old_value));
        };

        let applied = match spec.canonicalize(new_value) {
            Ok(canonical) => canonical,
            // Undo puts back a value that was stored before, valid or not.
            Err(_) if !record_history => spec.canonical_form(new_value),
            Err(rejection) => {
                if !rejection.is_silent() {
                    inner.notifier.alert(&rejection.to_string());
                }
                debug!(%edit_id, row_id = %row_id, field, "edit refused: {rejection}");
                return Ok(rolled_back(rejection.into(), old_value));
            }
        };
        let applied_value = FieldValue::Text(applied.clone());

        let Some(stored) = locate(inner.store.as_ref(), inner.schema.strict_key(), &identity)?
            .into_found()
        else {
            warn!(%edit_id, row_id = %row_id, field, "edited row is no longer in the dataset");
            return Ok(rolled_back(EditError::RowNotFound { id: Some(row_id) }, old_value));
        };
        // After a reload a key match carries the row's current id. Everything
        // below works on the row that was found.
        let identity = RowIdentity::resolve(&stored.row, inner.schema.strict_key());
        let Some(row_id) = identity.id else {
            debug!(%edit_id, field, "edit refused, located row has no id");
            return Ok(rolled_back(EditError::IdentityMissing, old_value));
        };

        if spec.canonical_form(old_value) == applied {
            // Nothing to send; still show the canonical spelling.
            inner.store.modify_field(stored.handle, field, &mut |current| {
                (current != &applied_value).then(|| applied_value.clone())
            })?;
            debug!(%edit_id, row_id = %row_id, field, "no-op edit");
            return Ok(EditOutcome::Committed {
                applied: applied_value,
                network: false,
            });
        }

        let cell = CellKey::new(row_id, field);
        let live = live.unwrap_or(spec.is_live());
        let base = {
            let mut bases = inner.bases.lock();
            if live {
                bases
                    .entry(cell.clone())
                    .or_insert_with(|| old_value.clone())
                    .clone()
            } else {
                bases.remove(&cell).unwrap_or_else(|| old_value.clone())
            }
        };

        if inner
            .store
            .set_field(stored.handle, field, applied_value.clone())?
            .is_none()
        {
            inner.bases.lock().remove(&cell);
            return Ok(rolled_back(EditError::RowNotFound { id: Some(row_id) }, &base));
        }

        let job = self.write_job(cell.clone(), applied_value.clone());
        let result = if live {
            debug!(%edit_id, row_id = %row_id, field, "write scheduled");
            match inner.scheduler.schedule(cell.clone(), job).await {
                Ok(Dispatch::Completed(result)) => result,
                Ok(Dispatch::Superseded) => {
                    debug!(%edit_id, row_id = %row_id, field, "write superseded");
                    return Ok(EditOutcome::Superseded);
                }
                Ok(Dispatch::Cancelled) | Err(_) => {
                    inner.bases.lock().remove(&cell);
                    self.revert(&identity, stored.handle, spec, &applied, &base)?;
                    info!(%edit_id, row_id = %row_id, field, "pending write cancelled");
                    return Ok(rolled_back(
                        EditError::Cancelled {
                            field: field.to_string(),
                        },
                        &base,
                    ));
                }
            }
        } else {
            inner.scheduler.run_now(cell.clone(), job).await
        };

        match result {
            Ok(()) => {
                inner.suppression.mark_self_write();
                if record_history && spec.canonical_form(&base) != applied {
                    inner.undo.lock().push(UndoEntry {
                        target: identity,
                        field: field.to_string(),
                        previous_value: base,
                        new_value: applied_value.clone(),
                    });
                }
                info!(%edit_id, row_id = %row_id, field, value = %applied, "edit committed");
                Ok(EditOutcome::Committed {
                    applied: applied_value,
                    network: true,
                })
            }
            Err(err) => {
                warn!(%edit_id, row_id = %row_id, field, error = %err, "write failed, rolling back");
                self.revert(&identity, stored.handle, spec, &applied, &base)?;
                let error = EditError::PersistenceFailed {
                    field: field.to_string(),
                    message: err.to_string(),
                };
                inner.notifier.alert(&error.to_string());
                Ok(rolled_back(error, &base))
            }
        }
    }

    /// The outbound write for one cell. Firing it closes the cell's current
    /// burst, so the next edit starts a new one.
    fn write_job(&self, cell: CellKey, value: FieldValue) -> Job<WriteResult> {
        let inner = Arc::clone(&self.inner);
        Box::pin(async move {
            inner.bases.lock().remove(&cell);
            let request = MutationRequest {
                id: cell.row_id,
                field: cell.field,
                value,
            };
            inner
                .remote
                .persist(&request)
                .await
                .and_then(MutationResponse::into_result)
        })
    }

    /// Put `base` back, but only if the cell still shows what this edit
    /// wrote. A newer edit or push wins.
    fn revert(
        &self,
        identity: &RowIdentity,
        handle: RowHandle,
        spec: &FieldSpec,
        applied: &str,
        base: &FieldValue,
    ) -> Result<bool, EngineError> {
        let inner = &self.inner;
        let handle = match inner.store.get(handle)? {
            Some(_) => handle,
            None => match locate(inner.store.as_ref(), inner.schema.strict_key(), identity)?
                .into_found()
            {
                Some(stored) => stored.handle,
                None => return Ok(false),
            },
        };
        let reverted = inner.store.modify_field(handle, spec.name(), &mut |current| {
            (spec.canonical_form(current) == applied).then(|| base.clone())
        })?;
        Ok(reverted.is_some())
    }

    // ========================================================================
    // Pending writes
    // ========================================================================

    /// Send the cell's pending write now and wait for it (cell blur).
    pub async fn flush(&self, row_id: RowId, field: &str) -> bool {
        self.inner.scheduler.flush(&CellKey::new(row_id, field)).await
    }

    /// Send every pending write now and wait for all of them (view unmount).
    pub async fn flush_all(&self) -> usize {
        let fired = self.inner.scheduler.flush_all().await;
        if fired > 0 {
            debug!(fired, "flushed pending writes");
        }
        fired
    }

    /// Drop the cell's pending write. Its edit rolls back.
    pub fn cancel(&self, row_id: RowId, field: &str) -> bool {
        self.inner.scheduler.cancel(&CellKey::new(row_id, field))
    }

    // ========================================================================
    // Undo
    // ========================================================================

    /// Reverse the most recent committed edit by replaying it backwards.
    pub async fn undo(&self) -> Result<UndoOutcome, EngineError> {
        let popped = self.inner.undo.lock().pop();
        let Some(entry) = popped else {
            return Ok(UndoOutcome::Empty);
        };

        let resolution = match locate(
            self.inner.store.as_ref(),
            self.inner.schema.strict_key(),
            &entry.target,
        ) {
            Ok(resolution) => resolution,
            Err(e) => {
                self.inner.undo.lock().restore(entry);
                return Err(e.into());
            }
        };
        let Some(stored) = resolution.into_found() else {
            warn!(field = %entry.field, target = ?entry.target, "undo target not found");
            self.inner.undo.lock().restore(entry);
            self.inner
                .notifier
                .alert("The row for the last change could not be found; nothing was undone.");
            return Ok(UndoOutcome::RowNotFound);
        };

        let field = entry.field.clone();
        let request = EditRequest {
            row: stored.row,
            field: field.clone(),
            old_value: entry.new_value.clone(),
            new_value: entry.previous_value.clone(),
            live: Some(false),
            origin: Origin::UndoReplay(entry),
        };
        Ok(match self.submit_edit(request).await? {
            EditOutcome::Committed { applied, .. } => UndoOutcome::Applied(applied),
            EditOutcome::RolledBack { error, .. } => UndoOutcome::Failed(error),
            EditOutcome::Superseded => UndoOutcome::Failed(EditError::Cancelled { field }),
        })
    }

    // ========================================================================
    // Push channel
    // ========================================================================

    /// Apply an inbound notification to the dataset, unless it is our own
    /// echo or cannot be applied in place.
    pub fn handle_push(&self, event: &PushEvent) -> Result<PushDisposition, EngineError> {
        let inner = &self.inner;
        let Some(update) = event.field_update() else {
            debug!("unrecognized push, reload required");
            return Ok(PushDisposition::ReloadRequired);
        };
        if inner.suppression.is_suppressed() {
            debug!(row_id = %update.id, field = %update.field, "push suppressed as own echo");
            return Ok(PushDisposition::Suppressed);
        }
        if inner.schema.field(&update.field).is_none() {
            return Ok(PushDisposition::ReloadRequired);
        }
        let Some(stored) = inner.store.find_by_id(update.id)? else {
            debug!(row_id = %update.id, "push for unknown row, reload required");
            return Ok(PushDisposition::ReloadRequired);
        };

        let wanted = update.value.normalize();
        let changed = inner
            .store
            .modify_field(stored.handle, &update.field, &mut |current| {
                (current.normalize() != wanted).then(|| update.value.clone())
            })?;
        Ok(match changed {
            Some(_) => {
                debug!(row_id = %update.id, field = %update.field, "push applied");
                PushDisposition::Applied
            }
            None => PushDisposition::Unchanged,
        })
    }
}

fn rolled_back(error: EditError, restored: &FieldValue) -> EditOutcome {
    EditOutcome::RolledBack {
        error,
        restored: restored.clone(),
    }
}
