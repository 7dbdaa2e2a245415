use std::sync::Arc;

use ordersync_core::{FieldValue, ManualClock, Role, Row, RowId, Schema};
use ordersync_engine::{
    EditOutcome, EditRequest, Engine, EngineConfig, Promoter, PushDisposition, PushEvent,
};
use ordersync_storage::{MemoryRowStore, RowStore};

use crate::services::{MockMutationService, MockPromotionService, RecordingNotifier};

pub type HarnessResult<T> = Result<T, Box<dyn std::error::Error>>;

/// A parts-order row with the two strict-key fields set.
pub fn order_row(id: Option<i64>, pedido: &str, item: &str) -> Row {
    Row::with_fields(id.map(RowId::new), [("PEDIDO", pedido), ("ITEM", item)])
}

/// Let spawned edits run up to their first real suspension point.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

/// One simulated operator session: an engine over an in-memory dataset with
/// scripted backend doubles and a hand-driven suppression clock.
pub struct TestClient {
    pub engine: Engine,
    pub store: Arc<dyn RowStore>,
    pub remote: Arc<MockMutationService>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: Arc<ManualClock>,
}

impl TestClient {
    pub fn new(role: Role, rows: Vec<Row>) -> Self {
        Self::with_config(role, rows, EngineConfig::default())
    }

    pub fn with_config(role: Role, rows: Vec<Row>, config: EngineConfig) -> Self {
        Self::with_store(role, Arc::new(MemoryRowStore::with_rows(rows)), config)
    }

    /// Same session over a caller-supplied store, e.g. a SQLite one.
    pub fn with_store(role: Role, store: Arc<dyn RowStore>, config: EngineConfig) -> Self {
        let remote = Arc::new(MockMutationService::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let clock = Arc::new(ManualClock::new(1_000_000));
        let engine = Engine::builder(Arc::clone(&store), remote.clone())
            .role(role)
            .notifier(notifier.clone())
            .clock(clock.clone())
            .config(config)
            .build();
        Self {
            engine,
            store,
            remote,
            notifier,
            clock,
        }
    }

    pub fn supervisor(rows: Vec<Row>) -> Self {
        Self::new(Role::Supervisor, rows)
    }

    /// Current copy of the row with `id`.
    pub fn row(&self, id: i64) -> HarnessResult<Row> {
        match self.store.find_by_id(RowId::new(id))? {
            Some(stored) => Ok(stored.row),
            None => Err(format!("no row {id} in test store").into()),
        }
    }

    pub fn value(&self, id: i64, field: &str) -> HarnessResult<FieldValue> {
        Ok(self.row(id)?.get(field))
    }

    /// Edit a cell the way the grid does: old value is whatever it shows now.
    pub fn request(
        &self,
        id: i64,
        field: &str,
        new_value: impl Into<FieldValue>,
    ) -> HarnessResult<EditRequest> {
        let row = self.row(id)?;
        let old = row.get(field);
        Ok(EditRequest::new(row, field, old, new_value))
    }

    pub async fn edit(
        &self,
        id: i64,
        field: &str,
        new_value: impl Into<FieldValue>,
    ) -> HarnessResult<EditOutcome> {
        let request = self.request(id, field, new_value)?;
        Ok(self.engine.submit_edit(request).await?)
    }

    pub fn push_json(&self, text: &str) -> HarnessResult<PushDisposition> {
        let event = PushEvent::parse(text)?;
        Ok(self.engine.handle_push(&event)?)
    }

    /// A promoter over its own staging store, sharing this client's notifier.
    pub fn promoter(
        &self,
        staging: Vec<Row>,
    ) -> (Promoter, Arc<MockPromotionService>, Arc<dyn RowStore>) {
        let staging: Arc<dyn RowStore> = Arc::new(MemoryRowStore::with_rows(staging));
        let (promoter, service) = self.promoter_over(Arc::clone(&staging));
        (promoter, service, staging)
    }

    pub fn promoter_over(&self, staging: Arc<dyn RowStore>) -> (Promoter, Arc<MockPromotionService>) {
        let service = Arc::new(MockPromotionService::new());
        let promoter = Promoter::new(
            Arc::new(Schema::parts_orders()),
            staging,
            service.clone(),
            self.notifier.clone(),
        );
        (promoter, service)
    }
}
