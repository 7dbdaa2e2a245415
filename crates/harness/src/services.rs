use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use ordersync_engine::{
    MutationRequest, MutationResponse, MutationService, Notifier, PromotionBatch,
    PromotionService, RemoteError,
};

type Scripted = Result<MutationResponse, RemoteError>;

/// Backend double for single-field writes. Answers `ok` unless a response
/// has been scripted; scripted responses are used once each, in order.
#[derive(Default)]
pub struct MockMutationService {
    requests: Mutex<Vec<MutationRequest>>,
    script: Mutex<VecDeque<Scripted>>,
    latency: Mutex<Option<Duration>>,
}

impl MockMutationService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every request received, in arrival order.
    pub fn requests(&self) -> Vec<MutationRequest> {
        self.requests.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn respond_with(&self, response: Scripted) {
        self.script.lock().push_back(response);
    }

    /// Next write comes back `{ok: false, mensaje}`.
    pub fn reject_next(&self, message: &str) {
        self.respond_with(Ok(MutationResponse::rejected(message)));
    }

    pub fn fail_next_transport(&self, message: &str) {
        self.respond_with(Err(RemoteError::Transport(message.to_string())));
    }

    /// Every write takes this long to answer.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }
}

#[async_trait]
impl MutationService for MockMutationService {
    async fn persist(&self, request: &MutationRequest) -> Result<MutationResponse, RemoteError> {
        self.requests.lock().push(request.clone());
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        let scripted = self.script.lock().pop_front();
        scripted.unwrap_or_else(|| Ok(MutationResponse::ok()))
    }
}

/// Backend double for batch inserts.
#[derive(Default)]
pub struct MockPromotionService {
    batches: Mutex<Vec<PromotionBatch>>,
    script: Mutex<VecDeque<Scripted>>,
}

impl MockPromotionService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> Vec<PromotionBatch> {
        self.batches.lock().clone()
    }

    pub fn reject_next(&self, message: &str) {
        self.script
            .lock()
            .push_back(Ok(MutationResponse::rejected(message)));
    }
}

#[async_trait]
impl PromotionService for MockPromotionService {
    async fn insert(&self, batch: &PromotionBatch) -> Result<MutationResponse, RemoteError> {
        self.batches.lock().push(batch.clone());
        let scripted = self.script.lock().pop_front();
        scripted.unwrap_or_else(|| Ok(MutationResponse::ok()))
    }
}

/// Keeps every alert for assertions.
#[derive(Default)]
pub struct RecordingNotifier {
    alerts: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<String> {
        self.alerts.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.lock().is_empty()
    }
}

impl Notifier for RecordingNotifier {
    fn alert(&self, message: &str) {
        self.alerts.lock().push(message.to_string());
    }
}
