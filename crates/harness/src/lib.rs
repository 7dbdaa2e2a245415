pub mod client;
pub mod services;
pub mod store;

pub use client::{HarnessResult, TestClient, order_row, settle};
pub use ordersync_core::ManualClock;
pub use services::{MockMutationService, MockPromotionService, RecordingNotifier};
pub use store::FlakyRowStore;
