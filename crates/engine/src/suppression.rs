use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ordersync_core::Clock;

const NEVER: u64 = u64::MAX;

/// Window after a confirmed local write during which inbound field pushes are
/// taken to be our own echo. A new write restarts the window; marks do not
/// stack.
pub struct EchoSuppression {
    clock: Arc<dyn Clock>,
    window_ms: u64,
    mark: AtomicU64,
}

impl EchoSuppression {
    pub fn new(clock: Arc<dyn Clock>, window_ms: u64) -> Self {
        Self {
            clock,
            window_ms,
            mark: AtomicU64::new(NEVER),
        }
    }

    pub fn mark_self_write(&self) {
        self.mark.store(self.clock.now_ms(), Ordering::SeqCst);
    }

    pub fn is_suppressed(&self) -> bool {
        let mark = self.mark.load(Ordering::SeqCst);
        if mark == NEVER {
            return false;
        }
        self.clock.now_ms().saturating_sub(mark) < self.window_ms
    }

    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }
}
