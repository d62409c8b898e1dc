//! Cooperative shutdown signal.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Single-writer/many-reader shutdown signal, passed to workers by value.
///
/// Workers finish their current blob and observe the token before taking
/// more work; nothing is pre-empted.
#[derive(Clone, Debug, Default)]
pub struct ShutdownToken {
    flag: Arc<AtomicBool>,
}

impl ShutdownToken {
    /// Untriggered token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown. Idempotent.
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Whether shutdown has been requested.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}
