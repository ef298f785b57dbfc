use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{FlatError, Result};

/// Cloneable cancellation handle shared between the caller and the run.
///
/// Checked at frame and group boundaries, never in inner pixel loops.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Return `Err(Cancelled)` once cancellation has been requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(FlatError::Cancelled)
        } else {
            Ok(())
        }
    }
}
