use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use crate::error::AnalysisError;

/// Shared cancellation flag for one analysis run.
///
/// Clones observe the same flag, so a caller can hand one clone to the run and
/// keep another to trigger a reset from a different thread. The engine checks
/// it between row chunks, between sources, and before each inference phase.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    pub(crate) fn check(&self) -> Result<(), AnalysisError> {
        if self.is_cancelled() {
            Err(AnalysisError::Cancelled)
        } else {
            Ok(())
        }
    }
}
