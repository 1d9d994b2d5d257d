//! Cooperative cancellation for long-running fits and simulations

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Error, Result};

/// Shared flag checked between optimizer iterations, estimator rows and
/// simulation steps. Never checked inside a linear solve.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// `Err(Cancelled)` once [`cancel`](Self::cancel) has been called.
    pub fn check(&self, stage: &'static str) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled { stage })
        } else {
            Ok(())
        }
    }
}

/// Check an optional token; `None` never cancels.
pub fn check_cancelled(token: Option<&CancelToken>, stage: &'static str) -> Result<()> {
    token.map_or(Ok(()), |t| t.check(stage))
}
