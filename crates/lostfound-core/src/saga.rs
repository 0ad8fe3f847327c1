//! Compensating actions for multi-step operations.
//!
//! Each step with an external side effect registers an undo action. On
//! failure the actions run in reverse registration order; on success
//! [`Saga::commit`] discards them.

use futures::future::BoxFuture;
use tracing::{debug, warn};

type Compensation = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), String>> + Send>;

/// Ordered list of undo actions for one operation.
pub struct Saga {
    name: String,
    compensations: Vec<(String, Compensation)>,
}

impl Saga {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            compensations: Vec::new(),
        }
    }

    /// Register the undo action for a step that just succeeded.
    pub fn register<F>(&mut self, step: impl Into<String>, undo: F)
    where
        F: FnOnce() -> BoxFuture<'static, Result<(), String>> + Send + 'static,
    {
        self.compensations.push((step.into(), Box::new(undo)));
    }

    /// Number of pending compensations.
    pub fn pending(&self) -> usize {
        self.compensations.len()
    }

    /// Keep all side effects.
    pub fn commit(mut self) {
        debug!("{}: committed {} steps", self.name, self.compensations.len());
        self.compensations.clear();
    }

    /// Undo every registered step, newest first.
    ///
    /// Returns the steps whose compensation failed. Failures are logged and
    /// do not stop the remaining compensations.
    pub async fn unwind(mut self) -> Vec<String> {
        let mut failed = Vec::new();
        while let Some((step, undo)) = self.compensations.pop() {
            match undo().await {
                Ok(()) => debug!("{}: compensated {}", self.name, step),
                Err(e) => {
                    warn!("{}: compensation for {} failed: {}", self.name, step, e);
                    failed.push(step);
                }
            }
        }
        failed
    }
}
