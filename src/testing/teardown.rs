//! Guaranteed destroy after apply
//!
//! A `Teardown` is armed right after `init` succeeds in an apply scenario.
//! The runner consumes it with [`Teardown::run`] on every exit path. If the
//! guard is dropped while still armed (a panicking test, a cancelled
//! future) it destroys synchronously instead.

use crate::common::Result;
use crate::tool::{Executor, Tool};

pub struct Teardown<'a, E: Executor> {
    tool: &'a Tool<E>,
    armed: bool,
}

impl<'a, E: Executor> Teardown<'a, E> {
    pub fn arm(tool: &'a Tool<E>) -> Self {
        Self { tool, armed: true }
    }

    /// Destroy now and disarm the drop fallback
    ///
    /// The guard stays armed until `destroy` returns, so cancelling this
    /// future part-way still destroys from `Drop`.
    pub async fn run(mut self) -> Result<()> {
        tracing::info!(
            dir = %self.tool.options().working_dir().display(),
            "Destroying scenario resources"
        );
        let result = self.tool.destroy().await;
        self.armed = false;
        result.map(|_| ())
    }
}

impl<E: Executor> Drop for Teardown<'_, E> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        tracing::warn!(
            dir = %self.tool.options().working_dir().display(),
            "Teardown dropped before running, destroying synchronously"
        );
        if let Err(e) = self.tool.destroy_blocking() {
            tracing::error!("Fallback destroy failed, resources may be orphaned: {e}");
        }
    }
}
