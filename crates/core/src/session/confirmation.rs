use std::fmt::{self, Debug};

use tokio::sync::mpsc;

use super::state::Command;
use crate::thread::Confirmed;

/// A pending thread deletion, waiting for the user to confirm it.
///
/// Dropping it without calling [`DeleteConfirmation::confirm`] cancels the
/// deletion.
#[must_use = "the thread is only deleted once confirmed"]
pub struct DeleteConfirmation {
    thread_id: String,
    cmd_tx: Option<mpsc::WeakUnboundedSender<Command>>,
}

impl DeleteConfirmation {
    #[inline]
    pub(super) fn new(
        thread_id: String,
        cmd_tx: mpsc::WeakUnboundedSender<Command>,
    ) -> Self {
        Self {
            thread_id,
            cmd_tx: Some(cmd_tx),
        }
    }

    /// Returns the thread to be deleted.
    #[inline]
    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    /// Confirms the deletion.
    pub fn confirm(mut self) {
        let Some(cmd_tx) = self.cmd_tx.take().and_then(|tx| tx.upgrade())
        else {
            warn!("the session has been closed, cannot delete");
            return;
        };
        cmd_tx
            .send(Command::DeleteThread {
                thread_id: std::mem::take(&mut self.thread_id),
                confirmed: Confirmed::new(),
            })
            .ok();
    }

    /// Cancels the deletion.
    #[inline]
    pub fn cancel(self) {}
}

impl Debug for DeleteConfirmation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeleteConfirmation")
            .field("thread_id", &self.thread_id)
            .finish_non_exhaustive()
    }
}

impl Drop for DeleteConfirmation {
    fn drop(&mut self) {
        if self.cmd_tx.is_some() {
            debug!("deletion of {} cancelled", self.thread_id);
        }
    }
}
