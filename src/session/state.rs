//! Process-wide session state and the pending-transfers queue.
//!
//! The last ACS cookie and cached Digest challenge are *not* kept here:
//! they live inside `transport::AcsClient`, which the session engine
//! destroys and replaces on every close — the same reset cadence their
//! lifetime follows, so housing them on the agent rather than threading
//! them through every call keeps the lifetime identical without widening
//! this struct's surface.

use std::collections::VecDeque;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::protocols::cwmp::TransferRecord;

/// The device's session-related state, minus cookie/digest (see module
/// doc).
pub struct SessionState {
    /// `true` while a session is in progress.
    session_active: bool,
    pub pending_inform: bool,
    pub accept_connections: bool,
    pub pending_reboot: bool,
    pub firmware_upgrade: bool,
    pub transfer_complete_session: bool,
    pub download_in_progress: bool,
    pub active_download_cancel: Option<CancellationToken>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            session_active: false,
            pending_inform: false,
            accept_connections: true,
            pending_reboot: false,
            firmware_upgrade: false,
            transfer_complete_session: false,
            download_in_progress: false,
            active_download_cancel: None,
        }
    }
}

impl SessionState {
    pub fn is_session_active(&self) -> bool {
        self.session_active
    }

    /// Clears `pendingInform` and marks a session active.
    pub fn enter_session(&mut self) {
        self.session_active = true;
        self.pending_inform = false;
    }

    /// Marks the session closed; the caller is responsible for arming the
    /// next periodic-inform timer.
    pub fn leave_session(&mut self) {
        self.session_active = false;
    }
}

/// FIFO of pending `TransferComplete` records, drained one per session by
/// the next Inform or cpeRequest phase.
#[derive(Default)]
pub struct TransferQueue(Mutex<VecDeque<TransferRecord>>);

impl TransferQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, record: TransferRecord) {
        self.0.lock().await.push_back(record);
    }

    pub async fn pop(&self) -> Option<TransferRecord> {
        self.0.lock().await.pop_front()
    }

    pub async fn is_empty(&self) -> bool {
        self.0.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state_has_no_active_session() {
        let state = SessionState::default();
        assert!(!state.is_session_active());
        assert!(state.accept_connections);
    }

    #[test]
    fn enter_then_leave_session_toggles_activity_and_clears_pending() {
        let mut state = SessionState::default();
        state.pending_inform = true;
        state.enter_session();
        assert!(state.is_session_active());
        assert!(!state.pending_inform);
        state.leave_session();
        assert!(!state.is_session_active());
    }

    #[tokio::test]
    async fn transfer_queue_is_first_in_first_out() {
        let queue = TransferQueue::new();
        queue.push(TransferRecord::success("a", "t0", "t1")).await;
        queue.push(TransferRecord::success("b", "t0", "t1")).await;
        let first = queue.pop().await.unwrap();
        assert_eq!(first.command_key, "a");
        assert!(!queue.is_empty().await);
    }
}
