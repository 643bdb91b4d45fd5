//! FIFO-group coordinator (component G): drives the three [`PortMessageFifo`]
//! instances (ICM/MCM/RCM) through one combined synchronization lifecycle and
//! owns the retry budget/timeout for the handshake (`spec.md` §4.G).

use crate::events::{group as bits, EventBits};
use crate::fifo::{PortMessageFifo, SyncEvent};
use log::{info, warn};

/// Combined sync state of the group, distinct from any one FIFO's own
/// [`crate::fifo::SyncState`] — the group is `SYNCED` only once every member is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupState {
    Unsynced,
    Syncing,
    Synced,
    Unsyncing,
}

/// What the caller should tell the application layer happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupNotification {
    SyncEstablished,
    SyncFailed,
    SyncLost,
}

/// Coordinates a fixed trio of FIFOs through a single sync/unsync handshake,
/// retrying on a timer until either every member reports `SYNCED` or the
/// retry budget is exhausted.
pub struct FifoGroup {
    state: GroupState,
    retry_interval_ms: u32,
    retry_budget: u8,
    retries_used: u8,
    elapsed_ms: u32,
    force_next: bool,
    pub events: EventBits,
    last_notification: Option<GroupNotification>,
}

impl FifoGroup {
    pub fn new(retry_interval_ms: u32, retry_budget: u8) -> Self {
        Self {
            state: GroupState::Unsynced,
            retry_interval_ms,
            retry_budget,
            retries_used: 0,
            elapsed_ms: 0,
            force_next: false,
            events: EventBits::new(),
            last_notification: None,
        }
    }

    pub fn state(&self) -> GroupState {
        self.state
    }

    pub fn take_notification(&mut self) -> Option<GroupNotification> {
        self.last_notification.take()
    }

    /// Begin synchronizing all three FIFOs. `force` re-arms even if already
    /// synced (used after an external reset-counter bump).
    pub fn synchronize(&mut self, members: [&mut PortMessageFifo; 3], force: bool) {
        if self.state == GroupState::Synced && !force {
            return;
        }
        self.state = GroupState::Syncing;
        self.retries_used = 0;
        self.elapsed_ms = 0;
        self.force_next = force;
        for fifo in members {
            fifo.synchronize();
        }
    }

    pub fn unsynchronize(&mut self, members: [&mut PortMessageFifo; 3]) {
        self.state = GroupState::Unsyncing;
        for fifo in members {
            fifo.unsynchronize();
        }
    }

    /// Called once per retry-timer tick (default every `sync_retry_interval_ms`).
    /// Re-sends the sync command to every member still unsynced, bounded by
    /// the configured retry budget.
    pub fn on_retry_tick(&mut self, members: [&mut PortMessageFifo; 3]) {
        self.events.take(bits::RETRY_TICK);
        if self.state != GroupState::Syncing {
            return;
        }
        self.elapsed_ms = self.elapsed_ms.saturating_add(self.retry_interval_ms);
        if self.retries_used >= self.retry_budget {
            warn!("fifo group: sync retry budget exhausted");
            self.state = GroupState::Unsynced;
            self.last_notification = Some(GroupNotification::SyncFailed);
            return;
        }
        self.retries_used += 1;
        for fifo in members {
            if !fifo.is_synced() {
                fifo.synchronize();
            }
        }
    }

    /// Called after any member's `take_sync_event` produced something: checks
    /// whether the whole trio is now synced, partially desynced, or cleanly
    /// unsynced, and updates `state` accordingly.
    pub fn on_member_event(&mut self, members: &[&PortMessageFifo; 3], event: SyncEvent) {
        self.events.take(bits::MEMBER_STATE_CHANGED);
        match event {
            SyncEvent::Synced => {
                if members.iter().all(|f| f.is_synced()) {
                    self.state = GroupState::Synced;
                    self.last_notification = Some(GroupNotification::SyncEstablished);
                    info!("fifo group: all members synced");
                }
            }
            SyncEvent::Desynced => {
                if self.state == GroupState::Synced {
                    self.state = GroupState::Unsynced;
                    self.last_notification = Some(GroupNotification::SyncLost);
                }
            }
            SyncEvent::UnsyncCompleted => {
                if members.iter().all(|f| !f.is_synced()) && self.state == GroupState::Unsyncing {
                    self.state = GroupState::Unsynced;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FifoProfile;
    use crate::fifo::IncomingStatus;
    use crate::pmp::{FifoId, StatusType};

    fn member(id: FifoId) -> PortMessageFifo {
        PortMessageFifo::new(id, FifoProfile::CONVENTIONAL_DEFAULT)
    }

    #[test]
    fn synchronize_moves_to_syncing_and_arms_all_members() {
        let mut group = FifoGroup::new(50, 40);
        let mut icm = member(FifoId::Icm);
        let mut mcm = member(FifoId::Mcm);
        let mut rcm = member(FifoId::Rcm);
        group.synchronize([&mut icm, &mut mcm, &mut rcm], false);
        assert_eq!(group.state(), GroupState::Syncing);
        assert_eq!(icm.sync_state, crate::fifo::SyncState::Syncing);
    }

    #[test]
    fn retry_budget_exhaustion_fails_the_group() {
        let mut group = FifoGroup::new(50, 2);
        let mut icm = member(FifoId::Icm);
        let mut mcm = member(FifoId::Mcm);
        let mut rcm = member(FifoId::Rcm);
        group.synchronize([&mut icm, &mut mcm, &mut rcm], false);
        group.on_retry_tick([&mut icm, &mut mcm, &mut rcm]);
        group.on_retry_tick([&mut icm, &mut mcm, &mut rcm]);
        group.on_retry_tick([&mut icm, &mut mcm, &mut rcm]);
        assert_eq!(group.state(), GroupState::Unsynced);
        assert_eq!(group.take_notification(), Some(GroupNotification::SyncFailed));
    }

    #[test]
    fn all_members_synced_reports_sync_established() {
        let mut group = FifoGroup::new(50, 40);
        let mut icm = member(FifoId::Icm);
        let mut mcm = member(FifoId::Mcm);
        let mut rcm = member(FifoId::Rcm);
        group.synchronize([&mut icm, &mut mcm, &mut rcm], false);
        for fifo in [&mut icm, &mut mcm, &mut rcm] {
            fifo.on_status(
                &[],
                IncomingStatus {
                    sid: 1,
                    status_type: StatusType::Synced,
                    status_code: None,
                    sync_payload: Some([5, 0, 4, 10]),
                    failure_code: None,
                },
            );
        }
        group.on_member_event(&[&icm, &mcm, &rcm], SyncEvent::Synced);
        assert_eq!(group.state(), GroupState::Synced);
        assert_eq!(
            group.take_notification(),
            Some(GroupNotification::SyncEstablished)
        );
    }
}
