//! Port Message FIFO (PMF): a stop-and-wait, credit-based reliable
//! sub-channel with a synchronization handshake, watchdog, mid-stream
//! cancel semantics, and segmented-retry support (`spec.md` §4.E, §4.F).
//! Three instances run in parallel (ICM/MCM/RCM), coordinated by
//! [`crate::fifo_group::FifoGroup`].
//!
//! The FIFO does not own telegram storage itself: Tx/Rx message objects
//! live in slabs the caller passes into each service call, and the FIFO
//! keeps only [`crate::pool::IntrusiveList`] indices into them — the same
//! "arena + index, borrowed slab" shape component A establishes.

use crate::config::FifoProfile;
use crate::events::{pmf as bits, EventBits};
use crate::message::CMessage;
use crate::pmp::{CommandCode, CommandType, FailureCode, FifoId, StatusCode, StatusType};
use crate::pool::IntrusiveList;
use log::{debug, warn};

/// FIFO synchronization state (`spec.md` §3 "FIFO state").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    UnsyncedInit,
    Syncing,
    UnsyncedBusy,
    UnsyncedReady,
    Synced,
    Unsyncing,
}

/// A notification a FIFO raises for its group coordinator to observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncEvent {
    Synced,
    Desynced,
    UnsyncCompleted,
}

/// A decoded incoming FIFO status (SID, type, code).
#[derive(Debug, Clone, Copy)]
pub struct IncomingStatus {
    pub sid: u8,
    pub status_type: StatusType,
    pub status_code: Option<StatusCode>,
    /// Present only on a `SYNCED` status: the four sync-reply payload bytes.
    pub sync_payload: Option<[u8; 4]>,
    /// Present only on a `StatusType::Failure` status: the extended failure
    /// code. `None` covers both "absent" and an unrecognized wire value.
    pub failure_code: Option<FailureCode>,
}

/// One of the four pre-embedded short command objects (component E). Only
/// one instance of a kind can be in flight; `reserve` is a single-owner
/// acquire, `set_trigger` defers the actual transmit to the next service tick.
#[derive(Debug, Default)]
pub struct Command {
    buf: [u8; 10],
    reserved: bool,
    trigger: bool,
}

impl Command {
    pub const fn new() -> Self {
        Self {
            buf: [0; 10],
            reserved: false,
            trigger: false,
        }
    }

    /// Acquire exclusive use of this command object. `false` if already in flight.
    pub fn reserve(&mut self) -> bool {
        if self.reserved {
            false
        } else {
            self.reserved = true;
            true
        }
    }

    pub fn set_trigger(&mut self) {
        self.trigger = true;
    }

    pub fn take_trigger(&mut self) -> bool {
        core::mem::take(&mut self.trigger)
    }

    pub fn release(&mut self) {
        self.reserved = false;
        self.trigger = false;
    }

    pub fn is_reserved(&self) -> bool {
        self.reserved
    }

    pub fn buf_mut(&mut self) -> &mut [u8; 10] {
        &mut self.buf
    }

    pub fn buf(&self) -> &[u8; 10] {
        &self.buf
    }
}

/// Small reserved pool of LLD Tx handles used only for data messages
/// (component E). Commands carry their own handle inside [`Command`].
#[derive(Debug)]
pub struct TxHandlePool {
    available: u8,
    capacity: u8,
}

impl TxHandlePool {
    pub const fn new(capacity: u8) -> Self {
        Self {
            available: capacity,
            capacity,
        }
    }

    pub fn checkout(&mut self) -> bool {
        if self.available == 0 {
            false
        } else {
            self.available -= 1;
            true
        }
    }

    pub fn release(&mut self) {
        debug_assert!(self.available < self.capacity, "handle over-release");
        self.available += 1;
    }

    pub fn available(&self) -> u8 {
        self.available
    }
}

/// Per-FIFO idle watchdog: probes the INIC with `REQUEST_STATUS` after
/// `profile.tx_wd_periods` idle ticks; a second miss means link loss.
#[derive(Debug, Default)]
struct Watchdog {
    idle_ticks: u32,
    misses: u8,
    armed: bool,
}

impl Watchdog {
    fn reset(&mut self) {
        self.idle_ticks = 0;
        self.misses = 0;
        self.armed = true;
    }

    fn stop(&mut self) {
        self.armed = false;
        self.idle_ticks = 0;
        self.misses = 0;
    }

    /// Returns `true` if a probe should fire this tick, `true` with
    /// `link_lost` set if two consecutive misses elapsed.
    fn on_tick(&mut self, threshold: u32) -> (bool, bool) {
        if !self.armed {
            return (false, false);
        }
        self.idle_ticks += 1;
        if self.idle_ticks >= threshold {
            self.idle_ticks = 0;
            self.misses += 1;
            if self.misses >= 2 {
                return (false, true);
            }
            return (true, false);
        }
        (false, false)
    }

    fn on_status_seen(&mut self) {
        self.idle_ticks = 0;
        self.misses = 0;
    }
}

/// Tx-side bookkeeping.
struct TxState {
    waiting: IntrusiveList,
    pending: IntrusiveList,
    credits: u8,
    sid_next_to_use: u8,
    sid_last_completed: u8,
    last_applied_diff: u8,
    current_sid: u8,
    current_type: Option<StatusType>,
    current_code: Option<StatusCode>,
    cancel_all_running: bool,
    /// Extended failure code of the most recent unresolved `FAILURE` status,
    /// stashed here until the implicit `CANCELED`/`CANCEL_ALL` completion
    /// that follows it can read it back.
    pending_failure_code: Option<FailureCode>,
    handles: TxHandlePool,
    /// Number of head-of-`pending` messages the next `apply_tx_status`
    /// should drain, and what to complete them with. Set by `on_status`,
    /// consumed by `apply_tx_status` — the FIFO only holds indices, so the
    /// actual slab-touching drain has to happen in a call that receives one.
    pending_drain: u8,
    pending_drain_completion: TxCompletion,
}

impl TxState {
    fn new() -> Self {
        Self {
            waiting: IntrusiveList::new(),
            pending: IntrusiveList::new(),
            credits: 0,
            sid_next_to_use: 0,
            sid_last_completed: 0,
            last_applied_diff: 0,
            current_sid: 0,
            current_type: None,
            current_code: None,
            cancel_all_running: false,
            pending_failure_code: None,
            handles: TxHandlePool::new(5),
            pending_drain: 0,
            pending_drain_completion: TxCompletion::Ok,
        }
    }

    /// SID validity test from `spec.md` §4.F.
    fn sid_is_valid(&self, sid: u8) -> bool {
        let diff = sid.wrapping_sub(self.sid_last_completed);
        let sent_unacked = self.sid_next_to_use.wrapping_sub(self.sid_last_completed);
        diff > self.last_applied_diff && diff <= sent_unacked
    }
}

/// Rx-side bookkeeping.
struct RxState {
    expected_sid: u8,
    busy_count: u8,
    ack_threshold: u8,
    last_ok_sid: u8,
    status_in_flight: bool,
}

impl RxState {
    fn new(ack_threshold: u8) -> Self {
        Self {
            expected_sid: 0,
            busy_count: 0,
            ack_threshold,
            last_ok_sid: 0,
            status_in_flight: false,
        }
    }
}

/// Completion status handed to a Tx message's completion callback, folded
/// across every segment of an AppMsg by the AMS layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxCompletion {
    Ok,
    /// Carries the extended failure code that triggered the cancel, if one
    /// was observed (a bare `cancel_all()` call with no preceding `FAILURE`
    /// status leaves this `None`).
    Canceled(Option<FailureCode>),
    SyncLost,
}

/// One Port Message FIFO instance.
pub struct PortMessageFifo {
    pub id: FifoId,
    pub sync_state: SyncState,
    tx: TxState,
    rx: RxState,
    sync_cmd: Command,
    request_status_cmd: Command,
    cancel_cmd: Command,
    unsync_cmd: Command,
    watchdog: Watchdog,
    profile: FifoProfile,
    pub events: EventBits,
    last_sync_event: Option<SyncEvent>,
}

impl PortMessageFifo {
    pub fn new(id: FifoId, profile: FifoProfile) -> Self {
        Self {
            id,
            sync_state: SyncState::UnsyncedInit,
            tx: TxState::new(),
            rx: RxState::new(profile.rx_ack_threshold),
            sync_cmd: Command::new(),
            request_status_cmd: Command::new(),
            cancel_cmd: Command::new(),
            unsync_cmd: Command::new(),
            watchdog: Watchdog::default(),
            profile,
            events: EventBits::new(),
            last_sync_event: None,
        }
    }

    pub fn take_sync_event(&mut self) -> Option<SyncEvent> {
        self.last_sync_event.take()
    }

    pub fn is_synced(&self) -> bool {
        self.sync_state == SyncState::Synced
    }

    // -----------------------------------------------------------------
    // Synchronization handshake
    // -----------------------------------------------------------------

    /// Enter `SYNCING` and arm the sync command. Body: `{rx_credits,
    /// rx_busy_allowed, rx_ack_timeout, tx_wd_timeout}`; SID is an
    /// incrementing sync-attempt counter.
    pub fn synchronize(&mut self) {
        if !self.sync_cmd.reserve() {
            return;
        }
        self.sync_state = SyncState::Syncing;
        let buf = self.sync_cmd.buf_mut();
        buf[0] = self.profile.rx_credits;
        buf[1] = 0; // rx_busy_allowed
        buf[2] = self.profile.rx_ack_threshold;
        buf[3] = self.profile.tx_wd_periods;
        self.sync_cmd.set_trigger();
    }

    /// Enter `UNSYNCING` and send the unsync command.
    pub fn unsynchronize(&mut self) {
        if !self.unsync_cmd.reserve() {
            return;
        }
        self.sync_state = SyncState::Unsyncing;
        self.unsync_cmd.set_trigger();
    }

    /// Apply an incoming FIFO status (`spec.md` §4.F). `slab` is consulted
    /// only for a `FAILURE` status, to read the pending head's `cancel_id`
    /// and decide between a single `CANCEL` and a `CANCEL_ALL`.
    pub fn on_status(&mut self, slab: &[CMessage], status: IncomingStatus) {
        match (self.sync_state, status.status_type) {
            (SyncState::Syncing, StatusType::Synced) => self.on_sync_reply(status),
            (SyncState::Syncing, StatusType::UnsyncedReady) => {
                // UNSYNCED_RDY with reason COMMAND while SYNCING re-arms a retry.
                self.sync_cmd.release();
                self.synchronize();
            }
            (SyncState::Syncing, StatusType::UnsyncedBusy) => {
                // Left unhandled: re-purposing UNSYNCED_BSY mid-handshake is
                // out of scope (see the design notes' open question).
            }
            (_, StatusType::Flow) => self.on_flow_status(status),
            (_, StatusType::Failure) => self.on_failure_status(slab, status),
            (SyncState::Unsyncing, StatusType::UnsyncedReady) => {
                self.unsync_cmd.release();
                self.sync_state = SyncState::UnsyncedInit;
                self.last_sync_event = Some(SyncEvent::UnsyncCompleted);
            }
            _ => {}
        }
    }

    fn on_sync_reply(&mut self, status: IncomingStatus) {
        let Some(payload) = status.sync_payload else {
            return;
        };
        let granted_credits = payload[0] & 0x3F;
        let params_match = payload[1] == 0
            && payload[2] == self.profile.rx_ack_threshold
            && payload[3] == self.profile.tx_wd_periods;
        if !(1..=63).contains(&granted_credits) || !params_match {
            return;
        }
        self.sync_cmd.release();
        self.tx.sid_next_to_use = status.sid.wrapping_add(1);
        self.tx.sid_last_completed = status.sid;
        self.tx.last_applied_diff = 0;
        self.tx.credits = granted_credits;
        self.rx.expected_sid = status.sid.wrapping_add(1);
        self.rx.last_ok_sid = status.sid;
        self.sync_state = SyncState::Synced;
        self.watchdog.reset();
        self.last_sync_event = Some(SyncEvent::Synced);
        debug!("fifo {:?}: synced, credits={granted_credits}", self.id);
    }

    fn on_flow_status(&mut self, status: IncomingStatus) {
        if !self.tx.sid_is_valid(status.sid) {
            return;
        }
        let diff = status.sid.wrapping_sub(self.tx.sid_last_completed);
        let newly_completed = diff - self.tx.last_applied_diff;
        self.tx.current_sid = status.sid;
        self.tx.current_type = Some(status.status_type);
        self.tx.current_code = status.status_code;
        self.tx.last_applied_diff = diff;

        match status.status_code {
            Some(StatusCode::Success) => self.arm_drain(newly_completed, TxCompletion::Ok),
            Some(StatusCode::Canceled) => {
                if self.tx.cancel_all_running {
                    // The caller observes `cancel_all_running()` and drives
                    // `recover_cancel_all` instead of `apply_tx_status`.
                    self.events.set(bits::TX_APPLY_STATUS);
                } else {
                    let code = self.tx.pending_failure_code.take();
                    self.arm_drain(newly_completed, TxCompletion::Canceled(code));
                }
            }
            Some(StatusCode::Busy) => {}
            Some(StatusCode::Nack) => self.desync(SyncState::UnsyncedInit),
            None => {}
        }
    }

    fn on_failure_status(&mut self, slab: &[CMessage], status: IncomingStatus) {
        if !self.tx.sid_is_valid(status.sid) {
            return;
        }
        let diff = status.sid.wrapping_sub(self.tx.sid_last_completed);
        self.tx.current_sid = status.sid;
        self.tx.current_type = Some(status.status_type);
        self.tx.pending_failure_code = status.failure_code;
        // The failing SID itself is not yet completed; everything strictly
        // before it is implicitly OK.
        let completed_diff = diff.wrapping_sub(1);
        let newly_completed = completed_diff - self.tx.last_applied_diff;
        self.tx.last_applied_diff = completed_diff;
        if newly_completed > 0 {
            self.arm_drain(newly_completed, TxCompletion::Ok);
        }
        // A nonzero cancel_id on the pending head means it's one segment of
        // a larger message; CANCEL_ALL unwinds it and every sibling sharing
        // that id. A plain CANCEL only ever touches the one failing SID.
        let has_followers = self
            .tx
            .pending
            .peek_head()
            .is_some_and(|idx| slab[idx as usize].tx_options.cancel_id != 0);
        if has_followers {
            self.cancel_all();
        } else if self.cancel_cmd.reserve() {
            self.cancel_cmd.set_trigger();
        }
    }

    /// Arm `apply_tx_status` to drain `count` messages off the head of
    /// `pending`, completing each with `completion`.
    fn arm_drain(&mut self, count: u8, completion: TxCompletion) {
        if count == 0 {
            return;
        }
        self.tx.pending_drain = self.tx.pending_drain.saturating_add(count);
        self.tx.pending_drain_completion = completion;
        self.events.set(bits::TX_APPLY_STATUS);
    }

    /// Whether a `CANCEL_ALL` is in flight; the caller should route
    /// `TX_APPLY_STATUS` to `recover_cancel_all` rather than `apply_tx_status`
    /// while this holds.
    pub fn cancel_all_running(&self) -> bool {
        self.tx.cancel_all_running
    }

    fn desync(&mut self, to: SyncState) {
        if self.sync_state == SyncState::Synced {
            self.last_sync_event = Some(SyncEvent::Desynced);
        }
        self.sync_state = to;
        self.watchdog.stop();
        self.tx.credits = 0;
    }

    // -----------------------------------------------------------------
    // Tx flow control — operates on the caller-owned Tx message slab.
    // -----------------------------------------------------------------

    /// Move messages from `waiting` to `pending` while credits remain and
    /// no cancel-all is running, assigning each one a fresh SID and an LLD
    /// Tx handle.
    pub fn service_tx(&mut self, slab: &mut [CMessage]) {
        if self.sync_state != SyncState::Synced || self.tx.cancel_all_running {
            return;
        }
        while self.tx.credits > 0 {
            let Some(idx) = self.tx.waiting.peek_head() else {
                break;
            };
            if !self.tx.handles.checkout() {
                break;
            }
            self.tx.waiting.remove(slab, idx);
            self.tx.sid_next_to_use = self.tx.sid_next_to_use.wrapping_add(1);
            {
                let msg = &mut slab[idx as usize];
                msg.owner_fifo = Some(self.id);
                msg.tx_active = true;
            }
            self.tx.pending.insert_tail(slab, idx);
            self.tx.credits -= 1;
        }
    }

    /// Queue a Tx message. Bypass messages (internally generated control
    /// traffic) jump to the head of `waiting` so they win the next
    /// `service_tx` pass over ordinary application traffic; regular
    /// messages queue at the tail in arrival order.
    pub fn enqueue_tx(&mut self, slab: &mut [CMessage], idx: u16, bypass: bool) {
        if bypass {
            self.tx.waiting.insert_head(slab, idx);
        } else {
            self.tx.waiting.insert_tail(slab, idx);
        }
        self.events.set(bits::TX_SERVICE);
    }

    /// Apply the side effects armed by `on_status`: drain the head of
    /// `pending` by `pending_drain` messages, reclaiming handles/credits and
    /// invoking `on_complete` once per message.
    pub fn apply_tx_status(
        &mut self,
        slab: &mut [CMessage],
        mut on_complete: impl FnMut(u16, TxCompletion),
    ) {
        self.events.take(bits::TX_APPLY_STATUS);
        if self.tx.cancel_all_running {
            return;
        }
        let completion = self.tx.pending_drain_completion;
        while self.tx.pending_drain > 0 {
            let Some(idx) = self.tx.pending.pop_head(slab) else {
                self.tx.pending_drain = 0;
                break;
            };
            self.tx.handles.release();
            self.tx.credits = self.tx.credits.saturating_add(1);
            {
                let msg = &mut slab[idx as usize];
                msg.tx_active = false;
            }
            on_complete(idx, completion);
            self.tx.pending_drain -= 1;
        }
    }

    /// Trigger `CANCEL_ALL`: halt Tx, mark the flag so `service_tx` stops
    /// pulling from `waiting`.
    pub fn cancel_all(&mut self) {
        if self.cancel_cmd.reserve() {
            self.tx.cancel_all_running = true;
            self.cancel_cmd.set_trigger();
        }
    }

    /// `CANCEL_ALL` completion recovery (`spec.md` §4.F): move the entire
    /// `pending` queue back to the head of `waiting` in original order,
    /// restoring credits, then fail every sibling sharing `cancel_id`.
    pub fn recover_cancel_all(
        &mut self,
        slab: &mut [CMessage],
        mut on_fail: impl FnMut(u16, TxCompletion),
    ) {
        let failing_cancel_id = self
            .tx
            .pending
            .peek_head()
            .map(|idx| slab[idx as usize].tx_options.cancel_id);
        let failure_code = self.tx.pending_failure_code.take();

        // Move pending back to the head of waiting, in original order.
        let mut moved = heapless::Vec::<u16, 32>::new();
        while let Some(idx) = self.tx.pending.pop_tail(slab) {
            let _ = moved.push(idx);
            self.tx.handles.release();
            self.tx.credits = self.tx.credits.saturating_add(1);
            self.tx.sid_last_completed = self.tx.sid_last_completed.wrapping_sub(1);
        }
        for idx in moved {
            self.tx.waiting.insert_head(slab, idx);
        }

        if let Some(cancel_id) = failing_cancel_id.filter(|id| *id != 0) {
            let mut to_fail = heapless::Vec::<u16, 32>::new();
            self.tx.waiting.for_each(slab, |idx| {
                if slab[idx as usize].tx_options.cancel_id == cancel_id {
                    let _ = to_fail.push(idx);
                }
                true
            });
            for idx in to_fail {
                self.tx.waiting.remove(slab, idx);
                on_fail(idx, TxCompletion::Canceled(failure_code));
            }
        }
        self.tx.cancel_all_running = false;
        self.cancel_cmd.release();
    }

    // -----------------------------------------------------------------
    // Rx path
    // -----------------------------------------------------------------

    /// An inbound data PM arrived with `sid`. Returns `true` if it was in
    /// order and should be handed to the registered Rx consumer; `false`
    /// if it was dropped as out-of-order.
    pub fn on_rx_data(&mut self, sid: u8) -> bool {
        if sid != self.rx.expected_sid {
            warn!(
                "fifo {:?}: dropping out-of-order Rx SID {sid}, expected {}",
                self.id, self.rx.expected_sid
            );
            return false;
        }
        self.rx.expected_sid = self.rx.expected_sid.wrapping_add(1);
        self.rx.busy_count += 1;
        true
    }

    /// The Rx consumer released a message it had been holding.
    pub fn on_rx_release(&mut self) {
        self.rx.busy_count = self.rx.busy_count.saturating_sub(1);
        self.maybe_arm_rx_ack();
    }

    fn maybe_arm_rx_ack(&mut self) {
        let consumed = self.rx.expected_sid.wrapping_sub(self.rx.last_ok_sid);
        if consumed >= self.rx.ack_threshold && consumed > 0 {
            self.rx.status_in_flight = true;
        }
    }

    /// Emit the Rx acknowledge armed by `maybe_arm_rx_ack`: `FLOW/SUCCESS`
    /// at `expected_sid - 1` if nothing is still being processed, else a
    /// partial `FLOW/BUSY` credit acknowledge.
    pub fn service_rx_ack(&mut self) -> Option<(u8, StatusCode)> {
        if !self.rx.status_in_flight {
            return None;
        }
        self.rx.status_in_flight = false;
        if self.rx.busy_count == 0 {
            let sid = self.rx.expected_sid.wrapping_sub(1);
            self.rx.last_ok_sid = sid;
            Some((sid, StatusCode::Success))
        } else {
            let sid = self.rx.expected_sid.wrapping_sub(self.rx.busy_count);
            Some((sid, StatusCode::Busy))
        }
    }

    // -----------------------------------------------------------------
    // Watchdog
    // -----------------------------------------------------------------

    /// Call once per watchdog period. Returns `Some(sid)` to send a
    /// `REQUEST_STATUS` command for, or `None` if nothing to do or the
    /// FIFO just lost sync.
    pub fn on_watchdog_tick(&mut self) -> Option<u8> {
        if self.sync_state != SyncState::Synced {
            return None;
        }
        let (should_probe, lost) = self.watchdog.on_tick(1);
        if lost {
            self.desync(SyncState::UnsyncedInit);
            return None;
        }
        if should_probe && self.request_status_cmd.reserve() {
            self.request_status_cmd.set_trigger();
            Some(self.tx.sid_next_to_use.wrapping_sub(1))
        } else {
            None
        }
    }

    pub fn on_any_status_seen(&mut self) {
        self.watchdog.on_status_seen();
        self.request_status_cmd.release();
    }

    // -----------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------

    /// Stop the FIFO, draining both queues with a `SYNC_LOST` completion
    /// and reclaiming LLD handles/credits.
    pub fn stop(
        &mut self,
        slab: &mut [CMessage],
        mut on_drop: impl FnMut(u16, TxCompletion),
    ) {
        self.desync(SyncState::UnsyncedInit);
        while let Some(idx) = self.tx.pending.pop_head(slab) {
            self.tx.handles.release();
            on_drop(idx, TxCompletion::SyncLost);
        }
        while let Some(idx) = self.tx.waiting.pop_head(slab) {
            on_drop(idx, TxCompletion::SyncLost);
        }
    }

    pub fn tx_credits(&self) -> u8 {
        self.tx.credits
    }

    pub fn pending_len(&self) -> usize {
        self.tx.pending.len()
    }

    pub fn available_handles(&self) -> u8 {
        self.tx.handles.available()
    }
}

/// Maps a FIFO command kind to its PMP command-type/code pair.
pub const fn command_type_code(kind: CommandKind) -> (CommandType, CommandCode) {
    match kind {
        CommandKind::Sync => (CommandType::Synchronization, CommandCode::Sync),
        CommandKind::Unsync => (CommandType::Synchronization, CommandCode::Unsync),
        CommandKind::Cancel => (CommandType::MsgAction, CommandCode::ActionCancel),
        CommandKind::CancelAll => (CommandType::MsgAction, CommandCode::ActionCancelAll),
        CommandKind::RequestStatus => (CommandType::ReqStatus, CommandCode::ReqStatus),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Sync,
    Unsync,
    Cancel,
    CancelAll,
    RequestStatus,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::PoolKind;
    use core::array;

    fn slab() -> [CMessage; 8] {
        array::from_fn(|_| CMessage::new(PoolKind::TxObject))
    }

    fn synced_fifo() -> PortMessageFifo {
        let mut fifo = PortMessageFifo::new(FifoId::Mcm, FifoProfile::CONVENTIONAL_DEFAULT);
        fifo.synchronize();
        fifo.on_status(
            &slab(),
            IncomingStatus {
                sid: 42,
                status_type: StatusType::Synced,
                status_code: None,
                sync_payload: Some([5, 0, 4, 10]),
                failure_code: None,
            },
        );
        fifo
    }

    #[test]
    fn successful_sync_sets_credits_and_next_sid() {
        let fifo = synced_fifo();
        assert_eq!(fifo.sync_state, SyncState::Synced);
        assert_eq!(fifo.tx_credits(), 5);
        assert_eq!(fifo.tx.sid_next_to_use, 43);
        assert_eq!(fifo.tx.sid_last_completed, 42);
    }

    #[test]
    fn stale_sid_does_not_mutate_current_tracker() {
        let mut fifo = synced_fifo();
        let before = (fifo.tx.current_sid, fifo.tx.current_type);
        fifo.on_status(
            &slab(),
            IncomingStatus {
                sid: 42, // not newer than sid_last_completed
                status_type: StatusType::Flow,
                status_code: Some(StatusCode::Success),
                sync_payload: None,
                failure_code: None,
            },
        );
        assert_eq!((fifo.tx.current_sid, fifo.tx.current_type), before);
    }

    #[test]
    fn out_of_order_rx_sid_is_dropped() {
        let mut fifo = synced_fifo();
        fifo.rx.expected_sid = 1;
        fifo.rx.last_ok_sid = 0;
        assert!(!fifo.on_rx_data(5));
        assert!(fifo.on_rx_data(1));
        assert_eq!(fifo.rx.expected_sid, 2);
    }

    #[test]
    fn rx_ack_fires_success_when_not_busy() {
        let mut fifo = synced_fifo();
        fifo.rx.ack_threshold = 2;
        fifo.rx.expected_sid = 1;
        fifo.rx.last_ok_sid = 0;
        fifo.on_rx_data(1);
        fifo.on_rx_release();
        fifo.on_rx_data(2);
        fifo.on_rx_release();
        let ack = fifo.service_rx_ack();
        assert_eq!(ack, Some((2, StatusCode::Success)));
    }

    #[test]
    fn enqueue_then_service_tx_moves_to_pending_and_spends_credit() {
        let mut fifo = synced_fifo();
        let mut slab = slab();
        fifo.enqueue_tx(&mut slab, 0, false);
        fifo.service_tx(&mut slab);
        assert_eq!(fifo.pending_len(), 1);
        assert_eq!(fifo.tx_credits(), 4);
        assert_eq!(fifo.available_handles(), 4);
    }

    #[test]
    fn watchdog_two_misses_desyncs() {
        let mut fifo = synced_fifo();
        assert!(fifo.on_watchdog_tick().is_some());
        assert_eq!(fifo.sync_state, SyncState::Synced);
        assert!(fifo.on_watchdog_tick().is_none());
        assert_eq!(fifo.sync_state, SyncState::UnsyncedInit);
    }
}
