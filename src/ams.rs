//! AMS (component K): the central switchboard above the MCM and RCM
//! transceivers (`spec.md` §4.K). Owns the Tx AppMsg queue and the Rx
//! retry-on-pool-exhaustion queue, and drives segmentation on both sides.
//!
//! Tx runs one AppMsg segment at a time per AMS instance: a segment is sent
//! and AMS waits for its completion before writing the next one, so "the
//! failed segment was the last transmitted" (`spec.md` §4.K) always holds —
//! there is never more than one of one AppMsg's segments outstanding.

use crate::error::{AmsError, SegmentationError};
use crate::fifo::{PortMessageFifo, TxCompletion};
use crate::message::{CMessage, MessageId, MAX_PAYLOAD};
use crate::pmp::FailureCode;
use crate::pool::{IntrusiveList, Link, ListNode, StaticPool};
use crate::segmentation::{self, CompleteMessage, ReassemblySignature, Segmentation, TxStage};
use crate::transceiver::Transceiver;

/// `ucs_amsmessage.c`'s `Amsg_TxGetResultCode` table: maps the concrete
/// failure code that triggered a cancel onto the AMS-level error surfaced
/// to the application. `None` (absent or unrecognized code) falls to the
/// same bucket as an uncased code in the original: `Unexpected`.
fn classify_failure(code: Option<FailureCode>) -> AmsError {
    match code {
        Some(FailureCode::Bf | FailureCode::Crc | FailureCode::Id | FailureCode::Ack | FailureCode::Timeout) => {
            AmsError::RetriesExhausted
        }
        Some(FailureCode::FatalWt | FailureCode::FatalOa) => AmsError::InvalidTarget,
        Some(FailureCode::NaTrans | FailureCode::NaOff) => AmsError::NotAvailable,
        Some(FailureCode::CfgNoRcvr) | None => AmsError::Unexpected,
    }
}

/// Reserved destination range rejected pre-enqueue.
pub const RESERVED_DEST_MAX: u16 = 0x000F;
/// Blocking broadcast destination.
pub const BROADCAST_BLOCKING: u16 = 0x03C8;
/// Unblocking broadcast destination.
pub const BROADCAST_UNBLOCKING: u16 = 0x03FF;
/// Full broadcast destination range; only non-segmented payloads are allowed to it.
pub const BROADCAST_RANGE: core::ops::RangeInclusive<u16> = 0x0300..=0x03FF;

pub const fn is_reserved_destination(addr: u16) -> bool {
    addr <= RESERVED_DEST_MAX
}

pub fn is_broadcast_destination(addr: u16) -> bool {
    BROADCAST_RANGE.contains(&addr)
}

/// Cap on one AppMsg's application payload this AMS instance will accept.
pub const MAX_APPMSG_PAYLOAD: usize = segmentation::MAX_REASSEMBLY_SIZE;

/// Default "is_rcm" routing predicate: everything goes over RCM unless the
/// caller installs a more specific one.
pub fn default_is_rcm(_dest_addr: u16, _msg_id: MessageId) -> bool {
    true
}

/// One queued-or-in-flight outbound application message.
struct AppMsg {
    link: Link,
    dest_addr: u16,
    msg_id: MessageId,
    follower_id: u8,
    llrbc: u8,
    use_rcm: bool,
    buf: [u8; MAX_APPMSG_PAYLOAD],
    len: usize,
    stage: TxStage,
    offset: usize,
    tel_cnt: u8,
}

impl ListNode for AppMsg {
    fn link(&self) -> &Link {
        &self.link
    }
    fn link_mut(&mut self) -> &mut Link {
        &mut self.link
    }
}

impl AppMsg {
    fn new(dest_addr: u16, msg_id: MessageId, payload: &[u8], use_rcm: bool, follower_id: u8, llrbc: u8) -> Self {
        let mut buf = [0u8; MAX_APPMSG_PAYLOAD];
        buf[..payload.len()].copy_from_slice(payload);
        Self {
            link: Link::new(),
            dest_addr,
            msg_id,
            follower_id,
            llrbc,
            use_rcm,
            buf,
            len: payload.len(),
            stage: segmentation::initial_tx_stage(payload.len()),
            offset: 0,
            tel_cnt: 0,
        }
    }
}

/// What happened to one AppMsg, handed back by [`Ams::take_completion`].
#[derive(Debug, Clone, Copy)]
pub struct CompletedTx {
    pub msg_id: MessageId,
    pub result: Result<(), AmsError>,
}

struct InFlight {
    app_idx: u16,
    tx_idx: u16,
    use_rcm: bool,
}

/// One inbound telegram parked because the reassembly pool was exhausted
/// when it arrived.
struct QueuedRx {
    link: Link,
    sig: ReassemblySignature,
    tel_id: u8,
    tel_cnt: u8,
    len: u8,
    buf: [u8; MAX_PAYLOAD],
}

impl ListNode for QueuedRx {
    fn link(&self) -> &Link {
        &self.link
    }
    fn link_mut(&mut self) -> &mut Link {
        &mut self.link
    }
}

/// Outcome of feeding AMS one inbound telegram.
pub enum RxOutcome {
    /// A complete AppMsg is ready for the application.
    Delivered(CompleteMessage),
    /// Reassembly still in progress; nothing to deliver yet.
    Pending,
    /// Parked behind the Rx waiting queue; will be retried on pool-freed.
    Queued,
    /// Protocol violation from a non-INIC source: send this two-byte error
    /// reply back to `source` (OpType=ERROR is the caller's responsibility).
    ErrorReply { source: u16, payload: [u8; 2] },
    /// Protocol violation from the local INIC itself: no reply is sent.
    Dropped,
}

/// Central Tx/Rx switchboard sitting above the MCM and RCM transceivers.
///
/// - `TXN`: Tx AppMsg slots.
/// - `RXWAIT`: Rx telegrams that can be parked awaiting a freed reassembly slot.
/// - `SEGN`: reassembly slots (shared across both transceivers' Rx paths).
pub struct Ams<const TXN: usize, const RXWAIT: usize, const SEGN: usize> {
    tx_queue: IntrusiveList,
    tx_slots: StaticPool<AppMsg, TXN>,
    in_flight: Option<InFlight>,
    rx_wait: IntrusiveList,
    rx_wait_slots: StaticPool<QueuedRx, RXWAIT>,
    segmentation: Segmentation<SEGN>,
    is_rcm: fn(u16, MessageId) -> bool,
    default_llrbc: u8,
    completed: heapless::Vec<CompletedTx, TXN>,
    pub events: crate::events::EventBits,
}

impl<const TXN: usize, const RXWAIT: usize, const SEGN: usize> Ams<TXN, RXWAIT, SEGN> {
    pub fn new(default_llrbc: u8) -> Self {
        Self {
            tx_queue: IntrusiveList::new(),
            tx_slots: StaticPool::new(core::array::from_fn(|_| {
                AppMsg::new(0, MessageId::default(), &[], true, 0, default_llrbc)
            })),
            in_flight: None,
            rx_wait: IntrusiveList::new(),
            rx_wait_slots: StaticPool::new(core::array::from_fn(|_| QueuedRx {
                link: Link::new(),
                sig: ReassemblySignature { source: 0, msg_id: MessageId::default() },
                tel_id: 0,
                tel_cnt: 0,
                len: 0,
                buf: [0u8; MAX_PAYLOAD],
            })),
            segmentation: Segmentation::new(),
            is_rcm: default_is_rcm,
            default_llrbc,
            completed: heapless::Vec::new(),
            events: crate::events::EventBits::new(),
        }
    }

    /// Install a non-default Tx transceiver routing predicate.
    pub fn set_is_rcm(&mut self, predicate: fn(u16, MessageId) -> bool) {
        self.is_rcm = predicate;
    }

    /// Pop one finished Tx result, if any. Completions are not necessarily
    /// returned in enqueue order — AppMsgs only ever finish one at a time
    /// under the single-in-flight Tx model, so callers that care about order
    /// can drain this after every `on_tx_complete`.
    pub fn take_completion(&mut self) -> Option<CompletedTx> {
        self.completed.pop()
    }

    // -----------------------------------------------------------------
    // Tx
    // -----------------------------------------------------------------

    /// Enqueue one application message for transmission. Rejects reserved
    /// and over-sized-broadcast destinations before anything is allocated.
    pub fn enqueue_tx(&mut self, dest_addr: u16, msg_id: MessageId, payload: &[u8], follower_id: u8) -> Result<(), AmsError> {
        if is_reserved_destination(dest_addr) {
            return Err(AmsError::InvalidTarget);
        }
        if is_broadcast_destination(dest_addr) && payload.len() > MAX_PAYLOAD {
            return Err(AmsError::InvalidTarget);
        }
        let use_rcm = (self.is_rcm)(dest_addr, msg_id);
        let (idx, slot) = self.tx_slots.checkout().ok_or(AmsError::NotAvailable)?;
        *slot = AppMsg::new(dest_addr, msg_id, payload, use_rcm, follower_id, self.default_llrbc);
        self.tx_queue.insert_tail(self.tx_slots.slab_mut(), idx);
        self.events.set(crate::events::ams::TX_SERVICE);
        Ok(())
    }

    /// Run one Tx service step: if no segment is currently in flight, pull
    /// the head AppMsg, write its next segment into a freshly allocated
    /// telegram, and send it over whichever transceiver its routing
    /// predicate selected.
    pub fn service_tx<const MN: usize, const RN: usize>(
        &mut self,
        mcm: &mut Transceiver<MN>,
        mcm_fifo: &mut PortMessageFifo,
        rcm: &mut Transceiver<RN>,
        rcm_fifo: &mut PortMessageFifo,
    ) {
        self.events.take(crate::events::ams::TX_SERVICE);
        if self.in_flight.is_some() {
            return;
        }
        let Some(app_idx) = self.tx_queue.pop_head(self.tx_slots.slab_mut()) else {
            return;
        };
        let use_rcm = self.tx_slots.get(app_idx).use_rcm;
        let alloc = if use_rcm { rcm.tx_allocate(2) } else { mcm.tx_allocate(2) };
        match alloc {
            Ok(tx_idx) => {
                {
                    let app = self.tx_slots.get_mut(app_idx);
                    let msg: &mut CMessage = if use_rcm { rcm.tx_message_mut(tx_idx) } else { mcm.tx_message_mut(tx_idx) };
                    msg.dest_addr = app.dest_addr;
                    msg.msg_id = app.msg_id;
                    msg.tx_options.cancel_id = app.follower_id;
                    msg.tx_options.llrbc = app.llrbc;
                    segmentation::write_tx_segment(&app.buf[..app.len], &mut app.stage, &mut app.offset, &mut app.tel_cnt, msg);
                }
                if use_rcm {
                    rcm.tx_send(rcm_fifo, tx_idx, false);
                } else {
                    mcm.tx_send(mcm_fifo, tx_idx, false);
                }
                self.in_flight = Some(InFlight { app_idx, tx_idx, use_rcm });
            }
            Err(_) => {
                // Tx pool exhausted this tick; try again next tick.
                self.tx_queue.insert_head(self.tx_slots.slab_mut(), app_idx);
            }
        }
    }

    /// Wire this to the `on_complete` callback of both transceivers'
    /// `service` call, filtering on `use_rcm` to tell which one it came from.
    pub fn on_tx_complete<const MN: usize, const RN: usize>(
        &mut self,
        use_rcm: bool,
        tx_idx: u16,
        completion: TxCompletion,
        mcm: &mut Transceiver<MN>,
        rcm: &mut Transceiver<RN>,
    ) {
        let Some(in_flight) = self.in_flight.take() else {
            return;
        };
        if in_flight.use_rcm != use_rcm || in_flight.tx_idx != tx_idx {
            // Not the segment we are waiting on; put it back and ignore —
            // under the single-in-flight invariant this should not happen.
            self.in_flight = Some(in_flight);
            return;
        }
        if use_rcm {
            rcm.release(tx_idx);
        } else {
            mcm.release(tx_idx);
        }
        let app_idx = in_flight.app_idx;
        match completion {
            TxCompletion::Ok => {
                if self.tx_slots.get(app_idx).stage == TxStage::Done {
                    self.complete(app_idx, Ok(()));
                } else {
                    self.tx_queue.insert_head(self.tx_slots.slab_mut(), app_idx);
                    self.events.set(crate::events::ams::TX_SERVICE);
                }
            }
            TxCompletion::Canceled(code) => self.complete(app_idx, Err(classify_failure(code))),
            TxCompletion::SyncLost => self.complete(app_idx, Err(AmsError::NotAvailable)),
        }
    }

    fn complete(&mut self, app_idx: u16, result: Result<(), AmsError>) {
        let msg_id = self.tx_slots.get(app_idx).msg_id;
        self.tx_slots.release(app_idx);
        let _ = self.completed.push(CompletedTx { msg_id, result });
    }

    // -----------------------------------------------------------------
    // Rx
    // -----------------------------------------------------------------

    /// Feed one inbound telegram through segmentation. `is_local_inic` tells
    /// whether `sig.source` is the INIC itself, which suppresses synthetic
    /// error replies.
    pub fn on_rx_telegram(
        &mut self,
        sig: ReassemblySignature,
        tel_id: u8,
        tel_cnt: u8,
        payload: &[u8],
        is_local_inic: bool,
    ) -> RxOutcome {
        if !self.rx_wait.is_empty() {
            // Preserve FIFO order: anything arriving while older telegrams
            // are still parked goes to the back of the same queue.
            return self.queue_rx(sig, tel_id, tel_cnt, payload);
        }
        let r = self.segmentation.on_rx_telegram(sig, tel_id, tel_cnt, payload);
        self.finish_rx(r, sig, tel_id, tel_cnt, payload, is_local_inic)
    }

    fn finish_rx(
        &mut self,
        r: segmentation::RxResult,
        sig: ReassemblySignature,
        tel_id: u8,
        tel_cnt: u8,
        payload: &[u8],
        is_local_inic: bool,
    ) -> RxOutcome {
        if matches!(r.error, Some(SegmentationError::TooManyReassemblies)) {
            return self.queue_rx(sig, tel_id, tel_cnt, payload);
        }
        if let Some(e) = r.error {
            return if is_local_inic {
                RxOutcome::Dropped
            } else {
                RxOutcome::ErrorReply {
                    source: sig.source,
                    payload: segmentation::error_reply_payload(e),
                }
            };
        }
        match r.complete {
            Some(c) => RxOutcome::Delivered(c),
            None => RxOutcome::Pending,
        }
    }

    fn queue_rx(&mut self, sig: ReassemblySignature, tel_id: u8, tel_cnt: u8, payload: &[u8]) -> RxOutcome {
        match self.rx_wait_slots.checkout() {
            Some((idx, slot)) => {
                slot.sig = sig;
                slot.tel_id = tel_id;
                slot.tel_cnt = tel_cnt;
                slot.len = payload.len() as u8;
                slot.buf[..payload.len()].copy_from_slice(payload);
                self.rx_wait.insert_tail(self.rx_wait_slots.slab_mut(), idx);
                self.events.set(crate::events::ams::RX_SERVICE);
                RxOutcome::Queued
            }
            // The wait queue itself is a fixed, separate resource from the
            // reassembly pool; if it is also full the telegram is dropped.
            None => RxOutcome::Dropped,
        }
    }

    /// Called when the reassembly pool reports a freed slot: re-drives the
    /// Rx waiting queue in FIFO order until `RETRY` recurs or it drains.
    pub fn on_pool_freed(&mut self, is_local_inic: impl Fn(u16) -> bool) -> heapless::Vec<RxOutcome, RXWAIT> {
        self.events.take(crate::events::segmentation::POOL_FREED);
        let mut out = heapless::Vec::new();
        loop {
            let Some(idx) = self.rx_wait.peek_head() else {
                break;
            };
            let (sig, tel_id, tel_cnt, len) = {
                let q = self.rx_wait_slots.get(idx);
                (q.sig, q.tel_id, q.tel_cnt, q.len as usize)
            };
            let buf = self.rx_wait_slots.get(idx).buf;
            let r = self.segmentation.on_rx_telegram(sig, tel_id, tel_cnt, &buf[..len]);
            if matches!(r.error, Some(SegmentationError::TooManyReassemblies)) {
                break;
            }
            self.rx_wait.remove(self.rx_wait_slots.slab_mut(), idx);
            self.rx_wait_slots.release(idx);
            let outcome = self.finish_rx(r, sig, tel_id, tel_cnt, &buf[..len], is_local_inic(sig.source));
            if out.push(outcome).is_err() {
                break;
            }
        }
        out
    }

    /// Run the reassembly GC sweep; signatures returned timed out.
    pub fn gc_tick(&mut self) -> heapless::Vec<ReassemblySignature, SEGN> {
        self.segmentation.gc_tick()
    }

    // -----------------------------------------------------------------
    // Cleanup
    // -----------------------------------------------------------------

    /// On a fatal transport event: fail every queued and in-flight Tx
    /// message, drop the Rx waiting queue, and drain segmentation.
    pub fn cleanup_on_transport_loss(&mut self) {
        while let Some(idx) = self.tx_queue.pop_head(self.tx_slots.slab_mut()) {
            self.complete(idx, Err(AmsError::NotAvailable));
        }
        if let Some(in_flight) = self.in_flight.take() {
            self.complete(in_flight.app_idx, Err(AmsError::NotAvailable));
        }
        while let Some(idx) = self.rx_wait.pop_head(self.rx_wait_slots.slab_mut()) {
            self.rx_wait_slots.release(idx);
        }
        self.segmentation.drain();
    }

    pub fn tx_queue_len(&self) -> usize {
        self.tx_queue.len()
    }

    pub fn is_tx_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg_id() -> MessageId {
        MessageId { fblock_id: 1, inst_id: 2, function_id: 3, op_type: 4 }
    }

    #[test]
    fn reserved_destination_is_rejected_pre_enqueue() {
        let mut ams: Ams<4, 4, 4> = Ams::new(10);
        assert_eq!(
            ams.enqueue_tx(0x0005, msg_id(), &[1, 2, 3], 1),
            Err(AmsError::InvalidTarget)
        );
        assert_eq!(ams.tx_queue_len(), 0);
    }

    #[test]
    fn oversized_broadcast_payload_is_rejected() {
        let mut ams: Ams<4, 4, 4> = Ams::new(10);
        let payload = [0u8; MAX_PAYLOAD + 1];
        assert_eq!(
            ams.enqueue_tx(BROADCAST_UNBLOCKING, msg_id(), &payload, 1),
            Err(AmsError::InvalidTarget)
        );
    }

    #[test]
    fn small_broadcast_payload_is_accepted() {
        let mut ams: Ams<4, 4, 4> = Ams::new(10);
        assert!(ams.enqueue_tx(BROADCAST_UNBLOCKING, msg_id(), &[1, 2, 3], 1).is_ok());
        assert_eq!(ams.tx_queue_len(), 1);
    }

    #[test]
    fn rx_telegram_with_no_prior_segment_is_dropped_for_local_inic() {
        let mut ams: Ams<4, 4, 4> = Ams::new(10);
        let sig = ReassemblySignature { source: 0x0110, msg_id: msg_id() };
        let outcome = ams.on_rx_telegram(sig, 2, 1, &[1, 2], true);
        assert!(matches!(outcome, RxOutcome::Dropped));
    }

    #[test]
    fn rx_telegram_protocol_error_from_remote_source_synthesizes_reply() {
        let mut ams: Ams<4, 4, 4> = Ams::new(10);
        let sig = ReassemblySignature { source: 0x0200, msg_id: msg_id() };
        let outcome = ams.on_rx_telegram(sig, 2, 1, &[1, 2], false);
        match outcome {
            RxOutcome::ErrorReply { source, payload } => {
                assert_eq!(source, 0x0200);
                assert_eq!(payload, [0x0C, SegmentationError::FirstSegmentMissing.code()]);
            }
            _ => panic!("expected an error reply"),
        }
    }

    #[test]
    fn single_segment_rx_telegram_delivers_immediately() {
        let mut ams: Ams<4, 4, 4> = Ams::new(10);
        let sig = ReassemblySignature { source: 0x0200, msg_id: msg_id() };
        let outcome = ams.on_rx_telegram(sig, 0, 0, &[9, 9, 9], false);
        match outcome {
            RxOutcome::Delivered(c) => assert_eq!(c.payload.as_slice(), &[9, 9, 9]),
            _ => panic!("expected immediate delivery"),
        }
    }
}
