//! Segmentation/reassembly (component J): splits an AMS application message
//! too large for one telegram into a `TelId` sequence on Tx, and reassembles
//! one back out of an inbound `TelId` sequence on Rx (`spec.md` §4.J).
//!
//! Tx-side state lives on the caller (one [`TxCursor`] per in-flight AppMsg,
//! reused across its segments); Rx-side state is a small pool of
//! [`ReassemblySlot`]s keyed by `{source, msg_id}`, tracked the same
//! arena-plus-`IntrusiveList` way every other pool in this crate is.

use crate::error::SegmentationError;
use crate::events::EventBits;
use crate::message::{CMessage, MessageId, MAX_PAYLOAD};
use crate::pool::{IntrusiveList, Link, ListNode, StaticPool};

/// Body bytes carried by a TelId 1/2/3 segment (`MAX_PAYLOAD` minus nothing —
/// body segments use the full telegram payload, only the TelId 4 announce
/// segment spends two bytes on the size prefix).
const BODY_CHUNK: usize = MAX_PAYLOAD;

/// Ceiling on one reassembled application message, matching the largest
/// configured Rx telegram/AppMsg size this stack accepts (`config.rs`'s
/// `size_rx_msg` upper bound). A `TelId` 4 announcing a larger size is
/// rejected with [`SegmentationError::CannotAllocatePayload`].
pub const MAX_REASSEMBLY_SIZE: usize = 65535;

/// Identifies one in-flight reassembly: the telegram's source address plus
/// the application message id it carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReassemblySignature {
    pub source: u16,
    pub msg_id: MessageId,
}

// ---------------------------------------------------------------------------
// Tx side
// ---------------------------------------------------------------------------

/// Walks one outbound payload through the `TelId` state machine, one
/// telegram at a time. The caller owns a single reusable Tx [`CMessage`] and
/// calls [`TxCursor::next_into`] once per AMS service tick until
/// [`TxCursor::is_done`].
pub struct TxCursor<'a> {
    payload: &'a [u8],
    offset: usize,
    tel_cnt: u8,
    stage: TxStage,
}

/// Where one Tx AppMsg sits in the `TelId` state machine. Public so a
/// long-lived owner (AMS's Tx queue entry) can hold these three fields
/// itself instead of a borrowing [`TxCursor`], which cannot outlive the
/// tick that creates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStage {
    /// Payload fits in one telegram: a single `TelId` 0 segment finishes it.
    Single,
    /// Payload needs segmenting: emit the `TelId` 4 size announcement first.
    AnnounceSize,
    /// Emit the first body segment (`TelId` 1, `tel_cnt` 0).
    BodyFirst,
    /// Emit subsequent body segments (`TelId` 2, or 3 on the last one).
    BodyMiddle,
    /// The last body chunk exactly filled a segment; one more, empty, `TelId`
    /// 3 telegram is required to mark completion.
    BodyLastEmpty,
    Done,
}

/// The `TxStage` a fresh cursor over a payload of `payload_len` bytes starts in.
pub const fn initial_tx_stage(payload_len: usize) -> TxStage {
    if payload_len <= MAX_PAYLOAD {
        TxStage::Single
    } else {
        TxStage::AnnounceSize
    }
}

/// Write the next segment's `tel_id`/`tel_cnt`/payload into `msg`, advancing
/// `stage`/`offset`/`tel_cnt`. Free function (rather than a method on a
/// borrowing cursor) so a long-lived Tx queue entry can carry the three
/// scalars across ticks without holding a reference into its own payload buffer.
pub fn write_tx_segment(
    payload: &[u8],
    stage: &mut TxStage,
    offset: &mut usize,
    tel_cnt: &mut u8,
    msg: &mut CMessage,
) {
    match *stage {
        TxStage::Single => {
            msg.telegram.tel_id = 0;
            msg.telegram.tel_cnt = 0;
            msg.set_payload(payload);
            *stage = TxStage::Done;
        }
        TxStage::AnnounceSize => {
            msg.telegram.tel_id = 4;
            msg.telegram.tel_cnt = 0;
            msg.set_payload(&(payload.len() as u16).to_be_bytes());
            *stage = TxStage::BodyFirst;
        }
        TxStage::BodyFirst => {
            let take = payload.len().min(BODY_CHUNK);
            msg.telegram.tel_id = 1;
            msg.telegram.tel_cnt = 0;
            msg.set_payload(&payload[..take]);
            *offset = take;
            *stage = if *offset >= payload.len() {
                TxStage::BodyLastEmpty
            } else {
                TxStage::BodyMiddle
            };
        }
        TxStage::BodyMiddle => {
            let remaining = payload.len() - *offset;
            let take = remaining.min(BODY_CHUNK);
            let is_last = *offset + take >= payload.len();
            *tel_cnt = tel_cnt.wrapping_add(1);
            msg.telegram.tel_id = if is_last { 3 } else { 2 };
            msg.telegram.tel_cnt = *tel_cnt;
            msg.set_payload(&payload[*offset..*offset + take]);
            *offset += take;
            *stage = if is_last { TxStage::Done } else { TxStage::BodyMiddle };
        }
        TxStage::BodyLastEmpty => {
            *tel_cnt = tel_cnt.wrapping_add(1);
            msg.telegram.tel_id = 3;
            msg.telegram.tel_cnt = *tel_cnt;
            msg.set_payload(&[]);
            *stage = TxStage::Done;
        }
        TxStage::Done => {}
    }
}

impl<'a> TxCursor<'a> {
    pub fn new(payload: &'a [u8]) -> Self {
        Self {
            payload,
            offset: 0,
            tel_cnt: 0,
            stage: initial_tx_stage(payload.len()),
        }
    }

    /// Whether every segment of this message has been written to a telegram.
    pub const fn is_done(&self) -> bool {
        matches!(self.stage, TxStage::Done)
    }

    /// Write the next segment's `tel_id`/`tel_cnt`/payload into `msg`. The
    /// caller still owns `cancel_id`/`dest_addr`/`msg_id` — those are set
    /// once by AMS and carried unchanged across every segment of one message.
    pub fn next_into(&mut self, msg: &mut CMessage) {
        write_tx_segment(self.payload, &mut self.stage, &mut self.offset, &mut self.tel_cnt, msg);
    }
}

// ---------------------------------------------------------------------------
// Rx side
// ---------------------------------------------------------------------------

/// One in-progress (or just-completed) reassembly.
struct ReassemblySlot {
    link: Link,
    sig: ReassemblySignature,
    buf: [u8; MAX_REASSEMBLY_SIZE],
    len: usize,
    /// `tel_cnt` a `TelId` 2/3 segment must carry to be accepted next.
    next_tel_cnt: u8,
    /// Cleared on any append; a slot still marked at the next GC sweep is reaped.
    mark: bool,
}

impl ListNode for ReassemblySlot {
    fn link(&self) -> &Link {
        &self.link
    }
    fn link_mut(&mut self) -> &mut Link {
        &mut self.link
    }
}

impl ReassemblySlot {
    fn fresh(sig: ReassemblySignature) -> Self {
        Self {
            link: Link::new(),
            sig,
            buf: [0u8; MAX_REASSEMBLY_SIZE],
            len: 0,
            next_tel_cnt: 1,
            mark: false,
        }
    }
}

/// A fully reassembled application message handed back to AMS.
pub struct CompleteMessage {
    pub sig: ReassemblySignature,
    pub payload: heapless::Vec<u8, MAX_REASSEMBLY_SIZE>,
}

/// Outcome of feeding one inbound telegram to [`Segmentation::on_rx_telegram`].
#[derive(Default)]
pub struct RxResult {
    /// Set when this telegram violated the protocol; the caller synthesizes
    /// an error reply unless the source was the local INIC.
    pub error: Option<SegmentationError>,
    /// Set when this telegram completed a reassembly (possibly the same
    /// telegram that also carries `error`, for the duplicate-signature case).
    pub complete: Option<CompleteMessage>,
}

/// Owns the Rx reassembly pool for one transceiver and the periodic GC timer
/// that reaps abandoned reassemblies.
pub struct Segmentation<const N: usize> {
    slots: StaticPool<ReassemblySlot, N>,
    active: IntrusiveList,
    pub events: EventBits,
}

impl<const N: usize> Segmentation<N> {
    pub fn new() -> Self {
        Self {
            slots: StaticPool::new(core::array::from_fn(|_| {
                ReassemblySlot::fresh(ReassemblySignature {
                    source: 0,
                    msg_id: MessageId::default(),
                })
            })),
            active: IntrusiveList::new(),
            events: EventBits::new(),
        }
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    fn find(&self, sig: ReassemblySignature) -> Option<u16> {
        let mut found = None;
        self.active.for_each(self.slots.slab(), |idx| {
            if self.slots.get(idx).sig == sig {
                found = Some(idx);
                false
            } else {
                true
            }
        });
        found
    }

    fn free(&mut self, idx: u16) {
        self.active.remove(self.slots.slab_mut(), idx);
        self.slots.release(idx);
    }

    /// Append `payload` to slot `idx`'s buffer, rejecting the overflow case
    /// and clearing the GC mark on success.
    fn append(&mut self, idx: u16, payload: &[u8]) -> Option<SegmentationError> {
        let slot = self.slots.get_mut(idx);
        if slot.len + payload.len() > MAX_REASSEMBLY_SIZE {
            self.free(idx);
            return Some(SegmentationError::CannotAllocatePayload);
        }
        let slot = self.slots.get_mut(idx);
        slot.buf[slot.len..slot.len + payload.len()].copy_from_slice(payload);
        slot.len += payload.len();
        slot.mark = false;
        None
    }

    fn take_complete(&mut self, idx: u16) -> CompleteMessage {
        let slot = self.slots.get(idx);
        let sig = slot.sig;
        let mut payload = heapless::Vec::new();
        let _ = payload.extend_from_slice(&slot.buf[..slot.len]);
        self.free(idx);
        CompleteMessage { sig, payload }
    }

    /// Feed one inbound telegram's `tel_id`/`tel_cnt`/payload through the
    /// reassembly state machine for `sig`.
    pub fn on_rx_telegram(
        &mut self,
        sig: ReassemblySignature,
        tel_id: u8,
        tel_cnt: u8,
        payload: &[u8],
    ) -> RxResult {
        match tel_id {
            0 => self.on_tel_id_0(sig, payload),
            1 => self.on_tel_id_1(sig, tel_cnt, payload),
            2 => self.on_tel_id_body(sig, tel_cnt, payload, false),
            3 => self.on_tel_id_body(sig, tel_cnt, payload, true),
            4 => self.on_tel_id_4(sig, payload),
            _ => RxResult {
                error: Some(SegmentationError::NoSegmentationCapability),
                complete: None,
            },
        }
    }

    /// Standalone, unsegmented message: always completes on arrival. If a
    /// reassembly with the same signature was already in flight, that one is
    /// discarded and reported, then this telegram still completes normally.
    fn on_tel_id_0(&mut self, sig: ReassemblySignature, payload: &[u8]) -> RxResult {
        let error = self.find(sig).map(|idx| {
            self.free(idx);
            SegmentationError::DuplicateSignature
        });
        let mut v = heapless::Vec::new();
        let _ = v.extend_from_slice(payload);
        RxResult {
            error,
            complete: Some(CompleteMessage { sig, payload: v }),
        }
    }

    /// Size-prefixed announcement: allocates the reassembly slot ahead of
    /// the body segments that follow.
    fn on_tel_id_4(&mut self, sig: ReassemblySignature, payload: &[u8]) -> RxResult {
        let mut error = self.find(sig).map(|idx| {
            self.free(idx);
            SegmentationError::DuplicateSignature
        });
        if payload.len() < 2 {
            return RxResult {
                error: Some(error.unwrap_or(SegmentationError::CannotAllocatePayload)),
                complete: None,
            };
        }
        let size = u16::from_be_bytes([payload[0], payload[1]]) as usize;
        if size > MAX_REASSEMBLY_SIZE {
            return RxResult {
                error: Some(error.unwrap_or(SegmentationError::CannotAllocatePayload)),
                complete: None,
            };
        }
        match self.slots.checkout() {
            Some((idx, slot)) => {
                *slot = ReassemblySlot::fresh(sig);
                self.active.insert_tail(self.slots.slab_mut(), idx);
            }
            None => error = Some(error.unwrap_or(SegmentationError::TooManyReassemblies)),
        }
        RxResult { error, complete: None }
    }

    /// First body segment. Reuses the handle a preceding `TelId` 4 allocated,
    /// or allocates a fresh one if this message turned out to fit without an
    /// announcement (a small message sent as a bare `TelId` 1/.../3 run).
    fn on_tel_id_1(&mut self, sig: ReassemblySignature, tel_cnt: u8, payload: &[u8]) -> RxResult {
        if tel_cnt != 0 {
            return RxResult {
                error: Some(SegmentationError::WrongTelCnt),
                complete: None,
            };
        }
        let idx = match self.find(sig) {
            Some(idx) => idx,
            None => match self.slots.checkout() {
                Some((idx, slot)) => {
                    *slot = ReassemblySlot::fresh(sig);
                    self.active.insert_tail(self.slots.slab_mut(), idx);
                    idx
                }
                None => {
                    return RxResult {
                        error: Some(SegmentationError::TooManyReassemblies),
                        complete: None,
                    }
                }
            },
        };
        if let Some(e) = self.append(idx, payload) {
            return RxResult { error: Some(e), complete: None };
        }
        self.slots.get_mut(idx).next_tel_cnt = 1;
        RxResult { error: None, complete: None }
    }

    /// Middle (`TelId` 2) or last (`TelId` 3) body segment.
    fn on_tel_id_body(
        &mut self,
        sig: ReassemblySignature,
        tel_cnt: u8,
        payload: &[u8],
        is_last: bool,
    ) -> RxResult {
        let Some(idx) = self.find(sig) else {
            return RxResult {
                error: Some(SegmentationError::FirstSegmentMissing),
                complete: None,
            };
        };
        if tel_cnt != self.slots.get(idx).next_tel_cnt {
            self.free(idx);
            return RxResult {
                error: Some(SegmentationError::WrongTelCnt),
                complete: None,
            };
        }
        if let Some(e) = self.append(idx, payload) {
            return RxResult { error: Some(e), complete: None };
        }
        self.slots.get_mut(idx).next_tel_cnt = tel_cnt.wrapping_add(1);
        if is_last {
            RxResult {
                error: None,
                complete: Some(self.take_complete(idx)),
            }
        } else {
            RxResult { error: None, complete: None }
        }
    }

    /// Free every in-flight reassembly unconditionally. Used by AMS cleanup
    /// on a fatal transport event, where partially-reassembled messages have
    /// no chance of ever completing.
    pub fn drain(&mut self) {
        let mut indices = heapless::Vec::<u16, N>::new();
        self.active.for_each(self.slots.slab(), |idx| {
            let _ = indices.push(idx);
            true
        });
        for idx in indices {
            self.free(idx);
        }
    }

    /// Two-pass mark-and-sweep GC, run every `segmentation_gc_period_ms`.
    /// A slot must survive two consecutive sweeps untouched (no append
    /// between them) before it is reaped; `append` clears the mark, so any
    /// activity resets the clock.
    pub fn gc_tick(&mut self) -> heapless::Vec<ReassemblySignature, N> {
        self.events.take(crate::events::segmentation::GC_TICK);

        let mut indices = heapless::Vec::<u16, N>::new();
        self.active.for_each(self.slots.slab(), |idx| {
            let _ = indices.push(idx);
            true
        });

        let mut reaped = heapless::Vec::new();
        for idx in indices.iter().copied() {
            if self.slots.get(idx).mark {
                let sig = self.slots.get(idx).sig;
                self.free(idx);
                let _ = reaped.push(sig);
            }
        }

        let mut survivors = heapless::Vec::<u16, N>::new();
        self.active.for_each(self.slots.slab(), |idx| {
            let _ = survivors.push(idx);
            true
        });
        for idx in survivors {
            self.slots.get_mut(idx).mark = true;
        }

        reaped
    }
}

impl<const N: usize> Default for Segmentation<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the two-byte payload of a synthetic error reply: OpType is set by
/// the caller to `ERROR`, first payload byte is the fixed `0x0C` marker,
/// second is the error's numeric code.
pub fn error_reply_payload(error: SegmentationError) -> [u8; 2] {
    [0x0C, error.code()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{CMessage, PoolKind};

    fn sig(source: u16) -> ReassemblySignature {
        ReassemblySignature {
            source,
            msg_id: MessageId::default(),
        }
    }

    #[test]
    fn single_segment_payload_uses_tel_id_0() {
        let mut cursor = TxCursor::new(&[1, 2, 3]);
        let mut msg = CMessage::new(PoolKind::TxObject);
        cursor.next_into(&mut msg);
        assert_eq!(msg.telegram.tel_id, 0);
        assert!(cursor.is_done());
    }

    #[test]
    fn oversized_payload_announces_then_segments_with_final_empty_tail() {
        let payload = [7u8; MAX_PAYLOAD + 3]; // one full body chunk + 3 bytes
        let mut cursor = TxCursor::new(&payload);
        let mut msg = CMessage::new(PoolKind::TxObject);

        cursor.next_into(&mut msg);
        assert_eq!(msg.telegram.tel_id, 4);
        assert_eq!(u16::from_be_bytes([msg.payload()[0], msg.payload()[1]]), payload.len() as u16);
        assert!(!cursor.is_done());

        cursor.next_into(&mut msg);
        assert_eq!(msg.telegram.tel_id, 1);
        assert_eq!(msg.telegram.tel_cnt, 0);
        assert!(!cursor.is_done());

        cursor.next_into(&mut msg);
        assert_eq!(msg.telegram.tel_id, 3);
        assert_eq!(msg.telegram.tel_cnt, 1);
        assert_eq!(msg.payload_len(), 3);
        assert!(cursor.is_done());
    }

    #[test]
    fn exact_chunk_payload_gets_trailing_empty_completion_segment() {
        let payload = [9u8; MAX_PAYLOAD];
        let mut cursor = TxCursor::new(&payload);
        let mut msg = CMessage::new(PoolKind::TxObject);

        cursor.next_into(&mut msg); // TelId 4
        cursor.next_into(&mut msg); // TelId 1, full chunk
        assert!(!cursor.is_done());
        cursor.next_into(&mut msg); // TelId 3, empty
        assert_eq!(msg.telegram.tel_id, 3);
        assert_eq!(msg.payload_len(), 0);
        assert!(cursor.is_done());
    }

    #[test]
    fn tel_id_0_completes_immediately() {
        let mut seg: Segmentation<4> = Segmentation::new();
        let r = seg.on_rx_telegram(sig(1), 0, 0, &[1, 2, 3]);
        assert!(r.error.is_none());
        assert_eq!(r.complete.unwrap().payload.as_slice(), &[1, 2, 3]);
        assert_eq!(seg.active_count(), 0);
    }

    #[test]
    fn full_segmented_sequence_reassembles_in_order() {
        let mut seg: Segmentation<4> = Segmentation::new();
        let s = sig(2);
        assert!(seg.on_rx_telegram(s, 4, 0, &10u16.to_be_bytes()).error.is_none());
        assert!(seg.on_rx_telegram(s, 1, 0, &[1, 2, 3, 4, 5]).error.is_none());
        let r = seg.on_rx_telegram(s, 3, 1, &[6, 7, 8, 9, 10]);
        assert!(r.error.is_none());
        assert_eq!(r.complete.unwrap().payload.as_slice(), &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
        assert_eq!(seg.active_count(), 0);
    }

    #[test]
    fn body_segment_with_no_first_segment_errors() {
        let mut seg: Segmentation<4> = Segmentation::new();
        let r = seg.on_rx_telegram(sig(3), 2, 1, &[1, 2]);
        assert_eq!(r.error, Some(SegmentationError::FirstSegmentMissing));
    }

    #[test]
    fn wrong_tel_cnt_frees_the_reassembly() {
        let mut seg: Segmentation<4> = Segmentation::new();
        let s = sig(4);
        seg.on_rx_telegram(s, 1, 0, &[1, 2]);
        let r = seg.on_rx_telegram(s, 2, 9, &[3, 4]);
        assert_eq!(r.error, Some(SegmentationError::WrongTelCnt));
        assert_eq!(seg.active_count(), 0);
    }

    #[test]
    fn duplicate_tel_id_4_signature_errors_and_replaces() {
        let mut seg: Segmentation<4> = Segmentation::new();
        let s = sig(5);
        seg.on_rx_telegram(s, 4, 0, &20u16.to_be_bytes());
        let r = seg.on_rx_telegram(s, 4, 0, &20u16.to_be_bytes());
        assert_eq!(r.error, Some(SegmentationError::DuplicateSignature));
        assert_eq!(seg.active_count(), 1);
    }

    #[test]
    fn gc_reaps_only_after_two_idle_sweeps() {
        let mut seg: Segmentation<4> = Segmentation::new();
        let s = sig(6);
        seg.on_rx_telegram(s, 4, 0, &10u16.to_be_bytes());
        seg.on_rx_telegram(s, 1, 0, &[1, 2, 3]);

        let reaped = seg.gc_tick();
        assert!(reaped.is_empty());
        assert_eq!(seg.active_count(), 1);

        let reaped = seg.gc_tick();
        assert_eq!(reaped.len(), 1);
        assert_eq!(reaped[0], s);
        assert_eq!(seg.active_count(), 0);
    }

    #[test]
    fn append_between_sweeps_keeps_the_reassembly_alive() {
        let mut seg: Segmentation<4> = Segmentation::new();
        let s = sig(7);
        seg.on_rx_telegram(s, 4, 0, &10u16.to_be_bytes());
        seg.on_rx_telegram(s, 1, 0, &[1, 2, 3]);
        seg.gc_tick();
        seg.on_rx_telegram(s, 2, 1, &[4, 5]);
        let reaped = seg.gc_tick();
        assert!(reaped.is_empty());
        assert_eq!(seg.active_count(), 1);
    }
}
