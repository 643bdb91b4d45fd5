//! Transceiver (component I): the per-FIFO-pair façade that owns a Tx
//! message pool, picks a destination FIFO per outgoing telegram, and routes
//! inbound telegrams to a registered consumer (`spec.md` §4.I).
//!
//! One transceiver sits in front of each of the three PMF instances; AMS
//! talks to whichever transceiver its MCM/RCM routing predicate selects.

use crate::codec::{self, ContentType};
use crate::fifo::{PortMessageFifo, TxCompletion};
use crate::message::{CMessage, PoolKind};
use crate::pmp::{Direction, FifoId, MsgType};
use crate::pool::StaticPool;

/// Default source address used when a Tx message does not set one explicitly.
pub const DEFAULT_SOURCE_ADDR: u16 = 0x0110;

/// A fully-formed Tx telegram ready for `service_tx`, or the reason one
/// could not be allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxAllocError {
    PayloadTooLarge,
    PoolExhausted,
}

/// Owns the Tx message pool for one FIFO and the dialect it speaks.
pub struct Transceiver<const N: usize> {
    content_type: ContentType,
    tx_pool: StaticPool<CMessage, N>,
    src_addr: u16,
}

impl<const N: usize> Transceiver<N> {
    pub fn new(content_type: ContentType, tx_slots: [CMessage; N], src_addr: u16) -> Self {
        Self {
            content_type,
            tx_pool: StaticPool::new(tx_slots),
            src_addr,
        }
    }

    /// Allocate and initialize a Tx message for a payload of `size` bytes
    /// (size is the application payload before any telegram header is
    /// written; rejected above [`crate::message::MAX_PAYLOAD`]).
    pub fn tx_allocate(&mut self, size: usize) -> Result<u16, TxAllocError> {
        if size > crate::message::MAX_PAYLOAD {
            return Err(TxAllocError::PayloadTooLarge);
        }
        let (idx, msg) = self
            .tx_pool
            .checkout()
            .ok_or(TxAllocError::PoolExhausted)?;
        msg.reuse();
        msg.src_addr = self.src_addr;
        Ok(idx)
    }

    pub fn tx_message_mut(&mut self, idx: u16) -> &mut CMessage {
        self.tx_pool.get_mut(idx)
    }

    pub fn tx_message(&self, idx: u16) -> &CMessage {
        self.tx_pool.get(idx)
    }

    pub fn release(&mut self, idx: u16) {
        self.tx_pool.release(idx);
    }

    pub fn available(&self) -> usize {
        self.tx_pool.available()
    }

    /// Encode `idx`'s header and hand it to `fifo`'s `waiting` queue. The
    /// payload and telegram-position fields must already be set by the caller
    /// (typically the segmentation engine).
    pub fn tx_send(&mut self, fifo: &mut PortMessageFifo, idx: u16, bypass: bool) {
        {
            let msg = self.tx_pool.get_mut(idx);
            codec::encode(self.content_type, msg);
        }
        fifo.enqueue_tx(self.tx_pool.slab_mut(), idx, bypass);
    }

    /// Decode an inbound PM payload of dialect `content_type` into a fresh Rx
    /// message, given the already-validated PMP header.
    pub fn rx_decode(&self, content_type: ContentType, raw: &[u8], into: &mut CMessage) {
        codec::decode(content_type, raw, into);
    }

    /// Run the Tx service loop for `fifo`, applying any armed status first
    /// and moving ready messages into flight, invoking `on_complete` for
    /// every telegram `fifo` finishes (successfully or not).
    pub fn service(
        &mut self,
        fifo: &mut PortMessageFifo,
        mut on_complete: impl FnMut(u16, TxCompletion),
    ) {
        if fifo.cancel_all_running() {
            fifo.recover_cancel_all(self.tx_pool.slab_mut(), &mut on_complete);
        } else {
            fifo.apply_tx_status(self.tx_pool.slab_mut(), &mut on_complete);
        }
        fifo.service_tx(self.tx_pool.slab_mut());
    }
}

/// Build a fresh outbound data-message PM header for `msg` against `fifo_id`,
/// reusing whatever SID the FIFO assigns at `service_tx` time — this only
/// writes the direction/type/fifo-id bits the PMP layer controls, leaving
/// `sid` to be patched in by the FIFO right before the LLD call.
pub fn stamp_pm_header(buf: &mut [u8], fifo_id: FifoId, sid: u8) {
    crate::pmp::build_header(buf, 3, 0, fifo_id, MsgType::Data, Direction::Tx, sid, 0, 0);
}
