//! The telegram object (`CMessage`): one PM plus its reserved buffer, a
//! prepend-without-copying header cursor, and the attributes the FIFO,
//! transceiver and AMS layers hang off it.
//!
//! Three header dialects share this carrier (component H lives in
//! `crate::codec`; this module only owns the data the dialects read and
//! write).

use crate::pool::Link;

/// Bytes reserved for headers, grown leftward as outer headers are prepended.
pub const RESERVED_HEADER: usize = 24;
/// Maximum telegram payload per `spec.md` §3 (`tel_len ≤ 45`).
pub const MAX_PAYLOAD: usize = 45;
/// Stuffing bytes budget (PMP header length 4/5 need up to 2).
pub const STUFFING: usize = 3;
/// Total reserved buffer size carried by every `CMessage`.
pub const BUF_SIZE: usize = RESERVED_HEADER + MAX_PAYLOAD + STUFFING;

/// FBlockID/InstID/FunctionID/OpType message identity, as carried by every
/// telegram dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessageId {
    pub fblock_id: u8,
    pub inst_id: u8,
    pub function_id: u16,
    pub op_type: u8,
}

/// FBlockID used by the "alt msg id" convention (`spec.md` §4.B).
const ALT_FBLOCK_ID: u8 = 0xCC;
/// OpType used by the alt convention: STATUS.
const ALT_OP_TYPE: u8 = 0x01;

impl MessageId {
    /// Pack this id using the alt-msg-id convention: FBlockID=0xCC,
    /// FunctionID low nibble=0xC, OpType=STATUS, high byte=InstID, mid byte
    /// = upper 4 bits of FunctionID.
    pub fn pack_alt(inst_id: u8, function_id_high_nibble: u8) -> Self {
        Self {
            fblock_id: ALT_FBLOCK_ID,
            inst_id,
            function_id: (u16::from(function_id_high_nibble & 0x0F) << 4) | 0x0C,
            op_type: ALT_OP_TYPE,
        }
    }

    /// True if this id was built with [`MessageId::pack_alt`].
    pub fn is_alt(&self) -> bool {
        self.fblock_id == ALT_FBLOCK_ID && self.function_id & 0x0F == 0x0C
    }
}

/// Tx-side retry/grouping options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TxOptions {
    /// Low-Level Retry Block Count requested of the INIC.
    pub llrbc: u8,
    /// Shared by every telegram of one segmented AMS message; 0 = none.
    pub cancel_id: u8,
}

/// Segmentation position of this telegram within its AMS message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TelegramInfo {
    /// 0 = single, 1/2/3 = first/middle/last body segment, 4 = size-prefixed first segment.
    pub tel_id: u8,
    pub tel_cnt: u8,
    pub tel_len: u8,
}

/// Which static pool a `CMessage` was checked out from — lets a message be
/// released through nothing but a reference to itself, per `spec.md` §4.A.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    TxObject,
    RxObject,
}

/// One telegram: a fixed 72-byte buffer plus the cursor and attributes the
/// stack's layers attach to it as it moves from AMS down to the LLD, or up
/// from the LLD to the application.
pub struct CMessage {
    pub(crate) link: Link,
    buf: [u8; BUF_SIZE],
    /// Index into `buf` where the current (possibly nested) header begins.
    cursor: usize,
    /// Bytes from `cursor` to the end of the currently valid region.
    size: usize,
    pub dest_addr: u16,
    pub src_addr: u16,
    pub msg_id: MessageId,
    pub tx_options: TxOptions,
    pub telegram: TelegramInfo,
    /// Back-link to the owning `AppMsg` slot; set by AMS/segmentation.
    pub info: Option<u16>,
    /// Set while the LLD owns this message; prevents reuse until released.
    pub tx_active: bool,
    pub pool_kind: PoolKind,
    /// Which FIFO this message belongs to, for routing `tx_release`/`rx_receive`.
    pub owner_fifo: Option<crate::pmp::FifoId>,
}

impl crate::pool::ListNode for CMessage {
    fn link(&self) -> &Link {
        &self.link
    }
    fn link_mut(&mut self) -> &mut Link {
        &mut self.link
    }
}

impl CMessage {
    /// A freshly zeroed message ready to be checked out of `pool_kind`'s pool.
    pub fn new(pool_kind: PoolKind) -> Self {
        Self {
            link: Link::new(),
            buf: [0u8; BUF_SIZE],
            cursor: RESERVED_HEADER,
            size: 0,
            dest_addr: 0,
            src_addr: 0,
            msg_id: MessageId::default(),
            tx_options: TxOptions::default(),
            telegram: TelegramInfo::default(),
            info: None,
            tx_active: false,
            pool_kind,
            owner_fifo: None,
        }
    }

    /// Reset to a freshly-constructed state, keeping the buffer allocation.
    pub fn reuse(&mut self) {
        self.buf = [0u8; BUF_SIZE];
        self.cursor = RESERVED_HEADER;
        self.size = 0;
        self.dest_addr = 0;
        self.src_addr = 0;
        self.msg_id = MessageId::default();
        self.tx_options = TxOptions::default();
        self.telegram = TelegramInfo::default();
        self.info = None;
        self.tx_active = false;
        self.owner_fifo = None;
    }

    /// Reserve the innermost header of `n` bytes, placing it immediately
    /// before the payload region (`buf[RESERVED_HEADER..]`). Payload writes
    /// start at `payload_mut()`.
    pub fn reserve_header(&mut self, n: usize) {
        debug_assert!(n <= RESERVED_HEADER, "header cursor would underflow reserved region");
        self.cursor = RESERVED_HEADER - n;
        self.size = n;
    }

    /// Prepend an outer header of `n` bytes to whatever is already reserved.
    pub fn pull_header(&mut self, n: usize) {
        debug_assert!(self.cursor >= n, "header cursor overflow");
        self.cursor -= n;
        self.size += n;
    }

    /// Undo the most recent `pull_header(n)`.
    pub fn push_header(&mut self, n: usize) {
        debug_assert!(self.size >= n, "push_header exceeds reserved size");
        self.cursor += n;
        self.size -= n;
    }

    /// The full header+payload region currently in use, from the cursor to
    /// the end of the payload.
    pub fn header_slice(&self) -> &[u8] {
        &self.buf[self.cursor..RESERVED_HEADER + self.payload_len()]
    }

    /// Mutable access to the same region.
    pub fn header_slice_mut(&mut self) -> &mut [u8] {
        let end = RESERVED_HEADER + self.payload_len();
        &mut self.buf[self.cursor..end]
    }

    /// Payload-only region, writable independent of the header cursor.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.buf[RESERVED_HEADER..RESERVED_HEADER + MAX_PAYLOAD]
    }

    pub fn payload(&self) -> &[u8] {
        &self.buf[RESERVED_HEADER..RESERVED_HEADER + MAX_PAYLOAD]
    }

    /// Number of valid payload bytes, per `telegram.tel_len`.
    pub fn payload_len(&self) -> usize {
        self.telegram.tel_len as usize
    }

    pub fn set_payload(&mut self, data: &[u8]) {
        debug_assert!(data.len() <= MAX_PAYLOAD);
        self.payload_mut()[..data.len()].copy_from_slice(data);
        self.telegram.tel_len = data.len() as u8;
    }

    /// Chain of buffers handed to the LLD for transmit: just the header
    /// slice, since this crate does not model a separate external payload
    /// buffer (unsegmented and segmented telegrams both fit in 72 bytes).
    pub fn get_mem_tx(&self) -> &[u8] {
        self.header_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_then_pull_then_push_header_tracks_cursor() {
        let mut msg = CMessage::new(PoolKind::TxObject);
        msg.telegram.tel_len = 10;
        msg.reserve_header(5); // innermost msg header
        assert_eq!(msg.header_slice().len(), 5 + 10);

        msg.pull_header(3); // outer PM header
        assert_eq!(msg.header_slice().len(), 3 + 5 + 10);

        msg.push_header(3);
        assert_eq!(msg.header_slice().len(), 5 + 10);
    }

    #[test]
    fn set_payload_updates_tel_len() {
        let mut msg = CMessage::new(PoolKind::TxObject);
        msg.set_payload(&[1, 2, 3, 4]);
        assert_eq!(msg.telegram.tel_len, 4);
        assert_eq!(&msg.payload()[..4], &[1, 2, 3, 4]);
    }

    #[test]
    fn alt_msg_id_round_trips_the_convention() {
        let id = MessageId::pack_alt(0x07, 0x0A);
        assert!(id.is_alt());
        assert_eq!(id.fblock_id, 0xCC);
        assert_eq!(id.inst_id, 0x07);
        assert_eq!(id.function_id & 0x0F, 0x0C);
        assert_eq!((id.function_id >> 4) & 0x0F, 0x0A);
    }
}
