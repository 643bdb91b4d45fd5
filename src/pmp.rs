//! Port Message Protocol (PMP): bit-level builder/parser for the 3–5-byte
//! PM header that precedes every telegram on the wire.
//!
//! Wire layout (big-endian multi-byte fields), grounded byte-for-byte on
//! the reference implementation's `Pmp_*` accessors:
//!
//! ```text
//! byte 0..1   PML   (big-endian 16-bit; only the low byte is meaningful —
//!                     a nonzero high byte makes the value read back as 0)
//! byte 2      PMHL (bits 4:0) | VERSION (bits 7:5, fixed at 0b010)
//! byte 3      FIFO id (bits 5:3) | message type (bits 2:1) | direction (bit 0)
//! byte 4      SID
//! byte 5      ExtType: type (bits 7:5) | code (bits 4:0)
//! byte 6..7   stuffing (present only for PMHL 4 and 5)
//! byte PMHL+3.. payload
//! ```

use crate::error::PmpError;

const IDX_PML_H: usize = 0;
const IDX_PML_L: usize = 1;
const IDX_PMHL: usize = 2;
const IDX_FPH: usize = 3;
const IDX_SID: usize = 4;
const IDX_EXT_TYPE: usize = 5;

const PMHL_MASK: u8 = 0x1F;
const VERSION_MASK: u8 = 0xE0;
const VERSION: u8 = 0x40; // bits 7:5 = 0b010

const FPH_DIR_MASK: u8 = 0x01;
const FPH_DIR_RX: u8 = 0x01;
const FPH_TYPE_POS: u8 = 1;
const FPH_TYPE_MASK: u8 = 0x06;
const FPH_ID_POS: u8 = 3;
const FPH_ID_MASK: u8 = 0x38;

const EXT_TYPE_POS: u8 = 5;
const EXT_TYPE_MASK: u8 = 0xE0;
const EXT_CODE_MASK: u8 = 0x1F;

/// Largest payload+header PML may describe.
pub const PML_MAX_SIZE_CTRL: u16 = 69;
/// Minimum and maximum PM header length.
pub const PMHL_MIN_SIZE: u8 = 3;
pub const PMHL_MAX_SIZE: u8 = 5;

/// Logical FIFO identifier carried in the FPH byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FifoId {
    Mcm = 0,
    Icm = 2,
    /// Addressed to all FIFOs (control use only, never a Rx source).
    All = 3,
    Rcm = 6,
}

impl FifoId {
    pub const fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(Self::Mcm),
            2 => Some(Self::Icm),
            3 => Some(Self::All),
            6 => Some(Self::Rcm),
            _ => None,
        }
    }
}

/// Message type carried in the FPH byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MsgType {
    Cmd = 0,
    Status = 1,
    Data = 2,
}

impl MsgType {
    pub const fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(Self::Cmd),
            1 => Some(Self::Status),
            2 => Some(Self::Data),
            _ => None,
        }
    }
}

/// Direction bit in the FPH byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Direction {
    Tx = 0,
    Rx = 1,
}

/// Status type, the high 3 bits of ExtType on a STATUS message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StatusType {
    Failure = 0,
    Flow = 1,
    Synced = 4,
    UnsyncedBusy = 5,
    UnsyncedReady = 6,
}

impl StatusType {
    pub const fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(Self::Failure),
            1 => Some(Self::Flow),
            4 => Some(Self::Synced),
            5 => Some(Self::UnsyncedBusy),
            6 => Some(Self::UnsyncedReady),
            _ => None,
        }
    }
}

/// Status code, the low 5 bits of ExtType on a STATUS message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StatusCode {
    Busy = 0,
    Success = 1,
    Canceled = 3,
    Nack = 8,
}

impl StatusCode {
    pub const fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(Self::Busy),
            1 => Some(Self::Success),
            3 => Some(Self::Canceled),
            8 => Some(Self::Nack),
            _ => None,
        }
    }
}

/// Extended code on a `StatusType::Failure` status (the low 5 bits of
/// ExtType). Unrecognized wire values fall through `from_bits` to `None`,
/// which the AMS layer treats the same as `CfgNoRcvr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FailureCode {
    CfgNoRcvr = 0x01,
    Bf = 0x08,
    Crc = 0x09,
    Id = 0x0A,
    Ack = 0x0B,
    Timeout = 0x0C,
    FatalWt = 0x10,
    FatalOa = 0x11,
    NaTrans = 0x18,
    NaOff = 0x19,
}

impl FailureCode {
    pub const fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0x01 => Some(Self::CfgNoRcvr),
            0x08 => Some(Self::Bf),
            0x09 => Some(Self::Crc),
            0x0A => Some(Self::Id),
            0x0B => Some(Self::Ack),
            0x0C => Some(Self::Timeout),
            0x10 => Some(Self::FatalWt),
            0x11 => Some(Self::FatalOa),
            0x18 => Some(Self::NaTrans),
            0x19 => Some(Self::NaOff),
            _ => None,
        }
    }
}

/// Reason carried alongside `UNSYNCED_*` statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum UnsyncReason {
    Startup = 1,
    Reinit = 2,
    Command = 3,
    AckTimeout = 4,
    WdTimeout = 5,
    TxTimeout = 6,
}

/// Command type, the high 3 bits of ExtType on a CMD message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandType {
    ReqStatus = 0,
    MsgAction = 1,
    Synchronization = 4,
}

/// Command code, the low 5 bits of ExtType on a CMD message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandCode {
    ReqStatus = 0,
    ActionRetry = 1,
    ActionCancel = 2,
    ActionCancelAll = 3,
    Unsync = 10,
    Sync = 21,
}

/// A decoded PM header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PmHeader {
    pub pml: u16,
    pub pmhl: u8,
    pub fifo_id: FifoId,
    pub msg_type: MsgType,
    pub direction: Direction,
    pub sid: u8,
    pub ext_type: u8,
    pub ext_code: u8,
}

impl PmHeader {
    /// Byte offset of the payload relative to the start of the header.
    pub const fn payload_offset(&self) -> usize {
        self.pmhl as usize + 3
    }

    /// Payload length implied by `pml` and `pmhl`.
    pub const fn payload_len(&self) -> u16 {
        self.pml - (self.pmhl as u16 + 1)
    }
}

/// Write `pml`'s low byte into `buf`; the high byte is always written zero,
/// matching the reference's "high byte nonzero reads back as 0" behavior.
pub fn set_pml(buf: &mut [u8], pml: u16) {
    buf[IDX_PML_H] = (pml >> 8) as u8;
    buf[IDX_PML_L] = pml as u8;
}

/// Read `pml` back. If the high byte is nonzero the reference implementation
/// treats the value as unusable and reports 0; preserved here for fidelity.
pub fn get_pml(buf: &[u8]) -> u16 {
    if buf[IDX_PML_H] != 0 {
        0
    } else {
        u16::from(buf[IDX_PML_L])
    }
}

/// Write PMHL (bits 4:0) and the fixed version bits (7:5) into byte 2.
pub fn set_pmhl(buf: &mut [u8], pmhl: u8) {
    buf[IDX_PMHL] = (pmhl & PMHL_MASK) | VERSION;
}

pub fn get_pmhl(buf: &[u8]) -> u8 {
    buf[IDX_PMHL] & PMHL_MASK
}

fn get_version(buf: &[u8]) -> u8 {
    buf[IDX_PMHL] & VERSION_MASK
}

/// Write the FIFO id / message type / direction byte.
pub fn set_fph(buf: &mut [u8], fifo_id: FifoId, msg_type: MsgType, direction: Direction) {
    let id_bits = (fifo_id as u8) << FPH_ID_POS;
    let type_bits = (msg_type as u8) << FPH_TYPE_POS;
    let dir_bit = direction as u8;
    buf[IDX_FPH] = (id_bits & FPH_ID_MASK) | (type_bits & FPH_TYPE_MASK) | (dir_bit & FPH_DIR_MASK);
}

pub fn get_fifo_id(buf: &[u8]) -> Option<FifoId> {
    FifoId::from_bits((buf[IDX_FPH] & FPH_ID_MASK) >> FPH_ID_POS)
}

pub fn get_msg_type(buf: &[u8]) -> Option<MsgType> {
    MsgType::from_bits((buf[IDX_FPH] & FPH_TYPE_MASK) >> FPH_TYPE_POS)
}

pub fn get_direction(buf: &[u8]) -> Direction {
    if buf[IDX_FPH] & FPH_DIR_MASK == FPH_DIR_RX {
        Direction::Rx
    } else {
        Direction::Tx
    }
}

pub fn set_sid(buf: &mut [u8], sid: u8) {
    buf[IDX_SID] = sid;
}

pub fn get_sid(buf: &[u8]) -> u8 {
    buf[IDX_SID]
}

/// Write the ExtType byte from its (type, code) halves.
pub fn set_ext_type(buf: &mut [u8], ext_type: u8, ext_code: u8) {
    buf[IDX_EXT_TYPE] = ((ext_type << EXT_TYPE_POS) & EXT_TYPE_MASK) | (ext_code & EXT_CODE_MASK);
}

pub fn get_ext_type(buf: &[u8]) -> u8 {
    (buf[IDX_EXT_TYPE] & EXT_TYPE_MASK) >> EXT_TYPE_POS
}

pub fn get_ext_code(buf: &[u8]) -> u8 {
    buf[IDX_EXT_TYPE] & EXT_CODE_MASK
}

/// Build a complete PM header (stuffing bytes included for PMHL 4/5) at the
/// front of `buf`. `buf` must be at least `pmhl + 3` bytes.
#[allow(clippy::too_many_arguments)]
pub fn build_header(
    buf: &mut [u8],
    pmhl: u8,
    payload_len: u16,
    fifo_id: FifoId,
    msg_type: MsgType,
    direction: Direction,
    sid: u8,
    ext_type: u8,
    ext_code: u8,
) {
    let pml = payload_len + u16::from(pmhl) + 1;
    set_pml(buf, pml);
    set_pmhl(buf, pmhl);
    set_fph(buf, fifo_id, msg_type, direction);
    set_sid(buf, sid);
    set_ext_type(buf, ext_type, ext_code);
    // Stuffing bytes for PMHL > 3: zero-fill up to the payload offset.
    for i in 6..(pmhl as usize + 3) {
        buf[i] = 0;
    }
}

/// Decode a PM header, assuming `verify_header` already passed.
pub fn decode_header(buf: &[u8]) -> Result<PmHeader, PmpError> {
    let pmhl = get_pmhl(buf);
    let fifo_id = get_fifo_id(buf).ok_or(PmpError::BadHeaderLength)?;
    let msg_type = get_msg_type(buf).ok_or(PmpError::BadHeaderLength)?;
    Ok(PmHeader {
        pml: get_pml(buf),
        pmhl,
        fifo_id,
        msg_type,
        direction: get_direction(buf),
        sid: get_sid(buf),
        ext_type: get_ext_type(buf),
        ext_code: get_ext_code(buf),
    })
}

/// Validate a received PM header per `spec.md` §4.C:
/// PMHL ∈ [3,5], version bits correct, PML ≥ PMHL+1, PML+2 ≤ buf_len,
/// PML ≤ 69, and the direction bit is RX (this is an inbound header).
pub fn verify_header(buf: &[u8], buf_len: usize) -> Result<(), PmpError> {
    let pmhl = get_pmhl(buf);
    if !(PMHL_MIN_SIZE..=PMHL_MAX_SIZE).contains(&pmhl) {
        return Err(PmpError::BadHeaderLength);
    }
    if get_version(buf) != VERSION {
        return Err(PmpError::BadVersion);
    }
    let pml = get_pml(buf);
    if pml < u16::from(pmhl) + 1 {
        return Err(PmpError::PmlTooSmall);
    }
    if pml as usize + 2 > buf_len {
        return Err(PmpError::BufferTooShort);
    }
    if pml > PML_MAX_SIZE_CTRL {
        return Err(PmpError::PmlTooLarge);
    }
    if get_direction(buf) != Direction::Rx {
        return Err(PmpError::WrongDirection);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_then_verify_then_decode_roundtrips() {
        let mut buf = [0u8; 72];
        build_header(&mut buf, 3, 10, FifoId::Mcm, MsgType::Data, Direction::Rx, 42, 1, 2);
        verify_header(&buf, buf.len()).expect("should verify");
        let hdr = decode_header(&buf).expect("should decode");
        assert_eq!(hdr.pml, 10 + 3 + 1);
        assert_eq!(hdr.pmhl, 3);
        assert_eq!(hdr.fifo_id, FifoId::Mcm);
        assert_eq!(hdr.msg_type, MsgType::Data);
        assert_eq!(hdr.sid, 42);
        assert_eq!(hdr.ext_type, 1);
        assert_eq!(hdr.ext_code, 2);
        assert_eq!(hdr.payload_offset(), 6);
        assert_eq!(hdr.payload_len(), 10);
    }

    #[test]
    fn pmhl_five_leaves_two_stuffing_bytes_before_payload() {
        let mut buf = [0xFFu8; 16];
        build_header(&mut buf, 5, 1, FifoId::Rcm, MsgType::Cmd, Direction::Rx, 0, 0, 0);
        let hdr = decode_header(&buf).unwrap();
        assert_eq!(hdr.payload_offset(), 8);
        assert_eq!(buf[6], 0);
        assert_eq!(buf[7], 0);
    }

    #[test]
    fn bad_header_length_rejected() {
        let mut buf = [0u8; 16];
        set_pmhl(&mut buf, 6);
        assert_eq!(verify_header(&buf, buf.len()), Err(PmpError::BadHeaderLength));
    }

    #[test]
    fn pml_too_large_rejected() {
        let mut buf = [0u8; 80];
        build_header(&mut buf, 3, 65, FifoId::Mcm, MsgType::Data, Direction::Rx, 0, 0, 0);
        assert_eq!(verify_header(&buf, buf.len()), Err(PmpError::PmlTooLarge));
    }

    #[test]
    fn buffer_too_short_rejected() {
        let mut buf = [0u8; 20];
        build_header(&mut buf, 3, 10, FifoId::Mcm, MsgType::Data, Direction::Rx, 0, 0, 0);
        assert_eq!(verify_header(&buf, 5), Err(PmpError::BufferTooShort));
    }

    #[test]
    fn wrong_direction_rejected() {
        let mut buf = [0u8; 20];
        build_header(&mut buf, 3, 1, FifoId::Mcm, MsgType::Data, Direction::Tx, 0, 0, 0);
        assert_eq!(verify_header(&buf, buf.len()), Err(PmpError::WrongDirection));
    }

    #[test]
    fn nonzero_pml_high_byte_reads_back_as_zero() {
        let mut buf = [0u8; 10];
        buf[IDX_PML_H] = 1;
        buf[IDX_PML_L] = 5;
        assert_eq!(get_pml(&buf), 0);
    }
}
