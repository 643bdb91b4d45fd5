//! Unified error types for the communication stack.
//!
//! Follows the same shape the rest of the stack uses everywhere else: a
//! single `Error` enum that every subsystem converts into, keeping the
//! scheduler's error handling uniform. All variants are `Copy` so they can
//! be threaded through FIFOs and the AMS dispatcher without allocation.

use core::fmt;

/// Every fallible operation in the core funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// PM header failed `Pmp::verify_header`.
    Pmp(PmpError),
    /// A FIFO-level protocol violation (bad SID, unexpected status, ...).
    Fifo(FifoError),
    /// Segmentation/reassembly error (spec error codes 1..7).
    Segmentation(SegmentationError),
    /// AMS-level address or parameter rejection.
    Ams(AmsError),
    /// A pool was exhausted when a caller required an allocation.
    PoolExhausted,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pmp(e) => write!(f, "pmp: {e}"),
            Self::Fifo(e) => write!(f, "fifo: {e}"),
            Self::Segmentation(e) => write!(f, "segmentation: {e}"),
            Self::Ams(e) => write!(f, "ams: {e}"),
            Self::PoolExhausted => write!(f, "pool exhausted"),
        }
    }
}

// ---------------------------------------------------------------------------
// PMP errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PmpError {
    /// PMHL outside `[3, 5]`.
    BadHeaderLength,
    /// Version bits did not equal `0b010`.
    BadVersion,
    /// `PML < PMHL + 1`.
    PmlTooSmall,
    /// `PML + 2 > buf_len`.
    BufferTooShort,
    /// `PML > 69`.
    PmlTooLarge,
    /// Direction bit was not RX on an inbound header.
    WrongDirection,
}

impl fmt::Display for PmpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadHeaderLength => write!(f, "header length out of range"),
            Self::BadVersion => write!(f, "unexpected version bits"),
            Self::PmlTooSmall => write!(f, "PML smaller than PMHL+1"),
            Self::BufferTooShort => write!(f, "buffer shorter than PML+2"),
            Self::PmlTooLarge => write!(f, "PML exceeds 69"),
            Self::WrongDirection => write!(f, "direction bit is not RX"),
        }
    }
}

impl From<PmpError> for Error {
    fn from(e: PmpError) -> Self {
        Self::Pmp(e)
    }
}

// ---------------------------------------------------------------------------
// FIFO errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FifoError {
    /// Incoming status SID failed the validity window test.
    StaleSid,
    /// Data PM arrived with an SID other than `expected_sid`.
    OutOfOrderSid,
    /// NACK status observed — treated as unrecoverable desync.
    NackDesync,
    /// Two watchdog ticks elapsed with no status reply.
    WatchdogTimeout,
    /// Sync handshake reply did not match the sent parameters.
    SyncParamMismatch,
    /// Unknown or unregistered FIFO id on an inbound PM.
    UnknownFifoId,
}

impl fmt::Display for FifoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StaleSid => write!(f, "status SID outside validity window"),
            Self::OutOfOrderSid => write!(f, "data PM SID out of order"),
            Self::NackDesync => write!(f, "NACK status, FIFO desynced"),
            Self::WatchdogTimeout => write!(f, "watchdog missed two ticks"),
            Self::SyncParamMismatch => write!(f, "sync reply parameter mismatch"),
            Self::UnknownFifoId => write!(f, "unknown FIFO id"),
        }
    }
}

impl From<FifoError> for Error {
    fn from(e: FifoError) -> Self {
        Self::Fifo(e)
    }
}

// ---------------------------------------------------------------------------
// Segmentation errors (spec error codes 1..7, mirrors Segm_Error_t)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SegmentationError {
    /// 1: a continuation segment arrived with no first segment on record.
    FirstSegmentMissing = 1,
    /// 2: no Rx payload slot available for this size.
    CannotAllocatePayload = 2,
    /// 3: arriving `tel_cnt` did not match the expected value.
    WrongTelCnt = 3,
    /// 4: reassembly list is full.
    TooManyReassemblies = 4,
    /// 5: reassembly was garbage-collected after two GC periods idle.
    Timeout = 5,
    /// 6: receiver has no segmentation capability.
    NoSegmentationCapability = 6,
    /// 7: a message with the same {source, msg_id} signature is already in progress.
    DuplicateSignature = 7,
}

impl fmt::Display for SegmentationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FirstSegmentMissing => write!(f, "first segment missing"),
            Self::CannotAllocatePayload => write!(f, "cannot allocate payload"),
            Self::WrongTelCnt => write!(f, "wrong tel_cnt"),
            Self::TooManyReassemblies => write!(f, "too many reassemblies"),
            Self::Timeout => write!(f, "reassembly timeout"),
            Self::NoSegmentationCapability => write!(f, "no segmentation capability"),
            Self::DuplicateSignature => write!(f, "duplicate signature"),
        }
    }
}

impl SegmentationError {
    /// Numeric code carried in the synthetic error reply's second payload byte.
    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl From<SegmentationError> for Error {
    fn from(e: SegmentationError) -> Self {
        Self::Segmentation(e)
    }
}

// ---------------------------------------------------------------------------
// AMS errors — the taxonomy surfaced on a Tx completion callback.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmsError {
    /// Destination is reserved (`0x0000..=0x000F`) or a too-large broadcast
    /// payload, or the INIC rejected the target as out of range (WT/OA).
    InvalidTarget,
    /// LLD-level retries were exhausted (BF/CRC/ID/ACK/TIMEOUT).
    RetriesExhausted,
    /// Transport not currently available (NA_TRANS/NA_OFF), desynced
    /// mid-transfer, or torn down under `stop()`.
    NotAvailable,
    /// Failure code the mapping table does not recognize (e.g. CFG_NO_RCVR).
    Unexpected,
}

impl fmt::Display for AmsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTarget => write!(f, "invalid target address"),
            Self::RetriesExhausted => write!(f, "retries exhausted"),
            Self::NotAvailable => write!(f, "not available"),
            Self::Unexpected => write!(f, "unexpected status"),
        }
    }
}

impl From<AmsError> for Error {
    fn from(e: AmsError) -> Self {
        Self::Ams(e)
    }
}

/// Stack-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
