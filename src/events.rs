//! Per-component event-bit registers.
//!
//! Every cooperative service in the stack (a PMF, the FIFO-group
//! coordinator, AMS) owns one of these instead of a global queue: the LLD,
//! a timer callback, or a sibling component sets bits describing what kind
//! of work became ready, and the service's own `tick()` reads-and-clears
//! only the bits it is about to service. No blocking, no mutex: a single
//! `AtomicU32` per owner is enough because at most one producer context
//! (the scheduler loop, or a bounded LLD callback) touches it between ticks.

use core::sync::atomic::{AtomicU32, Ordering};

/// A bitset of pending work for one service, set by producers and consumed
/// by the owning service's scheduler tick.
#[derive(Debug, Default)]
pub struct EventBits(AtomicU32);

impl EventBits {
    /// A fresh, empty bit register.
    pub const fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    /// Set one or more bits. Safe to call from a bounded LLD callback.
    pub fn set(&self, mask: u32) {
        self.0.fetch_or(mask, Ordering::Release);
    }

    /// Read-and-clear the bits in `mask` that are currently set, returning
    /// which of them were set before the clear. Bits outside `mask` are
    /// left untouched so a service never clobbers another service's flags
    /// when registers happen to be shared (they normally are not).
    pub fn take(&self, mask: u32) -> u32 {
        self.0.fetch_and(!mask, Ordering::AcqRel) & mask
    }

    /// Non-destructive peek at the currently pending bits.
    pub fn peek(&self) -> u32 {
        self.0.load(Ordering::Acquire)
    }

    /// True if any bit in `mask` is pending.
    pub fn any(&self, mask: u32) -> bool {
        self.peek() & mask != 0
    }
}

/// Event bits owned by a [`crate::fifo::PortMessageFifo`].
pub mod pmf {
    /// Inbound PM(s) waiting in the channel dispatch handoff.
    pub const RX_SERVICE: u32 = 1 << 0;
    /// Waiting-queue Tx work (credits available, messages queued).
    pub const TX_SERVICE: u32 = 1 << 1;
    /// A FIFO status arrived and its side effects are not yet applied.
    pub const TX_APPLY_STATUS: u32 = 1 << 2;
    /// The per-FIFO watchdog timer elapsed.
    pub const WATCHDOG_TICK: u32 = 1 << 3;
}

/// Event bits owned by the [`crate::fifo_group::FifoGroup`] coordinator.
pub mod group {
    /// The sync/unsync attempt timer elapsed; re-evaluate retry budget.
    pub const RETRY_TICK: u32 = 1 << 0;
    /// One member FIFO's sync subject changed state.
    pub const MEMBER_STATE_CHANGED: u32 = 1 << 1;
}

/// Event bits owned by [`crate::segmentation::Segmentation`].
pub mod segmentation {
    /// The reassembly garbage-collection timer elapsed.
    pub const GC_TICK: u32 = 1 << 0;
    /// The Rx pool published a "freed" notification; re-drive queued telegrams.
    pub const POOL_FREED: u32 = 1 << 1;
}

/// Event bits owned by [`crate::ams::Ams`].
pub mod ams {
    /// The Tx queue has at least one message ready to be serviced.
    pub const TX_SERVICE: u32 = 1 << 0;
    /// The Rx waiting queue has telegrams to re-drive.
    pub const RX_SERVICE: u32 = 1 << 1;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_take_clears_only_requested_bits() {
        let bits = EventBits::new();
        bits.set(pmf::RX_SERVICE | pmf::WATCHDOG_TICK);
        let taken = bits.take(pmf::RX_SERVICE);
        assert_eq!(taken, pmf::RX_SERVICE);
        assert!(bits.any(pmf::WATCHDOG_TICK));
        assert!(!bits.any(pmf::RX_SERVICE));
    }

    #[test]
    fn take_on_empty_returns_zero() {
        let bits = EventBits::new();
        assert_eq!(bits.take(pmf::TX_SERVICE), 0);
    }

    #[test]
    fn peek_is_non_destructive() {
        let bits = EventBits::new();
        bits.set(pmf::TX_APPLY_STATUS);
        assert_eq!(bits.peek(), pmf::TX_APPLY_STATUS);
        assert_eq!(bits.peek(), pmf::TX_APPLY_STATUS);
    }
}
