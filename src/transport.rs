//! The LLD (Low-Level Driver) interface: the stack's abstract boundary to
//! hardware transport (`spec.md` §6). The LLD itself — hardware I/O,
//! interrupts, DMA — is out of scope; only its callback interface lives
//! here, grounded on the same "trait at the seam, concrete adapter owns
//! the hardware" shape the rest of this stack's ports use.

/// Host → LLD calls, made synchronously by the core.
pub trait LowLevelDriver {
    /// Called once by [`crate::channel::PortMessageChannel`] at startup.
    fn start(&mut self);
    /// Called once at shutdown.
    fn stop(&mut self);
    /// Request the LLD reset the INIC (out-of-band recovery path).
    fn reset_inic(&mut self);
    /// Hand one PM (a single contiguous byte chain, ≤ 72 bytes) to the LLD
    /// for transmission. Returns `false` if the LLD could not accept it
    /// right now; the caller decides how to retry.
    fn tx_transmit(&mut self, msg: &[u8]) -> bool;
}

/// A no-op LLD used in tests and as a teardown placeholder: it accepts
/// nothing and always reports readiness to release immediately, so higher
/// layers still observe deterministic completion after the channel stops.
#[derive(Debug, Default)]
pub struct NullDriver {
    pub started: bool,
}

impl LowLevelDriver for NullDriver {
    fn start(&mut self) {
        self.started = true;
    }
    fn stop(&mut self) {
        self.started = false;
    }
    fn reset_inic(&mut self) {}
    fn tx_transmit(&mut self, _msg: &[u8]) -> bool {
        false
    }
}
