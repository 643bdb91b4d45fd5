//! Compile/init-time configuration knobs for the communication stack.
//!
//! Loading these values from flash or a sysfs configurator is out of scope;
//! only the in-memory shape and its defaults live here.

use serde::{Deserialize, Serialize};

/// Per-FIFO sync/credit profile. Three presets exist: MCM gets a larger
/// window, ICM/RCM ("conventional") get the common default, and a "tiny"
/// footprint profile drives all three FIFOs down to their protocol minimum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FifoProfile {
    /// Tx credits granted to the INIC at sync time.
    pub tx_credits: u8,
    /// Rx credits advertised in the sync command.
    pub rx_credits: u8,
    /// Rx-busy threshold at which an acknowledge is armed.
    pub rx_ack_threshold: u8,
    /// Number of idle watchdog periods (each 100 ms) before a status probe.
    pub tx_wd_periods: u8,
}

impl FifoProfile {
    /// MCM default: a wider credit window than the conventional FIFOs.
    pub const MCM_DEFAULT: Self = Self {
        tx_credits: 21,
        rx_credits: 21,
        rx_ack_threshold: 8,
        tx_wd_periods: 10,
    };

    /// Default profile for ICM/RCM ("conventional" FIFOs).
    pub const CONVENTIONAL_DEFAULT: Self = Self {
        tx_credits: 5,
        rx_credits: 5,
        rx_ack_threshold: 4,
        tx_wd_periods: 10,
    };

    /// Smallest footprint profile; requires INIC acceptance of
    /// `{credits=3, ack=2}` (see the open question in the design notes).
    pub const TINY: Self = Self {
        tx_credits: 3,
        rx_credits: 3,
        rx_ack_threshold: 2,
        tx_wd_periods: 10,
    };
}

/// Top-level configuration for the stack. Constructed once at startup and
/// handed by value (or by shared reference) to the components that need it;
/// there is no mutation after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackConfig {
    /// Channel Rx pool size, shared by all three FIFOs. `[10..65535]`.
    pub pool_size_rx: u16,
    /// Sync/credit profile applied to the MCM FIFO.
    pub mcm_profile: FifoProfile,
    /// Sync/credit profile applied to the ICM and RCM FIFOs.
    pub conventional_profile: FifoProfile,
    /// Number of reserved Tx message slots per FIFO (component E pool). `[5..255]`.
    pub num_tx_msgs: u8,
    /// Number of reserved Rx message slots per FIFO. `[5..255]`.
    pub num_rx_msgs: u8,
    /// Tx telegram payload slot size in bytes. `[45..65535]`.
    pub size_tx_msg: u16,
    /// Rx telegram payload slot size in bytes. `[45..65535]`.
    pub size_rx_msg: u16,
    /// Default LLRBC (Low-Level Retry Block Count) applied to AMS Tx messages. `[0..100]`.
    pub ams_default_llrbc: u8,
    /// Default Rx payload size used when a segmented message has no size prefix.
    pub rx_default_payload_size: u16,
    /// Sync handshake retry interval in milliseconds.
    pub sync_retry_interval_ms: u32,
    /// Sync handshake retry budget.
    pub sync_retry_budget: u8,
    /// Unsync handshake retry interval in milliseconds.
    pub unsync_retry_interval_ms: u32,
    /// Unsync handshake retry budget (0 by default — no retries).
    pub unsync_retry_budget: u8,
    /// Segmentation reassembly garbage-collection period in milliseconds.
    pub segmentation_gc_period_ms: u32,
    /// Whether to use the tiny footprint profile for all three FIFOs.
    pub tiny_footprint: bool,
}

impl StackConfig {
    /// Channel pool size floor (`spec.md` §6).
    pub const POOL_SIZE_RX_MIN: u16 = 10;
    /// Channel pool size ceiling.
    pub const POOL_SIZE_RX_MAX: u16 = 65535;
    /// Tiny-footprint channel pool size.
    pub const POOL_SIZE_RX_TINY: u16 = 10;

    /// Apply the tiny footprint profile (all three FIFOs at protocol minimum,
    /// pool size at its floor). See the open question about INIC acceptance
    /// of `{credits=3, ack=2}` before shipping this in production.
    pub fn apply_tiny_footprint(&mut self) {
        self.tiny_footprint = true;
        self.pool_size_rx = Self::POOL_SIZE_RX_TINY;
        self.mcm_profile = FifoProfile::TINY;
        self.conventional_profile = FifoProfile::TINY;
    }
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            pool_size_rx: 35,
            mcm_profile: FifoProfile::MCM_DEFAULT,
            conventional_profile: FifoProfile::CONVENTIONAL_DEFAULT,
            num_tx_msgs: 20,
            num_rx_msgs: 20,
            size_tx_msg: 45,
            size_rx_msg: 45,
            ams_default_llrbc: 10,
            rx_default_payload_size: 400,
            sync_retry_interval_ms: 50,
            sync_retry_budget: 40,
            unsync_retry_interval_ms: 200,
            unsync_retry_budget: 0,
            segmentation_gc_period_ms: 5_000,
            tiny_footprint: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_spec_defaults() {
        let cfg = StackConfig::default();
        assert_eq!(cfg.pool_size_rx, 35);
        assert_eq!(cfg.mcm_profile.tx_credits, 21);
        assert_eq!(cfg.mcm_profile.rx_ack_threshold, 8);
        assert_eq!(cfg.conventional_profile.tx_credits, 5);
        assert_eq!(cfg.conventional_profile.rx_ack_threshold, 4);
        assert_eq!(cfg.ams_default_llrbc, 10);
        assert_eq!(cfg.rx_default_payload_size, 400);
    }

    #[test]
    fn tiny_footprint_drops_to_minimums() {
        let mut cfg = StackConfig::default();
        cfg.apply_tiny_footprint();
        assert_eq!(cfg.pool_size_rx, 10);
        assert_eq!(cfg.mcm_profile.tx_credits, 3);
        assert_eq!(cfg.mcm_profile.rx_ack_threshold, 2);
        assert_eq!(cfg.conventional_profile.tx_credits, 3);
    }
}
