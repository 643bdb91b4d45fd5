//! Host-side communication stack driving an Intelligent Network Interface
//! Controller (INIC) over a vendor Low-Level Driver (LLD).
//!
//! The stack is a cooperative, no_std-friendly pipeline from the wire up:
//! PMP header codec → Port Message Channel (LLD session + Rx pool) → Port
//! Message FIFOs (ICM/MCM/RCM, stop-and-wait PMF credit channel) → FIFO
//! group sync coordinator → transceivers → segmentation/reassembly → AMS,
//! all driven by one priority-ordered [`scheduler::Scheduler`].

#![deny(unused_must_use)]

pub mod ams;
pub mod channel;
pub mod codec;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod events;
pub mod fifo;
pub mod fifo_group;
pub mod message;
pub mod pmp;
pub mod pool;
pub mod scheduler;
pub mod segmentation;
pub mod transceiver;
pub mod transport;
