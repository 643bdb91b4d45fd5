//! Integration coverage for AMS's Rx waiting queue: what happens to an
//! inbound telegram that arrives while the reassembly pool is fully
//! checked out, and how it gets redriven once a slot frees up.

use unicens_core::ams::{Ams, RxOutcome};
use unicens_core::message::MessageId;
use unicens_core::segmentation::ReassemblySignature;

fn msg_id() -> MessageId {
    MessageId { fblock_id: 1, inst_id: 1, function_id: 1, op_type: 0 }
}

#[test]
fn reassembly_pool_exhaustion_queues_rx_until_a_slot_frees() {
    // SEGN=1: only one reassembly slot exists, so a second in-flight
    // message has nowhere to go until the first completes.
    let mut ams: Ams<2, 2, 1> = Ams::new(10);
    let sig_a = ReassemblySignature { source: 0x0200, msg_id: msg_id() };
    let sig_b = ReassemblySignature { source: 0x0201, msg_id: msg_id() };

    let outcome_a = ams.on_rx_telegram(sig_a, 4, 0, &10u16.to_be_bytes(), false);
    assert!(matches!(outcome_a, RxOutcome::Pending));

    let outcome_b = ams.on_rx_telegram(sig_b, 4, 0, &5u16.to_be_bytes(), false);
    assert!(matches!(outcome_b, RxOutcome::Queued), "pool is full, sig_b parks in the wait queue");

    // sig_a never completes; once it has sat idle for two GC sweeps the
    // reassembly slot is reaped and freed (see the segmentation timeout
    // scenario this composes with).
    assert!(ams.gc_tick().is_empty());
    let reaped = ams.gc_tick();
    assert_eq!(reaped.len(), 1);
    assert_eq!(reaped[0], sig_a);

    // Redrive the wait queue now that the slot is free.
    let redriven = ams.on_pool_freed(|_| false);
    assert_eq!(redriven.len(), 1);
    assert!(matches!(redriven[0], RxOutcome::Pending), "sig_b's announcement now gets the freed slot");
}

#[test]
fn rx_wait_queue_itself_can_be_exhausted_and_drops_the_telegram() {
    // RXWAIT=1: once the wait queue itself is full, further arrivals while
    // the reassembly pool is still starved are dropped outright.
    let mut ams: Ams<2, 1, 1> = Ams::new(10);
    let sig_a = ReassemblySignature { source: 0x0200, msg_id: msg_id() };
    let sig_b = ReassemblySignature { source: 0x0201, msg_id: msg_id() };
    let sig_c = ReassemblySignature { source: 0x0202, msg_id: msg_id() };

    assert!(matches!(ams.on_rx_telegram(sig_a, 4, 0, &10u16.to_be_bytes(), false), RxOutcome::Pending));
    assert!(matches!(ams.on_rx_telegram(sig_b, 4, 0, &10u16.to_be_bytes(), false), RxOutcome::Queued));
    assert!(matches!(ams.on_rx_telegram(sig_c, 4, 0, &10u16.to_be_bytes(), false), RxOutcome::Dropped));
}
