//! Integration coverage for the FIFO's mid-stream cancel paths: a single
//! failing SID vs. a `CANCEL_ALL` unwinding a segmented message's siblings.

use core::array;
use unicens_core::config::FifoProfile;
use unicens_core::fifo::{IncomingStatus, PortMessageFifo, TxCompletion};
use unicens_core::message::{CMessage, PoolKind};
use unicens_core::pmp::{FailureCode, FifoId, StatusCode, StatusType};

fn slab() -> [CMessage; 8] {
    array::from_fn(|_| CMessage::new(PoolKind::TxObject))
}

fn synced(sid: u8) -> PortMessageFifo {
    let mut fifo = PortMessageFifo::new(FifoId::Mcm, FifoProfile::CONVENTIONAL_DEFAULT);
    fifo.synchronize();
    fifo.on_status(
        &slab(),
        IncomingStatus {
            sid,
            status_type: StatusType::Synced,
            status_code: None,
            sync_payload: Some([5, 0, 4, 10]),
            failure_code: None,
        },
    );
    fifo
}

#[test]
fn single_failing_sid_only_cancels_itself_and_lets_the_next_message_through() {
    let mut fifo = synced(10);
    let mut slab = slab();

    fifo.enqueue_tx(&mut slab, 0, false);
    fifo.enqueue_tx(&mut slab, 1, false);
    fifo.service_tx(&mut slab); // SID 11 and SID 12, both pending

    fifo.on_status(
        &slab,
        IncomingStatus {
            sid: 11,
            status_type: StatusType::Failure,
            status_code: None,
            sync_payload: None,
            failure_code: Some(FailureCode::Crc),
        },
    );
    let mut completions = Vec::new();
    fifo.apply_tx_status(&mut slab, |idx, c| completions.push((idx, c)));
    assert!(completions.is_empty(), "the failing SID itself is not complete yet");
    assert_eq!(fifo.pending_len(), 2);

    // FLOW/CANCELED(SID=11) is the implicit ack that actually completes it.
    fifo.on_status(
        &slab,
        IncomingStatus {
            sid: 11,
            status_type: StatusType::Flow,
            status_code: Some(StatusCode::Canceled),
            sync_payload: None,
            failure_code: None,
        },
    );
    fifo.apply_tx_status(&mut slab, |idx, c| completions.push((idx, c)));

    assert_eq!(completions, vec![(0, TxCompletion::Canceled(Some(FailureCode::Crc)))]);
    assert_eq!(fifo.pending_len(), 1, "SID12 is untouched");
}

#[test]
fn cancel_all_restores_waiting_order_and_fails_only_the_shared_cancel_id() {
    let mut fifo = synced(10);
    let mut slab = slab();
    slab[0].tx_options.cancel_id = 7;
    slab[1].tx_options.cancel_id = 7;
    slab[2].tx_options.cancel_id = 7;
    slab[3].tx_options.cancel_id = 0;

    for idx in 0..4u16 {
        fifo.enqueue_tx(&mut slab, idx, false);
    }
    fifo.service_tx(&mut slab); // SID 11..14, all pending

    fifo.cancel_all();
    assert!(fifo.cancel_all_running());

    let mut failed = Vec::new();
    fifo.recover_cancel_all(&mut slab, |idx, c| failed.push((idx, c)));
    failed.sort_unstable();

    assert_eq!(
        failed,
        vec![
            (0, TxCompletion::Canceled(None)),
            (1, TxCompletion::Canceled(None)),
            (2, TxCompletion::Canceled(None)),
        ],
        "follower_id=7 siblings fail together"
    );
    assert_eq!(fifo.pending_len(), 0);
    assert!(!fifo.cancel_all_running());

    // SID14 (cancel_id=0) survived the unwind and is back in the waiting
    // queue, ready to be sent on the next service_tx pass.
    fifo.service_tx(&mut slab);
    assert_eq!(fifo.pending_len(), 1);
}
