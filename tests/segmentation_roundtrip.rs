//! Round-trip and boundary coverage for Tx segmentation followed by Rx
//! reassembly: whatever `TxCursor` splits a payload into, `Segmentation`
//! must reassemble back to the same bytes.

use unicens_core::message::{CMessage, MessageId, PoolKind};
use unicens_core::segmentation::{ReassemblySignature, Segmentation, TxCursor, MAX_REASSEMBLY_SIZE};

fn segment_all(payload: &[u8]) -> Vec<(u8, u8, Vec<u8>)> {
    let mut cursor = TxCursor::new(payload);
    let mut msg = CMessage::new(PoolKind::TxObject);
    let mut segments = Vec::new();
    while !cursor.is_done() {
        cursor.next_into(&mut msg);
        segments.push((msg.telegram.tel_id, msg.telegram.tel_cnt, msg.payload()[..msg.payload_len()].to_vec()));
    }
    segments
}

fn reassemble(segments: &[(u8, u8, Vec<u8>)]) -> Vec<u8> {
    let mut seg: Segmentation<4> = Segmentation::new();
    let sig = ReassemblySignature { source: 0x0200, msg_id: MessageId::default() };
    let mut complete = None;
    for (tel_id, tel_cnt, payload) in segments {
        let r = seg.on_rx_telegram(sig, *tel_id, *tel_cnt, payload);
        assert!(r.error.is_none(), "unexpected segmentation error for tel_id {tel_id}");
        if let Some(c) = r.complete {
            complete = Some(c.payload.as_slice().to_vec());
        }
    }
    complete.expect("message never completed")
}

#[test]
fn round_trips_at_every_boundary_size() {
    for &len in &[0usize, 1, 44, 45, 46, 89, 90, 400, MAX_REASSEMBLY_SIZE] {
        let payload: Vec<u8> = (0..len).map(|i| (i % 256) as u8).collect();
        let segments = segment_all(&payload);
        assert_eq!(reassemble(&segments), payload, "payload length {len} did not round-trip");
    }
}

#[test]
fn payload_exactly_45_bytes_is_a_single_unsegmented_telegram() {
    let payload = [7u8; 45];
    let segments = segment_all(&payload);
    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0].0, 0, "tel_id 0, no size prefix");
}

#[test]
fn payload_46_bytes_announces_size_then_trails_one_byte() {
    let payload = [7u8; 46];
    let segments = segment_all(&payload);
    assert_eq!(segments[0].0, 4);
    assert_eq!(u16::from_be_bytes([segments[0].2[0], segments[0].2[1]]), 46);
    assert_eq!(segments.last().unwrap().2.len(), 1);
}

#[test]
fn payload_larger_than_reassembly_cap_is_rejected_on_the_rx_side() {
    let payload = vec![0u8; MAX_REASSEMBLY_SIZE + 1];
    let segments = segment_all(&payload);
    let mut seg: Segmentation<4> = Segmentation::new();
    let sig = ReassemblySignature { source: 0x0200, msg_id: MessageId::default() };
    let (tel_id, tel_cnt, body) = &segments[0];
    let r = seg.on_rx_telegram(sig, *tel_id, *tel_cnt, body);
    assert_eq!(r.error, Some(unicens_core::error::SegmentationError::CannotAllocatePayload));
}
