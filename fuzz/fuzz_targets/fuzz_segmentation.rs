//! Fuzz target: `Segmentation::on_rx_telegram`
//!
//! Feeds arbitrary `(tel_id, tel_cnt, payload)` triples — including
//! out-of-order TelIds, mismatched tel_cnt, and oversized payloads — across
//! a small pool of reassembly signatures and asserts the state machine never
//! panics, regardless of how malformed the inbound telegram stream is.
//!
//! cargo fuzz run fuzz_segmentation

#![no_main]

use libfuzzer_sys::fuzz_target;
use unicens_core::message::MessageId;
use unicens_core::segmentation::{ReassemblySignature, Segmentation};

fuzz_target!(|data: &[u8]| {
    let mut seg: Segmentation<4> = Segmentation::new();

    // Chunk the fuzz input into telegrams: [tel_id_byte, tel_cnt_byte, len_byte, payload...].
    let mut cursor = data;
    while cursor.len() >= 3 {
        let tel_id = cursor[0];
        let tel_cnt = cursor[1];
        let len = cursor[2] as usize;
        cursor = &cursor[3..];
        let take = len.min(cursor.len());
        let payload = &cursor[..take];
        cursor = &cursor[take..];

        // Two source addresses keep the reassembly table under pressure
        // without the input needing to spell out every byte.
        let source = if tel_id & 0x80 != 0 { 0x0200 } else { 0x0201 };
        let sig = ReassemblySignature { source, msg_id: MessageId::default() };
        let _ = seg.on_rx_telegram(sig, tel_id & 0x0F, tel_cnt, payload);
    }

    let _ = seg.gc_tick();
    let _ = seg.gc_tick();
});
