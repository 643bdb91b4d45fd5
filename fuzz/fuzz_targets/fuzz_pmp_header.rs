//! Fuzz target: `pmp::verify_header` / `pmp::decode_header`
//!
//! Drives arbitrary bytes into a fixed-size header buffer (the same shape
//! `CMessage` always hands these functions in practice) and asserts that
//! validation never panics and that whatever passes `verify_header` decodes
//! into a header whose advertised payload fits inside the buffer.
//!
//! cargo fuzz run fuzz_pmp_header

#![no_main]

use libfuzzer_sys::fuzz_target;
use unicens_core::message::BUF_SIZE;
use unicens_core::pmp;

fuzz_target!(|data: &[u8]| {
    let mut buf = [0u8; BUF_SIZE];
    let n = data.len().min(BUF_SIZE);
    buf[..n].copy_from_slice(&data[..n]);

    if pmp::verify_header(&buf, buf.len()).is_ok() {
        let header = pmp::decode_header(&buf).expect("verify_header passed, decode must too");
        let end = header.payload_offset() + header.payload_len() as usize;
        assert!(end <= buf.len(), "verified header claims payload past the buffer end");
    }
});
