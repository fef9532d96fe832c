#![no_main]

use libfuzzer_sys::fuzz_target;

use domain::traffic::decode::{MAX_FRAME_LEN, decode_frame};

// Fuzz the link-layer frame decoder with arbitrary bytes.
//
// Decoding must never panic, and any accepted frame respects the
// length bounds.
fuzz_target!(|data: &[u8]| {
    if let Some(meta) = decode_frame(data) {
        assert!(meta.frame_len > 0);
        assert!(meta.frame_len <= MAX_FRAME_LEN);
        assert_eq!(meta.frame_len, data.len() as u64);
    }
});
