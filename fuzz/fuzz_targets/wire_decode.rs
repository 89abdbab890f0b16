#![no_main]

use libfuzzer_sys::fuzz_target;

use kringle_wire::{decode_event, encode_event};

fuzz_target!(|data: &[u8]| {
    // Arbitrary input must never panic; whatever decodes must encode back
    // to the same bytes
    if let Ok(envelope) = decode_event(data) {
        let encoded = encode_event(&envelope).expect("decoded event re-encodes");
        assert_eq!(&encoded[..], data);
    }
});
