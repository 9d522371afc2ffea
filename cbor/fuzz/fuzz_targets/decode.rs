#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(value) = brook_cbor::decode::parse(data, &brook_cbor::decode::DecodeOptions::default())
    {
        _ = format!("{value:?}");
    }
});
