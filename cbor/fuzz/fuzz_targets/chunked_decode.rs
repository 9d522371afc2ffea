#![no_main]

use brook_cbor::decode::{DecodeOptions, Decoder, IterSource};
use bytes::Bytes;
use libfuzzer_sys::fuzz_target;

// The chunk partition must never change the decoded result.
fuzz_target!(|input: (Vec<u8>, u8)| {
    let (data, chunk_len) = input;
    let chunk_len = (chunk_len as usize).max(1);

    let opts = DecodeOptions::default();
    let whole: Vec<_> = Decoder::new(
        IterSource::new(std::iter::once(Bytes::copy_from_slice(&data))),
        &opts,
    )
    .map(|r| r.map_err(|_| ()))
    .collect();

    let chunks: Vec<Bytes> = data.chunks(chunk_len).map(Bytes::copy_from_slice).collect();
    let split: Vec<_> = Decoder::new(IterSource::new(chunks.into_iter()), &opts)
        .map(|r| r.map_err(|_| ()))
        .collect();

    assert_eq!(whole, split);
});
