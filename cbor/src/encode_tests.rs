use super::encode::*;
use super::{Error, FloatWidth, PathSegment, Value};
use hex_literal::hex;
use std::sync::{Arc, Mutex};

fn emit_one(value: impl Into<Value>) -> Vec<u8> {
    emit(&value.into(), &EncodeOptions::default()).unwrap()
}

#[test]
fn rfc_integers() {
    // RFC 8949, Appendix A:
    // https://www.rfc-editor.org/rfc/rfc8949.html#section-appendix.a
    assert_eq!(emit_one(0), hex!("00"));
    assert_eq!(emit_one(1), hex!("01"));
    assert_eq!(emit_one(10), hex!("0a"));
    assert_eq!(emit_one(23), hex!("17"));
    assert_eq!(emit_one(24), hex!("1818"));
    assert_eq!(emit_one(25), hex!("1819"));
    assert_eq!(emit_one(100), hex!("1864"));
    assert_eq!(emit_one(1000), hex!("1903e8"));
    assert_eq!(emit_one(1000000), hex!("1a000f4240"));
    assert_eq!(emit_one(1000000000000i64), hex!("1b000000e8d4a51000"));

    assert_eq!(emit_one(-1), hex!("20"));
    assert_eq!(emit_one(-10), hex!("29"));
    assert_eq!(emit_one(-100), hex!("3863"));
    assert_eq!(emit_one(-1000), hex!("3903e7"));
    assert_eq!(emit_one(-1000000), hex!("3a000f423f"));
}

#[test]
fn integer_boundaries() {
    // 2^53 and -2^53 are the last exactly-representable doubles.
    assert_eq!(emit_one(Value::MAX_INTEGER), hex!("1b0020000000000000"));
    assert_eq!(emit_one(Value::MIN_INTEGER), hex!("3b0020000000000000"));

    assert!(matches!(
        emit(
            &Value::Integer(Value::MAX_INTEGER + 1),
            &EncodeOptions::default()
        ),
        Err(Error::UnsafeInteger(n)) if n == (1i128 << 53) + 1
    ));
    assert!(matches!(
        emit(
            &Value::Integer(Value::MIN_INTEGER - 1),
            &EncodeOptions::default()
        ),
        Err(Error::UnsafeInteger(_))
    ));
}

#[test]
fn rfc_floats() {
    assert_eq!(emit_one(0.0), hex!("f90000"));
    assert_eq!(emit_one(-0.0), hex!("f98000"));
    assert_eq!(emit_one(1.0), hex!("f93c00"));
    assert_eq!(emit_one(1.1), hex!("fb3ff199999999999a"));
    assert_eq!(emit_one(1.5), hex!("f93e00"));
    assert_eq!(emit_one(65504.0), hex!("f97bff"));
    assert_eq!(emit_one(100000.0), hex!("fa47c35000"));
    assert_eq!(emit_one(3.4028234663852886e+38), hex!("fa7f7fffff"));
    assert_eq!(emit_one(1.0e+300), hex!("fb7e37e43c8800759c"));
    assert_eq!(emit_one(5.960464477539063e-8), hex!("f90001"));
    assert_eq!(emit_one(0.00006103515625), hex!("f90400"));
    assert_eq!(emit_one(-4.0), hex!("f9c400"));
    assert_eq!(emit_one(-4.1), hex!("fbc010666666666666"));
    assert_eq!(emit_one(f64::INFINITY), hex!("f97c00"));
    assert_eq!(emit_one(f64::NEG_INFINITY), hex!("f9fc00"));
    // NaN canonicalizes to the narrowest permitted width.
    assert_eq!(emit_one(f64::NAN), hex!("f97e00"));
}

#[test]
fn min_float_size_bounds_the_downcast() {
    let f32_min = EncodeOptions {
        min_float_size: FloatWidth::F32,
        ..Default::default()
    };
    assert_eq!(emit(&Value::Float(1.5), &f32_min).unwrap(), hex!("fa3fc00000"));
    assert_eq!(
        emit(&Value::Float(f64::NAN), &f32_min).unwrap(),
        hex!("fa7fc00000")
    );
    // Still shrinks to 32 bits when exact, never to 16.
    assert_eq!(
        emit(&Value::Float(100000.0), &f32_min).unwrap(),
        hex!("fa47c35000")
    );

    let f64_min = EncodeOptions {
        min_float_size: FloatWidth::F64,
        ..Default::default()
    };
    assert_eq!(
        emit(&Value::Float(1.5), &f64_min).unwrap(),
        hex!("fb3ff8000000000000")
    );
    assert_eq!(
        emit(&Value::Float(f64::NAN), &f64_min).unwrap(),
        hex!("fb7ff8000000000000")
    );
}

#[test]
fn rfc_simple_values() {
    assert_eq!(emit_one(false), hex!("f4"));
    assert_eq!(emit_one(true), hex!("f5"));
    assert_eq!(emit(&Value::Null, &EncodeOptions::default()).unwrap(), hex!("f6"));
    assert_eq!(
        emit(&Value::Undefined, &EncodeOptions::default()).unwrap(),
        hex!("f7")
    );
}

#[test]
fn undefined_can_be_disallowed() {
    let opts = EncodeOptions {
        allow_undefined: false,
        ..Default::default()
    };
    assert!(matches!(
        emit(&Value::Undefined, &opts),
        Err(Error::UndefinedDisallowed)
    ));
    // Nested occurrences are caught too.
    assert!(matches!(
        emit(&Value::array([Value::Integer(1), Value::Undefined]), &opts),
        Err(Error::UndefinedDisallowed)
    ));
}

#[test]
fn rfc_strings() {
    assert_eq!(emit_one(vec![] as Vec<u8>), hex!("40"));
    assert_eq!(emit_one(hex!("01020304").to_vec()), hex!("4401020304"));
    assert_eq!(emit_one(""), hex!("60"));
    assert_eq!(emit_one("a"), hex!("6161"));
    assert_eq!(emit_one("IETF"), hex!("6449455446"));
    assert_eq!(emit_one("\"\\"), hex!("62225c"));
    assert_eq!(emit_one("\u{00fc}"), hex!("62c3bc"));
    assert_eq!(emit_one("\u{6c34}"), hex!("63e6b0b4"));
    assert_eq!(emit_one("\u{10151}"), hex!("64f0908591"));
}

#[test]
fn rfc_arrays_and_maps() {
    assert_eq!(emit_one(Value::array::<Value, _>([])), hex!("80"));
    assert_eq!(emit_one(Value::array([1, 2, 3])), hex!("83010203"));
    assert_eq!(
        emit_one(Value::array([
            Value::Integer(1),
            Value::array([2, 3]),
            Value::array([4, 5]),
        ])),
        hex!("8301820203820405")
    );
    let twenty_five = Value::array((1..=25).map(Value::from).collect::<Vec<_>>());
    assert_eq!(
        emit_one(twenty_five),
        hex!("98190102030405060708090a0b0c0d0e0f101112131415161718181819")
    );

    assert_eq!(emit_one(Value::map::<String, Value, _>([])), hex!("a0"));
    assert_eq!(
        emit_one(Value::map([
            ("a", Value::Integer(1)),
            ("b", Value::array([2, 3])),
        ])),
        hex!("a26161016162820203")
    );
    assert_eq!(
        emit_one(Value::array([
            Value::from("a"),
            Value::map([("b", Value::from("c"))]),
        ])),
        hex!("826161a161626163")
    );
    // Entry order is preserved exactly as given.
    assert_eq!(
        emit_one(Value::map([
            ("a", Value::Integer(1)),
            ("b", Value::array([Value::Bool(true), Value::Null])),
        ])),
        hex!("a26161016162" "82f5f6")
    );
}

#[test]
fn chunks_are_bounded_and_recycling_is_lossless() {
    let value = Value::array((0..100).map(Value::from).collect::<Vec<_>>());
    let reference = emit(&value, &EncodeOptions::default()).unwrap();

    let opts = EncodeOptions {
        chunk_recycling: true,
        chunk_size: 8,
        ..Default::default()
    };
    let mut collected = Vec::new();
    let mut seen_fresh = false;
    let sink = |chunk: OutChunk<'_>| -> Result<(), Error> {
        assert!(chunk.len() <= 8);
        seen_fresh |= matches!(chunk, OutChunk::Fresh(_));
        // The view dies with this call; copying it is the contract.
        collected.extend_from_slice(chunk.as_slice());
        Ok(())
    };
    let mut encoder = Encoder::new(FnSink(sink), &opts);
    encoder.feed(&value).unwrap();
    encoder.finish().unwrap();

    assert!(!seen_fresh);
    assert_eq!(collected, reference);
}

#[test]
fn fresh_chunks_are_owned() {
    let value = Value::Text("abcdefghij".into());
    let opts = EncodeOptions {
        chunk_size: 4,
        ..Default::default()
    };
    let mut chunks = Vec::new();
    let sink = |chunk: OutChunk<'_>| -> Result<(), Error> {
        match chunk {
            OutChunk::Fresh(b) => chunks.push(b),
            OutChunk::Recycled(_) => panic!("recycling is off"),
        }
        Ok(())
    };
    let mut encoder = Encoder::new(FnSink(sink), &opts);
    encoder.feed(&value).unwrap();
    encoder.finish().unwrap();

    assert!(chunks.iter().all(|c| c.len() <= 4));
    let joined: Vec<u8> = chunks.concat();
    assert_eq!(joined, emit(&value, &EncodeOptions::default()).unwrap());
}

#[test]
fn emit_chunks_is_a_lazy_chunk_sequence() {
    let opts = EncodeOptions {
        chunk_size: 4,
        ..Default::default()
    };
    let values = vec![Value::Integer(1), Value::Text("hello".into())];
    let chunks: Vec<_> = emit_chunks(values, &opts)
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert!(chunks.iter().all(|c| c.len() <= 4));
    let joined: Vec<u8> = chunks.concat();
    assert_eq!(joined, hex!("01" "6568656c6c6f"));
}

#[test]
fn on_value_replaces_and_extends_paths() {
    let paths = Arc::new(Mutex::new(Vec::new()));
    let paths_cloned = paths.clone();
    let opts = EncodeOptions {
        on_value: Some(Box::new(move |_value, path| {
            let rendered: String = path.iter().map(|s| s.to_string()).collect();
            paths_cloned.lock().unwrap().push(rendered);
            if matches!(path, [PathSegment::Key(k)] if k == "secret") {
                Ok(Some(Value::Text("redacted".into())))
            } else {
                Ok(None)
            }
        })),
        ..Default::default()
    };

    let value = Value::map([
        ("id", Value::Integer(7)),
        ("secret", Value::from("hunter2")),
        ("xs", Value::array([1, 2])),
    ]);
    let bytes = emit(&value, &opts).unwrap();
    assert_eq!(
        bytes,
        emit(
            &Value::map([
                ("id", Value::Integer(7)),
                ("secret", Value::from("redacted")),
                ("xs", Value::array([1, 2])),
            ]),
            &EncodeOptions::default()
        )
        .unwrap()
    );

    // Deterministic pre-order traversal: root, then each entry's value,
    // array elements in index order.
    assert_eq!(
        *paths.lock().unwrap(),
        vec!["", ".id", ".secret", ".xs", ".xs[0]", ".xs[1]"]
    );
}

#[test]
fn on_key_remaps_map_keys() {
    let opts = EncodeOptions {
        on_key: Some(Box::new(|key| {
            Ok((key == "old").then(|| "new".to_string()))
        })),
        ..Default::default()
    };
    let bytes = emit(
        &Value::map([("old", Value::Integer(1)), ("other", Value::Integer(2))]),
        &opts,
    )
    .unwrap();
    assert_eq!(
        bytes,
        emit(
            &Value::map([("new", Value::Integer(1)), ("other", Value::Integer(2))]),
            &EncodeOptions::default()
        )
        .unwrap()
    );
}

#[test]
fn hook_errors_abort_the_traversal() {
    let opts = EncodeOptions {
        on_value: Some(Box::new(|value, _| {
            if matches!(value, Value::Integer(13)) {
                Err("unlucky".into())
            } else {
                Ok(None)
            }
        })),
        ..Default::default()
    };
    assert!(matches!(
        emit(&Value::array([12, 13, 14]), &opts),
        Err(Error::Hook(e)) if e.to_string() == "unlucky"
    ));
}
