//! End-to-end encode/decode properties across the three wire dialects.

use bjcodec::config::EXT_BIGNUM;
use bjcodec::{
    decode, encode, roundtrip, CodecError, CodecOptions, Dims, ElemType, Endian, Ext,
    FormatVariant, NumericArray, ParseMode, SparseData, Value,
};

fn bjdata() -> CodecOptions {
    CodecOptions::default()
}

fn assert_identity(value: Value, opts: &CodecOptions) {
    let (back, used) = roundtrip(&value, opts).unwrap();
    assert_eq!(back, value);
    assert_eq!(used, encode(&value, opts).unwrap().len());
}

#[test]
fn scalars_round_trip_identically() {
    let opts = bjdata();
    for value in [
        Value::Null,
        Value::Bool(true),
        Value::Bool(false),
        Value::Int(0),
        Value::Int(255),
        Value::Int(300),
        Value::Int(-5),
        Value::Int(-40_000),
        Value::Int(70_000),
        Value::Int(i64::MIN),
        Value::Int(i64::MAX),
        Value::UInt(u64::MAX - 5),
        Value::Float(1.5),
        Value::Float(1.0e-300),
        Value::Half(0x3c00),
        Value::Str(String::new()),
        Value::Str("x".into()),
        Value::Str("hello, bjdata".into()),
    ] {
        assert_identity(value, &opts);
    }
}

#[test]
fn empty_and_nested_containers_round_trip() {
    let opts = bjdata();
    assert_identity(Value::List(vec![]), &opts);
    assert_identity(Value::Map(vec![]), &opts);
    assert_identity(
        Value::map(vec![
            ("list", Value::List(vec![Value::Int(1), Value::Null])),
            (
                "map",
                Value::map(vec![("inner", Value::List(vec![Value::Bool(false)]))]),
            ),
        ]),
        &opts,
    );
}

#[test]
fn dense_matrix_and_3d_array_round_trip() {
    let opts = bjdata();
    let values: Vec<f64> = (0..100).map(|i| i as f64 / 7.0).collect();
    assert_identity(
        Value::Array(NumericArray::from_f64s(&[10, 10], &values)),
        &opts,
    );
    let values: Vec<i64> = (0..24).map(|i| i * 11 - 100).collect();
    assert_identity(
        Value::Array(NumericArray::from_i64s(&[2, 3, 4], &values)),
        &opts,
    );
}

#[test]
fn nd_arrays_survive_ubjson_through_annotation() {
    // UBJSON has no ND header; the annotated form must carry the dims
    let opts = CodecOptions::for_variant(FormatVariant::Ubjson);
    let values: Vec<f64> = (0..24).map(|i| i as f64).collect();
    assert_identity(
        Value::Array(NumericArray::from_f64s(&[2, 3, 4], &values)),
        &opts,
    );
}

#[test]
fn sparse_matrix_round_trips() {
    let opts = bjdata();
    let mut values = Vec::new();
    for v in [1.5f64, -2.5, 9.0] {
        values.extend_from_slice(&v.to_le_bytes());
    }
    let arr = NumericArray {
        elem: ElemType::Float64,
        dims: Dims::from_slice(&[5, 5]),
        complex: false,
        sparse: Some(SparseData {
            rows: vec![0, 2, 4],
            cols: Some(vec![1, 2, 0]),
            values,
        }),
        data: Vec::new(),
    };
    assert_identity(Value::Array(arr), &opts);
}

#[test]
fn complex_matrix_round_trips() {
    let opts = bjdata();
    let re: Vec<f64> = (0..16).map(|i| i as f64).collect();
    let im: Vec<f64> = (0..16).map(|i| -(i as f64)).collect();
    let mut arr = NumericArray::from_f64s(&[4, 4], &re);
    arr.data
        .extend_from_slice(&NumericArray::from_f64s(&[4, 4], &im).data);
    arr.complex = true;
    assert_identity(Value::Array(arr), &opts);
}

#[test]
fn shape_compaction_is_invisible_to_round_trips() {
    let mut opts = bjdata();
    opts.use_shape = true;

    // diagonal 6x6
    let mut diag = vec![0.0f64; 36];
    for i in 0..6 {
        diag[i * 6 + i] = (i + 1) as f64;
    }
    let value = Value::Array(NumericArray::from_f64s(&[6, 6], &diag));
    let bytes = encode(&value, &opts).unwrap();
    let plain = encode(&value, &bjdata()).unwrap();
    assert!(bytes.len() < plain.len());
    let (back, _) = decode(&bytes, &opts).unwrap();
    assert_eq!(back, value);

    // symmetric 4x4
    let mut symm = vec![0.0f64; 16];
    for i in 0..4 {
        for j in 0..4 {
            symm[i * 4 + j] = ((i * j) + i + j) as f64;
        }
    }
    assert_identity(Value::Array(NumericArray::from_f64s(&[4, 4], &symm)), &opts);
}

#[test]
fn integer_width_is_minimized_on_the_wire() {
    let opts = bjdata();
    assert_eq!(encode(&Value::Int(300), &opts).unwrap()[0], b'u');
    assert_eq!(encode(&Value::Int(-5), &opts).unwrap()[0], b'i');
    assert_eq!(encode(&Value::Int(70_000), &opts).unwrap()[0], b'm');
    let ub = CodecOptions::for_variant(FormatVariant::Ubjson);
    assert_eq!(encode(&Value::Int(300), &ub).unwrap()[0], b'I');
}

#[test]
fn compression_gates_on_element_count() {
    let mut opts = bjdata();
    opts.compression = Some("zlib".into());

    let small: Vec<f64> = (0..50).map(|i| (i % 7) as f64).collect();
    let bytes = encode(&Value::Array(NumericArray::from_f64s(&[50], &small)), &opts).unwrap();
    assert!(!contains(&bytes, b"_ArrayZipType_"));

    let large: Vec<f64> = (0..500).map(|i| (i % 7) as f64).collect();
    let value = Value::Array(NumericArray::from_f64s(&[500], &large));
    let bytes = encode(&value, &opts).unwrap();
    assert!(contains(&bytes, b"_ArrayZipType_"));
    assert!(bytes.len() < 500 * 8);
    let (back, _) = decode(&bytes, &opts).unwrap();
    assert_eq!(back, value);
}

#[test]
fn unregistered_compression_fails_loudly() {
    let mut opts = bjdata();
    opts.compression = Some("snappy".into());
    let err = encode(
        &Value::Array(NumericArray::from_f64s(&[4], &[1.0, 2.0, 3.0, 4.0])),
        &opts,
    )
    .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CodecError>(),
        Some(CodecError::UnsupportedCompression { method }) if method == "snappy"
    ));
}

#[test]
fn endianness_changes_the_wire_but_not_the_value() {
    let value = Value::map(vec![
        ("n", Value::Int(0x1234_5678)),
        (
            "a",
            Value::Array(NumericArray::from_f64s(&[3], &[1.0, 2.0, 3.0])),
        ),
    ]);
    let le = bjdata();
    let mut be = bjdata();
    be.endian = Endian::Big;
    let le_bytes = encode(&value, &le).unwrap();
    let be_bytes = encode(&value, &be).unwrap();
    assert_ne!(le_bytes, be_bytes);
    assert_eq!(decode(&le_bytes, &le).unwrap().0, value);
    assert_eq!(decode(&be_bytes, &be).unwrap().0, value);
    // the wrong byte order still parses, but the numbers come out scrambled
    assert_ne!(decode(&le_bytes, &be).unwrap().0, value);
}

#[test]
fn truncation_reports_an_offset_inside_the_buffer() {
    let opts = bjdata();
    let value = Value::map(vec![
        ("k", Value::Str("some payload".into())),
        ("n", Value::Int(123_456)),
    ]);
    let bytes = encode(&value, &opts).unwrap();
    let cut = &bytes[..bytes.len() - 1];
    let err = decode(cut, &opts).unwrap_err();
    match err.downcast_ref::<CodecError>() {
        Some(CodecError::UnexpectedEndOfInput { offset, .. }) => assert!(*offset <= cut.len()),
        other => panic!("expected UnexpectedEndOfInput, got {other:?}"),
    }
}

#[test]
fn over_long_keys_negotiate_an_explicit_retry() {
    let mut opts = bjdata();
    let long_key = "k".repeat(opts.key_length_limit + 1);
    let value = Value::Map(vec![(long_key.clone(), Value::Int(1))]);
    let bytes = encode(&value, &opts).unwrap();

    let err = decode(&bytes, &opts).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CodecError>(),
        Some(CodecError::KeyTooLong { .. })
    ));
    opts.parse_mode = ParseMode::MapFallback;
    assert_eq!(decode(&bytes, &opts).unwrap().0, value);
}

#[test]
fn binary_lowers_to_a_byte_array() {
    let opts = bjdata();
    let bytes = encode(&Value::Binary(vec![1, 2, 3, 250]), &opts).unwrap();
    let (back, _) = decode(&bytes, &opts).unwrap();
    assert_eq!(
        back,
        Value::Array(NumericArray::dense(
            ElemType::Uint8,
            Dims::from_slice(&[4]),
            vec![1, 2, 3, 250],
        ))
    );
}

#[test]
fn packed_lists_decode_as_typed_runs() {
    let mut opts = bjdata();
    opts.pack_lists = true;
    let value = Value::List((0..6).map(Value::Int).collect());
    let bytes = encode(&value, &opts).unwrap();
    assert_eq!(&bytes[..2], b"[$");
    let (back, _) = decode(&bytes, &opts).unwrap();
    assert!(matches!(back, Value::Array(ref a) if a.elem == ElemType::Uint8));
}

#[test]
fn packed_lists_leave_annotated_arrays_decodable() {
    // annotation lists must stay plain lists even when list packing is on
    let mut opts = bjdata();
    opts.pack_lists = true;
    let re: Vec<f64> = (0..4).map(|i| i as f64).collect();
    let im: Vec<f64> = (0..4).map(|i| i as f64 + 0.5).collect();
    let mut arr = NumericArray::from_f64s(&[2, 2], &re);
    arr.data
        .extend_from_slice(&NumericArray::from_f64s(&[2, 2], &im).data);
    arr.complex = true;
    assert_identity(Value::Array(arr), &opts);

    opts.compression = Some("zlib".into());
    opts.compress_threshold = 10;
    let values: Vec<f64> = (0..64).map(|i| (i % 5) as f64).collect();
    assert_identity(Value::Array(NumericArray::from_f64s(&[64], &values)), &opts);
}

#[test]
fn high_precision_numbers_survive_as_digit_strings() {
    let opts = bjdata();
    let big = Ext {
        type_id: EXT_BIGNUM,
        data: b"123456789012345678901234567890.5".to_vec(),
    };
    assert_identity(Value::Ext(big), &opts);
}

#[test]
fn half_widens_to_single_under_ubjson() {
    let opts = CodecOptions::for_variant(FormatVariant::Ubjson);
    let (back, _) = roundtrip(&Value::Half(0x3c00), &opts).unwrap();
    assert_eq!(back, Value::Float(1.0));
}

#[test]
fn uint64_magnitudes_are_bjdata_only() {
    let opts = CodecOptions::for_variant(FormatVariant::Ubjson);
    let err = encode(&Value::UInt(u64::MAX), &opts).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CodecError>(),
        Some(CodecError::UnsupportedType { .. })
    ));
}

#[test]
fn messagepack_scalars_and_containers_round_trip() {
    let opts = CodecOptions::for_variant(FormatVariant::MessagePack);
    for value in [
        Value::Null,
        Value::Bool(true),
        Value::Int(5),
        Value::Int(-31),
        Value::Int(-4_000),
        Value::Int(3_000_000_000),
        Value::UInt(u64::MAX),
        Value::Float(2.5),
        Value::Str("msgpack".into()),
        Value::Binary(vec![0, 1, 2, 255]),
        Value::List(vec![Value::Int(1), Value::Str("two".into())]),
        Value::map(vec![("k", Value::Bool(false))]),
        Value::Ext(Ext {
            type_id: -1,
            data: vec![0, 0, 0, 1],
        }),
    ] {
        assert_identity(value, &opts);
    }
}

#[test]
fn messagepack_arrays_ride_the_annotated_form() {
    let opts = CodecOptions::for_variant(FormatVariant::MessagePack);
    let values: Vec<f64> = (0..12).map(|i| i as f64 * 0.25).collect();
    let value = Value::Array(NumericArray::from_f64s(&[3, 4], &values));
    let bytes = encode(&value, &opts).unwrap();
    assert!(contains(&bytes, b"_ArrayType_"));
    let (back, _) = decode(&bytes, &opts).unwrap();
    assert_eq!(back, value);
}

#[test]
fn messagepack_duplicate_map_keys_are_invalid() {
    let opts = CodecOptions::for_variant(FormatVariant::MessagePack);
    // fixmap(2) carrying the key "a" twice
    let bytes = [0x82, 0xa1, b'a', 0x01, 0xa1, b'a', 0x02];
    let err = decode(&bytes, &opts).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CodecError>(),
        Some(CodecError::InvalidFormat { .. })
    ));
}

#[test]
fn messagepack_records_fall_back_to_plain_maps() {
    let mut opts = CodecOptions::for_variant(FormatVariant::MessagePack);
    opts.use_soa = true;
    let records: Vec<Value> = (0..4)
        .map(|i| Value::map(vec![("id", Value::Int(i)), ("w", Value::Float(i as f64))]))
        .collect();
    let value = Value::List(records);
    let bytes = encode(&value, &opts).unwrap();
    let (back, _) = decode(&bytes, &opts).unwrap();
    assert_eq!(back, value);
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
