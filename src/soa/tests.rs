use super::schema::{self, FieldKind, Layout, StrEncoding};
use crate::config::{CodecOptions, FormatVariant};
use crate::decode::decode;
use crate::encode::encode;
use crate::markers::ElemType;
use crate::value::{NumericArray, Value};

fn soa_opts() -> CodecOptions {
    let mut opts = CodecOptions::default();
    opts.use_soa = true;
    opts
}

fn person(name: &str, age: i64, score: f64) -> Value {
    Value::map(vec![
        ("name", Value::Str(name.to_string())),
        ("age", Value::Int(age)),
        ("score", Value::Float(score)),
    ])
}

#[test]
fn inference_accepts_homogeneous_records() {
    let records: Vec<Value> = (0..10)
        .map(|i| person(&format!("p{i}"), 20 + i, i as f64 / 2.0))
        .collect();
    let soa = schema::infer(&records, &soa_opts()).unwrap();
    assert_eq!(soa.count(), 10);
    assert_eq!(soa.schema.fields.len(), 3);
    assert!(matches!(soa.schema.fields[1].kind, FieldKind::Scalar(ElemType::Uint8)));
    assert!(matches!(
        soa.schema.fields[2].kind,
        FieldKind::Scalar(ElemType::Float64)
    ));
}

#[test]
fn one_mixed_type_field_disqualifies_the_collection() {
    let records = vec![
        Value::map(vec![("a", Value::Int(1))]),
        Value::map(vec![("a", Value::Str("one".into()))]),
    ];
    assert!(schema::infer(&records, &soa_opts()).is_none());
}

#[test]
fn key_order_must_match_across_records() {
    let records = vec![
        Value::map(vec![("a", Value::Int(1)), ("b", Value::Int(2))]),
        Value::map(vec![("b", Value::Int(2)), ("a", Value::Int(1))]),
    ];
    assert!(schema::infer(&records, &soa_opts()).is_none());
}

#[test]
fn dict_strategy_selected_at_the_ratio_boundary() {
    // 100 records, 50 distinct values: ratio 0.5 == dict_ratio, dict wins
    let records: Vec<Value> = (0..100)
        .map(|i| Value::map(vec![("tag", Value::Str(format!("tag-{}", i % 50)))]))
        .collect();
    let soa = schema::infer(&records, &soa_opts()).unwrap();
    assert!(matches!(
        soa.schema.fields[0].kind,
        FieldKind::Str(StrEncoding::Dict { index: ElemType::Uint8 })
    ));

    // 51 distinct short values: ratio crosses 0.5, fixed padding wins
    let records: Vec<Value> = (0..100)
        .map(|i| Value::map(vec![("tag", Value::Str(format!("t{}", i % 51)))]))
        .collect();
    let soa = schema::infer(&records, &soa_opts()).unwrap();
    assert!(matches!(
        soa.schema.fields[0].kind,
        FieldKind::Str(StrEncoding::Fixed { .. })
    ));
}

#[test]
fn offset_strategy_takes_long_high_cardinality_strings() {
    let records: Vec<Value> = (0..100)
        .map(|i| {
            Value::map(vec![(
                "path",
                Value::Str(format!("/var/data/partition/{i:056}")),
            )])
        })
        .collect();
    let soa = schema::infer(&records, &soa_opts()).unwrap();
    match &soa.schema.fields[0].kind {
        FieldKind::Str(StrEncoding::Offset { index }) => {
            // ~76 bytes * 100 records needs a u16 offset column
            assert_eq!(*index, ElemType::Uint16);
        }
        other => panic!("expected offset strategy, got {other:?}"),
    }
}

#[test]
fn row_major_collection_round_trips_expanded() {
    let opts = soa_opts();
    let records: Vec<Value> = (0..20)
        .map(|i| person(&format!("p{}", i % 4), 30 + i, i as f64 * 1.5))
        .collect();
    let original = Value::List(records);
    let bytes = encode(&original, &opts).unwrap();
    let (decoded, used) = decode(&bytes, &opts).unwrap();
    assert_eq!(used, bytes.len());
    assert_eq!(decoded, original);
}

#[test]
fn unexpanded_decode_returns_the_columnar_form() {
    let mut opts = soa_opts();
    let records: Vec<Value> = (0..8)
        .map(|i| person(&format!("p{i}"), i, i as f64))
        .collect();
    let soa = schema::infer(&records, &opts).unwrap();

    let bytes = encode(&Value::Records(soa.clone()), &opts).unwrap();
    opts.expand_records = false;
    let (decoded, _) = decode(&bytes, &opts).unwrap();
    assert_eq!(decoded, Value::Records(soa));
}

#[test]
fn column_major_layout_round_trips() {
    let mut opts = soa_opts();
    let records: Vec<Value> = (0..12)
        .map(|i| person(&format!("q{}", i % 3), i * 7, -(i as f64)))
        .collect();
    let mut soa = schema::infer(&records, &opts).unwrap();
    soa.layout = Layout::ColumnMajor;

    let bytes = encode(&Value::Records(soa.clone()), &opts).unwrap();
    // column-major collections open with `{$`
    assert_eq!(&bytes[..2], b"{$");
    opts.expand_records = false;
    let (decoded, _) = decode(&bytes, &opts).unwrap();
    assert_eq!(decoded, Value::Records(soa));
}

#[test]
fn nested_records_round_trip() {
    let opts = soa_opts();
    let records: Vec<Value> = (0..6)
        .map(|i| {
            Value::map(vec![
                ("id", Value::Int(i)),
                (
                    "pos",
                    Value::map(vec![
                        ("x", Value::Float(i as f64)),
                        ("y", Value::Float(-(i as f64))),
                    ]),
                ),
            ])
        })
        .collect();
    let original = Value::List(records);
    let bytes = encode(&original, &opts).unwrap();
    let (decoded, _) = decode(&bytes, &opts).unwrap();
    assert_eq!(decoded, original);
}

#[test]
fn vector_fields_carry_fixed_length_arrays() {
    let opts = soa_opts();
    let records: Vec<Value> = (0..5)
        .map(|i| {
            let mut data = Vec::new();
            for v in [i as i64, i as i64 + 1, i as i64 + 2] {
                data.extend_from_slice(&(v as i16).to_le_bytes());
            }
            Value::map(vec![
                ("id", Value::Int(i)),
                (
                    "window",
                    Value::Array(NumericArray::dense(
                        ElemType::Int16,
                        smallvec::smallvec![3],
                        data,
                    )),
                ),
            ])
        })
        .collect();
    let original = Value::List(records);
    let bytes = encode(&original, &opts).unwrap();
    let (decoded, _) = decode(&bytes, &opts).unwrap();
    assert_eq!(decoded, original);
}

#[test]
fn booleans_and_empties_expand_to_integer_defaults() {
    let opts = soa_opts();
    let records = vec![
        Value::map(vec![("ok", Value::Bool(true)), ("n", Value::Int(5))]),
        Value::map(vec![("ok", Value::Bool(false)), ("n", Value::Null)]),
        Value::map(vec![("ok", Value::Bool(true)), ("n", Value::Int(9))]),
    ];
    let bytes = encode(&Value::List(records), &opts).unwrap();
    let (decoded, _) = decode(&bytes, &opts).unwrap();
    assert_eq!(
        decoded,
        Value::List(vec![
            Value::map(vec![("ok", Value::Int(1)), ("n", Value::Int(5))]),
            Value::map(vec![("ok", Value::Int(0)), ("n", Value::Int(0))]),
            Value::map(vec![("ok", Value::Int(1)), ("n", Value::Int(9))]),
        ])
    );
}

#[test]
fn big_endian_variant_round_trips_records() {
    let mut opts = CodecOptions::for_variant(FormatVariant::Ubjson);
    opts.use_soa = true;
    let records: Vec<Value> = (0..10)
        .map(|i| person(&format!("u{i}"), 1000 + i, i as f64 / 3.0))
        .collect();
    let original = Value::List(records);
    let bytes = encode(&original, &opts).unwrap();
    let (decoded, _) = decode(&bytes, &opts).unwrap();
    assert_eq!(decoded, original);
}
