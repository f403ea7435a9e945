use std::str::FromStr;

use uuid::Uuid;

use crate::buffer::ScanCursor;
use crate::types::low_cardinality::{TUINT16, TUINT32, TUINT8};
use crate::values::{self, Value};
use crate::{i256, u256, Date, Date32, DateTime, DynDateTime64, Result};

use super::{DeserializerState, SerializerState, Type};

/// Serialize, prove the skippers walk exactly the serialized bytes, then
/// deserialize. Returns the decoded column for comparison.
async fn roundtrip_values(type_: &Type, values: &[Value]) -> Result<Vec<Value>> {
    let mut output = Vec::new();

    let mut state = SerializerState {};
    type_.serialize_prefix(&mut output, &mut state).await?;
    type_
        .serialize_column(values.to_vec(), &mut output, &mut state)
        .await?;

    let mut cursor = ScanCursor::over_slice(&output);
    type_.skip_prefix(&mut cursor).unwrap();
    type_.skip_column(&mut cursor, values.len()).unwrap();
    assert_eq!(
        cursor.remaining(),
        0,
        "skipper out of step with serializer for {type_}"
    );

    let mut input = &output[..];
    let mut state = DeserializerState {};
    type_.deserialize_prefix(&mut input, &mut state).await?;
    let deserialized = type_
        .deserialize_column(&mut input, values.len(), &mut state)
        .await?;

    Ok(deserialized)
}

#[tokio::test]
async fn roundtrip_u8() {
    let values = &[Value::UInt8(12), Value::UInt8(24), Value::UInt8(30)];
    assert_eq!(
        &values[..],
        roundtrip_values(&Type::UInt8, &values[..]).await.unwrap()
    );
}

#[tokio::test]
async fn roundtrip_u16() {
    let values = &[Value::UInt16(12), Value::UInt16(24), Value::UInt16(30000)];
    assert_eq!(
        &values[..],
        roundtrip_values(&Type::UInt16, &values[..]).await.unwrap()
    );
}

#[tokio::test]
async fn roundtrip_u32() {
    let values = &[Value::UInt32(12), Value::UInt32(24), Value::UInt32(900000)];
    assert_eq!(
        &values[..],
        roundtrip_values(&Type::UInt32, &values[..]).await.unwrap()
    );
}

#[tokio::test]
async fn roundtrip_u64() {
    let values = &[
        Value::UInt64(12),
        Value::UInt64(24),
        Value::UInt64(9000000000),
        Value::UInt64(u64::MAX),
    ];
    assert_eq!(
        &values[..],
        roundtrip_values(&Type::UInt64, &values[..]).await.unwrap()
    );
}

#[tokio::test]
async fn roundtrip_u128() {
    let values = &[
        Value::UInt128(12),
        Value::UInt128(24),
        Value::UInt128(9000000000u128 * 9000000000),
    ];
    assert_eq!(
        &values[..],
        roundtrip_values(&Type::UInt128, &values[..]).await.unwrap()
    );
}

#[tokio::test]
async fn roundtrip_u256() {
    let values = &[
        Value::UInt256(u256([0u8; 32])),
        Value::UInt256(u256([7u8; 32])),
    ];
    assert_eq!(
        &values[..],
        roundtrip_values(&Type::UInt256, &values[..]).await.unwrap()
    );
}

#[tokio::test]
async fn roundtrip_i8() {
    let values = &[
        Value::Int8(12),
        Value::Int8(i8::MIN),
        Value::Int8(i8::MAX),
        Value::Int8(-30),
    ];
    assert_eq!(
        &values[..],
        roundtrip_values(&Type::Int8, &values[..]).await.unwrap()
    );
}

#[tokio::test]
async fn roundtrip_i16() {
    let values = &[
        Value::Int16(12),
        Value::Int16(24),
        Value::Int16(30000),
        Value::Int16(-30000),
    ];
    assert_eq!(
        &values[..],
        roundtrip_values(&Type::Int16, &values[..]).await.unwrap()
    );
}

#[tokio::test]
async fn roundtrip_i32() {
    let values = &[
        Value::Int32(12),
        Value::Int32(24),
        Value::Int32(900000),
        Value::Int32(-900000),
    ];
    assert_eq!(
        &values[..],
        roundtrip_values(&Type::Int32, &values[..]).await.unwrap()
    );
}

#[tokio::test]
async fn roundtrip_i64() {
    let values = &[
        Value::Int64(12),
        Value::Int64(i64::MIN),
        Value::Int64(i64::MAX),
        Value::Int64(-9000000000),
    ];
    assert_eq!(
        &values[..],
        roundtrip_values(&Type::Int64, &values[..]).await.unwrap()
    );
}

#[tokio::test]
async fn roundtrip_i128() {
    let values = &[
        Value::Int128(12),
        Value::Int128(9000000000i128 * 9000000000),
        Value::Int128(-9000000000i128 * 9000000000),
    ];
    assert_eq!(
        &values[..],
        roundtrip_values(&Type::Int128, &values[..]).await.unwrap()
    );
}

#[tokio::test]
async fn roundtrip_i256() {
    let values = &[
        Value::Int256(i256([0u8; 32])),
        Value::Int256(i256([7u8; 32])),
    ];
    assert_eq!(
        &values[..],
        roundtrip_values(&Type::Int256, &values[..]).await.unwrap()
    );
}

#[tokio::test]
async fn roundtrip_f32() {
    let values = &[
        Value::Float32(1.0_f32),
        Value::Float32(0.0_f32),
        Value::Float32(-1000000.0_f32),
        Value::Float32(f32::NAN),
        Value::Float32(f32::INFINITY),
        Value::Float32(f32::NEG_INFINITY),
        Value::Float32(f32::MIN_POSITIVE),
    ];
    assert_eq!(
        &values[..],
        roundtrip_values(&Type::Float32, &values[..]).await.unwrap()
    );
}

#[tokio::test]
async fn roundtrip_f64() {
    let values = &[
        Value::Float64(1.0_f64),
        Value::Float64(0.0_f64),
        Value::Float64(-1000000.0_f64),
        Value::Float64(f64::NAN),
        Value::Float64(f64::INFINITY),
        Value::Float64(f64::NEG_INFINITY),
    ];
    assert_eq!(
        &values[..],
        roundtrip_values(&Type::Float64, &values[..]).await.unwrap()
    );
}

#[tokio::test]
async fn roundtrip_bool() {
    let values = &[Value::Bool(true), Value::Bool(false), Value::Bool(true)];
    assert_eq!(
        &values[..],
        roundtrip_values(&Type::Bool, &values[..]).await.unwrap()
    );
}

#[tokio::test]
async fn roundtrip_decimals() {
    let values = &[
        Value::Decimal32(5, 12),
        Value::Decimal32(5, -900000),
        Value::Decimal32(5, i32::MAX),
    ];
    assert_eq!(
        &values[..],
        roundtrip_values(&Type::Decimal32(5), &values[..])
            .await
            .unwrap()
    );
    let values = &[Value::Decimal64(5, 9000000000), Value::Decimal64(5, -12)];
    assert_eq!(
        &values[..],
        roundtrip_values(&Type::Decimal64(5), &values[..])
            .await
            .unwrap()
    );
    let values = &[
        Value::Decimal128(5, 9000000000i128 * 9000000000),
        Value::Decimal128(5, -24),
    ];
    assert_eq!(
        &values[..],
        roundtrip_values(&Type::Decimal128(5), &values[..])
            .await
            .unwrap()
    );
    let values = &[
        Value::Decimal256(5, i256([0u8; 32])),
        Value::Decimal256(5, i256([7u8; 32])),
    ];
    assert_eq!(
        &values[..],
        roundtrip_values(&Type::Decimal256(5), &values[..])
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn roundtrip_null_int() {
    let values = &[
        Value::UInt32(35),
        Value::UInt32(90),
        Value::Null,
        Value::UInt32(120),
        Value::UInt32(10000),
        Value::Null,
    ];
    assert_eq!(
        &values[..],
        roundtrip_values(&Type::Nullable(Box::new(Type::UInt32)), &values[..])
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn roundtrip_string() {
    let long = "x".repeat(4096);
    let values = &[
        Value::string(""),
        Value::string("t"),
        Value::string("test"),
        Value::string(&long),
        Value::string("日本語"),
    ];
    assert_eq!(
        &values[..],
        roundtrip_values(&Type::String, &values[..]).await.unwrap()
    );
}

#[tokio::test]
async fn roundtrip_fixed_string() {
    let values = &[
        Value::string(""),
        Value::string("t"),
        Value::string("test"),
        Value::string("日本語"),
    ];
    assert_eq!(
        &values[..],
        roundtrip_values(&Type::FixedString(32), &values[..])
            .await
            .unwrap()
    );
    // truncation at the fixed width is lossy by design
    assert_ne!(
        &values[..],
        roundtrip_values(&Type::FixedString(3), &values[..])
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn roundtrip_null_string() {
    let values = &[
        Value::string(""),
        Value::Null,
        Value::string("t"),
        Value::string("test"),
        Value::Null,
        Value::string("日本語"),
        Value::Null,
    ];
    assert_eq!(
        &values[..],
        roundtrip_values(&Type::Nullable(Box::new(Type::String)), &values[..])
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn roundtrip_json() {
    let values = &[
        Value::Json(b"{}".to_vec()),
        Value::Json(br#"{"a": [1, 2, 3], "b": "text"}"#.to_vec()),
    ];
    assert_eq!(
        &values[..],
        roundtrip_values(&Type::Json, &values[..]).await.unwrap()
    );
}

#[tokio::test]
async fn roundtrip_uuid() {
    let values = &[
        Value::Uuid(Uuid::from_u128(0)),
        Value::Uuid(Uuid::from_u128(1)),
        Value::Uuid(Uuid::from_u128(456345634563456)),
    ];
    assert_eq!(
        &values[..],
        roundtrip_values(&Type::Uuid, &values[..]).await.unwrap()
    );
}

#[tokio::test]
async fn roundtrip_dates() {
    let values = &[
        Value::Date(Date(0)),
        Value::Date(Date(3234)),
        Value::Date(Date(u16::MAX)),
    ];
    assert_eq!(
        &values[..],
        roundtrip_values(&Type::Date, &values[..]).await.unwrap()
    );
    let values = &[
        Value::Date32(Date32(0)),
        Value::Date32(Date32(-3234)),
        Value::Date32(Date32(53234)),
    ];
    assert_eq!(
        &values[..],
        roundtrip_values(&Type::Date32, &values[..]).await.unwrap()
    );
}

#[tokio::test]
async fn roundtrip_datetime() {
    let values = &[
        Value::DateTime(DateTime(chrono_tz::UTC, 0)),
        Value::DateTime(DateTime(chrono_tz::UTC, 323463434)),
        Value::DateTime(DateTime(chrono_tz::UTC, 45345345)),
    ];
    assert_eq!(
        &values[..],
        roundtrip_values(&Type::DateTime(chrono_tz::UTC), &values[..])
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn roundtrip_datetime64() {
    let values = &[
        Value::DateTime64(DynDateTime64(chrono_tz::UTC, 0, 3)),
        Value::DateTime64(DynDateTime64(chrono_tz::UTC, 32346345634, 3)),
        Value::DateTime64(DynDateTime64(chrono_tz::UTC, 4534564345, 3)),
    ];
    assert_eq!(
        &values[..],
        roundtrip_values(&Type::DateTime64(3, chrono_tz::UTC), &values[..])
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn roundtrip_enums() {
    let type_ = Type::Enum8(vec![("a".to_string(), 1), ("b".to_string(), -2)]);
    let values = &[Value::Enum8(1), Value::Enum8(-2), Value::Enum8(1)];
    assert_eq!(
        &values[..],
        roundtrip_values(&type_, &values[..]).await.unwrap()
    );
    let type_ = Type::Enum16(vec![("a".to_string(), 1), ("b".to_string(), -30000)]);
    let values = &[Value::Enum16(-30000), Value::Enum16(1)];
    assert_eq!(
        &values[..],
        roundtrip_values(&type_, &values[..]).await.unwrap()
    );
}

#[tokio::test]
async fn roundtrip_ip() {
    let values = &[
        Value::Ipv4("127.0.0.1".parse::<std::net::Ipv4Addr>().unwrap().into()),
        Value::Ipv4(std::net::Ipv4Addr::UNSPECIFIED.into()),
    ];
    assert_eq!(
        &values[..],
        roundtrip_values(&Type::Ipv4, &values[..]).await.unwrap()
    );
    let values = &[
        Value::Ipv6("::1".parse::<std::net::Ipv6Addr>().unwrap().into()),
        Value::Ipv6("2001:db8::8a2e:370:7334".parse::<std::net::Ipv6Addr>().unwrap().into()),
    ];
    assert_eq!(
        &values[..],
        roundtrip_values(&Type::Ipv6, &values[..]).await.unwrap()
    );
}

#[tokio::test]
async fn roundtrip_array() {
    let values = &[
        Value::Array(vec![]),
        Value::Array(vec![Value::UInt32(0)]),
        Value::Array(vec![Value::UInt32(1), Value::UInt32(2), Value::UInt32(3)]),
    ];
    assert_eq!(
        &values[..],
        roundtrip_values(&Type::Array(Box::new(Type::UInt32)), &values[..])
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn roundtrip_array2() {
    let values = &[
        Value::Array(vec![Value::Array(vec![])]),
        Value::Array(vec![Value::Array(vec![Value::UInt32(1)])]),
        Value::Array(vec![
            Value::Array(vec![Value::UInt32(2)]),
            Value::Array(vec![Value::UInt32(3)]),
        ]),
        Value::Array(vec![
            Value::Array(vec![Value::UInt32(4), Value::UInt32(5)]),
            Value::Array(vec![Value::UInt32(6), Value::UInt32(7)]),
        ]),
        Value::Array(vec![Value::Array(vec![Value::UInt32(8)])]),
    ];
    assert_eq!(
        &values[..],
        roundtrip_values(
            &Type::Array(Box::new(Type::Array(Box::new(Type::UInt32)))),
            &values[..]
        )
        .await
        .unwrap()
    );
}

#[tokio::test]
async fn roundtrip_tuple() {
    let values = &[
        Value::Tuple(vec![Value::UInt32(1), Value::string("a")]),
        Value::Tuple(vec![Value::UInt32(3), Value::string("b")]),
        Value::Tuple(vec![Value::UInt32(4), Value::string("c")]),
    ];
    assert_eq!(
        &values[..],
        roundtrip_values(&Type::Tuple(vec![Type::UInt32, Type::String]), &values[..])
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn roundtrip_tuple_array() {
    let values = &[
        Value::Tuple(vec![Value::Array(vec![]), Value::Array(vec![])]),
        Value::Tuple(vec![
            Value::Array(vec![Value::UInt32(1)]),
            Value::Array(vec![]),
        ]),
        Value::Tuple(vec![
            Value::Array(vec![Value::UInt32(5), Value::UInt32(6)]),
            Value::Array(vec![Value::UInt16(7), Value::UInt16(8)]),
        ]),
    ];
    assert_eq!(
        &values[..],
        roundtrip_values(
            &Type::Tuple(vec![
                Type::Array(Box::new(Type::UInt32)),
                Type::Array(Box::new(Type::UInt16))
            ]),
            &values[..]
        )
        .await
        .unwrap()
    );
}

#[tokio::test]
async fn roundtrip_array_nulls() {
    let values = &[
        Value::Array(vec![]),
        Value::Array(vec![Value::Null]),
        Value::Array(vec![Value::UInt32(0), Value::Null]),
        Value::Array(vec![
            Value::Null,
            Value::Null,
            Value::UInt32(1),
            Value::UInt32(2),
            Value::Null,
            Value::UInt32(3),
        ]),
    ];
    assert_eq!(
        &values[..],
        roundtrip_values(
            &Type::Array(Box::new(Type::Nullable(Box::new(Type::UInt32)))),
            &values[..]
        )
        .await
        .unwrap()
    );
}

#[tokio::test]
async fn roundtrip_map() {
    let values = &[
        Value::Map(vec![], vec![]),
        Value::Map(vec![Value::string("a")], vec![Value::UInt16(2)]),
        Value::Map(
            vec![Value::string("b"), Value::string("c")],
            vec![Value::UInt16(6), Value::UInt16(4)],
        ),
    ];
    assert_eq!(
        &values[..],
        roundtrip_values(
            &Type::Map(Box::new(Type::String), Box::new(Type::UInt16)),
            &values[..]
        )
        .await
        .unwrap()
    );
}

#[tokio::test]
async fn roundtrip_low_cardinality_string() {
    let values = &[
        Value::string(""),
        Value::string("abc"),
        Value::string("abc"),
        Value::string("bcd"),
        Value::string("bcd2"),
        Value::string("abc"),
        Value::string("abc"),
    ];
    assert_eq!(
        &values[..],
        roundtrip_values(&Type::LowCardinality(Box::new(Type::String)), &values[..])
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn roundtrip_low_cardinality_string_array() {
    let values = &[
        Value::Array(vec![]),
        Value::Array(vec![Value::string("")]),
        Value::Array(vec![Value::string("abc")]),
        Value::Array(vec![Value::string("bcd"), Value::string("abc")]),
        Value::Array(vec![Value::string("abc")]),
    ];
    assert_eq!(
        &values[..],
        roundtrip_values(
            &Type::Array(Box::new(Type::LowCardinality(Box::new(Type::String)))),
            &values[..]
        )
        .await
        .unwrap()
    );
}

#[tokio::test]
async fn roundtrip_low_cardinality_string_null() {
    let values = &[
        Value::string(""),
        Value::Null,
        Value::string("abc"),
        Value::string("abc"),
        Value::string("bcd"),
        Value::Null,
        Value::string("abc"),
    ];
    assert_eq!(
        &values[..],
        roundtrip_values(
            &Type::LowCardinality(Box::new(Type::Nullable(Box::new(Type::String)))),
            &values[..]
        )
        .await
        .unwrap()
    );
}

fn low_cardinality_index_tier(encoded: &[u8]) -> u64 {
    // 8-byte version, then the 8-byte flags word
    u64::from_le_bytes(encoded[8..16].try_into().unwrap()) & 0xff
}

async fn encode_low_cardinality(values: &[Value]) -> Vec<u8> {
    let type_ = Type::LowCardinality(Box::new(Type::String));
    let mut output = Vec::new();
    let mut state = SerializerState {};
    type_.serialize_prefix(&mut output, &mut state).await.unwrap();
    type_
        .serialize_column(values.to_vec(), &mut output, &mut state)
        .await
        .unwrap();
    output
}

#[tokio::test]
async fn low_cardinality_width_promotion() {
    // 256 distinct keys still fit 8-bit indices; 257 promote to 16-bit
    let dict8: Vec<Value> = (0..256).map(|i| Value::string(format!("k{i}"))).collect();
    assert_eq!(low_cardinality_index_tier(&encode_low_cardinality(&dict8).await), TUINT8);

    let dict16: Vec<Value> = (0..257).map(|i| Value::string(format!("k{i}"))).collect();
    assert_eq!(
        low_cardinality_index_tier(&encode_low_cardinality(&dict16).await),
        TUINT16
    );

    let type_ = Type::LowCardinality(Box::new(Type::String));
    let wide: Vec<Value> = (0..70_000).map(|i| Value::string(format!("k{i}"))).collect();
    let encoded = encode_low_cardinality(&wide).await;
    assert_eq!(low_cardinality_index_tier(&encoded), TUINT32);
    // and the full round trip still holds at the promoted width
    let mut input = &encoded[..];
    let mut state = DeserializerState {};
    type_.deserialize_prefix(&mut input, &mut state).await.unwrap();
    let decoded = type_
        .deserialize_column(&mut input, wide.len(), &mut state)
        .await
        .unwrap();
    assert_eq!(decoded, wide);
}

#[tokio::test]
async fn roundtrip_geo() {
    let point = |x| values::Point([x, x + 2.0]);
    let values = &[Value::Point(point(1.0)), Value::Point(point(3.0))];
    assert_eq!(
        &values[..],
        roundtrip_values(&Type::Point, &values[..]).await.unwrap()
    );
    let ring = |x| values::Ring(vec![point(x), point(2.0 * x)]);
    let values = &[Value::Ring(ring(1.0)), Value::Ring(ring(3.0))];
    assert_eq!(
        &values[..],
        roundtrip_values(&Type::Ring, &values[..]).await.unwrap()
    );
    let polygon = |x| values::Polygon(vec![ring(x), ring(2.0 * x)]);
    let values = &[Value::Polygon(polygon(1.0)), Value::Polygon(polygon(3.0))];
    assert_eq!(
        &values[..],
        roundtrip_values(&Type::Polygon, &values[..]).await.unwrap()
    );
    let multipolygon = |x| values::MultiPolygon(vec![polygon(x), polygon(2.0 * x)]);
    let values = &[
        Value::MultiPolygon(multipolygon(1.0)),
        Value::MultiPolygon(multipolygon(3.0)),
    ];
    assert_eq!(
        &values[..],
        roundtrip_values(&Type::MultiPolygon, &values[..])
            .await
            .unwrap()
    );
}

#[test]
fn type_string_roundtrip() {
    let types = [
        Type::Int8,
        Type::UInt256,
        Type::Float64,
        Type::Bool,
        Type::String,
        Type::FixedString(16),
        Type::Uuid,
        Type::Date,
        Type::Date32,
        Type::DateTime(chrono_tz::UTC),
        Type::DateTime(chrono_tz::Asia::Tokyo),
        Type::DateTime64(6, chrono_tz::America::New_York),
        Type::Ipv4,
        Type::Ipv6,
        Type::Json,
        Type::Decimal32(4),
        Type::Decimal256(70),
        Type::Enum8(vec![("up".to_string(), 1), ("down".to_string(), -1)]),
        Type::Enum16(vec![("with, comma".to_string(), 0), ("it's".to_string(), 1)]),
        Type::LowCardinality(Box::new(Type::Nullable(Box::new(Type::String)))),
        Type::Array(Box::new(Type::Array(Box::new(Type::Int64)))),
        Type::Tuple(vec![Type::UInt8, Type::Array(Box::new(Type::String))]),
        Type::Nullable(Box::new(Type::DateTime64(3, chrono_tz::UTC))),
        Type::Map(Box::new(Type::String), Box::new(Type::Array(Box::new(Type::UInt64)))),
        Type::Nested(vec![
            ("id".to_string(), Type::UInt64),
            ("tags".to_string(), Type::Array(Box::new(Type::String))),
        ]),
        Type::Point,
        Type::MultiPolygon,
    ];
    for type_ in types {
        let rendered = type_.to_string();
        assert_eq!(
            Type::from_str(&rendered).unwrap(),
            type_,
            "parse(render) failed for {rendered}"
        );
    }
}

#[test]
fn decimal_precision_maps_to_width() {
    assert_eq!(Type::from_str("Decimal(9, 4)").unwrap(), Type::Decimal32(4));
    assert_eq!(Type::from_str("Decimal(18, 4)").unwrap(), Type::Decimal64(4));
    assert_eq!(Type::from_str("Decimal(38, 4)").unwrap(), Type::Decimal128(4));
    assert_eq!(Type::from_str("Decimal(76, 4)").unwrap(), Type::Decimal256(4));
    assert!(Type::from_str("Decimal(77, 4)").is_err());
}

#[test]
fn bad_type_strings_are_rejected() {
    for bad in [
        "",
        "NotAType",
        "Array(",
        "Array()",
        "Tuple(UInt8",
        "Enum8('a' 1)",
        "Nullable(UInt8, UInt8)",
        "FixedString(x)",
    ] {
        assert!(Type::from_str(bad).is_err(), "expected parse failure: {bad}");
    }
}

#[test]
fn enum_labels_with_escapes() {
    let parsed = Type::from_str(r"Enum8('a\'b' = 1,'c\\d' = 2)").unwrap();
    assert_eq!(
        parsed,
        Type::Enum8(vec![("a'b".to_string(), 1), ("c\\d".to_string(), 2)])
    );
    assert_eq!(Type::from_str(&parsed.to_string()).unwrap(), parsed);
}
