use std::borrow::Cow;
use std::hash::{Hash, Hasher};

use crate::types::Type;

mod date;
mod from_value;
mod geo;
mod int256;
mod ip;

pub use date::*;
pub use from_value::*;
pub use geo::*;
pub use int256::*;
pub use ip::*;

/// A raw Clickhouse value.
/// Types are not strictly preserved (`String` and `FixedString` both land in
/// `String`). Use this for dynamically typed blocks.
#[derive(Debug, Clone)]
pub enum Value {
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Int128(i128),
    Int256(i256),

    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    UInt128(u128),
    UInt256(u256),

    Float32(f32),
    Float64(f64),

    Decimal32(usize, i32),
    Decimal64(usize, i64),
    Decimal128(usize, i128),
    Decimal256(usize, i256),

    Bool(bool),

    String(Vec<u8>),

    Uuid(::uuid::Uuid),

    Date(Date),
    Date32(Date32),
    DateTime(DateTime),
    DateTime64(DynDateTime64),

    Ipv4(Ipv4),
    Ipv6(Ipv6),

    /// Raw JSON document bytes; parsing is left to callers.
    Json(Vec<u8>),

    Enum8(i8),
    Enum16(i16),

    Array(Vec<Value>),

    Tuple(Vec<Value>),

    Null,

    Map(Vec<Value>, Vec<Value>),

    Point(Point),
    Ring(Ring),
    Polygon(Polygon),
    MultiPolygon(MultiPolygon),
}

impl Value {
    /// Convenience constructor for `Value::String` from text.
    pub fn string(value: impl AsRef<str>) -> Self {
        Value::String(value.as_ref().as_bytes().to_vec())
    }

    pub(crate) fn index_value(&self) -> usize {
        match self {
            Value::UInt8(x) => *x as usize,
            Value::UInt16(x) => *x as usize,
            Value::UInt32(x) => *x as usize,
            Value::UInt64(x) => *x as usize,
            _ => unimplemented!(),
        }
    }

    pub(crate) fn unwrap_array_ref(&self) -> &[Value] {
        match self {
            Value::Array(a) => &a[..],
            _ => unimplemented!(),
        }
    }

    pub(crate) fn unwrap_array(self) -> Vec<Value> {
        match self {
            Value::Array(a) => a,
            _ => unimplemented!(),
        }
    }

    pub(crate) fn justify_null<'a>(&'a self, type_: &Type) -> Cow<'a, Value> {
        if self == &Value::Null {
            Cow::Owned(type_.default_value())
        } else {
            Cow::Borrowed(self)
        }
    }

    /// Guesses a [`Type`] from the value; may not correspond to the actual
    /// column type in Clickhouse.
    pub fn guess_type(&self) -> Type {
        match self {
            Value::Int8(_) => Type::Int8,
            Value::Int16(_) => Type::Int16,
            Value::Int32(_) => Type::Int32,
            Value::Int64(_) => Type::Int64,
            Value::Int128(_) => Type::Int128,
            Value::Int256(_) => Type::Int256,
            Value::UInt8(_) => Type::UInt8,
            Value::UInt16(_) => Type::UInt16,
            Value::UInt32(_) => Type::UInt32,
            Value::UInt64(_) => Type::UInt64,
            Value::UInt128(_) => Type::UInt128,
            Value::UInt256(_) => Type::UInt256,
            Value::Float32(_) => Type::Float32,
            Value::Float64(_) => Type::Float64,
            Value::Decimal32(s, _) => Type::Decimal32(*s),
            Value::Decimal64(s, _) => Type::Decimal64(*s),
            Value::Decimal128(s, _) => Type::Decimal128(*s),
            Value::Decimal256(s, _) => Type::Decimal256(*s),
            Value::Bool(_) => Type::Bool,
            Value::String(_) => Type::String,
            Value::Uuid(_) => Type::Uuid,
            Value::Date(_) => Type::Date,
            Value::Date32(_) => Type::Date32,
            Value::DateTime(time) => Type::DateTime(time.0),
            Value::DateTime64(dt) => Type::DateTime64(dt.2, dt.0),
            Value::Ipv4(_) => Type::Ipv4,
            Value::Ipv6(_) => Type::Ipv6,
            Value::Json(_) => Type::Json,
            Value::Enum8(_) => unimplemented!(),
            Value::Enum16(_) => unimplemented!(),
            Value::Array(x) => Type::Array(Box::new(
                x.first().map(|x| x.guess_type()).unwrap_or(Type::String),
            )),
            Value::Tuple(values) => Type::Tuple(values.iter().map(|x| x.guess_type()).collect()),
            Value::Null => Type::Nullable(Box::new(Type::String)),
            Value::Map(k, v) => Type::Map(
                Box::new(k.first().map(|x| x.guess_type()).unwrap_or(Type::String)),
                Box::new(v.first().map(|x| x.guess_type()).unwrap_or(Type::String)),
            ),
            Value::Point(_) => Type::Point,
            Value::Ring(_) => Type::Ring,
            Value::Polygon(_) => Type::Polygon,
            Value::MultiPolygon(_) => Type::MultiPolygon,
        }
    }
}

// Floats compare and hash by bit pattern so values can key LowCardinality
// dictionaries.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;
        match (self, other) {
            (Int8(a), Int8(b)) => a == b,
            (Int16(a), Int16(b)) => a == b,
            (Int32(a), Int32(b)) => a == b,
            (Int64(a), Int64(b)) => a == b,
            (Int128(a), Int128(b)) => a == b,
            (Int256(a), Int256(b)) => a == b,
            (UInt8(a), UInt8(b)) => a == b,
            (UInt16(a), UInt16(b)) => a == b,
            (UInt32(a), UInt32(b)) => a == b,
            (UInt64(a), UInt64(b)) => a == b,
            (UInt128(a), UInt128(b)) => a == b,
            (UInt256(a), UInt256(b)) => a == b,
            (Float32(a), Float32(b)) => a.to_bits() == b.to_bits(),
            (Float64(a), Float64(b)) => a.to_bits() == b.to_bits(),
            (Decimal32(s1, a), Decimal32(s2, b)) => s1 == s2 && a == b,
            (Decimal64(s1, a), Decimal64(s2, b)) => s1 == s2 && a == b,
            (Decimal128(s1, a), Decimal128(s2, b)) => s1 == s2 && a == b,
            (Decimal256(s1, a), Decimal256(s2, b)) => s1 == s2 && a == b,
            (Bool(a), Bool(b)) => a == b,
            (String(a), String(b)) => a == b,
            (Uuid(a), Uuid(b)) => a == b,
            (Date(a), Date(b)) => a == b,
            (Date32(a), Date32(b)) => a == b,
            (DateTime(a), DateTime(b)) => a == b,
            (DateTime64(a), DateTime64(b)) => a == b,
            (Ipv4(a), Ipv4(b)) => a == b,
            (Ipv6(a), Ipv6(b)) => a == b,
            (Json(a), Json(b)) => a == b,
            (Enum8(a), Enum8(b)) => a == b,
            (Enum16(a), Enum16(b)) => a == b,
            (Array(a), Array(b)) => a == b,
            (Tuple(a), Tuple(b)) => a == b,
            (Null, Null) => true,
            (Map(k1, v1), Map(k2, v2)) => k1 == k2 && v1 == v2,
            (Point(a), Point(b)) => a == b,
            (Ring(a), Ring(b)) => a == b,
            (Polygon(a), Polygon(b)) => a == b,
            (MultiPolygon(a), MultiPolygon(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        use Value::*;
        std::mem::discriminant(self).hash(state);
        match self {
            Int8(x) => x.hash(state),
            Int16(x) => x.hash(state),
            Int32(x) => x.hash(state),
            Int64(x) => x.hash(state),
            Int128(x) => x.hash(state),
            Int256(x) => x.hash(state),
            UInt8(x) => x.hash(state),
            UInt16(x) => x.hash(state),
            UInt32(x) => x.hash(state),
            UInt64(x) => x.hash(state),
            UInt128(x) => x.hash(state),
            UInt256(x) => x.hash(state),
            Float32(x) => x.to_bits().hash(state),
            Float64(x) => x.to_bits().hash(state),
            Decimal32(s, x) => (s, x).hash(state),
            Decimal64(s, x) => (s, x).hash(state),
            Decimal128(s, x) => (s, x).hash(state),
            Decimal256(s, x) => (s, x).hash(state),
            Bool(x) => x.hash(state),
            String(x) => x.hash(state),
            Uuid(x) => x.hash(state),
            Date(x) => x.hash(state),
            Date32(x) => x.hash(state),
            DateTime(x) => x.hash(state),
            DateTime64(x) => x.hash(state),
            Ipv4(x) => x.hash(state),
            Ipv6(x) => x.hash(state),
            Json(x) => x.hash(state),
            Enum8(x) => x.hash(state),
            Enum16(x) => x.hash(state),
            Array(x) => x.hash(state),
            Tuple(x) => x.hash(state),
            Null => {}
            Map(k, v) => (k, v).hash(state),
            Point(x) => x.hash(state),
            Ring(x) => x.hash(state),
            Polygon(x) => x.hash(state),
            MultiPolygon(x) => x.hash(state),
        }
    }
}
