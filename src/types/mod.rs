use std::future::Future;
use std::{fmt::Display, str::FromStr};

pub use chrono_tz::Tz;
use futures_util::FutureExt;
use uuid::Uuid;

mod deserialize;
mod low_cardinality;
mod serialize;
mod skip;
#[cfg(test)]
mod tests;

use crate::{
    i256,
    io::{ClickhouseRead, ClickhouseWrite},
    protocol::MAX_STRING_SIZE,
    u256,
    values::Value,
    ClickhouseError, Date, Date32, DateTime, DynDateTime64, Ipv4, Ipv6, Result,
};

/// A raw Clickhouse type, parsed from the type string the server sends with
/// every column.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Int8,
    Int16,
    Int32,
    Int64,
    Int128,
    Int256,

    UInt8,
    UInt16,
    UInt32,
    UInt64,
    UInt128,
    UInt256,

    Float32,
    Float64,

    Decimal32(usize),
    Decimal64(usize),
    Decimal128(usize),
    Decimal256(usize),

    Bool,

    String,
    FixedString(usize),

    Uuid,

    Date,
    Date32,
    DateTime(Tz),
    DateTime64(usize, Tz),

    Ipv4,
    Ipv6,

    /// Experimental JSON columns (server >= 25.6). Documents travel as
    /// length-prefixed bytes; this client does not interpret them.
    Json,

    // Geo types are aliases of tuples/arrays of Float64.
    Point,
    Ring,
    Polygon,
    MultiPolygon,

    Enum8(Vec<(String, i8)>),
    Enum16(Vec<(String, i16)>),

    LowCardinality(Box<Type>),

    Array(Box<Type>),

    Tuple(Vec<Type>),

    Nullable(Box<Type>),

    Map(Box<Type>, Box<Type>),

    /// Schema-level sugar for parallel arrays. Blocks never carry a `Nested`
    /// column; the server transmits `Array` columns named `n.field` instead.
    Nested(Vec<(String, Type)>),
}

impl Type {
    pub fn unwrap_array(&self) -> &Type {
        match self {
            Type::Array(x) => x,
            _ => unimplemented!(),
        }
    }

    pub fn unwrap_map(&self) -> (&Type, &Type) {
        match self {
            Type::Map(key, value) => (&**key, &**value),
            _ => unimplemented!(),
        }
    }

    pub fn unwrap_tuple(&self) -> &[Type] {
        match self {
            Type::Tuple(x) => &x[..],
            _ => unimplemented!(),
        }
    }

    pub fn strip_null(&self) -> &Type {
        match self {
            Type::Nullable(x) => x,
            _ => self,
        }
    }

    pub fn is_nullable(&self) -> bool {
        matches!(self, Type::Nullable(_))
    }

    pub fn strip_low_cardinality(&self) -> &Type {
        match self {
            Type::LowCardinality(x) => x,
            _ => self,
        }
    }

    pub fn default_value(&self) -> Value {
        match self {
            Type::Int8 => Value::Int8(0),
            Type::Int16 => Value::Int16(0),
            Type::Int32 => Value::Int32(0),
            Type::Int64 => Value::Int64(0),
            Type::Int128 => Value::Int128(0),
            Type::Int256 => Value::Int256(i256::default()),
            Type::UInt8 => Value::UInt8(0),
            Type::UInt16 => Value::UInt16(0),
            Type::UInt32 => Value::UInt32(0),
            Type::UInt64 => Value::UInt64(0),
            Type::UInt128 => Value::UInt128(0),
            Type::UInt256 => Value::UInt256(u256::default()),
            Type::Float32 => Value::Float32(0.0),
            Type::Float64 => Value::Float64(0.0),
            Type::Decimal32(s) => Value::Decimal32(*s, 0),
            Type::Decimal64(s) => Value::Decimal64(*s, 0),
            Type::Decimal128(s) => Value::Decimal128(*s, 0),
            Type::Decimal256(s) => Value::Decimal256(*s, i256::default()),
            Type::Bool => Value::Bool(false),
            Type::String => Value::String(vec![]),
            Type::FixedString(_) => Value::String(vec![]),
            Type::Uuid => Value::Uuid(Uuid::from_u128(0)),
            Type::Date => Value::Date(Date(0)),
            Type::Date32 => Value::Date32(Date32(0)),
            Type::DateTime(tz) => Value::DateTime(DateTime(*tz, 0)),
            Type::DateTime64(precision, tz) => {
                Value::DateTime64(DynDateTime64(*tz, 0, *precision))
            }
            Type::Ipv4 => Value::Ipv4(Ipv4::default()),
            Type::Ipv6 => Value::Ipv6(Ipv6::default()),
            Type::Json => Value::Json(vec![]),
            Type::Point => Value::Point(Default::default()),
            Type::Ring => Value::Ring(Default::default()),
            Type::Polygon => Value::Polygon(Default::default()),
            Type::MultiPolygon => Value::MultiPolygon(Default::default()),
            Type::Enum8(entries) => Value::Enum8(entries.first().map(|x| x.1).unwrap_or(0)),
            Type::Enum16(entries) => Value::Enum16(entries.first().map(|x| x.1).unwrap_or(0)),
            Type::LowCardinality(x) => x.default_value(),
            Type::Array(_) => Value::Array(vec![]),
            Type::Tuple(types) => Value::Tuple(types.iter().map(|x| x.default_value()).collect()),
            Type::Nullable(_) => Value::Null,
            Type::Map(_, _) => Value::Map(vec![], vec![]),
            Type::Nested(_) => Value::Array(vec![]),
        }
    }
}

// we assume complete identifier normalization and type resolution from clickhouse
fn eat_identifier(input: &str) -> (&str, &str) {
    for (i, c) in input.char_indices() {
        if c.is_alphabetic() || c == '_' || c == '$' || (i > 0 && c.is_numeric()) {
            continue;
        } else {
            return (&input[..i], &input[i..]);
        }
    }
    (input, "")
}

/// Split a parenthesized argument list on top-level commas, skipping over
/// nested parens and quoted strings (enum labels may contain commas).
fn parse_args(input: &str) -> Result<Vec<&str>> {
    if !input.starts_with('(') || !input.ends_with(')') {
        return Err(ClickhouseError::TypeParseError(
            "malformed arguments to type".to_string(),
        ));
    }
    let input = input[1..input.len() - 1].trim();
    let mut out = vec![];
    let mut in_parens = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut last_start = 0;
    for (i, c) in input.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => escaped = true,
            '\'' => in_string = !in_string,
            ',' if !in_string && in_parens == 0 => {
                out.push(input[last_start..i].trim());
                last_start = i + 1;
            }
            '(' if !in_string => in_parens += 1,
            ')' if !in_string => {
                if in_parens == 0 {
                    return Err(ClickhouseError::TypeParseError(
                        "mismatched parenthesis".to_string(),
                    ));
                }
                in_parens -= 1;
            }
            _ => (),
        }
    }
    if in_parens != 0 || in_string {
        return Err(ClickhouseError::TypeParseError(
            "mismatched parenthesis or quote".to_string(),
        ));
    }
    if last_start != input.len() {
        out.push(input[last_start..input.len()].trim());
    }
    Ok(out)
}

fn parse_scale(from: &str) -> Result<usize> {
    from.parse()
        .map_err(|_| ClickhouseError::TypeParseError("couldn't parse scale".to_string()))
}

fn parse_precision(from: &str) -> Result<usize> {
    from.parse()
        .map_err(|_| ClickhouseError::TypeParseError("couldn't parse precision".to_string()))
}

fn parse_quoted(from: &str) -> Result<(String, &str)> {
    let mut chars = from.char_indices();
    if chars.next().map(|(_, c)| c) != Some('\'') {
        return Err(ClickhouseError::TypeParseError(format!(
            "expected quoted string in '{from}'"
        )));
    }
    let mut out = String::new();
    while let Some((i, c)) = chars.next() {
        match c {
            '\'' => return Ok((out, &from[i + 1..])),
            '\\' => match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, '0')) => out.push('\0'),
                Some((_, c)) => out.push(c),
                None => break,
            },
            c => out.push(c),
        }
    }
    Err(ClickhouseError::TypeParseError(format!(
        "unterminated quoted string in '{from}'"
    )))
}

fn escape_quoted(from: &str) -> String {
    let mut out = String::with_capacity(from.len());
    for c in from.chars() {
        match c {
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\0' => out.push_str("\\0"),
            c => out.push(c),
        }
    }
    out
}

fn parse_enum_entry<T: TryFrom<i64>>(arg: &str) -> Result<(String, T)> {
    let (name, rest) = parse_quoted(arg.trim())?;
    let rest = rest.trim_start();
    let Some(value) = rest.strip_prefix('=') else {
        return Err(ClickhouseError::TypeParseError(format!(
            "expected '=' in enum entry '{arg}'"
        )));
    };
    let value: i64 = value.trim().parse().map_err(|_| {
        ClickhouseError::TypeParseError(format!("couldn't parse enum value in '{arg}'"))
    })?;
    let value = T::try_from(value).map_err(|_| {
        ClickhouseError::TypeParseError(format!("enum value out of range in '{arg}'"))
    })?;
    Ok((name, value))
}

fn parse_nested_field(arg: &str) -> Result<(String, Type)> {
    let arg = arg.trim();
    let (name, type_str) = if let Some(rest) = arg.strip_prefix('`') {
        let end = rest.find('`').ok_or_else(|| {
            ClickhouseError::TypeParseError(format!("unterminated identifier in '{arg}'"))
        })?;
        (rest[..end].to_string(), &rest[end + 1..])
    } else {
        let split = arg.find(char::is_whitespace).ok_or_else(|| {
            ClickhouseError::TypeParseError(format!("missing type in nested field '{arg}'"))
        })?;
        (arg[..split].to_string(), &arg[split..])
    };
    Ok((name, Type::from_str(type_str.trim())?))
}

impl FromStr for Type {
    type Err = ClickhouseError;

    fn from_str(s: &str) -> Result<Self> {
        let (ident, following) = eat_identifier(s);
        if ident.is_empty() {
            return Err(ClickhouseError::TypeParseError(format!(
                "invalid empty identifier for type: '{}'",
                s
            )));
        }
        let following = following.trim();
        if !following.is_empty() {
            let args = parse_args(following)?;
            return Ok(match ident {
                "Decimal" => {
                    if args.len() != 2 {
                        return Err(ClickhouseError::TypeParseError(format!(
                            "bad arg count for Decimal, expected 2 and got {}",
                            args.len()
                        )));
                    }
                    let p: usize = parse_precision(args[0])?;
                    let s: usize = parse_scale(args[1])?;
                    if p <= 9 {
                        Type::Decimal32(s)
                    } else if p <= 18 {
                        Type::Decimal64(s)
                    } else if p <= 38 {
                        Type::Decimal128(s)
                    } else if p <= 76 {
                        Type::Decimal256(s)
                    } else {
                        return Err(ClickhouseError::TypeParseError(
                            "bad decimal spec, cannot exceed 76 precision".to_string(),
                        ));
                    }
                }
                "Decimal32" => {
                    if args.len() != 1 {
                        return Err(ClickhouseError::TypeParseError(format!(
                            "bad arg count for Decimal32, expected 1 and got {}",
                            args.len()
                        )));
                    }
                    Type::Decimal32(parse_scale(args[0])?)
                }
                "Decimal64" => {
                    if args.len() != 1 {
                        return Err(ClickhouseError::TypeParseError(format!(
                            "bad arg count for Decimal64, expected 1 and got {}",
                            args.len()
                        )));
                    }
                    Type::Decimal64(parse_scale(args[0])?)
                }
                "Decimal128" => {
                    if args.len() != 1 {
                        return Err(ClickhouseError::TypeParseError(format!(
                            "bad arg count for Decimal128, expected 1 and got {}",
                            args.len()
                        )));
                    }
                    Type::Decimal128(parse_scale(args[0])?)
                }
                "Decimal256" => {
                    if args.len() != 1 {
                        return Err(ClickhouseError::TypeParseError(format!(
                            "bad arg count for Decimal256, expected 1 and got {}",
                            args.len()
                        )));
                    }
                    Type::Decimal256(parse_scale(args[0])?)
                }
                "FixedString" => {
                    if args.len() != 1 {
                        return Err(ClickhouseError::TypeParseError(format!(
                            "bad arg count for FixedString, expected 1 and got {}",
                            args.len()
                        )));
                    }
                    Type::FixedString(parse_scale(args[0])?)
                }
                "DateTime" => {
                    if args.len() != 1 {
                        return Err(ClickhouseError::TypeParseError(format!(
                            "bad arg count for DateTime, expected 1 and got {}",
                            args.len()
                        )));
                    }
                    let (timezone, rest) = parse_quoted(args[0])?;
                    if !rest.is_empty() {
                        return Err(ClickhouseError::TypeParseError(format!(
                            "trailing garbage after DateTime timezone: '{rest}'"
                        )));
                    }
                    Type::DateTime(timezone.parse().map_err(|e| {
                        ClickhouseError::TypeParseError(format!(
                            "failed to parse timezone for DateTime: '{}': {}",
                            args[0], e
                        ))
                    })?)
                }
                "DateTime64" => {
                    if args.len() == 2 {
                        let (timezone, rest) = parse_quoted(args[1])?;
                        if !rest.is_empty() {
                            return Err(ClickhouseError::TypeParseError(format!(
                                "trailing garbage after DateTime64 timezone: '{rest}'"
                            )));
                        }
                        Type::DateTime64(
                            parse_precision(args[0])?,
                            timezone.parse().map_err(|e| {
                                ClickhouseError::TypeParseError(format!(
                                    "failed to parse timezone for DateTime64: '{}': {}",
                                    args[1], e
                                ))
                            })?,
                        )
                    } else if args.len() == 1 {
                        Type::DateTime64(parse_precision(args[0])?, chrono_tz::UTC)
                    } else {
                        return Err(ClickhouseError::TypeParseError(format!(
                            "bad arg count for DateTime64, expected 1 or 2 and got {}",
                            args.len()
                        )));
                    }
                }
                "Enum8" => Type::Enum8(
                    args.iter()
                        .map(|x| parse_enum_entry::<i8>(x))
                        .collect::<Result<Vec<_>>>()?,
                ),
                "Enum16" => Type::Enum16(
                    args.iter()
                        .map(|x| parse_enum_entry::<i16>(x))
                        .collect::<Result<Vec<_>>>()?,
                ),
                "LowCardinality" => {
                    if args.len() != 1 {
                        return Err(ClickhouseError::TypeParseError(format!(
                            "bad arg count for LowCardinality, expected 1 and got {}",
                            args.len()
                        )));
                    }
                    Type::LowCardinality(Box::new(Type::from_str(args[0])?))
                }
                "Array" => {
                    if args.len() != 1 {
                        return Err(ClickhouseError::TypeParseError(format!(
                            "bad arg count for Array, expected 1 and got {}",
                            args.len()
                        )));
                    }
                    Type::Array(Box::new(Type::from_str(args[0])?))
                }
                "Nested" => Type::Nested(
                    args.iter()
                        .map(|x| parse_nested_field(x))
                        .collect::<Result<Vec<_>>>()?,
                ),
                "Tuple" => {
                    let mut inner = vec![];
                    for arg in args {
                        inner.push(arg.trim().parse()?);
                    }
                    Type::Tuple(inner)
                }
                "Nullable" => {
                    if args.len() != 1 {
                        return Err(ClickhouseError::TypeParseError(format!(
                            "bad arg count for Nullable, expected 1 and got {}",
                            args.len()
                        )));
                    }
                    Type::Nullable(Box::new(Type::from_str(args[0])?))
                }
                "Map" => {
                    if args.len() != 2 {
                        return Err(ClickhouseError::TypeParseError(format!(
                            "bad arg count for Map, expected 2 and got {}",
                            args.len()
                        )));
                    }
                    Type::Map(
                        Box::new(Type::from_str(args[0])?),
                        Box::new(Type::from_str(args[1])?),
                    )
                }
                _ => {
                    return Err(ClickhouseError::TypeParseError(format!(
                        "invalid type with arguments: '{}'",
                        ident
                    )))
                }
            });
        }
        Ok(match ident {
            "Int8" => Type::Int8,
            "Int16" => Type::Int16,
            "Int32" => Type::Int32,
            "Int64" => Type::Int64,
            "Int128" => Type::Int128,
            "Int256" => Type::Int256,
            "UInt8" => Type::UInt8,
            "UInt16" => Type::UInt16,
            "UInt32" => Type::UInt32,
            "UInt64" => Type::UInt64,
            "UInt128" => Type::UInt128,
            "UInt256" => Type::UInt256,
            "Float32" => Type::Float32,
            "Float64" => Type::Float64,
            "Bool" => Type::Bool,
            "String" => Type::String,
            "UUID" => Type::Uuid,
            "Date" => Type::Date,
            "Date32" => Type::Date32,
            "DateTime" => Type::DateTime(chrono_tz::UTC),
            "IPv4" => Type::Ipv4,
            "IPv6" => Type::Ipv6,
            "JSON" => Type::Json,
            "Point" => Type::Point,
            "Ring" => Type::Ring,
            "Polygon" => Type::Polygon,
            "MultiPolygon" => Type::MultiPolygon,
            _ => {
                return Err(ClickhouseError::TypeParseError(format!(
                    "invalid type name: '{}'",
                    ident
                )))
            }
        })
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Int8 => write!(f, "Int8"),
            Type::Int16 => write!(f, "Int16"),
            Type::Int32 => write!(f, "Int32"),
            Type::Int64 => write!(f, "Int64"),
            Type::Int128 => write!(f, "Int128"),
            Type::Int256 => write!(f, "Int256"),
            Type::UInt8 => write!(f, "UInt8"),
            Type::UInt16 => write!(f, "UInt16"),
            Type::UInt32 => write!(f, "UInt32"),
            Type::UInt64 => write!(f, "UInt64"),
            Type::UInt128 => write!(f, "UInt128"),
            Type::UInt256 => write!(f, "UInt256"),
            Type::Float32 => write!(f, "Float32"),
            Type::Float64 => write!(f, "Float64"),
            Type::Decimal32(s) => write!(f, "Decimal32({})", s),
            Type::Decimal64(s) => write!(f, "Decimal64({})", s),
            Type::Decimal128(s) => write!(f, "Decimal128({})", s),
            Type::Decimal256(s) => write!(f, "Decimal256({})", s),
            Type::Bool => write!(f, "Bool"),
            Type::String => write!(f, "String"),
            Type::FixedString(s) => write!(f, "FixedString({})", s),
            Type::Uuid => write!(f, "UUID"),
            Type::Date => write!(f, "Date"),
            Type::Date32 => write!(f, "Date32"),
            Type::DateTime(tz) => write!(f, "DateTime('{}')", tz),
            Type::DateTime64(precision, tz) => write!(f, "DateTime64({},'{}')", precision, tz),
            Type::Ipv4 => write!(f, "IPv4"),
            Type::Ipv6 => write!(f, "IPv6"),
            Type::Json => write!(f, "JSON"),
            Type::Point => write!(f, "Point"),
            Type::Ring => write!(f, "Ring"),
            Type::Polygon => write!(f, "Polygon"),
            Type::MultiPolygon => write!(f, "MultiPolygon"),
            Type::Enum8(items) => write!(
                f,
                "Enum8({})",
                items
                    .iter()
                    .map(|(name, value)| format!("'{}' = {}", escape_quoted(name), value))
                    .collect::<Vec<_>>()
                    .join(",")
            ),
            Type::Enum16(items) => write!(
                f,
                "Enum16({})",
                items
                    .iter()
                    .map(|(name, value)| format!("'{}' = {}", escape_quoted(name), value))
                    .collect::<Vec<_>>()
                    .join(",")
            ),
            Type::LowCardinality(inner) => write!(f, "LowCardinality({})", inner),
            Type::Array(inner) => write!(f, "Array({})", inner),
            Type::Tuple(items) => write!(
                f,
                "Tuple({})",
                items
                    .iter()
                    .map(|x| x.to_string())
                    .collect::<Vec<_>>()
                    .join(",")
            ),
            Type::Nullable(inner) => write!(f, "Nullable({})", inner),
            Type::Map(key, value) => write!(f, "Map({},{})", key, value),
            Type::Nested(fields) => write!(
                f,
                "Nested({})",
                fields
                    .iter()
                    .map(|(name, type_)| format!("{} {}", name, type_))
                    .collect::<Vec<_>>()
                    .join(",")
            ),
        }
    }
}

impl Type {
    pub(crate) fn deserialize_prefix<'a, R: ClickhouseRead>(
        &'a self,
        reader: &'a mut R,
        state: &'a mut DeserializerState,
    ) -> impl Future<Output = Result<()>> + Send + 'a {
        use deserialize::*;

        async move {
            match self {
                Type::Int8
                | Type::Int16
                | Type::Int32
                | Type::Int64
                | Type::Int128
                | Type::Int256
                | Type::UInt8
                | Type::UInt16
                | Type::UInt32
                | Type::UInt64
                | Type::UInt128
                | Type::UInt256
                | Type::Float32
                | Type::Float64
                | Type::Decimal32(_)
                | Type::Decimal64(_)
                | Type::Decimal128(_)
                | Type::Decimal256(_)
                | Type::Bool
                | Type::Uuid
                | Type::Date
                | Type::Date32
                | Type::DateTime(_)
                | Type::DateTime64(_, _)
                | Type::Ipv4
                | Type::Ipv6
                | Type::Enum8(_)
                | Type::Enum16(_) => {
                    sized::SizedDeserializer::read_prefix(self, reader, state).await?
                }

                Type::String | Type::FixedString(_) | Type::Json => {
                    string::StringDeserializer::read_prefix(self, reader, state).await?
                }

                Type::Array(_) => {
                    array::ArrayDeserializer::read_prefix(self, reader, state).await?
                }
                Type::Tuple(_) => {
                    tuple::TupleDeserializer::read_prefix(self, reader, state).await?
                }
                Type::Point => geo::PointDeserializer::read_prefix(self, reader, state).await?,
                Type::Ring => geo::RingDeserializer::read_prefix(self, reader, state).await?,
                Type::Polygon => geo::PolygonDeserializer::read_prefix(self, reader, state).await?,
                Type::MultiPolygon => {
                    geo::MultiPolygonDeserializer::read_prefix(self, reader, state).await?
                }
                Type::Nullable(_) => {
                    nullable::NullableDeserializer::read_prefix(self, reader, state).await?
                }
                Type::Map(_, _) => map::MapDeserializer::read_prefix(self, reader, state).await?,
                Type::LowCardinality(_) => {
                    low_cardinality::LowCardinalityDeserializer::read_prefix(self, reader, state)
                        .await?
                }
                Type::Nested(_) => {
                    return Err(ClickhouseError::DeserializeError(
                        "Nested columns are transmitted as parallel arrays".to_string(),
                    ))
                }
            }
            Ok(())
        }
        .boxed()
    }

    pub(crate) fn deserialize_column<'a, R: ClickhouseRead>(
        &'a self,
        reader: &'a mut R,
        rows: usize,
        state: &'a mut DeserializerState,
    ) -> impl Future<Output = Result<Vec<Value>>> + Send + 'a {
        use deserialize::*;

        async move {
            if rows > MAX_STRING_SIZE {
                return Err(ClickhouseError::ProtocolError(format!(
                    "deserialize response size too large. {} > {}",
                    rows, MAX_STRING_SIZE
                )));
            }

            Ok(match self {
                Type::Int8
                | Type::Int16
                | Type::Int32
                | Type::Int64
                | Type::Int128
                | Type::Int256
                | Type::UInt8
                | Type::UInt16
                | Type::UInt32
                | Type::UInt64
                | Type::UInt128
                | Type::UInt256
                | Type::Float32
                | Type::Float64
                | Type::Decimal32(_)
                | Type::Decimal64(_)
                | Type::Decimal128(_)
                | Type::Decimal256(_)
                | Type::Bool
                | Type::Uuid
                | Type::Date
                | Type::Date32
                | Type::DateTime(_)
                | Type::DateTime64(_, _)
                | Type::Ipv4
                | Type::Ipv6
                | Type::Enum8(_)
                | Type::Enum16(_) => {
                    sized::SizedDeserializer::read(self, reader, rows, state).await?
                }

                Type::String | Type::FixedString(_) | Type::Json => {
                    string::StringDeserializer::read(self, reader, rows, state).await?
                }

                Type::Array(_) => array::ArrayDeserializer::read(self, reader, rows, state).await?,
                Type::Tuple(_) => tuple::TupleDeserializer::read(self, reader, rows, state).await?,
                Type::Point => geo::PointDeserializer::read(self, reader, rows, state).await?,
                Type::Ring => geo::RingDeserializer::read(self, reader, rows, state).await?,
                Type::Polygon => geo::PolygonDeserializer::read(self, reader, rows, state).await?,
                Type::MultiPolygon => {
                    geo::MultiPolygonDeserializer::read(self, reader, rows, state).await?
                }
                Type::Nullable(_) => {
                    nullable::NullableDeserializer::read(self, reader, rows, state).await?
                }
                Type::Map(_, _) => map::MapDeserializer::read(self, reader, rows, state).await?,
                Type::LowCardinality(_) => {
                    low_cardinality::LowCardinalityDeserializer::read(self, reader, rows, state)
                        .await?
                }
                Type::Nested(_) => {
                    return Err(ClickhouseError::DeserializeError(
                        "Nested columns are transmitted as parallel arrays".to_string(),
                    ))
                }
            })
        }
        .boxed()
    }

    pub(crate) fn serialize_prefix<'a, W: ClickhouseWrite>(
        &'a self,
        writer: &'a mut W,
        state: &'a mut SerializerState,
    ) -> impl Future<Output = Result<()>> + Send + 'a {
        use serialize::*;

        async move {
            match self {
                Type::Int8
                | Type::Int16
                | Type::Int32
                | Type::Int64
                | Type::Int128
                | Type::Int256
                | Type::UInt8
                | Type::UInt16
                | Type::UInt32
                | Type::UInt64
                | Type::UInt128
                | Type::UInt256
                | Type::Float32
                | Type::Float64
                | Type::Decimal32(_)
                | Type::Decimal64(_)
                | Type::Decimal128(_)
                | Type::Decimal256(_)
                | Type::Bool
                | Type::Uuid
                | Type::Date
                | Type::Date32
                | Type::DateTime(_)
                | Type::DateTime64(_, _)
                | Type::Ipv4
                | Type::Ipv6
                | Type::Enum8(_)
                | Type::Enum16(_) => {
                    sized::SizedSerializer::write_prefix(self, writer, state).await?
                }

                Type::String | Type::FixedString(_) | Type::Json => {
                    string::StringSerializer::write_prefix(self, writer, state).await?
                }

                Type::Array(_) => array::ArraySerializer::write_prefix(self, writer, state).await?,
                Type::Tuple(_) => tuple::TupleSerializer::write_prefix(self, writer, state).await?,
                Type::Point => geo::PointSerializer::write_prefix(self, writer, state).await?,
                Type::Ring => geo::RingSerializer::write_prefix(self, writer, state).await?,
                Type::Polygon => geo::PolygonSerializer::write_prefix(self, writer, state).await?,
                Type::MultiPolygon => {
                    geo::MultiPolygonSerializer::write_prefix(self, writer, state).await?
                }
                Type::Nullable(_) => {
                    nullable::NullableSerializer::write_prefix(self, writer, state).await?
                }
                Type::Map(_, _) => map::MapSerializer::write_prefix(self, writer, state).await?,
                Type::LowCardinality(_) => {
                    low_cardinality::LowCardinalitySerializer::write_prefix(self, writer, state)
                        .await?
                }
                Type::Nested(_) => {
                    return Err(ClickhouseError::SerializeError(
                        "Nested columns are transmitted as parallel arrays".to_string(),
                    ))
                }
            }
            Ok(())
        }
        .boxed()
    }

    pub(crate) fn serialize_column<'a, W: ClickhouseWrite>(
        &'a self,
        values: Vec<Value>,
        writer: &'a mut W,
        state: &'a mut SerializerState,
    ) -> impl Future<Output = Result<()>> + Send + 'a {
        use serialize::*;

        async move {
            match self {
                Type::Int8
                | Type::Int16
                | Type::Int32
                | Type::Int64
                | Type::Int128
                | Type::Int256
                | Type::UInt8
                | Type::UInt16
                | Type::UInt32
                | Type::UInt64
                | Type::UInt128
                | Type::UInt256
                | Type::Float32
                | Type::Float64
                | Type::Decimal32(_)
                | Type::Decimal64(_)
                | Type::Decimal128(_)
                | Type::Decimal256(_)
                | Type::Bool
                | Type::Uuid
                | Type::Date
                | Type::Date32
                | Type::DateTime(_)
                | Type::DateTime64(_, _)
                | Type::Ipv4
                | Type::Ipv6
                | Type::Enum8(_)
                | Type::Enum16(_) => {
                    sized::SizedSerializer::write(self, values, writer, state).await?
                }

                Type::String | Type::FixedString(_) | Type::Json => {
                    string::StringSerializer::write(self, values, writer, state).await?
                }

                Type::Array(_) => {
                    array::ArraySerializer::write(self, values, writer, state).await?
                }
                Type::Tuple(_) => {
                    tuple::TupleSerializer::write(self, values, writer, state).await?
                }
                Type::Point => geo::PointSerializer::write(self, values, writer, state).await?,
                Type::Ring => geo::RingSerializer::write(self, values, writer, state).await?,
                Type::Polygon => geo::PolygonSerializer::write(self, values, writer, state).await?,
                Type::MultiPolygon => {
                    geo::MultiPolygonSerializer::write(self, values, writer, state).await?
                }
                Type::Nullable(_) => {
                    nullable::NullableSerializer::write(self, values, writer, state).await?
                }
                Type::Map(_, _) => map::MapSerializer::write(self, values, writer, state).await?,
                Type::LowCardinality(_) => {
                    low_cardinality::LowCardinalitySerializer::write(self, values, writer, state)
                        .await?
                }
                Type::Nested(_) => {
                    return Err(ClickhouseError::SerializeError(
                        "Nested columns are transmitted as parallel arrays".to_string(),
                    ))
                }
            }
            Ok(())
        }
        .boxed()
    }

    pub(crate) fn validate(&self) -> Result<()> {
        match self {
            Type::Decimal32(scale) => {
                if *scale == 0 || *scale > 9 {
                    return Err(ClickhouseError::TypeParseError(format!(
                        "scale out of bounds for Decimal32({}) must be in range (1..=9)",
                        *scale
                    )));
                }
            }
            Type::DateTime64(precision, _) | Type::Decimal64(precision) => {
                if *precision == 0 || *precision > 18 {
                    return Err(ClickhouseError::TypeParseError(format!("precision out of bounds for Decimal64/DateTime64({}) must be in range (1..=18)", *precision)));
                }
            }
            Type::Decimal128(scale) => {
                if *scale == 0 || *scale > 38 {
                    return Err(ClickhouseError::TypeParseError(format!(
                        "scale out of bounds for Decimal128({}) must be in range (1..=38)",
                        *scale
                    )));
                }
            }
            Type::Decimal256(scale) => {
                if *scale == 0 || *scale > 76 {
                    return Err(ClickhouseError::TypeParseError(format!(
                        "scale out of bounds for Decimal256({}) must be in range (1..=76)",
                        *scale
                    )));
                }
            }
            Type::LowCardinality(inner) => match inner.strip_null() {
                Type::String
                | Type::FixedString(_)
                | Type::Date
                | Type::Date32
                | Type::DateTime(_)
                | Type::Ipv4
                | Type::Ipv6
                | Type::Bool
                | Type::Int8
                | Type::Int16
                | Type::Int32
                | Type::Int64
                | Type::Int128
                | Type::Int256
                | Type::UInt8
                | Type::UInt16
                | Type::UInt32
                | Type::UInt64
                | Type::UInt128
                | Type::UInt256 => inner.validate()?,
                _ => {
                    return Err(ClickhouseError::TypeParseError(format!(
                        "illegal type '{:?}' in LowCardinality, not allowed",
                        inner
                    )))
                }
            },
            Type::Array(inner) => {
                inner.validate()?;
            }
            Type::Tuple(inner) => {
                for inner in inner {
                    inner.validate()?;
                }
            }
            Type::Nested(fields) => {
                for (_, inner) in fields {
                    inner.validate()?;
                }
            }
            Type::Nullable(inner) => match &**inner {
                Type::Array(_)
                | Type::Map(_, _)
                | Type::LowCardinality(_)
                | Type::Tuple(_)
                | Type::Nested(_)
                | Type::Nullable(_) => {
                    return Err(ClickhouseError::TypeParseError(format!(
                        "nullable cannot contain composite type '{:?}'",
                        inner
                    )));
                }
                _ => inner.validate()?,
            },
            Type::Map(key, value) => {
                if !matches!(
                    &**key,
                    Type::String
                        | Type::FixedString(_)
                        | Type::Int8
                        | Type::Int16
                        | Type::Int32
                        | Type::Int64
                        | Type::Int128
                        | Type::Int256
                        | Type::UInt8
                        | Type::UInt16
                        | Type::UInt32
                        | Type::UInt64
                        | Type::UInt128
                        | Type::UInt256
                        | Type::LowCardinality(_)
                        | Type::Uuid
                        | Type::Date
                        | Type::Date32
                        | Type::DateTime(_)
                        | Type::DateTime64(_, _)
                        | Type::Enum8(_)
                        | Type::Enum16(_)
                ) {
                    return Err(ClickhouseError::TypeParseError("key in map must be String, Integer, LowCardinality, FixedString, UUID, Date, DateTime, Date32, Enum".to_string()));
                }
                key.validate()?;
                value.validate()?;
            }
            _ => (),
        }
        Ok(())
    }

    pub(crate) fn validate_value(&self, value: &Value) -> Result<()> {
        self.validate()?;
        if !self.inner_validate_value(value) {
            return Err(ClickhouseError::TypeParseError(format!(
                "could not assign value '{:?}' to type '{:?}'",
                value, self
            )));
        }
        Ok(())
    }

    fn inner_validate_value(&self, value: &Value) -> bool {
        match (self, value) {
            (Type::Int8, Value::Int8(_))
            | (Type::Int16, Value::Int16(_))
            | (Type::Int32, Value::Int32(_))
            | (Type::Int64, Value::Int64(_))
            | (Type::Int128, Value::Int128(_))
            | (Type::Int256, Value::Int256(_))
            | (Type::UInt8, Value::UInt8(_))
            | (Type::UInt16, Value::UInt16(_))
            | (Type::UInt32, Value::UInt32(_))
            | (Type::UInt64, Value::UInt64(_))
            | (Type::UInt128, Value::UInt128(_))
            | (Type::UInt256, Value::UInt256(_))
            | (Type::Float32, Value::Float32(_))
            | (Type::Float64, Value::Float64(_)) => true,
            // bools were UInt8 before CH 22
            (Type::Bool, Value::Bool(_)) | (Type::Bool, Value::UInt8(_)) => true,
            (Type::Decimal32(scale1), Value::Decimal32(scale2, _)) => scale1 == scale2,
            (Type::Decimal64(scale1), Value::Decimal64(scale2, _)) => scale1 == scale2,
            (Type::Decimal128(scale1), Value::Decimal128(scale2, _)) => scale1 == scale2,
            (Type::Decimal256(scale1), Value::Decimal256(scale2, _)) => scale1 == scale2,
            (Type::String, Value::String(_))
            | (Type::FixedString(_), Value::String(_))
            | (Type::Json, Value::Json(_))
            | (Type::Json, Value::String(_))
            | (Type::Uuid, Value::Uuid(_))
            | (Type::Date, Value::Date(_))
            | (Type::Date32, Value::Date32(_)) => true,
            (Type::DateTime(tz1), Value::DateTime(date)) => tz1 == &date.0,
            (Type::DateTime64(precision1, tz1), Value::DateTime64(dt)) => {
                tz1 == &dt.0 && precision1 == &dt.2
            }
            (Type::Ipv4, Value::Ipv4(_)) | (Type::Ipv6, Value::Ipv6(_)) => true,
            (Type::Point, Value::Point(_))
            | (Type::Ring, Value::Ring(_))
            | (Type::Polygon, Value::Polygon(_))
            | (Type::MultiPolygon, Value::MultiPolygon(_)) => true,
            (Type::Enum8(entries), Value::Enum8(index)) => entries.iter().any(|x| x.1 == *index),
            (Type::Enum16(entries), Value::Enum16(index)) => entries.iter().any(|x| x.1 == *index),
            (Type::LowCardinality(x), value) => x.inner_validate_value(value),
            (Type::Array(inner_type), Value::Array(values)) => {
                values.iter().all(|x| inner_type.inner_validate_value(x))
            }
            (Type::Tuple(inner_types), Value::Tuple(values)) => {
                inner_types.len() == values.len()
                    && inner_types
                        .iter()
                        .zip(values.iter())
                        .all(|(type_, value)| type_.inner_validate_value(value))
            }
            (Type::Nullable(inner), value) => {
                value == &Value::Null || inner.inner_validate_value(value)
            }
            (Type::Map(key, value), Value::Map(keys, values)) => {
                keys.len() == values.len()
                    && keys.iter().all(|x| key.inner_validate_value(x))
                    && values.iter().all(|x| value.inner_validate_value(x))
            }
            (_, _) => false,
        }
    }
}

pub struct DeserializerState {}

pub struct SerializerState {}

pub trait Deserializer {
    fn read_prefix<R: ClickhouseRead>(
        _type_: &Type,
        _reader: &mut R,
        _state: &mut DeserializerState,
    ) -> impl Future<Output = Result<()>> + Send {
        async { Ok(()) }
    }

    fn read<R: ClickhouseRead>(
        type_: &Type,
        reader: &mut R,
        rows: usize,
        state: &mut DeserializerState,
    ) -> impl Future<Output = Result<Vec<Value>>> + Send;
}

pub trait Serializer {
    fn write_prefix<W: ClickhouseWrite>(
        _type_: &Type,
        _writer: &mut W,
        _state: &mut SerializerState,
    ) -> impl Future<Output = Result<()>> + Send {
        async { Ok(()) }
    }

    fn write<W: ClickhouseWrite>(
        type_: &Type,
        values: Vec<Value>,
        writer: &mut W,
        state: &mut SerializerState,
    ) -> impl Future<Output = Result<()>> + Send;
}
