use crate::buffer::{ScanCursor, ScanError, ScanResult};
use crate::protocol::MAX_STRING_SIZE;

use super::low_cardinality::*;
use super::Type;

fn checked_payload(rows: usize, width: usize) -> ScanResult<usize> {
    rows.checked_mul(width)
        .ok_or_else(|| ScanError::corrupt("column payload size overflow"))
}

fn checked_count(count: u64) -> ScanResult<usize> {
    if count as usize > MAX_STRING_SIZE {
        return Err(ScanError::corrupt(format!(
            "element count too large: {} > {}",
            count, MAX_STRING_SIZE
        )));
    }
    Ok(count as usize)
}

/// Skip `count` cumulative UInt64 offsets, returning the last (the total
/// child element count).
fn skip_offsets(cursor: &mut ScanCursor, count: usize) -> ScanResult<usize> {
    let mut last = 0u64;
    for _ in 0..count {
        last = cursor.read_u64_le()?;
    }
    checked_count(last)
}

impl Type {
    /// Byte width of one value for contiguously encoded types.
    pub(crate) fn fixed_byte_width(&self) -> Option<usize> {
        Some(match self {
            Type::Int8 | Type::UInt8 | Type::Bool | Type::Enum8(_) => 1,
            Type::Int16 | Type::UInt16 | Type::Date | Type::Enum16(_) => 2,
            Type::Int32
            | Type::UInt32
            | Type::Float32
            | Type::Decimal32(_)
            | Type::Date32
            | Type::DateTime(_)
            | Type::Ipv4 => 4,
            Type::Int64
            | Type::UInt64
            | Type::Float64
            | Type::Decimal64(_)
            | Type::DateTime64(_, _) => 8,
            Type::Int128 | Type::UInt128 | Type::Decimal128(_) | Type::Uuid | Type::Ipv6 => 16,
            Type::Int256 | Type::UInt256 | Type::Decimal256(_) => 32,
            Type::Point => 16,
            _ => return None,
        })
    }

    /// Scan-side mirror of `deserialize_prefix`: walk the column prefix
    /// without allocating or consuming.
    pub(crate) fn skip_prefix(&self, cursor: &mut ScanCursor) -> ScanResult<()> {
        match self {
            Type::LowCardinality(_) => {
                cursor.skip(8)?;
            }
            Type::Array(inner) | Type::Nullable(inner) => inner.skip_prefix(cursor)?,
            Type::Map(key, value) => {
                key.skip_prefix(cursor)?;
                value.skip_prefix(cursor)?;
            }
            Type::Tuple(inner) => {
                for item in inner {
                    item.skip_prefix(cursor)?;
                }
            }
            Type::Nested(_) => {
                return Err(ScanError::corrupt(
                    "Nested columns are transmitted as parallel arrays",
                ))
            }
            _ => {}
        }
        Ok(())
    }

    /// Scan-side mirror of `deserialize_column`: determine whether the whole
    /// column payload is buffered, without allocating or consuming.
    pub(crate) fn skip_column(&self, cursor: &mut ScanCursor, rows: usize) -> ScanResult<()> {
        if let Some(width) = self.fixed_byte_width() {
            return cursor.skip(checked_payload(rows, width)?);
        }
        match self {
            Type::String | Type::Json => {
                for _ in 0..rows {
                    cursor.try_skip_string()?;
                }
            }
            Type::FixedString(n) => {
                cursor.skip(checked_payload(rows, *n)?)?;
            }
            Type::Nullable(inner) => {
                cursor.skip(rows)?;
                inner.skip_column(cursor, rows)?;
            }
            Type::Array(inner) => {
                let total = skip_offsets(cursor, rows)?;
                inner.skip_column(cursor, total)?;
            }
            Type::Map(key, value) => {
                let total = skip_offsets(cursor, rows)?;
                key.skip_column(cursor, total)?;
                value.skip_column(cursor, total)?;
            }
            Type::Tuple(inner) => {
                for item in inner {
                    item.skip_column(cursor, rows)?;
                }
            }
            Type::Ring => {
                let total = skip_offsets(cursor, rows)?;
                cursor.skip(checked_payload(total, 16)?)?;
            }
            Type::Polygon => {
                let rings = skip_offsets(cursor, rows)?;
                let points = skip_offsets(cursor, rings)?;
                cursor.skip(checked_payload(points, 16)?)?;
            }
            Type::MultiPolygon => {
                let polygons = skip_offsets(cursor, rows)?;
                let rings = skip_offsets(cursor, polygons)?;
                let points = skip_offsets(cursor, rings)?;
                cursor.skip(checked_payload(points, 16)?)?;
            }
            Type::LowCardinality(inner) => {
                skip_low_cardinality(cursor, inner, rows)?;
            }
            Type::Nested(_) => {
                return Err(ScanError::corrupt(
                    "Nested columns are transmitted as parallel arrays",
                ))
            }
            _ => unreachable!("fixed-width types handled above"),
        }
        Ok(())
    }
}

fn skip_low_cardinality(cursor: &mut ScanCursor, inner: &Type, rows: usize) -> ScanResult<()> {
    let inner = inner.strip_null();
    let mut limit = rows;
    let mut pending = 0usize;
    let mut width = 1usize;
    let mut seen_global_dictionary = false;
    while limit > 0 {
        if pending == 0 {
            let flags = cursor.read_u64_le()?;
            let tier = flags & 0xff;
            if tier > TUINT64 {
                return Err(ScanError::corrupt(format!(
                    "LowCardinality: bad index type: {tier}"
                )));
            }
            width = tier_width(tier);
            let needs_global = (flags & NEED_GLOBAL_DICTIONARY_BIT) != 0;
            let needs_update = (flags & NEED_UPDATE_DICTIONARY_BIT) != 0;
            if needs_global && (!seen_global_dictionary || needs_update) {
                let count = checked_count(cursor.read_u64_le()?)?;
                inner.skip_column(cursor, count)?;
                seen_global_dictionary = true;
            }
            if (flags & HAS_ADDITIONAL_KEYS_BIT) != 0 {
                let count = checked_count(cursor.read_u64_le()?)?;
                inner.skip_column(cursor, count)?;
            }
            pending = checked_count(cursor.read_u64_le()?)?;
            if pending == 0 {
                return Err(ScanError::corrupt(
                    "LowCardinality: empty index run with rows remaining",
                ));
            }
        }
        let chunk = limit.min(pending);
        cursor.skip(checked_payload(chunk, width)?)?;
        limit -= chunk;
        pending -= chunk;
    }
    Ok(())
}
