use tokio::io::AsyncReadExt;

use crate::{io::ClickhouseRead, values::Value, Result};

use super::{Deserializer, DeserializerState, Type};

pub struct ArrayDeserializer;

/// Read `rows` cumulative element counts, then carve the flat child column
/// into per-row arrays.
pub(crate) async fn read_offsets<R: ClickhouseRead>(reader: &mut R, rows: usize) -> Result<Vec<u64>> {
    let mut offsets = Vec::with_capacity(rows);
    for _ in 0..rows {
        offsets.push(reader.read_u64_le().await?);
    }
    Ok(offsets)
}

pub(crate) fn split_by_offsets(mut items: Vec<Value>, offsets: &[u64]) -> Vec<Vec<Value>> {
    let mut out = Vec::with_capacity(offsets.len());
    let mut start = 0u64;
    for &offset in offsets {
        let len = (offset - start) as usize;
        let rest = items.split_off(len);
        out.push(items);
        items = rest;
        start = offset;
    }
    out
}

impl Deserializer for ArrayDeserializer {
    async fn read_prefix<R: ClickhouseRead>(
        type_: &Type,
        reader: &mut R,
        state: &mut DeserializerState,
    ) -> Result<()> {
        match type_ {
            Type::Array(inner) => {
                inner.deserialize_prefix(reader, state).await?;
            }
            _ => unimplemented!(),
        }
        Ok(())
    }

    async fn read<R: ClickhouseRead>(
        type_: &Type,
        reader: &mut R,
        rows: usize,
        state: &mut DeserializerState,
    ) -> Result<Vec<Value>> {
        let inner = type_.unwrap_array();
        let offsets = read_offsets(reader, rows).await?;
        let total = offsets.last().copied().unwrap_or(0) as usize;
        let items = inner.deserialize_column(reader, total, state).await?;
        Ok(split_by_offsets(items, &offsets)
            .into_iter()
            .map(Value::Array)
            .collect())
    }
}
