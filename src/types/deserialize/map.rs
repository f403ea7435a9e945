use crate::{io::ClickhouseRead, values::Value, Result};

use super::array::{read_offsets, split_by_offsets};
use super::{Deserializer, DeserializerState, Type};

pub struct MapDeserializer;

// Wire-identical to Array(Tuple(K, V)): offsets, then the flat key column,
// then the flat value column.
impl Deserializer for MapDeserializer {
    async fn read_prefix<R: ClickhouseRead>(
        type_: &Type,
        reader: &mut R,
        state: &mut DeserializerState,
    ) -> Result<()> {
        match type_ {
            Type::Map(key, value) => {
                key.deserialize_prefix(reader, state).await?;
                value.deserialize_prefix(reader, state).await?;
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
        let (key, value) = type_.unwrap_map();
        let offsets = read_offsets(reader, rows).await?;
        let total = offsets.last().copied().unwrap_or(0) as usize;
        let keys = key.deserialize_column(reader, total, state).await?;
        let values = value.deserialize_column(reader, total, state).await?;
        let keys = split_by_offsets(keys, &offsets);
        let values = split_by_offsets(values, &offsets);
        Ok(keys
            .into_iter()
            .zip(values)
            .map(|(k, v)| Value::Map(k, v))
            .collect())
    }
}
