use tokio::io::AsyncWriteExt;

use crate::{io::ClickhouseWrite, values::Value, ClickhouseError, Result};

use super::{Serializer, SerializerState, Type};

pub struct MapSerializer;

impl Serializer for MapSerializer {
    async fn write_prefix<W: ClickhouseWrite>(
        type_: &Type,
        writer: &mut W,
        state: &mut SerializerState,
    ) -> Result<()> {
        let (key, value) = type_.unwrap_map();
        key.serialize_prefix(writer, state).await?;
        value.serialize_prefix(writer, state).await?;
        Ok(())
    }

    async fn write<W: ClickhouseWrite>(
        type_: &Type,
        values: Vec<Value>,
        writer: &mut W,
        state: &mut SerializerState,
    ) -> Result<()> {
        let (key_type, value_type) = type_.unwrap_map();
        let mut all_keys = Vec::new();
        let mut all_values = Vec::new();
        let mut offset = 0usize;
        for value in values {
            match value {
                Value::Map(keys, values) if keys.len() == values.len() => {
                    offset += keys.len();
                    writer.write_u64_le(offset as u64).await?;
                    all_keys.extend(keys);
                    all_values.extend(values);
                }
                value => {
                    return Err(ClickhouseError::SerializeError(format!(
                        "MapSerializer: expected map with matching key/value counts, got {value:?}"
                    )))
                }
            }
        }
        key_type.serialize_column(all_keys, writer, state).await?;
        value_type
            .serialize_column(all_values, writer, state)
            .await?;
        Ok(())
    }
}
