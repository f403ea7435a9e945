use tokio::io::AsyncWriteExt;

use crate::{io::ClickhouseWrite, values::Value, Result};

use super::{Serializer, SerializerState, Type};

pub struct ArraySerializer;

impl Serializer for ArraySerializer {
    async fn write_prefix<W: ClickhouseWrite>(
        type_: &Type,
        writer: &mut W,
        state: &mut SerializerState,
    ) -> Result<()> {
        type_.unwrap_array().serialize_prefix(writer, state).await
    }

    async fn write<W: ClickhouseWrite>(
        type_: &Type,
        values: Vec<Value>,
        writer: &mut W,
        state: &mut SerializerState,
    ) -> Result<()> {
        let inner = type_.unwrap_array();
        let mut offset = 0usize;
        for value in &values {
            offset += value.unwrap_array_ref().len();
            writer.write_u64_le(offset as u64).await?;
        }
        let mut all_values: Vec<Value> = Vec::with_capacity(offset);
        for value in values {
            all_values.extend(value.unwrap_array());
        }
        inner.serialize_column(all_values, writer, state).await?;
        Ok(())
    }
}
