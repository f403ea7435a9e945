use tokio::io::AsyncWriteExt;

use crate::{io::ClickhouseWrite, values::Value, Result};

use super::{Serializer, SerializerState, Type};

pub struct NullableSerializer;

impl Serializer for NullableSerializer {
    async fn write_prefix<W: ClickhouseWrite>(
        type_: &Type,
        writer: &mut W,
        state: &mut SerializerState,
    ) -> Result<()> {
        type_.strip_null().serialize_prefix(writer, state).await
    }

    async fn write<W: ClickhouseWrite>(
        type_: &Type,
        values: Vec<Value>,
        writer: &mut W,
        state: &mut SerializerState,
    ) -> Result<()> {
        for value in &values {
            let mask = if value == &Value::Null { 1u8 } else { 0u8 };
            writer.write_u8(mask).await?;
        }
        // nulls carry the inner type's default payload
        type_
            .strip_null()
            .serialize_column(values, writer, state)
            .await?;
        Ok(())
    }
}
