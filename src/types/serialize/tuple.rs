use crate::{io::ClickhouseWrite, values::Value, ClickhouseError, Result};

use super::{Serializer, SerializerState, Type};

pub struct TupleSerializer;

impl Serializer for TupleSerializer {
    async fn write_prefix<W: ClickhouseWrite>(
        type_: &Type,
        writer: &mut W,
        state: &mut SerializerState,
    ) -> Result<()> {
        for item in type_.unwrap_tuple() {
            item.serialize_prefix(writer, state).await?;
        }
        Ok(())
    }

    async fn write<W: ClickhouseWrite>(
        type_: &Type,
        values: Vec<Value>,
        writer: &mut W,
        state: &mut SerializerState,
    ) -> Result<()> {
        let inner_types = type_.unwrap_tuple();
        let mut columns: Vec<Vec<Value>> = inner_types
            .iter()
            .map(|_| Vec::with_capacity(values.len()))
            .collect();
        for value in values {
            match value {
                Value::Tuple(items) if items.len() == inner_types.len() => {
                    for (column, item) in columns.iter_mut().zip(items) {
                        column.push(item);
                    }
                }
                value => {
                    return Err(ClickhouseError::SerializeError(format!(
                        "TupleSerializer: expected tuple of width {}, got {:?}",
                        inner_types.len(),
                        value
                    )))
                }
            }
        }
        for (inner_type, column) in inner_types.iter().zip(columns) {
            inner_type.serialize_column(column, writer, state).await?;
        }
        Ok(())
    }
}
