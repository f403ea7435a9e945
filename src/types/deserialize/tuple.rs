use crate::{io::ClickhouseRead, values::Value, Result};

use super::{Deserializer, DeserializerState, Type};

pub struct TupleDeserializer;

impl Deserializer for TupleDeserializer {
    async fn read_prefix<R: ClickhouseRead>(
        type_: &Type,
        reader: &mut R,
        state: &mut DeserializerState,
    ) -> Result<()> {
        match type_ {
            Type::Tuple(inner) => {
                for item in inner {
                    item.deserialize_prefix(reader, state).await?;
                }
            }
            _ => unimplemented!(),
        }
        Ok(())
    }

    // n independently-encoded columns of equal row count, zipped back to rows
    async fn read<R: ClickhouseRead>(
        type_: &Type,
        reader: &mut R,
        rows: usize,
        state: &mut DeserializerState,
    ) -> Result<Vec<Value>> {
        let inner = type_.unwrap_tuple();
        let mut columns = Vec::with_capacity(inner.len());
        for item in inner {
            columns.push(item.deserialize_column(reader, rows, state).await?.into_iter());
        }
        let mut out = Vec::with_capacity(rows);
        for _ in 0..rows {
            out.push(Value::Tuple(
                columns.iter_mut().map(|x| x.next().unwrap()).collect(),
            ));
        }
        Ok(out)
    }
}
