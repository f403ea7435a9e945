use indexmap::IndexSet;
use tokio::io::AsyncWriteExt;

use crate::{io::ClickhouseWrite, values::Value, Result};

use super::{Serializer, SerializerState, Type};

use crate::types::low_cardinality::*;

pub struct LowCardinalitySerializer;

impl Serializer for LowCardinalitySerializer {
    async fn write_prefix<W: ClickhouseWrite>(
        _type_: &Type,
        writer: &mut W,
        _state: &mut SerializerState,
    ) -> Result<()> {
        writer.write_u64_le(LOW_CARDINALITY_VERSION).await?;
        Ok(())
    }

    async fn write<W: ClickhouseWrite>(
        type_: &Type,
        values: Vec<Value>,
        writer: &mut W,
        state: &mut SerializerState,
    ) -> Result<()> {
        let inner_type = match type_ {
            Type::LowCardinality(x) => &**x,
            _ => unimplemented!(),
        };

        if values.is_empty() {
            return Ok(());
        }

        let is_nullable = inner_type.is_nullable();
        let inner_type = inner_type.strip_null();

        let mut keys: IndexSet<&Value> = IndexSet::new();
        let nulled = Value::Null;
        if is_nullable {
            // dictionary slot 0 is reserved for null
            keys.insert(&nulled);
        }
        for value in &values {
            keys.insert(value);
        }

        let tier = index_tier(keys.len());
        let flags = tier | HAS_ADDITIONAL_KEYS_BIT | NEED_UPDATE_DICTIONARY_BIT;
        writer.write_u64_le(flags).await?;

        writer.write_u64_le(keys.len() as u64).await?;

        let mut keys_arr = keys.iter().copied().cloned().collect::<Vec<_>>();
        if is_nullable {
            keys_arr[0] = inner_type.default_value();
        }
        inner_type.serialize_column(keys_arr, writer, state).await?;

        writer.write_u64_le(values.len() as u64).await?;
        for value in &values {
            let index = keys.get_index_of(value).unwrap();
            match tier {
                TUINT8 => writer.write_u8(index as u8).await?,
                TUINT16 => writer.write_u16_le(index as u16).await?,
                TUINT32 => writer.write_u32_le(index as u32).await?,
                _ => writer.write_u64_le(index as u64).await?,
            }
        }
        Ok(())
    }
}
