use std::str::FromStr;

use indexmap::IndexMap;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::{
    io::{ClickhouseRead, ClickhouseWrite},
    protocol::DBMS_MIN_REVISION_WITH_CUSTOM_SERIALIZATION,
    types::{DeserializerState, SerializerState, Type},
    values::Value,
    ClickhouseError, Result,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockInfo {
    pub is_overflows: bool,
    pub bucket_num: i32,
}

impl Default for BlockInfo {
    fn default() -> Self {
        BlockInfo {
            is_overflows: false,
            bucket_num: -1,
        }
    }
}

impl BlockInfo {
    pub async fn read<R: ClickhouseRead>(reader: &mut R) -> Result<Self> {
        let mut new = Self::default();
        loop {
            let field_num = reader.read_var_uint().await?;
            match field_num {
                0 => break,
                1 => {
                    new.is_overflows = reader.read_u8().await? != 0;
                }
                2 => {
                    new.bucket_num = reader.read_i32_le().await?;
                }
                field_num => {
                    return Err(ClickhouseError::ProtocolError(format!(
                        "unknown block info field number: {}",
                        field_num
                    )));
                }
            }
        }
        Ok(new)
    }

    pub async fn write<W: ClickhouseWrite>(&self, writer: &mut W) -> Result<()> {
        writer.write_var_uint(1).await?;
        writer.write_u8(self.is_overflows as u8).await?;
        writer.write_var_uint(2).await?;
        writer.write_i32_le(self.bucket_num).await?;
        writer.write_var_uint(0).await?;
        Ok(())
    }
}

/// A unit of columnar data exchanged with Clickhouse: a header plus one
/// column of values per field, all of equal row count.
#[derive(Debug, Clone, Default)]
pub struct Block {
    pub info: BlockInfo,
    pub rows: u64,
    pub column_types: IndexMap<String, Type>,
    pub column_data: IndexMap<String, Vec<Value>>,
}

pub struct BlockRowIter<'a> {
    block: &'a Block,
    row: u64,
}

impl<'a> Iterator for BlockRowIter<'a> {
    type Item = Vec<(&'a str, &'a Value)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.row >= self.block.rows {
            return None;
        }
        let mut out = Vec::new();
        for (name, value) in self.block.column_data.iter() {
            out.push((&**name, value.get(self.row as usize)?));
        }
        self.row += 1;
        Some(out)
    }
}

impl Block {
    /// An empty block: the client-data terminator, and the INSERT schema
    /// trigger.
    pub fn empty() -> Self {
        Block::default()
    }

    pub fn iter_rows(&self) -> BlockRowIter<'_> {
        BlockRowIter {
            block: self,
            row: 0,
        }
    }

    /// Take the first value of the first column, for scalar queries.
    pub fn take_first_value(&mut self) -> Option<Value> {
        let column = self.column_data.first_mut()?.1;
        if column.is_empty() {
            return None;
        }
        Some(column.remove(0))
    }

    pub async fn read<R: ClickhouseRead>(reader: &mut R, revision: u64) -> Result<Self> {
        let info = if revision > 0 {
            BlockInfo::read(reader).await?
        } else {
            Default::default()
        };
        let columns = reader.read_var_uint().await?;
        let rows = reader.read_var_uint().await?;
        let mut block = Block {
            info,
            rows,
            column_types: IndexMap::new(),
            column_data: IndexMap::new(),
        };
        for _ in 0..columns {
            let name = reader.read_utf8_string().await?;
            let type_name = reader.read_utf8_string().await?;
            let type_ = Type::from_str(&type_name)?;
            if revision >= DBMS_MIN_REVISION_WITH_CUSTOM_SERIALIZATION {
                let has_custom = reader.read_u8().await?;
                if has_custom != 0 {
                    return Err(ClickhouseError::ProtocolError(format!(
                        "custom serialization for column {name} is not supported"
                    )));
                }
            }
            block.column_types.insert(name.clone(), type_.clone());
            let mut state = DeserializerState {};
            let row_data = if rows > 0 {
                type_.deserialize_prefix(reader, &mut state).await?;
                type_
                    .deserialize_column(reader, rows as usize, &mut state)
                    .await?
            } else {
                vec![]
            };
            block.column_data.insert(name, row_data);
        }

        Ok(block)
    }

    pub async fn write<W: ClickhouseWrite>(&self, writer: &mut W, revision: u64) -> Result<()> {
        if revision > 0 {
            self.info.write(writer).await?;
        }
        let joined = self
            .column_types
            .iter()
            .flat_map(|(key, type_)| Some((key, (type_, self.column_data.get(key)?))))
            .collect::<Vec<_>>();
        writer.write_var_uint(joined.len() as u64).await?;
        writer.write_var_uint(self.rows).await?;
        for (name, (type_, data)) in joined {
            writer.write_string(name.as_bytes()).await?;
            writer.write_string(type_.to_string().as_bytes()).await?;
            if revision >= DBMS_MIN_REVISION_WITH_CUSTOM_SERIALIZATION {
                writer.write_u8(0).await?;
            }
            if data.len() != self.rows as usize {
                return Err(ClickhouseError::SerializeError(format!(
                    "row and column length mismatch in column {name}: {} != {}",
                    data.len(),
                    self.rows
                )));
            }
            if self.rows > 0 {
                let mut state = SerializerState {};
                type_.serialize_prefix(writer, &mut state).await?;
                type_
                    .serialize_column(data.clone(), writer, &mut state)
                    .await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::DBMS_TCP_PROTOCOL_VERSION;

    fn sample_block() -> Block {
        let mut block = Block {
            rows: 3,
            ..Block::default()
        };
        block.column_types.insert("id".to_string(), Type::Int32);
        block
            .column_types
            .insert("name".to_string(), Type::String);
        block.column_data.insert(
            "id".to_string(),
            vec![Value::Int32(1), Value::Int32(2), Value::Int32(3)],
        );
        block.column_data.insert(
            "name".to_string(),
            vec![
                Value::string("a"),
                Value::string("b"),
                Value::string("c"),
            ],
        );
        block
    }

    #[tokio::test]
    async fn roundtrip_with_custom_serialization_byte() {
        let block = sample_block();
        let mut bytes = Vec::new();
        block.write(&mut bytes, DBMS_TCP_PROTOCOL_VERSION).await.unwrap();
        let decoded = Block::read(&mut &bytes[..], DBMS_TCP_PROTOCOL_VERSION)
            .await
            .unwrap();
        assert_eq!(decoded.rows, 3);
        assert_eq!(decoded.column_types, block.column_types);
        assert_eq!(decoded.column_data, block.column_data);
    }

    #[tokio::test]
    async fn nonzero_custom_serialization_is_fatal() {
        let block = sample_block();
        let mut bytes = Vec::new();
        block.write(&mut bytes, DBMS_TCP_PROTOCOL_VERSION).await.unwrap();
        // BlockInfo (8) + column/row counts (2) + "id" (3) + "Int32" (6)
        let custom_flag_offset = 8 + 2 + 3 + 6;
        assert_eq!(bytes[custom_flag_offset], 0);
        bytes[custom_flag_offset] = 1;
        let err = Block::read(&mut &bytes[..], DBMS_TCP_PROTOCOL_VERSION)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("custom serialization"));
    }

    #[tokio::test]
    async fn old_revisions_omit_the_custom_serialization_byte() {
        let block = sample_block();
        let mut with = Vec::new();
        block.write(&mut with, DBMS_TCP_PROTOCOL_VERSION).await.unwrap();
        let mut without = Vec::new();
        block.write(&mut without, 54448).await.unwrap();
        assert_eq!(with.len(), without.len() + 2);
        let decoded = Block::read(&mut &without[..], 54448).await.unwrap();
        assert_eq!(decoded.column_data, block.column_data);
    }

    #[tokio::test]
    async fn empty_block_roundtrip() {
        let block = Block::empty();
        let mut bytes = Vec::new();
        block.write(&mut bytes, DBMS_TCP_PROTOCOL_VERSION).await.unwrap();
        let decoded = Block::read(&mut &bytes[..], DBMS_TCP_PROTOCOL_VERSION)
            .await
            .unwrap();
        assert_eq!(decoded.rows, 0);
        assert!(decoded.column_types.is_empty());
        assert_eq!(decoded.info, BlockInfo::default());
    }

    #[tokio::test]
    async fn mismatched_column_length_is_rejected() {
        let mut block = sample_block();
        block.rows = 2;
        let mut bytes = Vec::new();
        assert!(block
            .write(&mut bytes, DBMS_TCP_PROTOCOL_VERSION)
            .await
            .is_err());
    }
}
