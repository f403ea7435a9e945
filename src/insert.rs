use indexmap::IndexMap;

use crate::block::Block;
use crate::types::Type;
use crate::values::Value;
use crate::{ClickhouseError, Result};

/// Per-column extraction: appends one row's value for a named column.
///
/// The mapping from source rows to columns is passed explicitly; nothing is
/// derived from the row type itself. Extractors yield owned values, so rows
/// are only borrowed for the duration of extraction.
pub struct ColumnExtractor<T> {
    name: String,
    extract: Box<dyn Fn(&T) -> Value + Send + Sync>,
}

impl<T> ColumnExtractor<T> {
    pub fn new(
        name: impl Into<String>,
        extract: impl Fn(&T) -> Value + Send + Sync + 'static,
    ) -> Self {
        ColumnExtractor {
            name: name.into(),
            extract: Box::new(extract),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Build an insert block from rows, laid out in the server's schema order.
/// Every schema column must have exactly one extractor.
pub fn rows_to_block<T>(
    schema: &IndexMap<String, Type>,
    rows: &[T],
    extractors: &[ColumnExtractor<T>],
) -> Result<Block> {
    let mut block = Block {
        rows: rows.len() as u64,
        ..Block::default()
    };
    for (name, type_) in schema {
        let extractor = extractors
            .iter()
            .find(|x| &x.name == name)
            .ok_or_else(|| {
                ClickhouseError::SerializeError(format!("no extractor for column '{name}'"))
            })?;
        let values = rows.iter().map(|row| (extractor.extract)(row)).collect();
        block.column_types.insert(name.clone(), type_.clone());
        block.column_data.insert(name.clone(), values);
    }
    Ok(block)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Row {
        id: i32,
        name: &'static str,
    }

    fn schema() -> IndexMap<String, Type> {
        let mut schema = IndexMap::new();
        schema.insert("id".to_string(), Type::Int32);
        schema.insert("name".to_string(), Type::String);
        schema
    }

    #[test]
    fn rows_map_to_schema_order() {
        let rows = [
            Row { id: 1, name: "a" },
            Row { id: 2, name: "b" },
        ];
        // extractor order differs from schema order on purpose
        let extractors = [
            ColumnExtractor::new("name", |row: &Row| Value::string(row.name)),
            ColumnExtractor::new("id", |row: &Row| Value::Int32(row.id)),
        ];
        let block = rows_to_block(&schema(), &rows, &extractors).unwrap();
        assert_eq!(block.rows, 2);
        assert_eq!(
            block.column_data.get_index(0).unwrap(),
            (
                &"id".to_string(),
                &vec![Value::Int32(1), Value::Int32(2)]
            )
        );
        assert_eq!(
            block.column_data.get_index(1).unwrap(),
            (
                &"name".to_string(),
                &vec![Value::string("a"), Value::string("b")]
            )
        );
    }

    #[test]
    fn missing_extractor_is_an_error() {
        let rows = [Row { id: 1, name: "a" }];
        let extractors = [ColumnExtractor::new("id", |row: &Row| Value::Int32(row.id))];
        assert!(rows_to_block(&schema(), &rows, &extractors).is_err());
    }
}
