#![forbid(unsafe_code)]

use super::TableKind;
use std::str::FromStr;
use tracing::warn;

/// Kind of change a row describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowTag {
    Add,
    Update,
    Remove,
}

/// One tagged row of a configuration table. `values` follow the column
/// order of the table; remove rows may carry no values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub id: u64,
    pub tag: RowTag,
    pub values: Vec<String>,
}

impl Row {
    /// Start building a row of `table` with every column at its default.
    pub fn build(table: TableKind, id: u64) -> RowBuilder {
        RowBuilder {
            table,
            row: Row {
                id,
                tag: RowTag::Add,
                values: table
                    .columns()
                    .iter()
                    .map(|column| column.default.to_owned())
                    .collect(),
            },
        }
    }

    pub fn remove(id: u64) -> Self {
        Self {
            id,
            tag: RowTag::Remove,
            values: Vec::new(),
        }
    }

    pub fn is_remove(&self) -> bool {
        self.tag == RowTag::Remove
    }
}

#[derive(Debug, Clone)]
pub struct RowBuilder {
    table: TableKind,
    row: Row,
}

impl RowBuilder {
    pub fn set(mut self, column: &str, value: impl ToString) -> Self {
        match self.table.column_index(column) {
            Some(index) => self.row.values[index] = value.to_string(),
            None => warn!(table = self.table.name(), column, "unknown column ignored"),
        }
        self
    }

    pub fn tag(mut self, tag: RowTag) -> Self {
        self.row.tag = tag;
        self
    }

    pub fn update(self) -> Row {
        self.tag(RowTag::Update).finish()
    }

    pub fn finish(self) -> Row {
        self.row
    }
}

/// Why a row could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RowError {
    #[error("{table}: expected {expected} values, got {actual}")]
    Arity {
        table: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{table}: unknown column {column}")]
    MissingColumn {
        table: &'static str,
        column: String,
    },

    #[error("{table}.{column}: invalid number {value:?}")]
    InvalidNumber {
        table: &'static str,
        column: String,
        value: String,
    },

    #[error("{table}.{column}: invalid value {value:?}")]
    InvalidValue {
        table: &'static str,
        column: String,
        value: String,
    },
}

/// Typed access to the values of a row by column name.
#[derive(Debug, Clone, Copy)]
pub struct RowReader<'a> {
    table: TableKind,
    row: &'a Row,
}

impl<'a> RowReader<'a> {
    pub fn new(table: TableKind, row: &'a Row) -> Result<Self, RowError> {
        let expected = table.columns().len();
        if row.values.len() != expected {
            return Err(RowError::Arity {
                table: table.name(),
                expected,
                actual: row.values.len(),
            });
        }
        Ok(Self { table, row })
    }

    pub fn id(&self) -> u64 {
        self.row.id
    }

    pub fn str(&self, column: &str) -> Result<&'a str, RowError> {
        self.table
            .column_index(column)
            .map(|index| self.row.values[index].as_str())
            .ok_or_else(|| RowError::MissingColumn {
                table: self.table.name(),
                column: column.to_owned(),
            })
    }

    fn number<T: FromStr>(&self, column: &str) -> Result<T, RowError> {
        let value = self.str(column)?;
        value.trim().parse().map_err(|_| RowError::InvalidNumber {
            table: self.table.name(),
            column: column.to_owned(),
            value: value.to_owned(),
        })
    }

    pub fn u64(&self, column: &str) -> Result<u64, RowError> {
        self.number(column)
    }

    pub fn i64(&self, column: &str) -> Result<i64, RowError> {
        self.number(column)
    }

    pub fn u32(&self, column: &str) -> Result<u32, RowError> {
        self.number(column)
    }

    pub fn u8(&self, column: &str) -> Result<u8, RowError> {
        self.number(column)
    }

    pub fn bool(&self, column: &str) -> Result<bool, RowError> {
        Ok(self.number::<u8>(column)? != 0)
    }

    /// Decode an enum stored as its integer code.
    pub fn code<T>(&self, column: &str, from_code: fn(i64) -> Option<T>) -> Result<T, RowError> {
        let code = self.i64(column)?;
        from_code(code).ok_or_else(|| self.invalid(column))
    }

    /// Error for a value that parsed but is not acceptable.
    pub fn invalid(&self, column: &str) -> RowError {
        RowError::InvalidValue {
            table: self.table.name(),
            column: column.to_owned(),
            value: self.str(column).unwrap_or_default().to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::HostStatus;
    use pretty_assertions::assert_eq;

    #[test]
    fn builder_fills_defaults() {
        let row = Row::build(TableKind::Hosts, 7).set("host", "host-a").finish();
        let reader = RowReader::new(TableKind::Hosts, &row).unwrap();
        assert_eq!(reader.id(), 7);
        assert_eq!(reader.str("host").unwrap(), "host-a");
        assert_eq!(reader.u64("proxyid").unwrap(), 0);
        assert_eq!(
            reader.code("status", HostStatus::from_code).unwrap(),
            HostStatus::Monitored
        );
    }

    #[test]
    fn bad_values_are_reported() {
        let row = Row::build(TableKind::Hosts, 1)
            .set("status", "7")
            .set("proxyid", "x")
            .finish();
        let reader = RowReader::new(TableKind::Hosts, &row).unwrap();
        assert!(matches!(
            reader.code("status", HostStatus::from_code),
            Err(RowError::InvalidValue { .. })
        ));
        assert!(matches!(reader.u64("proxyid"), Err(RowError::InvalidNumber { .. })));
        assert!(matches!(reader.str("nope"), Err(RowError::MissingColumn { .. })));
    }

    #[test]
    fn short_rows_are_rejected() {
        let row = Row {
            id: 1,
            tag: RowTag::Add,
            values: vec!["a".into()],
        };
        assert!(matches!(
            RowReader::new(TableKind::Hosts, &row),
            Err(RowError::Arity { expected: 16, actual: 1, .. })
        ));
    }
}
