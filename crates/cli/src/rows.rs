//! Configuration rows read from a TOML file.
//!
//! Every top-level table is named after a configuration table and holds one
//! sub-table per row, keyed by the row id:
//!
//! ```toml
//! [hosts.10084]
//! host = "web-01"
//!
//! [items.23001]
//! hostid = 10084
//! key_ = "agent.ping"
//! delay = "1m"
//! ```
//!
//! Columns left out take their default. The whole file is re-read before
//! every pass and diffed against what the cache last applied.

use crate::error::Error;
use dccache::sync::{
    ConfigSource, Row, RowStream, SnapshotSource, SourceError, TableKind, TableSnapshot,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use toml_edit::{DocumentMut, Value};
use tracing::debug;

pub struct RowsFile {
    path: PathBuf,
    snapshot: SnapshotSource,
}

impl RowsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            snapshot: SnapshotSource::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the file again. Returns the number of rows found.
    pub async fn reload(&self) -> Result<usize, Error> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| Error::ReadRows {
                path: self.path.clone(),
                source,
            })?;
        let mut tables = parse_rows(&text)?;
        let mut rows = 0;
        for kind in TableKind::ALL {
            let table = tables.remove(&kind).unwrap_or_default();
            rows += table.len();
            self.snapshot.set_table(kind, table);
        }
        debug!(path = ?self.path, rows, "rows file loaded");
        Ok(rows)
    }

    /// Make the next pass see every row as new.
    pub fn reset(&self) {
        self.snapshot.reset();
    }
}

impl ConfigSource for RowsFile {
    fn open(&self, table: TableKind) -> Result<Box<dyn RowStream + '_>, SourceError> {
        self.snapshot.open(table)
    }

    fn commit(&self) {
        self.snapshot.commit();
    }
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.value().clone()),
        Value::Integer(number) => Some(number.value().to_string()),
        Value::Float(number) => Some(number.value().to_string()),
        Value::Boolean(flag) => Some(u8::from(*flag.value()).to_string()),
        Value::Datetime(_) | Value::Array(_) | Value::InlineTable(_) => None,
    }
}

/// Parse a rows document into full table snapshots.
pub fn parse_rows(text: &str) -> Result<HashMap<TableKind, TableSnapshot>, Error> {
    let document: DocumentMut = text.parse()?;
    let mut tables = HashMap::new();

    for (name, rows) in document.iter() {
        let kind = TableKind::from_name(name).ok_or_else(|| Error::UnknownTable(name.into()))?;
        let invalid = |key: &str, reason| Error::InvalidRow {
            table: name.into(),
            key: key.into(),
            reason,
        };
        let rows = rows
            .as_table_like()
            .ok_or_else(|| invalid("", "expected a table of rows"))?;

        let snapshot: &mut TableSnapshot = tables.entry(kind).or_default();
        for (key, columns) in rows.iter() {
            let id: u64 = key.parse().map_err(|_| invalid(key, "row key is not an id"))?;
            let columns = columns
                .as_table_like()
                .ok_or_else(|| invalid(key, "expected a table of columns"))?;
            let mut row = Row::build(kind, id);
            for (column, value) in columns.iter() {
                let value = value
                    .as_value()
                    .and_then(scalar)
                    .ok_or_else(|| invalid(key, "column values must be scalars"))?;
                row = row.set(column, value);
            }
            snapshot.insert(id, row.finish().values);
        }
    }
    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    const ROWS: &str = r#"
[hosts.1]
host = "host-a"
status = 0

[items]
2 = { hostid = 1, key_ = "agent.ping", delay = "30s" }

[interface.3]
hostid = 1
useip = true
ip = "192.0.2.1"
"#;

    fn column(kind: TableKind, values: &[String], name: &str) -> String {
        values[kind.column_index(name).unwrap()].clone()
    }

    #[test]
    fn rows_fill_columns_by_name() {
        let tables = parse_rows(ROWS).unwrap();
        assert_eq!(tables.len(), 3);

        let items = &tables[&TableKind::Items];
        let item = &items[&2];
        assert_eq!(column(TableKind::Items, item, "key_"), "agent.ping");
        assert_eq!(column(TableKind::Items, item, "hostid"), "1");
        // untouched columns keep their default
        assert_eq!(column(TableKind::Items, item, "value_type"), "3");

        let interface = &tables[&TableKind::Interfaces][&3];
        assert_eq!(column(TableKind::Interfaces, interface, "useip"), "1");
    }

    #[test]
    fn unknown_tables_are_rejected() {
        let err = parse_rows("[widgets.1]\nname = \"x\"\n").unwrap_err();
        assert!(matches!(err, Error::UnknownTable(name) if name == "widgets"));
    }

    #[test]
    fn row_keys_must_be_ids() {
        let err = parse_rows("[hosts.web]\nhost = \"x\"\n").unwrap_err();
        assert!(matches!(err, Error::InvalidRow { .. }));
    }

    proptest! {
        #[test]
        fn every_written_row_is_read_back(
            hosts in prop::collection::btree_map(1u64..100_000, "[a-z][a-z0-9 ._-]{0,20}", 0..20),
            status in 0u8..2,
        ) {
            let mut text = String::new();
            for (hostid, name) in &hosts {
                text.push_str(&format!("[hosts.{hostid}]\nhost = {name:?}\nstatus = {status}\n\n"));
            }

            let mut tables = parse_rows(&text).unwrap();
            let parsed = tables.remove(&TableKind::Hosts).unwrap_or_default();
            let read_back: BTreeMap<u64, (String, String)> = parsed
                .iter()
                .map(|(&id, values)| {
                    (
                        id,
                        (
                            column(TableKind::Hosts, values, "host"),
                            column(TableKind::Hosts, values, "status"),
                        ),
                    )
                })
                .collect();
            let expected: BTreeMap<u64, (String, String)> = hosts
                .into_iter()
                .map(|(id, name)| (id, (name, status.to_string())))
                .collect();
            prop_assert_eq!(read_back, expected);
            prop_assert!(tables.is_empty());
        }
    }

    #[tokio::test]
    async fn reload_diffs_against_the_last_commit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.toml");
        tokio::fs::write(&path, ROWS).await.unwrap();

        let source = RowsFile::new(&path);
        assert_eq!(source.reload().await.unwrap(), 3);
        let mut stream = source.open(TableKind::Hosts).unwrap();
        assert_eq!(stream.next().unwrap().map(|row| row.id), Some(1));
        drop(stream);
        source.commit();

        assert_eq!(source.reload().await.unwrap(), 3);
        let mut stream = source.open(TableKind::Hosts).unwrap();
        assert!(stream.next().unwrap().is_none());
        drop(stream);

        source.reset();
        let mut stream = source.open(TableKind::Hosts).unwrap();
        assert!(stream.next().unwrap().is_some());
    }
}
