#![forbid(unsafe_code)]

use super::{Row, RowTag, TableKind};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("table {table} is unavailable: {message}")]
    Unavailable { table: &'static str, message: String },

    #[error("reading table {table} failed: {message}")]
    Read { table: &'static str, message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Pull-based stream of the tagged rows of one table.
pub trait RowStream {
    fn next(&mut self) -> Result<Option<Row>, SourceError>;
}

/// Provider of configuration changes.
pub trait ConfigSource: Send + Sync {
    fn open(&self, table: TableKind) -> Result<Box<dyn RowStream + '_>, SourceError>;

    /// Called once the rows returned by the last set of streams have been
    /// applied to the cache.
    fn commit(&self) {}
}

struct VecStream(std::vec::IntoIter<Row>);

impl RowStream for VecStream {
    fn next(&mut self) -> Result<Option<Row>, SourceError> {
        Ok(self.0.next())
    }
}

/// Source handing out rows queued by the caller, each row once.
#[derive(Debug, Default)]
pub struct MemorySource {
    pending: Mutex<HashMap<TableKind, Vec<Row>>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, table: TableKind, row: Row) {
        self.pending.lock().entry(table).or_default().push(row);
    }

    pub fn extend(&self, table: TableKind, rows: impl IntoIterator<Item = Row>) {
        self.pending.lock().entry(table).or_default().extend(rows);
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().values().all(Vec::is_empty)
    }
}

impl ConfigSource for MemorySource {
    fn open(&self, table: TableKind) -> Result<Box<dyn RowStream + '_>, SourceError> {
        let rows = self.pending.lock().remove(&table).unwrap_or_default();
        Ok(Box::new(VecStream(rows.into_iter())))
    }
}

/// Full contents of one table: row values by id.
pub type TableSnapshot = BTreeMap<u64, Vec<String>>;

#[derive(Debug, Default)]
struct SnapshotState {
    seen: HashMap<TableKind, TableSnapshot>,
    current: HashMap<TableKind, TableSnapshot>,
}

/// Source turning full table snapshots into tagged diffs.
///
/// New ids become add rows, changed values update rows and vanished ids
/// remove rows. The diff base only advances on [`ConfigSource::commit`],
/// so a pass abandoned half way is diffed again next time.
#[derive(Debug, Default)]
pub struct SnapshotSource {
    state: Mutex<SnapshotState>,
}

impl SnapshotSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current contents of `table`.
    pub fn set_table(&self, table: TableKind, rows: TableSnapshot) {
        self.state.lock().current.insert(table, rows);
    }

    /// Forget what was seen so the next pass re-adds every row.
    pub fn reset(&self) {
        self.state.lock().seen.clear();
    }

    fn diff(seen: Option<&TableSnapshot>, current: Option<&TableSnapshot>) -> Vec<Row> {
        let empty = TableSnapshot::new();
        let seen = seen.unwrap_or(&empty);
        let current = current.unwrap_or(&empty);

        let mut rows: Vec<Row> = current
            .iter()
            .filter_map(|(&id, values)| {
                let tag = match seen.get(&id) {
                    None => RowTag::Add,
                    Some(previous) if previous != values => RowTag::Update,
                    Some(_) => return None,
                };
                Some(Row {
                    id,
                    tag,
                    values: values.clone(),
                })
            })
            .collect();
        rows.extend(
            seen.keys()
                .filter(|id| !current.contains_key(id))
                .map(|&id| Row::remove(id)),
        );
        rows
    }
}

impl ConfigSource for SnapshotSource {
    fn open(&self, table: TableKind) -> Result<Box<dyn RowStream + '_>, SourceError> {
        let state = self.state.lock();
        let rows = Self::diff(state.seen.get(&table), state.current.get(&table));
        Ok(Box::new(VecStream(rows.into_iter())))
    }

    fn commit(&self) {
        let mut state = self.state.lock();
        state.seen = state.current.clone();
    }
}

/// Rows of every table, read before the cache is locked.
#[derive(Debug, Default)]
pub struct Changeset {
    tables: Vec<(TableKind, Vec<Row>)>,
}

impl Changeset {
    /// Read every table from `source`.
    ///
    /// Fails on the first source error, in which case nothing must be
    /// applied. Removals found between other rows are moved to the end.
    pub fn drain(source: &dyn ConfigSource) -> Result<Self, SourceError> {
        let mut tables = Vec::with_capacity(TableKind::ALL.len());
        for table in TableKind::ALL {
            let mut stream = source.open(table)?;
            let mut rows = Vec::new();
            while let Some(row) = stream.next()? {
                rows.push(row);
            }
            if !rows.is_empty() {
                debug!(table = table.name(), rows = rows.len(), "rows read");
                tables.push((table, Self::removals_last(table, rows)));
            }
        }
        Ok(Self { tables })
    }

    fn removals_last(table: TableKind, rows: Vec<Row>) -> Vec<Row> {
        let first_remove = rows.iter().position(Row::is_remove);
        let interleaved = first_remove.is_some_and(|first| rows[first..].iter().any(|r| !r.is_remove()));
        if !interleaved {
            return rows;
        }
        warn!(table = table.name(), "remove rows interleaved with changes, moving them last");
        let (removes, mut rows): (Vec<_>, Vec<_>) = rows.into_iter().partition(Row::is_remove);
        rows.extend(removes);
        rows
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tables.iter().map(|(_, rows)| rows.len()).sum()
    }

    pub(crate) fn into_tables(self) -> impl Iterator<Item = (TableKind, Vec<Row>)> {
        self.tables.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn values(text: &str) -> Vec<String> {
        TableKind::HostGroups
            .columns()
            .iter()
            .map(|_| text.to_owned())
            .collect()
    }

    #[test]
    fn snapshot_diff_tags_rows() {
        let source = SnapshotSource::new();
        source.set_table(TableKind::HostGroups, BTreeMap::from([(1, values("a")), (2, values("b"))]));
        let first = Changeset::drain(&source).unwrap();
        assert_eq!(first.len(), 2);
        source.commit();

        source.set_table(TableKind::HostGroups, BTreeMap::from([(2, values("c")), (3, values("d"))]));
        let tags: Vec<_> = Changeset::drain(&source)
            .unwrap()
            .into_tables()
            .flat_map(|(_, rows)| rows)
            .map(|row| (row.id, row.tag))
            .collect();
        assert_eq!(
            tags,
            vec![(2, RowTag::Update), (3, RowTag::Add), (1, RowTag::Remove)]
        );
    }

    #[test]
    fn uncommitted_diff_is_repeated() {
        let source = SnapshotSource::new();
        source.set_table(TableKind::HostGroups, BTreeMap::from([(1, values("a"))]));
        assert_eq!(Changeset::drain(&source).unwrap().len(), 1);
        assert_eq!(Changeset::drain(&source).unwrap().len(), 1);
        source.commit();
        assert!(Changeset::drain(&source).unwrap().is_empty());
    }

    #[test]
    fn interleaved_removes_move_last() {
        let source = MemorySource::new();
        source.extend(
            TableKind::HostGroups,
            [
                Row::remove(1),
                Row::build(TableKind::HostGroups, 2).finish(),
                Row::remove(3),
            ],
        );
        let ids: Vec<_> = Changeset::drain(&source)
            .unwrap()
            .into_tables()
            .flat_map(|(_, rows)| rows)
            .map(|row| row.id)
            .collect();
        assert_eq!(ids, vec![2, 1, 3]);
        assert!(source.is_empty());
    }

    struct Failing;

    impl ConfigSource for Failing {
        fn open(&self, table: TableKind) -> Result<Box<dyn RowStream + '_>, SourceError> {
            Err(SourceError::Unavailable {
                table: table.name(),
                message: "connection lost".into(),
            })
        }
    }

    #[test]
    fn source_failure_abandons_drain() {
        assert!(Changeset::drain(&Failing).is_err());
    }
}
