#![forbid(unsafe_code)]

//! Incremental synchronization of the cache with a row source.
//!
//! Rows are read into a [`Changeset`] before any lock is taken. The pass
//! then holds both write locks through an `ExclusiveSyncGuard`, applies
//! every table in [`TableKind::ALL`] order and stamps one precomputed
//! revision on everything it changes.

mod discovery;
mod engine;
mod hosts;
mod interfaces;
mod items;
mod macros;
mod proxies;
mod row;
mod schema;
mod settings;
mod source;
mod triggers;

pub use row::{Row, RowBuilder, RowError, RowReader, RowTag};
pub use schema::{Column, TableKind};
pub use source::{
    Changeset, ConfigSource, MemorySource, RowStream, SnapshotSource, SourceError, TableSnapshot,
};

pub(crate) use engine::run;

use std::collections::BTreeMap;
use std::time::Duration;

/// Row counts of one table in one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableCounts {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    /// Rows that could not be decoded.
    pub rejected: usize,
    /// Rows referring to records that are not cached.
    pub skipped: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Revision stamped on records changed by the pass.
    pub target: u64,
    /// Cache revision after the pass.
    pub revision: u64,
    pub changed: bool,
    pub tables: BTreeMap<TableKind, TableCounts>,
    pub elapsed: Duration,
}

impl SyncReport {
    pub fn counts(&self, table: TableKind) -> TableCounts {
        self.tables.get(&table).copied().unwrap_or_default()
    }

    pub fn rejected(&self) -> usize {
        self.tables.values().map(|counts| counts.rejected).sum()
    }
}
