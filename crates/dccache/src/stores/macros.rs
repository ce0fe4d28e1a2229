#![forbid(unsafe_code)]

use super::Table;
use crate::Error;
use crate::arena::Arena;
use crate::domain::{MacroKind, MacroRef, UserMacro, find_macros};
use crate::strpool::StringPool;
use std::collections::{BTreeSet, HashMap};

/// Global and host-level user macros plus the secret values fetched for
/// vault macros.
#[derive(Debug)]
pub struct MacroStore {
    macros: Table<UserMacro>,
    /// Macro ids by host; globals are filed under host 0.
    by_host: HashMap<u64, BTreeSet<u64>>,
    /// Secret store contents by path.
    secrets: HashMap<String, HashMap<String, String>>,
}

/// Values of one macro row.
#[derive(Debug, Clone, Copy)]
pub struct MacroRow<'a> {
    pub hostid: u64,
    pub name: &'a str,
    pub context: &'a str,
    pub value: &'a str,
    pub kind: MacroKind,
}

impl MacroStore {
    pub fn new(arena: Arena) -> Self {
        Self {
            macros: Table::new(arena),
            by_host: HashMap::new(),
            secrets: HashMap::new(),
        }
    }

    /// Apply one row, returning whether anything changed and the host the
    /// macro was moved away from, if any.
    pub fn upsert(
        &mut self,
        pool: &mut StringPool,
        macroid: u64,
        row: MacroRow<'_>,
        revision: u64,
    ) -> Result<(bool, Option<u64>), Error> {
        let (record, found) = self.macros.insert_with(macroid, || UserMacro::new(macroid))?;
        let mut changed = !found;
        let mut moved_from = None;
        if found && record.hostid != row.hostid {
            moved_from = Some(record.hostid);
            changed = true;
        }
        record.hostid = row.hostid;
        changed |= pool.replace(found, &mut record.name, row.name)?;
        changed |= pool.replace_opt(found, &mut record.context, row.context)?;
        changed |= pool.replace(found, &mut record.value, row.value)?;
        changed |= crate::domain::update(&mut record.kind, row.kind);
        if changed {
            record.revision = revision;
        }

        if let Some(previous) = moved_from {
            self.unindex(previous, macroid);
        }
        self.by_host.entry(row.hostid).or_default().insert(macroid);
        Ok((changed, moved_from))
    }

    /// Remove a macro, returning the host it belonged to.
    pub fn remove(&mut self, pool: &mut StringPool, macroid: u64) -> Option<u64> {
        let record = self.macros.remove(macroid)?;
        let hostid = record.hostid;
        self.unindex(hostid, macroid);
        pool.release_all(record.into_handles());
        Some(hostid)
    }

    pub fn get(&self, macroid: u64) -> Option<&UserMacro> {
        self.macros.get(macroid)
    }

    pub fn for_host(&self, hostid: u64) -> impl Iterator<Item = &UserMacro> {
        self.by_host
            .get(&hostid)
            .into_iter()
            .flatten()
            .filter_map(|macroid| self.macros.get(*macroid))
    }

    fn find(&self, hostid: u64, name: &str, context: Option<&str>) -> Option<&UserMacro> {
        self.for_host(hostid).find(|m| {
            m.name.as_str() == name
                && match context {
                    Some(context) => m.context.is_set() && m.context.as_str() == context,
                    None => !m.context.is_set(),
                }
        })
    }

    /// Resolve a macro for a host.
    ///
    /// Lookup order: host macro with the same context, global macro with
    /// the same context, then the context-less host and global macros.
    pub fn resolve(&self, hostid: u64, macro_ref: &MacroRef) -> Option<String> {
        let name = macro_ref.name.as_str();
        let context = macro_ref.context.as_deref();
        let found = context
            .and_then(|ctx| {
                self.find(hostid, name, Some(ctx))
                    .or_else(|| self.find(0, name, Some(ctx)))
            })
            .or_else(|| self.find(hostid, name, None))
            .or_else(|| self.find(0, name, None))?;
        self.value_of(found)
    }

    fn value_of(&self, record: &UserMacro) -> Option<String> {
        match record.kind {
            MacroKind::Text | MacroKind::Secret => Some(record.value.to_string()),
            MacroKind::Vault => {
                let (path, key) = record.value.rsplit_once(':')?;
                self.secrets.get(path)?.get(key).cloned()
            }
        }
    }

    /// Expand every macro reference in `text`. Fails with the first
    /// reference that cannot be resolved.
    pub fn expand(&self, hostid: u64, text: &str) -> Result<String, String> {
        let found = find_macros(text);
        if found.is_empty() {
            return Ok(text.to_owned());
        }
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for (range, macro_ref) in found {
            let value = self
                .resolve(hostid, &macro_ref)
                .ok_or_else(|| text[range.clone()].to_owned())?;
            out.push_str(&text[last..range.start]);
            out.push_str(&value);
            last = range.end;
        }
        out.push_str(&text[last..]);
        Ok(out)
    }

    /// Paths referenced by vault macros.
    pub fn vault_paths(&self) -> BTreeSet<String> {
        self.macros
            .values()
            .filter(|m| m.kind == MacroKind::Vault)
            .filter_map(|m| m.value.rsplit_once(':').map(|(path, _)| path.to_owned()))
            .collect()
    }

    /// Replace the secret values of `path`. Returns the hosts owning vault
    /// macros whose value changed (0 for globals).
    pub fn set_secrets(
        &mut self,
        path: &str,
        values: HashMap<String, String>,
    ) -> BTreeSet<u64> {
        if self.secrets.get(path) == Some(&values) {
            return BTreeSet::new();
        }
        let previous = self.secrets.insert(path.to_owned(), values);
        let current = self.secrets.get(path);
        self.macros
            .values()
            .filter(|m| m.kind == MacroKind::Vault)
            .filter_map(|m| {
                let (p, key) = m.value.rsplit_once(':')?;
                let old = previous.as_ref().and_then(|values| values.get(key));
                let new = current.and_then(|values| values.get(key));
                (p == path && old != new).then_some(m.hostid)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.macros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (u64, &UserMacro)> {
        self.macros.iter()
    }

    fn unindex(&mut self, hostid: u64, macroid: u64) {
        if let Some(ids) = self.by_host.get_mut(&hostid) {
            ids.remove(&macroid);
            if ids.is_empty() {
                self.by_host.remove(&hostid);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::parse_macro_name;
    use pretty_assertions::assert_eq;

    fn store() -> (MacroStore, StringPool) {
        (
            MacroStore::new(Arena::new("records", 1 << 20)),
            StringPool::new(Arena::new("strings", 1 << 20)),
        )
    }

    fn row<'a>(hostid: u64, name: &'a str, context: &'a str, value: &'a str) -> MacroRow<'a> {
        MacroRow {
            hostid,
            name,
            context,
            value,
            kind: MacroKind::Text,
        }
    }

    #[test]
    fn host_macros_shadow_globals() {
        let (mut macros, mut pool) = store();
        macros.upsert(&mut pool, 1, row(0, "DELAY", "", "60s"), 1).unwrap();
        macros.upsert(&mut pool, 2, row(5, "DELAY", "", "30s"), 1).unwrap();
        macros.upsert(&mut pool, 3, row(0, "DELAY", "eth0", "10s"), 1).unwrap();

        let plain = parse_macro_name("{$DELAY}").unwrap();
        let ctx = parse_macro_name("{$DELAY:eth0}").unwrap();
        let other = parse_macro_name("{$DELAY:eth1}").unwrap();
        assert_eq!(macros.resolve(5, &plain).as_deref(), Some("30s"));
        assert_eq!(macros.resolve(6, &plain).as_deref(), Some("60s"));
        assert_eq!(macros.resolve(5, &ctx).as_deref(), Some("10s"));
        assert_eq!(macros.resolve(5, &other).as_deref(), Some("30s"));

        assert_eq!(macros.expand(5, "{$DELAY};{$DELAY:eth0}/1-5,09:00-18:00").unwrap(),
            "30s;10s/1-5,09:00-18:00");
        assert_eq!(macros.expand(5, "{$MISSING}"), Err("{$MISSING}".to_owned()));
    }

    #[test]
    fn vault_macros_read_fetched_secrets() {
        let (mut macros, mut pool) = store();
        let mut vault = row(7, "PASSWORD", "", "secret/db:password");
        vault.kind = MacroKind::Vault;
        macros.upsert(&mut pool, 1, vault, 1).unwrap();
        let password = parse_macro_name("{$PASSWORD}").unwrap();

        assert_eq!(macros.resolve(7, &password), None);
        assert_eq!(macros.vault_paths().into_iter().collect::<Vec<_>>(), vec!["secret/db"]);

        let values = HashMap::from([("password".to_owned(), "hunter2".to_owned())]);
        assert_eq!(macros.set_secrets("secret/db", values.clone()), BTreeSet::from([7]));
        assert!(macros.set_secrets("secret/db", values).is_empty());
        assert_eq!(macros.resolve(7, &password).as_deref(), Some("hunter2"));
    }

    #[test]
    fn removal_releases_strings() {
        let (mut macros, mut pool) = store();
        macros.upsert(&mut pool, 1, row(3, "A", "x", "1"), 1).unwrap();
        assert_eq!(macros.remove(&mut pool, 1), Some(3));
        assert!(pool.is_empty());
        assert_eq!(macros.for_host(3).count(), 0);
    }
}
