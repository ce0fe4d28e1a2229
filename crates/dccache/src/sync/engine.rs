#![forbid(unsafe_code)]

use super::{
    Changeset, RowError, RowReader, RowTag, SyncReport, TableKind, discovery, hosts, interfaces,
    items, macros, proxies, settings, triggers,
};
use crate::Error;
use crate::data::{ConfigData, HistoryData};
use crate::domain::FunctionKind;
use crate::expression;
use crate::schedule;
use crate::stores::PskStore;
use crate::strpool::{StrHandle, StringPool};
use parking_lot::{RwLock, RwLockWriteGuard};
use std::collections::{BTreeSet, HashMap};
use std::mem::take;
use std::time::Instant;
use tracing::{debug, debug_span, error, info, warn};

/// Exclusive access to both cache locks for the duration of one pass.
///
/// Only the sync engine creates guards. Code running inside the pass reaches
/// the data through the guard instead of taking the locks again.
pub(crate) struct ExclusiveSyncGuard<'a> {
    config: RwLockWriteGuard<'a, ConfigData>,
    history: RwLockWriteGuard<'a, HistoryData>,
}

impl<'a> ExclusiveSyncGuard<'a> {
    fn acquire(config: &'a RwLock<ConfigData>, history: &'a RwLock<HistoryData>) -> Self {
        let config = config.write();
        let history = history.write();
        Self { config, history }
    }
}

/// Result of applying one add or update row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Applied {
    Added,
    Updated,
    Unchanged,
    /// The row refers to a record that is not cached.
    Skipped,
}

impl Applied {
    pub(super) fn from_change(found: bool, changed: bool) -> Self {
        match (found, changed) {
            (false, _) => Self::Added,
            (true, true) => Self::Updated,
            (true, false) => Self::Unchanged,
        }
    }
}

#[derive(Debug)]
pub(super) enum ApplyError {
    /// The row is rejected, the pass goes on.
    Row(RowError),
    /// The cache cannot take the row, the pass stops.
    Cache(Error),
}

impl From<RowError> for ApplyError {
    fn from(err: RowError) -> Self {
        Self::Row(err)
    }
}

impl From<Error> for ApplyError {
    fn from(err: Error) -> Self {
        Self::Cache(err)
    }
}

pub(super) type ApplyResult = Result<Applied, ApplyError>;

/// Follow-up work collected while rows are applied.
#[derive(Debug, Default)]
pub(super) struct Touched {
    pub hosts: BTreeSet<u64>,
    pub items: BTreeSet<u64>,
    pub triggers: BTreeSet<u64>,
    pub proxies: BTreeSet<u64>,
    /// Checks whose queue position must be recomputed.
    pub requeue_items: BTreeSet<u64>,
    pub requeue_all_items: bool,
    /// Hosts whose user macros changed; 0 stands for the global macros.
    pub macro_hosts: BTreeSet<u64>,
    /// `(itemid, old master, new master)`
    pub master_moves: Vec<(u64, u64, u64)>,
    pub triggers_dirty: bool,
    pub topology_dirty: bool,
    pub proxy_hosts_dirty: bool,
    pub proxy_groups_dirty: bool,
    pub drules: BTreeSet<u64>,
    pub httptests: BTreeSet<u64>,
    pub proxy_queue: BTreeSet<u64>,
    pub timer_functions: BTreeSet<u64>,
}

pub(super) struct Pass<'a> {
    pub(super) data: &'a mut ConfigData,
    pub(super) history: &'a mut HistoryData,
    /// Revision stamped on everything this pass changes.
    pub(super) target: u64,
    pub(super) now: i64,
    pub(super) touched: Touched,
}

type Upsert = fn(&mut Pass<'_>, &RowReader<'_>) -> ApplyResult;
type Remove = fn(&mut Pass<'_>, u64) -> bool;

fn handlers(table: TableKind) -> (Upsert, Remove) {
    match table {
        TableKind::Config => (settings::upsert_config, settings::remove_config),
        TableKind::AutoregPsk => (settings::upsert_autoreg_psk, settings::remove_autoreg_psk),
        TableKind::Hosts => (hosts::upsert_host, hosts::remove_host),
        TableKind::HostInventory => (hosts::upsert_inventory, hosts::remove_inventory),
        TableKind::HostGroups => (hosts::upsert_group, hosts::remove_group),
        TableKind::HostsGroups => (hosts::upsert_group_link, hosts::remove_group_link),
        TableKind::HostTags => (hosts::upsert_tag, hosts::remove_tag),
        TableKind::Interfaces => (interfaces::upsert_interface, interfaces::remove_interface),
        TableKind::InterfaceSnmp => (interfaces::upsert_snmp, interfaces::remove_snmp),
        TableKind::GlobalMacros => (macros::upsert_global, macros::remove_global),
        TableKind::HostMacros => (macros::upsert_host_macro, macros::remove_macro),
        TableKind::Items => (items::upsert_item, items::remove_item),
        TableKind::ItemDiscovery => (items::upsert_discovery, items::remove_discovery),
        TableKind::ItemPreproc => (items::upsert_preproc, items::remove_preproc),
        TableKind::ItemParameters => (items::upsert_param, items::remove_param),
        TableKind::ItemTags => (items::upsert_tag, items::remove_tag),
        TableKind::Triggers => (triggers::upsert_trigger, triggers::remove_trigger),
        TableKind::TriggerDepends => (triggers::upsert_dependency, triggers::remove_dependency),
        TableKind::Functions => (triggers::upsert_function, triggers::remove_function),
        TableKind::TriggerTags => (triggers::upsert_tag, triggers::remove_tag),
        TableKind::Correlations => (triggers::upsert_correlation, triggers::remove_correlation),
        TableKind::Drules => (discovery::upsert_drule, discovery::remove_drule),
        TableKind::Dchecks => (discovery::upsert_dcheck, discovery::remove_dcheck),
        TableKind::HttpTests => (discovery::upsert_httptest, discovery::remove_httptest),
        TableKind::HttpSteps => (discovery::upsert_httpstep, discovery::remove_httpstep),
        TableKind::Proxies => (proxies::upsert_proxy, proxies::remove_proxy),
        TableKind::ProxyGroups => (proxies::upsert_group, proxies::remove_group),
        TableKind::HostProxy => (proxies::upsert_host_proxy, proxies::remove_host_proxy),
    }
}

/// Apply `changeset` to the cache.
///
/// Rows that cannot be decoded are rejected one by one. Running out of
/// cache memory stops the pass; what was applied until then keeps its
/// revision and the error is returned.
pub(crate) fn run(
    config: &RwLock<ConfigData>,
    history: &RwLock<HistoryData>,
    changeset: Changeset,
    now: i64,
) -> Result<SyncReport, Error> {
    let started = Instant::now();
    let span = debug_span!("config_sync", rows = changeset.len());
    let _enter = span.enter();

    let mut guard = ExclusiveSyncGuard::acquire(config, history);
    let data: &mut ConfigData = &mut guard.config;
    let history: &mut HistoryData = &mut guard.history;
    let target = data.revision + 1;

    let mut pass = Pass {
        data,
        history,
        target,
        now,
        touched: Touched::default(),
    };
    let mut report = SyncReport {
        target,
        ..SyncReport::default()
    };
    let mut failure = None;

    'tables: for (table, rows) in changeset.into_tables() {
        let (upsert, remove) = handlers(table);
        let counts = report.tables.entry(table).or_default();
        for row in rows {
            if row.tag == RowTag::Remove {
                if remove(&mut pass, row.id) {
                    counts.removed += 1;
                }
                continue;
            }
            let outcome = RowReader::new(table, &row)
                .map_err(ApplyError::from)
                .and_then(|reader| upsert(&mut pass, &reader));
            match outcome {
                Ok(Applied::Added) => counts.added += 1,
                Ok(Applied::Updated) => counts.updated += 1,
                Ok(Applied::Unchanged) => {}
                Ok(Applied::Skipped) => {
                    debug!(table = table.name(), id = row.id, "row refers to unknown records");
                    counts.skipped += 1;
                }
                Err(ApplyError::Row(err)) => {
                    warn!(table = table.name(), id = row.id, %err, "configuration row rejected");
                    counts.rejected += 1;
                }
                Err(ApplyError::Cache(err)) => {
                    error!(table = table.name(), id = row.id, %err, "synchronization aborted");
                    failure = Some(err);
                    break 'tables;
                }
            }
        }
    }

    let changed = report
        .tables
        .values()
        .any(|counts| counts.added + counts.updated + counts.removed > 0);
    if let Err(err) = pass.finish() {
        error!(%err, "synchronization post-processing aborted");
        failure.get_or_insert(err);
    }
    if changed {
        pass.data.revision = target;
    }
    report.changed = changed;
    report.revision = pass.data.revision;
    drop(pass);
    drop(guard);
    report.elapsed = started.elapsed();

    if let Some(err) = failure {
        return Err(err);
    }
    if changed {
        info!(
            revision = report.revision,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "configuration synchronized"
        );
    } else {
        debug!(revision = report.revision, "configuration unchanged");
    }
    Ok(report)
}

impl Pass<'_> {
    fn finish(&mut self) -> Result<(), Error> {
        self.apply_master_moves();
        if self.touched.triggers_dirty {
            self.refresh_trigger_links();
        }
        if self.touched.topology_dirty {
            self.data.topology.sort_topologically(&mut self.data.triggers);
        }
        if self.touched.proxy_hosts_dirty {
            self.refresh_proxy_hosts();
        }
        if self.touched.proxy_groups_dirty {
            self.refresh_proxy_groups();
        }
        self.propagate_revisions();
        self.requeue()
    }

    fn apply_master_moves(&mut self) {
        let data = &mut *self.data;
        for (itemid, from, to) in take(&mut self.touched.master_moves) {
            if from != 0 {
                if let Some(dependents) = data.masteritems.get_mut(&from) {
                    dependents.remove(&itemid);
                    if dependents.is_empty() {
                        data.masteritems.remove(&from);
                    }
                }
                self.touched.items.insert(from);
            }
            if to != 0 && data.items.contains(itemid) {
                data.masteritems.entry(to).or_default().insert(itemid);
                self.touched.items.insert(to);
            }
        }
    }

    /// Rebuild the item to trigger references and the `functional` and
    /// `has_timers` flags of every trigger.
    fn refresh_trigger_links(&mut self) {
        let data = &mut *self.data;
        for (_, item) in data.items.iter_mut() {
            item.triggerids.clear();
        }
        for function in data.functions.values() {
            if let Some(item) = data.items.get_mut(function.itemid) {
                item.triggerids.push(function.triggerid);
            }
        }
        for (_, item) in data.items.iter_mut() {
            item.triggerids.sort_unstable();
            item.triggerids.dedup();
        }

        for (triggerid, trigger) in data.triggers.iter_mut() {
            let functionids = match expression::functionids(trigger.expression_bin.as_bytes())
                .and_then(|mut ids| {
                    ids.extend(expression::functionids(
                        trigger.recovery_expression_bin.as_bytes(),
                    )?);
                    Ok(ids)
                }) {
                Ok(ids) => ids,
                Err(err) => {
                    warn!(triggerid, %err, "cannot decode trigger expression");
                    data.functions_by_trigger
                        .get(&triggerid)
                        .map(|ids| ids.iter().copied().collect())
                        .unwrap_or_default()
                }
            };

            let mut itemids = Vec::with_capacity(functionids.len());
            let mut has_timers = false;
            for function in functionids.iter().filter_map(|id| data.functions.get(*id)) {
                itemids.push(function.itemid);
                has_timers |= function.kind != FunctionKind::Value;
            }
            itemids.sort_unstable();
            itemids.dedup();

            trigger.functional = itemids.iter().all(|itemid| {
                data.items.get(*itemid).is_some_and(|item| {
                    item.is_enabled()
                        && data.hosts.get(item.hostid).is_some_and(|host| host.is_monitored())
                })
            });
            trigger.has_timers = has_timers;
            trigger.itemids = Some(itemids);
        }
    }

    /// Recompute the host set of every proxy from the host records, keeping a
    /// journal of hosts that left.
    fn refresh_proxy_hosts(&mut self) {
        let data = &mut *self.data;
        let mut assigned: HashMap<u64, BTreeSet<u64>> = HashMap::new();
        for host in data.hosts.values().filter(|host| host.is_proxied()) {
            assigned.entry(host.proxyid).or_default().insert(host.hostid);
        }
        for (proxyid, proxy) in data.proxies.iter_mut() {
            let hostids = assigned.remove(&proxyid).unwrap_or_default();
            if hostids == proxy.hostids {
                continue;
            }
            for hostid in proxy.hostids.difference(&hostids) {
                proxy.removed_hosts.push(crate::domain::RemovedHost {
                    hostid: *hostid,
                    revision: self.target,
                });
            }
            proxy.removed_hosts.retain(|removed| !hostids.contains(&removed.hostid));
            proxy.hostids = hostids;
            self.touched.proxies.insert(proxyid);
        }
        for (proxyid, hostids) in assigned {
            debug!(proxyid, hosts = hostids.len(), "hosts assigned to unknown proxy");
        }
    }

    fn refresh_proxy_groups(&mut self) {
        let data = &mut *self.data;
        let mut members: HashMap<u64, BTreeSet<u64>> = HashMap::new();
        for proxy in data.proxies.values().filter(|proxy| proxy.proxy_groupid != 0) {
            members.entry(proxy.proxy_groupid).or_default().insert(proxy.proxyid);
        }
        for (groupid, group) in data.proxy_groups.iter_mut() {
            let proxyids = members.remove(&groupid).unwrap_or_default();
            if proxyids != group.proxyids {
                group.proxyids = proxyids;
                group.revision = self.target;
            }
        }
    }

    fn propagate_revisions(&mut self) {
        let data = &mut *self.data;
        let touched = &mut self.touched;
        let target = self.target;

        for itemid in &touched.items {
            if let Some(item) = data.items.get_mut(*itemid) {
                item.revision = target;
                touched.hosts.insert(item.hostid);
            }
        }
        for triggerid in &touched.triggers {
            if let Some(trigger) = data.triggers.get_mut(*triggerid) {
                trigger.revision = target;
            }
        }
        for hostid in &touched.hosts {
            if let Some(host) = data.hosts.get_mut(*hostid) {
                host.revision = target;
                if host.is_proxied() {
                    touched.proxies.insert(host.proxyid);
                }
            }
        }
        for proxyid in &touched.proxies {
            if let Some(proxy) = data.proxies.get_mut(*proxyid) {
                proxy.revision = target;
            }
        }
        for hostid in &touched.macro_hosts {
            if *hostid == 0 || data.hosts.contains(*hostid) {
                data.macro_revisions.insert(*hostid, target);
            }
        }
    }

    fn requeue(&mut self) -> Result<(), Error> {
        let data = &mut *self.data;
        let touched = &mut self.touched;
        let now = self.now;

        let mut itemids = take(&mut touched.requeue_items);
        if touched.requeue_all_items {
            itemids.extend(data.items.ids());
        } else if !touched.macro_hosts.is_empty() {
            let global = touched.macro_hosts.contains(&0);
            let uses_macros = |hostid: u64, delay: &str| {
                delay.contains("{$") && (global || touched.macro_hosts.contains(&hostid))
            };
            itemids.extend(
                data.items
                    .iter()
                    .filter(|(_, item)| uses_macros(item.hostid, item.delay.as_str()))
                    .map(|(itemid, _)| itemid),
            );
            touched.httptests.extend(
                data.httptests
                    .iter()
                    .filter(|(_, test)| uses_macros(test.hostid, test.delay.as_str()))
                    .map(|(httptestid, _)| httptestid),
            );
            if global {
                touched.drules.extend(
                    data.drules
                        .iter()
                        .filter(|(_, drule)| drule.delay.contains("{$"))
                        .map(|(druleid, _)| druleid),
                );
            }
        }

        for itemid in itemids {
            schedule::update_item_queue(data, itemid, now)?;
        }
        for druleid in take(&mut touched.drules) {
            schedule::update_drule_queue(data, druleid, now);
        }
        for httptestid in take(&mut touched.httptests) {
            schedule::update_httptest_queue(data, httptestid, now);
        }
        for proxyid in take(&mut touched.proxy_queue) {
            schedule::update_proxy_queue(data, proxyid, now);
        }
        schedule::queue_timers(data, take(&mut touched.timer_functions), now);
        Ok(())
    }
}

/// Point `slot` at the PSK store entry of `identity`, reporting whether the
/// owner's identity or effective key changed. An empty identity unlinks.
pub(super) fn relink_psk(
    psk: &mut PskStore,
    pool: &mut StringPool,
    slot: &mut StrHandle,
    identity: &str,
    secret: &str,
) -> Result<bool, Error> {
    if slot.is_set() && slot.as_str() == identity && psk.get(identity) == Some(secret) {
        return Ok(false);
    }
    let before = slot
        .is_set()
        .then(|| (slot.to_string(), psk.get(slot.as_str()).map(str::to_owned)));
    psk.unlink(pool, take(slot));
    if identity.is_empty() {
        return Ok(before.is_some());
    }
    *slot = psk.link(pool, identity, secret)?;
    let after = (identity.to_owned(), psk.get(identity).map(str::to_owned));
    Ok(before != Some(after))
}
