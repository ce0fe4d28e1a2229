#![forbid(unsafe_code)]

//! Lock discipline around the cached configuration.
//!
//! Two locks guard the cache: one for the configuration and one for the
//! per-check values the history cache maintains. Readers only take the read
//! lock and get owned snapshots back. Nothing blocking runs under a lock:
//! rows are drained before a pass, secrets are fetched before they are
//! stored and notifications are delivered after the lock is released.

use crate::Error;
use crate::clock::{Clock, SystemClock};
use crate::data::{CacheOptions, ConfigData, HistoryData, ItemRuntime};
use crate::domain::{InterfaceType, ItemState, MaintenanceStatus, MaintenanceType, update};
use crate::dump;
use crate::notify::{LogSink, NotificationSink};
use crate::persistence::{NoopRepository, TimerRepository};
use crate::queries::{self, MacroUpdates, ProxyConfigUpdate};
use crate::schedule::{
    self, AvailabilityDiff, CheckResult, InterfaceOutcome, ProxyNextcheck, TriggerTimer,
    WorkerClass, seconds,
};
use crate::snapshot::{
    CheckSnapshot, DruleSnapshot, FunctionSnapshot, HostGroupSnapshot, HostSnapshot,
    HttpTestSnapshot, InterfaceSnapshot, ProxySnapshot, TriggerSnapshot,
};
use crate::status::{self, CacheStatus};
use crate::sync::{self, Changeset, ConfigSource, SyncReport};
use crate::topology::DependencyStatus;
use config::Config;
use educe::Educe;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Read access to the secret store backing vault macros.
pub trait SecretStore: Send + Sync {
    /// Every key/value pair stored at `path`.
    fn fetch(&self, path: &str) -> Result<HashMap<String, String>, Error>;
}

pub struct Services {
    pub repo: Box<dyn TimerRepository>,
    pub clock: Arc<dyn Clock>,
    pub sink: Arc<dyn NotificationSink>,
    pub secrets: Option<Box<dyn SecretStore>>,
}

impl Services {
    /// Wall clock, log sink and no timer persistence.
    pub fn standalone() -> Self {
        Self {
            repo: Box::new(NoopRepository),
            clock: Arc::new(SystemClock),
            sink: Arc::new(LogSink),
            secrets: None,
        }
    }
}

/// Result of a check reported by a worker, applied to the cache and the
/// history side at once. `None` leaves a value as it is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemChange {
    pub itemid: u64,
    pub state: Option<ItemState>,
    pub error: Option<String>,
    pub lastlogsize: Option<u64>,
    pub mtime: Option<i64>,
    pub lastclock: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaintenanceUpdate {
    pub hostid: u64,
    pub maintenanceid: u64,
    pub status: MaintenanceStatus,
    pub kind: MaintenanceType,
    pub from: i64,
}

#[derive(Educe)]
#[educe(Debug)]
pub struct ConfigCache {
    config: RwLock<ConfigData>,
    history: RwLock<HistoryData>,
    #[educe(Debug(ignore))]
    services: Services,
    status_interval: i64,
}

impl ConfigCache {
    /// Create an empty cache sized and tuned by `config`.
    pub fn init(config: &Config, services: Services) -> Self {
        let options = CacheOptions {
            workers: config.workers,
            timing: config.timing.clone(),
        };
        info!(
            size = config.cache.size,
            strpool_percent = config.cache.strpool_percent,
            "configuration cache initialized"
        );
        Self {
            config: RwLock::new(ConfigData::new(&config.cache, options)),
            history: RwLock::new(HistoryData::default()),
            services,
            status_interval: seconds(config.timing.status_interval),
        }
    }

    pub fn now(&self) -> i64 {
        self.services.clock.now()
    }

    pub fn clock(&self) -> &dyn Clock {
        self.services.clock.as_ref()
    }

    /// Run `f` under the write lock, delivering the notifications it queued
    /// once the lock is released.
    fn write<R>(&self, f: impl FnOnce(&mut ConfigData) -> R) -> R {
        let (result, batch) = {
            let mut data = self.config.write();
            let result = f(&mut data);
            (result, data.take_notifications())
        };
        if !batch.is_empty() {
            self.services.sink.notify(batch);
        }
        result
    }

    /// Read access for callers that need more than the snapshot getters.
    pub fn read<R>(&self, f: impl FnOnce(&ConfigData) -> R) -> R {
        f(&self.config.read())
    }

    pub fn history<R>(&self, f: impl FnOnce(&HistoryData) -> R) -> R {
        f(&self.history.read())
    }

    /// Bring the cache up to date with `source`.
    pub fn sync(&self, source: &dyn ConfigSource) -> Result<SyncReport, Error> {
        let changeset = Changeset::drain(source)?;
        let now = self.now();
        let result = sync::run(&self.config, &self.history, changeset, now);
        let batch = self.config.write().take_notifications();
        if !batch.is_empty() {
            self.services.sink.notify(batch);
        }
        let report = result?;
        source.commit();
        Ok(report)
    }

    /// Fetch the secrets of every vault macro path and store them.
    ///
    /// Returns the number of hosts whose vault macros changed value.
    pub fn refresh_secrets(&self) -> Result<usize, Error> {
        let Some(store) = self.services.secrets.as_deref() else {
            return Ok(0);
        };
        let paths = self.config.read().macros.vault_paths();
        let mut fetched = Vec::with_capacity(paths.len());
        for path in paths {
            match store.fetch(&path) {
                Ok(values) => fetched.push((path, values)),
                Err(err) => warn!(path, %err, "cannot fetch secrets"),
            }
        }
        let mut data = self.config.write();
        let mut hosts = BTreeSet::new();
        for (path, values) in fetched {
            hosts.extend(data.macros.set_secrets(&path, values));
        }
        if !hosts.is_empty() {
            debug!(hosts = hosts.len(), "vault macro values changed");
        }
        Ok(hosts.len())
    }

    /// Queue trend timers saved by the previous run, then forget them.
    pub async fn restore_timers(&self) -> Result<usize, Error> {
        let timers = self.services.repo.take().await?;
        let stored = timers.len();
        let restored = self.write(|data| schedule::restore_timers(data, timers));
        info!(stored, restored, "trend timers restored");
        Ok(restored)
    }

    /// Save pending trend timers when asked to and drop all queues.
    pub async fn shutdown(&self, save_timers: bool) -> Result<(), Error> {
        if save_timers {
            let timers = schedule::pending_trend_timers(&self.config.read());
            self.services.repo.save(&timers).await?;
            info!(count = timers.len(), "trend timers saved");
        }
        let mut data = self.config.write();
        data.queues.clear();
        info!(
            records = %data.arena.stats(),
            strings = %data.strpool.stats(),
            "configuration cache shut down"
        );
        Ok(())
    }

    pub fn revision(&self) -> u64 {
        self.config.read().revision
    }

    pub fn host(&self, hostid: u64) -> Option<HostSnapshot> {
        HostSnapshot::capture(&self.config.read(), hostid)
    }

    pub fn host_by_name(&self, name: &str) -> Option<HostSnapshot> {
        let data = self.config.read();
        let hostid = data.hosts_by_name.get(name)?;
        HostSnapshot::capture(&data, hostid)
    }

    pub fn host_group(&self, groupid: u64) -> Option<HostGroupSnapshot> {
        HostGroupSnapshot::capture(&self.config.read(), groupid)
    }

    pub fn host_group_by_name(&self, name: &str) -> Option<HostGroupSnapshot> {
        let data = self.config.read();
        let groupid = data.groups_by_name.get(name)?;
        HostGroupSnapshot::capture(&data, groupid)
    }

    /// `groupid` followed by every group nested below it (`Parent/Child`
    /// naming), sorted by id.
    pub fn nested_groupids(&self, groupid: u64) -> Vec<u64> {
        let data = self.config.read();
        let Some(group) = data.groups.get(groupid) else {
            return Vec::new();
        };
        let prefix = format!("{}/", group.name.as_str());
        let mut nested: Vec<u64> = data
            .groups_by_name
            .iter()
            .filter(|(name, _)| name.starts_with(&prefix))
            .map(|(_, id)| id)
            .collect();
        nested.sort_unstable();
        nested.insert(0, groupid);
        nested
    }

    pub fn item(&self, itemid: u64) -> Option<CheckSnapshot> {
        CheckSnapshot::capture(&self.config.read(), itemid)
    }

    pub fn item_by_key(&self, hostid: u64, key: &str) -> Option<CheckSnapshot> {
        let data = self.config.read();
        let itemid = data.items_by_key.get(&hostid)?.get(key)?;
        CheckSnapshot::capture(&data, itemid)
    }

    pub fn item_runtime(&self, itemid: u64) -> Option<ItemRuntime> {
        self.history.read().item(itemid)
    }

    pub fn interface(&self, interfaceid: u64) -> Option<InterfaceSnapshot> {
        InterfaceSnapshot::capture(&self.config.read(), interfaceid)
    }

    pub fn main_interface(&self, hostid: u64, kind: InterfaceType) -> Option<InterfaceSnapshot> {
        let data = self.config.read();
        let interfaceid = *data.main_interfaces.get(&(hostid, kind))?;
        InterfaceSnapshot::capture(&data, interfaceid)
    }

    /// SNMP interfaces listening on `address`, ordered by id.
    pub fn snmp_interfaces_by_addr(&self, address: &str) -> Vec<InterfaceSnapshot> {
        let data = self.config.read();
        data.snmp_interfaces_by_addr(address)
            .into_iter()
            .filter_map(|interfaceid| InterfaceSnapshot::capture(&data, interfaceid))
            .collect()
    }

    pub fn trigger(&self, triggerid: u64) -> Option<TriggerSnapshot> {
        TriggerSnapshot::capture(&self.config.read(), triggerid)
    }

    pub fn function(&self, functionid: u64) -> Option<FunctionSnapshot> {
        FunctionSnapshot::capture(&self.config.read(), functionid)
    }

    pub fn proxy(&self, proxyid: u64) -> Option<ProxySnapshot> {
        ProxySnapshot::capture(&self.config.read(), proxyid)
    }

    pub fn proxy_by_name(&self, name: &str) -> Option<ProxySnapshot> {
        let data = self.config.read();
        let proxyid = data.proxies_by_name.get(name)?;
        ProxySnapshot::capture(&data, proxyid)
    }

    /// PSK stored for `identity`.
    pub fn psk(&self, identity: &str) -> Option<String> {
        self.config.read().psk.get(identity).map(str::to_owned)
    }

    /// Hand out the due checks of a worker class.
    pub fn claim_checks(&self, class: WorkerClass) -> Result<Vec<CheckSnapshot>, Error> {
        let now = self.now();
        self.write(|data| schedule::claim_checks(data, class, now))
    }

    pub fn requeue_checks(&self, results: &[CheckResult]) -> Result<(), Error> {
        let now = self.now();
        self.write(|data| schedule::requeue_checks(data, results, now))
    }

    /// Earliest due time in the queue of `class`.
    pub fn check_nextcheck(&self, class: WorkerClass) -> Option<i64> {
        self.config.read().queues.check_nextcheck(class)
    }

    /// Feed the result of contacting an interface into its availability.
    pub fn report_interface(
        &self,
        interfaceid: u64,
        outcome: InterfaceOutcome,
    ) -> Result<Option<AvailabilityDiff>, Error> {
        let now = self.now();
        self.write(|data| match outcome {
            InterfaceOutcome::Reached => schedule::activate_interface(data, interfaceid),
            InterfaceOutcome::Failed { error } => {
                schedule::deactivate_interface(data, interfaceid, now, &error)
            }
        })
    }

    pub fn claim_proxies(&self, max: usize) -> Vec<ProxySnapshot> {
        let now = self.now();
        self.write(|data| schedule::claim_proxies(data, now, max))
    }

    pub fn requeue_proxy(&self, proxyid: u64, areas: ProxyNextcheck) {
        let now = self.now();
        self.write(|data| schedule::requeue_proxy(data, proxyid, areas, now));
    }

    pub fn proxy_nextcheck(&self) -> Option<i64> {
        self.config.read().queues.proxy_nextcheck()
    }

    pub fn claim_timers(&self, soft_limit: usize, hard_limit: usize) -> Vec<TriggerTimer> {
        let now = self.now();
        self.write(|data| schedule::claim_timers(data, now, soft_limit, hard_limit))
    }

    pub fn reschedule_timers(&self, timers: Vec<TriggerTimer>) {
        let now = self.now();
        self.write(|data| schedule::reschedule_timers(data, timers, now));
    }

    pub fn timer_nextcheck(&self) -> Option<i64> {
        self.config.read().queues.timer_nextcheck()
    }

    pub fn claim_drules(&self, max: usize) -> Vec<DruleSnapshot> {
        let now = self.now();
        self.write(|data| schedule::claim_drules(data, now, max))
    }

    pub fn requeue_drule(&self, druleid: u64) {
        let now = self.now();
        self.write(|data| schedule::requeue_drule(data, druleid, now));
    }

    pub fn drule_nextcheck(&self) -> Option<i64> {
        self.config.read().queues.drule_nextcheck()
    }

    pub fn drule_revisions(&self) -> Vec<(u64, u64)> {
        queries::drule_revisions(&self.config.read())
    }

    pub fn claim_httptests(&self, max: usize) -> Vec<HttpTestSnapshot> {
        let now = self.now();
        self.write(|data| schedule::claim_httptests(data, now, max))
    }

    pub fn requeue_httptest(&self, httptestid: u64) {
        let now = self.now();
        self.write(|data| schedule::requeue_httptest(data, httptestid, now));
    }

    pub fn httptest_nextcheck(&self) -> Option<i64> {
        self.config.read().queues.httptest_nextcheck()
    }

    pub fn hostids_by_revision(&self, revision: u64) -> Vec<u64> {
        queries::hostids_by_revision(&self.config.read(), revision)
    }

    pub fn itemids_by_revision(&self, revision: u64) -> Vec<u64> {
        queries::itemids_by_revision(&self.config.read(), revision)
    }

    pub fn proxy_config_updates(&self, proxyid: u64, revision: u64) -> Option<ProxyConfigUpdate> {
        queries::proxy_config_updates(&self.config.read(), proxyid, revision)
    }

    /// Record that a proxy applied the configuration up to `revision`.
    pub fn acknowledge_proxy_config(&self, proxyid: u64, revision: u64) {
        self.write(|data| queries::acknowledge_proxy_config(data, proxyid, revision));
    }

    pub fn macro_updates(&self, revision: u64) -> MacroUpdates {
        queries::macro_updates(&self.config.read(), revision)
    }

    /// Counters of the cache, recomputed when older than the status
    /// interval or the current revision.
    pub fn refresh_status(&self) -> CacheStatus {
        let now = self.now();
        let computed = {
            let data = self.config.read();
            if !status::is_stale(data.status.as_ref(), data.revision, now, self.status_interval) {
                return data.status.clone().unwrap_or_default();
            }
            status::compute(&data, now)
        };
        debug!(
            hosts = computed.hosts(),
            items = computed.items(),
            nvps = computed.global.required_performance,
            "cache status refreshed"
        );
        self.config.write().status = Some(computed.clone());
        computed
    }

    /// Last committed counters, if any.
    pub fn status(&self) -> Option<CacheStatus> {
        self.config.read().status.clone()
    }

    /// Lock the triggers of `itemids` for evaluation.
    ///
    /// Triggers that are disabled, not functional or already locked are
    /// left out. The locked ids come back in evaluation order: by
    /// topological rank, then id.
    pub fn lock_triggers_by_history_items(&self, itemids: &[u64]) -> Vec<u64> {
        let mut data = self.config.write();
        let data = &mut *data;
        let mut triggerids: Vec<u64> = itemids
            .iter()
            .filter_map(|itemid| data.items.get(*itemid))
            .flat_map(|item| item.triggerids.iter().copied())
            .collect();
        triggerids.sort_unstable();
        triggerids.dedup();

        let mut locked = Vec::with_capacity(triggerids.len());
        for triggerid in triggerids {
            let Some(trigger) = data.triggers.get_mut(triggerid) else {
                continue;
            };
            if !trigger.is_enabled() || !trigger.functional || trigger.locked {
                continue;
            }
            trigger.locked = true;
            locked.push((trigger.topoindex, triggerid));
        }
        locked.sort_unstable();
        locked.into_iter().map(|(_, triggerid)| triggerid).collect()
    }

    /// Whether a master of `triggerid` keeps it from changing state.
    pub fn check_dependencies(&self, triggerid: u64, in_flight: &HashSet<u64>) -> DependencyStatus {
        let data = self.config.read();
        data.topology
            .check_dependencies(&data.triggers, triggerid, in_flight)
    }

    pub fn unlock_triggers(&self, triggerids: &[u64]) {
        let mut data = self.config.write();
        for triggerid in triggerids {
            if let Some(trigger) = data.triggers.get_mut(*triggerid) {
                trigger.locked = false;
            }
        }
    }

    pub fn unlock_all_triggers(&self) {
        let mut data = self.config.write();
        for (_, trigger) in data.triggers.iter_mut() {
            trigger.locked = false;
        }
    }

    /// Apply check results: state and error under the configuration lock,
    /// runtime values under the history lock.
    pub fn apply_item_changes(&self, changes: &[ItemChange]) -> Result<(), Error> {
        let known = self.write(|data| {
            let mut known = Vec::with_capacity(changes.len());
            for change in changes {
                let Some(item) = data.items.get(change.itemid) else {
                    continue;
                };
                let state = change.state.unwrap_or(item.state);
                let error = match &change.error {
                    Some(error) => error.clone(),
                    None => item.error.to_string(),
                };
                schedule::set_item_state(data, change.itemid, state, &error)?;
                known.push(change);
            }
            Ok::<_, Error>(known)
        })?;

        // items removed since the change was produced get no runtime entry
        let mut history = self.history.write();
        for change in known {
            let runtime = history.items.entry(change.itemid).or_default();
            if let Some(lastlogsize) = change.lastlogsize {
                runtime.lastlogsize = lastlogsize;
            }
            if let Some(mtime) = change.mtime {
                runtime.mtime = mtime;
            }
            if let Some(lastclock) = change.lastclock {
                runtime.lastclock = lastclock;
            }
        }
        Ok(())
    }

    /// Apply maintenance state computed by the maintenance manager.
    ///
    /// The start time only moves when maintenance is switched on or off,
    /// not while one maintenance hands over to another. Returns the number
    /// of hosts that changed.
    pub fn set_host_maintenance(&self, updates: &[MaintenanceUpdate]) -> usize {
        let mut data = self.config.write();
        let mut changed = 0;
        for entry in updates {
            let Some(host) = data.hosts.get_mut(entry.hostid) else {
                continue;
            };
            let maintenance = &mut host.maintenance;
            let mut touched = false;
            if maintenance.status == MaintenanceStatus::Off || entry.status == MaintenanceStatus::Off
            {
                touched |= update(&mut maintenance.from, entry.from);
            }
            touched |= update(&mut maintenance.maintenanceid, entry.maintenanceid);
            touched |= update(&mut maintenance.status, entry.status);
            touched |= update(&mut maintenance.kind, entry.kind);
            if touched {
                debug!(
                    hostid = entry.hostid,
                    status = ?entry.status,
                    kind = ?entry.kind,
                    "host maintenance updated"
                );
                changed += 1;
            }
        }
        changed
    }

    /// Write every cached record to the log at trace level.
    pub fn dump(&self) {
        dump::dump(&self.config.read(), &self.history.read());
    }
}
