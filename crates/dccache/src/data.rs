#![forbid(unsafe_code)]

//! Root of the cached configuration and of the state shared with the
//! history cache.

use crate::arena::Arena;
use crate::domain::{
    Correlation, Dcheck, Drule, Function, GlobalSettings, Host, HostGroup, HostGroupLink,
    HostInventory, HostProxy, HttpStep, HttpTest, Interface, InterfaceType, Item, ItemDiscovery,
    ItemParam, PreprocStep, Proxy, ProxyGroup, Trigger,
};
use crate::notify::Notification;
use crate::schedule::Queues;
use crate::status::CacheStatus;
use crate::stores::{MacroStore, PskStore, StrIndex, Table, TagStore};
use crate::strpool::{StrHandle, StringPool};
use crate::topology::Topology;
use std::collections::{BTreeSet, HashMap};

/// Runtime settings the cache needs from the process configuration.
#[derive(Debug, Clone, Default)]
pub struct CacheOptions {
    pub workers: config::Workers,
    pub timing: config::Timing,
}

/// Everything guarded by the configuration lock.
#[derive(Debug)]
pub struct ConfigData {
    pub(crate) arena: Arena,
    pub(crate) strpool: StringPool,
    pub(crate) revision: u64,
    pub(crate) settings: GlobalSettings,

    pub(crate) psk: PskStore,
    /// Identity accepted for auto-registration, linked into `psk`.
    pub(crate) autoreg_psk: StrHandle,

    pub(crate) hosts: Table<Host>,
    pub(crate) hosts_by_name: StrIndex,
    pub(crate) inventory: Table<HostInventory>,
    pub(crate) groups: Table<HostGroup>,
    pub(crate) groups_by_name: StrIndex,
    pub(crate) host_groups: HashMap<u64, HostGroupLink>,
    pub(crate) host_tags: TagStore,

    pub(crate) interfaces: Table<Interface>,
    /// Main interface of each type per host.
    pub(crate) main_interfaces: HashMap<(u64, InterfaceType), u64>,
    /// SNMP interfaces by address, used to match incoming traps.
    pub(crate) snmp_by_addr: HashMap<String, BTreeSet<u64>>,

    pub(crate) macros: MacroStore,
    /// Revision of the last user macro change per host, 0 for global macros.
    pub(crate) macro_revisions: HashMap<u64, u64>,

    pub(crate) items: Table<Item>,
    /// Per host key index of items.
    pub(crate) items_by_key: HashMap<u64, StrIndex>,
    pub(crate) item_discovery: HashMap<u64, ItemDiscovery>,
    pub(crate) preproc: Table<PreprocStep>,
    pub(crate) preproc_by_item: HashMap<u64, BTreeSet<u64>>,
    pub(crate) item_params: Table<ItemParam>,
    pub(crate) params_by_item: HashMap<u64, BTreeSet<u64>>,
    pub(crate) item_tags: TagStore,
    /// Dependent items by master item.
    pub(crate) masteritems: HashMap<u64, BTreeSet<u64>>,

    pub(crate) triggers: Table<Trigger>,
    pub(crate) topology: Topology,
    pub(crate) functions: Table<Function>,
    pub(crate) functions_by_trigger: HashMap<u64, BTreeSet<u64>>,
    pub(crate) trigger_tags: TagStore,
    pub(crate) correlations: Table<Correlation>,

    pub(crate) drules: Table<Drule>,
    pub(crate) dchecks: Table<Dcheck>,
    pub(crate) httptests: Table<HttpTest>,
    pub(crate) httpsteps: Table<HttpStep>,

    pub(crate) proxies: Table<Proxy>,
    pub(crate) proxies_by_name: StrIndex,
    pub(crate) proxy_groups: Table<ProxyGroup>,
    pub(crate) host_proxy: HashMap<u64, HostProxy>,

    pub(crate) queues: Queues,
    pub(crate) options: CacheOptions,
    pub(crate) status: Option<CacheStatus>,
    /// Events produced under the lock, flushed after it is released.
    pub(crate) notifications: Vec<Notification>,
}

impl ConfigData {
    pub fn new(cache: &config::Cache, options: CacheOptions) -> Self {
        let arena = Arena::new("records", cache.records_size());
        let strpool = StringPool::new(Arena::new("strpool", cache.strpool_size()));
        Self {
            strpool,
            revision: 0,
            settings: GlobalSettings::default(),
            psk: PskStore::default(),
            autoreg_psk: StrHandle::unset(),
            hosts: Table::new(arena.clone()),
            hosts_by_name: StrIndex::default(),
            inventory: Table::new(arena.clone()),
            groups: Table::new(arena.clone()),
            groups_by_name: StrIndex::default(),
            host_groups: HashMap::new(),
            host_tags: TagStore::new(arena.clone()),
            interfaces: Table::new(arena.clone()),
            main_interfaces: HashMap::new(),
            snmp_by_addr: HashMap::new(),
            macros: MacroStore::new(arena.clone()),
            macro_revisions: HashMap::new(),
            items: Table::new(arena.clone()),
            items_by_key: HashMap::new(),
            item_discovery: HashMap::new(),
            preproc: Table::new(arena.clone()),
            preproc_by_item: HashMap::new(),
            item_params: Table::new(arena.clone()),
            params_by_item: HashMap::new(),
            item_tags: TagStore::new(arena.clone()),
            masteritems: HashMap::new(),
            triggers: Table::new(arena.clone()),
            topology: Topology::default(),
            functions: Table::new(arena.clone()),
            functions_by_trigger: HashMap::new(),
            trigger_tags: TagStore::new(arena.clone()),
            correlations: Table::new(arena.clone()),
            drules: Table::new(arena.clone()),
            dchecks: Table::new(arena.clone()),
            httptests: Table::new(arena.clone()),
            httpsteps: Table::new(arena.clone()),
            proxies: Table::new(arena.clone()),
            proxies_by_name: StrIndex::default(),
            proxy_groups: Table::new(arena.clone()),
            host_proxy: HashMap::new(),
            queues: Queues::default(),
            options,
            status: None,
            notifications: Vec::new(),
            arena,
        }
    }

    /// Revision of the last synchronization pass that changed something.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn settings(&self) -> &GlobalSettings {
        &self.settings
    }

    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    pub fn strpool(&self) -> &StringPool {
        &self.strpool
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub fn queues(&self) -> &Queues {
        &self.queues
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn macros(&self) -> &MacroStore {
        &self.macros
    }

    pub fn psk(&self) -> &PskStore {
        &self.psk
    }

    pub fn hosts(&self) -> &Table<Host> {
        &self.hosts
    }

    pub fn items(&self) -> &Table<Item> {
        &self.items
    }

    pub fn interfaces(&self) -> &Table<Interface> {
        &self.interfaces
    }

    pub fn triggers(&self) -> &Table<Trigger> {
        &self.triggers
    }

    pub fn functions(&self) -> &Table<Function> {
        &self.functions
    }

    pub fn proxies(&self) -> &Table<Proxy> {
        &self.proxies
    }

    pub fn host_by_name(&self, name: &str) -> Option<&Host> {
        self.hosts.get(self.hosts_by_name.get(name)?)
    }

    pub fn item_by_key(&self, hostid: u64, key: &str) -> Option<&Item> {
        let itemid = self.items_by_key.get(&hostid)?.get(key)?;
        self.items.get(itemid)
    }

    /// Proxy the group balancer assigned to `hostid`.
    pub fn assigned_proxy(&self, hostid: u64) -> Option<u64> {
        self.host_proxy
            .values()
            .find(|assignment| assignment.hostid == hostid)
            .map(|assignment| assignment.proxyid)
    }

    pub fn proxy_by_name(&self, name: &str) -> Option<&Proxy> {
        self.proxies.get(self.proxies_by_name.get(name)?)
    }

    pub fn main_interface(&self, hostid: u64, kind: InterfaceType) -> Option<&Interface> {
        self.interfaces
            .get(*self.main_interfaces.get(&(hostid, kind))?)
    }

    /// SNMP interfaces listening on `address`, ordered by id.
    pub fn snmp_interfaces_by_addr(&self, address: &str) -> Vec<u64> {
        self.snmp_by_addr
            .get(address)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    pub(crate) fn take_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }
}

/// Values the history cache maintains per check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ItemRuntime {
    pub lastlogsize: u64,
    pub mtime: i64,
    pub lastclock: i64,
}

/// Everything guarded by the history lock.
#[derive(Debug, Default)]
pub struct HistoryData {
    pub(crate) items: HashMap<u64, ItemRuntime>,
}

impl HistoryData {
    pub fn item(&self, itemid: u64) -> Option<ItemRuntime> {
        self.items.get(&itemid).copied()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
