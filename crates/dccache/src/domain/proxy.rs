#![forbid(unsafe_code)]

use super::Tls;
use crate::schedule::QueueState;
use crate::strpool::StrHandle;
use std::collections::BTreeSet;

code_enum! {
    pub enum ProxyMode {
        /// The proxy connects to the server.
        Active = 0,
        /// The server polls the proxy.
        Passive = 1,
    }
}

/// Per-area next poll times of a passive proxy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProxyNextchecks {
    pub config: i64,
    pub data: i64,
    pub tasks: i64,
}

impl ProxyNextchecks {
    /// Queue key of the proxy: the earliest of the area times.
    pub fn earliest(&self) -> i64 {
        self.config.min(self.data).min(self.tasks)
    }
}

/// Host that left a proxy, kept until the proxy has seen the change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemovedHost {
    pub hostid: u64,
    pub revision: u64,
}

#[derive(Debug)]
pub struct Proxy {
    pub proxyid: u64,
    pub name: StrHandle,
    pub mode: ProxyMode,
    pub address: StrHandle,
    pub port: StrHandle,
    pub allowed_addresses: StrHandle,
    pub tls: Tls,
    pub proxy_groupid: u64,
    pub nextchecks: ProxyNextchecks,
    pub queue: QueueState,
    pub lastaccess: i64,
    pub version: u32,
    pub hostids: BTreeSet<u64>,
    pub removed_hosts: Vec<RemovedHost>,
    pub revision: u64,
}

impl Proxy {
    pub(crate) fn new(proxyid: u64) -> Self {
        Self {
            proxyid,
            name: StrHandle::unset(),
            mode: ProxyMode::Active,
            address: StrHandle::unset(),
            port: StrHandle::unset(),
            allowed_addresses: StrHandle::unset(),
            tls: Tls::default(),
            proxy_groupid: 0,
            nextchecks: ProxyNextchecks::default(),
            queue: QueueState::Absent,
            lastaccess: 0,
            version: 0,
            hostids: BTreeSet::new(),
            removed_hosts: Vec::new(),
            revision: 0,
        }
    }

    pub fn is_passive(&self) -> bool {
        self.mode == ProxyMode::Passive
    }

    pub(crate) fn into_handles(self) -> impl Iterator<Item = StrHandle> {
        [self.name, self.address, self.port, self.allowed_addresses]
            .into_iter()
            .chain(self.tls.into_handles())
    }
}

#[derive(Debug)]
pub struct ProxyGroup {
    pub proxy_groupid: u64,
    pub name: StrHandle,
    pub failover_delay: StrHandle,
    pub min_online: StrHandle,
    pub proxyids: BTreeSet<u64>,
    pub revision: u64,
}

impl ProxyGroup {
    pub(crate) fn new(proxy_groupid: u64) -> Self {
        Self {
            proxy_groupid,
            name: StrHandle::unset(),
            failover_delay: StrHandle::unset(),
            min_online: StrHandle::unset(),
            proxyids: BTreeSet::new(),
            revision: 0,
        }
    }
}

/// Proxy chosen by the proxy group balancer for a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostProxy {
    pub hostid: u64,
    pub proxyid: u64,
    pub revision: u64,
}
