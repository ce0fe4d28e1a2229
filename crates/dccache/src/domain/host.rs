#![forbid(unsafe_code)]

use crate::strpool::StrHandle;
use bitflags::bitflags;
use std::collections::BTreeSet;

code_enum! {
    pub enum HostStatus {
        Monitored = 0,
        NotMonitored = 1,
    }
}

code_enum! {
    /// Who performs the checks of a host.
    pub enum MonitoredBy {
        Server = 0,
        Proxy = 1,
        ProxyGroup = 2,
    }
}

code_enum! {
    pub enum MaintenanceStatus {
        Off = 0,
        On = 1,
    }
}

code_enum! {
    pub enum MaintenanceType {
        /// Data is collected during maintenance.
        Normal = 0,
        NoData = 1,
    }
}

code_enum! {
    pub enum TlsConnect {
        Unencrypted = 1,
        Psk = 2,
        Certificate = 4,
    }
}

code_enum! {
    pub enum InventoryMode {
        Disabled = -1,
        Manual = 0,
        Automatic = 1,
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TlsAccept: u8 {
        const UNENCRYPTED = 0x01;
        const PSK = 0x02;
        const CERTIFICATE = 0x04;
    }
}

/// Encryption settings of a host or proxy.
///
/// `psk_identity` is set only while the owner is linked to an entry of the
/// PSK store; the secret itself lives in the store.
#[derive(Debug)]
pub struct Tls {
    pub connect: TlsConnect,
    pub accept: TlsAccept,
    pub issuer: StrHandle,
    pub subject: StrHandle,
    pub psk_identity: StrHandle,
}

impl Default for Tls {
    fn default() -> Self {
        Self {
            connect: TlsConnect::Unencrypted,
            accept: TlsAccept::UNENCRYPTED,
            issuer: StrHandle::unset(),
            subject: StrHandle::unset(),
            psk_identity: StrHandle::unset(),
        }
    }
}

impl Tls {
    pub(crate) fn into_handles(self) -> [StrHandle; 3] {
        [self.issuer, self.subject, self.psk_identity]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Maintenance {
    pub maintenanceid: u64,
    pub status: MaintenanceStatus,
    pub kind: MaintenanceType,
    pub from: i64,
}

impl Default for Maintenance {
    fn default() -> Self {
        Self {
            maintenanceid: 0,
            status: MaintenanceStatus::Off,
            kind: MaintenanceType::Normal,
            from: 0,
        }
    }
}

impl Maintenance {
    /// Whether checks of the host should not collect data right now.
    pub fn suppresses_data(&self) -> bool {
        self.status == MaintenanceStatus::On && self.kind == MaintenanceType::NoData
    }
}

#[derive(Debug)]
pub struct Host {
    pub hostid: u64,
    /// Technical name, unique among hosts.
    pub host: StrHandle,
    /// Visible name.
    pub name: StrHandle,
    pub status: HostStatus,
    pub monitored_by: MonitoredBy,
    /// Proxy that currently performs the checks; assigned directly or by the
    /// proxy group balancer.
    pub proxyid: u64,
    pub proxy_groupid: u64,
    pub maintenance: Maintenance,
    pub tls: Tls,
    pub itemids: BTreeSet<u64>,
    pub interfaceids: BTreeSet<u64>,
    pub httptestids: BTreeSet<u64>,
    pub groupids: BTreeSet<u64>,
    pub revision: u64,
}

impl Host {
    pub(crate) fn new(hostid: u64) -> Self {
        Self {
            hostid,
            host: StrHandle::unset(),
            name: StrHandle::unset(),
            status: HostStatus::Monitored,
            monitored_by: MonitoredBy::Server,
            proxyid: 0,
            proxy_groupid: 0,
            maintenance: Maintenance::default(),
            tls: Tls::default(),
            itemids: BTreeSet::new(),
            interfaceids: BTreeSet::new(),
            httptestids: BTreeSet::new(),
            groupids: BTreeSet::new(),
            revision: 0,
        }
    }

    pub fn is_monitored(&self) -> bool {
        self.status == HostStatus::Monitored
    }

    /// Whether checks of this host are performed by a proxy.
    pub fn is_proxied(&self) -> bool {
        self.proxyid != 0
    }

    pub(crate) fn into_handles(self) -> impl Iterator<Item = StrHandle> {
        [self.host, self.name].into_iter().chain(self.tls.into_handles())
    }
}

/// Inventory columns kept in the cache, in row order.
pub const INVENTORY_FIELDS: &[&str] = &[
    "type",
    "name",
    "alias",
    "os",
    "serialno_a",
    "tag",
    "asset_tag",
    "macaddress_a",
    "hardware",
    "software",
    "contact",
    "location",
    "location_lat",
    "location_lon",
    "notes",
    "vendor",
];

#[derive(Debug)]
pub struct HostInventory {
    pub hostid: u64,
    pub mode: InventoryMode,
    pub values: Vec<StrHandle>,
}

impl HostInventory {
    pub(crate) fn new(hostid: u64) -> Self {
        Self {
            hostid,
            mode: InventoryMode::Manual,
            values: INVENTORY_FIELDS.iter().map(|_| StrHandle::unset()).collect(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        let index = INVENTORY_FIELDS.iter().position(|field| *field == name)?;
        self.values.get(index).map(StrHandle::as_str)
    }
}

#[derive(Debug)]
pub struct HostGroup {
    pub groupid: u64,
    /// Nested groups use `/` separated names, e.g. `Linux/Web`.
    pub name: StrHandle,
    pub hostids: BTreeSet<u64>,
    pub revision: u64,
}

impl HostGroup {
    pub(crate) fn new(groupid: u64) -> Self {
        Self {
            groupid,
            name: StrHandle::unset(),
            hostids: BTreeSet::new(),
            revision: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostGroupLink {
    pub hostid: u64,
    pub groupid: u64,
}

/// Tag attached to a host, item or trigger.
#[derive(Debug)]
pub struct Tag {
    pub tagid: u64,
    pub ownerid: u64,
    pub tag: StrHandle,
    pub value: StrHandle,
}

impl Tag {
    pub(crate) fn new(tagid: u64) -> Self {
        Self {
            tagid,
            ownerid: 0,
            tag: StrHandle::unset(),
            value: StrHandle::unset(),
        }
    }
}
