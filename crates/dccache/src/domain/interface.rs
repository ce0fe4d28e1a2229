#![forbid(unsafe_code)]

use crate::strpool::StrHandle;
use std::collections::BTreeSet;

code_enum! {
    pub enum InterfaceType {
        Unknown = 0,
        Agent = 1,
        Snmp = 2,
        Ipmi = 3,
        Jmx = 4,
    }
}

code_enum! {
    pub enum Availability {
        Unknown = 0,
        Available = 1,
        Unavailable = 2,
    }
}

code_enum! {
    pub enum SnmpVersion {
        V1 = 1,
        V2c = 2,
        V3 = 3,
    }
}

#[derive(Debug)]
pub struct SnmpDetails {
    pub version: SnmpVersion,
    pub bulk: bool,
    pub max_repetitions: u32,
    pub community: StrHandle,
    pub securityname: StrHandle,
    pub securitylevel: u8,
    pub authpassphrase: StrHandle,
    pub privpassphrase: StrHandle,
    pub authprotocol: u8,
    pub privprotocol: u8,
    pub contextname: StrHandle,
}

impl SnmpDetails {
    pub(crate) fn new() -> Self {
        Self {
            version: SnmpVersion::V2c,
            bulk: true,
            max_repetitions: 10,
            community: StrHandle::unset(),
            securityname: StrHandle::unset(),
            securitylevel: 0,
            authpassphrase: StrHandle::unset(),
            privpassphrase: StrHandle::unset(),
            authprotocol: 0,
            privprotocol: 0,
            contextname: StrHandle::unset(),
        }
    }

    pub(crate) fn into_handles(self) -> [StrHandle; 5] {
        [
            self.community,
            self.securityname,
            self.authpassphrase,
            self.privpassphrase,
            self.contextname,
        ]
    }
}

/// Availability state machine of an interface.
///
/// `errors_from` marks the start of the current error streak and
/// `disable_until` suppresses retries until the given time.
#[derive(Debug)]
pub struct InterfaceAvailability {
    pub available: Availability,
    pub error: StrHandle,
    pub errors_from: i64,
    pub disable_until: i64,
}

impl Default for InterfaceAvailability {
    fn default() -> Self {
        Self {
            available: Availability::Unknown,
            error: StrHandle::unset(),
            errors_from: 0,
            disable_until: 0,
        }
    }
}

#[derive(Debug)]
pub struct Interface {
    pub interfaceid: u64,
    pub hostid: u64,
    pub kind: InterfaceType,
    pub main: bool,
    pub useip: bool,
    pub ip: StrHandle,
    pub dns: StrHandle,
    pub port: StrHandle,
    pub availability: InterfaceAvailability,
    pub snmp: Option<SnmpDetails>,
    pub itemids: BTreeSet<u64>,
    pub revision: u64,
}

impl Interface {
    pub(crate) fn new(interfaceid: u64) -> Self {
        Self {
            interfaceid,
            hostid: 0,
            kind: InterfaceType::Unknown,
            main: false,
            useip: true,
            ip: StrHandle::unset(),
            dns: StrHandle::unset(),
            port: StrHandle::unset(),
            availability: InterfaceAvailability::default(),
            snmp: None,
            itemids: BTreeSet::new(),
            revision: 0,
        }
    }

    /// Address used to reach the interface.
    pub fn address(&self) -> &str {
        if self.useip { &self.ip } else { &self.dns }
    }

    pub(crate) fn into_handles(self) -> impl Iterator<Item = StrHandle> {
        [self.ip, self.dns, self.port, self.availability.error]
            .into_iter()
            .chain(self.snmp.into_iter().flat_map(SnmpDetails::into_handles))
    }
}
