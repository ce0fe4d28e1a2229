#![forbid(unsafe_code)]

use super::Status;
use crate::schedule::QueueState;
use crate::strpool::StrHandle;
use std::collections::BTreeSet;

/// Network discovery rule.
#[derive(Debug)]
pub struct Drule {
    pub druleid: u64,
    pub proxyid: u64,
    pub name: StrHandle,
    pub iprange: StrHandle,
    pub delay: StrHandle,
    pub status: Status,
    pub concurrency_max: u32,
    pub nextcheck: i64,
    pub queue: QueueState,
    pub dcheckids: BTreeSet<u64>,
    pub revision: u64,
}

impl Drule {
    pub(crate) fn new(druleid: u64) -> Self {
        Self {
            druleid,
            proxyid: 0,
            name: StrHandle::unset(),
            iprange: StrHandle::unset(),
            delay: StrHandle::unset(),
            status: Status::Enabled,
            concurrency_max: 0,
            nextcheck: 0,
            queue: QueueState::Absent,
            dcheckids: BTreeSet::new(),
            revision: 0,
        }
    }
}

/// Single service check of a discovery rule.
#[derive(Debug)]
pub struct Dcheck {
    pub dcheckid: u64,
    pub druleid: u64,
    pub kind: u8,
    pub key: StrHandle,
    pub ports: StrHandle,
    pub snmp_community: StrHandle,
    pub snmpv3_securityname: StrHandle,
    pub snmpv3_securitylevel: u8,
    pub snmpv3_authpassphrase: StrHandle,
    pub snmpv3_privpassphrase: StrHandle,
    pub snmpv3_contextname: StrHandle,
    pub uniq: bool,
    pub host_source: u8,
    pub name_source: u8,
    pub allow_redirect: bool,
}

impl Dcheck {
    pub(crate) fn new(dcheckid: u64) -> Self {
        Self {
            dcheckid,
            druleid: 0,
            kind: 0,
            key: StrHandle::unset(),
            ports: StrHandle::unset(),
            snmp_community: StrHandle::unset(),
            snmpv3_securityname: StrHandle::unset(),
            snmpv3_securitylevel: 0,
            snmpv3_authpassphrase: StrHandle::unset(),
            snmpv3_privpassphrase: StrHandle::unset(),
            snmpv3_contextname: StrHandle::unset(),
            uniq: false,
            host_source: 1,
            name_source: 0,
            allow_redirect: false,
        }
    }

    pub(crate) fn into_handles(self) -> [StrHandle; 7] {
        [
            self.key,
            self.ports,
            self.snmp_community,
            self.snmpv3_securityname,
            self.snmpv3_authpassphrase,
            self.snmpv3_privpassphrase,
            self.snmpv3_contextname,
        ]
    }
}

/// Web scenario.
#[derive(Debug)]
pub struct HttpTest {
    pub httptestid: u64,
    pub hostid: u64,
    pub name: StrHandle,
    pub delay: StrHandle,
    pub agent: StrHandle,
    pub status: Status,
    pub retries: u32,
    pub nextcheck: i64,
    pub queue: QueueState,
    pub stepids: BTreeSet<u64>,
    pub revision: u64,
}

impl HttpTest {
    pub(crate) fn new(httptestid: u64) -> Self {
        Self {
            httptestid,
            hostid: 0,
            name: StrHandle::unset(),
            delay: StrHandle::unset(),
            agent: StrHandle::unset(),
            status: Status::Enabled,
            retries: 1,
            nextcheck: 0,
            queue: QueueState::Absent,
            stepids: BTreeSet::new(),
            revision: 0,
        }
    }
}

#[derive(Debug)]
pub struct HttpStep {
    pub httpstepid: u64,
    pub httptestid: u64,
    pub name: StrHandle,
    pub no: u32,
    pub url: StrHandle,
    pub timeout: StrHandle,
    pub posts: StrHandle,
    pub required: StrHandle,
    pub status_codes: StrHandle,
    pub follow_redirects: bool,
    pub retrieve_mode: u8,
    pub post_type: u8,
}

impl HttpStep {
    pub(crate) fn new(httpstepid: u64) -> Self {
        Self {
            httpstepid,
            httptestid: 0,
            name: StrHandle::unset(),
            no: 0,
            url: StrHandle::unset(),
            timeout: StrHandle::unset(),
            posts: StrHandle::unset(),
            required: StrHandle::unset(),
            status_codes: StrHandle::unset(),
            follow_redirects: true,
            retrieve_mode: 0,
            post_type: 0,
        }
    }

    pub(crate) fn into_handles(self) -> [StrHandle; 6] {
        [
            self.name,
            self.url,
            self.timeout,
            self.posts,
            self.required,
            self.status_codes,
        ]
    }
}
