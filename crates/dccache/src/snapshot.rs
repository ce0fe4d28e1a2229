#![forbid(unsafe_code)]

//! Owned copies of cached records.
//!
//! Records never leave the cache by reference; getters and claims return
//! these snapshots, which stay valid after the lock is released.

use crate::data::ConfigData;
use crate::domain::{
    Availability, CheckParams, CheckType, CorrelationMode, FunctionKind, HostStatus,
    InterfaceType, ItemFlags, ItemState, Maintenance, MonitoredBy, ProxyMode, ProxyNextchecks,
    RecoveryMode, Severity, SnmpVersion, Status, TlsAccept, TlsConnect, TriggerState,
    TriggerValue, ValueType,
};
use crate::schedule::WorkerClass;
use crate::stores::TagStore;

fn tags(store: &TagStore, ownerid: u64) -> Vec<(String, String)> {
    let mut tags: Vec<_> = store
        .for_owner(ownerid)
        .map(|tag| (tag.tag.to_string(), tag.value.to_string()))
        .collect();
    tags.sort();
    tags
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsSnapshot {
    pub connect: TlsConnect,
    pub accept: TlsAccept,
    pub issuer: String,
    pub subject: String,
    pub psk_identity: String,
    /// Key of `psk_identity` as stored; the first registered owner decides it.
    pub psk: Option<String>,
}

impl TlsSnapshot {
    fn capture(data: &ConfigData, tls: &crate::domain::Tls) -> Self {
        let psk_identity = tls.psk_identity.to_string();
        Self {
            connect: tls.connect,
            accept: tls.accept,
            issuer: tls.issuer.to_string(),
            subject: tls.subject.to_string(),
            psk: data.psk.get(&psk_identity).map(str::to_owned),
            psk_identity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSnapshot {
    pub hostid: u64,
    pub host: String,
    pub name: String,
    pub status: HostStatus,
    pub monitored_by: MonitoredBy,
    pub proxyid: u64,
    pub proxy_groupid: u64,
    pub maintenance: Maintenance,
    pub tls: TlsSnapshot,
    pub groupids: Vec<u64>,
    pub tags: Vec<(String, String)>,
    pub revision: u64,
}

impl HostSnapshot {
    pub fn capture(data: &ConfigData, hostid: u64) -> Option<Self> {
        let host = data.hosts.get(hostid)?;
        Some(Self {
            hostid,
            host: host.host.to_string(),
            name: host.name.to_string(),
            status: host.status,
            monitored_by: host.monitored_by,
            proxyid: host.proxyid,
            proxy_groupid: host.proxy_groupid,
            maintenance: host.maintenance,
            tls: TlsSnapshot::capture(data, &host.tls),
            groupids: host.groupids.iter().copied().collect(),
            tags: tags(&data.host_tags, hostid),
            revision: host.revision,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnmpSnapshot {
    pub version: SnmpVersion,
    pub bulk: bool,
    pub max_repetitions: u32,
    pub community: String,
    pub securityname: String,
    pub securitylevel: u8,
    pub authpassphrase: String,
    pub privpassphrase: String,
    pub authprotocol: u8,
    pub privprotocol: u8,
    pub contextname: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceSnapshot {
    pub interfaceid: u64,
    pub hostid: u64,
    pub kind: InterfaceType,
    pub main: bool,
    pub useip: bool,
    pub ip: String,
    pub dns: String,
    pub port: String,
    pub available: Availability,
    pub error: String,
    pub errors_from: i64,
    pub disable_until: i64,
    pub snmp: Option<SnmpSnapshot>,
    pub revision: u64,
}

impl InterfaceSnapshot {
    pub fn capture(data: &ConfigData, interfaceid: u64) -> Option<Self> {
        let interface = data.interfaces.get(interfaceid)?;
        let availability = &interface.availability;
        Some(Self {
            interfaceid,
            hostid: interface.hostid,
            kind: interface.kind,
            main: interface.main,
            useip: interface.useip,
            ip: interface.ip.to_string(),
            dns: interface.dns.to_string(),
            port: interface.port.to_string(),
            available: availability.available,
            error: availability.error.to_string(),
            errors_from: availability.errors_from,
            disable_until: availability.disable_until,
            snmp: interface.snmp.as_ref().map(|snmp| SnmpSnapshot {
                version: snmp.version,
                bulk: snmp.bulk,
                max_repetitions: snmp.max_repetitions,
                community: snmp.community.to_string(),
                securityname: snmp.securityname.to_string(),
                securitylevel: snmp.securitylevel,
                authpassphrase: snmp.authpassphrase.to_string(),
                privpassphrase: snmp.privpassphrase.to_string(),
                authprotocol: snmp.authprotocol,
                privprotocol: snmp.privprotocol,
                contextname: snmp.contextname.to_string(),
            }),
            revision: interface.revision,
        })
    }

    pub fn address(&self) -> &str {
        if self.useip { &self.ip } else { &self.dns }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreprocSnapshot {
    pub step: u32,
    pub kind: u8,
    pub params: String,
    pub error_handler: u8,
    pub error_handler_params: String,
}

/// Named fields of a type-specific payload, in a stable order.
fn param_fields(params: &CheckParams) -> Vec<(&'static str, String)> {
    let text = |name, handle: &crate::strpool::StrHandle| (name, handle.to_string());
    let flag = |name, value: bool| (name, u8::from(value).to_string());
    match params {
        CheckParams::None => Vec::new(),
        CheckParams::Snmp { oid } => vec![text("snmp_oid", oid)],
        CheckParams::Ipmi { sensor } => vec![text("ipmi_sensor", sensor)],
        CheckParams::Trapper { allowed_hosts } => vec![text("trapper_hosts", allowed_hosts)],
        CheckParams::Simple(credentials) => vec![
            text("username", &credentials.username),
            text("password", &credentials.password),
        ],
        CheckParams::DbMonitor { query, credentials }
        | CheckParams::Telnet {
            script: query,
            credentials,
        } => vec![
            text("params", query),
            text("username", &credentials.username),
            text("password", &credentials.password),
        ],
        CheckParams::Jmx {
            endpoint,
            credentials,
        } => vec![
            text("jmx_endpoint", endpoint),
            text("username", &credentials.username),
            text("password", &credentials.password),
        ],
        CheckParams::Ssh(ssh) => vec![
            ("authtype", ssh.authtype.to_string()),
            text("username", &ssh.credentials.username),
            text("password", &ssh.credentials.password),
            text("publickey", &ssh.publickey),
            text("privatekey", &ssh.privatekey),
            text("params", &ssh.params),
        ],
        CheckParams::Calculated { formula } => vec![text("params", formula)],
        CheckParams::Script { script } | CheckParams::Browser { script } => {
            vec![text("params", script)]
        }
        CheckParams::HttpAgent(http) => vec![
            text("url", &http.url),
            text("query_fields", &http.query_fields),
            text("posts", &http.posts),
            text("status_codes", &http.status_codes),
            text("http_proxy", &http.http_proxy),
            text("headers", &http.headers),
            text("ssl_cert_file", &http.ssl_cert_file),
            text("ssl_key_file", &http.ssl_key_file),
            text("ssl_key_password", &http.ssl_key_password),
            text("trapper_hosts", &http.trapper_hosts),
            text("username", &http.credentials.username),
            text("password", &http.credentials.password),
            ("authtype", http.authtype.to_string()),
            flag("follow_redirects", http.follow_redirects),
            ("post_type", http.post_type.to_string()),
            ("retrieve_mode", http.retrieve_mode.to_string()),
            ("request_method", http.request_method.to_string()),
            ("output_format", http.output_format.to_string()),
            flag("verify_peer", http.verify_peer),
            flag("verify_host", http.verify_host),
            flag("allow_traps", http.allow_traps),
        ],
    }
}

/// Everything a worker needs to perform one check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckSnapshot {
    pub itemid: u64,
    pub key: String,
    pub check_type: CheckType,
    pub value_type: ValueType,
    pub status: Status,
    pub state: ItemState,
    pub error: String,
    pub delay: String,
    /// Item timeout, or the global timeout of the check type when unset.
    pub timeout: String,
    pub flags: ItemFlags,
    pub master_itemid: u64,
    pub nextcheck: i64,
    pub worker: Option<WorkerClass>,
    pub unreachable: bool,
    pub params: Vec<(&'static str, String)>,
    pub parameters: Vec<(String, String)>,
    pub preproc: Vec<PreprocSnapshot>,
    pub tags: Vec<(String, String)>,
    pub host: HostSnapshot,
    pub interface: Option<InterfaceSnapshot>,
    pub revision: u64,
}

impl CheckSnapshot {
    pub fn capture(data: &ConfigData, itemid: u64) -> Option<Self> {
        let item = data.items.get(itemid)?;
        let host = HostSnapshot::capture(data, item.hostid)?;
        let timeout = if item.timeout.is_empty() {
            data.settings
                .item_timeouts
                .get(item.check_type)
                .unwrap_or_default()
                .to_owned()
        } else {
            item.timeout.to_string()
        };

        let mut preproc: Vec<_> = data
            .preproc_by_item
            .get(&itemid)
            .into_iter()
            .flatten()
            .filter_map(|id| data.preproc.get(*id))
            .map(|step| PreprocSnapshot {
                step: step.step,
                kind: step.kind,
                params: step.params.to_string(),
                error_handler: step.error_handler,
                error_handler_params: step.error_handler_params.to_string(),
            })
            .collect();
        preproc.sort_by_key(|step| step.step);

        let mut parameters: Vec<_> = data
            .params_by_item
            .get(&itemid)
            .into_iter()
            .flatten()
            .filter_map(|id| data.item_params.get(*id))
            .map(|param| (param.name.to_string(), param.value.to_string()))
            .collect();
        parameters.sort();

        Some(Self {
            itemid,
            key: item.key.to_string(),
            check_type: item.check_type,
            value_type: item.value_type,
            status: item.status,
            state: item.state,
            error: item.error.to_string(),
            delay: item.delay.to_string(),
            timeout,
            flags: item.flags,
            master_itemid: item.master_itemid,
            nextcheck: item.schedule.nextcheck,
            worker: item.schedule.worker,
            unreachable: item.schedule.unreachable,
            params: param_fields(&item.params),
            parameters,
            preproc,
            tags: tags(&data.item_tags, itemid),
            host,
            interface: InterfaceSnapshot::capture(data, item.interfaceid),
            revision: item.revision,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerSnapshot {
    pub triggerid: u64,
    pub description: String,
    pub expression: String,
    pub recovery_expression: String,
    pub expression_bin: Vec<u8>,
    pub recovery_expression_bin: Vec<u8>,
    pub error: String,
    pub opdata: String,
    pub event_name: String,
    pub correlation_tag: String,
    pub value: TriggerValue,
    pub state: TriggerState,
    pub status: Status,
    pub priority: Severity,
    pub recovery_mode: RecoveryMode,
    pub correlation_mode: CorrelationMode,
    pub lastchange: i64,
    pub functional: bool,
    pub locked: bool,
    pub topoindex: u8,
    pub itemids: Vec<u64>,
    pub functionids: Vec<u64>,
    pub tags: Vec<(String, String)>,
    pub revision: u64,
}

impl TriggerSnapshot {
    pub fn capture(data: &ConfigData, triggerid: u64) -> Option<Self> {
        let trigger = data.triggers.get(triggerid)?;
        Some(Self {
            triggerid,
            description: trigger.description.to_string(),
            expression: trigger.expression.to_string(),
            recovery_expression: trigger.recovery_expression.to_string(),
            expression_bin: trigger.expression_bin.as_bytes().to_vec(),
            recovery_expression_bin: trigger.recovery_expression_bin.as_bytes().to_vec(),
            error: trigger.error.to_string(),
            opdata: trigger.opdata.to_string(),
            event_name: trigger.event_name.to_string(),
            correlation_tag: trigger.correlation_tag.to_string(),
            value: trigger.value,
            state: trigger.state,
            status: trigger.status,
            priority: trigger.priority,
            recovery_mode: trigger.recovery_mode,
            correlation_mode: trigger.correlation_mode,
            lastchange: trigger.lastchange,
            functional: trigger.functional,
            locked: trigger.locked,
            topoindex: trigger.topoindex,
            itemids: trigger.itemids.clone().unwrap_or_default(),
            functionids: data
                .functions_by_trigger
                .get(&triggerid)
                .map(|ids| ids.iter().copied().collect())
                .unwrap_or_default(),
            tags: tags(&data.trigger_tags, triggerid),
            revision: trigger.revision,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSnapshot {
    pub functionid: u64,
    pub triggerid: u64,
    pub itemid: u64,
    pub name: String,
    pub parameter: String,
    pub kind: FunctionKind,
    pub revision: u64,
}

impl FunctionSnapshot {
    pub fn capture(data: &ConfigData, functionid: u64) -> Option<Self> {
        let function = data.functions.get(functionid)?;
        Some(Self {
            functionid,
            triggerid: function.triggerid,
            itemid: function.itemid,
            name: function.name.to_string(),
            parameter: function.parameter.to_string(),
            kind: function.kind,
            revision: function.revision,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySnapshot {
    pub proxyid: u64,
    pub name: String,
    pub mode: ProxyMode,
    pub address: String,
    pub port: String,
    pub allowed_addresses: String,
    pub tls: TlsSnapshot,
    pub proxy_groupid: u64,
    pub nextchecks: ProxyNextchecks,
    pub lastaccess: i64,
    pub version: u32,
    pub hostids: Vec<u64>,
    pub revision: u64,
}

impl ProxySnapshot {
    pub fn capture(data: &ConfigData, proxyid: u64) -> Option<Self> {
        let proxy = data.proxies.get(proxyid)?;
        Some(Self {
            proxyid,
            name: proxy.name.to_string(),
            mode: proxy.mode,
            address: proxy.address.to_string(),
            port: proxy.port.to_string(),
            allowed_addresses: proxy.allowed_addresses.to_string(),
            tls: TlsSnapshot::capture(data, &proxy.tls),
            proxy_groupid: proxy.proxy_groupid,
            nextchecks: proxy.nextchecks,
            lastaccess: proxy.lastaccess,
            version: proxy.version,
            hostids: proxy.hostids.iter().copied().collect(),
            revision: proxy.revision,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostGroupSnapshot {
    pub groupid: u64,
    pub name: String,
    pub hostids: Vec<u64>,
    pub revision: u64,
}

impl HostGroupSnapshot {
    pub fn capture(data: &ConfigData, groupid: u64) -> Option<Self> {
        let group = data.groups.get(groupid)?;
        Some(Self {
            groupid,
            name: group.name.to_string(),
            hostids: group.hostids.iter().copied().collect(),
            revision: group.revision,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DcheckSnapshot {
    pub dcheckid: u64,
    pub kind: u8,
    pub key: String,
    pub ports: String,
    pub snmp_community: String,
    pub snmpv3_securityname: String,
    pub snmpv3_securitylevel: u8,
    pub snmpv3_authpassphrase: String,
    pub snmpv3_privpassphrase: String,
    pub snmpv3_contextname: String,
    pub uniq: bool,
    pub host_source: u8,
    pub name_source: u8,
    pub allow_redirect: bool,
}

/// Discovery rule with its checks, as handed to a discoverer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DruleSnapshot {
    pub druleid: u64,
    pub name: String,
    pub iprange: String,
    pub delay: String,
    pub concurrency_max: u32,
    pub nextcheck: i64,
    pub dchecks: Vec<DcheckSnapshot>,
    pub revision: u64,
}

impl DruleSnapshot {
    pub fn capture(data: &ConfigData, druleid: u64) -> Option<Self> {
        let drule = data.drules.get(druleid)?;
        let dchecks = drule
            .dcheckids
            .iter()
            .filter_map(|id| data.dchecks.get(*id))
            .map(|dcheck| DcheckSnapshot {
                dcheckid: dcheck.dcheckid,
                kind: dcheck.kind,
                key: dcheck.key.to_string(),
                ports: dcheck.ports.to_string(),
                snmp_community: dcheck.snmp_community.to_string(),
                snmpv3_securityname: dcheck.snmpv3_securityname.to_string(),
                snmpv3_securitylevel: dcheck.snmpv3_securitylevel,
                snmpv3_authpassphrase: dcheck.snmpv3_authpassphrase.to_string(),
                snmpv3_privpassphrase: dcheck.snmpv3_privpassphrase.to_string(),
                snmpv3_contextname: dcheck.snmpv3_contextname.to_string(),
                uniq: dcheck.uniq,
                host_source: dcheck.host_source,
                name_source: dcheck.name_source,
                allow_redirect: dcheck.allow_redirect,
            })
            .collect();
        Some(Self {
            druleid,
            name: drule.name.to_string(),
            iprange: drule.iprange.to_string(),
            delay: drule.delay.to_string(),
            concurrency_max: drule.concurrency_max,
            nextcheck: drule.nextcheck,
            dchecks,
            revision: drule.revision,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpStepSnapshot {
    pub httpstepid: u64,
    pub name: String,
    pub no: u32,
    pub url: String,
    pub timeout: String,
    pub posts: String,
    pub required: String,
    pub status_codes: String,
    pub follow_redirects: bool,
    pub retrieve_mode: u8,
    pub post_type: u8,
}

/// Web scenario with its steps ordered by step number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpTestSnapshot {
    pub httptestid: u64,
    pub hostid: u64,
    pub name: String,
    pub delay: String,
    pub agent: String,
    pub retries: u32,
    pub nextcheck: i64,
    pub steps: Vec<HttpStepSnapshot>,
    pub revision: u64,
}

impl HttpTestSnapshot {
    pub fn capture(data: &ConfigData, httptestid: u64) -> Option<Self> {
        let test = data.httptests.get(httptestid)?;
        let mut steps: Vec<_> = test
            .stepids
            .iter()
            .filter_map(|id| data.httpsteps.get(*id))
            .map(|step| HttpStepSnapshot {
                httpstepid: step.httpstepid,
                name: step.name.to_string(),
                no: step.no,
                url: step.url.to_string(),
                timeout: step.timeout.to_string(),
                posts: step.posts.to_string(),
                required: step.required.to_string(),
                status_codes: step.status_codes.to_string(),
                follow_redirects: step.follow_redirects,
                retrieve_mode: step.retrieve_mode,
                post_type: step.post_type,
            })
            .collect();
        steps.sort_by_key(|step| step.no);
        Some(Self {
            httptestid,
            hostid: test.hostid,
            name: test.name.to_string(),
            delay: test.delay.to_string(),
            agent: test.agent.to_string(),
            retries: test.retries,
            nextcheck: test.nextcheck,
            steps,
            revision: test.revision,
        })
    }
}
