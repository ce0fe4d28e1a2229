#![forbid(unsafe_code)]

use super::Status;
use crate::schedule::{QueuePriority, QueueState, WorkerClass};
use crate::strpool::StrHandle;

code_enum! {
    /// Protocol kind of a check.
    pub enum CheckType {
        Agent = 0,
        Trapper = 2,
        Simple = 3,
        Internal = 5,
        AgentActive = 7,
        HttpTest = 9,
        External = 10,
        DbMonitor = 11,
        Ipmi = 12,
        Ssh = 13,
        Telnet = 14,
        Calculated = 15,
        Jmx = 16,
        SnmpTrap = 17,
        Dependent = 18,
        HttpAgent = 19,
        Snmp = 20,
        Script = 21,
        Browser = 22,
    }
}

impl CheckType {
    /// Whether values arrive without the server polling for them.
    pub fn is_passive_input(self) -> bool {
        matches!(
            self,
            Self::Trapper | Self::AgentActive | Self::HttpTest | Self::SnmpTrap | Self::Dependent
        )
    }
}

code_enum! {
    pub enum ValueType {
        Float = 0,
        Str = 1,
        Log = 2,
        Uint = 3,
        Text = 4,
        Bin = 5,
    }
}

code_enum! {
    pub enum ItemState {
        Normal = 0,
        NotSupported = 1,
    }
}

code_enum! {
    pub enum ItemFlags {
        Plain = 0,
        DiscoveryRule = 1,
        Prototype = 2,
        Discovered = 4,
    }
}

#[derive(Debug, Default)]
pub struct Credentials {
    pub username: StrHandle,
    pub password: StrHandle,
}

impl Credentials {
    fn into_handles(self) -> [StrHandle; 2] {
        [self.username, self.password]
    }
}

#[derive(Debug, Default)]
pub struct SshParams {
    pub authtype: u8,
    pub credentials: Credentials,
    pub publickey: StrHandle,
    pub privatekey: StrHandle,
    pub params: StrHandle,
}

#[derive(Debug, Default)]
pub struct HttpAgentParams {
    pub url: StrHandle,
    pub query_fields: StrHandle,
    pub posts: StrHandle,
    pub status_codes: StrHandle,
    pub http_proxy: StrHandle,
    pub headers: StrHandle,
    pub ssl_cert_file: StrHandle,
    pub ssl_key_file: StrHandle,
    pub ssl_key_password: StrHandle,
    pub trapper_hosts: StrHandle,
    pub credentials: Credentials,
    pub authtype: u8,
    pub follow_redirects: bool,
    pub post_type: u8,
    pub retrieve_mode: u8,
    pub request_method: u8,
    pub output_format: u8,
    pub verify_peer: bool,
    pub verify_host: bool,
    pub allow_traps: bool,
}

/// Type-specific payload of a check.
///
/// The variant always matches [`Item::check_type`]; a type change drops the
/// old payload (releasing its strings) before the new one is filled in.
#[derive(Debug)]
pub enum CheckParams {
    None,
    Snmp { oid: StrHandle },
    Ipmi { sensor: StrHandle },
    Trapper { allowed_hosts: StrHandle },
    Simple(Credentials),
    DbMonitor { query: StrHandle, credentials: Credentials },
    Ssh(Box<SshParams>),
    Telnet { script: StrHandle, credentials: Credentials },
    Jmx { endpoint: StrHandle, credentials: Credentials },
    Calculated { formula: StrHandle },
    HttpAgent(Box<HttpAgentParams>),
    Script { script: StrHandle },
    Browser { script: StrHandle },
}

impl CheckParams {
    /// Empty payload of the variant used by `check_type`.
    pub fn for_type(check_type: CheckType) -> Self {
        match check_type {
            CheckType::Snmp => Self::Snmp { oid: StrHandle::unset() },
            CheckType::Ipmi => Self::Ipmi { sensor: StrHandle::unset() },
            CheckType::Trapper => Self::Trapper { allowed_hosts: StrHandle::unset() },
            CheckType::Simple => Self::Simple(Credentials::default()),
            CheckType::DbMonitor => Self::DbMonitor {
                query: StrHandle::unset(),
                credentials: Credentials::default(),
            },
            CheckType::Ssh => Self::Ssh(Box::default()),
            CheckType::Telnet => Self::Telnet {
                script: StrHandle::unset(),
                credentials: Credentials::default(),
            },
            CheckType::Jmx => Self::Jmx {
                endpoint: StrHandle::unset(),
                credentials: Credentials::default(),
            },
            CheckType::Calculated => Self::Calculated { formula: StrHandle::unset() },
            CheckType::HttpAgent => Self::HttpAgent(Box::default()),
            CheckType::Script => Self::Script { script: StrHandle::unset() },
            CheckType::Browser => Self::Browser { script: StrHandle::unset() },
            CheckType::Agent
            | CheckType::Internal
            | CheckType::AgentActive
            | CheckType::HttpTest
            | CheckType::External
            | CheckType::SnmpTrap
            | CheckType::Dependent => Self::None,
        }
    }

    pub(crate) fn into_handles(self) -> Vec<StrHandle> {
        match self {
            Self::None => Vec::new(),
            Self::Snmp { oid } => vec![oid],
            Self::Ipmi { sensor } => vec![sensor],
            Self::Trapper { allowed_hosts } => vec![allowed_hosts],
            Self::Simple(credentials) => credentials.into_handles().into(),
            Self::DbMonitor { query, credentials }
            | Self::Telnet {
                script: query,
                credentials,
            }
            | Self::Jmx {
                endpoint: query,
                credentials,
            } => {
                let [username, password] = credentials.into_handles();
                vec![query, username, password]
            }
            Self::Ssh(ssh) => {
                let SshParams {
                    credentials,
                    publickey,
                    privatekey,
                    params,
                    ..
                } = *ssh;
                let [username, password] = credentials.into_handles();
                vec![username, password, publickey, privatekey, params]
            }
            Self::Calculated { formula } => vec![formula],
            Self::Script { script } | Self::Browser { script } => vec![script],
            Self::HttpAgent(http) => {
                let HttpAgentParams {
                    url,
                    query_fields,
                    posts,
                    status_codes,
                    http_proxy,
                    headers,
                    ssl_cert_file,
                    ssl_key_file,
                    ssl_key_password,
                    trapper_hosts,
                    credentials,
                    ..
                } = *http;
                let [username, password] = credentials.into_handles();
                vec![
                    url,
                    query_fields,
                    posts,
                    status_codes,
                    http_proxy,
                    headers,
                    ssl_cert_file,
                    ssl_key_file,
                    ssl_key_password,
                    trapper_hosts,
                    username,
                    password,
                ]
            }
        }
    }
}

/// Scheduling state of a check. Only the scheduler changes `queue`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub nextcheck: i64,
    pub worker: Option<WorkerClass>,
    pub queue: QueueState,
    pub priority: QueuePriority,
    /// Set while the check's interface is failing with network errors.
    pub unreachable: bool,
    /// Effective base interval in seconds, `None` when the interval could
    /// not be parsed.
    pub interval: Option<u32>,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            nextcheck: 0,
            worker: None,
            queue: QueueState::Absent,
            priority: QueuePriority::Normal,
            unreachable: false,
            interval: None,
        }
    }
}

#[derive(Debug)]
pub struct Item {
    pub itemid: u64,
    pub hostid: u64,
    pub interfaceid: u64,
    pub key: StrHandle,
    pub check_type: CheckType,
    pub params: CheckParams,
    pub value_type: ValueType,
    pub status: Status,
    pub state: ItemState,
    pub error: StrHandle,
    /// Interval expression, possibly containing user macros.
    pub delay: StrHandle,
    pub timeout: StrHandle,
    pub flags: ItemFlags,
    pub master_itemid: u64,
    pub schedule: Schedule,
    /// Triggers whose expressions reference this item.
    pub triggerids: Vec<u64>,
    pub revision: u64,
}

impl Item {
    pub(crate) fn new(itemid: u64) -> Self {
        Self {
            itemid,
            hostid: 0,
            interfaceid: 0,
            key: StrHandle::unset(),
            check_type: CheckType::Agent,
            params: CheckParams::None,
            value_type: ValueType::Uint,
            status: Status::Enabled,
            state: ItemState::Normal,
            error: StrHandle::unset(),
            delay: StrHandle::unset(),
            timeout: StrHandle::unset(),
            flags: ItemFlags::Plain,
            master_itemid: 0,
            schedule: Schedule::default(),
            triggerids: Vec::new(),
            revision: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.status == Status::Enabled
    }

    pub fn is_supported(&self) -> bool {
        self.state == ItemState::Normal
    }

    pub(crate) fn into_handles(self) -> impl Iterator<Item = StrHandle> {
        [self.key, self.error, self.delay, self.timeout]
            .into_iter()
            .chain(self.params.into_handles())
    }
}

/// Post-processing step of a check, ordered by `step`.
#[derive(Debug)]
pub struct PreprocStep {
    pub preprocid: u64,
    pub itemid: u64,
    pub step: u32,
    pub kind: u8,
    pub params: StrHandle,
    pub error_handler: u8,
    pub error_handler_params: StrHandle,
}

impl PreprocStep {
    pub(crate) fn new(preprocid: u64) -> Self {
        Self {
            preprocid,
            itemid: 0,
            step: 0,
            kind: 0,
            params: StrHandle::unset(),
            error_handler: 0,
            error_handler_params: StrHandle::unset(),
        }
    }
}

/// Named parameter of a script or browser check.
#[derive(Debug)]
pub struct ItemParam {
    pub paramid: u64,
    pub itemid: u64,
    pub name: StrHandle,
    pub value: StrHandle,
}

impl ItemParam {
    pub(crate) fn new(paramid: u64) -> Self {
        Self {
            paramid,
            itemid: 0,
            name: StrHandle::unset(),
            value: StrHandle::unset(),
        }
    }
}

/// Link from a discovered check to the discovery rule that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemDiscovery {
    pub itemid: u64,
    pub parent_itemid: u64,
}
