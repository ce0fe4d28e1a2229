#![forbid(unsafe_code)]

//! Cached entity records.
//!
//! Records refer to each other by database id only; lookups go through the
//! tables and indices of [`ConfigData`](crate::ConfigData).

/// Enum backed by the integer code used in configuration rows.
macro_rules! code_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident = $code:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        $vis enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn from_code(code: i64) -> Option<Self> {
                match code {
                    $($code => Some(Self::$variant),)+
                    _ => None,
                }
            }

            pub fn code(self) -> i64 {
                match self {
                    $(Self::$variant => $code),+
                }
            }
        }
    };
}

mod discovery;
mod host;
mod interface;
mod item;
mod macros;
mod proxy;
mod settings;
mod trigger;

pub use discovery::{Dcheck, Drule, HttpStep, HttpTest};
pub use host::{
    Host, HostGroup, HostGroupLink, HostInventory, HostStatus, INVENTORY_FIELDS, InventoryMode,
    Maintenance, MaintenanceStatus, MaintenanceType, MonitoredBy, Tag, Tls, TlsAccept, TlsConnect,
};
pub use interface::{
    Availability, Interface, InterfaceAvailability, InterfaceType, SnmpDetails, SnmpVersion,
};
pub use item::{
    CheckParams, CheckType, Credentials, HttpAgentParams, Item, ItemDiscovery, ItemFlags,
    ItemParam, ItemState, PreprocStep, Schedule, SshParams, ValueType,
};
pub use macros::{MacroKind, MacroRef, UserMacro, find_macros, parse_macro_name};
pub use proxy::{HostProxy, Proxy, ProxyGroup, ProxyMode, ProxyNextchecks, RemovedHost};
pub use settings::{
    GlobalSettings, HK_HISTORY_MIN, HK_PERIOD_MAX, HK_TRENDS_MIN, Housekeeping, ItemTimeouts,
    TIMEOUT_KINDS, parse_timezone,
};
pub use trigger::{
    Correlation, CorrelationMode, Function, FunctionKind, RecoveryMode, Severity, Trigger,
    TriggerState, TriggerValue,
};

/// Generic enabled/disabled status shared by items, triggers, discovery
/// rules, web tests and correlations.
code_enum! {
    pub enum Status {
        Enabled = 0,
        Disabled = 1,
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::Enabled
    }
}

/// Overwrite `slot` with `value`, reporting whether it changed.
#[inline]
pub(crate) fn update<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}
