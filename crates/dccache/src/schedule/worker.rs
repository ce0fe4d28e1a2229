#![forbid(unsafe_code)]

use crate::domain::{CheckType, Host, Item};

code_enum! {
    /// Pool of workers a check is queued for.
    pub enum WorkerClass {
        Normal = 0,
        Unreachable = 1,
        Ipmi = 2,
        Pinger = 3,
        Java = 4,
        History = 5,
        Odbc = 6,
        HttpAgent = 7,
        Agent = 8,
        Snmp = 9,
        Internal = 10,
        Browser = 11,
    }
}

impl WorkerClass {
    pub fn name(self) -> &'static str {
        match self {
            Self::Normal => "poller",
            Self::Unreachable => "unreachable poller",
            Self::Ipmi => "IPMI poller",
            Self::Pinger => "ICMP pinger",
            Self::Java => "Java poller",
            Self::History => "history poller",
            Self::Odbc => "ODBC poller",
            Self::HttpAgent => "HTTP agent poller",
            Self::Agent => "agent poller",
            Self::Snmp => "SNMP poller",
            Self::Internal => "internal poller",
            Self::Browser => "browser poller",
        }
    }

    /// Largest number of checks handed out by one claim.
    pub fn max_items(self) -> usize {
        match self {
            Self::Java => 32,
            Self::Pinger => 128,
            Self::HttpAgent | Self::Agent | Self::Snmp => 1000,
            _ => 1,
        }
    }

    /// Whether one claim only returns checks sharing the first check's
    /// interface.
    pub fn batches_by_interface(self) -> bool {
        matches!(self, Self::Java | Self::Pinger)
    }

    /// Whether checks of this class move to the unreachable class while
    /// their interface is failing.
    pub fn can_become_unreachable(self) -> bool {
        matches!(self, Self::Normal | Self::Java | Self::Agent | Self::Snmp)
    }

    /// Whether checks of this class use the interfaceid as scheduling seed,
    /// so that checks of one interface fall due together.
    pub fn seeds_by_interface(self) -> bool {
        matches!(self, Self::Java | Self::Pinger | Self::Snmp)
    }

    /// Class to fall back on when this one has no workers.
    fn fallback(self) -> Option<Self> {
        match self {
            Self::Agent | Self::Snmp | Self::Pinger => Some(Self::Normal),
            _ => None,
        }
    }
}

/// Number of workers started for each class.
pub trait WorkerCapacity {
    fn workers(&self, class: WorkerClass) -> usize;
}

impl WorkerCapacity for config::Workers {
    fn workers(&self, class: WorkerClass) -> usize {
        let count = match class {
            WorkerClass::Normal => self.pollers,
            WorkerClass::Unreachable => self.unreachable_pollers,
            WorkerClass::Ipmi => self.ipmi_pollers,
            WorkerClass::Pinger => self.pingers,
            WorkerClass::Java => self.java_pollers,
            WorkerClass::History => self.history_pollers,
            WorkerClass::Odbc => self.odbc_pollers,
            WorkerClass::HttpAgent => self.http_agent_pollers,
            WorkerClass::Agent => self.agent_pollers,
            WorkerClass::Snmp => self.snmp_pollers,
            WorkerClass::Internal => self.internal_pollers,
            WorkerClass::Browser => self.browser_pollers,
        };
        usize::from(count)
    }
}

/// Why a check is not put into any queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unqueued {
    /// Values are pushed to the server or computed elsewhere.
    NotPolled,
    /// The check would be polled locally but no worker class can take it.
    NoWorker(WorkerClass),
}

/// Preferred class of a check, before capacity is considered.
pub fn preferred_class(item: &Item, host: &Host) -> Result<WorkerClass, Unqueued> {
    if item.check_type.is_passive_input() {
        return Err(Unqueued::NotPolled);
    }
    if host.is_proxied() && item.check_type != CheckType::Calculated {
        return Err(Unqueued::NotPolled);
    }
    Ok(match item.check_type {
        CheckType::Simple if item.key.starts_with("icmpping") => WorkerClass::Pinger,
        CheckType::Ipmi => WorkerClass::Ipmi,
        CheckType::Jmx => WorkerClass::Java,
        CheckType::Calculated => WorkerClass::History,
        CheckType::DbMonitor => WorkerClass::Odbc,
        CheckType::HttpAgent => WorkerClass::HttpAgent,
        CheckType::Agent => WorkerClass::Agent,
        CheckType::Snmp => WorkerClass::Snmp,
        CheckType::Internal => WorkerClass::Internal,
        CheckType::Browser => WorkerClass::Browser,
        _ => WorkerClass::Normal,
    })
}

/// Class a check is queued for, following fallbacks for classes without
/// workers.
pub fn assign_class(
    item: &Item,
    host: &Host,
    capacity: &dyn WorkerCapacity,
) -> Result<WorkerClass, Unqueued> {
    let mut class = preferred_class(item, host)?;
    loop {
        if capacity.workers(class) > 0 {
            return Ok(class);
        }
        match class.fallback() {
            Some(next) => class = next,
            None => return Err(Unqueued::NoWorker(class)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MonitoredBy;

    fn item(check_type: CheckType) -> Item {
        let mut item = Item::new(1);
        item.check_type = check_type;
        item
    }

    #[test]
    fn agent_falls_back_to_normal_pollers() {
        let mut workers = config::Workers::default();
        workers.agent_pollers = 0;
        let host = Host::new(1);
        assert_eq!(
            assign_class(&item(CheckType::Agent), &host, &workers),
            Ok(WorkerClass::Normal)
        );
        workers.pollers = 0;
        assert_eq!(
            assign_class(&item(CheckType::Agent), &host, &workers),
            Err(Unqueued::NoWorker(WorkerClass::Normal))
        );
    }

    #[test]
    fn java_without_workers_is_not_queued() {
        let workers = config::Workers::default();
        assert_eq!(
            assign_class(&item(CheckType::Jmx), &Host::new(1), &workers),
            Err(Unqueued::NoWorker(WorkerClass::Java))
        );
    }

    #[test]
    fn proxied_hosts_only_poll_calculated_locally() {
        let workers = config::Workers::default();
        let mut host = Host::new(1);
        host.monitored_by = MonitoredBy::Proxy;
        host.proxyid = 7;
        assert_eq!(
            assign_class(&item(CheckType::Agent), &host, &workers),
            Err(Unqueued::NotPolled)
        );
        assert_eq!(
            assign_class(&item(CheckType::Calculated), &host, &workers),
            Ok(WorkerClass::History)
        );
    }

    #[test]
    fn trapper_is_never_polled() {
        let workers = config::Workers::default();
        assert_eq!(
            assign_class(&item(CheckType::Trapper), &Host::new(1), &workers),
            Err(Unqueued::NotPolled)
        );
    }
}
