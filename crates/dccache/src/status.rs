#![forbid(unsafe_code)]

//! Aggregate counters over the cached configuration.
//!
//! Counting walks every check, so it runs under the read lock and the
//! result is committed under the write lock afterwards.

use crate::data::ConfigData;
use crate::domain::{ItemState, TriggerValue};
use rayon::prelude::*;
use std::collections::HashMap;
use std::ops::AddAssign;

/// Counters of one monitoring location: the server or a proxy.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatusCounts {
    pub hosts_monitored: u64,
    pub hosts_not_monitored: u64,
    pub items_active_normal: u64,
    pub items_active_notsupported: u64,
    pub items_disabled: u64,
    /// Values per second the location is expected to collect.
    pub required_performance: f64,
}

impl AddAssign for StatusCounts {
    fn add_assign(&mut self, other: Self) {
        self.hosts_monitored += other.hosts_monitored;
        self.hosts_not_monitored += other.hosts_not_monitored;
        self.items_active_normal += other.items_active_normal;
        self.items_active_notsupported += other.items_active_notsupported;
        self.items_disabled += other.items_disabled;
        self.required_performance += other.required_performance;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TriggerCounts {
    pub enabled_ok: u64,
    pub enabled_problem: u64,
    pub disabled: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStatus {
    /// Time the counters were taken.
    pub computed_at: i64,
    /// Configuration revision the counters describe.
    pub revision: u64,
    pub global: StatusCounts,
    /// Counters of hosts monitored by each proxy, keyed by proxy id.
    pub proxies: HashMap<u64, StatusCounts>,
    pub triggers: TriggerCounts,
}

impl CacheStatus {
    pub fn proxy(&self, proxyid: u64) -> StatusCounts {
        self.proxies.get(&proxyid).copied().unwrap_or_default()
    }

    pub fn items(&self) -> u64 {
        self.global.items_active_normal
            + self.global.items_active_notsupported
            + self.global.items_disabled
    }

    pub fn hosts(&self) -> u64 {
        self.global.hosts_monitored + self.global.hosts_not_monitored
    }
}

type Partial = HashMap<u64, StatusCounts>;

fn merge(mut left: Partial, right: Partial) -> Partial {
    for (proxyid, counts) in right {
        *left.entry(proxyid).or_default() += counts;
    }
    left
}

/// Count hosts, checks and triggers. Proxy id 0 collects what the server
/// monitors itself.
pub(crate) fn compute(data: &ConfigData, now: i64) -> CacheStatus {
    let host_table = &data.hosts;
    let hosts: Vec<_> = host_table.values().collect();
    let items: Vec<_> = data.items.values().collect();

    let by_host = hosts
        .par_iter()
        .fold(Partial::new, |mut acc, host| {
            let counts = acc.entry(host.proxyid).or_default();
            if host.is_monitored() {
                counts.hosts_monitored += 1;
            } else {
                counts.hosts_not_monitored += 1;
            }
            acc
        })
        .reduce(Partial::new, merge);

    let by_item = items
        .par_iter()
        .filter_map(|item| host_table.get(item.hostid).map(|host| (item, host)))
        .fold(Partial::new, |mut acc, (item, host)| {
            let counts = acc.entry(host.proxyid).or_default();
            if !host.is_monitored() {
                return acc;
            }
            if !item.is_enabled() {
                counts.items_disabled += 1;
                return acc;
            }
            match item.state {
                ItemState::Normal => counts.items_active_normal += 1,
                ItemState::NotSupported => counts.items_active_notsupported += 1,
            }
            if let Some(delay) = item.schedule.interval.filter(|delay| *delay > 0) {
                counts.required_performance += 1.0 / f64::from(delay);
            }
            acc
        })
        .reduce(Partial::new, merge);

    let mut proxies = merge(by_host, by_item);
    let mut global = StatusCounts::default();
    for counts in proxies.values() {
        global += *counts;
    }
    proxies.remove(&0);

    let mut triggers = TriggerCounts::default();
    for trigger in data.triggers.values() {
        if !trigger.is_enabled() {
            triggers.disabled += 1;
        } else if trigger.value == TriggerValue::Problem {
            triggers.enabled_problem += 1;
        } else {
            triggers.enabled_ok += 1;
        }
    }

    CacheStatus {
        computed_at: now,
        revision: data.revision,
        global,
        proxies,
        triggers,
    }
}

/// Whether the committed counters are older than `interval` seconds or
/// describe an older revision.
pub(crate) fn is_stale(status: Option<&CacheStatus>, revision: u64, now: i64, interval: i64) -> bool {
    status.is_none_or(|status| status.revision != revision || now - status.computed_at >= interval)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::CacheOptions;
    use crate::domain::{Host, HostStatus, Item, Status, Trigger};

    #[test]
    fn counts_split_by_proxy() {
        let mut data = ConfigData::new(&config::Cache::default(), CacheOptions::default());
        for (hostid, proxyid, status) in [
            (1, 0, HostStatus::Monitored),
            (2, 7, HostStatus::Monitored),
            (3, 0, HostStatus::NotMonitored),
        ] {
            let (host, _) = data.hosts.insert_with(hostid, || Host::new(hostid)).unwrap();
            host.proxyid = proxyid;
            host.status = status;
        }
        for (itemid, hostid, status, interval) in [
            (10, 1, Status::Enabled, Some(60)),
            (11, 1, Status::Disabled, None),
            (12, 2, Status::Enabled, Some(30)),
            (13, 3, Status::Enabled, Some(60)),
        ] {
            let (item, _) = data.items.insert_with(itemid, || Item::new(itemid)).unwrap();
            item.hostid = hostid;
            item.status = status;
            item.schedule.interval = interval;
        }
        let (trigger, _) = data.triggers.insert_with(5, || Trigger::new(5)).unwrap();
        trigger.value = TriggerValue::Problem;

        let status = compute(&data, 100);
        assert_eq!(status.hosts(), 3);
        assert_eq!(status.global.hosts_monitored, 2);
        assert_eq!(status.global.items_active_normal, 2);
        assert_eq!(status.global.items_disabled, 1);
        assert!((status.global.required_performance - (1.0 / 60.0 + 1.0 / 30.0)).abs() < 1e-9);
        assert_eq!(status.proxy(7).items_active_normal, 1);
        assert_eq!(status.proxy(7).hosts_monitored, 1);
        assert_eq!(status.proxy(9), StatusCounts::default());
        assert_eq!(status.triggers.enabled_problem, 1);
    }

    #[test]
    fn staleness() {
        assert!(is_stale(None, 1, 100, 60));
        let status = CacheStatus {
            computed_at: 100,
            revision: 1,
            ..CacheStatus::default()
        };
        assert!(!is_stale(Some(&status), 1, 159, 60));
        assert!(is_stale(Some(&status), 1, 160, 60));
        assert!(is_stale(Some(&status), 2, 120, 60));
    }
}
