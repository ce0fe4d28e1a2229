#![forbid(unsafe_code)]

//! Revision based change queries, used to ship configuration deltas.

use crate::data::ConfigData;
use itertools::Itertools;

/// Ids of hosts changed after `revision`, ascending.
pub(crate) fn hostids_by_revision(data: &ConfigData, revision: u64) -> Vec<u64> {
    data.hosts
        .iter()
        .filter(|(_, host)| host.revision > revision)
        .map(|(hostid, _)| hostid)
        .sorted_unstable()
        .collect()
}

/// Ids of checks changed after `revision`, ascending.
pub(crate) fn itemids_by_revision(data: &ConfigData, revision: u64) -> Vec<u64> {
    data.items
        .iter()
        .filter(|(_, item)| item.revision > revision)
        .map(|(itemid, _)| itemid)
        .sorted_unstable()
        .collect()
}

/// What a proxy has to fetch to catch up from `revision`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyConfigUpdate {
    pub proxyid: u64,
    /// Revision the proxy is at after applying the update.
    pub revision: u64,
    pub hostids: Vec<u64>,
    pub removed_hostids: Vec<u64>,
    pub global_macros: bool,
}

impl ProxyConfigUpdate {
    pub fn is_empty(&self) -> bool {
        self.hostids.is_empty() && self.removed_hostids.is_empty() && !self.global_macros
    }
}

pub(crate) fn proxy_config_updates(
    data: &ConfigData,
    proxyid: u64,
    revision: u64,
) -> Option<ProxyConfigUpdate> {
    let proxy = data.proxies.get(proxyid)?;
    let hostids = proxy
        .hostids
        .iter()
        .copied()
        .filter(|hostid| {
            data.hosts.get(*hostid).is_some_and(|host| host.revision > revision)
        })
        .collect();
    let removed_hostids = proxy
        .removed_hosts
        .iter()
        .filter(|removed| removed.revision > revision)
        .map(|removed| removed.hostid)
        .sorted_unstable()
        .dedup()
        .collect();
    Some(ProxyConfigUpdate {
        proxyid,
        revision: data.revision.max(proxy.revision),
        hostids,
        removed_hostids,
        global_macros: data.macro_revisions.get(&0).is_some_and(|rev| *rev > revision),
    })
}

/// Forget hosts a proxy has seen leave, up to `revision`.
pub(crate) fn acknowledge_proxy_config(data: &mut ConfigData, proxyid: u64, revision: u64) {
    if let Some(proxy) = data.proxies.get_mut(proxyid) {
        proxy.removed_hosts.retain(|removed| removed.revision > revision);
    }
}

/// Hosts whose user macros changed after `revision`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MacroUpdates {
    pub global: bool,
    pub hostids: Vec<u64>,
}

pub(crate) fn macro_updates(data: &ConfigData, revision: u64) -> MacroUpdates {
    let mut updates = MacroUpdates::default();
    for (hostid, _) in data
        .macro_revisions
        .iter()
        .filter(|(_, rev)| **rev > revision)
        .sorted_unstable()
    {
        match *hostid {
            0 => updates.global = true,
            hostid => updates.hostids.push(hostid),
        }
    }
    updates
}

/// `(druleid, revision)` of every discovery rule run by this server.
pub(crate) fn drule_revisions(data: &ConfigData) -> Vec<(u64, u64)> {
    data.drules
        .iter()
        .filter(|(_, drule)| drule.proxyid == 0)
        .map(|(druleid, drule)| (druleid, drule.revision))
        .sorted_unstable()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::CacheOptions;
    use crate::domain::{Host, Proxy, RemovedHost};
    use pretty_assertions::assert_eq;

    fn data() -> ConfigData {
        let mut data = ConfigData::new(&config::Cache::default(), CacheOptions::default());
        for (hostid, revision) in [(1, 3), (2, 5), (3, 7)] {
            let (host, _) = data.hosts.insert_with(hostid, || Host::new(hostid)).unwrap();
            host.revision = revision;
            host.proxyid = 9;
        }
        let (proxy, _) = data.proxies.insert_with(9, || Proxy::new(9)).unwrap();
        proxy.hostids.extend([1, 2, 3]);
        proxy.removed_hosts.push(RemovedHost {
            hostid: 4,
            revision: 6,
        });
        proxy.revision = 7;
        data.revision = 7;
        data
    }

    #[test]
    fn hosts_after_a_revision() {
        let data = data();
        assert_eq!(hostids_by_revision(&data, 4), vec![2, 3]);
        assert_eq!(hostids_by_revision(&data, 7), Vec::<u64>::new());
    }

    #[test]
    fn proxy_delta_lists_changed_and_removed_hosts() {
        let mut data = data();
        data.macro_revisions.insert(0, 6);
        let update = proxy_config_updates(&data, 9, 5).unwrap();
        assert_eq!(
            update,
            ProxyConfigUpdate {
                proxyid: 9,
                revision: 7,
                hostids: vec![3],
                removed_hostids: vec![4],
                global_macros: true,
            }
        );

        acknowledge_proxy_config(&mut data, 9, 7);
        let update = proxy_config_updates(&data, 9, 5).unwrap();
        assert!(update.removed_hostids.is_empty());
        assert!(proxy_config_updates(&data, 8, 0).is_none());
    }

    #[test]
    fn macro_changes_split_global_and_host() {
        let mut data = data();
        data.macro_revisions.extend([(0, 2), (1, 5), (2, 6)]);
        let updates = macro_updates(&data, 4);
        assert_eq!(
            updates,
            MacroUpdates {
                global: false,
                hostids: vec![1, 2],
            }
        );
    }
}
