#![forbid(unsafe_code)]

use super::{QueueState, seconds};
use crate::data::ConfigData;
use crate::interval::proxy_nextcheck;
use crate::snapshot::ProxySnapshot;
use bitflags::bitflags;
use tracing::{debug, trace};

bitflags! {
    /// Areas of a passive proxy a poller has just exchanged.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ProxyNextcheck: u8 {
        const CONFIG = 0x01;
        const DATA = 0x02;
        const TASKS = 0x04;
    }
}

/// Advance the selected areas of a proxy to their next poll time.
fn advance(data: &mut ConfigData, proxyid: u64, areas: ProxyNextcheck, now: i64) {
    let timing = &data.options.timing;
    let config = seconds(timing.proxy_config_frequency);
    let history = seconds(timing.proxy_data_frequency);
    let tasks = seconds(timing.proxy_tasks_frequency);
    let Some(proxy) = data.proxies.get_mut(proxyid) else {
        return;
    };
    let next = &mut proxy.nextchecks;
    if areas.contains(ProxyNextcheck::CONFIG) || next.config == 0 {
        next.config = proxy_nextcheck(proxyid, config, now);
    }
    if areas.contains(ProxyNextcheck::DATA) || next.data == 0 {
        next.data = proxy_nextcheck(proxyid, history, now);
    }
    if areas.contains(ProxyNextcheck::TASKS) || next.tasks == 0 {
        next.tasks = proxy_nextcheck(proxyid, tasks, now);
    }
}

/// Queue a passive proxy by its earliest area, drop everything else.
pub(crate) fn update_proxy_queue(data: &mut ConfigData, proxyid: u64, now: i64) {
    let passive = data.proxies.get(proxyid).map(|proxy| proxy.is_passive());
    if passive != Some(true) {
        data.queues.proxies.remove(proxyid);
        if let Some(proxy) = data.proxies.get_mut(proxyid) {
            proxy.queue = QueueState::Absent;
            proxy.nextchecks = Default::default();
        }
        return;
    }

    advance(data, proxyid, ProxyNextcheck::empty(), now);
    let Some(proxy) = data.proxies.get_mut(proxyid) else {
        return;
    };
    if proxy.queue == QueueState::Claimed {
        return;
    }
    let nextcheck = proxy.nextchecks.earliest();
    proxy.queue = QueueState::Queued;
    data.queues.proxies.push(proxyid, (nextcheck, proxyid));
    trace!(proxyid, nextcheck, "proxy queued");
}

/// Hand out up to `max` passive proxies that are due.
pub(crate) fn claim_proxies(data: &mut ConfigData, now: i64, max: usize) -> Vec<ProxySnapshot> {
    let mut claimed = Vec::new();
    while claimed.len() < max {
        let Some((proxyid, &(nextcheck, _))) = data.queues.proxies.peek() else {
            break;
        };
        if nextcheck > now {
            break;
        }
        data.queues.proxies.pop();
        let Some(proxy) = data.proxies.get_mut(proxyid) else {
            continue;
        };
        proxy.queue = QueueState::Claimed;
        if let Some(snapshot) = ProxySnapshot::capture(data, proxyid) {
            claimed.push(snapshot);
        }
    }
    claimed
}

/// Return a claimed proxy, moving the areas in `areas` forward.
pub(crate) fn requeue_proxy(data: &mut ConfigData, proxyid: u64, areas: ProxyNextcheck, now: i64) {
    let Some(proxy) = data.proxies.get_mut(proxyid) else {
        return;
    };
    if proxy.queue != QueueState::Claimed {
        debug!(proxyid, "requeue of a proxy that is not claimed ignored");
        return;
    }
    proxy.queue = QueueState::Absent;
    advance(data, proxyid, areas, now);
    update_proxy_queue(data, proxyid, now);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::CacheOptions;
    use crate::domain::{Proxy, ProxyMode};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn data() -> ConfigData {
        let options = CacheOptions {
            timing: config::Timing {
                proxy_config_frequency: Duration::from_secs(100),
                proxy_data_frequency: Duration::from_secs(10),
                proxy_tasks_frequency: Duration::from_secs(10),
                ..config::Timing::default()
            },
            ..CacheOptions::default()
        };
        let mut data = ConfigData::new(&config::Cache::default(), options);
        for (proxyid, mode) in [(1, ProxyMode::Passive), (2, ProxyMode::Active)] {
            let (proxy, _) = data
                .proxies
                .insert_with(proxyid, || Proxy::new(proxyid))
                .unwrap();
            proxy.mode = mode;
        }
        data
    }

    #[test]
    fn only_passive_proxies_are_polled() {
        let mut data = data();
        update_proxy_queue(&mut data, 1, 1000);
        update_proxy_queue(&mut data, 2, 1000);
        assert_eq!(data.queues.proxies.len(), 1);
        assert_eq!(data.queues.proxy_nextcheck(), Some(1001));
    }

    #[test]
    fn requeue_moves_only_the_polled_areas() {
        let mut data = data();
        update_proxy_queue(&mut data, 1, 1000);
        let before = data.proxies.get(1).unwrap().nextchecks;
        assert_eq!(before.config, 1001);
        assert_eq!(before.data, 1001);

        let claimed = claim_proxies(&mut data, 1001, 10);
        assert_eq!(claimed.len(), 1);
        assert!(data.queues.proxies.is_empty());

        requeue_proxy(&mut data, 1, ProxyNextcheck::DATA | ProxyNextcheck::TASKS, 1001);
        let after = data.proxies.get(1).unwrap().nextchecks;
        assert_eq!(after.config, 1001);
        assert_eq!(after.data, 1011);
        assert_eq!(after.tasks, 1011);
        assert_eq!(data.queues.proxy_nextcheck(), Some(1001));
    }

    #[test]
    fn switching_to_active_dequeues() {
        let mut data = data();
        update_proxy_queue(&mut data, 1, 1000);
        data.proxies.get_mut(1).unwrap().mode = ProxyMode::Active;
        update_proxy_queue(&mut data, 1, 1000);
        assert!(data.queues.proxies.is_empty());
        assert_eq!(data.proxies.get(1).unwrap().queue, QueueState::Absent);
    }
}
