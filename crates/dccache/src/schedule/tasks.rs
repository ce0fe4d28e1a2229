#![forbid(unsafe_code)]

//! Queues of network discovery rules and web scenarios processed locally.

use super::QueueState;
use crate::data::ConfigData;
use crate::domain::Status;
use crate::interval::parse_time_suffix;
use crate::snapshot::{DruleSnapshot, HttpTestSnapshot};
use tracing::{debug, trace, warn};

/// Expand and parse a task delay. Zero is not a valid delay.
fn resolve_delay(data: &ConfigData, hostid: u64, delay: &str) -> Option<i64> {
    let expanded = data.macros.expand(hostid, delay).ok()?;
    parse_time_suffix(expanded.trim())
        .filter(|seconds| *seconds > 0)
        .map(i64::from)
}

/// First run of a new task is due at once; a shorter delay pulls a queued
/// run forward.
fn first_nextcheck(current: i64, delay: i64, now: i64) -> i64 {
    if current == 0 {
        now
    } else {
        current.min(now.saturating_add(delay))
    }
}

fn drule_delay(data: &ConfigData, druleid: u64) -> Option<i64> {
    let drule = data.drules.get(druleid)?;
    if drule.status != Status::Enabled || drule.proxyid != 0 {
        return None;
    }
    let delay = resolve_delay(data, 0, &drule.delay);
    if delay.is_none() {
        warn!(druleid, delay = %drule.delay, "discovery rule has an invalid delay");
    }
    delay
}

fn unqueue_drule(data: &mut ConfigData, druleid: u64) {
    data.queues.drules.remove(druleid);
    if let Some(drule) = data.drules.get_mut(druleid) {
        drule.queue = QueueState::Absent;
    }
}

/// Queue an enabled discovery rule run by this server, drop anything else.
pub(crate) fn update_drule_queue(data: &mut ConfigData, druleid: u64, now: i64) {
    let Some(delay) = drule_delay(data, druleid) else {
        unqueue_drule(data, druleid);
        return;
    };
    let Some(drule) = data.drules.get_mut(druleid) else {
        return;
    };
    if drule.queue == QueueState::Claimed {
        return;
    }
    drule.nextcheck = first_nextcheck(drule.nextcheck, delay, now);
    drule.queue = QueueState::Queued;
    data.queues.drules.push(druleid, drule.nextcheck);
    trace!(druleid, nextcheck = drule.nextcheck, "discovery rule queued");
}

/// Hand out up to `max` due discovery rules.
pub(crate) fn claim_drules(data: &mut ConfigData, now: i64, max: usize) -> Vec<DruleSnapshot> {
    let mut claimed = Vec::new();
    while claimed.len() < max {
        let Some((druleid, &nextcheck)) = data.queues.drules.peek() else {
            break;
        };
        if nextcheck > now {
            break;
        }
        data.queues.drules.pop();
        let Some(drule) = data.drules.get_mut(druleid) else {
            continue;
        };
        drule.queue = QueueState::Claimed;
        if let Some(snapshot) = DruleSnapshot::capture(data, druleid) {
            claimed.push(snapshot);
        }
    }
    claimed
}

/// Queue a finished discovery rule one delay after `now`.
pub(crate) fn requeue_drule(data: &mut ConfigData, druleid: u64, now: i64) {
    if data.drules.get(druleid).map(|drule| drule.queue) != Some(QueueState::Claimed) {
        debug!(druleid, "requeue of a discovery rule that is not claimed ignored");
        return;
    }
    let Some(delay) = drule_delay(data, druleid) else {
        unqueue_drule(data, druleid);
        return;
    };
    let Some(drule) = data.drules.get_mut(druleid) else {
        return;
    };
    drule.queue = QueueState::Queued;
    drule.nextcheck = now.saturating_add(delay);
    data.queues.drules.push(druleid, drule.nextcheck);
}

fn httptest_delay(data: &ConfigData, httptestid: u64) -> Option<i64> {
    let test = data.httptests.get(httptestid)?;
    let local = data
        .hosts
        .get(test.hostid)
        .is_some_and(|host| host.is_monitored() && !host.is_proxied());
    if test.status != Status::Enabled || !local {
        return None;
    }
    let delay = resolve_delay(data, test.hostid, &test.delay);
    if delay.is_none() {
        warn!(httptestid, delay = %test.delay, "web scenario has an invalid delay");
    }
    delay
}

fn unqueue_httptest(data: &mut ConfigData, httptestid: u64) {
    data.queues.httptests.remove(httptestid);
    if let Some(test) = data.httptests.get_mut(httptestid) {
        test.queue = QueueState::Absent;
    }
}

/// Queue an enabled web scenario of a locally monitored host, drop
/// anything else.
pub(crate) fn update_httptest_queue(data: &mut ConfigData, httptestid: u64, now: i64) {
    let Some(delay) = httptest_delay(data, httptestid) else {
        unqueue_httptest(data, httptestid);
        return;
    };
    let Some(test) = data.httptests.get_mut(httptestid) else {
        return;
    };
    if test.queue == QueueState::Claimed {
        return;
    }
    test.nextcheck = first_nextcheck(test.nextcheck, delay, now);
    test.queue = QueueState::Queued;
    data.queues.httptests.push(httptestid, test.nextcheck);
    trace!(httptestid, nextcheck = test.nextcheck, "web scenario queued");
}

/// Hand out up to `max` due web scenarios.
pub(crate) fn claim_httptests(
    data: &mut ConfigData,
    now: i64,
    max: usize,
) -> Vec<HttpTestSnapshot> {
    let mut claimed = Vec::new();
    while claimed.len() < max {
        let Some((httptestid, &nextcheck)) = data.queues.httptests.peek() else {
            break;
        };
        if nextcheck > now {
            break;
        }
        data.queues.httptests.pop();
        let Some(test) = data.httptests.get_mut(httptestid) else {
            continue;
        };
        test.queue = QueueState::Claimed;
        if let Some(snapshot) = HttpTestSnapshot::capture(data, httptestid) {
            claimed.push(snapshot);
        }
    }
    claimed
}

/// Queue a finished web scenario one delay after `now`.
pub(crate) fn requeue_httptest(data: &mut ConfigData, httptestid: u64, now: i64) {
    if data.httptests.get(httptestid).map(|test| test.queue) != Some(QueueState::Claimed) {
        debug!(httptestid, "requeue of a web scenario that is not claimed ignored");
        return;
    }
    let Some(delay) = httptest_delay(data, httptestid) else {
        unqueue_httptest(data, httptestid);
        return;
    };
    let Some(test) = data.httptests.get_mut(httptestid) else {
        return;
    };
    test.queue = QueueState::Queued;
    test.nextcheck = now.saturating_add(delay);
    data.queues.httptests.push(httptestid, test.nextcheck);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::CacheOptions;
    use crate::domain::{Drule, Host, HttpTest};

    fn data_with_drule(delay: &str, proxyid: u64) -> ConfigData {
        let mut data = ConfigData::new(&config::Cache::default(), CacheOptions::default());
        let delay = data.strpool.intern(delay).unwrap();
        let (drule, _) = data.drules.insert_with(1, || Drule::new(1)).unwrap();
        drule.delay = delay;
        drule.proxyid = proxyid;
        data
    }

    #[test]
    fn new_rule_is_due_at_once_then_waits_a_delay() {
        let mut data = data_with_drule("1h", 0);
        update_drule_queue(&mut data, 1, 1000);
        assert_eq!(data.queues.drule_nextcheck(), Some(1000));

        let claimed = claim_drules(&mut data, 1000, 10);
        assert_eq!(claimed.len(), 1);
        assert!(claim_drules(&mut data, 1000, 10).is_empty());

        requeue_drule(&mut data, 1, 1010);
        assert_eq!(data.queues.drule_nextcheck(), Some(4610));
    }

    #[test]
    fn only_claimed_rules_are_requeued() {
        let mut data = data_with_drule("1h", 0);
        requeue_drule(&mut data, 1, 1000);
        assert!(data.queues.drules.is_empty());

        update_drule_queue(&mut data, 1, 1000);
        requeue_drule(&mut data, 1, 1010);
        assert_eq!(data.queues.drules.len(), 1);
        assert_eq!(data.queues.drule_nextcheck(), Some(1000));

        assert_eq!(claim_drules(&mut data, 1000, 10).len(), 1);
        requeue_drule(&mut data, 1, 1010);
        requeue_drule(&mut data, 1, 1020);
        assert_eq!(data.queues.drules.len(), 1);
        assert_eq!(data.queues.drule_nextcheck(), Some(4610));
    }

    #[test]
    fn only_claimed_web_scenarios_are_requeued() {
        let mut data = ConfigData::new(&config::Cache::default(), CacheOptions::default());
        let host_name = data.strpool.intern("host-a").unwrap();
        let (host, _) = data.hosts.insert_with(1, || Host::new(1)).unwrap();
        host.host = host_name;
        let delay = data.strpool.intern("1m").unwrap();
        let (test, _) = data.httptests.insert_with(2, || HttpTest::new(2)).unwrap();
        test.hostid = 1;
        test.delay = delay;

        requeue_httptest(&mut data, 2, 1000);
        assert!(data.queues.httptests.is_empty());

        update_httptest_queue(&mut data, 2, 1000);
        assert_eq!(claim_httptests(&mut data, 1000, 10).len(), 1);
        requeue_httptest(&mut data, 2, 1000);
        requeue_httptest(&mut data, 2, 1030);
        assert_eq!(data.queues.httptests.len(), 1);
        assert_eq!(data.queues.httptest_nextcheck(), Some(1060));
    }

    #[test]
    fn proxy_rules_and_bad_delays_are_not_queued() {
        let mut data = data_with_drule("1h", 5);
        update_drule_queue(&mut data, 1, 1000);
        assert!(data.queues.drules.is_empty());

        let mut data = data_with_drule("often", 0);
        update_drule_queue(&mut data, 1, 1000);
        assert!(data.queues.drules.is_empty());
    }

    #[test]
    fn removed_rule_leaves_the_queue() {
        let mut data = data_with_drule("60", 0);
        update_drule_queue(&mut data, 1, 1000);
        data.drules.remove(1);
        update_drule_queue(&mut data, 1, 1000);
        assert!(data.queues.drules.is_empty());
    }
}
