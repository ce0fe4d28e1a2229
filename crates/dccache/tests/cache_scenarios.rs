#![forbid(unsafe_code)]

use config::Config;
use dccache::clock::ManualClock;
use dccache::domain::{Availability, InterfaceType, ItemState};
use dccache::interval::NEVER;
use dccache::notify::{MemorySink, Notification};
use dccache::persistence::NoopRepository;
use dccache::schedule::{CheckOutcome, CheckResult, InterfaceOutcome, WorkerClass};
use dccache::sync::{MemorySource, Row, TableKind};
use dccache::topology::DependencyStatus;
use dccache::{ConfigCache, ItemChange, Services};
use pretty_assertions::assert_eq;
use std::collections::HashSet;
use std::sync::Arc;

const NOW: i64 = 1_700_000_000;
/// First due time of item 1 with a one minute delay, seeded by its id.
const FIRST_CHECK: i64 = 1_700_000_041;

struct Harness {
    cache: ConfigCache,
    clock: Arc<ManualClock>,
    sink: Arc<MemorySink>,
    source: MemorySource,
}

impl Harness {
    fn new() -> Self {
        let clock = Arc::new(ManualClock::new(NOW));
        let sink = Arc::new(MemorySink::default());
        let services = Services {
            repo: Box::new(NoopRepository),
            clock: clock.clone(),
            sink: sink.clone(),
            secrets: None,
        };
        Self {
            cache: ConfigCache::init(&Config::default(), services),
            clock,
            sink,
            source: MemorySource::new(),
        }
    }

    fn push(&self, table: TableKind, rows: impl IntoIterator<Item = Row>) -> &Self {
        self.source.extend(table, rows);
        self
    }

    fn sync(&self) -> dccache::sync::SyncReport {
        self.cache.sync(&self.source).unwrap()
    }

    /// host-a with one agent interface and an `agent.ping` check.
    fn with_agent_host(&self, delay: &str) -> &Self {
        self.push(TableKind::Hosts, [host(1, "host-a")])
            .push(TableKind::Interfaces, [interface(1, 1)])
            .push(TableKind::Items, [agent_item(1, 1, "agent.ping", delay)])
    }
}

fn host(hostid: u64, name: &str) -> Row {
    Row::build(TableKind::Hosts, hostid)
        .set("host", name)
        .set("name", name)
        .finish()
}

fn interface(interfaceid: u64, hostid: u64) -> Row {
    Row::build(TableKind::Interfaces, interfaceid)
        .set("hostid", hostid)
        .set("ip", "192.0.2.1")
        .finish()
}

fn agent_item(itemid: u64, hostid: u64, key: &str, delay: &str) -> Row {
    Row::build(TableKind::Items, itemid)
        .set("hostid", hostid)
        .set("interfaceid", 1)
        .set("key_", key)
        .set("delay", delay)
        .finish()
}

#[test]
fn agent_check_is_queued_and_claimed() {
    let harness = Harness::new();
    let report = harness.with_agent_host("1m").sync();
    assert!(report.changed);
    assert_eq!(report.revision, 1);
    assert_eq!(report.counts(TableKind::Items).added, 1);

    let cache = &harness.cache;
    let item = cache.item_by_key(1, "agent.ping").unwrap();
    assert_eq!(item.worker, Some(WorkerClass::Agent));
    assert_eq!(item.nextcheck, FIRST_CHECK);
    assert_eq!(cache.check_nextcheck(WorkerClass::Agent), Some(FIRST_CHECK));
    assert!(cache.claim_checks(WorkerClass::Agent).unwrap().is_empty());

    harness.clock.set(FIRST_CHECK);
    let claimed = cache.claim_checks(WorkerClass::Agent).unwrap();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].key, "agent.ping");
    assert_eq!(claimed[0].host.host, "host-a");
    assert_eq!(claimed[0].interface.as_ref().unwrap().address(), "192.0.2.1");
    assert_eq!(
        cache.main_interface(1, InterfaceType::Agent).unwrap().interfaceid,
        1
    );

    cache
        .requeue_checks(&[CheckResult::new(1, CheckOutcome::Succeed)])
        .unwrap();
    assert_eq!(
        cache.check_nextcheck(WorkerClass::Agent),
        Some(FIRST_CHECK + 60)
    );
}

#[test]
fn replaying_rows_changes_nothing() {
    let harness = Harness::new();
    harness.with_agent_host("1m").sync();
    let host = harness.cache.host(1).unwrap();

    let report = harness.with_agent_host("1m").sync();
    assert!(!report.changed);
    assert_eq!(report.revision, 1);
    assert_eq!(harness.cache.revision(), 1);
    assert_eq!(harness.cache.host(1).unwrap(), host);
    assert!(harness.cache.hostids_by_revision(1).is_empty());
}

#[test]
fn nested_groups_follow_the_name_path() {
    let harness = Harness::new();
    let group = |groupid, name: &str| {
        Row::build(TableKind::HostGroups, groupid)
            .set("name", name)
            .finish()
    };
    harness
        .push(
            TableKind::HostGroups,
            [
                group(1, "Linux"),
                group(2, "Linux/Web/Edge"),
                group(3, "Linux/Web"),
                group(4, "Windows"),
                group(5, "LinuxOld"),
            ],
        )
        .sync();

    assert_eq!(harness.cache.nested_groupids(1), vec![1, 2, 3]);
    assert_eq!(harness.cache.nested_groupids(3), vec![3, 2]);
    assert_eq!(harness.cache.nested_groupids(4), vec![4]);
    assert!(harness.cache.nested_groupids(9).is_empty());
    assert_eq!(
        harness.cache.host_group_by_name("Linux/Web").map(|group| group.groupid),
        Some(3)
    );
}

#[test]
fn host_removal_releases_everything() {
    let harness = Harness::new();
    harness.with_agent_host("1m").sync();
    assert_eq!(
        harness
            .cache
            .read(|data| data.strpool().refcount("host-a")),
        Some(3)
    );

    let report = harness.push(TableKind::Hosts, [Row::remove(1)]).sync();
    assert_eq!(report.counts(TableKind::Hosts).removed, 1);
    assert_eq!(report.revision, 2);

    let cache = &harness.cache;
    assert!(cache.host_by_name("host-a").is_none());
    assert!(cache.item(1).is_none());
    assert!(cache.interface(1).is_none());
    assert!(cache.item_runtime(1).is_none());
    cache.read(|data| {
        assert_eq!(data.strpool().refcount("host-a"), None);
        assert_eq!(data.strpool().refcount("agent.ping"), None);
        assert_eq!(data.strpool().refcount("192.0.2.1"), None);
        assert_eq!(data.queues().check_queue_len(WorkerClass::Agent), 0);
        assert!(data.hosts().is_empty());
    });
}

#[test]
fn host_removal_drops_balancer_assignments() {
    let harness = Harness::new();
    let grouped_host = || {
        Row::build(TableKind::Hosts, 1)
            .set("host", "host-a")
            .set("monitored_by", 2)
            .set("proxy_groupid", 7)
            .finish()
    };
    harness
        .push(TableKind::Hosts, [grouped_host()])
        .push(
            TableKind::HostProxy,
            [Row::build(TableKind::HostProxy, 50)
                .set("hostid", 1)
                .set("proxyid", 5)
                .finish()],
        )
        .sync();
    assert_eq!(harness.cache.host(1).unwrap().proxyid, 5);
    assert_eq!(harness.cache.read(|data| data.assigned_proxy(1)), Some(5));

    harness.push(TableKind::Hosts, [Row::remove(1)]).sync();
    assert_eq!(harness.cache.read(|data| data.assigned_proxy(1)), None);

    // the host comes back unassigned until the balancer speaks again
    harness.push(TableKind::Hosts, [grouped_host()]).sync();
    assert_eq!(harness.cache.host(1).unwrap().proxyid, 0);
    assert_eq!(harness.cache.read(|data| data.assigned_proxy(1)), None);
}

#[test]
fn first_psk_owner_decides_the_key() {
    let harness = Harness::new();
    let psk_host = |hostid, name, psk| {
        Row::build(TableKind::Hosts, hostid)
            .set("host", name)
            .set("tls_psk_identity", "shared")
            .set("tls_psk", psk)
            .finish()
    };
    harness
        .push(
            TableKind::Hosts,
            [psk_host(1, "host-a", "aaaa1111"), psk_host(2, "host-b", "bbbb2222")],
        )
        .sync();

    let cache = &harness.cache;
    assert_eq!(cache.psk("shared").as_deref(), Some("aaaa1111"));
    assert_eq!(cache.host(2).unwrap().tls.psk.as_deref(), Some("aaaa1111"));

    harness.push(TableKind::Hosts, [Row::remove(1)]).sync();
    assert_eq!(cache.psk("shared").as_deref(), Some("aaaa1111"));

    harness.push(TableKind::Hosts, [Row::remove(2)]).sync();
    assert_eq!(cache.psk("shared"), None);
    assert_eq!(cache.read(|data| data.strpool().refcount("aaaa1111")), None);
}

#[test]
fn unresolved_interval_macro_parks_the_check() {
    let harness = Harness::new();
    harness.with_agent_host("{$PING.DELAY}").sync();

    let item = harness.cache.item(1).unwrap();
    assert_eq!(item.nextcheck, NEVER);
    assert_eq!(item.state, ItemState::NotSupported);
    assert!(item.error.contains("{$PING.DELAY}"), "{}", item.error);
    assert_eq!(harness.cache.check_nextcheck(WorkerClass::Agent), None);
    assert!(matches!(
        harness.sink.take().as_slice(),
        [Notification::ItemState {
            itemid: 1,
            state: ItemState::NotSupported,
            ..
        }]
    ));

    let report = harness
        .push(
            TableKind::GlobalMacros,
            [Row::build(TableKind::GlobalMacros, 1)
                .set("macro", "{$PING.DELAY}")
                .set("value", "30s")
                .finish()],
        )
        .sync();
    assert_eq!(report.counts(TableKind::GlobalMacros).added, 1);
    let nextcheck = harness.cache.check_nextcheck(WorkerClass::Agent).unwrap();
    assert!(nextcheck > NOW && nextcheck < NEVER);
    assert!(harness.cache.macro_updates(1).global);
}

#[test]
fn failing_interface_moves_checks_to_unreachable_and_back() {
    let harness = Harness::new();
    harness.with_agent_host("1m").sync();
    let cache = &harness.cache;

    harness.clock.set(FIRST_CHECK);
    assert_eq!(cache.claim_checks(WorkerClass::Agent).unwrap().len(), 1);
    let diff = cache
        .report_interface(
            1,
            InterfaceOutcome::Failed {
                error: "connection refused".into(),
            },
        )
        .unwrap()
        .unwrap();
    assert_eq!(diff.disable_until, FIRST_CHECK + 15);
    cache
        .requeue_checks(&[CheckResult::new(1, CheckOutcome::NetworkError)])
        .unwrap();

    assert_eq!(cache.check_nextcheck(WorkerClass::Agent), None);
    assert_eq!(
        cache.check_nextcheck(WorkerClass::Unreachable),
        Some(FIRST_CHECK + 15)
    );

    harness.clock.set(FIRST_CHECK + 15);
    let claimed = cache.claim_checks(WorkerClass::Unreachable).unwrap();
    assert_eq!(claimed.len(), 1);
    assert!(claimed[0].unreachable);

    cache
        .report_interface(1, InterfaceOutcome::Reached)
        .unwrap()
        .unwrap();
    cache
        .requeue_checks(&[CheckResult::new(1, CheckOutcome::Succeed)])
        .unwrap();

    assert_eq!(cache.check_nextcheck(WorkerClass::Unreachable), None);
    assert_eq!(
        cache.check_nextcheck(WorkerClass::Agent),
        Some(FIRST_CHECK + 60)
    );
    let item = cache.item(1).unwrap();
    assert_eq!(item.worker, Some(WorkerClass::Agent));
    assert!(!item.unreachable);
    assert_eq!(
        cache.interface(1).unwrap().available,
        Availability::Available
    );

    let availability: Vec<_> = harness
        .sink
        .take()
        .into_iter()
        .filter(|notification| matches!(notification, Notification::Availability(_)))
        .collect();
    assert_eq!(availability.len(), 2);
}

#[test]
fn dependency_ranks_and_cycles() {
    let harness = Harness::new();
    let trigger = |triggerid, value| {
        Row::build(TableKind::Triggers, triggerid)
            .set("description", format!("trigger {triggerid}"))
            .set("value", value)
            .finish()
    };
    let depends = |linkid, down: u64, up: u64| {
        Row::build(TableKind::TriggerDepends, linkid)
            .set("triggerid_down", down)
            .set("triggerid_up", up)
            .finish()
    };
    harness
        .push(
            TableKind::Triggers,
            [trigger(10, 1), trigger(11, 0), trigger(12, 0)],
        )
        .push(TableKind::TriggerDepends, [depends(1, 11, 10), depends(2, 12, 11)])
        .sync();

    let cache = &harness.cache;
    let rank = |triggerid| cache.trigger(triggerid).unwrap().topoindex;
    assert_eq!((rank(10), rank(11), rank(12)), (1, 2, 3));

    let none = HashSet::new();
    assert_eq!(cache.check_dependencies(10, &none), DependencyStatus::Ok);
    assert_eq!(cache.check_dependencies(12, &none), DependencyStatus::Fail);
    assert_eq!(
        cache.check_dependencies(11, &HashSet::from([10])),
        DependencyStatus::Unresolved
    );

    let report = harness
        .push(TableKind::TriggerDepends, [depends(3, 10, 12)])
        .sync();
    assert_eq!(report.counts(TableKind::TriggerDepends).added, 1);
    let capped = dccache::topology::MAX_TOPOINDEX;
    assert_eq!((rank(10), rank(11), rank(12)), (capped, capped, capped));
}

#[test]
fn triggers_lock_in_evaluation_order() {
    let harness = Harness::new();
    harness
        .with_agent_host("1m")
        .push(
            TableKind::Triggers,
            [20, 21].map(|triggerid| {
                Row::build(TableKind::Triggers, triggerid)
                    .set("expression", format!("{{{}}}=0", triggerid * 10))
                    .finish()
            }),
        )
        .push(
            TableKind::TriggerDepends,
            [Row::build(TableKind::TriggerDepends, 1)
                .set("triggerid_down", 20)
                .set("triggerid_up", 21)
                .finish()],
        )
        .push(
            TableKind::Functions,
            [200, 210].map(|functionid| {
                Row::build(TableKind::Functions, functionid)
                    .set("itemid", 1)
                    .set("triggerid", functionid / 10)
                    .set("name", "last")
                    .finish()
            }),
        )
        .sync();

    let cache = &harness.cache;
    assert_eq!(cache.trigger(20).unwrap().itemids, vec![1]);
    assert_eq!(cache.lock_triggers_by_history_items(&[1]), vec![21, 20]);
    assert!(cache.lock_triggers_by_history_items(&[1]).is_empty());

    cache.unlock_triggers(&[20]);
    assert_eq!(cache.lock_triggers_by_history_items(&[1]), vec![20]);
    cache.unlock_all_triggers();
    assert!(!cache.trigger(21).unwrap().locked);
}

#[test]
fn item_changes_reach_both_locks() {
    let harness = Harness::new();
    harness.with_agent_host("1m").sync();
    harness.sink.take();

    harness
        .cache
        .apply_item_changes(&[ItemChange {
            itemid: 1,
            state: Some(ItemState::NotSupported),
            error: Some("unknown metric".into()),
            lastclock: Some(NOW),
            lastlogsize: Some(512),
            ..ItemChange::default()
        }])
        .unwrap();

    let item = harness.cache.item(1).unwrap();
    assert_eq!(item.state, ItemState::NotSupported);
    assert_eq!(item.error, "unknown metric");
    let runtime = harness.cache.item_runtime(1).unwrap();
    assert_eq!(runtime.lastclock, NOW);
    assert_eq!(runtime.lastlogsize, 512);
    assert_eq!(harness.sink.take().len(), 1);
}

#[test]
fn changes_for_unknown_items_leave_no_runtime() {
    let harness = Harness::new();
    harness.with_agent_host("1m").sync();
    let before = harness.cache.history(|history| history.len());

    let changes: Vec<_> = (1000..1100)
        .map(|itemid| ItemChange {
            itemid,
            lastclock: Some(NOW),
            ..ItemChange::default()
        })
        .collect();
    harness.cache.apply_item_changes(&changes).unwrap();

    assert_eq!(harness.cache.history(|history| history.len()), before);
    assert!(harness.cache.item_runtime(1000).is_none());
}

#[test]
fn status_is_throttled() {
    let harness = Harness::new();
    harness.with_agent_host("1m").sync();

    let status = harness.cache.refresh_status();
    assert_eq!(status.global.hosts_monitored, 1);
    assert_eq!(status.global.items_active_normal, 1);
    assert_eq!(status.computed_at, NOW);

    harness.clock.advance(10);
    assert_eq!(harness.cache.refresh_status().computed_at, NOW);
    harness.clock.advance(60);
    assert_eq!(harness.cache.refresh_status().computed_at, NOW + 70);
}
