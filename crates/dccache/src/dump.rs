#![forbid(unsafe_code)]

use crate::data::{ConfigData, HistoryData};
use crate::schedule::WorkerClass;
use crate::stores::Table;
use std::fmt::Debug;
use tracing::{info, trace};

fn dump_table<V: Debug>(name: &str, table: &Table<V>) {
    trace!(table = name, rows = table.len(), "table dump start");
    for id in table.sorted_ids() {
        if let Some(row) = table.get(id) {
            trace!(table = name, id, ?row);
        }
    }
}

/// Log the whole cache at trace level and a summary at info level.
pub(crate) fn dump(data: &ConfigData, history: &HistoryData) {
    info!(
        revision = data.revision,
        records = %data.arena.stats(),
        strings = %data.strpool.stats(),
        interned = data.strpool.len(),
        "configuration cache dump"
    );
    trace!(settings = ?data.settings);

    dump_table("hosts", &data.hosts);
    dump_table("host_inventory", &data.inventory);
    dump_table("host_groups", &data.groups);
    dump_table("interfaces", &data.interfaces);
    dump_table("items", &data.items);
    dump_table("item_preproc", &data.preproc);
    dump_table("item_parameters", &data.item_params);
    dump_table("triggers", &data.triggers);
    dump_table("functions", &data.functions);
    dump_table("correlations", &data.correlations);
    dump_table("drules", &data.drules);
    dump_table("dchecks", &data.dchecks);
    dump_table("httptests", &data.httptests);
    dump_table("httpsteps", &data.httpsteps);
    dump_table("proxies", &data.proxies);
    dump_table("proxy_groups", &data.proxy_groups);

    trace!(
        macros = data.macros.len(),
        psk = data.psk.len(),
        host_tags = data.host_tags.len(),
        item_tags = data.item_tags.len(),
        trigger_tags = data.trigger_tags.len(),
        dependencies = data.topology.link_count(),
        "stores"
    );
    for (macroid, user_macro) in data.macros.iter() {
        trace!(
            macroid,
            hostid = user_macro.hostid,
            name = user_macro.name.as_str(),
            context = user_macro.context.as_str(),
            kind = ?user_macro.kind,
            "macro"
        );
    }
    for (store, tags) in [
        ("host", &data.host_tags),
        ("item", &data.item_tags),
        ("trigger", &data.trigger_tags),
    ] {
        for (tagid, tag) in tags.iter() {
            trace!(
                store,
                tagid,
                owner = tag.ownerid,
                tag = tag.tag.as_str(),
                value = tag.value.as_str()
            );
        }
    }
    // keys only, the secrets stay out of the log
    for (identity, owners) in data.psk.iter() {
        trace!(identity, owners, "psk");
    }
    for (text, refcount) in data.strpool.iter() {
        trace!(text, refcount, "interned string");
    }

    for &class in WorkerClass::ALL {
        let queued = data.queues.check_queue_len(class);
        if queued > 0 {
            trace!(
                worker = class.name(),
                queued,
                nextcheck = data.queues.check_nextcheck(class),
                "check queue"
            );
        }
    }
    trace!(
        timers = data.queues.timer_queue_len(),
        nextcheck = data.queues.timer_nextcheck(),
        "timer queue"
    );
    trace!(items = history.len(), "history values");
}
