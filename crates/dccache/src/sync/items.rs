#![forbid(unsafe_code)]

use super::RowReader;
use super::engine::{Applied, ApplyError, ApplyResult, Pass};
use crate::domain::{
    CheckParams, CheckType, Credentials, Item, ItemDiscovery, ItemFlags, ItemParam, ItemState,
    PreprocStep, Status, ValueType, update,
};
use crate::schedule;
use crate::strpool::StringPool;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, error};

fn fill_credentials(
    pool: &mut StringPool,
    found: bool,
    credentials: &mut Credentials,
    row: &RowReader<'_>,
) -> Result<bool, ApplyError> {
    let mut changed = pool.replace_opt(found, &mut credentials.username, row.str("username")?)?;
    changed |= pool.replace_opt(found, &mut credentials.password, row.str("password")?)?;
    Ok(changed)
}

/// Copy the type specific columns of `row` into `params`.
fn fill_params(
    pool: &mut StringPool,
    found: bool,
    params: &mut CheckParams,
    row: &RowReader<'_>,
) -> Result<bool, ApplyError> {
    let mut changed = false;
    match params {
        CheckParams::None => {}
        CheckParams::Snmp { oid } => changed |= pool.replace(found, oid, row.str("snmp_oid")?)?,
        CheckParams::Ipmi { sensor } => {
            changed |= pool.replace(found, sensor, row.str("ipmi_sensor")?)?
        }
        CheckParams::Trapper { allowed_hosts } => {
            changed |= pool.replace_opt(found, allowed_hosts, row.str("trapper_hosts")?)?
        }
        CheckParams::Simple(credentials) => {
            changed |= fill_credentials(pool, found, credentials, row)?
        }
        CheckParams::DbMonitor {
            query: text,
            credentials,
        }
        | CheckParams::Telnet {
            script: text,
            credentials,
        } => {
            changed |= pool.replace(found, text, row.str("params")?)?;
            changed |= fill_credentials(pool, found, credentials, row)?;
        }
        CheckParams::Jmx {
            endpoint,
            credentials,
        } => {
            changed |= pool.replace(found, endpoint, row.str("jmx_endpoint")?)?;
            changed |= fill_credentials(pool, found, credentials, row)?;
        }
        CheckParams::Ssh(ssh) => {
            changed |= update(&mut ssh.authtype, row.u8("authtype")?);
            changed |= fill_credentials(pool, found, &mut ssh.credentials, row)?;
            changed |= pool.replace_opt(found, &mut ssh.publickey, row.str("publickey")?)?;
            changed |= pool.replace_opt(found, &mut ssh.privatekey, row.str("privatekey")?)?;
            changed |= pool.replace(found, &mut ssh.params, row.str("params")?)?;
        }
        CheckParams::Calculated { formula: text }
        | CheckParams::Script { script: text }
        | CheckParams::Browser { script: text } => {
            changed |= pool.replace(found, text, row.str("params")?)?
        }
        CheckParams::HttpAgent(http) => {
            changed |= pool.replace(found, &mut http.url, row.str("url")?)?;
            changed |= pool.replace_opt(found, &mut http.query_fields, row.str("query_fields")?)?;
            changed |= pool.replace_opt(found, &mut http.posts, row.str("posts")?)?;
            changed |= pool.replace_opt(found, &mut http.status_codes, row.str("status_codes")?)?;
            changed |= pool.replace_opt(found, &mut http.http_proxy, row.str("http_proxy")?)?;
            changed |= pool.replace_opt(found, &mut http.headers, row.str("headers")?)?;
            changed |=
                pool.replace_opt(found, &mut http.ssl_cert_file, row.str("ssl_cert_file")?)?;
            changed |= pool.replace_opt(found, &mut http.ssl_key_file, row.str("ssl_key_file")?)?;
            changed |= pool.replace_opt(
                found,
                &mut http.ssl_key_password,
                row.str("ssl_key_password")?,
            )?;
            changed |=
                pool.replace_opt(found, &mut http.trapper_hosts, row.str("trapper_hosts")?)?;
            changed |= fill_credentials(pool, found, &mut http.credentials, row)?;
            changed |= update(&mut http.authtype, row.u8("authtype")?);
            changed |= update(&mut http.follow_redirects, row.bool("follow_redirects")?);
            changed |= update(&mut http.post_type, row.u8("post_type")?);
            changed |= update(&mut http.retrieve_mode, row.u8("retrieve_mode")?);
            changed |= update(&mut http.request_method, row.u8("request_method")?);
            changed |= update(&mut http.output_format, row.u8("output_format")?);
            changed |= update(&mut http.verify_peer, row.bool("verify_peer")?);
            changed |= update(&mut http.verify_host, row.bool("verify_host")?);
            changed |= update(&mut http.allow_traps, row.bool("allow_traps")?);
        }
    }
    Ok(changed)
}

pub(super) fn upsert_item(pass: &mut Pass<'_>, row: &RowReader<'_>) -> ApplyResult {
    let itemid = row.id();
    let hostid = row.u64("hostid")?;
    let interfaceid = row.u64("interfaceid")?;
    let key = row.str("key_")?;
    let check_type = row.code("type", CheckType::from_code)?;
    let value_type = row.code("value_type", ValueType::from_code)?;
    let status = row.code("status", Status::from_code)?;
    let state = row.code("state", ItemState::from_code)?;
    let error = row.str("error")?;
    let delay = row.str("delay")?;
    let timeout = row.str("timeout")?;
    let flags = row.code("flags", ItemFlags::from_code)?;
    let master_itemid = row.u64("master_itemid")?;
    if !pass.data.hosts.contains(hostid) {
        return Ok(Applied::Skipped);
    }
    pass.history.items.entry(itemid).or_default();

    let data = &mut *pass.data;
    let touched = &mut pass.touched;
    let (item, found) = data.items.insert_with(itemid, || Item::new(itemid))?;
    let pool = &mut data.strpool;
    let mut changed = !found;
    let mut reschedule = !found;

    let previous_host = item.hostid;
    if found && previous_host != hostid {
        if let Some(index) = data.items_by_key.get_mut(&previous_host) {
            index.remove(pool, item.key.as_str(), itemid);
        }
        if let Some(host) = data.hosts.get_mut(previous_host) {
            host.itemids.remove(&itemid);
        }
        touched.hosts.insert(previous_host);
        changed = true;
        reschedule = true;
    }
    item.hostid = hostid;
    if let Some(host) = data.hosts.get_mut(hostid) {
        host.itemids.insert(itemid);
    }

    if previous_host != hostid || item.key.as_str() != key || !found {
        if let Some(index) = data.items_by_key.get_mut(&hostid) {
            index.remove(pool, item.key.as_str(), itemid);
        }
        pool.replace(found, &mut item.key, key)?;
        let index = data.items_by_key.entry(hostid).or_default();
        if let Some(owner) = index.insert(pool, &item.key, itemid) {
            error!(itemid, owner, hostid, key, "item key already in use on host");
        }
        changed = true;
        reschedule = true;
    }

    if item.interfaceid != interfaceid {
        if let Some(interface) = data.interfaces.get_mut(item.interfaceid) {
            interface.itemids.remove(&itemid);
        }
        item.interfaceid = interfaceid;
        changed = true;
        reschedule = true;
    }
    if let Some(interface) = data.interfaces.get_mut(interfaceid) {
        interface.itemids.insert(itemid);
    }

    if update(&mut item.check_type, check_type) || !found {
        let previous = std::mem::replace(&mut item.params, CheckParams::for_type(check_type));
        pool.release_all(previous.into_handles());
        changed = true;
        reschedule = true;
    }
    changed |= fill_params(pool, found, &mut item.params, row)?;

    changed |= update(&mut item.value_type, value_type);
    if update(&mut item.status, status) {
        changed = true;
        reschedule = true;
        touched.triggers_dirty = true;
    }
    if update(&mut item.flags, flags) {
        changed = true;
        reschedule = true;
    }
    // state and error are owned by the pollers once the item is cached
    if !found {
        item.state = state;
        pool.replace_opt(false, &mut item.error, error)?;
    }
    if pool.replace(found, &mut item.delay, delay)? {
        changed = true;
        reschedule = true;
    }
    changed |= pool.replace_opt(found, &mut item.timeout, timeout)?;

    if (found && item.master_itemid != master_itemid) || (!found && master_itemid != 0) {
        touched
            .master_moves
            .push((itemid, item.master_itemid, master_itemid));
        item.master_itemid = master_itemid;
        changed = true;
    }

    if changed {
        item.revision = pass.target;
        touched.hosts.insert(hostid);
    }
    if reschedule {
        touched.requeue_items.insert(itemid);
    }
    if !found {
        touched.triggers_dirty = true;
    }
    Ok(Applied::from_change(found, changed))
}

/// Remove a check with its steps, parameters, tags and queue entry.
pub(super) fn remove_item(pass: &mut Pass<'_>, itemid: u64) -> bool {
    let data = &mut *pass.data;
    let touched = &mut pass.touched;
    let Some(item) = data.items.remove(itemid) else {
        return false;
    };
    let pool = &mut data.strpool;

    schedule::dequeue_item(&mut data.queues, itemid, &item.schedule);
    if let Some(index) = data.items_by_key.get_mut(&item.hostid) {
        index.remove(pool, item.key.as_str(), itemid);
    }
    if let Some(host) = data.hosts.get_mut(item.hostid) {
        host.itemids.remove(&itemid);
        touched.hosts.insert(item.hostid);
    }
    if let Some(interface) = data.interfaces.get_mut(item.interfaceid) {
        interface.itemids.remove(&itemid);
    }
    if item.master_itemid != 0 {
        touched.master_moves.push((itemid, item.master_itemid, 0));
    }
    data.masteritems.remove(&itemid);

    for preprocid in data.preproc_by_item.remove(&itemid).unwrap_or_default() {
        if let Some(step) = data.preproc.remove(preprocid) {
            pool.release_all([step.params, step.error_handler_params]);
        }
    }
    for paramid in data.params_by_item.remove(&itemid).unwrap_or_default() {
        if let Some(param) = data.item_params.remove(paramid) {
            pool.release_all([param.name, param.value]);
        }
    }
    data.item_tags.remove_owner(pool, itemid);
    data.item_discovery.retain(|_, link| link.itemid != itemid);
    pass.history.items.remove(&itemid);

    touched.items.remove(&itemid);
    touched.requeue_items.remove(&itemid);
    touched.triggers_dirty = true;
    debug!(itemid, key = %item.key, "item removed");
    pool.release_all(item.into_handles());
    true
}

pub(super) fn upsert_discovery(pass: &mut Pass<'_>, row: &RowReader<'_>) -> ApplyResult {
    let link = ItemDiscovery {
        itemid: row.u64("itemid")?,
        parent_itemid: row.u64("parent_itemid")?,
    };
    if !pass.data.items.contains(link.itemid) {
        return Ok(Applied::Skipped);
    }
    let previous = pass.data.item_discovery.insert(row.id(), link);
    if previous == Some(link) {
        return Ok(Applied::Unchanged);
    }
    if let Some(previous) = previous {
        pass.touched.items.insert(previous.itemid);
    }
    pass.touched.items.insert(link.itemid);
    Ok(Applied::from_change(previous.is_some(), true))
}

pub(super) fn remove_discovery(pass: &mut Pass<'_>, id: u64) -> bool {
    match pass.data.item_discovery.remove(&id) {
        Some(link) => {
            pass.touched.items.insert(link.itemid);
            true
        }
        None => false,
    }
}

/// Move `childid` between the per item sets of `index`.
fn reindex(
    index: &mut HashMap<u64, BTreeSet<u64>>,
    childid: u64,
    from: u64,
    to: u64,
) {
    if let Some(children) = index.get_mut(&from) {
        children.remove(&childid);
        if children.is_empty() {
            index.remove(&from);
        }
    }
    index.entry(to).or_default().insert(childid);
}

pub(super) fn upsert_preproc(pass: &mut Pass<'_>, row: &RowReader<'_>) -> ApplyResult {
    let preprocid = row.id();
    let itemid = row.u64("itemid")?;
    let step = row.u32("step")?;
    let kind = row.u8("type")?;
    let params = row.str("params")?;
    let error_handler = row.u8("error_handler")?;
    let error_handler_params = row.str("error_handler_params")?;
    if !pass.data.items.contains(itemid) {
        return Ok(Applied::Skipped);
    }

    let data = &mut *pass.data;
    let (record, found) = data
        .preproc
        .insert_with(preprocid, || PreprocStep::new(preprocid))?;
    let pool = &mut data.strpool;
    let mut changed = !found;
    if record.itemid != itemid {
        if found {
            pass.touched.items.insert(record.itemid);
        }
        reindex(&mut data.preproc_by_item, preprocid, record.itemid, itemid);
        record.itemid = itemid;
        changed = true;
    }
    changed |= update(&mut record.step, step);
    changed |= update(&mut record.kind, kind);
    changed |= pool.replace(found, &mut record.params, params)?;
    changed |= update(&mut record.error_handler, error_handler);
    changed |= pool.replace_opt(found, &mut record.error_handler_params, error_handler_params)?;
    if changed {
        pass.touched.items.insert(itemid);
    }
    Ok(Applied::from_change(found, changed))
}

pub(super) fn remove_preproc(pass: &mut Pass<'_>, preprocid: u64) -> bool {
    let data = &mut *pass.data;
    let Some(step) = data.preproc.remove(preprocid) else {
        return false;
    };
    if let Some(steps) = data.preproc_by_item.get_mut(&step.itemid) {
        steps.remove(&preprocid);
    }
    pass.touched.items.insert(step.itemid);
    data.strpool.release_all([step.params, step.error_handler_params]);
    true
}

pub(super) fn upsert_param(pass: &mut Pass<'_>, row: &RowReader<'_>) -> ApplyResult {
    let paramid = row.id();
    let itemid = row.u64("itemid")?;
    let name = row.str("name")?;
    let value = row.str("value")?;
    if !pass.data.items.contains(itemid) {
        return Ok(Applied::Skipped);
    }

    let data = &mut *pass.data;
    let (param, found) = data
        .item_params
        .insert_with(paramid, || ItemParam::new(paramid))?;
    let pool = &mut data.strpool;
    let mut changed = !found;
    if param.itemid != itemid {
        if found {
            pass.touched.items.insert(param.itemid);
        }
        reindex(&mut data.params_by_item, paramid, param.itemid, itemid);
        param.itemid = itemid;
        changed = true;
    }
    changed |= pool.replace(found, &mut param.name, name)?;
    changed |= pool.replace(found, &mut param.value, value)?;
    if changed {
        pass.touched.items.insert(itemid);
    }
    Ok(Applied::from_change(found, changed))
}

pub(super) fn remove_param(pass: &mut Pass<'_>, paramid: u64) -> bool {
    let data = &mut *pass.data;
    let Some(param) = data.item_params.remove(paramid) else {
        return false;
    };
    if let Some(params) = data.params_by_item.get_mut(&param.itemid) {
        params.remove(&paramid);
    }
    pass.touched.items.insert(param.itemid);
    data.strpool.release_all([param.name, param.value]);
    true
}

pub(super) fn upsert_tag(pass: &mut Pass<'_>, row: &RowReader<'_>) -> ApplyResult {
    let itemid = row.u64("itemid")?;
    let tag = row.str("tag")?;
    let value = row.str("value")?;
    if !pass.data.items.contains(itemid) {
        return Ok(Applied::Skipped);
    }

    let data = &mut *pass.data;
    let found = data.item_tags.for_owner(itemid).any(|t| t.tagid == row.id());
    let change = data
        .item_tags
        .upsert(&mut data.strpool, row.id(), itemid, tag, value)?;
    if change.changed {
        pass.touched.items.insert(itemid);
    }
    if let Some(previous) = change.previous_owner {
        pass.touched.items.insert(previous);
    }
    let found = found || change.previous_owner.is_some();
    Ok(Applied::from_change(found, change.changed))
}

pub(super) fn remove_tag(pass: &mut Pass<'_>, tagid: u64) -> bool {
    let data = &mut *pass.data;
    match data.item_tags.remove(&mut data.strpool, tagid) {
        Some(itemid) => {
            pass.touched.items.insert(itemid);
            true
        }
        None => false,
    }
}
