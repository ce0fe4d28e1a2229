#![forbid(unsafe_code)]

use super::RowReader;
use super::engine::{Applied, ApplyResult, Pass, relink_psk};
use super::{discovery, interfaces, items};
use crate::domain::{
    Host, HostGroup, HostGroupLink, HostInventory, HostStatus, INVENTORY_FIELDS, InventoryMode,
    Maintenance, MaintenanceStatus, MaintenanceType, MonitoredBy, TlsAccept, TlsConnect, update,
};
use crate::notify::Notification;
use tracing::{debug, error};

pub(super) fn upsert_host(pass: &mut Pass<'_>, row: &RowReader<'_>) -> ApplyResult {
    let hostid = row.id();
    let name = row.str("host")?;
    let visible_name = row.str("name")?;
    let status = row.code("status", HostStatus::from_code)?;
    let monitored_by = row.code("monitored_by", MonitoredBy::from_code)?;
    let proxyid = row.u64("proxyid")?;
    let proxy_groupid = row.u64("proxy_groupid")?;
    let maintenance = Maintenance {
        maintenanceid: row.u64("maintenanceid")?,
        status: row.code("maintenance_status", MaintenanceStatus::from_code)?,
        kind: row.code("maintenance_type", MaintenanceType::from_code)?,
        from: row.i64("maintenance_from")?,
    };
    let tls_connect = row.code("tls_connect", TlsConnect::from_code)?;
    let tls_accept = TlsAccept::from_bits_truncate(row.u8("tls_accept")?);
    let tls_issuer = row.str("tls_issuer")?;
    let tls_subject = row.str("tls_subject")?;
    let psk_identity = row.str("tls_psk_identity")?;
    let psk = row.str("tls_psk")?;

    let data = &mut *pass.data;
    let touched = &mut pass.touched;
    let (host, found) = data.hosts.insert_with(hostid, || Host::new(hostid))?;
    let pool = &mut data.strpool;
    let mut changed = !found;

    if !found || host.host.as_str() != name {
        data.hosts_by_name.remove(pool, host.host.as_str(), hostid);
        pool.replace(found, &mut host.host, name)?;
        if let Some(owner) = data.hosts_by_name.insert(pool, &host.host, hostid) {
            error!(hostid, owner, host = name, "host name already in use");
        }
        changed = true;
    }
    changed |= pool.replace(found, &mut host.name, visible_name)?;

    if update(&mut host.status, status) {
        changed = true;
        touched.requeue_items.extend(host.itemids.iter().copied());
        touched.httptests.extend(host.httptestids.iter().copied());
        touched.triggers_dirty = true;
    }

    changed |= update(&mut host.monitored_by, monitored_by);
    let proxyid = match monitored_by {
        MonitoredBy::Server => 0,
        MonitoredBy::Proxy => proxyid,
        // assigned by the balancer through host_proxy rows
        MonitoredBy::ProxyGroup => host.proxyid,
    };
    let proxy_groupid = match monitored_by {
        MonitoredBy::ProxyGroup => proxy_groupid,
        MonitoredBy::Server | MonitoredBy::Proxy => 0,
    };
    changed |= update(&mut host.proxy_groupid, proxy_groupid);
    let previous_proxy = host.proxyid;
    if update(&mut host.proxyid, proxyid) {
        changed = true;
        touched.requeue_items.extend(host.itemids.iter().copied());
        touched.httptests.extend(host.httptestids.iter().copied());
        touched.proxy_hosts_dirty = true;
        if previous_proxy != 0 {
            touched.proxies.insert(previous_proxy);
        }
    }

    if host.maintenance.suppresses_data() != maintenance.suppresses_data() {
        touched.requeue_items.extend(host.itemids.iter().copied());
    }
    changed |= update(&mut host.maintenance, maintenance);

    changed |= update(&mut host.tls.connect, tls_connect);
    changed |= update(&mut host.tls.accept, tls_accept);
    changed |= pool.replace_opt(found, &mut host.tls.issuer, tls_issuer)?;
    changed |= pool.replace_opt(found, &mut host.tls.subject, tls_subject)?;
    changed |= relink_psk(
        &mut data.psk,
        pool,
        &mut host.tls.psk_identity,
        psk_identity,
        psk,
    )?;

    if changed {
        host.revision = pass.target;
        if host.is_proxied() {
            touched.proxies.insert(host.proxyid);
        }
        debug!(hostid, host = name, revision = pass.target, "host updated");
    }
    if !found {
        touched.proxy_hosts_dirty |= host.is_proxied();
    }
    Ok(Applied::from_change(found, changed))
}

/// Remove a host with everything it owns.
pub(super) fn remove_host(pass: &mut Pass<'_>, hostid: u64) -> bool {
    let Some(mut host) = pass.data.hosts.remove(hostid) else {
        return false;
    };

    for itemid in &host.itemids {
        items::remove_item(pass, *itemid);
    }
    for interfaceid in &host.interfaceids {
        interfaces::remove_interface(pass, *interfaceid);
    }
    for httptestid in &host.httptestids {
        discovery::remove_httptest(pass, *httptestid);
    }
    remove_inventory(pass, hostid);

    let data = &mut *pass.data;
    let pool = &mut data.strpool;
    data.host_tags.remove_owner(pool, hostid);
    let macroids: Vec<u64> = data.macros.for_host(hostid).map(|m| m.macroid).collect();
    for macroid in macroids {
        data.macros.remove(pool, macroid);
    }
    data.macro_revisions.remove(&hostid);
    for groupid in &host.groupids {
        if let Some(group) = data.groups.get_mut(*groupid) {
            group.hostids.remove(&hostid);
            group.revision = pass.target;
        }
    }
    data.host_groups.retain(|_, link| link.hostid != hostid);
    data.host_proxy.retain(|_, assignment| assignment.hostid != hostid);
    if let Some(mut index) = data.items_by_key.remove(&hostid) {
        index.clear(pool);
    }

    data.hosts_by_name.remove(pool, host.host.as_str(), hostid);
    let identity = std::mem::take(&mut host.tls.psk_identity);
    data.psk.unlink(pool, identity);
    if host.is_proxied() {
        pass.touched.proxy_hosts_dirty = true;
    }
    pass.touched.hosts.remove(&hostid);
    debug!(hostid, host = %host.host, "host removed");
    pool.release_all(host.into_handles());
    true
}

pub(super) fn upsert_inventory(pass: &mut Pass<'_>, row: &RowReader<'_>) -> ApplyResult {
    let hostid = row.id();
    let mode = row.code("inventory_mode", InventoryMode::from_code)?;
    if !pass.data.hosts.contains(hostid) {
        return Ok(Applied::Skipped);
    }

    let data = &mut *pass.data;
    let (inventory, found) = data
        .inventory
        .insert_with(hostid, || HostInventory::new(hostid))?;
    let mut changed = update(&mut inventory.mode, mode);
    for (slot, field) in inventory.values.iter_mut().zip(INVENTORY_FIELDS) {
        changed |= data.strpool.replace_opt(found, slot, row.str(field)?)?;
    }
    if changed || !found {
        pass.touched.hosts.insert(hostid);
    }
    Ok(Applied::from_change(found, changed))
}

pub(super) fn remove_inventory(pass: &mut Pass<'_>, hostid: u64) -> bool {
    let data = &mut *pass.data;
    let Some(inventory) = data.inventory.remove(hostid) else {
        return false;
    };
    data.strpool.release_all(inventory.values);
    pass.touched.hosts.insert(hostid);
    true
}

pub(super) fn upsert_group(pass: &mut Pass<'_>, row: &RowReader<'_>) -> ApplyResult {
    let groupid = row.id();
    let name = row.str("name")?;

    let data = &mut *pass.data;
    let (group, found) = data.groups.insert_with(groupid, || HostGroup::new(groupid))?;
    let pool = &mut data.strpool;
    let mut changed = false;
    if !found || group.name.as_str() != name {
        data.groups_by_name.remove(pool, group.name.as_str(), groupid);
        changed = pool.replace(found, &mut group.name, name)?;
        if let Some(owner) = data.groups_by_name.insert(pool, &group.name, groupid) {
            error!(groupid, owner, name, "host group name already in use");
        }
    }
    if changed {
        group.revision = pass.target;
    }
    Ok(Applied::from_change(found, changed))
}

pub(super) fn remove_group(pass: &mut Pass<'_>, groupid: u64) -> bool {
    let data = &mut *pass.data;
    let Some(group) = data.groups.remove(groupid) else {
        return false;
    };
    for hostid in &group.hostids {
        if let Some(host) = data.hosts.get_mut(*hostid) {
            host.groupids.remove(&groupid);
            pass.touched.hosts.insert(*hostid);
        }
    }
    data.host_groups.retain(|_, link| link.groupid != groupid);
    data.groups_by_name
        .remove(&mut data.strpool, group.name.as_str(), groupid);
    data.strpool.release(group.name);
    true
}

pub(super) fn upsert_group_link(pass: &mut Pass<'_>, row: &RowReader<'_>) -> ApplyResult {
    let linkid = row.id();
    let link = HostGroupLink {
        hostid: row.u64("hostid")?,
        groupid: row.u64("groupid")?,
    };
    if !pass.data.hosts.contains(link.hostid) || !pass.data.groups.contains(link.groupid) {
        return Ok(Applied::Skipped);
    }

    let previous = pass.data.host_groups.insert(linkid, link);
    if previous == Some(link) {
        return Ok(Applied::Unchanged);
    }
    if let Some(previous) = previous {
        unlink_group(pass, previous);
    }
    let data = &mut *pass.data;
    if let Some(host) = data.hosts.get_mut(link.hostid) {
        host.groupids.insert(link.groupid);
    }
    if let Some(group) = data.groups.get_mut(link.groupid) {
        group.hostids.insert(link.hostid);
        group.revision = pass.target;
    }
    pass.touched.hosts.insert(link.hostid);
    Ok(Applied::from_change(previous.is_some(), true))
}

pub(super) fn remove_group_link(pass: &mut Pass<'_>, linkid: u64) -> bool {
    match pass.data.host_groups.remove(&linkid) {
        Some(link) => {
            unlink_group(pass, link);
            true
        }
        None => false,
    }
}

fn unlink_group(pass: &mut Pass<'_>, link: HostGroupLink) {
    let data = &mut *pass.data;
    // another link row may still tie the same pair
    if data.host_groups.values().any(|other| *other == link) {
        return;
    }
    if let Some(host) = data.hosts.get_mut(link.hostid) {
        host.groupids.remove(&link.groupid);
    }
    if let Some(group) = data.groups.get_mut(link.groupid) {
        group.hostids.remove(&link.hostid);
        group.revision = pass.target;
    }
    pass.touched.hosts.insert(link.hostid);
}

pub(super) fn upsert_tag(pass: &mut Pass<'_>, row: &RowReader<'_>) -> ApplyResult {
    let hostid = row.u64("hostid")?;
    let tag = row.str("tag")?;
    let value = row.str("value")?;
    if !pass.data.hosts.contains(hostid) {
        return Ok(Applied::Skipped);
    }

    let data = &mut *pass.data;
    let found = data.host_tags.for_owner(hostid).any(|t| t.tagid == row.id());
    let change = data
        .host_tags
        .upsert(&mut data.strpool, row.id(), hostid, tag, value)?;
    if change.changed {
        pass.touched.hosts.insert(hostid);
    }
    if let Some(previous) = change.previous_owner {
        pass.touched.hosts.insert(previous);
    }
    let found = found || change.previous_owner.is_some();
    Ok(Applied::from_change(found, change.changed))
}

pub(super) fn remove_tag(pass: &mut Pass<'_>, tagid: u64) -> bool {
    let data = &mut *pass.data;
    match data.host_tags.remove(&mut data.strpool, tagid) {
        Some(hostid) => {
            pass.touched.hosts.insert(hostid);
            true
        }
        None => false,
    }
}

/// Emit a relocation notice when the balancer moves a host between proxies.
pub(super) fn relocate(pass: &mut Pass<'_>, hostid: u64, proxyid: u64) -> bool {
    let data = &mut *pass.data;
    let Some(host) = data.hosts.get_mut(hostid) else {
        return false;
    };
    if host.monitored_by != MonitoredBy::ProxyGroup {
        debug!(hostid, proxyid, "proxy assignment of a host not monitored by a group ignored");
        return false;
    }
    let from = host.proxyid;
    if !update(&mut host.proxyid, proxyid) {
        return false;
    }
    host.revision = pass.target;
    pass.touched.requeue_items.extend(host.itemids.iter().copied());
    pass.touched.httptests.extend(host.httptestids.iter().copied());
    pass.touched.proxy_hosts_dirty = true;
    pass.touched.proxies.extend([from, proxyid].into_iter().filter(|id| *id != 0));
    data.notifications.push(Notification::ProxyRelocated {
        hostid,
        from,
        to: proxyid,
    });
    true
}
