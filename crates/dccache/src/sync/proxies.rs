#![forbid(unsafe_code)]

use super::RowReader;
use super::engine::{Applied, ApplyResult, Pass, relink_psk};
use super::hosts;
use crate::domain::{
    HostProxy, MonitoredBy, Proxy, ProxyGroup, ProxyMode, TlsAccept, TlsConnect, update,
};
use tracing::{debug, error};

pub(super) fn upsert_proxy(pass: &mut Pass<'_>, row: &RowReader<'_>) -> ApplyResult {
    let proxyid = row.id();
    let name = row.str("name")?;
    let mode = row.code("operating_mode", ProxyMode::from_code)?;
    let address = row.str("address")?;
    let port = row.str("port")?;
    let allowed_addresses = row.str("allowed_addresses")?;
    let tls_connect = row.code("tls_connect", TlsConnect::from_code)?;
    let tls_accept = TlsAccept::from_bits_truncate(row.u8("tls_accept")?);
    let tls_issuer = row.str("tls_issuer")?;
    let tls_subject = row.str("tls_subject")?;
    let psk_identity = row.str("tls_psk_identity")?;
    let psk = row.str("tls_psk")?;
    let proxy_groupid = row.u64("proxy_groupid")?;
    let lastaccess = row.i64("lastaccess")?;
    let version = row.u32("version")?;

    let data = &mut *pass.data;
    let touched = &mut pass.touched;
    let (proxy, found) = data.proxies.insert_with(proxyid, || Proxy::new(proxyid))?;
    let pool = &mut data.strpool;
    let mut changed = !found;

    if !found || proxy.name.as_str() != name {
        data.proxies_by_name.remove(pool, proxy.name.as_str(), proxyid);
        pool.replace(found, &mut proxy.name, name)?;
        if let Some(owner) = data.proxies_by_name.insert(pool, &proxy.name, proxyid) {
            error!(proxyid, owner, proxy = name, "proxy name already in use");
        }
        changed = true;
    }
    if update(&mut proxy.mode, mode) {
        changed = true;
        touched.proxy_queue.insert(proxyid);
    }
    changed |= pool.replace_opt(found, &mut proxy.address, address)?;
    changed |= pool.replace_opt(found, &mut proxy.port, port)?;
    changed |= pool.replace_opt(found, &mut proxy.allowed_addresses, allowed_addresses)?;
    changed |= update(&mut proxy.tls.connect, tls_connect);
    changed |= update(&mut proxy.tls.accept, tls_accept);
    changed |= pool.replace_opt(found, &mut proxy.tls.issuer, tls_issuer)?;
    changed |= pool.replace_opt(found, &mut proxy.tls.subject, tls_subject)?;
    changed |= relink_psk(
        &mut data.psk,
        pool,
        &mut proxy.tls.psk_identity,
        psk_identity,
        psk,
    )?;
    if update(&mut proxy.proxy_groupid, proxy_groupid) {
        changed = true;
        touched.proxy_groups_dirty = true;
    }

    // runtime values reported by the proxy itself, not a configuration change
    proxy.lastaccess = proxy.lastaccess.max(lastaccess);
    proxy.version = version;

    if !found {
        touched.proxy_queue.insert(proxyid);
        touched.proxy_hosts_dirty = true;
    }
    if changed {
        touched.proxies.insert(proxyid);
        debug!(proxyid, proxy = name, revision = pass.target, "proxy updated");
    }
    Ok(Applied::from_change(found, changed))
}

pub(super) fn remove_proxy(pass: &mut Pass<'_>, proxyid: u64) -> bool {
    let data = &mut *pass.data;
    let Some(mut proxy) = data.proxies.remove(proxyid) else {
        return false;
    };
    let pool = &mut data.strpool;
    data.proxies_by_name.remove(pool, proxy.name.as_str(), proxyid);
    let identity = std::mem::take(&mut proxy.tls.psk_identity);
    data.psk.unlink(pool, identity);
    if proxy.proxy_groupid != 0 {
        pass.touched.proxy_groups_dirty = true;
    }
    pass.touched.proxies.remove(&proxyid);
    pass.touched.proxy_queue.insert(proxyid);
    debug!(proxyid, proxy = %proxy.name, "proxy removed");
    pool.release_all(proxy.into_handles());
    true
}

pub(super) fn upsert_group(pass: &mut Pass<'_>, row: &RowReader<'_>) -> ApplyResult {
    let groupid = row.id();
    let name = row.str("name")?;
    let failover_delay = row.str("failover_delay")?;
    let min_online = row.str("min_online")?;

    let data = &mut *pass.data;
    let (group, found) = data
        .proxy_groups
        .insert_with(groupid, || ProxyGroup::new(groupid))?;
    let pool = &mut data.strpool;
    let mut changed = !found;
    changed |= pool.replace(found, &mut group.name, name)?;
    changed |= pool.replace(found, &mut group.failover_delay, failover_delay)?;
    changed |= pool.replace(found, &mut group.min_online, min_online)?;
    if changed {
        group.revision = pass.target;
    }
    if !found {
        pass.touched.proxy_groups_dirty = true;
    }
    Ok(Applied::from_change(found, changed))
}

pub(super) fn remove_group(pass: &mut Pass<'_>, groupid: u64) -> bool {
    let data = &mut *pass.data;
    let Some(group) = data.proxy_groups.remove(groupid) else {
        return false;
    };
    data.strpool
        .release_all([group.name, group.failover_delay, group.min_online]);
    true
}

pub(super) fn upsert_host_proxy(pass: &mut Pass<'_>, row: &RowReader<'_>) -> ApplyResult {
    let hostproxyid = row.id();
    let hostid = row.u64("hostid")?;
    let proxyid = row.u64("proxyid")?;
    let revision = row.u64("revision")?;
    if !pass.data.hosts.contains(hostid) {
        return Ok(Applied::Skipped);
    }

    let assignment = HostProxy {
        hostid,
        proxyid,
        revision,
    };
    let previous = pass.data.host_proxy.insert(hostproxyid, assignment);
    if previous == Some(assignment) {
        return Ok(Applied::Unchanged);
    }
    if let Some(previous) = previous
        && previous.hostid != hostid
    {
        release_host(pass, previous);
    }
    hosts::relocate(pass, hostid, proxyid);
    Ok(Applied::from_change(previous.is_some(), true))
}

pub(super) fn remove_host_proxy(pass: &mut Pass<'_>, hostproxyid: u64) -> bool {
    let Some(assignment) = pass.data.host_proxy.remove(&hostproxyid) else {
        return false;
    };
    release_host(pass, assignment);
    true
}

/// Detach a group monitored host from the proxy the balancer had chosen.
fn release_host(pass: &mut Pass<'_>, assignment: HostProxy) {
    let still_assigned = pass
        .data
        .hosts
        .get(assignment.hostid)
        .is_some_and(|host| {
            host.monitored_by == MonitoredBy::ProxyGroup && host.proxyid == assignment.proxyid
        });
    if still_assigned {
        hosts::relocate(pass, assignment.hostid, 0);
    }
}
