#![forbid(unsafe_code)]

use super::RowReader;
use super::engine::{Applied, ApplyResult, Pass};
use crate::domain::{Availability, Interface, InterfaceType, SnmpDetails, SnmpVersion, update};
use std::collections::{BTreeSet, HashMap};

pub(super) fn upsert_interface(pass: &mut Pass<'_>, row: &RowReader<'_>) -> ApplyResult {
    let interfaceid = row.id();
    let hostid = row.u64("hostid")?;
    let kind = row.code("type", InterfaceType::from_code)?;
    let main = row.bool("main")?;
    let useip = row.bool("useip")?;
    let ip = row.str("ip")?;
    let dns = row.str("dns")?;
    let port = row.str("port")?;
    let available = row.code("available", Availability::from_code)?;
    let error = row.str("error")?;
    let errors_from = row.i64("errors_from")?;
    let disable_until = row.i64("disable_until")?;
    if !pass.data.hosts.contains(hostid) {
        return Ok(Applied::Skipped);
    }

    let data = &mut *pass.data;
    let (interface, found) = data
        .interfaces
        .insert_with(interfaceid, || Interface::new(interfaceid))?;
    let pool = &mut data.strpool;

    if found {
        unindex(
            &mut data.main_interfaces,
            &mut data.snmp_by_addr,
            interface,
        );
    }
    let mut changed = !found;
    let previous_host = interface.hostid;
    if update(&mut interface.hostid, hostid) && found {
        if let Some(host) = data.hosts.get_mut(previous_host) {
            host.interfaceids.remove(&interfaceid);
        }
        pass.touched.hosts.insert(previous_host);
        pass.touched.requeue_items.extend(interface.itemids.iter().copied());
        changed = true;
    }
    changed |= update(&mut interface.kind, kind);
    changed |= update(&mut interface.main, main);
    changed |= update(&mut interface.useip, useip);
    changed |= pool.replace(found, &mut interface.ip, ip)?;
    changed |= pool.replace(found, &mut interface.dns, dns)?;
    changed |= pool.replace(found, &mut interface.port, port)?;

    // availability is owned by the pollers once the interface is cached
    if !found {
        let availability = &mut interface.availability;
        availability.available = available;
        availability.errors_from = errors_from;
        availability.disable_until = disable_until;
        pool.replace_opt(false, &mut availability.error, error)?;
    }

    index(&mut data.main_interfaces, &mut data.snmp_by_addr, interface);
    if let Some(host) = data.hosts.get_mut(hostid) {
        host.interfaceids.insert(interfaceid);
    }
    if changed {
        interface.revision = pass.target;
        pass.touched.hosts.insert(hostid);
        pass.touched.requeue_items.extend(interface.itemids.iter().copied());
    }
    Ok(Applied::from_change(found, changed))
}

fn index(
    main_interfaces: &mut HashMap<(u64, InterfaceType), u64>,
    snmp_by_addr: &mut HashMap<String, BTreeSet<u64>>,
    interface: &Interface,
) {
    if interface.main {
        main_interfaces.insert((interface.hostid, interface.kind), interface.interfaceid);
    }
    if interface.kind == InterfaceType::Snmp {
        snmp_by_addr
            .entry(interface.address().to_owned())
            .or_default()
            .insert(interface.interfaceid);
    }
}

fn unindex(
    main_interfaces: &mut HashMap<(u64, InterfaceType), u64>,
    snmp_by_addr: &mut HashMap<String, BTreeSet<u64>>,
    interface: &Interface,
) {
    let key = (interface.hostid, interface.kind);
    if main_interfaces.get(&key) == Some(&interface.interfaceid) {
        main_interfaces.remove(&key);
    }
    if interface.kind == InterfaceType::Snmp
        && let Some(ids) = snmp_by_addr.get_mut(interface.address())
    {
        ids.remove(&interface.interfaceid);
        if ids.is_empty() {
            snmp_by_addr.remove(interface.address());
        }
    }
}

pub(super) fn remove_interface(pass: &mut Pass<'_>, interfaceid: u64) -> bool {
    let data = &mut *pass.data;
    let Some(interface) = data.interfaces.remove(interfaceid) else {
        return false;
    };
    unindex(&mut data.main_interfaces, &mut data.snmp_by_addr, &interface);
    if let Some(host) = data.hosts.get_mut(interface.hostid) {
        host.interfaceids.remove(&interfaceid);
        pass.touched.hosts.insert(interface.hostid);
    }
    pass.touched
        .requeue_items
        .extend(interface.itemids.iter().copied());
    data.strpool.release_all(interface.into_handles());
    true
}

pub(super) fn upsert_snmp(pass: &mut Pass<'_>, row: &RowReader<'_>) -> ApplyResult {
    let interfaceid = row.id();
    let version = row.code("version", SnmpVersion::from_code)?;
    let bulk = row.bool("bulk")?;
    let max_repetitions = row.u32("max_repetitions")?;
    let securitylevel = row.u8("securitylevel")?;
    let authprotocol = row.u8("authprotocol")?;
    let privprotocol = row.u8("privprotocol")?;

    let data = &mut *pass.data;
    let Some(interface) = data.interfaces.get_mut(interfaceid) else {
        return Ok(Applied::Skipped);
    };
    let found = interface.snmp.is_some();
    let snmp = interface.snmp.get_or_insert_with(SnmpDetails::new);
    let pool = &mut data.strpool;

    let mut changed = !found;
    changed |= update(&mut snmp.version, version);
    changed |= update(&mut snmp.bulk, bulk);
    changed |= update(&mut snmp.max_repetitions, max_repetitions);
    changed |= update(&mut snmp.securitylevel, securitylevel);
    changed |= update(&mut snmp.authprotocol, authprotocol);
    changed |= update(&mut snmp.privprotocol, privprotocol);
    changed |= pool.replace_opt(found, &mut snmp.community, row.str("community")?)?;
    changed |= pool.replace_opt(found, &mut snmp.securityname, row.str("securityname")?)?;
    changed |= pool.replace_opt(found, &mut snmp.authpassphrase, row.str("authpassphrase")?)?;
    changed |= pool.replace_opt(found, &mut snmp.privpassphrase, row.str("privpassphrase")?)?;
    changed |= pool.replace_opt(found, &mut snmp.contextname, row.str("contextname")?)?;

    if changed {
        interface.revision = pass.target;
        pass.touched.hosts.insert(interface.hostid);
    }
    Ok(Applied::from_change(found, changed))
}

pub(super) fn remove_snmp(pass: &mut Pass<'_>, interfaceid: u64) -> bool {
    let data = &mut *pass.data;
    let Some(interface) = data.interfaces.get_mut(interfaceid) else {
        return false;
    };
    let Some(snmp) = interface.snmp.take() else {
        return false;
    };
    interface.revision = pass.target;
    pass.touched.hosts.insert(interface.hostid);
    data.strpool.release_all(snmp.into_handles());
    true
}
