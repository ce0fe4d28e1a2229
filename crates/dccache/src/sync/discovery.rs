#![forbid(unsafe_code)]

use super::RowReader;
use super::engine::{Applied, ApplyResult, Pass};
use crate::domain::{Dcheck, Drule, HttpStep, HttpTest, Status, update};

pub(super) fn upsert_drule(pass: &mut Pass<'_>, row: &RowReader<'_>) -> ApplyResult {
    let druleid = row.id();
    let proxyid = row.u64("proxyid")?;
    let name = row.str("name")?;
    let iprange = row.str("iprange")?;
    let delay = row.str("delay")?;
    let status = row.code("status", Status::from_code)?;
    let concurrency_max = row.u32("concurrency_max")?;

    let data = &mut *pass.data;
    let (drule, found) = data.drules.insert_with(druleid, || Drule::new(druleid))?;
    let pool = &mut data.strpool;
    let mut changed = !found;
    let mut reschedule = !found;

    changed |= pool.replace(found, &mut drule.name, name)?;
    changed |= pool.replace(found, &mut drule.iprange, iprange)?;
    changed |= update(&mut drule.concurrency_max, concurrency_max);
    if pool.replace(found, &mut drule.delay, delay)? {
        changed = true;
        reschedule = true;
    }
    if update(&mut drule.status, status) {
        changed = true;
        reschedule = true;
    }
    // rules run by a proxy are not scheduled here
    if update(&mut drule.proxyid, proxyid) {
        changed = true;
        reschedule = true;
    }

    if changed {
        drule.revision = pass.target;
    }
    if reschedule {
        pass.touched.drules.insert(druleid);
    }
    Ok(Applied::from_change(found, changed))
}

pub(super) fn remove_drule(pass: &mut Pass<'_>, druleid: u64) -> bool {
    let data = &mut *pass.data;
    let Some(drule) = data.drules.remove(druleid) else {
        return false;
    };
    for dcheckid in &drule.dcheckids {
        if let Some(dcheck) = data.dchecks.remove(*dcheckid) {
            data.strpool.release_all(dcheck.into_handles());
        }
    }
    data.strpool
        .release_all([drule.name, drule.iprange, drule.delay]);
    // drops the queue entry of the rule
    pass.touched.drules.insert(druleid);
    true
}

pub(super) fn upsert_dcheck(pass: &mut Pass<'_>, row: &RowReader<'_>) -> ApplyResult {
    let dcheckid = row.id();
    let druleid = row.u64("druleid")?;
    if !pass.data.drules.contains(druleid) {
        return Ok(Applied::Skipped);
    }

    let data = &mut *pass.data;
    let (dcheck, found) = data
        .dchecks
        .insert_with(dcheckid, || Dcheck::new(dcheckid))?;
    let pool = &mut data.strpool;
    let mut changed = !found;

    let previous = dcheck.druleid;
    if update(&mut dcheck.druleid, druleid) && found {
        if let Some(drule) = data.drules.get_mut(previous) {
            drule.dcheckids.remove(&dcheckid);
            drule.revision = pass.target;
        }
        changed = true;
    }
    changed |= update(&mut dcheck.kind, row.u8("type")?);
    changed |= pool.replace_opt(found, &mut dcheck.key, row.str("key_")?)?;
    changed |= pool.replace_opt(found, &mut dcheck.ports, row.str("ports")?)?;
    changed |= pool.replace_opt(found, &mut dcheck.snmp_community, row.str("snmp_community")?)?;
    changed |= pool.replace_opt(
        found,
        &mut dcheck.snmpv3_securityname,
        row.str("snmpv3_securityname")?,
    )?;
    changed |= update(
        &mut dcheck.snmpv3_securitylevel,
        row.u8("snmpv3_securitylevel")?,
    );
    changed |= pool.replace_opt(
        found,
        &mut dcheck.snmpv3_authpassphrase,
        row.str("snmpv3_authpassphrase")?,
    )?;
    changed |= pool.replace_opt(
        found,
        &mut dcheck.snmpv3_privpassphrase,
        row.str("snmpv3_privpassphrase")?,
    )?;
    changed |= pool.replace_opt(
        found,
        &mut dcheck.snmpv3_contextname,
        row.str("snmpv3_contextname")?,
    )?;
    changed |= update(&mut dcheck.uniq, row.bool("uniq")?);
    changed |= update(&mut dcheck.host_source, row.u8("host_source")?);
    changed |= update(&mut dcheck.name_source, row.u8("name_source")?);
    changed |= update(&mut dcheck.allow_redirect, row.bool("allow_redirect")?);

    if let Some(drule) = data.drules.get_mut(druleid) {
        drule.dcheckids.insert(dcheckid);
        if changed {
            drule.revision = pass.target;
        }
    }
    Ok(Applied::from_change(found, changed))
}

pub(super) fn remove_dcheck(pass: &mut Pass<'_>, dcheckid: u64) -> bool {
    let data = &mut *pass.data;
    let Some(dcheck) = data.dchecks.remove(dcheckid) else {
        return false;
    };
    if let Some(drule) = data.drules.get_mut(dcheck.druleid) {
        drule.dcheckids.remove(&dcheckid);
        drule.revision = pass.target;
    }
    data.strpool.release_all(dcheck.into_handles());
    true
}

pub(super) fn upsert_httptest(pass: &mut Pass<'_>, row: &RowReader<'_>) -> ApplyResult {
    let httptestid = row.id();
    let hostid = row.u64("hostid")?;
    let name = row.str("name")?;
    let delay = row.str("delay")?;
    let agent = row.str("agent")?;
    let status = row.code("status", Status::from_code)?;
    let retries = row.u32("retries")?;
    if !pass.data.hosts.contains(hostid) {
        return Ok(Applied::Skipped);
    }

    let data = &mut *pass.data;
    let (test, found) = data
        .httptests
        .insert_with(httptestid, || HttpTest::new(httptestid))?;
    let pool = &mut data.strpool;
    let mut changed = !found;
    let mut reschedule = !found;

    let previous = test.hostid;
    if update(&mut test.hostid, hostid) {
        if found && let Some(host) = data.hosts.get_mut(previous) {
            host.httptestids.remove(&httptestid);
            pass.touched.hosts.insert(previous);
        }
        changed = true;
        reschedule = true;
    }
    changed |= pool.replace(found, &mut test.name, name)?;
    changed |= pool.replace_opt(found, &mut test.agent, agent)?;
    changed |= update(&mut test.retries, retries);
    if pool.replace(found, &mut test.delay, delay)? {
        changed = true;
        reschedule = true;
    }
    if update(&mut test.status, status) {
        changed = true;
        reschedule = true;
    }

    if let Some(host) = data.hosts.get_mut(hostid) {
        host.httptestids.insert(httptestid);
    }
    if changed {
        test.revision = pass.target;
        pass.touched.hosts.insert(hostid);
    }
    if reschedule {
        pass.touched.httptests.insert(httptestid);
    }
    Ok(Applied::from_change(found, changed))
}

/// Remove a web scenario with its steps. Also used when the owning host
/// goes away.
pub(super) fn remove_httptest(pass: &mut Pass<'_>, httptestid: u64) -> bool {
    let data = &mut *pass.data;
    let Some(test) = data.httptests.remove(httptestid) else {
        return false;
    };
    for stepid in &test.stepids {
        if let Some(step) = data.httpsteps.remove(*stepid) {
            data.strpool.release_all(step.into_handles());
        }
    }
    if let Some(host) = data.hosts.get_mut(test.hostid) {
        host.httptestids.remove(&httptestid);
        pass.touched.hosts.insert(test.hostid);
    }
    data.strpool
        .release_all([test.name, test.delay, test.agent]);
    pass.touched.httptests.insert(httptestid);
    true
}

pub(super) fn upsert_httpstep(pass: &mut Pass<'_>, row: &RowReader<'_>) -> ApplyResult {
    let httpstepid = row.id();
    let httptestid = row.u64("httptestid")?;
    if !pass.data.httptests.contains(httptestid) {
        return Ok(Applied::Skipped);
    }

    let data = &mut *pass.data;
    let (step, found) = data
        .httpsteps
        .insert_with(httpstepid, || HttpStep::new(httpstepid))?;
    let pool = &mut data.strpool;
    let mut changed = !found;

    let previous = step.httptestid;
    if update(&mut step.httptestid, httptestid) && found {
        if let Some(test) = data.httptests.get_mut(previous) {
            test.stepids.remove(&httpstepid);
            test.revision = pass.target;
        }
        changed = true;
    }
    changed |= pool.replace(found, &mut step.name, row.str("name")?)?;
    changed |= update(&mut step.no, row.u32("no")?);
    changed |= pool.replace(found, &mut step.url, row.str("url")?)?;
    changed |= pool.replace(found, &mut step.timeout, row.str("timeout")?)?;
    changed |= pool.replace_opt(found, &mut step.posts, row.str("posts")?)?;
    changed |= pool.replace_opt(found, &mut step.required, row.str("required")?)?;
    changed |= pool.replace_opt(found, &mut step.status_codes, row.str("status_codes")?)?;
    changed |= update(&mut step.follow_redirects, row.bool("follow_redirects")?);
    changed |= update(&mut step.retrieve_mode, row.u8("retrieve_mode")?);
    changed |= update(&mut step.post_type, row.u8("post_type")?);

    if let Some(test) = data.httptests.get_mut(httptestid) {
        test.stepids.insert(httpstepid);
        if changed {
            test.revision = pass.target;
            pass.touched.hosts.insert(test.hostid);
        }
    }
    Ok(Applied::from_change(found, changed))
}

pub(super) fn remove_httpstep(pass: &mut Pass<'_>, httpstepid: u64) -> bool {
    let data = &mut *pass.data;
    let Some(step) = data.httpsteps.remove(httpstepid) else {
        return false;
    };
    if let Some(test) = data.httptests.get_mut(step.httptestid) {
        test.stepids.remove(&httpstepid);
        test.revision = pass.target;
        pass.touched.hosts.insert(test.hostid);
    }
    data.strpool.release_all(step.into_handles());
    true
}
