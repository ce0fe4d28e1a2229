#![forbid(unsafe_code)]

use super::RowReader;
use super::engine::{Applied, ApplyResult, Pass};
use crate::domain::{MacroKind, parse_macro_name};
use crate::stores::MacroRow;

/// Global and host macro ids come from separate tables; global ones are
/// stored with this bit set.
pub(crate) const GLOBAL_MACRO_BIT: u64 = 1 << 63;

fn upsert(pass: &mut Pass<'_>, row: &RowReader<'_>, hostid: u64) -> ApplyResult {
    let macroid = match hostid {
        0 => row.id() | GLOBAL_MACRO_BIT,
        _ => row.id(),
    };
    let text = row.str("macro")?;
    let value = row.str("value")?;
    let kind = row.code("type", MacroKind::from_code)?;
    let Some(name) = parse_macro_name(text) else {
        return Err(row.invalid("macro").into());
    };

    let data = &mut *pass.data;
    let found = data.macros.get(macroid).is_some();
    let (changed, moved_from) = data.macros.upsert(
        &mut data.strpool,
        macroid,
        MacroRow {
            hostid,
            name: &name.name,
            context: name.context.as_deref().unwrap_or_default(),
            value,
            kind,
        },
        pass.target,
    )?;

    let touched = &mut pass.touched;
    if let Some(previous) = moved_from {
        touched.macro_hosts.insert(previous);
        if previous != 0 {
            touched.hosts.insert(previous);
        }
    }
    if changed {
        touched.macro_hosts.insert(hostid);
        if hostid != 0 {
            touched.hosts.insert(hostid);
        }
    }
    Ok(Applied::from_change(found, changed))
}

pub(super) fn upsert_global(pass: &mut Pass<'_>, row: &RowReader<'_>) -> ApplyResult {
    upsert(pass, row, 0)
}

pub(super) fn upsert_host_macro(pass: &mut Pass<'_>, row: &RowReader<'_>) -> ApplyResult {
    let hostid = row.u64("hostid")?;
    if !pass.data.hosts.contains(hostid) {
        return Ok(Applied::Skipped);
    }
    upsert(pass, row, hostid)
}

pub(super) fn remove_global(pass: &mut Pass<'_>, globalmacroid: u64) -> bool {
    remove_macro(pass, globalmacroid | GLOBAL_MACRO_BIT)
}

pub(super) fn remove_macro(pass: &mut Pass<'_>, macroid: u64) -> bool {
    let data = &mut *pass.data;
    let Some(hostid) = data.macros.remove(&mut data.strpool, macroid) else {
        return false;
    };
    pass.touched.macro_hosts.insert(hostid);
    if hostid != 0 {
        pass.touched.hosts.insert(hostid);
    }
    true
}
