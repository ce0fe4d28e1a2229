#![forbid(unsafe_code)]

use super::RowReader;
use super::engine::{Applied, ApplyResult, Pass, relink_psk};
use crate::domain::{TIMEOUT_KINDS, TlsAccept, parse_timezone, update};
use crate::interval::parse_time_suffix;
use chrono::{Offset, Utc};
use tracing::warn;

pub(super) fn upsert_config(pass: &mut Pass<'_>, row: &RowReader<'_>) -> ApplyResult {
    let refresh_unsupported = row.str("refresh_unsupported")?;
    let default_timezone = row.str("default_timezone")?;
    let history_global = row.bool("hk_history_global")?;
    let history = row.str("hk_history")?;
    let trends_global = row.bool("hk_trends_global")?;
    let trends = row.str("hk_trends")?;
    let autoreg_tls_accept = TlsAccept::from_bits_truncate(row.u8("autoreg_tls_accept")?);

    let data = &mut *pass.data;
    let pool = &mut data.strpool;
    let settings = &mut data.settings;
    let found = settings.revision != 0;
    let mut changed = false;
    let mut reschedule = false;

    match parse_time_suffix(refresh_unsupported) {
        Some(seconds) if update(&mut settings.refresh_unsupported, seconds) => {
            changed = true;
            reschedule = true;
        }
        Some(_) => {}
        None => warn!(
            value = refresh_unsupported,
            current = settings.refresh_unsupported,
            "invalid refresh unsupported interval, keeping the current one"
        ),
    }

    if pool.replace(found, &mut settings.default_timezone, default_timezone)? {
        let timezone = parse_timezone(default_timezone).unwrap_or_else(|| {
            warn!(timezone = default_timezone, "unsupported timezone, using UTC");
            Utc.fix()
        });
        reschedule |= update(&mut settings.timezone, timezone);
        changed = true;
    }

    changed |= update(&mut settings.hk.history_global, history_global);
    changed |= update(&mut settings.hk.trends_global, trends_global);
    match parse_time_suffix(history) {
        Some(period) => changed |= settings.hk.set_history(period),
        None => warn!(value = history, "invalid history storage period"),
    }
    match parse_time_suffix(trends) {
        Some(period) => changed |= settings.hk.set_trends(period),
        None => warn!(value = trends, "invalid trends storage period"),
    }
    changed |= update(&mut settings.autoreg_tls_accept, autoreg_tls_accept);

    for (slot, kind) in settings.item_timeouts.values.iter_mut().zip(TIMEOUT_KINDS) {
        let text = row.str(&format!("timeout_{kind}"))?;
        changed |= pool.replace_opt(found, slot, text)?;
    }

    if changed || !found {
        settings.revision = pass.target;
    }
    if reschedule {
        pass.touched.requeue_all_items = true;
    }
    Ok(Applied::from_change(found, changed))
}

pub(super) fn remove_config(_pass: &mut Pass<'_>, configid: u64) -> bool {
    warn!(configid, "global configuration row removed, keeping the current settings");
    false
}

pub(super) fn upsert_autoreg_psk(pass: &mut Pass<'_>, row: &RowReader<'_>) -> ApplyResult {
    let identity = row.str("tls_psk_identity")?;
    let secret = row.str("tls_psk")?;

    let data = &mut *pass.data;
    let found = data.autoreg_psk.is_set();
    let changed = relink_psk(
        &mut data.psk,
        &mut data.strpool,
        &mut data.autoreg_psk,
        identity,
        secret,
    )?;
    Ok(Applied::from_change(found, changed))
}

pub(super) fn remove_autoreg_psk(pass: &mut Pass<'_>, _id: u64) -> bool {
    let data = &mut *pass.data;
    if !data.autoreg_psk.is_set() {
        return false;
    }
    let identity = std::mem::take(&mut data.autoreg_psk);
    data.psk.unlink(&mut data.strpool, identity);
    true
}
