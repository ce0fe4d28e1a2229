#![forbid(unsafe_code)]

use super::{CheckType, TlsAccept};
use crate::strpool::StrHandle;
use chrono::{FixedOffset, Offset, Utc};
use tracing::warn;

const SEC_PER_HOUR: u32 = 3600;
const SEC_PER_DAY: u32 = 86400;
const SEC_PER_YEAR: u32 = 365 * SEC_PER_DAY;

/// Shortest history storage period accepted from configuration.
pub const HK_HISTORY_MIN: u32 = SEC_PER_HOUR;
/// Shortest trend storage period accepted from configuration.
pub const HK_TRENDS_MIN: u32 = SEC_PER_DAY;
/// Longest storage period accepted from configuration.
pub const HK_PERIOD_MAX: u32 = 25 * SEC_PER_YEAR;

/// Global housekeeping overrides.
///
/// A zero period means "use the per-item setting".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Housekeeping {
    pub history_global: bool,
    pub history: u32,
    pub trends_global: bool,
    pub trends: u32,
}

impl Housekeeping {
    /// Accept a new history period, keeping the current one when it is out
    /// of range.
    pub(crate) fn set_history(&mut self, period: u32) -> bool {
        if period != 0 && !(HK_HISTORY_MIN..=HK_PERIOD_MAX).contains(&period) {
            warn!(period, current = self.history, "invalid history storage period");
            return false;
        }
        super::update(&mut self.history, period)
    }

    pub(crate) fn set_trends(&mut self, period: u32) -> bool {
        if period != 0 && !(HK_TRENDS_MIN..=HK_PERIOD_MAX).contains(&period) {
            warn!(period, current = self.trends, "invalid trends storage period");
            return false;
        }
        super::update(&mut self.trends, period)
    }
}

/// Check kinds with their own global timeout, in row column order.
pub const TIMEOUT_KINDS: &[&str] = &[
    "agent", "simple", "snmp", "external", "odbc", "http", "ssh", "telnet", "script", "browser",
];

/// Global per-protocol check timeouts, stored as interval text.
#[derive(Debug)]
pub struct ItemTimeouts {
    pub values: Vec<StrHandle>,
}

impl Default for ItemTimeouts {
    fn default() -> Self {
        Self {
            values: TIMEOUT_KINDS.iter().map(|_| StrHandle::unset()).collect(),
        }
    }
}

impl ItemTimeouts {
    fn kind(check_type: CheckType) -> Option<&'static str> {
        Some(match check_type {
            CheckType::Agent | CheckType::AgentActive => "agent",
            CheckType::Simple => "simple",
            CheckType::Snmp => "snmp",
            CheckType::External => "external",
            CheckType::DbMonitor => "odbc",
            CheckType::HttpAgent => "http",
            CheckType::Ssh => "ssh",
            CheckType::Telnet => "telnet",
            CheckType::Script => "script",
            CheckType::Browser => "browser",
            _ => return None,
        })
    }

    /// Timeout text applying to checks of `check_type`, if that type has one.
    pub fn get(&self, check_type: CheckType) -> Option<&str> {
        let kind = Self::kind(check_type)?;
        let index = TIMEOUT_KINDS.iter().position(|name| *name == kind)?;
        self.values
            .get(index)
            .filter(|value| value.is_set())
            .map(StrHandle::as_str)
    }
}

#[derive(Debug)]
pub struct GlobalSettings {
    /// Interval for retrying unsupported checks, in seconds. Zero disables
    /// retries.
    pub refresh_unsupported: u32,
    pub default_timezone: StrHandle,
    /// Offset used for calendar based scheduling.
    pub timezone: FixedOffset,
    pub hk: Housekeeping,
    pub item_timeouts: ItemTimeouts,
    pub autoreg_tls_accept: TlsAccept,
    pub revision: u64,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            refresh_unsupported: 600,
            default_timezone: StrHandle::unset(),
            timezone: utc(),
            hk: Housekeeping::default(),
            item_timeouts: ItemTimeouts::default(),
            autoreg_tls_accept: TlsAccept::UNENCRYPTED,
            revision: 0,
        }
    }
}

impl GlobalSettings {
    pub(crate) fn into_handles(self) -> impl Iterator<Item = StrHandle> {
        std::iter::once(self.default_timezone).chain(self.item_timeouts.values)
    }
}

fn utc() -> FixedOffset {
    Utc.fix()
}

/// Parse a timezone setting: `system`/`UTC` or a fixed `+HH:MM` offset.
pub fn parse_timezone(text: &str) -> Option<FixedOffset> {
    match text {
        "" | "system" | "UTC" | "utc" => return Some(utc()),
        _ => {}
    }
    let (sign, rest) = match text.as_bytes().first()? {
        b'+' => (1, &text[1..]),
        b'-' => (-1, &text[1..]),
        _ => return None,
    };
    let (hours, minutes) = rest.split_once(':')?;
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if minutes >= 60 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn housekeeping_rejects_out_of_range_periods() {
        let mut hk = Housekeeping::default();
        assert!(hk.set_history(7 * SEC_PER_DAY));
        assert!(!hk.set_history(60));
        assert_eq!(hk.history, 7 * SEC_PER_DAY);
        assert!(!hk.set_trends(HK_PERIOD_MAX + 1));
        assert!(!hk.set_trends(0));
        assert!(hk.set_trends(HK_TRENDS_MIN));
    }

    #[test]
    fn timezone_offsets() {
        assert_eq!(parse_timezone("UTC"), FixedOffset::east_opt(0));
        assert_eq!(parse_timezone("+02:30"), FixedOffset::east_opt(9000));
        assert_eq!(parse_timezone("-05:00"), FixedOffset::west_opt(18000));
        assert_eq!(parse_timezone("Europe/Riga"), None);
        assert_eq!(parse_timezone("+01:75"), None);
    }
}
