#![forbid(unsafe_code)]

//! Check interval expressions and next-execution time calculation.
//!
//! An expression is a base delay followed by `;`-separated custom
//! intervals:
//!
//! * flexible intervals `delay/wd1-wd2,hh:mm-hh:mm` override the base delay
//!   inside a weekly time period;
//! * scheduling intervals such as `wd1-5h9m30` or `m0-59/15` fire at
//!   calendar positions described by `md`, `wd`, `h`, `m` and `s` filters.
//!
//! User macros must be expanded before parsing.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, TimeZone, Timelike};

/// Next-execution time of checks that must not run.
pub const NEVER: i64 = i32::MAX as i64;

pub const SEC_PER_MIN: i64 = 60;
pub const SEC_PER_HOUR: i64 = 3600;
pub const SEC_PER_DAY: i64 = 86400;
pub const SEC_PER_WEEK: i64 = 7 * SEC_PER_DAY;
pub const SEC_PER_YEAR: i64 = 365 * SEC_PER_DAY;

/// Upper bound of calendar steps taken while looking for a scheduling
/// position; one Gregorian cycle worth of months.
const CALENDAR_BUDGET: u32 = 400 * 12 * 32;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntervalError {
    #[error("invalid update interval \"{0}\"")]
    Update(String),

    #[error("invalid flexible interval \"{0}\"")]
    Flexible(String),

    #[error("invalid scheduling interval \"{0}\"")]
    Scheduling(String),

    #[error("cannot resolve user macro in interval \"{0}\"")]
    UnresolvedMacro(String),
}

/// Parse a time value with an optional `s`, `m`, `h`, `d` or `w` suffix.
pub fn parse_time_suffix(text: &str) -> Option<u32> {
    let digits = text.len() - text.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return None;
    }
    let value: i64 = text[..digits].parse().ok()?;
    let factor = match &text[digits..] {
        "" | "s" => 1,
        "m" => SEC_PER_MIN,
        "h" => SEC_PER_HOUR,
        "d" => SEC_PER_DAY,
        "w" => SEC_PER_WEEK,
        _ => return None,
    };
    u32::try_from(value.checked_mul(factor)?)
        .ok()
        .filter(|seconds| i32::try_from(*seconds).is_ok())
}

/// Weekly time period `d1[-d2],hh:mm-hh:mm`, days counted from Monday = 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimePeriod {
    pub start_day: u8,
    pub end_day: u8,
    /// Seconds since midnight, inclusive.
    pub start_time: i64,
    /// Seconds since midnight, exclusive.
    pub end_time: i64,
}

impl TimePeriod {
    pub fn parse(text: &str) -> Option<Self> {
        let (days, times) = text.split_once(',')?;
        let day = |s: &str| match s.as_bytes() {
            [d @ b'1'..=b'7'] => Some(d - b'0'),
            _ => None,
        };
        let (start_day, end_day) = match days.split_once('-') {
            Some((start, end)) => (day(start)?, day(end)?),
            None => (day(days)?, day(days)?),
        };
        if start_day > end_day {
            return None;
        }
        let (start, end) = times.split_once('-')?;
        let (start_time, end_time) = (parse_time_of_day(start)?, parse_time_of_day(end)?);
        if start_time >= end_time {
            return None;
        }
        Some(Self {
            start_day,
            end_day,
            start_time,
            end_time,
        })
    }

    fn contains(&self, day: u8, time: i64) -> bool {
        (self.start_day..=self.end_day).contains(&day)
            && self.start_time <= time
            && time < self.end_time
    }
}

/// `h:mm`, `hh:mm` or `0h:mm` with `24:00` as the only valid 24th hour.
fn parse_time_of_day(text: &str) -> Option<i64> {
    let (hours, minutes) = text.split_once(':')?;
    if hours.is_empty() || hours.len() > 2 || minutes.len() != 2 {
        return None;
    }
    if !hours.bytes().chain(minutes.bytes()).all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hours: i64 = hours.parse().ok()?;
    let minutes: i64 = minutes.parse().ok()?;
    if hours > 24 || minutes > 59 || (hours == 24 && minutes != 0) {
        return None;
    }
    Some(hours * SEC_PER_HOUR + minutes * SEC_PER_MIN)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlexibleInterval {
    pub delay: u32,
    pub period: TimePeriod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Filter {
    start: i32,
    end: i32,
    step: i32,
}

/// Nearest value `>= value` matching one of `filters`.
fn nearest_filter_value(filters: &[Filter], value: i32) -> Option<i32> {
    filters
        .iter()
        .filter_map(|filter| {
            if (filter.start..=filter.end).contains(&value) {
                let offset = (value - filter.start) % filter.step;
                let next = if offset == 0 {
                    value
                } else {
                    value + filter.step - offset
                };
                if next <= filter.end {
                    return Some(next);
                }
            }
            (filter.start > value).then_some(filter.start)
        })
        .min()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
enum FilterLevel {
    #[default]
    None,
    Day,
    Hour,
    Minute,
    Second,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulingInterval {
    mdays: Vec<Filter>,
    wdays: Vec<Filter>,
    hours: Vec<Filter>,
    minutes: Vec<Filter>,
    seconds: Vec<Filter>,
    level: FilterLevel,
}

impl SchedulingInterval {
    pub fn parse(text: &str) -> Option<Self> {
        if text.is_empty() {
            return None;
        }
        let mut interval = Self::default();
        let mut rest = text;

        while !rest.is_empty() {
            let (level, min, max, width, tail) = if let Some(tail) = rest.strip_prefix("wd") {
                (FilterLevel::Day, 1, 7, 1, tail)
            } else if let Some(tail) = rest.strip_prefix("md") {
                if !interval.wdays.is_empty() {
                    return None;
                }
                (FilterLevel::Day, 1, 31, 2, tail)
            } else if let Some(tail) = rest.strip_prefix('h') {
                (FilterLevel::Hour, 0, 23, 2, tail)
            } else if let Some(tail) = rest.strip_prefix('m') {
                (FilterLevel::Minute, 0, 59, 2, tail)
            } else if let Some(tail) = rest.strip_prefix('s') {
                (FilterLevel::Second, 0, 59, 2, tail)
            } else {
                return None;
            };

            if interval.level > level {
                return None;
            }
            let slot = match (level, rest.as_bytes()) {
                (FilterLevel::Day, [b'w', ..]) => &mut interval.wdays,
                (FilterLevel::Day, _) => &mut interval.mdays,
                (FilterLevel::Hour, _) => &mut interval.hours,
                (FilterLevel::Minute, _) => &mut interval.minutes,
                _ => &mut interval.seconds,
            };
            if !slot.is_empty() {
                return None;
            }
            let (filters, consumed) = parse_filter(tail, min, max, width)?;
            *slot = filters;
            interval.level = level;
            rest = &tail[consumed..];
        }
        Some(interval)
    }

    fn filter_matches(&self, level: FilterLevel, tm: &mut Tm) -> bool {
        let (filters, value, max) = match level {
            FilterLevel::Day => return self.day_nextcheck(tm),
            FilterLevel::Hour => (&self.hours, &mut tm.hour, 23),
            FilterLevel::Minute => (&self.minutes, &mut tm.min, 59),
            FilterLevel::Second => (&self.seconds, &mut tm.sec, 59),
            FilterLevel::None => return false,
        };
        if *value > max {
            return false;
        }
        if filters.is_empty() {
            // Units coarser than the finest filter match everything, finer
            // units only match zero.
            return self.level > level || *value == 0;
        }
        match nearest_filter_value(filters, *value) {
            Some(next) => {
                *value = next;
                true
            }
            None => false,
        }
    }

    fn wday_matches(&self, tm: &Tm) -> bool {
        if self.wdays.is_empty() {
            return true;
        }
        let Some(value) = tm.weekday() else {
            return false;
        };
        nearest_filter_value(&self.wdays, value) == Some(value)
    }

    fn wday_nextcheck(&self, tm: &mut Tm) -> bool {
        if self.wdays.is_empty() {
            return true;
        }
        let Some(mut now) = tm.weekday() else {
            return false;
        };
        let next = match nearest_filter_value(&self.wdays, now) {
            Some(next) => next,
            None => {
                tm.mday += 7 - now + 1;
                now = 1;
                match nearest_filter_value(&self.wdays, 1) {
                    Some(next) => next,
                    None => return false,
                }
            }
        };
        tm.mday += next - now;
        tm.mday <= tm.days_in_month()
    }

    fn day_nextcheck(&self, tm: &mut Tm) -> bool {
        if !tm.is_valid() {
            return false;
        }
        if self.mdays.is_empty() {
            return self.wday_nextcheck(tm);
        }
        while let Some(mday) = nearest_filter_value(&self.mdays, tm.mday) {
            tm.mday = mday;
            if tm.mday > tm.days_in_month() {
                break;
            }
            if self.wday_matches(tm) {
                return true;
            }
            tm.mday += 1;
            if tm.mday > tm.days_in_month() {
                break;
            }
        }
        false
    }

    /// First calendar position strictly after `now` matching this interval.
    fn nextcheck(&self, now: i64, tz: FixedOffset) -> Option<i64> {
        let mut cursor = Cursor {
            interval: self,
            tm: Tm::from_timestamp(now, tz)?,
            budget: CALENDAR_BUDGET,
        };
        cursor.tm.increment();
        cursor.apply_day()?;
        cursor.apply_hour()?;
        cursor.apply_minute()?;
        cursor.apply_second()?;
        cursor.tm.to_timestamp(tz)
    }
}

fn take_digits(bytes: &[u8], pos: &mut usize) -> usize {
    let start = *pos;
    while *pos < bytes.len() && bytes[*pos].is_ascii_digit() {
        *pos += 1;
    }
    *pos - start
}

fn parse_ranged(bytes: &[u8], start: usize, len: usize, min: i32, max: i32) -> Option<i32> {
    let text = std::str::from_utf8(&bytes[start..start + len]).ok()?;
    text.parse::<i32>()
        .ok()
        .filter(|value| (min..=max).contains(value))
}

/// Parse a comma separated filter list, returning it with the number of
/// bytes consumed.
fn parse_filter(text: &str, min: i32, max: i32, width: usize) -> Option<(Vec<Filter>, usize)> {
    let bytes = text.as_bytes();
    let mut pos = 0;
    let mut filters = Vec::new();

    loop {
        let item_start = pos;
        let len = take_digits(bytes, &mut pos);
        let (start, end) = if len > 0 {
            if len > width {
                return None;
            }
            let start = parse_ranged(bytes, item_start, len, min, max)?;
            if bytes.get(pos) == Some(&b'-') {
                pos += 1;
                let end_start = pos;
                let len = take_digits(bytes, &mut pos);
                if len == 0 || len > width {
                    return None;
                }
                let end = parse_ranged(bytes, end_start, len, min, max)?;
                if end < start {
                    return None;
                }
                (start, end)
            } else {
                // A step is only valid for a range.
                if bytes.get(pos) == Some(&b'/') {
                    return None;
                }
                (start, start)
            }
        } else {
            (min, max)
        };

        let mut step = 1;
        if bytes.get(pos) == Some(&b'/') {
            pos += 1;
            let step_start = pos;
            let len = take_digits(bytes, &mut pos);
            if len == 0 || len > width || end - start < 1 {
                return None;
            }
            step = parse_ranged(bytes, step_start, len, 1, end - start)?;
        } else if pos == item_start {
            return None;
        }

        filters.push(Filter { start, end, step });

        if bytes.get(pos) == Some(&b',') {
            pos += 1;
            if pos == bytes.len() {
                return None;
            }
            continue;
        }
        return Some((filters, pos));
    }
}

/// Broken-down local time with unnormalized fields during calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Tm {
    year: i32,
    /// 0-11.
    mon: i32,
    mday: i32,
    hour: i32,
    min: i32,
    sec: i32,
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

impl Tm {
    fn from_timestamp(ts: i64, tz: FixedOffset) -> Option<Self> {
        let local = DateTime::from_timestamp(ts, 0)?.with_timezone(&tz);
        Some(Self {
            year: local.year(),
            mon: local.month0() as i32,
            mday: local.day() as i32,
            hour: local.hour() as i32,
            min: local.minute() as i32,
            sec: local.second() as i32,
        })
    }

    fn to_timestamp(self, tz: FixedOffset) -> Option<i64> {
        let date = NaiveDate::from_ymd_opt(
            self.year,
            u32::try_from(self.mon + 1).ok()?,
            u32::try_from(self.mday).ok()?,
        )?;
        let naive = date.and_hms_opt(
            u32::try_from(self.hour).ok()?,
            u32::try_from(self.min).ok()?,
            u32::try_from(self.sec).ok()?,
        )?;
        tz.from_local_datetime(&naive)
            .single()
            .map(|dt| dt.timestamp())
    }

    fn days_in_month(&self) -> i32 {
        match self.mon {
            1 if is_leap_year(self.year) => 29,
            1 => 28,
            3 | 5 | 8 | 10 => 30,
            _ => 31,
        }
    }

    fn is_valid(&self) -> bool {
        (0..12).contains(&self.mon)
            && (1..=self.days_in_month()).contains(&self.mday)
            && (0..24).contains(&self.hour)
            && (0..60).contains(&self.min)
            && (0..60).contains(&self.sec)
    }

    /// Day of the week, Monday = 1.
    fn weekday(&self) -> Option<i32> {
        let date = NaiveDate::from_ymd_opt(
            self.year,
            u32::try_from(self.mon + 1).ok()?,
            u32::try_from(self.mday).ok()?,
        )?;
        Some(date.weekday().number_from_monday() as i32)
    }

    fn increment(&mut self) {
        self.sec += 1;
        if self.sec < 60 {
            return;
        }
        self.sec = 0;
        self.min += 1;
        if self.min < 60 {
            return;
        }
        self.min = 0;
        self.hour += 1;
        if self.hour < 24 {
            return;
        }
        self.hour = 0;
        self.mday += 1;
        if self.mday <= self.days_in_month() {
            return;
        }
        self.mday = 1;
        self.mon += 1;
        if self.mon < 12 {
            return;
        }
        self.mon = 0;
        self.year += 1;
    }
}

/// Walks the calendar forward until every filter of an interval matches.
struct Cursor<'a> {
    interval: &'a SchedulingInterval,
    tm: Tm,
    budget: u32,
}

impl Cursor<'_> {
    fn spend(&mut self) -> Option<()> {
        self.budget = self.budget.checked_sub(1)?;
        Some(())
    }

    fn apply_day(&mut self) -> Option<()> {
        let before = (self.tm.year, self.tm.mon, self.tm.mday);
        while !self.interval.filter_matches(FilterLevel::Day, &mut self.tm) {
            self.spend()?;
            self.tm.mon += 1;
            if self.tm.mon > 11 {
                self.tm.mon = 0;
                self.tm.year += 1;
            }
            self.tm.mday = 1;
        }
        if (self.tm.year, self.tm.mon, self.tm.mday) != before {
            self.tm.hour = 0;
            self.tm.min = 0;
            self.tm.sec = 0;
        }
        Some(())
    }

    fn apply_hour(&mut self) -> Option<()> {
        let before = self.tm.hour;
        while !self.interval.filter_matches(FilterLevel::Hour, &mut self.tm) {
            self.spend()?;
            self.tm.mday += 1;
            self.tm.hour = 0;
            self.apply_day()?;
        }
        if self.tm.hour != before {
            self.tm.min = 0;
            self.tm.sec = 0;
        }
        Some(())
    }

    fn apply_minute(&mut self) -> Option<()> {
        let before = self.tm.min;
        while !self.interval.filter_matches(FilterLevel::Minute, &mut self.tm) {
            self.spend()?;
            self.tm.hour += 1;
            self.tm.min = 0;
            self.apply_hour()?;
        }
        if self.tm.min != before {
            self.tm.sec = 0;
        }
        Some(())
    }

    fn apply_second(&mut self) -> Option<()> {
        while !self.interval.filter_matches(FilterLevel::Second, &mut self.tm) {
            self.spend()?;
            self.tm.min += 1;
            self.tm.sec = 0;
            self.apply_minute()?;
        }
        Some(())
    }
}

/// Parsed interval expression of a check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckInterval {
    /// Base delay in seconds.
    pub simple: u32,
    pub flexible: Vec<FlexibleInterval>,
    pub scheduling: Vec<SchedulingInterval>,
}

impl CheckInterval {
    pub fn parse(text: &str) -> Result<Self, IntervalError> {
        if text.contains("{$") {
            return Err(IntervalError::UnresolvedMacro(text.to_owned()));
        }
        let mut parts = text.split(';');
        let base = parts.next().unwrap_or_default();
        let simple =
            parse_time_suffix(base).ok_or_else(|| IntervalError::Update(base.to_owned()))?;

        let mut interval = Self {
            simple,
            ..Self::default()
        };
        for part in parts {
            if part.starts_with(|c: char| c.is_ascii_digit()) {
                let flexible = part
                    .split_once('/')
                    .and_then(|(delay, period)| {
                        Some(FlexibleInterval {
                            delay: parse_time_suffix(delay)?,
                            period: TimePeriod::parse(period)?,
                        })
                    })
                    .filter(|flexible| flexible.delay != 0 || simple != 0)
                    .ok_or_else(|| IntervalError::Flexible(part.to_owned()))?;
                interval.flexible.push(flexible);
            } else {
                let scheduling = SchedulingInterval::parse(part)
                    .ok_or_else(|| IntervalError::Scheduling(part.to_owned()))?;
                interval.scheduling.push(scheduling);
            }
        }

        let has_custom = !interval.flexible.is_empty() || !interval.scheduling.is_empty();
        if (!has_custom && simple == 0) || i64::from(simple) > SEC_PER_DAY {
            return Err(IntervalError::Update(base.to_owned()));
        }
        Ok(interval)
    }

    pub fn has_scheduling(&self) -> bool {
        !self.scheduling.is_empty()
    }

    /// Delay in effect at `t`: the smallest delay of the flexible intervals
    /// active at `t`, else the base delay.
    pub fn current_delay(&self, t: i64, tz: FixedOffset) -> u32 {
        let Some((day, time)) = local_day_time(t, tz) else {
            return self.simple;
        };
        self.flexible
            .iter()
            .filter(|flexible| flexible.period.contains(day, time))
            .map(|flexible| flexible.delay)
            .min()
            .unwrap_or(self.simple)
    }

    /// Start of the next flexible period boundary after `t`, if any.
    pub fn next_delay_change(&self, t: i64, tz: FixedOffset) -> Option<i64> {
        let (day, time) = local_day_time(t, tz)?;
        let day = i64::from(day);
        self.flexible
            .iter()
            .map(|flexible| {
                let p = &flexible.period;
                let (start_day, end_day) = (i64::from(p.start_day), i64::from(p.end_day));
                if start_day <= day && day <= end_day && time < p.end_time {
                    if time < p.start_time {
                        p.start_time
                    } else {
                        p.end_time
                    }
                } else if day < end_day {
                    if day < start_day {
                        SEC_PER_DAY * (start_day - day) + p.start_time
                    } else {
                        SEC_PER_DAY + p.start_time
                    }
                } else {
                    SEC_PER_DAY * (start_day + 7 - day) + p.start_time
                }
            })
            .min()
            .map(|next| t - time + next)
    }

    /// First scheduling interval position after `now`.
    pub fn scheduled_nextcheck(&self, now: i64, tz: FixedOffset) -> Option<i64> {
        self.scheduling
            .iter()
            .filter_map(|scheduling| scheduling.nextcheck(now, tz))
            .min()
    }

    /// Next execution time of a check seeded with `seed`.
    ///
    /// Fixed delays align to `delay * (now / delay) + seed % delay`; the
    /// result is always after `now`. Checks that never run get [`NEVER`].
    pub fn nextcheck(&self, seed: u64, now: i64, tz: FixedOffset) -> i64 {
        let scheduled = self.scheduled_nextcheck(now, tz);

        let mut nextcheck = NEVER;
        let mut t = now;
        let tmax = now + SEC_PER_YEAR;
        let mut attempt = 0;

        while t < tmax {
            let delay = i64::from(self.current_delay(t, tz));
            nextcheck = if delay != 0 {
                let mut next = delay * t.div_euclid(delay) + (seed % delay as u64) as i64;
                if attempt == 0 {
                    while next <= t {
                        next += delay;
                    }
                } else {
                    while next < t {
                        next += delay;
                    }
                }
                next
            } else {
                NEVER
            };

            match self.next_delay_change(t, tz) {
                Some(change) if nextcheck >= change => {
                    t = change;
                    attempt += 1;
                }
                _ => break,
            }
        }

        match scheduled {
            Some(scheduled) if scheduled < nextcheck => scheduled,
            _ => nextcheck,
        }
    }

    /// Next execution time of a check whose interface is suppressed until
    /// `disable_until`.
    pub fn nextcheck_unreachable(&self, disable_until: i64, tz: FixedOffset) -> i64 {
        let scheduled = self.scheduled_nextcheck(disable_until, tz);
        let mut nextcheck = disable_until;
        let tmax = disable_until + SEC_PER_YEAR;

        if !self.flexible.is_empty() {
            while nextcheck < tmax {
                if self.current_delay(nextcheck, tz) != 0 {
                    break;
                }
                match self.next_delay_change(nextcheck, tz) {
                    Some(change) => nextcheck = change,
                    None => {
                        nextcheck = NEVER;
                        break;
                    }
                }
            }
        }

        match scheduled {
            Some(scheduled) if scheduled < nextcheck => scheduled,
            _ => nextcheck,
        }
    }
}

/// Weekday (Monday = 1) and seconds since local midnight.
fn local_day_time(t: i64, tz: FixedOffset) -> Option<(u8, i64)> {
    let local = DateTime::from_timestamp(t, 0)?.with_timezone(&tz);
    let day = local.weekday().number_from_monday() as u8;
    Some((day, i64::from(local.num_seconds_from_midnight())))
}

/// Next poll time of a passive proxy area, spread by proxy id.
pub fn proxy_nextcheck(proxyid: u64, delay: i64, now: i64) -> i64 {
    if delay <= 0 {
        return now + 1;
    }
    let mut nextcheck = delay * now.div_euclid(delay) + (proxyid % delay as u64) as i64;
    while nextcheck <= now {
        nextcheck += delay;
    }
    nextcheck
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn ts(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> i64 {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap().timestamp()
    }

    #[test]
    fn time_suffixes() {
        assert_eq!(parse_time_suffix("30"), Some(30));
        assert_eq!(parse_time_suffix("5m"), Some(300));
        assert_eq!(parse_time_suffix("1w"), Some(604800));
        assert_eq!(parse_time_suffix("1y"), None);
        assert_eq!(parse_time_suffix("m"), None);
        assert_eq!(parse_time_suffix(""), None);
    }

    #[test]
    fn parses_mixed_expression() {
        let interval = CheckInterval::parse("60s;10s/1-5,09:00-18:00;wd6-7h10").unwrap();
        assert_eq!(interval.simple, 60);
        assert_eq!(interval.flexible.len(), 1);
        assert_eq!(interval.flexible[0].delay, 10);
        assert_eq!(interval.scheduling.len(), 1);
    }

    #[test]
    fn rejects_bad_expressions() {
        assert!(matches!(
            CheckInterval::parse("0"),
            Err(IntervalError::Update(_))
        ));
        assert!(matches!(
            CheckInterval::parse("2d"),
            Err(IntervalError::Update(_))
        ));
        assert!(matches!(
            CheckInterval::parse("0;0/1-7,00:00-24:00"),
            Err(IntervalError::Flexible(_))
        ));
        assert!(matches!(
            CheckInterval::parse("1m;5s/7-1,00:00-10:00"),
            Err(IntervalError::Flexible(_))
        ));
        assert!(matches!(
            CheckInterval::parse("{$DELAY}"),
            Err(IntervalError::UnresolvedMacro(_))
        ));
        for bad in ["h1/2", "h25", "h0-23/24", "hh", "wd1md1", "h1h2", "m5h1", "md1,", "wd8"] {
            assert!(
                matches!(
                    CheckInterval::parse(&format!("0;{bad}")),
                    Err(IntervalError::Scheduling(_))
                ),
                "{bad}"
            );
        }
        assert!(CheckInterval::parse("0;md1wd1").is_ok());
        assert!(CheckInterval::parse("0;/5").is_err());
        assert!(CheckInterval::parse("0;m/5").is_ok());
    }

    #[test]
    fn fixed_delay_aligns_to_seed() {
        let interval = CheckInterval::parse("60s").unwrap();
        let now = ts(2024, 3, 1, 12, 0, 30);
        let next = interval.nextcheck(7, now, utc());
        assert_eq!(next, ts(2024, 3, 1, 12, 1, 7));
    }

    #[test]
    fn zero_delay_never_runs() {
        let interval = CheckInterval::parse("0;h9").unwrap();
        let now = ts(2024, 3, 1, 12, 0, 0);
        assert_eq!(interval.nextcheck(1, now, utc()), ts(2024, 3, 2, 9, 0, 0));
    }

    #[test]
    fn flexible_interval_switches_delay() {
        // Friday 2024-03-01; 10s delay only during business hours.
        let interval = CheckInterval::parse("1h;10s/1-5,09:00-18:00").unwrap();
        let inside = ts(2024, 3, 1, 12, 0, 0);
        assert_eq!(interval.nextcheck(3, inside, utc()), inside + 3);

        // Saturday falls back to the base delay.
        let outside = ts(2024, 3, 2, 12, 0, 0);
        let next = interval.nextcheck(3, outside, utc());
        assert_eq!(next, ts(2024, 3, 2, 12, 0, 3));

        // The last base slot before the period starts is cut short by it.
        let morning = ts(2024, 3, 4, 8, 30, 0);
        assert_eq!(interval.nextcheck(3, morning, utc()), ts(2024, 3, 4, 9, 0, 3));
    }

    #[test]
    fn flexible_zero_delay_waits_for_period_end() {
        let interval = CheckInterval::parse("30s;0/1-7,00:00-06:00").unwrap();
        let night = ts(2024, 3, 1, 2, 0, 0);
        assert_eq!(interval.nextcheck(0, night, utc()), ts(2024, 3, 1, 6, 0, 0));
    }

    #[test]
    fn scheduling_positions() {
        let now = ts(2024, 3, 1, 12, 7, 0);
        let cases = [
            ("0;h9", ts(2024, 3, 2, 9, 0, 0)),
            ("0;m0-59/15", ts(2024, 3, 1, 12, 15, 0)),
            ("0;wd1h9", ts(2024, 3, 4, 9, 0, 0)),
            ("0;md31", ts(2024, 3, 31, 0, 0, 0)),
            ("0;h12m7s30", ts(2024, 3, 1, 12, 7, 30)),
            ("0;h9;h13", ts(2024, 3, 1, 13, 0, 0)),
        ];
        for (text, expected) in cases {
            let interval = CheckInterval::parse(text).unwrap();
            assert_eq!(interval.nextcheck(0, now, utc()), expected, "{text}");
        }
    }

    #[test]
    fn month_day_overflow_moves_to_next_month() {
        let interval = CheckInterval::parse("0;md30").unwrap();
        let now = ts(2024, 2, 15, 0, 0, 0);
        assert_eq!(interval.nextcheck(0, now, utc()), ts(2024, 3, 30, 0, 0, 0));
    }

    #[test]
    fn fixed_offset_timezone() {
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let interval = CheckInterval::parse("0;h9").unwrap();
        let now = ts(2024, 3, 1, 12, 0, 0);
        assert_eq!(interval.nextcheck(0, now, tz), ts(2024, 3, 2, 7, 0, 0));
    }

    #[test]
    fn unreachable_skips_zero_delay_periods() {
        let interval = CheckInterval::parse("30s;0/1-7,00:00-06:00").unwrap();
        let until = ts(2024, 3, 1, 2, 0, 0);
        assert_eq!(
            interval.nextcheck_unreachable(until, utc()),
            ts(2024, 3, 1, 6, 0, 0)
        );
        let plain = CheckInterval::parse("30s").unwrap();
        assert_eq!(plain.nextcheck_unreachable(until, utc()), until);
    }

    #[test]
    fn proxy_nextcheck_is_spread_by_id() {
        assert_eq!(proxy_nextcheck(7, 10, 100), 107);
        assert_eq!(proxy_nextcheck(3, 10, 103), 113);
    }

    proptest! {
        #[test]
        fn fixed_nextcheck_is_future_and_seeded(
            delay in 1u32..=86400,
            seed in any::<u64>(),
            now in 0i64..2_000_000_000,
        ) {
            let interval = CheckInterval { simple: delay, ..CheckInterval::default() };
            let next = interval.nextcheck(seed, now, utc());
            prop_assert!(next > now);
            prop_assert!(next <= now + i64::from(delay));
            prop_assert_eq!(next.rem_euclid(i64::from(delay)), (seed % u64::from(delay)) as i64);
        }

        #[test]
        fn scheduling_nextcheck_is_future(
            hour in 0u32..24,
            minute in 0u32..60,
            now in 0i64..2_000_000_000,
        ) {
            let interval = CheckInterval::parse(&format!("0;h{hour}m{minute}")).unwrap();
            let next = interval.nextcheck(0, now, utc());
            prop_assert!(next > now);
            prop_assert!(next <= now + SEC_PER_DAY);
        }
    }
}
