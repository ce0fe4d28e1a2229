#![forbid(unsafe_code)]

//! Trigger timer queue.
//!
//! Time based and trend functions are re-evaluated on a timer rather than
//! when new values arrive. Timers are keyed by function and ordered by
//! (execution time, trigger, evaluation time), so the timers of one trigger
//! that share an evaluation time sit next to each other and can be handed
//! out together.

use super::seconds;
use crate::data::ConfigData;
use crate::domain::{Function, FunctionKind};
use crate::interval::{SEC_PER_DAY, SEC_PER_HOUR, SEC_PER_MIN, SEC_PER_WEEK, SEC_PER_YEAR};
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, trace};

code_enum! {
    pub enum TimerKind {
        Timer = 0,
        Trend = 1,
    }
}

impl TimerKind {
    fn of(kind: FunctionKind) -> Option<Self> {
        match kind {
            FunctionKind::Value => None,
            FunctionKind::Timer => Some(Self::Timer),
            FunctionKind::Trend => Some(Self::Trend),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerTimer {
    pub functionid: u64,
    pub triggerid: u64,
    pub kind: TimerKind,
    /// Wall clock time the timer fires at.
    pub exec_ts: i64,
    /// History time the trigger is evaluated for.
    pub eval_ts: i64,
    /// Revision of the function the timer was computed from.
    pub revision: u64,
    /// Set when handing out the timer locked its trigger.
    pub lock: bool,
    pub parameter: String,
}

impl TriggerTimer {
    fn key(&self) -> (i64, u64, i64) {
        (self.exec_ts, self.triggerid, self.eval_ts)
    }
}

/// Aggregation period of a trend function, from the `now/<unit>` anchor of
/// its period parameter. Hourly when there is none.
fn trend_period(parameter: &str) -> i64 {
    let unit = parameter
        .find("now/")
        .and_then(|pos| parameter[pos + 4..].chars().next());
    match unit {
        Some('d') => SEC_PER_DAY,
        Some('w') => SEC_PER_WEEK,
        Some('M') => 30 * SEC_PER_DAY,
        Some('y') => SEC_PER_YEAR,
        _ => SEC_PER_HOUR,
    }
}

/// Next firing of a function after `now`, spread by trigger id.
fn next_timer(
    data: &ConfigData,
    function: &Function,
    kind: TimerKind,
    now: i64,
) -> TriggerTimer {
    let triggerid = function.triggerid;
    let (exec_ts, eval_ts) = match kind {
        TimerKind::Timer => {
            let period = seconds(data.options.timing.timer_interval).max(1);
            let mut next = period * now.div_euclid(period) + (triggerid % period as u64) as i64;
            while next <= now {
                next += period;
            }
            (next, next)
        }
        TimerKind::Trend => {
            // periods start at local midnight
            let offset = i64::from(data.settings.timezone.local_minus_utc());
            let period = trend_period(&function.parameter);
            let local = now + offset;
            let eval_ts = local - local.rem_euclid(period) + period - offset;
            // trends of the closed period need a moment to be flushed
            (eval_ts + (triggerid % SEC_PER_MIN as u64) as i64, eval_ts)
        }
    };
    TriggerTimer {
        functionid: function.functionid,
        triggerid,
        kind,
        exec_ts,
        eval_ts,
        revision: function.revision,
        lock: false,
        parameter: function.parameter.to_string(),
    }
}

fn push(data: &mut ConfigData, timer: TriggerTimer) {
    trace!(
        functionid = timer.functionid,
        triggerid = timer.triggerid,
        exec_ts = timer.exec_ts,
        "trigger timer queued"
    );
    data.queues.timers.push(timer.functionid, timer.key());
    data.queues.timer_entries.insert(timer.functionid, timer);
}

fn drop_timer(data: &mut ConfigData, functionid: u64) {
    data.queues.timers.remove(functionid);
    data.queues.timer_entries.remove(&functionid);
}

/// (Re)create the timers of changed functions. Functions that no longer
/// need a timer lose it.
pub(crate) fn queue_timers(data: &mut ConfigData, functionids: BTreeSet<u64>, now: i64) {
    for functionid in functionids {
        let timer = data.functions.get(functionid).and_then(|function| {
            TimerKind::of(function.kind).map(|kind| next_timer(data, function, kind, now))
        });
        match timer {
            Some(timer) => push(data, timer),
            None => drop_timer(data, functionid),
        }
    }
}

/// Put back timers restored from a previous run, keeping their times.
pub(crate) fn restore_timers(data: &mut ConfigData, timers: Vec<TriggerTimer>) -> usize {
    let mut restored = 0;
    for mut timer in timers {
        let Some(function) = data.functions.get(timer.functionid) else {
            continue;
        };
        if TimerKind::of(function.kind) != Some(timer.kind) {
            continue;
        }
        timer.triggerid = function.triggerid;
        timer.revision = function.revision;
        timer.parameter = function.parameter.to_string();
        timer.lock = false;
        push(data, timer);
        restored += 1;
    }
    restored
}

/// Queued timers of trend functions.
pub(crate) fn pending_trend_timers(data: &ConfigData) -> Vec<TriggerTimer> {
    let mut timers: Vec<_> = data
        .queues
        .timer_entries
        .values()
        .filter(|timer| timer.kind == TimerKind::Trend)
        .cloned()
        .collect();
    timers.sort_by_key(|timer| (timer.key(), timer.functionid));
    timers
}

/// Hand out due timers, locking their triggers.
///
/// At most `hard_limit` timers are returned. Past `soft_limit` only timers
/// of the last trigger with the same evaluation time are added, so a
/// trigger is never evaluated with half of its timers. Timers of triggers
/// locked elsewhere stay queued.
pub(crate) fn claim_timers(
    data: &mut ConfigData,
    now: i64,
    soft_limit: usize,
    hard_limit: usize,
) -> Vec<TriggerTimer> {
    let mut claimed: Vec<TriggerTimer> = Vec::new();
    let mut locked_here = HashSet::new();
    let mut deferred = Vec::new();

    while claimed.len() < hard_limit {
        let Some((functionid, &(exec_ts, triggerid, eval_ts))) = data.queues.timers.peek() else {
            break;
        };
        if exec_ts > now {
            break;
        }
        if claimed.len() >= soft_limit
            && !claimed
                .last()
                .is_some_and(|last| last.triggerid == triggerid && last.eval_ts == eval_ts)
        {
            break;
        }
        data.queues.timers.pop();
        let Some(mut timer) = data.queues.timer_entries.remove(&functionid) else {
            continue;
        };

        let current = data.functions.get(functionid).filter(|function| {
            function.revision == timer.revision && TimerKind::of(function.kind) == Some(timer.kind)
        });
        let Some(function) = current else {
            debug!(functionid, "stale trigger timer dropped");
            continue;
        };
        let Some(trigger) = data.triggers.get_mut(function.triggerid) else {
            continue;
        };
        if !trigger.is_enabled() || !trigger.functional {
            let next = next_timer(data, function, timer.kind, now);
            push(data, next);
            continue;
        }
        if trigger.locked && !locked_here.contains(&triggerid) {
            deferred.push(timer);
            continue;
        }
        if !trigger.locked {
            trigger.locked = true;
            locked_here.insert(triggerid);
            timer.lock = true;
        }
        claimed.push(timer);
    }

    for timer in deferred {
        push(data, timer);
    }
    claimed
}

/// Queue handed out timers for their next firing and release the trigger
/// locks they hold. Timers replaced by a sync in the meantime are dropped.
pub(crate) fn reschedule_timers(data: &mut ConfigData, timers: Vec<TriggerTimer>, now: i64) {
    for timer in timers {
        if timer.lock
            && let Some(trigger) = data.triggers.get_mut(timer.triggerid)
        {
            trigger.locked = false;
        }
        if data.queues.timer_entries.contains_key(&timer.functionid) {
            continue;
        }
        let next = data
            .functions
            .get(timer.functionid)
            .filter(|function| function.revision == timer.revision)
            .and_then(|function| {
                TimerKind::of(function.kind).map(|kind| next_timer(data, function, kind, now))
            });
        if let Some(next) = next {
            push(data, next);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::CacheOptions;
    use crate::domain::Trigger;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn data() -> ConfigData {
        let options = CacheOptions {
            timing: config::Timing {
                timer_interval: Duration::from_secs(30),
                ..config::Timing::default()
            },
            ..CacheOptions::default()
        };
        let mut data = ConfigData::new(&config::Cache::default(), options);
        for triggerid in [100, 200] {
            data.triggers
                .insert_with(triggerid, || Trigger::new(triggerid))
                .unwrap();
        }
        for (functionid, triggerid, kind) in [
            (1, 100, FunctionKind::Timer),
            (2, 100, FunctionKind::Timer),
            (3, 200, FunctionKind::Timer),
            (4, 200, FunctionKind::Value),
        ] {
            let (function, _) = data
                .functions
                .insert_with(functionid, || Function::new(functionid))
                .unwrap();
            function.triggerid = triggerid;
            function.kind = kind;
        }
        data
    }

    #[test]
    fn trend_periods() {
        assert_eq!(trend_period("1h:now/h"), SEC_PER_HOUR);
        assert_eq!(trend_period("1d:now/d-1d"), SEC_PER_DAY);
        assert_eq!(trend_period("1w:now/w"), SEC_PER_WEEK);
        assert_eq!(trend_period(""), SEC_PER_HOUR);
    }

    #[test]
    fn value_functions_get_no_timer() {
        let mut data = data();
        queue_timers(&mut data, BTreeSet::from([1, 2, 3, 4]), 1000);
        assert_eq!(data.queues.timers.len(), 3);
        assert!(!data.queues.timer_entries.contains_key(&4));
        // 100 % 30 = 10, 200 % 30 = 20
        assert_eq!(data.queues.timer_entries[&1].exec_ts, 1030);
        assert_eq!(data.queues.timer_entries[&3].exec_ts, 1010);
    }

    #[test]
    fn soft_limit_keeps_a_trigger_together() {
        let mut data = data();
        queue_timers(&mut data, BTreeSet::from([1, 2, 3]), 1000);

        // the second timer of trigger 100 rides along past the soft limit
        let claimed = claim_timers(&mut data, 2000, 2, 10);
        assert_eq!(claimed[0].functionid, 3);
        let mut ids: Vec<_> = claimed.iter().map(|timer| timer.functionid).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(data.triggers.get(100).unwrap().locked);
        assert_eq!(claimed.iter().filter(|timer| timer.lock).count(), 2);

        reschedule_timers(&mut data, claimed, 2000);
        assert!(!data.triggers.get(100).unwrap().locked);
        assert_eq!(data.queues.timer_entries[&1].exec_ts, 2020);
    }

    #[test]
    fn locked_triggers_are_skipped() {
        let mut data = data();
        queue_timers(&mut data, BTreeSet::from([1, 2, 3]), 1000);
        data.triggers.get_mut(100).unwrap().locked = true;

        let claimed = claim_timers(&mut data, 2000, 10, 10);
        let ids: Vec<_> = claimed.iter().map(|timer| timer.functionid).collect();
        assert_eq!(ids, vec![3]);
        assert!(data.queues.timer_entries.contains_key(&1));
        assert!(data.queues.timer_entries.contains_key(&2));
    }

    #[test]
    fn stale_timers_are_dropped() {
        let mut data = data();
        queue_timers(&mut data, BTreeSet::from([1]), 1000);
        data.functions.get_mut(1).unwrap().revision = 7;

        assert!(claim_timers(&mut data, 2000, 10, 10).is_empty());
        assert!(data.queues.timers.is_empty());
    }
}
