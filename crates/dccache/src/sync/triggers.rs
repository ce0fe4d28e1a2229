#![forbid(unsafe_code)]

use super::RowReader;
use super::engine::{Applied, ApplyResult, Pass};
use crate::domain::{
    Correlation, CorrelationMode, Function, FunctionKind, RecoveryMode, Severity, Status, Trigger,
    TriggerState, TriggerValue, update,
};
use crate::expression;

/// Functions whose value depends on time rather than on new values.
const TIMER_FUNCTIONS: &[&str] = &["nodata", "date", "dayofmonth", "dayofweek", "now", "time"];

pub(crate) fn function_kind(name: &str) -> FunctionKind {
    if name.starts_with("trend") {
        FunctionKind::Trend
    } else if TIMER_FUNCTIONS.contains(&name) {
        FunctionKind::Timer
    } else {
        FunctionKind::Value
    }
}

pub(super) fn upsert_trigger(pass: &mut Pass<'_>, row: &RowReader<'_>) -> ApplyResult {
    let triggerid = row.id();
    let description = row.str("description")?;
    let expression = row.str("expression")?;
    let recovery_expression = row.str("recovery_expression")?;
    let error = row.str("error")?;
    let opdata = row.str("opdata")?;
    let event_name = row.str("event_name")?;
    let correlation_tag = row.str("correlation_tag")?;
    let value = row.code("value", TriggerValue::from_code)?;
    let state = row.code("state", TriggerState::from_code)?;
    let status = row.code("status", Status::from_code)?;
    let priority = row.code("priority", Severity::from_code)?;
    let recovery_mode = row.code("recovery_mode", RecoveryMode::from_code)?;
    let correlation_mode = row.code("correlation_mode", CorrelationMode::from_code)?;
    let lastchange = row.i64("lastchange")?;

    let data = &mut *pass.data;
    let touched = &mut pass.touched;
    let (trigger, found) = data
        .triggers
        .insert_with(triggerid, || Trigger::new(triggerid))?;
    let pool = &mut data.strpool;
    let mut changed = !found;

    changed |= pool.replace(found, &mut trigger.description, description)?;
    if pool.replace(found, &mut trigger.expression, expression)? {
        trigger
            .expression_bin
            .set(&data.arena, expression::compile(expression)?)?;
        trigger.itemids = None;
        touched.triggers_dirty = true;
        changed = true;
    }
    if pool.replace_opt(found, &mut trigger.recovery_expression, recovery_expression)? {
        trigger
            .recovery_expression_bin
            .set(&data.arena, expression::compile(recovery_expression)?)?;
        trigger.itemids = None;
        touched.triggers_dirty = true;
        changed = true;
    }
    changed |= pool.replace_opt(found, &mut trigger.opdata, opdata)?;
    changed |= pool.replace_opt(found, &mut trigger.event_name, event_name)?;
    changed |= pool.replace_opt(found, &mut trigger.correlation_tag, correlation_tag)?;
    if update(&mut trigger.status, status) {
        touched.triggers_dirty = true;
        changed = true;
    }
    changed |= update(&mut trigger.priority, priority);
    changed |= update(&mut trigger.recovery_mode, recovery_mode);
    changed |= update(&mut trigger.correlation_mode, correlation_mode);

    // value, state and error belong to the evaluator once the trigger is cached
    if !found {
        trigger.value = value;
        trigger.state = state;
        trigger.lastchange = lastchange;
        pool.replace_opt(false, &mut trigger.error, error)?;
        touched.topology_dirty = true;
    }

    if changed {
        touched.triggers.insert(triggerid);
    }
    Ok(Applied::from_change(found, changed))
}

pub(super) fn remove_trigger(pass: &mut Pass<'_>, triggerid: u64) -> bool {
    let data = &mut *pass.data;
    let Some(trigger) = data.triggers.remove(triggerid) else {
        return false;
    };
    data.trigger_tags.remove_owner(&mut data.strpool, triggerid);
    let (handles, blobs) = trigger.into_parts();
    data.strpool.release_all(handles);
    for mut blob in blobs {
        blob.clear(&data.arena);
    }
    pass.touched.triggers.remove(&triggerid);
    pass.touched.triggers_dirty = true;
    pass.touched.topology_dirty = true;
    true
}

pub(super) fn upsert_dependency(pass: &mut Pass<'_>, row: &RowReader<'_>) -> ApplyResult {
    let down = row.u64("triggerid_down")?;
    let up = row.u64("triggerid_up")?;
    let data = &mut *pass.data;
    if !data.triggers.contains(down) || !data.triggers.contains(up) {
        return Ok(Applied::Skipped);
    }
    let linkid = row.id();
    let previous = data.topology.link(linkid);
    if !data.topology.add_link(linkid, down, up) {
        return Ok(Applied::Unchanged);
    }
    if let Some((previous_down, _)) = previous {
        pass.touched.triggers.insert(previous_down);
    }
    pass.touched.triggers.insert(down);
    pass.touched.topology_dirty = true;
    Ok(Applied::from_change(previous.is_some(), true))
}

pub(super) fn remove_dependency(pass: &mut Pass<'_>, linkid: u64) -> bool {
    let data = &mut *pass.data;
    let Some((down, _)) = data.topology.link(linkid) else {
        return false;
    };
    data.topology.remove_link(linkid);
    pass.touched.triggers.insert(down);
    pass.touched.topology_dirty = true;
    true
}

pub(super) fn upsert_function(pass: &mut Pass<'_>, row: &RowReader<'_>) -> ApplyResult {
    let functionid = row.id();
    let itemid = row.u64("itemid")?;
    let triggerid = row.u64("triggerid")?;
    let name = row.str("name")?;
    let parameter = row.str("parameter")?;
    let data = &mut *pass.data;
    if !data.items.contains(itemid) || !data.triggers.contains(triggerid) {
        return Ok(Applied::Skipped);
    }

    let touched = &mut pass.touched;
    let (function, found) = data
        .functions
        .insert_with(functionid, || Function::new(functionid))?;
    let pool = &mut data.strpool;
    let mut changed = !found;

    if function.triggerid != triggerid {
        if let Some(functions) = data.functions_by_trigger.get_mut(&function.triggerid) {
            functions.remove(&functionid);
            if functions.is_empty() {
                data.functions_by_trigger.remove(&function.triggerid);
            }
        }
        if found {
            touched.triggers.insert(function.triggerid);
        }
        function.triggerid = triggerid;
        changed = true;
    }
    data.functions_by_trigger
        .entry(triggerid)
        .or_default()
        .insert(functionid);
    changed |= update(&mut function.itemid, itemid);
    changed |= pool.replace(found, &mut function.name, name)?;
    changed |= pool.replace_opt(found, &mut function.parameter, parameter)?;
    changed |= update(&mut function.kind, function_kind(name));

    if changed {
        function.revision = pass.target;
        touched.triggers.insert(triggerid);
        touched.triggers_dirty = true;
        if function.kind != FunctionKind::Value {
            touched.timer_functions.insert(functionid);
        }
    }
    Ok(Applied::from_change(found, changed))
}

pub(super) fn remove_function(pass: &mut Pass<'_>, functionid: u64) -> bool {
    let data = &mut *pass.data;
    let Some(function) = data.functions.remove(functionid) else {
        return false;
    };
    if let Some(functions) = data.functions_by_trigger.get_mut(&function.triggerid) {
        functions.remove(&functionid);
        if functions.is_empty() {
            data.functions_by_trigger.remove(&function.triggerid);
        }
    }
    pass.touched.triggers.insert(function.triggerid);
    pass.touched.triggers_dirty = true;
    pass.touched.timer_functions.remove(&functionid);
    data.strpool.release_all([function.name, function.parameter]);
    true
}

pub(super) fn upsert_tag(pass: &mut Pass<'_>, row: &RowReader<'_>) -> ApplyResult {
    let triggerid = row.u64("triggerid")?;
    let tag = row.str("tag")?;
    let value = row.str("value")?;
    if !pass.data.triggers.contains(triggerid) {
        return Ok(Applied::Skipped);
    }

    let data = &mut *pass.data;
    let found = data
        .trigger_tags
        .for_owner(triggerid)
        .any(|t| t.tagid == row.id());
    let change = data
        .trigger_tags
        .upsert(&mut data.strpool, row.id(), triggerid, tag, value)?;
    if change.changed {
        pass.touched.triggers.insert(triggerid);
    }
    if let Some(previous) = change.previous_owner {
        pass.touched.triggers.insert(previous);
    }
    let found = found || change.previous_owner.is_some();
    Ok(Applied::from_change(found, change.changed))
}

pub(super) fn remove_tag(pass: &mut Pass<'_>, tagid: u64) -> bool {
    let data = &mut *pass.data;
    match data.trigger_tags.remove(&mut data.strpool, tagid) {
        Some(triggerid) => {
            pass.touched.triggers.insert(triggerid);
            true
        }
        None => false,
    }
}

pub(super) fn upsert_correlation(pass: &mut Pass<'_>, row: &RowReader<'_>) -> ApplyResult {
    let correlationid = row.id();
    let name = row.str("name")?;
    let evaltype = row.u8("evaltype")?;
    let formula = row.str("formula")?;
    let status = row.code("status", Status::from_code)?;

    let data = &mut *pass.data;
    let (correlation, found) = data
        .correlations
        .insert_with(correlationid, || Correlation::new(correlationid))?;
    let pool = &mut data.strpool;
    let mut changed = !found;
    changed |= pool.replace(found, &mut correlation.name, name)?;
    changed |= update(&mut correlation.evaltype, evaltype);
    changed |= pool.replace_opt(found, &mut correlation.formula, formula)?;
    changed |= update(&mut correlation.status, status);
    if changed {
        correlation.revision = pass.target;
    }
    Ok(Applied::from_change(found, changed))
}

pub(super) fn remove_correlation(pass: &mut Pass<'_>, correlationid: u64) -> bool {
    let data = &mut *pass.data;
    let Some(correlation) = data.correlations.remove(correlationid) else {
        return false;
    };
    data.strpool
        .release_all([correlation.name, correlation.formula]);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_kinds() {
        assert_eq!(function_kind("last"), FunctionKind::Value);
        assert_eq!(function_kind("nodata"), FunctionKind::Timer);
        assert_eq!(function_kind("trendavg"), FunctionKind::Trend);
        assert_eq!(function_kind("now"), FunctionKind::Timer);
    }
}
