#![forbid(unsafe_code)]

use super::Status;
use crate::arena::Blob;
use crate::strpool::StrHandle;

code_enum! {
    pub enum TriggerValue {
        Ok = 0,
        Problem = 1,
    }
}

code_enum! {
    pub enum TriggerState {
        Normal = 0,
        Unknown = 1,
    }
}

code_enum! {
    pub enum Severity {
        NotClassified = 0,
        Information = 1,
        Warning = 2,
        Average = 3,
        High = 4,
        Disaster = 5,
    }
}

code_enum! {
    pub enum RecoveryMode {
        Expression = 0,
        RecoveryExpression = 1,
        None = 2,
    }
}

code_enum! {
    pub enum CorrelationMode {
        Disabled = 0,
        Tag = 1,
    }
}

code_enum! {
    /// How a function reads its item.
    pub enum FunctionKind {
        /// Evaluated when new values arrive.
        Value = 0,
        /// Time based, re-evaluated by the timer queue.
        Timer = 1,
        /// Trend aggregate, evaluated once per aggregation period.
        Trend = 2,
    }
}

#[derive(Debug)]
pub struct Trigger {
    pub triggerid: u64,
    pub description: StrHandle,
    pub expression: StrHandle,
    pub recovery_expression: StrHandle,
    /// Serialized evaluation form of `expression`.
    pub expression_bin: Blob,
    pub recovery_expression_bin: Blob,
    pub error: StrHandle,
    pub opdata: StrHandle,
    pub event_name: StrHandle,
    pub correlation_tag: StrHandle,
    pub value: TriggerValue,
    pub state: TriggerState,
    pub status: Status,
    pub priority: Severity,
    pub recovery_mode: RecoveryMode,
    pub correlation_mode: CorrelationMode,
    pub lastchange: i64,
    /// Cleared when a referenced item or host is disabled.
    pub functional: bool,
    /// Set while a worker evaluates the trigger.
    pub locked: bool,
    pub topoindex: u8,
    pub has_timers: bool,
    /// Items referenced by the expressions, computed on first use.
    pub itemids: Option<Vec<u64>>,
    pub revision: u64,
}

impl Trigger {
    pub(crate) fn new(triggerid: u64) -> Self {
        Self {
            triggerid,
            description: StrHandle::unset(),
            expression: StrHandle::unset(),
            recovery_expression: StrHandle::unset(),
            expression_bin: Blob::empty(),
            recovery_expression_bin: Blob::empty(),
            error: StrHandle::unset(),
            opdata: StrHandle::unset(),
            event_name: StrHandle::unset(),
            correlation_tag: StrHandle::unset(),
            value: TriggerValue::Ok,
            state: TriggerState::Normal,
            status: Status::Enabled,
            priority: Severity::NotClassified,
            recovery_mode: RecoveryMode::Expression,
            correlation_mode: CorrelationMode::Disabled,
            lastchange: 0,
            functional: true,
            locked: false,
            topoindex: 1,
            has_timers: false,
            itemids: None,
            revision: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.status == Status::Enabled
    }

    pub(crate) fn into_parts(self) -> (impl Iterator<Item = StrHandle>, [Blob; 2]) {
        (
            [
                self.description,
                self.expression,
                self.recovery_expression,
                self.error,
                self.opdata,
                self.event_name,
                self.correlation_tag,
            ]
            .into_iter(),
            [self.expression_bin, self.recovery_expression_bin],
        )
    }
}

#[derive(Debug)]
pub struct Function {
    pub functionid: u64,
    pub triggerid: u64,
    pub itemid: u64,
    pub name: StrHandle,
    pub parameter: StrHandle,
    pub kind: FunctionKind,
    pub revision: u64,
}

impl Function {
    pub(crate) fn new(functionid: u64) -> Self {
        Self {
            functionid,
            triggerid: 0,
            itemid: 0,
            name: StrHandle::unset(),
            parameter: StrHandle::unset(),
            kind: FunctionKind::Value,
            revision: 0,
        }
    }
}

/// Event correlation rule.
#[derive(Debug)]
pub struct Correlation {
    pub correlationid: u64,
    pub name: StrHandle,
    pub formula: StrHandle,
    pub evaltype: u8,
    pub status: Status,
    pub revision: u64,
}

impl Correlation {
    pub(crate) fn new(correlationid: u64) -> Self {
        Self {
            correlationid,
            name: StrHandle::unset(),
            formula: StrHandle::unset(),
            evaltype: 0,
            status: Status::Enabled,
            revision: 0,
        }
    }
}
