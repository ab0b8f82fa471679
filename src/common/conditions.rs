use std::fmt::Display;

use k8s_openapi::{
    apimachinery::pkg::apis::meta::v1::{Condition, Time},
    chrono::Utc,
};

pub const CONDITION_STATUS_TRUE: &str = "True";
pub const CONDITION_STATUS_FALSE: &str = "False";
pub const CONDITION_STATUS_UNKNOWN: &str = "Unknown";

pub const PROGRAMMED_CONDITION_TYPE: &str = "Programmed";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteConditionType {
    Accepted,
    ResolvedRefs,
    BackendsProgrammed,
}

impl Display for RouteConditionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteConditionReason {
    Accepted,
    NoMatchingParent,
    NotAllowedByListeners,
    NoMatchingListenerHostname,
    ResolvedRefs,
    InvalidKind,
    BackendNotFound,
    RefNotPermitted,
    BackendsProgrammed,
    BackendsNotProgrammed,
    Programmed,
    NotProgrammed,
}

impl Display for RouteConditionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

pub fn new_condition(type_: impl Into<String>, status: bool, reason: RouteConditionReason, message: impl Into<String>, observed_generation: Option<i64>) -> Condition {
    Condition {
        last_transition_time: Time(Utc::now()),
        message: message.into(),
        observed_generation,
        reason: reason.to_string(),
        status: if status { CONDITION_STATUS_TRUE } else { CONDITION_STATUS_FALSE }.to_owned(),
        type_: type_.into(),
    }
}

/// Condition type reporting whether the objects of one emitted kind are programmed.
pub fn programmed_condition_type(kind: &str) -> String {
    format!("{kind}{PROGRAMMED_CONDITION_TYPE}")
}

pub fn programmed_condition_for_kind(kind: &str, programmed: bool, observed_generation: Option<i64>) -> Condition {
    if programmed {
        new_condition(
            programmed_condition_type(kind),
            true,
            RouteConditionReason::Programmed,
            format!("At least one {kind} is programmed"),
            observed_generation,
        )
    } else {
        new_condition(
            programmed_condition_type(kind),
            false,
            RouteConditionReason::NotProgrammed,
            format!("No {kind} is programmed yet"),
            observed_generation,
        )
    }
}

fn severity(status: &str) -> u8 {
    match status {
        CONDITION_STATUS_FALSE => 0,
        CONDITION_STATUS_TRUE => 2,
        _ => 1,
    }
}

/// Keeps one condition per type, the most severe one (False, then Unknown, then True).
/// The position of the first occurrence of a type is kept.
pub fn deduplicate_by_severity(conditions: impl IntoIterator<Item = Condition>) -> Vec<Condition> {
    let mut deduplicated: Vec<Condition> = vec![];
    for condition in conditions {
        if let Some(existing) = deduplicated.iter_mut().find(|c| c.type_ == condition.type_) {
            if severity(&condition.status) < severity(&existing.status) {
                *existing = condition;
            }
        } else {
            deduplicated.push(condition);
        }
    }
    deduplicated
}

pub fn find_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

pub fn is_condition_true(conditions: &[Condition], type_: &str) -> bool {
    find_condition(conditions, type_).is_some_and(|c| c.status == CONDITION_STATUS_TRUE)
}

/// Replaces `current` with `computed`, carrying over the transition time of every
/// condition whose status did not change. Types missing from `computed` are dropped.
pub fn merge_conditions(current: &[Condition], computed: Vec<Condition>) -> Vec<Condition> {
    computed
        .into_iter()
        .map(|mut condition| {
            if let Some(existing) = find_condition(current, &condition.type_) {
                if existing.status == condition.status {
                    condition.last_transition_time = existing.last_transition_time.clone();
                }
            }
            condition
        })
        .collect()
}
