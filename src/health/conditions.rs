//! Pod condition lookup following Kubernetes API conventions

use k8s_openapi::api::core::v1::{PodCondition, PodStatus};

/// Pod condition type gating readiness
pub const CONDITION_TYPE_READY: &str = "Ready";

pub const CONDITION_STATUS_TRUE: &str = "True";

/// Check if the pod status carries Ready=True
pub fn is_pod_ready_condition_true(status: &PodStatus) -> bool {
    get_pod_ready_condition(status)
        .map(|c| c.status == CONDITION_STATUS_TRUE)
        .unwrap_or(false)
}

/// Find the Ready condition of a pod status
pub fn get_pod_ready_condition(status: &PodStatus) -> Option<&PodCondition> {
    get_pod_condition(Some(status), CONDITION_TYPE_READY).map(|(_, c)| c)
}

/// Find a condition by type in an optional pod status
///
/// Returns the position of the condition in the list alongside it.
pub fn get_pod_condition<'a>(
    status: Option<&'a PodStatus>,
    type_: &str,
) -> Option<(usize, &'a PodCondition)> {
    let conditions = status?.conditions.as_deref()?;
    get_pod_condition_from_list(conditions, type_)
}

/// Find a condition by type in a list of conditions
///
/// Linear scan; the first entry with a matching type wins when the list
/// contains duplicates.
pub fn get_pod_condition_from_list<'a>(
    conditions: &'a [PodCondition],
    type_: &str,
) -> Option<(usize, &'a PodCondition)> {
    conditions.iter().enumerate().find(|(_, c)| c.type_ == type_)
}
