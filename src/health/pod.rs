//! Availability and crashloop predicates for pods
//!
//! All functions here are pure: they read the snapshot they are given and the
//! `now` supplied by the caller, and never consult the wall clock.

use chrono::Duration;
use k8s_openapi::api::core::v1::{ContainerState, Pod, PodStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

use super::conditions::{get_pod_ready_condition, is_pod_ready_condition_true};

/// Waiting reason the kubelet reports for a container stuck restarting
pub const CRASH_LOOP_BACK_OFF: &str = "CrashLoopBackOff";

/// Check if a pod is available
///
/// A pod must be ready to be available. On top of that it is available when
/// either:
/// 1. `min_ready_seconds == 0`, or
/// 2. the Ready condition has a transition time and
///    `last_transition_time + min_ready_seconds < now`.
///
/// The first case holds even when the transition time is unset.
pub fn is_pod_available(pod: &Pod, min_ready_seconds: i32, now: &Time) -> bool {
    if !is_pod_ready(pod) {
        return false;
    }

    if min_ready_seconds == 0 {
        return true;
    }

    let min_ready = Duration::seconds(i64::from(min_ready_seconds));
    pod.status
        .as_ref()
        .and_then(get_pod_ready_condition)
        .and_then(|c| c.last_transition_time.as_ref())
        .map(|t| t.0 + min_ready < now.0)
        .unwrap_or(false)
}

/// Check if a pod is ready
pub fn is_pod_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .map(is_pod_ready_condition_true)
        .unwrap_or(false)
}

/// Check if a pod has already been marked for deletion
pub fn is_pod_deleted(pod: &Pod) -> bool {
    pod.metadata.deletion_timestamp.is_some()
}

/// Check if a pod should be force-deleted
///
/// Pods already being torn down are never candidates.
pub fn should_delete_pod(pod: &Pod) -> bool {
    !is_pod_deleted(pod)
        && pod
            .status
            .as_ref()
            .map(is_pod_in_crashloop_backoff)
            .unwrap_or(false)
}

/// Check if any container of the pod is in crashloop backoff
pub fn is_pod_in_crashloop_backoff(status: &PodStatus) -> bool {
    status
        .container_statuses
        .iter()
        .flatten()
        .filter_map(|cs| cs.state.as_ref())
        .any(is_container_in_crash_loop_back_off)
}

pub fn is_container_in_crash_loop_back_off(state: &ContainerState) -> bool {
    state
        .waiting
        .as_ref()
        .and_then(|w| w.reason.as_deref())
        == Some(CRASH_LOOP_BACK_OFF)
}
