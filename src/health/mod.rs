//! Pod health and restart predicates
//!
//! Pure, side-effect-free checks used by the restarter loop to decide whether
//! a pod counts as available and whether it must be force-deleted.

pub mod conditions;
mod endpoints;
mod pod;

pub use conditions::{
    get_pod_condition, get_pod_condition_from_list, get_pod_ready_condition,
    is_pod_ready_condition_true,
};
pub use endpoints::{has_ready_endpoint, is_ready_endpoint_present_in_subsets};
pub use pod::{
    is_container_in_crash_loop_back_off, is_pod_available, is_pod_deleted,
    is_pod_in_crashloop_backoff, is_pod_ready, should_delete_pod, CRASH_LOOP_BACK_OFF,
};
