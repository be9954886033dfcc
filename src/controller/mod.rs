//! Restarter loop
//!
//! Consumes the health predicates and the service dependants config to roll
//! dependants of recovered services and delete their crashlooping pods. This is the
//! only part of the crate that talks to the cluster.

mod remediation;
mod restarter;
pub mod rollout;
mod tracker;

pub use remediation::{pods_to_delete, remediate_dependant, selector_matches, selector_query};
pub use restarter::{
    dependant_action, is_service_up, label_selector, reconcile_once, run_restarter,
    DependantAction, RestarterState,
};
pub use rollout::{restart_dependant, restarted_at_patch, RESTARTED_AT_ANNOTATION};
pub use tracker::{ServiceTracker, Transition};
