//! Endpoint readiness

use k8s_openapi::api::core::v1::{EndpointSubset, Endpoints};

/// Check if any subset carries at least one ready address
pub fn is_ready_endpoint_present_in_subsets(subsets: &[EndpointSubset]) -> bool {
    subsets
        .iter()
        .any(|s| s.addresses.as_ref().is_some_and(|a| !a.is_empty()))
}

/// Check if an Endpoints object has any ready backend
pub fn has_ready_endpoint(endpoints: &Endpoints) -> bool {
    endpoints
        .subsets
        .as_deref()
        .map(is_ready_endpoint_present_in_subsets)
        .unwrap_or(false)
}
