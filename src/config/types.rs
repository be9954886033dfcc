//! Service dependants configuration
//!
//! The document maps each watched service to the workloads that must be
//! rolled once the service becomes available again:
//!
//! ```yaml
//! minReadySeconds: 10
//! services:
//!   mariadb:
//!     namespace: openstack
//!     minReadySeconds: 30
//!     dependants:
//!       - kind: Deployment
//!         name: keystone
//!       - kind: StatefulSet
//!         name: nova-api
//!         namespace: compute
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root of the restarter configuration
///
/// Decoded once at startup and never mutated afterwards. The restarter loop
/// owns the value (usually behind an `Arc`).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDependants {
    /// Soak time applied to every service without its own override
    #[serde(default)]
    pub min_ready_seconds: i32,

    /// Watched services keyed by the name of their Service/Endpoints object
    #[serde(default)]
    pub services: BTreeMap<String, ServiceConfig>,
}

/// Restart parameters and dependants of a single service
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    /// Namespace of the service; the restarter's namespace when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Per-service override of [`ServiceDependants::min_ready_seconds`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_ready_seconds: Option<i32>,

    pub dependants: Vec<Dependant>,
}

impl ServiceConfig {
    pub fn effective_min_ready_seconds(&self, global: i32) -> i32 {
        self.min_ready_seconds.unwrap_or(global)
    }

    pub fn namespace_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.namespace.as_deref().unwrap_or(default)
    }
}

/// A workload rolled when its service recovers
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dependant {
    pub kind: DependantKind,
    pub name: String,

    /// Namespace of the workload; the service's namespace when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl Dependant {
    pub fn namespace_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.namespace.as_deref().unwrap_or(default)
    }
}

/// Workload kinds that carry a pod template and can be rolled
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DependantKind {
    Deployment,
    StatefulSet,
    DaemonSet,
}

impl std::fmt::Display for DependantKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DependantKind::Deployment => write!(f, "Deployment"),
            DependantKind::StatefulSet => write!(f, "StatefulSet"),
            DependantKind::DaemonSet => write!(f, "DaemonSet"),
        }
    }
}

/// A single problem found by [`ServiceDependants::validate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl ConfigValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl ServiceDependants {
    /// Semantic checks on top of decoding.
    ///
    /// Decoding only guarantees the shape of the document. This catches values
    /// that decode fine but make no sense to the restarter, such as negative
    /// soak times or services without dependants.
    pub fn validate(&self) -> Result<(), Vec<ConfigValidationError>> {
        let mut errors = Vec::new();

        if self.min_ready_seconds < 0 {
            errors.push(ConfigValidationError::new(
                "minReadySeconds",
                "must not be negative",
            ));
        }

        for (service, config) in &self.services {
            if service.trim().is_empty() {
                errors.push(ConfigValidationError::new(
                    "services",
                    "service name must not be empty",
                ));
            }

            if matches!(config.min_ready_seconds, Some(s) if s < 0) {
                errors.push(ConfigValidationError::new(
                    format!("services.{service}.minReadySeconds"),
                    "must not be negative",
                ));
            }

            if config.dependants.is_empty() {
                errors.push(ConfigValidationError::new(
                    format!("services.{service}.dependants"),
                    "at least one dependant is required",
                ));
            }

            for (i, dependant) in config.dependants.iter().enumerate() {
                if dependant.name.trim().is_empty() {
                    errors.push(ConfigValidationError::new(
                        format!("services.{service}.dependants[{i}].name"),
                        "must not be empty",
                    ));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Total number of dependants across all services
    pub fn dependant_count(&self) -> usize {
        self.services.values().map(|s| s.dependants.len()).sum()
    }
}
