//! Main restarter loop
//!
//! Periodically evaluates every watched service against the health
//! predicates, rolls the dependants of services that came back up and deletes
//! crashlooping pods of dependants whose service is up.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use k8s_openapi::api::core::v1::{Endpoints, Pod, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::{
    api::{Api, ListParams},
    client::Client,
};
use tracing::{debug, error, info, instrument, warn};

use super::remediation::remediate_dependant;
use super::rollout::restart_dependant;
use super::tracker::{ServiceTracker, Transition};
use crate::config::{ServiceConfig, ServiceDependants};
use crate::error::{Error, Result};
use crate::health::{has_ready_endpoint, is_pod_available};

/// Shared state for the restarter loop
pub struct RestarterState {
    pub client: Client,
    pub config: Arc<ServiceDependants>,
    /// Default namespace for services that do not name one
    pub namespace: String,
    pub interval: Duration,
    pub dry_run: bool,
}

/// Run the restarter until a shutdown signal arrives
pub async fn run_restarter(state: Arc<RestarterState>) -> Result<()> {
    info!(
        "Starting restarter in namespace {} watching {} services every {:?}",
        state.namespace,
        state.config.services.len(),
        state.interval
    );
    if state.dry_run {
        info!("Dry-run mode enabled: no pods will be deleted and no workloads restarted");
    }

    let mut tracker = ServiceTracker::new();
    let mut interval = tokio::time::interval(state.interval);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = reconcile_once(&state, &mut tracker).await {
                    error!("Reconcile error: {:?}", e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received, stopping restarter");
                break;
            }
        }
    }

    Ok(())
}

/// What the loop does with a service's dependants after an observation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DependantAction {
    /// Roll every dependant; fresh pods replace any crashlooping ones
    Restart,
    /// Delete crashlooping pods of the dependants
    Remediate,
    Nothing,
}

/// Decide what to do with the dependants of a service
///
/// Dependants are only touched while their service is up. A crashlooping
/// dependant of a service that is down is expected to recover once the
/// service does, at which point it is rolled anyway.
pub fn dependant_action(transition: Transition, up: bool) -> DependantAction {
    match transition {
        Transition::Recovered => DependantAction::Restart,
        _ if up => DependantAction::Remediate,
        _ => DependantAction::Nothing,
    }
}

/// One pass over all watched services and their dependants
pub async fn reconcile_once(state: &RestarterState, tracker: &mut ServiceTracker) -> Result<()> {
    let now = Time(Utc::now());

    for (name, service) in &state.config.services {
        let namespace = service.namespace_or(&state.namespace);
        let min_ready_seconds = service.effective_min_ready_seconds(state.config.min_ready_seconds);

        let up = match check_service(&state.client, name, namespace, min_ready_seconds, &now).await
        {
            Ok(up) => up,
            Err(e) => {
                warn!("Failed to check service {}/{}: {:?}", namespace, name, e);
                continue;
            }
        };

        let transition = tracker.observe(name, up);
        match transition {
            Transition::FirstSeen => {
                info!("Service {}/{} observed, available: {}", namespace, name, up)
            }
            Transition::Unchanged => debug!("Service {}/{} unchanged", namespace, name),
            Transition::WentDown => warn!("Service {}/{} became unavailable", namespace, name),
            Transition::Recovered => info!(
                "Service {}/{} recovered, restarting {} dependants",
                namespace,
                name,
                service.dependants.len()
            ),
        }

        match dependant_action(transition, up) {
            DependantAction::Restart => restart_dependants(state, service, namespace).await,
            DependantAction::Remediate => remediate_dependants(state, service, namespace).await,
            DependantAction::Nothing => {}
        }
    }

    Ok(())
}

async fn remediate_dependants(state: &RestarterState, service: &ServiceConfig, namespace: &str) {
    for dependant in &service.dependants {
        let dependant_namespace = dependant.namespace_or(namespace);
        match remediate_dependant(&state.client, dependant, dependant_namespace, state.dry_run)
            .await
        {
            Ok(0) => {}
            Ok(deleted) => info!(
                "Remediated {} crashlooping pods of {} {}/{}",
                deleted, dependant.kind, dependant_namespace, dependant.name
            ),
            Err(e) => warn!(
                "Failed to remediate {} {}/{}: {:?}",
                dependant.kind, dependant_namespace, dependant.name, e
            ),
        }
    }
}

/// Check whether a service has a ready endpoint backed by an available pod
#[instrument(skip(client, now))]
async fn check_service(
    client: &Client,
    name: &str,
    namespace: &str,
    min_ready_seconds: i32,
    now: &Time,
) -> Result<bool> {
    let endpoints_api: Api<Endpoints> = Api::namespaced(client.clone(), namespace);
    let endpoints_ready = endpoints_api
        .get_opt(name)
        .await
        .map_err(Error::KubeError)?
        .as_ref()
        .is_some_and(has_ready_endpoint);

    if !endpoints_ready {
        return Ok(false);
    }

    let services_api: Api<Service> = Api::namespaced(client.clone(), namespace);
    let selector = services_api
        .get_opt(name)
        .await
        .map_err(Error::KubeError)?
        .and_then(|s| s.spec)
        .and_then(|spec| spec.selector)
        .filter(|s| !s.is_empty());

    let Some(selector) = selector else {
        // Without a selector the endpoints are managed externally and the
        // only health signal is their presence.
        return Ok(true);
    };

    let pods_api: Api<Pod> = Api::namespaced(client.clone(), namespace);
    let pods = pods_api
        .list(&ListParams::default().labels(&label_selector(&selector)))
        .await
        .map_err(Error::KubeError)?;

    Ok(is_service_up(endpoints_ready, Some(pods.items.as_slice()), min_ready_seconds, now))
}

/// Decide whether a service counts as up
///
/// Endpoints must carry a ready address. When the backing pods are known, at
/// least one of them must also have been ready for `min_ready_seconds`.
pub fn is_service_up(
    endpoints_ready: bool,
    pods: Option<&[Pod]>,
    min_ready_seconds: i32,
    now: &Time,
) -> bool {
    if !endpoints_ready {
        return false;
    }
    match pods {
        Some(pods) => pods
            .iter()
            .any(|p| is_pod_available(p, min_ready_seconds, now)),
        None => true,
    }
}

/// Render a service selector as a label selector string
pub fn label_selector(selector: &BTreeMap<String, String>) -> String {
    selector
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}
