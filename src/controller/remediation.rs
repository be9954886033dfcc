//! Crashloop remediation
//!
//! Force-deletes crashlooping pods of configured dependants so their owning
//! workload schedules a fresh replacement. Pods of workloads not named in the
//! config are never touched.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};
use kube::{
    api::{Api, DeleteParams, ListParams},
    Client, ResourceExt,
};
use tracing::{debug, info, instrument, warn};

use crate::config::{Dependant, DependantKind};
use crate::error::{Error, Result};
use crate::health::should_delete_pod;

/// Check if a label set satisfies a workload selector
///
/// An empty selector matches nothing, so a workload without a usable
/// selector never has its pods deleted.
pub fn selector_matches(selector: &LabelSelector, labels: &BTreeMap<String, String>) -> bool {
    if is_empty_selector(selector) {
        return false;
    }

    let labels_match = selector
        .match_labels
        .iter()
        .flatten()
        .all(|(k, v)| labels.get(k) == Some(v));

    labels_match
        && selector
            .match_expressions
            .iter()
            .flatten()
            .all(|req| requirement_matches(req, labels))
}

fn requirement_matches(req: &LabelSelectorRequirement, labels: &BTreeMap<String, String>) -> bool {
    let value = labels.get(&req.key);
    let in_values = |v: &String| req.values.iter().flatten().any(|candidate| candidate == v);
    match req.operator.as_str() {
        "In" => value.is_some_and(in_values),
        "NotIn" => !value.is_some_and(in_values),
        "Exists" => value.is_some(),
        "DoesNotExist" => value.is_none(),
        _ => false,
    }
}

fn is_empty_selector(selector: &LabelSelector) -> bool {
    selector.match_labels.as_ref().map_or(true, |m| m.is_empty())
        && selector
            .match_expressions
            .as_ref()
            .map_or(true, |e| e.is_empty())
}

/// Render a workload selector in label selector query syntax
pub fn selector_query(selector: &LabelSelector) -> String {
    let labels = selector
        .match_labels
        .iter()
        .flatten()
        .map(|(k, v)| format!("{k}={v}"));

    let expressions = selector
        .match_expressions
        .iter()
        .flatten()
        .filter_map(|req| {
            let values = req.values.clone().unwrap_or_default().join(",");
            match req.operator.as_str() {
                "In" => Some(format!("{} in ({})", req.key, values)),
                "NotIn" => Some(format!("{} notin ({})", req.key, values)),
                "Exists" => Some(req.key.clone()),
                "DoesNotExist" => Some(format!("!{}", req.key)),
                _ => None,
            }
        });

    labels.chain(expressions).collect::<Vec<_>>().join(",")
}

/// Pick the pods of a dependant the restarter has to delete
pub fn pods_to_delete<'a>(pods: &'a [Pod], selector: &LabelSelector) -> Vec<&'a Pod> {
    pods.iter()
        .filter(|p| selector_matches(selector, p.labels()))
        .filter(|p| should_delete_pod(p))
        .collect()
}

/// Fetch the pod selector of a dependant workload
///
/// Returns `None` when the workload does not exist.
async fn dependant_selector(
    client: &Client,
    dependant: &Dependant,
    namespace: &str,
) -> Result<Option<LabelSelector>> {
    let name = dependant.name.as_str();
    let selector = match dependant.kind {
        DependantKind::Deployment => Api::<Deployment>::namespaced(client.clone(), namespace)
            .get_opt(name)
            .await?
            .and_then(|w| w.spec)
            .map(|s| s.selector),
        DependantKind::StatefulSet => Api::<StatefulSet>::namespaced(client.clone(), namespace)
            .get_opt(name)
            .await?
            .and_then(|w| w.spec)
            .map(|s| s.selector),
        DependantKind::DaemonSet => Api::<DaemonSet>::namespaced(client.clone(), namespace)
            .get_opt(name)
            .await?
            .and_then(|w| w.spec)
            .map(|s| s.selector),
    };
    Ok(selector)
}

/// Delete the crashlooping pods of one dependant workload
///
/// Returns the number of pods deleted (or that would have been deleted
/// under dry-run). A failure to delete one pod is logged and does not stop
/// the others.
#[instrument(skip(client), fields(kind = %dependant.kind, name = %dependant.name))]
pub async fn remediate_dependant(
    client: &Client,
    dependant: &Dependant,
    namespace: &str,
    dry_run: bool,
) -> Result<usize> {
    let Some(selector) = dependant_selector(client, dependant, namespace).await? else {
        debug!(
            "{} {}/{} not found, nothing to remediate",
            dependant.kind, namespace, dependant.name
        );
        return Ok(0);
    };
    if is_empty_selector(&selector) {
        warn!(
            "{} {}/{} has an empty selector, skipping remediation",
            dependant.kind, namespace, dependant.name
        );
        return Ok(0);
    }

    let api: Api<Pod> = Api::namespaced(client.clone(), namespace);
    let pods = api
        .list(&ListParams::default().labels(&selector_query(&selector)))
        .await
        .map_err(Error::KubeError)?;

    let candidates = pods_to_delete(&pods.items, &selector);
    debug!(
        "{} of {} pods of {} {}/{} are crashlooping",
        candidates.len(),
        pods.items.len(),
        dependant.kind,
        namespace,
        dependant.name
    );

    let mut deleted = 0;
    for pod in candidates {
        let name = pod.name_any();
        if dry_run {
            info!("[dry-run] Would delete crashlooping pod {}/{}", namespace, name);
            deleted += 1;
            continue;
        }

        match api.delete(&name, &DeleteParams::default()).await {
            Ok(_) => {
                info!("Deleted crashlooping pod {}/{}", namespace, name);
                deleted += 1;
            }
            Err(kube::Error::Api(err)) if err.code == 404 => {
                debug!("Pod {}/{} already gone", namespace, name);
            }
            Err(e) => {
                warn!("Failed to delete pod {}/{}: {:?}", namespace, name, e);
            }
        }
    }

    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use k8s_openapi::api::core::v1::{
        ContainerState, ContainerStateWaiting, ContainerStatus, PodStatus,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
    use kube::api::ObjectMeta;

    use crate::health::CRASH_LOOP_BACK_OFF;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn app_selector(app: &str) -> LabelSelector {
        LabelSelector {
            match_labels: Some(labels(&[("app", app)])),
            match_expressions: None,
        }
    }

    fn requirement(key: &str, operator: &str, values: &[&str]) -> LabelSelectorRequirement {
        LabelSelectorRequirement {
            key: key.to_string(),
            operator: operator.to_string(),
            values: Some(values.iter().map(|v| v.to_string()).collect()),
        }
    }

    fn pod(name: &str, app: &str, reason: &str, deleting: bool) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(labels(&[("app", app)])),
                deletion_timestamp: deleting.then(|| Time(Utc::now())),
                ..Default::default()
            },
            spec: None,
            status: Some(PodStatus {
                container_statuses: Some(vec![ContainerStatus {
                    name: "main".to_string(),
                    state: Some(ContainerState {
                        waiting: Some(ContainerStateWaiting {
                            reason: Some(reason.to_string()),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn test_only_dependant_crashlooping_pods_selected() {
        let pods = vec![
            pod("keystone-1", "keystone", CRASH_LOOP_BACK_OFF, false),
            pod("keystone-2", "keystone", CRASH_LOOP_BACK_OFF, true),
            pod("keystone-3", "keystone", "ImagePullBackOff", false),
            pod("unrelated", "batch-job", CRASH_LOOP_BACK_OFF, false),
        ];

        let names: Vec<String> = pods_to_delete(&pods, &app_selector("keystone"))
            .iter()
            .map(|p| p.name_any())
            .collect();
        assert_eq!(names, vec!["keystone-1".to_string()]);
    }

    #[test]
    fn test_empty_selector_selects_nothing() {
        let pods = vec![pod("crashing", "keystone", CRASH_LOOP_BACK_OFF, false)];

        assert!(pods_to_delete(&pods, &LabelSelector::default()).is_empty());
        assert!(!selector_matches(
            &LabelSelector::default(),
            &labels(&[("app", "keystone")])
        ));
    }

    #[test]
    fn test_match_expressions() {
        let selector = LabelSelector {
            match_labels: Some(labels(&[("app", "nova")])),
            match_expressions: Some(vec![
                requirement("tier", "In", &["api", "worker"]),
                requirement("canary", "DoesNotExist", &[]),
            ]),
        };

        assert!(selector_matches(&selector, &labels(&[("app", "nova"), ("tier", "api")])));
        assert!(!selector_matches(&selector, &labels(&[("app", "nova"), ("tier", "db")])));
        assert!(!selector_matches(
            &selector,
            &labels(&[("app", "nova"), ("tier", "api"), ("canary", "true")])
        ));
        assert!(!selector_matches(&selector, &labels(&[("tier", "api")])));
    }

    #[test]
    fn test_not_in_and_exists() {
        let selector = LabelSelector {
            match_labels: None,
            match_expressions: Some(vec![
                requirement("app", "Exists", &[]),
                requirement("tier", "NotIn", &["db"]),
            ]),
        };

        assert!(selector_matches(&selector, &labels(&[("app", "x")])));
        assert!(selector_matches(&selector, &labels(&[("app", "x"), ("tier", "api")])));
        assert!(!selector_matches(&selector, &labels(&[("app", "x"), ("tier", "db")])));
        assert!(!selector_matches(&selector, &labels(&[("tier", "api")])));
    }

    #[test]
    fn test_selector_query() {
        let selector = LabelSelector {
            match_labels: Some(labels(&[("app", "nova"), ("component", "api")])),
            match_expressions: Some(vec![
                requirement("tier", "In", &["api", "worker"]),
                requirement("zone", "NotIn", &["b"]),
                requirement("managed", "Exists", &[]),
                requirement("canary", "DoesNotExist", &[]),
            ]),
        };

        assert_eq!(
            selector_query(&selector),
            "app=nova,component=api,tier in (api,worker),zone notin (b),managed,!canary"
        );
    }
}
