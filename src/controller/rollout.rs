//! Rolling restarts of dependant workloads
//!
//! Uses the same mechanism as `kubectl rollout restart`: bumping an
//! annotation on the pod template makes the workload controller replace
//! every pod.

use chrono::{DateTime, Utc};
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use kube::{
    api::{Api, Patch, PatchParams},
    Client,
};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{info, instrument};

use crate::config::{Dependant, DependantKind};
use crate::error::{Error, Result};

/// Pod template annotation bumped to trigger a rollout
pub const RESTARTED_AT_ANNOTATION: &str = "kubectl.kubernetes.io/restartedAt";

/// Field manager recorded on restart patches
pub const FIELD_MANAGER: &str = "pod-restarter";

/// Merge patch setting the restart annotation on a pod template
pub fn restarted_at_patch(now: DateTime<Utc>) -> serde_json::Value {
    let mut annotations = serde_json::Map::new();
    annotations.insert(RESTARTED_AT_ANNOTATION.to_string(), json!(now.to_rfc3339()));

    json!({
        "spec": {
            "template": {
                "metadata": {
                    "annotations": annotations
                }
            }
        }
    })
}

/// Roll a single dependant workload
#[instrument(skip(client), fields(kind = %dependant.kind, name = %dependant.name))]
pub async fn restart_dependant(
    client: &Client,
    dependant: &Dependant,
    namespace: &str,
    now: DateTime<Utc>,
    dry_run: bool,
) -> Result<()> {
    if dry_run {
        info!(
            "[dry-run] Would restart {} {}/{}",
            dependant.kind, namespace, dependant.name
        );
        return Ok(());
    }

    let patch = restarted_at_patch(now);
    match dependant.kind {
        DependantKind::Deployment => {
            patch_workload::<Deployment>(client, namespace, &dependant.name, &patch).await?
        }
        DependantKind::StatefulSet => {
            patch_workload::<StatefulSet>(client, namespace, &dependant.name, &patch).await?
        }
        DependantKind::DaemonSet => {
            patch_workload::<DaemonSet>(client, namespace, &dependant.name, &patch).await?
        }
    }

    info!(
        "Restarted {} {}/{}",
        dependant.kind, namespace, dependant.name
    );
    Ok(())
}

async fn patch_workload<K>(
    client: &Client,
    namespace: &str,
    name: &str,
    patch: &serde_json::Value,
) -> Result<()>
where
    K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>
        + Clone
        + DeserializeOwned
        + std::fmt::Debug,
    <K as kube::Resource>::DynamicType: Default,
{
    let api: Api<K> = Api::namespaced(client.clone(), namespace);
    api.patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(patch))
        .await
        .map_err(Error::KubeError)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_restarted_at_patch_shape() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let patch = restarted_at_patch(now);

        assert_eq!(
            patch["spec"]["template"]["metadata"]["annotations"][RESTARTED_AT_ANNOTATION],
            "2024-03-01T12:00:00+00:00"
        );
    }
}
