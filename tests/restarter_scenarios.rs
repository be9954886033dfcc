//! End-to-end scenarios through the public API: load a document from disk,
//! then evaluate pods against the soak time it configures.

use std::io::Write;

use chrono::{Duration, Utc};
use k8s_openapi::api::core::v1::{
    ContainerState, ContainerStateWaiting, ContainerStatus, EndpointAddress, EndpointSubset, Pod,
    PodCondition, PodStatus,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use restarter::config::load_service_dependants;
use restarter::health::{
    is_pod_available, is_ready_endpoint_present_in_subsets, should_delete_pod,
    CRASH_LOOP_BACK_OFF,
};
use restarter::Error;

fn ready_pod(since: Time) -> Pod {
    Pod {
        status: Some(PodStatus {
            conditions: Some(vec![PodCondition {
                type_: "Ready".to_string(),
                status: "True".to_string(),
                last_transition_time: Some(since),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("create temp file");
    file.write_all(contents.as_bytes()).expect("write temp file");
    file
}

#[test]
fn soak_time_from_config_gates_availability() {
    let file = write_config(
        r#"
minReadySeconds: 90
services:
  mariadb:
    minReadySeconds: 30
    dependants:
      - kind: Deployment
        name: keystone
  memcached:
    dependants:
      - kind: Deployment
        name: horizon
"#,
    );
    let config = load_service_dependants(file.path()).expect("config should load");

    let now = Time(Utc::now());
    let pod = ready_pod(Time(now.0 - Duration::seconds(60)));

    let mariadb = config.services["mariadb"].effective_min_ready_seconds(config.min_ready_seconds);
    let memcached =
        config.services["memcached"].effective_min_ready_seconds(config.min_ready_seconds);

    assert!(is_pod_available(&pod, mariadb, &now));
    assert!(!is_pod_available(&pod, memcached, &now));
}

#[test]
fn malformed_document_yields_decode_error() {
    let file = write_config("services:\n  mariadb: [\n");

    let result = load_service_dependants(file.path());
    assert!(matches!(result, Err(Error::DecodeError(_))));
}

#[test]
fn crashlooping_pod_is_deleted_once() {
    let mut pod = Pod {
        status: Some(PodStatus {
            container_statuses: Some(vec![ContainerStatus {
                name: "api".to_string(),
                state: Some(ContainerState {
                    waiting: Some(ContainerStateWaiting {
                        reason: Some(CRASH_LOOP_BACK_OFF.to_string()),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    };

    assert!(should_delete_pod(&pod));

    pod.metadata.deletion_timestamp = Some(Time(Utc::now()));
    assert!(!should_delete_pod(&pod));
}

#[test]
fn endpoint_presence() {
    assert!(!is_ready_endpoint_present_in_subsets(&[]));

    let subsets = vec![EndpointSubset {
        addresses: Some(vec![EndpointAddress {
            ip: "10.0.0.7".to_string(),
            ..Default::default()
        }]),
        ..Default::default()
    }];
    assert!(is_ready_endpoint_present_in_subsets(&subsets));
}
