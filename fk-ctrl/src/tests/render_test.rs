use clockabilly::{
    Clockable,
    mock::MockUtcClock,
};
use fk_core::prelude::*;

use super::*;
use crate::render::*;

const NOW_RFC3339: &str = "2009-02-13T23:31:30Z";

fn renderer() -> TemplateRenderer {
    TemplateRenderer::new(TemplateOverrides::default()).unwrap()
}

fn pod_input(pod: &corev1::Pod) -> serde_json::Value {
    let clock = MockUtcClock::new(TEST_CREATION_TS);
    build_input(pod, TEST_NODE_IP, Some("10.0.0.5"), clock.now(), TEST_VERSION).unwrap()
}

#[rstest]
fn test_pod_status_defaults(test_pod: corev1::Pod) {
    let status = renderer().render(POD_STATUS_TEMPLATE, &pod_input(&test_pod)).unwrap();

    assert_eq!(status["phase"], "Running");
    assert_eq!(status["hostIP"], TEST_NODE_IP);
    assert_eq!(status["podIP"], "10.0.0.5");
    assert_eq!(status["startTime"], NOW_RFC3339);

    let conditions = status["conditions"].as_array().unwrap();
    assert!(conditions.iter().any(|c| c["type"] == "Ready" && c["status"] == "True"));

    let container_statuses = status["containerStatuses"].as_array().unwrap();
    assert_eq!(container_statuses.len(), 1);
    assert_eq!(container_statuses[0]["name"], "app");
    assert_eq!(container_statuses[0]["ready"], true);
    assert_eq!(container_statuses[0]["state"]["running"]["startedAt"], NOW_RFC3339);
}

#[rstest]
fn test_rendering_is_deterministic(test_pod: corev1::Pod) {
    let renderer = renderer();
    let input = pod_input(&test_pod);

    let first = renderer.render(POD_STATUS_TEMPLATE, &input).unwrap();
    let second = renderer.render(POD_STATUS_TEMPLATE, &input).unwrap();
    assert_eq!(serde_json::to_string(&first).unwrap(), serde_json::to_string(&second).unwrap());
}

#[rstest]
fn test_node_initialize_defaults(test_node: corev1::Node) {
    let clock = MockUtcClock::new(TEST_CREATION_TS);
    let input = build_input(&test_node, TEST_NODE_IP, None, clock.now(), TEST_VERSION).unwrap();
    let status = renderer().render(NODE_INITIALIZE_TEMPLATE, &input).unwrap();

    assert_eq!(status["addresses"][0]["type"], "InternalIP");
    assert_eq!(status["addresses"][0]["address"], TEST_NODE_IP);
    assert_eq!(status["capacity"]["pods"], "1M");
    assert_eq!(status["nodeInfo"]["kubeletVersion"], TEST_VERSION);
    assert_eq!(status["phase"], "Running");
}

#[rstest]
fn test_node_heartbeat_uses_clock(test_node: corev1::Node) {
    let clock = MockUtcClock::new(TEST_CREATION_TS);
    let input = build_input(&test_node, TEST_NODE_IP, None, clock.now(), TEST_VERSION).unwrap();
    let status = renderer().render(NODE_HEARTBEAT_TEMPLATE, &input).unwrap();

    let conditions = status["conditions"].as_array().unwrap();
    assert_eq!(conditions.len(), 5);
    for condition in conditions {
        assert_eq!(condition["lastHeartbeatTime"], NOW_RFC3339);
    }
}

#[rstest]
fn test_render_error_is_an_error(test_node: corev1::Node) {
    // a node run through the pod template has no spec.containers to iterate
    let clock = MockUtcClock::new(TEST_CREATION_TS);
    let input = build_input(&test_node, TEST_NODE_IP, None, clock.now(), TEST_VERSION).unwrap();
    assert!(renderer().render(POD_STATUS_TEMPLATE, &input).is_err());
}
