use assertables::*;

use super::*;

#[rstest]
fn test_namespaced_name(test_pod: corev1::Pod) {
    assert_eq!(test_pod.namespaced_name(), format!("{TEST_NAMESPACE}/{TEST_POD_NAME}"));
}

#[rstest]
fn test_namespaced_name_cluster_scoped(test_node: corev1::Node) {
    assert_eq!(test_node.namespaced_name(), TEST_NODE_NAME);
}

#[rstest]
#[case::plain("the-pod", "", "the-pod")]
#[case::namespaced("test/the-pod", "test", "the-pod")]
fn test_split_namespaced_name(#[case] input: &str, #[case] ns: &str, #[case] name: &str) {
    assert_eq!(split_namespaced_name(input), (ns.to_string(), name.to_string()));
}

#[rstest]
fn test_pod_ext(test_pod: corev1::Pod) {
    assert_some!(test_pod.node_name());
    assert_eq!(test_pod.node_name(), Some(TEST_NODE_NAME));
    assert_none!(test_pod.pod_ip());
    assert_ok!(test_pod.spec());
}

#[rstest]
fn test_pod_ext_missing_spec(mut test_pod: corev1::Pod) {
    test_pod.spec = None;
    assert_err!(test_pod.spec());
    assert_none!(test_pod.node_name());
}
