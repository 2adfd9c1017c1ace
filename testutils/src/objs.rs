use clockabilly::DateTime;
use fk_core::macros::*;
use fk_core::prelude::*;
use rstest::fixture;

use crate::constants::*;

fn fixed_creation_time() -> metav1::Time {
    metav1::Time(DateTime::from_timestamp(TEST_CREATION_TS, 0).unwrap())
}

#[fixture]
pub fn test_node(#[default(TEST_NODE_NAME.into())] name: String) -> corev1::Node {
    corev1::Node {
        metadata: metav1::ObjectMeta {
            name: Some(name),
            annotations: klabel!(MANAGED_ANNOTATION => "true"),
            labels: klabel!(MANAGED_LABEL => MANAGED_LABEL_VALUE),
            creation_timestamp: Some(fixed_creation_time()),
            ..Default::default()
        },
        spec: Some(corev1::NodeSpec { ..Default::default() }),
        status: Some(corev1::NodeStatus { ..Default::default() }),
    }
}

// An unlabeled node, which no selector-based predicate should claim
#[fixture]
pub fn plain_node(#[default("other-node".into())] name: String) -> corev1::Node {
    corev1::Node {
        metadata: metav1::ObjectMeta {
            name: Some(name),
            ..Default::default()
        },
        spec: Some(corev1::NodeSpec { ..Default::default() }),
        status: Some(corev1::NodeStatus { ..Default::default() }),
    }
}

#[fixture]
pub fn test_pod(#[default(TEST_POD_NAME.into())] name: String) -> corev1::Pod {
    corev1::Pod {
        metadata: metav1::ObjectMeta {
            namespace: Some(TEST_NAMESPACE.into()),
            name: Some(name),
            labels: klabel!("foo" => "bar"),
            creation_timestamp: Some(fixed_creation_time()),
            ..Default::default()
        },
        spec: Some(corev1::PodSpec {
            node_name: Some(TEST_NODE_NAME.into()),
            containers: vec![corev1::Container {
                name: "app".into(),
                image: Some("registry.k8s.io/pause:3.9".into()),
                ..Default::default()
            }],
            ..Default::default()
        }),
        status: Some(corev1::PodStatus { ..Default::default() }),
    }
}

pub fn set_deletion_timestamp(pod: &mut corev1::Pod, ts: i64) {
    pod.metadata.deletion_timestamp = Some(metav1::Time(DateTime::from_timestamp(ts, 0).unwrap()));
}
