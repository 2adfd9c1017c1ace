mod ipam_test;
mod render_test;

use std::sync::Arc;
use std::time::Duration;

use clockabilly::mock::MockUtcClock;
use fk_core::k8s::{
    MetaSelector,
    OwnershipPredicate,
};
use fk_testutils::*;

use crate::context::Context;
use crate::heartbeat::HeartbeatScheduler;
use crate::ipam::IpAllocator;
use crate::pool::WorkPool;
use crate::render::StatusRenderer;

pub(crate) fn test_ownership() -> OwnershipPredicate {
    let sel = MetaSelector {
        labels: Some(format!("{MANAGED_LABEL}={MANAGED_LABEL_VALUE}").parse().unwrap()),
        ..Default::default()
    };
    OwnershipPredicate::new(false, sel).unwrap()
}

pub(crate) fn make_test_ctx(
    client: kube::Client,
    renderer: Box<dyn StatusRenderer>,
    allocator: Box<dyn IpAllocator>,
    disregard: Option<MetaSelector>,
) -> Arc<Context> {
    Arc::new(Context {
        client,
        version: TEST_VERSION.into(),
        node_ip: TEST_NODE_IP.into(),

        ownership: test_ownership(),
        disregard,

        nodes: Default::default(),
        pods: Default::default(),

        renderer,
        allocator,
        heartbeats: HeartbeatScheduler::new(Duration::from_secs(30)),

        node_pool: WorkPool::new("node", 4, 64),
        lock_pool: WorkPool::new("lock", 4, 64),
        delete_pool: WorkPool::new("delete", 4, 64),

        clock: Box::new(MockUtcClock::new(TEST_CREATION_TS)),
    })
}
