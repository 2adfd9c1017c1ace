use clockabilly::Clockable;
use fk_core::k8s::{
    MetaSelector,
    OwnershipPredicate,
};

use crate::heartbeat::HeartbeatScheduler;
use crate::ipam::IpAllocator;
use crate::nodes::{
    NodeRegistry,
    NodeWork,
};
use crate::pods::PodSet;
use crate::pool::WorkPool;
use crate::render::StatusRenderer;

// Everything the controllers and their workers share.  The singletons
// (registry, pod set, allocator, heartbeat heap) hang off of here rather
// than living in process-global state, so tests can stand up several
// independent controllers in one process.
pub struct Context {
    pub client: kube::Client,
    pub version: String,
    pub node_ip: String,

    pub ownership: OwnershipPredicate,
    pub disregard: Option<MetaSelector>,

    pub nodes: NodeRegistry,
    pub pods: PodSet,

    pub renderer: Box<dyn StatusRenderer>,
    pub allocator: Box<dyn IpAllocator>,
    pub heartbeats: HeartbeatScheduler,

    pub node_pool: WorkPool<NodeWork>,
    pub lock_pool: WorkPool<String>,
    pub delete_pool: WorkPool<String>,

    pub clock: Box<dyn Clockable + Send + Sync>,
}
