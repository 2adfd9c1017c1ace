use std::collections::HashMap;
use std::sync::{
    Arc,
    RwLock,
};

use async_trait::async_trait;
use fk_core::backoff::Backoff;
use fk_core::errors::*;
use fk_core::prelude::*;
use fk_core::watch::{
    EventHandler,
    ObjWatcher,
    watch_stream,
};
use kube::api::{
    ListParams,
    Patch,
    PatchParams,
};
use metrics::counter;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::*;

use crate::context::Context;
use crate::pool::WorkItem;
use crate::render::{
    NODE_HEARTBEAT_TEMPLATE,
    NODE_INITIALIZE_TEMPLATE,
    build_input,
};

// The set of nodes this process has claimed, along with the last observed
// object for each; workers render status against this cache rather than
// re-fetching from the apiserver.  Reads vastly outnumber writes: every pod
// event checks its node binding here.
#[derive(Default)]
pub struct NodeRegistry {
    nodes: RwLock<HashMap<String, corev1::Node>>,
}

impl NodeRegistry {
    pub fn contains(&self, name: &str) -> bool {
        self.nodes.read().unwrap().contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<corev1::Node> {
        self.nodes.read().unwrap().get(name).cloned()
    }

    pub fn insert(&self, node: corev1::Node) {
        self.nodes.write().unwrap().insert(node.name_any(), node);
    }

    pub fn remove(&self, name: &str) -> bool {
        self.nodes.write().unwrap().remove(name).is_some()
    }
}

#[derive(Debug)]
pub enum NodeWork {
    Initialize(String),
    Heartbeat(String),
}

impl WorkItem for NodeWork {
    fn key(&self) -> &str {
        match self {
            NodeWork::Initialize(name) | NodeWork::Heartbeat(name) => name,
        }
    }
}

// Startup gate: prove the apiserver is reachable with a minimal one-item
// list before any watch begins.  If this fails through the whole retry
// ladder the process exits.
pub async fn wait_for_apiserver(client: &kube::Client) -> EmptyResult {
    let api = kube::Api::<corev1::Node>::all(client.clone());
    Backoff::default()
        .retry("apiserver readiness probe", || async {
            api.list(&ListParams::default().limit(1)).await?;
            Ok(())
        })
        .await
}

pub fn new_with_stream(ctx: Arc<Context>, ready_tx: mpsc::Sender<bool>) -> ObjWatcher<corev1::Node> {
    let api = kube::Api::<corev1::Node>::all(ctx.client.clone());
    ObjWatcher::new(Box::new(NodeHandler { ctx }), watch_stream(api), ready_tx)
}

pub(crate) struct NodeHandler {
    pub(crate) ctx: Arc<Context>,
}

#[async_trait]
impl EventHandler<corev1::Node> for NodeHandler {
    async fn applied(&mut self, node: corev1::Node, _ts: i64) -> EmptyResult {
        let name = node.name_any();
        let owned = self.ctx.nodes.contains(&name);

        match (owned, self.ctx.ownership.matches(&node.metadata)) {
            (false, true) => {
                info!("claiming node {name}");
                self.ctx.nodes.insert(node);
                self.ctx.node_pool.submit(NodeWork::Initialize(name.clone()));
                self.ctx.heartbeats.register(&name);
            },
            (true, true) => self.ctx.nodes.insert(node),
            (true, false) => {
                info!("releasing node {name}, it no longer matches");
                self.ctx.nodes.remove(&name);
                self.ctx.heartbeats.release(&name);
            },
            (false, false) => (),
        }
        Ok(())
    }

    async fn deleted(&mut self, name: &str, _ts: i64) -> EmptyResult {
        if self.ctx.nodes.remove(name) {
            info!("releasing deleted node {name}");
            self.ctx.heartbeats.release(name);
        }
        Ok(())
    }
}

// Entry point for the mutator pool; a failure here is logged and retried on
// a shortened deadline, it never stops the scheduler.
pub(crate) async fn handle_node_work(ctx: Arc<Context>, work: NodeWork) {
    let (name, template) = match &work {
        NodeWork::Initialize(name) => (name, NODE_INITIALIZE_TEMPLATE),
        NodeWork::Heartbeat(name) => (name, NODE_HEARTBEAT_TEMPLATE),
    };

    match write_node_status(&ctx, name, template).await {
        Ok(true) => {
            ctx.heartbeats.record_success(name);
            counter!(NODE_STATUS_WRITES_METRIC).increment(1);
        },
        Ok(false) => ctx.heartbeats.release(name),  // not ours anymore
        Err(err) => {
            error!("could not write status for node {name}: {err:?}");
            ctx.heartbeats.record_failure(name);
        },
    }
}

async fn write_node_status(ctx: &Context, name: &str, template: &str) -> anyhow::Result<bool> {
    let Some(node) = ctx.nodes.get(name) else {
        return Ok(false);
    };

    let input = build_input(&node, &ctx.node_ip, None, ctx.clock.now(), &ctx.version)?;
    let status = ctx.renderer.render(template, &input)?;

    let api = kube::Api::<corev1::Node>::all(ctx.client.clone());
    api.patch_status(name, &PatchParams::default(), &Patch::Merge(&json!({"status": status})))
        .await?;
    Ok(true)
}
