use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::{
    Arc,
    RwLock,
};

use async_trait::async_trait;
use fk_core::errors::*;
use fk_core::k8s::split_namespaced_name;
use fk_core::prelude::*;
use fk_core::watch::{
    EventHandler,
    ObjWatcher,
    watch_stream,
};
use kube::api::{
    DeleteParams,
    Patch,
    PatchParams,
};
use metrics::counter;
use serde_json::{
    Value,
    json,
};
use tokio::sync::mpsc;
use tracing::*;

use crate::context::Context;
use crate::render::{
    POD_STATUS_TEMPLATE,
    build_input,
};

// In-memory projection of a pod bound to one of our nodes.  The allocated
// address and the last-written status stick around across events so a
// reconcile that converges to the same bytes issues no write at all.
#[derive(Clone, Debug)]
pub struct ManagedPod {
    pub pod: corev1::Pod,
    pub ip: Option<Ipv4Addr>,
    pub frozen: bool,
    pub last_status: Option<Value>,
}

#[derive(Default)]
pub struct PodSet {
    pods: RwLock<HashMap<String, ManagedPod>>,
}

impl PodSet {
    pub fn get(&self, ns_name: &str) -> Option<ManagedPod> {
        self.pods.read().unwrap().get(ns_name).cloned()
    }

    pub fn remove(&self, ns_name: &str) -> Option<ManagedPod> {
        self.pods.write().unwrap().remove(ns_name)
    }

    pub fn len(&self) -> usize {
        self.pods.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pods.read().unwrap().is_empty()
    }

    // Updates the spec snapshot and freeze flag, preserving whatever the
    // workers have learned about the pod so far
    pub fn upsert(&self, ns_name: &str, pod: corev1::Pod, frozen: bool) {
        let mut pods = self.pods.write().unwrap();
        match pods.get_mut(ns_name) {
            Some(managed) => {
                managed.pod = pod;
                managed.frozen = frozen;
            },
            None => {
                pods.insert(ns_name.into(), ManagedPod { pod, ip: None, frozen, last_status: None });
            },
        }
    }

    pub fn ip_of(&self, ns_name: &str) -> Option<Ipv4Addr> {
        self.pods.read().unwrap().get(ns_name)?.ip
    }

    pub fn set_ip(&self, ns_name: &str, ip: Ipv4Addr) {
        if let Some(managed) = self.pods.write().unwrap().get_mut(ns_name) {
            managed.ip = Some(ip);
        }
    }

    pub fn set_last_status(&self, ns_name: &str, status: Value) {
        if let Some(managed) = self.pods.write().unwrap().get_mut(ns_name) {
            managed.last_status = Some(status);
        }
    }
}

pub fn new_with_stream(ctx: Arc<Context>, ready_tx: mpsc::Sender<bool>) -> ObjWatcher<corev1::Pod> {
    let api = kube::Api::<corev1::Pod>::all(ctx.client.clone());
    ObjWatcher::new(Box::new(PodHandler { ctx }), watch_stream(api), ready_tx)
}

pub(crate) struct PodHandler {
    pub(crate) ctx: Arc<Context>,
}

#[async_trait]
impl EventHandler<corev1::Pod> for PodHandler {
    async fn applied(&mut self, pod: corev1::Pod, _ts: i64) -> EmptyResult {
        let ns_name = pod.namespaced_name();

        // Bindings can change (rarely), so this is re-checked on every event;
        // a pod that has moved off of our nodes stops getting writes and
        // gives its address back.
        if !pod.node_name().is_some_and(|n| self.ctx.nodes.contains(n)) {
            if let Some(managed) = self.ctx.pods.remove(&ns_name) {
                debug!("pod {ns_name} is no longer bound to any of our nodes");
                if let Some(ip) = managed.ip {
                    self.ctx.allocator.release(&ns_name, ip);
                }
            }
            return Ok(());
        }

        let frozen = self.ctx.disregard.as_ref().is_some_and(|sel| sel.matches(&pod.metadata));
        let deleting = pod.metadata.deletion_timestamp.is_some();

        let existing_ip: Option<Ipv4Addr> = pod.pod_ip().and_then(|ip| ip.parse().ok());
        self.ctx.pods.upsert(&ns_name, pod, frozen);

        // Adopt an address the pod already carries (e.g. assigned before a
        // restart of this process) so the allocator can't hand it out again
        if self.ctx.pods.ip_of(&ns_name).is_none() {
            if let Some(ip) = existing_ip {
                self.ctx.allocator.reserve(ip);
                self.ctx.pods.set_ip(&ns_name, ip);
            }
        }

        if deleting {
            self.ctx.delete_pool.submit(ns_name);
        } else {
            self.ctx.lock_pool.submit(ns_name);
        }
        Ok(())
    }

    async fn deleted(&mut self, ns_name: &str, _ts: i64) -> EmptyResult {
        if let Some(managed) = self.ctx.pods.remove(ns_name) {
            debug!("pod {ns_name} is gone");
            if let Some(ip) = managed.ip {
                self.ctx.allocator.release(ns_name, ip);
            }
        }
        Ok(())
    }
}

// Entry point for the lock pool; errors are logged and the pod is retried on
// its next event.
pub(crate) async fn reconcile_pod(ctx: Arc<Context>, ns_name: String) {
    if let Err(err) = try_reconcile_pod(&ctx, &ns_name).await {
        error!("could not reconcile pod {ns_name}: {err:?}");
    }
}

async fn try_reconcile_pod(ctx: &Context, ns_name: &str) -> EmptyResult {
    let Some(managed) = ctx.pods.get(ns_name) else {
        return Ok(());  // deleted while queued
    };
    if managed.frozen {
        // disregard-status: lifecycle handling continues but the status
        // subresource is off-limits
        return Ok(());
    }
    if managed.pod.metadata.deletion_timestamp.is_some() {
        return Ok(());  // finalization owns this pod now
    }

    let (ns, name) = split_namespaced_name(ns_name);
    let pod_api = kube::Api::<corev1::Pod>::namespaced(ctx.client.clone(), &ns);

    let ip = match managed.ip {
        Some(ip) => ip,
        None => match ctx.allocator.allocate(ns_name) {
            Ok(ip) => {
                ctx.pods.set_ip(ns_name, ip);
                ip
            },
            Err(err) => {
                warn!("could not allocate an address for {ns_name}: {err}");
                let patch = json!({"status": {
                    "phase": "Pending",
                    "reason": "IpAllocationFailed",
                    "message": err.to_string(),
                }});
                pod_api.patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch)).await?;
                return Ok(());
            },
        },
    };

    let input = build_input(&managed.pod, &ctx.node_ip, Some(&ip.to_string()), ctx.clock.now(), &ctx.version)?;
    let status = ctx.renderer.render(POD_STATUS_TEMPLATE, &input)?;
    if managed.last_status.as_ref() == Some(&status) {
        return Ok(());  // already converged
    }

    pod_api
        .patch_status(&name, &PatchParams::default(), &Patch::Merge(&json!({"status": status})))
        .await?;
    ctx.pods.set_last_status(ns_name, status);
    counter!(POD_STATUS_WRITES_METRIC).increment(1);
    Ok(())
}

// Entry point for the delete pool.  Nothing ever ran here, so there is no
// grace period to sit out; the controller completes finalization right away.
pub(crate) async fn finalize_pod(ctx: Arc<Context>, ns_name: String) {
    if ctx.pods.get(&ns_name).is_none() {
        return;
    }

    let (ns, name) = split_namespaced_name(&ns_name);
    let pod_api = kube::Api::<corev1::Pod>::namespaced(ctx.client.clone(), &ns);
    let params = DeleteParams {
        grace_period_seconds: Some(0),
        ..Default::default()
    };
    match pod_api.delete(&name, &params).await {
        Ok(_) => {
            counter!(POD_DELETES_METRIC).increment(1);
        },
        // someone else finished the job, the confirming watch event cleans up
        Err(kube::Error::Api(kube::core::ErrorResponse { code: 404, .. })) => (),
        Err(err) => error!("could not delete pod {ns_name}: {err:?}"),
    }
}
