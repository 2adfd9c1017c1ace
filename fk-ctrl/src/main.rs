mod context;
mod errors;
mod heartbeat;
mod ipam;
mod nodes;
mod pods;
mod pool;
mod render;
mod server;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use clockabilly::UtcClock;
use fk_core::errors::*;
use fk_core::k8s::{
    MetaSelector,
    OwnershipPredicate,
    Selector,
};
use fk_core::logging;
use fk_core::metrics::MemoryRecorder;
use fk_core::prelude::*;
use ipnet::Ipv4Net;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::*;

use crate::context::Context;
use crate::errors::FakeKubeletError;
use crate::heartbeat::HeartbeatScheduler;
use crate::ipam::CidrAllocator;
use crate::pool::WorkPool;
use crate::render::{
    TemplateOverrides,
    TemplateRenderer,
};

#[derive(Clone, Debug, Default, Parser)]
#[command(name = "fake-kubelet", about = "impersonates virtual nodes against a real apiserver")]
struct Options {
    #[arg(long, env = "KUBECONFIG")]
    kubeconfig: Option<String>,

    #[arg(long)]
    master: Option<String>,

    #[arg(long, default_value = DEFAULT_POD_CIDR)]
    cidr: String,

    #[arg(long, default_value = DEFAULT_NODE_IP)]
    node_ip: String,

    #[arg(long)]
    manage_all_nodes: bool,

    #[arg(long)]
    manage_nodes_with_annotation_selector: Option<String>,

    #[arg(long)]
    manage_nodes_with_label_selector: Option<String>,

    #[arg(long)]
    disregard_status_with_annotation_selector: Option<String>,

    #[arg(long)]
    disregard_status_with_label_selector: Option<String>,

    #[arg(long, default_value = DEFAULT_SERVER_ADDRESS)]
    server_address: String,

    #[arg(long)]
    enable_cni: bool,

    #[arg(long, default_value_t = DEFAULT_HEARTBEAT_INTERVAL_SECONDS)]
    heartbeat_interval_seconds: u64,

    #[arg(long, default_value_t = DEFAULT_LOCK_POD_PARALLELISM)]
    lock_pod_parallelism: usize,

    #[arg(long, default_value_t = DEFAULT_DELETE_POD_PARALLELISM)]
    delete_pod_parallelism: usize,

    #[arg(long)]
    pod_status_template: Option<PathBuf>,

    #[arg(long)]
    node_heartbeat_template: Option<PathBuf>,

    #[arg(long)]
    node_initialize_template: Option<PathBuf>,

    #[arg(short, long, default_value = "info")]
    verbosity: String,
}

fn parse_selector(maybe_expr: &Option<String>) -> anyhow::Result<Option<Selector>> {
    maybe_expr.as_deref().map(str::parse).transpose()
}

async fn build_client(opts: &Options) -> anyhow::Result<kube::Client> {
    // An unusable kubeconfig path is treated as unset rather than fatal
    let kubeconfig = opts.kubeconfig.as_ref().filter(|path| {
        let usable = std::path::Path::new(path).is_file();
        if !usable {
            warn!("kubeconfig path {path} is not a file, ignoring it");
        }
        usable
    });

    let config = if let Some(path) = kubeconfig {
        let kc = kube::config::Kubeconfig::read_from(path)?;
        kube::Config::from_custom_kubeconfig(kc, &Default::default()).await?
    } else if let Some(master) = &opts.master {
        kube::Config::new(master.parse()?)
    } else {
        kube::Config::infer().await?
    };
    Ok(kube::Client::try_from(config)?)
}

#[instrument(ret, err, skip_all)]
async fn run(opts: Options) -> EmptyResult {
    // All flag validation happens before anything talks to the apiserver
    let ownership = OwnershipPredicate::new(opts.manage_all_nodes, MetaSelector {
        annotations: parse_selector(&opts.manage_nodes_with_annotation_selector)?,
        labels: parse_selector(&opts.manage_nodes_with_label_selector)?,
    })?;

    let disregard_sel = MetaSelector {
        annotations: parse_selector(&opts.disregard_status_with_annotation_selector)?,
        labels: parse_selector(&opts.disregard_status_with_label_selector)?,
    };
    let disregard = disregard_sel.is_configured().then_some(disregard_sel);

    if opts.enable_cni && !ipam::cni_supported() {
        bail!(FakeKubeletError::cni_unsupported("external allocation requires the CNI plug-in"));
    }

    let cidr: Ipv4Net = opts.cidr.parse()?;

    let recorder = MemoryRecorder::new();
    recorder.install()?;
    let server = server::build(&opts.server_address, recorder)?;

    let renderer = TemplateRenderer::new(TemplateOverrides {
        pod_status: opts.pod_status_template.clone(),
        node_heartbeat: opts.node_heartbeat_template.clone(),
        node_initialize: opts.node_initialize_template.clone(),
    })?;

    let client = build_client(&opts).await?;
    nodes::wait_for_apiserver(&client).await?;

    let ctx = Arc::new(Context {
        client,
        version: format!("fake-kubelet-{}", clap::crate_version!()),
        node_ip: opts.node_ip.clone(),

        ownership,
        disregard,

        nodes: Default::default(),
        pods: Default::default(),

        renderer: Box::new(renderer),
        allocator: Box::new(CidrAllocator::new(cidr)),
        heartbeats: HeartbeatScheduler::new(Duration::from_secs(opts.heartbeat_interval_seconds)),

        node_pool: WorkPool::new("node", opts.lock_pod_parallelism, DEFAULT_LANE_CAPACITY),
        lock_pool: WorkPool::new("lock", opts.lock_pod_parallelism, DEFAULT_LANE_CAPACITY),
        delete_pool: WorkPool::new("delete", opts.delete_pod_parallelism, DEFAULT_LANE_CAPACITY),

        clock: Box::new(UtcClock::new()),
    });

    let token = CancellationToken::new();
    let mut js = JoinSet::new();

    // Startup order matters here: the node list must be complete before pod
    // events start checking their bindings, and the pod list must be
    // complete -- with every already-assigned address reserved -- before any
    // worker lane is allowed to hand out a new one.
    let (node_ready_tx, mut node_ready_rx) = mpsc::channel(1);
    js.spawn(nodes::new_with_stream(ctx.clone(), node_ready_tx).start(token.clone()));
    let _ = node_ready_rx.recv().await;

    let (pod_ready_tx, mut pod_ready_rx) = mpsc::channel(1);
    js.spawn(pods::new_with_stream(ctx.clone(), pod_ready_tx).start(token.clone()));
    let _ = pod_ready_rx.recv().await;

    ctx.node_pool.spawn_workers(&mut js, &token, {
        let ctx = ctx.clone();
        move |work| nodes::handle_node_work(ctx.clone(), work)
    });
    ctx.lock_pool.spawn_workers(&mut js, &token, {
        let ctx = ctx.clone();
        move |ns_name| pods::reconcile_pod(ctx.clone(), ns_name)
    });
    ctx.delete_pool.spawn_workers(&mut js, &token, {
        let ctx = ctx.clone();
        move |ns_name| pods::finalize_pod(ctx.clone(), ns_name)
    });

    js.spawn({
        let ctx = ctx.clone();
        let heartbeats = ctx.heartbeats.clone();
        let token = token.clone();
        async move {
            heartbeats
                .run(token, move |node| {
                    ctx.node_pool.submit(nodes::NodeWork::Heartbeat(node));
                })
                .await
        }
    });

    info!("fake-kubelet started");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("shutdown requested"),
        res = server.launch() => {
            res?;
            bail!("status server exited unexpectedly");
        },
        _ = js.join_next() => bail!("component exited unexpectedly"),
    }

    // Cancellation: in-flight workers finish their current object, nobody
    // drains queues, and after the deadline we stop waiting around.
    token.cancel();
    tokio::select! {
        _ = async { while js.join_next().await.is_some() {} } => debug!("all workers stopped"),
        _ = sleep(Duration::from_secs(SHUTDOWN_DEADLINE_SECONDS)) => {
            warn!("shutdown deadline exceeded, aborting remaining workers");
            js.abort_all();
        },
    }
    Ok(())
}

#[tokio::main]
async fn main() -> EmptyResult {
    let args = Options::parse();
    logging::setup(&args.verbosity);
    run(args).await
}

#[cfg(test)]
mod tests;
