use std::collections::HashSet;
use std::mem::take;

use async_trait::async_trait;
use clockabilly::{
    Clockable,
    UtcClock,
};
use futures::stream::BoxStream;
use futures::{
    StreamExt,
    TryStreamExt,
};
use kube::runtime::WatchStreamExt;
use kube::runtime::watcher::{
    Event,
    watcher,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::*;

use crate::errors::*;
use crate::k8s::KubeResourceExt;

pub type ObjStream<K> = BoxStream<'static, anyhow::Result<Event<K>>>;

// Handlers receive the parsed object on apply and the namespaced name on
// delete.  Per-object failures are returned so the watch loop can log them,
// but they never stop the stream; one bad object must not wedge the rest of
// the fleet.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventHandler<K: 'static + Send>: Send {
    async fn applied(&mut self, obj: K, ts: i64) -> EmptyResult;
    async fn deleted(&mut self, ns_name: &str, ts: i64) -> EmptyResult;
}

pub fn watch_stream<K>(api: kube::Api<K>) -> ObjStream<K>
where
    K: kube::Resource + Clone + std::fmt::Debug + serde::de::DeserializeOwned + Send + 'static,
{
    watcher(api, Default::default()).default_backoff().map_err(|e| e.into()).boxed()
}

// Drives a list+watch stream into an EventHandler.  We keep an index of the
// names we've seen so that when the stream relists (on startup or after a
// disconnect), anything missing from the new list gets a synthesized delete;
// the apiserver doesn't tell us about objects that went away while we
// weren't watching.
pub struct ObjWatcher<K> {
    handler: Box<dyn EventHandler<K>>,
    stream: ObjStream<K>,

    index: HashSet<String>,
    relist_index: HashSet<String>,

    clock: Box<dyn Clockable + Send>,
    is_ready: bool,
    ready_tx: mpsc::Sender<bool>,
}

impl<K: KubeResourceExt + Clone + Send + 'static> ObjWatcher<K> {
    pub fn new(handler: Box<dyn EventHandler<K>>, stream: ObjStream<K>, ready_tx: mpsc::Sender<bool>) -> ObjWatcher<K> {
        ObjWatcher {
            handler,
            stream,

            index: HashSet::new(),
            relist_index: HashSet::new(),

            clock: Box::new(UtcClock::new()),
            is_ready: false,
            ready_tx,
        }
    }

    // Takes self by value so the whole watcher can be handed to tokio::spawn
    pub async fn start(mut self, token: CancellationToken) {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                maybe_res = self.stream.next() => match maybe_res {
                    Some(Ok(evt)) => {
                        let ts = self.clock.now_ts();
                        if let Err(err) = self.handle_event(&evt, ts).await {
                            error!("watch handler failed: {err:?}");
                        }
                    },
                    Some(Err(err)) => warn!("error on watch stream: {err:?}"),
                    None => break,
                },
            }
        }
    }

    pub(crate) async fn handle_event(&mut self, evt: &Event<K>, ts: i64) -> EmptyResult {
        match evt {
            Event::Init => {
                self.relist_index.clear();
            },
            Event::InitApply(obj) => {
                self.relist_index.insert(obj.namespaced_name());
                self.handler.applied(obj.clone(), ts).await?;
            },
            Event::InitDone => {
                // Anything in the old index that didn't show up again during
                // the relist was deleted while we weren't looking.
                let old_index = take(&mut self.index);
                self.index = take(&mut self.relist_index);
                for ns_name in old_index {
                    if !self.index.contains(&ns_name) {
                        self.handler.deleted(&ns_name, ts).await?;
                    }
                }

                // Once we've seen a complete list we have a full view of the
                // cluster, and anyone waiting on us can proceed.
                if !self.is_ready {
                    self.is_ready = true;
                    let _ = self.ready_tx.try_send(true);
                }
            },
            Event::Apply(obj) => {
                self.index.insert(obj.namespaced_name());
                self.handler.applied(obj.clone(), ts).await?;
            },
            Event::Delete(obj) => {
                let ns_name = obj.namespaced_name();
                self.index.remove(&ns_name);
                self.handler.deleted(&ns_name, ts).await?;
            },
        }
        Ok(())
    }
}

#[cfg(test)]
impl<K: KubeResourceExt + Clone + Send + 'static> ObjWatcher<K> {
    pub(crate) fn new_from_parts(
        handler: Box<dyn EventHandler<K>>,
        stream: ObjStream<K>,
        index: HashSet<String>,
        clock: Box<dyn Clockable + Send>,
        ready_tx: mpsc::Sender<bool>,
    ) -> ObjWatcher<K> {
        ObjWatcher {
            handler,
            stream,
            index,
            relist_index: HashSet::new(),
            clock,
            is_ready: false,
            ready_tx,
        }
    }
}

#[cfg(test)]
mod tests;
