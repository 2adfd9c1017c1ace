use std::collections::HashSet;

use assertables::*;
use clockabilly::mock::MockUtcClock;
use fk_testutils::*;
use futures::stream;
use mockall::predicate;
use tokio::sync::mpsc;

use super::*;
use crate::prelude::*;

fn make_watcher(
    handler: Box<dyn EventHandler<corev1::Pod>>,
    index: HashSet<String>,
) -> (ObjWatcher<corev1::Pod>, mpsc::Receiver<bool>) {
    let (ready_tx, ready_rx) = mpsc::channel(1);
    let watcher = ObjWatcher::new_from_parts(
        handler,
        Box::pin(stream::empty()),
        index,
        Box::new(MockUtcClock::new(0)),
        ready_tx,
    );
    (watcher, ready_rx)
}

#[rstest(tokio::test)]
async fn test_handle_initial_list() {
    let pods: Vec<_> = (0..3).map(|i| test_pod(format!("pod{i}"))).collect();
    let mut handler = Box::new(MockEventHandler::new());
    for pod in &pods {
        handler
            .expect_applied()
            .with(predicate::eq(pod.clone()), predicate::eq(0))
            .returning(|_, _| Ok(()))
            .once();
    }
    handler.expect_deleted().never();

    let (mut watcher, mut ready_rx) = make_watcher(handler, HashSet::new());

    watcher.handle_event(&Event::Init, 0).await.unwrap();
    for pod in pods {
        watcher.handle_event(&Event::InitApply(pod), 0).await.unwrap();
    }
    watcher.handle_event(&Event::InitDone, 0).await.unwrap();

    let expected: HashSet<String> = (0..3).map(|i| format!("{TEST_NAMESPACE}/pod{i}")).collect();
    assert_bag_eq!(watcher.index, expected);
    assert_ok!(ready_rx.try_recv());
}

#[rstest(tokio::test)]
async fn test_relist_synthesizes_deletes() {
    let survivor = test_pod("pod0".into());
    let mut handler = Box::new(MockEventHandler::new());
    handler
        .expect_applied()
        .with(predicate::eq(survivor.clone()), predicate::eq(0))
        .returning(|_, _| Ok(()))
        .once();
    handler
        .expect_deleted()
        .withf(|ns_name, ts| ns_name == format!("{TEST_NAMESPACE}/pod-gone") && *ts == 0)
        .returning(|_, _| Ok(()))
        .once();

    let index = HashSet::from([format!("{TEST_NAMESPACE}/pod0"), format!("{TEST_NAMESPACE}/pod-gone")]);
    let (mut watcher, _ready_rx) = make_watcher(handler, index);

    watcher.handle_event(&Event::Init, 0).await.unwrap();
    watcher.handle_event(&Event::InitApply(survivor), 0).await.unwrap();
    watcher.handle_event(&Event::InitDone, 0).await.unwrap();

    assert_bag_eq!(watcher.index, HashSet::from([format!("{TEST_NAMESPACE}/pod0")]));
}

#[rstest(tokio::test)]
async fn test_apply_and_delete_maintain_index() {
    let pod = test_pod("pod0".into());
    let ns_name = pod.namespaced_name();
    let mut handler = Box::new(MockEventHandler::new());
    handler.expect_applied().returning(|_, _| Ok(())).once();
    let expected_ns_name = ns_name.clone();
    handler
        .expect_deleted()
        .withf(move |ns_name, ts| ns_name == expected_ns_name && *ts == 1)
        .returning(|_, _| Ok(()))
        .once();

    let (mut watcher, _ready_rx) = make_watcher(handler, HashSet::new());

    watcher.handle_event(&Event::Apply(pod.clone()), 0).await.unwrap();
    assert_bag_eq!(watcher.index, HashSet::from([ns_name]));

    watcher.handle_event(&Event::Delete(pod), 1).await.unwrap();
    assert_is_empty!(watcher.index);
}

#[rstest(tokio::test)]
async fn test_handler_error_does_not_poison_watcher() {
    let pod = test_pod("pod0".into());
    let mut handler = Box::new(MockEventHandler::new());
    handler.expect_applied().returning(|_, _| Err(anyhow!("boom"))).once();

    let (mut watcher, _ready_rx) = make_watcher(handler, HashSet::new());

    let res = watcher.handle_event(&Event::Apply(pod.clone()), 0).await;
    assert_err!(res);

    // the object is still indexed, so a later relist can clean it up
    assert_bag_eq!(watcher.index, HashSet::from([pod.namespaced_name()]));
}
