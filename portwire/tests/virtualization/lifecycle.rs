//! Listener bookkeeping, name filtering, teardown and shutdown.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use async_trait::async_trait;
use portwire::{
    BackingConnection, ChannelEndpoint, ConnectionHost, EventKind, LoopbackHost, MemoryByteStore,
    MessageEvent, Payload, PortResolver, PortalError, PortalManager, PortalResult, RpcEndpoint,
    SurrogateId,
};

use super::{harness, inbox, next_event, run_local, settle, MAIN};

#[tokio::test]
async fn test_removed_listener_sees_nothing() {
    run_local(async {
        let h = harness();
        let seen = Rc::new(RefCell::new(0usize));
        let counter = seen.clone();
        let subscription = h.hub_main.add_event_listener(
            EventKind::Message,
            Rc::new(move |_: &MessageEvent| *counter.borrow_mut() += 1),
        );
        let (kept_inbox, _kept) = inbox(&h.hub_main);

        h.client_main.post_message(Payload::from("first")).expect("post");
        next_event(&kept_inbox).await;
        assert_eq!(*seen.borrow(), 1);

        assert!(h.hub_main.remove_event_listener(EventKind::Message, subscription));
        h.client_main.post_message(Payload::from("second")).expect("post");
        next_event(&kept_inbox).await;
        assert_eq!(*seen.borrow(), 1);
    })
    .await;
}

#[tokio::test]
async fn test_removing_unknown_listener_is_noop() {
    run_local(async {
        let h = harness();
        let (_client_inbox, foreign) = inbox(&h.client_main);
        let (hub_inbox, _sub) = inbox(&h.hub_main);

        assert!(!h.hub_main.remove_event_listener(EventKind::Message, foreign));
        assert_eq!(h.hub_main.handler_count(), 1);

        h.client_main.post_message(Payload::from("still delivered")).expect("post");
        assert_eq!(next_event(&hub_inbox).await.data, Payload::from("still delivered"));
    })
    .await;
}

#[tokio::test]
async fn test_non_prefixed_connections_ignored() {
    run_local(async {
        let h = harness();
        let before = h.hub.registry().connection_count();

        let ordinary = h.client_host.connect("devtools").expect("connect");
        ordinary.post_message(serde_json::json!({"not": "virtual"})).expect("post");
        settle().await;

        assert_eq!(h.hub.registry().connection_count(), before);
        assert!(h.hub.registry().get("devtools").is_none());
        assert!(h.hub.registry().get(MAIN).is_none());
        assert_eq!(h.hub.active_pairings(), 0);
    })
    .await;
}

#[test]
fn test_surrogate_ids_unique() {
    let (host, _peer) = LoopbackHost::pair();
    let manager = PortalManager::builder()
        .host(Rc::new(host))
        .store(Rc::new(MemoryByteStore::new()))
        .build()
        .expect("manager");

    let ids: HashSet<SurrogateId> = (0..10_000).map(|_| manager.mint_id()).collect();
    assert_eq!(ids.len(), 10_000);
    assert!(ids
        .iter()
        .all(|id| id.as_str().starts_with(portwire::DEFAULT_NAMESPACE_PREFIX)));
}

#[tokio::test]
async fn test_closing_endpoint_tears_down_both_sides() {
    run_local(async {
        let h = harness();
        let (hub_inbox, _sub) = inbox(&h.hub_main);
        let (kept, transferred) = ChannelEndpoint::pair();
        h.client_main
            .post_message(Payload::from(transferred))
            .expect("post");
        let remote = next_event(&hub_inbox)
            .await
            .data
            .as_port()
            .expect("endpoint")
            .clone();
        settle().await;
        assert_eq!(h.hub.registry().connection_count(), 1);

        kept.close();
        settle().await;

        assert!(remote.is_closed());
        assert_eq!(h.client.active_pairings(), 0);
        assert_eq!(h.hub.active_pairings(), 0);
        assert_eq!(h.hub.registry().connection_count(), 0);
    })
    .await;
}

#[tokio::test]
async fn test_sender_closing_before_hub_pairs_tears_down() {
    run_local(async {
        let h = harness();
        let (hub_inbox, _sub) = inbox(&h.hub_main);
        let (kept, transferred) = ChannelEndpoint::pair();
        h.client_main
            .post_message(Payload::from(transferred))
            .expect("post");
        kept.close();

        let remote = next_event(&hub_inbox)
            .await
            .data
            .as_port()
            .expect("endpoint")
            .clone();
        settle().await;

        assert!(remote.is_closed());
        assert_eq!(h.client.active_pairings(), 0);
        assert_eq!(h.hub.active_pairings(), 0);
        assert_eq!(h.hub.registry().connection_count(), 0);
    })
    .await;
}

#[tokio::test]
async fn test_messages_before_close_still_delivered() {
    run_local(async {
        let h = harness();
        let (hub_inbox, _sub) = inbox(&h.hub_main);
        let (kept, transferred) = ChannelEndpoint::pair();
        h.client_main
            .post_message(Payload::from(transferred))
            .expect("post");
        kept.post_message("parting words");
        kept.close();

        let remote = next_event(&hub_inbox)
            .await
            .data
            .as_port()
            .expect("endpoint")
            .clone();
        settle().await;

        assert_eq!(remote.try_recv(), Some(Payload::from("parting words")));
        assert!(remote.is_closed());
        assert_eq!(h.hub.active_pairings(), 0);
    })
    .await;
}

#[tokio::test]
async fn test_dropping_received_endpoint_tears_down() {
    run_local(async {
        let h = harness();
        let (hub_inbox, sub) = inbox(&h.hub_main);
        let (kept, transferred) = ChannelEndpoint::pair();
        h.client_main
            .post_message(Payload::from(transferred))
            .expect("post");

        // Drop every handle the hub holds on the reconstructed endpoint.
        drop(next_event(&hub_inbox).await);
        h.hub_main.remove_event_listener(EventKind::Message, sub);
        settle().await;

        assert!(kept.is_closed());
        assert_eq!(h.client.active_pairings(), 0);
    })
    .await;
}

#[tokio::test]
async fn test_shutdown_abandons_pending_resolution() {
    run_local(async {
        let h = harness();
        // The client never listens on main, so nobody opens the backing connection.
        let (kept, transferred) = ChannelEndpoint::pair();
        h.hub_main
            .post_message(Payload::from(transferred))
            .expect("post");
        settle().await;
        assert_eq!(h.hub.registry().pending_count(), 1);

        h.hub.shutdown();
        settle().await;

        assert_eq!(h.hub.registry().pending_count(), 0);
        assert!(kept.is_closed());
        assert!(!h.hub.is_accepting());
    })
    .await;
}

struct RecordingResolver {
    host: Rc<dyn ConnectionHost>,
    resolved: RefCell<Vec<String>>,
}

#[async_trait(?Send)]
impl PortResolver for RecordingResolver {
    async fn resolve(&self, id: &SurrogateId) -> PortalResult<Rc<dyn BackingConnection>> {
        self.resolved.borrow_mut().push(id.to_string());
        self.host.connect(id.as_str())
    }
}

#[tokio::test]
async fn test_custom_resolver_is_used() {
    run_local(async {
        let h = harness();
        let resolver = Rc::new(RecordingResolver {
            host: Rc::new(h.client_host.clone()),
            resolved: RefCell::new(Vec::new()),
        });
        let custom = PortalManager::builder()
            .host(Rc::new(h.client_host.clone()))
            .store(h.store.clone())
            .resolver(resolver.clone())
            .build()
            .expect("manager");

        let sender = custom.connect(MAIN).expect("connect");
        let (_kept, transferred) = ChannelEndpoint::pair();
        sender.post_message(Payload::from(transferred)).expect("post");
        settle().await;

        let resolved = resolver.resolved.borrow();
        assert_eq!(resolved.len(), 1);
        assert!(h.hub.registry().get(&resolved[0]).is_some());
    })
    .await;
}

#[tokio::test]
async fn test_post_after_disconnect_fails() {
    run_local(async {
        let h = harness();
        h.hub_main.close();
        settle().await;

        let err = h
            .client_main
            .post_message(Payload::from("late"))
            .unwrap_err();
        assert!(matches!(err, PortalError::ConnectionClosed { .. }));
    })
    .await;
}
