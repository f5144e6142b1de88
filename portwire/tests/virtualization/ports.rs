//! Endpoint virtualization across the main connection, in both directions.

use portwire::{ChannelEndpoint, Payload, RpcEndpoint};

use super::{harness, inbox, next_event, next_message, run_local, settle};

#[tokio::test]
async fn test_client_sends_endpoint_to_hub() {
    run_local(async {
        let h = harness();
        let (hub_inbox, _sub) = inbox(&h.hub_main);

        // Serialize by hand to see the wire form the adapter would post.
        let (kept, transferred) = ChannelEndpoint::pair();
        let wire = h
            .client
            .serialize(Payload::object([
                ("a", Payload::from(1)),
                ("b", Payload::from(transferred)),
            ]))
            .expect("serialize");
        assert_eq!(wire["a"], 1);
        assert_eq!(wire["b"][portwire::MARKER_KEY], "port");
        let surrogate = wire["b"]["port"].as_str().expect("surrogate id").to_string();
        assert!(surrogate.starts_with(portwire::DEFAULT_NAMESPACE_PREFIX));
        h.client_main.connection().post_message(wire).expect("post");

        let event = next_event(&hub_inbox).await;
        assert_eq!(event.data.get("a").and_then(Payload::as_i64), Some(1));
        let remote = event
            .data
            .get("b")
            .and_then(Payload::as_port)
            .expect("endpoint reconstructed")
            .clone();
        assert_eq!(event.ports.len(), 1);
        assert!(event.ports[0].same_half(&remote));

        remote.post_message("from hub");
        assert_eq!(next_message(&kept).await, Payload::from("from hub"));

        kept.post_message("from client");
        assert_eq!(next_message(&remote).await, Payload::from("from client"));

        // The pairing runs over a connection named exactly by the surrogate id.
        let backing = h.hub.registry().get(&surrogate).expect("backing connection");
        assert_eq!(backing.name(), surrogate);
        assert_eq!(h.hub.registry().connection_count(), 1);
    })
    .await;
}

#[tokio::test]
async fn test_hub_sends_endpoint_to_client() {
    run_local(async {
        let h = harness();
        let (client_inbox, _sub) = inbox(&h.client_main);

        let (kept, transferred) = ChannelEndpoint::pair();
        h.hub_main
            .post_message(Payload::object([("port", transferred)]))
            .expect("post");

        let event = next_event(&client_inbox).await;
        let remote = event
            .data
            .get("port")
            .and_then(Payload::as_port)
            .expect("endpoint reconstructed")
            .clone();

        remote.post_message(Payload::object([("n", 1)]));
        let got = next_message(&kept).await;
        assert_eq!(got.get("n").and_then(Payload::as_i64), Some(1));

        kept.post_message("reply");
        assert_eq!(next_message(&remote).await, Payload::from("reply"));
        assert_eq!(h.hub.active_pairings(), 1);
        assert_eq!(h.client.active_pairings(), 1);
    })
    .await;
}

#[tokio::test]
async fn test_nested_endpoints_to_depth_two() {
    run_local(async {
        let h = harness();
        let (hub_inbox, _sub) = inbox(&h.hub_main);

        // Level one: an endpoint buried two levels deep in the payload.
        let (client_outer, transferred_outer) = ChannelEndpoint::pair();
        h.client_main
            .post_message(Payload::object([(
                "outer",
                Payload::object([(
                    "inner",
                    Payload::from(vec![Payload::from(transferred_outer)]),
                )]),
            )]))
            .expect("post");

        let event = next_event(&hub_inbox).await;
        let hub_outer = event
            .data
            .get("outer")
            .and_then(|p| p.get("inner"))
            .and_then(|p| p.at(0))
            .and_then(Payload::as_port)
            .expect("outer endpoint")
            .clone();

        // Level two: an endpoint sent over the virtualized endpoint itself.
        let (hub_inner, transferred_inner) = ChannelEndpoint::pair();
        hub_outer.post_message(Payload::object([("nested", transferred_inner)]));

        let relayed = next_message(&client_outer).await;
        let client_inner = relayed
            .get("nested")
            .and_then(Payload::as_port)
            .expect("inner endpoint")
            .clone();

        client_inner.post_message("deep ping");
        assert_eq!(next_message(&hub_inner).await, Payload::from("deep ping"));

        hub_inner.post_message("deep pong");
        assert_eq!(next_message(&client_inner).await, Payload::from("deep pong"));

        // The outer pairing still works alongside the inner one.
        client_outer.post_message("outer still alive");
        assert_eq!(
            next_message(&hub_outer).await,
            Payload::from("outer still alive")
        );

        settle().await;
        assert_eq!(h.client.active_pairings(), 2);
        assert_eq!(h.hub.active_pairings(), 2);
    })
    .await;
}

#[tokio::test]
async fn test_relay_preserves_order_per_endpoint() {
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

        for i in 0..20 {
            kept.post_message(i);
        }
        for i in 0..20 {
            assert_eq!(next_message(&remote).await, Payload::from(i));
        }
    })
    .await;
}

#[tokio::test]
async fn test_multiple_endpoints_in_one_payload() {
    run_local(async {
        let h = harness();
        let (hub_inbox, _sub) = inbox(&h.hub_main);

        let (kept_a, sent_a) = ChannelEndpoint::pair();
        let (kept_b, sent_b) = ChannelEndpoint::pair();
        h.client_main
            .post_message(Payload::from(vec![Payload::from(sent_a), Payload::from(sent_b)]))
            .expect("post");

        let event = next_event(&hub_inbox).await;
        assert_eq!(event.ports.len(), 2);
        let remote_a = event.data.at(0).and_then(Payload::as_port).expect("a").clone();
        let remote_b = event.data.at(1).and_then(Payload::as_port).expect("b").clone();

        remote_b.post_message("to b");
        remote_a.post_message("to a");
        assert_eq!(next_message(&kept_a).await, Payload::from("to a"));
        assert_eq!(next_message(&kept_b).await, Payload::from("to b"));
    })
    .await;
}
