//! Shared harness: two managers wired through a loopback host pair.

pub mod lifecycle;
pub mod ports;

use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

use portwire::queue::MessageQueue;
use portwire::{
    BackingConnection, ChannelEndpoint, ConnectionHost, EventKind, LoopbackHost, MemoryByteStore,
    MessageEvent, Payload, PortalEndpoint, PortalManager, RpcEndpoint, Subscription, Topology,
};

/// Name of the ordinary, non-virtual connection both sides talk over.
pub const MAIN: &str = "main";

/// Both processes plus the main connection's adapters.
pub struct Harness {
    pub client: PortalManager,
    pub hub: PortalManager,
    pub client_host: LoopbackHost,
    pub hub_host: LoopbackHost,
    pub client_main: PortalEndpoint,
    pub hub_main: PortalEndpoint,
    pub store: Rc<MemoryByteStore>,
}

/// Install a test subscriber once per binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Run `test` inside a `LocalSet` with tracing installed.
pub async fn run_local<F: Future<Output = ()>>(test: F) {
    init_tracing();
    let local = tokio::task::LocalSet::new();
    local.run_until(test).await;
}

/// Build the client and hub, open "main" from the client and wrap both ends.
pub fn harness() -> Harness {
    let (client_host, hub_host) = LoopbackHost::pair();
    let store = Rc::new(MemoryByteStore::new());

    let client = PortalManager::builder()
        .host(Rc::new(client_host.clone()))
        .store(store.clone())
        .topology(Topology::PeerInitiated)
        .build()
        .expect("client manager");
    let hub = PortalManager::builder()
        .host(Rc::new(hub_host.clone()))
        .store(store.clone())
        .topology(Topology::HubBrokered)
        .build()
        .expect("hub manager");
    hub.init();

    let accepted: Rc<RefCell<Option<Rc<dyn BackingConnection>>>> = Rc::new(RefCell::new(None));
    let slot = accepted.clone();
    let main_listener = hub_host.on_connect(Rc::new(move |c: Rc<dyn BackingConnection>| {
        if c.name() == MAIN {
            *slot.borrow_mut() = Some(c);
        }
    }));

    let client_main = client.connect(MAIN).expect("connect main");
    let hub_connection = accepted.borrow_mut().take().expect("main accepted by hub");
    hub_host.remove_on_connect(main_listener);
    let hub_main = hub.endpoint(hub_connection);

    Harness {
        client,
        hub,
        client_host,
        hub_host,
        client_main,
        hub_main,
        store,
    }
}

/// Collect every event delivered to `endpoint` into a queue.
pub fn inbox(endpoint: &PortalEndpoint) -> (Rc<MessageQueue<MessageEvent>>, Subscription) {
    let queue = Rc::new(MessageQueue::new());
    let sink = queue.clone();
    let subscription = endpoint.add_event_listener(
        EventKind::Message,
        Rc::new(move |event: &MessageEvent| {
            sink.push(event.clone());
        }),
    );
    (queue, subscription)
}

/// Next delivered event, failing the test after two seconds.
pub async fn next_event(queue: &MessageQueue<MessageEvent>) -> MessageEvent {
    tokio::time::timeout(Duration::from_secs(2), queue.recv())
        .await
        .expect("event in time")
        .expect("inbox open")
}

/// Next message on a channel endpoint, failing the test after two seconds.
pub async fn next_message(endpoint: &ChannelEndpoint) -> Payload {
    tokio::time::timeout(Duration::from_secs(2), endpoint.recv())
        .await
        .expect("message in time")
        .expect("channel open")
}

/// Let every spawned task run until the system is quiet.
pub async fn settle() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}
