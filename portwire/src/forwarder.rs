//! Shadow pairing: relays one local endpoint half over one backing connection.
//!
//! ```text
//!   local half ──recv──► serialize ──► backing connection ──► peer
//!   local half ◄─post─── deserialize ◄── backing connection ◄── peer
//! ```
//!
//! Both directions go through a [`PortalEndpoint`], so endpoints nested in
//! relayed messages spawn further pairings, to any depth. The pairing lives
//! until either side closes: a closed local half disconnects the backing
//! connection, a disconnect from the peer closes the local half.

use std::rc::Rc;

use crate::channel::ChannelEndpoint;
use crate::endpoint::{EventKind, MessageEvent, PortalEndpoint, RpcEndpoint};
use crate::error::{PortalError, PortalResult};
use crate::manager::PortalManager;
use crate::surrogate::SurrogateId;

/// Start a shadow pairing on a local task.
///
/// Resolution of the backing connection happens on the task, so this
/// returns immediately.
pub(crate) fn spawn_pairing(manager: PortalManager, local: ChannelEndpoint, id: SurrogateId) {
    tokio::task::spawn_local(async move {
        if let Err(e) = run_pairing(&manager, local, &id).await {
            tracing::warn!(surrogate = %id, error = %e, "shadow pairing failed");
        }
    });
}

async fn run_pairing(
    manager: &PortalManager,
    local: ChannelEndpoint,
    id: &SurrogateId,
) -> PortalResult<()> {
    let connection = match manager.resolver().resolve(id).await {
        Ok(connection) => connection,
        Err(e) => {
            local.close();
            return Err(e);
        }
    };

    tracing::debug!(surrogate = %id, endpoint = local.id(), "shadow pairing established");
    manager.pairing_started();

    let endpoint: PortalEndpoint = manager.endpoint(connection.clone());

    let inbound = local.clone();
    let subscription = endpoint.add_event_listener(
        EventKind::Message,
        Rc::new(move |event: &MessageEvent| {
            if !inbound.post_message(event.data.clone()) {
                tracing::trace!(
                    endpoint = inbound.id(),
                    "local half closed, relayed message dropped"
                );
            }
        }),
    );

    // Fires after every payload relayed before the disconnect.
    let closer = local.clone();
    let disconnect = endpoint.on_disconnect(Rc::new(move || closer.close()));

    while let Some(message) = local.recv().await {
        tracing::trace!(surrogate = %id, "relaying message to backing connection");
        match endpoint.post_message(message) {
            Ok(()) => {}
            Err(e @ PortalError::ConnectionClosed { .. }) => {
                tracing::debug!(surrogate = %id, error = %e, "backing connection closed");
                break;
            }
            Err(e) => {
                tracing::warn!(surrogate = %id, error = %e, "dropping relayed message");
            }
        }
    }

    endpoint.remove_event_listener(EventKind::Message, subscription);
    endpoint.remove_disconnect_listener(disconnect);
    local.close();
    connection.disconnect();
    manager.registry().forget(connection.name());
    manager.pairing_stopped();

    tracing::debug!(surrogate = %id, "shadow pairing closed");
    Ok(())
}
