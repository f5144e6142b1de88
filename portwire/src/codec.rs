//! Serializer and deserializer: payload ⇄ plain JSON with surrogate markers.
//!
//! Serializing walks the payload depth-first. Every [`ChannelEndpoint`]
//! becomes a port marker and gets a shadow pairing over the connection named
//! by its fresh surrogate id; every [`BinaryBuffer`] is published to the byte
//! store and becomes a buffer marker.
//!
//! Deserializing mirrors this. Sibling values resolve concurrently, and the
//! returned future completes only once every nested marker has resolved, so a
//! payload is either fully reconstructed or not delivered at all.

use futures::future::{try_join_all, FutureExt, LocalBoxFuture};
use serde_json::{Map, Value};

use crate::channel::ChannelEndpoint;
use crate::error::{PortalError, PortalResult};
use crate::forwarder;
use crate::manager::PortalManager;
use crate::payload::{BinaryBuffer, Payload};
use crate::surrogate::{MarkerMatch, SurrogateMarker};

/// Replace every transferable in `payload` with a marker.
///
/// Limits are checked before any side effect, so a rejected payload spawns
/// no pairing and publishes nothing.
pub(crate) fn serialize(manager: &PortalManager, payload: Payload) -> PortalResult<Value> {
    validate(manager, &payload, 0)?;
    serialize_value(manager, payload)
}

fn validate(manager: &PortalManager, payload: &Payload, depth: usize) -> PortalResult<()> {
    let config = manager.config();
    if depth > config.max_depth {
        return Err(PortalError::DepthExceeded {
            max_depth: config.max_depth,
        });
    }
    match payload {
        Payload::Array(items) => items
            .iter()
            .try_for_each(|item| validate(manager, item, depth + 1)),
        Payload::Object(map) => map
            .values()
            .try_for_each(|value| validate(manager, value, depth + 1)),
        Payload::Buffer(buffer) if buffer.byte_len() > config.max_buffer_len => {
            Err(PortalError::BufferTooLarge {
                len: buffer.byte_len(),
                max: config.max_buffer_len,
            })
        }
        _ => Ok(()),
    }
}

fn serialize_value(manager: &PortalManager, payload: Payload) -> PortalResult<Value> {
    Ok(match payload {
        Payload::Null => Value::Null,
        Payload::Bool(b) => Value::Bool(b),
        Payload::Number(n) => Value::Number(n),
        Payload::String(s) => Value::String(s),
        Payload::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| serialize_value(manager, item))
                .collect::<PortalResult<_>>()?,
        ),
        Payload::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| -> PortalResult<(String, Value)> {
                    Ok((key, serialize_value(manager, value)?))
                })
                .collect::<PortalResult<_>>()?,
        ),
        Payload::Port(endpoint) => serialize_port(manager, endpoint),
        Payload::Buffer(buffer) => serialize_buffer(manager, buffer)?,
    })
}

fn serialize_port(manager: &PortalManager, endpoint: ChannelEndpoint) -> Value {
    let id = manager.mint_id();
    tracing::debug!(surrogate = %id, endpoint = endpoint.id(), "virtualizing endpoint");
    forwarder::spawn_pairing(manager.clone(), endpoint, id.clone());
    SurrogateMarker::Port { id }.to_value()
}

fn serialize_buffer(manager: &PortalManager, buffer: BinaryBuffer) -> PortalResult<Value> {
    let view = buffer.view();
    let handle = manager.store().publish(buffer.into_bytes())?;
    Ok(SurrogateMarker::Buffer { view, handle }.to_value())
}

/// Rebuild a payload from plain JSON, reconstructing every marker.
pub(crate) fn deserialize(
    manager: &PortalManager,
    value: Value,
) -> LocalBoxFuture<'_, PortalResult<Payload>> {
    deserialize_at(manager, value, 0)
}

fn deserialize_at(
    manager: &PortalManager,
    value: Value,
    depth: usize,
) -> LocalBoxFuture<'_, PortalResult<Payload>> {
    async move {
        let max_depth = manager.config().max_depth;
        if depth > max_depth {
            return Err(PortalError::DepthExceeded { max_depth });
        }

        match value {
            Value::Array(items) => {
                let items =
                    try_join_all(items.into_iter().map(|v| deserialize_at(manager, v, depth + 1)))
                        .await?;
                Ok(Payload::Array(items))
            }
            Value::Object(map) => match SurrogateMarker::inspect(&map)? {
                MarkerMatch::Plain => deserialize_object(manager, map, depth).await,
                MarkerMatch::Known(marker) => deserialize_marker(manager, marker).await,
                MarkerMatch::Unrecognized(kind) => {
                    tracing::warn!(kind = %kind, "unrecognized surrogate marker left in place");
                    deserialize_object(manager, map, depth).await
                }
            },
            scalar => Ok(Payload::from(scalar)),
        }
    }
    .boxed_local()
}

async fn deserialize_object(
    manager: &PortalManager,
    map: Map<String, Value>,
    depth: usize,
) -> PortalResult<Payload> {
    let (keys, values): (Vec<String>, Vec<Value>) = map.into_iter().unzip();
    let values =
        try_join_all(values.into_iter().map(|v| deserialize_at(manager, v, depth + 1))).await?;
    Ok(Payload::Object(keys.into_iter().zip(values).collect()))
}

async fn deserialize_marker(
    manager: &PortalManager,
    marker: SurrogateMarker,
) -> PortalResult<Payload> {
    match marker {
        SurrogateMarker::Port { id } => {
            let (kept, relayed) = ChannelEndpoint::pair();
            tracing::debug!(surrogate = %id, endpoint = kept.id(), "reconstructing endpoint");
            forwarder::spawn_pairing(manager.clone(), relayed, id);
            Ok(Payload::Port(kept))
        }
        SurrogateMarker::Buffer { view, handle } => {
            let bytes = manager.store().fetch(&handle).await?;
            Ok(Payload::Buffer(BinaryBuffer::from_parts(view, bytes)?))
        }
    }
}
