//! Publish/subscribe helpers shared by every dispatcher.

use ctl_mqtt_channel::{Channel, QoS};
use serde::Serialize;

use crate::error::{ClientError, ClientResult};

/// Inbound subscriptions ask for at-least-once delivery.
const SUBSCRIBE_QOS: QoS = QoS::AtLeastOnce;

/// Outbound requests are fire-and-forget.
const PUBLISH_QOS: QoS = QoS::AtMostOnce;

/// Serialize `payload` and publish it, skipping the call while disconnected.
pub(crate) fn publish_json<C: Channel, T: Serialize + ?Sized>(
    channel: &C,
    topic: &str,
    payload: &T,
) -> ClientResult<()> {
    if !channel.is_connected() {
        return Err(ClientError::NotConnected);
    }
    let bytes =
        serde_json::to_vec(payload).map_err(|e| ClientError::Serialization(e.to_string()))?;
    channel.publish(topic, &bytes, PUBLISH_QOS)?;
    Ok(())
}

/// Subscribe to each filter, logging failures. Returns true if all succeeded.
pub(crate) fn subscribe_all<C, I>(channel: &C, filters: I) -> bool
where
    C: Channel,
    I: IntoIterator<Item = String>,
{
    let mut ok = true;
    for filter in filters {
        if let Err(e) = channel.subscribe(&filter, SUBSCRIBE_QOS) {
            tracing::warn!(topic = %filter, error = %e, "subscribe failed");
            ok = false;
        }
    }
    ok
}

/// Publish and collapse the outcome to a bool, logging the failure.
pub(crate) fn publish_logged<C: Channel, T: Serialize + ?Sized>(
    channel: &C,
    topic: &str,
    payload: &T,
) -> bool {
    match publish_json(channel, topic, payload) {
        Ok(()) => true,
        Err(ClientError::NotConnected) => {
            tracing::debug!(topic = %topic, "transport offline, publish skipped");
            false
        }
        Err(e) => {
            tracing::warn!(topic = %topic, error = %e, "publish failed");
            false
        }
    }
}
