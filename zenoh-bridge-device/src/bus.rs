//! Command loop: subscribe to the command key and answer every sample.

use devgate_bridge_framework::{BridgeError, Publisher, ReplyChannel, ResponseEnvelope};
use devgate_common::generate_id;
use tracing::{debug, error, info, warn};
use zenoh::sample::SampleKind;

use crate::dispatcher::{Dispatcher, Reply};

/// Serve commands until the subscriber closes.
///
/// Each command runs in its own task, so a slow device never holds up
/// commands for other devices.
pub async fn run_command_loop(
    publisher: Publisher,
    dispatcher: Dispatcher,
) -> Result<(), BridgeError> {
    let key = publisher.topics().command.clone();

    let subscriber = match publisher.session().declare_subscriber(&key).await {
        Ok(subscriber) => subscriber,
        Err(e) => {
            error!(key = %key, error = %e, "Failed to subscribe to command topic");
            let report = ResponseEnvelope::failure(
                generate_id(),
                format!("Failed to subscribe to command topic: {}", e),
            );
            if let Err(pe) = publisher.reply(ReplyChannel::Error, &report).await {
                warn!(error = %pe, "Failed to report subscribe failure");
            }
            return Err(BridgeError::Subscribe {
                key,
                message: e.to_string(),
            });
        }
    };

    info!(key = %key, "Listening for commands");

    loop {
        let sample = subscriber
            .recv_async()
            .await
            .map_err(|e| BridgeError::Subscribe {
                key: key.clone(),
                message: e.to_string(),
            })?;

        if sample.kind() == SampleKind::Delete {
            continue;
        }

        let payload = sample.payload().to_bytes().to_vec();
        let dispatcher = dispatcher.clone();
        let publisher = publisher.clone();

        tokio::spawn(async move {
            let reply = dispatcher.handle_payload(&payload).await;
            publish_reply(&publisher, &reply).await;
        });
    }
}

/// Publish a reply. Failures are logged and not retried.
pub async fn publish_reply(publisher: &Publisher, reply: &Reply) {
    let key = publisher.topics().reply(reply.channel);

    match publisher.reply(reply.channel, &reply.envelope).await {
        Ok(()) => debug!(unique_id = %reply.envelope.unique_id, key = %key, "Reply published"),
        Err(e) => warn!(
            unique_id = %reply.envelope.unique_id,
            key = %key,
            error = %e,
            "Failed to publish reply"
        ),
    }
}
