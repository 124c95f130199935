//! Local dispatcher: the only place delivery decisions are made.
//!
//! Consumes the hub's inbound stream. Each message is broadcast to the
//! registry; locally originated ones are then forwarded to the bus
//! publisher, and bus copies of messages this process originated are
//! dropped when echo suppression is on.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use super::echo::EchoFilter;
use super::registry::Registry;
use super::{Envelope, Origin};
use crate::domain::ChatMessage;

/// Wiring for [`run_dispatcher`].
#[derive(Debug)]
pub(crate) struct Dispatcher {
    pub(crate) registry: Arc<Registry>,
    pub(crate) publish: mpsc::Sender<ChatMessage>,
    pub(crate) publish_timeout: Duration,
    pub(crate) echoes: Option<EchoFilter>,
}

/// Runs until the inbound stream closes.
pub(crate) async fn run_dispatcher(
    mut dispatcher: Dispatcher,
    mut inbound: mpsc::Receiver<Envelope>,
) {
    while let Some(Envelope { message, origin }) = inbound.recv().await {
        let now = Instant::now();
        match origin {
            Origin::Local => {
                if let Some(echoes) = dispatcher.echoes.as_mut() {
                    echoes.record(message.id, now);
                }
            }
            Origin::Bus => {
                if let Some(echoes) = dispatcher.echoes.as_mut()
                    && echoes.is_echo(message.id, now)
                {
                    tracing::trace!(message_id = %message.id, "suppressed bus echo");
                    continue;
                }
            }
        }

        let report = dispatcher.registry.broadcast(&message).await;
        tracing::debug!(
            message_id = %message.id,
            chat_id = %message.chat_id,
            ?origin,
            delivered = report.delivered,
            evicted = report.evicted.len(),
            "message dispatched"
        );

        if origin == Origin::Local {
            forward(&dispatcher, message).await;
        }
    }
    tracing::debug!("local dispatcher stopped");
}

async fn forward(dispatcher: &Dispatcher, message: ChatMessage) {
    let message_id = message.id;
    match tokio::time::timeout(dispatcher.publish_timeout, dispatcher.publish.send(message)).await {
        Ok(Ok(())) => {}
        Ok(Err(_)) => tracing::error!(%message_id, "bus publisher stopped, message not shared"),
        Err(_) => tracing::warn!(%message_id, "bus publisher backed up, message not shared"),
    }
}
