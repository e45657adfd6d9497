use super::hold::Hold;
use super::types::{Message, PongRequest, ProcessId, RequestId};
use crate::transport::Transport;

use std::sync::Arc;
use tokio::sync::mpsc;

/// Routes inbound messages: answers pings, hands pongs to the hold table.
pub struct Dispatcher {
    local_id: ProcessId,
    transport: Arc<dyn Transport>,
    hold: Arc<Hold<RequestId>>,
}

impl Dispatcher {
    pub fn new(
        local_id: ProcessId,
        transport: Arc<dyn Transport>,
        hold: Arc<Hold<RequestId>>,
    ) -> Self {
        Self {
            local_id,
            transport,
            hold,
        }
    }

    pub fn dispatch(&self, message: Message) {
        match message {
            Message::Ping(ping) => {
                tracing::debug!("{} answering ping {} from {}", self.local_id, ping.id, ping.source);
                self.transport
                    .send(Message::Pong(PongRequest { id: ping.id }), &ping.source);
            }
            Message::Pong(pong) => {
                if !self.hold.put(pong.id, pong.id) {
                    tracing::warn!("Late or unknown pong {}", pong.id);
                }
            }
        }
    }

    /// Dispatches until the inbound channel closes.
    pub async fn run(self: Arc<Self>, mut inbound: mpsc::UnboundedReceiver<Message>) {
        while let Some(message) = inbound.recv().await {
            self.dispatch(message);
        }
        tracing::info!("Dispatcher for {} stopped", self.local_id);
    }
}
