use super::Transport;
use crate::rpc::types::{Message, ProcessId};

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// A set of in-process mailboxes, one per registered process.
#[derive(Default)]
pub struct MemoryNetwork {
    mailboxes: DashMap<ProcessId, mpsc::UnboundedSender<Message>>,
}

impl MemoryNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers `id` and returns its sending handle and inbound stream.
    pub fn join(
        self: &Arc<Self>,
        id: ProcessId,
    ) -> (Arc<MemoryTransport>, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.mailboxes.insert(id, tx);
        let transport = Arc::new(MemoryTransport {
            network: self.clone(),
        });
        (transport, rx)
    }

    /// Removes `id`; messages sent to it from now on are dropped.
    pub fn disconnect(&self, id: &ProcessId) {
        self.mailboxes.remove(id);
    }

    fn deliver(&self, message: Message, destination: &ProcessId) {
        match self.mailboxes.get(destination) {
            Some(mailbox) => {
                if mailbox.send(message).is_err() {
                    tracing::debug!("Mailbox for {} is closed, dropping message", destination);
                }
            }
            None => {
                tracing::debug!("Unknown destination {}, dropping message", destination);
            }
        }
    }
}

pub struct MemoryTransport {
    network: Arc<MemoryNetwork>,
}

impl Transport for MemoryTransport {
    fn send(&self, message: Message, destination: &ProcessId) {
        self.network.deliver(message, destination);
    }
}
