use super::Transport;
use crate::rpc::types::{Message, ProcessId};

use anyhow::Result;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

const MAX_DATAGRAM: usize = 65536;

/// Bincode-encoded messages over UDP.
///
/// `send` only encodes and enqueues; a background loop does the socket
/// write. A second loop decodes inbound datagrams onto the channel
/// returned by [`UdpTransport::bind`].
pub struct UdpTransport {
    pub local_addr: SocketAddr,
    peers: DashMap<ProcessId, SocketAddr>,
    outbound: mpsc::UnboundedSender<(Vec<u8>, SocketAddr)>,
}

impl UdpTransport {
    pub async fn bind(
        bind_addr: SocketAddr,
    ) -> Result<(Arc<Self>, mpsc::UnboundedReceiver<Message>)> {
        let socket = Arc::new(UdpSocket::bind(bind_addr).await?);
        let local_addr = socket.local_addr()?;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        tokio::spawn(send_loop(socket.clone(), outbound_rx));
        tokio::spawn(receive_loop(socket, inbound_tx));

        tracing::info!("UDP transport listening on {}", local_addr);

        Ok((
            Arc::new(Self {
                local_addr,
                peers: DashMap::new(),
                outbound: outbound_tx,
            }),
            inbound_rx,
        ))
    }

    /// Records where `id` can be reached.
    pub fn add_peer(&self, id: ProcessId, addr: SocketAddr) {
        tracing::info!("Peer {} at {}", id, addr);
        self.peers.insert(id, addr);
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }
}

impl Transport for UdpTransport {
    fn send(&self, message: Message, destination: &ProcessId) {
        let Some(addr) = self.peers.get(destination).map(|entry| *entry.value()) else {
            tracing::warn!("No address for {}, dropping message", destination);
            return;
        };

        match message.encode() {
            Ok(encoded) => {
                if self.outbound.send((encoded, addr)).is_err() {
                    tracing::error!("Send loop has stopped, dropping message to {}", destination);
                }
            }
            Err(e) => {
                tracing::error!("Failed to serialize message for {}: {}", destination, e);
            }
        }
    }
}

async fn send_loop(
    socket: Arc<UdpSocket>,
    mut outbound: mpsc::UnboundedReceiver<(Vec<u8>, SocketAddr)>,
) {
    while let Some((bytes, addr)) = outbound.recv().await {
        if let Err(e) = socket.send_to(&bytes, addr).await {
            tracing::warn!("Failed to send datagram to {}: {}", addr, e);
        }
    }
    tracing::debug!("UDP send loop finished");
}

async fn receive_loop(socket: Arc<UdpSocket>, inbound: mpsc::UnboundedSender<Message>) {
    let mut buf = vec![0u8; MAX_DATAGRAM];

    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, src)) => match Message::decode(&buf[..len]) {
                Ok(message) => {
                    if inbound.send(message).is_err() {
                        tracing::debug!("Inbound channel closed, stopping UDP receive loop");
                        return;
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to deserialize message from {}: {}", src, e);
                }
            },
            Err(e) => {
                tracing::error!("Failed to receive UDP packet: {}", e);
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}
