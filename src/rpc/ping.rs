use super::hold::Hold;
use super::types::{Message, PingRequest, ProcessId, RequestId};
use crate::error::HoldError;
use crate::transport::Transport;

use std::sync::Arc;
use std::time::{Duration, Instant};

pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(60);

/// Measures round-trip latency to peers.
pub struct PingService {
    pub id: ProcessId,
    transport: Arc<dyn Transport>,
    hold: Arc<Hold<RequestId>>,
    timeout: Duration,
}

impl PingService {
    pub fn new(id: ProcessId, transport: Arc<dyn Transport>, hold: Arc<Hold<RequestId>>) -> Self {
        Self {
            id,
            transport,
            hold,
            timeout: DEFAULT_PING_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sends a ping to `peer` and waits for the matching pong.
    ///
    /// The hold error is returned as-is when no pong arrives in time; there
    /// is no retry.
    pub async fn ping(&self, peer: &ProcessId) -> Result<Duration, HoldError> {
        let id = RequestId::new();
        let request = Message::Ping(PingRequest {
            id,
            source: self.id,
        });

        // Registered before the send so an early pong still finds its waiter.
        let waiter = self.hold.register(id)?;
        self.transport.send(request, peer);
        let start = Instant::now();
        waiter.wait(self.timeout).await?;

        let elapsed = start.elapsed();
        tracing::debug!("Ping {} to {} took {:?}", id, peer, elapsed);
        Ok(elapsed)
    }
}
