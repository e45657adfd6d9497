//! Transport Module
//!
//! Fire-and-forget delivery of [`Message`]s between node processes.
//!
//! A send hands the message off and returns immediately. There is no
//! delivery confirmation and no ordering between messages; anything that
//! needs a reply correlates it through the `Hold` table.
//!
//! ## Implementations
//! - **`udp`**: bincode datagrams over a tokio `UdpSocket`.
//! - **`memory`**: in-process channels, used for tests and single-process clusters.

pub mod memory;
pub mod udp;

use crate::rpc::types::{Message, ProcessId};

pub trait Transport: Send + Sync {
    /// Queues `message` for `destination`. Never blocks, never reports delivery.
    fn send(&self, message: Message, destination: &ProcessId);
}
