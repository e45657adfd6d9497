//! Request/Response Module
//!
//! Synchronous round trips over a one-way, unordered transport.
//!
//! ## Core Mechanisms
//! - **Hold**: a concurrent table from request id to a single-use waiter, released by a reply or a timeout.
//! - **Ping/Pong**: latency probe; the requester waits in the hold table for the pong carrying its id.
//! - **Dispatch**: exhaustive match over the closed `Message` enum decoded at the transport boundary.

pub mod dispatch;
pub mod handlers;
pub mod hold;
pub mod ping;
pub mod types;
