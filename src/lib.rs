//! Bitmap Index Node Library
//!
//! Core modules of one node of a distributed sparse-bitmap index.
//! The binary (`main.rs`) wires them into a running process.
//!
//! ## Architecture Modules
//! - **`bitmap`**: In-memory sparse bitmap, split into 2048-bit chunks of 32 words.
//! - **`storage`**: Chunked persistence into a wide-column table: sparse rows, a cached
//!   count row, and one atomic batch per store.
//! - **`rpc`**: Request/response over a fire-and-forget transport. The `Hold` table
//!   correlates replies with waiting callers; `Ping` measures round trips.
//! - **`transport`**: Message delivery between processes (UDP or in-process).
//! - **`config`**, **`metrics`**, **`error`**: Node configuration, operation timers, error types.

pub mod bitmap;
pub mod config;
pub mod error;
pub mod metrics;
pub mod rpc;
pub mod storage;
pub mod transport;
