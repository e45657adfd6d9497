//! Storage HTTP Protocol
//!
//! Endpoints and DTOs for reading and writing bitmaps on this node.

use serde::{Deserialize, Serialize};

/// Fetch endpoint: `GET /bitmap/:db/:frame/:slice/:bitmap_id`.
pub const ENDPOINT_BITMAP_GET: &str = "/bitmap/:db/:frame/:slice/:bitmap_id";
/// Store endpoint: `POST /bitmap`.
pub const ENDPOINT_BITMAP_STORE: &str = "/bitmap";

/// Write request: the full set of positions for one bitmap.
#[derive(Debug, Serialize, Deserialize)]
pub struct StoreBitmapRequest {
    pub bitmap_id: i64,
    pub db: String,
    pub frame: String,
    pub slice: i32,
    /// Opaque caller metadata returned unchanged on fetch.
    #[serde(default)]
    pub filter: u64,
    pub positions: Vec<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StoreBitmapResponse {
    pub success: bool,
}

/// Read response. `count` is the cached count from storage.
#[derive(Debug, Serialize, Deserialize)]
pub struct FetchBitmapResponse {
    pub positions: Vec<u64>,
    pub count: u64,
    pub filter: u64,
}
