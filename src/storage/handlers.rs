use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
};
use std::sync::Arc;

use super::chunked::ChunkedBitmapStore;
use super::protocol::{FetchBitmapResponse, StoreBitmapRequest, StoreBitmapResponse};
use super::schema::PartitionKey;
use crate::bitmap::Bitmap;
use crate::error::StoreError;

pub async fn handle_fetch_bitmap(
    Extension(store): Extension<Arc<ChunkedBitmapStore>>,
    Path((db, frame, slice, bitmap_id)): Path<(String, String, i32, i64)>,
) -> (StatusCode, Json<Option<FetchBitmapResponse>>) {
    let partition = PartitionKey::new(bitmap_id, db, frame, slice);

    match store.fetch(&partition).await {
        Ok((bitmap, filter)) => (
            StatusCode::OK,
            Json(Some(FetchBitmapResponse {
                positions: bitmap.positions().collect(),
                count: bitmap.count(),
                filter,
            })),
        ),
        Err(e) => {
            tracing::error!("Failed to fetch bitmap {}: {}", bitmap_id, e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(None))
        }
    }
}

pub async fn handle_store_bitmap(
    Extension(store): Extension<Arc<ChunkedBitmapStore>>,
    Json(req): Json<StoreBitmapRequest>,
) -> (StatusCode, Json<StoreBitmapResponse>) {
    let partition = PartitionKey::new(req.bitmap_id, req.db, req.frame, req.slice);
    let bitmap = Bitmap::from_positions(req.positions);

    match store.store(&partition, req.filter, &bitmap).await {
        Ok(()) => (StatusCode::OK, Json(StoreBitmapResponse { success: true })),
        Err(e @ StoreError::FilterOutOfRange(_)) => {
            tracing::warn!("Rejected bitmap {}: {}", partition.bitmap_id, e);
            (
                StatusCode::BAD_REQUEST,
                Json(StoreBitmapResponse { success: false }),
            )
        }
        Err(e) => {
            tracing::error!("Failed to store bitmap {}: {}", partition.bitmap_id, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(StoreBitmapResponse { success: false }),
            )
        }
    }
}
