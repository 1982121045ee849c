mod app_router;
mod connection;
mod emails;
mod sync;
mod webhook;

pub use app_router::AppRouter;

use axum::body::Bytes;
use serde::de::DeserializeOwned;

use crate::error::{AppError, AppResult};

/// Decodes an optional JSON request body. Only an empty body falls back to the defaults;
/// anything else must parse, whatever the `Content-Type` header says.
fn json_body_or_default<T>(body: &Bytes) -> AppResult<T>
where
    T: DeserializeOwned + Default,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }

    serde_json::from_slice(body).map_err(|e| {
        tracing::warn!("Rejected request body: {}", e);
        AppError::BadRequest(format!("Invalid JSON: {}", e))
    })
}
