use axum::{body::Bytes, extract::State, Json};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use serde_json::Value;

use crate::{
    email::ingest::{ingest_one, IngestAction},
    error::{AppError, AppJsonResult},
    util::truncate_chars,
};

/// Longest payload excerpt written to the log
const LOGGED_PAYLOAD_CHARS: usize = 500;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookResponse {
    pub status: &'static str,
    pub action: IngestAction,
    pub email_id: i32,
}

/// # POST /api/webhook/email
///
/// Receives new-message deliveries from the connector trigger. The body is read raw so a
/// malformed delivery is answered with our own error shape.
pub async fn receive_email(
    State(conn): State<DatabaseConnection>,
    body: Bytes,
) -> AppJsonResult<WebhookResponse> {
    let payload = serde_json::from_slice::<Value>(&body).map_err(|e| {
        tracing::warn!("Webhook body is not valid JSON: {}", e);
        AppError::BadRequest("Invalid JSON".to_string())
    })?;

    tracing::info!(
        "Webhook payload: {}",
        truncate_chars(&payload.to_string(), LOGGED_PAYLOAD_CHARS)
    );

    let (email_id, action) = ingest_one(&conn, payload).await?;

    Ok(Json(WebhookResponse {
        status: "success",
        action,
        email_id,
    }))
}
