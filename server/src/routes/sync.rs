use std::sync::Arc;

use axum::{body::Bytes, extract::State, Json};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};

use crate::{
    email::ingest::{ingest_batch, BatchReport},
    error::{AppError, AppJsonResult},
    model::connection::ConnectionCtrl,
    server_config::Settings,
    Connector,
};

use super::json_body_or_default;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    #[serde(alias = "user_id")]
    pub user_id: Option<String>,
    #[serde(alias = "max_results")]
    pub max_results: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub status: &'static str,
    #[serde(flatten)]
    pub report: BatchReport,
}

/// # POST /api/sync
///
/// Pulls recent messages through the connector and ingests them in order. Items that
/// cannot be stored are counted in the report instead of failing the request.
pub async fn sync_emails(
    State(conn): State<DatabaseConnection>,
    State(connector): State<Connector>,
    State(settings): State<Arc<Settings>>,
    body: Bytes,
) -> AppJsonResult<SyncResponse> {
    let request: SyncRequest = json_body_or_default(&body)?;
    let user_id = request
        .user_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| settings.default_user_id.clone());
    let max_results = request.max_results.unwrap_or(settings.sync_max_results);

    ConnectionCtrl::get_active(&conn, &user_id)
        .await?
        .ok_or_else(|| AppError::BadRequest("No active connection found".to_string()))?;

    let payloads = connector.fetch_emails(&user_id, max_results).await?;
    tracing::info!("Fetched {} emails for {}", payloads.len(), user_id);

    let report = ingest_batch(&conn, payloads).await;

    Ok(Json(SyncResponse {
        status: "synced",
        report,
    }))
}
