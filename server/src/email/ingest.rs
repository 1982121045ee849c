use sea_orm::DatabaseConnection;
use serde::Serialize;
use serde_json::Value;
use strum::AsRefStr;

use crate::{
    error::{AppError, AppResult},
    model::email::EmailCtrl,
};

use super::canonical::normalize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum IngestAction {
    Created,
    Updated,
}

/// Normalizes one payload and upserts it. Payloads without a message id are rejected
/// before anything is written.
pub async fn ingest_one(
    conn: &DatabaseConnection,
    payload: Value,
) -> AppResult<(i32, IngestAction)> {
    let record = normalize(payload);
    if !record.has_message_id() {
        tracing::warn!("Rejecting payload without message id");
        return Err(AppError::BadRequest("Missing message_id".to_string()));
    }

    let message_id = record.message_id.clone();
    let outcome = EmailCtrl::upsert(conn, record).await?;
    let action = if outcome.created {
        IngestAction::Created
    } else {
        IngestAction::Updated
    };

    tracing::info!(
        "Email {} {} as {}",
        message_id,
        action.as_ref(),
        outcome.id
    );
    Ok((outcome.id, action))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub emails_fetched: usize,
    pub emails_created: usize,
    pub emails_updated: usize,
    pub emails_skipped: usize,
    pub emails_failed: usize,
}

/// Ingests fetched payloads in order. A failing item is logged and counted, and the rest of
/// the batch is still attempted.
pub async fn ingest_batch(conn: &DatabaseConnection, payloads: Vec<Value>) -> BatchReport {
    let mut report = BatchReport {
        emails_fetched: payloads.len(),
        ..Default::default()
    };

    for (index, payload) in payloads.into_iter().enumerate() {
        match ingest_one(conn, payload).await {
            Ok((_, IngestAction::Created)) => report.emails_created += 1,
            Ok((_, IngestAction::Updated)) => report.emails_updated += 1,
            Err(AppError::BadRequest(reason)) => {
                tracing::warn!("Skipping fetched item {}: {}", index, reason);
                report.emails_skipped += 1;
            }
            Err(e) => {
                tracing::error!("Failed to store fetched item {}: {}", index, e);
                report.emails_failed += 1;
            }
        }
    }

    tracing::info!(
        "Batch ingested: {} fetched, {} created, {} updated, {} skipped, {} failed",
        report.emails_fetched,
        report.emails_created,
        report.emails_updated,
        report.emails_skipped,
        report.emails_failed
    );
    report
}
