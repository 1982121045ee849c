use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, FixedOffset};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};

use crate::{
    db_core::prelude::*,
    error::{AppError, AppJsonResult, AppResult},
    model::email::{EmailCtrl, EmailCursor, EmailStats, EmailSummary},
    server_config::Settings,
};

#[derive(Debug, Deserialize)]
pub struct ListEmailsQuery {
    pub limit: Option<u64>,
    /// Base64-encoded cursor returned as `nextCursor` by the previous page
    pub cursor: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListEmailsResponse {
    pub emails: Vec<EmailSummary>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailDetail {
    pub id: i32,
    pub message_id: String,
    pub thread_id: String,
    pub subject: String,
    pub sender: String,
    pub recipient: String,
    pub body_text: String,
    pub body_html: String,
    pub snippet: String,
    pub labels: serde_json::Value,
    pub received_at: DateTime<FixedOffset>,
    pub is_read: bool,
    pub created_at: DateTime<FixedOffset>,
}

impl From<email::Model> for EmailDetail {
    fn from(model: email::Model) -> Self {
        EmailDetail {
            id: model.id,
            message_id: model.message_id,
            thread_id: model.thread_id,
            subject: model.subject,
            sender: model.sender,
            recipient: model.recipient,
            body_text: model.body_text,
            body_html: model.body_html,
            snippet: model.snippet,
            labels: model.labels,
            received_at: model.received_at,
            is_read: model.is_read,
            created_at: model.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

fn decode_cursor(raw: &str) -> AppResult<EmailCursor> {
    let decoded = URL_SAFE_NO_PAD
        .decode(raw)
        .map_err(|_| AppError::BadRequest("Invalid cursor".into()))?;

    serde_json::from_slice::<EmailCursor>(&decoded)
        .map_err(|_| AppError::BadRequest("Invalid cursor format".into()))
}

fn encode_cursor(cursor: &EmailCursor) -> AppResult<String> {
    let bytes = serde_json::to_vec(cursor).map_err(|e| AppError::Internal(e.into()))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// # GET /api/emails
///
/// Newest first. Query parameters:
/// - `limit`: page size (default and maximum come from settings)
/// - `cursor`: `nextCursor` of the previous page
pub async fn list(
    State(conn): State<DatabaseConnection>,
    State(settings): State<Arc<Settings>>,
    Query(query): Query<ListEmailsQuery>,
) -> AppJsonResult<ListEmailsResponse> {
    let limit = query
        .limit
        .unwrap_or(settings.default_page_size)
        .clamp(1, settings.max_page_size);
    let cursor = query.cursor.as_deref().map(decode_cursor).transpose()?;

    // One extra row tells whether another page exists
    let mut emails = EmailCtrl::list(&conn, limit + 1, cursor).await?;
    let has_more = emails.len() > limit as usize;
    emails.truncate(limit as usize);

    let next_cursor = match emails.last() {
        Some(last) if has_more => Some(encode_cursor(&last.cursor())?),
        _ => None,
    };

    Ok(Json(ListEmailsResponse {
        emails,
        next_cursor,
        has_more,
    }))
}

/// # GET /api/emails/:id
pub async fn get_one(
    State(conn): State<DatabaseConnection>,
    Path(id): Path<i32>,
) -> AppJsonResult<EmailDetail> {
    let email = EmailCtrl::get_by_id(&conn, id).await?;
    Ok(Json(email.into()))
}

/// # POST /api/emails/:id/mark_read
pub async fn mark_read(
    State(conn): State<DatabaseConnection>,
    Path(id): Path<i32>,
) -> AppJsonResult<StatusResponse> {
    EmailCtrl::mark_as_read(&conn, id).await?;
    Ok(Json(StatusResponse {
        status: "marked as read",
    }))
}

/// # GET /api/emails/stats
pub async fn stats(State(conn): State<DatabaseConnection>) -> AppJsonResult<EmailStats> {
    Ok(Json(EmailCtrl::stats(&conn).await?))
}
