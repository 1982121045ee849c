use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, FixedOffset};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};

use crate::{
    error::{AppError, AppJsonResult},
    model::connection::ConnectionCtrl,
    server_config::Settings,
    Connector,
};

use super::json_body_or_default;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest {
    #[serde(alias = "user_id")]
    pub user_id: Option<String>,
    #[serde(alias = "redirect_url")]
    pub redirect_url: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectResponse {
    pub redirect_url: String,
    pub connection_id: String,
    pub status: &'static str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRequest {
    #[serde(alias = "user_id")]
    pub user_id: Option<String>,
    #[serde(alias = "connected_account_id")]
    pub connected_account_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteResponse {
    pub status: &'static str,
    pub trigger_id: String,
    pub webhook_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusQuery {
    #[serde(alias = "user_id")]
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ConnectionStatus {
    #[serde(rename_all = "camelCase")]
    Connected {
        user_id: String,
        is_active: bool,
        connected_at: Option<DateTime<FixedOffset>>,
    },
    NotConnected { status: &'static str },
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectRequest {
    #[serde(alias = "user_id")]
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectResponse {
    pub status: &'static str,
    pub trigger_disabled: bool,
}

fn user_or_default(user_id: Option<String>, settings: &Settings) -> String {
    user_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| settings.default_user_id.clone())
}

/// # POST /api/connect
///
/// Starts the OAuth link. The client is expected to open `redirectUrl`.
pub async fn initiate(
    State(conn): State<DatabaseConnection>,
    State(connector): State<Connector>,
    State(settings): State<Arc<Settings>>,
    body: Bytes,
) -> AppJsonResult<ConnectResponse> {
    let request: ConnectRequest = json_body_or_default(&body)?;
    let user_id = user_or_default(request.user_id, &settings);

    let link = connector
        .initiate_connection(&user_id, request.redirect_url.as_deref())
        .await?;
    ConnectionCtrl::mark_pending(&conn, &user_id, &link.connected_account_id).await?;

    Ok(Json(ConnectResponse {
        redirect_url: link.redirect_url,
        connection_id: link.connected_account_id,
        status: "initiated",
    }))
}

/// # POST /api/connect/complete
///
/// Enables the new-message trigger for a linked account and marks the connection active.
pub async fn complete(
    State(conn): State<DatabaseConnection>,
    State(connector): State<Connector>,
    State(settings): State<Arc<Settings>>,
    body: Bytes,
) -> AppJsonResult<CompleteResponse> {
    let request: CompleteRequest = json_body_or_default(&body)?;
    let connected_account_id = request
        .connected_account_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::BadRequest("connected_account_id is required".to_string()))?;
    let user_id = user_or_default(request.user_id, &settings);
    let webhook_url = settings.webhook_url();

    let trigger = connector
        .enable_email_trigger(&user_id, &connected_account_id, &webhook_url)
        .await?;
    ConnectionCtrl::activate(&conn, &user_id, &connected_account_id, &trigger.trigger_id).await?;

    Ok(Json(CompleteResponse {
        status: "connected",
        trigger_id: trigger.trigger_id,
        webhook_url,
    }))
}

/// # GET /api/connect/status
pub async fn status(
    State(conn): State<DatabaseConnection>,
    State(settings): State<Arc<Settings>>,
    Query(query): Query<StatusQuery>,
) -> AppJsonResult<ConnectionStatus> {
    let user_id = user_or_default(query.user_id, &settings);

    let status = match ConnectionCtrl::get_by_user(&conn, &user_id).await? {
        Some(connection) => ConnectionStatus::Connected {
            user_id: connection.user_id,
            is_active: connection.is_active,
            connected_at: connection.connected_at,
        },
        None => ConnectionStatus::NotConnected {
            status: "not_connected",
        },
    };

    Ok(Json(status))
}

/// # POST /api/connect/disconnect
///
/// Disables the recorded trigger, if any, and marks the connection inactive. A trigger that
/// cannot be disabled upstream does not block the local disconnect.
pub async fn disconnect(
    State(conn): State<DatabaseConnection>,
    State(connector): State<Connector>,
    State(settings): State<Arc<Settings>>,
    body: Bytes,
) -> AppJsonResult<DisconnectResponse> {
    let request: DisconnectRequest = json_body_or_default(&body)?;
    let user_id = user_or_default(request.user_id, &settings);

    let connection = ConnectionCtrl::get_by_user(&conn, &user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No connection found for {}", user_id)))?;

    let trigger_disabled = if connection.trigger_id.is_empty() {
        false
    } else {
        match connector
            .disable_trigger(&user_id, &connection.trigger_id)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Could not disable trigger {}: {}", connection.trigger_id, e);
                false
            }
        }
    };

    ConnectionCtrl::deactivate(&conn, connection, trigger_disabled).await?;

    Ok(Json(DisconnectResponse {
        status: "disconnected",
        trigger_disabled,
    }))
}
