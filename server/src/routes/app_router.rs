use std::time::Duration;

use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use http::{header, HeaderValue, Method};
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer};

use crate::{request_tracing, ServerState};

use super::{connection, emails, sync, webhook};

pub struct AppRouter;

impl AppRouter {
    pub fn create(state: ServerState) -> Router {
        let origins = state
            .settings
            .cors_origins
            .iter()
            .filter_map(|origin| match origin.parse::<HeaderValue>() {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!("Ignoring invalid CORS origin {}", origin);
                    None
                }
            })
            .collect::<Vec<_>>();

        let cors_layer = CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            .allow_credentials(true);

        let request_timeout = Duration::from_secs(state.settings.request_timeout_secs);
        let sync_timeout = Duration::from_secs(state.settings.sync_timeout_secs);

        let api = Router::new()
            .route("/emails", get(emails::list))
            .route("/emails/stats", get(emails::stats))
            .route("/emails/:id", get(emails::get_one))
            .route("/emails/:id/mark_read", post(emails::mark_read))
            .route("/webhook/email", post(webhook::receive_email))
            .route("/webhook/email/", post(webhook::receive_email))
            .route("/connect", post(connection::initiate))
            .route("/connect/complete", post(connection::complete))
            .route("/connect/status", get(connection::status))
            .route("/connect/disconnect", post(connection::disconnect))
            .route_layer(TimeoutLayer::new(request_timeout))
            // Sync waits on the connector fetch, so it gets its own budget
            .route(
                "/sync",
                post(sync::sync_emails).layer(TimeoutLayer::new(sync_timeout)),
            );

        Router::new()
            .route("/", get(|| async { "Inbox server" }))
            .nest("/api", api)
            .layer(request_tracing::trace_with_request_id_layer())
            .layer(cors_layer)
            .with_state(state)
            .fallback(handler_404)
    }
}

pub async fn handler_404() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Route does not exist")
}
