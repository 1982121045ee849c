use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use serde_json::Value;
use tower::ServiceExt;

use crate::{
    composio::{ComposioError, ComposioResult, ConnectionRequest, ConnectorApi, TriggerInfo},
    db_core::schema::create_tables,
    model::connection::ConnectionCtrl,
    routes::AppRouter,
    server_config::Settings,
    ServerState,
};

/// Fresh in-memory SQLite database with every table created
pub async fn setup_db() -> DatabaseConnection {
    let mut db_options = ConnectOptions::new("sqlite::memory:");
    db_options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);

    let conn = Database::connect(db_options)
        .await
        .expect("In-memory database connection failed");
    create_tables(&conn).await.expect("Schema creation failed");

    conn
}

pub fn test_settings() -> Settings {
    Settings {
        default_user_id: "default-user".to_string(),
        webhook_base_url: "http://localhost:5006".to_string(),
        sync_max_results: 50,
        default_page_size: 20,
        max_page_size: 100,
        request_timeout_secs: 30,
        sync_timeout_secs: 120,
        cors_origins: vec!["http://localhost:3000".to_string()],
    }
}

/// Connector double that answers from memory and records every call
#[derive(Default)]
pub struct MockConnector {
    fetched: Mutex<Vec<Value>>,
    calls: Mutex<Vec<String>>,
    fail: AtomicBool,
    fetch_delay: Mutex<Option<Duration>>,
}

impl MockConnector {
    pub fn set_fetched(&self, payloads: Vec<Value>) {
        *self.fetched.lock().unwrap() = payloads;
    }

    /// Makes `fetch_emails` sleep before answering
    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock().unwrap() = Some(delay);
    }

    /// Every call from now on answers with an upstream error
    pub fn fail_next_calls(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) -> ComposioResult<()> {
        self.calls.lock().unwrap().push(call.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(ComposioError::Api {
                endpoint: call,
                status: 500,
                message: "mock failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ConnectorApi for MockConnector {
    async fn initiate_connection(
        &self,
        user_id: &str,
        _redirect_url: Option<&str>,
    ) -> ComposioResult<ConnectionRequest> {
        self.record(format!("initiate_connection:{user_id}"))?;
        Ok(ConnectionRequest {
            redirect_url: format!("https://connect.example.com/link/{user_id}"),
            connected_account_id: format!("ca_{user_id}"),
        })
    }

    async fn enable_email_trigger(
        &self,
        user_id: &str,
        connected_account_id: &str,
        webhook_url: &str,
    ) -> ComposioResult<TriggerInfo> {
        self.record(format!("enable_email_trigger:{user_id}:{webhook_url}"))?;
        Ok(TriggerInfo {
            trigger_id: format!("trigger-{connected_account_id}"),
        })
    }

    async fn disable_trigger(&self, user_id: &str, trigger_id: &str) -> ComposioResult<()> {
        self.record(format!("disable_trigger:{user_id}:{trigger_id}"))
    }

    async fn fetch_emails(&self, user_id: &str, max_results: u32) -> ComposioResult<Vec<Value>> {
        self.record(format!("fetch_emails:{user_id}:{max_results}"))?;
        let delay = *self.fetch_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.fetched.lock().unwrap().clone())
    }
}

pub struct TestApp {
    pub conn: DatabaseConnection,
    pub connector: Arc<MockConnector>,
    state: ServerState,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_settings(test_settings()).await
    }

    pub async fn with_settings(settings: Settings) -> Self {
        let conn = setup_db().await;
        let connector = Arc::new(MockConnector::default());
        let state = ServerState {
            conn: conn.clone(),
            connector: connector.clone(),
            settings: Arc::new(settings),
        };

        TestApp {
            conn,
            connector,
            state,
        }
    }

    pub fn router(&self) -> Router {
        AppRouter::create(self.state.clone())
    }

    /// Stores an active connection without going through the connector
    pub async fn activate(&self, user_id: &str) {
        let account = format!("ca_{user_id}");
        ConnectionCtrl::activate(&self.conn, user_id, &account, &format!("trigger-{account}"))
            .await
            .unwrap();
    }
}

pub fn empty_request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn json_request(method: Method, uri: &str, body: &Value) -> Request<Body> {
    raw_request(method, uri, &body.to_string())
}

/// Body without a `Content-Type` header
pub fn untyped_request(method: Method, uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn raw_request(method: Method, uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Runs one request through the router; non-JSON bodies come back as `Value::Null`
pub async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}
