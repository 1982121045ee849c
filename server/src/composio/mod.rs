mod client;
mod error;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

pub use client::ComposioClient;
pub use error::{ComposioError, ComposioResult};

/// Outcome of starting the OAuth linking flow
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRequest {
    pub redirect_url: String,
    pub connected_account_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerInfo {
    pub trigger_id: String,
}

/// Operations the server needs from the hosted connector platform.
#[async_trait]
pub trait ConnectorApi: Send + Sync {
    /// Starts an OAuth link for `user_id`. The returned redirect URL is handed to the client.
    async fn initiate_connection(
        &self,
        user_id: &str,
        redirect_url: Option<&str>,
    ) -> ComposioResult<ConnectionRequest>;

    /// Subscribes `webhook_url` to new-message events of a linked account.
    async fn enable_email_trigger(
        &self,
        user_id: &str,
        connected_account_id: &str,
        webhook_url: &str,
    ) -> ComposioResult<TriggerInfo>;

    async fn disable_trigger(&self, user_id: &str, trigger_id: &str) -> ComposioResult<()>;

    /// Fetches up to `max_results` recent messages as raw payloads, newest first.
    async fn fetch_emails(&self, user_id: &str, max_results: u32) -> ComposioResult<Vec<Value>>;
}
