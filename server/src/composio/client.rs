use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};

use crate::{server_config::ComposioSettings, HttpClient};

use super::{ComposioError, ComposioResult, ConnectionRequest, ConnectorApi, TriggerInfo};

const API_KEY_HEADER: &str = "x-api-key";

macro_rules! composio_url {
    ($base:expr, $($segments:expr),*) => {
        {
            let segments: Vec<&str> = vec![$($segments),*];
            format!("{}/{}", $base.trim_end_matches('/'), segments.join("/"))
        }
    };
}

/// Envelope returned by action executions
#[derive(Debug, Default, Deserialize)]
struct ActionResponse {
    data: Option<Value>,
    response_data: Option<Value>,
    successful: Option<bool>,
    error: Option<Value>,
}

/// Known shapes of the `GMAIL_FETCH_EMAILS` result
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ActionData {
    Messages { messages: Vec<Value> },
    Emails { emails: Vec<Value> },
    List(Vec<Value>),
    Other(Value),
}

impl ActionData {
    fn into_messages(self) -> Vec<Value> {
        match self {
            ActionData::Messages { messages } => messages,
            ActionData::Emails { emails } => emails,
            ActionData::List(items) => items,
            ActionData::Other(other) => {
                tracing::warn!("Unrecognized fetch result shape: {}", other);
                Vec::new()
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TriggerResponse {
    trigger_id: Option<String>,
}

/// HTTP client for the Composio platform
#[derive(Clone)]
pub struct ComposioClient {
    http_client: HttpClient,
    api_key: String,
    settings: ComposioSettings,
}

impl ComposioClient {
    pub fn new(http_client: HttpClient, api_key: String, settings: ComposioSettings) -> Self {
        Self {
            http_client,
            api_key,
            settings,
        }
    }

    async fn post<T: DeserializeOwned>(&self, url: String, body: Value) -> ComposioResult<T> {
        tracing::debug!("POST {}", url);
        let resp = self
            .http_client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|source| ComposioError::Transport {
                endpoint: url.clone(),
                source,
            })?;

        let resp = Self::check_status(&url, resp).await?;

        resp.json::<T>().await.map_err(|e| ComposioError::Decode {
            endpoint: url,
            reason: e.to_string(),
        })
    }

    async fn check_status(url: &str, resp: Response) -> ComposioResult<Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.text().await.unwrap_or_default();
        Err(ComposioError::Api {
            endpoint: url.to_string(),
            status: status.as_u16(),
            message: error_message(status, &body),
        })
    }
}

fn error_message(status: StatusCode, body: &str) -> String {
    let from_json = serde_json::from_str::<Value>(body).ok().and_then(|value| {
        ["message", "error"]
            .iter()
            .find_map(|key| value.get(*key).and_then(Value::as_str).map(str::to_string))
    });

    match from_json {
        Some(message) => message,
        None if !body.trim().is_empty() => body.trim().to_string(),
        None => status
            .canonical_reason()
            .unwrap_or("Unknown error")
            .to_string(),
    }
}

fn extract_messages(endpoint: &str, response: ActionResponse) -> ComposioResult<Vec<Value>> {
    if response.successful == Some(false) {
        let message = match response.error {
            Some(Value::String(message)) => message,
            Some(other) => other.to_string(),
            None => "Action execution failed".to_string(),
        };
        return Err(ComposioError::Api {
            endpoint: endpoint.to_string(),
            status: StatusCode::OK.as_u16(),
            message,
        });
    }

    let Some(data) = response.data.or(response.response_data) else {
        return Ok(Vec::new());
    };

    let messages = serde_json::from_value::<ActionData>(data)
        .map(ActionData::into_messages)
        .map_err(|e| ComposioError::Decode {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })?;

    Ok(messages)
}

#[async_trait]
impl ConnectorApi for ComposioClient {
    async fn initiate_connection(
        &self,
        user_id: &str,
        redirect_url: Option<&str>,
    ) -> ComposioResult<ConnectionRequest> {
        let url = composio_url!(self.settings.base_url, "api/v1/connectedAccounts");
        let body = json!({
            "entityId": user_id,
            "appName": self.settings.app_name,
            "redirectUri": redirect_url,
        });

        let request: ConnectionRequest = self.post(url, body).await?;
        tracing::info!(
            "Initiated {} connection {} for {}",
            self.settings.app_name,
            request.connected_account_id,
            user_id
        );

        Ok(request)
    }

    async fn enable_email_trigger(
        &self,
        user_id: &str,
        connected_account_id: &str,
        webhook_url: &str,
    ) -> ComposioResult<TriggerInfo> {
        let url = composio_url!(
            self.settings.base_url,
            "api/v1/triggers/enable",
            connected_account_id,
            self.settings.new_message_trigger.as_str()
        );
        let body = json!({
            "triggerConfig": { "callback_url": webhook_url },
        });

        let resp: Value = self.post(url, body).await?;
        let trigger_id = serde_json::from_value::<TriggerResponse>(resp.clone())
            .ok()
            .and_then(|trigger| trigger.trigger_id)
            .unwrap_or_else(|| resp.to_string());

        tracing::info!("Enabled trigger {} for {}", trigger_id, user_id);
        Ok(TriggerInfo { trigger_id })
    }

    async fn disable_trigger(&self, user_id: &str, trigger_id: &str) -> ComposioResult<()> {
        let url = composio_url!(
            self.settings.base_url,
            "api/v1/triggers/disable",
            trigger_id
        );

        let _: Value = self.post(url, json!({})).await?;
        tracing::info!("Disabled trigger {} for {}", trigger_id, user_id);

        Ok(())
    }

    async fn fetch_emails(&self, user_id: &str, max_results: u32) -> ComposioResult<Vec<Value>> {
        let url = composio_url!(
            self.settings.base_url,
            "api/v2/actions",
            self.settings.fetch_emails_action.as_str(),
            "execute"
        );
        let body = json!({
            "entityId": user_id,
            "appName": self.settings.app_name,
            "input": { "max_results": max_results },
        });

        let resp: Value = self.post(url.clone(), body).await?;
        if !resp.is_object() {
            return Ok(Vec::new());
        }
        let response = serde_json::from_value::<ActionResponse>(resp).unwrap_or_default();

        extract_messages(&url, response)
    }
}
