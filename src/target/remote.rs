//! Remote configuration source and fetch status reporting.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::debug;

use crate::error::RemoteFetchError;

/// Remote config parameter holding the relay destination.
pub const REMOTE_TARGET_KEY: &str = "target_sms_forward_number";

/// A remote configuration service.
///
/// Implementations fetch and activate the latest config and return the
/// destination parameter, or an empty string when the parameter is unset.
#[async_trait]
pub trait RemoteConfigSource: Send + Sync {
    async fn fetch_target(&self) -> Result<String, RemoteFetchError>;
}

/// Outcome of the most recent remote refresh, shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FetchStatus {
    /// No refresh has run yet.
    Idle,
    /// No remote source is configured.
    Disabled,
    /// A fetch is in flight.
    Fetching,
    /// The remote value was applied.
    RemoteApplied { value: String },
    /// The remote parameter was blank.
    RemoteBlank,
    /// The fetch failed.
    Failed { reason: String },
}

impl FetchStatus {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Idle => "Remote config not fetched yet.",
            Self::Disabled => "Remote config disabled. Using local fallback.",
            Self::Fetching => "Fetching remote config...",
            Self::RemoteApplied { .. } => "Remote config fetched: Using remote number.",
            Self::RemoteBlank => "Remote number not set. Using local fallback.",
            Self::Failed { .. } => "Remote config fetch failed. Using local fallback.",
        }
    }
}

/// Fetches remote config as a JSON document over HTTP.
///
/// The destination is read from the top-level object or from an `entries`
/// object (the shape of a Firebase Remote Config REST response). A missing
/// parameter is treated as blank, matching an empty in-app default.
pub struct HttpRemoteConfig {
    client: reqwest::Client,
    url: String,
    api_key: Option<SecretString>,
}

impl HttpRemoteConfig {
    pub fn new(url: impl Into<String>, api_key: Option<SecretString>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            api_key,
        }
    }
}

#[async_trait]
impl RemoteConfigSource for HttpRemoteConfig {
    async fn fetch_target(&self) -> Result<String, RemoteFetchError> {
        let mut request = self.client.get(&self.url);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let resp = request
            .send()
            .await
            .map_err(|e| RemoteFetchError::Request(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(RemoteFetchError::Status {
                status: status.as_u16(),
            });
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| RemoteFetchError::InvalidBody(e.to_string()))?;

        let value = extract_parameter(&body, REMOTE_TARGET_KEY)?;
        debug!(url = %self.url, blank = value.trim().is_empty(), "Remote config fetched");
        Ok(value)
    }
}

/// Pull a string parameter out of a remote config document.
pub(crate) fn extract_parameter(
    body: &serde_json::Value,
    key: &str,
) -> Result<String, RemoteFetchError> {
    let found = body
        .get(key)
        .or_else(|| body.get("entries").and_then(|entries| entries.get(key)));

    match found {
        None | Some(serde_json::Value::Null) => Ok(String::new()),
        Some(serde_json::Value::String(s)) => Ok(s.clone()),
        Some(serde_json::Value::Number(n)) => Ok(n.to_string()),
        Some(other) => Err(RemoteFetchError::InvalidBody(format!(
            "{key} is not a string: {other}"
        ))),
    }
}
