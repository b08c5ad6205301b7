//! Outbound SMS senders.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::SendError;

/// The host's outbound messaging interface.
#[async_trait]
pub trait OutboundSender: Send + Sync {
    /// Send one text message to `destination`.
    async fn send(&self, destination: &str, body: &str) -> Result<(), SendError>;
}

#[derive(Serialize)]
struct GatewayMessage<'a> {
    to: &'a str,
    body: &'a str,
}

/// Sends through an HTTP SMS gateway: `POST {url}` with `{"to", "body"}`.
pub struct HttpSmsGateway {
    client: reqwest::Client,
    url: String,
    token: Option<SecretString>,
}

impl HttpSmsGateway {
    pub fn new(url: impl Into<String>, token: Option<SecretString>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            token,
        }
    }
}

#[async_trait]
impl OutboundSender for HttpSmsGateway {
    async fn send(&self, destination: &str, body: &str) -> Result<(), SendError> {
        let mut request = self.client.post(&self.url).json(&GatewayMessage {
            to: destination,
            body,
        });
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let resp = request
            .send()
            .await
            .map_err(|e| SendError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SendError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!(to = %destination, "Gateway accepted message");
        Ok(())
    }
}

/// Dry-run sender: logs each message instead of sending it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSender;

#[async_trait]
impl OutboundSender for LogSender {
    async fn send(&self, destination: &str, body: &str) -> Result<(), SendError> {
        info!(to = %destination, body = %body, "Dry-run send");
        Ok(())
    }
}
