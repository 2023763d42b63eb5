use crate::error::BridgeError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use slimthread_shared::{Settings, SettingsPatch};
use std::time::Duration;
use thiserror::Error;

/// Request half of the cross-context protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    GetSettings,
    SetSettings { patch: SettingsPatch },
    Ping,
}

/// Response half of the cross-context protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Settings { settings: Settings },
    Ok,
    Pong { timestamp: DateTime<Utc> },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("messaging channel closed: {0}")]
    Closed(String),

    #[error("remote failure: {0}")]
    Remote(String),
}

/// One hop over the extension messaging bus. `Ok(None)` is the distinct
/// "answered with nothing" signal; a hung remote simply never resolves.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    async fn send(&self, request: &Request) -> Result<Option<Response>, TransportError>;
}

#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    /// Fixed per-call deadline.
    pub timeout: Duration,
    /// How many empty answers to tolerate before giving up.
    pub empty_retries: usize,
    pub retry_delay: Duration,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(800),
            empty_retries: 3,
            retry_delay: Duration::from_millis(150),
        }
    }
}

/// Request/response exchange with the bounded-retry discipline:
/// - a timeout is terminal: the remote endpoint is hung or gone, and asking
///   again would only hang the caller a second time;
/// - an empty answer is retried up to `empty_retries` times: the usual
///   cause is a service context that has not finished waking up.
pub async fn exchange(
    transport: &dyn MessageTransport,
    request: Request,
    config: &ExchangeConfig,
) -> Result<Response, BridgeError> {
    let mut attempts = 0usize;
    loop {
        attempts += 1;
        match tokio::time::timeout(config.timeout, transport.send(&request)).await {
            Err(_) => {
                return Err(BridgeError::Timeout {
                    timeout_ms: config.timeout.as_millis() as u64,
                });
            }
            Ok(Err(error)) => return Err(BridgeError::Transport(error)),
            Ok(Ok(Some(response))) => return Ok(response),
            Ok(Ok(None)) => {
                if attempts > config.empty_retries {
                    return Err(BridgeError::EmptyAnswer { attempts });
                }
                tracing::debug!(attempts, "empty answer from remote, retrying");
                tokio::time::sleep(config.retry_delay).await;
            }
        }
    }
}
