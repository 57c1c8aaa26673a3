use std::sync::Mutex;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub to: String,
    pub from: String,
    pub subject: String,
    pub body_html: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport request failed: {0}")]
    Request(String),
    #[error("relay rejected the message: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), TransportError>;
}

/// Swallows everything. Default for local runs without a configured relay.
#[derive(Default)]
pub struct NoopTransport;

#[async_trait]
impl EmailTransport for NoopTransport {
    async fn send(&self, _message: &EmailMessage) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Posts messages as JSON to an HTTP mail relay with bearer auth.
pub struct HttpRelayTransport {
    client: reqwest::Client,
    endpoint: String,
    api_key: SecretString,
}

impl HttpRelayTransport {
    pub fn new(endpoint: String, api_key: SecretString) -> Self {
        Self { client: reqwest::Client::new(), endpoint, api_key }
    }
}

#[async_trait]
impl EmailTransport for HttpRelayTransport {
    async fn send(&self, message: &EmailMessage) -> Result<(), TransportError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(message)
            .send()
            .await
            .map_err(|error| TransportError::Request(error.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(TransportError::Rejected(format!("relay returned {}", response.status())))
        }
    }
}

/// Test transport: records sent messages and can fail a configured number
/// of initial attempts to exercise the retry path.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<EmailMessage>>,
    failures_remaining: Mutex<u32>,
}

impl RecordingTransport {
    pub fn failing_first(attempts: u32) -> Self {
        Self { sent: Mutex::new(Vec::new()), failures_remaining: Mutex::new(attempts) }
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().expect("recording lock").clone()
    }
}

#[async_trait]
impl EmailTransport for RecordingTransport {
    async fn send(&self, message: &EmailMessage) -> Result<(), TransportError> {
        {
            let mut failures = self.failures_remaining.lock().expect("recording lock");
            if *failures > 0 {
                *failures -= 1;
                return Err(TransportError::Request("injected failure".to_string()));
            }
        }
        self.sent.lock().expect("recording lock").push(message.clone());
        Ok(())
    }
}
