//! Alert sinks fired for fresh purchase intents.
//!
//! Sinks are called synchronously from the feeder that merged the intent, so
//! anything slow (network delivery) must hand off to a spawned task.

use std::time::Duration;

use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Serialize;
use sha2::Sha256;

use crate::error::{AppError, Result};
use crate::models::PurchaseIntent;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex HMAC-SHA256 of the webhook body.
pub const SIGNATURE_HEADER: &str = "X-Keyshelf-Signature";

pub trait IntentAlertSink: Send + Sync {
    fn notify(&self, intent: &PurchaseIntent);
}

impl<F> IntentAlertSink for F
where
    F: Fn(&PurchaseIntent) + Send + Sync,
{
    fn notify(&self, intent: &PurchaseIntent) {
        self(intent)
    }
}

/// Writes each alert to the tracing log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAlertSink;

impl IntentAlertSink for LogAlertSink {
    fn notify(&self, intent: &PurchaseIntent) {
        tracing::info!(
            intent_id = %intent.id,
            product_id = %intent.product_id,
            "New purchase request: {} from {}",
            intent.product_title,
            intent.email
        );
    }
}

/// Payload POSTed to the alert webhook.
#[derive(Debug, Serialize)]
pub struct IntentAlertPayload<'a> {
    pub event: &'static str,
    #[serde(flatten)]
    pub intent: &'a PurchaseIntent,
}

/// Hex HMAC-SHA256 of `body` keyed with `secret`.
pub fn sign_payload(secret: &str, body: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::Internal("Invalid alert webhook secret".into()))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Delivers alerts as JSON POSTs, optionally signed with a shared secret.
#[derive(Debug, Clone)]
pub struct WebhookAlertSink {
    client: Client,
    url: String,
    secret: Option<String>,
}

impl WebhookAlertSink {
    pub fn new(url: impl Into<String>, secret: Option<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            url: url.into(),
            secret,
        }
    }

    async fn deliver(client: Client, url: String, secret: Option<String>, body: Vec<u8>) {
        let mut request = client
            .post(&url)
            .header("Content-Type", "application/json");
        if let Some(secret) = secret.as_deref() {
            match sign_payload(secret, &body) {
                Ok(signature) => request = request.header(SIGNATURE_HEADER, signature),
                Err(e) => {
                    tracing::error!("Not sending unsigned intent alert: {}", e);
                    return;
                }
            }
        }

        match request.body(body).send().await {
            Ok(response) if response.status().is_success() => {
                tracing::debug!("Intent alert delivered to {}", url);
            }
            Ok(response) => {
                tracing::warn!("Intent alert webhook returned {}", response.status());
            }
            Err(e) => {
                tracing::warn!("Failed to deliver intent alert: {}", e);
            }
        }
    }
}

impl IntentAlertSink for WebhookAlertSink {
    fn notify(&self, intent: &PurchaseIntent) {
        let payload = IntentAlertPayload {
            event: "purchase_intent.created",
            intent,
        };
        let body = match serde_json::to_vec(&payload) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!("Failed to serialize intent alert: {}", e);
                return;
            }
        };

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("No async runtime; dropping intent alert for {}", intent.id);
            return;
        };
        runtime.spawn(Self::deliver(
            self.client.clone(),
            self.url.clone(),
            self.secret.clone(),
            body,
        ));
    }
}
