//! Stripe billing client.
//!
//! Covers Checkout Sessions (subscription mode), Billing Portal sessions,
//! subscription retrieval, and webhook signature verification.

use crate::config::StripeConfig;
use crate::models::SubscriptionUpsert;
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Deserialize;
use service_core::utils::signature::verify_hmac_sha256;
use std::collections::HashMap;

/// Metadata key carrying the application user id.
pub const USER_ID_METADATA_KEY: &str = "userId";

#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    config: StripeConfig,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
    pub customer: Option<String>,
    pub subscription: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct PortalSession {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct StripeSubscription {
    pub id: String,
    pub customer: Option<String>,
    pub status: String,
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub items: SubscriptionItems,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SubscriptionItems {
    #[serde(default)]
    pub data: Vec<SubscriptionItem>,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionItem {
    pub price: Price,
}

#[derive(Debug, Deserialize)]
pub struct Price {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct Invoice {
    pub id: String,
    pub subscription: Option<String>,
}

/// Webhook envelope; `data.object` is decoded per event type.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookData {
    pub object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct StripeError {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    #[serde(default)]
    message: Option<String>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

impl StripeSubscription {
    pub fn price_id(&self) -> Option<String> {
        self.items.data.first().map(|item| item.price.id.clone())
    }

    pub fn period_end(&self) -> Option<DateTime<Utc>> {
        self.current_period_end
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
    }

    /// Convert to a store upsert. `user_id` overrides the metadata value.
    pub fn to_upsert(&self, user_id: Option<String>) -> SubscriptionUpsert {
        SubscriptionUpsert {
            stripe_subscription_id: self.id.clone(),
            user_id: user_id.or_else(|| self.metadata.get(USER_ID_METADATA_KEY).cloned()),
            stripe_customer_id: self.customer.clone(),
            stripe_price_id: self.price_id(),
            status: self.status.clone(),
            current_period_end: self.period_end(),
        }
    }
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    pub fn webhook_configured(&self) -> bool {
        self.config.webhook_configured()
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.config.api_base.trim_end_matches('/'), path)
    }

    async fn post_form<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        form: &[(&str, &str)],
    ) -> Result<T> {
        if !self.is_configured() {
            return Err(anyhow!("Stripe credentials not configured"));
        }

        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(self.config.secret_key.expose_secret())
            .form(form)
            .send()
            .await?;

        Self::decode(path, response).await
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        path: &str,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        let body = response.text().await?;

        tracing::debug!(status = %status, path = %path, "Stripe response");

        if status.is_success() {
            Ok(serde_json::from_str(&body)?)
        } else {
            let detail = serde_json::from_str::<StripeError>(&body)
                .map(|e| {
                    format!(
                        "{}: {}",
                        e.error.kind.unwrap_or_else(|| "api_error".to_string()),
                        e.error.message.unwrap_or_default()
                    )
                })
                .unwrap_or(body);
            Err(anyhow!("Stripe API error {}: {}", status, detail))
        }
    }

    /// Create a subscription-mode Checkout Session for one unit of `price_id`.
    pub async fn create_checkout_session(
        &self,
        price_id: &str,
        user_id: &str,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<CheckoutSession> {
        let form = [
            ("mode", "subscription"),
            ("line_items[0][price]", price_id),
            ("line_items[0][quantity]", "1"),
            ("success_url", success_url),
            ("cancel_url", cancel_url),
            ("metadata[userId]", user_id),
            ("subscription_data[metadata][userId]", user_id),
        ];

        let session: CheckoutSession = self.post_form("checkout/sessions", &form).await?;
        tracing::info!(session_id = %session.id, user_id = %user_id, "Stripe checkout session created");
        Ok(session)
    }

    pub async fn create_billing_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<PortalSession> {
        let form = [("customer", customer_id), ("return_url", return_url)];
        self.post_form("billing_portal/sessions", &form).await
    }

    pub async fn retrieve_subscription(&self, subscription_id: &str) -> Result<StripeSubscription> {
        if !self.is_configured() {
            return Err(anyhow!("Stripe credentials not configured"));
        }

        let path = format!("subscriptions/{}", subscription_id);
        let response = self
            .client
            .get(self.url(&path))
            .bearer_auth(self.config.secret_key.expose_secret())
            .send()
            .await?;

        Self::decode(&path, response).await
    }

    /// Verify a `Stripe-Signature` header (`t=<unix>,v1=<hex>[,v1=...]`)
    /// against the raw request body.
    pub fn verify_webhook_signature(&self, payload: &str, header: &str, now: i64) -> Result<()> {
        let secret = self.config.webhook_secret.expose_secret();
        if secret.is_empty() {
            return Err(anyhow!("Webhook secret not configured"));
        }

        let mut timestamp: Option<i64> = None;
        let mut signatures = Vec::new();
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = value.parse().ok(),
                Some(("v1", value)) => signatures.push(value),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or_else(|| anyhow!("Missing timestamp in signature header"))?;
        if signatures.is_empty() {
            return Err(anyhow!("No v1 signature in signature header"));
        }
        if (now - timestamp).abs() > self.config.webhook_tolerance_secs {
            return Err(anyhow!("Signature timestamp outside tolerance"));
        }

        let signed_payload = format!("{}.{}", timestamp, payload);
        for signature in signatures {
            if verify_hmac_sha256(secret, signed_payload.as_bytes(), signature)? {
                return Ok(());
            }
        }

        Err(anyhow!("Signature mismatch"))
    }

    pub fn parse_webhook_event(&self, payload: &str) -> Result<WebhookEvent> {
        Ok(serde_json::from_str(payload)?)
    }
}
