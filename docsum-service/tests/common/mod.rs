#![allow(dead_code)]

use chrono::{Duration, Utc};
use docsum_service::config::{
    AuthConfig, DatabaseBackend, DatabaseConfig, DocsumConfig, LlmConfig, LlmProviderKind,
    StripeConfig, UploadConfig, DEFAULT_MAX_EXTRACTED_BYTES, DEFAULT_MAX_UPLOAD_BYTES,
};
use docsum_service::services::session::SessionClaims;
use docsum_service::services::{InMemoryRepository, MockProvider, SummaryProvider};
use docsum_service::startup::Application;
use jsonwebtoken::{encode, EncodingKey, Header};
use reqwest::multipart::{Form, Part};
use secrecy::Secret;
use service_core::config::{Config as CommonConfig, Environment};
use service_core::utils::signature::hmac_sha256_hex;
use std::sync::Arc;
use wiremock::MockServer;

pub const TEST_JWT_SECRET: &str = "test-session-secret";
pub const TEST_WEBHOOK_SECRET: &str = "whsec_test_secret";
pub const TEST_USER_ID: &str = "user_alice";
pub const OTHER_USER_ID: &str = "user_bob";
pub const TEST_APP_URL: &str = "http://app.test";

pub enum ProviderChoice {
    /// In-process provider with fixed behaviour.
    Mock(MockProvider),
    /// OpenAI provider pointed at the wiremock server.
    OpenAi { api_key: String },
}

pub struct TestOptions {
    pub provider: ProviderChoice,
    pub stripe_configured: bool,
    pub max_upload_bytes: usize,
    pub max_extracted_bytes: usize,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            provider: ProviderChoice::Mock(MockProvider::default()),
            stripe_configured: true,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            max_extracted_bytes: DEFAULT_MAX_EXTRACTED_BYTES,
        }
    }
}

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub repo: Arc<InMemoryRepository>,
    /// Fakes both the OpenAI and Stripe HTTP APIs.
    pub upstream: MockServer,
    pub client: reqwest::Client,
}

pub fn test_config(upstream_uri: &str, options: &TestOptions) -> DocsumConfig {
    let (llm_kind, api_key) = match &options.provider {
        ProviderChoice::Mock(_) => (LlmProviderKind::Mock, String::new()),
        ProviderChoice::OpenAi { api_key } => (LlmProviderKind::OpenAi, api_key.clone()),
    };
    let (stripe_key, webhook_secret) = if options.stripe_configured {
        ("sk_test_123", TEST_WEBHOOK_SECRET)
    } else {
        ("", "")
    };

    DocsumConfig {
        common: CommonConfig {
            port: 0,
            log_level: "debug".to_string(),
        },
        environment: Environment::Dev,
        service_name: "docsum-service-test".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            backend: DatabaseBackend::Memory,
            url: Secret::new(String::new()),
            max_connections: 1,
            min_connections: 1,
        },
        upload: UploadConfig {
            max_upload_bytes: options.max_upload_bytes,
            max_extracted_bytes: options.max_extracted_bytes,
        },
        auth: AuthConfig {
            jwt_secret: Some(Secret::new(TEST_JWT_SECRET.to_string())),
            jwt_public_key_path: None,
            issuer: None,
        },
        llm: LlmConfig {
            provider: llm_kind,
            api_key: Secret::new(api_key),
            api_base: upstream_uri.to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.3,
            max_tokens: 1000,
            request_timeout_secs: 10,
        },
        stripe: StripeConfig {
            secret_key: Secret::new(stripe_key.to_string()),
            webhook_secret: Secret::new(webhook_secret.to_string()),
            api_base: upstream_uri.to_string(),
            webhook_tolerance_secs: 300,
        },
        app_url: TEST_APP_URL.to_string(),
        allowed_origins: vec![TEST_APP_URL.to_string()],
    }
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(TestOptions::default()).await
    }

    pub async fn spawn_with(options: TestOptions) -> Self {
        let upstream = MockServer::start().await;
        let config = test_config(&upstream.uri(), &options);

        let repo = Arc::new(InMemoryRepository::new());
        let mut state = Application::state(config, repo.clone())
            .expect("Failed to build application state");
        if let ProviderChoice::Mock(provider) = options.provider {
            state.provider = Arc::new(provider) as Arc<dyn SummaryProvider>;
        }

        let app = Application::from_state(state)
            .await
            .expect("Failed to build test application");
        let port = app.port();

        tokio::spawn(async move {
            app.run_until_stopped(std::future::pending()).await.ok();
        });

        TestApp {
            address: format!("http://127.0.0.1:{}", port),
            port,
            repo,
            upstream,
            client: reqwest::Client::new(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> reqwest::Response {
        let mut request = self.client.get(self.url(path));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        request.send().await.expect("Failed to execute request")
    }

    pub async fn post_json(
        &self,
        path: &str,
        token: Option<&str>,
        body: &serde_json::Value,
    ) -> reqwest::Response {
        let mut request = self.client.post(self.url(path)).json(body);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        request.send().await.expect("Failed to execute request")
    }

    pub async fn upload(
        &self,
        token: &str,
        file_name: &str,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> reqwest::Response {
        let part = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(mime_type)
            .expect("Invalid mime type");
        let form = Form::new().part("file", part);

        self.client
            .post(self.url("/api/extract-text"))
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Upload a small text file and return the created document id.
    pub async fn create_text_document(&self, token: &str, content: &str) -> uuid::Uuid {
        let response = self
            .upload(token, "notes.txt", "text/plain", content.as_bytes().to_vec())
            .await;
        assert_eq!(response.status(), 200);
        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        body["document"]["id"]
            .as_str()
            .and_then(|id| id.parse().ok())
            .expect("Missing document id")
    }

    pub async fn post_webhook(&self, body: &str, signature: Option<&str>) -> reqwest::Response {
        let mut request = self
            .client
            .post(self.url("/api/stripe/webhook"))
            .header("content-type", "application/json")
            .body(body.to_string());
        if let Some(signature) = signature {
            request = request.header("stripe-signature", signature);
        }
        request.send().await.expect("Failed to execute request")
    }

    pub async fn post_signed_webhook(&self, body: &str) -> reqwest::Response {
        let signature = sign_webhook(body, Utc::now().timestamp());
        self.post_webhook(body, Some(&signature)).await
    }
}

/// Mint a session token the way the identity provider would.
pub fn session_token(user_id: &str) -> String {
    token_with(user_id, TEST_JWT_SECRET, Duration::minutes(15))
}

pub fn token_with(user_id: &str, secret: &str, ttl: Duration) -> String {
    let claims = SessionClaims {
        sub: user_id.to_string(),
        exp: (Utc::now() + ttl).timestamp(),
        iss: None,
        email: Some(format!("{}@example.com", user_id)),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("Failed to encode token")
}

pub fn sign_webhook(body: &str, timestamp: i64) -> String {
    let signature = hmac_sha256_hex(
        TEST_WEBHOOK_SECRET,
        format!("{}.{}", timestamp, body).as_bytes(),
    )
    .expect("Failed to sign payload");
    format!("t={},v1={}", timestamp, signature)
}

/// Parse an SSE body into `(event, data)` pairs.
pub fn parse_sse(body: &str) -> Vec<(String, serde_json::Value)> {
    body.split("\n\n")
        .filter_map(|block| {
            let mut event = None;
            let mut data = String::new();
            for line in block.lines() {
                if let Some(value) = line.strip_prefix("event:") {
                    event = Some(value.trim().to_string());
                } else if let Some(value) = line.strip_prefix("data:") {
                    data.push_str(value.trim_start());
                }
            }
            let event = event?;
            let data = serde_json::from_str(&data).unwrap_or(serde_json::Value::Null);
            Some((event, data))
        })
        .collect()
}

/// Concatenated `token` event contents.
pub fn streamed_text(events: &[(String, serde_json::Value)]) -> String {
    events
        .iter()
        .filter(|(event, _)| event == "token")
        .filter_map(|(_, data)| data["content"].as_str())
        .collect()
}
