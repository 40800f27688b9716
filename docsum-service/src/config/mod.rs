use secrecy::{ExposeSecret, Secret};
use service_core::config::{self as core_config, get_env, get_optional_env, Environment};
use service_core::error::AppError;

/// 10 MiB, the advertised upload ceiling.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// 50 MiB of text or decompressed document XML per upload.
pub const DEFAULT_MAX_EXTRACTED_BYTES: usize = 50 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct DocsumConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub upload: UploadConfig,
    pub auth: AuthConfig,
    pub llm: LlmConfig,
    pub stripe: StripeConfig,
    pub app_url: String,
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub url: Secret<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub max_upload_bytes: usize,
    pub max_extracted_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// HS256 shared secret.
    pub jwt_secret: Option<Secret<String>>,
    /// RS256 public key (PEM file), takes precedence over the shared secret.
    pub jwt_public_key_path: Option<String>,
    pub issuer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmProviderKind {
    OpenAi,
    Mock,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: LlmProviderKind,
    pub api_key: Secret<String>,
    pub api_base: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: Secret<String>,
    pub webhook_secret: Secret<String>,
    pub api_base: String,
    pub webhook_tolerance_secs: i64,
}

impl StripeConfig {
    pub fn is_configured(&self) -> bool {
        !self.secret_key.expose_secret().is_empty()
    }

    pub fn webhook_configured(&self) -> bool {
        self.is_configured() && !self.webhook_secret.expose_secret().is_empty()
    }
}

impl DocsumConfig {
    pub fn load() -> Result<Self, AppError> {
        // Load common config (handles .env and APP__ prefix)
        let common = core_config::Config::load()?;
        let environment = Environment::from_env()?;
        let is_prod = environment.is_prod();

        let backend: DatabaseBackend = get_env("DATABASE_BACKEND", Some("postgres"), is_prod)?
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let database = DatabaseConfig {
            url: Secret::new(match backend {
                DatabaseBackend::Postgres => get_env("DATABASE_URL", None, is_prod)?,
                DatabaseBackend::Memory => String::new(),
            }),
            max_connections: parse_env("DATABASE_MAX_CONNECTIONS", "10", is_prod)?,
            min_connections: parse_env("DATABASE_MIN_CONNECTIONS", "1", is_prod)?,
            backend,
        };

        let auth = AuthConfig {
            jwt_secret: get_optional_env("AUTH_JWT_SECRET").map(Secret::new),
            jwt_public_key_path: get_optional_env("AUTH_JWT_PUBLIC_KEY_PATH"),
            issuer: get_optional_env("AUTH_JWT_ISSUER"),
        };
        if auth.jwt_secret.is_none() && auth.jwt_public_key_path.is_none() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "Either AUTH_JWT_SECRET or AUTH_JWT_PUBLIC_KEY_PATH must be set"
            )));
        }

        let provider: LlmProviderKind = get_env("LLM_PROVIDER", Some("openai"), is_prod)?
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let llm = LlmConfig {
            api_key: Secret::new(get_optional_env("OPENAI_API_KEY").unwrap_or_default()),
            api_base: get_env("OPENAI_API_BASE", Some("https://api.openai.com/v1"), false)?,
            model: get_env("OPENAI_MODEL", Some("gpt-4o-mini"), false)?,
            temperature: parse_env("OPENAI_TEMPERATURE", "0.3", false)?,
            max_tokens: parse_env("OPENAI_MAX_TOKENS", "1000", false)?,
            request_timeout_secs: parse_env("OPENAI_TIMEOUT_SECS", "60", false)?,
            provider,
        };

        let stripe = StripeConfig {
            secret_key: Secret::new(get_optional_env("STRIPE_SECRET_KEY").unwrap_or_default()),
            webhook_secret: Secret::new(
                get_optional_env("STRIPE_WEBHOOK_SECRET").unwrap_or_default(),
            ),
            api_base: get_env("STRIPE_API_BASE", Some("https://api.stripe.com"), false)?,
            webhook_tolerance_secs: parse_env("STRIPE_WEBHOOK_TOLERANCE_SECS", "300", false)?,
        };

        Ok(DocsumConfig {
            service_name: get_env("SERVICE_NAME", Some("docsum-service"), false)?,
            otlp_endpoint: get_optional_env("OTLP_ENDPOINT"),
            database,
            upload: UploadConfig {
                max_upload_bytes: parse_env(
                    "MAX_UPLOAD_BYTES",
                    &DEFAULT_MAX_UPLOAD_BYTES.to_string(),
                    false,
                )?,
                max_extracted_bytes: parse_env(
                    "MAX_EXTRACTED_BYTES",
                    &DEFAULT_MAX_EXTRACTED_BYTES.to_string(),
                    false,
                )?,
            },
            auth,
            llm,
            stripe,
            app_url: get_env("APP_URL", Some("http://localhost:3000"), is_prod)?,
            allowed_origins: get_env("ALLOWED_ORIGINS", Some("http://localhost:3000"), is_prod)?
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            common,
            environment,
        })
    }
}

fn parse_env<T>(key: &str, default: &str, is_prod: bool) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, Some(default), is_prod)?
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("Invalid {}: {}", key, e)))
}

impl std::str::FromStr for DatabaseBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(DatabaseBackend::Postgres),
            "memory" => Ok(DatabaseBackend::Memory),
            _ => Err(format!("Invalid database backend: {}", s)),
        }
    }
}

impl std::str::FromStr for LlmProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(LlmProviderKind::OpenAi),
            "mock" => Ok(LlmProviderKind::Mock),
            _ => Err(format!("Invalid LLM provider: {}", s)),
        }
    }
}
