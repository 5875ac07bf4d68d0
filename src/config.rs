//! Configuration for the API.
//!
//! Database settings come from a [ConfigSupplier]: plain environment
//! variables when running locally, or a JSON secret in AWS Secrets Manager
//! when running inside Lambda. Process-level settings that never live in the
//! secret (port, environment name) are read once into [ServerSettings].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use serde::Deserialize;
use tokio::sync::{Mutex, OnceCell};

use crate::error::{ApiError, ApiResult};

pub const DEFAULT_PORT: u16 = 8080;
/// How long a fetched secret is trusted before it is fetched again.
pub const DEFAULT_SECRET_TTL: Duration = Duration::from_secs(60 * 60);

const LAMBDA_FUNCTION_VAR: &str = "AWS_LAMBDA_FUNCTION_NAME";
const SECRET_NAME_VAR: &str = "SECRET_NAME";

/// Settings needed to reach the users collection.
///
/// The field names double as the keys of the JSON secret.
#[derive(Clone, Default, PartialEq, Deserialize)]
pub struct Config {
    #[serde(rename = "APP_NAME", default)]
    pub app_name: String,
    #[serde(rename = "IAM_ROLE_ARN", default)]
    pub iam_role_arn: String,
    #[serde(rename = "DB_CLUSTER_NAME", default)]
    pub db_cluster_name: String,
    #[serde(rename = "DB_DOMAIN", default)]
    pub db_domain: String,
    #[serde(rename = "DB_USER_NAME", default)]
    pub db_user_name: String,
    #[serde(rename = "DB_PASSWORD", default)]
    pub db_password: String,
    /// A full connection string, overriding the cluster/domain settings.
    #[serde(rename = "DB_URI", default)]
    pub db_uri: Option<String>,
    /// Set by the supplier, never read from the secret.
    #[serde(skip)]
    pub is_dev: bool,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("app_name", &self.app_name)
            .field("iam_role_arn", &self.iam_role_arn)
            .field("db_cluster_name", &self.db_cluster_name)
            .field("db_domain", &self.db_domain)
            .field("db_user_name", &self.db_user_name)
            .field("db_password", &"<redacted>")
            .field("db_uri", &self.db_uri.as_ref().map(|_| "<redacted>"))
            .field("is_dev", &self.is_dev)
            .finish()
    }
}

impl Config {
    /// Builds a config from a variable lookup, treating empty values as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| lookup(name).unwrap_or_default();

        Self {
            app_name: var("APP_NAME"),
            iam_role_arn: var("IAM_ROLE_ARN"),
            db_cluster_name: var("DB_CLUSTER_NAME"),
            db_domain: var("DB_DOMAIN"),
            db_user_name: var("DB_USER_NAME"),
            db_password: var("DB_PASSWORD"),
            db_uri: lookup("DB_URI").filter(|uri| !uri.is_empty()),
            is_dev: true,
        }
    }

    pub fn from_secret_json(secret: &str) -> ApiResult<Self> {
        let mut config: Config = serde_json::from_str(secret)
            .map_err(|err| ApiError::Config(format!("secret is not valid JSON: {err}")))?;
        config.db_uri = config.db_uri.filter(|uri| !uri.is_empty());
        config.is_dev = false;

        Ok(config)
    }

    /// Whether the database should be reached with temporary credentials
    /// from an assumed IAM role instead of a username and password.
    pub fn uses_iam_auth(&self) -> bool {
        !self.is_dev && !self.iam_role_arn.is_empty() && self.db_uri.is_none()
    }

    pub fn validate(&self) -> ApiResult<()> {
        if self.db_uri.is_some() {
            return Ok(());
        }

        if self.db_cluster_name.is_empty() {
            return Err(ApiError::ConfigNotFound("DB_CLUSTER_NAME".to_owned()));
        }
        if self.db_domain.is_empty() {
            return Err(ApiError::ConfigNotFound("DB_DOMAIN".to_owned()));
        }
        if !self.uses_iam_auth() {
            if self.db_user_name.is_empty() {
                return Err(ApiError::ConfigNotFound("DB_USER_NAME".to_owned()));
            }
            if self.db_password.is_empty() {
                return Err(ApiError::ConfigNotFound("DB_PASSWORD".to_owned()));
            }
        }

        Ok(())
    }
}

/// Provides the database configuration, caching it as it sees fit.
#[async_trait]
pub trait ConfigSupplier: Send + Sync {
    async fn config(&self) -> ApiResult<Arc<Config>>;
}

/// Reads configuration from environment variables, once.
pub struct EnvConfigSupplier {
    lookup: Box<dyn Fn(&str) -> Option<String> + Send + Sync>,
    cached: OnceCell<Arc<Config>>,
}

impl EnvConfigSupplier {
    pub fn new() -> Self {
        Self::with_lookup(|name| std::env::var(name).ok())
    }

    pub fn with_lookup(lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        Self {
            lookup: Box::new(lookup),
            cached: OnceCell::new(),
        }
    }

    pub fn from_map(vars: HashMap<String, String>) -> Self {
        Self::with_lookup(move |name| vars.get(name).cloned())
    }
}

impl Default for EnvConfigSupplier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConfigSupplier for EnvConfigSupplier {
    async fn config(&self) -> ApiResult<Arc<Config>> {
        let config = self
            .cached
            .get_or_init(|| async {
                tracing::debug!("loading configuration from environment");
                Arc::new(Config::from_lookup(&self.lookup))
            })
            .await;

        Ok(config.clone())
    }
}

/// Where secret strings come from.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SecretSource: Send + Sync {
    async fn secret_string(&self, secret_id: &str) -> ApiResult<String>;
}

pub struct AwsSecretsManager {
    client: aws_sdk_secretsmanager::Client,
}

impl AwsSecretsManager {
    pub async fn from_env() -> Self {
        let shared = aws_config::defaults(BehaviorVersion::latest()).load().await;

        Self {
            client: aws_sdk_secretsmanager::Client::new(&shared),
        }
    }
}

#[async_trait]
impl SecretSource for AwsSecretsManager {
    async fn secret_string(&self, secret_id: &str) -> ApiResult<String> {
        let output = self
            .client
            .get_secret_value()
            .secret_id(secret_id)
            .send()
            .await
            .map_err(|err| {
                ApiError::Secrets(format!(
                    "{}",
                    aws_sdk_secretsmanager::error::DisplayErrorContext(&err)
                ))
            })?;

        output
            .secret_string()
            .map(str::to_owned)
            .ok_or_else(|| ApiError::Secrets(format!("secret {secret_id} has no string value")))
    }
}

struct CachedConfig {
    config: Arc<Config>,
    fetched_at: Instant,
}

/// Reads configuration from a JSON secret, refetching it after `ttl`.
pub struct SecretsManagerConfigSupplier {
    source: Arc<dyn SecretSource>,
    secret_name: String,
    ttl: Duration,
    cached: Mutex<Option<CachedConfig>>,
}

impl SecretsManagerConfigSupplier {
    pub fn new(source: Arc<dyn SecretSource>, secret_name: impl Into<String>) -> Self {
        Self {
            source,
            secret_name: secret_name.into(),
            ttl: DEFAULT_SECRET_TTL,
            cached: Mutex::new(None),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

#[async_trait]
impl ConfigSupplier for SecretsManagerConfigSupplier {
    async fn config(&self) -> ApiResult<Arc<Config>> {
        let mut cached = self.cached.lock().await;
        if let Some(entry) = cached.as_ref() {
            if entry.fetched_at.elapsed() < self.ttl {
                return Ok(entry.config.clone());
            }
        }

        tracing::info!(secret = %self.secret_name, "fetching configuration secret");
        let secret = self.source.secret_string(&self.secret_name).await?;
        let config = Arc::new(Config::from_secret_json(&secret)?);
        *cached = Some(CachedConfig {
            config: config.clone(),
            fetched_at: Instant::now(),
        });

        Ok(config)
    }
}

/// Chooses the supplier for this process: environment variables for local
/// development, Secrets Manager when running inside Lambda.
pub async fn supplier_from_env() -> ApiResult<Arc<dyn ConfigSupplier>> {
    if std::env::var(LAMBDA_FUNCTION_VAR).is_err() {
        tracing::info!("no Lambda function name set, using environment configuration");
        return Ok(Arc::new(EnvConfigSupplier::new()));
    }

    let secret_name = std::env::var(SECRET_NAME_VAR)
        .ok()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ApiError::ConfigNotFound(SECRET_NAME_VAR.to_owned()))?;
    let source = Arc::new(AwsSecretsManager::from_env().await);

    Ok(Arc::new(SecretsManagerConfigSupplier::new(source, secret_name)))
}

/// Process-level settings for the HTTP surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub port: u16,
    pub env: String,
}

impl ServerSettings {
    pub fn from_env() -> ApiResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ApiResult<Self> {
        let port = match lookup("PORT").filter(|port| !port.is_empty()) {
            Some(port) => port
                .parse()
                .map_err(|_| ApiError::Config(format!("PORT must be a port number, got {port}")))?,
            None => DEFAULT_PORT,
        };
        let env = lookup("ENV")
            .filter(|env| !env.is_empty())
            .unwrap_or_else(|| "dev".to_owned());

        Ok(Self { port, env })
    }

    pub fn is_production(&self) -> bool {
        matches!(self.env.to_ascii_lowercase().as_str(), "prod" | "production")
    }
}
