use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::CallTrackError;

#[derive(Debug, Deserialize, Clone)]
pub struct CallTrackConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub http: HttpConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub listing: ListingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Apply the embedded schema migrations on startup.
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

fn default_max_connections() -> u32 {
    25
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    /// Origins allowed by the CORS policy. `"*"` allows any origin, without credentials.
    #[serde(default = "default_cors_allow_origins")]
    pub cors_allow_origins: Vec<String>,
    /// Upper bound on handling a single request; slower requests get 408.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// How long in-flight requests may drain after a shutdown signal.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

fn default_cors_allow_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_shutdown_grace_secs() -> u64 {
    10
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            cors_allow_origins: default_cors_allow_origins(),
            request_timeout_secs: default_request_timeout_secs(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    #[serde(default = "default_issuer")]
    pub issuer: String,
    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: i64,
    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,
}

fn default_issuer() -> String {
    "calltrack".to_string()
}

fn default_token_ttl_hours() -> i64 {
    24
}

fn default_bcrypt_cost() -> u32 {
    bcrypt::DEFAULT_COST
}

#[derive(Debug, Deserialize, Clone)]
pub struct ListingConfig {
    pub default_limit: i64,
    pub max_limit: i64,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            default_limit: 50,
            max_limit: 500,
        }
    }
}

impl CallTrackConfig {
    /// Load from a TOML file, then let `CALLTRACK__SECTION__KEY` env vars override it.
    ///
    /// `CALLTRACK__HTTP__CORS_ALLOW_ORIGINS` takes a comma-separated list.
    pub fn load(path: &str) -> Result<Self, CallTrackError> {
        let s = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("CALLTRACK")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("http.cors_allow_origins"),
            )
            .build()?;
        Ok(s.try_deserialize()?)
    }
}
