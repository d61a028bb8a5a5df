//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `USERCTL_CONFIG`
//! environment variable.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `USERCTL_` override YAML values
//! 3. **DATABASE_URL / REDIS_URL** - Special cases: override `database.url` and
//!    `session_store.url` if set
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `USERCTL_AUTH__ALLOW_REGISTRATION=true` sets the `auth.allow_registration` field.

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "USERCTL_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    /// Useful for CI/CD pipelines to catch config errors before deployment.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
///
/// This is the root configuration structure loaded from YAML and environment variables.
/// All fields have sensible defaults defined in the `Default` implementation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Base URL where the frontend is accessible (e.g., "https://app.example.com")
    /// Used for password reset and registration confirmation links.
    pub dashboard_url: String,
    /// Special case: set via DATABASE_URL, merged into `database.url` on load
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
    /// Special case: set via REDIS_URL, merged into `session_store.url` on load
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_store_url: Option<String>,
    /// PostgreSQL connection settings
    pub database: DatabaseConfig,
    /// Session store (Redis) connection settings
    pub session_store: SessionStoreConfig,
    /// Email address for the initial admin user (created on first startup)
    pub admin_email: String,
    /// Password for the initial admin user (optional, can be set via environment)
    pub admin_password: Option<String>,
    /// Secret key for CSRF token signing. Generated at startup when absent;
    /// rotating it invalidates all outstanding CSRF tokens and thus all sessions.
    pub secret_key: Option<String>,
    /// Authentication and session configuration
    pub auth: AuthConfig,
    /// Startup connection retry behaviour
    pub startup: StartupConfig,
    /// Email configuration for confirmation flows
    pub email: EmailConfig,
    /// Roll back every request transaction regardless of outcome.
    /// Keeps test runs isolated without explicit cleanup; never enable in production.
    pub force_rollback: bool,
}

/// PostgreSQL connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Connection string for the database
    pub url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Maximum time to wait for a connection (seconds)
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost:5432/userctl".to_string(),
            max_connections: 10,
            acquire_timeout_secs: 30,
        }
    }
}

/// Session store (Redis) connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionStoreConfig {
    /// Connection string for the key-value store
    pub url: String,
    /// Bound on every individual store round trip. A store call that exceeds
    /// this surfaces as a 5xx instead of blocking the request indefinitely.
    #[serde(with = "humantime_serde")]
    pub operation_timeout: Duration,
}

impl Default for SessionStoreConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            operation_timeout: Duration::from_secs(2),
        }
    }
}

/// Authentication configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    /// Allow new users to self-register via the email confirmation flow.
    /// When false, `POST /users` requires an admin session.
    pub allow_registration: bool,
    /// Password validation rules
    pub password: PasswordConfig,
    /// Session token and cookie configuration
    pub session: SessionConfig,
    /// Security settings (CORS)
    pub security: SecurityConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            allow_registration: false,
            password: PasswordConfig::default(),
            session: SessionConfig::default(),
            security: SecurityConfig::default(),
        }
    }
}

/// Session token and cookie configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Lifetime of login sessions. Renewed on every read (sliding idle timeout).
    #[serde(with = "humantime_serde")]
    pub login_lifetime: Duration,
    /// Lifetime of confirmation sessions (password reset, registration).
    /// Not renewed on read: the deadline is fixed at creation.
    #[serde(with = "humantime_serde")]
    pub confirmation_lifetime: Duration,
    /// Number of random bytes in the token suffix (before base64url encoding)
    pub token_bytes: usize,
    /// Cookie name for the session token
    pub cookie_name: String,
    /// Set Secure flag on cookies (HTTPS only)
    pub cookie_secure: bool,
    /// SameSite cookie attribute ("Strict", "Lax", or "None")
    pub cookie_same_site: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            login_lifetime: Duration::from_secs(7 * 24 * 60 * 60), // 7 days
            confirmation_lifetime: Duration::from_secs(60 * 60),   // 1 hour
            token_bytes: 16,
            cookie_name: "session_id".to_string(),
            cookie_secure: true,
            cookie_same_site: "Lax".to_string(),
        }
    }
}

/// Password validation rules.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PasswordConfig {
    /// Minimum password length
    pub min_length: usize,
    /// Maximum password length
    pub max_length: usize,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            min_length: 12,
            max_length: 128,
        }
    }
}

/// Security configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SecurityConfig {
    /// CORS configuration for browser clients
    pub cors: CorsConfig,
}

/// CORS (Cross-Origin Resource Sharing) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    /// Allowed origins for CORS requests
    pub allowed_origins: Vec<CorsOrigin>,
    /// Allow credentials (cookies) in CORS requests
    pub allow_credentials: bool,
    /// Cache preflight requests for this many seconds
    pub max_age: Option<u64>,
    /// Custom headers to expose to the browser. The CSRF token header must be
    /// listed so client script can read and echo it.
    pub exposed_headers: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![CorsOrigin::Url(Url::parse("http://localhost:5173").unwrap())],
            allow_credentials: true,
            max_age: Some(3600),
            exposed_headers: vec!["x-csrf-token".to_string()],
        }
    }
}

/// CORS origin specification.
///
/// Can be either a wildcard (`*`) to allow all origins, or a specific URL.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CorsOrigin {
    /// Allow all origins (`*`)
    #[serde(deserialize_with = "parse_wildcard")]
    Wildcard,
    /// Specific origin URL (e.g., `https://app.example.com`)
    #[serde(deserialize_with = "parse_url")]
    Url(Url),
}

fn parse_wildcard<'de, D>(deserializer: D) -> Result<(), D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    if s == "*" {
        Ok(())
    } else {
        Err(serde::de::Error::custom("Expected '*'"))
    }
}

fn parse_url<'de, D>(deserializer: D) -> Result<Url, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Url::parse(&s).map_err(serde::de::Error::custom)
}

/// Startup connection retry behaviour.
///
/// Both the database and the session store are probed at startup with
/// exponential backoff. Exhausting the deadline is fatal: the process exits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StartupConfig {
    /// Base backoff duration in milliseconds (exponentially increased)
    pub backoff_ms: u64,
    /// Factor by which the backoff is increased with each retry
    pub backoff_factor: u64,
    /// Maximum backoff between attempts in milliseconds
    pub max_backoff_ms: u64,
    /// Total time budget for connecting before giving up
    #[serde(with = "humantime_serde")]
    pub connect_deadline: Duration,
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            backoff_ms: 200,
            backoff_factor: 2,
            max_backoff_ms: 2000,
            connect_deadline: Duration::from_secs(5),
        }
    }
}

/// Email configuration for confirmation flows.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
// Note: Cannot use deny_unknown_fields here due to #[serde(flatten)] on transport
pub struct EmailConfig {
    /// Email transport method
    #[serde(flatten)]
    pub transport: EmailTransportConfig,
    /// Sender email address
    pub from_email: String,
    /// Sender display name
    pub from_name: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            transport: EmailTransportConfig::default(),
            from_email: "no-reply@example.com".to_string(),
            from_name: "User Control".to_string(),
        }
    }
}

/// Email transport configuration - either SMTP or file-based for testing.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EmailTransportConfig {
    /// Send emails via SMTP server
    Smtp {
        /// SMTP server hostname
        host: String,
        /// SMTP server port
        port: u16,
        /// SMTP authentication username
        username: String,
        /// SMTP authentication password
        password: String,
        /// Use TLS encryption
        use_tls: bool,
    },
    /// Write emails to files (for development/testing)
    File {
        /// Directory path where email files will be written
        path: String,
    },
}

impl Default for EmailTransportConfig {
    fn default() -> Self {
        Self::File {
            path: "./emails".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            dashboard_url: "http://localhost:5173".to_string(),
            database_url: None,
            session_store_url: None,
            database: DatabaseConfig::default(),
            session_store: SessionStoreConfig::default(),
            admin_email: "admin@example.com".to_string(),
            admin_password: None,
            secret_key: None,
            auth: AuthConfig::default(),
            startup: StartupConfig::default(),
            email: EmailConfig::default(),
            force_rollback: false,
        }
    }
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let mut config: Self = Self::figment(args).extract()?;

        // DATABASE_URL and REDIS_URL take priority over the structured fields
        if let Some(url) = config.database_url.take() {
            config.database.url = url;
        }
        if let Some(url) = config.session_store_url.take() {
            config.session_store.url = url;
        }

        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values
            .merge(Env::prefixed("USERCTL_").split("__"))
            // Common DATABASE_URL and REDIS_URL patterns
            .merge(Env::raw().only(&["DATABASE_URL"]).map(|_| "database_url".into()))
            .merge(Env::raw().only(&["REDIS_URL"]).map(|_| "session_store_url".into()))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.auth.password.min_length > self.auth.password.max_length {
            anyhow::bail!(
                "auth.password.min_length ({}) exceeds max_length ({})",
                self.auth.password.min_length,
                self.auth.password.max_length
            );
        }
        if self.auth.session.token_bytes < 8 {
            anyhow::bail!("auth.session.token_bytes must be at least 8");
        }
        match self.auth.session.cookie_same_site.as_str() {
            "Strict" | "Lax" | "None" => {}
            other => anyhow::bail!("auth.session.cookie_same_site must be Strict, Lax or None (got {other})"),
        }
        Ok(())
    }
}
