//! Configuration loader for the `codemetal-envwatch` service.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). Credentials live only in the environment; nothing
//! secret is compiled in.
//!
use std::env;
use std::net::SocketAddr;

use anyhow::{anyhow, bail, Result};

use crate::session::{RefreshRate, DEFAULT_IDLE_MINUTES};

/// Parse an optional integer environment variable with a default value.
macro_rules! parse_env_u32 {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<u32>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse a required string environment variable.
macro_rules! require_env {
    ($var_name:expr) => {
        env::var($var_name)
            .map_err(|_| anyhow!("{} must be set in .env or environment", $var_name))?
    };
}

/// Read an optional string environment variable with a default value.
macro_rules! env_or {
    ($var_name:expr, $default:expr) => {
        env::var($var_name).unwrap_or_else(|_| $default.to_string())
    };
}

/// SMTP relay settings. Present only when `SMTP_HOST` is set.
#[derive(Debug, Clone)]
pub struct MailConfig {
    // ---
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    pub sender: String,

    /// Recipient of alert mails and the default report recipient.
    pub recipient: String,
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// Address the HTTP server binds to.
    pub bind_addr: SocketAddr,

    /// Dashboard login name.
    pub dashboard_user: String,

    /// Lowercase hex SHA-256 of the dashboard password.
    pub dashboard_password_sha256: String,

    /// Location string used in mails and reports.
    pub location: String,

    /// Refresh interval a new session starts with.
    pub default_refresh: RefreshRate,

    /// Minutes without a request after which a session is dropped.
    pub session_idle_minutes: u32,

    /// Mail relay; `None` runs with the no-op mailer.
    pub mail: Option<MailConfig>,
}

/// Load configuration from environment variables with defaults.
///
/// Required:
/// - `DASHBOARD_PASSWORD_SHA256` – hex SHA-256 of the dashboard password
///
/// Optional:
/// - `DASHBOARD_USER` – login name (default: `admin`)
/// - `BIND_ADDR` – listen address (default: `0.0.0.0:8080`)
/// - `MONITOR_LOCATION` – location label (default: `Main Monitoring Station`)
/// - `REFRESH_RATE_SECS` – initial refresh rate, one of 1, 2, 3, 5, 10 (default: 2)
/// - `SESSION_IDLE_MINUTES` – drop sessions idle this long (default: 30)
/// - `SMTP_HOST` – enables mail; then `SMTP_USERNAME`, `SMTP_PASSWORD`,
///   `ALERT_SENDER` and `ALERT_RECIPIENT` are required and `SMTP_PORT`
///   defaults to 465
///
/// Returns an error if any required variable is missing or invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let dashboard_password_sha256 = require_env!("DASHBOARD_PASSWORD_SHA256").to_lowercase();
    if dashboard_password_sha256.len() != 64
        || !dashboard_password_sha256.chars().all(|c| c.is_ascii_hexdigit())
    {
        bail!("DASHBOARD_PASSWORD_SHA256 must be 64 hex characters");
    }

    let dashboard_user = env_or!("DASHBOARD_USER", "admin");
    let location = env_or!("MONITOR_LOCATION", "Main Monitoring Station");

    let bind_addr = env_or!("BIND_ADDR", "0.0.0.0:8080")
        .parse::<SocketAddr>()
        .map_err(|e| anyhow!("Invalid BIND_ADDR: {}", e))?;

    let default_refresh = RefreshRate::try_from(parse_env_u32!("REFRESH_RATE_SECS", 2))
        .map_err(|e| anyhow!("Invalid REFRESH_RATE_SECS: {}", e))?;

    let session_idle_minutes = parse_env_u32!("SESSION_IDLE_MINUTES", DEFAULT_IDLE_MINUTES);
    if session_idle_minutes == 0 {
        bail!("SESSION_IDLE_MINUTES must be at least 1");
    }

    let mail = match env::var("SMTP_HOST") {
        Ok(smtp_host) => {
            let smtp_port = u16::try_from(parse_env_u32!("SMTP_PORT", 465))
                .map_err(|e| anyhow!("Invalid SMTP_PORT: {}", e))?;
            Some(MailConfig {
                smtp_host,
                smtp_port,
                username: require_env!("SMTP_USERNAME"),
                password: require_env!("SMTP_PASSWORD"),
                sender: require_env!("ALERT_SENDER"),
                recipient: require_env!("ALERT_RECIPIENT"),
            })
        }
        Err(_) => None,
    };

    Ok(Config {
        bind_addr,
        dashboard_user,
        dashboard_password_sha256,
        location,
        default_refresh,
        session_idle_minutes,
        mail,
    })
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    ///
    /// Masks secrets while showing all configuration values that were loaded.
    pub fn log_config(&self) {
        // ---
        tracing::info!("Configuration loaded:");
        tracing::info!("  BIND_ADDR                 : {}", self.bind_addr);
        tracing::info!("  DASHBOARD_USER            : {}", self.dashboard_user);
        tracing::info!("  DASHBOARD_PASSWORD_SHA256 : {}", mask(&self.dashboard_password_sha256));
        tracing::info!("  MONITOR_LOCATION          : {}", self.location);
        tracing::info!("  REFRESH_RATE_SECS         : {}", self.default_refresh.secs());
        tracing::info!("  SESSION_IDLE_MINUTES      : {}", self.session_idle_minutes);

        match &self.mail {
            Some(mail) => {
                tracing::info!("  SMTP_HOST                 : {}", mail.smtp_host);
                tracing::info!("  SMTP_PORT                 : {}", mail.smtp_port);
                tracing::info!("  SMTP_USERNAME             : {}", mail.username);
                tracing::info!("  SMTP_PASSWORD             : ****");
                tracing::info!("  ALERT_SENDER              : {}", mail.sender);
                tracing::info!("  ALERT_RECIPIENT           : {}", mail.recipient);
            }
            None => tracing::info!("  SMTP_HOST                 : (unset, mail disabled)"),
        }
    }
}

/// Keep the first four characters of a secret.
fn mask(secret: &str) -> String {
    // ---
    let visible: String = secret.chars().take(4).collect();
    format!("{}****", visible)
}
