//! Application configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `DATABASE_URL` - `PostgreSQL` connection string
//! - `SECRET_KEY` - JWT signing key (min 32 chars)
//! - `ALLOWED_HOSTS` - Comma separated host names accepted in the `Host` header (`*` allows any)
//!
//! ## Optional
//! - `HOST` - Bind address (default: 0.0.0.0)
//! - `PORT` - Listen port (default: 8083)
//! - `DATABASE_MAX_CONNECTIONS` - Pool size (default: 10)
//! - `ACCESS_TOKEN_TTL_SECS` / `REFRESH_TOKEN_TTL_SECS` - Token lifetimes (default: 300 / 86400)
//! - `STRIPE_SECRET_KEY` - Enables checkout sessions
//! - `STRIPE_WEBHOOK_SECRET` - Enables the payment webhook
//! - `STRIPE_API_BASE` - Stripe API origin (default: <https://api.stripe.com>)
//! - `CHECKOUT_SUCCESS_URL` / `CHECKOUT_CANCEL_URL` - Redirect targets after checkout
//! - `NATS_URL` - Publish domain events when set

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use secrecy::SecretString;
use thiserror::Error;

const MIN_SECRET_KEY_LENGTH: usize = 32;
const DEFAULT_PORT: u16 = 8083;
const DEFAULT_STRIPE_API_BASE: &str = "https://api.stripe.com";
const DEFAULT_SUCCESS_URL: &str = "http://localhost:3000/success?session_id={CHECKOUT_SESSION_ID}";
const DEFAULT_CANCEL_URL: &str = "http://localhost:3000/payment-cancelled";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: SecretString,
    pub database_max_connections: u32,
    pub host: IpAddr,
    pub port: u16,
    pub secret_key: SecretString,
    pub allowed_hosts: AllowedHosts,
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_secs: i64,
    pub stripe: StripeConfig,
    pub nats_url: Option<String>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("database_url", &"[REDACTED]")
            .field("database_max_connections", &self.database_max_connections)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("secret_key", &"[REDACTED]")
            .field("allowed_hosts", &self.allowed_hosts)
            .field("access_token_ttl_secs", &self.access_token_ttl_secs)
            .field("refresh_token_ttl_secs", &self.refresh_token_ttl_secs)
            .field("stripe", &self.stripe)
            .field("nats_url", &self.nats_url)
            .finish()
    }
}

/// Stripe settings. Keys are optional so the shop can run without payments.
#[derive(Clone)]
pub struct StripeConfig {
    pub secret_key: Option<SecretString>,
    pub webhook_secret: Option<SecretString>,
    pub api_base: url::Url,
    pub success_url: String,
    pub cancel_url: String,
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("secret_key", &self.secret_key.as_ref().map(|_| "[REDACTED]"))
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "[REDACTED]"))
            .field("api_base", &self.api_base.as_str())
            .field("success_url", &self.success_url)
            .field("cancel_url", &self.cancel_url)
            .finish()
    }
}

/// Host names accepted in the `Host` header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AllowedHosts {
    Any,
    List(Vec<String>),
}

impl AllowedHosts {
    pub fn parse(raw: &str) -> Self {
        let hosts: Vec<String> = raw.split(',').map(|h| h.trim().to_ascii_lowercase()).filter(|h| !h.is_empty()).collect();
        if hosts.iter().any(|h| h == "*") { Self::Any } else { Self::List(hosts) }
    }

    /// Compares the host part of a `Host` header value, ignoring any port.
    /// Entries starting with `.` match the domain and all of its subdomains.
    pub fn allows(&self, header: &str) -> bool {
        let hosts = match self {
            Self::Any => return true,
            Self::List(hosts) => hosts,
        };
        let host = strip_port(header).to_ascii_lowercase();
        hosts.iter().any(|allowed| match allowed.strip_prefix('.') {
            Some(domain) => host == domain || host.ends_with(allowed.as_str()),
            None => host == *allowed,
        })
    }
}

fn strip_port(header: &str) -> &str {
    if let Some(rest) = header.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    match header.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => header,
    }
}

impl AppConfig {
    /// Loads configuration from the process environment (after `.env`).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, which returns the raw value of a variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &str| get(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()));

        let database_url = required("DATABASE_URL")?;
        let secret_key = required("SECRET_KEY")?;
        if secret_key.chars().count() < MIN_SECRET_KEY_LENGTH {
            return Err(ConfigError::InvalidEnvVar(
                "SECRET_KEY".into(),
                format!("must be at least {MIN_SECRET_KEY_LENGTH} characters"),
            ));
        }
        let allowed_hosts = AllowedHosts::parse(&required("ALLOWED_HOSTS")?);

        let host = match get("HOST") {
            Some(raw) => raw.parse().map_err(|e| ConfigError::InvalidEnvVar("HOST".into(), format!("{e}")))?,
            None => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        };

        let api_base = get("STRIPE_API_BASE").unwrap_or_else(|| DEFAULT_STRIPE_API_BASE.to_string());
        let api_base = url::Url::parse(&api_base).map_err(|e| ConfigError::InvalidEnvVar("STRIPE_API_BASE".into(), e.to_string()))?;

        Ok(Self {
            database_url: SecretString::from(database_url),
            database_max_connections: parse_or(&get, "DATABASE_MAX_CONNECTIONS", 10)?,
            host,
            port: parse_or(&get, "PORT", DEFAULT_PORT)?,
            secret_key: SecretString::from(secret_key),
            allowed_hosts,
            access_token_ttl_secs: parse_or(&get, "ACCESS_TOKEN_TTL_SECS", 300)?,
            refresh_token_ttl_secs: parse_or(&get, "REFRESH_TOKEN_TTL_SECS", 86_400)?,
            stripe: StripeConfig {
                secret_key: get("STRIPE_SECRET_KEY").map(SecretString::from),
                webhook_secret: get("STRIPE_WEBHOOK_SECRET").map(SecretString::from),
                api_base,
                success_url: get("CHECKOUT_SUCCESS_URL").unwrap_or_else(|| DEFAULT_SUCCESS_URL.to_string()),
                cancel_url: get("CHECKOUT_CANCEL_URL").unwrap_or_else(|| DEFAULT_CANCEL_URL.to_string()),
            },
            nats_url: get("NATS_URL"),
        })
    }

    pub fn socket_addr(&self) -> SocketAddr { SocketAddr::new(self.host, self.port) }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    const BASE: &[(&str, &str)] = &[
        ("DATABASE_URL", "postgres://shop:pw@localhost/shop"),
        ("SECRET_KEY", "0123456789abcdef0123456789abcdef"),
        ("ALLOWED_HOSTS", "localhost, api.example.com"),
    ];

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup(BASE)).unwrap();
        assert_eq!(config.port, 8083);
        assert_eq!(config.socket_addr().to_string(), "0.0.0.0:8083");
        assert_eq!(config.access_token_ttl_secs, 300);
        assert_eq!(config.refresh_token_ttl_secs, 86_400);
        assert!(config.stripe.secret_key.is_none());
        assert_eq!(config.stripe.api_base.as_str(), "https://api.stripe.com/");
        assert_eq!(config.secret_key.expose_secret(), "0123456789abcdef0123456789abcdef");
    }

    #[test]
    fn test_missing_required() {
        let err = AppConfig::from_lookup(lookup(&BASE[1..])).unwrap_err();
        assert_eq!(err, ConfigError::MissingEnvVar("DATABASE_URL".into()));
    }

    #[test]
    fn test_short_secret_rejected() {
        let vars = [BASE[0], ("SECRET_KEY", "short"), BASE[2]];
        assert!(matches!(AppConfig::from_lookup(lookup(&vars)), Err(ConfigError::InvalidEnvVar(k, _)) if k == "SECRET_KEY"));
    }

    #[test]
    fn test_invalid_port() {
        let mut vars = BASE.to_vec();
        vars.push(("PORT", "eighty"));
        assert!(matches!(AppConfig::from_lookup(lookup(&vars)), Err(ConfigError::InvalidEnvVar(k, _)) if k == "PORT"));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut vars = BASE.to_vec();
        vars.push(("STRIPE_SECRET_KEY", "sk_test_abc"));
        let rendered = format!("{:?}", AppConfig::from_lookup(lookup(&vars)).unwrap());
        assert!(!rendered.contains("sk_test_abc"));
        assert!(!rendered.contains("0123456789abcdef"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn test_allowed_hosts() {
        let hosts = AllowedHosts::parse("localhost, .example.com");
        assert!(hosts.allows("localhost:8083"));
        assert!(hosts.allows("shop.example.com"));
        assert!(hosts.allows("example.com"));
        assert!(!hosts.allows("evil.com"));
        assert!(AllowedHosts::parse("*").allows("anything"));
        assert!(AllowedHosts::parse("::1").allows("[::1]:8083"));
    }
}
