// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is read from process environment variables once at startup.
//! A missing `DATABASE_PATH` is fatal; every other setting has a default or
//! disables the feature it configures.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATABASE_PATH` | redb document store file | Required |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `APP_ENV` | `production` or `development` | `production` |
//! | `CLERK_JWKS_URL` | Clerk JWKS endpoint for provider tokens | Optional |
//! | `CLERK_ISSUER` | Expected provider `iss` claim | Optional |
//! | `CLERK_AUDIENCE` | Expected provider `aud` claim | Optional |
//! | `JWT_SECRET` | Shared secret for locally-issued tokens | Optional |
//! | `JWT_ISSUER` | Issuer of locally-issued tokens | `realty-server` |
//! | `JWT_TTL_SECS` | Lifetime of locally-issued tokens | `604800` |
//! | `AUTH_COOKIE_NAME` | Cookie carrying the bearer token | `__session` |
//! | `RATE_LIMIT_WINDOW_SECS` | Rate limit window | `900` |
//! | `RATE_LIMIT_MAX_REQUESTS` | Requests allowed per window | `100` |
//! | `TRUST_PROXY` | Take the client address from `X-Forwarded-For` / `X-Real-IP` | `false` |
//! | `PHONE_COUNTRY_CODE` | Calling code rewritten to the local trunk prefix | `44` |
//! | `INQUIRY_RECIPIENT` | Fallback recipient for inquiries | Optional |
//! | `TLS_CERT_PATH` / `TLS_KEY_PATH` | PEM files; HTTPS when both are set | Optional |
//! | `AUDIT_QUEUE_CAPACITY` | Bound of the audit queue | `1024` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |
//!
//! SMTP settings are documented on [`crate::mail::SmtpConfig`] and image host
//! settings on [`crate::media::MediaConfig`].

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::mail::SmtpConfig;
use crate::media::MediaConfig;

/// Environment variable name for the document store path.
pub const DATABASE_PATH_ENV: &str = "DATABASE_PATH";

/// Default issuer written into locally-issued tokens.
pub const DEFAULT_LOCAL_ISSUER: &str = "realty-server";

/// Default lifetime of a locally-issued token (7 days).
const DEFAULT_LOCAL_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Default rate limit window (15 minutes).
const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 15 * 60;

/// Default number of requests allowed per window.
const DEFAULT_RATE_LIMIT_MAX_REQUESTS: u32 = 100;

const DEFAULT_AUDIT_QUEUE_CAPACITY: usize = 1024;

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Production,
    Development,
}

impl Environment {
    /// Whether underlying error details may be returned to clients.
    pub fn exposes_error_details(self) -> bool {
        self == Environment::Development
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Identity provider (Clerk) verification settings.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub jwks_url: String,
    pub issuer: Option<String>,
    pub audience: Option<String>,
}

/// Settings for locally-issued HS256 tokens.
#[derive(Clone)]
pub struct LocalTokenConfig {
    pub secret: String,
    pub issuer: String,
    pub ttl: Duration,
}

impl std::fmt::Debug for LocalTokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalTokenConfig")
            .field("secret", &"[redacted]")
            .field("issuer", &self.issuer)
            .field("ttl", &self.ttl)
            .finish()
    }
}

/// Fixed-window rate limit settings.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitSettings {
    pub window: Duration,
    pub max_requests: u32,
    /// Forwarded-for headers are only honoured behind a trusted proxy
    pub trust_proxy: bool,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(DEFAULT_RATE_LIMIT_WINDOW_SECS),
            max_requests: DEFAULT_RATE_LIMIT_MAX_REQUESTS,
            trust_proxy: false,
        }
    }
}

/// PEM certificate and key used to serve HTTPS.
#[derive(Debug, Clone)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Complete server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub environment: Environment,
    pub provider: Option<ProviderConfig>,
    pub local_tokens: Option<LocalTokenConfig>,
    pub auth_cookie_name: String,
    pub rate_limit: RateLimitSettings,
    pub phone_country_code: String,
    pub smtp: Option<SmtpConfig>,
    pub inquiry_recipient: Option<String>,
    pub media: Option<MediaConfig>,
    pub tls: Option<TlsPaths>,
    pub audit_queue_capacity: usize,
    pub log_format: LogFormat,
}

impl Config {
    /// Defaults for everything except the store location.
    ///
    /// Used by tests and as the base that `from_lookup` overrides.
    pub fn with_database(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
            host: "0.0.0.0".to_string(),
            port: 8080,
            environment: Environment::Production,
            provider: None,
            local_tokens: None,
            auth_cookie_name: "__session".to_string(),
            rate_limit: RateLimitSettings::default(),
            phone_country_code: "44".to_string(),
            smtp: None,
            inquiry_recipient: None,
            media: None,
            tls: None,
            audit_queue_capacity: DEFAULT_AUDIT_QUEUE_CAPACITY,
            log_format: LogFormat::Pretty,
        }
    }

    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_path = get(DATABASE_PATH_ENV).ok_or(ConfigError::Missing(DATABASE_PATH_ENV))?;
        let mut config = Self::with_database(database_path);

        if let Some(host) = get("HOST") {
            config.host = host;
        }
        config.port = parse_or("PORT", get("PORT"), config.port)?;

        config.environment = match get("APP_ENV").as_deref().map(str::to_lowercase).as_deref() {
            None | Some("production") | Some("prod") => Environment::Production,
            Some("development") | Some("dev") | Some("test") => Environment::Development,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "APP_ENV",
                    value: other.to_string(),
                })
            }
        };

        if let Some(jwks_url) = get("CLERK_JWKS_URL") {
            url::Url::parse(&jwks_url).map_err(|_| ConfigError::Invalid {
                name: "CLERK_JWKS_URL",
                value: jwks_url.clone(),
            })?;
            config.provider = Some(ProviderConfig {
                jwks_url,
                issuer: get("CLERK_ISSUER"),
                audience: get("CLERK_AUDIENCE"),
            });
        }

        if let Some(secret) = get("JWT_SECRET") {
            let ttl_secs = parse_or("JWT_TTL_SECS", get("JWT_TTL_SECS"), DEFAULT_LOCAL_TTL_SECS)?;
            config.local_tokens = Some(LocalTokenConfig {
                secret,
                issuer: get("JWT_ISSUER").unwrap_or_else(|| DEFAULT_LOCAL_ISSUER.to_string()),
                ttl: Duration::from_secs(ttl_secs),
            });
        }

        if let Some(name) = get("AUTH_COOKIE_NAME") {
            config.auth_cookie_name = name;
        }

        let window_secs = parse_or(
            "RATE_LIMIT_WINDOW_SECS",
            get("RATE_LIMIT_WINDOW_SECS"),
            DEFAULT_RATE_LIMIT_WINDOW_SECS,
        )?;
        config.rate_limit = RateLimitSettings {
            window: Duration::from_secs(window_secs),
            max_requests: parse_or(
                "RATE_LIMIT_MAX_REQUESTS",
                get("RATE_LIMIT_MAX_REQUESTS"),
                DEFAULT_RATE_LIMIT_MAX_REQUESTS,
            )?,
            trust_proxy: parse_or("TRUST_PROXY", get("TRUST_PROXY"), false)?,
        };

        if let Some(code) = get("PHONE_COUNTRY_CODE") {
            let code = code.trim_start_matches('+').to_string();
            if code.is_empty() || !code.chars().all(|c| c.is_ascii_digit()) {
                return Err(ConfigError::Invalid {
                    name: "PHONE_COUNTRY_CODE",
                    value: code,
                });
            }
            config.phone_country_code = code;
        }

        config.smtp = SmtpConfig::from_lookup(&get)?;
        config.inquiry_recipient = get("INQUIRY_RECIPIENT");
        config.media = MediaConfig::from_lookup(&get)?;

        config.tls = match (get("TLS_CERT_PATH"), get("TLS_KEY_PATH")) {
            (Some(cert), Some(key)) => Some(TlsPaths {
                cert: cert.into(),
                key: key.into(),
            }),
            _ => None,
        };

        config.audit_queue_capacity = parse_or(
            "AUDIT_QUEUE_CAPACITY",
            get("AUDIT_QUEUE_CAPACITY"),
            DEFAULT_AUDIT_QUEUE_CAPACITY,
        )?
        .max(1);

        config.log_format = match get("LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(config)
    }
}

/// Parse an optional raw value, falling back to `default` when unset.
pub(crate) fn parse_or<T: FromStr>(
    name: &'static str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_database_path_is_fatal() {
        let result = Config::from_lookup(lookup(&[("PORT", "9000")]));
        assert!(matches!(result, Err(ConfigError::Missing(DATABASE_PATH_ENV))));
    }

    #[test]
    fn defaults_apply_when_only_database_is_set() {
        let config = Config::from_lookup(lookup(&[("DATABASE_PATH", "/tmp/realty.redb")])).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.rate_limit.max_requests, 100);
        assert_eq!(config.rate_limit.window, Duration::from_secs(900));
        assert!(!config.rate_limit.trust_proxy);
        assert_eq!(config.auth_cookie_name, "__session");
        assert!(config.provider.is_none());
        assert!(config.local_tokens.is_none());
        assert!(config.smtp.is_none());
        assert!(config.media.is_none());
    }

    #[test]
    fn local_tokens_enabled_by_secret() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_PATH", "/tmp/realty.redb"),
            ("JWT_SECRET", "s3cret"),
            ("JWT_TTL_SECS", "60"),
        ]))
        .unwrap();
        let local = config.local_tokens.expect("local tokens configured");
        assert_eq!(local.issuer, DEFAULT_LOCAL_ISSUER);
        assert_eq!(local.ttl, Duration::from_secs(60));
        assert!(!format!("{local:?}").contains("s3cret"));
    }

    #[test]
    fn invalid_port_is_rejected() {
        let result = Config::from_lookup(lookup(&[
            ("DATABASE_PATH", "/tmp/realty.redb"),
            ("PORT", "eighty"),
        ]));
        assert!(matches!(result, Err(ConfigError::Invalid { name: "PORT", .. })));
    }

    #[test]
    fn development_environment_exposes_details() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_PATH", "/tmp/realty.redb"),
            ("APP_ENV", "development"),
        ]))
        .unwrap();
        assert!(config.environment.exposes_error_details());
        assert!(!Environment::Production.exposes_error_details());
    }

    #[test]
    fn trust_proxy_is_opt_in() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_PATH", "/tmp/realty.redb"),
            ("TRUST_PROXY", "true"),
        ]))
        .unwrap();
        assert!(config.rate_limit.trust_proxy);

        let result = Config::from_lookup(lookup(&[
            ("DATABASE_PATH", "/tmp/realty.redb"),
            ("TRUST_PROXY", "sometimes"),
        ]));
        assert!(matches!(result, Err(ConfigError::Invalid { name: "TRUST_PROXY", .. })));
    }

    #[test]
    fn invalid_jwks_url_is_rejected() {
        let result = Config::from_lookup(lookup(&[
            ("DATABASE_PATH", "/tmp/realty.redb"),
            ("CLERK_JWKS_URL", "not a url"),
        ]));
        assert!(matches!(result, Err(ConfigError::Invalid { name: "CLERK_JWKS_URL", .. })));
    }
}
