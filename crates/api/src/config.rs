//! Application configuration
//!
//! Built once at startup from the process environment and handed to every
//! component. Required keys are checked together so a misconfigured
//! deployment reports everything it is missing in one go.

use std::time::Duration;
use url::Url;

const DEFAULT_APP_URL: &str = "http://localhost:3000";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_STREAM_READ_TIMEOUT_SECS: u64 = 60;
const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:3000";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration: {}", .0.join(", "))]
    Missing(Vec<String>),
    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

#[derive(Clone)]
pub struct Config {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_role_key: Option<String>,
    /// Enables local verification of access tokens
    pub supabase_jwt_secret: Option<String>,
    /// Direct Postgres access; PostgREST is used when absent
    pub database_url: Option<String>,
    pub run_migrations: bool,
    pub stripe_secret_key: Option<String>,
    pub stripe_publishable_key: Option<String>,
    pub stripe_webhook_secret: Option<String>,
    pub stripe_price_id: Option<String>,
    pub app_url: String,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: String,
    pub chat_stream_read_timeout: Duration,
    pub bind_address: String,
    pub secure_cookies: bool,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn set(value: &Option<String>) -> &'static str {
            if value.is_some() {
                "<set>"
            } else {
                "<unset>"
            }
        }

        f.debug_struct("Config")
            .field("supabase_url", &self.supabase_url)
            .field("supabase_anon_key", &"<redacted>")
            .field("supabase_service_role_key", &set(&self.supabase_service_role_key))
            .field("supabase_jwt_secret", &set(&self.supabase_jwt_secret))
            .field("database_url", &set(&self.database_url))
            .field("run_migrations", &self.run_migrations)
            .field("stripe_secret_key", &set(&self.stripe_secret_key))
            .field("stripe_publishable_key", &self.stripe_publishable_key)
            .field("stripe_webhook_secret", &set(&self.stripe_webhook_secret))
            .field("stripe_price_id", &self.stripe_price_id)
            .field("app_url", &self.app_url)
            .field("openai_api_key", &set(&self.openai_api_key))
            .field("openai_model", &self.openai_model)
            .field("openai_base_url", &self.openai_base_url)
            .field("chat_stream_read_timeout", &self.chat_stream_read_timeout)
            .field("bind_address", &self.bind_address)
            .field("secure_cookies", &self.secure_cookies)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Empty strings count as unset
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut missing = Vec::new();
        let mut require = |key: &str| {
            let value = get(key);
            if value.is_none() {
                missing.push(key.to_string());
            }
            value.unwrap_or_default()
        };

        let supabase_url = require("SUPABASE_URL");
        let supabase_anon_key = require("SUPABASE_ANON_KEY");

        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        let supabase_url = parse_url("SUPABASE_URL", &supabase_url)?;
        let app_url = parse_url(
            "APP_URL",
            &get("APP_URL").unwrap_or_else(|| DEFAULT_APP_URL.to_string()),
        )?;
        let openai_base_url = parse_url(
            "OPENAI_BASE_URL",
            &get("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
        )?;

        let chat_stream_read_timeout = match get("CHAT_STREAM_READ_TIMEOUT_SECS") {
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "CHAT_STREAM_READ_TIMEOUT_SECS".to_string(),
                        reason: format!("expected a positive number of seconds, got {:?}", raw),
                    })
                }
            },
            None => Duration::from_secs(DEFAULT_STREAM_READ_TIMEOUT_SECS),
        };

        Ok(Self {
            supabase_url,
            supabase_anon_key,
            supabase_service_role_key: get("SUPABASE_SERVICE_ROLE_KEY"),
            supabase_jwt_secret: get("SUPABASE_JWT_SECRET"),
            database_url: get("DATABASE_URL"),
            run_migrations: parse_bool("RUN_MIGRATIONS", get("RUN_MIGRATIONS"))?,
            stripe_secret_key: get("STRIPE_SECRET_KEY"),
            stripe_publishable_key: get("STRIPE_PUBLISHABLE_KEY"),
            stripe_webhook_secret: get("STRIPE_WEBHOOK_SECRET"),
            stripe_price_id: get("STRIPE_PRICE_ID"),
            app_url,
            openai_api_key: get("OPENAI_API_KEY"),
            openai_model: get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            openai_base_url,
            chat_stream_read_timeout,
            bind_address: get("BIND_ADDRESS").unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string()),
            secure_cookies: parse_bool("SECURE_COOKIES", get("SECURE_COOKIES"))?,
        })
    }

    /// Both the key and the plan price are needed to start a checkout
    pub fn stripe_checkout_enabled(&self) -> bool {
        self.stripe_secret_key.is_some() && self.stripe_price_id.is_some()
    }

    /// Origin of `app_url`, for the CORS allowlist
    pub fn app_origin(&self) -> String {
        Url::parse(&self.app_url)
            .map(|u| u.origin().ascii_serialization())
            .unwrap_or_else(|_| self.app_url.clone())
    }

    /// Log which optional features are switched off
    pub fn log_degraded_features(&self) {
        if self.openai_api_key.is_none() {
            tracing::warn!("Chat disabled (missing OPENAI_API_KEY)");
        }
        if !self.stripe_checkout_enabled() {
            tracing::warn!("Checkout disabled (missing STRIPE_SECRET_KEY or STRIPE_PRICE_ID)");
        }
        if self.stripe_webhook_secret.is_none() {
            tracing::warn!("Stripe webhooks disabled (missing STRIPE_WEBHOOK_SECRET)");
        }
        if self.supabase_service_role_key.is_none() && self.database_url.is_none() {
            tracing::warn!(
                "No privileged store (missing SUPABASE_SERVICE_ROLE_KEY and DATABASE_URL); webhooks cannot update users"
            );
        }
        if self.supabase_jwt_secret.is_none() {
            tracing::info!("SUPABASE_JWT_SECRET not set; access tokens verified via Supabase API");
        }
    }
}

fn parse_url(key: &str, raw: &str) -> Result<String, ConfigError> {
    Url::parse(raw).map_err(|e| ConfigError::Invalid {
        key: key.to_string(),
        reason: e.to_string(),
    })?;
    Ok(raw.trim_end_matches('/').to_string())
}

fn parse_bool(key: &str, raw: Option<String>) -> Result<bool, ConfigError> {
    match raw.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None => Ok(false),
        Some("true" | "1" | "yes") => Ok(true),
        Some("false" | "0" | "no") => Ok(false),
        Some(other) => Err(ConfigError::Invalid {
            key: key.to_string(),
            reason: format!("expected a boolean, got {:?}", other),
        }),
    }
}
