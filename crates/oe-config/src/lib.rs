//! Typed environment configuration for the engine, loaded once at process start.
//!
//! Connection-level settings only: the database URL, broker credentials, and optional
//! cache/notifier endpoints. Risk limits and circuit-breaker thresholds are not
//! environment variables — they live on the `trading_sessions` and
//! `circuit_breaker_state` rows and are seeded on first use (see `oe-db::seed`).

use std::env;

use anyhow::{Context, Result};

const ENV_DATABASE_URL: &str = "ENGINE_DATABASE_URL";
const ENV_CACHE_URL: &str = "ENGINE_CACHE_URL";
const ENV_BROKER_APP_ID: &str = "ENGINE_BROKER_APP_ID";
const ENV_BROKER_SECRET: &str = "ENGINE_BROKER_SECRET";
const ENV_BROKER_REDIRECT_URI: &str = "ENGINE_BROKER_REDIRECT_URI";
const ENV_BROKER_ACCESS_TOKEN: &str = "ENGINE_BROKER_ACCESS_TOKEN";
const ENV_BROKER_REFRESH_TOKEN: &str = "ENGINE_BROKER_REFRESH_TOKEN";
const ENV_NOTIFIER_TOKEN: &str = "ENGINE_NOTIFIER_TOKEN";
const ENV_NOTIFIER_CHAT_ID: &str = "ENGINE_NOTIFIER_CHAT_ID";
const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:8080";

/// Connection and credential configuration for one engine process.
///
/// Notifier fields exist only so the struct is a complete home for everything in the
/// environment; the core never reads them itself — they are here for the out-of-scope
/// chat-bot notifier collaborator to pick up.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub database_url: String,
    pub cache_url: Option<String>,
    pub broker_app_id: Option<String>,
    pub broker_secret: Option<String>,
    pub broker_redirect_uri: String,
    pub broker_access_token: Option<String>,
    pub broker_refresh_token: Option<String>,
    pub notifier_token: Option<String>,
    pub notifier_chat_id: Option<String>,
}

impl EngineConfig {
    /// Loads `.env.local` if present (silently ignored otherwise — production injects
    /// env vars directly) then reads the typed fields out of the process environment.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::from_filename(".env.local");

        let database_url = env::var(ENV_DATABASE_URL)
            .with_context(|| format!("missing required env var {ENV_DATABASE_URL}"))?;

        Ok(EngineConfig {
            database_url,
            cache_url: env::var(ENV_CACHE_URL).ok(),
            broker_app_id: env::var(ENV_BROKER_APP_ID).ok(),
            broker_secret: env::var(ENV_BROKER_SECRET).ok(),
            broker_redirect_uri: env::var(ENV_BROKER_REDIRECT_URI)
                .unwrap_or_else(|_| DEFAULT_REDIRECT_URI.to_string()),
            broker_access_token: env::var(ENV_BROKER_ACCESS_TOKEN).ok(),
            broker_refresh_token: env::var(ENV_BROKER_REFRESH_TOKEN).ok(),
            notifier_token: env::var(ENV_NOTIFIER_TOKEN).ok(),
            notifier_chat_id: env::var(ENV_NOTIFIER_CHAT_ID).ok(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn missing_database_url_is_an_error() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::remove_var(ENV_DATABASE_URL);
        let err = EngineConfig::from_env().unwrap_err();
        assert!(err.to_string().contains(ENV_DATABASE_URL));
    }

    #[test]
    fn redirect_uri_defaults_when_unset() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var(ENV_DATABASE_URL, "postgres://localhost/test");
        env::remove_var(ENV_BROKER_REDIRECT_URI);
        let cfg = EngineConfig::from_env().unwrap();
        assert_eq!(cfg.broker_redirect_uri, DEFAULT_REDIRECT_URI);
        env::remove_var(ENV_DATABASE_URL);
    }
}
