use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Context;
use serde::Deserialize;

const DEFAULT_DAILY_LIMIT: u32 = 3;
const DEFAULT_TEMP_VIDEO_PATH: &str = "videos";
const DEFAULT_PORT: u16 = 5000;

/// Storage credentials, deserialized from the `DRIVE_CREDENTIALS_JSON`
/// environment blob. The blob is parsed, never evaluated.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct DriveCredentials {
    pub(crate) access_token: String,
}

#[derive(Debug, Clone)]
pub(crate) struct Config {
    pub(crate) bot_token: String,
    pub(crate) drive_credentials: DriveCredentials,
    pub(crate) daily_limit: u32,
    pub(crate) temp_video_path: PathBuf,
    pub(crate) payments_api_key: String,
    /// Externally reachable URL the payment provider posts notifications to.
    pub(crate) webhook_url: String,
    /// Shared secret required in `x-ipn-secret` on inbound notifications.
    /// Unset means the webhook accepts unauthenticated posts.
    pub(crate) ipn_secret: Option<String>,
    pub(crate) port: u16,
}

impl Config {
    pub(crate) fn from_env() -> anyhow::Result<Self> {
        let credentials = required("DRIVE_CREDENTIALS_JSON")?;
        Ok(Self {
            bot_token: required("BOT_TOKEN")?,
            drive_credentials: serde_json::from_str(&credentials)
                .context("DRIVE_CREDENTIALS_JSON is not a valid credentials object")?,
            daily_limit: parsed_or("DAILY_LIMIT", DEFAULT_DAILY_LIMIT)?,
            temp_video_path: env::var("TEMP_VIDEO_PATH")
                .unwrap_or_else(|_| DEFAULT_TEMP_VIDEO_PATH.to_string())
                .into(),
            payments_api_key: required("NOWPAYMENTS_API_KEY")?,
            webhook_url: required("WEBHOOK_URL")?,
            ipn_secret: env::var("PAYMENT_IPN_SECRET").ok(),
            port: parsed_or("PORT", DEFAULT_PORT)?,
        })
    }
}

fn required(name: &str) -> anyhow::Result<String> {
    env::var(name).with_context(|| format!("{} environment variable is not set", name))
}

fn parsed_or<T: FromStr>(name: &str, default: T) -> anyhow::Result<T> {
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|_| anyhow::anyhow!("{} has an invalid value: {:?}", name, value)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn set_required_vars() {
        env::set_var("BOT_TOKEN", "123:abc");
        env::set_var("DRIVE_CREDENTIALS_JSON", r#"{"access_token":"ya29.token"}"#);
        env::set_var("NOWPAYMENTS_API_KEY", "np-key");
        env::set_var("WEBHOOK_URL", "https://bot.example/webhook");
        env::remove_var("DAILY_LIMIT");
        env::remove_var("TEMP_VIDEO_PATH");
        env::remove_var("PAYMENT_IPN_SECRET");
        env::remove_var("PORT");
    }

    #[test]
    #[serial]
    fn defaults_are_applied() {
        set_required_vars();
        let config = Config::from_env().unwrap();
        assert_eq!(config.daily_limit, 3);
        assert_eq!(config.port, 5000);
        assert_eq!(config.temp_video_path, PathBuf::from("videos"));
        assert_eq!(config.drive_credentials.access_token, "ya29.token");
        assert!(config.ipn_secret.is_none());
    }

    #[test]
    #[serial]
    fn overrides_are_parsed() {
        set_required_vars();
        env::set_var("DAILY_LIMIT", "10");
        env::set_var("PORT", "8080");
        env::set_var("PAYMENT_IPN_SECRET", "hunter2");
        let config = Config::from_env().unwrap();
        assert_eq!(config.daily_limit, 10);
        assert_eq!(config.port, 8080);
        assert_eq!(config.ipn_secret.as_deref(), Some("hunter2"));
    }

    #[test]
    #[serial]
    fn missing_token_is_a_descriptive_error() {
        set_required_vars();
        env::remove_var("BOT_TOKEN");
        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("BOT_TOKEN"));
    }

    #[test]
    #[serial]
    fn malformed_credentials_fail_fast() {
        set_required_vars();
        env::set_var("DRIVE_CREDENTIALS_JSON", "not json");
        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("DRIVE_CREDENTIALS_JSON"));
    }

    #[test]
    #[serial]
    fn non_numeric_limit_is_rejected() {
        set_required_vars();
        env::set_var("DAILY_LIMIT", "lots");
        assert!(Config::from_env().is_err());
    }
}
