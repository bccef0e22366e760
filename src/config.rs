//! Application constants and runtime configuration.
//!
//! `AppConfig` is resolved once at startup and handed to the services.
//! Nothing reads the process environment while a result is being processed.

use std::path::PathBuf;

use thiserror::Error;

use crate::clinical::egfr::{EgfrParams, DEFAULT_ETHNICITY_FACTOR};

/// Application-level constants
pub const APP_NAME: &str = "ckdwatch";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Catalog name of the test that receives computed eGFR values.
pub const DEFAULT_EGFR_TEST_NAME: &str = "DFG estimé";

const DEFAULT_EMAIL_FROM: &str = "noreply@ckdwatch.local";

/// Get the application data directory.
/// Falls back to the working directory when no home directory is known.
pub fn app_data_dir() -> PathBuf {
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Default SQLite file location
pub fn default_db_path() -> PathBuf {
    app_data_dir().join("ckdwatch.db")
}

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    if cfg!(debug_assertions) {
        "ckdwatch=debug,ckdwatch_lib=debug,info"
    } else {
        "ckdwatch=info,ckdwatch_lib=info,warn"
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value} ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmailSettings {
    pub api_url: String,
    pub api_key: String,
    pub from: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SmsSettings {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
}

/// Runtime configuration resolved at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    /// Optional catalog override; the bundled catalog is used otherwise.
    pub catalog_path: Option<PathBuf>,
    pub egfr_test_name: String,
    pub egfr: EgfrParams,
    /// None when the email relay is not configured.
    pub email: Option<EmailSettings>,
    /// None when Twilio is not configured.
    pub sms: Option<SmsSettings>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            catalog_path: None,
            egfr_test_name: DEFAULT_EGFR_TEST_NAME.to_string(),
            egfr: EgfrParams::default(),
            email: None,
            sms: None,
        }
    }
}

impl AppConfig {
    /// Reads the process environment. Call once, after `.env` is loaded.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let db_path = get("CKDWATCH_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(default_db_path);
        let catalog_path = get("CKDWATCH_LAB_CATALOG").map(PathBuf::from);
        let egfr_test_name =
            get("CKDWATCH_EGFR_TEST_NAME").unwrap_or_else(|| DEFAULT_EGFR_TEST_NAME.to_string());

        let ethnicity_factor = match get("CKDWATCH_EGFR_ETHNICITY_FACTOR") {
            Some(raw) => parse_factor("CKDWATCH_EGFR_ETHNICITY_FACTOR", &raw)?,
            None => DEFAULT_ETHNICITY_FACTOR,
        };

        let email = match (get("EMAIL_API_URL"), get("EMAIL_API_KEY")) {
            (Some(api_url), Some(api_key)) => Some(EmailSettings {
                api_url,
                api_key,
                from: get("EMAIL_FROM").unwrap_or_else(|| DEFAULT_EMAIL_FROM.to_string()),
            }),
            (None, None) => None,
            _ => {
                tracing::warn!("Email relay partially configured, email channel disabled");
                None
            }
        };

        let sms = match (
            get("TWILIO_ACCOUNT_SID"),
            get("TWILIO_AUTH_TOKEN"),
            get("TWILIO_PHONE_NUMBER"),
        ) {
            (Some(account_sid), Some(auth_token), Some(from_number)) => Some(SmsSettings {
                account_sid,
                auth_token,
                from_number,
            }),
            (None, None, None) => None,
            _ => {
                tracing::warn!("Twilio partially configured, SMS channel disabled");
                None
            }
        };

        Ok(Self {
            db_path,
            catalog_path,
            egfr_test_name,
            egfr: EgfrParams { ethnicity_factor },
            email,
            sms,
        })
    }
}

fn parse_factor(key: &'static str, raw: &str) -> Result<f64, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidValue {
        key,
        value: raw.to_string(),
        reason: reason.to_string(),
    };
    let value: f64 = raw.parse().map_err(|_| invalid("not a number"))?;
    if !value.is_finite() || value <= 0.0 {
        return Err(invalid("must be a positive number"));
    }
    Ok(value)
}
