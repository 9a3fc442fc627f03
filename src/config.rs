use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::utils::init_gate::InitPolicy;

const DEFAULT_COUNTDOWN_TARGET: &str = "2025-12-31T23:59:59+09:00";
const DEFAULT_CONTACT_PHONE: &str = "1588-0000";
const DEFAULT_CONTACT_EMAIL: &str = "contact@carbonyx.co.kr";
const DEFAULT_STAGING_PATH: &str = "pending_registrations.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            _ => Err(ConfigError::Invalid {
                var: "ENVIRONMENT",
                value: value.to_string(),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }

    pub fn settings(&self) -> EnvironmentSettings {
        match self {
            Environment::Development => EnvironmentSettings {
                debug: true,
                timeout: Duration::from_millis(10_000),
                log_level: "debug",
            },
            Environment::Production => EnvironmentSettings {
                debug: false,
                timeout: Duration::from_millis(5_000),
                log_level: "error",
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvironmentSettings {
    pub debug: bool,
    pub timeout: Duration,
    pub log_level: &'static str,
}

/// Settings for reaching the hosted database. Built once at startup and
/// handed to the init gate; nothing mutates it afterwards.
#[derive(Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub endpoint_url: String,
    pub credential: String,
    pub environment: Environment,
    pub debug: bool,
    pub timeout: Duration,
    pub log_level: String,
}

impl RuntimeConfig {
    pub fn new(endpoint_url: impl Into<String>, credential: impl Into<String>, environment: Environment) -> Self {
        let settings = environment.settings();
        Self {
            endpoint_url: endpoint_url.into(),
            credential: credential.into(),
            environment,
            debug: settings.debug,
            timeout: settings.timeout,
            log_level: settings.log_level.to_string(),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let endpoint_url = required_var("SUPABASE_URL")?;
        let credential = required_var("SUPABASE_ANON_KEY")?;
        let environment = match std::env::var("ENVIRONMENT") {
            Ok(value) => Environment::parse(&value)?,
            Err(_) => Environment::Development,
        };
        Ok(Self::new(endpoint_url, credential, environment))
    }

    /// Default tracing filter when RUST_LOG is not set. Debug mode keeps
    /// dependencies at info and applies the level to this crate only.
    pub fn log_filter(&self) -> String {
        if self.debug {
            format!("info,carbonyx={}", self.log_level)
        } else {
            self.log_level.clone()
        }
    }
}

// the anon key is public-ish but still shouldn't end up in logs
impl fmt::Debug for RuntimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeConfig")
            .field("endpoint_url", &self.endpoint_url)
            .field("credential_present", &!self.credential.is_empty())
            .field("environment", &self.environment)
            .field("debug", &self.debug)
            .field("timeout", &self.timeout)
            .field("log_level", &self.log_level)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContactInfo {
    pub phone: String,
    pub email: String,
}

impl Default for ContactInfo {
    fn default() -> Self {
        Self {
            phone: DEFAULT_CONTACT_PHONE.to_string(),
            email: DEFAULT_CONTACT_EMAIL.to_string(),
        }
    }
}

/// Everything the HTTP server needs besides the database settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub frontend_url: String,
    pub admin_token: Option<String>,
    pub staging_path: PathBuf,
    pub countdown_target: DateTime<FixedOffset>,
    pub contact: ContactInfo,
    pub init_policy: InitPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            frontend_url: "http://localhost:8080".to_string(),
            admin_token: None,
            staging_path: PathBuf::from(DEFAULT_STAGING_PATH),
            countdown_target: default_countdown_target(),
            contact: ContactInfo::default(),
            init_policy: InitPolicy::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let port = parse_var("PORT", defaults.port)?;
        let countdown_target = match std::env::var("COUNTDOWN_TARGET") {
            Ok(value) => DateTime::parse_from_rfc3339(&value).map_err(|_| ConfigError::Invalid {
                var: "COUNTDOWN_TARGET",
                value,
            })?,
            Err(_) => defaults.countdown_target,
        };
        let delay_unit_ms = parse_var("INIT_DELAY_UNIT_MS", defaults.init_policy.delay_unit.as_millis() as u64)?;
        let max_attempts = parse_var("INIT_MAX_ATTEMPTS", defaults.init_policy.max_attempts)?;
        if max_attempts == 0 {
            return Err(ConfigError::Invalid {
                var: "INIT_MAX_ATTEMPTS",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            port,
            frontend_url: std::env::var("FRONTEND_URL").unwrap_or(defaults.frontend_url),
            admin_token: std::env::var("ADMIN_TOKEN").ok().filter(|t| !t.is_empty()),
            staging_path: std::env::var("STAGING_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.staging_path),
            countdown_target,
            contact: ContactInfo {
                phone: std::env::var("CONTACT_PHONE").unwrap_or(defaults.contact.phone),
                email: std::env::var("CONTACT_EMAIL").unwrap_or(defaults.contact.email),
            },
            init_policy: InitPolicy {
                delay_unit: Duration::from_millis(delay_unit_ms),
                max_attempts,
            },
        })
    }
}

fn default_countdown_target() -> DateTime<FixedOffset> {
    // constant, parse cannot fail
    DateTime::parse_from_rfc3339(DEFAULT_COUNTDOWN_TARGET).unwrap_or_else(|_| DateTime::UNIX_EPOCH.fixed_offset())
}

fn required_var(var: &'static str) -> Result<String, ConfigError> {
    std::env::var(var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(var))
}

fn parse_var<T: std::str::FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
        Err(_) => Ok(default),
    }
}
