mod features;

pub use features::{EnvFeatureToggles, FeatureToggleSource, FeatureToggles};

use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }

    pub fn is_production(self) -> bool {
        self == Self::Production
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub phone_validation: PhoneValidationSettings,
    pub deposits: DepositSettings,
    pub identification: IdentificationConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let defaults = PhoneValidationSettings::default();
        let phone_validation = PhoneValidationSettings {
            max_validation_attempts: parse_var(
                "MAX_PHONE_VALIDATION_ATTEMPTS",
                defaults.max_validation_attempts,
            )?,
            validation_attempts_ttl: Duration::from_secs(parse_var(
                "PHONE_VALIDATION_ATTEMPTS_TTL_SECONDS",
                defaults.validation_attempts_ttl.as_secs(),
            )?),
            max_sms_sent: parse_var("MAX_SMS_SENT_FOR_PHONE_VALIDATION", defaults.max_sms_sent)?,
            sms_sending_ttl: Duration::from_secs(parse_var(
                "SMS_SENDING_TTL_SECONDS",
                defaults.sms_sending_ttl.as_secs(),
            )?),
            code_lifetime_minutes: parse_var(
                "PHONE_VALIDATION_CODE_LIFETIME_MINUTES",
                defaults.code_lifetime_minutes,
            )?,
            blacklisted_numbers: env::var("BLACKLISTED_SMS_RECIPIENTS")
                .map(|raw| split_list(&raw))
                .unwrap_or_default(),
            whitelisted_country_codes: defaults.whitelisted_country_codes,
        };

        let deposit_defaults = DepositSettings::default();
        let deposits = DepositSettings {
            age18_amount: parse_var("DEPOSIT_AMOUNT_AGE18", deposit_defaults.age18_amount)?,
            underage_amount: parse_var(
                "DEPOSIT_AMOUNT_UNDERAGE",
                deposit_defaults.underage_amount,
            )?,
            validity_years: parse_var("DEPOSIT_VALIDITY_YEARS", deposit_defaults.validity_years)?,
        };

        let identification = IdentificationConfig {
            api_url: env::var("IDENTIFICATION_API_URL")
                .unwrap_or_else(|_| "https://api.ubble.ai".to_string()),
            client_id: env::var("IDENTIFICATION_CLIENT_ID").unwrap_or_default(),
            client_secret: env::var("IDENTIFICATION_CLIENT_SECRET").unwrap_or_default(),
            webhook_url: env::var("IDENTIFICATION_WEBHOOK_URL").unwrap_or_else(|_| {
                format!("http://{host}:{port}/webhooks/identification")
            }),
            request_timeout: Duration::from_secs(parse_var(
                "IDENTIFICATION_TIMEOUT_SECONDS",
                30,
            )?),
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            phone_validation,
            deposits,
            identification,
        })
    }
}

fn parse_var<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { key }),
        _ => Ok(default),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Rate limits and allow/deny lists applied to phone number validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneValidationSettings {
    pub max_validation_attempts: u32,
    pub validation_attempts_ttl: Duration,
    pub max_sms_sent: u32,
    pub sms_sending_ttl: Duration,
    pub code_lifetime_minutes: i64,
    pub blacklisted_numbers: Vec<String>,
    pub whitelisted_country_codes: Vec<u16>,
}

impl Default for PhoneValidationSettings {
    fn default() -> Self {
        Self {
            max_validation_attempts: 3,
            validation_attempts_ttl: Duration::from_secs(24 * 60 * 60),
            max_sms_sent: 3,
            sms_sending_ttl: Duration::from_secs(24 * 60 * 60),
            code_lifetime_minutes: 10,
            blacklisted_numbers: Vec::new(),
            // Metropolitan France and overseas departments/territories.
            whitelisted_country_codes: vec![33, 262, 269, 590, 594, 596, 687, 689],
        }
    }
}

/// Amounts (in euros) and lifetime of the credit granted on activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepositSettings {
    pub age18_amount: u32,
    pub underage_amount: u32,
    pub validity_years: u32,
}

impl Default for DepositSettings {
    fn default() -> Self {
        Self {
            age18_amount: 300,
            underage_amount: 30,
            validity_years: 2,
        }
    }
}

/// Remote identity verification vendor credentials and endpoints.
#[derive(Clone)]
pub struct IdentificationConfig {
    pub api_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub webhook_url: String,
    pub request_timeout: Duration,
}

impl fmt::Debug for IdentificationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentificationConfig")
            .field("api_url", &self.api_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("webhook_url", &self.webhook_url)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { key: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { key } => write!(f, "{key} must be a valid number"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidNumber { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}

#[cfg(test)]
pub(crate) fn env_guard() -> &'static std::sync::Mutex<()> {
    use std::sync::{Mutex, OnceLock};

    static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
    GUARD.get_or_init(|| Mutex::new(()))
}
