//! Configuration management for the repayment engine
//!
//! Configuration is read once from the environment at startup and handed to
//! services by reference. Nothing here is mutated after `Config::from_env`.

use std::env;
use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use thiserror::Error;

use crate::allocation::AllocationStrategy;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid environment value: {0}")]
    InvalidValue(String),

    #[error("Invalid port number: {0}")]
    InvalidPort(String),
}

/// Application environment
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    /// Parse environment from string
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "prod" | "production" => Ok(Environment::Production),
            _ => Err(ConfigError::InvalidValue(format!(
                "Invalid environment: '{}'. Expected: dev, staging, or prod",
                s
            ))),
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

/// What to do with the part of a payment the schedule cannot absorb
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverpaymentPolicy {
    /// Manual entries and approvals that exceed the remaining due are refused.
    #[default]
    Reject,
    /// The excess is kept on the repayment as `unallocated`.
    Record,
}

impl OverpaymentPolicy {
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s.to_lowercase().as_str() {
            "reject" => Ok(OverpaymentPolicy::Reject),
            "record" => Ok(OverpaymentPolicy::Record),
            other => Err(ConfigError::InvalidValue(format!(
                "Invalid overpayment policy: '{}'. Expected: reject or record",
                other
            ))),
        }
    }
}

/// Knobs of the allocation engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Strategy used when a request does not name one
    pub default_strategy: AllocationStrategy,

    pub overpayment_policy: OverpaymentPolicy,

    /// A schedule line counts as paid once `paid >= total - settle_epsilon`
    pub settle_epsilon: Decimal,

    /// Derive category remainders for schedule rows that only carry `total`
    pub legacy_schedule_fallback: bool,

    /// Mirror approved repayments into the borrower's savings ledger
    pub mirror_to_savings: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_strategy: AllocationStrategy::OldestDueFirst,
            overpayment_policy: OverpaymentPolicy::Reject,
            settle_epsilon: dec!(0.005),
            legacy_schedule_fallback: false,
            mirror_to_savings: true,
        }
    }
}

/// Shared secrets and defaults of the payment gateways
#[derive(Debug, Clone, Default)]
pub struct GatewayConfig {
    pub mobile_secret: Option<String>,
    pub bank_secret: Option<String>,

    /// Mobile-money callbacks do not carry a currency
    pub mobile_currency: String,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Current environment
    pub environment: Environment,

    /// Server port
    pub port: u16,

    /// Maximum database connections
    pub db_max_connections: u32,

    /// Longest a statement waits for a row lock before failing
    pub db_lock_timeout_ms: u64,

    /// CORS allowed origins
    pub cors_allowed_origins: Option<String>,

    /// Log level (RUST_LOG)
    pub log_level: String,

    /// JWT secret for token verification
    pub jwt_secret: String,

    pub engine: EngineConfig,

    pub gateways: GatewayConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors)
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .map(|s| Environment::parse(&s))
            .unwrap_or(Ok(Environment::Development))?;

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?;

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3001".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort("PORT must be a valid number".to_string()))?;

        let db_max_connections = env::var("DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "5".to_string())
            .parse::<u32>()
            .unwrap_or(5);

        let db_lock_timeout_ms = env::var("DB_LOCK_TIMEOUT_MS")
            .unwrap_or_else(|_| "5000".to_string())
            .parse::<u64>()
            .map_err(|_| {
                ConfigError::InvalidValue("DB_LOCK_TIMEOUT_MS must be a number".to_string())
            })?;

        let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS").ok();

        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let jwt_secret = match env::var("JWT_SECRET") {
            Ok(secret) => secret,
            Err(_) if environment.is_production() => {
                return Err(ConfigError::MissingEnvVar("JWT_SECRET".to_string()))
            }
            Err(_) => "development-secret-change-in-production".to_string(),
        };

        let engine = EngineConfig {
            default_strategy: match env::var("DEFAULT_ALLOCATION_STRATEGY") {
                Ok(s) => AllocationStrategy::from_str(&s)
                    .map_err(|e| ConfigError::InvalidValue(e.to_string()))?,
                Err(_) => AllocationStrategy::OldestDueFirst,
            },
            overpayment_policy: match env::var("OVERPAYMENT_POLICY") {
                Ok(s) => OverpaymentPolicy::parse(&s)?,
                Err(_) => OverpaymentPolicy::Reject,
            },
            settle_epsilon: match env::var("SETTLE_EPSILON") {
                Ok(s) => Decimal::from_str(&s).map_err(|_| {
                    ConfigError::InvalidValue(format!("SETTLE_EPSILON must be a decimal: {}", s))
                })?,
                Err(_) => dec!(0.005),
            },
            legacy_schedule_fallback: parse_flag("LEGACY_SCHEDULE_FALLBACK", false),
            mirror_to_savings: parse_flag("MIRROR_REPAYMENTS_TO_SAVINGS", true),
        };

        let gateways = GatewayConfig {
            mobile_secret: env::var("MOBILE_GATEWAY_SECRET").ok(),
            bank_secret: env::var("BANK_GATEWAY_SECRET").ok(),
            mobile_currency: env::var("MOBILE_GATEWAY_CURRENCY")
                .unwrap_or_else(|_| "KES".to_string()),
        };

        Ok(Config {
            database_url,
            environment,
            port,
            db_max_connections,
            db_lock_timeout_ms,
            cors_allowed_origins,
            log_level,
            jwt_secret,
            engine,
            gateways,
        })
    }

    /// Get database URL with the password masked, for logging
    pub fn database_url_masked(&self) -> String {
        if let Some(at_pos) = self.database_url.find('@') {
            if let Some(colon_pos) = self.database_url[..at_pos].rfind(':') {
                let prefix = &self.database_url[..colon_pos + 1];
                let suffix = &self.database_url[at_pos..];
                return format!("{}****{}", prefix, suffix);
            }
        }
        self.database_url.clone()
    }
}

fn parse_flag(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(v) => matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}
