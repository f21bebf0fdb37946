//! Payment gateway ingestion
//!
//! Verifies webhook signatures and turns provider payloads into
//! [`GatewayPayment`]s for the repayment service.

mod normalize;
mod signature;

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::config::GatewayConfig;
use crate::repayment::RepaymentError;

pub use normalize::{normalize, GatewayPayment};
pub use signature::{sign, verify, SIGNATURE_HEADER};

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Unknown gateway provider: {0}")]
    UnknownProvider(String),

    #[error("Webhook secret not configured")]
    SecretNotConfigured,

    #[error("Missing signature header")]
    MissingSignature,

    #[error("Signature mismatch")]
    InvalidSignature,

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

impl From<GatewayError> for RepaymentError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::UnknownProvider(p) => RepaymentError::not_found("gateway", p),
            GatewayError::InvalidPayload(msg) => RepaymentError::Validation(msg),
            other => RepaymentError::Signature(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayProvider {
    Mobile,
    Bank,
}

impl GatewayProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayProvider::Mobile => "mobile",
            GatewayProvider::Bank => "bank",
        }
    }

    pub fn secret<'a>(&self, config: &'a GatewayConfig) -> Option<&'a str> {
        match self {
            GatewayProvider::Mobile => config.mobile_secret.as_deref(),
            GatewayProvider::Bank => config.bank_secret.as_deref(),
        }
    }
}

impl FromStr for GatewayProvider {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mobile" => Ok(GatewayProvider::Mobile),
            "bank" => Ok(GatewayProvider::Bank),
            other => Err(GatewayError::UnknownProvider(other.to_string())),
        }
    }
}

impl fmt::Display for GatewayProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verify and normalize one webhook delivery
pub fn parse_delivery(
    provider: GatewayProvider,
    config: &GatewayConfig,
    body: &[u8],
    signature: Option<&str>,
) -> Result<GatewayPayment, GatewayError> {
    verify(provider.secret(config), body, signature)?;
    normalize(provider, body, &config.mobile_currency)
}
