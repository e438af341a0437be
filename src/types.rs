//! Shared types for the sweep pipeline.
//!
//! Every value here except `AccessToken` is produced by one exchange and
//! consumed by the next; nothing is cached across steps.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::fmt;

// ---------------------------------------------------------------------------
// Session material
// ---------------------------------------------------------------------------

/// CSRF cookie/token pair scoped to one page context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfMaterial {
    pub cookie: String,
    pub token: String,
}

/// Opaque secret identifying a pending MFA challenge. Not the code itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpChallenge {
    pub secret: String,
}

/// Bearer credential for the authenticated account.
///
/// The `Debug` impl of the inner `SecretString` is redacted; use
/// [`AccessToken::fingerprint`] whenever the token needs to appear in logs.
#[derive(Clone)]
pub struct AccessToken(SecretString);

impl AccessToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretString::new(value.into()))
    }

    /// Raw token value, for placing on the wire only.
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    /// First four characters followed by an ellipsis.
    pub fn fingerprint(&self) -> String {
        let prefix: String = self.expose().chars().take(4).collect();
        format!("{prefix}…")
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccessToken({})", self.fingerprint())
    }
}

// ---------------------------------------------------------------------------
// Money
// ---------------------------------------------------------------------------

/// Account balance, always carried at exactly two decimal places.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Balance(Decimal);

impl Balance {
    /// Build from a decimal dollar amount. Rejects sub-cent precision.
    pub fn from_decimal(amount: Decimal) -> Option<Self> {
        let normalized = amount.normalize();
        if normalized.scale() > 2 {
            return None;
        }
        let mut value = normalized;
        value.rescale(2);
        Some(Self(value))
    }

    /// Build from integer minor units (cents).
    pub fn from_minor_units(cents: i64) -> Self {
        Self(Decimal::new(cents, 2))
    }

    pub fn amount(&self) -> Decimal {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${:.2}", self.0)
    }
}

/// Convert a decimal dollar amount to integer minor units.
///
/// Fails on non-positive amounts and on anything finer than one cent:
/// rounding to the cent with banker's rounding must leave the amount
/// unchanged.
pub fn to_minor_units(amount: Decimal) -> Result<i64> {
    if amount <= Decimal::ZERO {
        return Err(Error::InvalidAmount(format!(
            "transfer amount must be positive, got {amount}"
        )));
    }
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven);
    if rounded != amount {
        return Err(Error::InvalidAmount(format!(
            "amount {amount} has sub-cent precision"
        )));
    }
    rounded
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|cents| cents.to_i64())
        .ok_or_else(|| Error::InvalidAmount(format!("amount {amount} out of range")))
}

// ---------------------------------------------------------------------------
// Payout
// ---------------------------------------------------------------------------

/// Linked external account flagged as the primary balance-transfer target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayoutInstrument {
    pub id: String,
}

/// Body of the transfer POST.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    #[serde(rename = "fundingInstrumentId")]
    pub instrument_id: String,
    #[serde(rename = "amount")]
    pub amount_minor_units: i64,
    #[serde(rename = "type")]
    pub kind: TransferKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferKind {
    Standard,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Coarse failure classes. Every one of them is fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    UnexpectedStatus,
    Extraction,
    UnexpectedResponseShape,
    BusinessInvariantViolation,
}

/// A required piece of a response was absent or malformed.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("Failed to parse embedded page data: {0}")]
    Parse(String),

    #[error("Expected a 200 page, got {0}")]
    UnexpectedStatus(u16),

    #[error("Response is missing cookie `{0}`")]
    MissingCookie(String),

    #[error("Response is missing field `{0}`")]
    MissingField(String),

    #[error("Challenge response carries no OTP secret in header or body")]
    MissingOtpSecret,

    #[error("Unrecognized balance representation: {0}")]
    UnrecognizedBalance(String),
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Transport failure during {step}: {source}")]
    Transport {
        step: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("Unexpected status during {step}: expected {expected}, got {actual}")]
    UnexpectedStatus {
        step: &'static str,
        expected: u16,
        actual: u16,
        body: String,
    },

    #[error("Extraction failed during {step}: {source}")]
    Extraction {
        step: &'static str,
        #[source]
        source: ExtractionError,
        body: String,
    },

    #[error("Unexpected login response (status {status})")]
    UnexpectedLoginResponse { status: u16, body: String },

    #[error("MFA confirmation returned 200 without an access token cookie")]
    MissingAccessToken { body: String },

    #[error("Expected exactly one personal account, found {found}")]
    NoPersonalAccount { found: usize, body: String },

    #[error("Expected exactly one primary payout instrument, found {found}")]
    NoPrimaryInstrument { found: usize, body: String },

    #[error("Invalid transfer amount: {0}")]
    InvalidAmount(String),

    #[error("Authenticator cannot {action} from state {state}")]
    InvalidTransition {
        action: &'static str,
        state: &'static str,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Transport { .. } => ErrorKind::Transport,
            Error::UnexpectedStatus { .. }
            | Error::Extraction {
                source: ExtractionError::UnexpectedStatus(_),
                ..
            } => ErrorKind::UnexpectedStatus,
            Error::Extraction { .. } | Error::MissingAccessToken { .. } => ErrorKind::Extraction,
            Error::UnexpectedLoginResponse { .. } | Error::InvalidTransition { .. } => {
                ErrorKind::UnexpectedResponseShape
            }
            Error::NoPersonalAccount { .. }
            | Error::NoPrimaryInstrument { .. }
            | Error::InvalidAmount(_)
            | Error::Config(_) => ErrorKind::BusinessInvariantViolation,
        }
    }

    /// Raw body of the response at the failing step, when one was received.
    pub fn response_body(&self) -> Option<&str> {
        match self {
            Error::UnexpectedStatus { body, .. }
            | Error::Extraction { body, .. }
            | Error::UnexpectedLoginResponse { body, .. }
            | Error::MissingAccessToken { body }
            | Error::NoPersonalAccount { body, .. }
            | Error::NoPrimaryInstrument { body, .. } => Some(body),
            _ => None,
        }
    }

    /// The extraction failure underneath, if this is one.
    pub fn extraction(&self) -> Option<&ExtractionError> {
        match self {
            Error::Extraction { source, .. } => Some(source),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
