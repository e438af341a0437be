//! Configuration loading.
//!
//! Two sources:
//! - an optional TOML file describing the remote deployment (endpoint
//!   paths and response-shape variant), defaulting to the current
//!   production shape when the file or any field is absent;
//! - environment variables holding the credentials, resolved at runtime.

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::types::AccessToken;

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "venmo.toml";

pub const ENV_ACCESS_TOKEN: &str = "VENMO_ACCESS_TOKEN";
pub const ENV_USERNAME: &str = "VENMO_USERNAME";
pub const ENV_PASSWORD: &str = "VENMO_PASSWORD";
pub const ENV_BANK_ACCOUNT_NUMBER: &str = "VENMO_BANK_ACCOUNT_NUMBER";
pub const ENV_WEBHOOK_URL: &str = "WEBHOOK_URL";

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub endpoints: Endpoints,
    #[serde(default)]
    pub variant: ApiVariant,
}

/// Every remote URL the pipeline touches.
///
/// Paths are joined onto one of two bases: the public web host serving the
/// sign-in page and login API, and the account host serving everything
/// after login.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Endpoints {
    pub web_base: String,
    pub account_base: String,
    pub sign_in_page: String,
    pub login: String,
    pub mfa_verify_page: String,
    pub mfa_sign_in: String,
    pub home_page: String,
    pub identities: String,
    pub cashout_page: String,
    pub payment_methods: String,
    pub transfer: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            web_base: "https://venmo.com".into(),
            account_base: "https://account.venmo.com".into(),
            sign_in_page: "/account/sign-in".into(),
            login: "/api/login".into(),
            mfa_verify_page: "/account/mfa/verify-bank".into(),
            mfa_sign_in: "/api/account/mfa/sign-in".into(),
            home_page: "/".into(),
            identities: "/api/user/identities".into(),
            cashout_page: "/cashout".into(),
            payment_methods: "/api/payment-methods".into(),
            transfer: "/api/transfer".into(),
        }
    }
}

impl Endpoints {
    /// Point both hosts at one base URL (mock servers).
    pub fn with_base(base: &str) -> Self {
        Self {
            web_base: base.to_string(),
            account_base: base.to_string(),
            ..Self::default()
        }
    }
}

/// Where the balance lives in the current deployment.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BalanceSource {
    /// Embedded page state of the account home page.
    #[default]
    ProfilePage,
    /// JSON list of identities; the personal one carries the balance.
    Identities,
}

/// Where the linked payout instruments are listed.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentSource {
    /// Embedded page state of the cashout page.
    #[default]
    CashoutPage,
    /// JSON API guarded by the cashout page's CSRF pair.
    PaymentMethodsApi,
}

/// Response-shape knobs that have moved between deployments.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ApiVariant {
    /// Status code of the "additional authentication required" login reply.
    pub challenge_status: u16,
    /// Exact message identifying the MFA challenge.
    pub challenge_message: String,
    /// Whether MFA confirmation posts the bank account number.
    pub mfa_requires_bank_account: bool,
    pub balance_source: BalanceSource,
    pub instrument_source: InstrumentSource,
}

impl Default for ApiVariant {
    fn default() -> Self {
        Self {
            challenge_status: 400,
            challenge_message: "Additional authentication is required".into(),
            mfa_requires_bank_account: true,
            balance_source: BalanceSource::default(),
            instrument_source: InstrumentSource::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Load `path` when it exists, defaults otherwise.
    pub fn load_or_default(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}

/// How the run obtains its access token.
pub enum Credentials {
    /// Token supplied externally; login is skipped and the token is not
    /// validated until first use.
    Token(AccessToken),
    Password {
        username: String,
        password: SecretString,
        bank_account_number: Option<SecretString>,
    },
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Token(token) => f.debug_tuple("Token").field(token).finish(),
            Credentials::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .finish_non_exhaustive(),
        }
    }
}

impl Credentials {
    /// Read credentials from the environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve credentials through `lookup`. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(token) = get(ENV_ACCESS_TOKEN) {
            return Ok(Credentials::Token(AccessToken::new(token)));
        }
        let username = get(ENV_USERNAME)
            .with_context(|| format!("Neither {ENV_ACCESS_TOKEN} nor {ENV_USERNAME} is set"))?;
        let password = get(ENV_PASSWORD)
            .with_context(|| format!("Environment variable not set: {ENV_PASSWORD}"))?;
        Ok(Credentials::Password {
            username,
            password: SecretString::new(password),
            bank_account_number: get(ENV_BANK_ACCOUNT_NUMBER).map(SecretString::new),
        })
    }
}

/// Optional webhook pinged after the transfer step.
pub fn webhook_url_from_env() -> Option<String> {
    std::env::var(ENV_WEBHOOK_URL).ok().filter(|v| !v.is_empty())
}
