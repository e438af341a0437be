//! Login and MFA confirmation.
//!
//! A strictly forward state machine:
//!
//! ```text
//! Anonymous -> CredentialsSubmitted -> MfaChallenged -> Confirmed
//!      \                                   (any step) -> Failed
//!       `-> Confirmed   (login accepted without MFA)
//! ```
//!
//! No step is ever retried. Repeated attempts against the login flow trip
//! the remote anti-automation checks, so the first surprise ends the run.

use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use super::{
    expect_status, extraction, Exchange, Host, VenmoClient, ACCESS_TOKEN_COOKIE,
    OTP_SECRET_HEADER, XSRF_TOKEN_HEADER,
};
use crate::config::ApiVariant;
use crate::session::CapturedResponse;
use crate::types::{AccessToken, CsrfMaterial, Error, ExtractionError, OtpChallenge, Result};

/// Where the login exchange currently stands.
#[derive(Debug)]
pub enum AuthState {
    Anonymous,
    CredentialsSubmitted { otp: OtpChallenge },
    MfaChallenged { otp: OtpChallenge, csrf: CsrfMaterial },
    Confirmed(AccessToken),
    Failed,
}

impl AuthState {
    pub fn name(&self) -> &'static str {
        match self {
            AuthState::Anonymous => "Anonymous",
            AuthState::CredentialsSubmitted { .. } => "CredentialsSubmitted",
            AuthState::MfaChallenged { .. } => "MfaChallenged",
            AuthState::Confirmed(_) => "Confirmed",
            AuthState::Failed => "Failed",
        }
    }
}

/// How the login endpoint answered a credential submission.
#[derive(Debug)]
pub enum LoginOutcome {
    /// Accepted outright (account without MFA).
    Authenticated(AccessToken),
    /// Additional authentication required.
    Challenged(OtpChallenge),
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
    is_group: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MfaConfirmRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    account_number: Option<&'a str>,
}

/// Error reply from the login endpoint. Older deployments put the message
/// in `issue`, newer ones in `error.message`.
#[derive(Debug, Deserialize, Default)]
struct LoginReply {
    #[serde(default)]
    issue: Option<String>,
    #[serde(default)]
    error: Option<LoginReplyError>,
    #[serde(default)]
    secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginReplyError {
    #[serde(default)]
    message: Option<String>,
}

impl LoginReply {
    fn message(&self) -> Option<&str> {
        self.issue
            .as_deref()
            .or_else(|| self.error.as_ref().and_then(|e| e.message.as_deref()))
    }
}

// ---------------------------------------------------------------------------
// Response classification
// ---------------------------------------------------------------------------

/// Status returned when login succeeds without a challenge.
const LOGIN_ACCEPTED: u16 = 201;

/// Whether a login reply is the MFA challenge for this deployment.
///
/// Both the status and the exact message must match. Remote wording
/// changes are absorbed here and nowhere else.
pub fn is_mfa_challenge(status: u16, message: Option<&str>, variant: &ApiVariant) -> bool {
    status == variant.challenge_status && message == Some(variant.challenge_message.as_str())
}

/// Classify the login endpoint's reply.
pub fn classify_login_response(
    resp: &CapturedResponse,
    variant: &ApiVariant,
) -> Result<LoginOutcome> {
    let status = resp.status.as_u16();

    if status == LOGIN_ACCEPTED {
        return resp
            .cookie(ACCESS_TOKEN_COOKIE)
            .map(|t| LoginOutcome::Authenticated(AccessToken::new(t)))
            .ok_or_else(|| Error::MissingAccessToken {
                body: resp.body.clone(),
            });
    }

    let reply: LoginReply = serde_json::from_str(&resp.body).unwrap_or_default();
    if !is_mfa_challenge(status, reply.message(), variant) {
        return Err(Error::UnexpectedLoginResponse {
            status,
            body: resp.body.clone(),
        });
    }

    let secret = resp
        .header(OTP_SECRET_HEADER)
        .map(str::to_string)
        .or(reply.secret)
        .filter(|s| !s.is_empty())
        .ok_or(ExtractionError::MissingOtpSecret)
        .map_err(|e| extraction("login", e, resp))?;

    Ok(LoginOutcome::Challenged(OtpChallenge { secret }))
}

// ---------------------------------------------------------------------------
// Authenticator
// ---------------------------------------------------------------------------

/// Drives one login attempt to a terminal state.
pub struct Authenticator<'c> {
    client: &'c mut VenmoClient,
    username: &'c str,
    password: &'c SecretString,
    bank_account_number: Option<&'c SecretString>,
    state: AuthState,
}

impl<'c> Authenticator<'c> {
    pub fn new(
        client: &'c mut VenmoClient,
        username: &'c str,
        password: &'c SecretString,
        bank_account_number: Option<&'c SecretString>,
    ) -> Self {
        Self {
            client,
            username,
            password,
            bank_account_number,
            state: AuthState::Anonymous,
        }
    }

    pub fn state(&self) -> &AuthState {
        &self.state
    }

    /// Perform the next transition.
    ///
    /// On error the machine is left in `Failed`; advancing from a terminal
    /// state is itself an error.
    pub async fn advance(&mut self) -> Result<&AuthState> {
        let current = std::mem::replace(&mut self.state, AuthState::Failed);
        let next = match current {
            AuthState::Anonymous => self.submit_credentials().await,
            AuthState::CredentialsSubmitted { otp } => self.open_mfa_page(otp).await,
            AuthState::MfaChallenged { otp, csrf } => self.confirm_mfa(otp, csrf).await,
            terminal => {
                let state = terminal.name();
                self.state = terminal;
                return Err(Error::InvalidTransition {
                    action: "advance",
                    state,
                });
            }
        };

        match next {
            Ok(state) => {
                info!(state = state.name(), "Authentication step complete");
                self.state = state;
                Ok(&self.state)
            }
            Err(e) => {
                error!(error = %e, "Authentication failed");
                Err(e)
            }
        }
    }

    /// Advance until an access token is produced.
    pub async fn run(mut self) -> Result<AccessToken> {
        loop {
            if let AuthState::Confirmed(token) = self.advance().await? {
                return Ok(token.clone());
            }
        }
    }

    /// Anonymous -> CredentialsSubmitted (or straight to Confirmed).
    async fn submit_credentials(&mut self) -> Result<AuthState> {
        if self.client.variant.mfa_requires_bank_account && self.bank_account_number.is_none() {
            return Err(Error::Config(
                "this deployment confirms MFA with a bank account number, but none is configured"
                    .into(),
            ));
        }

        let page = self.client.url(Host::Web, &self.client.endpoints.sign_in_page)?;
        let csrf = self
            .client
            .fetch_csrf(Exchange::new("sign-in page", Method::GET, page))
            .await?;

        info!(username = %self.username, "Submitting credentials");
        let login = self.client.url(Host::Web, &self.client.endpoints.login)?;
        let body = LoginRequest {
            username: self.username,
            password: self.password.expose_secret(),
            is_group: "false",
        };
        let req = Exchange::new("login", Method::POST, login)
            .csrf(&csrf)
            .header(XSRF_TOKEN_HEADER, &csrf.token);
        let resp = self.client.post_json(req, &body).await?;

        match classify_login_response(&resp, &self.client.variant)? {
            LoginOutcome::Authenticated(token) => {
                info!("Login accepted without MFA");
                Ok(AuthState::Confirmed(token))
            }
            LoginOutcome::Challenged(otp) => {
                info!("Login requires additional authentication");
                Ok(AuthState::CredentialsSubmitted { otp })
            }
        }
    }

    /// CredentialsSubmitted -> MfaChallenged: mint the MFA step's CSRF pair.
    async fn open_mfa_page(&mut self, otp: OtpChallenge) -> Result<AuthState> {
        let page = self
            .client
            .url(Host::Account, &self.client.endpoints.mfa_verify_page)?;
        let req = Exchange::new("mfa verify page", Method::GET, page).query("k", &otp.secret);
        let csrf = self.client.fetch_csrf(req).await?;
        Ok(AuthState::MfaChallenged { otp, csrf })
    }

    /// MfaChallenged -> Confirmed.
    async fn confirm_mfa(&mut self, otp: OtpChallenge, csrf: CsrfMaterial) -> Result<AuthState> {
        let url = self
            .client
            .url(Host::Account, &self.client.endpoints.mfa_sign_in)?;
        let account_number = if self.client.variant.mfa_requires_bank_account {
            self.bank_account_number.map(|n| n.expose_secret().as_str())
        } else {
            None
        };
        let body = MfaConfirmRequest { account_number };
        let req = Exchange::new("mfa sign-in", Method::POST, url)
            .csrf(&csrf)
            .header(XSRF_TOKEN_HEADER, &csrf.token)
            .header(OTP_SECRET_HEADER, &otp.secret);
        let resp = self.client.post_json(req, &body).await?;

        expect_status("mfa sign-in", &resp, 200)?;
        let token = resp
            .cookie(ACCESS_TOKEN_COOKIE)
            .ok_or_else(|| Error::MissingAccessToken {
                body: resp.body.clone(),
            })?;
        Ok(AuthState::Confirmed(AccessToken::new(token)))
    }
}

impl VenmoClient {
    /// Log in with username and password, completing MFA when challenged.
    pub async fn login(
        &mut self,
        username: &str,
        password: &SecretString,
        bank_account_number: Option<&SecretString>,
    ) -> Result<AccessToken> {
        Authenticator::new(self, username, password, bank_account_number)
            .run()
            .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
