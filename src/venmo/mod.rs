//! Venmo web client.
//!
//! Drives the undocumented web endpoints the account UI itself uses:
//! - `auth`: login and MFA confirmation, producing an access token
//! - `account`: balance and primary payout instrument
//! - `transfer`: moving the balance to the payout instrument
//!
//! Every exchange goes through [`VenmoClient::exchange`], which decorates
//! the request from the session, reads the full response, and folds any
//! new cookies back into the session. Requests are strictly sequential;
//! each step needs the previous one's tokens.

pub mod account;
pub mod auth;
pub mod transfer;

use reqwest::{Client, Method, Url};
use serde::Serialize;
use tracing::debug;

use crate::config::{ApiVariant, AppConfig, Endpoints};
use crate::session::{CapturedResponse, SessionContext};
use crate::types::{AccessToken, CsrfMaterial, Error, ExtractionError, Result};

// ---------------------------------------------------------------------------
// Wire names
// ---------------------------------------------------------------------------

pub const ACCESS_TOKEN_COOKIE: &str = "api_access_token";
pub const CSRF_COOKIE: &str = crate::extract::CSRF_COOKIE;
pub const CSRF_TOKEN_HEADER: &str = "csrf-token";
pub const XSRF_TOKEN_HEADER: &str = "xsrf-token";
pub const OTP_SECRET_HEADER: &str = "venmo-otp-secret";

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Which host a path is served from.
#[derive(Debug, Clone, Copy)]
enum Host {
    Web,
    Account,
}

/// One outgoing request: target, extra cookies, extra headers.
struct Exchange<'a> {
    step: &'static str,
    method: Method,
    url: Url,
    cookies: Vec<(&'a str, &'a str)>,
    headers: Vec<(&'static str, &'a str)>,
    query: Vec<(&'static str, &'a str)>,
}

impl<'a> Exchange<'a> {
    fn new(step: &'static str, method: Method, url: Url) -> Self {
        Self {
            step,
            method,
            url,
            cookies: Vec::new(),
            headers: Vec::new(),
            query: Vec::new(),
        }
    }

    fn cookie(mut self, name: &'a str, value: &'a str) -> Self {
        self.cookies.push((name, value));
        self
    }

    fn header(mut self, name: &'static str, value: &'a str) -> Self {
        self.headers.push((name, value));
        self
    }

    fn query(mut self, name: &'static str, value: &'a str) -> Self {
        self.query.push((name, value));
        self
    }

    fn access_token(self, token: &'a AccessToken) -> Self {
        self.cookie(ACCESS_TOKEN_COOKIE, token.expose())
    }

    /// CSRF cookie plus the `csrf-token` header.
    fn csrf(self, csrf: &'a CsrfMaterial) -> Self {
        self.cookie(CSRF_COOKIE, &csrf.cookie)
            .header(CSRF_TOKEN_HEADER, &csrf.token)
    }
}

/// Venmo web client bound to one session.
pub struct VenmoClient {
    http: Client,
    session: SessionContext,
    endpoints: Endpoints,
    variant: ApiVariant,
}

impl VenmoClient {
    /// Create a client with a fresh session.
    pub fn new(config: &AppConfig) -> Result<Self> {
        Self::with_session(config, SessionContext::new())
    }

    /// Create a client around an existing session (fixed device id in tests).
    pub fn with_session(config: &AppConfig, session: SessionContext) -> Result<Self> {
        let http = Client::builder()
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {e}")))?;

        // Validate bases up front so per-request joins cannot fail on them.
        for base in [&config.endpoints.web_base, &config.endpoints.account_base] {
            Url::parse(base).map_err(|e| Error::Config(format!("Invalid base URL {base}: {e}")))?;
        }

        Ok(Self {
            http,
            session,
            endpoints: config.endpoints.clone(),
            variant: config.variant.clone(),
        })
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    fn url(&self, host: Host, path: &str) -> Result<Url> {
        let base = match host {
            Host::Web => &self.endpoints.web_base,
            Host::Account => &self.endpoints.account_base,
        };
        let joined = format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'));
        Url::parse(&joined).map_err(|e| Error::Config(format!("Invalid endpoint URL {joined}: {e}")))
    }

    /// Send one request and read the whole response.
    async fn exchange<B: Serialize + ?Sized>(
        &mut self,
        req: Exchange<'_>,
        json: Option<&B>,
    ) -> Result<CapturedResponse> {
        let step = req.step;
        debug!(step, method = %req.method, url = %req.url, "Request");

        let mut builder = self.http.request(req.method.clone(), req.url.clone());
        builder = self.session.attach(builder, &req.url, &req.cookies);
        for (name, value) in &req.headers {
            builder = builder.header(*name, *value);
        }
        if !req.query.is_empty() {
            builder = builder.query(&req.query);
        }
        if let Some(body) = json {
            builder = builder.json(body);
        }

        let resp = builder
            .send()
            .await
            .map_err(|source| Error::Transport { step, source })?;
        let captured = CapturedResponse::read(resp)
            .await
            .map_err(|source| Error::Transport { step, source })?;

        debug!(step, status = captured.status.as_u16(), "Response");
        self.session.observe(&req.url, &captured);
        Ok(captured)
    }

    async fn get(&mut self, req: Exchange<'_>) -> Result<CapturedResponse> {
        self.exchange::<()>(req, None).await
    }

    async fn post_json<B: Serialize + ?Sized>(
        &mut self,
        req: Exchange<'_>,
        body: &B,
    ) -> Result<CapturedResponse> {
        self.exchange(req, Some(body)).await
    }

    /// GET a page and pull its CSRF pair.
    async fn fetch_csrf(&mut self, req: Exchange<'_>) -> Result<CsrfMaterial> {
        let step = req.step;
        let resp = self.get(req).await?;
        expect_status(step, &resp, 200)?;
        crate::extract::extract_csrf(&resp).map_err(|e| extraction(step, e, &resp))
    }

    /// GET a page and return its embedded document alongside the response.
    async fn fetch_embedded(
        &mut self,
        req: Exchange<'_>,
    ) -> Result<(serde_json::Value, CapturedResponse)> {
        let step = req.step;
        let resp = self.get(req).await?;
        expect_status(step, &resp, 200)?;
        let document = crate::extract::extract_embedded_json(&resp.body)
            .map_err(|e| extraction(step, e, &resp))?;
        Ok((document, resp))
    }
}

/// Fail unless `resp` carries exactly `expected`.
fn expect_status(step: &'static str, resp: &CapturedResponse, expected: u16) -> Result<()> {
    let actual = resp.status.as_u16();
    if actual == expected {
        Ok(())
    } else {
        Err(Error::UnexpectedStatus {
            step,
            expected,
            actual,
            body: resp.body.clone(),
        })
    }
}

fn extraction(step: &'static str, source: ExtractionError, resp: &CapturedResponse) -> Error {
    Error::Extraction {
        step,
        source,
        body: resp.body.clone(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
