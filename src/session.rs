//! Per-run session state.
//!
//! One `SessionContext` is created at startup and threaded through every
//! exchange. It pins the device id and user agent, and keeps the cookies
//! each origin (host and port) has handed back so far. Origins are kept
//! apart because the sign-in and account subdomains run independent
//! sessions.

use reqwest::header::{HeaderMap, COOKIE, USER_AGENT};
use reqwest::{RequestBuilder, StatusCode, Url};
use std::collections::BTreeMap;
use tracing::debug;

/// Desktop browser user agent. The stock HTTP-library agent is blocked.
pub const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/101.0.0.0 Safari/537.36";

/// Prefix of every generated device id.
const DEVICE_ID_PREFIX: &str = "fp01-";

/// Cookie carrying the device id.
pub const DEVICE_COOKIE: &str = "v_id";

/// A fully read response: status, headers, cookies and body text.
///
/// Bodies are small HTML pages or JSON documents, so they are always read
/// eagerly; this keeps token extraction free of I/O.
#[derive(Debug, Clone)]
pub struct CapturedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub cookies: BTreeMap<String, String>,
    pub body: String,
}

impl CapturedResponse {
    /// Build a response by hand (fixtures and tests).
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status: StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            headers: HeaderMap::new(),
            cookies: BTreeMap::new(),
            body: body.into(),
        }
    }

    pub fn with_cookie(mut self, name: &str, value: &str) -> Self {
        self.cookies.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_header(mut self, name: &'static str, value: &str) -> Self {
        if let Ok(v) = value.parse() {
            self.headers.insert(name, v);
        }
        self
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Read a `reqwest` response to completion.
    pub async fn read(resp: reqwest::Response) -> reqwest::Result<Self> {
        let status = resp.status();
        let headers = resp.headers().clone();
        let cookies = resp
            .cookies()
            .map(|c| (c.name().to_string(), c.value().to_string()))
            .collect();
        let body = resp.text().await?;
        Ok(Self {
            status,
            headers,
            cookies,
            body,
        })
    }
}

#[derive(Debug, Clone)]
pub struct SessionContext {
    device_id: String,
    user_agent: &'static str,
    cookie_jar: BTreeMap<String, BTreeMap<String, String>>,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionContext {
    /// Fresh session with a newly generated device id.
    pub fn new() -> Self {
        Self::with_device_id(format!("{DEVICE_ID_PREFIX}{}", uuid::Uuid::new_v4()))
    }

    pub fn with_device_id(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            user_agent: DESKTOP_USER_AGENT,
            cookie_jar: BTreeMap::new(),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn user_agent(&self) -> &str {
        self.user_agent
    }

    /// Jar key for `url`: host plus effective port, so two servers on one
    /// host never see each other's cookies.
    fn origin_key(url: &Url) -> Option<String> {
        let host = url.host_str()?;
        Some(match url.port_or_known_default() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        })
    }

    /// Cookie header for a request to `url`.
    ///
    /// Order of precedence, lowest first: cookies the host has set, the
    /// device cookie, then the step's explicit cookies.
    pub fn cookie_header(&self, url: &Url, explicit: &[(&str, &str)]) -> String {
        let mut cookies: BTreeMap<&str, &str> = BTreeMap::new();
        if let Some(jar) = Self::origin_key(url).and_then(|key| self.cookie_jar.get(&key)) {
            for (name, value) in jar {
                cookies.insert(name, value);
            }
        }
        cookies.insert(DEVICE_COOKIE, &self.device_id);
        for (name, value) in explicit {
            cookies.insert(name, value);
        }
        cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Decorate an outgoing request with the user agent and cookies.
    pub fn attach(
        &self,
        builder: RequestBuilder,
        url: &Url,
        explicit: &[(&str, &str)],
    ) -> RequestBuilder {
        builder
            .header(USER_AGENT, self.user_agent)
            .header(COOKIE, self.cookie_header(url, explicit))
    }

    /// Merge the response's cookies into the jar for `url`'s origin.
    pub fn observe(&mut self, url: &Url, resp: &CapturedResponse) {
        let Some(origin) = Self::origin_key(url) else {
            return;
        };
        if resp.cookies.is_empty() {
            return;
        }
        debug!(origin = %origin, count = resp.cookies.len(), "Cookies updated");
        let jar = self.cookie_jar.entry(origin).or_default();
        for (name, value) in &resp.cookies {
            jar.insert(name.clone(), value.clone());
        }
    }

    /// Cookie the session currently holds for `url`'s origin.
    pub fn jar_cookie(&self, url: &Url, name: &str) -> Option<&str> {
        Self::origin_key(url)
            .and_then(|key| self.cookie_jar.get(&key))
            .and_then(|jar| jar.get(name))
            .map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
