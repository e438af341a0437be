//! Token extraction.
//!
//! Pure functions over a [`CapturedResponse`]: no I/O, no session mutation.
//! Pages embed their state as a JSON document in a `<script>` tag; the
//! functions here pull that document out and walk it into typed structs so a
//! missing field surfaces as a named [`ExtractionError`].

use regex::Regex;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::sync::OnceLock;

use crate::session::CapturedResponse;
use crate::types::{Balance, CsrfMaterial, ExtractionError};

/// Id of the script tag holding the page's embedded state.
pub const EMBEDDED_SCRIPT_ID: &str = "__NEXT_DATA__";

/// Cookie paired with the page's CSRF token.
pub const CSRF_COOKIE: &str = "_csrf";

fn embedded_script_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let pattern = format!(
            r#"(?s)<script\b[^>]*\sid=["']{}["'][^>]*>(.*?)</script>"#,
            regex::escape(EMBEDDED_SCRIPT_ID)
        );
        Regex::new(&pattern).expect("embedded script pattern is valid")
    })
}

/// Parse the JSON document embedded in the page's state script tag.
pub fn extract_embedded_json(html: &str) -> Result<Value, ExtractionError> {
    let captures = embedded_script_pattern().captures(html).ok_or_else(|| {
        ExtractionError::Parse(format!("no <script id=\"{EMBEDDED_SCRIPT_ID}\"> tag"))
    })?;
    let text = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
    serde_json::from_str(text.trim())
        .map_err(|e| ExtractionError::Parse(format!("invalid JSON in script tag: {e}")))
}

/// Decode `props.pageProps` of an embedded document into `T`.
pub fn page_props<T: DeserializeOwned>(document: &Value) -> Result<T, ExtractionError> {
    let props = document
        .get("props")
        .ok_or_else(|| ExtractionError::MissingField("props".into()))?;
    let page_props = props
        .get("pageProps")
        .ok_or_else(|| ExtractionError::MissingField("props.pageProps".into()))?;
    T::deserialize(page_props)
        .map_err(|e| ExtractionError::Parse(format!("props.pageProps: {e}")))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CsrfPageProps {
    #[serde(default)]
    csrf_token: Option<String>,
}

/// Pull the CSRF cookie and token pair out of a 200 page response.
pub fn extract_csrf(resp: &CapturedResponse) -> Result<CsrfMaterial, ExtractionError> {
    if resp.status != StatusCode::OK {
        return Err(ExtractionError::UnexpectedStatus(resp.status.as_u16()));
    }
    let cookie = resp
        .cookie(CSRF_COOKIE)
        .ok_or_else(|| ExtractionError::MissingCookie(CSRF_COOKIE.into()))?
        .to_string();

    let document = extract_embedded_json(&resp.body)?;
    let props: CsrfPageProps = page_props(&document)?;
    let token = props
        .csrf_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ExtractionError::MissingField("props.pageProps.csrfToken".into()))?;

    Ok(CsrfMaterial { cookie, token })
}

/// Normalize a remote balance value.
///
/// A JSON string is a decimal dollar amount; a JSON integer is minor units.
/// Floats and anything else are rejected, as is sub-cent precision.
pub fn normalize_balance(raw: &Value) -> Result<Balance, ExtractionError> {
    match raw {
        Value::String(s) => {
            let amount = rust_decimal::Decimal::from_str_exact(s.trim())
                .map_err(|e| ExtractionError::UnrecognizedBalance(format!("{s:?}: {e}")))?;
            Balance::from_decimal(amount).ok_or_else(|| {
                ExtractionError::UnrecognizedBalance(format!("{s:?} has sub-cent precision"))
            })
        }
        Value::Number(n) => n
            .as_i64()
            .map(Balance::from_minor_units)
            .ok_or_else(|| ExtractionError::UnrecognizedBalance(format!("non-integer number {n}"))),
        other => Err(ExtractionError::UnrecognizedBalance(other.to_string())),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
