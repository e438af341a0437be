//! Balance and payout-instrument lookup.

use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info};

use super::{expect_status, extraction, Exchange, Host, VenmoClient};
use crate::config::{BalanceSource, InstrumentSource};
use crate::extract::{normalize_balance, page_props};
use crate::session::CapturedResponse;
use crate::types::{AccessToken, Balance, Error, ExtractionError, PayoutInstrument, Result};

/// Identity type carrying the spendable balance.
const PERSONAL_IDENTITY: &str = "personal";

/// Role key and value marking the default withdrawal target.
const BALANCE_TRANSFER_ROLE: &str = "balanceTransfers";
const PRIMARY_ROLE: &str = "primary";

// ---------------------------------------------------------------------------
// Remote shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HomePageProps {
    #[serde(default)]
    initial_mobx_state: Option<MobxState>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MobxState {
    #[serde(default)]
    profile_store: Option<ProfileStore>,
}

#[derive(Debug, Deserialize)]
struct ProfileStore {
    #[serde(default)]
    balance: Option<Value>,
}

/// One entry of the identities listing.
#[derive(Debug, Deserialize)]
pub struct Identity {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub balance: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CashoutPageProps {
    #[serde(default)]
    standard_items: Option<Vec<InstrumentEntry>>,
}

/// One linked instrument, as listed by either the cashout page or the API.
///
/// The cashout page names the instrument in `value`, the API in `id`.
#[derive(Debug, Deserialize)]
pub struct InstrumentEntry {
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub roles: Option<HashMap<String, Value>>,
}

impl InstrumentEntry {
    fn instrument_id(&self) -> Option<&str> {
        self.value
            .as_deref()
            .or(self.id.as_deref())
            .filter(|id| !id.is_empty())
    }

    fn is_primary_for_transfers(&self) -> bool {
        self.roles
            .as_ref()
            .and_then(|roles| roles.get(BALANCE_TRANSFER_ROLE))
            .and_then(Value::as_str)
            == Some(PRIMARY_ROLE)
    }
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// The single personal identity's balance. Zero or several matches fail.
///
/// `resp` is the listing the identities were decoded from; its body is
/// carried by every error.
pub fn select_personal_balance(identities: &[Identity], resp: &CapturedResponse) -> Result<Balance> {
    const STEP: &str = "identities";
    let personal: Vec<&Identity> = identities
        .iter()
        .filter(|i| i.kind.as_deref() == Some(PERSONAL_IDENTITY))
        .collect();
    let [identity] = personal.as_slice() else {
        return Err(Error::NoPersonalAccount {
            found: personal.len(),
            body: resp.body.clone(),
        });
    };
    let raw = identity
        .balance
        .as_ref()
        .ok_or_else(|| ExtractionError::MissingField("identities[personal].balance".into()));
    raw.and_then(normalize_balance)
        .map_err(|source| extraction(STEP, source, resp))
}

/// The single instrument flagged primary for balance transfers.
pub fn select_primary_instrument(
    entries: &[InstrumentEntry],
    resp: &CapturedResponse,
) -> Result<PayoutInstrument> {
    let primary: Vec<&InstrumentEntry> = entries
        .iter()
        .filter(|e| e.is_primary_for_transfers())
        .collect();
    let [entry] = primary.as_slice() else {
        return Err(Error::NoPrimaryInstrument {
            found: primary.len(),
            body: resp.body.clone(),
        });
    };
    let id = entry
        .instrument_id()
        .map(str::to_string)
        .ok_or_else(|| {
            extraction(
                "payout instruments",
                ExtractionError::MissingField("instrument id".into()),
                resp,
            )
        })?;
    Ok(PayoutInstrument { id })
}

// ---------------------------------------------------------------------------
// Client operations
// ---------------------------------------------------------------------------

impl VenmoClient {
    /// Current account balance.
    pub async fn get_balance(&mut self, token: &AccessToken) -> Result<Balance> {
        let balance = match self.variant.balance_source {
            BalanceSource::ProfilePage => self.balance_from_profile_page(token).await?,
            BalanceSource::Identities => self.balance_from_identities(token).await?,
        };
        debug!(balance = %balance, "Balance read");
        Ok(balance)
    }

    async fn balance_from_profile_page(&mut self, token: &AccessToken) -> Result<Balance> {
        const STEP: &str = "home page";
        let url = self.url(Host::Account, &self.endpoints.home_page)?;
        let (document, resp) = self
            .fetch_embedded(Exchange::new(STEP, Method::GET, url).access_token(token))
            .await?;

        let to_error = |source| extraction(STEP, source, &resp);
        let props: HomePageProps = page_props(&document).map_err(to_error)?;
        let raw = props
            .initial_mobx_state
            .and_then(|s| s.profile_store)
            .and_then(|p| p.balance)
            .ok_or_else(|| {
                ExtractionError::MissingField(
                    "props.pageProps.initialMobxState.profileStore.balance".into(),
                )
            })
            .map_err(to_error)?;
        normalize_balance(&raw).map_err(to_error)
    }

    async fn balance_from_identities(&mut self, token: &AccessToken) -> Result<Balance> {
        const STEP: &str = "identities";
        let url = self.url(Host::Account, &self.endpoints.identities)?;
        let resp = self
            .get(Exchange::new(STEP, Method::GET, url).access_token(token))
            .await?;
        expect_status(STEP, &resp, 200)?;

        let identities: Vec<Identity> = serde_json::from_str(&resp.body).map_err(|e| {
            extraction(STEP, ExtractionError::Parse(format!("identities: {e}")), &resp)
        })?;
        select_personal_balance(&identities, &resp)
    }

    /// The linked instrument flagged as the primary balance-transfer target.
    pub async fn get_primary_payout_instrument(
        &mut self,
        token: &AccessToken,
    ) -> Result<PayoutInstrument> {
        let (entries, resp) = match self.variant.instrument_source {
            InstrumentSource::CashoutPage => self.instruments_from_cashout_page(token).await?,
            InstrumentSource::PaymentMethodsApi => self.instruments_from_api(token).await?,
        };
        let instrument = select_primary_instrument(&entries, &resp)?;
        info!(instrument_id = %instrument.id, "Primary payout instrument resolved");
        Ok(instrument)
    }

    async fn instruments_from_cashout_page(
        &mut self,
        token: &AccessToken,
    ) -> Result<(Vec<InstrumentEntry>, CapturedResponse)> {
        const STEP: &str = "cashout page";
        let url = self.url(Host::Account, &self.endpoints.cashout_page)?;
        let (document, resp) = self
            .fetch_embedded(Exchange::new(STEP, Method::GET, url).access_token(token))
            .await?;

        let to_error = |source| extraction(STEP, source, &resp);
        let props: CashoutPageProps = page_props(&document).map_err(to_error)?;
        let entries = props
            .standard_items
            .ok_or_else(|| ExtractionError::MissingField("props.pageProps.standardItems".into()))
            .map_err(to_error)?;
        Ok((entries, resp))
    }

    async fn instruments_from_api(
        &mut self,
        token: &AccessToken,
    ) -> Result<(Vec<InstrumentEntry>, CapturedResponse)> {
        const STEP: &str = "payment methods";
        let page = self.url(Host::Account, &self.endpoints.cashout_page)?;
        let csrf = self
            .fetch_csrf(Exchange::new("cashout page", Method::GET, page).access_token(token))
            .await?;

        let url = self.url(Host::Account, &self.endpoints.payment_methods)?;
        let resp = self
            .get(
                Exchange::new(STEP, Method::GET, url)
                    .access_token(token)
                    .csrf(&csrf),
            )
            .await?;
        expect_status(STEP, &resp, 200)?;
        let entries = serde_json::from_str(&resp.body).map_err(|e| {
            extraction(STEP, ExtractionError::Parse(format!("payment methods: {e}")), &resp)
        })?;
        Ok((entries, resp))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
