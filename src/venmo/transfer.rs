//! Balance transfer to a linked instrument.
//!
//! A transfer is binary: 201 is the only success signal. Anything else is
//! fatal and surfaces the response body.

use reqwest::Method;
use rust_decimal::Decimal;
use tracing::info;

use super::{expect_status, Exchange, Host, VenmoClient};
use crate::types::{to_minor_units, AccessToken, Result, TransferKind, TransferRequest};

/// Status of an accepted transfer.
const TRANSFER_CREATED: u16 = 201;

/// Build the transfer body for `amount` dollars.
pub fn build_transfer_request(instrument_id: &str, amount: Decimal) -> Result<TransferRequest> {
    Ok(TransferRequest {
        instrument_id: instrument_id.to_string(),
        amount_minor_units: to_minor_units(amount)?,
        kind: TransferKind::Standard,
    })
}

impl VenmoClient {
    /// Move `amount` dollars to the instrument `instrument_id`.
    ///
    /// A fresh CSRF pair is minted from the cashout page for every call;
    /// pairs from earlier steps are never reused.
    pub async fn transfer(
        &mut self,
        token: &AccessToken,
        instrument_id: &str,
        amount: Decimal,
    ) -> Result<()> {
        const STEP: &str = "transfer";
        let request = build_transfer_request(instrument_id, amount)?;

        let page = self.url(Host::Account, &self.endpoints.cashout_page)?;
        let csrf = self
            .fetch_csrf(Exchange::new("cashout page", Method::GET, page).access_token(token))
            .await?;

        let url = self.url(Host::Account, &self.endpoints.transfer)?;
        let req = Exchange::new(STEP, Method::POST, url)
            .access_token(token)
            .csrf(&csrf);
        let resp = self.post_json(req, &request).await?;
        expect_status(STEP, &resp, TRANSFER_CREATED)?;

        info!(
            instrument_id,
            amount_minor_units = request.amount_minor_units,
            "Transfer accepted"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
