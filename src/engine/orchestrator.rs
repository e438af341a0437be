//! The sweep pipeline: authenticate, read the balance, and optionally move
//! it to the primary payout instrument.

use tracing::{debug, error, info, warn};

use super::notifier::Notifier;
use crate::config::Credentials;
use crate::types::{AccessToken, Balance, Error, PayoutInstrument, Result};
use crate::venmo::VenmoClient;

/// What the run should do after reading the balance.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Sweep a non-zero balance to the primary instrument.
    pub transfer: bool,
    /// Log the access token fingerprint.
    pub verbose: bool,
}

#[derive(Debug)]
pub struct TransferOutcome {
    pub instrument: PayoutInstrument,
    pub amount: Balance,
    pub new_balance: Balance,
}

/// Summary of a completed run.
#[derive(Debug)]
pub struct RunReport {
    pub balance: Balance,
    pub transfer: Option<TransferOutcome>,
    pub notified: bool,
}

/// Obtain an access token, from configuration or by logging in.
pub async fn authenticate(client: &mut VenmoClient, credentials: &Credentials) -> Result<AccessToken> {
    match credentials {
        Credentials::Token(token) => {
            info!("Using existing access token (not validated)");
            Ok(token.clone())
        }
        Credentials::Password {
            username,
            password,
            bank_account_number,
        } => {
            info!(username = %username, "Logging in with password");
            let token = client
                .login(username, password, bank_account_number.as_ref())
                .await?;
            info!("Obtained new access token from login");
            Ok(token)
        }
    }
}

/// Run the whole pipeline once.
pub async fn run(
    client: &mut VenmoClient,
    credentials: &Credentials,
    options: RunOptions,
    notifier: Option<&dyn Notifier>,
) -> Result<RunReport> {
    debug!(device_id = client.session().device_id(), "Session started");
    let token = authenticate(client, credentials).await?;
    if options.verbose {
        info!(token = %token.fingerprint(), "Access token");
    }

    let balance = client.get_balance(&token).await?;
    info!(balance = %balance, "Current balance");

    let mut report = RunReport {
        balance,
        transfer: None,
        notified: false,
    };
    if !options.transfer {
        return Ok(report);
    }

    if balance.is_positive() {
        let instrument = client.get_primary_payout_instrument(&token).await?;
        info!(
            amount = %balance,
            instrument_id = %instrument.id,
            "Transferring balance to primary payout instrument"
        );
        client.transfer(&token, &instrument.id, balance.amount()).await?;

        let new_balance = client.get_balance(&token).await?;
        info!(new_balance = %new_balance, "Transfer complete");
        report.transfer = Some(TransferOutcome {
            instrument,
            amount: balance,
            new_balance,
        });
    } else {
        info!("Nothing to transfer");
    }

    if let Some(notifier) = notifier {
        match notifier.notify_success().await {
            Ok(()) => {
                info!("Success notification sent");
                report.notified = true;
            }
            Err(e) => warn!(error = %e, "Success notification failed"),
        }
    }

    Ok(report)
}

/// Process exit code for a finished run: 0 on success, 1 on failure.
///
/// A failure is logged before returning, preceded by the raw body of the
/// response at the failing step when one was received.
pub fn exit_code<T>(result: &anyhow::Result<T>) -> u8 {
    let Err(e) = result else {
        return 0;
    };
    if let Some(core) = e.downcast_ref::<Error>() {
        if let Some(body) = core.response_body() {
            error!(kind = ?core.kind(), body = %body, "Response at failing step");
        }
    }
    error!(error = format!("{e:#}"), "Fatal");
    1
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
