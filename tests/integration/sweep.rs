//! Full runs with an externally supplied access token.

use rust_decimal_macros::dec;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use venmo_sweep::config::{ApiVariant, Credentials};
use venmo_sweep::engine::notifier::{Notifier, WebhookNotifier};
use venmo_sweep::engine::orchestrator::{self, RunOptions};
use venmo_sweep::types::AccessToken;

use crate::common::{balance_page, client_for, page};

fn sweep() -> RunOptions {
    RunOptions {
        transfer: true,
        verbose: false,
    }
}

fn token() -> Credentials {
    Credentials::Token(AccessToken::new("external-token"))
}

#[tokio::test]
async fn test_zero_balance_issues_no_transfer() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .and(header("cookie", "api_access_token=external-token; v_id=fp01-integration"))
        .respond_with(ResponseTemplate::new(200).set_body_string(balance_page(json!("0.00"))))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let mut client = client_for(&server, ApiVariant::default());
    let report = orchestrator::run(&mut client, &token(), sweep(), None)
        .await
        .unwrap();

    assert_eq!(report.balance.amount(), dec!(0.00));
    assert!(report.transfer.is_none());
}

#[tokio::test]
async fn test_positive_balance_is_swept_and_webhook_fires_once() {
    let server = MockServer::start().await;

    // First read sees the balance, the read after the transfer sees it gone.
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(balance_page(json!("50.00"))))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(balance_page(json!("0.00"))))
        .expect(1)
        .mount(&server)
        .await;

    let cashout = page(json!({"props": {"pageProps": {
        "csrfToken": "cashout-token",
        "standardItems": [
            {"value": "card-9", "roles": {"balanceTransfers": "backup"}},
            {"value": "bank-1", "roles": {"balanceTransfers": "primary"}}
        ]
    }}}));
    Mock::given(method("GET"))
        .and(path("/cashout"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "_csrf=cashout-cookie; Path=/")
                .set_body_string(cashout),
        )
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/transfer"))
        .and(header("csrf-token", "cashout-token"))
        .and(body_json(json!({
            "fundingInstrumentId": "bank-1",
            "amount": 5000,
            "type": "standard"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"status": "pending"})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let notifier = WebhookNotifier::new(&format!("{}/hook", server.uri())).unwrap();
    let mut client = client_for(&server, ApiVariant::default());
    let report = orchestrator::run(
        &mut client,
        &token(),
        sweep(),
        Some(&notifier as &dyn Notifier),
    )
    .await
    .unwrap();

    assert_eq!(report.balance.amount(), dec!(50.00));
    let transfer = report.transfer.expect("transfer outcome");
    assert_eq!(transfer.instrument.id, "bank-1");
    assert_eq!(transfer.amount.amount(), dec!(50.00));
    assert_eq!(transfer.new_balance.amount(), dec!(0.00));
    assert!(report.notified);
}
