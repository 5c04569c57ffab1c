use std::time::Duration;

use serde_json::{json, Value};

use integration_tests::support::{
    serve_ledger, spawn_gateway, spawn_gateway_with_timeout, MockLedger,
};

async fn post_parcel(gateway: &str, body: Value) -> (reqwest::StatusCode, Value) {
    let response = reqwest::Client::new()
        .post(format!("{gateway}/api/parcels"))
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = response.status();
    (status, response.json().await.unwrap())
}

fn parcel_body() -> Value {
    json!({
        "price": 1200,
        "state": 0,
        "city": "Paris",
        "clientFullName": "Ada Lovelace",
        "clientPhoneNumber": "+33 1 23 45 67 89",
    })
}

#[tokio::test]
async fn create_waits_for_inclusion_then_reports() {
    // Receipt appears on the third poll; the response must not come earlier.
    let ledger = MockLedger::new(2);
    let gateway = spawn_gateway(&serve_ledger(ledger.clone()).await).await;

    let (status, body) = post_parcel(&gateway, parcel_body()).await;
    assert_eq!(status, reqwest::StatusCode::OK);
    assert_eq!(body, json!({ "message": "Parcel created" }));

    assert_eq!(ledger.submissions(), 1);
    assert_eq!(ledger.receipt_polls(), 3);

    // The new parcel is now visible through the read path, with the
    // submitted field values and a ledger-assigned id.
    let list: Value =
        reqwest::get(format!("{gateway}/api/parcels")).await.unwrap().json().await.unwrap();
    let parcels = list.as_array().unwrap();
    assert_eq!(parcels.len(), 1);
    assert_eq!(parcels[0]["id"], "1");
    assert_eq!(parcels[0]["price"], "1200");
    assert_eq!(parcels[0]["city"], "Paris");
    assert_eq!(parcels[0]["clientFullName"], "Ada Lovelace");
}

#[tokio::test]
async fn resubmitting_creates_a_second_distinct_parcel() {
    let ledger = MockLedger::new(0);
    let gateway = spawn_gateway(&serve_ledger(ledger.clone()).await).await;

    post_parcel(&gateway, parcel_body()).await;
    post_parcel(&gateway, parcel_body()).await;

    assert_eq!(ledger.submissions(), 2);
    let parcels = ledger.parcels();
    assert_eq!(parcels.len(), 2);
    assert_eq!(parcels[0].id, 1);
    assert_eq!(parcels[1].id, 2);
}

#[tokio::test]
async fn missed_confirmation_deadline_surfaces_as_timeout() {
    // Receipt never appears; the bounded wait must fire instead of hanging.
    let ledger = MockLedger::new(u64::MAX);
    let url = serve_ledger(ledger).await;
    let gateway = spawn_gateway_with_timeout(&url, Duration::from_millis(250)).await;

    let (status, body) = post_parcel(&gateway, parcel_body()).await;
    assert_eq!(status, reqwest::StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body["error"], "timeout");
    assert!(!body["message"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn submission_against_an_unknown_contract_is_a_chain_error() {
    // The ledger hosts a different contract than the gateway is bound to.
    let ledger = MockLedger::with_contract("0xother", 0);
    let gateway = spawn_gateway(&serve_ledger(ledger).await).await;

    let (status, body) = post_parcel(&gateway, parcel_body()).await;
    assert_eq!(status, reqwest::StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "chain");
    assert_eq!(body["message"], "unknown contract 0xparcel");
}
