//! In-memory stand-in for the parcel ledger endpoint, plus helpers to boot a
//! gateway instance against it on an ephemeral port.
//!
//! The mock speaks the same JSON-RPC surface as a real ledger node:
//! `contract_call`, `contract_submit` (signature-checked) and
//! `tx_getReceipt`, with receipt inclusion delayed by a configurable number
//! of polls so tests can observe the confirmation wait.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use secp256k1::{ecdsa, Keypair, Message, PublicKey, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use parcel_gateway::api::{router, AppState};
use parcel_gateway::config::Config;
use parcel_gateway::ledger::LedgerClient;

pub const TEST_CONTRACT: &str = "0xparcel";

/// Timestamps of generated history entries start here and advance by ten
/// seconds per status change.
pub const BASE_TIMESTAMP: u64 = 1_700_000_000;

const ERR_REVERT: i32 = -32000;
const ERR_NOT_FOUND: i32 = -32001;
const ERR_INVALID_PARAMS: i32 = -32602;

type RpcResult = Result<Value, (i32, String)>;

#[derive(Deserialize)]
struct RpcRequest {
    #[allow(dead_code)]
    jsonrpc: String,
    id: Option<Value>,
    method: String,
    params: Option<Value>,
}

#[derive(Serialize)]
struct RpcResponse {
    jsonrpc: &'static str,
    id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
}

#[derive(Serialize)]
struct RpcError {
    code: i32,
    message: String,
}

impl RpcResponse {
    fn success(id: Option<Value>, result: Value) -> Self {
        Self { jsonrpc: "2.0", id, result: Some(result), error: None }
    }

    fn failure(id: Option<Value>, code: i32, message: String) -> Self {
        Self { jsonrpc: "2.0", id, result: None, error: Some(RpcError { code, message }) }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MockParcel {
    pub id: u64,
    pub price: u64,
    pub state: u8,
    pub city: String,
    pub client_full_name: String,
    pub client_phone_number: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MockHistoryItem {
    pub status: u8,
    pub timestamp: u64,
}

#[derive(Default)]
struct LedgerInner {
    parcels: Vec<MockParcel>,
    histories: HashMap<u64, Vec<MockHistoryItem>>,
    /// tx id -> receipt polls answered with `null` before inclusion.
    pending: HashMap<String, u64>,
    ticks: u64,
    next_block: u64,
    receipt_polls: u64,
    submissions: u64,
}

#[derive(Clone)]
pub struct MockLedger {
    inner: Arc<Mutex<LedgerInner>>,
    contract: String,
    confirm_after_polls: u64,
}

impl MockLedger {
    pub fn new(confirm_after_polls: u64) -> Self {
        Self::with_contract(TEST_CONTRACT, confirm_after_polls)
    }

    pub fn with_contract(contract: &str, confirm_after_polls: u64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LedgerInner::default())),
            contract: contract.to_string(),
            confirm_after_polls,
        }
    }

    /// Insert a parcel directly into ledger state, bypassing submission.
    pub fn seed_parcel(&self, price: u64, state: u8, city: &str, full_name: &str, phone: &str) -> u64 {
        let mut inner = self.lock();
        let id = inner.parcels.len() as u64 + 1;
        let timestamp = BASE_TIMESTAMP + 10 * inner.ticks;
        inner.ticks += 1;
        inner.parcels.push(MockParcel {
            id,
            price,
            state,
            city: city.to_string(),
            client_full_name: full_name.to_string(),
            client_phone_number: phone.to_string(),
        });
        inner.histories.insert(id, vec![MockHistoryItem { status: state, timestamp }]);
        id
    }

    /// Apply a status change, appending one history entry.
    pub fn advance_status(&self, id: u64, status: u8) {
        let mut inner = self.lock();
        let timestamp = BASE_TIMESTAMP + 10 * inner.ticks;
        inner.ticks += 1;
        if let Some(parcel) = inner.parcels.iter_mut().find(|p| p.id == id) {
            parcel.state = status;
        }
        inner.histories.entry(id).or_default().push(MockHistoryItem { status, timestamp });
    }

    pub fn parcels(&self) -> Vec<MockParcel> {
        self.lock().parcels.clone()
    }

    pub fn receipt_polls(&self) -> u64 {
        self.lock().receipt_polls
    }

    pub fn submissions(&self) -> u64 {
        self.lock().submissions
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LedgerInner> {
        self.inner.lock().expect("ledger state poisoned")
    }

    fn contract_call(&self, params: &Value) -> RpcResult {
        let contract = params["contract"].as_str().unwrap_or_default();
        if contract != self.contract {
            return Err((ERR_REVERT, format!("unknown contract {contract}")));
        }
        let args = &params["params"];
        match params["method"].as_str().unwrap_or_default() {
            "getParcels" => Ok(json_value(&self.lock().parcels)),
            "getParcel" => {
                let id = parse_id(args)?;
                let inner = self.lock();
                inner
                    .parcels
                    .iter()
                    .find(|p| p.id == id)
                    .map(json_value)
                    .ok_or_else(|| (ERR_NOT_FOUND, format!("parcel {id} does not exist")))
            }
            "getParcelHistory" => {
                let id = parse_id(args)?;
                let inner = self.lock();
                inner
                    .histories
                    .get(&id)
                    .map(json_value)
                    .ok_or_else(|| (ERR_NOT_FOUND, format!("parcel {id} does not exist")))
            }
            other => Err((ERR_REVERT, format!("unknown contract method {other}"))),
        }
    }

    fn contract_submit(&self, params: &Value) -> RpcResult {
        let payload = &params["payload"];
        verify_signature(payload, params)?;
        if payload["contract"].as_str().unwrap_or_default() != self.contract {
            return Err((
                ERR_REVERT,
                format!("unknown contract {}", payload["contract"].as_str().unwrap_or_default()),
            ));
        }
        if payload["method"].as_str().unwrap_or_default() != "createParcel" {
            return Err((ERR_REVERT, "unknown contract method".to_string()));
        }

        let args = &payload["params"];
        let price = args[0].as_u64().ok_or_else(|| invalid("price"))?;
        let state = u8::try_from(args[1].as_u64().ok_or_else(|| invalid("state"))?)
            .map_err(|_| invalid("state"))?;
        let city = args[2].as_str().ok_or_else(|| invalid("city"))?.to_string();
        let client_full_name = args[3].as_str().ok_or_else(|| invalid("clientFullName"))?.to_string();
        let client_phone_number =
            args[4].as_str().ok_or_else(|| invalid("clientPhoneNumber"))?.to_string();

        let mut inner = self.lock();
        inner.submissions += 1;
        let id = inner.parcels.len() as u64 + 1;
        let timestamp = BASE_TIMESTAMP + 10 * inner.ticks;
        inner.ticks += 1;
        inner.parcels.push(MockParcel {
            id,
            price,
            state,
            city,
            client_full_name,
            client_phone_number,
        });
        inner.histories.insert(id, vec![MockHistoryItem { status: state, timestamp }]);

        let tx_id = format!("tx{id:04}");
        inner.pending.insert(tx_id.clone(), self.confirm_after_polls);
        Ok(Value::String(tx_id))
    }

    fn receipt(&self, params: &Value) -> RpcResult {
        let tx_id = params[0].as_str().ok_or_else(|| invalid("tx id"))?;
        let mut inner = self.lock();
        inner.receipt_polls += 1;
        match inner.pending.get_mut(tx_id) {
            None => Err((ERR_REVERT, format!("unknown transaction {tx_id}"))),
            Some(polls_left) if *polls_left > 0 => {
                *polls_left -= 1;
                Ok(Value::Null)
            }
            Some(_) => {
                inner.next_block += 1;
                let block = inner.next_block;
                Ok(json!({
                    "transactionId": tx_id,
                    "blockHash": format!("block{block:04}"),
                    "blockNumber": block,
                    "status": 1,
                }))
            }
        }
    }
}

fn json_value<T: Serialize>(value: T) -> Value {
    serde_json::to_value(value).expect("serialize mock ledger data")
}

fn invalid(what: &str) -> (i32, String) {
    (ERR_INVALID_PARAMS, format!("invalid {what}"))
}

fn parse_id(args: &Value) -> Result<u64, (i32, String)> {
    let raw = args[0].as_str().ok_or_else(|| invalid("parcel id"))?;
    raw.parse().map_err(|_| (ERR_INVALID_PARAMS, format!("invalid parcel id {raw:?}")))
}

/// Recompute the canonical payload digest and check the compact ECDSA
/// signature against the submitter's public key, exactly as a ledger node
/// would before accepting the transaction.
fn verify_signature(payload: &Value, params: &Value) -> Result<(), (i32, String)> {
    let from = params["from"].as_str().ok_or_else(|| invalid("from"))?;
    let signature_hex = params["signature"].as_str().ok_or_else(|| invalid("signature"))?;

    let pubkey_bytes = hex::decode(from).map_err(|_| invalid("from"))?;
    let pubkey = PublicKey::from_slice(&pubkey_bytes).map_err(|_| invalid("from"))?;
    let signature_bytes = hex::decode(signature_hex).map_err(|_| invalid("signature"))?;
    let signature =
        ecdsa::Signature::from_compact(&signature_bytes).map_err(|_| invalid("signature"))?;

    let canonical = serde_json::to_vec(payload).expect("serialize submitted payload");
    let digest: [u8; 32] = Sha256::digest(&canonical).into();
    Secp256k1::verification_only()
        .verify_ecdsa(&Message::from_digest(digest), &signature, &pubkey)
        .map_err(|_| (ERR_REVERT, "invalid transaction signature".to_string()))
}

async fn handle(State(ledger): State<MockLedger>, Json(req): Json<RpcRequest>) -> Json<RpcResponse> {
    let id = req.id.clone();
    let params = req.params.unwrap_or(Value::Null);
    let outcome = match req.method.as_str() {
        "contract_call" => ledger.contract_call(&params),
        "contract_submit" => ledger.contract_submit(&params),
        "tx_getReceipt" => ledger.receipt(&params),
        other => Err((ERR_INVALID_PARAMS, format!("unknown method {other}"))),
    };
    Json(match outcome {
        Ok(result) => RpcResponse::success(id, result),
        Err((code, message)) => RpcResponse::failure(id, code, message),
    })
}

/// Serve the mock ledger on an ephemeral port; returns its endpoint URL.
pub async fn serve_ledger(ledger: MockLedger) -> String {
    let app = Router::new().route("/", post(handle)).with_state(ledger);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    format!("http://{addr}/")
}

pub fn test_config(api_url: &str) -> Config {
    let secp = Secp256k1::new();
    let secret = SecretKey::from_slice(&[0x42; 32]).expect("test secret key");
    Config {
        contract_address: TEST_CONTRACT.to_string(),
        signing_key: Keypair::from_secret_key(&secp, &secret),
        api_url: api_url.to_string(),
    }
}

/// Boot a gateway against the given ledger endpoint; returns its base URL.
pub async fn spawn_gateway(api_url: &str) -> String {
    spawn_gateway_with_timeout(api_url, Duration::from_secs(30)).await
}

pub async fn spawn_gateway_with_timeout(api_url: &str, confirmation_timeout: Duration) -> String {
    let client = LedgerClient::new(&test_config(api_url))
        .unwrap()
        .with_confirmation_timeout(confirmation_timeout);
    let app = router(AppState { ledger: Arc::new(client) });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    format!("http://{addr}")
}
