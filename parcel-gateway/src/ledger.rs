//! JSON-RPC client for the parcel ledger contract.
//!
//! Holds one HTTP connection pool and one signing identity, both built at
//! startup and shared immutably across requests. Read calls go through
//! `contract_call`; state-changing calls are signed, submitted through
//! `contract_submit`, and then polled via `tx_getReceipt` until inclusion or
//! the confirmation deadline.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use log::{debug, info};
use secp256k1::{All, Keypair, Message, Secp256k1};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tokio::time::sleep;

use crate::config::Config;
use crate::errors::GatewayError;
use crate::models::{Parcel, ParcelHistoryItem, TxReceipt};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(60);

// Error codes reported by the ledger endpoint.
const RPC_ERR_NOT_FOUND: i32 = -32001;
const RPC_ERR_INVALID_PARAMS: i32 = -32602;

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcResponse {
    /// Defaults to `Null`; a pending receipt is reported as an explicit null
    /// result, which must not be confused with a decode failure.
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i32,
    message: String,
}

/// Payload covered by the submission signature. The signed bytes are the
/// serde_json encoding of this object converted to a `Value` first, so map
/// keys are ordered and signer and verifier produce identical bytes.
#[derive(Serialize)]
struct TxPayload<'a> {
    contract: &'a str,
    method: &'a str,
    params: &'a Value,
    nonce: u64,
}

pub struct LedgerClient {
    http: reqwest::Client,
    endpoint: String,
    contract: String,
    keypair: Keypair,
    secp: Secp256k1<All>,
    next_request_id: AtomicU64,
    confirmation_timeout: Duration,
}

impl LedgerClient {
    pub fn new(config: &Config) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            endpoint: config.api_url.clone(),
            contract: config.contract_address.clone(),
            keypair: config.signing_key,
            secp: Secp256k1::new(),
            next_request_id: AtomicU64::new(1),
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
        })
    }

    /// Override the receipt-wait deadline. Kept short in tests.
    pub fn with_confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    /// Compressed public key of the signing identity, hex encoded.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.keypair.public_key().serialize())
    }

    /// All parcels known to the contract, in the order the ledger yields them
    /// (a contract-defined order, not guaranteed sorted).
    pub async fn list_parcels(&self) -> Result<Vec<Parcel>, GatewayError> {
        let result = self.contract_call("getParcels", json!([])).await?;
        serde_json::from_value(result).map_err(decode_error)
    }

    /// One parcel by id. The id is forwarded as-is; an unknown or malformed
    /// id surfaces the ledger's own error message untouched.
    pub async fn get_parcel(&self, id: &str) -> Result<Parcel, GatewayError> {
        let result = self.contract_call("getParcel", json!([id])).await?;
        serde_json::from_value(result).map_err(decode_error)
    }

    /// Status history of one parcel, in the contract's append order.
    pub async fn get_parcel_history(&self, id: &str) -> Result<Vec<ParcelHistoryItem>, GatewayError> {
        let result = self.contract_call("getParcelHistory", json!([id])).await?;
        serde_json::from_value(result).map_err(decode_error)
    }

    /// Submit a `createParcel` transaction and wait for on-chain inclusion.
    ///
    /// Not idempotent: the contract assigns ids sequentially and performs no
    /// deduplication, so resubmitting creates a second, distinct parcel.
    pub async fn create_parcel(
        &self,
        price: u64,
        state: u8,
        city: &str,
        client_full_name: &str,
        client_phone_number: &str,
    ) -> Result<TxReceipt, GatewayError> {
        let params = json!([price, state, city, client_full_name, client_phone_number]);
        let tx_id = self.submit("createParcel", &params).await?;
        info!("submitted createParcel tx {tx_id}");
        self.await_receipt(&tx_id).await
    }

    async fn rpc(&self, method: &str, params: Value) -> Result<Value, GatewayError> {
        let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest { jsonrpc: "2.0", id, method, params };
        debug!("rpc {method} id={id}");
        let response = self.http.post(&self.endpoint).json(&request).send().await?;
        if !response.status().is_success() {
            return Err(GatewayError::Network(format!(
                "ledger endpoint returned status {}",
                response.status()
            )));
        }
        let response: RpcResponse = response.json().await?;
        if let Some(err) = response.error {
            return Err(classify_rpc_error(err));
        }
        Ok(response.result)
    }

    async fn contract_call(&self, method: &str, params: Value) -> Result<Value, GatewayError> {
        self.rpc(
            "contract_call",
            json!({ "contract": self.contract, "method": method, "params": params }),
        )
        .await
    }

    async fn submit(&self, method: &str, params: &Value) -> Result<String, GatewayError> {
        let payload = TxPayload { contract: &self.contract, method, params, nonce: rand::random() };
        let payload = serde_json::to_value(&payload)
            .map_err(|e| GatewayError::Chain(format!("failed to encode transaction payload: {e}")))?;
        let signature = self.sign(&payload)?;
        let result = self
            .rpc(
                "contract_submit",
                json!({ "payload": payload, "from": self.public_key_hex(), "signature": signature }),
            )
            .await?;
        serde_json::from_value(result).map_err(decode_error)
    }

    fn sign(&self, payload: &Value) -> Result<String, GatewayError> {
        let canonical = serde_json::to_vec(payload)
            .map_err(|e| GatewayError::Chain(format!("failed to encode transaction payload: {e}")))?;
        let digest: [u8; 32] = Sha256::digest(&canonical).into();
        let signature = self.secp.sign_ecdsa(&Message::from_digest(digest), &self.keypair.secret_key());
        Ok(hex::encode(signature.serialize_compact()))
    }

    async fn await_receipt(&self, tx_id: &str) -> Result<TxReceipt, GatewayError> {
        let poll = async {
            loop {
                if let Some(receipt) = self.get_receipt(tx_id).await? {
                    return Ok(receipt);
                }
                sleep(RECEIPT_POLL_INTERVAL).await;
            }
        };
        match tokio::time::timeout(self.confirmation_timeout, poll).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout(self.confirmation_timeout.as_secs())),
        }
    }

    async fn get_receipt(&self, tx_id: &str) -> Result<Option<TxReceipt>, GatewayError> {
        let result = self.rpc("tx_getReceipt", json!([tx_id])).await?;
        if result.is_null() {
            return Ok(None);
        }
        serde_json::from_value(result).map(Some).map_err(decode_error)
    }
}

fn classify_rpc_error(err: RpcErrorObject) -> GatewayError {
    match err.code {
        RPC_ERR_NOT_FOUND => GatewayError::NotFound(err.message),
        RPC_ERR_INVALID_PARAMS => GatewayError::Validation(err.message),
        _ => GatewayError::Chain(err.message),
    }
}

fn decode_error(err: serde_json::Error) -> GatewayError {
    GatewayError::Chain(format!("ledger returned malformed data: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_error_codes_map_to_kinds() {
        let not_found = classify_rpc_error(RpcErrorObject {
            code: RPC_ERR_NOT_FOUND,
            message: "parcel 9 does not exist".into(),
        });
        assert!(matches!(not_found, GatewayError::NotFound(m) if m == "parcel 9 does not exist"));

        let invalid = classify_rpc_error(RpcErrorObject {
            code: RPC_ERR_INVALID_PARAMS,
            message: "invalid parcel id".into(),
        });
        assert!(matches!(invalid, GatewayError::Validation(_)));

        let reverted =
            classify_rpc_error(RpcErrorObject { code: -32000, message: "execution reverted".into() });
        assert!(matches!(reverted, GatewayError::Chain(m) if m == "execution reverted"));
    }

    #[test]
    fn canonical_payload_survives_a_value_round_trip() {
        // The verifier re-serializes the payload it received; both sides must
        // produce the same bytes for the signature to check out.
        let params = json!([1200u64, 0u8, "Paris", "Ada Lovelace", "+33 1 23 45 67 89"]);
        let payload =
            TxPayload { contract: "0xparcel", method: "createParcel", params: &params, nonce: 42 };
        let value = serde_json::to_value(&payload).unwrap();
        let signed_bytes = serde_json::to_vec(&value).unwrap();

        let round_tripped: Value = serde_json::from_slice(&signed_bytes).unwrap();
        assert_eq!(serde_json::to_vec(&round_tripped).unwrap(), signed_bytes);
    }

    #[test]
    fn signatures_verify_against_the_public_key() {
        let secp = Secp256k1::new();
        let secret = secp256k1::SecretKey::from_slice(&[7u8; 32]).unwrap();
        let keypair = Keypair::from_secret_key(&secp, &secret);
        let config = Config {
            contract_address: "0xparcel".into(),
            signing_key: keypair,
            api_url: "http://127.0.0.1:0".into(),
        };
        let client = LedgerClient::new(&config).unwrap();

        let payload = json!({ "contract": "0xparcel", "method": "createParcel", "params": [], "nonce": 1u64 });
        let signature_hex = client.sign(&payload).unwrap();

        let canonical = serde_json::to_vec(&payload).unwrap();
        let digest: [u8; 32] = Sha256::digest(&canonical).into();
        let signature =
            secp256k1::ecdsa::Signature::from_compact(&hex::decode(signature_hex).unwrap()).unwrap();
        secp.verify_ecdsa(&Message::from_digest(digest), &signature, &keypair.public_key()).unwrap();
    }
}
