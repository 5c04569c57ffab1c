use serde::{Deserialize, Serialize};

/// One shipment record, exactly as the ledger contract reports it.
///
/// Ids are assigned sequentially by the contract and are never generated or
/// rewritten on this side. `state` is the contract's raw status code; the
/// enumeration itself is owned by the contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parcel {
    pub id: u64,
    pub price: u64,
    pub state: u8,
    pub city: String,
    pub client_full_name: String,
    pub client_phone_number: String,
}

/// One entry of a parcel's append-only status history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParcelHistoryItem {
    pub status: u8,
    /// Seconds since epoch, as recorded by the contract.
    pub timestamp: u64,
}

/// Confirmation that a submitted transaction was included by the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    pub transaction_id: String,
    pub block_hash: String,
    pub block_number: u64,
    pub status: u8,
}
