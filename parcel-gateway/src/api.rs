//! Request router and handlers. Each handler performs exactly one ledger
//! call and reshapes the result; nothing is cached or retried here.

use std::sync::Arc;

use axum::extract::{Path, Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::errors::GatewayError;
use crate::ledger::LedgerClient;
use crate::models::{Parcel, ParcelHistoryItem};

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<LedgerClient>,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(tower_http::cors::AllowMethods::any())
        .allow_headers(Any);
    Router::new()
        .route("/api/parcels", get(list_parcels).post(create_parcel))
        .route("/api/parcels/{id}", get(get_parcel))
        .route("/api/parcels/{id}/history", get(parcel_history))
        .with_state(state)
        .layer(middleware::from_fn(access_log))
        .layer(cors)
}

/// One line per request, before processing.
async fn access_log(req: Request, next: Next) -> Response {
    info!("{} {}", req.method(), req.uri().path());
    next.run(req).await
}

/// Parcel as served over HTTP: integer fields rendered as base-10 strings so
/// large ledger values survive the JSON boundary; `state` stays the raw code.
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ParcelOut {
    pub id: String,
    pub price: String,
    pub state: u8,
    pub city: String,
    pub client_full_name: String,
    pub client_phone_number: String,
}

impl From<Parcel> for ParcelOut {
    fn from(p: Parcel) -> Self {
        Self {
            id: p.id.to_string(),
            price: p.price.to_string(),
            state: p.state,
            city: p.city,
            client_full_name: p.client_full_name,
            client_phone_number: p.client_phone_number,
        }
    }
}

async fn list_parcels(State(state): State<AppState>) -> Result<Json<Vec<ParcelOut>>, GatewayError> {
    let parcels = state.ledger.list_parcels().await?;
    Ok(Json(parcels.into_iter().map(ParcelOut::from).collect()))
}

async fn get_parcel(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ParcelOut>, GatewayError> {
    let parcel = state.ledger.get_parcel(&id).await?;
    Ok(Json(parcel.into()))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateParcelReq {
    pub price: u64,
    pub state: u8,
    pub city: String,
    pub client_full_name: String,
    pub client_phone_number: String,
}

#[derive(Serialize)]
pub struct CreatedResp {
    pub message: &'static str,
}

async fn create_parcel(
    State(state): State<AppState>,
    Json(req): Json<CreateParcelReq>,
) -> Result<Json<CreatedResp>, GatewayError> {
    let receipt = state
        .ledger
        .create_parcel(req.price, req.state, &req.city, &req.client_full_name, &req.client_phone_number)
        .await?;
    info!("parcel creation confirmed in block {}", receipt.block_number);
    Ok(Json(CreatedResp { message: "Parcel created" }))
}

#[derive(Debug, Serialize)]
pub struct HistoryOut {
    pub status: u8,
    /// Epoch seconds from the ledger, rendered as an RFC 3339 datetime.
    pub timestamp: DateTime<Utc>,
}

async fn parcel_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<HistoryOut>>, GatewayError> {
    let history = state.ledger.get_parcel_history(&id).await?;
    history.into_iter().map(history_out).collect::<Result<Vec<_>, _>>().map(Json)
}

fn history_out(item: ParcelHistoryItem) -> Result<HistoryOut, GatewayError> {
    let timestamp = i64::try_from(item.timestamp)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .ok_or_else(|| {
            GatewayError::Chain(format!("ledger returned out-of-range timestamp {}", item.timestamp))
        })?;
    Ok(HistoryOut { status: item.status, timestamp })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parcel_out_renders_integers_as_decimal_strings() {
        let parcel = Parcel {
            id: 12,
            price: 18_446_744_073_709_551_615,
            state: 2,
            city: "Nantes".into(),
            client_full_name: "Grace Hopper".into(),
            client_phone_number: "+33 9 87 65 43 21".into(),
        };
        let out = serde_json::to_value(ParcelOut::from(parcel)).unwrap();
        assert_eq!(
            out,
            json!({
                "id": "12",
                "price": "18446744073709551615",
                "state": 2,
                "city": "Nantes",
                "clientFullName": "Grace Hopper",
                "clientPhoneNumber": "+33 9 87 65 43 21",
            })
        );
    }

    #[test]
    fn history_timestamps_render_as_dates_not_integers() {
        let out = history_out(ParcelHistoryItem { status: 1, timestamp: 1_700_000_000 }).unwrap();
        let value = serde_json::to_value(&out).unwrap();
        assert_eq!(value, json!({ "status": 1, "timestamp": "2023-11-14T22:13:20Z" }));
    }

    #[test]
    fn out_of_range_history_timestamp_is_a_chain_error() {
        let err = history_out(ParcelHistoryItem { status: 0, timestamp: u64::MAX }).unwrap_err();
        assert!(matches!(err, GatewayError::Chain(_)));
    }

    #[test]
    fn create_request_uses_the_public_field_names() {
        let req: CreateParcelReq = serde_json::from_value(json!({
            "price": 1200,
            "state": 0,
            "city": "Paris",
            "clientFullName": "Ada Lovelace",
            "clientPhoneNumber": "+33 1 23 45 67 89",
        }))
        .unwrap();
        assert_eq!(req.price, 1200);
        assert_eq!(req.client_full_name, "Ada Lovelace");
    }
}
