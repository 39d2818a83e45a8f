use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::error::HubError;
use crate::state::AppState;

/// Scalar company fields. Missing ones are `null`.
const DETAIL_FIELDS: &[&str] = &[
    "active",
    "cik",
    "composite_figi",
    "currency_name",
    "description",
    "homepage_url",
    "list_date",
    "locale",
    "market",
    "market_cap",
    "name",
    "phone_number",
    "primary_exchange",
    "round_lot",
    "share_class_figi",
    "share_class_shares_outstanding",
    "sic_code",
    "sic_description",
    "ticker",
    "ticker_root",
    "total_employees",
    "type",
    "weighted_shares_outstanding",
    "updated_at",
];

/// Nested objects that default to `{}` rather than `null`.
const DETAIL_OBJECTS: &[&str] = &["address", "branding"];

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/stock_details/{ticker}", get(stock_details))
}

fn shape(doc: &Value) -> Value {
    let mut results = Map::new();
    for key in DETAIL_OBJECTS {
        let v = doc.get(*key).cloned().unwrap_or_else(|| json!({}));
        results.insert(key.to_string(), v);
    }
    for key in DETAIL_FIELDS {
        results.insert(key.to_string(), doc.get(*key).cloned().unwrap_or(Value::Null));
    }
    json!({ "results": results })
}

/// Company reference data for one ticker, matched exactly.
async fn stock_details(
    State(state): State<Arc<AppState>>,
    Path(ticker): Path<String>,
) -> Result<Json<Value>, HubError> {
    let store = Arc::clone(&state.store);
    let key = ticker.clone();
    let doc = tokio::task::spawn_blocking(move || store.stock_details(&key)).await??;
    match doc {
        Some(doc) => Ok(Json(shape(&doc))),
        None => Err(HubError::NotFound(format!(
            "Stock data for ticker {ticker} not found"
        ))),
    }
}
