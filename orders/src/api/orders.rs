//! Order queries (read side).

use crate::server::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use orderbus_core::projection::{AccountOrderView, OrderKey, OrderRecord, VendorOrderView};
use orderbus_web::{AppError, WebResult};

/// Fetch one order by its key.
///
/// ```text
/// GET /orders/:accountid/:vendorid
/// ```
///
/// # Errors
///
/// `404` if the order does not exist, `503` if the store is unavailable.
pub async fn get_order(
    State(state): State<AppState>,
    Path((account_id, vendor_id)): Path<(String, String)>,
) -> WebResult<Json<OrderRecord>> {
    let key = OrderKey::new(account_id, vendor_id);
    let record = state
        .store
        .get(&key)
        .await?
        .ok_or_else(|| AppError::not_found("Order", &key))?;
    Ok(Json(record))
}

/// All orders of an account, ascending by `orderdate`.
///
/// ```text
/// GET /accounts/:accountid/orders
/// ```
///
/// # Errors
///
/// `503` if the store is unavailable.
pub async fn account_orders(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> WebResult<Json<Vec<AccountOrderView>>> {
    Ok(Json(state.store.by_account(&account_id).await?))
}

/// All orders of a vendor, ascending by `orderdate`.
///
/// ```text
/// GET /vendors/:vendorid/orders
/// ```
///
/// # Errors
///
/// `503` if the store is unavailable.
pub async fn vendor_orders(
    State(state): State<AppState>,
    Path(vendor_id): Path<String>,
) -> WebResult<Json<Vec<VendorOrderView>>> {
    Ok(Json(state.store.by_vendor(&vendor_id).await?))
}
