use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use tally_core::domain::coupon::{Coupon, CouponClearRecord, CouponDraft};
use tally_core::money::Money;
use tally_core::pagination::Page;

use super::{AppState, Body, Params};
use crate::error::{ApiError, ForCaller};
use crate::workflows::coupons::CouponHistoryRequest;
use crate::workflows::Caller;

#[derive(Debug, Deserialize)]
pub struct ClearBalance {
    pub amount: Money,
}

pub async fn generate(
    State(state): State<AppState>,
    caller: Caller,
    Body(body): Body<CouponDraft>,
) -> Result<(StatusCode, Json<Coupon>), ApiError> {
    let coupon = state.workflows.generate_coupon(&caller, body).await.for_caller(&caller)?;
    Ok((StatusCode::CREATED, Json(coupon)))
}

pub async fn lookup(
    State(state): State<AppState>,
    caller: Caller,
    Path(code): Path<String>,
) -> Result<Json<Coupon>, ApiError> {
    let coupon = state.workflows.lookup_coupon(&caller, &code).await.for_caller(&caller)?;
    Ok(Json(coupon))
}

pub async fn honor(
    State(state): State<AppState>,
    caller: Caller,
    Path(code): Path<String>,
) -> Result<Json<Coupon>, ApiError> {
    let coupon = state.workflows.honor_coupon(&caller, &code).await.for_caller(&caller)?;
    Ok(Json(coupon))
}

pub async fn clear(
    State(state): State<AppState>,
    caller: Caller,
    Path(code): Path<String>,
    Body(body): Body<ClearBalance>,
) -> Result<Json<Coupon>, ApiError> {
    let coupon =
        state.workflows.clear_coupon(&caller, &code, body.amount).await.for_caller(&caller)?;
    Ok(Json(coupon))
}

pub async fn history(
    State(state): State<AppState>,
    caller: Caller,
    Params(query): Params<CouponHistoryRequest>,
) -> Result<Json<Page<CouponClearRecord>>, ApiError> {
    let page = state.workflows.coupon_history(query).await.for_caller(&caller)?;
    Ok(Json(page))
}
