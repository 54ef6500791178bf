use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tally_core::domain::refund::{RefundEdit, RefundId, RefundRequest};
use tally_core::money::Money;
use tally_core::pagination::Page;

use super::{AppState, Body, Params};
use crate::error::{ApiError, ForCaller};
use crate::workflows::refunds::{NewRefund, PurgeReport, RefundListRequest, RefundSearchRequest};
use crate::workflows::Caller;

/// Cumulative total refunded so far, not an increment.
#[derive(Debug, Deserialize)]
pub struct Settlement {
    #[serde(rename = "refundedAmountUSD", alias = "refundedAmount")]
    pub refunded_amount: Money,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Purge {
    pub archived_before: DateTime<Utc>,
}

pub async fn create(
    State(state): State<AppState>,
    caller: Caller,
    Body(body): Body<NewRefund>,
) -> Result<(StatusCode, Json<RefundRequest>), ApiError> {
    let refund = state.workflows.create_refund(&caller, body).await.for_caller(&caller)?;
    Ok((StatusCode::CREATED, Json(refund)))
}

pub async fn list(
    State(state): State<AppState>,
    caller: Caller,
    Params(query): Params<RefundListRequest>,
) -> Result<Json<Page<RefundRequest>>, ApiError> {
    let page = state.workflows.list_refunds(&caller, query).await.for_caller(&caller)?;
    Ok(Json(page))
}

pub async fn search(
    State(state): State<AppState>,
    caller: Caller,
    Params(query): Params<RefundSearchRequest>,
) -> Result<Json<Page<RefundRequest>>, ApiError> {
    let page = state.workflows.search_refunds(&caller, query).await.for_caller(&caller)?;
    Ok(Json(page))
}

pub async fn edit(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    Body(body): Body<RefundEdit>,
) -> Result<Json<RefundRequest>, ApiError> {
    let refund =
        state.workflows.edit_refund(&caller, &RefundId(id), body).await.for_caller(&caller)?;
    Ok(Json(refund))
}

pub async fn settle(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    Body(body): Body<Settlement>,
) -> Result<Json<RefundRequest>, ApiError> {
    let refund = state
        .workflows
        .settle_refund(&caller, &RefundId(id), body.refunded_amount)
        .await
        .for_caller(&caller)?;
    Ok(Json(refund))
}

pub async fn archive(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<RefundRequest>, ApiError> {
    let refund = state.workflows.archive_refund(&caller, &RefundId(id)).await.for_caller(&caller)?;
    Ok(Json(refund))
}

pub async fn purge(
    State(state): State<AppState>,
    caller: Caller,
    Body(body): Body<Purge>,
) -> Result<Json<PurgeReport>, ApiError> {
    let report =
        state.workflows.purge_refunds(&caller, body.archived_before).await.for_caller(&caller)?;
    Ok(Json(report))
}
