use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use tally_core::domain::order::{OrderId, OrderSubmission};
use tally_core::pagination::Page;

use super::{AppState, Body, Params};
use crate::error::{ApiError, ForCaller};
use crate::workflows::orders::{DecisionAction, OrderListRequest};
use crate::workflows::Caller;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitOrders {
    pub date_key: String,
    pub submitted_count: u32,
}

#[derive(Debug, Deserialize)]
pub struct MonthQuery {
    pub month: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub action: DecisionAction,
    #[serde(default)]
    pub approved_count: Option<u32>,
}

pub async fn submit(
    State(state): State<AppState>,
    caller: Caller,
    Body(body): Body<SubmitOrders>,
) -> Result<Json<OrderSubmission>, ApiError> {
    let order = state
        .workflows
        .submit_orders(&caller, &body.date_key, body.submitted_count)
        .await
        .for_caller(&caller)?;
    Ok(Json(order))
}

pub async fn mine(
    State(state): State<AppState>,
    caller: Caller,
    Params(query): Params<MonthQuery>,
) -> Result<Json<Vec<OrderSubmission>>, ApiError> {
    let orders = state.workflows.my_orders(&caller, &query.month).await.for_caller(&caller)?;
    Ok(Json(orders))
}

pub async fn manage(
    State(state): State<AppState>,
    caller: Caller,
    Params(query): Params<OrderListRequest>,
) -> Result<Json<Page<OrderSubmission>>, ApiError> {
    let page = state.workflows.manage_orders(&caller, query).await.for_caller(&caller)?;
    Ok(Json(page))
}

pub async fn decide(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    Body(body): Body<Decision>,
) -> Result<Json<OrderSubmission>, ApiError> {
    let order = state
        .workflows
        .decide_order(&caller, &OrderId(id), body.action, body.approved_count)
        .await
        .for_caller(&caller)?;
    Ok(Json(order))
}
