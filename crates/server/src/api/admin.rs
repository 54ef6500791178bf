use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use tally_core::domain::user::{TeamAssignment, UserAccount, UserId};
use tally_core::money::Money;

use super::{AppState, Body, Params};
use crate::error::{ApiError, ForCaller};
use crate::workflows::accounts::NewAccount;
use crate::workflows::Caller;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserListQuery {
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateChange {
    pub rate_per_order: Option<Money>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamPair {
    pub manager_id: String,
    pub employee_id: String,
}

pub async fn create_user(
    State(state): State<AppState>,
    caller: Caller,
    Body(body): Body<NewAccount>,
) -> Result<(StatusCode, Json<UserAccount>), ApiError> {
    let account = state.workflows.create_account(&caller, body).await.for_caller(&caller)?;
    Ok((StatusCode::CREATED, Json(account)))
}

pub async fn list_users(
    State(state): State<AppState>,
    caller: Caller,
    Params(query): Params<UserListQuery>,
) -> Result<Json<Vec<UserAccount>>, ApiError> {
    let users =
        state.workflows.list_accounts(&caller, query.include_inactive).await.for_caller(&caller)?;
    Ok(Json(users))
}

pub async fn deactivate(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<UserAccount>, ApiError> {
    let account =
        state.workflows.deactivate_account(&caller, &UserId(id)).await.for_caller(&caller)?;
    Ok(Json(account))
}

pub async fn set_rate(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    Body(body): Body<RateChange>,
) -> Result<Json<UserAccount>, ApiError> {
    let account = state
        .workflows
        .set_rate(&caller, &UserId(id), body.rate_per_order)
        .await
        .for_caller(&caller)?;
    Ok(Json(account))
}

/// 201 for a new pairing, 200 when it already existed.
pub async fn assign(
    State(state): State<AppState>,
    caller: Caller,
    Body(body): Body<TeamPair>,
) -> Result<(StatusCode, Json<TeamAssignment>), ApiError> {
    let (assignment, created) = state
        .workflows
        .assign_to_team(&caller, &UserId(body.manager_id), &UserId(body.employee_id))
        .await
        .for_caller(&caller)?;
    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(assignment)))
}

pub async fn unassign(
    State(state): State<AppState>,
    caller: Caller,
    Path((manager_id, employee_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    state
        .workflows
        .unassign_from_team(&caller, &UserId(manager_id), &UserId(employee_id))
        .await
        .for_caller(&caller)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn roster(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<Vec<UserAccount>>, ApiError> {
    let users = state.workflows.roster(&caller).await.for_caller(&caller)?;
    Ok(Json(users))
}
