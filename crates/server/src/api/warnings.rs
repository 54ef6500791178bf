use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use tally_core::domain::warning::{Deduction, Warning, WarningId};
use tally_core::pagination::Page;

use super::{AppState, Body, Params};
use crate::error::{ApiError, ForCaller};
use crate::workflows::warnings::{NewDeduction, NewWarning, WarningListRequest};
use crate::workflows::Caller;

#[derive(Debug, Serialize)]
pub struct UnreadCount {
    pub unread: u64,
}

pub async fn issue(
    State(state): State<AppState>,
    caller: Caller,
    Body(body): Body<NewWarning>,
) -> Result<(StatusCode, Json<Warning>), ApiError> {
    let warning = state.workflows.issue_warning(&caller, body).await.for_caller(&caller)?;
    Ok((StatusCode::CREATED, Json(warning)))
}

pub async fn list(
    State(state): State<AppState>,
    caller: Caller,
    Params(query): Params<WarningListRequest>,
) -> Result<Json<Page<Warning>>, ApiError> {
    let page = state.workflows.list_warnings(&caller, query).await.for_caller(&caller)?;
    Ok(Json(page))
}

pub async fn unread_count(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<UnreadCount>, ApiError> {
    let unread = state.workflows.unread_warning_count(&caller).await.for_caller(&caller)?;
    Ok(Json(UnreadCount { unread }))
}

pub async fn mark_read(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<Warning>, ApiError> {
    let warning =
        state.workflows.mark_warning_read(&caller, &WarningId(id)).await.for_caller(&caller)?;
    Ok(Json(warning))
}

pub async fn archive(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<Warning>, ApiError> {
    let warning =
        state.workflows.archive_warning(&caller, &WarningId(id)).await.for_caller(&caller)?;
    Ok(Json(warning))
}

pub async fn deduct(
    State(state): State<AppState>,
    caller: Caller,
    Body(body): Body<NewDeduction>,
) -> Result<(StatusCode, Json<Deduction>), ApiError> {
    let deduction = state.workflows.issue_deduction(&caller, body).await.for_caller(&caller)?;
    Ok((StatusCode::CREATED, Json(deduction)))
}
