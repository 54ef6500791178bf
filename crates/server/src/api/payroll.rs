use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use tally_core::domain::user::UserId;
use tally_core::payroll::{SalaryReport, TeamMonthRow};

use super::{AppState, Params};
use crate::error::{ApiError, ForCaller};
use crate::workflows::Caller;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalaryQuery {
    pub user_id: Option<String>,
    pub month: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TeamQuery {
    pub month: Option<String>,
}

pub async fn salary(
    State(state): State<AppState>,
    caller: Caller,
    Params(query): Params<SalaryQuery>,
) -> Result<Json<SalaryReport>, ApiError> {
    let user_id = query.user_id.filter(|raw| !raw.trim().is_empty()).map(UserId);
    let report = state
        .workflows
        .salary(&caller, user_id, query.month.as_deref())
        .await
        .for_caller(&caller)?;
    Ok(Json(report))
}

pub async fn team(
    State(state): State<AppState>,
    caller: Caller,
    Params(query): Params<TeamQuery>,
) -> Result<Json<Vec<TeamMonthRow>>, ApiError> {
    let rows =
        state.workflows.team_analytics(&caller, query.month.as_deref()).await.for_caller(&caller)?;
    Ok(Json(rows))
}
