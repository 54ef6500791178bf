//! Caller extraction from upstream identity headers.
//!
//! Authentication happens in front of this service; it forwards the account
//! id and role it vouched for. The pair is checked against the stored account
//! so a stale session cannot act with a role the account no longer holds.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use tally_core::authz::Role;
use tally_core::domain::user::UserId;
use tally_core::errors::PermissionDenied;
use tracing::debug;
use uuid::Uuid;

use crate::api::AppState;
use crate::error::ApiError;
use crate::workflows::Caller;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Reuses an upstream correlation id when one is forwarded.
pub fn correlation_id(headers: &HeaderMap) -> String {
    header(headers, CORRELATION_ID_HEADER)
        .filter(|value| value.len() <= 128)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(caller) = parts.extensions.get::<Caller>() {
            return Ok(caller.clone());
        }
        let correlation_id = correlation_id(&parts.headers);

        let id = header(&parts.headers, ACTOR_ID_HEADER).ok_or_else(|| {
            ApiError::unauthenticated(format!("missing {ACTOR_ID_HEADER} header"), &correlation_id)
        })?;
        let claimed: Role = header(&parts.headers, ACTOR_ROLE_HEADER)
            .ok_or_else(|| {
                ApiError::unauthenticated(
                    format!("missing {ACTOR_ROLE_HEADER} header"),
                    &correlation_id,
                )
            })?
            .parse()
            .map_err(|_| {
                ApiError::unauthenticated(
                    format!("unrecognised {ACTOR_ROLE_HEADER} header"),
                    &correlation_id,
                )
            })?;

        let account = state
            .workflows
            .authenticate(&UserId(id.to_string()))
            .await
            .map_err(|error| ApiError::application(error, &correlation_id))?
            .ok_or_else(|| ApiError::unauthenticated("unknown actor", &correlation_id))?;

        account
            .ensure_active()
            .map_err(|error| ApiError::application(error.into(), &correlation_id))?;
        if account.role != claimed {
            let denied = PermissionDenied::IdentityMismatch { claimed, actual: account.role };
            return Err(ApiError::application(denied.into(), &correlation_id));
        }

        debug!(
            event_name = "api.identity.resolved",
            correlation_id = %correlation_id,
            user_id = %account.id,
            role = account.role.as_str(),
            "caller resolved"
        );
        let caller = Caller::new(account, correlation_id);
        parts.extensions.insert(caller.clone());
        Ok(caller)
    }
}
