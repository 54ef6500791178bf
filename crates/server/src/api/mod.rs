//! JSON request/response boundary under `/api/v1`.
//!
//! Handlers extract the [`Caller`], decode the body or query, call one
//! workflow operation and serialize its result. All decisions live in
//! `workflows`.

use axum::extract::{FromRequest, FromRequestParts, Query, Request};
use axum::http::request::Parts;
use axum::http::{Extensions, HeaderMap};
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use serde::de::DeserializeOwned;

use crate::error::ApiError;
use crate::identity::correlation_id;
use crate::workflows::{Caller, Workflows};

mod admin;
mod coupons;
mod orders;
mod payroll;
mod refunds;
mod warnings;

#[derive(Clone)]
pub struct AppState {
    pub workflows: Workflows,
}

impl AppState {
    pub fn new(workflows: Workflows) -> Self {
        Self { workflows }
    }
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/orders", post(orders::submit).get(orders::mine))
        .route("/orders/manage", get(orders::manage))
        .route("/orders/{id}/decision", post(orders::decide))
        .route("/refunds", post(refunds::create).get(refunds::list))
        .route("/refunds/search", get(refunds::search))
        .route("/refunds/purge", post(refunds::purge))
        .route("/refunds/{id}", patch(refunds::edit))
        .route("/refunds/{id}/settle", post(refunds::settle))
        .route("/refunds/{id}/archive", post(refunds::archive))
        .route("/coupons", post(coupons::generate))
        .route("/coupons/history", get(coupons::history))
        .route("/coupons/{code}", get(coupons::lookup))
        .route("/coupons/{code}/honor", post(coupons::honor))
        .route("/coupons/{code}/clear", post(coupons::clear))
        .route("/warnings", post(warnings::issue).get(warnings::list))
        .route("/warnings/unread-count", get(warnings::unread_count))
        .route("/warnings/{id}/read", post(warnings::mark_read))
        .route("/warnings/{id}/archive", post(warnings::archive))
        .route("/deductions", post(warnings::deduct))
        .route("/salary", get(payroll::salary))
        .route("/analytics/team", get(payroll::team))
        .route("/team", get(admin::roster))
        .route("/admin/users", post(admin::create_user).get(admin::list_users))
        .route("/admin/users/{id}/deactivate", post(admin::deactivate))
        .route("/admin/users/{id}/rate", post(admin::set_rate))
        .route("/admin/teams", post(admin::assign))
        .route("/admin/teams/{manager_id}/{employee_id}", delete(admin::unassign));

    Router::new().nest("/api/v1", api).with_state(state)
}

/// The request's correlation id, preferring the one already bound to the caller.
fn request_correlation_id(extensions: &Extensions, headers: &HeaderMap) -> String {
    extensions
        .get::<Caller>()
        .map(|caller| caller.correlation_id.clone())
        .unwrap_or_else(|| correlation_id(headers))
}

/// JSON body whose decode failures use the API error envelope.
pub struct Body<T>(pub T);

impl<S, T> FromRequest<S> for Body<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let correlation_id = request_correlation_id(req.extensions(), req.headers());
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(ApiError::malformed(rejection.body_text(), correlation_id)),
        }
    }
}

/// Query string counterpart of [`Body`].
pub struct Params<T>(pub T);

impl<S, T> FromRequestParts<S> for Params<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Self(value)),
            Err(rejection) => Err(ApiError::malformed(
                rejection.body_text(),
                request_correlation_id(&parts.extensions, &parts.headers),
            )),
        }
    }
}
