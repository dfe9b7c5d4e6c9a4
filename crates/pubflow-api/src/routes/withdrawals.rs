//! # Withdrawal API
//!
//! Filing a withdrawal request moves a published artifact to
//! `WITHDRAWAL_PENDING`; resolving it either withdraws the artifact or
//! returns it to `PUBLISHED`. A request can be resolved once.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use pubflow_core::{ArtifactId, RequestId};
use pubflow_state::WithdrawalRequest;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{committed, TransitionResponse};
use crate::error::AppError;
use crate::extractors::{extract_json, extract_validated_json, Caller, Validate};
use crate::state::AppState;

const MAX_REASON_LEN: usize = 4096;

/// Request to withdraw a published artifact.
#[derive(Debug, Deserialize, ToSchema)]
pub struct FileWithdrawalRequest {
    /// Why the artifact should be withdrawn. Shown publicly once approved.
    pub reason: String,
}

impl Validate for FileWithdrawalRequest {
    fn validate(&self) -> Result<(), String> {
        if self.reason.trim().is_empty() {
            return Err("reason must not be empty".to_string());
        }
        if self.reason.len() > MAX_REASON_LEN {
            return Err(format!("reason must not exceed {MAX_REASON_LEN} characters"));
        }
        Ok(())
    }
}

/// Moderator decision on a pending request.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ResolveWithdrawalRequest {
    pub approve: bool,
}

/// A filed withdrawal request and the resulting transition.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WithdrawalFiledResponse {
    #[schema(value_type = Uuid)]
    pub request_id: RequestId,
    pub transition: TransitionResponse,
}

/// A withdrawal request record.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WithdrawalRequestResponse {
    #[schema(value_type = Object)]
    pub request: WithdrawalRequest,
}

/// Build the withdrawal router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/v1/artifacts/:id/withdrawal-requests",
            post(request_withdrawal),
        )
        .route("/v1/withdrawal-requests/:id", get(get_request))
        .route("/v1/withdrawal-requests/:id/resolve", post(resolve_withdrawal))
}

/// POST /v1/artifacts/:id/withdrawal-requests — File a withdrawal request.
#[utoipa::path(
    post,
    path = "/v1/artifacts/{id}/withdrawal-requests",
    params(("id" = Uuid, Path, description = "Artifact ID")),
    request_body = FileWithdrawalRequest,
    responses(
        (status = 201, description = "Request filed", body = WithdrawalFiledResponse),
        (status = 403, description = "Requires write", body = crate::error::ErrorBody),
        (status = 409, description = "Not published, or a request is already pending", body = crate::error::ErrorBody),
    ),
    tag = "withdrawals"
)]
pub(crate) async fn request_withdrawal(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    body: Result<Json<FileWithdrawalRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<WithdrawalFiledResponse>), AppError> {
    let req = extract_validated_json(body)?;
    let (report, request_id) = state.controller.request_withdrawal(
        ArtifactId::from(id),
        caller.invocation(),
        req.reason,
    )?;
    let transition = committed(&state, report).await?;
    Ok((
        StatusCode::CREATED,
        Json(WithdrawalFiledResponse {
            request_id,
            transition,
        }),
    ))
}

/// GET /v1/withdrawal-requests/:id
#[utoipa::path(
    get,
    path = "/v1/withdrawal-requests/{id}",
    params(("id" = Uuid, Path, description = "Withdrawal request ID")),
    responses(
        (status = 200, description = "Withdrawal request", body = WithdrawalRequestResponse),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "withdrawals"
)]
pub(crate) async fn get_request(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<WithdrawalRequestResponse>, AppError> {
    let request = state.controller.find_request(RequestId::from(id))?;
    state.controller.view(request.artifact_id, caller.actor())?;
    Ok(Json(WithdrawalRequestResponse { request }))
}

/// POST /v1/withdrawal-requests/:id/resolve — Approve or reject.
#[utoipa::path(
    post,
    path = "/v1/withdrawal-requests/{id}/resolve",
    params(("id" = Uuid, Path, description = "Withdrawal request ID")),
    request_body = ResolveWithdrawalRequest,
    responses(
        (status = 200, description = "Request resolved", body = TransitionResponse),
        (status = 403, description = "Requires admin", body = crate::error::ErrorBody),
        (status = 404, description = "Unknown request", body = crate::error::ErrorBody),
        (status = 409, description = "Already resolved", body = crate::error::ErrorBody),
    ),
    tag = "withdrawals"
)]
pub(crate) async fn resolve_withdrawal(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    body: Result<Json<ResolveWithdrawalRequest>, JsonRejection>,
) -> Result<Json<TransitionResponse>, AppError> {
    let req = extract_json(body)?;
    let report = state.controller.resolve_withdrawal(
        RequestId::from(id),
        caller.invocation(),
        req.approve,
    )?;
    Ok(Json(committed(&state, report).await?))
}
