//! # Lifecycle Transition API
//!
//! One `POST /v1/artifacts/:id/<operation>` per lifecycle operation. All
//! honour `If-Match` as an expected revision and answer with the
//! committed snapshot, or with the unchanged one for an idempotent
//! `publish`.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use pubflow_core::{ArtifactId, Timestamp};
use pubflow_lifecycle::{ControllerError, Invocation, LifecycleController, TransitionReport};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{committed, TransitionResponse};
use crate::error::AppError;
use crate::extractors::{extract_validated_json, Caller, Validate};
use crate::state::AppState;

/// Administrative withdrawal without a prior request.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ForceWithdrawRequest {
    /// Shown in place of the artifact while it is withdrawn.
    pub justification: String,
}

impl Validate for ForceWithdrawRequest {
    fn validate(&self) -> Result<(), String> {
        if self.justification.trim().is_empty() {
            return Err("justification must not be empty".to_string());
        }
        Ok(())
    }
}

/// Hold a private artifact back from publication until a date.
#[derive(Debug, Deserialize, ToSchema)]
pub struct EmbargoRequest {
    /// RFC 3339 end of the embargo. Must be in the future.
    pub until: String,
}

impl Validate for EmbargoRequest {
    fn validate(&self) -> Result<(), String> {
        Timestamp::parse(&self.until)
            .map(|_| ())
            .map_err(|e| format!("until: {e}"))
    }
}

/// Build the transition router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/artifacts/:id/submit", post(submit))
        .route("/v1/artifacts/:id/return-to-draft", post(return_to_draft))
        .route("/v1/artifacts/:id/make-public", post(make_public))
        .route("/v1/artifacts/:id/make-private", post(make_private))
        .route("/v1/artifacts/:id/publish", post(publish))
        .route("/v1/artifacts/:id/force-withdraw", post(force_withdraw))
        .route("/v1/artifacts/:id/unwithdraw", post(unwithdraw))
        .route("/v1/artifacts/:id/spam", post(flag_spam))
        .route("/v1/artifacts/:id/unspam", post(clear_spam))
        .route("/v1/artifacts/:id/delete", post(delete))
        .route("/v1/artifacts/:id/embargo", post(embargo))
        .route("/v1/artifacts/:id/lift-embargo", post(lift_embargo))
}

type Operation =
    fn(&LifecycleController, ArtifactId, Invocation) -> Result<TransitionReport, ControllerError>;

async fn run(
    state: AppState,
    caller: Caller,
    id: Uuid,
    operation: Operation,
) -> Result<Json<TransitionResponse>, AppError> {
    let report = operation(&state.controller, ArtifactId::from(id), caller.invocation())?;
    Ok(Json(committed(&state, report).await?))
}

/// POST /v1/artifacts/:id/submit — Draft → PendingReview.
#[utoipa::path(
    post,
    path = "/v1/artifacts/{id}/submit",
    params(("id" = Uuid, Path, description = "Artifact ID")),
    responses(
        (status = 200, description = "Submitted for review", body = TransitionResponse),
        (status = 403, description = "Requires write", body = crate::error::ErrorBody),
        (status = 409, description = "Not a draft", body = crate::error::ErrorBody),
    ),
    tag = "transitions"
)]
pub(crate) async fn submit(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<TransitionResponse>, AppError> {
    run(state, caller, id, LifecycleController::submit_for_review).await
}

/// POST /v1/artifacts/:id/return-to-draft — Moderator sends a submission back.
#[utoipa::path(
    post,
    path = "/v1/artifacts/{id}/return-to-draft",
    params(("id" = Uuid, Path, description = "Artifact ID")),
    responses(
        (status = 200, description = "Returned to draft", body = TransitionResponse),
        (status = 409, description = "Not pending review", body = crate::error::ErrorBody),
    ),
    tag = "transitions"
)]
pub(crate) async fn return_to_draft(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<TransitionResponse>, AppError> {
    run(state, caller, id, LifecycleController::return_to_draft).await
}

/// POST /v1/artifacts/:id/make-public
#[utoipa::path(
    post,
    path = "/v1/artifacts/{id}/make-public",
    params(("id" = Uuid, Path, description = "Artifact ID")),
    responses(
        (status = 200, description = "Artifact is public", body = TransitionResponse),
        (status = 403, description = "Requires admin", body = crate::error::ErrorBody),
        (status = 409, description = "Invalid transition or concurrent change", body = crate::error::ErrorBody),
        (status = 422, description = "Flagged as spam", body = crate::error::ErrorBody),
    ),
    tag = "transitions"
)]
pub(crate) async fn make_public(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<TransitionResponse>, AppError> {
    run(state, caller, id, LifecycleController::make_public).await
}

/// POST /v1/artifacts/:id/make-private — Public → Draft. Never for published artifacts.
#[utoipa::path(
    post,
    path = "/v1/artifacts/{id}/make-private",
    params(("id" = Uuid, Path, description = "Artifact ID")),
    responses(
        (status = 200, description = "Artifact is private", body = TransitionResponse),
        (status = 409, description = "Published artifacts cannot be hidden", body = crate::error::ErrorBody),
    ),
    tag = "transitions"
)]
pub(crate) async fn make_private(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<TransitionResponse>, AppError> {
    run(state, caller, id, LifecycleController::make_private).await
}

/// POST /v1/artifacts/:id/publish — Idempotent.
#[utoipa::path(
    post,
    path = "/v1/artifacts/{id}/publish",
    params(("id" = Uuid, Path, description = "Artifact ID")),
    responses(
        (status = 200, description = "Published, or already published (changed = false)", body = TransitionResponse),
        (status = 409, description = "Not public", body = crate::error::ErrorBody),
        (status = 422, description = "Publication requirements not met", body = crate::error::ErrorBody),
    ),
    tag = "transitions"
)]
pub(crate) async fn publish(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<TransitionResponse>, AppError> {
    run(state, caller, id, LifecycleController::make_published).await
}

/// POST /v1/artifacts/:id/force-withdraw — Admin withdrawal of a public or published artifact.
#[utoipa::path(
    post,
    path = "/v1/artifacts/{id}/force-withdraw",
    params(("id" = Uuid, Path, description = "Artifact ID")),
    request_body = ForceWithdrawRequest,
    responses(
        (status = 200, description = "Artifact withdrawn", body = TransitionResponse),
        (status = 409, description = "A withdrawal request is pending", body = crate::error::ErrorBody),
    ),
    tag = "transitions"
)]
pub(crate) async fn force_withdraw(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    body: Result<Json<ForceWithdrawRequest>, JsonRejection>,
) -> Result<Json<TransitionResponse>, AppError> {
    let req = extract_validated_json(body)?;
    let report = state.controller.force_withdraw(
        ArtifactId::from(id),
        caller.invocation(),
        req.justification,
    )?;
    Ok(Json(committed(&state, report).await?))
}

/// POST /v1/artifacts/:id/unwithdraw — Restore the pre-withdrawal state.
#[utoipa::path(
    post,
    path = "/v1/artifacts/{id}/unwithdraw",
    params(("id" = Uuid, Path, description = "Artifact ID")),
    responses(
        (status = 200, description = "Artifact restored", body = TransitionResponse),
        (status = 409, description = "Not withdrawn", body = crate::error::ErrorBody),
    ),
    tag = "transitions"
)]
pub(crate) async fn unwithdraw(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<TransitionResponse>, AppError> {
    run(state, caller, id, LifecycleController::unwithdraw).await
}

/// POST /v1/artifacts/:id/spam
#[utoipa::path(
    post,
    path = "/v1/artifacts/{id}/spam",
    params(("id" = Uuid, Path, description = "Artifact ID")),
    responses(
        (status = 200, description = "Flagged (changed = false if already flagged)", body = TransitionResponse),
    ),
    tag = "moderation"
)]
pub(crate) async fn flag_spam(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<TransitionResponse>, AppError> {
    run(state, caller, id, LifecycleController::flag_spam).await
}

/// POST /v1/artifacts/:id/unspam
#[utoipa::path(
    post,
    path = "/v1/artifacts/{id}/unspam",
    params(("id" = Uuid, Path, description = "Artifact ID")),
    responses(
        (status = 200, description = "Cleared (changed = false if not flagged)", body = TransitionResponse),
    ),
    tag = "moderation"
)]
pub(crate) async fn clear_spam(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<TransitionResponse>, AppError> {
    run(state, caller, id, LifecycleController::clear_spam).await
}

/// POST /v1/artifacts/:id/delete — Soft-delete a never-visible artifact.
#[utoipa::path(
    post,
    path = "/v1/artifacts/{id}/delete",
    params(("id" = Uuid, Path, description = "Artifact ID")),
    responses(
        (status = 200, description = "Artifact deleted", body = TransitionResponse),
        (status = 409, description = "Artifact has been visible", body = crate::error::ErrorBody),
    ),
    tag = "transitions"
)]
pub(crate) async fn delete(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<TransitionResponse>, AppError> {
    run(state, caller, id, LifecycleController::delete).await
}

/// POST /v1/artifacts/:id/embargo — Keep a draft or submission private until a date.
#[utoipa::path(
    post,
    path = "/v1/artifacts/{id}/embargo",
    params(("id" = Uuid, Path, description = "Artifact ID")),
    request_body = EmbargoRequest,
    responses(
        (status = 200, description = "Embargo set", body = TransitionResponse),
        (status = 403, description = "Requires admin", body = crate::error::ErrorBody),
        (status = 409, description = "Artifact has been visible", body = crate::error::ErrorBody),
        (status = 422, description = "End date invalid or not in the future", body = crate::error::ErrorBody),
    ),
    tag = "transitions"
)]
pub(crate) async fn embargo(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    body: Result<Json<EmbargoRequest>, JsonRejection>,
) -> Result<Json<TransitionResponse>, AppError> {
    let req = extract_validated_json(body)?;
    let until = Timestamp::parse(&req.until)?;
    let report = state
        .controller
        .embargo(ArtifactId::from(id), caller.invocation(), until)?;
    Ok(Json(committed(&state, report).await?))
}

/// POST /v1/artifacts/:id/lift-embargo — End an embargo early and make the artifact public.
#[utoipa::path(
    post,
    path = "/v1/artifacts/{id}/lift-embargo",
    params(("id" = Uuid, Path, description = "Artifact ID")),
    responses(
        (status = 200, description = "Artifact is public", body = TransitionResponse),
        (status = 403, description = "Requires admin", body = crate::error::ErrorBody),
        (status = 422, description = "Not embargoed, or flagged as spam", body = crate::error::ErrorBody),
    ),
    tag = "transitions"
)]
pub(crate) async fn lift_embargo(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<TransitionResponse>, AppError> {
    run(state, caller, id, LifecycleController::lift_embargo).await
}
