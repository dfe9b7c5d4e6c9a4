//! # Artifact API
//!
//! Creation, reads, metadata edits, contributor roles, version chains,
//! and the per-artifact audit trail. Lifecycle transitions live in
//! [`super::transitions`].

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use pubflow_core::{ActorId, ArtifactId, Capability};
use pubflow_lifecycle::AuditEntry;
use pubflow_state::{Artifact, MetadataPatch, NewArtifact};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{committed, persist, PaginationParams, TransitionResponse};
use crate::error::AppError;
use crate::extractors::{extract_validated_json, Caller, Validate};
use crate::state::AppState;

const MAX_TITLE_LEN: usize = 512;
const MAX_TAGS: usize = 64;

/// Request to create an artifact.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateArtifactRequest {
    pub title: String,
    /// Parent container (project) reference.
    pub parent: Option<String>,
    /// Subjects.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Storage reference of the primary file.
    pub primary_file: Option<String>,
}

impl Validate for CreateArtifactRequest {
    fn validate(&self) -> Result<(), String> {
        validate_title(&self.title)?;
        validate_tags(&self.tags)
    }
}

impl From<CreateArtifactRequest> for NewArtifact {
    fn from(req: CreateArtifactRequest) -> Self {
        NewArtifact {
            title: req.title,
            parent: req.parent,
            tags: req.tags,
            primary_file: req.primary_file,
        }
    }
}

/// Partial metadata update. Omitted fields are left unchanged.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateMetadataRequest {
    pub title: Option<String>,
    /// Replaces the whole tag set.
    pub tags: Option<Vec<String>>,
    pub primary_file: Option<String>,
    pub parent: Option<String>,
}

impl Validate for UpdateMetadataRequest {
    fn validate(&self) -> Result<(), String> {
        if self.title.is_none()
            && self.tags.is_none()
            && self.primary_file.is_none()
            && self.parent.is_none()
        {
            return Err("at least one field must be provided".to_string());
        }
        if let Some(title) = &self.title {
            validate_title(title)?;
        }
        if let Some(tags) = &self.tags {
            validate_tags(tags)?;
        }
        Ok(())
    }
}

impl From<UpdateMetadataRequest> for MetadataPatch {
    fn from(req: UpdateMetadataRequest) -> Self {
        MetadataPatch {
            title: req.title,
            tags: req.tags,
            primary_file: req.primary_file,
            parent: req.parent,
        }
    }
}

/// Set, change, or remove (`role: null`) a contributor.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SetContributorRequest {
    /// One of `read`, `write`, `admin`, or null to remove.
    pub role: Option<String>,
}

impl Validate for SetContributorRequest {
    fn validate(&self) -> Result<(), String> {
        self.capability().map(|_| ())
    }
}

impl SetContributorRequest {
    fn capability(&self) -> Result<Option<Capability>, String> {
        self.role
            .as_deref()
            .map(|name| Capability::from_name(name).map_err(|e| e.to_string()))
            .transpose()
    }
}

fn validate_title(title: &str) -> Result<(), String> {
    if title.len() > MAX_TITLE_LEN {
        return Err(format!("title must not exceed {MAX_TITLE_LEN} characters"));
    }
    Ok(())
}

fn validate_tags(tags: &[String]) -> Result<(), String> {
    if tags.len() > MAX_TAGS {
        return Err(format!("at most {MAX_TAGS} tags are allowed"));
    }
    if tags.iter().any(|t| t.trim().is_empty()) {
        return Err("tags must not be blank".to_string());
    }
    Ok(())
}

/// A single artifact.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ArtifactResponse {
    #[schema(value_type = Object)]
    pub artifact: Artifact,
}

/// A page of artifacts.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ArtifactListResponse {
    #[schema(value_type = Vec<Object>)]
    pub artifacts: Vec<Artifact>,
    /// Number of matching artifacts before pagination.
    pub total: usize,
}

/// Audit entries for one artifact, oldest first.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuditResponse {
    #[schema(value_type = Vec<Object>)]
    pub entries: Vec<AuditEntry>,
}

/// Build the artifact router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/artifacts", post(create_artifact).get(list_artifacts))
        .route("/v1/artifacts/:id", get(get_artifact).patch(update_metadata))
        .route("/v1/artifacts/:id/contributors/:actor", put(set_contributor))
        .route(
            "/v1/artifacts/:id/versions",
            post(assign_new_version).get(list_versions),
        )
        .route("/v1/artifacts/:id/versions/latest", get(latest_version))
        .route("/v1/artifacts/:id/audit", get(audit_trail))
}

/// POST /v1/artifacts — Create a draft. The caller becomes its admin.
#[utoipa::path(
    post,
    path = "/v1/artifacts",
    request_body = CreateArtifactRequest,
    responses(
        (status = 201, description = "Draft created", body = ArtifactResponse),
        (status = 401, description = "Missing actor", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "artifacts"
)]
pub(crate) async fn create_artifact(
    State(state): State<AppState>,
    caller: Caller,
    body: Result<Json<CreateArtifactRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ArtifactResponse>), AppError> {
    let req = extract_validated_json(body)?;
    let artifact = state.controller.create_artifact(caller.actor(), req.into());
    persist(&state, &artifact).await?;
    Ok((StatusCode::CREATED, Json(ArtifactResponse { artifact })))
}

/// GET /v1/artifacts — Artifacts visible to the caller, oldest first.
#[utoipa::path(
    get,
    path = "/v1/artifacts",
    params(
        ("limit" = Option<usize>, Query, description = "Max items to return (default 100, max 1000)"),
        ("offset" = Option<usize>, Query, description = "Items to skip (default 0)"),
    ),
    responses(
        (status = 200, description = "Visible artifacts", body = ArtifactListResponse),
    ),
    tag = "artifacts"
)]
pub(crate) async fn list_artifacts(
    State(state): State<AppState>,
    caller: Caller,
    Query(pagination): Query<PaginationParams>,
) -> Json<ArtifactListResponse> {
    let visible = state.controller.list_visible(caller.actor());
    let total = visible.len();
    Json(ArtifactListResponse {
        artifacts: pagination.page(visible),
        total,
    })
}

/// GET /v1/artifacts/:id — Fetch one artifact.
#[utoipa::path(
    get,
    path = "/v1/artifacts/{id}",
    params(("id" = Uuid, Path, description = "Artifact ID")),
    responses(
        (status = 200, description = "Artifact", body = ArtifactResponse),
        (status = 403, description = "Not visible to the caller", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "artifacts"
)]
pub(crate) async fn get_artifact(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<ArtifactResponse>, AppError> {
    let artifact = state
        .controller
        .view(ArtifactId::from(id), caller.actor())?;
    Ok(Json(ArtifactResponse { artifact }))
}

/// PATCH /v1/artifacts/:id — Edit metadata on an editable version.
#[utoipa::path(
    patch,
    path = "/v1/artifacts/{id}",
    params(("id" = Uuid, Path, description = "Artifact ID")),
    request_body = UpdateMetadataRequest,
    responses(
        (status = 200, description = "Metadata updated", body = TransitionResponse),
        (status = 403, description = "Permission denied", body = crate::error::ErrorBody),
        (status = 409, description = "Artifact not editable", body = crate::error::ErrorBody),
    ),
    tag = "artifacts"
)]
pub(crate) async fn update_metadata(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    body: Result<Json<UpdateMetadataRequest>, JsonRejection>,
) -> Result<Json<TransitionResponse>, AppError> {
    let req = extract_validated_json(body)?;
    let report = state.controller.update_metadata(
        ArtifactId::from(id),
        caller.invocation(),
        req.into(),
    )?;
    Ok(Json(committed(&state, report).await?))
}

/// PUT /v1/artifacts/:id/contributors/:actor — Set a contributor's role.
#[utoipa::path(
    put,
    path = "/v1/artifacts/{id}/contributors/{actor}",
    params(
        ("id" = Uuid, Path, description = "Artifact ID"),
        ("actor" = Uuid, Path, description = "Contributor actor ID"),
    ),
    request_body = SetContributorRequest,
    responses(
        (status = 200, description = "Contributors updated", body = TransitionResponse),
        (status = 403, description = "Permission denied", body = crate::error::ErrorBody),
        (status = 422, description = "Would remove the last admin", body = crate::error::ErrorBody),
    ),
    tag = "artifacts"
)]
pub(crate) async fn set_contributor(
    State(state): State<AppState>,
    caller: Caller,
    Path((id, actor)): Path<(Uuid, Uuid)>,
    body: Result<Json<SetContributorRequest>, JsonRejection>,
) -> Result<Json<TransitionResponse>, AppError> {
    let req = extract_validated_json(body)?;
    let role = req.capability().map_err(AppError::Validation)?;
    let report = state.controller.set_contributor(
        ArtifactId::from(id),
        caller.invocation(),
        ActorId::from(actor),
        role,
    )?;
    Ok(Json(committed(&state, report).await?))
}

/// POST /v1/artifacts/:id/versions — Start the next version as a draft.
#[utoipa::path(
    post,
    path = "/v1/artifacts/{id}/versions",
    params(("id" = Uuid, Path, description = "Latest artifact version ID")),
    responses(
        (status = 201, description = "New version created", body = TransitionResponse),
        (status = 403, description = "Permission denied", body = crate::error::ErrorBody),
        (status = 409, description = "Source is not the latest version", body = crate::error::ErrorBody),
    ),
    tag = "versions"
)]
pub(crate) async fn assign_new_version(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<TransitionResponse>), AppError> {
    let report = state
        .controller
        .assign_new_version(ArtifactId::from(id), caller.invocation())?;
    Ok((StatusCode::CREATED, Json(committed(&state, report).await?)))
}

/// GET /v1/artifacts/:id/versions — The version chain, oldest first.
#[utoipa::path(
    get,
    path = "/v1/artifacts/{id}/versions",
    params(("id" = Uuid, Path, description = "Any version in the chain")),
    responses(
        (status = 200, description = "Visible versions", body = ArtifactListResponse),
    ),
    tag = "versions"
)]
pub(crate) async fn list_versions(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<ArtifactListResponse>, AppError> {
    let artifacts = state
        .controller
        .versions(ArtifactId::from(id), caller.actor())?;
    Ok(Json(ArtifactListResponse {
        total: artifacts.len(),
        artifacts,
    }))
}

/// GET /v1/artifacts/:id/versions/latest — The newest version in the chain.
#[utoipa::path(
    get,
    path = "/v1/artifacts/{id}/versions/latest",
    params(("id" = Uuid, Path, description = "Any version in the chain")),
    responses(
        (status = 200, description = "Latest version", body = ArtifactResponse),
    ),
    tag = "versions"
)]
pub(crate) async fn latest_version(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<ArtifactResponse>, AppError> {
    let latest = state.controller.latest_version(ArtifactId::from(id))?;
    let artifact = state.controller.view(latest.id, caller.actor())?;
    Ok(Json(ArtifactResponse { artifact }))
}

/// GET /v1/artifacts/:id/audit — Committed and rejected operations.
#[utoipa::path(
    get,
    path = "/v1/artifacts/{id}/audit",
    params(("id" = Uuid, Path, description = "Artifact ID")),
    responses(
        (status = 200, description = "Audit entries", body = AuditResponse),
        (status = 403, description = "Not visible to the caller", body = crate::error::ErrorBody),
    ),
    tag = "artifacts"
)]
pub(crate) async fn audit_trail(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<AuditResponse>, AppError> {
    let id = ArtifactId::from(id);
    state.controller.view(id, caller.actor())?;
    Ok(Json(AuditResponse {
        entries: state.controller.audit_entries(id),
    }))
}
