//! # OpenAPI Document Assembly
//!
//! Assembles the utoipa-documented routes into one OpenAPI document,
//! served at `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::state::AppState;

/// Documents the `X-Actor-Id` header as an API-key style scheme.
struct ActorHeaderAddon;

impl Modify for ActorHeaderAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "actor_id",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                    "X-Actor-Id",
                    "Acting identity, set by the upstream gateway.",
                ))),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Pubflow API",
        version = "0.1.0",
        description = "Publication lifecycle for research artifacts: visibility, publication, withdrawal, and versioning."
    ),
    paths(
        crate::routes::artifacts::create_artifact,
        crate::routes::artifacts::list_artifacts,
        crate::routes::artifacts::get_artifact,
        crate::routes::artifacts::update_metadata,
        crate::routes::artifacts::set_contributor,
        crate::routes::artifacts::assign_new_version,
        crate::routes::artifacts::list_versions,
        crate::routes::artifacts::latest_version,
        crate::routes::artifacts::audit_trail,
        crate::routes::transitions::submit,
        crate::routes::transitions::return_to_draft,
        crate::routes::transitions::make_public,
        crate::routes::transitions::make_private,
        crate::routes::transitions::publish,
        crate::routes::transitions::force_withdraw,
        crate::routes::transitions::unwithdraw,
        crate::routes::transitions::flag_spam,
        crate::routes::transitions::clear_spam,
        crate::routes::transitions::delete,
        crate::routes::transitions::embargo,
        crate::routes::transitions::lift_embargo,
        crate::routes::withdrawals::request_withdrawal,
        crate::routes::withdrawals::get_request,
        crate::routes::withdrawals::resolve_withdrawal,
    ),
    components(schemas(
        crate::error::ErrorBody,
        crate::error::ErrorDetail,
        crate::routes::TransitionResponse,
        crate::routes::PaginationParams,
        crate::routes::artifacts::CreateArtifactRequest,
        crate::routes::artifacts::UpdateMetadataRequest,
        crate::routes::artifacts::SetContributorRequest,
        crate::routes::artifacts::ArtifactResponse,
        crate::routes::artifacts::ArtifactListResponse,
        crate::routes::artifacts::AuditResponse,
        crate::routes::transitions::ForceWithdrawRequest,
        crate::routes::transitions::EmbargoRequest,
        crate::routes::withdrawals::FileWithdrawalRequest,
        crate::routes::withdrawals::ResolveWithdrawalRequest,
        crate::routes::withdrawals::WithdrawalFiledResponse,
        crate::routes::withdrawals::WithdrawalRequestResponse,
    )),
    modifiers(&ActorHeaderAddon),
    tags(
        (name = "artifacts", description = "Artifact records, metadata and contributors"),
        (name = "transitions", description = "Lifecycle state changes"),
        (name = "withdrawals", description = "Withdrawal requests and their resolution"),
        (name = "versions", description = "Version chains"),
        (name = "moderation", description = "Spam flagging"),
    )
)]
pub struct ApiDoc;

/// Router serving the generated document.
pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

/// GET /openapi.json
async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
