//! # Custom Extractors & Validation
//!
//! Provides the [`Validate`] trait for request DTOs, helpers to extract and
//! validate JSON bodies, and the [`Caller`] extractor that turns the
//! `X-Actor-Id` and `If-Match` headers into an [`Invocation`].

use axum::async_trait;
use axum::extract::rejection::JsonRejection;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::Json;
use pubflow_core::ActorId;
use pubflow_lifecycle::Invocation;

use crate::error::AppError;

/// Header carrying the acting identity, set by the upstream gateway.
pub const ACTOR_HEADER: &str = "x-actor-id";

/// Trait for request types that can validate their business rules
/// beyond what serde deserialization checks.
pub trait Validate {
    /// Validate business rules. Returns an error message on failure.
    fn validate(&self) -> Result<(), String>;
}

/// Extract a JSON body, mapping deserialization errors to [`AppError::BadRequest`].
pub fn extract_json<T>(result: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    result
        .map(|Json(v)| v)
        .map_err(|err| AppError::BadRequest(err.body_text()))
}

/// Extract a JSON body and validate it using the [`Validate`] trait.
pub fn extract_validated_json<T: Validate>(
    result: Result<Json<T>, JsonRejection>,
) -> Result<T, AppError> {
    let value = extract_json(result)?;
    value.validate().map_err(AppError::Validation)?;
    Ok(value)
}

/// The acting identity and the artifact revision it last observed.
///
/// `If-Match` accepts the revision number bare or quoted (`3`, `"3"`,
/// `W/"3"`). Without it, no optimistic check is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller(pub Invocation);

impl Caller {
    pub fn actor(&self) -> ActorId {
        self.0.actor
    }

    pub fn invocation(&self) -> Invocation {
        self.0
    }

    fn from_headers(headers: &HeaderMap) -> Result<Self, AppError> {
        let raw = headers
            .get(ACTOR_HEADER)
            .ok_or_else(|| AppError::Unauthorized(format!("missing {ACTOR_HEADER} header")))?;
        let actor = raw
            .to_str()
            .ok()
            .and_then(|s| ActorId::parse(s.trim()).ok())
            .ok_or_else(|| AppError::Unauthorized(format!("malformed {ACTOR_HEADER} header")))?;
        if actor.is_system() {
            return Err(AppError::Unauthorized(
                "the system actor cannot be used by callers".to_string(),
            ));
        }

        let mut invocation = Invocation::new(actor);
        if let Some(value) = headers.get(axum::http::header::IF_MATCH) {
            let revision = value
                .to_str()
                .ok()
                .and_then(parse_revision)
                .ok_or_else(|| {
                    AppError::BadRequest("If-Match must carry an artifact revision".to_string())
                })?;
            invocation = invocation.expecting(revision);
        }
        Ok(Self(invocation))
    }
}

fn parse_revision(raw: &str) -> Option<u64> {
    let tag = raw.trim();
    let tag = tag.strip_prefix("W/").unwrap_or(tag);
    tag.trim_matches('"').parse().ok()
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Self::from_headers(&parts.headers)
    }
}
