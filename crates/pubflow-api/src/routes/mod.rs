//! # Route Modules
//!
//! - [`artifacts`]: create, read, metadata, contributors, versions, audit.
//! - [`transitions`]: one `POST` per lifecycle operation.
//! - [`withdrawals`]: filing and resolving withdrawal requests.
//!
//! Mutating handlers return a [`TransitionResponse`] and, when something
//! was committed, write the snapshot through to the database.

pub mod artifacts;
pub mod transitions;
pub mod withdrawals;

use axum::Router;
use pubflow_lifecycle::TransitionReport;
use pubflow_state::{Artifact, Effect};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::AppError;
use crate::state::AppState;

/// All `/v1` routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(artifacts::router())
        .merge(transitions::router())
        .merge(withdrawals::router())
}

/// Outcome of a mutating operation.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TransitionResponse {
    /// The committed snapshot. For a new version, the new artifact.
    #[schema(value_type = Object)]
    pub artifact: Artifact,
    /// False when the operation was an idempotent no-op.
    pub changed: bool,
    /// Effects handed to the notifier.
    #[schema(value_type = Vec<Object>)]
    pub effects: Vec<Effect>,
    /// Problems after commit, such as a full effect queue.
    pub warnings: Vec<String>,
}

impl From<TransitionReport> for TransitionResponse {
    fn from(report: TransitionReport) -> Self {
        Self {
            artifact: report.artifact,
            changed: report.changed,
            effects: report.effects,
            warnings: report.warnings,
        }
    }
}

/// Pagination parameters for list endpoints.
#[derive(Debug, Deserialize, Default, ToSchema)]
pub struct PaginationParams {
    /// Maximum number of items to return (default: 100, max: 1000).
    pub limit: Option<usize>,
    /// Number of items to skip (default: 0).
    pub offset: Option<usize>,
}

impl PaginationParams {
    const DEFAULT_LIMIT: usize = 100;
    const MAX_LIMIT: usize = 1000;

    pub(crate) fn page<T>(&self, items: Vec<T>) -> Vec<T> {
        let limit = self.limit.unwrap_or(Self::DEFAULT_LIMIT).min(Self::MAX_LIMIT);
        let offset = self.offset.unwrap_or(0).min(items.len());
        items.into_iter().skip(offset).take(limit).collect()
    }
}

/// Write a committed report through to the database and convert it.
///
/// A persist failure is surfaced to the client: the in-memory snapshot is
/// already committed, but it would be lost on restart.
pub(crate) async fn committed(
    state: &AppState,
    report: TransitionReport,
) -> Result<TransitionResponse, AppError> {
    if report.changed {
        persist(state, &report.artifact).await?;
    }
    Ok(report.into())
}

pub(crate) async fn persist(state: &AppState, artifact: &Artifact) -> Result<(), AppError> {
    let Some(pool) = &state.db_pool else {
        return Ok(());
    };
    match crate::db::artifacts::upsert(pool, artifact).await {
        Ok(true) => Ok(()),
        Ok(false) => {
            tracing::debug!(
                artifact = %artifact.id,
                revision = artifact.revision,
                "newer revision already persisted"
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!(artifact = %artifact.id, error = %e, "failed to persist artifact");
            Err(AppError::Internal(
                "artifact committed in-memory but database persist failed".to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_defaults_and_clamps() {
        let items: Vec<u32> = (0..10).collect();
        assert_eq!(PaginationParams::default().page(items.clone()).len(), 10);

        let params = PaginationParams {
            limit: Some(3),
            offset: Some(8),
        };
        assert_eq!(params.page(items.clone()), vec![8, 9]);

        let params = PaginationParams {
            limit: None,
            offset: Some(50),
        };
        assert!(params.page(items).is_empty());
    }
}
