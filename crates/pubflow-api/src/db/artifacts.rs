//! Artifact persistence operations.
//!
//! All functions take a `&PgPool` and operate on the `artifacts` table.
//! Lifecycle rules are enforced by the controller, not in SQL; the only
//! database-side guard is that an older revision never overwrites a newer
//! one.

use pubflow_state::Artifact;
use sqlx::PgPool;
use uuid::Uuid;

/// Insert or update an artifact snapshot.
///
/// Returns `false` when the stored row already holds a newer revision and
/// the write was skipped.
pub async fn upsert(pool: &PgPool, artifact: &Artifact) -> Result<bool, sqlx::Error> {
    let document = serde_json::to_value(artifact)
        .map_err(|e| sqlx::Error::Protocol(format!("failed to serialize artifact: {e}")))?;
    let revision = i64::try_from(artifact.revision)
        .map_err(|_| sqlx::Error::Protocol("artifact revision out of range".to_string()))?;
    let version = i32::try_from(artifact.version)
        .map_err(|_| sqlx::Error::Protocol("artifact version out of range".to_string()))?;

    let result = sqlx::query(
        "INSERT INTO artifacts (id, state, revision, version, previous_version, document, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
         ON CONFLICT (id) DO UPDATE SET
             state = EXCLUDED.state,
             revision = EXCLUDED.revision,
             document = EXCLUDED.document,
             updated_at = EXCLUDED.updated_at
         WHERE artifacts.revision < EXCLUDED.revision",
    )
    .bind(*artifact.id.as_uuid())
    .bind(artifact.state.name())
    .bind(revision)
    .bind(version)
    .bind(artifact.previous_version.map(|id| *id.as_uuid()))
    .bind(&document)
    .bind(*artifact.created_at.as_datetime())
    .bind(*artifact.modified_at.as_datetime())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Load every artifact, oldest first so version chains hydrate in order.
///
/// Rows whose document no longer deserializes are skipped with a warning.
pub async fn load_all(pool: &PgPool) -> Result<Vec<Artifact>, sqlx::Error> {
    let rows = sqlx::query_as::<_, ArtifactRow>(
        "SELECT id, document FROM artifacts ORDER BY created_at, version",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().filter_map(ArtifactRow::into_artifact).collect())
}

/// Internal row type for SQLx mapping.
#[derive(sqlx::FromRow)]
struct ArtifactRow {
    id: Uuid,
    document: serde_json::Value,
}

impl ArtifactRow {
    fn into_artifact(self) -> Option<Artifact> {
        match serde_json::from_value::<Artifact>(self.document) {
            Ok(artifact) if *artifact.id.as_uuid() == self.id => Some(artifact),
            Ok(artifact) => {
                tracing::warn!(
                    id = %self.id,
                    document_id = %artifact.id,
                    "artifact document id does not match its row, skipping"
                );
                None
            }
            Err(e) => {
                tracing::warn!(id = %self.id, error = %e, "unreadable artifact document, skipping");
                None
            }
        }
    }
}
