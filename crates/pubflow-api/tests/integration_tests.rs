//! # Integration Tests for pubflow-api
//!
//! Drives the router with `tower::ServiceExt::oneshot`: health checks,
//! actor handling, the publish/withdraw/restore flow, error mapping,
//! optimistic revisions, versioning, and effect delivery through a real
//! notifier.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use pubflow_api::state::{AppConfig, AppState};
use pubflow_core::ActorId;
use pubflow_notify::{
    BackoffPolicy, Collaborators, Notifier, NotifierConfig, RecordingCollaborator,
};
use pubflow_state::Effect;

struct TestApp {
    app: Router,
    owner: ActorId,
    moderator: ActorId,
    notifier: Notifier,
    recorder: Arc<RecordingCollaborator>,
}

/// Helper: build the app with one configured moderator and a recording
/// notifier with fast retries.
fn test_app() -> TestApp {
    let moderator = ActorId::new();
    let recorder = Arc::new(RecordingCollaborator::new());
    let config = AppConfig {
        moderators: vec![moderator],
        notifier: NotifierConfig {
            queue_capacity: 64,
            max_in_flight: 8,
            backoff: BackoffPolicy {
                base: Duration::from_millis(1),
                max: Duration::from_millis(5),
                max_attempts: 3,
            },
        },
        ..AppConfig::default()
    };
    let notifier = Notifier::start(Collaborators::uniform(recorder.clone()), config.notifier);
    let state = AppState::with_notifier(config, notifier.handle());
    TestApp {
        app: pubflow_api::app(state).unwrap(),
        owner: ActorId::new(),
        moderator,
        notifier,
        recorder,
    }
}

/// Helper: read response body as string.
async fn body_string(response: axum::http::Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

impl TestApp {
    async fn call(
        &self,
        method: &str,
        uri: &str,
        actor: Option<ActorId>,
        if_match: Option<u64>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(actor) = actor {
            builder = builder.header("x-actor-id", actor.to_string());
        }
        if let Some(revision) = if_match {
            builder = builder.header("if-match", format!("\"{revision}\""));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let text = body_string(response).await;
        let value = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };
        (status, value)
    }

    async fn post(&self, uri: &str, actor: ActorId, body: Option<Value>) -> (StatusCode, Value) {
        self.call("POST", uri, Some(actor), None, body).await
    }

    async fn get(&self, uri: &str, actor: ActorId) -> (StatusCode, Value) {
        self.call("GET", uri, Some(actor), None, None).await
    }

    /// Create a publishable draft owned by `self.owner`; returns its id.
    async fn create(&self) -> String {
        let (status, body) = self
            .post(
                "/v1/artifacts",
                self.owner,
                Some(json!({
                    "title": "Sleep and memory consolidation",
                    "parent": "project-7",
                    "tags": ["neuroscience"],
                    "primary_file": "osfstorage/5f1e"
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["artifact"]["id"].as_str().unwrap().to_string()
    }

    async fn publish(&self, id: &str) {
        let (status, _) = self
            .post(&format!("/v1/artifacts/{id}/make-public"), self.owner, None)
            .await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = self
            .post(&format!("/v1/artifacts/{id}/publish"), self.owner, None)
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
    }
}

// -- Health Checks ------------------------------------------------------------

#[tokio::test]
async fn test_liveness() {
    let t = test_app();
    let response = t
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health/liveness")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "ok");
}

#[tokio::test]
async fn test_readiness() {
    let t = test_app();
    let response = t
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health/readiness")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "ready");
}

#[tokio::test]
async fn test_openapi_document_served() {
    let t = test_app();
    let (status, body) = t.call("GET", "/openapi.json", None, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/v1/artifacts/{id}/publish"].is_object());
}

// -- Actor handling -----------------------------------------------------------

#[tokio::test]
async fn test_missing_actor_is_401() {
    let t = test_app();
    let (status, body) = t
        .call("POST", "/v1/artifacts", None, None, Some(json!({"title": "x"})))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_malformed_body_is_400() {
    let t = test_app();
    let response = t
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/artifacts")
                .header("x-actor-id", t.owner.to_string())
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// -- Lifecycle ----------------------------------------------------------------

#[tokio::test]
async fn test_publish_withdraw_restore_flow() {
    let t = test_app();
    let id = t.create().await;
    t.publish(&id).await;

    let (_, first) = t.get(&format!("/v1/artifacts/{id}"), t.owner).await;
    assert_eq!(first["artifact"]["state"], "PUBLISHED");
    let published_at = first["artifact"]["published_at"].clone();
    assert!(!published_at.is_null());

    // Publishing again is a no-op.
    let (status, again) = t
        .post(&format!("/v1/artifacts/{id}/publish"), t.owner, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["changed"], false);
    assert_eq!(again["artifact"]["published_at"], published_at);
    assert_eq!(again["effects"], json!([]));

    let (status, filed) = t
        .post(
            &format!("/v1/artifacts/{id}/withdrawal-requests"),
            t.owner,
            Some(json!({"reason": "data error found"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{filed}");
    assert_eq!(filed["transition"]["artifact"]["state"], "WITHDRAWAL_PENDING");
    let request_id = filed["request_id"].as_str().unwrap().to_string();

    let (status, resolved) = t
        .post(
            &format!("/v1/withdrawal-requests/{request_id}/resolve"),
            t.moderator,
            Some(json!({"approve": true})),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{resolved}");
    assert_eq!(resolved["artifact"]["state"], json!({"WITHDRAWN": "PUBLISHED"}));
    assert_eq!(resolved["artifact"]["is_public"], false);
    assert_eq!(
        resolved["artifact"]["withdrawal_justification"],
        "data error found"
    );

    let (status, request) = t
        .get(&format!("/v1/withdrawal-requests/{request_id}"), t.owner)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(request["request"]["resolution"], "approved");

    let (status, restored) = t
        .post(&format!("/v1/artifacts/{id}/unwithdraw"), t.moderator, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(restored["artifact"]["state"], "PUBLISHED");
    assert_eq!(restored["artifact"]["is_public"], true);
    assert!(restored["artifact"]["withdrawn_at"].is_null());
}

#[tokio::test]
async fn test_resolving_twice_is_409() {
    let t = test_app();
    let id = t.create().await;
    t.publish(&id).await;
    let (_, filed) = t
        .post(
            &format!("/v1/artifacts/{id}/withdrawal-requests"),
            t.owner,
            Some(json!({"reason": "duplicate"})),
        )
        .await;
    let uri = format!(
        "/v1/withdrawal-requests/{}/resolve",
        filed["request_id"].as_str().unwrap()
    );

    let (status, rejected) = t.post(&uri, t.moderator, Some(json!({"approve": false}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rejected["artifact"]["state"], "PUBLISHED");

    let (status, body) = t.post(&uri, t.moderator, Some(json!({"approve": true}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "ALREADY_RESOLVED");
}

#[tokio::test]
async fn test_second_pending_request_is_409() {
    let t = test_app();
    let id = t.create().await;
    t.publish(&id).await;
    let uri = format!("/v1/artifacts/{id}/withdrawal-requests");
    let (status, _) = t.post(&uri, t.owner, Some(json!({"reason": "one"}))).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = t.post(&uri, t.owner, Some(json!({"reason": "two"}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICTING_REQUEST");
}

#[tokio::test]
async fn test_error_mapping() {
    let t = test_app();
    let id = t.create().await;
    let stranger = ActorId::new();

    // Stranger cannot make it public.
    let (status, body) = t
        .post(&format!("/v1/artifacts/{id}/make-public"), stranger, None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "PERMISSION_DENIED");

    // Draft cannot be published directly.
    let (status, body) = t
        .post(&format!("/v1/artifacts/{id}/publish"), t.owner, None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "INVALID_TRANSITION");

    // Public but without subjects: precondition fails.
    let (status, _) = t
        .call(
            "PATCH",
            &format!("/v1/artifacts/{id}"),
            Some(t.owner),
            None,
            Some(json!({"tags": []})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    t.post(&format!("/v1/artifacts/{id}/make-public"), t.owner, None)
        .await;
    let (status, body) = t
        .post(&format!("/v1/artifacts/{id}/publish"), t.owner, None)
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "PRECONDITION_FAILED");

    // Unknown artifact.
    let missing = uuid::Uuid::new_v4();
    let (status, body) = t
        .get(&format!("/v1/artifacts/{missing}"), t.owner)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_published_artifact_cannot_be_made_private() {
    let t = test_app();
    let id = t.create().await;
    t.publish(&id).await;
    let (status, body) = t
        .post(&format!("/v1/artifacts/{id}/make-private"), t.owner, None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "INVALID_TRANSITION");
}

#[tokio::test]
async fn test_stale_if_match_is_conflicting_transition() {
    let t = test_app();
    let id = t.create().await;
    let (_, current) = t.get(&format!("/v1/artifacts/{id}"), t.owner).await;
    let revision = current["artifact"]["revision"].as_u64().unwrap();

    let uri = format!("/v1/artifacts/{id}/make-public");
    let (status, _) = t
        .call("POST", &uri, Some(t.owner), Some(revision), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    // A second caller that observed the same revision loses.
    let (status, body) = t
        .call("POST", &uri, Some(t.owner), Some(revision), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICTING_TRANSITION");
}

// -- Reads, versions, contributors ---------------------------------------------

#[tokio::test]
async fn test_private_drafts_are_hidden_from_strangers() {
    let t = test_app();
    let id = t.create().await;
    let stranger = ActorId::new();

    let (status, _) = t.get(&format!("/v1/artifacts/{id}"), stranger).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (_, list) = t.get("/v1/artifacts", stranger).await;
    assert_eq!(list["total"], 0);

    t.post(&format!("/v1/artifacts/{id}/make-public"), t.owner, None)
        .await;
    let (status, _) = t.get(&format!("/v1/artifacts/{id}"), stranger).await;
    assert_eq!(status, StatusCode::OK);
    let (_, list) = t.get("/v1/artifacts?limit=10", stranger).await;
    assert_eq!(list["total"], 1);
}

#[tokio::test]
async fn test_versioning_over_http() {
    let t = test_app();
    let id = t.create().await;
    t.publish(&id).await;

    let (status, created) = t
        .post(&format!("/v1/artifacts/{id}/versions"), t.owner, None)
        .await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    assert_eq!(created["artifact"]["version"], 2);
    assert_eq!(created["artifact"]["state"], "DRAFT");
    assert_eq!(created["artifact"]["previous_version"], id.as_str());

    // Only the latest version can be versioned.
    let (status, _) = t
        .post(&format!("/v1/artifacts/{id}/versions"), t.owner, None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, chain) = t
        .get(&format!("/v1/artifacts/{id}/versions"), t.owner)
        .await;
    assert_eq!(chain["total"], 2);

    let (_, latest) = t
        .get(&format!("/v1/artifacts/{id}/versions/latest"), t.owner)
        .await;
    assert_eq!(latest["artifact"]["id"], created["artifact"]["id"]);
}

#[tokio::test]
async fn test_contributor_roles() {
    let t = test_app();
    let id = t.create().await;
    let writer = ActorId::new();

    let (status, _) = t
        .call(
            "PUT",
            &format!("/v1/artifacts/{id}/contributors/{writer}"),
            Some(t.owner),
            None,
            Some(json!({"role": "write"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    // The writer can submit but not make public.
    let (status, _) = t
        .post(&format!("/v1/artifacts/{id}/submit"), writer, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = t
        .post(&format!("/v1/artifacts/{id}/make-public"), writer, None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Removing the last admin is refused.
    let (status, body) = t
        .call(
            "PUT",
            &format!("/v1/artifacts/{id}/contributors/{}", t.owner),
            Some(t.owner),
            None,
            Some(json!({"role": null})),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "PRECONDITION_FAILED");

    let (status, body) = t
        .call(
            "PUT",
            &format!("/v1/artifacts/{id}/contributors/{writer}"),
            Some(t.owner),
            None,
            Some(json!({"role": "owner"})),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_audit_trail_records_rejections() {
    let t = test_app();
    let id = t.create().await;
    t.post(&format!("/v1/artifacts/{id}/make-private"), t.owner, None)
        .await;
    t.post(&format!("/v1/artifacts/{id}/make-public"), t.owner, None)
        .await;

    let (status, audit) = t.get(&format!("/v1/artifacts/{id}/audit"), t.owner).await;
    assert_eq!(status, StatusCode::OK);
    let entries = audit["entries"].as_array().unwrap();
    assert!(entries.len() >= 3, "{audit}");
}

// -- Effects --------------------------------------------------------------------

#[tokio::test]
async fn test_effects_reach_collaborators() {
    let t = test_app();
    let id = t.create().await;
    t.publish(&id).await;

    let report = t.notifier.shutdown().await;
    assert_eq!(report.failed, 0);
    let delivered = t.recorder.delivered();
    assert!(delivered
        .iter()
        .any(|e| matches!(e, Effect::ResyncMetadata(a) if a.to_string() == id)));
    assert!(delivered
        .iter()
        .any(|e| matches!(e, Effect::Reindex(a) if a.to_string() == id)));
}

/// Find the sample line for `metric` whose labels mention `label`.
fn sample<'a>(exposition: &'a str, metric: &str, label: &str) -> Option<&'a str> {
    exposition
        .lines()
        .find(|line| line.starts_with(&format!("{metric}{{")) && line.contains(label))
}

#[tokio::test]
async fn test_metrics_are_prometheus_text() {
    let t = test_app();
    let id = t.create().await;
    t.post(&format!("/v1/artifacts/{id}/make-private"), t.owner, None)
        .await;

    let response = t
        .app
        .clone()
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
    let text = body_string(response).await;

    let conflicts = sample(
        &text,
        "pubflow_http_conflicts_total",
        r#"path="/v1/artifacts/{id}/make-private""#,
    )
    .unwrap_or_else(|| panic!("no conflict sample in\n{text}"));
    assert!(conflicts.ends_with(" 1"), "{conflicts}");
    assert!(sample(&text, "pubflow_http_requests_total", r#"status="201""#).is_some());
    assert_eq!(
        sample(&text, "pubflow_artifacts_total", r#"state="DRAFT""#),
        Some(r#"pubflow_artifacts_total{state="DRAFT"} 1"#)
    );
    assert!(sample(&text, "pubflow_effects_total", r#"outcome="rejected""#).is_some());
}

// -- Embargo --------------------------------------------------------------------

#[tokio::test]
async fn test_embargo_holds_back_publication_until_lifted() {
    let t = test_app();
    let id = t.create().await;
    let stranger = ActorId::new();

    let (status, body) = t
        .post(
            &format!("/v1/artifacts/{id}/embargo"),
            t.owner,
            Some(json!({ "until": "2990-01-01T00:00:00Z" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["artifact"]["embargo_until"], "2990-01-01T00:00:00Z");
    assert_eq!(body["artifact"]["state"], "DRAFT");

    let (status, body) = t
        .post(&format!("/v1/artifacts/{id}/make-public"), t.owner, None)
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "PRECONDITION_FAILED");
    let (status, _) = t.get(&format!("/v1/artifacts/{id}"), stranger).await;
    assert_ne!(status, StatusCode::OK);

    let (status, body) = t
        .post(&format!("/v1/artifacts/{id}/lift-embargo"), t.owner, None)
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["artifact"]["state"], "PUBLIC");
    assert!(body["artifact"]["embargo_until"].is_null());
    let (status, _) = t.get(&format!("/v1/artifacts/{id}"), stranger).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_embargo_rejects_bad_dates() {
    let t = test_app();
    let id = t.create().await;

    let (status, body) = t
        .post(
            &format!("/v1/artifacts/{id}/embargo"),
            t.owner,
            Some(json!({ "until": "soon" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, body) = t
        .post(
            &format!("/v1/artifacts/{id}/embargo"),
            t.owner,
            Some(json!({ "until": "2001-01-01T00:00:00Z" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "PRECONDITION_FAILED");
}
