/*
 * Meeting Orchestrator
 * Copyright (c) 2024 Meeting Orchestrator Contributors
 *
 * This work is licensed under the Creative Commons Attribution-NonCommercial 4.0 International License.
 * To view a copy of this license, visit http://creativecommons.org/licenses/by-nc/4.0/
 *
 * You are free to share and adapt this work for non-commercial purposes with attribution.
 * Commercial use is prohibited without explicit written permission.
 */

use std::str::FromStr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::error::AdmissionError;
use crate::scheduler::Scheduler;
use crate::types::Platform;

#[derive(Clone)]
struct ApiState {
    scheduler: Arc<Scheduler>,
}

#[derive(Deserialize)]
struct JoinMeetingRequest {
    meeting_id: String,
    meeting_url: String,
    platform: String,
}

#[derive(Serialize)]
struct JoinMeetingResponse {
    session_id: String,
    status: &'static str,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: &'static str,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn join_meeting(
    State(state): State<ApiState>,
    Json(body): Json<JoinMeetingRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    let platform = match Platform::from_str(&body.platform) {
        Ok(platform) => platform,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::to_value(ErrorResponse {
                    error: format!("unknown platform: {}", body.platform),
                    code: "INVALID_MEETING_URL",
                }).unwrap()),
            );
        }
    };

    match state.scheduler.admit(body.meeting_id, body.meeting_url, platform) {
        Ok(session_id) => (
            StatusCode::ACCEPTED,
            Json(serde_json::to_value(JoinMeetingResponse {
                session_id,
                status: "queued",
            }).unwrap()),
        ),
        Err(AdmissionError::InvalidMeetingUrl) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::to_value(ErrorResponse {
                error: "meeting url failed platform validation".to_string(),
                code: "INVALID_MEETING_URL",
            }).unwrap()),
        ),
        Err(AdmissionError::Internal(message)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::to_value(ErrorResponse {
                error: message,
                code: "INTERNAL_ERROR",
            }).unwrap()),
        ),
    }
}

async fn list_sessions(State(state): State<ApiState>) -> Json<Vec<crate::types::SessionListEntry>> {
    Json(state.scheduler.list_sessions().await)
}

async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Builds the admission surface per `spec.md` §6: `POST /join-meeting`,
/// `GET /sessions`, `GET /healthz`, translating HTTP bodies to/from the
/// Scheduler.
pub fn router(scheduler: Arc<Scheduler>) -> Router {
    let state = ApiState { scheduler };
    Router::new()
        .route("/join-meeting", post(join_meeting))
        .route("/sessions", get(list_sessions))
        .route("/healthz", get(healthz))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact_store::LocalArtifactStore;
    use crate::browser::BrowserContextPool;
    use crate::config::Config;
    use crate::diarizer::{Diarizer, DisabledLocalDiarizer};
    use crate::events::LocalEventSink;
    use crate::profile_registry::ProfileRegistry;
    use crate::session_runner::Services;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_scheduler(tmp: &std::path::Path) -> Arc<Scheduler> {
        let config = Arc::new(Config {
            api_host: "0.0.0.0".into(),
            api_port: 8000,
            max_concurrent_sessions: 2,
            session_start_timeout_seconds: 30,
            chunk_interval_seconds: 30,
            headless_browser: true,
            profiles_root: tmp.join("profiles"),
            default_profile_name: "google_main".into(),
            data_dir: tmp.join("data"),
            bot_display_name: "Meeting Bot".into(),
            bot_account_identifiers: vec![],
            diarization_endpoint_url: None,
            event_sink_endpoint: None,
            artifact_store_endpoint: None,
            credential_encryption_secret: None,
        });
        let services = Arc::new(Services {
            profile_registry: Arc::new(
                ProfileRegistry::new(config.profiles_root.clone(), config.default_profile_name.clone()).unwrap(),
            ),
            browser_pool: Arc::new(BrowserContextPool::new(config.clone())),
            diarizer: Arc::new(Diarizer::new(Box::new(DisabledLocalDiarizer), None)),
            event_sink: Arc::new(LocalEventSink::new()),
            artifact_store: Arc::new(LocalArtifactStore::new(tmp.join("artifacts"))),
            config,
        });
        Arc::new(Scheduler::new(services))
    }

    #[tokio::test]
    async fn healthz_reports_ok() {
        let tmp = tempfile::tempdir().unwrap();
        let app = router(test_scheduler(tmp.path()));
        let response = app
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn join_meeting_rejects_mismatched_platform_host() {
        let tmp = tempfile::tempdir().unwrap();
        let app = router(test_scheduler(tmp.path()));
        let body = serde_json::json!({
            "meeting_id": "m1",
            "meeting_url": "https://example.com/nope",
            "platform": "gmeet",
        });
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/join-meeting")
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_vec(&body).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn join_meeting_accepts_a_valid_gmeet_url() {
        let tmp = tempfile::tempdir().unwrap();
        let app = router(test_scheduler(tmp.path()));
        let body = serde_json::json!({
            "meeting_id": "m1",
            "meeting_url": "https://meet.google.com/abc-defg-hij",
            "platform": "gmeet",
        });
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/join-meeting")
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_vec(&body).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }
}
