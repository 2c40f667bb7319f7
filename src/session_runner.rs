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

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::artifact_store::{ArtifactStore, ArtifactStoreExt};
use crate::audio_chunker;
use crate::bot_identity;
use crate::browser::{PageProvider, PageSurface};
use crate::config::Config;
use crate::diarizer::Diarizer;
use crate::end_detector::{self, EndReason};
use crate::events::{Event, EventSink};
use crate::join_flow;
use crate::participant_extractor;
use crate::profile_registry::ProfileRegistry;
use crate::summary;
use crate::types::{Session, SessionStatus};

const BOT_NAME_DETECTION_DELAY: Duration = Duration::from_secs(3);
const ROSTER_POLL_INTERVAL: Duration = Duration::from_secs(30);
const CAPTIONS_POLL_INTERVAL: Duration = Duration::from_secs(5);
const EMPTY_CONFIRM_DELAY: Duration = Duration::from_secs(15);

const CAPTIONS_SELECTOR: &str = "[aria-label=\"Captions\"], [data-tid=\"closed-caption-text\"]";

/// Shared collaborators a Session Runner needs, bundled instead of reached
/// for as globals, per `spec.md` §9 Design Notes.
pub struct Services {
    pub config: Arc<Config>,
    pub profile_registry: Arc<ProfileRegistry>,
    pub browser_pool: Arc<dyn PageProvider>,
    pub diarizer: Arc<Diarizer>,
    pub event_sink: Arc<dyn EventSink>,
    pub artifact_store: Arc<dyn ArtifactStore>,
}

/// Runs one session end-to-end, per `spec.md` §4.10, mutating `session` in
/// place and returning the final summary.
pub async fn run(session: Arc<Mutex<Session>>, services: Arc<Services>) {
    let (meeting_id, platform, meeting_url, session_id) = {
        let guard = session.lock().await;
        (
            guard.meeting_id.clone(),
            guard.platform,
            guard.meeting_url.clone(),
            guard.session_id.clone(),
        )
    };

    {
        let mut guard = session.lock().await;
        guard.status = SessionStatus::Joining;
        guard.started_at = Some(Utc::now());
    }

    let profile_name = match services.profile_registry.allocate(&session_id, None) {
        Ok(name) => name,
        Err(e) => {
            fail_session(&session, format!("profile allocation failed: {e}")).await;
            finalize(&session, &services).await;
            return;
        }
    };
    let profile_path = services
        .profile_registry
        .filesystem_path(&profile_name)
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_default();

    let page: Arc<dyn PageSurface> = match services
        .browser_pool
        .acquire(&session_id, &profile_path)
        .await
    {
        Ok(page) => page,
        Err(e) => {
            fail_session(&session, format!("failed to acquire browser page: {e}")).await;
            finalize(&session, &services).await;
            services.profile_registry.release(&session_id);
            return;
        }
    };

    let join_flow = join_flow::for_platform(platform);
    let join_result = tokio::time::timeout(
        Duration::from_secs(services.config.session_start_timeout_seconds),
        join_flow.join(page.as_ref(), &meeting_url),
    )
    .await;

    match join_result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            let snapshot_path = if let crate::error::SessionError::JoinFailed { snapshot_path, .. } = &e {
                snapshot_path.clone()
            } else {
                None
            };
            let mut guard = session.lock().await;
            guard.status = SessionStatus::Failed;
            guard.error = Some(e.to_string());
            if let Some(path) = snapshot_path {
                guard.errors.push(format!("snapshot: {path}"));
            }
            guard.ended_at = Some(Utc::now());
            drop(guard);
            finalize(&session, &services).await;
            services.profile_registry.release(&session_id);
            return;
        }
        Err(_) => {
            let mut guard = session.lock().await;
            guard.status = SessionStatus::Failed;
            guard.error = Some("session start timed out".to_string());
            guard.ended_at = Some(Utc::now());
            drop(guard);
            finalize(&session, &services).await;
            services.profile_registry.release(&session_id);
            return;
        }
    }

    {
        let mut guard = session.lock().await;
        guard.status = SessionStatus::InMeeting;
        guard.joined_at = Some(Utc::now());
    }
    services
        .event_sink
        .publish(Event::session_joined(&meeting_id, platform, &session_id))
        .await;

    tokio::time::sleep(BOT_NAME_DETECTION_DELAY).await;
    let initial_candidates = participant_extractor::extract(page.as_ref(), platform).await;
    if let Some(name) = bot_identity::detect_session_bot_name(&initial_candidates) {
        let mut guard = session.lock().await;
        guard.detected_bot_self_name = Some(name);
    }

    let stop_token = CancellationToken::new();

    let audio_task = tokio::spawn(audio_chunker::run(
        session_id.clone(),
        meeting_id.clone(),
        platform,
        page.clone(),
        services.config.clone(),
        services.diarizer.clone(),
        services.event_sink.clone(),
        services.artifact_store.clone(),
        session.clone(),
        stop_token.clone(),
    ));

    let roster_task = tokio::spawn(roster_loop(
        session.clone(),
        page.clone(),
        platform,
        services.config.clone(),
        services.event_sink.clone(),
        stop_token.clone(),
    ));

    let captions_task = tokio::spawn(captions_loop(session.clone(), page.clone(), stop_token.clone()));

    let end_reason = end_detector::wait_for_end(
        page.as_ref(),
        platform,
        services.config.as_ref(),
        stop_token.clone(),
    )
    .await;
    stop_token.cancel();

    let _ = tokio::join!(audio_task, roster_task, captions_task);

    {
        let mut guard = session.lock().await;
        guard.status = match end_reason {
            EndReason::Cancelled => SessionStatus::Failed,
            _ => SessionStatus::Ended,
        };
        if end_reason == EndReason::Cancelled && guard.error.is_none() {
            guard.error = Some("session cancelled".to_string());
        }
        guard.ended_at = Some(Utc::now());
    }

    finalize(&session, &services).await;
    services.profile_registry.release(&session_id);
}

async fn fail_session(session: &Arc<Mutex<Session>>, error: String) {
    let mut guard = session.lock().await;
    guard.status = SessionStatus::Failed;
    guard.error = Some(error);
    guard.ended_at = Some(Utc::now());
}

async fn finalize(session: &Arc<Mutex<Session>>, services: &Arc<Services>) {
    let summary_record = {
        let guard = session.lock().await;
        summary::build(&guard, services.config.as_ref(), services.config.chunk_interval_seconds)
    };

    services
        .event_sink
        .publish(Event::meeting_summary(&summary_record.meeting_id, &summary_record))
        .await;

    let path = format!("sessions/{}.json", summary_record.session_id);
    if let Err(e) = services.artifact_store.put_json(&path, &summary_record).await {
        tracing::warn!(error = %e, "failed to persist session summary");
    }
}

/// Roster loop per `spec.md` §4.10 step 6: single writer of
/// `ParticipantHistory`, owns the in-loop empty check that can request
/// session shutdown independently of `wait_for_end`.
async fn roster_loop(
    session: Arc<Mutex<Session>>,
    page: Arc<dyn PageSurface>,
    platform: crate::types::Platform,
    config: Arc<Config>,
    event_sink: Arc<dyn EventSink>,
    stop_token: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(ROSTER_POLL_INTERVAL) => {}
            _ = stop_token.cancelled() => return,
        }
        if stop_token.is_cancelled() {
            return;
        }

        let mut candidates = participant_extractor::extract(page.as_ref(), platform).await;
        let identifiers = config.bot_identifiers();
        let detected_bot_name = {
            let guard = session.lock().await;
            guard.detected_bot_self_name.clone()
        };
        for candidate in candidates.iter_mut() {
            candidate.is_bot = bot_identity::is_bot(candidate, &identifiers, detected_bot_name.as_deref());
        }

        let (meeting_id, session_id) = {
            let mut guard = session.lock().await;
            guard.participant_history.apply_poll(&candidates, Utc::now());
            guard.last_roster_snapshot = candidates
                .iter()
                .cloned()
                .map(crate::types::ParticipantSnapshot::from)
                .collect();
            (guard.meeting_id.clone(), guard.session_id.clone())
        };

        event_sink
            .publish(Event::participant_update(&meeting_id, &session_id, &candidates))
            .await;

        if end_detector::is_meeting_empty(page.as_ref(), platform, config.as_ref()).await {
            tokio::select! {
                _ = tokio::time::sleep(EMPTY_CONFIRM_DELAY) => {}
                _ = stop_token.cancelled() => return,
            }
            if end_detector::is_meeting_empty(page.as_ref(), platform, config.as_ref()).await {
                stop_token.cancel();
                return;
            }
        }
    }
}

/// Captions loop per `spec.md` §4.10 step 6: best-effort, append-only,
/// single writer of `Session.transcript`.
async fn captions_loop(session: Arc<Mutex<Session>>, page: Arc<dyn PageSurface>, stop_token: CancellationToken) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(CAPTIONS_POLL_INTERVAL) => {}
            _ = stop_token.cancelled() => return,
        }
        if stop_token.is_cancelled() {
            return;
        }

        let caption_result = tokio::time::timeout(Duration::from_secs(2), page.inner_text(CAPTIONS_SELECTOR)).await;
        let Ok(Ok(Some(text))) = caption_result else {
            continue;
        };
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }

        let mut guard = session.lock().await;
        if !guard.transcript.ends_with(trimmed) {
            if !guard.transcript.is_empty() {
                guard.transcript.push('\n');
            }
            guard.transcript.push_str(trimmed);
        }
    }
}
