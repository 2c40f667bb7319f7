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

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex as SyncMutex;
use regex::Regex;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::error::AdmissionError;
use crate::session_runner::{self, Services};
use crate::types::{Platform, Session, SessionListEntry};

const GRACEFUL_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Anchored host check, matching the original's `re.compile(r"https://meet\.google\.com/.*")`
/// (`session_manager.py`'s `GMEET_URL_RE`/`TEAMS_URL_RE`) rather than an unanchored substring
/// search, so a redirect/query-string trick like `https://evil.com/?meet.google.com` is rejected.
fn validate_meeting_url(platform: Platform, url: &str) -> bool {
    let host = match platform {
        Platform::Gmeet => "meet.google.com",
        Platform::Teams => "teams.microsoft.com",
    };
    let pattern = format!(r"(?i)^https://{}/.*", regex::escape(host));
    Regex::new(&pattern).unwrap().is_match(url)
}

/// Accepts admission requests, bounds concurrency, and owns the Session
/// table, per `spec.md` §4.1/§4.10/§5.
pub struct Scheduler {
    services: Arc<Services>,
    sessions: Arc<SyncMutex<HashMap<String, Arc<Mutex<Session>>>>>,
    semaphore: Arc<Semaphore>,
    dispatch_tx: mpsc::UnboundedSender<Arc<Mutex<Session>>>,
    stop_tokens: Arc<SyncMutex<HashMap<String, CancellationToken>>>,
    shutting_down: Arc<std::sync::atomic::AtomicBool>,
}

impl Scheduler {
    pub fn new(services: Arc<Services>) -> Self {
        let max_concurrent = services.config.max_concurrent_sessions;
        let sessions: Arc<SyncMutex<HashMap<String, Arc<Mutex<Session>>>>> =
            Arc::new(SyncMutex::new(HashMap::new()));
        let semaphore = Arc::new(Semaphore::new(max_concurrent));
        let (dispatch_tx, dispatch_rx) = mpsc::unbounded_channel();

        let scheduler = Self {
            services,
            sessions,
            semaphore,
            dispatch_tx,
            stop_tokens: Arc::new(SyncMutex::new(HashMap::new())),
            shutting_down: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        };
        scheduler.spawn_dispatcher(dispatch_rx);
        scheduler
    }

    /// Dedicated dispatcher task per `spec.md` §5: pulls queued sessions in
    /// FIFO order, blocks on the semaphore (not the admission caller), and
    /// spawns a Session Runner per admitted session.
    fn spawn_dispatcher(&self, mut dispatch_rx: mpsc::UnboundedReceiver<Arc<Mutex<Session>>>) {
        let services = self.services.clone();
        let semaphore = self.semaphore.clone();
        let shutting_down = self.shutting_down.clone();
        tokio::spawn(async move {
            while let Some(session) = dispatch_rx.recv().await {
                if shutting_down.load(std::sync::atomic::Ordering::SeqCst) {
                    continue;
                }
                let permit = match semaphore.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => continue,
                };
                let services = services.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    session_runner::run(session, services).await;
                });
            }
        });
    }

    /// Non-blocking enqueue: returns as soon as the Session is created and
    /// queued, per `spec.md` §6's "HTTP 202-style semantics".
    pub fn admit(&self, meeting_id: String, meeting_url: String, platform: Platform) -> Result<String, AdmissionError> {
        if !validate_meeting_url(platform, &meeting_url) {
            return Err(AdmissionError::InvalidMeetingUrl);
        }

        let session = Session::new(meeting_id, platform, meeting_url);
        let session_id = session.session_id.clone();
        let stop_token = CancellationToken::new();
        let handle = Arc::new(Mutex::new(session));

        self.sessions.lock().insert(session_id.clone(), handle.clone());
        self.stop_tokens.lock().insert(session_id.clone(), stop_token);

        let (meeting_id, platform, session_id_for_event) = {
            let guard = handle.try_lock().expect("freshly created session cannot be contended");
            (guard.meeting_id.clone(), guard.platform, guard.session_id.clone())
        };
        let event_sink = self.services.event_sink.clone();
        tokio::spawn(async move {
            event_sink
                .publish(crate::events::Event::bot_joined(&meeting_id, platform, &session_id_for_event))
                .await;
        });

        self.dispatch_tx
            .send(handle)
            .map_err(|e| AdmissionError::Internal(e.to_string()))?;

        Ok(session_id)
    }

    pub async fn list_sessions(&self) -> Vec<SessionListEntry> {
        let handles: Vec<Arc<Mutex<Session>>> = self.sessions.lock().values().cloned().collect();
        let mut entries = Vec::with_capacity(handles.len());
        for handle in handles {
            entries.push(handle.lock().await.list_view());
        }
        entries
    }

    pub async fn get_session(&self, session_id: &str) -> Option<Session> {
        let handle = self.sessions.lock().get(session_id).cloned()?;
        let session = handle.lock().await.clone();
        Some(session)
    }

    /// Signals every live session to stop and waits up to a bounded grace
    /// window before returning, per `spec.md` §5's cancellation-safety note.
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, std::sync::atomic::Ordering::SeqCst);
        let tokens: Vec<CancellationToken> = self.stop_tokens.lock().values().cloned().collect();
        for token in &tokens {
            token.cancel();
        }

        let deadline = tokio::time::Instant::now() + GRACEFUL_SHUTDOWN_GRACE;
        while tokio::time::Instant::now() < deadline {
            let still_live = self.semaphore.available_permits() < self.services.config.max_concurrent_sessions;
            if !still_live {
                break;
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }
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

    fn test_services(tmp: &std::path::Path) -> Arc<Services> {
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
        Arc::new(Services {
            profile_registry: Arc::new(
                ProfileRegistry::new(config.profiles_root.clone(), config.default_profile_name.clone()).unwrap(),
            ),
            browser_pool: Arc::new(BrowserContextPool::new(config.clone())),
            diarizer: Arc::new(Diarizer::new(Box::new(DisabledLocalDiarizer), None)),
            event_sink: Arc::new(LocalEventSink::new()),
            artifact_store: Arc::new(LocalArtifactStore::new(tmp.join("artifacts"))),
            config,
        })
    }

    #[test]
    fn rejects_urls_for_the_wrong_platform() {
        assert!(!validate_meeting_url(Platform::Gmeet, "https://teams.microsoft.com/l/meetup-join/abc"));
        assert!(validate_meeting_url(Platform::Gmeet, "https://meet.google.com/abc-defg-hij"));
    }

    #[tokio::test]
    async fn admit_rejects_invalid_url_without_touching_the_dispatcher() {
        let tmp = tempfile::tempdir().unwrap();
        let scheduler = Scheduler::new(test_services(tmp.path()));
        let result = scheduler.admit("meeting-1".into(), "https://example.com/not-a-meeting".into(), Platform::Gmeet);
        assert!(matches!(result, Err(AdmissionError::InvalidMeetingUrl)));
        assert!(scheduler.list_sessions().await.is_empty());
    }

    #[tokio::test]
    async fn admit_queues_a_session_visible_via_list_and_get() {
        let tmp = tempfile::tempdir().unwrap();
        let scheduler = Scheduler::new(test_services(tmp.path()));
        let id = scheduler
            .admit("meeting-1".into(), "https://meet.google.com/abc-defg-hij".into(), Platform::Gmeet)
            .unwrap();

        let entries = scheduler.list_sessions().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].session_id, id);

        let session = scheduler.get_session(&id).await;
        assert!(session.is_some());
    }
}
