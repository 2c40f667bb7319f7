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

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};

use crate::types::{AudioChunk, ParticipantCandidate, Platform, SummaryRecord};

/// One outbound event, matching the payload contracts in `spec.md` §6.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub event_type: String,
    pub subject: String,
    pub timestamp: chrono::DateTime<Utc>,
    pub payload: Value,
}

impl Event {
    pub fn bot_joined(meeting_id: &str, platform: Platform, session_id: &str) -> Self {
        Event {
            event_type: "bot_joined".to_string(),
            subject: meeting_id.to_string(),
            timestamp: Utc::now(),
            payload: json!({
                "meeting_id": meeting_id,
                "platform": platform.to_string(),
                "session_id": session_id,
                "timestamp": Utc::now(),
            }),
        }
    }

    pub fn session_joined(meeting_id: &str, platform: Platform, session_id: &str) -> Self {
        Event {
            event_type: "session_joined".to_string(),
            subject: meeting_id.to_string(),
            timestamp: Utc::now(),
            payload: json!({
                "meeting_id": meeting_id,
                "platform": platform.to_string(),
                "session_id": session_id,
            }),
        }
    }

    pub fn participant_update(meeting_id: &str, session_id: &str, candidates: &[ParticipantCandidate]) -> Self {
        let real_count = candidates.iter().filter(|c| !c.is_bot).count();
        let bot_count = candidates.iter().filter(|c| c.is_bot).count();
        Event {
            event_type: "participant_update".to_string(),
            subject: meeting_id.to_string(),
            timestamp: Utc::now(),
            payload: json!({
                "meeting_id": meeting_id,
                "session_id": session_id,
                "participants": candidates,
                "real_count": real_count,
                "bot_count": bot_count,
                "total_count": candidates.len(),
                "timestamp": Utc::now(),
            }),
        }
    }

    pub fn audio_chunk_complete(meeting_id: &str, chunk: &AudioChunk) -> Self {
        let real_participant_count = chunk
            .participants_snapshot
            .iter()
            .filter(|p| !p.is_bot)
            .count();
        Event {
            event_type: "audio_chunk_complete".to_string(),
            subject: meeting_id.to_string(),
            timestamp: Utc::now(),
            payload: json!({
                "chunk_id": chunk.chunk_id,
                "chunk_number": chunk.chunk_number,
                "meeting_id": chunk.meeting_id,
                "session_id": chunk.session_id,
                "start_timestamp": chunk.start_ts,
                "end_timestamp": chunk.end_ts,
                "duration_seconds": chunk.duration_s,
                "audio_file_path": chunk.audio_path,
                "filename": chunk.descriptive_filename(),
                "participants": chunk.participants_snapshot,
                "participant_count": chunk.participants_snapshot.len(),
                "real_participant_count": real_participant_count,
                "active_speaker": chunk.active_speaker,
                "all_speakers": chunk.all_speakers,
            }),
        }
    }

    pub fn meeting_summary(meeting_id: &str, summary: &SummaryRecord) -> Self {
        Event {
            event_type: "meeting_summary".to_string(),
            subject: meeting_id.to_string(),
            timestamp: Utc::now(),
            payload: serde_json::to_value(summary).unwrap_or(Value::Null),
        }
    }
}

/// Write-only, fire-and-forget per `spec.md` §5: publishing failures are
/// logged, never surfaced to the caller.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: Event);
}

/// In-process sink that just retains events, used by tests and as the base
/// of `HybridEventSink`'s "always save locally" half.
#[derive(Default)]
pub struct LocalEventSink {
    events: Mutex<Vec<Event>>,
}

impl LocalEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl EventSink for LocalEventSink {
    async fn publish(&self, event: Event) {
        tracing::info!(event_type = %event.event_type, subject = %event.subject, "event");
        self.events.lock().push(event);
    }
}

/// Publishes to a remote HTTP collector; a non-2xx response or transport
/// error is logged, never propagated, per the Event Sink's write-only
/// contract.
pub struct HttpEventSink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpEventSink {
    pub fn new(endpoint: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }
}

#[async_trait]
impl EventSink for HttpEventSink {
    async fn publish(&self, event: Event) {
        if let Err(e) = self.client.post(&self.endpoint).json(&event).send().await {
            tracing::warn!(error = %e, endpoint = %self.endpoint, "event sink publish failed");
        }
    }
}

/// Always saves locally first, then best-effort forwards to the remote
/// sink if one is configured — the local+remote pattern from the original
/// `EventPublisher`.
pub struct HybridEventSink {
    local: LocalEventSink,
    remote: Option<HttpEventSink>,
}

impl HybridEventSink {
    pub fn new(remote_endpoint: Option<String>) -> Self {
        Self {
            local: LocalEventSink::new(),
            remote: remote_endpoint.map(HttpEventSink::new),
        }
    }

    pub fn local_events(&self) -> Vec<Event> {
        self.local.events()
    }
}

#[async_trait]
impl EventSink for HybridEventSink {
    async fn publish(&self, event: Event) {
        self.local.publish(event.clone()).await;
        if let Some(remote) = &self.remote {
            remote.publish(event).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    #[tokio::test]
    async fn local_sink_retains_published_events_in_order() {
        let sink = LocalEventSink::new();
        sink.publish(Event::session_joined("m1", Platform::Gmeet, "s1")).await;
        sink.publish(Event::bot_joined("m1", Platform::Gmeet, "s1")).await;
        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "session_joined");
        assert_eq!(events[1].event_type, "bot_joined");
    }

    #[tokio::test]
    async fn hybrid_sink_without_remote_still_saves_locally() {
        let sink = HybridEventSink::new(None);
        sink.publish(Event::bot_joined("m1", Platform::Gmeet, "s1")).await;
        assert_eq!(sink.local_events().len(), 1);
    }

    #[test]
    fn participant_update_counts_real_and_bot_separately() {
        let candidates = vec![
            ParticipantCandidate {
                name: "Ada Lovelace".into(),
                original_name: "Ada Lovelace".into(),
                is_bot: false,
                role: Role::Guest,
                is_speaking: false,
            },
            ParticipantCandidate {
                name: "Meeting Bot".into(),
                original_name: "Meeting Bot (You)".into(),
                is_bot: true,
                role: Role::Guest,
                is_speaking: false,
            },
        ];
        let event = Event::participant_update("m1", "s1", &candidates);
        assert_eq!(event.payload["real_count"], 1);
        assert_eq!(event.payload["bot_count"], 1);
        assert_eq!(event.payload["total_count"], 2);
    }
}
