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
use serde::Deserialize;

use crate::types::{ParticipantSnapshot, SpeakerInfo};

/// The out-of-scope "local neural diarisation" / "local transcription-based
/// attribution" collaborators (`spec.md` §4.8 tiers 1–2), modeled as a trait
/// so a real local engine can be dropped in without touching `Diarizer`.
#[async_trait]
pub trait LocalDiarizer: Send + Sync {
    async fn analyze(&self, audio_bytes: &[u8]) -> Option<Vec<RawSpeaker>>;
}

/// No local engine configured; always defers to the next tier.
pub struct DisabledLocalDiarizer;

#[async_trait]
impl LocalDiarizer for DisabledLocalDiarizer {
    async fn analyze(&self, _audio_bytes: &[u8]) -> Option<Vec<RawSpeaker>> {
        None
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawSpeaker {
    pub label: String,
    pub confidence: f32,
}

#[derive(Debug, Deserialize)]
struct RemoteDiarizationResponse {
    speakers: Vec<RawSpeaker>,
}

/// `analyze(meeting_id, session_id, chunk_id, audio_bytes, snapshot) -> [SpeakerInfo]`
/// from `spec.md` §4.8: tiers 1–2 are the local engine, tier 3 is a remote
/// HTTP endpoint, tier 4 is the deterministic fallback.
pub struct Diarizer {
    local: Box<dyn LocalDiarizer>,
    http: reqwest::Client,
    endpoint_url: Option<String>,
}

impl Diarizer {
    pub fn new(local: Box<dyn LocalDiarizer>, endpoint_url: Option<String>) -> Self {
        Self {
            local,
            http: reqwest::Client::new(),
            endpoint_url,
        }
    }

    pub async fn analyze(
        &self,
        meeting_id: &str,
        session_id: &str,
        audio_bytes: &[u8],
        snapshot: &[ParticipantSnapshot],
    ) -> Vec<SpeakerInfo> {
        let raw = if let Some(speakers) = self.local.analyze(audio_bytes).await {
            speakers
        } else if let Some(speakers) = self.query_remote(meeting_id, session_id, audio_bytes).await {
            speakers
        } else {
            vec![RawSpeaker {
                label: "speaker_1".to_string(),
                confidence: 0.5,
            }]
        };

        raw.into_iter().map(|speaker| map_to_snapshot(speaker, snapshot)).collect()
    }

    async fn query_remote(
        &self,
        meeting_id: &str,
        session_id: &str,
        audio_bytes: &[u8],
    ) -> Option<Vec<RawSpeaker>> {
        let url = self.endpoint_url.as_ref()?;

        let part = reqwest::multipart::Part::bytes(audio_bytes.to_vec())
            .file_name("chunk.wav")
            .mime_str("audio/wav")
            .ok()?;
        let form = reqwest::multipart::Form::new()
            .text("meeting_id", meeting_id.to_string())
            .text("session_id", session_id.to_string())
            .part("audio", part);

        match self.http.post(url).multipart(form).send().await {
            Ok(response) => match response.json::<RemoteDiarizationResponse>().await {
                Ok(body) => Some(body.speakers),
                Err(e) => {
                    tracing::warn!(error = %e, "diarization endpoint returned an unparseable body");
                    None
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "diarization endpoint unreachable");
                None
            }
        }
    }
}

/// Label-to-name mapping per `spec.md` §4.8: exact case-insensitive match
/// first, then the first `is_speaking=true` entry as a weak fallback,
/// otherwise unmapped.
fn map_to_snapshot(speaker: RawSpeaker, snapshot: &[ParticipantSnapshot]) -> SpeakerInfo {
    let exact = snapshot
        .iter()
        .find(|p| p.name.to_lowercase() == speaker.label.to_lowercase());

    let mapped = exact.or_else(|| snapshot.iter().find(|p| p.is_speaking));

    SpeakerInfo {
        label: speaker.label,
        mapped_name: mapped.map(|p| p.name.clone()),
        confidence: speaker.confidence,
        is_bot: mapped.map(|p| p.is_bot).unwrap_or(false),
    }
}
