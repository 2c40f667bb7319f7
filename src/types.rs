/*
 * Meeting Orchestrator
 * Copyright (c) 2024 Meeting Orchestrator Contributors
 *
 * This work is licensed under the Creative Commons Attribution-NonCommercial 4.0 International License.
 * To view a copy of this license, visit http://creativecommons.org/licenses/by-nc/4.0/
 *
 * You are free to share and adapt this work for non-commercial purposes with attribution.
 * Commercial use is prohibited without explicit written permission.
 *
 * For commercial licensing inquiries, please contact the project maintainers.
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Teams,
    Gmeet,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Teams => write!(f, "teams"),
            Platform::Gmeet => write!(f, "gmeet"),
        }
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "teams" => Ok(Platform::Teams),
            "gmeet" => Ok(Platform::Gmeet),
            other => Err(format!("unknown platform: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Created,
    Joining,
    InMeeting,
    Ended,
    Failed,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Created => write!(f, "created"),
            SessionStatus::Joining => write!(f, "joining"),
            SessionStatus::InMeeting => write!(f, "in_meeting"),
            SessionStatus::Ended => write!(f, "ended"),
            SessionStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Host,
    Guest,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Host => write!(f, "host"),
            Role::Guest => write!(f, "guest"),
        }
    }
}

/// A single roster entry as extracted from the live meeting DOM, before it is
/// folded into `ParticipantHistory`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantCandidate {
    pub name: String,
    pub original_name: String,
    pub is_bot: bool,
    pub role: Role,
    pub is_speaking: bool,
}

/// Embedded in an `AudioChunk`: participant state at the moment the chunk was recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantSnapshot {
    pub name: String,
    pub original_name: String,
    pub is_bot: bool,
    pub role: Role,
    pub is_speaking: bool,
}

impl From<ParticipantCandidate> for ParticipantSnapshot {
    fn from(c: ParticipantCandidate) -> Self {
        ParticipantSnapshot {
            name: c.name,
            original_name: c.original_name,
            is_bot: c.is_bot,
            role: c.role,
            is_speaking: c.is_speaking,
        }
    }
}

/// One row of the session's `ParticipantHistory`, keyed by cleaned name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantRecord {
    pub display_name: String,
    pub original_name_as_seen: String,
    pub is_bot: bool,
    pub role: Role,
    pub first_seen: DateTime<Utc>,
    pub last_seen_present_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
}

impl ParticipantRecord {
    pub fn duration_seconds(&self) -> Option<i64> {
        self.left_at
            .map(|left| (left - self.first_seen).num_seconds().max(0))
    }
}

/// `{canonical name -> record}`. The scheduler/runner owns this; only the
/// roster loop of the owning session ever mutates it (single-writer).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParticipantHistory(pub HashMap<String, ParticipantRecord>);

impl ParticipantHistory {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    /// Apply one roster poll result: new names are inserted, present names
    /// get `last_seen_present_at` refreshed and `left_at` cleared (rejoin),
    /// previously-seen names absent from `present` get `left_at` set.
    pub fn apply_poll(&mut self, present: &[ParticipantCandidate], now: DateTime<Utc>) {
        let present_names: std::collections::HashSet<&str> =
            present.iter().map(|p| p.name.as_str()).collect();

        for candidate in present {
            match self.0.get_mut(&candidate.name) {
                Some(record) => {
                    record.last_seen_present_at = now;
                    record.left_at = None;
                    record.original_name_as_seen = candidate.original_name.clone();
                    record.is_bot = candidate.is_bot;
                }
                None => {
                    self.0.insert(
                        candidate.name.clone(),
                        ParticipantRecord {
                            display_name: candidate.name.clone(),
                            original_name_as_seen: candidate.original_name.clone(),
                            is_bot: candidate.is_bot,
                            role: candidate.role,
                            first_seen: now,
                            last_seen_present_at: now,
                            left_at: None,
                        },
                    );
                }
            }
        }

        for (name, record) in self.0.iter_mut() {
            if !present_names.contains(name.as_str()) && record.left_at.is_none() {
                record.left_at = Some(now);
            }
        }
    }
}

/// Speaker attribution for one audio chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeakerInfo {
    pub label: String,
    pub mapped_name: Option<String>,
    pub confidence: f32,
    pub is_bot: bool,
}

/// A fixed-interval audio artifact, per `spec.md` §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioChunk {
    pub chunk_id: String,
    pub chunk_number: u64,
    pub meeting_id: String,
    pub session_id: String,
    pub start_ts: DateTime<Utc>,
    pub end_ts: DateTime<Utc>,
    pub duration_s: f64,
    pub audio_path: String,
    pub audio_size_bytes: u64,
    pub participants_snapshot: Vec<ParticipantSnapshot>,
    pub active_speaker: Option<SpeakerInfo>,
    pub all_speakers: Vec<SpeakerInfo>,
}

impl AudioChunk {
    /// `chunk_{NNN}_{bot_token}_{name_tokens...}_{iso_ts_safe}.wav`, per
    /// `spec.md` §6's "richer chunker" filename convention, grounded on
    /// `AudioChunkData.generate_filename` in the original Python source.
    pub fn descriptive_filename(&self) -> String {
        let mut components = vec![format!("chunk_{:03}", self.chunk_number)];

        let mut bot_token = None;
        let mut name_tokens = Vec::new();
        for p in &self.participants_snapshot {
            if p.is_bot {
                if bot_token.is_none() {
                    bot_token = Some(p.name.to_lowercase().replace(' ', ""));
                }
                continue;
            }
            let token: String = p
                .name
                .chars()
                .filter(|c| !c.is_whitespace())
                .take(10)
                .collect::<String>()
                .to_lowercase();
            if !token.is_empty() && !name_tokens.contains(&token) {
                name_tokens.push(token);
            }
        }

        if let Some(bot) = bot_token {
            components.push(bot);
        }
        for token in name_tokens.into_iter().take(3) {
            components.push(token);
        }

        components.push(iso_timestamp_safe(self.start_ts));
        format!("{}.wav", components.join("_"))
    }
}

/// Replace `:` with `-` so the timestamp is filesystem-safe, per `spec.md` §6.
pub fn iso_timestamp_safe(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339().replace(':', "-")
}

/// An on-disk browser identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub filesystem_path: String,
    pub in_use_by_session: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileStatus {
    pub exists: bool,
    pub logged_in_heuristic: bool,
    pub in_use_by_session: Option<String>,
}

/// The running instance of one meeting join, per `spec.md` §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub meeting_id: String,
    pub platform: Platform,
    pub meeting_url: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub joined_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub last_roster_snapshot: Vec<ParticipantSnapshot>,
    pub valid_chunk_count: u64,
    pub next_chunk_number: u64,
    pub participant_history: ParticipantHistory,
    pub transcript: String,
    pub detected_bot_self_name: Option<String>,
    pub error: Option<String>,
    pub errors: Vec<String>,
}

impl Session {
    pub fn new(meeting_id: String, platform: Platform, meeting_url: String) -> Self {
        Session {
            session_id: uuid::Uuid::new_v4().to_string(),
            meeting_id,
            platform,
            meeting_url,
            status: SessionStatus::Created,
            created_at: Utc::now(),
            started_at: None,
            joined_at: None,
            ended_at: None,
            last_roster_snapshot: Vec::new(),
            valid_chunk_count: 0,
            next_chunk_number: 0,
            participant_history: ParticipantHistory::new(),
            transcript: String::new(),
            detected_bot_self_name: None,
            error: None,
            errors: Vec::new(),
        }
    }

    /// Listing view returned by `GET /sessions`: cheap to clone, no history payload.
    pub fn list_view(&self) -> SessionListEntry {
        SessionListEntry {
            meeting_id: self.meeting_id.clone(),
            platform: self.platform,
            session_id: self.session_id.clone(),
            status: self.status,
            created_at: self.created_at,
            started_at: self.started_at,
            ended_at: self.ended_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionListEntry {
    pub meeting_id: String,
    pub platform: Platform,
    pub session_id: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// One participant row inside `SummaryRecord`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryParticipant {
    pub name: String,
    pub original_name: String,
    pub is_bot: bool,
    pub role: Role,
    pub join_time: DateTime<Utc>,
    pub leave_time: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
}

/// The final per-session record, per `spec.md` §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub meeting_id: String,
    pub platform: Platform,
    pub session_id: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_seconds: i64,
    pub participants: Vec<SummaryParticipant>,
    pub real_participants: Vec<SummaryParticipant>,
    pub unique_participants: usize,
    pub audio_chunks: u64,
    pub audio_duration_seconds: u64,
    pub transcript: Option<String>,
    pub transcript_summary: Option<String>,
    pub error: Option<String>,
    pub errors: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(name: &str, is_bot: bool) -> ParticipantCandidate {
        ParticipantCandidate {
            name: name.to_string(),
            original_name: name.to_string(),
            is_bot,
            role: Role::Guest,
            is_speaking: false,
        }
    }

    #[test]
    fn history_tracks_join_leave_rejoin() {
        let mut history = ParticipantHistory::new();
        let t0 = Utc::now();
        history.apply_poll(&[candidate("Snehil Patel", false)], t0);
        assert!(history.0.get("Snehil Patel").unwrap().left_at.is_none());

        let t1 = t0 + chrono::Duration::seconds(30);
        history.apply_poll(&[], t1);
        assert_eq!(history.0.get("Snehil Patel").unwrap().left_at, Some(t1));

        let t2 = t1 + chrono::Duration::seconds(30);
        history.apply_poll(&[candidate("Snehil Patel", false)], t2);
        assert!(history.0.get("Snehil Patel").unwrap().left_at.is_none());
        assert_eq!(history.0.get("Snehil Patel").unwrap().first_seen, t0);
    }

    #[test]
    fn descriptive_filename_matches_original_convention() {
        let chunk = AudioChunk {
            chunk_id: "c1".into(),
            chunk_number: 2,
            meeting_id: "m1".into(),
            session_id: "s1".into(),
            start_ts: DateTime::parse_from_rfc3339("2025-02-15T10:20:00Z")
                .unwrap()
                .with_timezone(&Utc),
            end_ts: Utc::now(),
            duration_s: 30.0,
            audio_path: "x.wav".into(),
            audio_size_bytes: 0,
            participants_snapshot: vec![
                ParticipantSnapshot {
                    name: "Meeting Bot".into(),
                    original_name: "Meeting Bot (You)".into(),
                    is_bot: true,
                    role: Role::Host,
                    is_speaking: false,
                },
                ParticipantSnapshot {
                    name: "Snehil Patel".into(),
                    original_name: "Snehil Patel".into(),
                    is_bot: false,
                    role: Role::Guest,
                    is_speaking: true,
                },
            ],
            active_speaker: None,
            all_speakers: vec![],
        };
        let filename = chunk.descriptive_filename();
        assert!(filename.starts_with("chunk_002_meetingbot_snehilpate_2025-02-15T10-20-00"));
        assert!(filename.ends_with(".wav"));
    }
}
