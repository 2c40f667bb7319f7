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

use crate::bot_identity;
use crate::config::Config;
use crate::participant_filter::is_valid_participant_name;
use crate::types::{ParticipantCandidate, Session, SummaryParticipant, SummaryRecord};

/// Builds the final per-session record from a frozen `Session`, per
/// `spec.md` §4.11.
pub fn build(session: &Session, config: &Config, chunk_interval_seconds: u64) -> SummaryRecord {
    let identifiers = config.bot_identifiers();

    let mut participants = Vec::new();
    for record in session.participant_history.0.values() {
        let candidate = ParticipantCandidate {
            name: record.display_name.clone(),
            original_name: record.original_name_as_seen.clone(),
            is_bot: record.is_bot,
            role: record.role,
            is_speaking: false,
        };
        let is_bot = bot_identity::is_bot(
            &candidate,
            &identifiers,
            session.detected_bot_self_name.as_deref(),
        );

        if !is_valid_participant_name(&record.display_name) && !is_bot {
            continue;
        }

        participants.push(SummaryParticipant {
            name: record.display_name.clone(),
            original_name: record.original_name_as_seen.clone(),
            is_bot,
            role: record.role,
            join_time: record.first_seen,
            leave_time: record.left_at,
            duration_seconds: record.duration_seconds(),
        });
    }

    let real_participants: Vec<SummaryParticipant> =
        participants.iter().filter(|p| !p.is_bot).cloned().collect();
    let unique_participants = real_participants.len();

    let duration_seconds = session
        .ended_at
        .zip(session.started_at)
        .map(|(ended, started)| (ended - started).num_seconds().max(0))
        .unwrap_or(0);

    let transcript_summary = if session.transcript.is_empty() {
        None
    } else {
        Some(truncate_chars(&session.transcript, 500))
    };

    SummaryRecord {
        meeting_id: session.meeting_id.clone(),
        platform: session.platform,
        session_id: session.session_id.clone(),
        status: session.status,
        created_at: session.created_at,
        started_at: session.started_at,
        ended_at: session.ended_at,
        duration_seconds,
        participants,
        real_participants,
        unique_participants,
        audio_chunks: session.valid_chunk_count,
        audio_duration_seconds: session.valid_chunk_count * chunk_interval_seconds,
        transcript: if session.transcript.is_empty() {
            None
        } else {
            Some(session.transcript.clone())
        },
        transcript_summary,
        error: session.error.clone(),
        errors: session.errors.clone(),
    }
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ParticipantRecord, Platform, Role, SessionStatus};
    use chrono::Utc;

    fn test_config() -> Config {
        Config {
            api_host: "0.0.0.0".into(),
            api_port: 8000,
            max_concurrent_sessions: 10,
            session_start_timeout_seconds: 30,
            chunk_interval_seconds: 30,
            headless_browser: true,
            profiles_root: std::path::PathBuf::from("/tmp/profiles"),
            default_profile_name: "google_main".into(),
            data_dir: std::path::PathBuf::from("/tmp/data"),
            bot_display_name: "Meeting Bot".into(),
            bot_account_identifiers: vec![],
            diarization_endpoint_url: None,
            event_sink_endpoint: None,
            artifact_store_endpoint: None,
            credential_encryption_secret: None,
        }
    }

    #[test]
    fn drops_invalid_non_bot_rows_but_keeps_bot_rows() {
        let mut session = Session::new(
            "meeting-1".into(),
            Platform::Gmeet,
            "https://meet.google.com/abc-defg-hij".into(),
        );
        session.status = SessionStatus::Ended;
        session.started_at = Some(Utc::now());
        session.ended_at = Some(Utc::now());
        session.valid_chunk_count = 4;

        let now = Utc::now();
        session.participant_history.0.insert(
            "your microphone is off".to_string(),
            ParticipantRecord {
                display_name: "your microphone is off".to_string(),
                original_name_as_seen: "your microphone is off".to_string(),
                is_bot: false,
                role: Role::Guest,
                first_seen: now,
                last_seen_present_at: now,
                left_at: None,
            },
        );
        session.participant_history.0.insert(
            "Meeting Bot".to_string(),
            ParticipantRecord {
                display_name: "Meeting Bot".to_string(),
                original_name_as_seen: "Meeting Bot (You)".to_string(),
                is_bot: true,
                role: Role::Guest,
                first_seen: now,
                last_seen_present_at: now,
                left_at: None,
            },
        );

        let config = test_config();
        let summary = build(&session, &config, 30);

        assert_eq!(summary.participants.len(), 1);
        assert_eq!(summary.participants[0].name, "Meeting Bot");
        assert_eq!(summary.unique_participants, 0);
        assert_eq!(summary.audio_chunks, 4);
        assert_eq!(summary.audio_duration_seconds, 120);
    }

    #[test]
    fn transcript_summary_truncated_to_500_chars() {
        let mut session = Session::new(
            "meeting-1".into(),
            Platform::Gmeet,
            "https://meet.google.com/abc-defg-hij".into(),
        );
        session.transcript = "x".repeat(900);
        let config = test_config();
        let summary = build(&session, &config, 30);
        assert_eq!(summary.transcript_summary.unwrap().len(), 500);
        assert_eq!(summary.transcript.unwrap().len(), 900);
    }
}
