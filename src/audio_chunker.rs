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

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::artifact_store::{ArtifactStore, ArtifactStoreExt};
use crate::bot_identity;
use crate::browser::PageSurface;
use crate::config::Config;
use crate::diarizer::Diarizer;
use crate::events::{Event, EventSink};
use crate::participant_extractor;
use crate::types::{iso_timestamp_safe, AudioChunk, ParticipantSnapshot, Platform, Session};

const SAMPLE_RATE: u32 = 16_000;

/// Synthesizes `duration` seconds of silent mono 16-bit PCM, the step-4(b)
/// placeholder used when no browser-side capture routine is available.
fn synthesize_silence(duration_seconds: u64) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut buffer = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut buffer, spec).expect("wav header is well-formed");
        let sample_count = SAMPLE_RATE as u64 * duration_seconds;
        for _ in 0..sample_count {
            writer.write_sample(0i16).expect("writing a silent sample cannot fail");
        }
        writer.finalize().expect("finalizing a fresh in-memory wav cannot fail");
    }
    buffer.into_inner()
}

/// Parses `bytes` as a WAV file and returns its duration in seconds, or
/// `None` if the bytes are not a valid WAV.
fn wav_duration_seconds(bytes: &[u8]) -> Option<f64> {
    let reader = hound::WavReader::new(Cursor::new(bytes)).ok()?;
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return None;
    }
    Some(reader.duration() as f64 / spec.sample_rate as f64)
}

/// Acquires raw audio bytes for one interval per `spec.md` §4.7 step 4: a
/// browser-side capture routine is the out-of-scope collaborator, so this
/// always falls through to the silent-PCM placeholder, the documented
/// secondary strategy.
async fn capture_interval_audio(_page: &dyn PageSurface, duration_seconds: u64) -> Vec<u8> {
    synthesize_silence(duration_seconds)
}

/// `run(session, stop_signal)` from `spec.md` §4.7: one chunk every `T`
/// seconds, cancellation-safe at the per-iteration boundary.
#[allow(clippy::too_many_arguments)]
pub async fn run(
    session_id: String,
    meeting_id: String,
    platform: Platform,
    page: Arc<dyn PageSurface>,
    config: Arc<Config>,
    diarizer: Arc<Diarizer>,
    event_sink: Arc<dyn EventSink>,
    artifact_store: Arc<dyn ArtifactStore>,
    session: Arc<tokio::sync::Mutex<Session>>,
    stop_token: CancellationToken,
) {
    let interval = Duration::from_secs(config.chunk_interval_seconds);

    loop {
        let start_ts = Utc::now();

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = stop_token.cancelled() => return,
        }

        if stop_token.is_cancelled() {
            return;
        }

        let end_ts = Utc::now();
        let audio_bytes = capture_interval_audio(page.as_ref(), config.chunk_interval_seconds).await;

        let duration_s = match wav_duration_seconds(&audio_bytes) {
            Some(d) if d >= 1.0 => d,
            _ => {
                tracing::warn!(session_id = %session_id, "dropping audio chunk that failed wav validation");
                continue;
            }
        };

        let mut candidates = participant_extractor::extract(page.as_ref(), platform).await;
        let identifiers = config.bot_identifiers();
        let detected_bot_name = session.lock().await.detected_bot_self_name.clone();
        for candidate in candidates.iter_mut() {
            candidate.is_bot = bot_identity::is_bot(candidate, &identifiers, detected_bot_name.as_deref());
        }
        let snapshot: Vec<ParticipantSnapshot> =
            candidates.into_iter().map(ParticipantSnapshot::from).collect();

        let speakers = diarizer
            .analyze(&meeting_id, &session_id, &audio_bytes, &snapshot)
            .await;
        let active_speaker = speakers
            .iter()
            .max_by(|a, b| a.confidence.partial_cmp(&b.confidence).unwrap())
            .cloned();

        let chunk_number = {
            let mut guard = session.lock().await;
            let n = guard.next_chunk_number;
            guard.next_chunk_number += 1;
            guard.valid_chunk_count += 1;
            n
        };

        let chunk = AudioChunk {
            chunk_id: Uuid::new_v4().to_string(),
            chunk_number,
            meeting_id: meeting_id.clone(),
            session_id: session_id.clone(),
            start_ts,
            end_ts,
            duration_s,
            audio_path: String::new(),
            audio_size_bytes: audio_bytes.len() as u64,
            participants_snapshot: snapshot,
            active_speaker,
            all_speakers: speakers,
        };

        let audio_path = format!("{meeting_id}/{session_id}/{}.wav", iso_timestamp_safe(chunk.start_ts));
        let mut chunk = chunk;
        chunk.audio_path = audio_path.clone();

        if let Err(e) = artifact_store.put_audio(&audio_path, &audio_bytes).await {
            tracing::warn!(session_id = %session_id, error = %e, "failed to persist audio chunk");
        }
        let metadata_filename = chunk.descriptive_filename().replace(".wav", ".json");
        let metadata_path = format!("chunks/{meeting_id}/{session_id}/{metadata_filename}");
        if let Err(e) = artifact_store.put_json(&metadata_path, &chunk).await {
            tracing::warn!(session_id = %session_id, error = %e, "failed to persist chunk metadata");
        }

        event_sink
            .publish(Event::audio_chunk_complete(&meeting_id, &chunk))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_round_trips_through_wav_validation() {
        let bytes = synthesize_silence(2);
        let duration = wav_duration_seconds(&bytes).unwrap();
        assert!((duration - 2.0).abs() < 0.01);
    }

    #[test]
    fn garbage_bytes_fail_wav_validation() {
        assert!(wav_duration_seconds(b"not a wav file").is_none());
    }

    #[test]
    fn sub_second_silence_is_still_parseable_but_flagged_by_caller() {
        let bytes = synthesize_silence(0);
        let duration = wav_duration_seconds(&bytes).unwrap();
        assert!(duration < 1.0);
    }
}
