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

use crate::config::Config;
use crate::types::ParticipantCandidate;

/// `is_bot(entry, identifiers, session_detected_bot_name) -> bool`, per
/// `spec.md` §4.6: five short-circuiting rules, evaluated in order.
pub fn is_bot(
    candidate: &ParticipantCandidate,
    identifiers: &[String],
    session_detected_bot_name: Option<&str>,
) -> bool {
    if candidate.is_bot {
        return true;
    }

    if candidate.original_name.to_lowercase().contains("(you)") {
        return true;
    }

    let cleaned_lower = candidate.name.to_lowercase();

    if let Some(detected) = session_detected_bot_name {
        if cleaned_lower == detected.to_lowercase() {
            return true;
        }
    }

    for identifier in identifiers {
        if cleaned_lower == *identifier {
            return true;
        }
    }

    for identifier in identifiers {
        if overlaps_sufficiently(&cleaned_lower, identifier) {
            return true;
        }
    }

    false
}

fn overlaps_sufficiently(a: &str, b: &str) -> bool {
    let (shorter, longer) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    if shorter.is_empty() {
        return false;
    }
    longer.contains(shorter) && shorter.len() * 2 >= longer.len()
}

/// Applies `is_bot` to every candidate in place, combining the process-level
/// identifier list with the session's bound self-name, if any.
pub fn resolve(
    candidates: &mut [ParticipantCandidate],
    config: &Config,
    session_detected_bot_name: Option<&str>,
) {
    let identifiers = config.bot_identifiers();
    for candidate in candidates.iter_mut() {
        candidate.is_bot = is_bot(candidate, &identifiers, session_detected_bot_name);
    }
}

/// One-shot self-name detection run shortly after `in_meeting`, per
/// `spec.md` §4.6: only rules 1–2 count as evidence here, since identifiers
/// and an already-bound name would make this circular.
pub fn detect_session_bot_name(candidates: &[ParticipantCandidate]) -> Option<String> {
    candidates
        .iter()
        .find(|c| c.is_bot || c.original_name.to_lowercase().contains("(you)"))
        .map(|c| c.name.clone())
}
