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

/// UI chrome that must never be treated as a participant name, per `spec.md`
/// §4.5. Entries are matched as substrings of the lowercased candidate.
pub const UI_CHROME_BLACKLIST: &[&str] = &[
    "backgrounds and effects",
    "you can't unmute someone else",
    "your microphone is off",
    "you can't remotely mute",
    "visual effects",
    "apply visual effects",
    "background blur",
    "blur background",
    "change background",
    "your camera is off",
    "microphone is off",
    "camera is off",
    "microphone is on",
    "camera is on",
    "mic is off",
    "mic is on",
    "can't remotely mute",
    "can't unmute",
    "remotely mute",
    "'s microphone",
    "'s camera",
    "turn on microphone",
    "turn off microphone",
    "turn on camera",
    "turn off camera",
    "mute microphone",
    "unmute microphone",
    "present now",
    "stop presenting",
    "share screen",
    "stop sharing",
    "raise hand",
    "lower hand",
    "end call",
    "leave call",
    "leave meeting",
    "end meeting",
    "in the meeting",
    "contributors",
    "add people",
    "search for people",
    "invite",
    "share link",
    "host controls",
    "meeting details",
    "other people",
    "in this call",
    "people in this call",
    "you're the only one",
    "waiting for others",
    "connecting",
    "reconnecting",
    "joining",
    "loading",
    "settings",
    "options",
    "more options",
    "more actions",
    "send a message",
    "chat",
    "activities",
    "captions",
    "subtitles",
    "recording",
    "breakout rooms",
    "layout",
    "tiled",
    "spotlight",
    "sidebar",
    "auto",
    "allow",
    "deny",
    "grant",
    "permission",
    "access",
    "enable",
    "disable",
    "denied",
    "blocked",
    "turn on",
    "turn off",
    "mute",
    "unmute",
    "join now",
    "ask to join",
    "present",
];

/// Validates a raw extracted name against the hard blacklist and the
/// remaining heuristics from `spec.md` §4.5 — the single source of truth
/// used by every extraction tier and by `spec.md` property 6.
pub fn is_valid_participant_name(name: &str) -> bool {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return false;
    }

    let lower = trimmed.to_lowercase();

    for entry in UI_CHROME_BLACKLIST {
        if lower.contains(entry) {
            return false;
        }
    }

    if lower.starts_with("your ") || lower.starts_with("you ") {
        return false;
    }

    if lower.contains("can't") || lower.contains("cannot") {
        return false;
    }

    // Multi-sentence strings read as notifications, not names; "Dr. John Smith"
    // still has <= 1 period so it survives.
    let period_count = trimmed.matches('.').count();
    let word_count = trimmed.split_whitespace().count();
    if period_count > 1 && word_count > 4 {
        return false;
    }
    if lower.ends_with('.') && word_count > 4 {
        return false;
    }

    if trimmed.chars().count() < 2 || trimmed.chars().count() > 100 {
        return false;
    }

    if !trimmed.chars().any(|c| c.is_alphabetic()) {
        return false;
    }

    if trimmed.chars().all(|c| !c.is_lowercase() || c.is_whitespace())
        && trimmed.chars().any(|c| c.is_uppercase())
        && trimmed.chars().any(|c| c.is_ascii_digit())
    {
        return false;
    }

    true
}

/// Strips the `(you)` self-marker (any case) and validates, returning the
/// cleaned canonical name used as the `ParticipantHistory` key.
pub fn clean_participant_name(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let cleaned = strip_you_suffix(trimmed);

    if is_valid_participant_name(&cleaned) {
        Some(cleaned)
    } else {
        None
    }
}

/// Removes a trailing `(you)` marker, case-insensitively, keeping the rest of
/// the name intact.
pub fn strip_you_suffix(name: &str) -> String {
    let lower = name.to_lowercase();
    if let Some(idx) = lower.rfind("(you)") {
        name[..idx].trim_end().to_string()
    } else {
        name.to_string()
    }
}

pub fn contains_you_marker(name: &str) -> bool {
    name.to_lowercase().contains("(you)")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blacklist_entries_are_all_rejected() {
        for entry in UI_CHROME_BLACKLIST {
            assert!(
                !is_valid_participant_name(entry),
                "blacklisted entry {entry:?} should be invalid"
            );
        }
    }

    #[test]
    fn cant_sentences_are_rejected() {
        assert!(!is_valid_participant_name(
            "You can't unmute someone else's microphone"
        ));
        assert!(!is_valid_participant_name("cannot find device"));
    }

    #[test]
    fn real_names_pass() {
        assert!(is_valid_participant_name("Snehil Patel"));
        assert!(is_valid_participant_name("Dr. John Smith"));
        assert_eq!(
            clean_participant_name("Meeting Bot (You)"),
            Some("Meeting Bot".to_string())
        );
    }

    #[test]
    fn too_short_or_empty_rejected() {
        assert!(!is_valid_participant_name(""));
        assert!(!is_valid_participant_name("A"));
        assert!(!is_valid_participant_name("   "));
    }

    #[test]
    fn you_marker_detected_case_insensitively() {
        assert!(contains_you_marker("Meeting Bot (YOU)"));
        assert!(!contains_you_marker("Meeting Bot"));
    }
}
