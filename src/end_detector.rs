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

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::bot_identity;
use crate::browser::PageSurface;
use crate::config::Config;
use crate::participant_extractor::{self};
use crate::types::Platform;

const EXPLICIT_END_PHRASES: &[&str] = &[
    "meeting ended",
    "you left the meeting",
    "call ended",
    "meeting has ended",
    "this meeting has ended",
];

const DISCONNECTION_PHRASES: &[&str] = &["trying to reconnect", "connection lost", "reconnecting"];

fn platform_host(platform: Platform) -> &'static str {
    match platform {
        Platform::Gmeet => "meet.google.com",
        Platform::Teams => "teams.microsoft.com",
    }
}

fn leave_selectors(platform: Platform) -> &'static [&'static str] {
    match platform {
        Platform::Gmeet => &[
            "[aria-label=\"Leave call\"]",
            "[aria-label=\"Leave meeting\"]",
        ],
        Platform::Teams => &[
            "#hangup-button",
            "[data-tid=\"hangup-main-btn\"]",
            "[aria-label=\"Leave\"]",
        ],
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    ExplicitEnd,
    Disconnection,
    EmptyMeeting,
    Cancelled,
}

fn content_has_any(content: &str, phrases: &[&str]) -> bool {
    let lower = content.to_lowercase();
    phrases.iter().any(|p| lower.contains(p))
}

/// `is_meeting_empty(page)` from `spec.md` §4.9: the single conjunction used
/// by both tiers of the empty-meeting hysteresis and by the roster loop's
/// in-loop empty check.
pub async fn is_meeting_empty(page: &dyn PageSurface, platform: Platform, config: &Config) -> bool {
    let badge = participant_extractor::read_badge_count(page, platform).await;
    if badge.unwrap_or(0) > 1 {
        return false;
    }

    let mut candidates = participant_extractor::extract(page, platform).await;
    if candidates.len() > 1 {
        return false;
    }

    let identifiers = config.bot_identifiers();
    for candidate in candidates.iter_mut() {
        candidate.is_bot = bot_identity::is_bot(candidate, &identifiers, None);
    }

    let real_count = candidates.iter().filter(|c| !c.is_bot).count();
    if real_count > 0 {
        return false;
    }

    if candidates.len() == 1 && !candidates[0].is_bot {
        return false;
    }

    true
}

/// Blocks until one of the three terminal conditions fires, per `spec.md`
/// §4.9, or until `stop_signal` carries `true` (operator-requested stop).
pub async fn wait_for_end(
    page: &dyn PageSurface,
    platform: Platform,
    config: &Config,
    stop_token: CancellationToken,
) -> EndReason {
    let mut consecutive_empty = 0u32;

    loop {
        if stop_token.is_cancelled() {
            return EndReason::Cancelled;
        }

        let url = page.url().await;
        let content = page.content().await.unwrap_or_default();

        if !url.contains(platform_host(platform)) || content_has_any(&content, EXPLICIT_END_PHRASES) {
            attempt_leave(page, platform).await;
            return EndReason::ExplicitEnd;
        }

        if content_has_any(&content, DISCONNECTION_PHRASES) {
            tokio::select! {
                _ = page.wait(Duration::from_secs(10)) => {}
                _ = stop_token.cancelled() => return EndReason::Cancelled,
            }
            let recheck = page.content().await.unwrap_or_default();
            if content_has_any(&recheck, DISCONNECTION_PHRASES) {
                attempt_leave(page, platform).await;
                return EndReason::Disconnection;
            }
        }

        if is_meeting_empty(page, platform, config).await {
            consecutive_empty += 1;
        } else {
            consecutive_empty = 0;
        }

        if consecutive_empty >= 3 {
            tokio::select! {
                _ = page.wait(Duration::from_secs(15)) => {}
                _ = stop_token.cancelled() => return EndReason::Cancelled,
            }
            if is_meeting_empty(page, platform, config).await {
                attempt_leave(page, platform).await;
                return EndReason::EmptyMeeting;
            }
            consecutive_empty = 0;
        }

        tokio::select! {
            _ = page.wait(Duration::from_secs(5)) => {}
            _ = stop_token.cancelled() => return EndReason::Cancelled,
        }
    }
}

async fn attempt_leave(page: &dyn PageSurface, platform: Platform) {
    for selector in leave_selectors(platform) {
        if page.click(selector).await.unwrap_or(false) {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::FakePage;
    use serde_json::json;

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

    #[tokio::test]
    async fn explicit_end_phrase_terminates_immediately() {
        let page = FakePage::new("https://meet.google.com/abc-defg-hij", "You left the meeting");
        let config = test_config();
        let reason = wait_for_end(&page, Platform::Gmeet, &config, CancellationToken::new()).await;
        assert_eq!(reason, EndReason::ExplicitEnd);
    }

    #[tokio::test]
    async fn navigation_away_from_host_terminates() {
        let page = FakePage::new("https://accounts.google.com/signin", "");
        let config = test_config();
        let reason = wait_for_end(&page, Platform::Gmeet, &config, CancellationToken::new()).await;
        assert_eq!(reason, EndReason::ExplicitEnd);
    }

    #[tokio::test]
    async fn is_meeting_empty_true_when_only_bot_remains() {
        let page = FakePage::new("https://meet.google.com/abc-defg-hij", "");
        page.set_inner_text("[aria-label=\"Show everyone\"] span.fVpgnd", "1")
            .await;
        page.set_eval_response(
            "querySelectorAll",
            json!([{"text": "Meeting Bot (You)", "self_attr": null, "aria_label": null, "classes": []}]),
        )
        .await;
        let config = test_config();
        assert!(is_meeting_empty(&page, Platform::Gmeet, &config).await);
    }

    #[tokio::test]
    async fn is_meeting_empty_false_when_real_participant_present() {
        let page = FakePage::new("https://meet.google.com/abc-defg-hij", "");
        page.set_inner_text("[aria-label=\"Show everyone\"] span.fVpgnd", "2")
            .await;
        page.set_eval_response(
            "querySelectorAll",
            json!([
                {"text": "Meeting Bot (You)", "self_attr": null, "aria_label": null, "classes": []},
                {"text": "Ada Lovelace", "self_attr": null, "aria_label": null, "classes": []},
            ]),
        )
        .await;
        let config = test_config();
        assert!(!is_meeting_empty(&page, Platform::Gmeet, &config).await);
    }

    #[tokio::test]
    async fn is_meeting_empty_false_when_badge_disagrees() {
        let page = FakePage::new("https://meet.google.com/abc-defg-hij", "");
        page.set_inner_text("[aria-label=\"Show everyone\"] span.fVpgnd", "2")
            .await;
        let config = test_config();
        assert!(!is_meeting_empty(&page, Platform::Gmeet, &config).await);
    }
}
