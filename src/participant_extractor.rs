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

use std::collections::HashSet;

use crate::browser::PageSurface;
use crate::participant_filter::clean_participant_name;
use crate::types::{ParticipantCandidate, Platform, Role};

/// Roster rows exposed by the primary DOM-scrape script. The real
/// implementation evaluates a small probe script against the page; `text` is
/// the row's visible label, `self_attr`/`aria_label` carry the platform's
/// "this is you" markers, and `classes` lets the secondary tier recognize
/// rows that the platform styles as the local participant.
#[derive(Debug, Clone, serde::Deserialize)]
struct RosterRow {
    #[serde(default)]
    text: String,
    #[serde(default)]
    self_attr: Option<String>,
    #[serde(default)]
    aria_label: Option<String>,
    #[serde(default)]
    classes: Vec<String>,
}

const GMEET_ROSTER_PROBE: &str = r#"
(() => Array.from(document.querySelectorAll('[role="listitem"]')).map(el => ({
  text: el.innerText || '',
  self_attr: el.getAttribute('data-self-name'),
  aria_label: el.getAttribute('aria-label'),
  classes: Array.from(el.classList),
})))()
"#;

const TEAMS_ROSTER_PROBE: &str = r#"
(() => Array.from(document.querySelectorAll('[data-tid="participantsList"] [role="listitem"]')).map(el => ({
  text: el.innerText || '',
  self_attr: el.getAttribute('data-tid'),
  aria_label: el.getAttribute('aria-label'),
  classes: Array.from(el.classList),
})))()
"#;

fn roster_probe_script(platform: Platform) -> &'static str {
    match platform {
        Platform::Gmeet => GMEET_ROSTER_PROBE,
        Platform::Teams => TEAMS_ROSTER_PROBE,
    }
}

fn roster_panel_selector(platform: Platform) -> &'static str {
    match platform {
        Platform::Gmeet => "[aria-label=\"Show everyone\"]",
        Platform::Teams => "button[aria-label=\"People\"]",
    }
}

fn badge_count_selectors(platform: Platform) -> &'static [&'static str] {
    match platform {
        Platform::Gmeet => &[
            "[aria-label=\"Show everyone\"] span.fVpgnd",
            "[aria-label*=\"participant\"] span[class*=\"count\"]",
            "[data-participant-count]",
        ],
        Platform::Teams => &[
            "[data-tid=\"roster-button\"] [data-tid=\"counter-badge\"]",
            "button[aria-label=\"People\"] span[class*=\"badge\"]",
        ],
    }
}

/// Opens the roster panel if it is not already open, a no-op when it's
/// already visible. Never fatal: subsequent tiers cope with an empty roster.
async fn ensure_roster_open(page: &dyn PageSurface, platform: Platform) {
    let selector = roster_panel_selector(platform);
    if !page.is_visible(selector).await.unwrap_or(false) {
        let _ = page.click(selector).await;
        page.wait(std::time::Duration::from_millis(400)).await;
    }
}

/// Reads the numeric participant-count badge next to the roster toggle,
/// trying each selector in the platform's fallback chain until one parses.
pub async fn read_badge_count(page: &dyn PageSurface, platform: Platform) -> Option<u32> {
    for selector in badge_count_selectors(platform) {
        if let Ok(Some(text)) = page.inner_text(selector).await {
            if let Some(n) = parse_leading_number(&text) {
                return Some(n);
            }
        }
    }
    None
}

fn parse_leading_number(text: &str) -> Option<u32> {
    let digits: String = text
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse::<u32>().ok()
}

/// Primary tier: structured DOM scrape of roster rows via the platform probe.
async fn scrape_roster_rows(page: &dyn PageSurface, platform: Platform) -> Vec<RosterRow> {
    match page.evaluate_script(roster_probe_script(platform)).await {
        Ok(value) => serde_json::from_value(value).unwrap_or_default(),
        Err(_) => Vec::new(),
    }
}

/// Secondary tier: walks the roster panel's raw inner text, one name per
/// line, when the structured probe returns nothing (markup drift).
async fn scrape_panel_text(page: &dyn PageSurface, platform: Platform) -> Vec<String> {
    let panel_selector = match platform {
        Platform::Gmeet => "[aria-label=\"Participants\"]",
        Platform::Teams => "[data-tid=\"participantsList\"]",
    };
    match page.inner_text(panel_selector).await {
        Ok(Some(text)) => text.lines().map(|l| l.trim().to_string()).collect(),
        _ => Vec::new(),
    }
}

fn row_is_self(row: &RosterRow) -> bool {
    if let Some(attr) = &row.self_attr {
        if attr.to_lowercase().contains("self") || attr.to_lowercase().contains("you") {
            return true;
        }
    }
    if let Some(aria) = &row.aria_label {
        if aria.to_lowercase().contains("(you)") {
            return true;
        }
    }
    row.classes.iter().any(|c| c.to_lowercase().contains("self"))
}

/// Full layered extraction described in `spec.md` §4.5: open the panel, read
/// the badge hint, run the structured and text-walk tiers, dedupe by cleaned
/// name, and synthesize placeholders when the badge disagrees with what was
/// actually extracted. The self/bot-row signal is carried through as
/// `is_bot`; the bot identity resolver combines it with configured
/// identifiers rather than re-deriving it from scratch.
pub async fn extract(page: &dyn PageSurface, platform: Platform) -> Vec<ParticipantCandidate> {
    ensure_roster_open(page, platform).await;
    let badge = read_badge_count(page, platform).await;

    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    for row in scrape_roster_rows(page, platform).await {
        if let Some(name) = clean_participant_name(&row.text) {
            if seen.insert(name.clone()) {
                candidates.push(ParticipantCandidate {
                    name,
                    original_name: row.text.clone(),
                    is_bot: row_is_self(&row),
                    role: Role::Guest,
                    is_speaking: false,
                });
            }
        }
    }

    let badge_target = badge.unwrap_or(0);
    if (candidates.len() as u32) < badge_target {
        for line in scrape_panel_text(page, platform).await {
            if let Some(name) = clean_participant_name(&line) {
                if seen.insert(name.clone()) {
                    candidates.push(ParticipantCandidate {
                        name,
                        original_name: line,
                        is_bot: false,
                        role: Role::Guest,
                        is_speaking: false,
                    });
                }
            }
        }
    }

    // Badge fallback: the badge claims N>=1 people but extraction validated
    // none of them, so name the gap with numbered placeholders rather than
    // reporting an empty meeting the participant count disagrees with.
    if let Some(badge_count) = badge {
        if candidates.is_empty() && badge_count >= 1 {
            for i in 1..=badge_count {
                candidates.push(ParticipantCandidate {
                    name: format!("Participant {i}"),
                    original_name: format!("Participant {i}"),
                    is_bot: false,
                    role: Role::Guest,
                    is_speaking: false,
                });
            }
        }
    }

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::FakePage;
    use serde_json::json;

    #[tokio::test]
    async fn structured_probe_extracts_and_dedupes() {
        let page = FakePage::new("https://meet.google.com/abc-defg-hij", "");
        page.mark_visible(roster_panel_selector(Platform::Gmeet)).await;
        page.set_eval_response(
            "querySelectorAll",
            json!([
                {"text": "Snehil Patel", "self_attr": null, "aria_label": null, "classes": []},
                {"text": "Snehil Patel", "self_attr": null, "aria_label": null, "classes": []},
                {"text": "Meeting Bot (You)", "self_attr": "self-name", "aria_label": null, "classes": []},
                {"text": "your microphone is off", "self_attr": null, "aria_label": null, "classes": []},
            ]),
        )
        .await;

        let result = extract(&page, Platform::Gmeet).await;
        assert_eq!(result.len(), 2);
        assert!(result.iter().any(|c| c.name == "Snehil Patel" && !c.is_bot));
        assert!(result.iter().any(|c| c.name == "Meeting Bot" && c.is_bot));
    }

    #[tokio::test]
    async fn badge_fallback_synthesizes_placeholders() {
        let page = FakePage::new("https://meet.google.com/abc-defg-hij", "");
        page.set_inner_text("[aria-label=\"Show everyone\"] span.fVpgnd", "3")
            .await;

        let result = extract(&page, Platform::Gmeet).await;
        assert_eq!(result.len(), 3);
        assert_eq!(result[0].name, "Participant 1");
    }

    #[tokio::test]
    async fn text_walk_tier_used_when_probe_empty() {
        let page = FakePage::new("https://teams.live.com/meet/123", "");
        page.set_inner_text("[data-tid=\"roster-button\"] [data-tid=\"counter-badge\"]", "2")
            .await;
        page.set_inner_text(
            "[data-tid=\"participantsList\"]",
            "Dr. John Smith\nyou can't unmute someone else\nAda Lovelace",
        )
        .await;

        let result = extract(&page, Platform::Teams).await;
        let names: Vec<_> = result.iter().map(|c| c.name.clone()).collect();
        assert!(names.contains(&"Dr. John Smith".to_string()));
        assert!(names.contains(&"Ada Lovelace".to_string()));
        assert_eq!(names.len(), 2);
    }

    #[tokio::test]
    async fn empty_meeting_with_no_badge_yields_nothing() {
        let page = FakePage::new("https://meet.google.com/abc-defg-hij", "");
        let result = extract(&page, Platform::Gmeet).await;
        assert!(result.is_empty());
    }
}
