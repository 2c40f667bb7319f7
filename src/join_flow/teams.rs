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

use async_trait::async_trait;

use super::{content_has_any, fail_with_snapshot, navigate, JoinFlow, JOIN_BUTTON_BUDGET, POST_CLICK_VALIDATION_BUDGET};
use crate::browser::PageSurface;
use crate::error::{JoinFailureReason, SessionError};

const SIGNIN_PHRASES: &[&str] = &["login.microsoftonline.com", "sign in to your account"];
const AUTH_BLOCKED_PHRASES: &[&str] = &["you need to sign in", "use your organization account"];
const BLOCKED_PHRASES: &[&str] = &["we couldn't find this meeting", "this meeting was not found"];
const CONTINUE_IN_BROWSER_SELECTORS: &[&str] = &["a[data-tid=\"joinOnWeb\"]"];
const PERMISSION_DIALOG_SELECTORS: &[&str] = &["div[role=\"dialog\"]"];
const MIC_TOGGLE_SELECTORS: &[&str] = &["[data-tid=\"toggle-mute\"]"];
const CAMERA_TOGGLE_SELECTORS: &[&str] = &["[data-tid=\"toggle-video\"]"];
const JOIN_NOW_SELECTORS: &[&str] = &["#prejoin-join-button", "[data-tid=\"prejoin-join-button\"]"];
const GENERIC_JOIN_SELECTORS: &[&str] = &["button"];
const IN_MEETING_SELECTORS: &[&str] = &["#hangup-button", "[data-tid=\"hangup-main-btn\"]"];
const WAITING_ROOM_PHRASES: &[&str] = &["someone will let you in soon", "waiting for the host"];
const CAPTIONS_SELECTOR: &str = "[data-tid=\"closed-captions-button\"]";

pub struct TeamsJoinFlow;

#[async_trait]
impl JoinFlow for TeamsJoinFlow {
    async fn join(&self, page: &dyn PageSurface, url: &str) -> Result<(), SessionError> {
        navigate(page, url).await?;

        for selector in CONTINUE_IN_BROWSER_SELECTORS {
            let _ = page.click(selector).await;
        }

        let content = page.content().await.unwrap_or_default();
        let current_url = page.url().await;
        if content_has_any(&content, SIGNIN_PHRASES) || content_has_any(&current_url, SIGNIN_PHRASES) {
            return Err(SessionError::JoinFailed {
                reason: JoinFailureReason::NotAuthenticated,
                snapshot_path: None,
            });
        }

        if content_has_any(&content, BLOCKED_PHRASES) {
            let reason = if content_has_any(&content, AUTH_BLOCKED_PHRASES) {
                JoinFailureReason::NotAuthenticated
            } else {
                JoinFailureReason::MeetingInaccessible
            };
            return Err(fail_with_snapshot(page, reason).await);
        }

        for selector in PERMISSION_DIALOG_SELECTORS {
            if page.is_visible(selector).await.unwrap_or(false) {
                if !page
                    .click_matching_text(&["button"], "allow", None)
                    .await
                    .unwrap_or(false)
                {
                    let _ = page.click("[aria-label=\"Close\"]").await;
                }
                break;
            }
        }

        for selector in MIC_TOGGLE_SELECTORS {
            let _ = page.click(selector).await;
        }
        for selector in CAMERA_TOGGLE_SELECTORS {
            let _ = page.click(selector).await;
        }

        let deadline = tokio::time::Instant::now() + JOIN_BUTTON_BUDGET;
        let mut clicked = false;
        while tokio::time::Instant::now() < deadline && !clicked {
            for selector in JOIN_NOW_SELECTORS {
                if page.click(selector).await.unwrap_or(false) {
                    clicked = true;
                    break;
                }
            }
            if !clicked
                && page
                    .click_matching_text(GENERIC_JOIN_SELECTORS, "join", Some("leave"))
                    .await
                    .unwrap_or(false)
            {
                clicked = true;
            }
            if !clicked {
                page.wait(Duration::from_millis(500)).await;
            }
        }

        if !clicked {
            return Err(fail_with_snapshot(page, JoinFailureReason::NoJoinButton).await);
        }

        let validation_deadline = tokio::time::Instant::now() + POST_CLICK_VALIDATION_BUDGET;
        while tokio::time::Instant::now() < validation_deadline {
            let current = page.url().await;
            if !current.contains("teams.microsoft.com") && !current.contains("teams.live.com") {
                return Err(SessionError::JoinFailed {
                    reason: JoinFailureReason::Redirected,
                    snapshot_path: None,
                });
            }

            for selector in IN_MEETING_SELECTORS {
                if page.is_visible(selector).await.unwrap_or(false) {
                    let _ = page.click(CAPTIONS_SELECTOR).await;
                    return Ok(());
                }
            }

            let current_content = page.content().await.unwrap_or_default();
            if content_has_any(&current_content, WAITING_ROOM_PHRASES) {
                return Ok(());
            }

            page.wait(Duration::from_millis(500)).await;
        }

        Err(fail_with_snapshot(page, JoinFailureReason::NoJoinButton).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::FakePage;

    #[tokio::test]
    async fn blocked_meeting_fails_with_inaccessible() {
        let page = FakePage::new(
            "https://teams.microsoft.com/l/meetup-join/abc",
            "we couldn't find this meeting",
        );
        let flow = TeamsJoinFlow;
        let result = flow.join(&page, "https://teams.microsoft.com/l/meetup-join/abc").await;
        assert!(matches!(
            result,
            Err(SessionError::JoinFailed {
                reason: JoinFailureReason::MeetingInaccessible,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn waiting_room_is_an_accepted_admitted_state() {
        let page = FakePage::new(
            "https://teams.microsoft.com/l/meetup-join/abc",
            "someone will let you in soon",
        );
        page.mark_visible("#prejoin-join-button").await;
        let flow = TeamsJoinFlow;
        let result = flow.join(&page, "https://teams.microsoft.com/l/meetup-join/abc").await;
        assert!(result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn no_join_button_within_budget_fails() {
        let page = FakePage::new("https://teams.microsoft.com/l/meetup-join/abc", "");
        let flow = TeamsJoinFlow;
        let result = flow.join(&page, "https://teams.microsoft.com/l/meetup-join/abc").await;
        assert!(matches!(
            result,
            Err(SessionError::JoinFailed {
                reason: JoinFailureReason::NoJoinButton,
                ..
            })
        ));
    }
}
