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

const SIGNIN_PHRASES: &[&str] = &["accounts.google.com", "sign in to continue"];
const AUTH_BLOCKED_PHRASES: &[&str] = &["you need to sign in", "use a google account"];
const BLOCKED_PHRASES: &[&str] = &["you can't join this video call", "check your meeting code"];
const PERMISSION_DIALOG_SELECTORS: &[&str] = &["div[role=\"dialog\"]"];
const MIC_TOGGLE_SELECTORS: &[&str] = &["[aria-label=\"Turn off microphone\"]"];
const CAMERA_TOGGLE_SELECTORS: &[&str] = &["[aria-label=\"Turn off camera\"]"];
const JOIN_NOW_SELECTORS: &[&str] = &["[aria-label=\"Join now\"]", "button[jsname=\"Qx7uuf\"]"];
const ASK_TO_JOIN_SELECTORS: &[&str] = &["[aria-label=\"Ask to join\"]"];
const GENERIC_JOIN_SELECTORS: &[&str] = &["button"];
const IN_MEETING_SELECTORS: &[&str] = &["[aria-label=\"Leave call\"]", "[aria-label=\"Turn off microphone\"]"];
const WAITING_ROOM_PHRASES: &[&str] = &["waiting for someone to let you in", "asking to join"];
const CAPTIONS_SELECTOR: &str = "[aria-label=\"Turn on captions\"]";

pub struct GmeetJoinFlow;

#[async_trait]
impl JoinFlow for GmeetJoinFlow {
    async fn join(&self, page: &dyn PageSurface, url: &str) -> Result<(), SessionError> {
        navigate(page, url).await?;

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
            if !clicked {
                for selector in ASK_TO_JOIN_SELECTORS {
                    if page.click(selector).await.unwrap_or(false) {
                        clicked = true;
                        break;
                    }
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
            if !current.contains("meet.google.com") {
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
