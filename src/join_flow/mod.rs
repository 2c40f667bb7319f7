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

mod gmeet;
mod teams;

use std::time::Duration;

use crate::browser::PageSurface;
use crate::error::{JoinFailureReason, SessionError};
use crate::types::Platform;

/// `join(page, url)` from `spec.md` §4.4: each platform implements the same
/// contract, only the selectors and step order differ.
#[async_trait::async_trait]
pub trait JoinFlow: Send + Sync {
    async fn join(&self, page: &dyn PageSurface, url: &str) -> Result<(), SessionError>;
}

pub fn for_platform(platform: Platform) -> Box<dyn JoinFlow> {
    match platform {
        Platform::Gmeet => Box::new(gmeet::GmeetJoinFlow),
        Platform::Teams => Box::new(teams::TeamsJoinFlow),
    }
}

pub(crate) const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);
pub(crate) const JOIN_BUTTON_BUDGET: Duration = Duration::from_secs(15);
pub(crate) const POST_CLICK_VALIDATION_BUDGET: Duration = Duration::from_secs(15);

pub(crate) async fn navigate(page: &dyn PageSurface, url: &str) -> Result<(), SessionError> {
    tokio::time::timeout(NAVIGATION_TIMEOUT, page.navigate(url))
        .await
        .map_err(|_| SessionError::JoinFailed {
            reason: JoinFailureReason::NavigationFailed,
            snapshot_path: None,
        })?
        .map_err(|_| SessionError::JoinFailed {
            reason: JoinFailureReason::NavigationFailed,
            snapshot_path: None,
        })
}

pub(crate) fn content_has_any(content: &str, phrases: &[&str]) -> bool {
    let lower = content.to_lowercase();
    phrases.iter().any(|p| lower.contains(p))
}

pub(crate) async fn fail_with_snapshot(
    page: &dyn PageSurface,
    reason: JoinFailureReason,
) -> SessionError {
    let snapshot_path = page.screenshot("join_failure").await;
    SessionError::JoinFailed { reason, snapshot_path }
}
