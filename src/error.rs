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

use thiserror::Error;

/// Reasons a join attempt can fail to reach an admitted state, per `spec.md` §4.4.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinFailureReason {
    NavigationFailed,
    NotAuthenticated,
    MeetingInaccessible,
    NoJoinButton,
    Redirected,
}

impl std::fmt::Display for JoinFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JoinFailureReason::NavigationFailed => write!(f, "NavigationFailed"),
            JoinFailureReason::NotAuthenticated => write!(f, "NotAuthenticated"),
            JoinFailureReason::MeetingInaccessible => write!(f, "MeetingInaccessible"),
            JoinFailureReason::NoJoinButton => write!(f, "NoJoinButton"),
            JoinFailureReason::Redirected => write!(f, "Redirected"),
        }
    }
}

/// The error taxonomy from `spec.md` §7. Fatal variants terminate only the
/// owning session; degraded variants are recorded in `Session.errors` and do
/// not stop the session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid meeting url")]
    InvalidMeetingUrl,

    #[error("join failed: {reason}")]
    JoinFailed {
        reason: JoinFailureReason,
        snapshot_path: Option<String>,
    },

    #[error("audio capture degraded: {0}")]
    CapturePartial(String),

    #[error("diarization unavailable: {0}")]
    DiarizationUnavailable(String),

    #[error("external sink failure: {0}")]
    ExternalSinkFailure(String),

    #[error("session cancelled")]
    Cancelled,
}

impl SessionError {
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SessionError::InvalidMeetingUrl
                | SessionError::JoinFailed { .. }
                | SessionError::Cancelled
        )
    }
}

#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("invalid meeting url")]
    InvalidMeetingUrl,
    #[error("internal error: {0}")]
    Internal(String),
}
