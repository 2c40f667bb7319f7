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

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use parking_lot::Mutex;

use crate::types::ProfileStatus;

struct ProfileState {
    filesystem_path: PathBuf,
    in_use_by_session: Option<String>,
}

/// Allocates and releases isolated browser-profile identities, per
/// `spec.md` §4.2. A single mutex serializes allocation decisions; callers
/// hold it only long enough to pick a name and flip the in-use flag.
pub struct ProfileRegistry {
    profiles_root: PathBuf,
    default_profile_name: String,
    profiles: Mutex<HashMap<String, ProfileState>>,
}

impl ProfileRegistry {
    pub fn new(profiles_root: PathBuf, default_profile_name: String) -> Result<Self> {
        std::fs::create_dir_all(&profiles_root).context("failed to create profiles root")?;

        let mut profiles = HashMap::new();
        for entry in std::fs::read_dir(&profiles_root).context("failed to list profiles root")? {
            let entry = entry.context("failed to read profile directory entry")?;
            if entry.path().is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    profiles.insert(
                        name.to_string(),
                        ProfileState {
                            filesystem_path: entry.path(),
                            in_use_by_session: None,
                        },
                    );
                }
            }
        }

        Ok(Self {
            profiles_root,
            default_profile_name,
            profiles: Mutex::new(profiles),
        })
    }

    /// Allocation order per `spec.md` §4.2: preferred, then the configured
    /// default, then the first free on-disk profile, then a freshly created
    /// `google_N` profile.
    pub fn allocate(&self, session_id: &str, preferred: Option<&str>) -> Result<String> {
        let mut profiles = self.profiles.lock();

        if let Some(name) = preferred {
            if Self::try_claim(&mut profiles, name, session_id) {
                return Ok(name.to_string());
            }
        }

        let default_name = self.default_profile_name.clone();
        if preferred != Some(default_name.as_str())
            && Self::try_claim(&mut profiles, &default_name, session_id)
        {
            return Ok(default_name);
        }

        let free_existing = profiles
            .iter()
            .find(|(_, state)| state.in_use_by_session.is_none())
            .map(|(name, _)| name.clone());
        if let Some(name) = free_existing {
            if Self::try_claim(&mut profiles, &name, session_id) {
                return Ok(name);
            }
        }

        let mut counter = 1;
        loop {
            let candidate = format!("google_{counter}");
            if !profiles.contains_key(&candidate) {
                let path = self.profiles_root.join(&candidate);
                std::fs::create_dir_all(&path)
                    .with_context(|| format!("failed to create profile directory {candidate}"))?;
                profiles.insert(
                    candidate.clone(),
                    ProfileState {
                        filesystem_path: path,
                        in_use_by_session: Some(session_id.to_string()),
                    },
                );
                return Ok(candidate);
            }
            counter += 1;
        }
    }

    fn try_claim(
        profiles: &mut HashMap<String, ProfileState>,
        name: &str,
        session_id: &str,
    ) -> bool {
        match profiles.get_mut(name) {
            Some(state) if state.in_use_by_session.is_none() => {
                state.in_use_by_session = Some(session_id.to_string());
                true
            }
            _ => false,
        }
    }

    pub fn release(&self, session_id: &str) {
        let mut profiles = self.profiles.lock();
        for state in profiles.values_mut() {
            if state.in_use_by_session.as_deref() == Some(session_id) {
                state.in_use_by_session = None;
            }
        }
    }

    pub fn list_profiles(&self) -> Vec<String> {
        self.profiles.lock().keys().cloned().collect()
    }

    pub fn filesystem_path(&self, name: &str) -> Option<PathBuf> {
        self.profiles.lock().get(name).map(|s| s.filesystem_path.clone())
    }

    /// Advisory-only: a profile "looks" logged in if its persistent state
    /// directory contains a non-trivial cookie database. No cookie contents
    /// are ever inspected.
    pub fn status(&self, name: &str) -> ProfileStatus {
        let profiles = self.profiles.lock();
        match profiles.get(name) {
            Some(state) => ProfileStatus {
                exists: true,
                logged_in_heuristic: Self::looks_logged_in(&state.filesystem_path),
                in_use_by_session: state.in_use_by_session.clone(),
            },
            None => ProfileStatus {
                exists: false,
                logged_in_heuristic: false,
                in_use_by_session: None,
            },
        }
    }

    fn looks_logged_in(path: &PathBuf) -> bool {
        let cookie_db = path.join("Default").join("Cookies");
        std::fs::metadata(&cookie_db)
            .map(|meta| meta.len() > 4096)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn preferred_profile_is_claimed_when_free() {
        let dir = tempdir().unwrap();
        let registry = ProfileRegistry::new(dir.path().to_path_buf(), "google_main".into()).unwrap();
        let name = registry.allocate("session-1", Some("custom")).unwrap();
        assert_eq!(name, "custom");
    }

    #[test]
    fn concurrent_allocation_never_double_assigns() {
        let dir = tempdir().unwrap();
        let registry = ProfileRegistry::new(dir.path().to_path_buf(), "google_main".into()).unwrap();
        let a = registry.allocate("session-a", None).unwrap();
        let b = registry.allocate("session-b", None).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn release_frees_profile_for_reuse() {
        let dir = tempdir().unwrap();
        let registry = ProfileRegistry::new(dir.path().to_path_buf(), "google_main".into()).unwrap();
        let a = registry.allocate("session-a", Some("shared")).unwrap();
        registry.release("session-a");
        let b = registry.allocate("session-b", Some("shared")).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn falls_back_to_auto_incremented_name_when_all_busy() {
        let dir = tempdir().unwrap();
        let registry = ProfileRegistry::new(dir.path().to_path_buf(), "google_main".into()).unwrap();
        registry.allocate("session-a", Some("google_main")).unwrap();
        let second = registry.allocate("session-b", None).unwrap();
        assert_eq!(second, "google_1");
    }

    #[test]
    fn status_reports_unknown_profile_as_not_existing() {
        let dir = tempdir().unwrap();
        let registry = ProfileRegistry::new(dir.path().to_path_buf(), "google_main".into()).unwrap();
        let status = registry.status("nonexistent");
        assert!(!status.exists);
    }
}
