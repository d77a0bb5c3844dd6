//! crates/dose_core/src/config.rs
//!
//! Plain configuration values handed to the state machine and the credential
//! helpers at construction time. Nothing in the core reads the environment.

use chrono::Duration;

use crate::registry::SlotId;

/// Field bounds enforced when a step is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLimits {
    /// Bound for every free-text restructuring step.
    pub text_response_max: usize,
    pub situation_max: usize,
    pub emotion_max: usize,
    pub acceptance_max: usize,
    pub action_notes_max: usize,
    pub intensity_min: i32,
    pub intensity_max: i32,
    pub action_duration_min_secs: u32,
    pub action_duration_max_secs: u32,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            text_response_max: 5000,
            situation_max: 1000,
            emotion_max: 100,
            acceptance_max: 500,
            action_notes_max: 2000,
            intensity_min: 1,
            intensity_max: 10,
            action_duration_min_secs: 1,
            action_duration_max_secs: 3600,
        }
    }
}

impl SessionLimits {
    /// Length bound for a slot written from a single text value.
    pub fn text_limit(&self, slot: SlotId) -> usize {
        match slot {
            SlotId::Acceptance => self.acceptance_max,
            _ => self.text_response_max,
        }
    }
}

/// Lifetimes of one-shot credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPolicy {
    pub reset_token_ttl: Duration,
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self {
            reset_token_ttl: Duration::hours(1),
        }
    }
}
