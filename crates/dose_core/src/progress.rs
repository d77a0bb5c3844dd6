//! crates/dose_core/src/progress.rs
//!
//! Progress and completion eligibility derived from aggregate state.

use crate::registry;
use crate::session::Session;

/// Percent complete: exactly 100.0 once completed, otherwise the share of
/// steps before `current_step`.
pub fn percentage(session: &Session) -> f64 {
    if session.is_completed() {
        return 100.0;
    }
    let count = f64::from(registry::step_count(session.kind()));
    f64::from(session.current_step().saturating_sub(1)) / count * 100.0
}

/// True when `complete_session` would succeed.
pub fn is_completion_eligible(session: &Session) -> bool {
    !session.is_completed() && session.missing_slots().is_empty()
}
