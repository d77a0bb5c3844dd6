//! crates/dose_core/src/error.rs
//!
//! Typed failures produced by the session state machine.
//!
//! Every variant describes caller input or session state that the core refused.
//! The calling layer maps them to transport responses and never persists a
//! session that came back with one of these.

use crate::registry::{InputShape, SlotId};
use crate::session::{SessionKind, SessionStatus};

/// A refused session operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The step number does not exist for this kind of session.
    #[error("step {step} does not exist for a {kind} session")]
    InvalidStepKind { kind: SessionKind, step: u8 },

    /// A skip, a rewind, or any write against a completed session.
    #[error("step {step} cannot be written now (current step {current_step}, status {status})")]
    IllegalTransition {
        step: u8,
        current_step: u8,
        status: SessionStatus,
    },

    #[error("{field} cannot be empty")]
    EmptyResponse { field: &'static str },

    #[error("{field} is {actual} characters long, the limit is {max}")]
    ResponseTooLong {
        field: &'static str,
        max: usize,
        actual: usize,
    },

    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    /// Completion was requested while some required slots are still empty.
    #[error("session cannot be completed yet, missing: {}", join_slots(.missing))]
    IncompleteSteps { missing: Vec<SlotId> },

    #[error("no action has been chosen for this session")]
    NoActionChosen,

    #[error("unknown action type '{0}'")]
    UnknownActionType(String),

    /// The payload shape does not match what the step stores.
    #[error("step {step} expects {expected} input")]
    InputMismatch { step: u8, expected: InputShape },

    /// A stored session violates an aggregate invariant.
    #[error("stored session is inconsistent: {0}")]
    DataIntegrity(String),
}

fn join_slots(slots: &[SlotId]) -> String {
    slots
        .iter()
        .map(|slot| slot.field_name())
        .collect::<Vec<_>>()
        .join(", ")
}
