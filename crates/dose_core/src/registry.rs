//! crates/dose_core/src/registry.rs
//!
//! Static step tables for each session kind.
//!
//! The state machine never hard-codes which field a step writes; it asks this
//! registry for the step's slot, the shape of input it accepts, the value
//! `current_step` moves to once the step is written, and whether writing it
//! finishes the session.

use std::fmt;

use crate::error::SessionError;
use crate::session::SessionKind;

/// The semantic field a step writes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotId {
    Situation,
    Perception,
    Affect,
    Response,
    KeyResult,
    CheckIn,
    Acceptance,
    ActionChoice,
    ActionCompletion,
}

impl SlotId {
    /// The field name used in storage and API payloads.
    pub fn field_name(&self) -> &'static str {
        match self {
            SlotId::Situation => "situation_response",
            SlotId::Perception => "perception_response",
            SlotId::Affect => "affect_response",
            SlotId::Response => "response_response",
            SlotId::KeyResult => "key_result_response",
            SlotId::CheckIn => "checkin",
            SlotId::Acceptance => "acceptance_statement",
            SlotId::ActionChoice => "action_type",
            SlotId::ActionCompletion => "action_completed",
        }
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field_name())
    }
}

/// The payload shape a step accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputShape {
    Text,
    CheckIn,
    ActionChoice,
    ActionCompletion,
}

impl fmt::Display for InputShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InputShape::Text => "text",
            InputShape::CheckIn => "check-in",
            InputShape::ActionChoice => "action choice",
            InputShape::ActionCompletion => "action completion",
        };
        f.write_str(name)
    }
}

/// One row of a step table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepDef {
    pub number: u8,
    pub slot: SlotId,
    pub shape: InputShape,
    /// Value `current_step` takes once this step has been written.
    pub advances_to: u8,
    /// Writing this step completes the session.
    pub completes_session: bool,
}

const fn text_step(number: u8, slot: SlotId) -> StepDef {
    StepDef {
        number,
        slot,
        shape: InputShape::Text,
        advances_to: number,
        completes_session: false,
    }
}

static RESTRUCTURING_STEPS: [StepDef; 5] = [
    text_step(1, SlotId::Situation),
    text_step(2, SlotId::Perception),
    text_step(3, SlotId::Affect),
    text_step(4, SlotId::Response),
    StepDef {
        number: 5,
        slot: SlotId::KeyResult,
        shape: InputShape::Text,
        advances_to: 5,
        completes_session: true,
    },
];

// Grounding numbers its pointer as "the next step awaiting input", and choosing
// an action leaves the pointer on 3 until the action has actually been done.
static GROUNDING_STEPS: [StepDef; 4] = [
    StepDef {
        number: 1,
        slot: SlotId::CheckIn,
        shape: InputShape::CheckIn,
        advances_to: 2,
        completes_session: false,
    },
    StepDef {
        number: 2,
        slot: SlotId::Acceptance,
        shape: InputShape::Text,
        advances_to: 3,
        completes_session: false,
    },
    StepDef {
        number: 3,
        slot: SlotId::ActionChoice,
        shape: InputShape::ActionChoice,
        advances_to: 3,
        completes_session: false,
    },
    StepDef {
        number: 4,
        slot: SlotId::ActionCompletion,
        shape: InputShape::ActionCompletion,
        advances_to: 4,
        completes_session: false,
    },
];

/// The full step table for a session kind, ordered by step number.
pub fn steps(kind: SessionKind) -> &'static [StepDef] {
    match kind {
        SessionKind::Restructuring => &RESTRUCTURING_STEPS,
        SessionKind::Grounding => &GROUNDING_STEPS,
    }
}

pub fn step_count(kind: SessionKind) -> u8 {
    steps(kind).len() as u8
}

/// Looks up a step, failing with `InvalidStepKind` outside `1..=step_count`.
pub fn step_def(kind: SessionKind, step: u8) -> Result<&'static StepDef, SessionError> {
    steps(kind)
        .iter()
        .find(|def| def.number == step)
        .ok_or(SessionError::InvalidStepKind { kind, step })
}

pub fn field_for_step(kind: SessionKind, step: u8) -> Result<SlotId, SessionError> {
    step_def(kind, step).map(|def| def.slot)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_counts_per_kind() {
        assert_eq!(step_count(SessionKind::Restructuring), 5);
        assert_eq!(step_count(SessionKind::Grounding), 4);
    }

    #[test]
    fn tables_are_numbered_contiguously() {
        for kind in [SessionKind::Restructuring, SessionKind::Grounding] {
            for (index, def) in steps(kind).iter().enumerate() {
                assert_eq!(def.number as usize, index + 1);
                assert!(def.advances_to >= def.number);
                assert!(def.advances_to <= step_count(kind));
            }
        }
    }

    #[test]
    fn field_lookup() {
        assert_eq!(
            field_for_step(SessionKind::Restructuring, 3),
            Ok(SlotId::Affect)
        );
        assert_eq!(
            field_for_step(SessionKind::Grounding, 2),
            Ok(SlotId::Acceptance)
        );
    }

    #[test]
    fn out_of_range_steps_are_rejected() {
        for step in [0, 6, 200] {
            assert_eq!(
                field_for_step(SessionKind::Restructuring, step),
                Err(SessionError::InvalidStepKind {
                    kind: SessionKind::Restructuring,
                    step
                })
            );
        }
        assert!(field_for_step(SessionKind::Grounding, 5).is_err());
    }

    #[test]
    fn only_the_last_restructuring_step_completes() {
        let completing: Vec<u8> = steps(SessionKind::Restructuring)
            .iter()
            .filter(|def| def.completes_session)
            .map(|def| def.number)
            .collect();
        assert_eq!(completing, vec![5]);
        assert!(steps(SessionKind::Grounding)
            .iter()
            .all(|def| !def.completes_session));
    }
}
