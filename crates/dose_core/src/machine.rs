//! crates/dose_core/src/machine.rs
//!
//! The step-progression state machine shared by both session kinds.
//!
//! Every operation is a pure function of (session snapshot, input, clock
//! reading): it either returns a new, mutated copy of the session or a
//! `SessionError`, and never touches the input session or any storage.
//!
//! States are `IN_PROGRESS{current_step}` and the terminal `COMPLETED`.
//! Transitions only raise `current_step` or move to `COMPLETED`.

use std::sync::Arc;

use uuid::Uuid;

use crate::actions::ActionType;
use crate::clock::Clock;
use crate::config::SessionLimits;
use crate::error::SessionError;
use crate::registry::{self, InputShape, SlotId, StepDef};
use crate::session::{CheckIn, Session, SessionKind};

/// Payload for one step write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepInput {
    Text(String),
    CheckIn {
        situation: String,
        emotion: String,
        intensity: i32,
    },
    ActionChoice {
        action_type: String,
        notes: Option<String>,
    },
    ActionCompletion {
        duration_seconds: u32,
    },
}

impl From<&str> for StepInput {
    fn from(value: &str) -> Self {
        StepInput::Text(value.to_string())
    }
}

impl From<String> for StepInput {
    fn from(value: String) -> Self {
        StepInput::Text(value)
    }
}

/// Whether `session` may accept a write that moves its pointer to `step`.
///
/// Re-submitting the current step is allowed so that retries are idempotent.
pub fn can_advance_to(session: &Session, step: u8) -> bool {
    let count = registry::step_count(session.kind());
    if step < 1 || step > count {
        return false;
    }
    if session.is_completed() {
        return false;
    }
    let current = session.current_step();
    if step < current {
        return false;
    }
    if u16::from(step) > u16::from(current) + 1 {
        return false;
    }
    true
}

#[derive(Clone)]
pub struct StepMachine {
    limits: SessionLimits,
    clock: Arc<dyn Clock>,
}

impl StepMachine {
    pub fn new(limits: SessionLimits, clock: Arc<dyn Clock>) -> Self {
        Self { limits, clock }
    }

    pub fn limits(&self) -> &SessionLimits {
        &self.limits
    }

    /// Creates a new session at step 1 with every slot empty.
    pub fn start(&self, kind: SessionKind, user_id: Uuid) -> Session {
        Session::new(Uuid::new_v4(), user_id, kind, self.clock.now())
    }

    pub fn can_advance_to(&self, session: &Session, step: u8) -> bool {
        can_advance_to(session, step)
    }

    /// Writes the value for `step` and advances the pointer.
    ///
    /// Writing the last restructuring step also completes the session.
    pub fn set_step_response(
        &self,
        session: &Session,
        step: u8,
        input: impl Into<StepInput>,
    ) -> Result<Session, SessionError> {
        // Out-of-range steps, skips, rewinds and writes to a completed
        // session are all illegal transitions.
        if !can_advance_to(session, step) {
            return Err(illegal(session, step));
        }
        let def = registry::step_def(session.kind(), step)?;
        let input = input.into();

        if def.shape == InputShape::ActionCompletion {
            if let StepInput::ActionCompletion { duration_seconds } = input {
                return self.complete_action(session, duration_seconds);
            }
        }

        self.ensure_writable(session, def)?;

        let mut next = session.clone();
        match (def.shape, input) {
            (InputShape::Text, StepInput::Text(value)) => {
                let limit = self.limits.text_limit(def.slot);
                let value = validate_text(def.slot.field_name(), &value, limit)?;
                next.store_text(def.slot, value);
            }
            (
                InputShape::CheckIn,
                StepInput::CheckIn {
                    situation,
                    emotion,
                    intensity,
                },
            ) => {
                let check_in = self.validate_check_in(&situation, &emotion, intensity)?;
                next.store_check_in(check_in);
            }
            (InputShape::ActionChoice, StepInput::ActionChoice { action_type, notes }) => {
                let action_type: ActionType = action_type.trim().parse()?;
                let notes = self.validate_notes(notes.as_deref())?;
                next.store_action_choice(action_type, notes);
            }
            (expected, _) => {
                return Err(SessionError::InputMismatch { step, expected });
            }
        }

        let now = self.clock.now();
        next.advance_to(def.advances_to);
        next.record_mutation(now);

        if def.completes_session {
            let missing = next.missing_slots();
            if !missing.is_empty() {
                return Err(SessionError::IncompleteSteps { missing });
            }
            next.mark_completed(now);
        }
        Ok(next)
    }

    /// Marks the session completed once every required slot is filled.
    pub fn complete_session(&self, session: &Session) -> Result<Session, SessionError> {
        if session.is_completed() {
            return Err(illegal(session, session.current_step()));
        }
        let missing = session.missing_slots();
        if !missing.is_empty() {
            return Err(SessionError::IncompleteSteps { missing });
        }

        let now = self.clock.now();
        let mut next = session.clone();
        next.record_mutation(now);
        next.mark_completed(now);
        Ok(next)
    }

    /// Records that the chosen grounding action was carried out. This is the
    /// only transition that moves a grounding session to step 4.
    pub fn complete_action(
        &self,
        session: &Session,
        duration_seconds: u32,
    ) -> Result<Session, SessionError> {
        if session.is_completed() {
            return Err(illegal(session, session.current_step()));
        }
        let def = registry::step_def(session.kind(), 4)
            .ok()
            .filter(|def| def.shape == InputShape::ActionCompletion)
            .ok_or(SessionError::InputMismatch {
                step: 4,
                expected: InputShape::ActionCompletion,
            })?;

        if !session.is_slot_filled(SlotId::ActionChoice) {
            return Err(SessionError::NoActionChosen);
        }
        self.ensure_writable(session, def)?;

        let min = self.limits.action_duration_min_secs;
        let max = self.limits.action_duration_max_secs;
        if !(min..=max).contains(&duration_seconds) {
            return Err(SessionError::OutOfRange {
                field: "duration_seconds",
                value: i64::from(duration_seconds),
                min: i64::from(min),
                max: i64::from(max),
            });
        }

        let mut next = session.clone();
        next.store_action_completion(duration_seconds);
        next.advance_to(def.advances_to);
        next.record_mutation(self.clock.now());
        Ok(next)
    }

    //-------------------------------------------------------------------------------------
    // Grounding conveniences
    //-------------------------------------------------------------------------------------

    pub fn set_check_in(
        &self,
        session: &Session,
        situation: &str,
        emotion: &str,
        intensity: i32,
    ) -> Result<Session, SessionError> {
        self.set_step_response(
            session,
            1,
            StepInput::CheckIn {
                situation: situation.to_string(),
                emotion: emotion.to_string(),
                intensity,
            },
        )
    }

    pub fn set_acceptance(&self, session: &Session, statement: &str) -> Result<Session, SessionError> {
        self.set_step_response(session, 2, statement)
    }

    pub fn set_action(
        &self,
        session: &Session,
        action_type: &str,
        notes: Option<&str>,
    ) -> Result<Session, SessionError> {
        self.set_step_response(
            session,
            3,
            StepInput::ActionChoice {
                action_type: action_type.to_string(),
                notes: notes.map(str::to_string),
            },
        )
    }

    //-------------------------------------------------------------------------------------
    // Guards and validation
    //-------------------------------------------------------------------------------------

    /// The pointer move must be legal and every earlier step must already hold a
    /// value, so a session can never end up with a gap behind its pointer.
    fn ensure_writable(&self, session: &Session, def: &StepDef) -> Result<(), SessionError> {
        if !can_advance_to(session, def.advances_to) {
            return Err(illegal(session, def.number));
        }
        let gap = registry::steps(session.kind())
            .iter()
            .take_while(|earlier| earlier.number < def.number)
            .any(|earlier| !session.is_slot_filled(earlier.slot));
        if gap {
            return Err(illegal(session, def.number));
        }
        Ok(())
    }

    fn validate_check_in(
        &self,
        situation: &str,
        emotion: &str,
        intensity: i32,
    ) -> Result<CheckIn, SessionError> {
        let situation = validate_text("situation", situation, self.limits.situation_max)?;
        let emotion = validate_text("emotion", emotion, self.limits.emotion_max)?;

        let (min, max) = (self.limits.intensity_min, self.limits.intensity_max);
        let in_range = (min..=max).contains(&intensity);
        let intensity = u8::try_from(intensity).ok().filter(|_| in_range).ok_or(
            SessionError::OutOfRange {
                field: "intensity",
                value: i64::from(intensity),
                min: i64::from(min),
                max: i64::from(max),
            },
        )?;

        Ok(CheckIn {
            situation,
            emotion,
            intensity,
        })
    }

    fn validate_notes(&self, notes: Option<&str>) -> Result<Option<String>, SessionError> {
        let Some(notes) = notes.map(str::trim).filter(|n| !n.is_empty()) else {
            return Ok(None);
        };
        let actual = notes.chars().count();
        if actual > self.limits.action_notes_max {
            return Err(SessionError::ResponseTooLong {
                field: "action_notes",
                max: self.limits.action_notes_max,
                actual,
            });
        }
        Ok(Some(notes.to_string()))
    }
}

fn illegal(session: &Session, step: u8) -> SessionError {
    SessionError::IllegalTransition {
        step,
        current_step: session.current_step(),
        status: session.status(),
    }
}

/// Trims, then rejects empty or over-long values. Length is counted in characters.
fn validate_text(field: &'static str, raw: &str, max: usize) -> Result<String, SessionError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(SessionError::EmptyResponse { field });
    }
    let actual = trimmed.chars().count();
    if actual > max {
        return Err(SessionError::ResponseTooLong { field, max, actual });
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::session::{SessionStatus, StepValue};
    use chrono::{Duration, TimeZone, Utc};

    fn machine() -> (StepMachine, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        ));
        (StepMachine::new(SessionLimits::default(), clock.clone()), clock)
    }

    fn restructuring_through(machine: &StepMachine, last: u8) -> Session {
        let mut session = machine.start(SessionKind::Restructuring, Uuid::new_v4());
        for step in 1..=last {
            session = machine
                .set_step_response(&session, step, format!("answer {}", step))
                .unwrap();
        }
        session
    }

    #[test]
    fn new_restructuring_session_is_empty() {
        let (machine, _) = machine();
        let session = machine.start(SessionKind::Restructuring, Uuid::new_v4());
        assert_eq!(session.current_step(), 1);
        assert_eq!(session.progress_percentage(), 0.0);
        assert!(session.missing_slots().len() == 5);
    }

    #[test]
    fn can_advance_rules() {
        let (machine, _) = machine();
        let session = restructuring_through(&machine, 2);
        assert_eq!(session.current_step(), 2);
        assert!(!can_advance_to(&session, 0));
        assert!(!can_advance_to(&session, 1));
        assert!(can_advance_to(&session, 2));
        assert!(can_advance_to(&session, 3));
        assert!(!can_advance_to(&session, 4));
        assert!(!can_advance_to(&session, 6));
    }

    #[test]
    fn writes_are_trimmed() {
        let (machine, _) = machine();
        let session = machine.start(SessionKind::Restructuring, Uuid::new_v4());
        let session = machine
            .set_step_response(&session, 1, "  missed the train \n")
            .unwrap();
        assert_eq!(
            session.get_step_response(1).unwrap(),
            Some(StepValue::Text("missed the train".to_string()))
        );
    }

    #[test]
    fn whitespace_only_response_is_empty() {
        let (machine, _) = machine();
        let session = machine.start(SessionKind::Restructuring, Uuid::new_v4());
        assert_eq!(
            machine.set_step_response(&session, 1, "   "),
            Err(SessionError::EmptyResponse {
                field: "situation_response"
            })
        );
    }

    #[test]
    fn response_length_is_bounded_after_trimming() {
        let (machine, _) = machine();
        let session = machine.start(SessionKind::Restructuring, Uuid::new_v4());
        let at_limit = format!("  {}  ", "a".repeat(5000));
        assert!(machine.set_step_response(&session, 1, at_limit).is_ok());

        let over = "a".repeat(5001);
        assert_eq!(
            machine.set_step_response(&session, 1, over),
            Err(SessionError::ResponseTooLong {
                field: "situation_response",
                max: 5000,
                actual: 5001
            })
        );
    }

    #[test]
    fn skipping_is_illegal() {
        let (machine, _) = machine();
        let session = machine.start(SessionKind::Restructuring, Uuid::new_v4());
        assert!(matches!(
            machine.set_step_response(&session, 3, "too early"),
            Err(SessionError::IllegalTransition { step: 3, .. })
        ));
    }

    #[test]
    fn out_of_range_writes_are_illegal_transitions() {
        let (machine, _) = machine();
        let session = restructuring_through(&machine, 3);
        assert_eq!(session.current_step(), 4);
        assert!(matches!(
            machine.set_step_response(&session, 6, "past the end"),
            Err(SessionError::IllegalTransition { step: 6, current_step: 4, .. })
        ));
        assert!(matches!(
            machine.set_step_response(&session, 0, "before the start"),
            Err(SessionError::IllegalTransition { step: 0, .. })
        ));

        let grounding = machine.start(SessionKind::Grounding, Uuid::new_v4());
        let grounding = machine.set_check_in(&grounding, "X", "sad", 4).unwrap();
        let grounding = machine.set_acceptance(&grounding, "ok").unwrap();
        assert_eq!(grounding.current_step(), 3);
        assert!(matches!(
            machine.set_step_response(&grounding, 5, "nowhere"),
            Err(SessionError::IllegalTransition { step: 5, current_step: 3, .. })
        ));
    }

    #[test]
    fn skipping_to_action_completion_is_illegal() {
        let (machine, _) = machine();
        let session = machine.start(SessionKind::Grounding, Uuid::new_v4());
        let session = machine.set_check_in(&session, "X", "sad", 4).unwrap();
        assert!(matches!(
            machine.set_step_response(
                &session,
                4,
                StepInput::ActionCompletion { duration_seconds: 30 }
            ),
            Err(SessionError::IllegalTransition { step: 4, current_step: 2, .. })
        ));
    }

    #[test]
    fn writing_ahead_of_an_empty_step_is_illegal() {
        let (machine, _) = machine();
        let session = machine.start(SessionKind::Restructuring, Uuid::new_v4());
        // Step 2 is within one of the pointer, but step 1 has no value yet.
        assert!(can_advance_to(&session, 2));
        assert!(matches!(
            machine.set_step_response(&session, 2, "perception"),
            Err(SessionError::IllegalTransition { step: 2, .. })
        ));
    }

    #[test]
    fn rewinding_is_illegal() {
        let (machine, _) = machine();
        let session = restructuring_through(&machine, 3);
        assert!(matches!(
            machine.set_step_response(&session, 2, "rewrite"),
            Err(SessionError::IllegalTransition { step: 2, current_step: 3, .. })
        ));
    }

    #[test]
    fn resubmitting_the_current_step_is_idempotent() {
        let (machine, _) = machine();
        let session = restructuring_through(&machine, 2);
        let once = machine.set_step_response(&session, 2, "again").unwrap();
        let twice = machine.set_step_response(&once, 2, "again").unwrap();
        assert_eq!(twice.current_step(), 2);
        assert_eq!(
            twice.get_step_response(2).unwrap(),
            Some(StepValue::Text("again".to_string()))
        );
    }

    #[test]
    fn last_restructuring_step_completes_the_session() {
        let (machine, clock) = machine();
        let session = restructuring_through(&machine, 4);
        clock.advance(Duration::minutes(3));
        let done = machine.set_step_response(&session, 5, "final").unwrap();
        assert_eq!(done.status(), SessionStatus::Completed);
        assert_eq!(done.completed_at(), Some(clock.now()));
        assert_eq!(done.updated_at(), clock.now());
        assert_eq!(done.progress_percentage(), 100.0);
    }

    #[test]
    fn input_session_is_never_mutated() {
        let (machine, _) = machine();
        let session = restructuring_through(&machine, 1);
        let before = session.clone();
        let _ = machine.set_step_response(&session, 2, "next");
        let _ = machine.set_step_response(&session, 4, "skip");
        assert_eq!(session, before);
    }

    #[test]
    fn completed_session_rejects_everything() {
        let (machine, _) = machine();
        let done = restructuring_through(&machine, 5);
        assert!(done.is_completed());
        assert!(matches!(
            machine.set_step_response(&done, 5, "again"),
            Err(SessionError::IllegalTransition { .. })
        ));
        assert!(matches!(
            machine.set_step_response(&done, 0, "again"),
            Err(SessionError::IllegalTransition { step: 0, .. })
        ));
        assert!(matches!(
            machine.complete_session(&done),
            Err(SessionError::IllegalTransition { .. })
        ));
    }

    #[test]
    fn text_input_on_check_in_step_is_a_mismatch() {
        let (machine, _) = machine();
        let session = machine.start(SessionKind::Grounding, Uuid::new_v4());
        assert_eq!(
            machine.set_step_response(&session, 1, "just text"),
            Err(SessionError::InputMismatch {
                step: 1,
                expected: InputShape::CheckIn
            })
        );
    }

    #[test]
    fn check_in_advances_grounding_to_step_two() {
        let (machine, _) = machine();
        let session = machine.start(SessionKind::Grounding, Uuid::new_v4());
        let session = machine.set_check_in(&session, "X", "anxious", 7).unwrap();
        assert_eq!(session.current_step(), 2);
        assert_eq!(session.progress_percentage(), 25.0);
    }

    #[test]
    fn intensity_must_be_between_one_and_ten() {
        let (machine, _) = machine();
        let session = machine.start(SessionKind::Grounding, Uuid::new_v4());
        for intensity in [0, 11, -3, 300] {
            assert!(matches!(
                machine.set_check_in(&session, "X", "sad", intensity),
                Err(SessionError::OutOfRange { field: "intensity", .. })
            ));
        }
        assert!(machine.set_check_in(&session, "X", "sad", 1).is_ok());
        assert!(machine.set_check_in(&session, "X", "sad", 10).is_ok());
    }

    #[test]
    fn check_in_fields_have_their_own_bounds() {
        let (machine, _) = machine();
        let session = machine.start(SessionKind::Grounding, Uuid::new_v4());
        assert!(matches!(
            machine.set_check_in(&session, &"s".repeat(1001), "sad", 5),
            Err(SessionError::ResponseTooLong { field: "situation", max: 1000, .. })
        ));
        assert!(matches!(
            machine.set_check_in(&session, "fine", &"e".repeat(101), 5),
            Err(SessionError::ResponseTooLong { field: "emotion", max: 100, .. })
        ));
        assert!(matches!(
            machine.set_check_in(&session, "fine", " ", 5),
            Err(SessionError::EmptyResponse { field: "emotion" })
        ));
    }

    #[test]
    fn acceptance_requires_check_in() {
        let (machine, _) = machine();
        let session = machine.start(SessionKind::Grounding, Uuid::new_v4());
        assert!(matches!(
            machine.set_acceptance(&session, "this is ok"),
            Err(SessionError::IllegalTransition { step: 2, .. })
        ));
    }

    #[test]
    fn acceptance_is_bounded_at_five_hundred() {
        let (machine, _) = machine();
        let session = machine.start(SessionKind::Grounding, Uuid::new_v4());
        let session = machine.set_check_in(&session, "X", "sad", 4).unwrap();
        assert!(matches!(
            machine.set_acceptance(&session, &"a".repeat(501)),
            Err(SessionError::ResponseTooLong { max: 500, .. })
        ));
    }

    #[test]
    fn choosing_an_action_does_not_move_to_step_four() {
        let (machine, _) = machine();
        let session = machine.start(SessionKind::Grounding, Uuid::new_v4());
        let session = machine.set_check_in(&session, "X", "sad", 4).unwrap();
        let session = machine.set_acceptance(&session, "that's fair").unwrap();
        let session = machine
            .set_action(&session, "breathing_exercise", None)
            .unwrap();
        assert_eq!(session.current_step(), 3);
        assert_eq!(session.progress_percentage(), 50.0);

        let done = machine.complete_action(&session, 65).unwrap();
        let action = done.grounding().unwrap().action.clone().unwrap();
        assert!(action.action_completed);
        assert_eq!(action.actual_duration, Some(65));
        assert_eq!(done.current_step(), 4);
        assert_eq!(done.progress_percentage(), 75.0);
    }

    #[test]
    fn unknown_action_is_rejected() {
        let (machine, _) = machine();
        let session = machine.start(SessionKind::Grounding, Uuid::new_v4());
        let session = machine.set_check_in(&session, "X", "sad", 4).unwrap();
        let session = machine.set_acceptance(&session, "ok").unwrap();
        assert_eq!(
            machine.set_action(&session, "nap", None),
            Err(SessionError::UnknownActionType("nap".to_string()))
        );
    }

    #[test]
    fn completing_an_action_before_choosing_one_fails() {
        let (machine, _) = machine();
        let session = machine.start(SessionKind::Grounding, Uuid::new_v4());
        let session = machine.set_check_in(&session, "X", "sad", 4).unwrap();
        assert_eq!(
            machine.complete_action(&session, 30),
            Err(SessionError::NoActionChosen)
        );
    }

    #[test]
    fn action_duration_is_bounded() {
        let (machine, _) = machine();
        let session = machine.start(SessionKind::Grounding, Uuid::new_v4());
        let session = machine.set_check_in(&session, "X", "sad", 4).unwrap();
        let session = machine.set_acceptance(&session, "ok").unwrap();
        let session = machine.set_action(&session, "stretching", None).unwrap();
        assert!(matches!(
            machine.complete_action(&session, 0),
            Err(SessionError::OutOfRange { field: "duration_seconds", .. })
        ));
        assert!(matches!(
            machine.complete_action(&session, 3601),
            Err(SessionError::OutOfRange { .. })
        ));
    }

    #[test]
    fn complete_action_on_restructuring_is_a_mismatch() {
        let (machine, _) = machine();
        let session = machine.start(SessionKind::Restructuring, Uuid::new_v4());
        assert!(matches!(
            machine.complete_action(&session, 30),
            Err(SessionError::InputMismatch { .. })
        ));
    }

    #[test]
    fn grounding_needs_an_explicit_completion() {
        let (machine, _) = machine();
        let session = machine.start(SessionKind::Grounding, Uuid::new_v4());
        let session = machine.set_check_in(&session, "X", "sad", 4).unwrap();
        let session = machine.set_acceptance(&session, "ok").unwrap();
        let session = machine.set_action(&session, "fresh_air", Some("birds")).unwrap();

        assert_eq!(
            machine.complete_session(&session),
            Err(SessionError::IncompleteSteps {
                missing: vec![SlotId::ActionCompletion]
            })
        );

        let session = machine.complete_action(&session, 120).unwrap();
        assert!(!session.is_completed());
        let done = machine.complete_session(&session).unwrap();
        assert!(done.is_completed());
        assert!(done.completed_at().is_some());
        assert!(matches!(
            machine.complete_action(&done, 120),
            Err(SessionError::IllegalTransition { .. })
        ));
    }

    #[test]
    fn every_mutation_bumps_the_version() {
        let (machine, _) = machine();
        let session = machine.start(SessionKind::Restructuring, Uuid::new_v4());
        assert_eq!(session.version(), 0);
        let session = machine.set_step_response(&session, 1, "a").unwrap();
        let session = machine.set_step_response(&session, 1, "b").unwrap();
        assert_eq!(session.version(), 2);
    }
}
