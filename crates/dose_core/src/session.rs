//! crates/dose_core/src/session.rs
//!
//! The session aggregate: one run of a guided flow owned by a user.
//!
//! Fields are private. Reads go through accessors; writes go through the
//! crate-private mutators that `StepMachine` drives, so no caller can put a
//! session into a state the machine would not have produced.

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::actions::ActionType;
use crate::error::SessionError;
use crate::progress;
use crate::registry::{self, SlotId};

//=========================================================================================
// Kind and Status
//=========================================================================================

/// Which guided flow a session runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKind {
    /// Five-step cognitive restructuring.
    Restructuring,
    /// Four-step emotional grounding.
    Grounding,
}

impl SessionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKind::Restructuring => "restructuring",
            SessionKind::Grounding => "grounding",
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionKind {
    type Err = SessionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "restructuring" => Ok(SessionKind::Restructuring),
            "grounding" => Ok(SessionKind::Grounding),
            other => Err(SessionError::DataIntegrity(format!(
                "unknown session kind {:?}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    InProgress,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = SessionError;

    /// Only the two canonical spellings are accepted; anything else in storage
    /// is reported instead of being coerced.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "in_progress" => Ok(SessionStatus::InProgress),
            "completed" => Ok(SessionStatus::Completed),
            other => Err(SessionError::DataIntegrity(format!(
                "unknown session status {:?}",
                other
            ))),
        }
    }
}

//=========================================================================================
// Slots
//=========================================================================================

/// Grounding step 1: what is happening and how strongly it is felt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckIn {
    pub situation: String,
    pub emotion: String,
    pub intensity: u8,
}

/// Grounding steps 3 and 4: the chosen quick action and its execution record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRecord {
    pub action_type: ActionType,
    pub action_completed: bool,
    /// Seconds, set once the action is marked completed.
    pub actual_duration: Option<u32>,
    pub action_notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestructuringSlots {
    pub situation: Option<String>,
    pub perception: Option<String>,
    pub affect: Option<String>,
    pub response: Option<String>,
    pub key_result: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroundingSlots {
    pub check_in: Option<CheckIn>,
    pub acceptance: Option<String>,
    pub action: Option<ActionRecord>,
}

/// Per-kind slot layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepSlots {
    Restructuring(RestructuringSlots),
    Grounding(GroundingSlots),
}

/// The value stored for one step, as returned by `Session::get_step_response`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepValue {
    Text(String),
    CheckIn(CheckIn),
    Action(ActionRecord),
}

impl StepSlots {
    pub fn empty(kind: SessionKind) -> Self {
        match kind {
            SessionKind::Restructuring => StepSlots::Restructuring(RestructuringSlots::default()),
            SessionKind::Grounding => StepSlots::Grounding(GroundingSlots::default()),
        }
    }

    pub fn kind(&self) -> SessionKind {
        match self {
            StepSlots::Restructuring(_) => SessionKind::Restructuring,
            StepSlots::Grounding(_) => SessionKind::Grounding,
        }
    }

    fn value(&self, slot: SlotId) -> Option<StepValue> {
        match (self, slot) {
            (StepSlots::Restructuring(s), SlotId::Situation) => s.situation.clone().map(StepValue::Text),
            (StepSlots::Restructuring(s), SlotId::Perception) => s.perception.clone().map(StepValue::Text),
            (StepSlots::Restructuring(s), SlotId::Affect) => s.affect.clone().map(StepValue::Text),
            (StepSlots::Restructuring(s), SlotId::Response) => s.response.clone().map(StepValue::Text),
            (StepSlots::Restructuring(s), SlotId::KeyResult) => s.key_result.clone().map(StepValue::Text),
            (StepSlots::Grounding(s), SlotId::CheckIn) => s.check_in.clone().map(StepValue::CheckIn),
            (StepSlots::Grounding(s), SlotId::Acceptance) => s.acceptance.clone().map(StepValue::Text),
            (StepSlots::Grounding(s), SlotId::ActionChoice) => s.action.clone().map(StepValue::Action),
            (StepSlots::Grounding(s), SlotId::ActionCompletion) => s
                .action
                .clone()
                .filter(|action| action.action_completed)
                .map(StepValue::Action),
            _ => None,
        }
    }

    fn is_filled(&self, slot: SlotId) -> bool {
        match (self, slot) {
            (StepSlots::Grounding(s), SlotId::ActionCompletion) => {
                s.action.as_ref().is_some_and(|a| a.action_completed)
            }
            (StepSlots::Grounding(s), SlotId::ActionChoice) => s.action.is_some(),
            (StepSlots::Grounding(s), SlotId::CheckIn) => s.check_in.is_some(),
            (StepSlots::Grounding(s), SlotId::Acceptance) => s.acceptance.is_some(),
            (StepSlots::Restructuring(_), _) => self.value(slot).is_some(),
            _ => false,
        }
    }
}

//=========================================================================================
// The Aggregate
//=========================================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    id: Uuid,
    user_id: Uuid,
    status: SessionStatus,
    current_step: u8,
    slots: StepSlots,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    version: i64,
}

impl Session {
    /// A fresh session at step 1, in progress, with every slot empty.
    pub(crate) fn new(id: Uuid, user_id: Uuid, kind: SessionKind, now: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id,
            status: SessionStatus::InProgress,
            current_step: 1,
            slots: StepSlots::empty(kind),
            created_at: now,
            updated_at: now,
            completed_at: None,
            version: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn kind(&self) -> SessionKind {
        self.slots.kind()
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn current_step(&self) -> u8 {
        self.current_step
    }

    pub fn slots(&self) -> &StepSlots {
        &self.slots
    }

    pub fn restructuring(&self) -> Option<&RestructuringSlots> {
        match &self.slots {
            StepSlots::Restructuring(slots) => Some(slots),
            StepSlots::Grounding(_) => None,
        }
    }

    pub fn grounding(&self) -> Option<&GroundingSlots> {
        match &self.slots {
            StepSlots::Grounding(slots) => Some(slots),
            StepSlots::Restructuring(_) => None,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Incremented by every successful mutation; used for optimistic locking.
    pub fn version(&self) -> i64 {
        self.version
    }

    /// Ownership comparison for the calling layer. The state machine itself
    /// never checks it.
    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.user_id == user_id
    }

    pub fn is_completed(&self) -> bool {
        self.status == SessionStatus::Completed
    }

    pub fn progress_percentage(&self) -> f64 {
        progress::percentage(self)
    }

    pub fn get_step_response(&self, step: u8) -> Result<Option<StepValue>, SessionError> {
        let slot = registry::field_for_step(self.kind(), step)?;
        Ok(self.slots.value(slot))
    }

    pub fn is_slot_filled(&self, slot: SlotId) -> bool {
        self.slots.is_filled(slot)
    }

    /// Required slots that are still empty, in step order.
    pub fn missing_slots(&self) -> Vec<SlotId> {
        registry::steps(self.kind())
            .iter()
            .map(|def| def.slot)
            .filter(|slot| !self.slots.is_filled(*slot))
            .collect()
    }

    //-------------------------------------------------------------------------------------
    // Mutators, driven by the state machine only
    //-------------------------------------------------------------------------------------

    pub(crate) fn store_text(&mut self, slot: SlotId, value: String) {
        match (&mut self.slots, slot) {
            (StepSlots::Restructuring(s), SlotId::Situation) => s.situation = Some(value),
            (StepSlots::Restructuring(s), SlotId::Perception) => s.perception = Some(value),
            (StepSlots::Restructuring(s), SlotId::Affect) => s.affect = Some(value),
            (StepSlots::Restructuring(s), SlotId::Response) => s.response = Some(value),
            (StepSlots::Restructuring(s), SlotId::KeyResult) => s.key_result = Some(value),
            (StepSlots::Grounding(s), SlotId::Acceptance) => s.acceptance = Some(value),
            _ => {}
        }
    }

    pub(crate) fn store_check_in(&mut self, check_in: CheckIn) {
        if let StepSlots::Grounding(slots) = &mut self.slots {
            slots.check_in = Some(check_in);
        }
    }

    pub(crate) fn store_action_choice(&mut self, action_type: ActionType, notes: Option<String>) {
        if let StepSlots::Grounding(slots) = &mut self.slots {
            slots.action = Some(ActionRecord {
                action_type,
                action_completed: false,
                actual_duration: None,
                action_notes: notes,
            });
        }
    }

    pub(crate) fn store_action_completion(&mut self, duration_seconds: u32) {
        if let StepSlots::Grounding(GroundingSlots {
            action: Some(action),
            ..
        }) = &mut self.slots
        {
            action.action_completed = true;
            action.actual_duration = Some(duration_seconds);
        }
    }

    pub(crate) fn advance_to(&mut self, step: u8) {
        self.current_step = self.current_step.max(step);
    }

    /// Stamps a successful mutation. `updated_at` never moves backwards even if
    /// the clock does.
    pub(crate) fn record_mutation(&mut self, now: DateTime<Utc>) {
        self.updated_at = self.updated_at.max(now);
        self.version += 1;
    }

    pub(crate) fn mark_completed(&mut self, now: DateTime<Utc>) {
        self.status = SessionStatus::Completed;
        self.completed_at = Some(now.max(self.updated_at));
        self.updated_at = self.updated_at.max(now);
    }

    //-------------------------------------------------------------------------------------
    // Storage shape
    //-------------------------------------------------------------------------------------

    pub fn to_snapshot(&self) -> SessionSnapshot {
        let mut snapshot = SessionSnapshot {
            id: self.id,
            user_id: self.user_id,
            kind: self.kind(),
            status: self.status.as_str().to_string(),
            current_step: i32::from(self.current_step),
            version: self.version,
            situation_response: None,
            perception_response: None,
            affect_response: None,
            response_response: None,
            key_result_response: None,
            situation: None,
            emotion: None,
            intensity: None,
            acceptance_statement: None,
            action_type: None,
            action_completed: false,
            actual_duration: None,
            action_notes: None,
            created_at: self.created_at,
            updated_at: self.updated_at,
            completed_at: self.completed_at,
        };

        match &self.slots {
            StepSlots::Restructuring(s) => {
                snapshot.situation_response = s.situation.clone();
                snapshot.perception_response = s.perception.clone();
                snapshot.affect_response = s.affect.clone();
                snapshot.response_response = s.response.clone();
                snapshot.key_result_response = s.key_result.clone();
            }
            StepSlots::Grounding(s) => {
                if let Some(check_in) = &s.check_in {
                    snapshot.situation = Some(check_in.situation.clone());
                    snapshot.emotion = Some(check_in.emotion.clone());
                    snapshot.intensity = Some(i32::from(check_in.intensity));
                }
                snapshot.acceptance_statement = s.acceptance.clone();
                if let Some(action) = &s.action {
                    snapshot.action_type = Some(action.action_type.as_str().to_string());
                    snapshot.action_completed = action.action_completed;
                    snapshot.actual_duration = action.actual_duration.map(i64::from);
                    snapshot.action_notes = action.action_notes.clone();
                }
            }
        }
        snapshot
    }

    /// Rebuilds an aggregate from storage, re-checking every invariant.
    pub fn from_snapshot(snapshot: SessionSnapshot) -> Result<Self, SessionError> {
        let status: SessionStatus = snapshot.status.parse()?;
        let kind = snapshot.kind;
        let step_count = registry::step_count(kind);

        let current_step = u8::try_from(snapshot.current_step)
            .ok()
            .filter(|step| (1..=step_count).contains(step))
            .ok_or_else(|| {
                integrity(format!(
                    "current_step {} outside 1..={} for a {} session",
                    snapshot.current_step, step_count, kind
                ))
            })?;

        let slots = match kind {
            SessionKind::Restructuring => restructuring_slots(&snapshot)?,
            SessionKind::Grounding => grounding_slots(&snapshot)?,
        };

        if snapshot.updated_at < snapshot.created_at {
            return Err(integrity("updated_at precedes created_at".to_string()));
        }

        let session = Self {
            id: snapshot.id,
            user_id: snapshot.user_id,
            status,
            current_step,
            slots,
            created_at: snapshot.created_at,
            updated_at: snapshot.updated_at,
            completed_at: snapshot.completed_at,
            version: snapshot.version,
        };

        match (session.status, session.completed_at) {
            (SessionStatus::Completed, None) => {
                return Err(integrity("completed session without completed_at".to_string()))
            }
            (SessionStatus::InProgress, Some(_)) => {
                return Err(integrity("in-progress session with completed_at".to_string()))
            }
            _ => {}
        }
        if session.is_completed() && !session.missing_slots().is_empty() {
            return Err(integrity(format!(
                "completed session is missing {:?}",
                session.missing_slots()
            )));
        }
        Ok(session)
    }
}

fn integrity(message: String) -> SessionError {
    SessionError::DataIntegrity(message)
}

fn restructuring_slots(snapshot: &SessionSnapshot) -> Result<StepSlots, SessionError> {
    let has_grounding_data = snapshot.situation.is_some()
        || snapshot.emotion.is_some()
        || snapshot.intensity.is_some()
        || snapshot.acceptance_statement.is_some()
        || snapshot.action_type.is_some()
        || snapshot.action_completed;
    if has_grounding_data {
        return Err(integrity(
            "restructuring session carries grounding fields".to_string(),
        ));
    }
    Ok(StepSlots::Restructuring(RestructuringSlots {
        situation: snapshot.situation_response.clone(),
        perception: snapshot.perception_response.clone(),
        affect: snapshot.affect_response.clone(),
        response: snapshot.response_response.clone(),
        key_result: snapshot.key_result_response.clone(),
    }))
}

fn grounding_slots(snapshot: &SessionSnapshot) -> Result<StepSlots, SessionError> {
    let has_restructuring_data = snapshot.situation_response.is_some()
        || snapshot.perception_response.is_some()
        || snapshot.affect_response.is_some()
        || snapshot.response_response.is_some()
        || snapshot.key_result_response.is_some();
    if has_restructuring_data {
        return Err(integrity(
            "grounding session carries restructuring fields".to_string(),
        ));
    }

    let check_in = match (&snapshot.situation, &snapshot.emotion, snapshot.intensity) {
        (Some(situation), Some(emotion), Some(intensity)) => Some(CheckIn {
            situation: situation.clone(),
            emotion: emotion.clone(),
            intensity: u8::try_from(intensity)
                .map_err(|_| integrity(format!("intensity {} out of range", intensity)))?,
        }),
        (None, None, None) => None,
        _ => return Err(integrity("partial check-in data".to_string())),
    };

    let action = match &snapshot.action_type {
        Some(raw) => {
            let action_type: ActionType = raw
                .parse()
                .map_err(|_| integrity(format!("unknown stored action type {:?}", raw)))?;
            let actual_duration = snapshot
                .actual_duration
                .map(|d| {
                    u32::try_from(d).map_err(|_| integrity(format!("duration {} out of range", d)))
                })
                .transpose()?;
            Some(ActionRecord {
                action_type,
                action_completed: snapshot.action_completed,
                actual_duration,
                action_notes: snapshot.action_notes.clone(),
            })
        }
        None if snapshot.action_completed => {
            return Err(integrity("action completed without an action type".to_string()))
        }
        None => None,
    };

    Ok(StepSlots::Grounding(GroundingSlots {
        check_in,
        acceptance: snapshot.acceptance_statement.clone(),
        action,
    }))
}

/// Flat storage shape of a session. Status is kept as its stored string so that
/// `Session::from_snapshot` can reject anything non-canonical.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: SessionKind,
    pub status: String,
    pub current_step: i32,
    pub version: i64,
    pub situation_response: Option<String>,
    pub perception_response: Option<String>,
    pub affect_response: Option<String>,
    pub response_response: Option<String>,
    pub key_result_response: Option<String>,
    pub situation: Option<String>,
    pub emotion: Option<String>,
    pub intensity: Option<i32>,
    pub acceptance_statement: Option<String>,
    pub action_type: Option<String>,
    pub action_completed: bool,
    pub actual_duration: Option<i64>,
    pub action_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}
