//! crates/dose_core/src/actions.rs
//!
//! The fixed catalog of quick actions a grounding session can choose in step 3.

use std::fmt;
use std::str::FromStr;

use crate::error::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionType {
    BreathingExercise,
    FreshAir,
    DrinkWater,
    JumpingJacks,
    ListenMusic,
    TextSomeone,
    GratitudeList,
    TidySpace,
    Stretching,
    MuscleRelaxation,
    Grounding54321,
    CreativeDoodle,
    PhotoGratitude,
}

/// What the client should collect from the user once the action is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionInput {
    None,
    Text {
        prompt: &'static str,
        required: bool,
        max_length: usize,
    },
    Counter {
        prompt: &'static str,
        min: u32,
        max: u32,
        default: u32,
        unit: &'static str,
    },
    TextList {
        prompt: &'static str,
        count: usize,
        max_length: usize,
        labels: &'static [&'static str],
    },
    Checklist {
        prompt: &'static str,
        options: &'static [&'static str],
        min_selections: usize,
    },
    Grounding54321 {
        prompt: &'static str,
        senses: &'static [SensePrompt],
    },
}

/// One row of the 5-4-3-2-1 grounding prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensePrompt {
    pub sense: &'static str,
    pub count: usize,
    pub label: &'static str,
}

/// Fixed descriptive metadata for an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionMetadata {
    pub name: &'static str,
    pub icon: &'static str,
    pub description: &'static str,
    pub duration_minutes: u32,
    pub input: ActionInput,
}

const ALL_ACTIONS: [ActionType; 13] = [
    ActionType::BreathingExercise,
    ActionType::FreshAir,
    ActionType::DrinkWater,
    ActionType::JumpingJacks,
    ActionType::ListenMusic,
    ActionType::TextSomeone,
    ActionType::GratitudeList,
    ActionType::TidySpace,
    ActionType::Stretching,
    ActionType::MuscleRelaxation,
    ActionType::Grounding54321,
    ActionType::CreativeDoodle,
    ActionType::PhotoGratitude,
];

static GROUNDING_SENSES: [SensePrompt; 5] = [
    SensePrompt { sense: "see", count: 5, label: "5 things you can SEE" },
    SensePrompt { sense: "hear", count: 4, label: "4 things you can HEAR" },
    SensePrompt { sense: "touch", count: 3, label: "3 things you can TOUCH/FEEL" },
    SensePrompt { sense: "smell", count: 2, label: "2 things you can SMELL" },
    SensePrompt { sense: "taste", count: 1, label: "1 thing you can TASTE" },
];

impl ActionType {
    /// Every action in catalog order.
    pub fn all() -> &'static [ActionType] {
        &ALL_ACTIONS
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::BreathingExercise => "breathing_exercise",
            ActionType::FreshAir => "fresh_air",
            ActionType::DrinkWater => "drink_water",
            ActionType::JumpingJacks => "jumping_jacks",
            ActionType::ListenMusic => "listen_music",
            ActionType::TextSomeone => "text_someone",
            ActionType::GratitudeList => "gratitude_list",
            ActionType::TidySpace => "tidy_space",
            ActionType::Stretching => "stretching",
            ActionType::MuscleRelaxation => "muscle_relaxation",
            ActionType::Grounding54321 => "grounding_5_4_3_2_1",
            ActionType::CreativeDoodle => "creative_doodle",
            ActionType::PhotoGratitude => "photo_gratitude",
        }
    }

    pub fn metadata(&self) -> ActionMetadata {
        match self {
            ActionType::BreathingExercise => ActionMetadata {
                name: "Guided breathing exercise",
                icon: "🫁",
                description: "Box breathing: inhale 4, hold 4, exhale 4",
                duration_minutes: 1,
                input: ActionInput::None,
            },
            ActionType::FreshAir => ActionMetadata {
                name: "Step outside for fresh air",
                icon: "🌿",
                description: "Take a short walk or stand outside",
                duration_minutes: 2,
                input: ActionInput::Text {
                    prompt: "What did you notice outside? (optional)",
                    required: false,
                    max_length: 200,
                },
            },
            ActionType::DrinkWater => ActionMetadata {
                name: "Drink a glass of water",
                icon: "💧",
                description: "Hydrate mindfully",
                duration_minutes: 1,
                input: ActionInput::Counter {
                    prompt: "How many glasses did you drink?",
                    min: 1,
                    max: 5,
                    default: 1,
                    unit: "glasses",
                },
            },
            ActionType::JumpingJacks => ActionMetadata {
                name: "Do 10 jumping jacks",
                icon: "🏃",
                description: "Quick burst of movement",
                duration_minutes: 1,
                input: ActionInput::Counter {
                    prompt: "How many jumping jacks did you complete?",
                    min: 1,
                    max: 100,
                    default: 10,
                    unit: "jumping jacks",
                },
            },
            ActionType::ListenMusic => ActionMetadata {
                name: "Listen to one favorite song",
                icon: "🎵",
                description: "Put on a song that lifts your mood",
                duration_minutes: 3,
                input: ActionInput::Text {
                    prompt: "What song did you listen to? (optional)",
                    required: false,
                    max_length: 100,
                },
            },
            ActionType::TextSomeone => ActionMetadata {
                name: "Text someone you care about",
                icon: "💌",
                description: "Reach out to a friend or loved one",
                duration_minutes: 2,
                input: ActionInput::Text {
                    prompt: "Who did you reach out to? (optional)",
                    required: false,
                    max_length: 50,
                },
            },
            ActionType::GratitudeList => ActionMetadata {
                name: "Write down 3 things going well",
                icon: "📝",
                description: "Focus on positive aspects of your day",
                duration_minutes: 3,
                input: ActionInput::TextList {
                    prompt: "List 3 things you're grateful for:",
                    count: 3,
                    max_length: 150,
                    labels: &["First thing:", "Second thing:", "Third thing:"],
                },
            },
            ActionType::TidySpace => ActionMetadata {
                name: "Tidy up your immediate space",
                icon: "🧹",
                description: "Organize your desk or immediate area",
                duration_minutes: 5,
                input: ActionInput::Checklist {
                    prompt: "What did you organize?",
                    options: &[
                        "Desk surface",
                        "Papers/documents",
                        "Coffee cup/dishes",
                        "Trash/recycling",
                        "Cables/electronics",
                        "Books/supplies",
                        "Floor area",
                        "Other items",
                    ],
                    min_selections: 1,
                },
            },
            ActionType::Stretching => ActionMetadata {
                name: "Gentle stretching routine",
                icon: "🧘",
                description: "Stretch neck, shoulders, and back",
                duration_minutes: 2,
                input: ActionInput::Checklist {
                    prompt: "Which areas did you stretch?",
                    options: &[
                        "Neck",
                        "Shoulders",
                        "Upper back",
                        "Lower back",
                        "Arms",
                        "Wrists/hands",
                        "Legs",
                        "Ankles/feet",
                    ],
                    min_selections: 1,
                },
            },
            ActionType::MuscleRelaxation => ActionMetadata {
                name: "Progressive muscle relaxation",
                icon: "🌈",
                description: "Tense and release muscle groups",
                duration_minutes: 3,
                input: ActionInput::Checklist {
                    prompt: "Which muscle groups did you work with?",
                    options: &[
                        "Face (jaw, forehead)",
                        "Neck and shoulders",
                        "Arms and hands",
                        "Chest and stomach",
                        "Back",
                        "Hips and buttocks",
                        "Legs and feet",
                    ],
                    min_selections: 1,
                },
            },
            ActionType::Grounding54321 => ActionMetadata {
                name: "5-4-3-2-1 Grounding technique",
                icon: "🌟",
                description:
                    "Name 5 things you see, 4 you hear, 3 you touch, 2 you smell, 1 you taste",
                duration_minutes: 2,
                input: ActionInput::Grounding54321 {
                    prompt: "Name the things you notice:",
                    senses: &GROUNDING_SENSES,
                },
            },
            ActionType::CreativeDoodle => ActionMetadata {
                name: "Creative doodling",
                icon: "🎨",
                description: "Draw or color without judgment",
                duration_minutes: 3,
                input: ActionInput::Text {
                    prompt: "What did you draw or doodle? (optional)",
                    required: false,
                    max_length: 100,
                },
            },
            ActionType::PhotoGratitude => ActionMetadata {
                name: "Photo gratitude walk",
                icon: "📸",
                description: "Take 3 photos of things you appreciate",
                duration_minutes: 2,
                input: ActionInput::TextList {
                    prompt: "What did you photograph?",
                    count: 3,
                    max_length: 100,
                    labels: &["Photo 1:", "Photo 2:", "Photo 3:"],
                },
            },
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = SessionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        ALL_ACTIONS
            .iter()
            .copied()
            .find(|action| action.as_str() == value)
            .ok_or_else(|| SessionError::UnknownActionType(value.to_string()))
    }
}
