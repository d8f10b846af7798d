//! Emotion labels and normalization of free-text classifier output.
//!
//! The classifier is asked for a single word but models often answer with a
//! phrase ("The person looks furious."). [`normalize`] maps any such answer
//! onto the closed label set by substring matching.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The closed set of emotion labels.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionLabel {
    Angry,
    Happy,
    Sad,
    Surprised,
    Fearful,
    Disgusted,
    Contempt,
    Confused,
    #[default]
    Neutral,
}

// ── Synonym table ───────────────────────────────────────────────────────

/// (label, substrings) in match priority order. First hit wins.
const SYNONYM_TABLE: &[(EmotionLabel, &[&str])] = &[
    (EmotionLabel::Angry, &["angry", "anger", "rage", "furious"]),
    (EmotionLabel::Happy, &["happy", "joy", "delight"]),
    (EmotionLabel::Sad, &["sad", "sorrow", "unhappy"]),
    (EmotionLabel::Surprised, &["surprise", "shocked"]),
    (EmotionLabel::Fearful, &["fear", "afraid", "scared"]),
    (EmotionLabel::Disgusted, &["disgust"]),
    (EmotionLabel::Contempt, &["contempt"]),
    (EmotionLabel::Confused, &["confus"]),
];

/// Map raw classifier output to a label.
///
/// Input is trimmed and lowercased first. Anything that matches no synonym
/// (including an explicit "neutral") is [`EmotionLabel::Neutral`].
pub fn normalize(raw: &str) -> EmotionLabel {
    let lower = raw.trim().to_lowercase();
    SYNONYM_TABLE
        .iter()
        .find(|(_, needles)| needles.iter().any(|n| lower.contains(n)))
        .map(|&(label, _)| label)
        .unwrap_or(EmotionLabel::Neutral)
}

impl EmotionLabel {
    /// Every label, in classifier priority order.
    pub fn all() -> &'static [EmotionLabel] {
        &[
            EmotionLabel::Angry,
            EmotionLabel::Happy,
            EmotionLabel::Sad,
            EmotionLabel::Surprised,
            EmotionLabel::Fearful,
            EmotionLabel::Disgusted,
            EmotionLabel::Contempt,
            EmotionLabel::Confused,
            EmotionLabel::Neutral,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EmotionLabel::Angry => "angry",
            EmotionLabel::Happy => "happy",
            EmotionLabel::Sad => "sad",
            EmotionLabel::Surprised => "surprised",
            EmotionLabel::Fearful => "fearful",
            EmotionLabel::Disgusted => "disgusted",
            EmotionLabel::Contempt => "contempt",
            EmotionLabel::Confused => "confused",
            EmotionLabel::Neutral => "neutral",
        }
    }

    /// How the reply should be pitched for someone showing this emotion.
    pub fn tone_guidance(self) -> &'static str {
        match self {
            EmotionLabel::Angry => {
                "Be calming, acknowledge their frustration, and offer support without being dismissive"
            }
            EmotionLabel::Sad => {
                "Be empathetic, show understanding, and offer gentle encouragement"
            }
            EmotionLabel::Happy => "Match their positive energy and reinforce their positive state",
            EmotionLabel::Surprised => {
                "Address what might be surprising them and provide clarity"
            }
            EmotionLabel::Fearful => {
                "Provide reassurance and helpful information to address concerns"
            }
            EmotionLabel::Disgusted => {
                "Acknowledge their reaction without judgment and offer perspective"
            }
            EmotionLabel::Contempt => {
                "Be respectful and try to understand their perspective without confrontation"
            }
            EmotionLabel::Confused => "Provide clear, helpful information and check understanding",
            EmotionLabel::Neutral => "Respond in a balanced, informative manner",
        }
    }
}

impl fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown label name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown emotion label: {0}")]
pub struct EmotionParseError(pub String);

impl FromStr for EmotionLabel {
    type Err = EmotionParseError;

    /// Strict parse of a label name; use [`normalize`] for model output.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        EmotionLabel::all()
            .iter()
            .copied()
            .find(|label| label.as_str() == lower)
            .ok_or_else(|| EmotionParseError(s.to_owned()))
    }
}
