//! Character definitions.
//!
//! A character is a reusable persona that flavors generated verses and
//! selects the voice used for synthesis.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BattleError;

/// Qualitative pitch of a character's voice.
///
/// Unknown stored values are preserved in `Other` and synthesize with
/// baseline settings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Pitch {
    Low,
    #[default]
    Medium,
    High,
    Other(String),
}

impl From<String> for Pitch {
    fn from(value: String) -> Self {
        match value.as_str() {
            "low" => Pitch::Low,
            "medium" => Pitch::Medium,
            "high" => Pitch::High,
            _ => Pitch::Other(value),
        }
    }
}

impl From<Pitch> for String {
    fn from(value: Pitch) -> Self {
        match value {
            Pitch::Low => "low".to_string(),
            Pitch::Medium => "medium".to_string(),
            Pitch::High => "high".to_string(),
            Pitch::Other(s) => s,
        }
    }
}

/// Qualitative delivery speed of a character's voice.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Speed {
    Slow,
    #[default]
    Medium,
    Fast,
    Other(String),
}

impl From<String> for Speed {
    fn from(value: String) -> Self {
        match value.as_str() {
            "slow" => Speed::Slow,
            "medium" => Speed::Medium,
            "fast" => Speed::Fast,
            _ => Speed::Other(value),
        }
    }
}

impl From<Speed> for String {
    fn from(value: Speed) -> Self {
        match value {
            Speed::Slow => "slow".to_string(),
            Speed::Medium => "medium".to_string(),
            Speed::Fast => "fast".to_string(),
            Speed::Other(s) => s,
        }
    }
}

/// Voice parameters stored with a character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceParameters {
    #[serde(default)]
    pub pitch: Pitch,
    #[serde(default)]
    pub speed: Speed,
    #[serde(default = "default_accent")]
    pub accent: String,
}

fn default_accent() -> String {
    "standard".to_string()
}

impl Default for VoiceParameters {
    fn default() -> Self {
        Self {
            pitch: Pitch::Medium,
            speed: Speed::Medium,
            accent: default_accent(),
        }
    }
}

impl VoiceParameters {
    pub fn new(pitch: Pitch, speed: Speed, accent: impl Into<String>) -> Self {
        Self {
            pitch,
            speed,
            accent: accent.into(),
        }
    }
}

/// A rap battle character, as stored in the `characters` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub personality_traits: Vec<String>,
    #[serde(default)]
    pub signature_phrases: Vec<String>,
    pub rap_style: String,
    #[serde(default)]
    pub voice_parameters: VoiceParameters,
    /// Default characters cannot be deleted.
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
}

impl Character {
    /// Create a non-default character with the given id and name.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            personality_traits: Vec::new(),
            signature_phrases: Vec::new(),
            rap_style: DEFAULT_RAP_STYLE.to_string(),
            voice_parameters: VoiceParameters::default(),
            is_default: false,
            created_by: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_traits<I, S>(mut self, traits: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.personality_traits = traits.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_phrases<I, S>(mut self, phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.signature_phrases = phrases.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.rap_style = style.into();
        self
    }

    pub fn with_voice(mut self, voice: VoiceParameters) -> Self {
        self.voice_parameters = voice;
        self
    }

    /// Mark as a built-in character.
    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self
    }
}

pub const DEFAULT_RAP_STYLE: &str = "freestyle";

/// Editable fields of a character, as submitted by a create or edit form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CharacterDraft {
    pub name: String,
    pub description: String,
    pub personality_traits: Vec<String>,
    pub signature_phrases: Vec<String>,
    pub rap_style: String,
    pub voice_parameters: VoiceParameters,
    pub is_default: bool,
    pub created_by: Option<String>,
}

impl CharacterDraft {
    /// Start a draft from an existing character, for editing.
    pub fn from_character(character: &Character) -> Self {
        Self {
            name: character.name.clone(),
            description: character.description.clone(),
            personality_traits: character.personality_traits.clone(),
            signature_phrases: character.signature_phrases.clone(),
            rap_style: character.rap_style.clone(),
            voice_parameters: character.voice_parameters.clone(),
            is_default: character.is_default,
            created_by: character.created_by.clone(),
        }
    }

    /// Normalize and check the draft before it is sent to the backend.
    pub fn validate(mut self) -> Result<Self, BattleError> {
        self.name = self.name.trim().to_string();
        self.description = self.description.trim().to_string();
        self.rap_style = self.rap_style.trim().to_string();
        self.voice_parameters.accent = self.voice_parameters.accent.trim().to_string();

        if self.name.is_empty() {
            return Err(BattleError::Validation("Character name is required".to_string()));
        }
        if self.description.is_empty() {
            return Err(BattleError::Validation(
                "Character description is required".to_string(),
            ));
        }
        if self.rap_style.is_empty() {
            self.rap_style = DEFAULT_RAP_STYLE.to_string();
        }
        if self.voice_parameters.accent.is_empty() {
            self.voice_parameters.accent = default_accent();
        }

        self.personality_traits = non_blank(self.personality_traits);
        self.signature_phrases = non_blank(self.signature_phrases);
        Ok(self)
    }
}

fn non_blank(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voice_parameters_known_values() {
        let json = r#"{"pitch": "low", "speed": "fast", "accent": "gravelly"}"#;
        let params: VoiceParameters = serde_json::from_str(json).unwrap();
        assert_eq!(params.pitch, Pitch::Low);
        assert_eq!(params.speed, Speed::Fast);
        assert_eq!(params.accent, "gravelly");
    }

    #[test]
    fn test_voice_parameters_preserve_unknown_values() {
        let json = r#"{"pitch": "medium-high", "speed": "relaxed", "accent": "x"}"#;
        let params: VoiceParameters = serde_json::from_str(json).unwrap();
        assert_eq!(params.pitch, Pitch::Other("medium-high".to_string()));
        assert_eq!(params.speed, Speed::Other("relaxed".to_string()));

        let back = serde_json::to_value(&params).unwrap();
        assert_eq!(back["pitch"], "medium-high");
        assert_eq!(back["speed"], "relaxed");
    }

    #[test]
    fn test_voice_parameters_missing_fields_use_baseline() {
        let params: VoiceParameters = serde_json::from_str("{}").unwrap();
        assert_eq!(params, VoiceParameters::default());
    }

    #[test]
    fn test_character_row_deserializes() {
        let json = r#"{
            "id": "abc",
            "name": "Batman",
            "description": "The Dark Knight",
            "personality_traits": ["dark"],
            "signature_phrases": ["I am the night"],
            "rap_style": "dark and menacing",
            "voice_parameters": {"pitch": "low", "speed": "slow", "accent": "gravelly"},
            "is_default": true,
            "created_by": null,
            "created_at": "2024-05-01T12:00:00Z"
        }"#;
        let character: Character = serde_json::from_str(json).unwrap();
        assert_eq!(character.name, "Batman");
        assert!(character.is_default);
        assert_eq!(character.voice_parameters.pitch, Pitch::Low);
    }

    #[test]
    fn test_draft_validation_trims_and_filters() {
        let draft = CharacterDraft {
            name: "  MC Test ".to_string(),
            description: "A tester".to_string(),
            personality_traits: vec!["bold".to_string(), "   ".to_string(), String::new()],
            signature_phrases: vec![" Check it ".to_string()],
            rap_style: String::new(),
            ..Default::default()
        };
        let draft = draft.validate().unwrap();
        assert_eq!(draft.name, "MC Test");
        assert_eq!(draft.personality_traits, vec!["bold"]);
        assert_eq!(draft.signature_phrases, vec!["Check it"]);
        assert_eq!(draft.rap_style, DEFAULT_RAP_STYLE);
    }

    #[test]
    fn test_draft_validation_requires_name_and_description() {
        let missing_name = CharacterDraft {
            description: "x".to_string(),
            ..Default::default()
        };
        assert!(matches!(missing_name.validate(), Err(BattleError::Validation(_))));

        let missing_description = CharacterDraft {
            name: "x".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            missing_description.validate(),
            Err(BattleError::Validation(_))
        ));
    }
}
