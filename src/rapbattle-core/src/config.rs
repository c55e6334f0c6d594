//! Configuration: TOML tunables plus credentials from the environment.

use chrono::Utc;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::character::{Character, Pitch, Speed, VoiceParameters};
use crate::error::BattleError;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub voices: VoicesConfig,
    #[serde(default)]
    pub prompts: PromptsConfig,
    /// Characters used when the backend has no `characters` table.
    #[serde(default = "default_characters")]
    pub characters: Vec<Character>,
}

impl Default for Config {
    fn default() -> Self {
        default_config()
    }
}

/// Sampling parameters for the text-generation service.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub model: String,
    pub verse_temperature: f32,
    pub verse_max_tokens: u32,
    pub judge_temperature: f32,
    pub judge_max_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: "llama3-8b-8192".to_string(),
            verse_temperature: 0.9,
            verse_max_tokens: 500,
            judge_temperature: 0.3,
            judge_max_tokens: 300,
        }
    }
}

/// Voice identities for synthesis.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VoicesConfig {
    /// Voice used for characters missing from `characters`.
    pub default_voice: String,
    pub model_id: String,
    /// Character name to voice id.
    pub characters: BTreeMap<String, String>,
}

impl Default for VoicesConfig {
    fn default() -> Self {
        let characters = [
            ("Batman", "xAMrOR5PymFHdT8J95zY"),
            ("Realistic Fish Head", "DkDLZILbak4QilyAd0Xp"),
            ("Shaggy", "VR6AewLTigWG4xSOukaG"),
            ("Peter Griffin", "BYRWjbVpzKrq4SrM6fxD"),
        ]
        .into_iter()
        .map(|(name, id)| (name.to_string(), id.to_string()))
        .collect();

        Self {
            default_voice: "xAMrOR5PymFHdT8J95zY".to_string(),
            model_id: "eleven_monolingual_v1".to_string(),
            characters,
        }
    }
}

/// System prompts configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    pub verse_system: String,
    pub judge_system: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            verse_system: DEFAULT_VERSE_SYSTEM_PROMPT.to_string(),
            judge_system: DEFAULT_JUDGE_SYSTEM_PROMPT.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, BattleError> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| BattleError::ConfigError(format!("Failed to read config: {}", e)))?;

        Self::from_str(&content)
    }

    /// Load configuration from string content.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, BattleError> {
        toml::from_str(content)
            .map_err(|e| BattleError::ConfigError(format!("Failed to parse config: {}", e)))
    }
}

/// Default configuration embedded in the binary.
pub fn default_config() -> Config {
    Config {
        generation: GenerationConfig::default(),
        voices: VoicesConfig::default(),
        prompts: PromptsConfig::default(),
        characters: default_characters(),
    }
}

/// The four built-in characters.
pub fn default_characters() -> Vec<Character> {
    let now = Utc::now();
    vec![
        Character::new("batman-default", "Batman")
            .with_description("The Dark Knight of Gotham City")
            .with_traits(["dark", "brooding", "justice-focused", "strategic", "intimidating"])
            .with_phrases([
                "I am the night",
                "Justice will prevail",
                "Gotham needs me",
                "Fear the shadows",
                "Crime doesn't pay",
            ])
            .with_style("dark and menacing")
            .with_voice(VoiceParameters::new(Pitch::Low, Speed::Slow, "gravelly"))
            .as_default()
            .created_at(now),
        Character::new("fish-head-default", "Realistic Fish Head")
            .with_description("The ocean-dwelling news anchor")
            .with_traits(["professional", "oceanic", "informative", "witty", "marine-themed"])
            .with_phrases([
                "This is Realistic Fish Head",
                "And now back to the news",
                "Swimming upstream",
                "Making waves",
                "Catch of the day",
            ])
            .with_style("news anchor delivery")
            .with_voice(VoiceParameters::new(Pitch::Medium, Speed::Medium, "professional"))
            .as_default()
            .created_at(now),
        Character::new("shaggy-default", "Shaggy")
            .with_description("The laid-back mystery solver")
            .with_traits(["laid-back", "hungry", "cowardly", "loyal", "mellow"])
            .with_phrases([
                "Like, zoinks man",
                "Scooby snacks",
                "That's like, totally weird",
                "Hungry for more",
                "Mystery machine",
            ])
            .with_style("laid-back and chill")
            .with_voice(VoiceParameters::new(
                Pitch::Medium,
                Speed::Other("relaxed".to_string()),
                "california",
            ))
            .as_default()
            .created_at(now),
        Character::new("peter-griffin-default", "Peter Griffin")
            .with_description("The comedic family man")
            .with_traits(["comedic", "immature", "pop-culture-obsessed", "loud", "unpredictable"])
            .with_phrases(["Nyehehehe", "Freakin' sweet", "Road House", "Bird is the word", "Holy crap"])
            .with_style("comedic with pop culture references")
            .with_voice(VoiceParameters::new(
                Pitch::Other("medium-high".to_string()),
                Speed::Fast,
                "rhode-island",
            ))
            .as_default()
            .created_at(now),
    ]
}

const DEFAULT_VERSE_SYSTEM_PROMPT: &str = "You are a creative rap battle AI that generates authentic, character-specific rap verses. Keep responses clean but competitive.";

const DEFAULT_JUDGE_SYSTEM_PROMPT: &str =
    "You are a rap battle judge AI that provides fair, objective scoring. Always respond with valid JSON.";

pub const DEFAULT_TEXT_API_BASE: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_VOICE_API_BASE: &str = "https://api.elevenlabs.io/v1";

/// Credentials and endpoints read from the process environment.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Missing key makes every generation fall back.
    pub text_api_key: Option<String>,
    pub text_api_base: String,
    /// Missing key disables remote audio.
    pub voice_api_key: Option<String>,
    pub voice_api_base: String,
    pub backend_url: String,
    pub backend_key: String,
}

impl Settings {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self, BattleError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, BattleError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let backend_url = get("SUPABASE_URL").ok_or_else(|| {
            BattleError::ConfigError("Missing backend environment variable SUPABASE_URL".to_string())
        })?;
        let backend_key = get("SUPABASE_ANON_KEY").ok_or_else(|| {
            BattleError::ConfigError(
                "Missing backend environment variable SUPABASE_ANON_KEY".to_string(),
            )
        })?;

        Ok(Self {
            text_api_key: get("GROQ_API_KEY"),
            text_api_base: get("GROQ_API_BASE").unwrap_or_else(|| DEFAULT_TEXT_API_BASE.to_string()),
            voice_api_key: get("ELEVENLABS_API_KEY"),
            voice_api_base: get("ELEVENLABS_API_BASE")
                .unwrap_or_else(|| DEFAULT_VOICE_API_BASE.to_string()),
            backend_url: backend_url.trim_end_matches('/').to_string(),
            backend_key,
        })
    }
}
