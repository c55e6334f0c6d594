//! Voice synthesis for verses.
//!
//! Resolves a voice identity per character, derives synthesis settings from
//! the character's voice parameters and renders audio through a remote
//! text-to-speech service. Synthesis is best-effort: any failure yields no
//! audio rather than an error.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::character::{Pitch, Speed, VoiceParameters};
use crate::config::VoicesConfig;
use crate::error::BattleError;

/// Settings object sent with each synthesis request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoiceSettings {
    pub stability: f32,
    pub similarity_boost: f32,
    pub style: f32,
    pub use_speaker_boost: bool,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            stability: 0.5,
            similarity_boost: 0.75,
            style: 0.5,
            use_speaker_boost: true,
        }
    }
}

/// Derive synthesis settings from qualitative voice parameters.
///
/// Lower pitch means more stability; faster speech means more style.
/// Unrecognized values keep the baseline.
pub fn settings_for(params: &VoiceParameters) -> VoiceSettings {
    let mut settings = VoiceSettings::default();

    match params.pitch {
        Pitch::Low => settings.stability = 0.7,
        Pitch::High => settings.stability = 0.3,
        Pitch::Medium | Pitch::Other(_) => {}
    }

    match params.speed {
        Speed::Slow => settings.style = 0.3,
        Speed::Fast => settings.style = 0.7,
        Speed::Medium | Speed::Other(_) => {}
    }

    settings
}

/// Character name to voice identity table.
#[derive(Debug, Clone)]
pub struct VoiceCatalog {
    voices: BTreeMap<String, String>,
    default_voice: String,
    model_id: String,
}

impl VoiceCatalog {
    pub fn new(
        voices: BTreeMap<String, String>,
        default_voice: impl Into<String>,
        model_id: impl Into<String>,
    ) -> Self {
        Self {
            voices,
            default_voice: default_voice.into(),
            model_id: model_id.into(),
        }
    }

    pub fn from_config(config: &VoicesConfig) -> Self {
        Self::new(
            config.characters.clone(),
            config.default_voice.clone(),
            config.model_id.clone(),
        )
    }

    /// Voice id for a character, or the default voice for unknown names.
    pub fn voice_for(&self, character_name: &str) -> &str {
        self.voices
            .get(character_name)
            .map(String::as_str)
            .unwrap_or(&self.default_voice)
    }

    pub fn default_voice(&self) -> &str {
        &self.default_voice
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// Rendered audio for one verse.
///
/// Clones share the same bytes; the audio is released when the last handle
/// is dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    pub voice_id: String,
    bytes: Arc<[u8]>,
}

impl AudioClip {
    pub const MIME_TYPE: &'static str = "audio/mpeg";

    pub fn new(voice_id: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            voice_id: voice_id.into(),
            bytes: bytes.into(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Write the audio to an MP3 file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), BattleError> {
        std::fs::write(path.as_ref(), &self.bytes)?;
        Ok(())
    }
}

/// A remote text-to-speech service.
#[async_trait]
pub trait SpeechService: Send + Sync {
    async fn render(
        &self,
        voice_id: &str,
        model_id: &str,
        text: &str,
        settings: VoiceSettings,
    ) -> Result<Vec<u8>, BattleError>;
}

#[derive(Serialize)]
struct SynthesisBody<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

/// ElevenLabs text-to-speech over HTTP.
pub struct ElevenLabsClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
}

impl ElevenLabsClient {
    pub fn new(api_base: impl Into<String>, api_key: impl Into<String>) -> Result<Self, BattleError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| BattleError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl SpeechService for ElevenLabsClient {
    async fn render(
        &self,
        voice_id: &str,
        model_id: &str,
        text: &str,
        settings: VoiceSettings,
    ) -> Result<Vec<u8>, BattleError> {
        let url = format!("{}/text-to-speech/{}", self.api_base, voice_id);
        let body = SynthesisBody {
            text,
            model_id,
            voice_settings: settings,
        };

        let response = self
            .http
            .post(&url)
            .header("Accept", AudioClip::MIME_TYPE)
            .header("xi-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(BattleError::VoiceError(format!(
                "synthesis failed with status {}",
                status
            )));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

/// Turns verses into audio clips.
pub struct VoiceSynthesizer {
    service: Option<Arc<dyn SpeechService>>,
    catalog: VoiceCatalog,
}

impl VoiceSynthesizer {
    pub fn new(service: Option<Arc<dyn SpeechService>>, catalog: VoiceCatalog) -> Self {
        Self { service, catalog }
    }

    /// A synthesizer with no remote service; every request yields no audio.
    pub fn unavailable(catalog: VoiceCatalog) -> Self {
        Self::new(None, catalog)
    }

    pub fn is_available(&self) -> bool {
        self.service.is_some()
    }

    pub fn catalog(&self) -> &VoiceCatalog {
        &self.catalog
    }

    /// Render `text` in the character's voice. `None` means no audio is
    /// available, never a fatal condition.
    pub async fn synthesize(
        &self,
        text: &str,
        character_name: &str,
        params: &VoiceParameters,
    ) -> Option<AudioClip> {
        let Some(service) = self.service.as_ref() else {
            tracing::debug!("voice synthesis not configured");
            return None;
        };

        let voice_id = self.catalog.voice_for(character_name);
        let settings = settings_for(params);
        tracing::debug!(character = %character_name, voice = %voice_id, "synthesizing verse");

        match service
            .render(voice_id, self.catalog.model_id(), text, settings)
            .await
        {
            Ok(bytes) if !bytes.is_empty() => Some(AudioClip::new(voice_id, bytes)),
            Ok(_) => {
                tracing::warn!(character = %character_name, "synthesis returned no audio");
                None
            }
            Err(e) => {
                tracing::warn!(character = %character_name, error = %e, "voice synthesis failed");
                None
            }
        }
    }
}

/// File name for a verse's audio, e.g. `round1-Peter Griffin.mp3`.
pub fn clip_filename(round: u32, character_name: &str) -> String {
    format!("{}.mp3", clip_stem(round, character_name))
}

/// File name without extension for a verse's audio.
pub fn clip_stem(round: u32, character_name: &str) -> String {
    format!("round{}-{}", round, file_stem(character_name, 50))
}

/// Replace characters unsafe in file names and truncate.
pub(crate) fn file_stem(text: &str, max_chars: usize) -> String {
    let sanitized: String = text
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == ' ' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(max_chars)
        .collect();

    sanitized.trim().to_string()
}
