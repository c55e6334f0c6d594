//! RapBattle Core Library
//!
//! Provides character management, verse generation, scoring, voice
//! synthesis and the battle state machine.

pub mod battle;
pub mod character;
pub mod character_store;
pub mod completion;
pub mod config;
pub mod error;
pub mod local_speech;
pub mod orchestrator;
pub mod scorer;
pub mod verse;
pub mod voice;

pub use battle::{Battle, BattleConfig, BattlePhase, BattleRound, Standing, VerseResult};
pub use character::{Character, CharacterDraft, Pitch, Speed, VoiceParameters};
pub use character_store::{CharacterBackend, CharacterStore, RestBackend};
pub use completion::{ChatCompletions, CompletionRequest, CompletionService};
pub use config::{Config, Settings, default_config};
pub use error::{BackendError, BattleError};
pub use local_speech::{LocalSpeaker, LocalSpeech};
pub use orchestrator::{BattleCallback, BattleEvent, BattleOrchestrator};
pub use scorer::{RoundScore, RoundVerdict, Scorer};
pub use verse::VerseGenerator;
pub use voice::{AudioClip, ElevenLabsClient, SpeechService, VoiceCatalog, VoiceSynthesizer};

#[cfg(feature = "local-speech")]
pub use local_speech::KokoroSpeaker;
