//! Battle orchestration.
//!
//! Drives a battle one round at a time: every participant gets a verse and
//! (when available) audio, strictly in participant order, then the round is
//! judged and recorded.

use std::sync::Arc;

use crate::battle::{Battle, BattleConfig, BattlePhase, BattleRound, Standing, VerseResult};
use crate::completion::CompletionService;
use crate::config::Config;
use crate::error::BattleError;
use crate::local_speech::{LocalSpeaker, LocalSpeech};
use crate::scorer::{JudgeSettings, RoundVerdict, Scorer};
use crate::verse::{VerseGenerator, VerseSettings};
use crate::voice::{VoiceSynthesizer, clip_stem};

/// Callback for battle events.
pub type BattleCallback = Box<dyn Fn(BattleEvent) + Send + Sync>;

/// Events emitted while a battle runs.
#[derive(Debug, Clone)]
pub enum BattleEvent {
    /// The battle moved to a new phase.
    Phase(BattlePhase),
    /// A round is starting.
    RoundStart { round: u32, total: u32 },
    /// A participant's verse is being generated.
    VerseStart {
        round: u32,
        index: usize,
        name: String,
    },
    /// A participant's verse is ready.
    VerseReady {
        round: u32,
        index: usize,
        verse: VerseResult,
    },
    /// Remote audio was unavailable and the verse was rendered locally.
    LocalSpeech { name: String, speech: LocalSpeech },
    /// The round has been judged.
    RoundScored { round: u32, verdict: RoundVerdict },
    /// The round failed and was not recorded.
    RoundAborted { round: u32, reason: String },
    /// All rounds are done.
    BattleComplete { standings: Vec<Standing> },
}

/// Runs battles against the verse, voice and scoring services.
pub struct BattleOrchestrator {
    verses: VerseGenerator,
    scorer: Scorer,
    voice: VoiceSynthesizer,
    local_speech: Option<Box<dyn LocalSpeaker>>,
    callback: Option<BattleCallback>,
}

impl BattleOrchestrator {
    pub fn new(verses: VerseGenerator, scorer: Scorer, voice: VoiceSynthesizer) -> Self {
        Self {
            verses,
            scorer,
            voice,
            local_speech: None,
            callback: None,
        }
    }

    /// Build the verse generator and scorer from configuration, sharing one
    /// text-generation service. `seed` makes fallback scoring reproducible.
    pub fn from_config(
        config: &Config,
        completions: Arc<dyn CompletionService>,
        voice: VoiceSynthesizer,
        seed: Option<u64>,
    ) -> Self {
        let verses = VerseGenerator::new(
            completions.clone(),
            VerseSettings::from_config(&config.generation, &config.prompts),
        );
        let scorer = Scorer::new(
            completions,
            JudgeSettings::from_config(&config.generation, &config.prompts),
            seed,
        );
        Self::new(verses, scorer, voice)
    }

    /// Set a callback for battle events.
    pub fn with_callback(mut self, callback: BattleCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Render verses locally when remote synthesis is not configured.
    pub fn with_local_speech(mut self, speaker: Box<dyn LocalSpeaker>) -> Self {
        self.local_speech = Some(speaker);
        self
    }

    /// Run a full battle. Stops at the first failed round; nothing is
    /// retried.
    pub async fn run(&self, config: BattleConfig) -> Result<Battle, BattleError> {
        let mut battle = Battle::new(config);
        self.emit_event(BattleEvent::Phase(battle.phase().clone()));

        while !battle.is_complete() {
            battle = self.advance(&battle).await?;
        }

        Ok(battle)
    }

    /// Generate, judge and record the next round.
    ///
    /// Returns the next battle state. On error the given battle is left as
    /// it was and a `RoundAborted` event is emitted.
    pub async fn advance(&self, battle: &Battle) -> Result<Battle, BattleError> {
        let round = battle.next_round_number();
        match self.generate_round(battle.clone()).await {
            Ok(next) => Ok(next),
            Err(e) => {
                tracing::error!(round, error = %e, "error generating round");
                self.emit_event(BattleEvent::RoundAborted {
                    round,
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn generate_round(&self, battle: Battle) -> Result<Battle, BattleError> {
        let battle = battle.begin_round()?;
        let round = battle.next_round_number();
        let config = battle.config().clone();
        self.emit_event(BattleEvent::Phase(battle.phase().clone()));
        self.emit_event(BattleEvent::RoundStart {
            round,
            total: config.rounds(),
        });
        tracing::info!(battle = %config.name(), round, "generating round");

        let previous_verses = battle.previous_verses();
        let mut verses = Vec::with_capacity(config.participants().len());

        for (index, character) in config.participants().iter().enumerate() {
            self.emit_event(BattleEvent::VerseStart {
                round,
                index,
                name: character.name.clone(),
            });

            let opponents = config.opponents_of(index);
            let verse = self
                .verses
                .generate(character, &opponents, config.theme(), &previous_verses)
                .await;

            let audio = self
                .voice
                .synthesize(&verse, &character.name, &character.voice_parameters)
                .await;

            if audio.is_none() && !self.voice.is_available() {
                if let Some(speaker) = &self.local_speech {
                    let speech = speaker.speak(&verse, &clip_stem(round, &character.name));
                    self.emit_event(BattleEvent::LocalSpeech {
                        name: character.name.clone(),
                        speech,
                    });
                }
            }

            let result = VerseResult::new(character, verse, audio);
            self.emit_event(BattleEvent::VerseReady {
                round,
                index,
                verse: result.clone(),
            });
            verses.push(result);
        }

        let verdict = self.scorer.score(config.participants(), &verses).await;
        self.emit_event(BattleEvent::RoundScored {
            round,
            verdict: verdict.clone(),
        });

        let battle = battle.complete_round(BattleRound::new(round, verses, verdict))?;
        self.emit_event(BattleEvent::Phase(battle.phase().clone()));

        if let Some(standings) = battle.standings() {
            if let Some(winner) = standings.first() {
                tracing::info!(winner = %winner.character_name, total = winner.total, "battle complete");
            }
            self.emit_event(BattleEvent::BattleComplete {
                standings: standings.to_vec(),
            });
        }

        Ok(battle)
    }

    /// Emit an event if a callback is registered.
    fn emit_event(&self, event: BattleEvent) {
        if let Some(ref callback) = self.callback {
            callback(event);
        }
    }
}
