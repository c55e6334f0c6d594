//! Battle configuration, rounds and the battle state machine.
//!
//! A [`Battle`] is an owned value. Each transition consumes the current
//! state and returns the next one, so the round flow can be driven and
//! tested without any services attached.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::character::Character;
use crate::error::BattleError;
use crate::scorer::{RoundScore, RoundVerdict};
use crate::voice::{AudioClip, file_stem};

pub const MIN_PARTICIPANTS: usize = 2;
pub const MAX_PARTICIPANTS: usize = 4;
pub const MIN_ROUNDS: u32 = 1;
pub const MAX_ROUNDS: u32 = 3;

/// Check a battle setup by participant keys alone, so callers can reject a
/// bad setup before resolving characters.
pub fn check_setup<S: AsRef<str>>(name: &str, keys: &[S], rounds: u32) -> Result<(), BattleError> {
    if name.trim().is_empty() {
        return Err(BattleError::Validation("Battle name is required".to_string()));
    }

    let count = keys.len();
    if !(MIN_PARTICIPANTS..=MAX_PARTICIPANTS).contains(&count) {
        return Err(BattleError::InvalidParticipantCount {
            min: MIN_PARTICIPANTS,
            max: MAX_PARTICIPANTS,
            actual: count,
        });
    }

    let mut seen = HashSet::new();
    for key in keys {
        if !seen.insert(key.as_ref()) {
            return Err(BattleError::Validation(format!(
                "{} was selected more than once",
                key.as_ref()
            )));
        }
    }

    if !(MIN_ROUNDS..=MAX_ROUNDS).contains(&rounds) {
        return Err(BattleError::InvalidRoundCount {
            min: MIN_ROUNDS,
            max: MAX_ROUNDS,
            actual: rounds,
        });
    }

    Ok(())
}

/// A validated battle setup. Immutable once the battle starts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BattleConfig {
    name: String,
    participants: Vec<Character>,
    rounds: u32,
    theme: Option<String>,
}

impl BattleConfig {
    /// Validate a battle setup.
    ///
    /// The name must be non-blank, there must be 2-4 distinct participants
    /// and 1-3 rounds. A blank theme counts as no theme.
    pub fn new(
        name: impl Into<String>,
        participants: Vec<Character>,
        rounds: u32,
        theme: Option<String>,
    ) -> Result<Self, BattleError> {
        let name = name.into().trim().to_string();
        let ids: Vec<&str> = participants.iter().map(|p| p.id.as_str()).collect();
        check_setup(&name, &ids, rounds)?;

        let theme = theme
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        Ok(Self {
            name,
            participants,
            rounds,
            theme,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn participants(&self) -> &[Character] {
        &self.participants
    }

    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    pub fn theme(&self) -> Option<&str> {
        self.theme.as_deref()
    }

    /// Everyone except the participant at `index`.
    pub fn opponents_of(&self, index: usize) -> Vec<Character> {
        self.participants
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .map(|(_, c)| c.clone())
            .collect()
    }
}

/// One character's verse in a round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerseResult {
    pub character_id: String,
    pub character_name: String,
    pub verse: String,
    #[serde(skip)]
    pub audio: Option<AudioClip>,
}

impl VerseResult {
    pub fn new(character: &Character, verse: impl Into<String>, audio: Option<AudioClip>) -> Self {
        Self {
            character_id: character.id.clone(),
            character_name: character.name.clone(),
            verse: verse.into(),
            audio,
        }
    }
}

/// A completed round: every participant's verse plus the judge's scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleRound {
    pub number: u32,
    pub verses: Vec<VerseResult>,
    pub scores: Option<Vec<RoundScore>>,
    /// The judge's advisory winner for this round.
    pub winner_name: Option<String>,
}

impl BattleRound {
    pub fn new(number: u32, verses: Vec<VerseResult>, verdict: RoundVerdict) -> Self {
        Self {
            number,
            verses,
            scores: Some(verdict.scores),
            winner_name: Some(verdict.winner_name),
        }
    }

    pub fn score_for(&self, character_id: &str) -> Option<i64> {
        self.scores
            .as_ref()?
            .iter()
            .find(|s| s.character_id == character_id)
            .map(|s| s.score)
    }
}

/// A participant's summed score across all rounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Standing {
    pub character_id: String,
    pub character_name: String,
    pub total: i64,
}

/// Sum each participant's round scores and rank them, highest first.
///
/// Ties keep participant order, so the first participant reaching the
/// maximum wins.
pub fn final_standings(participants: &[Character], rounds: &[BattleRound]) -> Vec<Standing> {
    let mut standings: Vec<Standing> = participants
        .iter()
        .map(|p| Standing {
            character_id: p.id.clone(),
            character_name: p.name.clone(),
            total: rounds
                .iter()
                .filter_map(|r| r.score_for(&p.id))
                .fold(0i64, |acc, score| acc.saturating_add(score)),
        })
        .collect();

    // sort_by is stable
    standings.sort_by(|a, b| b.total.cmp(&a.total));
    standings
}

/// Where a battle is in its round flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BattlePhase {
    Idle,
    GeneratingRound { round: u32 },
    RoundComplete { round: u32 },
    BattleComplete { standings: Vec<Standing> },
}

/// One run of a battle: its configuration, completed rounds and phase.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Battle {
    config: BattleConfig,
    rounds: Vec<BattleRound>,
    phase: BattlePhase,
}

impl Battle {
    pub fn new(config: BattleConfig) -> Self {
        Self {
            config,
            rounds: Vec::new(),
            phase: BattlePhase::Idle,
        }
    }

    pub fn config(&self) -> &BattleConfig {
        &self.config
    }

    pub fn rounds(&self) -> &[BattleRound] {
        &self.rounds
    }

    pub fn phase(&self) -> &BattlePhase {
        &self.phase
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.phase, BattlePhase::BattleComplete { .. })
    }

    /// Number of the round that would be generated next.
    pub fn next_round_number(&self) -> u32 {
        self.rounds.len() as u32 + 1
    }

    /// Final standings, once the battle is complete.
    pub fn standings(&self) -> Option<&[Standing]> {
        match &self.phase {
            BattlePhase::BattleComplete { standings } => Some(standings),
            _ => None,
        }
    }

    pub fn winner(&self) -> Option<&Standing> {
        self.standings()?.first()
    }

    /// Every verse generated so far, in generation order.
    pub fn previous_verses(&self) -> Vec<String> {
        self.rounds
            .iter()
            .flat_map(|r| r.verses.iter().map(|v| v.verse.clone()))
            .collect()
    }

    /// Enter `GeneratingRound` for the next round.
    pub fn begin_round(self) -> Result<Self, BattleError> {
        match self.phase {
            BattlePhase::Idle | BattlePhase::RoundComplete { .. } => {}
            BattlePhase::GeneratingRound { round } => {
                return Err(BattleError::InvalidTransition(format!(
                    "round {} is already being generated",
                    round
                )));
            }
            BattlePhase::BattleComplete { .. } => {
                return Err(BattleError::InvalidTransition(
                    "battle is already complete".to_string(),
                ));
            }
        }

        let round = self.next_round_number();
        if round > self.config.rounds {
            return Err(BattleError::InvalidTransition(format!(
                "battle is configured for {} rounds",
                self.config.rounds
            )));
        }

        Ok(Self {
            phase: BattlePhase::GeneratingRound { round },
            ..self
        })
    }

    /// Record the finished round and move to `RoundComplete` or, after the
    /// last round, `BattleComplete`.
    pub fn complete_round(mut self, round: BattleRound) -> Result<Self, BattleError> {
        let expected = match self.phase {
            BattlePhase::GeneratingRound { round } => round,
            _ => {
                return Err(BattleError::InvalidTransition(
                    "no round is being generated".to_string(),
                ));
            }
        };

        if round.number != expected {
            return Err(BattleError::InvalidTransition(format!(
                "expected round {}, got round {}",
                expected, round.number
            )));
        }
        self.check_round(&round)?;

        self.rounds.push(round);
        self.phase = if expected == self.config.rounds {
            BattlePhase::BattleComplete {
                standings: final_standings(&self.config.participants, &self.rounds),
            }
        } else {
            BattlePhase::RoundComplete { round: expected }
        };
        Ok(self)
    }

    /// Verses follow participant order; scores, when present, cover each
    /// participant exactly once.
    fn check_round(&self, round: &BattleRound) -> Result<(), BattleError> {
        let participants = &self.config.participants;

        let verse_ids = round.verses.iter().map(|v| v.character_id.as_str());
        if !verse_ids.eq(participants.iter().map(|p| p.id.as_str())) {
            return Err(BattleError::InvalidTransition(format!(
                "round {} verses do not match participant order",
                round.number
            )));
        }

        if let Some(scores) = &round.scores {
            let score_ids = scores.iter().map(|s| s.character_id.as_str());
            if !score_ids.eq(participants.iter().map(|p| p.id.as_str())) {
                return Err(BattleError::InvalidTransition(format!(
                    "round {} needs exactly one score per participant",
                    round.number
                )));
            }
        }

        Ok(())
    }

    /// Suggested file name for this battle's JSON transcript.
    pub fn transcript_filename(&self) -> String {
        format!("RapBattle - {}.json", file_stem(&self.config.name, 50))
    }
}
