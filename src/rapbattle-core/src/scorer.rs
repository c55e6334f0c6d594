//! Round judging.
//!
//! Asks the text-generation service to score every verse of a round and
//! maps the reply back onto the participants. Scoring always completes:
//! failures resolve to a randomized verdict.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex};

use crate::battle::VerseResult;
use crate::character::Character;
use crate::completion::{CompletionRequest, CompletionService};
use crate::config::{GenerationConfig, PromptsConfig};
use crate::error::BattleError;

/// Score given to a participant the judge did not score.
pub const MISSING_SCORE: i64 = 50;

/// Inclusive range of fallback scores.
pub const FALLBACK_SCORE_RANGE: std::ops::RangeInclusive<i64> = 60..=99;

/// One participant's score for a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundScore {
    pub character_id: String,
    pub character_name: String,
    pub score: i64,
}

/// The judge's result for a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundVerdict {
    /// Advisory winner of the round.
    pub winner_id: String,
    pub winner_name: String,
    /// One entry per participant, in participant order.
    pub scores: Vec<RoundScore>,
}

/// Sampling settings for judging.
#[derive(Debug, Clone)]
pub struct JudgeSettings {
    pub system_prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl JudgeSettings {
    pub fn from_config(generation: &GenerationConfig, prompts: &PromptsConfig) -> Self {
        Self {
            system_prompt: prompts.judge_system.clone(),
            max_tokens: generation.judge_max_tokens,
            temperature: generation.judge_temperature,
        }
    }
}

pub struct Scorer {
    service: Arc<dyn CompletionService>,
    settings: JudgeSettings,
    rng: Mutex<StdRng>,
}

impl Scorer {
    /// Create a scorer. A `seed` makes the fallback verdict reproducible.
    pub fn new(
        service: Arc<dyn CompletionService>,
        settings: JudgeSettings,
        seed: Option<u64>,
    ) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            service,
            settings,
            rng: Mutex::new(rng),
        }
    }

    /// Score a round.
    pub async fn score(&self, participants: &[Character], verses: &[VerseResult]) -> RoundVerdict {
        let request = CompletionRequest {
            system: self.settings.system_prompt.clone(),
            prompt: build_judge_prompt(verses),
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        };

        let reply = match self.service.complete(request).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(error = %e, "judging request failed, using random scores");
                return self.fallback_verdict(participants);
            }
        };

        match parse_verdict(&reply, participants) {
            Ok(verdict) => verdict,
            Err(e) => {
                tracing::warn!(error = %e, "judge reply unusable, using random scores");
                self.fallback_verdict(participants)
            }
        }
    }

    /// Random winner, and a random score in [60, 99] for everyone.
    pub fn fallback_verdict(&self, participants: &[Character]) -> RoundVerdict {
        if participants.is_empty() {
            return RoundVerdict {
                winner_id: String::new(),
                winner_name: String::new(),
                scores: Vec::new(),
            };
        }

        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let winner = &participants[rng.gen_range(0..participants.len())];
        let scores = participants
            .iter()
            .map(|p| RoundScore {
                character_id: p.id.clone(),
                character_name: p.name.clone(),
                score: rng.gen_range(FALLBACK_SCORE_RANGE),
            })
            .collect();

        RoundVerdict {
            winner_id: winner.id.clone(),
            winner_name: winner.name.clone(),
            scores,
        }
    }
}

/// Build the judging prompt listing every verse of the round.
pub fn build_judge_prompt(verses: &[VerseResult]) -> String {
    let verses_text = verses
        .iter()
        .map(|v| format!("{}:\n{}", v.character_name, v.verse))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        r#"You are a rap battle judge. Analyze these rap verses and determine the winner.

Battle participants and their verses:
{verses_text}

Judging criteria:
1. Flow and rhythm (25%)
2. Wordplay and creativity (25%)
3. Character consistency (25%)
4. Overall impact (25%)

Respond with ONLY a JSON object in this format:
{{
  "winner": "Character Name",
  "scores": [
    {{"character": "Character Name", "score": 85}},
    {{"character": "Character Name", "score": 92}}
  ]
}}"#
    )
}

#[derive(Debug, Deserialize)]
struct JudgeReply {
    #[serde(default)]
    winner: Option<String>,
    #[serde(default)]
    scores: Option<Vec<JudgeScore>>,
}

#[derive(Debug, Deserialize)]
struct JudgeScore {
    #[serde(default)]
    character: Option<String>,
    #[serde(default)]
    score: Value,
}

/// Parse the judge's JSON reply into a verdict covering every participant.
pub fn parse_verdict(reply: &str, participants: &[Character]) -> Result<RoundVerdict, BattleError> {
    let first = participants
        .first()
        .ok_or_else(|| BattleError::Validation("cannot score a round without participants".to_string()))?;

    let parsed: JudgeReply = match serde_json::from_str(reply.trim()) {
        Ok(parsed) => parsed,
        Err(e) => {
            let object = extract_object(reply).ok_or_else(|| {
                BattleError::Validation(format!("judge reply is not valid JSON: {}", e))
            })?;
            serde_json::from_str(object).map_err(|e| {
                BattleError::Validation(format!("judge reply is not valid JSON: {}", e))
            })?
        }
    };

    let winner = parsed
        .winner
        .as_deref()
        .and_then(|name| participants.iter().find(|p| p.name == name))
        .unwrap_or(first);

    let entries = parsed.scores.unwrap_or_default();
    let mut assigned: Vec<Option<i64>> = vec![None; participants.len()];
    let mut unmatched: Option<i64> = None;

    for entry in &entries {
        let score = score_value(&entry.score);
        let index = entry
            .character
            .as_deref()
            .and_then(|name| participants.iter().position(|p| p.name == name));
        match index {
            Some(i) => {
                if assigned[i].is_none() {
                    assigned[i] = Some(score);
                }
            }
            None => {
                if unmatched.is_none() {
                    unmatched = Some(score);
                }
            }
        }
    }

    // Unmatched names are credited to the first participant.
    if assigned[0].is_none() {
        assigned[0] = unmatched;
    }

    let scores = participants
        .iter()
        .zip(assigned)
        .map(|(p, score)| RoundScore {
            character_id: p.id.clone(),
            character_name: p.name.clone(),
            score: score.unwrap_or(MISSING_SCORE),
        })
        .collect();

    Ok(RoundVerdict {
        winner_id: winner.id.clone(),
        winner_name: winner.name.clone(),
        scores,
    })
}

/// The span from the first `{` to the last `}`, for replies wrapped in prose
/// or code fences.
fn extract_object(reply: &str) -> Option<&str> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    (start < end).then(|| &reply[start..=end])
}

/// Numeric score from a judge entry. Anything non-numeric or outside the
/// `i32` range counts as missing.
fn score_value(value: &Value) -> i64 {
    let score = match value.as_i64() {
        Some(n) => n,
        None => match value.as_f64() {
            Some(f) if f.is_finite() && f.abs() <= i32::MAX as f64 => f.round() as i64,
            _ => return MISSING_SCORE,
        },
    };
    if i32::try_from(score).is_ok() {
        score
    } else {
        MISSING_SCORE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Judge(Result<String, ()>);

    #[async_trait]
    impl CompletionService for Judge {
        async fn complete(&self, _request: CompletionRequest) -> Result<String, BattleError> {
            self.0
                .clone()
                .map_err(|_| BattleError::ConfigError("offline".to_string()))
        }
    }

    fn participants() -> Vec<Character> {
        vec![
            Character::new("a", "Batman"),
            Character::new("b", "Shaggy"),
            Character::new("c", "Peter Griffin"),
        ]
    }

    fn verses() -> Vec<VerseResult> {
        participants()
            .iter()
            .map(|c| VerseResult::new(c, format!("{} spits bars", c.name), None))
            .collect()
    }

    fn scorer(reply: Result<&str, ()>, seed: u64) -> Scorer {
        let settings = JudgeSettings::from_config(&GenerationConfig::default(), &PromptsConfig::default());
        Scorer::new(Arc::new(Judge(reply.map(str::to_string))), settings, Some(seed))
    }

    fn assert_fallback(verdict: &RoundVerdict, participants: &[Character]) {
        assert_eq!(verdict.scores.len(), participants.len());
        for (score, p) in verdict.scores.iter().zip(participants) {
            assert_eq!(score.character_id, p.id);
            assert!(FALLBACK_SCORE_RANGE.contains(&score.score));
        }
        assert!(participants.iter().any(|p| p.id == verdict.winner_id));
    }

    #[test]
    fn test_judge_prompt_lists_verses() {
        let prompt = build_judge_prompt(&verses());
        assert!(prompt.contains("Batman:\nBatman spits bars\n\nShaggy:\nShaggy spits bars"));
        assert!(prompt.contains("Flow and rhythm (25%)"));
        assert!(prompt.contains(r#"{"character": "Character Name", "score": 85}"#));
    }

    #[test]
    fn test_parse_well_formed_reply() {
        let reply = r#"{"winner": "Shaggy", "scores": [
            {"character": "Batman", "score": 80},
            {"character": "Shaggy", "score": 91},
            {"character": "Peter Griffin", "score": 77}
        ]}"#;
        let verdict = parse_verdict(reply, &participants()).unwrap();
        assert_eq!(verdict.winner_name, "Shaggy");
        let scores: Vec<i64> = verdict.scores.iter().map(|s| s.score).collect();
        assert_eq!(scores, vec![80, 91, 77]);
    }

    #[test]
    fn test_parse_reorders_to_participant_order() {
        let reply = r#"{"winner": "Batman", "scores": [
            {"character": "Peter Griffin", "score": 70},
            {"character": "Batman", "score": 88}
        ]}"#;
        let verdict = parse_verdict(reply, &participants()).unwrap();
        let names: Vec<&str> = verdict.scores.iter().map(|s| s.character_name.as_str()).collect();
        assert_eq!(names, vec!["Batman", "Shaggy", "Peter Griffin"]);
        let scores: Vec<i64> = verdict.scores.iter().map(|s| s.score).collect();
        assert_eq!(scores, vec![88, MISSING_SCORE, 70]);
    }

    #[test]
    fn test_parse_unknown_names_default_to_first_participant() {
        let reply = r#"{"winner": "Robin", "scores": [
            {"character": "Robin", "score": 66},
            {"character": "Shaggy", "score": 90}
        ]}"#;
        let verdict = parse_verdict(reply, &participants()).unwrap();
        assert_eq!(verdict.winner_id, "a");
        assert_eq!(verdict.scores[0].score, 66);
        assert_eq!(verdict.scores[1].score, 90);
        assert_eq!(verdict.scores[2].score, MISSING_SCORE);
    }

    #[test]
    fn test_parse_missing_or_odd_scores() {
        let reply = r#"{"winner": "Batman", "scores": [
            {"character": "Batman"},
            {"character": "Shaggy", "score": 84.6},
            {"character": "Peter Griffin", "score": "ninety"}
        ]}"#;
        let verdict = parse_verdict(reply, &participants()).unwrap();
        let scores: Vec<i64> = verdict.scores.iter().map(|s| s.score).collect();
        assert_eq!(scores, vec![MISSING_SCORE, 85, MISSING_SCORE]);
    }

    #[test]
    fn test_parse_without_scores_gives_everyone_default() {
        let verdict = parse_verdict(r#"{"winner": "Shaggy"}"#, &participants()).unwrap();
        assert!(verdict.scores.iter().all(|s| s.score == MISSING_SCORE));
        assert_eq!(verdict.scores.len(), 3);
    }

    #[test]
    fn test_parse_reply_wrapped_in_prose() {
        let reply = "Here is my verdict:\n```json\n{\"winner\": \"Batman\", \"scores\": []}\n```";
        let verdict = parse_verdict(reply, &participants()).unwrap();
        assert_eq!(verdict.winner_name, "Batman");
    }

    #[test]
    fn test_parse_out_of_range_scores_count_as_missing() {
        let reply = r#"{"winner": "Batman", "scores": [
            {"character": "Batman", "score": 1e300},
            {"character": "Shaggy", "score": 9999999999},
            {"character": "Peter Griffin", "score": 88.6}
        ]}"#;
        let verdict = parse_verdict(reply, &participants()).unwrap();
        let scores: Vec<i64> = verdict.scores.iter().map(|s| s.score).collect();
        assert_eq!(scores, vec![MISSING_SCORE, MISSING_SCORE, 89]);
    }

    #[test]
    fn test_parse_garbage_is_error() {
        assert!(parse_verdict("Batman wins!", &participants()).is_err());
        assert!(parse_verdict("{not json}", &participants()).is_err());
    }

    #[tokio::test]
    async fn test_score_uses_judge_reply() {
        let reply = r#"{"winner": "Peter Griffin", "scores": [
            {"character": "Batman", "score": 70},
            {"character": "Shaggy", "score": 71},
            {"character": "Peter Griffin", "score": 95}
        ]}"#;
        let verdict = scorer(Ok(reply), 1).score(&participants(), &verses()).await;
        assert_eq!(verdict.winner_id, "c");
        assert_eq!(verdict.scores[2].score, 95);
    }

    #[tokio::test]
    async fn test_score_falls_back_on_service_failure() {
        let participants = participants();
        let verdict = scorer(Err(()), 7).score(&participants, &verses()).await;
        assert_fallback(&verdict, &participants);
    }

    #[tokio::test]
    async fn test_score_falls_back_on_unparsable_reply() {
        let participants = participants();
        let verdict = scorer(Ok("I refuse to judge"), 7).score(&participants, &verses()).await;
        assert_fallback(&verdict, &participants);
    }

    #[test]
    fn test_fallback_is_reproducible_with_seed() {
        let participants = participants();
        let first = scorer(Err(()), 42).fallback_verdict(&participants);
        let second = scorer(Err(()), 42).fallback_verdict(&participants);
        assert_eq!(first, second);
    }
}
