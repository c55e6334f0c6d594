//! Verse generation.
//!
//! Builds a character prompt, asks the text-generation service for a verse
//! and cleans up the reply. Failures never propagate: the caller always
//! gets a verse, falling back to a stock one.

use std::sync::Arc;

use crate::character::Character;
use crate::completion::{CompletionRequest, CompletionService};
use crate::config::{GenerationConfig, PromptsConfig};

/// Sampling settings for verse generation.
#[derive(Debug, Clone)]
pub struct VerseSettings {
    pub system_prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl VerseSettings {
    pub fn from_config(generation: &GenerationConfig, prompts: &PromptsConfig) -> Self {
        Self {
            system_prompt: prompts.verse_system.clone(),
            max_tokens: generation.verse_max_tokens,
            temperature: generation.verse_temperature,
        }
    }
}

/// Generates one verse for one character.
pub struct VerseGenerator {
    service: Arc<dyn CompletionService>,
    settings: VerseSettings,
}

impl VerseGenerator {
    pub fn new(service: Arc<dyn CompletionService>, settings: VerseSettings) -> Self {
        Self { service, settings }
    }

    /// Generate a verse for `character` against `opponents`.
    ///
    /// `previous_verses` is every verse generated earlier in the battle, in
    /// generation order.
    pub async fn generate(
        &self,
        character: &Character,
        opponents: &[Character],
        theme: Option<&str>,
        previous_verses: &[String],
    ) -> String {
        let prompt = build_verse_prompt(character, opponents, theme, previous_verses);
        tracing::debug!(character = %character.name, "requesting verse");

        let request = CompletionRequest {
            system: self.settings.system_prompt.clone(),
            prompt,
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        };

        match self.service.complete(request).await {
            Ok(raw) => {
                let verse = sanitize_verse(&raw);
                if verse.is_empty() {
                    tracing::warn!(character = %character.name, "empty verse returned, using fallback");
                    fallback_verse(&character.name)
                } else {
                    verse
                }
            }
            Err(e) => {
                tracing::warn!(character = %character.name, error = %e, "verse generation failed, using fallback");
                fallback_verse(&character.name)
            }
        }
    }
}

/// Build the user prompt for a verse.
pub fn build_verse_prompt(
    character: &Character,
    opponents: &[Character],
    theme: Option<&str>,
    previous_verses: &[String],
) -> String {
    let opponent_names = opponents
        .iter()
        .map(|o| o.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    let theme_line = match theme {
        Some(theme) => format!("- Battle theme: {}\n", theme),
        None => String::new(),
    };

    let context = if previous_verses.is_empty() {
        String::new()
    } else {
        format!(
            "Previous verses in this battle:\n{}\n\n",
            previous_verses.join("\n\n")
        )
    };

    format!(
        r#"You are {name}, a rap battle character. Generate a fierce, competitive rap verse for a battle against {opponents}.

Character Details:
- Name: {name}
- Description: {description}
- Personality: {traits}
- Signature phrases: {phrases}
- Rap style: {style}
{theme_line}
{context}Instructions:
1. Stay in character as {name}
2. Create 8-12 lines of rap with proper flow and rhythm
3. Include character-specific references and personality traits
4. Use some signature phrases naturally
5. Make it competitive and engaging
6. Keep it edgy
7. Respond with ONLY the rap verse, no explanations

Generate the rap verse now:"#,
        name = character.name,
        opponents = opponent_names,
        description = character.description,
        traits = character.personality_traits.join(", "),
        phrases = character.signature_phrases.join(", "),
        style = character.rap_style,
        theme_line = theme_line,
        context = context,
    )
}

/// Stock verse used when generation fails.
///
/// The first line is the name alone, so it names the character exactly once
/// even when the name also occurs in the rest of the verse.
pub fn fallback_verse(name: &str) -> String {
    format!(
        "{}\n\
         Yo, I'm here to say,\n\
         Something went wrong, but I'll battle another day!\n\
         Technical difficulties can't stop my flow,\n\
         Give me a minute and I'll steal the show!",
        name
    )
}

/// Strip reasoning tags and markdown from a model reply, keeping line breaks.
pub fn sanitize_verse(response: &str) -> String {
    let tags_to_strip = [
        "thinking",
        "think",
        "reflection",
        "reasoning",
        "thought",
        "scratchpad",
        "analysis",
    ];

    let mut result = response.to_string();

    for tag in &tags_to_strip {
        let pattern = format!(r"(?is)<{tag}[^>]*>.*?</{tag}>", tag = tag);
        if let Ok(re) = regex::Regex::new(&pattern) {
            result = re.replace_all(&result, "").to_string();
        }
    }

    if let Ok(orphan_re) = regex::Regex::new(r"</?[\w]+[^>]*>") {
        result = orphan_re.replace_all(&result, "").to_string();
    }

    result = result.replace('*', "");

    // Collapse spaces inside each line; keep at most one blank line between stanzas.
    let mut lines: Vec<String> = Vec::new();
    for line in result.lines() {
        let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if line.is_empty() && lines.last().is_none_or(|l| l.is_empty()) {
            continue;
        }
        lines.push(line);
    }
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }

    lines.join("\n")
}
