//! RapBattle CLI - AI Rap Battle Tool
//!
//! A command-line tool for managing rap battle characters and running
//! battles between them.

use clap::{ArgAction, Args, Parser, Subcommand};
use colored::Colorize;
use rapbattle_core::battle::check_setup;
use rapbattle_core::voice::clip_filename;
use rapbattle_core::{
    Battle, BattleCallback, BattleConfig, BattleError, BattleEvent, BattleOrchestrator, ChatCompletions,
    Character, CharacterDraft, CharacterStore, Config, ElevenLabsClient, LocalSpeech, RestBackend,
    Settings, SpeechService, VoiceCatalog, VoiceSynthesizer, default_config,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(
    name = "rapbattle",
    version,
    about = "AI Rap Battle Tool - Pit characters against each other",
    long_about = "A CLI tool for running rap battles between AI characters, with generated verses, judged rounds and synthesized voices."
)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Manage characters
    #[command(subcommand)]
    Characters(CharacterCommand),

    /// Run a battle
    Battle(BattleArgs),
}

#[derive(Subcommand)]
enum CharacterCommand {
    /// List all characters
    List,

    /// Create a new character
    Add {
        #[arg(long)]
        name: String,

        #[arg(long)]
        description: String,

        #[command(flatten)]
        fields: CharacterFields,
    },

    /// Edit an existing character
    Edit {
        /// Character id
        #[arg(value_name = "ID")]
        id: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        description: Option<String>,

        #[command(flatten)]
        fields: CharacterFields,
    },

    /// Delete a character
    Delete {
        /// Character id
        #[arg(value_name = "ID")]
        id: String,
    },
}

#[derive(Args)]
struct CharacterFields {
    /// Personality trait (repeatable)
    #[arg(long = "trait", action = ArgAction::Append, value_name = "TRAIT")]
    traits: Vec<String>,

    /// Signature phrase (repeatable)
    #[arg(long = "phrase", action = ArgAction::Append, value_name = "PHRASE")]
    phrases: Vec<String>,

    /// Rap style
    #[arg(long)]
    style: Option<String>,

    /// Voice pitch: low, medium or high
    #[arg(long)]
    pitch: Option<String>,

    /// Voice speed: slow, medium or fast
    #[arg(long)]
    speed: Option<String>,

    /// Voice accent
    #[arg(long)]
    accent: Option<String>,
}

impl CharacterFields {
    /// Apply the given flags to a draft. Repeated flags replace the whole
    /// list; absent flags leave the draft unchanged.
    fn apply(self, draft: &mut CharacterDraft) {
        if !self.traits.is_empty() {
            draft.personality_traits = self.traits;
        }
        if !self.phrases.is_empty() {
            draft.signature_phrases = self.phrases;
        }
        if let Some(style) = self.style {
            draft.rap_style = style;
        }
        if let Some(pitch) = self.pitch {
            draft.voice_parameters.pitch = pitch.into();
        }
        if let Some(speed) = self.speed {
            draft.voice_parameters.speed = speed.into();
        }
        if let Some(accent) = self.accent {
            draft.voice_parameters.accent = accent;
        }
    }
}

#[derive(Args)]
struct BattleArgs {
    /// Name of the battle
    #[arg(value_name = "NAME")]
    name: String,

    /// Character ids or names (specify once per participant, 2 to 4)
    #[arg(short, long = "character", action = ArgAction::Append, value_name = "CHARACTER")]
    characters: Vec<String>,

    /// Number of rounds (1 to 3)
    #[arg(short, long, default_value = "3", value_name = "ROUNDS")]
    rounds: u32,

    /// Optional theme for the verses
    #[arg(short, long)]
    theme: Option<String>,

    /// Seed for reproducible fallback scoring
    #[arg(long, value_name = "N")]
    seed: Option<u64>,

    /// Directory for audio files and the battle transcript
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("rapbattle=info,rapbattle_core=info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => default_config(),
    };
    tracing::debug!(model = %config.generation.model, "configuration loaded");

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    };

    let backend = RestBackend::new(&settings.backend_url, &settings.backend_key)?;
    let mut store = CharacterStore::new(Box::new(backend), config.characters.clone());

    match cli.command {
        Command::Characters(command) => run_characters(&mut store, command).await,
        Command::Battle(args) => run_battle(&mut store, &config, &settings, args).await,
    }
}

async fn run_characters(
    store: &mut CharacterStore,
    command: CharacterCommand,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        CharacterCommand::List => {
            let characters = store.refresh().await;
            println!();
            println!("{}", "Characters:".bold());
            for c in characters {
                print_character(c);
            }
            println!();
        }
        CharacterCommand::Add {
            name,
            description,
            fields,
        } => {
            let mut draft = CharacterDraft {
                name,
                description,
                ..Default::default()
            };
            fields.apply(&mut draft);
            let created = store.create(draft.validate()?).await?;
            println!("{} {}", "Created:".bright_green().bold(), created.name);
            print_character(&created);
        }
        CharacterCommand::Edit {
            id,
            name,
            description,
            fields,
        } => {
            store.refresh().await;
            let existing = store
                .characters()
                .iter()
                .find(|c| c.id == id)
                .ok_or_else(|| format!("Unknown character id: '{}'", id))?;

            let mut draft = CharacterDraft::from_character(existing);
            if let Some(name) = name {
                draft.name = name;
            }
            if let Some(description) = description {
                draft.description = description;
            }
            fields.apply(&mut draft);

            let updated = store.update(&id, draft.validate()?).await?;
            println!("{} {}", "Updated:".bright_green().bold(), updated.name);
            print_character(&updated);
        }
        CharacterCommand::Delete { id } => {
            store.refresh().await;
            store.delete(&id).await?;
            println!("{} {}", "Deleted:".bright_green().bold(), id);
        }
    }

    Ok(())
}

async fn run_battle(
    store: &mut CharacterStore,
    config: &Config,
    settings: &Settings,
    args: BattleArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    // Reject a bad setup before the backend is contacted
    if let Err(e) = check_battle_args(&args) {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }

    store.refresh().await;

    let mut participants: Vec<Character> = Vec::with_capacity(args.characters.len());
    for key in &args.characters {
        let character = store
            .find(key)
            .ok_or_else(|| format!("Unknown character: '{}'", key))?;
        participants.push(character.clone());
    }

    let battle_config = match BattleConfig::new(&args.name, participants, args.rounds, args.theme) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    };

    let completions = ChatCompletions::new(
        &settings.text_api_base,
        settings.text_api_key.as_deref(),
        config.generation.model.clone(),
    )?;
    if !completions.is_configured() {
        eprintln!(
            "{}",
            "Warning: GROQ_API_KEY not set. Verses and scores will use fallbacks.".yellow()
        );
    }

    let catalog = VoiceCatalog::from_config(&config.voices);
    let voice = match &settings.voice_api_key {
        Some(key) => {
            let client: Arc<dyn SpeechService> =
                Arc::new(ElevenLabsClient::new(&settings.voice_api_base, key)?);
            VoiceSynthesizer::new(Some(client), catalog)
        }
        None => {
            eprintln!(
                "{}",
                "Warning: ELEVENLABS_API_KEY not set. Battle will run without audio.".yellow()
            );
            VoiceSynthesizer::unavailable(catalog)
        }
    };

    if let Some(dir) = &args.output {
        std::fs::create_dir_all(dir)?;
    }

    #[cfg(feature = "local-speech")]
    let local_speaker = if voice.is_available() {
        None
    } else {
        let dir = args.output.clone().unwrap_or_else(|| PathBuf::from("."));
        match rapbattle_core::KokoroSpeaker::new("bm_george", dir).await {
            Ok(speaker) => Some(speaker),
            Err(e) => {
                eprintln!("{}", format!("Warning: {}", e).yellow());
                None
            }
        }
    };

    print_header(&battle_config);

    let orchestrator =
        BattleOrchestrator::from_config(config, Arc::new(completions), voice, args.seed)
            .with_callback(create_console_callback());

    #[cfg(feature = "local-speech")]
    let orchestrator = match local_speaker {
        Some(speaker) => orchestrator.with_local_speech(Box::new(speaker)),
        None => orchestrator,
    };

    let battle = orchestrator.run(battle_config).await?;

    if let Some(dir) = &args.output {
        save_battle(&battle, dir)?;
    }

    Ok(())
}

fn check_battle_args(args: &BattleArgs) -> Result<(), BattleError> {
    check_setup(&args.name, &args.characters, args.rounds)
}

fn print_header(config: &BattleConfig) {
    println!();
    println!("{}", "═".repeat(70).bright_blue());
    println!(
        "{}",
        format!("  {} - {}", "RapBattle".bold(), config.name())
            .bright_blue()
            .bold()
    );
    println!("{}", "═".repeat(70).bright_blue());
    println!();
    if let Some(theme) = config.theme() {
        println!("{} {}", "Theme:".bold(), theme.bright_white());
    }
    println!("{} {}", "Rounds:".bold(), config.rounds());
    println!();
    println!("{}", "Participants:".bold());
    for (i, c) in config.participants().iter().enumerate() {
        println!(
            "  {}. {} ({})",
            i + 1,
            c.name.bright_cyan(),
            c.rap_style.yellow()
        );
    }
    println!();
    println!("{}", "─".repeat(70).dimmed());
}

fn print_character(c: &Character) {
    let marker = if c.is_default {
        " [default]".dimmed().to_string()
    } else {
        String::new()
    };
    println!(
        "  {} {}{} - {}",
        c.id.dimmed(),
        c.name.bright_cyan().bold(),
        marker,
        c.rap_style.yellow()
    );
    for line in textwrap(&c.description, 62).lines() {
        println!("      {}", line);
    }
    if !c.personality_traits.is_empty() {
        println!("      {} {}", "Traits:".bold(), c.personality_traits.join(", "));
    }
    if !c.signature_phrases.is_empty() {
        println!(
            "      {} {}",
            "Phrases:".bold(),
            c.signature_phrases.join(" / ")
        );
    }
}

/// Write every verse's audio and a JSON transcript into `dir`.
fn save_battle(battle: &Battle, dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let mut saved = 0;
    for round in battle.rounds() {
        for verse in &round.verses {
            if let Some(audio) = &verse.audio {
                audio.save(dir.join(clip_filename(round.number, &verse.character_name)))?;
                saved += 1;
            }
        }
    }

    let transcript = dir.join(battle.transcript_filename());
    std::fs::write(&transcript, serde_json::to_string_pretty(battle)?)?;

    println!(
        "{} {} audio file(s), transcript at {}",
        "Saved:".bright_green().bold(),
        saved,
        transcript.display()
    );
    Ok(())
}

/// Create a callback that prints battle events to the console.
fn create_console_callback() -> BattleCallback {
    Box::new(move |event| match event {
        BattleEvent::RoundStart { round, total } => {
            println!();
            println!("{}", "═".repeat(70).bright_magenta());
            println!(
                "{}",
                format!("  🎤 ROUND {} OF {}", round, total)
                    .bright_magenta()
                    .bold()
            );
            println!("{}", "═".repeat(70).bright_magenta());
            println!();
        }
        BattleEvent::VerseStart { name, .. } => {
            println!("{} {}", "▶".bright_cyan(), name.bright_cyan().bold());
        }
        BattleEvent::VerseReady { verse, .. } => {
            for line in verse.verse.lines() {
                for wrapped in textwrap(line, 66).lines() {
                    println!("  {}", wrapped);
                }
            }
            if verse.audio.is_some() {
                println!("  {}", "(audio ready)".dimmed());
            }
            println!();
        }
        BattleEvent::LocalSpeech { name, speech } => match speech {
            LocalSpeech::Complete(path) => {
                println!(
                    "  {}",
                    format!("(spoke {} locally: {})", name, path.display()).dimmed()
                );
            }
            LocalSpeech::Unavailable => {}
        },
        BattleEvent::RoundScored { verdict, .. } => {
            println!("{}", "─".repeat(70).dimmed());
            for score in &verdict.scores {
                println!("  {:<30} {}", score.character_name, score.score);
            }
            println!(
                "  {} {}",
                "Round winner:".bold(),
                verdict.winner_name.bright_yellow().bold()
            );
        }
        BattleEvent::RoundAborted { round, reason } => {
            eprintln!(
                "{} round {} failed: {}",
                "Error:".red().bold(),
                round,
                reason
            );
        }
        BattleEvent::BattleComplete { standings } => {
            println!();
            println!("{}", "═".repeat(70).bright_blue());
            println!("{}", "  Final standings".bright_green().bold());
            println!("{}", "═".repeat(70).bright_blue());
            for (i, s) in standings.iter().enumerate() {
                let line = format!("  {}. {:<30} {}", i + 1, s.character_name, s.total);
                if i == 0 {
                    println!("{}  🏆", line.bright_yellow().bold());
                } else {
                    println!("{}", line);
                }
            }
            println!();
        }
        BattleEvent::Phase(_) => {
            // Phase changes are reflected by the events above
        }
    })
}

/// Simple text wrapping function.
fn textwrap(text: &str, width: usize) -> String {
    let mut result = String::new();
    let mut current_line_len = 0;

    for word in text.split_whitespace() {
        if current_line_len + word.len() + 1 > width && current_line_len > 0 {
            result.push('\n');
            current_line_len = 0;
        }
        if current_line_len > 0 {
            result.push(' ');
            current_line_len += 1;
        }
        result.push_str(word);
        current_line_len += word.len();
    }

    result
}
