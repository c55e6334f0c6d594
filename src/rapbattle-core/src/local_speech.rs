//! Local speech rendering, used only when remote synthesis is unavailable.
//!
//! A local render produces a completion signal pointing at a WAV file. It is
//! not an [`AudioClip`](crate::voice::AudioClip) and is never stored on a
//! verse.

use std::path::PathBuf;

/// Outcome of a local render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalSpeech {
    /// Speech finished rendering.
    Complete(PathBuf),
    /// Rendering failed or no local engine exists.
    Unavailable,
}

/// A local speech engine.
pub trait LocalSpeaker: Send + Sync {
    fn speak(&self, text: &str, file_stem: &str) -> LocalSpeech;
}

/// Split text into chunks that are safe for local synthesis.
pub fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current_chunk = String::new();

    // Verses are line oriented; treat line ends like sentence ends.
    for line in text.split_inclusive(&['.', '!', '?', ';', '\n'][..]) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if current_chunk.len() + line.len() > max_chars && !current_chunk.is_empty() {
            chunks.push(current_chunk.trim().to_string());
            current_chunk = String::new();
        }

        if line.len() > max_chars {
            for part in line.split_inclusive(',') {
                if current_chunk.len() + part.len() > max_chars && !current_chunk.is_empty() {
                    chunks.push(current_chunk.trim().to_string());
                    current_chunk = String::new();
                }
                current_chunk.push_str(part);
                current_chunk.push(' ');
            }
        } else {
            current_chunk.push_str(line);
            current_chunk.push(' ');
        }
    }

    if !current_chunk.trim().is_empty() {
        chunks.push(current_chunk.trim().to_string());
    }

    chunks
}

#[cfg(feature = "local-speech")]
pub use kokoro::KokoroSpeaker;

#[cfg(feature = "local-speech")]
mod kokoro {
    use kokoro_tiny::TtsEngine;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    use super::{LocalSpeaker, LocalSpeech, split_into_chunks};
    use crate::error::BattleError;

    const SAMPLE_RATE: u32 = 24_000;

    /// kokoro-tiny renderer writing WAV files into a directory.
    pub struct KokoroSpeaker {
        engine: Mutex<TtsEngine>,
        voice: String,
        output_dir: PathBuf,
    }

    impl KokoroSpeaker {
        /// Initialize the engine (downloads the model on first run).
        pub async fn new(voice: impl Into<String>, output_dir: impl Into<PathBuf>) -> Result<Self, BattleError> {
            let engine = TtsEngine::new()
                .await
                .map_err(|e| BattleError::VoiceError(format!("Failed to initialize local TTS: {}", e)))?;

            Ok(Self {
                engine: Mutex::new(engine),
                voice: voice.into(),
                output_dir: output_dir.into(),
            })
        }

        fn render(&self, text: &str) -> Result<Vec<f32>, BattleError> {
            let mut engine = self
                .engine
                .lock()
                .map_err(|_| BattleError::VoiceError("local TTS engine poisoned".to_string()))?;

            let mut samples = Vec::new();
            for chunk in split_into_chunks(text, 200) {
                let rendered = engine
                    .synthesize(&chunk, Some(&self.voice))
                    .map_err(|e| BattleError::VoiceError(format!("Synthesis failed: {}", e)))?;
                samples.extend(rendered);
                // 0.3s pause between chunks
                samples.extend(vec![0.0; 7200]);
            }
            Ok(samples)
        }

        fn write_wav(path: &Path, samples: &[f32]) -> Result<(), BattleError> {
            let spec = hound::WavSpec {
                channels: 1,
                sample_rate: SAMPLE_RATE,
                bits_per_sample: 16,
                sample_format: hound::SampleFormat::Int,
            };
            let mut writer = hound::WavWriter::create(path, spec)
                .map_err(|e| BattleError::VoiceError(format!("Failed to create WAV: {}", e)))?;
            for sample in samples {
                let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                writer
                    .write_sample(value)
                    .map_err(|e| BattleError::VoiceError(format!("Failed to write WAV: {}", e)))?;
            }
            writer
                .finalize()
                .map_err(|e| BattleError::VoiceError(format!("Failed to finish WAV: {}", e)))
        }
    }

    impl LocalSpeaker for KokoroSpeaker {
        fn speak(&self, text: &str, file_stem: &str) -> LocalSpeech {
            let path = self.output_dir.join(format!("{}.wav", file_stem));
            let result = self
                .render(text)
                .and_then(|samples| Self::write_wav(&path, &samples));

            match result {
                Ok(()) => LocalSpeech::Complete(path),
                Err(e) => {
                    tracing::warn!(error = %e, "local speech failed");
                    LocalSpeech::Unavailable
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_verse_lines() {
        let verse = "I am the night\nYou can't fight\nJustice will prevail.";
        let chunks = split_into_chunks(verse, 30);
        assert!(chunks.len() >= 2);
        for chunk in &chunks {
            assert!(chunk.len() <= 35);
        }
    }

    #[test]
    fn test_split_long_line_on_commas() {
        let line = "one two three, four five six, seven eight nine, ten eleven twelve";
        let chunks = split_into_chunks(line, 20);
        assert!(chunks.len() >= 3);
        assert_eq!(chunks.join(" ").split_whitespace().count(), 12);
    }

    #[test]
    fn test_split_empty_text() {
        assert!(split_into_chunks("  \n\n ", 200).is_empty());
    }
}
