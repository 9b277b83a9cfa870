//! Text-to-speech synthesis.
//!
//! [`SpeechEngine`] is the seam between the HTTP layer and the model. The
//! production implementation is [`KokoroTts`], which runs the Kokoro ONNX
//! model with a phonemizer front-end and outputs 24 kHz mono audio.

pub mod kokoro;

pub use kokoro::KokoroTts;

use crate::error::Result;

/// Parameters for a single synthesis call.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisParams {
    /// Free-form input text.
    pub text: String,
    /// Voice name inside the loaded voice table.
    pub voice: String,
    /// Speech speed multiplier.
    pub speed: f32,
    /// Language tag for phonemization.
    pub lang: String,
}

/// Raw engine output.
#[derive(Debug, Clone, PartialEq)]
pub struct Synthesis {
    /// Mono f32 samples in `[-1.0, 1.0]`.
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl Synthesis {
    /// Duration of the audio in seconds.
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// A loaded, read-only synthesis engine shared across requests.
///
/// Implementations are called from blocking worker threads and must be
/// safe to share between them.
pub trait SpeechEngine: Send + Sync {
    /// Convert text to audio.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid parameters or any inference failure.
    fn synthesize(&self, params: &SynthesisParams) -> Result<Synthesis>;

    /// Native output sample rate in Hz.
    fn sample_rate(&self) -> u32;

    /// Names of the voices this engine can render, sorted.
    fn voices(&self) -> Vec<String>;
}
