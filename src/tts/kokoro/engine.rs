//! Kokoro ONNX inference engine.
//!
//! phonemize → tokenize → batch → ONNX inference → 24 kHz audio.

use super::phonemize::Phonemizer;
use super::vocab::{self, PAD_ID};
use super::voices::{STYLE_DIM, VoiceStyle, VoiceTable};
use crate::config::{ExecutionBackend, TtsConfig};
use crate::error::{Result, SpeakError};
use crate::tts::{SpeechEngine, Synthesis, SynthesisParams};
use ort::ep;
use ort::ep::ExecutionProvider as _;
use ort::session::Session;
use ort::value::Tensor;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use tracing::{info, warn};

/// Output sample rate in Hz.
pub const SAMPLE_RATE: u32 = 24_000;

/// Maximum content tokens per inference call (512 context minus two pads).
pub const MAX_PHONEME_TOKENS: usize = 510;

/// Accepted speed multiplier range.
pub const MIN_SPEED: f32 = 0.5;
/// Accepted speed multiplier range.
pub const MAX_SPEED: f32 = 2.0;

/// Kokoro TTS engine.
///
/// Owns the ONNX session, the phonemizer, and every voice in the voice
/// artifact. The session is the only mutable state and is locked per
/// inference call.
pub struct KokoroTts {
    session: Mutex<Session>,
    vocab: HashMap<char, i64>,
    phonemizer: Phonemizer,
    voices: VoiceTable,
    token_input_name: String,
}

impl KokoroTts {
    /// Load the model and voice artifacts from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if either file is missing or unreadable, the voice
    /// archive is malformed, or the ONNX session cannot be built on the
    /// requested execution backend.
    pub fn load(model_path: &Path, voices_path: &Path, config: &TtsConfig) -> Result<Self> {
        for path in [model_path, voices_path] {
            if !path.is_file() {
                return Err(SpeakError::Model(format!(
                    "artifact not found: {} (run neurospeak-fetch first)",
                    path.display()
                )));
            }
        }

        info!("loading voices: {}", voices_path.display());
        let voices = VoiceTable::load(voices_path)?;

        info!(
            "loading Kokoro ONNX model: {} (backend={:?})",
            model_path.display(),
            config.execution_backend
        );
        let session = build_session(model_path, config)?;
        info!(
            "Kokoro session using {} execution provider",
            active_provider(config.execution_backend)
        );

        let phonemizer = Phonemizer::new(config.phonemizer, config.espeak_program.clone());

        info!("Kokoro TTS ready ({} voices)", voices.names().len());

        Ok(Self {
            session: Mutex::new(session),
            vocab: vocab::vocab(),
            phonemizer,
            voices,
            token_input_name: config.token_input_name.clone(),
        })
    }

    /// Run a single ONNX inference call on one padded batch.
    fn run_inference(&self, token_ids: &[i64], style: &[f32], speed: f32) -> Result<Vec<f32>> {
        use ort::session::{SessionInputValue, SessionInputs};

        let seq_len = token_ids.len();

        // tokens: shape [1, seq_len]
        let input_ids = Tensor::from_array(([1_usize, seq_len], token_ids.to_vec()))
            .map_err(|e| SpeakError::Tts(format!("failed to create token tensor: {e}")))?;

        // style: shape [1, 256]
        let style_tensor = Tensor::from_array(([1_usize, STYLE_DIM], style.to_vec()))
            .map_err(|e| SpeakError::Tts(format!("failed to create style tensor: {e}")))?;

        // speed: shape [1]
        let speed_tensor = Tensor::from_array(([1_usize], vec![speed]))
            .map_err(|e| SpeakError::Tts(format!("failed to create speed tensor: {e}")))?;

        let mut feed: HashMap<String, SessionInputValue> = HashMap::new();
        feed.insert(self.token_input_name.clone(), input_ids.into());
        feed.insert("style".to_string(), style_tensor.into());
        feed.insert("speed".to_string(), speed_tensor.into());

        let mut session = self
            .session
            .lock()
            .map_err(|_| SpeakError::Tts("ONNX session lock poisoned".into()))?;
        let outputs = session
            .run(SessionInputs::from(feed))
            .map_err(|e| SpeakError::Tts(format!("ONNX inference failed: {e}")))?;

        // Output: shape [1, num_samples]
        let (_shape, data) = outputs[0_usize]
            .try_extract_tensor::<f32>()
            .map_err(|e| SpeakError::Tts(format!("failed to extract output tensor: {e}")))?;

        Ok(data.to_vec())
    }
}

impl SpeechEngine for KokoroTts {
    fn synthesize(&self, params: &SynthesisParams) -> Result<Synthesis> {
        validate_params(params)?;
        let voice = self.voices.get(&params.voice)?;

        let start = std::time::Instant::now();
        let phonemes = self.phonemizer.phonemize(&params.text, &params.lang)?;
        let tokens = vocab::tokenize(&phonemes, &self.vocab);
        if tokens.is_empty() {
            return Err(SpeakError::Tts(
                "no phonemes in the model vocabulary were produced".into(),
            ));
        }

        let inputs = batch_inputs(&tokens, voice);
        let samples = render_batches(&inputs, |ids, style| {
            self.run_inference(ids, style, params.speed)
        })?;

        let synthesis = Synthesis {
            samples,
            sample_rate: SAMPLE_RATE,
        };
        let has_nan = synthesis.samples.iter().any(|s| s.is_nan());
        info!(
            "synthesized {} samples ({:.1}s audio) from {} tokens in {} batch(es), {}ms, nan={}",
            synthesis.samples.len(),
            synthesis.duration_secs(),
            tokens.len(),
            inputs.len(),
            start.elapsed().as_millis(),
            has_nan,
        );

        Ok(synthesis)
    }

    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn voices(&self) -> Vec<String> {
        self.voices.names()
    }
}

fn build_session(model_path: &Path, config: &TtsConfig) -> Result<Session> {
    let builder = Session::builder()
        .map_err(|e| SpeakError::Model(format!("failed to create session builder: {e}")))?
        .with_intra_threads(config.intra_threads.max(1))
        .map_err(|e| SpeakError::Model(format!("failed to set intra threads: {e}")))?;

    // Providers that are not compiled in or fail to initialise are skipped
    // unless marked `error_on_failure`.
    let builder = match config.execution_backend {
        ExecutionBackend::Auto => builder.with_execution_providers([
            ep::CUDA::default().build(),
            ep::DirectML::default().build(),
            ep::CoreML::default().build(),
            ep::CPU::default().build(),
        ]),
        ExecutionBackend::Cuda => {
            builder.with_execution_providers([ep::CUDA::default().build().error_on_failure()])
        }
        ExecutionBackend::Cpu => builder.with_execution_providers([ep::CPU::default().build()]),
    }
    .map_err(|e| SpeakError::Model(format!("failed to register execution providers: {e}")))?;

    builder
        .commit_from_file(model_path)
        .map_err(|e| SpeakError::Model(format!("failed to load Kokoro ONNX model: {e}")))
}

/// Name of the provider the session runs on: the first registered provider
/// the runtime reports as available, else the CPU.
fn active_provider(backend: ExecutionBackend) -> &'static str {
    let available = |result: ort::Result<bool>, name: &str| match result {
        Ok(available) => available,
        Err(e) => {
            warn!("could not query {name} availability: {e}");
            false
        }
    };

    match backend {
        ExecutionBackend::Cpu => "CPU",
        ExecutionBackend::Cuda => "CUDA",
        ExecutionBackend::Auto => {
            if available(ep::CUDA::default().is_available(), "CUDA") {
                "CUDA"
            } else if available(ep::DirectML::default().is_available(), "DirectML") {
                "DirectML"
            } else if available(ep::CoreML::default().is_available(), "CoreML") {
                "CoreML"
            } else {
                warn!("no accelerated execution provider available, falling back to CPU");
                "CPU"
            }
        }
    }
}

/// Frame each batch as `[PAD, tokens..., PAD]` and pair it with the style
/// row for its unpadded length.
pub fn batch_inputs<'a>(tokens: &[i64], voice: &'a VoiceStyle) -> Vec<(Vec<i64>, &'a [f32])> {
    split_batches(tokens, MAX_PHONEME_TOKENS)
        .into_iter()
        .map(|batch| {
            let mut ids = Vec::with_capacity(batch.len() + 2);
            ids.push(PAD_ID);
            ids.extend_from_slice(batch);
            ids.push(PAD_ID);
            (ids, voice.for_token_count(batch.len()))
        })
        .collect()
}

/// Run `infer` over each framed batch in order and concatenate the audio.
fn render_batches<F>(inputs: &[(Vec<i64>, &[f32])], mut infer: F) -> Result<Vec<f32>>
where
    F: FnMut(&[i64], &[f32]) -> Result<Vec<f32>>,
{
    let mut samples = Vec::new();
    for (ids, style) in inputs {
        samples.extend(infer(ids, style)?);
    }
    Ok(samples)
}

/// Reject parameters the model cannot honour.
pub fn validate_params(params: &SynthesisParams) -> Result<()> {
    if params.text.trim().is_empty() {
        return Err(SpeakError::Tts("text is empty".into()));
    }
    if !params.speed.is_finite() || !(MIN_SPEED..=MAX_SPEED).contains(&params.speed) {
        return Err(SpeakError::Tts(format!(
            "speed {} is outside {MIN_SPEED}..={MAX_SPEED}",
            params.speed
        )));
    }
    if params.voice.trim().is_empty() {
        return Err(SpeakError::Tts("voice is empty".into()));
    }
    Ok(())
}

/// Split `tokens` into batches of at most `max` ids.
///
/// Each cut is placed after the last space or punctuation id within the
/// window when there is one, so words are not split across batches.
pub fn split_batches(tokens: &[i64], max: usize) -> Vec<&[i64]> {
    let max = max.max(1);
    let boundaries = boundary_ids();
    let mut batches = Vec::new();
    let mut rest = tokens;
    while rest.len() > max {
        let window = &rest[..max];
        let cut = window
            .iter()
            .rposition(|id| boundaries.contains(id))
            .map(|i| i + 1)
            .unwrap_or(max);
        let (head, tail) = rest.split_at(cut);
        batches.push(head);
        rest = tail;
    }
    if !rest.is_empty() {
        batches.push(rest);
    }
    batches
}

fn boundary_ids() -> Vec<i64> {
    let v = vocab::vocab();
    vocab::PUNCTUATION
        .iter()
        .chain(std::iter::once(&' '))
        .filter_map(|c| v.get(c).copied())
        .collect()
}
