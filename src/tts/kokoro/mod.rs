//! Kokoro TTS engine: ONNX inference over a phoneme vocabulary with
//! per-voice style tables.

mod engine;
pub mod phonemize;
pub mod vocab;
pub mod voices;

pub use engine::{
    KokoroTts, MAX_PHONEME_TOKENS, MAX_SPEED, MIN_SPEED, SAMPLE_RATE, batch_inputs, split_batches,
    validate_params,
};
pub use phonemize::Phonemizer;
pub use voices::{VoiceStyle, VoiceTable};
