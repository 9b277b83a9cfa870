//! Audio container encoding for synthesized speech.

pub mod wav;

pub use wav::{WAV_CONTENT_TYPE, encode_wav_pcm16};
