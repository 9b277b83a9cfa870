//! neurospeak: HTTP text-to-speech around the Kokoro ONNX model.
//!
//! Two independent pieces:
//!
//! - **Provisioning** ([`models::Provisioner`]): downloads the model weights
//!   and voice embeddings to fixed local paths, ahead of time.
//! - **Synthesis service** ([`server::SynthesisServer`]): loads both artifacts
//!   into a [`tts::KokoroTts`] engine at startup and serves `POST /tts`,
//!   returning WAV audio.

pub mod audio;
pub mod config;
pub mod error;
pub mod models;
pub mod progress;
pub mod server;
pub mod tts;

pub use config::SpeakConfig;
pub use error::{Result, SpeakError};
pub use progress::{ProgressCallback, ProgressEvent};
pub use tts::{SpeechEngine, Synthesis, SynthesisParams};
