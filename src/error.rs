//! Error types for neurospeak.

/// Top-level error type for provisioning and synthesis.
#[derive(Debug, thiserror::Error)]
pub enum SpeakError {
    /// Text-to-speech synthesis error (phonemization, tokenization, inference).
    #[error("TTS error: {0}")]
    Tts(String),

    /// Model or voice artifact loading error.
    #[error("model error: {0}")]
    Model(String),

    /// Artifact download error.
    #[error("download error: {0}")]
    Download(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Audio encoding error.
    #[error("audio error: {0}")]
    Audio(String),

    /// HTTP server error (bind, serve, task join).
    #[error("server error: {0}")]
    Server(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, SpeakError>;
