//! Configuration types for the synthesis service and model provisioner.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Release URL of the Kokoro v0.19 ONNX model.
pub const DEFAULT_MODEL_URL: &str =
    "https://github.com/thewh1teagle/kokoro-onnx/releases/download/model-files/kokoro-v0_19.onnx";

/// Release URL of the voice embeddings matching [`DEFAULT_MODEL_URL`].
pub const DEFAULT_VOICES_URL: &str =
    "https://github.com/thewh1teagle/kokoro-onnx/releases/download/model-files/voices.bin";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeakConfig {
    /// HTTP listener settings.
    pub server: ServerConfig,
    /// Text-to-speech engine settings.
    pub tts: TtsConfig,
    /// Model artifact locations.
    pub models: ModelConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    /// Bind port (`0` picks a free port).
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8000,
        }
    }
}

/// ONNX execution backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionBackend {
    /// Try every compiled-in accelerator, then fall back to the CPU.
    #[default]
    Auto,
    /// Require CUDA; startup fails if it cannot be initialised.
    Cuda,
    /// CPU only.
    Cpu,
}

/// Grapheme-to-phoneme backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhonemizerBackend {
    /// misaki for English, espeak-ng for everything else.
    #[default]
    Auto,
    /// Always shell out to espeak-ng.
    Espeak,
    /// misaki only (English).
    Misaki,
}

/// Fixed synthesis parameters used when request parameters are not honoured.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonaConfig {
    /// Voice name inside the voice archive.
    pub voice: String,
    /// Speech speed multiplier (0.5–2.0).
    pub speed: f32,
    /// Language tag passed to the phonemizer (e.g. `"ja"`, `"en-us"`).
    pub lang: String,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            voice: "jf_alpha".to_owned(),
            speed: 0.85,
            lang: "ja".to_owned(),
        }
    }
}

/// Text-to-speech engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// Execution backend for the ONNX session.
    pub execution_backend: ExecutionBackend,
    /// Grapheme-to-phoneme backend.
    pub phonemizer: PhonemizerBackend,
    /// espeak-ng executable name or path.
    pub espeak_program: String,
    /// Name of the token-id input of the ONNX graph (`tokens` or `input_ids`).
    pub token_input_name: String,
    /// Intra-op thread count for the ONNX session.
    pub intra_threads: usize,
    /// Use the caller's `voice`/`speed`/`lang` instead of the fixed persona.
    pub honor_request_params: bool,
    /// Persona used when `honor_request_params` is `false`.
    pub persona: PersonaConfig,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            execution_backend: ExecutionBackend::default(),
            phonemizer: PhonemizerBackend::default(),
            espeak_program: "espeak-ng".to_owned(),
            token_input_name: "tokens".to_owned(),
            intra_threads: 4,
            honor_request_params: false,
            persona: PersonaConfig::default(),
        }
    }
}

/// Model artifact configuration shared by the provisioner and the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Remote location of the ONNX model.
    pub model_url: String,
    /// Remote location of the voice archive.
    pub voices_url: String,
    /// Local path of the ONNX model.
    pub model_path: PathBuf,
    /// Local path of the voice archive.
    pub voices_path: PathBuf,
    /// Keep existing local files instead of overwriting them.
    pub skip_existing: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_url: DEFAULT_MODEL_URL.to_owned(),
            voices_url: DEFAULT_VOICES_URL.to_owned(),
            model_path: PathBuf::from("kokoro-v0_19.onnx"),
            voices_path: PathBuf::from("voices.bin"),
            skip_existing: false,
        }
    }
}

impl SpeakConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::SpeakError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::SpeakError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load `path` if given, else the default path if it exists, else defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit or existing default file cannot be loaded.
    pub fn load(path: Option<&std::path::Path>) -> crate::error::Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => {
                let default_path = Self::default_config_path();
                if default_path.is_file() {
                    Self::from_file(&default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Returns the default config file path: `<config dir>/neurospeak/config.toml`.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("neurospeak")
            .join("config.toml")
    }
}
