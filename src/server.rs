//! HTTP synthesis service.
//!
//! ## Endpoints
//!
//! - `POST /tts`: synthesize text, respond with `audio/wav`
//! - `GET /voices`: voices available in the loaded engine
//! - `GET /health`: liveness probe
//!
//! Failures during synthesis or encoding return `500` with
//! `{"detail": "<message>"}`. Bodies that do not deserialize are rejected
//! before synthesis with the extractor's status (`400`, `415` or `422`) and
//! the same `{"detail"}` body.

use crate::audio::{WAV_CONTENT_TYPE, encode_wav_pcm16};
use crate::config::{ServerConfig, TtsConfig};
use crate::error::{Result, SpeakError};
use crate::tts::{SpeechEngine, SynthesisParams};
use axum::Router;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tracing::{error, info, warn};

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Declared default voice of the request schema.
pub const REQUEST_DEFAULT_VOICE: &str = "jf_alpha";
/// Declared default speed of the request schema.
pub const REQUEST_DEFAULT_SPEED: f32 = 1.0;
/// Declared default language of the request schema.
pub const REQUEST_DEFAULT_LANG: &str = "ja";

/// Body of `POST /tts`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsRequest {
    /// Text to speak.
    pub text: String,
    /// Requested voice.
    #[serde(default = "default_voice")]
    pub voice: String,
    /// Requested speed multiplier.
    #[serde(default = "default_speed")]
    pub speed: f32,
    /// Requested language tag.
    #[serde(default = "default_lang")]
    pub lang: String,
}

fn default_voice() -> String {
    REQUEST_DEFAULT_VOICE.to_owned()
}

fn default_speed() -> f32 {
    REQUEST_DEFAULT_SPEED
}

fn default_lang() -> String {
    REQUEST_DEFAULT_LANG.to_owned()
}

/// Error body returned with non-success statuses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable failure message.
    pub detail: String,
}

/// Body of `GET /voices`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceListResponse {
    /// Sorted voice names.
    pub voices: Vec<String>,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the process is serving.
    pub status: String,
}

// ---------------------------------------------------------------------------
// Shared application state
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct AppState {
    engine: Arc<dyn SpeechEngine>,
    tts: Arc<TtsConfig>,
}

/// Map a request onto engine parameters.
///
/// Unless `honor_request_params` is set, only the caller's text is used and
/// voice, speed, and language come from the configured persona.
pub fn resolve_params(request: TtsRequest, tts: &TtsConfig) -> SynthesisParams {
    if tts.honor_request_params {
        SynthesisParams {
            text: request.text,
            voice: request.voice,
            speed: request.speed,
            lang: request.lang,
        }
    } else {
        SynthesisParams {
            text: request.text,
            voice: tts.persona.voice.clone(),
            speed: tts.persona.speed,
            lang: tts.persona.lang.clone(),
        }
    }
}

/// Build the service router around a loaded engine.
pub fn router(engine: Arc<dyn SpeechEngine>, tts: &TtsConfig) -> Router {
    let state = AppState {
        engine,
        tts: Arc::new(tts.clone()),
    };

    // Credentials rule out `*`, so origin, methods and headers are mirrored.
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true);

    Router::new()
        .route("/tts", post(handle_tts))
        .route("/voices", get(handle_voices))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// SynthesisServer
// ---------------------------------------------------------------------------

/// Running HTTP listener in a background tokio task.
pub struct SynthesisServer {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl SynthesisServer {
    /// Bind to `{server.host}:{server.port}` (port `0` auto-assigns) and
    /// start serving in a background task.
    ///
    /// # Errors
    ///
    /// Returns an error if the TCP listener cannot bind.
    pub async fn start(
        engine: Arc<dyn SpeechEngine>,
        server: &ServerConfig,
        tts: &TtsConfig,
    ) -> Result<Self> {
        let app = router(engine, tts);

        let bind_addr = format!("{}:{}", server.host, server.port);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| SpeakError::Server(format!("bind {bind_addr} failed: {e}")))?;

        let addr = listener
            .local_addr()
            .map_err(|e| SpeakError::Server(format!("failed to get local addr: {e}")))?;

        info!("synthesis service listening on http://{addr}");

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!("synthesis service error: {e}");
            }
        });

        Ok(Self { addr, handle })
    }

    /// Returns the address the server is listening on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Abort the server task.
    pub fn shutdown(&self) {
        self.handle.abort();
    }
}

impl Drop for SynthesisServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// `POST /tts`: synthesize and return WAV bytes.
async fn handle_tts(
    State(state): State<AppState>,
    payload: std::result::Result<Json<TtsRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return rejected(&rejection),
    };
    let params = resolve_params(request, &state.tts);
    info!(
        chars = params.text.chars().count(),
        voice = %params.voice,
        speed = params.speed,
        lang = %params.lang,
        "synthesis request"
    );

    let engine = Arc::clone(&state.engine);
    let start = std::time::Instant::now();
    let result = tokio::task::spawn_blocking(move || {
        let synthesis = engine.synthesize(&params)?;
        encode_wav_pcm16(&synthesis.samples, synthesis.sample_rate)
    })
    .await;

    match result {
        Ok(Ok(wav)) => {
            info!(
                bytes = wav.len(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "synthesis complete"
            );
            ([(header::CONTENT_TYPE, WAV_CONTENT_TYPE)], wav).into_response()
        }
        Ok(Err(e)) => server_error(e.to_string()),
        Err(e) => server_error(format!("synthesis task failed: {e}")),
    }
}

/// `GET /voices`: list voices of the loaded engine.
async fn handle_voices(State(state): State<AppState>) -> Json<VoiceListResponse> {
    Json(VoiceListResponse {
        voices: state.engine.voices(),
    })
}

/// `GET /health`: liveness probe.
async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_owned(),
    })
}

/// Malformed bodies keep the extractor's status but use the JSON error body.
fn rejected(rejection: &JsonRejection) -> Response {
    let status = rejection.status();
    let detail = rejection.body_text();
    warn!(%status, "rejected request body: {detail}");
    (status, Json(ErrorResponse { detail })).into_response()
}

fn server_error(detail: String) -> Response {
    error!("error generating audio: {detail}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse { detail }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    fn request() -> TtsRequest {
        TtsRequest {
            text: "hello".to_owned(),
            voice: "af_sky".to_owned(),
            speed: 1.3,
            lang: "en-us".to_owned(),
        }
    }

    #[test]
    fn request_defaults_apply_to_missing_fields() {
        let req: TtsRequest = serde_json::from_str(r#"{"text":"hi"}"#).unwrap();
        assert_eq!(req.text, "hi");
        assert_eq!(req.voice, REQUEST_DEFAULT_VOICE);
        assert!((req.speed - REQUEST_DEFAULT_SPEED).abs() < f32::EPSILON);
        assert_eq!(req.lang, REQUEST_DEFAULT_LANG);
    }

    #[test]
    fn request_without_text_is_rejected() {
        assert!(serde_json::from_str::<TtsRequest>(r#"{"voice":"x"}"#).is_err());
    }

    #[test]
    fn persona_overrides_caller_params_by_default() {
        let tts = TtsConfig::default();
        let params = resolve_params(request(), &tts);
        assert_eq!(params.text, "hello");
        assert_eq!(params.voice, "jf_alpha");
        assert!((params.speed - 0.85).abs() < f32::EPSILON);
        assert_eq!(params.lang, "ja");
    }

    #[test]
    fn caller_params_used_when_honored() {
        let tts = TtsConfig {
            honor_request_params: true,
            ..TtsConfig::default()
        };
        let params = resolve_params(request(), &tts);
        assert_eq!(params.voice, "af_sky");
        assert!((params.speed - 1.3).abs() < f32::EPSILON);
        assert_eq!(params.lang, "en-us");
    }

    #[test]
    fn error_response_shape() {
        let json = serde_json::to_value(ErrorResponse {
            detail: "boom".into(),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"detail": "boom"}));
    }
}
