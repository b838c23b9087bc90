pub mod http;

use std::fmt;
use std::future::Future;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ParleyError, Result};
use crate::session::Stage;
use crate::settings::InputMode;

pub use self::http::HttpApi;

/// Which model backend the server should drive the dialogue with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiChoice {
    #[default]
    Gemini,
    OpenAi,
}

impl fmt::Display for ApiChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Gemini => "gemini",
            Self::OpenAi => "openai",
        })
    }
}

impl FromStr for ApiChoice {
    type Err = ParleyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "openai" => Ok(Self::OpenAi),
            other => Err(ParleyError::Config(format!(
                "unknown API choice: {other} (available: gemini, openai)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartRequest {
    pub scenario_key: String,
    pub api_choice: ApiChoice,
    pub timeout_seconds: u32,
    pub tts_enabled: bool,
    pub input_mode: InputMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StartReply {
    pub session_id: String,
    pub stage: Stage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnRequest {
    pub session_id: String,
    pub text: String,
}

/// Everything the server may say in reaction to one turn.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TurnReply {
    pub sarah: Option<String>,
    pub system: Option<String>,
    pub coach_prompt: Option<String>,
    pub success_message: Option<String>,
    pub evaluation: Option<String>,
    pub score: Option<Score>,
    pub final_rank: Option<String>,
    pub stage: Option<Stage>,
    pub completed: bool,
}

/// A score as the server reports it, either numeric or preformatted text
/// such as `"3 / 5"`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Score {
    Number(serde_json::Number),
    Text(String),
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoiceRequest {
    pub audio_base64: String,
    pub sample_rate: u32,
    pub language_code: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct VoiceReply {
    pub transcript: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub record_seconds_default: Option<u32>,
}

/// The remote coaching service.
pub trait SessionApi {
    fn start(&self, request: &StartRequest) -> impl Future<Output = Result<StartReply>>;

    fn message(&self, request: &TurnRequest) -> impl Future<Output = Result<TurnReply>>;

    /// Transcribe a WAV payload. An empty transcript means no speech was heard.
    fn transcribe(&self, request: &VoiceRequest) -> impl Future<Output = Result<VoiceReply>>;

    fn config(&self) -> impl Future<Output = Result<ServerConfig>>;
}

/// Decode a response body. A string `error` field wins over everything else
/// and is surfaced verbatim; a body that is not the expected JSON is treated
/// like an unreachable server.
pub fn decode_reply<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| ParleyError::NetworkUnreachable(format!("invalid response body: {e}")))?;

    if let Some(error) = value.get("error").and_then(serde_json::Value::as_str) {
        return Err(ParleyError::ServerRejected(error.to_string()));
    }

    serde_json::from_value(value)
        .map_err(|e| ParleyError::NetworkUnreachable(format!("unexpected response shape: {e}")))
}
