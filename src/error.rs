use std::io;

#[derive(Debug, thiserror::Error)]
pub enum ParleyError {
    #[error("failed to reach server: {0}")]
    NetworkUnreachable(String),

    #[error("{0}")]
    ServerRejected(String),

    #[error("no audio input device available: {0}")]
    DeviceUnavailable(String),

    #[error("microphone access denied: {0}")]
    DeviceAcquisitionDenied(String),

    #[error("audio error: {0}")]
    Audio(String),

    #[error("encode error: {0}")]
    Encode(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("settings error: {0}")]
    Settings(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, ParleyError>;
