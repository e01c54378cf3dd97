use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Parameter step can not be 0")]
    InvalidStep,

    #[error("Invalid parameter range: min {min} > max {max}")]
    InvalidRange { min: i32, max: i32 },

    #[error("MIDI channel {0} out of range (0..=15)")]
    InvalidMidiChannel(u8),

    #[error("Transmit delay can not be negative: {0} ms")]
    InvalidTransmitDelay(i64),

    #[error("Malformed SysEx message: {0}")]
    MalformedSysEx(&'static str),

    #[error("Malformed MIDI message: {0}")]
    MalformedMessage(String),

    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),

    #[error("Duplicate parameter: {0}")]
    DuplicateParameter(String),

    #[error("Tone model mismatch: expected {expected}, found {found}")]
    ToneMismatch { expected: String, found: String },

    #[error("Morphing factor {0} out of [0, 1]")]
    InvalidMorphFactor(f32),

    #[error("Unknown synth model: {0}")]
    UnknownSynthModel(String),

    #[error("MIDI device error: {0}")]
    Device(String),

    #[error("Transmitter has been disposed")]
    TransmitterDisposed,

    #[error("Invalid tone file: {0}")]
    Tone(String),

    #[error("Controller {cc} assigned to {parameter} is out of range (0..=127)")]
    InvalidController { parameter: String, cc: u8 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
