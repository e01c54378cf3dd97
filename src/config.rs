use crate::{
    error::{Error, Result},
    message::MIDI_CHANNEL_MAX,
    models::GenericSynth,
    transmit::{DEFAULT_TRANSMIT_DELAY_MS, PARAMETER_QUEUE_DEFAULT_CAPACITY},
};

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub synth_model: String,
    pub midi_channel: u8,
    /// Milliseconds between two transmitter ticks.
    pub transmit_delay_ms: i64,
    /// Initial capacity of the transmit queue.
    pub queue_capacity: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig {
            synth_model: GenericSynth::MODEL.to_string(),
            midi_channel: 0,
            transmit_delay_ms: DEFAULT_TRANSMIT_DELAY_MS as i64,
            queue_capacity: PARAMETER_QUEUE_DEFAULT_CAPACITY,
        }
    }
}

impl ControllerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.midi_channel > MIDI_CHANNEL_MAX {
            return Err(Error::InvalidMidiChannel(self.midi_channel));
        }
        if self.transmit_delay_ms < 0 {
            return Err(Error::InvalidTransmitDelay(self.transmit_delay_ms));
        }

        Ok(())
    }

    /// Reads and validates a JSON config. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let config: ControllerConfig = serde_json::from_str(&fs::read_to_string(path)?)?;
        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.transmit_delay_ms, 20);
        assert_eq!(config.queue_capacity, 200);
        assert_eq!(config.synth_model, "generic");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let file = NamedTempFile::new().unwrap();
        fs::write(file.path(), r#"{ "midi_channel": 9 }"#).unwrap();

        let config = ControllerConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.midi_channel, 9);
        assert_eq!(config.transmit_delay_ms, 20);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let file = NamedTempFile::new().unwrap();
        fs::write(file.path(), r#"{ "transmit_delay_ms": -5 }"#).unwrap();
        assert!(matches!(
            ControllerConfig::from_json_file(file.path()),
            Err(Error::InvalidTransmitDelay(-5))
        ));

        let config = ControllerConfig {
            midi_channel: 16,
            ..ControllerConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidMidiChannel(16))));
    }
}
