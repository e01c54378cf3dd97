use crate::{
    error::Result,
    parameter::{Parameter, ParameterEncoding, SysExTemplate, ValueFormat},
    sysex::{SysExMessage, SYSEX_CONTINUATION, SYSEX_START},
    tone::{Tone, ToneFactory, ToneRegistry},
};

use std::sync::Arc;

/// Manufacturer ID reserved for non-commercial use.
const NON_COMMERCIAL_ID: u8 = 0x7D;
const SINGLE_PARAMETER_COMMAND: u8 = 0x01;

// (name, label, min, max, step, default, format)
type ParameterDef = (&'static str, &'static str, i32, i32, i32, i32, ValueFormat);

const GENERIC_PARAMETERS: &[ParameterDef] = &[
    ("osc1_wave", "Osc 1 Wave", 0, 3, 1, 0, ValueFormat::SevenBit),
    ("osc1_pitch", "Osc 1 Pitch", 0, 63, 1, 12, ValueFormat::SevenBit),
    ("osc1_pw", "Osc 1 Pulse Width", 0, 63, 1, 32, ValueFormat::SevenBit),
    ("osc2_wave", "Osc 2 Wave", 0, 3, 1, 0, ValueFormat::SevenBit),
    ("osc2_pitch", "Osc 2 Pitch", 0, 63, 1, 12, ValueFormat::SevenBit),
    ("osc2_detune", "Osc 2 Detune", -31, 31, 1, 0, ValueFormat::Nibbles),
    ("osc_sync", "Sync", 0, 1, 1, 0, ValueFormat::SevenBit),
    ("filter_cutoff", "Cutoff", 0, 127, 1, 100, ValueFormat::SevenBit),
    ("filter_resonance", "Resonance", 0, 63, 1, 0, ValueFormat::SevenBit),
    ("filter_mode", "Filter Mode", 0, 14, 1, 0, ValueFormat::SevenBit),
    ("env1_attack", "Env 1 Attack", 0, 63, 1, 0, ValueFormat::SevenBit),
    ("env1_decay", "Env 1 Decay", 0, 63, 1, 20, ValueFormat::SevenBit),
    ("env1_sustain", "Env 1 Sustain", 0, 63, 1, 63, ValueFormat::SevenBit),
    ("env1_release", "Env 1 Release", 0, 63, 1, 10, ValueFormat::SevenBit),
    ("lfo1_rate", "LFO 1 Rate", 0, 126, 2, 40, ValueFormat::SevenBit),
    ("vca_level", "VCA Level", -512, 511, 1, 300, ValueFormat::FourteenBit),
];

/// A generic synth speaking one SysEx message per parameter:
/// `F0 7D 01 <index> <value lsb> <value msb> F7`.
pub struct GenericSynth;

impl GenericSynth {
    pub const MODEL: &'static str = "generic";

    fn encoding(index: u8, format: ValueFormat) -> Result<Arc<dyn ParameterEncoding>> {
        let template = SysExMessage::new(vec![
            SYSEX_START,
            NON_COMMERCIAL_ID,
            SINGLE_PARAMETER_COMMAND,
            index,
            0x00,
            0x00,
            SYSEX_CONTINUATION,
        ])?;

        Ok(Arc::new(SysExTemplate::new(template, 4, format)?))
    }
}

impl ToneFactory for GenericSynth {
    fn model(&self) -> &str {
        Self::MODEL
    }

    fn create_tone(&self) -> Result<Tone> {
        let mut parameters = Vec::with_capacity(GENERIC_PARAMETERS.len());
        for (index, &(name, label, min, max, step, value, format)) in
            GENERIC_PARAMETERS.iter().enumerate()
        {
            let encoding = Self::encoding(index as u8, format)?;
            parameters.push(Parameter::new(name, label, min, max, step, value, encoding)?);
        }

        Tone::new(Self::MODEL, "", parameters)
    }
}

/// Registry with every model this crate knows how to edit.
pub fn default_registry() -> ToneRegistry {
    let mut registry = ToneRegistry::new();
    registry.register(Box::new(GenericSynth));

    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generic_tone_builds() {
        let tone = default_registry().create_tone(GenericSynth::MODEL).unwrap();
        assert_eq!(tone.len(), GENERIC_PARAMETERS.len());
        assert_eq!(tone.model(), "generic");
        assert!(tone.parameters().all(|p| !p.is_changed()));
    }

    #[test]
    fn test_generic_messages_carry_index_and_value() {
        let tone = GenericSynth.create_tone().unwrap();
        let cutoff = tone.parameter("filter_cutoff").unwrap();
        cutoff.set_value(77);
        assert_eq!(
            cutoff.message().as_bytes(),
            &[0xF0, 0x7D, 0x01, 7, 77, 0x00, 0xF7]
        );
    }

    #[test]
    fn test_stepped_parameter() {
        let tone = GenericSynth.create_tone().unwrap();
        let rate = tone.parameter("lfo1_rate").unwrap();
        rate.set_value(41);
        assert_eq!(rate.value(), 40);
    }
}
