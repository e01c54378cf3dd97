use crate::{
    control_change::{ControlChangeEntry, ControlChangeMap},
    error::{Error, Result},
    message::{MIDI_CHANNEL_MAX, MIDI_DATA_MAX},
    sysex::{SysExIterator, SysExMessage},
    tone::{Tone, ToneRegistry},
};

use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Loads tones from a file.
pub trait ToneReader {
    /// Populates `tone` in place. On error `tone` keeps its previous state.
    fn read_tone(&self, path: &Path, tone: &Tone) -> Result<()>;

    /// Every tone of a bank file.
    fn read_tones(&self, path: &Path) -> Result<Vec<Tone>>;
}

pub trait ToneWriter {
    fn write_tone(&self, path: &Path, tone: &Tone) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ParameterValue {
    name: String,
    value: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ToneDocument {
    model: String,
    name: String,
    #[serde(default)]
    midi_channel: u8,
    parameters: Vec<ParameterValue>,
}

impl ToneDocument {
    fn from_tone(tone: &Tone) -> Self {
        ToneDocument {
            model: tone.model().to_string(),
            name: tone.name(),
            midi_channel: tone.midi_channel(),
            parameters: tone
                .parameters()
                .map(|p| ParameterValue {
                    name: p.name().to_string(),
                    value: p.value(),
                })
                .collect(),
        }
    }

    fn validate_for(&self, tone: &Tone) -> Result<()> {
        if self.model != tone.model() {
            return Err(Error::ToneMismatch {
                expected: tone.model().to_string(),
                found: self.model.clone(),
            });
        }
        if self.midi_channel > MIDI_CHANNEL_MAX {
            return Err(Error::InvalidMidiChannel(self.midi_channel));
        }
        if let Some(unknown) = self.parameters.iter().find(|p| !tone.contains(&p.name)) {
            return Err(Error::UnknownParameter(unknown.name.clone()));
        }

        Ok(())
    }

    fn apply_to(&self, tone: &Tone) -> Result<()> {
        self.validate_for(tone)?;

        tone.set_name(self.name.clone());
        tone.set_midi_channel(self.midi_channel)?;
        for value in self.parameters.iter() {
            if let Some(parameter) = tone.parameter(&value.name) {
                parameter.set_value(value.value);
            }
        }

        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct BankDocument {
    tones: Vec<ToneDocument>,
}

/// Tones and banks as JSON documents. Banks need the registry to build their tones.
pub struct JsonToneFile {
    registry: Arc<ToneRegistry>,
}

impl JsonToneFile {
    pub fn new(registry: Arc<ToneRegistry>) -> Self {
        JsonToneFile { registry }
    }

    pub fn write_bank(&self, path: &Path, tones: &[Tone]) -> Result<()> {
        let bank = BankDocument {
            tones: tones.iter().map(ToneDocument::from_tone).collect(),
        };
        fs::write(path, serde_json::to_string_pretty(&bank)?)?;
        info!("Wrote {} tones to {}", tones.len(), path.display());

        Ok(())
    }
}

impl ToneReader for JsonToneFile {
    fn read_tone(&self, path: &Path, tone: &Tone) -> Result<()> {
        let document: ToneDocument = serde_json::from_str(&fs::read_to_string(path)?)?;
        document.apply_to(tone)?;
        info!("Loaded tone {} from {}", tone.name(), path.display());

        Ok(())
    }

    fn read_tones(&self, path: &Path) -> Result<Vec<Tone>> {
        let bank: BankDocument = serde_json::from_str(&fs::read_to_string(path)?)?;

        let mut tones = Vec::with_capacity(bank.tones.len());
        for document in bank.tones.iter() {
            let tone = self.registry.create_tone(&document.model)?;
            document.apply_to(&tone)?;
            tones.push(tone);
        }
        info!("Loaded {} tones from {}", tones.len(), path.display());

        Ok(tones)
    }
}

impl ToneWriter for JsonToneFile {
    fn write_tone(&self, path: &Path, tone: &Tone) -> Result<()> {
        let document = ToneDocument::from_tone(tone);
        fs::write(path, serde_json::to_string_pretty(&document)?)?;
        info!("Saved tone {} to {}", document.name, path.display());

        Ok(())
    }
}

/// The SysEx messages of a raw dump, such as a `.syx` file.
pub fn read_sysex_file(path: &Path) -> Result<Vec<SysExMessage>> {
    let bytes = fs::read(path)?;

    Ok(SysExIterator::new(&bytes).collect())
}

pub fn write_sysex_file(path: &Path, messages: &[SysExMessage]) -> Result<()> {
    let bytes: Vec<u8> = messages
        .iter()
        .flat_map(|m| m.as_bytes().iter().copied())
        .collect();
    fs::write(path, bytes)?;

    Ok(())
}

pub fn read_cc_map(path: &Path) -> Result<ControlChangeMap> {
    let entries: Vec<ControlChangeEntry> = serde_json::from_str(&fs::read_to_string(path)?)?;
    if let Some(entry) = entries.iter().find(|e| e.cc > MIDI_DATA_MAX) {
        return Err(Error::InvalidController {
            parameter: entry.parameter.clone(),
            cc: entry.cc,
        });
    }

    Ok(ControlChangeMap::from_entries(entries))
}

pub fn write_cc_map(path: &Path, map: &ControlChangeMap) -> Result<()> {
    fs::write(path, serde_json::to_string_pretty(&map.entries())?)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{default_registry, GenericSynth};
    use crate::tone::ToneFactory;
    use tempfile::tempdir;

    fn file() -> JsonToneFile {
        JsonToneFile::new(Arc::new(default_registry()))
    }

    #[test]
    fn test_tone_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bass.json");

        let tone = GenericSynth.create_tone().unwrap();
        tone.set_name("Bass");
        tone.set_midi_channel(3).unwrap();
        tone.parameter("filter_cutoff").unwrap().set_value(33);
        tone.parameter("vca_level").unwrap().set_value(-200);
        file().write_tone(&path, &tone).unwrap();

        let loaded = GenericSynth.create_tone().unwrap();
        file().read_tone(&path, &loaded).unwrap();
        assert_eq!(loaded.name(), "Bass");
        assert_eq!(loaded.midi_channel(), 3);
        assert_eq!(loaded.dump_values(), tone.dump_values());
        assert!(loaded.parameter("filter_cutoff").unwrap().is_changed());
    }

    #[test]
    fn test_bad_document_leaves_tone_untouched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(
            &path,
            r#"{"model":"generic","name":"Bad","midi_channel":0,
                "parameters":[{"name":"filter_cutoff","value":1},{"name":"nope","value":1}]}"#,
        )
        .unwrap();

        let tone = GenericSynth.create_tone().unwrap();
        tone.set_name("Good");
        let result = file().read_tone(&path, &tone);

        assert!(matches!(result, Err(Error::UnknownParameter(_))));
        assert_eq!(tone.name(), "Good");
        assert_eq!(tone.parameter("filter_cutoff").unwrap().value(), 100);
    }

    #[test]
    fn test_wrong_model_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("other.json");
        fs::write(
            &path,
            r#"{"model":"other","name":"X","parameters":[]}"#,
        )
        .unwrap();

        let tone = GenericSynth.create_tone().unwrap();
        assert!(matches!(
            file().read_tone(&path, &tone),
            Err(Error::ToneMismatch { .. })
        ));
    }

    #[test]
    fn test_garbage_is_a_json_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("garbage.json");
        fs::write(&path, "not json").unwrap();

        let tone = GenericSynth.create_tone().unwrap();
        assert!(matches!(file().read_tone(&path, &tone), Err(Error::Json(_))));
        assert!(matches!(
            file().read_tone(&dir.path().join("missing.json"), &tone),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn test_bank_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bank.json");

        let tones: Vec<Tone> = (0..3)
            .map(|i| {
                let tone = GenericSynth.create_tone().unwrap();
                tone.set_name(format!("Tone {}", i));
                tone.parameter("osc1_pitch").unwrap().set_value(i * 10);
                tone
            })
            .collect();
        file().write_bank(&path, &tones).unwrap();

        let loaded = file().read_tones(&path).unwrap();
        assert_eq!(loaded.len(), 3);
        for (i, tone) in loaded.iter().enumerate() {
            assert_eq!(tone.name(), format!("Tone {}", i));
            assert_eq!(tone.parameter("osc1_pitch").unwrap().value(), i as i32 * 10);
        }
    }

    #[test]
    fn test_sysex_dump_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dump.syx");

        let tone = GenericSynth.create_tone().unwrap();
        let messages: Vec<SysExMessage> = tone.parameters().map(|p| p.message()).collect();
        write_sysex_file(&path, &messages).unwrap();

        assert_eq!(read_sysex_file(&path).unwrap(), messages);
    }

    #[test]
    fn test_cc_map_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cc.json");

        let map = ControlChangeMap::new();
        map.add("filter_cutoff", 74);
        map.add("filter_resonance", 71);
        write_cc_map(&path, &map).unwrap();

        let loaded = read_cc_map(&path).unwrap();
        assert_eq!(loaded.entries(), map.entries());
    }

    #[test]
    fn test_cc_map_rejects_controller_out_of_range() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cc.json");
        fs::write(
            &path,
            r#"[{"parameter":"filter_cutoff","cc":74},{"parameter":"vca_level","cc":200}]"#,
        )
        .unwrap();

        match read_cc_map(&path) {
            Err(Error::InvalidController { parameter, cc }) => {
                assert_eq!((parameter.as_str(), cc), ("vca_level", 200));
            }
            other => panic!("Expected InvalidController, got {:?}", other.map(|m| m.len())),
        }
    }
}
