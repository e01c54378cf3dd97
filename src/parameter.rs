use crate::{
    error::{Error, Result},
    sysex::SysExMessage,
};

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Turns a parameter value into the message the synth understands. Each synth model picks its
/// encodings when its tone is built.
pub trait ParameterEncoding: Send + Sync + fmt::Debug {
    fn encode(&self, value: i32) -> SysExMessage;
}

/// How a value is laid out in a SysEx template. Negative values are stored two's complement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueFormat {
    /// One data byte.
    SevenBit,
    /// Low nibble, then high nibble of the 8-bit value.
    Nibbles,
    /// LSB then MSB, 7 bits each.
    FourteenBit,
}

impl ValueFormat {
    fn width(self) -> usize {
        match self {
            ValueFormat::SevenBit => 1,
            ValueFormat::Nibbles | ValueFormat::FourteenBit => 2,
        }
    }
}

/// A fixed SysEx message with the value written at `offset`.
#[derive(Debug, Clone)]
pub struct SysExTemplate {
    template: SysExMessage,
    offset: usize,
    format: ValueFormat,
}

impl SysExTemplate {
    pub fn new(template: SysExMessage, offset: usize, format: ValueFormat) -> Result<Self> {
        // The status byte and the terminator are never overwritten.
        if offset == 0 || offset + format.width() >= template.len() {
            return Err(Error::MalformedSysEx("value offset outside of template"));
        }

        Ok(SysExTemplate {
            template,
            offset,
            format,
        })
    }
}

impl ParameterEncoding for SysExTemplate {
    fn encode(&self, value: i32) -> SysExMessage {
        let mut bytes = self.template.as_bytes().to_vec();
        let o = self.offset;
        match self.format {
            ValueFormat::SevenBit => bytes[o] = (value as u8) & 0x7F,
            ValueFormat::Nibbles => {
                let v = value as u8;
                bytes[o] = v & 0x0F;
                bytes[o + 1] = v >> 4;
            }
            ValueFormat::FourteenBit => {
                let v = (value as u16) & 0x3FFF;
                bytes[o] = (v & 0x7F) as u8;
                bytes[o + 1] = (v >> 7) as u8;
            }
        }

        SysExMessage::from_validated(bytes)
    }
}

#[derive(Debug, Clone)]
struct ParameterState {
    label: String,
    min_value: i32,
    max_value: i32,
    step: i32,
    value: i32,
    changed: bool,
    message: SysExMessage,
}

impl ParameterState {
    /// Floors `raw` to a step boundary counted from `min_value`, then clamps into the range
    /// without leaving the step grid.
    fn quantize(&self, raw: i32) -> i32 {
        let min = i64::from(self.min_value);
        let step = i64::from(self.step).abs();
        let offset = (i64::from(raw) - min).div_euclid(step) * step;
        let top = (i64::from(self.max_value) - min).div_euclid(step) * step;

        (min + offset.max(0).min(top)) as i32
    }
}

/// A bounded, quantized synth parameter and its encoded message. Thread safe.
///
/// `changed` is raised whenever the quantized value actually moves and is cleared by whoever
/// consumes the change, normally the transmitter.
pub struct Parameter {
    name: String,
    encoding: Arc<dyn ParameterEncoding>,
    state: Mutex<ParameterState>,
}

impl Parameter {
    pub fn new(
        name: impl Into<String>,
        label: impl Into<String>,
        min_value: i32,
        max_value: i32,
        step: i32,
        value: i32,
        encoding: Arc<dyn ParameterEncoding>,
    ) -> Result<Self> {
        if step == 0 {
            return Err(Error::InvalidStep);
        }
        if min_value > max_value {
            return Err(Error::InvalidRange {
                min: min_value,
                max: max_value,
            });
        }

        let mut state = ParameterState {
            label: label.into(),
            min_value,
            max_value,
            step,
            value: 0,
            changed: false,
            message: encoding.encode(min_value),
        };
        state.value = state.quantize(value);
        state.message = encoding.encode(state.value);

        Ok(Parameter {
            name: name.into(),
            encoding,
            state: Mutex::new(state),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn label(&self) -> String {
        self.state.lock().label.clone()
    }

    pub fn set_label(&self, label: impl Into<String>) {
        self.state.lock().label = label.into();
    }

    pub fn min_value(&self) -> i32 {
        self.state.lock().min_value
    }

    pub fn max_value(&self) -> i32 {
        self.state.lock().max_value
    }

    /// True for two-position parameters, which randomization and automation treat as switches.
    pub fn is_switch(&self) -> bool {
        let state = self.state.lock();
        i64::from(state.max_value) - i64::from(state.min_value) == 1
    }

    pub fn step(&self) -> i32 {
        self.state.lock().step
    }

    /// Changes the quantization step and re-quantizes the current value.
    pub fn set_step(&self, step: i32) -> Result<()> {
        if step == 0 {
            return Err(Error::InvalidStep);
        }
        let mut state = self.state.lock();
        state.step = step;
        let current = state.value;
        self.apply(&mut state, current);

        Ok(())
    }

    pub fn value(&self) -> i32 {
        self.state.lock().value
    }

    /// Returns true if the quantized value moved.
    pub fn set_value(&self, value: i32) -> bool {
        let mut state = self.state.lock();
        self.apply(&mut state, value)
    }

    fn apply(&self, state: &mut ParameterState, raw: i32) -> bool {
        let value = state.quantize(raw);
        if value == state.value {
            return false;
        }
        state.value = value;
        state.changed = true;
        state.message = self.encoding.encode(value);

        true
    }

    pub fn is_changed(&self) -> bool {
        self.state.lock().changed
    }

    pub fn set_changed(&self, changed: bool) {
        self.state.lock().changed = changed;
    }

    /// Clears the changed flag and returns a copy of the parameter as it was, in one step.
    pub fn snapshot_if_changed(&self) -> Option<Parameter> {
        let mut state = self.state.lock();
        if !state.changed {
            return None;
        }
        state.changed = false;

        Some(Parameter {
            name: self.name.clone(),
            encoding: Arc::clone(&self.encoding),
            state: Mutex::new(state.clone()),
        })
    }

    pub fn message(&self) -> SysExMessage {
        self.state.lock().message.clone()
    }
}

impl Clone for Parameter {
    fn clone(&self) -> Self {
        Parameter {
            name: self.name.clone(),
            encoding: Arc::clone(&self.encoding),
            state: Mutex::new(self.state.lock().clone()),
        }
    }
}

impl fmt::Debug for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Parameter")
            .field("name", &self.name)
            .field("min_value", &state.min_value)
            .field("max_value", &state.max_value)
            .field("step", &state.step)
            .field("value", &state.value)
            .field("changed", &state.changed)
            .field("message", &state.message)
            .finish()
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        write!(
            f,
            "Name:{} ,Min:{} ,Max:{} ,Step:{} ,VALUE:{} ,Message:{}",
            self.name, state.min_value, state.max_value, state.step, state.value, state.message
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(format: ValueFormat) -> Arc<dyn ParameterEncoding> {
        let message = SysExMessage::new(vec![0xF0, 0x7D, 0x01, 0x05, 0x00, 0x00, 0xF7]).unwrap();
        Arc::new(SysExTemplate::new(message, 4, format).unwrap())
    }

    fn parameter(min: i32, max: i32, step: i32) -> Parameter {
        Parameter::new("p", "P", min, max, step, min, template(ValueFormat::Nibbles)).unwrap()
    }

    #[test]
    fn test_new_starts_unchanged_with_message() {
        let p = Parameter::new("cutoff", "Cutoff", 0, 127, 1, 64, template(ValueFormat::SevenBit))
            .unwrap();
        assert_eq!(p.value(), 64);
        assert!(!p.is_changed());
        assert_eq!(p.message().get(4), Some(64));
    }

    #[test]
    fn test_zero_step_rejected() {
        let result = Parameter::new("p", "P", 0, 10, 0, 0, template(ValueFormat::SevenBit));
        assert!(matches!(result, Err(Error::InvalidStep)));
    }

    #[test]
    fn test_inverted_range_rejected() {
        let result = Parameter::new("p", "P", 10, 0, 1, 0, template(ValueFormat::SevenBit));
        assert!(matches!(result, Err(Error::InvalidRange { .. })));
    }

    #[test]
    fn test_set_step_zero_keeps_state() {
        let p = parameter(0, 100, 5);
        p.set_value(35);
        p.set_changed(false);

        assert!(matches!(p.set_step(0), Err(Error::InvalidStep)));
        assert_eq!(p.step(), 5);
        assert_eq!(p.value(), 35);
        assert!(!p.is_changed());
    }

    #[test]
    fn test_values_are_quantized_and_clamped() {
        let p = parameter(-10, 47, 4);
        for raw in -40..80 {
            p.set_value(raw);
            let value = p.value();
            assert!(value >= -10 && value <= 47, "{} out of range", value);
            assert_eq!((value + 10) % 4, 0, "{} off the step grid", value);
        }
        p.set_value(1000);
        assert_eq!(p.value(), 46);
        p.set_value(-1000);
        assert_eq!(p.value(), -10);
        p.set_value(-3);
        assert_eq!(p.value(), -6);
    }

    #[test]
    fn test_change_raises_flag_and_updates_message() {
        let p = parameter(0, 127, 1);
        assert!(p.set_value(0x5A));
        assert!(p.is_changed());
        let message = p.message();
        assert_eq!((message.get(4), message.get(5)), (Some(0x0A), Some(0x05)));
    }

    #[test]
    fn test_same_value_leaves_flag_alone() {
        let p = parameter(0, 127, 1);
        p.set_value(10);
        p.set_changed(false);

        assert!(!p.set_value(10));
        assert!(!p.is_changed());

        // 11 quantizes back to 10 with step 2
        p.set_step(2).unwrap();
        assert!(!p.set_value(11));
        assert!(!p.is_changed());
    }

    #[test]
    fn test_clone_is_independent() {
        let p = parameter(0, 127, 1);
        p.set_value(42);
        let copy = p.clone();
        assert_eq!(copy.value(), p.value());
        assert_eq!(copy.message(), p.message());

        copy.set_value(7);
        copy.set_label("Other");
        assert_eq!(p.value(), 42);
        assert_eq!(p.label(), "P");
        assert_ne!(copy.message(), p.message());
    }

    #[test]
    fn test_snapshot_if_changed_clears_flag() {
        let p = parameter(0, 127, 1);
        assert!(p.snapshot_if_changed().is_none());

        p.set_value(3);
        let snapshot = p.snapshot_if_changed().unwrap();
        assert_eq!(snapshot.value(), 3);
        assert!(!p.is_changed());
        assert!(p.snapshot_if_changed().is_none());
    }

    #[test]
    fn test_fourteen_bit_signed_encoding() {
        let p = Parameter::new("detune", "Detune", -63, 63, 1, -1, template(ValueFormat::FourteenBit))
            .unwrap();
        let message = p.message();
        assert_eq!((message.get(4), message.get(5)), (Some(0x7F), Some(0x7F)));
    }

    #[test]
    fn test_template_offset_validated() {
        let message = SysExMessage::new(vec![0xF0, 0x00, 0xF7]).unwrap();
        assert!(SysExTemplate::new(message.clone(), 0, ValueFormat::SevenBit).is_err());
        assert!(SysExTemplate::new(message.clone(), 1, ValueFormat::Nibbles).is_err());
        assert!(SysExTemplate::new(message, 1, ValueFormat::SevenBit).is_ok());
    }

    #[test]
    fn test_is_switch() {
        assert!(parameter(0, 1, 1).is_switch());
        assert!(!parameter(0, 2, 1).is_switch());
    }
}
