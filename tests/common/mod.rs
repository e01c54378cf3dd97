#![allow(dead_code)]

use xplorer::{
    active_tone, empty_output_slot, ActiveTone, OutputSlot, Parameter, ParameterEncoding,
    RecordingOutput, SysExMessage, SysExTemplate, Tone, ValueFormat,
};

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// A tone of `count` parameters named `p0`, `p1`, ..., each with its index in its message.
pub fn numbered_tone(count: usize) -> ActiveTone {
    let parameters = (0..count)
        .map(|i| {
            let template =
                SysExMessage::new(vec![0xF0, 0x7D, 0x01, i as u8, 0x00, 0xF7]).unwrap();
            let encoding: Arc<dyn ParameterEncoding> =
                Arc::new(SysExTemplate::new(template, 4, ValueFormat::SevenBit).unwrap());
            Parameter::new(format!("p{}", i), format!("P {}", i), 0, 127, 1, 0, encoding).unwrap()
        })
        .collect();

    active_tone(Tone::new("numbered", "test", parameters).unwrap())
}

pub fn recording_slot() -> (OutputSlot, Arc<RecordingOutput>) {
    let output = Arc::new(RecordingOutput::new());
    let slot = empty_output_slot();
    *slot.write() = Some(output.clone());

    (slot, output)
}

/// Polls `condition` every few milliseconds until it holds or `timeout` runs out.
pub fn wait_for<F: Fn() -> bool>(timeout: Duration, condition: F) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }

    condition()
}
