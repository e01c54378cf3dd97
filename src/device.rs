use crate::{
    error::{Error, Result},
    message::MidiMessage,
    router::MidiInputHandler,
};

use log::{info, trace, warn};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Where encoded messages go. Callers check availability before each send and never queue at
/// this layer.
pub trait MidiOutput: Send + Sync {
    fn is_available(&self) -> bool;

    fn send(&self, message: &MidiMessage) -> Result<()>;
}

/// The synth output currently selected, if any. Shared by the transmitter and the forwarder.
pub type OutputSlot = Arc<RwLock<Option<Arc<dyn MidiOutput>>>>;

pub fn empty_output_slot() -> OutputSlot {
    Arc::new(RwLock::new(None))
}

/// Sends `message` if an output is selected and available. A failed send is logged and
/// dropped. Returns whether the message went out.
pub fn send_if_available(slot: &OutputSlot, message: &MidiMessage) -> bool {
    let output = match slot.read().as_ref() {
        Some(output) if output.is_available() => Arc::clone(output),
        _ => {
            trace!("Synth output unavailable, dropping {:?}", message);
            return false;
        }
    };

    match output.send(message) {
        Ok(()) => true,
        Err(e) => {
            warn!("Failed to send MIDI message: {}", e);
            false
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MidiPorts {
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

pub fn list_midi_ports() -> Result<MidiPorts> {
    let midi_in = midir::MidiInput::new("xplorer_midi_scanner").map_err(device_error)?;
    let midi_out = midir::MidiOutput::new("xplorer_midi_scanner").map_err(device_error)?;

    let inputs = midi_in
        .ports()
        .iter()
        .filter_map(|p| midi_in.port_name(p).ok())
        .collect();
    let outputs = midi_out
        .ports()
        .iter()
        .filter_map(|p| midi_out.port_name(p).ok())
        .collect();

    Ok(MidiPorts { inputs, outputs })
}

fn device_error<E: std::fmt::Display>(e: E) -> Error {
    Error::Device(e.to_string())
}

/// A hardware (or virtual) MIDI output port.
pub struct MidiOutputDevice {
    name: String,
    connection: Mutex<Option<midir::MidiOutputConnection>>,
}

impl MidiOutputDevice {
    pub fn connect(port_name: &str) -> Result<Self> {
        let midi_out = midir::MidiOutput::new(&format!("xplorer_midi_out_{}", port_name))
            .map_err(device_error)?;
        let port = midi_out
            .ports()
            .into_iter()
            .find(|p| midi_out.port_name(p).map(|n| n == port_name).unwrap_or(false))
            .ok_or_else(|| Error::Device(format!("MIDI output '{}' not found", port_name)))?;
        let connection = midi_out
            .connect(&port, "xplorer_synth_output")
            .map_err(device_error)?;
        info!("Connected synth output {}", port_name);

        Ok(MidiOutputDevice {
            name: port_name.to_string(),
            connection: Mutex::new(Some(connection)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Releases the port. The device stays unavailable afterwards.
    pub fn close(&self) {
        if let Some(connection) = self.connection.lock().take() {
            connection.close();
            info!("Closed synth output {}", self.name);
        }
    }
}

impl MidiOutput for MidiOutputDevice {
    fn is_available(&self) -> bool {
        self.connection.lock().is_some()
    }

    fn send(&self, message: &MidiMessage) -> Result<()> {
        let mut connection = self.connection.lock();
        let connection = connection
            .as_mut()
            .ok_or_else(|| Error::Device(format!("{} is closed", self.name)))?;

        connection.send(&message.to_bytes()).map_err(device_error)
    }
}

/// A MIDI input port delivering parsed messages to a handler on the driver's thread.
pub struct MidiInputDevice {
    name: String,
    connection: Option<midir::MidiInputConnection<()>>,
    recording: Arc<AtomicBool>,
}

impl MidiInputDevice {
    /// Opens `port_name`. Nothing is delivered until `start_recording`.
    pub fn connect(port_name: &str, handler: Arc<dyn MidiInputHandler>) -> Result<Self> {
        let mut midi_in = midir::MidiInput::new(&format!("xplorer_midi_in_{}", port_name))
            .map_err(device_error)?;
        midi_in.ignore(midir::Ignore::None);

        let port = midi_in
            .ports()
            .into_iter()
            .find(|p| midi_in.port_name(p).map(|n| n == port_name).unwrap_or(false))
            .ok_or_else(|| Error::Device(format!("MIDI input '{}' not found", port_name)))?;

        let recording = Arc::new(AtomicBool::new(false));
        let callback_recording = Arc::clone(&recording);
        let connection = midi_in
            .connect(
                &port,
                "xplorer_input_connection",
                move |_timestamp, bytes, _| {
                    if !callback_recording.load(Ordering::Acquire) {
                        return;
                    }
                    match MidiMessage::parse(bytes) {
                        Ok(message) => handler.handle(message),
                        Err(e) => handler.on_error(&e),
                    }
                },
                (),
            )
            .map_err(device_error)?;
        info!("Connected MIDI input {}", port_name);

        Ok(MidiInputDevice {
            name: port_name.to_string(),
            connection: Some(connection),
            recording,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start_recording(&self) {
        self.recording.store(true, Ordering::Release);
    }

    pub fn stop_recording(&self) {
        self.recording.store(false, Ordering::Release);
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Acquire)
    }

    pub fn close(mut self) {
        self.stop_recording();
        if let Some(connection) = self.connection.take() {
            connection.close();
            info!("Closed MIDI input {}", self.name);
        }
    }
}

/// An output that keeps everything it is sent, with the time it was sent. Used for offline
/// editing and to observe traffic in tests.
#[derive(Default)]
pub struct RecordingOutput {
    unavailable: AtomicBool,
    sent: Mutex<Vec<(Instant, MidiMessage)>>,
}

impl RecordingOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::Release);
    }

    pub fn messages(&self) -> Vec<MidiMessage> {
        self.sent.lock().iter().map(|(_, m)| m.clone()).collect()
    }

    pub fn timestamps(&self) -> Vec<Instant> {
        self.sent.lock().iter().map(|(t, _)| *t).collect()
    }

    pub fn len(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

impl MidiOutput for RecordingOutput {
    fn is_available(&self) -> bool {
        !self.unavailable.load(Ordering::Acquire)
    }

    fn send(&self, message: &MidiMessage) -> Result<()> {
        self.sent.lock().push((Instant::now(), message.clone()));
        Ok(())
    }
}
