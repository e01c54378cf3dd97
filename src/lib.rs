mod config;
mod control_change;
mod controller;
mod device;
mod error;
mod forward;
mod message;
mod models;
mod notification;
mod parameter;
mod persistence;
mod router;
mod sysex;
mod tone;
mod transmit;

pub use config::ControllerConfig;
pub use control_change::{ControlChangeEntry, ControlChangeMap};
pub use controller::{Controller, RANDOM_TONE_NAME};
pub use device::{
    empty_output_slot, list_midi_ports, send_if_available, MidiInputDevice, MidiOutput,
    MidiOutputDevice, MidiPorts, OutputSlot, RecordingOutput,
};
pub use error::{Error, Result};
pub use forward::{ForwardHandle, OutputForwarder};
pub use message::{ChannelCommand, ChannelMessage, MidiMessage, MIDI_CHANNEL_MAX, MIDI_DATA_MAX};
pub use models::{default_registry, GenericSynth};
pub use notification::{ChangeNotifier, ParameterChange};
pub use parameter::{Parameter, ParameterEncoding, SysExTemplate, ValueFormat};
pub use persistence::{
    read_cc_map, read_sysex_file, write_cc_map, write_sysex_file, JsonToneFile, ToneReader,
    ToneWriter,
};
pub use router::{
    scale_controller_value, AutomationGate, AutomationInputRouter, MidiInputHandler,
    SynthInputRouter,
};
pub use sysex::{SysExIterator, SysExMessage, SYSEX_CONTINUATION, SYSEX_START};
pub use tone::{
    active_tone, ActiveTone, RandomizeOptions, Tone, ToneFactory, ToneRegistry,
    DEFAULT_MIDI_CHANNEL,
};
pub use transmit::{
    TransmitQueue, Transmitter, TransmitterEvent, DEFAULT_TRANSMIT_DELAY_MS,
    PARAMETER_QUEUE_DEFAULT_CAPACITY,
};
