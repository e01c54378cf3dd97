use crate::{
    error::{Error, Result},
    sysex::{SysExMessage, SYSEX_CONTINUATION, SYSEX_START},
};

use std::convert::TryFrom;

pub const MIDI_CHANNEL_MAX: u8 = 15;
pub const MIDI_DATA_MAX: u8 = 127;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelCommand {
    NoteOff,
    NoteOn,
    PolyPressure,
    Controller,
    ProgramChange,
    ChannelPressure,
    PitchWheel,
}

impl ChannelCommand {
    fn status_nibble(self) -> u8 {
        match self {
            ChannelCommand::NoteOff => 0x80,
            ChannelCommand::NoteOn => 0x90,
            ChannelCommand::PolyPressure => 0xA0,
            ChannelCommand::Controller => 0xB0,
            ChannelCommand::ProgramChange => 0xC0,
            ChannelCommand::ChannelPressure => 0xD0,
            ChannelCommand::PitchWheel => 0xE0,
        }
    }

    fn data_len(self) -> usize {
        match self {
            ChannelCommand::ProgramChange | ChannelCommand::ChannelPressure => 1,
            _ => 2,
        }
    }
}

/// A channel voice message. `data2` is ignored by one-data-byte commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelMessage {
    pub command: ChannelCommand,
    pub channel: u8,
    pub data1: u8,
    pub data2: u8,
}

impl ChannelMessage {
    pub fn new(command: ChannelCommand, channel: u8, data1: u8, data2: u8) -> Result<Self> {
        if channel > MIDI_CHANNEL_MAX {
            return Err(Error::InvalidMidiChannel(channel));
        }
        if data1 > MIDI_DATA_MAX || data2 > MIDI_DATA_MAX {
            return Err(Error::MalformedMessage(format!(
                "data bytes out of range: {}, {}",
                data1, data2
            )));
        }

        Ok(ChannelMessage {
            command,
            channel,
            data1,
            data2,
        })
    }

    pub fn with_channel(self, channel: u8) -> Self {
        debug_assert!(channel <= MIDI_CHANNEL_MAX);
        ChannelMessage {
            channel: channel & 0x0F,
            ..self
        }
    }

    pub fn status(&self) -> u8 {
        self.command.status_nibble() | (self.channel & 0x0F)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![self.status(), self.data1 & 0x7F];
        if self.command.data_len() == 2 {
            bytes.push(self.data2 & 0x7F);
        }

        bytes
    }

    fn from_wmidi(message: &wmidi::MidiMessage<'_>) -> Option<Self> {
        use wmidi::MidiMessage as M;

        let (command, channel, data1, data2) = match message {
            M::NoteOff(channel, note, velocity) => (
                ChannelCommand::NoteOff,
                channel,
                u8::from(*note),
                u8::from(*velocity),
            ),
            M::NoteOn(channel, note, velocity) => (
                ChannelCommand::NoteOn,
                channel,
                u8::from(*note),
                u8::from(*velocity),
            ),
            M::PolyphonicKeyPressure(channel, note, pressure) => (
                ChannelCommand::PolyPressure,
                channel,
                u8::from(*note),
                u8::from(*pressure),
            ),
            M::ControlChange(channel, function, value) => (
                ChannelCommand::Controller,
                channel,
                u8::from(function.0),
                u8::from(*value),
            ),
            M::ProgramChange(channel, program) => {
                (ChannelCommand::ProgramChange, channel, u8::from(*program), 0)
            }
            M::ChannelPressure(channel, pressure) => (
                ChannelCommand::ChannelPressure,
                channel,
                u8::from(*pressure),
                0,
            ),
            M::PitchBendChange(channel, bend) => {
                let bend = u16::from(*bend);
                (
                    ChannelCommand::PitchWheel,
                    channel,
                    (bend & 0x7F) as u8,
                    (bend >> 7) as u8,
                )
            }
            _ => return None,
        };

        Some(ChannelMessage {
            command,
            channel: channel.index(),
            data1,
            data2,
        })
    }
}

/// Any message an input device can deliver or an output device can send, split in the four
/// categories input handlers react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MidiMessage {
    Channel(ChannelMessage),
    SysEx(SysExMessage),
    SystemCommon(Vec<u8>),
    SystemRealtime(u8),
}

impl MidiMessage {
    /// Parses one complete raw message as delivered by the MIDI driver.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let status = *bytes
            .first()
            .ok_or_else(|| Error::MalformedMessage("empty message".to_string()))?;

        match status {
            SYSEX_START | SYSEX_CONTINUATION => Ok(MidiMessage::SysEx(SysExMessage::new(bytes)?)),
            0xF1..=0xF6 => Ok(MidiMessage::SystemCommon(bytes.to_vec())),
            0xF8..=0xFF => Ok(MidiMessage::SystemRealtime(status)),
            0x80..=0xEF => {
                let message = wmidi::MidiMessage::try_from(bytes)
                    .map_err(|e| Error::MalformedMessage(format!("{:?}", e)))?;
                ChannelMessage::from_wmidi(&message)
                    .map(MidiMessage::Channel)
                    .ok_or_else(|| {
                        Error::MalformedMessage(format!("unsupported message {:02X?}", bytes))
                    })
            }
            _ => Err(Error::MalformedMessage(format!(
                "running status is not supported: {:02X?}",
                bytes
            ))),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            MidiMessage::Channel(message) => message.to_bytes(),
            MidiMessage::SysEx(message) => message.as_bytes().to_vec(),
            MidiMessage::SystemCommon(bytes) => bytes.clone(),
            MidiMessage::SystemRealtime(status) => vec![*status],
        }
    }
}

impl From<ChannelMessage> for MidiMessage {
    fn from(message: ChannelMessage) -> Self {
        MidiMessage::Channel(message)
    }
}

impl From<SysExMessage> for MidiMessage {
    fn from(message: SysExMessage) -> Self {
        MidiMessage::SysEx(message)
    }
}
