use crate::error::{Error, Result};

use std::convert::TryFrom;
use std::fmt;

pub const SYSEX_START: u8 = 0xF0;

/// Terminates a message, or starts a continuation packet.
pub const SYSEX_CONTINUATION: u8 = 0xF7;

/// A MIDI System Exclusive message. The first byte is always 0xF0 or 0xF7.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SysExMessage {
    data: Vec<u8>,
}

impl SysExMessage {
    pub fn new(data: impl Into<Vec<u8>>) -> Result<Self> {
        let data = data.into();
        match data.first() {
            None => Err(Error::MalformedSysEx("message is empty")),
            Some(&SYSEX_START) | Some(&SYSEX_CONTINUATION) => Ok(SysExMessage { data }),
            Some(_) => Err(Error::MalformedSysEx("unknown status byte")),
        }
    }

    /// Only for buffers copied from an already valid message with the status byte untouched.
    pub(crate) fn from_validated(data: Vec<u8>) -> Self {
        debug_assert!(matches!(
            data.first(),
            Some(&SYSEX_START) | Some(&SYSEX_CONTINUATION)
        ));

        SysExMessage { data }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Always false, a valid message holds at least its status byte.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<u8> {
        self.data.get(index).copied()
    }

    pub fn set(&mut self, index: usize, byte: u8) -> Result<()> {
        if index == 0 && byte != SYSEX_START && byte != SYSEX_CONTINUATION {
            return Err(Error::MalformedSysEx("unknown status byte"));
        }
        let slot = self
            .data
            .get_mut(index)
            .ok_or(Error::MalformedSysEx("index out of range"))?;
        *slot = byte;

        Ok(())
    }
}

impl TryFrom<&[u8]> for SysExMessage {
    type Error = Error;

    fn try_from(data: &[u8]) -> Result<Self> {
        SysExMessage::new(data)
    }
}

impl TryFrom<Vec<u8>> for SysExMessage {
    type Error = Error;

    fn try_from(data: Vec<u8>) -> Result<Self> {
        SysExMessage::new(data)
    }
}

impl fmt::Display for SysExMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.data.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{:02X}", byte)?;
        }

        Ok(())
    }
}

impl fmt::Debug for SysExMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SysExMessage[{}]", self)
    }
}

/// Splits a raw dump (e.g. the content of a `.syx` file) into SysEx messages.
///
/// Bytes before a start byte are skipped. A message runs up to and including the next 0xF7.
/// Trailing data without a terminator yields nothing.
pub struct SysExIterator<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> SysExIterator<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        SysExIterator { data, position: 0 }
    }
}

impl<'a> Iterator for SysExIterator<'a> {
    type Item = SysExMessage;

    fn next(&mut self) -> Option<SysExMessage> {
        let rest = &self.data[self.position.min(self.data.len())..];
        let start = rest.iter().position(|&b| b == SYSEX_START)?;
        let length = rest[start..].iter().position(|&b| b == SYSEX_CONTINUATION)?;

        let message = rest[start..=start + length].to_vec();
        self.position += start + length + 1;

        Some(SysExMessage::from_validated(message))
    }
}
