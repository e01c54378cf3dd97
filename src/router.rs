use crate::{
    control_change::ControlChangeMap,
    error::Error,
    forward::ForwardHandle,
    message::{ChannelCommand, ChannelMessage, MidiMessage},
    notification::ChangeNotifier,
    sysex::SysExMessage,
    tone::ActiveTone,
};

use log::{error, trace};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

/// Callbacks of a MIDI input device, one per message category. Everything defaults to doing
/// nothing, except errors which are logged.
pub trait MidiInputHandler: Send + Sync {
    fn on_channel_message(&self, _message: ChannelMessage) {}

    fn on_sysex(&self, _message: SysExMessage) {}

    fn on_system_common(&self, _bytes: Vec<u8>) {}

    fn on_system_realtime(&self, _status: u8) {}

    /// Device errors never tear the device down.
    fn on_error(&self, error: &Error) {
        error!("MIDI input error: {}", error);
    }

    fn handle(&self, message: MidiMessage) {
        match message {
            MidiMessage::Channel(message) => self.on_channel_message(message),
            MidiMessage::SysEx(message) => self.on_sysex(message),
            MidiMessage::SystemCommon(bytes) => self.on_system_common(bytes),
            MidiMessage::SystemRealtime(status) => self.on_system_realtime(status),
        }
    }
}

/// Listens to the synth's own MIDI out. Ignores everything, errors included; wrap or replace
/// it to react to hardware-originated changes.
#[derive(Debug, Default)]
pub struct SynthInputRouter;

impl MidiInputHandler for SynthInputRouter {
    fn on_error(&self, _error: &Error) {}
}

const NO_DISABLED_CC: u8 = u8::MAX;

/// Switches for the automation input, flipped from the editing side.
#[derive(Debug)]
pub struct AutomationGate {
    disabled_cc: AtomicU8,
    enabled: AtomicBool,
}

impl AutomationGate {
    pub fn new() -> Self {
        AutomationGate {
            disabled_cc: AtomicU8::new(NO_DISABLED_CC),
            enabled: AtomicBool::new(true),
        }
    }

    /// Suppresses one controller, typically while the user drags the matching control.
    pub fn set_disabled_cc(&self, cc: Option<u8>) {
        self.disabled_cc
            .store(cc.unwrap_or(NO_DISABLED_CC), Ordering::Release);
    }

    pub fn disabled_cc(&self) -> Option<u8> {
        match self.disabled_cc.load(Ordering::Acquire) {
            NO_DISABLED_CC => None,
            cc => Some(cc),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }
}

impl Default for AutomationGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Maps a 0..=127 controller value into `[min, max]`. Two-position ranges switch above 63.
pub fn scale_controller_value(min: i32, max: i32, value: u8) -> i32 {
    let span = i64::from(max) - i64::from(min);
    if span == 1 {
        return if value > 63 { max } else { min };
    }

    (i64::from(min) + i64::from(value) * span / 127) as i32
}

/// Applies mapped controllers to the active tone and forwards everything else to the synth.
pub struct AutomationInputRouter {
    tone: ActiveTone,
    cc_map: Arc<ControlChangeMap>,
    gate: Arc<AutomationGate>,
    notifier: Arc<ChangeNotifier>,
    forwarder: ForwardHandle,
}

impl AutomationInputRouter {
    pub fn new(
        tone: ActiveTone,
        cc_map: Arc<ControlChangeMap>,
        gate: Arc<AutomationGate>,
        notifier: Arc<ChangeNotifier>,
        forwarder: ForwardHandle,
    ) -> Self {
        AutomationInputRouter {
            tone,
            cc_map,
            gate,
            notifier,
            forwarder,
        }
    }

    fn apply_controller(&self, cc: u8, value: u8) -> bool {
        let names = self.cc_map.lookup_by_cc(cc);
        if names.is_empty() {
            return false;
        }
        if !self.gate.is_enabled() {
            trace!("Automation paused, ignoring CC {}", cc);
            return true;
        }

        let tone = Arc::clone(&*self.tone.read());
        for name in names.iter() {
            match tone.parameter(name) {
                Some(parameter) => {
                    let scaled =
                        scale_controller_value(parameter.min_value(), parameter.max_value(), value);
                    parameter.set_value(scaled);
                    self.notifier.notify(name, parameter.value());
                }
                None => trace!("CC {} mapped to unknown parameter {}", cc, name),
            }
        }

        true
    }
}

impl MidiInputHandler for AutomationInputRouter {
    fn on_channel_message(&self, message: ChannelMessage) {
        if message.command == ChannelCommand::Controller {
            if self.gate.disabled_cc() == Some(message.data1) {
                trace!("CC {} disabled, dropping", message.data1);
                return;
            }
            if self.apply_controller(message.data1, message.data2) {
                return;
            }
        }

        let channel = self.tone.read().midi_channel();
        self.forwarder
            .forward(MidiMessage::Channel(message.with_channel(channel)));
    }

    fn on_sysex(&self, message: SysExMessage) {
        self.forwarder.forward(MidiMessage::SysEx(message));
    }

    fn on_system_common(&self, bytes: Vec<u8>) {
        self.forwarder.forward(MidiMessage::SystemCommon(bytes));
    }

    fn on_system_realtime(&self, status: u8) {
        self.forwarder.forward(MidiMessage::SystemRealtime(status));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{empty_output_slot, RecordingOutput};
    use crate::forward::OutputForwarder;
    use crate::models::GenericSynth;
    use crate::tone::{active_tone, ToneFactory};

    struct Fixture {
        runtime: tokio::runtime::Runtime,
        forwarder: OutputForwarder,
        output: Arc<RecordingOutput>,
        tone: ActiveTone,
        cc_map: Arc<ControlChangeMap>,
        gate: Arc<AutomationGate>,
        notifier: Arc<ChangeNotifier>,
        router: AutomationInputRouter,
    }

    fn fixture() -> Fixture {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let output = Arc::new(RecordingOutput::new());
        let slot = empty_output_slot();
        *slot.write() = Some(output.clone());
        let forwarder = OutputForwarder::spawn(runtime.handle(), slot);

        let tone = active_tone(GenericSynth.create_tone().unwrap());
        let cc_map = Arc::new(ControlChangeMap::new());
        let gate = Arc::new(AutomationGate::new());
        let notifier = Arc::new(ChangeNotifier::new());
        let router = AutomationInputRouter::new(
            Arc::clone(&tone),
            Arc::clone(&cc_map),
            Arc::clone(&gate),
            Arc::clone(&notifier),
            forwarder.handle(),
        );

        Fixture {
            runtime,
            forwarder,
            output,
            tone,
            cc_map,
            gate,
            notifier,
            router,
        }
    }

    impl Fixture {
        /// Closes the forwarder and returns what reached the output.
        fn finish(self) -> Vec<MidiMessage> {
            let Fixture {
                runtime,
                forwarder,
                output,
                ..
            } = self;
            runtime.block_on(forwarder.close());
            output.messages()
        }
    }

    fn cc(channel: u8, controller: u8, value: u8) -> MidiMessage {
        ChannelMessage::new(ChannelCommand::Controller, channel, controller, value)
            .unwrap()
            .into()
    }

    #[test]
    fn test_switch_scaling_threshold() {
        for value in 0..=63 {
            assert_eq!(scale_controller_value(0, 1, value), 0);
        }
        for value in 64..=127 {
            assert_eq!(scale_controller_value(0, 1, value), 1);
        }
    }

    #[test]
    fn test_linear_scaling_hits_both_ends() {
        assert_eq!(scale_controller_value(0, 63, 0), 0);
        assert_eq!(scale_controller_value(0, 63, 127), 63);
        assert_eq!(scale_controller_value(-512, 511, 0), -512);
        assert_eq!(scale_controller_value(-512, 511, 127), 511);
        assert_eq!(scale_controller_value(0, 127, 64), 64);
    }

    #[test]
    fn test_mapped_cc_sets_parameters_and_notifies() {
        let f = fixture();
        f.cc_map.add("filter_cutoff", 74);
        f.cc_map.add("osc_sync", 74);
        let changes = f.notifier.subscribe();

        f.router.handle(cc(0, 74, 90));

        let tone = Arc::clone(&*f.tone.read());
        assert_eq!(tone.parameter("filter_cutoff").unwrap().value(), 90);
        assert_eq!(tone.parameter("osc_sync").unwrap().value(), 1);
        let names: Vec<_> = changes.try_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["filter_cutoff", "osc_sync"]);
        assert!(f.finish().is_empty());
    }

    #[test]
    fn test_disabled_cc_is_dropped() {
        let f = fixture();
        f.cc_map.add("filter_cutoff", 74);
        f.gate.set_disabled_cc(Some(74));

        f.router.handle(cc(0, 74, 5));

        let cutoff = f.tone.read().parameter("filter_cutoff").unwrap();
        assert_eq!(cutoff.value(), 100);
        assert!(f.finish().is_empty());
    }

    #[test]
    fn test_paused_automation_ignores_mapped_cc() {
        let f = fixture();
        f.cc_map.add("filter_cutoff", 74);
        f.gate.set_enabled(false);

        f.router.handle(cc(0, 74, 5));

        assert_eq!(f.tone.read().parameter("filter_cutoff").unwrap().value(), 100);
        assert!(f.finish().is_empty());
    }

    #[test]
    fn test_unmapped_messages_forwarded_on_tone_channel() {
        let f = fixture();
        f.tone.read().set_midi_channel(5).unwrap();
        let sysex = SysExMessage::new(vec![0xF0, 0x01, 0xF7]).unwrap();

        f.router.handle(cc(2, 1, 64));
        f.router.handle(MidiMessage::SysEx(sysex.clone()));
        f.router.handle(MidiMessage::SystemRealtime(0xFA));

        assert_eq!(
            f.finish(),
            vec![
                cc(5, 1, 64),
                MidiMessage::SysEx(sysex),
                MidiMessage::SystemRealtime(0xFA),
            ]
        );
    }

    #[test]
    fn test_synth_router_ignores_everything() {
        let router = SynthInputRouter;
        router.handle(cc(0, 1, 1));
        router.on_error(&Error::MalformedMessage("test".to_string()));
    }
}
