use crate::{
    config::ControllerConfig,
    control_change::ControlChangeMap,
    device::{MidiInputDevice, MidiOutput, MidiOutputDevice, OutputSlot},
    error::{Error, Result},
    forward::OutputForwarder,
    message::{ChannelCommand, ChannelMessage, MidiMessage},
    notification::{ChangeNotifier, ParameterChange},
    parameter::Parameter,
    persistence::{ToneReader, ToneWriter},
    router::{AutomationGate, AutomationInputRouter, MidiInputHandler, SynthInputRouter},
    tone::{active_tone, ActiveTone, RandomizeOptions, Tone, ToneRegistry},
    transmit::{Transmitter, TransmitterEvent},
};

use crossbeam_channel::Receiver;
use futures::executor::block_on;
use log::{debug, info};
use parking_lot::{Mutex, RwLock};
use rand::{rngs::StdRng, SeedableRng};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

pub const RANDOM_TONE_NAME: &str = "RANDOM";

const NOTE_ON_VELOCITY: u8 = 127;

/// Wires the edited tone to the synth: the transmitter sends parameter changes, the
/// automation input drives parameters, and everything else is forwarded.
pub struct Controller {
    registry: Arc<ToneRegistry>,
    tone: ActiveTone,
    cc_map: Arc<ControlChangeMap>,
    gate: Arc<AutomationGate>,
    notifier: Arc<ChangeNotifier>,
    output: OutputSlot,
    transmitter: Transmitter,
    forwarder: Mutex<Option<OutputForwarder>>,
    synth_output: Mutex<Option<Arc<MidiOutputDevice>>>,
    automation_input: Mutex<Option<MidiInputDevice>>,
    synth_input: Mutex<Option<MidiInputDevice>>,
    rng: Mutex<StdRng>,
}

impl Controller {
    /// Builds the tone of `config.synth_model` and spawns the forwarding task on `runtime`.
    /// The runtime must keep running on its own threads while the controller lives.
    pub fn new(
        runtime: &Handle,
        registry: Arc<ToneRegistry>,
        config: &ControllerConfig,
    ) -> Result<Self> {
        config.validate()?;

        let tone = registry.create_tone(&config.synth_model)?;
        tone.set_midi_channel(config.midi_channel)?;
        let tone = active_tone(tone);

        let output: OutputSlot = Arc::new(RwLock::new(None));
        let transmitter = Transmitter::new(
            Arc::clone(&tone),
            Arc::clone(&output),
            Duration::from_millis(config.transmit_delay_ms as u64),
            config.queue_capacity,
        );
        let forwarder = OutputForwarder::spawn(runtime, Arc::clone(&output));
        debug!("Controller ready for model {}", config.synth_model);

        Ok(Controller {
            registry,
            tone,
            cc_map: Arc::new(ControlChangeMap::new()),
            gate: Arc::new(AutomationGate::new()),
            notifier: Arc::new(ChangeNotifier::new()),
            output,
            transmitter,
            forwarder: Mutex::new(Some(forwarder)),
            synth_output: Mutex::new(None),
            automation_input: Mutex::new(None),
            synth_input: Mutex::new(None),
            rng: Mutex::new(StdRng::from_entropy()),
        })
    }

    pub fn registry(&self) -> &Arc<ToneRegistry> {
        &self.registry
    }

    /// The tone currently edited.
    pub fn tone(&self) -> Arc<Tone> {
        Arc::clone(&*self.tone.read())
    }

    pub fn cc_map(&self) -> &Arc<ControlChangeMap> {
        &self.cc_map
    }

    pub fn subscribe(&self) -> Receiver<ParameterChange> {
        self.notifier.subscribe()
    }

    pub fn subscribe_transmitter(&self) -> Receiver<TransmitterEvent> {
        self.transmitter.subscribe()
    }

    pub fn parameter(&self, name: &str) -> Option<Arc<Parameter>> {
        self.tone.read().parameter(name)
    }

    /// Direct edit. Returns whether the value moved; ignored while a randomize is running.
    pub fn set_parameter(&self, name: &str, value: i32) -> bool {
        if !self.gate.is_enabled() {
            return false;
        }

        match self.parameter(name) {
            Some(parameter) => parameter.set_value(value),
            None => {
                debug!("No parameter named {}", name);
                false
            }
        }
    }

    pub fn set_midi_channel(&self, channel: u8) -> Result<()> {
        self.tone.read().set_midi_channel(channel)
    }

    pub fn set_transmit_delay(&self, delay_ms: i64) -> Result<()> {
        self.transmitter.set_transmit_delay(delay_ms)
    }

    pub fn set_disabled_cc(&self, cc: Option<u8>) {
        self.gate.set_disabled_cc(cc);
    }

    /// Swaps in another tone of the same model and queues all of it for transmission.
    pub fn set_tone(&self, tone: Tone) -> Result<()> {
        let current = self.tone();
        if tone.model() != current.model() {
            return Err(Error::ToneMismatch {
                expected: current.model().to_string(),
                found: tone.model().to_string(),
            });
        }

        let tone = Arc::new(tone);
        *self.tone.write() = Arc::clone(&tone);
        self.mark_all_changed(&tone);
        info!("Switched to tone {}", tone.name());

        Ok(())
    }

    /// Populates the current tone in place. A failed read leaves it as it was.
    pub fn load_tone(&self, path: &Path, reader: &dyn ToneReader) -> Result<()> {
        let tone = self.tone();
        reader.read_tone(path, &tone)?;
        self.notify_all(&tone);

        Ok(())
    }

    /// An unnamed tone takes the name of the file it is saved to.
    pub fn save_tone(&self, path: &Path, writer: &dyn ToneWriter) -> Result<()> {
        let tone = self.tone();
        if tone.name().is_empty() {
            if let Some(stem) = path.file_stem() {
                tone.set_name(stem.to_string_lossy());
            }
        }

        writer.write_tone(path, &tone)
    }

    /// Randomizes the current tone with automation paused and the transmitter restarted, so
    /// the whole new tone goes out.
    pub fn randomize_tone(&self, options: &RandomizeOptions) -> Result<()> {
        self.transmitter.stop();
        self.gate.set_enabled(false);

        let tone = self.tone();
        tone.randomize(options, &mut *self.rng.lock());
        tone.set_name(RANDOM_TONE_NAME);
        self.mark_all_changed(&tone);

        self.gate.set_enabled(true);
        self.transmitter.start()
    }

    /// Morphs `a` and `b` into the current tone.
    pub fn morph_tones(&self, a: &Tone, b: &Tone, factor: f32) -> Result<()> {
        let tone = self.tone();
        Tone::morph(a, b, &tone, factor)?;
        for name in tone.eligible_for_morph() {
            if let Some(parameter) = tone.parameter(&name) {
                self.notifier.notify(&name, parameter.value());
            }
        }

        Ok(())
    }

    /// Sends a note on (or off) on the tone's channel, through the forwarder.
    pub fn play_note(&self, note: u8, on: bool) -> Result<()> {
        let (command, velocity) = if on {
            (ChannelCommand::NoteOn, NOTE_ON_VELOCITY)
        } else {
            (ChannelCommand::NoteOff, 0)
        };
        let message = ChannelMessage::new(command, self.tone.read().midi_channel(), note, velocity)?;
        self.forward(MidiMessage::Channel(message));

        Ok(())
    }

    /// Queues `message` for the synth output without waiting on it.
    pub fn forward(&self, message: MidiMessage) {
        if let Some(forwarder) = self.forwarder.lock().as_ref() {
            forwarder.handle().forward(message);
        }
    }

    fn mark_all_changed(&self, tone: &Tone) {
        for parameter in tone.parameters() {
            parameter.set_changed(true);
            self.notifier.notify(parameter.name(), parameter.value());
        }
    }

    fn notify_all(&self, tone: &Tone) {
        for parameter in tone.parameters() {
            self.notifier.notify(parameter.name(), parameter.value());
        }
    }

    pub fn start(&self) -> Result<()> {
        self.transmitter.start()
    }

    pub fn stop(&self) {
        self.transmitter.stop();
    }

    pub fn is_running(&self) -> bool {
        self.transmitter.is_running()
    }

    /// Handler applying automation to this controller's tone. Fails once devices are closed.
    pub fn automation_router(&self) -> Result<AutomationInputRouter> {
        let forwarder = self.forwarder.lock();
        let forwarder = forwarder
            .as_ref()
            .ok_or_else(|| Error::Device("controller devices are closed".to_string()))?;

        Ok(AutomationInputRouter::new(
            Arc::clone(&self.tone),
            Arc::clone(&self.cc_map),
            Arc::clone(&self.gate),
            Arc::clone(&self.notifier),
            forwarder.handle(),
        ))
    }

    /// Uses `output` as the synth output, replacing the current one.
    pub fn set_output(&self, output: Arc<dyn MidiOutput>) {
        *self.output.write() = Some(output);
    }

    pub fn connect_synth_output(&self, port_name: &str) -> Result<()> {
        let device = Arc::new(MidiOutputDevice::connect(port_name)?);
        self.set_output(device.clone());
        if let Some(previous) = self.synth_output.lock().replace(device) {
            previous.close();
        }

        Ok(())
    }

    pub fn connect_automation_input(&self, port_name: &str) -> Result<()> {
        let router: Arc<dyn MidiInputHandler> = Arc::new(self.automation_router()?);
        let device = MidiInputDevice::connect(port_name, router)?;
        device.start_recording();
        if let Some(previous) = self.automation_input.lock().replace(device) {
            previous.close();
        }

        Ok(())
    }

    pub fn connect_synth_input(&self, port_name: &str) -> Result<()> {
        let device = MidiInputDevice::connect(port_name, Arc::new(SynthInputRouter))?;
        device.start_recording();
        if let Some(previous) = self.synth_input.lock().replace(device) {
            previous.close();
        }

        Ok(())
    }

    /// Stops the transmitter, flushes the forwarder and releases every port.
    pub fn close_devices(&self) {
        self.transmitter.stop();

        for input in [&self.automation_input, &self.synth_input].iter() {
            if let Some(device) = input.lock().take() {
                device.close();
            }
        }

        if let Some(forwarder) = self.forwarder.lock().take() {
            block_on(forwarder.close());
        }

        *self.output.write() = None;
        if let Some(device) = self.synth_output.lock().take() {
            device.close();
        }
        info!("Closed MIDI devices");
    }
}
