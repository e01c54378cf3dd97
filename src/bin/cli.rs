use xplorer::{
    default_registry, list_midi_ports, read_cc_map, Controller, ControllerConfig, JsonToneFile,
    RecordingOutput, Result,
};

use crossbeam_channel as channel;
use log::{error, info};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use structopt::StructOpt;

#[derive(StructOpt, Debug)]
#[structopt(name = "xplorer")]
enum Opt {
    /// Lists MIDI input and output ports.
    List,
    Run {
        /// Synth output port. Without one, messages are only recorded.
        #[structopt(short = "o", long = "output")]
        synth_output: Option<String>,

        /// The synth's own MIDI out, for monitoring.
        #[structopt(short = "s", long = "synth-input")]
        synth_input: Option<String>,

        /// Controller keyboard or sequencer driving the parameters.
        #[structopt(short = "a", long = "automation")]
        automation_input: Option<String>,

        #[structopt(short = "c", long = "config", parse(from_os_str))]
        config_path: Option<PathBuf>,

        #[structopt(short = "m", long = "model")]
        synth_model: Option<String>,

        #[structopt(long = "channel")]
        midi_channel: Option<u8>,

        /// Milliseconds between two parameter messages.
        #[structopt(short = "d", long = "delay")]
        transmit_delay_ms: Option<i64>,

        #[structopt(short = "t", long = "tone", parse(from_os_str))]
        tone_path: Option<PathBuf>,

        /// JSON list of `{ "parameter": ..., "cc": ... }` assignments.
        #[structopt(long = "cc-map", parse(from_os_str))]
        cc_map_path: Option<PathBuf>,
    },
}

fn main() {
    env_logger::init();

    let opt = Opt::from_args();

    // Set SIGINT handler.
    let (exit_tx, exit_rx) = channel::bounded(1);
    ctrlc::set_handler(move || {
        let _ = exit_tx.try_send(());
    })
    .expect("Error setting Ctrl-C handler");

    let result = match opt {
        Opt::List => list(),
        Opt::Run {
            synth_output,
            synth_input,
            automation_input,
            config_path,
            synth_model,
            midi_channel,
            transmit_delay_ms,
            tone_path,
            cc_map_path,
        } => {
            let mut config = match config_path {
                Some(path) => ControllerConfig::from_json_file(&path),
                None => Ok(ControllerConfig::default()),
            };
            if let Ok(config) = config.as_mut() {
                if let Some(model) = synth_model {
                    config.synth_model = model;
                }
                if let Some(channel) = midi_channel {
                    config.midi_channel = channel;
                }
                if let Some(delay) = transmit_delay_ms {
                    config.transmit_delay_ms = delay;
                }
            }
            let devices = Devices {
                synth_output,
                synth_input,
                automation_input,
            };
            config.and_then(|config| run(&config, &devices, tone_path, cc_map_path, exit_rx))
        }
    };

    if let Err(e) = result {
        error!("{}", e);
        eprintln!("xplorer: {}", e);
        process::exit(1);
    }
}

fn list() -> Result<()> {
    let ports = list_midi_ports()?;
    println!("--- Available MIDI input ports ---");
    for (i, name) in ports.inputs.iter().enumerate() {
        println!("{}: {}", i, name);
    }
    println!("--- Available MIDI output ports ---");
    for (i, name) in ports.outputs.iter().enumerate() {
        println!("{}: {}", i, name);
    }

    Ok(())
}

struct Devices {
    synth_output: Option<String>,
    synth_input: Option<String>,
    automation_input: Option<String>,
}

fn run(
    config: &ControllerConfig,
    devices: &Devices,
    tone_path: Option<PathBuf>,
    cc_map_path: Option<PathBuf>,
    exit_rx: channel::Receiver<()>,
) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    let registry = Arc::new(default_registry());
    let controller = Controller::new(runtime.handle(), Arc::clone(&registry), config)?;

    if let Some(path) = cc_map_path {
        for entry in read_cc_map(&path)?.entries() {
            controller.cc_map().add(entry.parameter, entry.cc);
        }
    }
    if let Some(path) = tone_path {
        controller.load_tone(&path, &JsonToneFile::new(registry))?;
    }

    let recording = match devices.synth_output.as_ref() {
        Some(port) => {
            controller.connect_synth_output(port)?;
            None
        }
        None => {
            info!("No synth output given, recording messages instead");
            let recording = Arc::new(RecordingOutput::new());
            controller.set_output(recording.clone());
            Some(recording)
        }
    };
    if let Some(port) = devices.synth_input.as_ref() {
        controller.connect_synth_input(port)?;
    }
    if let Some(port) = devices.automation_input.as_ref() {
        controller.connect_automation_input(port)?;
    }

    controller.start()?;
    info!("Editing {}, press Ctrl-C to quit", controller.tone());

    // Block until SIGINT.
    let _ = exit_rx.recv();

    controller.stop();
    controller.close_devices();
    if let Some(recording) = recording {
        info!("Recorded {} messages", recording.len());
    }

    Ok(())
}
