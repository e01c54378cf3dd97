use crate::{
    error::{Error, Result},
    message::MIDI_CHANNEL_MAX,
    parameter::Parameter,
};

use log::debug;
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// The tone being edited. Swapped wholesale when another tone is loaded, so readers clone the
/// inner `Arc` and never hold the lock while working on parameters.
pub type ActiveTone = Arc<RwLock<Arc<Tone>>>;

pub fn active_tone(tone: Tone) -> ActiveTone {
    Arc::new(RwLock::new(Arc::new(tone)))
}

pub const DEFAULT_MIDI_CHANNEL: u8 = 0;

/// One synthesizer patch: an ordered table of named parameters plus patch metadata.
///
/// The set of parameters is fixed at construction; their values are not.
pub struct Tone {
    model: String,
    name: Mutex<String>,
    midi_channel: AtomicU8,
    parameters: Vec<Arc<Parameter>>,
    index: HashMap<String, usize>,
    morph_eligible: Option<Vec<String>>,
}

impl Tone {
    pub fn new(
        model: impl Into<String>,
        name: impl Into<String>,
        parameters: Vec<Parameter>,
    ) -> Result<Self> {
        let mut index = HashMap::with_capacity(parameters.len());
        for (i, parameter) in parameters.iter().enumerate() {
            if index.insert(parameter.name().to_string(), i).is_some() {
                return Err(Error::DuplicateParameter(parameter.name().to_string()));
            }
        }

        Ok(Tone {
            model: model.into(),
            name: Mutex::new(name.into()),
            midi_channel: AtomicU8::new(DEFAULT_MIDI_CHANNEL),
            parameters: parameters.into_iter().map(Arc::new).collect(),
            index,
            morph_eligible: None,
        })
    }

    /// Restricts morphing to `names`. All parameters are eligible by default.
    pub fn with_morph_eligible<I, S>(mut self, names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if let Some(unknown) = names.iter().find(|n| !self.contains(n)) {
            return Err(Error::UnknownParameter(unknown.clone()));
        }
        self.morph_eligible = Some(names);

        Ok(self)
    }

    /// The synth model this tone was built for. Tones of different models never mix.
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn name(&self) -> String {
        self.name.lock().clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        *self.name.lock() = name.into();
    }

    pub fn midi_channel(&self) -> u8 {
        self.midi_channel.load(Ordering::Relaxed)
    }

    pub fn set_midi_channel(&self, channel: u8) -> Result<()> {
        if channel > MIDI_CHANNEL_MAX {
            return Err(Error::InvalidMidiChannel(channel));
        }
        self.midi_channel.store(channel, Ordering::Relaxed);

        Ok(())
    }

    /// The live parameter. Meant for UI binding and automation; transmission works on copies.
    pub fn parameter(&self, name: &str) -> Option<Arc<Parameter>> {
        self.index.get(name).map(|&i| Arc::clone(&self.parameters[i]))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Parameters in insertion order.
    pub fn parameters(&self) -> impl Iterator<Item = &Arc<Parameter>> {
        self.parameters.iter()
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn eligible_for_morph(&self) -> Vec<String> {
        match &self.morph_eligible {
            Some(names) => names.clone(),
            None => self.parameters.iter().map(|p| p.name().to_string()).collect(),
        }
    }

    /// Gives every non-excluded parameter a new random value and marks it changed, even when
    /// the draw lands on the old value.
    pub fn randomize<R: Rng + ?Sized>(&self, options: &RandomizeOptions, rng: &mut R) {
        for parameter in self.parameters.iter() {
            if options.excluded.contains(parameter.name()) {
                continue;
            }
            let value = next_random_value(parameter, options.humanize_ratio, rng);
            parameter.set_value(value);
            parameter.set_changed(true);
        }
        debug!("Randomized tone {}", self.name());
    }

    /// Writes `round((1 - factor) * a + factor * b)` into `result` for every eligible
    /// parameter. Nothing is written unless all three tones share a model and `factor` is
    /// within [0, 1].
    pub fn morph(a: &Tone, b: &Tone, result: &Tone, factor: f32) -> Result<()> {
        if !(0.0..=1.0).contains(&factor) {
            return Err(Error::InvalidMorphFactor(factor));
        }
        for other in [b, result].iter() {
            if other.model != a.model {
                return Err(Error::ToneMismatch {
                    expected: a.model.clone(),
                    found: other.model.clone(),
                });
            }
        }

        let factor = f64::from(factor);
        let mut values = Vec::new();
        for name in a.eligible_for_morph() {
            let lookup = |tone: &Tone| {
                tone.parameter(&name)
                    .ok_or_else(|| Error::UnknownParameter(name.clone()))
            };
            let (pa, pb, target) = (lookup(a)?, lookup(b)?, lookup(result)?);
            let value = (1.0 - factor) * f64::from(pa.value()) + factor * f64::from(pb.value());
            values.push((target, value.round() as i32));
        }

        for (target, value) in values {
            target.set_value(value);
        }

        Ok(())
    }

    /// `name\t:value` lines in parameter order.
    pub fn dump_values(&self) -> String {
        let mut dump = String::new();
        for parameter in self.parameters.iter() {
            dump.push_str(&format!("{}\t:{}\n", parameter.name(), parameter.value()));
        }

        dump
    }
}

/// Deep copy: the clone owns its own parameters.
impl Clone for Tone {
    fn clone(&self) -> Self {
        Tone {
            model: self.model.clone(),
            name: Mutex::new(self.name()),
            midi_channel: AtomicU8::new(self.midi_channel()),
            parameters: self
                .parameters
                .iter()
                .map(|p| Arc::new(Parameter::clone(p)))
                .collect(),
            index: self.index.clone(),
            morph_eligible: self.morph_eligible.clone(),
        }
    }
}

impl fmt::Debug for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tone")
            .field("model", &self.model)
            .field("name", &self.name())
            .field("midi_channel", &self.midi_channel())
            .field("parameters", &self.parameters.len())
            .finish()
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "ToneName: {} - MIDIChannel: {}",
            self.name(),
            self.midi_channel()
        )?;
        write!(f, "{}", self.dump_values())
    }
}

#[derive(Debug, Clone, Default)]
pub struct RandomizeOptions {
    excluded: HashSet<String>,
    humanize_ratio: Option<f32>,
}

impl RandomizeOptions {
    /// `humanize_ratio` is clamped to [0, 1]. `None` draws from the full parameter range.
    pub fn new(excluded: HashSet<String>, humanize_ratio: Option<f32>) -> Self {
        RandomizeOptions {
            excluded,
            humanize_ratio: humanize_ratio.map(|r| r.max(0.0).min(1.0)),
        }
    }

    pub fn excluded(&self) -> &HashSet<String> {
        &self.excluded
    }

    pub fn humanize_ratio(&self) -> Option<f32> {
        self.humanize_ratio
    }
}

fn next_random_value<R: Rng + ?Sized>(
    parameter: &Parameter,
    humanize_ratio: Option<f32>,
    rng: &mut R,
) -> i32 {
    let (min, max) = (parameter.min_value(), parameter.max_value());

    // Uniform draws over two values rarely flip a switch; toss a coin instead.
    if parameter.is_switch() {
        return if rng.gen_bool(0.5) { max } else { min };
    }

    match humanize_ratio {
        None => rng.gen_range(min..=max),
        Some(ratio) => {
            let value = parameter.value();
            let delta = (f64::from(value).abs() * f64::from(ratio)) as i32;
            let low = value.saturating_sub(delta).max(min);
            let high = value.saturating_add(delta).min(max);
            rng.gen_range(low..=high)
        }
    }
}

/// Builds the tone of one synth model.
pub trait ToneFactory: Send + Sync {
    fn model(&self) -> &str;

    fn create_tone(&self) -> Result<Tone>;
}

/// Synth model name -> tone factory.
#[derive(Default)]
pub struct ToneRegistry {
    factories: HashMap<String, Box<dyn ToneFactory>>,
}

impl ToneRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, factory: Box<dyn ToneFactory>) {
        self.factories.insert(factory.model().to_string(), factory);
    }

    pub fn create_tone(&self, model: &str) -> Result<Tone> {
        self.factories
            .get(model)
            .ok_or_else(|| Error::UnknownSynthModel(model.to_string()))?
            .create_tone()
    }

    pub fn models(&self) -> Vec<&str> {
        let mut models: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        models.sort_unstable();
        models
    }
}
