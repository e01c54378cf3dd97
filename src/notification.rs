use crossbeam_channel::{unbounded, Receiver, Sender};
use log::trace;
use parking_lot::Mutex;

/// A parameter took a new value outside of direct editing: automation, randomization or
/// loading a tone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterChange {
    pub name: String,
    pub value: i32,
}

/// Fans parameter changes out to every subscriber. Subscribers that went away are pruned on
/// the next notification.
#[derive(Debug, Default)]
pub struct ChangeNotifier {
    subscribers: Mutex<Vec<Sender<ParameterChange>>>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<ParameterChange> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);

        rx
    }

    pub fn notify(&self, name: &str, value: i32) {
        let change = ParameterChange {
            name: name.to_string(),
            value,
        };
        trace!("Parameter {} -> {}", change.name, change.value);

        self.subscribers
            .lock()
            .retain(|tx| tx.send(change.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}
