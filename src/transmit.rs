use crate::{
    device::{send_if_available, OutputSlot},
    error::{Error, Result},
    message::MidiMessage,
    parameter::Parameter,
    tone::ActiveTone,
};

use crossbeam_channel::{self as channel, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub const PARAMETER_QUEUE_DEFAULT_CAPACITY: usize = 200;
pub const DEFAULT_TRANSMIT_DELAY_MS: u64 = 20;

const STOP_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// FIFO of parameter snapshots waiting to be sent. The capacity is a hint, not a bound.
#[derive(Debug)]
pub struct TransmitQueue {
    queue: Mutex<VecDeque<Parameter>>,
}

impl TransmitQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        TransmitQueue {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn push(&self, parameter: Parameter) {
        self.queue.lock().push_back(parameter);
    }

    pub fn pop(&self) -> Option<Parameter> {
        self.queue.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.queue.lock().clear();
    }
}

impl Default for TransmitQueue {
    fn default() -> Self {
        Self::with_capacity(PARAMETER_QUEUE_DEFAULT_CAPACITY)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmitterEvent {
    Started,
    Stopped,
}

struct Shared {
    tone: ActiveTone,
    output: OutputSlot,
    queue: TransmitQueue,
    delay_ms: AtomicU64,
    ticks: AtomicU64,
    listeners: Mutex<Vec<Sender<TransmitterEvent>>>,
}

impl Shared {
    fn emit(&self, event: TransmitterEvent) {
        self.listeners.lock().retain(|tx| tx.send(event).is_ok());
    }

    fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms.load(Ordering::Relaxed))
    }

    /// One transmission step: snapshot every changed parameter in order, then send at most
    /// one queued snapshot.
    fn tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);

        let tone = Arc::clone(&*self.tone.read());
        for parameter in tone.parameters() {
            if let Some(snapshot) = parameter.snapshot_if_changed() {
                self.queue.push(snapshot);
            }
        }

        if let Some(parameter) = self.queue.pop() {
            send_if_available(&self.output, &MidiMessage::SysEx(parameter.message()));
        }
    }
}

struct Worker {
    stop_tx: Sender<()>,
    done_rx: Receiver<()>,
    handle: thread::JoinHandle<()>,
    /// Raised by the worker when its loop ended on a fault rather than a stop request.
    failed: Arc<AtomicBool>,
}

#[derive(Default)]
struct WorkerState {
    worker: Option<Worker>,
    disposed: bool,
}

impl WorkerState {
    /// Drops a worker whose loop already died, so the transmitter reads as stopped.
    fn reap_failed(&mut self, queue: &TransmitQueue) {
        let failed = match self.worker.as_ref() {
            Some(worker) => worker.failed.load(Ordering::Acquire),
            None => false,
        };
        if !failed {
            return;
        }

        if let Some(worker) = self.worker.take() {
            if worker.handle.join().is_err() {
                warn!("Transmitter thread panicked");
            }
        }
        queue.clear();
        debug!("Reaped failed transmitter worker");
    }
}

/// Background sender of parameter changes, one message per tick at most.
///
/// Changing a parameter never sends anything by itself. The worker finds it changed on its
/// next scan, so edits are rate limited to `1000 / delay_ms` messages per second.
pub struct Transmitter {
    shared: Arc<Shared>,
    state: Mutex<WorkerState>,
}

impl Transmitter {
    pub fn new(
        tone: ActiveTone,
        output: OutputSlot,
        delay: Duration,
        queue_capacity: usize,
    ) -> Self {
        Transmitter {
            shared: Arc::new(Shared {
                tone,
                output,
                queue: TransmitQueue::with_capacity(queue_capacity),
                delay_ms: AtomicU64::new(delay.as_millis() as u64),
                ticks: AtomicU64::new(0),
                listeners: Mutex::new(Vec::new()),
            }),
            state: Mutex::new(WorkerState::default()),
        }
    }

    pub fn subscribe(&self) -> Receiver<TransmitterEvent> {
        let (tx, rx) = channel::unbounded();
        self.shared.listeners.lock().push(tx);

        rx
    }

    pub fn delay(&self) -> Duration {
        self.shared.delay()
    }

    /// Takes effect from the next tick.
    pub fn set_transmit_delay(&self, delay_ms: i64) -> Result<()> {
        if delay_ms < 0 {
            return Err(Error::InvalidTransmitDelay(delay_ms));
        }
        self.shared.delay_ms.store(delay_ms as u64, Ordering::Relaxed);

        Ok(())
    }

    /// False as soon as the loop has ended, including after a fault.
    pub fn is_running(&self) -> bool {
        let mut state = self.state.lock();
        state.reap_failed(&self.shared.queue);
        state.worker.is_some()
    }

    /// Ticks since the last `start`.
    pub fn tick_count(&self) -> u64 {
        self.shared.ticks.load(Ordering::Relaxed)
    }

    pub fn queue_len(&self) -> usize {
        self.shared.queue.len()
    }

    pub fn start(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.disposed {
            return Err(Error::TransmitterDisposed);
        }
        state.reap_failed(&self.shared.queue);
        if state.worker.is_some() {
            return Ok(());
        }

        self.shared.queue.clear();
        self.shared.ticks.store(0, Ordering::Relaxed);
        self.shared.emit(TransmitterEvent::Started);

        let (stop_tx, stop_rx) = channel::bounded(1);
        let (done_tx, done_rx) = channel::bounded(1);
        let failed = Arc::new(AtomicBool::new(false));
        let shared = Arc::clone(&self.shared);
        let worker_failed = Arc::clone(&failed);
        let handle = thread::Builder::new()
            .name("xplorer-transmitter".to_string())
            .spawn(move || run_worker(shared, stop_rx, done_tx, worker_failed))?;

        state.worker = Some(Worker {
            stop_tx,
            done_rx,
            handle,
            failed,
        });
        info!("Transmitter started, {:?} per message", self.shared.delay());

        Ok(())
    }

    /// Asks the worker to finish and waits a bounded time for it. A worker that does not
    /// answer in time is left to exit on its own.
    pub fn stop(&self) {
        let worker = match self.state.lock().worker.take() {
            Some(worker) => worker,
            None => return,
        };

        self.shared.queue.clear();
        // The worker may already be gone.
        let _ = worker.stop_tx.try_send(());

        match worker.done_rx.recv_timeout(STOP_JOIN_TIMEOUT) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if worker.handle.join().is_err() {
                    warn!("Transmitter thread panicked");
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "Transmitter did not stop within {:?}, abandoning it",
                    STOP_JOIN_TIMEOUT
                );
            }
        }

        self.shared.queue.clear();
        // A failed worker already announced its stop.
        if !worker.failed.load(Ordering::Acquire) {
            self.shared.emit(TransmitterEvent::Stopped);
        }
        info!("Transmitter stopped");
    }

    /// Stops for good. Later calls to `start` fail.
    pub fn dispose(&self) {
        self.stop();
        self.state.lock().disposed = true;
        debug!("Transmitter disposed");
    }
}

impl Drop for Transmitter {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_worker(
    shared: Arc<Shared>,
    stop_rx: Receiver<()>,
    done_tx: Sender<()>,
    failed: Arc<AtomicBool>,
) {
    loop {
        match stop_rx.recv_timeout(shared.delay()) {
            Err(RecvTimeoutError::Timeout) => (),
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }

        if let Err(e) = panic::catch_unwind(AssertUnwindSafe(|| shared.tick())) {
            let reason = e
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| e.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown".to_string());
            error!("Transmitter loop failed, stopping: {}", reason);
            failed.store(true, Ordering::Release);
            shared.emit(TransmitterEvent::Stopped);
            break;
        }
    }

    let _ = done_tx.send(());
}
