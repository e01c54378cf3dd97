use crate::{
    device::{send_if_available, OutputSlot},
    message::MidiMessage,
};

use log::{info, trace, warn};
use tokio::{
    runtime::Handle,
    select,
    sync::{mpsc, oneshot},
    task,
};

/// Sends messages to the synth output from its own task, so MIDI input callbacks never wait
/// on output I/O.
pub struct OutputForwarder {
    message_tx: mpsc::UnboundedSender<MidiMessage>,
    exit_tx: oneshot::Sender<()>,
    join_handle: task::JoinHandle<()>,
}

/// Cheap to clone; handed to whoever needs to forward.
#[derive(Clone, Debug)]
pub struct ForwardHandle {
    message_tx: mpsc::UnboundedSender<MidiMessage>,
}

impl ForwardHandle {
    /// Never blocks. Messages sent after the forwarder closed are dropped.
    pub fn forward(&self, message: MidiMessage) {
        if let Err(mpsc::error::SendError(message)) = self.message_tx.send(message) {
            trace!("Forwarder closed, dropping {:?}", message);
        }
    }
}

impl OutputForwarder {
    pub fn spawn(runtime: &Handle, output: OutputSlot) -> Self {
        let (message_tx, message_rx) = mpsc::unbounded_channel();
        let (exit_tx, exit_rx) = oneshot::channel();
        let join_handle = runtime.spawn(forwarding_task(output, message_rx, exit_rx));

        OutputForwarder {
            message_tx,
            exit_tx,
            join_handle,
        }
    }

    pub fn handle(&self) -> ForwardHandle {
        ForwardHandle {
            message_tx: self.message_tx.clone(),
        }
    }

    /// Sends what is already queued, then ends the task.
    pub async fn close(self) {
        // The task may have ended already if every handle was dropped.
        let _ = self.exit_tx.send(());
        if let Err(e) = self.join_handle.await {
            warn!("Failed to join on forwarding task: {}", e);
        }
    }
}

/// Runs until being told to stop, then flushes messages still waiting in the channel.
async fn forwarding_task(
    output: OutputSlot,
    mut message_rx: mpsc::UnboundedReceiver<MidiMessage>,
    mut exit_rx: oneshot::Receiver<()>,
) {
    loop {
        select! {
            _ = &mut exit_rx => {
                info!("Forwarding task interrupted");
                break;
            },
            message = message_rx.recv() => match message {
                Some(message) => {
                    trace!("Forwarding {:?}", message);
                    send_if_available(&output, &message);
                }
                None => break,
            },
        }
    }

    while let Ok(message) = message_rx.try_recv() {
        send_if_available(&output, &message);
    }
    info!("Flushed forwarding queue");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{empty_output_slot, RecordingOutput};
    use crate::message::{ChannelCommand, ChannelMessage};
    use std::sync::Arc;

    #[test]
    fn test_forwarded_messages_reach_output_in_order() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let output = Arc::new(RecordingOutput::new());
        let slot = empty_output_slot();
        *slot.write() = Some(output.clone());

        let forwarder = OutputForwarder::spawn(runtime.handle(), slot);
        let handle = forwarder.handle();
        let messages: Vec<MidiMessage> = (0..10)
            .map(|note| {
                ChannelMessage::new(ChannelCommand::NoteOn, 0, note, 100)
                    .unwrap()
                    .into()
            })
            .collect();
        for message in messages.iter() {
            handle.forward(message.clone());
        }
        runtime.block_on(forwarder.close());

        assert_eq!(output.messages(), messages);

        // closed: dropped without panicking
        handle.forward(messages[0].clone());
        assert_eq!(output.len(), 10);
    }

    #[test]
    fn test_unavailable_output_drops() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let output = Arc::new(RecordingOutput::new());
        output.set_available(false);
        let slot = empty_output_slot();
        *slot.write() = Some(output.clone());

        let forwarder = OutputForwarder::spawn(runtime.handle(), slot);
        forwarder.handle().forward(MidiMessage::SystemRealtime(0xF8));
        runtime.block_on(forwarder.close());

        assert!(output.is_empty());
    }
}
