//! Supervisor event forwarding.
//!
//! The pump thread turns [`HostEvent`]s into DAP events and writes them as
//! soon as no dispatch outcome holds the stop gate, so a response is always
//! written before the stop it caused.

use std::io;
use std::sync::atomic::AtomicU32;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use brew_host::HostEvent;
use crossbeam_channel::{select, unbounded, Receiver, Sender};
use serde_json::Value;
use tracing::{debug, warn};

use crate::protocol::{ExitedEventBody, OutputEventBody, StoppedEventBody, TerminatedEventBody};

use super::core::event_message;
use super::protocol_io::{write_value, ProtocolLog, SharedWriter};
use super::{StopGate, THREAD_ID};

enum PumpControl {
    /// Write every queued event, then acknowledge.
    Flush(Sender<()>),
    Shutdown,
}

pub(super) struct EventPump {
    control: Sender<PumpControl>,
    handle: Option<JoinHandle<()>>,
}

impl EventPump {
    pub(super) fn spawn(
        events: Receiver<HostEvent>,
        stop_gate: StopGate,
        writer: SharedWriter,
        logger: Option<ProtocolLog>,
        seq: Arc<AtomicU32>,
    ) -> io::Result<Self> {
        let (control, control_rx) = unbounded();
        let handle = thread::Builder::new()
            .name("brew-dap-events".into())
            .spawn(move || {
                let write = |event: HostEvent| -> bool {
                    host_event_messages(event, &seq)
                        .iter()
                        .all(|message| write_value(&writer, logger.as_ref(), message).is_ok())
                };
                loop {
                    select! {
                        recv(events) -> event => {
                            let Ok(event) = event else {
                                break;
                            };
                            stop_gate.wait_clear();
                            if !write(event) {
                                warn!("event pump lost its writer");
                                break;
                            }
                        }
                        recv(control_rx) -> message => match message {
                            Ok(PumpControl::Flush(ack)) => {
                                for event in events.try_iter() {
                                    if !write(event) {
                                        break;
                                    }
                                }
                                let _ = ack.send(());
                            }
                            Ok(PumpControl::Shutdown) | Err(_) => break,
                        }
                    }
                }
                debug!("event pump stopped");
            })?;
        Ok(Self {
            control,
            handle: Some(handle),
        })
    }

    /// Block until every event queued so far has been written.
    pub(super) fn flush(&self) {
        let (ack, ack_rx) = unbounded();
        if self.control.send(PumpControl::Flush(ack)).is_ok() {
            let _ = ack_rx.recv();
        }
    }

    pub(super) fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.control.send(PumpControl::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for EventPump {
    fn drop(&mut self) {
        self.stop();
    }
}

/// DAP events for one host event. Exits are followed by `terminated`.
pub(super) fn host_event_messages(event: HostEvent, seq: &AtomicU32) -> Vec<Value> {
    match event {
        HostEvent::Stopped { reason } => vec![event_message(
            seq,
            "stopped",
            Some(StoppedEventBody {
                reason: reason.as_str().to_string(),
                thread_id: Some(THREAD_ID),
                all_threads_stopped: Some(true),
            }),
        )],
        HostEvent::Output { category, text } => vec![event_message(
            seq,
            "output",
            Some(OutputEventBody {
                output: text,
                category: Some(category.as_str().to_string()),
            }),
        )],
        HostEvent::Exited { exit_code } => vec![
            event_message(seq, "exited", Some(ExitedEventBody { exit_code })),
            event_message(seq, "terminated", Some(TerminatedEventBody { restart: None })),
        ],
    }
}
