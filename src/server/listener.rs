use crate::error::LifecycleError;
use parking_lot::Mutex;
use std::net::SocketAddr;
use tokio::sync::oneshot;

use super::{ListenerKind, ListenerStatus};

type Outcome = Result<(), LifecycleError>;

/// Handles the controller keeps for a live listener.
struct Control {
    stop: oneshot::Sender<()>,
    done: oneshot::Receiver<Outcome>,
    local_addr: Option<SocketAddr>,
}

enum SlotState {
    Idle,
    Starting(Control),
    Running(Control),
    ShuttingDown,
    Stopped,
}

/// The accept loop's side of a listener: it waits on `stop` and reports
/// how draining went on `done`.
pub(crate) struct Lease {
    pub stop: oneshot::Receiver<()>,
    pub done: oneshot::Sender<Outcome>,
}

/// Lifecycle state of one listener.
pub(crate) struct ListenerSlot {
    kind: ListenerKind,
    state: Mutex<SlotState>,
}

impl ListenerSlot {
    pub fn new(kind: ListenerKind) -> Self {
        Self {
            kind,
            state: Mutex::new(SlotState::Idle),
        }
    }

    pub fn status(&self) -> ListenerStatus {
        match &*self.state.lock() {
            SlotState::Idle => ListenerStatus::Idle,
            SlotState::Starting(_) => ListenerStatus::Starting,
            SlotState::Running(_) => ListenerStatus::Running,
            SlotState::ShuttingDown => ListenerStatus::ShuttingDown,
            SlotState::Stopped => ListenerStatus::Stopped,
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &*self.state.lock() {
            SlotState::Running(control) => control.local_addr,
            _ => None,
        }
    }

    /// Idle or Stopped -> Starting.
    pub fn begin(&self) -> Result<Lease, LifecycleError> {
        let mut state = self.state.lock();
        match *state {
            SlotState::Idle | SlotState::Stopped => {}
            _ => return Err(LifecycleError::AlreadyRunning(self.kind.name())),
        }
        let (stop_tx, stop_rx) = oneshot::channel();
        let (done_tx, done_rx) = oneshot::channel();
        *state = SlotState::Starting(Control {
            stop: stop_tx,
            done: done_rx,
            local_addr: None,
        });
        Ok(Lease {
            stop: stop_rx,
            done: done_tx,
        })
    }

    /// Starting -> Running. Leaves any other state alone, so a shutdown
    /// requested during startup wins.
    pub fn running(&self, addr: SocketAddr) {
        let mut state = self.state.lock();
        *state = match std::mem::replace(&mut *state, SlotState::Stopped) {
            SlotState::Starting(mut control) => {
                control.local_addr = Some(addr);
                SlotState::Running(control)
            }
            other => other,
        };
    }

    pub fn stopped(&self) {
        *self.state.lock() = SlotState::Stopped;
    }

    /// Running -> ShuttingDown, then waits for the accept loop to reach
    /// Stopped. A listener that is not live is left as is.
    pub async fn shutdown(&self) -> Outcome {
        let control = {
            let mut state = self.state.lock();
            match std::mem::replace(&mut *state, SlotState::ShuttingDown) {
                SlotState::Starting(control) | SlotState::Running(control) => control,
                other => {
                    *state = other;
                    return Ok(());
                }
            }
        };
        let _ = control.stop.send(());
        match control.done.await {
            Ok(outcome) => outcome,
            // The loop exited on its own before it could report.
            Err(_) => {
                let mut state = self.state.lock();
                if matches!(*state, SlotState::ShuttingDown) {
                    *state = SlotState::Stopped;
                }
                Ok(())
            }
        }
    }
}
