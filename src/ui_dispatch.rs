//! Cross-thread delivery of UI intents to the single UI-owning thread.
//!
//! Producers (tray, control plane, signal handlers) hold a cloneable
//! [`UiDispatcher`]. Exactly one thread owns the [`UiEventLoop`] and runs every
//! handler call, so nothing UI-related ever executes elsewhere.

use std::fmt;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub const DEFAULT_QUEUE_CAPACITY: usize = 32;

/// How long the consumer blocks before re-checking its shutdown token.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Intent tags only; handlers read whatever state they need themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiEvent {
    OpenSettings,
    OpenFolder,
    SyncNow,
    Quit,
}

impl fmt::Display for UiEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UiEvent::OpenSettings => "open-settings",
            UiEvent::OpenFolder => "open-folder",
            UiEvent::SyncNow => "sync-now",
            UiEvent::Quit => "quit",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("UI queue is full, dropped {0}")]
    Full(UiEvent),

    #[error("UI thread has exited")]
    Closed,
}

#[derive(Clone)]
pub struct UiDispatcher {
    tx: SyncSender<UiEvent>,
}

impl UiDispatcher {
    /// Enqueue an intent without blocking.
    ///
    /// `Quit` is the exception: it waits for room, because dropping it would
    /// leave the process running.
    pub fn post(&self, event: UiEvent) -> Result<(), DispatchError> {
        if event == UiEvent::Quit {
            return self.tx.send(event).map_err(|_| DispatchError::Closed);
        }

        match self.tx.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(event)) => {
                warn!("UI queue full, dropping {event}");
                Err(DispatchError::Full(event))
            }
            Err(TrySendError::Disconnected(_)) => Err(DispatchError::Closed),
        }
    }
}

/// Receiver of UI intents. Implemented by the UI-owning side.
pub trait UiHandler {
    /// Runs to completion before the next event is dequeued.
    fn open_settings(&mut self);

    fn open_folder(&mut self);

    fn sync_now(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// A `Quit` event was dequeued.
    Quit,
    /// The shutdown token was cancelled.
    Cancelled,
    /// Every dispatcher was dropped.
    Disconnected,
}

pub struct UiEventLoop {
    rx: Receiver<UiEvent>,
}

/// Bounded queue of `capacity` pending intents.
pub fn channel(capacity: usize) -> (UiDispatcher, UiEventLoop) {
    let (tx, rx) = mpsc::sync_channel(capacity.max(1));
    (UiDispatcher { tx }, UiEventLoop { rx })
}

impl UiEventLoop {
    /// Dispatch events in order until `Quit`, cancellation, or disconnect.
    ///
    /// Must be called on the UI-owning thread.
    pub fn run<H: UiHandler>(self, handler: &mut H, shutdown: &CancellationToken) -> LoopExit {
        loop {
            if shutdown.is_cancelled() {
                return LoopExit::Cancelled;
            }

            let event = match self.rx.recv_timeout(POLL_INTERVAL) {
                Ok(event) => event,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return LoopExit::Disconnected,
            };

            debug!("dispatching {event}");
            match event {
                UiEvent::OpenSettings => handler.open_settings(),
                UiEvent::OpenFolder => handler.open_folder(),
                UiEvent::SyncNow => handler.sync_now(),
                UiEvent::Quit => return LoopExit::Quit,
            }
        }
    }
}
