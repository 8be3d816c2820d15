//! Periodic message sources for the event loop.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::debug;

use crate::message::AppMessage;

/// A background thread that emits a message every `interval` until dropped.
#[derive(Debug)]
pub struct Ticker {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    /// `make` runs on every tick; returning `None` skips that tick.
    /// The ticker stops when dropped or when the event loop hangs up.
    pub fn spawn<F>(name: &str, interval: Duration, tx: Sender<AppMessage>, make: F) -> Self
    where
        F: Fn() -> Option<AppMessage> + Send + 'static,
    {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let name = name.to_string();
        let handle = thread::spawn(move || loop {
            match stop_rx.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {
                    let Some(message) = make() else {
                        continue;
                    };
                    if tx.send(message).is_err() {
                        debug!(ticker = %name, "event loop gone, ticker exiting");
                        return;
                    }
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
            }
        });
        Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        }
    }

    pub fn stop(&mut self) {
        self.stop_tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}
