//! Per-task FIFO carrying progress lines from the worker thread to the UI loop.
//!
//! The sending half is cheap to clone and may be used from any thread. The
//! receiving half is owned by the controlling thread and is only ever read
//! with non-blocking `try_recv`, so a drain pass can never stall the event
//! loop. A new channel is created for every task; dropping the receiver of a
//! finished task discards whatever it still held.

use tokio::sync::mpsc::{self, error::TryRecvError};

/// Create a fresh, empty log channel.
pub fn channel() -> (LogSender, LogReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (LogSender { tx }, LogReceiver { rx })
}

/// Producer half of a [`channel`].
#[derive(Debug, Clone)]
pub struct LogSender {
    tx: mpsc::UnboundedSender<String>,
}

impl LogSender {
    /// Enqueue one line. Returns `false` once the receiver has been dropped,
    /// in which case the line is discarded.
    pub fn send(&self, line: impl Into<String>) -> bool {
        self.tx.send(line.into()).is_ok()
    }

    /// Whether the consuming side has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half of a [`channel`].
#[derive(Debug)]
pub struct LogReceiver {
    rx: mpsc::UnboundedReceiver<String>,
}

impl LogReceiver {
    /// Pop the oldest queued line, if any, without blocking.
    pub fn try_next(&mut self) -> Option<String> {
        match self.rx.try_recv() {
            Ok(line) => Some(line),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Pop up to `max` lines in arrival order.
    pub fn drain(&mut self, max: usize) -> Vec<String> {
        let mut lines = Vec::with_capacity(max.min(64));
        while lines.len() < max {
            match self.try_next() {
                Some(line) => lines.push(line),
                None => break,
            }
        }
        lines
    }

    /// Pop everything currently queued.
    pub fn drain_all(&mut self) -> Vec<String> {
        self.drain(usize::MAX)
    }

    /// Throw away everything currently queued and report how much was dropped.
    pub fn discard_pending(&mut self) -> usize {
        let mut dropped = 0;
        while self.try_next().is_some() {
            dropped += 1;
        }
        dropped
    }
}
