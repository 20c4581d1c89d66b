//! Cooperative cancellation for in-flight effects.
//!
//! A [`CancelHandle`] owns the sending half of a channel that never carries a
//! value. Cancelling drops it, which disconnects every [`CancelToken`] and wakes
//! any thread blocked in [`CancelToken::sleep`] immediately.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Cancels the paired token.
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
    signal: Mutex<Option<Sender<()>>>,
}

/// Observes cancellation.
#[derive(Clone)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    signal: Receiver<()>,
}

/// Create a linked handle and token.
pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let flag = Arc::new(AtomicBool::new(false));
    let (sender, receiver) = bounded(0);
    (
        CancelHandle {
            flag: Arc::clone(&flag),
            signal: Mutex::new(Some(sender)),
        },
        CancelToken {
            flag,
            signal: receiver,
        },
    )
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.signal.lock().take();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

impl Drop for CancelHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Sleep for `delay` unless cancelled first.
    ///
    /// Returns true if the full delay elapsed.
    pub fn sleep(&self, delay: Duration) -> bool {
        if self.is_cancelled() {
            return false;
        }
        match self.signal.recv_timeout(delay) {
            Err(RecvTimeoutError::Timeout) => !self.is_cancelled(),
            Ok(()) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }
}
