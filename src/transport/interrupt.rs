//! Cancellable socket reads for the HTTP transport.
//!
//! `ureq` performs a call entirely on the calling thread, so the cancel token
//! of the call in progress is parked in a thread-local for its duration. The
//! connector wraps every transport it opens so that reads wait in short
//! slices and fail as soon as that token fires. A failed read makes `ureq`
//! drop the connection instead of returning it to the pool, which closes the
//! socket.

use crate::cancel::CancelToken;
use std::cell::RefCell;
use std::io;
use std::time::{Duration, Instant};
use ureq::unversioned::transport::{
    Buffers, ConnectionDetails, Connector, DefaultConnector, NextTimeout, Transport,
};

/// Longest a blocked read goes without looking at the cancel token.
const CANCEL_POLL: Duration = Duration::from_millis(100);

thread_local! {
    static CURRENT: RefCell<Option<CancelToken>> = const { RefCell::new(None) };
}

/// Run `call` with `token` watching every read it makes.
pub(super) fn with_cancel<T>(token: &CancelToken, call: impl FnOnce() -> T) -> T {
    struct Reset(Option<CancelToken>);

    impl Drop for Reset {
        fn drop(&mut self) {
            let previous = self.0.take();
            CURRENT.with(|current| *current.borrow_mut() = previous);
        }
    }

    let previous = CURRENT.with(|current| current.borrow_mut().replace(token.clone()));
    let _reset = Reset(previous);
    call()
}

fn cancelled() -> bool {
    CURRENT.with(|current| current.borrow().as_ref().is_some_and(CancelToken::is_cancelled))
}

fn cancelled_error() -> ureq::Error {
    ureq::Error::Io(io::Error::new(io::ErrorKind::ConnectionAborted, "long-poll cancelled"))
}

/// The default `ureq` connector chain with cancellable transports on top.
#[derive(Debug, Default)]
pub(super) struct InterruptibleConnector {
    inner: DefaultConnector,
}

impl Connector<()> for InterruptibleConnector {
    type Out = InterruptibleTransport;

    fn connect(
        &self,
        details: &ConnectionDetails,
        chained: Option<()>,
    ) -> Result<Option<Self::Out>, ureq::Error> {
        if cancelled() {
            return Err(cancelled_error());
        }
        Ok(self
            .inner
            .connect(details, chained)?
            .map(|inner| InterruptibleTransport { inner }))
    }
}

#[derive(Debug)]
pub(super) struct InterruptibleTransport {
    inner: Box<dyn Transport>,
}

impl InterruptibleTransport {
    fn is_slice_timeout(error: &ureq::Error) -> bool {
        match error {
            ureq::Error::Timeout(_) => true,
            ureq::Error::Io(e) => matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock),
            _ => false,
        }
    }
}

impl Transport for InterruptibleTransport {
    fn buffers(&mut self) -> &mut dyn Buffers {
        self.inner.buffers()
    }

    fn transmit_output(&mut self, amount: usize, timeout: NextTimeout) -> Result<(), ureq::Error> {
        if cancelled() {
            return Err(cancelled_error());
        }
        self.inner.transmit_output(amount, timeout)
    }

    fn await_input(&mut self, timeout: NextTimeout) -> Result<bool, ureq::Error> {
        let deadline = (!timeout.after.is_not_happening())
            .then(|| Instant::now().checked_add(*timeout.after))
            .flatten();

        loop {
            if cancelled() {
                return Err(cancelled_error());
            }

            let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            let last_slice = remaining.is_some_and(|r| r <= CANCEL_POLL);
            let slice = NextTimeout {
                after: remaining.unwrap_or(CANCEL_POLL).min(CANCEL_POLL).into(),
                reason: timeout.reason,
            };

            match self.inner.await_input(slice) {
                Err(e) if !last_slice && Self::is_slice_timeout(&e) => continue,
                other => return other,
            }
        }
    }

    fn is_open(&mut self) -> bool {
        self.inner.is_open()
    }

    fn is_tls(&self) -> bool {
        self.inner.is_tls()
    }
}
