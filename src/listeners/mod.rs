//! Listener registration and delivery.
//!
//! Engine output reaches the application in two ways:
//! - [`Listener`] implementations registered with callbacks
//! - [`UpdateStream`] handles backed by bounded channels
//!
//! Delivery always iterates a snapshot of the registry, so listeners may be
//! added or removed from inside a callback. Streams that fall behind their
//! buffer, or whose handle was dropped, are removed.
//!
//! # Example
//!
//! ```ignore
//! let stream = subscriber.stream();
//!
//! loop {
//!     match stream.recv() {
//!         Ok(ListenerEvent::Update(update)) => println!("{}: {:?}", update.channel(), update),
//!         Ok(ListenerEvent::Status(status)) => println!("status: {:?}", status.current),
//!         Ok(ListenerEvent::Dropped { .. }) | Err(_) => break,
//!     }
//! }
//! ```

mod registry;
mod types;

pub use registry::ListenerRegistry;
pub use types::{DropReason, Listener, ListenerEvent, ListenerId, UpdateStream};
