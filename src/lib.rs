//! # Subscribe Engine
//!
//! A client runtime for a long-poll publish/subscribe service. It keeps a live
//! set of subscribed channels and groups, long-polls for new messages and
//! delivers them to listeners once per cursor advance, across network
//! failures and subscription changes.
//!
//! ## Core Concepts
//!
//! - **Input**: Immutable subscription set with presence-shadow expansion
//! - **Engine**: Pure state machine mapping `(state, event)` to invocations
//! - **Effects**: Cancellable handshake and receive long-polls with retry
//! - **Listeners**: Callback and channel-backed delivery with de-duplication
//!
//! ## Example
//!
//! ```ignore
//! use subscribe_engine::{EngineConfig, ListenerEvent, Subscriber};
//!
//! let subscriber = Subscriber::connect(EngineConfig::new("sub-c-key", "user-1"))?;
//! let stream = subscriber.stream();
//!
//! subscriber.subscribe_with_presence(&["chat"], &[], None)?;
//!
//! while let Ok(event) = stream.recv() {
//!     if let ListenerEvent::Update(update) = event {
//!         println!("{}: {:?}", update.channel(), update);
//!     }
//! }
//! ```

pub mod cache;
pub mod cancel;
pub mod config;
mod driver;
mod effects;
pub mod engine;
pub mod error;
pub mod input;
pub mod listeners;
pub mod messages;
pub mod retry;
pub mod subscriber;
pub mod transport;
pub mod types;

// Re-exports
pub use cache::MessageCache;
pub use cancel::{cancel_pair, CancelHandle, CancelToken};
pub use config::EngineConfig;
pub use engine::{
    transition, EffectKind, EffectSlot, SubscribeEffectInvocation, SubscribeEvent, SubscribeState,
    Transition,
};
pub use error::{Result, SubscribeError, TransportErrorKind};
pub use input::{ChannelDescriptor, SubscribeInput};
pub use listeners::{DropReason, Listener, ListenerEvent, ListenerId, ListenerRegistry, UpdateStream};
pub use messages::{
    AppContextEvent, AppContextUpdate, Envelope, FileUpdate, Message, MessageActionEvent,
    MessageActionUpdate, MessageIdentity, MessageType, PresenceAction, PresenceUpdate, Update,
};
pub use retry::{RetryConfiguration, RetryPolicy};
pub use subscriber::Subscriber;
pub use transport::{LongPollRequest, LongPollResponse, Transport};
#[cfg(feature = "http")]
pub use transport::HttpTransport;
pub use types::{ConnectionStatus, Cursor, StatusCategory};
