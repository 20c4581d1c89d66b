//! Public entry point: owns the driver and delivery threads.

use crate::config::EngineConfig;
use crate::driver::{Driver, DriverMessage};
use crate::effects::{spawn_delivery, EffectContext, Emitter};
use crate::engine::{SubscribeEvent, SubscribeState};
use crate::error::{Result, SubscribeError};
use crate::input::{ChannelDescriptor, SubscribeInput};
use crate::listeners::{Listener, ListenerId, ListenerRegistry, UpdateStream};
use crate::retry::RetryPolicy;
use crate::transport::Transport;
use crate::types::{Cursor, StatusCategory};
use crossbeam_channel::Sender;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

/// A running subscribe engine.
///
/// Provides a unified interface for:
/// - Changing the subscription set
/// - Disconnecting and reconnecting
/// - Registering listeners
/// - Inspecting the current state
///
/// Commands are queued to the driver thread and return immediately. Dropping
/// the subscriber shuts it down.
pub struct Subscriber {
    /// Engine configuration.
    config: EngineConfig,

    /// Live state, written only by the driver.
    state: Arc<RwLock<SubscribeState>>,

    /// Requested subscription set. Held while an event is queued so commands
    /// reach the driver in the order their inputs were computed.
    input: Mutex<SubscribeInput>,

    listeners: Arc<ListenerRegistry>,

    inbox: Sender<DriverMessage>,

    /// Driver and delivery threads, taken on shutdown.
    threads: Mutex<Option<(JoinHandle<()>, JoinHandle<()>)>>,

    stopped: AtomicBool,
}

impl Subscriber {
    /// Start an engine on the given transport, retrying per `config.retry`.
    pub fn new(config: EngineConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let retry = Arc::new(config.retry.clone());
        Self::with_retry_policy(config, transport, retry)
    }

    /// Start an engine with a custom retry policy.
    pub fn with_retry_policy(
        config: EngineConfig,
        transport: Arc<dyn Transport>,
        retry: Arc<dyn RetryPolicy>,
    ) -> Result<Self> {
        config.validate()?;

        let listeners = Arc::new(ListenerRegistry::new());
        let emitter = Emitter::new(
            Arc::clone(&listeners),
            config.message_cache_size,
            config.maximum_message_count_threshold,
        );
        let (delivery, delivery_thread) = spawn_delivery(emitter)?;

        let state = Arc::new(RwLock::new(SubscribeState::Unsubscribed));
        let (inbox, driver_thread) = Driver::spawn(
            Arc::clone(&state),
            EffectContext { transport, retry },
            delivery,
        )?;

        info!(user_id = %config.user_id, "subscriber started");

        Ok(Self {
            config,
            state,
            input: Mutex::new(SubscribeInput::default()),
            listeners,
            inbox,
            threads: Mutex::new(Some((driver_thread, delivery_thread))),
            stopped: AtomicBool::new(false),
        })
    }

    /// Start an engine on the bundled HTTP transport.
    #[cfg(feature = "http")]
    pub fn connect(config: EngineConfig) -> Result<Self> {
        let transport = Arc::new(crate::transport::HttpTransport::new(&config)?);
        Self::new(config, transport)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // --- Commands ---

    /// Add channels and groups. With a cursor, receiving resumes from it.
    pub fn subscribe<S: AsRef<str>>(
        &self,
        channels: &[S],
        groups: &[S],
        cursor: Option<Cursor>,
    ) -> Result<()> {
        self.add(descriptors(channels, false), descriptors(groups, false), cursor)
    }

    /// Add channels and groups with presence tracking.
    pub fn subscribe_with_presence<S: AsRef<str>>(
        &self,
        channels: &[S],
        groups: &[S],
        cursor: Option<Cursor>,
    ) -> Result<()> {
        self.add(descriptors(channels, true), descriptors(groups, true), cursor)
    }

    /// Remove channels and groups.
    pub fn unsubscribe<S: AsRef<str>>(&self, channels: &[S], groups: &[S]) -> Result<()> {
        self.remove(channels, groups, false)
    }

    /// Stop presence tracking but stay subscribed.
    pub fn unsubscribe_presence<S: AsRef<str>>(&self, channels: &[S], groups: &[S]) -> Result<()> {
        self.remove(channels, groups, true)
    }

    /// Drop the whole subscription set.
    pub fn unsubscribe_all(&self) -> Result<()> {
        let mut input = self.input.lock();
        *input = SubscribeInput::default();
        self.send(SubscribeEvent::UnsubscribeAll)
    }

    /// Leave a stopped or failed state, optionally from a given cursor.
    pub fn reconnect(&self, cursor: Option<Cursor>) -> Result<()> {
        self.send(SubscribeEvent::Reconnect { cursor })
    }

    /// Stop long-polling but keep the subscription set.
    pub fn disconnect(&self) -> Result<()> {
        self.send(SubscribeEvent::Disconnect)
    }

    fn add(
        &self,
        channels: Vec<ChannelDescriptor>,
        groups: Vec<ChannelDescriptor>,
        cursor: Option<Cursor>,
    ) -> Result<()> {
        let mut input = self.input.lock();
        let next = input.by_adding(channels, groups);
        self.change(&mut input, next, cursor)
    }

    fn remove<S: AsRef<str>>(&self, channels: &[S], groups: &[S], presence_only: bool) -> Result<()> {
        let mut input = self.input.lock();
        let next = input.by_removing(channels, groups, presence_only);
        self.change(&mut input, next, None)
    }

    /// Queue a subscription change. Unchanged input without a cursor is dropped.
    fn change(&self, input: &mut SubscribeInput, next: SubscribeInput, cursor: Option<Cursor>) -> Result<()> {
        if *input == next && cursor.is_none() {
            debug!("subscription set unchanged");
            return Ok(());
        }

        let event = match cursor {
            Some(cursor) => SubscribeEvent::SubscriptionRestored {
                input: next.clone(),
                cursor,
            },
            None => SubscribeEvent::SubscriptionChanged { input: next.clone() },
        };
        self.send(event)?;
        *input = next;
        Ok(())
    }

    fn send(&self, event: SubscribeEvent) -> Result<()> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(SubscribeError::EngineStopped);
        }
        self.inbox
            .send(DriverMessage::Event(event))
            .map_err(|_| SubscribeError::EngineStopped)
    }

    // --- Listeners ---

    /// Register a callback listener.
    pub fn add_listener(&self, listener: Arc<dyn Listener>) -> ListenerId {
        self.listeners.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    /// Register a channel-backed listener sized by `listener_buffer_size`.
    pub fn stream(&self) -> UpdateStream {
        self.listeners.stream(self.config.listener_buffer_size)
    }

    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    // --- Queries ---

    /// Snapshot of the current state.
    pub fn state(&self) -> SubscribeState {
        self.state.read().clone()
    }

    /// Connection category of the current state.
    pub fn status(&self) -> StatusCategory {
        self.state.read().status()
    }

    /// Channels the application asked for, without presence-shadow names.
    pub fn subscribed_channels(&self) -> Vec<String> {
        self.input.lock().subscribed_channels()
    }

    /// Groups the application asked for, without presence-shadow names.
    pub fn subscribed_groups(&self) -> Vec<String> {
        self.input.lock().subscribed_groups()
    }

    // --- Lifecycle ---

    /// Cancel running effects and join the engine threads.
    ///
    /// Pending listener deliveries are flushed first. Idempotent.
    pub fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.inbox.send(DriverMessage::Shutdown);

        if let Some((driver, delivery)) = self.threads.lock().take() {
            // The delivery thread exits once the driver drops its sender
            if driver.join().is_err() {
                warn!("driver thread panicked");
            }
            if delivery.join().is_err() {
                warn!("delivery thread panicked");
            }
        }
        info!("subscriber stopped");
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn descriptors<S: AsRef<str>>(ids: &[S], presence: bool) -> Vec<ChannelDescriptor> {
    ids.iter()
        .map(|id| ChannelDescriptor {
            id: id.as_ref().to_string(),
            presence,
        })
        .collect()
}
