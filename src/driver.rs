//! Event loop that owns the engine state and executes invocations.
//!
//! Events are applied one at a time on the driver thread. Long-running
//! effects run on their own worker threads and report back through the
//! driver inbox; emit effects are queued to the delivery thread. No network
//! call ever runs on the driver thread.

use crate::cancel::{cancel_pair, CancelHandle};
use crate::effects::{Delivery, EffectContext, SubscribeEffect};
use crate::engine::{
    transition, EffectKind, EffectSlot, SubscribeEffectInvocation, SubscribeEvent, SubscribeState,
};
use crate::error::{Result, SubscribeError};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info};

/// Messages accepted by the driver thread.
#[derive(Debug)]
pub(crate) enum DriverMessage {
    Event(SubscribeEvent),
    /// A long-running effect finished. `event` is `None` if it was cancelled.
    Completed {
        slot: EffectSlot,
        id: u64,
        event: Option<SubscribeEvent>,
    },
    Shutdown,
}

/// An effect occupying a slot.
struct RunningEffect {
    id: u64,
    kind: EffectKind,
    cancel: CancelHandle,
}

pub(crate) struct Driver {
    state: Arc<RwLock<SubscribeState>>,
    context: Arc<EffectContext>,
    running: HashMap<EffectSlot, RunningEffect>,
    next_effect_id: u64,
    /// Completion path handed to effect workers.
    inbox: Sender<DriverMessage>,
    delivery: Sender<Delivery>,
}

impl Driver {
    /// Start the driver thread.
    pub fn spawn(
        state: Arc<RwLock<SubscribeState>>,
        context: EffectContext,
        delivery: Sender<Delivery>,
    ) -> Result<(Sender<DriverMessage>, JoinHandle<()>)> {
        let (inbox, receiver) = unbounded();
        let driver = Driver {
            state,
            context: Arc::new(context),
            running: HashMap::new(),
            next_effect_id: 1,
            inbox: inbox.clone(),
            delivery,
        };

        let handle = thread::Builder::new()
            .name("subscribe-driver".into())
            .spawn(move || driver.run(receiver))
            .map_err(|e| SubscribeError::Spawn(e.to_string()))?;

        Ok((inbox, handle))
    }

    fn run(mut self, receiver: Receiver<DriverMessage>) {
        info!("subscribe driver started");

        for message in receiver.iter() {
            match message {
                DriverMessage::Event(event) => self.handle(event),
                DriverMessage::Completed { slot, id, event } => self.complete(slot, id, event),
                DriverMessage::Shutdown => break,
            }
        }

        self.cancel_all();
        info!("subscribe driver stopped");
    }

    /// Apply one event and dispatch every resulting invocation.
    fn handle(&mut self, event: SubscribeEvent) {
        let current = self.state.read().clone();
        let event_name = event.name();

        let Some(next) = transition(&current, event) else {
            debug!(state = current.name(), event = event_name, "event ignored");
            return;
        };

        debug!(
            from = current.name(),
            event = event_name,
            to = next.state.name(),
            invocations = next.invocations.len(),
            "transition"
        );
        *self.state.write() = next.state;

        for invocation in next.invocations {
            self.dispatch(invocation);
        }
    }

    fn complete(&mut self, slot: EffectSlot, id: u64, event: Option<SubscribeEvent>) {
        match self.running.get(&slot) {
            Some(running) if running.id == id => {
                self.running.remove(&slot);
            }
            _ => {
                debug!(?slot, id, "discarding completion of retired effect");
                return;
            }
        }

        if let Some(event) = event {
            self.handle(event);
        }
    }

    fn dispatch(&mut self, invocation: SubscribeEffectInvocation) {
        match invocation {
            SubscribeEffectInvocation::Cancel(kind) => self.cancel(kind),
            SubscribeEffectInvocation::EmitStatus(status) => self.queue(Delivery::Status(status)),
            SubscribeEffectInvocation::EmitMessages { cursor, messages } => {
                self.queue(Delivery::Messages { cursor, messages })
            }
            managed => {
                if let Some(effect) = SubscribeEffect::from_invocation(managed) {
                    self.start(effect);
                }
            }
        }
    }

    fn queue(&self, delivery: Delivery) {
        if self.delivery.send(delivery).is_err() {
            error!("delivery thread is gone");
        }
    }

    fn start(&mut self, effect: SubscribeEffect) {
        let kind = effect.kind();
        let Some(slot) = kind.slot() else {
            return;
        };

        // Slots are exclusive
        if let Some(previous) = self.running.remove(&slot) {
            debug!(kind = %previous.kind, id = previous.id, "replacing running effect");
            previous.cancel.cancel();
        }

        let id = self.next_effect_id;
        self.next_effect_id += 1;

        let (cancel, token) = cancel_pair();
        self.running.insert(slot, RunningEffect { id, kind, cancel });
        debug!(%kind, id, "effect started");

        let context = Arc::clone(&self.context);
        let inbox = self.inbox.clone();
        let failure = effect.failure(SubscribeError::Spawn(format!("{kind} worker")));

        let spawned = thread::Builder::new()
            .name(format!("subscribe-{kind}"))
            .spawn(move || {
                let event = effect.run(&context, &token);
                if token.is_cancelled() {
                    return;
                }
                let _ = inbox.send(DriverMessage::Completed { slot, id, event });
            });

        if let Err(e) = spawned {
            error!(%kind, error = %e, "failed to spawn effect worker");
            let _ = self.inbox.send(DriverMessage::Completed {
                slot,
                id,
                event: Some(failure),
            });
        }
    }

    fn cancel(&mut self, kind: EffectKind) {
        let Some(slot) = kind.slot() else {
            return;
        };
        if self.running.get(&slot).map(|r| r.kind) == Some(kind) {
            if let Some(running) = self.running.remove(&slot) {
                debug!(%kind, id = running.id, "effect cancelled");
                running.cancel.cancel();
            }
        }
    }

    fn cancel_all(&mut self) {
        for (_, running) in self.running.drain() {
            running.cancel.cancel();
        }
    }
}
