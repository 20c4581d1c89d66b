//! Subscribe event engine.
//!
//! The engine is a pure state machine:
//! - [`SubscribeState`]: the single live state
//! - [`SubscribeEvent`]: commands and effect outcomes
//! - [`SubscribeEffectInvocation`]: work to start or cancel
//! - [`transition`]: `(state, event) -> (state, invocations)`
//!
//! Executing invocations is the job of the driver.

mod event;
mod invocation;
mod state;
mod transition;

pub use event::SubscribeEvent;
pub use invocation::{EffectKind, EffectSlot, SubscribeEffectInvocation};
pub use state::SubscribeState;
pub use transition::{transition, Transition};
