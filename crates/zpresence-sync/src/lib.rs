//! Per-account presence synchronisation.
//!
//! An [`AccountContext`] ties together everything one configured Zoom
//! account needs at runtime: a token manager, a [`PollCoordinator`] keeping
//! the owner's profile fresh, an [`EventBus`] fed by the webhook ingress, and
//! a [`PresenceDispatcher`] turning bus events into presence records.

pub mod bus;
pub mod context;
pub mod coordinator;
pub mod dispatcher;
pub mod error;

pub use bus::EventBus;
pub use context::{AccountContext, SyncSettings};
pub use coordinator::{PollCoordinator, PollError, PollState, PollStatus};
pub use dispatcher::{ObserverHandle, PresenceDispatcher};
pub use error::{Error, Result};
