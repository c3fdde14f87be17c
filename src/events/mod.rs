//! Event plumbing in both directions.
//!
//! Inbound, collaborators publish [`CollaboratorEvent`]s on a channel that the
//! [`EventRouter`] drains. Outbound, the worker and the router notify
//! registered [`LifecycleListener`]s.
//!
//! # Modules
//!
//! - [`channel`]: inbound event channel
//! - [`router`]: event dispatch into contexts
//! - [`notifications`]: listener trait, state-change payload

pub mod channel;
pub mod notifications;
pub mod router;

pub use channel::{event_channel, CollaboratorEvent, EventInbox, EventPublisher};
pub use notifications::{ChannelListener, LifecycleListener, ListenerSet, Notification, StateChange};
pub use router::{EventRouter, RouterHandle, RUNTIME_FAILURE};
