//! Named events with prioritized listeners for Herald.
//!
//! This crate provides:
//! - `Event`: a named event that owns its listeners and attributes
//! - `Listener`: prioritized reaction logic with optional error catchers
//! - `EventManager`: a registry of events with wildcard subscription
//! - `Emitter`: the emission capability, for event types other than `Event`
//! - Lazy listeners, built from a registry identifier on every emission
//!
//! # Example
//!
//! ```
//! use herald_events::{EventManager, ListenerSpec, Outcome, Payload};
//! use serde_json::json;
//!
//! let mut manager = EventManager::new();
//! manager.add_event("user.login", Default::default())?;
//!
//! manager.on(
//!     "user.*",
//!     ListenerSpec::callback(|event, data| {
//!         let who = data.get("user").cloned().unwrap_or_default();
//!         event.set_attribute("last_user", who);
//!         Ok(Outcome::Continue)
//!     }),
//!     10,
//! )?;
//!
//! let mut data = Payload::new();
//! data.insert("user".to_string(), json!("ada"));
//!
//! let emitted = manager.emit("user.login", data)?;
//! assert_eq!(emitted.attribute("last_user"), Some(&json!("ada")));
//! # Ok::<(), herald_events::EventError>(())
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod listener;
pub mod manager;
pub mod pattern;
pub mod registry;
pub mod types;

pub use config::ManagerConfig;
pub use error::{EventError, ListenerError, Result};
pub use event::{
    emit_listeners, AsEventLike, Emitted, Emitter, Event, ListenerSlot, ListenerSpec,
    PendingListener,
};
pub use listener::{
    callback, catcher, Callback, Catcher, Listener, ListenerClone, ListenerEntry, ListenerResult,
};
pub use manager::{EventManager, ManagerHandle, NewEvent};
pub use pattern::EventPattern;
pub use registry::{Instantiate, ListenerFactory, ListenerRegistry};
pub use types::{Attributes, EventLike, Outcome, Payload};
