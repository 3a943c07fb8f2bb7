//! EventManager - registry of named events with wildcard subscription.
//!
//! The manager owns its events. State that events need to reach back into
//! (the lazy loading flag and the listener registry) lives behind an `Arc`,
//! and every event keeps a `Weak` to it.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, Weak};

use tracing::{debug, info};

use crate::config::ManagerConfig;
use crate::error::{EventError, Result};
use crate::event::{Emitted, Emitter, Event, ListenerSpec};
use crate::listener::Listener;
use crate::pattern::EventPattern;
use crate::registry::{Instantiate, ListenerFactory, ListenerRegistry};
use crate::types::{Attributes, Payload};

/// State shared between a manager and its events.
pub(crate) struct Shared {
    lazy_loading: AtomicBool,
    registry: RwLock<ListenerRegistry>,
}

impl Shared {
    fn new(lazy_loading: bool) -> Self {
        Self {
            lazy_loading: AtomicBool::new(lazy_loading),
            registry: RwLock::new(ListenerRegistry::new()),
        }
    }
}

/// A cheap, clonable reference to a manager's shared state.
///
/// This is what [`Event::manager`] hands out.
#[derive(Clone)]
pub struct ManagerHandle {
    shared: Arc<Shared>,
}

impl ManagerHandle {
    pub(crate) fn from_shared(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    pub(crate) fn downgrade(&self) -> Weak<Shared> {
        Arc::downgrade(&self.shared)
    }

    /// Returns the lazy loading flag.
    pub fn lazy_loading_status(&self) -> bool {
        self.shared.lazy_loading.load(Ordering::SeqCst)
    }

    /// Sets the lazy loading flag.
    pub fn set_lazy_loading(&self, flag: bool) -> &Self {
        self.shared.lazy_loading.store(flag, Ordering::SeqCst);
        self
    }

    /// Looks up the factory registered under `identifier`.
    pub fn resolve_listener(&self, identifier: &str) -> Result<Option<ListenerFactory>> {
        let registry = self
            .shared
            .registry
            .read()
            .map_err(|e| EventError::LockPoisoned(e.to_string()))?;
        Ok(registry.get(identifier))
    }

    /// Returns true if both handles point at the same manager.
    pub fn ptr_eq(&self, other: &ManagerHandle) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl fmt::Debug for ManagerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagerHandle")
            .field("lazy_loading", &self.lazy_loading_status())
            .finish()
    }
}

/// What [`EventManager::add_event`] accepts.
#[derive(Debug)]
pub enum NewEvent {
    /// Create an event with this name.
    Name(String),
    /// Adopt an existing event.
    Event(Event),
}

impl From<&str> for NewEvent {
    fn from(name: &str) -> Self {
        NewEvent::Name(name.to_string())
    }
}

impl From<String> for NewEvent {
    fn from(name: String) -> Self {
        NewEvent::Name(name)
    }
}

impl From<Event> for NewEvent {
    fn from(event: Event) -> Self {
        NewEvent::Event(event)
    }
}

/// Registry of named events.
///
/// # Ownership
///
/// - **Events**: owned by the manager, keyed by name, iterated in insertion
///   order. Re-adding a name replaces the event in place.
///
/// - **`Arc<Shared>`**: the lazy loading flag (`AtomicBool`) and the listener
///   registry (`RwLock`). Events hold a `Weak` to it so they can validate
///   identifiers without owning the manager.
///
/// # Example
///
/// ```
/// use herald_events::{EventManager, ListenerSpec, Outcome, Payload};
///
/// let mut manager = EventManager::new();
/// manager.add_event("post.create", Default::default())?;
/// manager.add_event("post.delete", Default::default())?;
///
/// manager.on(
///     "post.*",
///     ListenerSpec::callback(|event, _data| {
///         event.set_attribute("touched", true.into());
///         Ok(Outcome::Continue)
///     }),
///     0,
/// )?;
///
/// assert!(manager.get_event("post.delete")?.has_listeners());
/// manager.emit("post.delete", Payload::new())?;
/// # Ok::<(), herald_events::EventError>(())
/// ```
pub struct EventManager {
    shared: Arc<Shared>,
    events: HashMap<String, Event>,
    order: Vec<String>,
    anchor_wildcards: bool,
}

impl EventManager {
    /// Creates a manager with lazy loading disabled.
    pub fn new() -> Self {
        Self::with_lazy_loading(false)
    }

    /// Creates a manager with the given lazy loading flag.
    pub fn with_lazy_loading(lazy_loading: bool) -> Self {
        Self {
            shared: Arc::new(Shared::new(lazy_loading)),
            events: HashMap::new(),
            order: Vec::new(),
            anchor_wildcards: false,
        }
    }

    /// Creates a manager from configuration, registering its initial events.
    pub fn from_config(config: ManagerConfig) -> Result<Self> {
        let mut manager = Self::with_lazy_loading(config.lazy_loading);
        manager.anchor_wildcards = config.anchor_wildcards;

        for name in config.events {
            manager.add_event(name, Attributes::new())?;
        }

        info!(
            events = manager.len(),
            lazy_loading = manager.lazy_loading_status(),
            anchor_wildcards = manager.anchor_wildcards,
            "event manager configured"
        );
        Ok(manager)
    }

    /// Returns a handle to the shared state.
    pub fn handle(&self) -> ManagerHandle {
        ManagerHandle::from_shared(Arc::clone(&self.shared))
    }

    /// Registers an event, replacing any event with the same name.
    ///
    /// A name creates a fresh event. An existing event is adopted and bound
    /// to this manager. Either way `attributes` replaces the event's
    /// attributes.
    pub fn add_event(
        &mut self,
        event: impl Into<NewEvent>,
        attributes: Attributes,
    ) -> Result<&mut Event> {
        let shared = Arc::downgrade(&self.shared);
        let mut event = match event.into() {
            NewEvent::Name(name) => Event::bound(shared, name)?,
            NewEvent::Event(mut event) => {
                event.rebind(shared);
                event
            }
        };
        event.set_attributes(attributes);

        match self.events.entry(event.name().to_string()) {
            Entry::Occupied(mut slot) => {
                debug!(event = %slot.key(), "replacing event");
                slot.insert(event);
                Ok(slot.into_mut())
            }
            Entry::Vacant(slot) => {
                debug!(event = %slot.key(), "registering event");
                self.order.push(slot.key().clone());
                Ok(slot.insert(event))
            }
        }
    }

    /// Attaches a listener to every event matching `pattern`.
    ///
    /// An exact name that is not registered yet is created first. A wildcard
    /// pattern matching nothing is registered as an event under the literal
    /// pattern text.
    pub fn on(
        &mut self,
        pattern: &str,
        spec: impl Into<ListenerSpec>,
        priority: i32,
    ) -> Result<&mut Self> {
        let spec = spec.into();
        let names = self.resolve_names(pattern)?;

        if names.is_empty() {
            debug!(pattern, "no matching event, registering pattern as event");
            self.add_event(pattern, Attributes::new())?
                .add_listener(spec, priority, None)?;
            return Ok(self);
        }

        debug!(pattern, matched = names.len(), "attaching listener");
        for name in &names {
            let event = self
                .events
                .get_mut(name)
                .ok_or_else(|| EventError::EventNotFound(name.clone()))?;
            event.add_listener(spec.clone(), priority, None)?;
        }
        Ok(self)
    }

    /// Returns the registered events matching `pattern`, in insertion order.
    pub fn resolve(&self, pattern: &str) -> Result<Vec<&Event>> {
        Ok(self
            .resolve_names(pattern)?
            .iter()
            .filter_map(|name| self.events.get(name))
            .collect())
    }

    fn resolve_names(&self, pattern: &str) -> Result<Vec<String>> {
        let pattern = EventPattern::parse(pattern, self.anchor_wildcards)?;

        if !pattern.is_wildcard() {
            return Ok(self
                .events
                .contains_key(pattern.as_str())
                .then(|| vec![pattern.as_str().to_string()])
                .unwrap_or_default());
        }

        Ok(self
            .order
            .iter()
            .filter(|name| pattern.matches(name))
            .cloned()
            .collect())
    }

    /// Gets an event by name.
    pub fn get_event(&self, name: &str) -> Result<&Event> {
        self.events
            .get(name)
            .ok_or_else(|| EventError::EventNotFound(name.to_string()))
    }

    /// Gets an event by name for modification.
    pub fn get_event_mut(&mut self, name: &str) -> Result<&mut Event> {
        self.events
            .get_mut(name)
            .ok_or_else(|| EventError::EventNotFound(name.to_string()))
    }

    /// Returns true if an event with this name is registered.
    pub fn has_event(&self, name: &str) -> bool {
        self.events.contains_key(name)
    }

    /// Returns true if any event is registered.
    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    /// Removes an event. Unknown names are ignored.
    pub fn remove_event(&mut self, name: &str) -> &mut Self {
        if self.events.remove(name).is_some() {
            self.order.retain(|n| n != name);
            debug!(event = %name, "event removed");
        }
        self
    }

    /// Iterates events in insertion order.
    pub fn events(&self) -> impl Iterator<Item = &Event> + '_ {
        self.order.iter().filter_map(|name| self.events.get(name))
    }

    /// Returns the number of registered events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns true if no events are registered.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Sets the lazy loading flag.
    pub fn set_lazy_loading(&mut self, flag: bool) -> &mut Self {
        self.shared.lazy_loading.store(flag, Ordering::SeqCst);
        self
    }

    /// Returns the lazy loading flag.
    pub fn lazy_loading_status(&self) -> bool {
        self.shared.lazy_loading.load(Ordering::SeqCst)
    }

    /// Sets whether wildcard patterns must cover whole event names.
    pub fn set_anchor_wildcards(&mut self, flag: bool) -> &mut Self {
        self.anchor_wildcards = flag;
        self
    }

    /// Returns true if wildcard patterns must cover whole event names.
    pub fn anchor_wildcards(&self) -> bool {
        self.anchor_wildcards
    }

    /// Registers a listener type under an identifier.
    pub fn register_listener<T: Instantiate>(
        &mut self,
        identifier: impl Into<String>,
    ) -> Result<&mut Self> {
        let identifier = identifier.into();
        self.registry_mut(|registry| registry.register::<T>(identifier.clone()))?;
        debug!(identifier = %identifier, "listener type registered");
        Ok(self)
    }

    /// Registers a listener factory under an identifier.
    pub fn register_listener_with<F>(
        &mut self,
        identifier: impl Into<String>,
        factory: F,
    ) -> Result<&mut Self>
    where
        F: Fn(i32) -> Box<dyn Listener> + Send + Sync + 'static,
    {
        let identifier = identifier.into();
        self.registry_mut(|registry| registry.register_with(identifier.clone(), factory))?;
        debug!(identifier = %identifier, "listener factory registered");
        Ok(self)
    }

    /// Removes a registered identifier. Returns true if it was registered.
    ///
    /// Listeners already attached by this identifier keep their factory.
    pub fn unregister_listener(&mut self, identifier: &str) -> Result<bool> {
        self.registry_mut(|registry| registry.unregister(identifier))
    }

    /// Returns a snapshot of the listener registry.
    pub fn listener_registry(&self) -> Result<ListenerRegistry> {
        let registry = self
            .shared
            .registry
            .read()
            .map_err(|e| EventError::LockPoisoned(e.to_string()))?;
        Ok(registry.clone())
    }

    /// Returns the registered listener identifiers, sorted.
    pub fn listener_identifiers(&self) -> Result<Vec<String>> {
        let registry = self.listener_registry()?;
        let mut identifiers: Vec<String> = registry.list().into_iter().map(String::from).collect();
        identifiers.sort();
        Ok(identifiers)
    }

    fn registry_mut<R>(&self, f: impl FnOnce(&mut ListenerRegistry) -> R) -> Result<R> {
        let mut registry = self
            .shared
            .registry
            .write()
            .map_err(|e| EventError::LockPoisoned(e.to_string()))?;
        Ok(f(&mut registry))
    }

    /// Emits any event implementation with empty data.
    ///
    /// The event does not need to be registered with this manager, or be an
    /// [`Event`] at all.
    pub fn dispatch<'a>(&self, event: &'a mut dyn Emitter) -> Result<Emitted<'a>> {
        debug!(event = %event.name(), "dispatching event");
        event.emit(Payload::new())
    }

    /// Emits a registered event by name.
    pub fn emit(&mut self, name: &str, data: Payload) -> Result<Emitted<'_>> {
        self.get_event_mut(name)?.emit(data)
    }
}

impl Default for EventManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventManager")
            .field("events", &self.order)
            .field("lazy_loading", &self.lazy_loading_status())
            .field("anchor_wildcards", &self.anchor_wildcards)
            .finish()
    }
}
