//! Event - a named dispatch unit owning its prioritized listeners.
//!
//! Emission runs listeners from highest to lowest priority. Listeners with the
//! same priority run in the order they were added. Each listener may:
//!
//! - continue, handing the current event to the next listener
//! - halt the emission ([`Outcome::Halt`])
//! - stop propagation through the event flag, which also ends the emission
//! - replace the current event ([`Outcome::Replace`]); later listeners and the
//!   caller then receive the replacement

use std::any::Any;
use std::cmp::Reverse;
use std::fmt;
use std::sync::Weak;

use serde_json::Value;
use tracing::{debug, trace};

use crate::error::{EventError, Result};
use crate::listener::{Callback, Catcher, Listener, ListenerEntry, ListenerResult};
use crate::manager::{EventManager, ManagerHandle, Shared};
use crate::registry::ListenerFactory;
use crate::types::{Attributes, EventLike, Outcome, Payload};

/// Anything that can be attached to an event as a listener.
#[derive(Clone)]
pub enum ListenerSpec {
    /// An already constructed listener.
    Instance(Box<dyn Listener>),
    /// A closure, wrapped into a [`ListenerEntry`] on attach.
    Callback(Callback),
    /// A registry identifier, constructed on every emission.
    Identifier(String),
}

impl ListenerSpec {
    /// Creates a callback spec from a closure.
    pub fn callback<F>(f: F) -> Self
    where
        F: Fn(&mut dyn EventLike, &Payload) -> ListenerResult + Send + Sync + 'static,
    {
        ListenerSpec::Callback(crate::listener::callback(f))
    }

    /// Short description of the spec kind, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ListenerSpec::Instance(_) => "instance",
            ListenerSpec::Callback(_) => "callback",
            ListenerSpec::Identifier(_) => "identifier",
        }
    }
}

impl From<ListenerEntry> for ListenerSpec {
    fn from(entry: ListenerEntry) -> Self {
        ListenerSpec::Instance(Box::new(entry))
    }
}

impl From<Box<dyn Listener>> for ListenerSpec {
    fn from(listener: Box<dyn Listener>) -> Self {
        ListenerSpec::Instance(listener)
    }
}

impl From<Callback> for ListenerSpec {
    fn from(callback: Callback) -> Self {
        ListenerSpec::Callback(callback)
    }
}

impl From<&str> for ListenerSpec {
    fn from(identifier: &str) -> Self {
        ListenerSpec::Identifier(identifier.to_string())
    }
}

impl From<String> for ListenerSpec {
    fn from(identifier: String) -> Self {
        ListenerSpec::Identifier(identifier)
    }
}

impl fmt::Debug for ListenerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenerSpec::Instance(listener) => f.debug_tuple("Instance").field(listener).finish(),
            ListenerSpec::Callback(_) => f.write_str("Callback"),
            ListenerSpec::Identifier(id) => f.debug_tuple("Identifier").field(id).finish(),
        }
    }
}

/// A listener added by identifier, not yet constructed.
#[derive(Clone)]
pub struct PendingListener {
    identifier: String,
    priority: i32,
    catcher: Option<Catcher>,
    factory: ListenerFactory,
}

impl PendingListener {
    /// Returns the registry identifier.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Returns the priority the listener will be built with.
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Returns the catcher attached on construction, if any.
    pub fn catcher(&self) -> Option<&Catcher> {
        self.catcher.as_ref()
    }

    /// Builds a fresh listener.
    fn instantiate(&self) -> Box<dyn Listener> {
        trace!(
            identifier = %self.identifier,
            priority = self.priority,
            "constructing lazy listener"
        );
        let mut listener = (self.factory)(self.priority);
        if let Some(catcher) = &self.catcher {
            listener.set_catcher(catcher.clone());
        }
        listener
    }
}

impl fmt::Debug for PendingListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingListener")
            .field("identifier", &self.identifier)
            .field("priority", &self.priority)
            .field("catcher", &self.catcher.is_some())
            .finish()
    }
}

/// A listener attached to an event.
#[derive(Debug, Clone)]
pub enum ListenerSlot {
    /// Constructed listener.
    Ready(Box<dyn Listener>),
    /// Listener constructed on each emission.
    Pending(PendingListener),
}

impl ListenerSlot {
    /// Returns the slot's priority.
    pub fn priority(&self) -> i32 {
        match self {
            ListenerSlot::Ready(listener) => listener.priority(),
            ListenerSlot::Pending(pending) => pending.priority(),
        }
    }

    /// Returns true if construction is deferred.
    pub fn is_pending(&self) -> bool {
        matches!(self, ListenerSlot::Pending(_))
    }
}

/// What an emission hands back.
pub enum Emitted<'a> {
    /// The emitted event reached the end of the chain.
    Original(&'a dyn EventLike),
    /// A listener replaced the event.
    Replaced(Box<dyn Emitter>),
}

impl Emitted<'_> {
    /// Returns the resulting event.
    pub fn event(&self) -> &dyn EventLike {
        match self {
            Emitted::Original(event) => *event,
            Emitted::Replaced(event) => event.as_event(),
        }
    }

    /// Returns the resulting event's name.
    pub fn name(&self) -> &str {
        self.event().name()
    }

    /// Gets an attribute of the resulting event.
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.event().attribute(key)
    }

    /// Returns true if a listener replaced the event.
    pub fn is_replaced(&self) -> bool {
        matches!(self, Emitted::Replaced(_))
    }

    /// Takes the replacement event, if any.
    ///
    /// The replacement can be emitted again, or passed to
    /// [`EventManager::dispatch`].
    pub fn into_replacement(self) -> Option<Box<dyn Emitter>> {
        match self {
            Emitted::Original(_) => None,
            Emitted::Replaced(event) => Some(event),
        }
    }
}

impl fmt::Debug for Emitted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Emitted::Original(event) => f.debug_tuple("Original").field(&event.name()).finish(),
            Emitted::Replaced(event) => f.debug_tuple("Replaced").field(&event.name()).finish(),
        }
    }
}

/// Upcasts to [`EventLike`].
///
/// Implemented for every sized `EventLike`, so deriving nothing is needed.
pub trait AsEventLike {
    /// Returns the value as an event.
    fn as_event(&self) -> &dyn EventLike;

    /// Returns the value as a mutable event.
    fn as_event_mut(&mut self) -> &mut dyn EventLike;
}

impl<T: EventLike> AsEventLike for T {
    fn as_event(&self) -> &dyn EventLike {
        self
    }

    fn as_event_mut(&mut self) -> &mut dyn EventLike {
        self
    }
}

/// The full event capability: listener management and emission.
///
/// [`Event`] is the standard implementation. Any other implementation can be
/// passed to [`EventManager::dispatch`] or handed back from a listener through
/// [`Outcome::Replace`]. [`emit_listeners`] runs a listener list with the same
/// ordering and short-circuit rules `Event` uses.
pub trait Emitter: EventLike + AsEventLike {
    /// Attaches a listener.
    fn add_listener(
        &mut self,
        spec: ListenerSpec,
        priority: i32,
        catcher: Option<Catcher>,
    ) -> Result<()>;

    /// Returns the attached listeners in insertion order.
    fn listeners(&self) -> &[ListenerSlot];

    /// Returns true if any listener is attached.
    fn has_listeners(&self) -> bool {
        !self.listeners().is_empty()
    }

    /// Runs the attached listeners.
    fn emit(&mut self, data: Payload) -> Result<Emitted<'_>>;
}

/// Runs `slots` against `event`.
///
/// Pending listeners are constructed fresh, then all listeners run from
/// highest to lowest priority until one halts, stops propagation, or fails
/// without a catcher. Returns the replacement event, if a listener produced
/// one.
pub fn emit_listeners(
    event: &mut dyn EventLike,
    slots: &[ListenerSlot],
    data: &Payload,
) -> Result<Option<Box<dyn Emitter>>> {
    let name = event.name().to_string();

    let mut listeners: Vec<Materialized<'_>> = slots
        .iter()
        .map(|slot| match slot {
            ListenerSlot::Ready(listener) => Materialized::Attached(&**listener),
            ListenerSlot::Pending(pending) => Materialized::Fresh(pending.instantiate()),
        })
        .collect();
    listeners.sort_by_key(|m| Reverse(m.listener().priority()));

    let mut replaced: Option<Box<dyn Emitter>> = None;

    for materialized in &listeners {
        let listener = materialized.listener();
        trace!(event = %name, priority = listener.priority(), "running listener");

        let current: &mut dyn EventLike = match replaced.as_mut() {
            Some(next) => next.as_event_mut(),
            None => &mut *event,
        };

        let outcome = listener.process(current, data)?;

        if current.is_propagation_stopped() || outcome.is_halt() {
            debug!(
                event = %name,
                priority = listener.priority(),
                halted = outcome.is_halt(),
                "emission stopped by listener"
            );
            break;
        }

        if let Outcome::Replace(next) = outcome {
            debug!(event = %name, replacement = next.name(), "listener replaced event");
            replaced = Some(next);
        }
    }

    Ok(replaced)
}

/// A listener materialized for a single emission.
enum Materialized<'a> {
    Attached(&'a dyn Listener),
    Fresh(Box<dyn Listener>),
}

impl Materialized<'_> {
    fn listener(&self) -> &dyn Listener {
        match self {
            Materialized::Attached(listener) => *listener,
            Materialized::Fresh(listener) => &**listener,
        }
    }
}

/// A named event with attributes and prioritized listeners.
///
/// Events are created through [`EventManager::add_event`] (or implicitly by
/// [`EventManager::on`]) and keep a weak back-reference to their manager.
///
/// # Example
///
/// ```
/// use herald_events::{EventLike, EventManager, ListenerSpec, Outcome, Payload};
///
/// let mut manager = EventManager::new();
/// manager
///     .add_event("post.create", Default::default())?
///     .add_listener(
///         ListenerSpec::callback(|event, _data| {
///             event.set_attribute("seen", true.into());
///             Ok(Outcome::Continue)
///         }),
///         0,
///         None,
///     )?;
///
/// let emitted = manager.emit("post.create", Payload::new())?;
/// assert_eq!(emitted.attribute("seen"), Some(&serde_json::json!(true)));
/// # Ok::<(), herald_events::EventError>(())
/// ```
pub struct Event {
    name: String,
    manager: Weak<Shared>,
    listeners: Vec<ListenerSlot>,
    attributes: Attributes,
    propagation_stopped: bool,
}

impl Event {
    /// Creates an event owned by `manager`.
    ///
    /// The event is not registered; pass it to [`EventManager::add_event`]
    /// for that.
    pub fn new(manager: &EventManager, name: impl Into<String>) -> Result<Self> {
        Self::bound(manager.handle().downgrade(), name.into())
    }

    /// Creates an event and adds each listener with priority 0.
    pub fn with_listeners<I>(
        manager: &EventManager,
        name: impl Into<String>,
        listeners: I,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = ListenerSpec>,
    {
        let mut event = Self::new(manager, name)?;
        for spec in listeners {
            event.add_listener(spec, 0, None)?;
        }
        Ok(event)
    }

    pub(crate) fn bound(manager: Weak<Shared>, name: String) -> Result<Self> {
        if name.is_empty() {
            return Err(EventError::InvalidEvent(
                "event name should not be empty".to_string(),
            ));
        }

        Ok(Self {
            name,
            manager,
            listeners: Vec::new(),
            attributes: Attributes::new(),
            propagation_stopped: false,
        })
    }

    pub(crate) fn rebind(&mut self, manager: Weak<Shared>) {
        self.manager = manager;
    }

    /// Attaches a listener.
    ///
    /// `priority` always applies, including to listener instances that already
    /// carry a priority of their own. `catcher` is attached when given.
    ///
    /// Identifiers are only accepted while the manager has lazy loading
    /// enabled, and must be registered in the manager's listener registry.
    /// They are validated here but constructed on each emission.
    pub fn add_listener(
        &mut self,
        spec: impl Into<ListenerSpec>,
        priority: i32,
        catcher: Option<Catcher>,
    ) -> Result<&mut Self> {
        let spec = spec.into();
        debug!(event = %self.name, kind = spec.kind(), priority, "adding listener");

        let slot = match spec {
            ListenerSpec::Instance(mut listener) => {
                listener.set_priority(priority);
                if let Some(catcher) = catcher {
                    listener.set_catcher(catcher);
                }
                ListenerSlot::Ready(listener)
            }
            ListenerSpec::Callback(callback) => {
                let mut entry = ListenerEntry::from_callback(priority, callback);
                if let Some(catcher) = catcher {
                    entry.catch(catcher);
                }
                ListenerSlot::Ready(Box::new(entry))
            }
            ListenerSpec::Identifier(identifier) => {
                let factory = self.resolve_lazy(&identifier)?;
                ListenerSlot::Pending(PendingListener {
                    identifier,
                    priority,
                    catcher,
                    factory,
                })
            }
        };

        self.listeners.push(slot);
        Ok(self)
    }

    fn resolve_lazy(&self, identifier: &str) -> Result<ListenerFactory> {
        let manager = self.manager().ok_or_else(|| {
            EventError::InvalidListener(format!(
                "cannot resolve '{identifier}': event '{}' has no manager",
                self.name
            ))
        })?;

        if !manager.lazy_loading_status() {
            return Err(EventError::InvalidListener(format!(
                "listener must be a listener instance, a callback, or (with lazy loading enabled) \
                 a registered identifier; identifier '{identifier}' given"
            )));
        }

        manager.resolve_listener(identifier)?.ok_or_else(|| {
            EventError::InvalidListener(format!(
                "'{identifier}' is not a registered listener identifier"
            ))
        })
    }

    /// Returns true if any listener is attached.
    pub fn has_listeners(&self) -> bool {
        !self.listeners.is_empty()
    }

    /// Returns the attached listeners in insertion order.
    pub fn listeners(&self) -> &[ListenerSlot] {
        &self.listeners
    }

    /// Returns the event name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the owning manager, if it is still alive.
    pub fn manager(&self) -> Option<ManagerHandle> {
        self.manager.upgrade().map(ManagerHandle::from_shared)
    }

    /// Sets a single attribute.
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Replaces all attributes.
    pub fn set_attributes(&mut self, attributes: Attributes) -> &mut Self {
        self.attributes = attributes;
        self
    }

    /// Returns true if the attribute is present.
    pub fn has_attribute(&self, key: &str) -> bool {
        self.attributes.contains_key(key)
    }

    /// Gets an attribute, `None` when absent.
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Returns all attributes.
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Removes an attribute.
    pub fn remove_attribute(&mut self, key: &str) -> &mut Self {
        self.attributes.remove(key);
        self
    }

    /// Returns true once propagation has been stopped.
    pub fn is_propagation_stopped(&self) -> bool {
        self.propagation_stopped
    }

    /// Sets or clears the propagation stop flag.
    pub fn set_propagation_stopped(&mut self, flag: bool) -> &mut Self {
        self.propagation_stopped = flag;
        self
    }

    /// Emits the event.
    ///
    /// Pending listeners are constructed fresh, then all listeners run in
    /// priority order until one halts, stops propagation, or fails without a
    /// catcher.
    pub fn emit(&mut self, data: Payload) -> Result<Emitted<'_>> {
        debug!(event = %self.name, listeners = self.listeners.len(), "emitting event");

        let slots = std::mem::take(&mut self.listeners);
        let result = emit_listeners(self, &slots, &data);
        self.listeners = slots;

        match result? {
            Some(replacement) => Ok(Emitted::Replaced(replacement)),
            None => Ok(Emitted::Original(self)),
        }
    }
}

impl EventLike for Event {
    fn name(&self) -> &str {
        &self.name
    }

    fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    fn attributes_mut(&mut self) -> &mut Attributes {
        &mut self.attributes
    }

    fn is_propagation_stopped(&self) -> bool {
        self.propagation_stopped
    }

    fn set_propagation_stopped(&mut self, flag: bool) {
        self.propagation_stopped = flag;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Emitter for Event {
    fn add_listener(
        &mut self,
        spec: ListenerSpec,
        priority: i32,
        catcher: Option<Catcher>,
    ) -> Result<()> {
        Event::add_listener(self, spec, priority, catcher).map(|_| ())
    }

    fn listeners(&self) -> &[ListenerSlot] {
        Event::listeners(self)
    }

    fn emit(&mut self, data: Payload) -> Result<Emitted<'_>> {
        Event::emit(self, data)
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("name", &self.name)
            .field("listeners", &self.listeners)
            .field("attributes", &self.attributes)
            .field("propagation_stopped", &self.propagation_stopped)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::catcher;
    use crate::registry::Instantiate;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    const EVENT_NAME: &str = "post.create";

    fn make_event(manager: &EventManager) -> Event {
        Event::new(manager, EVENT_NAME).unwrap()
    }

    fn recorder(log: &Arc<Mutex<Vec<String>>>, label: &str) -> ListenerSpec {
        let log = Arc::clone(log);
        let label = label.to_string();
        ListenerSpec::callback(move |_event, _data| {
            log.lock().unwrap().push(label.clone());
            Ok(Outcome::Continue)
        })
    }

    #[derive(Clone)]
    struct CustomListener {
        priority: i32,
    }

    impl Listener for CustomListener {
        fn priority(&self) -> i32 {
            self.priority
        }

        fn set_priority(&mut self, priority: i32) {
            self.priority = priority;
        }

        fn handle(&self, event: &mut dyn EventLike, _data: &Payload) -> ListenerResult {
            event.set_attribute("message", json!("from custom listener"));
            Ok(Outcome::Continue)
        }
    }

    impl Instantiate for CustomListener {
        fn instantiate(priority: i32) -> Self {
            Self { priority }
        }
    }

    fn lazy_manager() -> EventManager {
        let mut manager = EventManager::new();
        manager.register_listener::<CustomListener>("custom").unwrap();
        manager
    }

    #[test]
    fn test_event_init() {
        let manager = EventManager::new();
        let event = make_event(&manager);

        assert_eq!(event.name(), "post.create");
        assert!(event.attributes().is_empty());
        assert!(!event.has_listeners());
        assert!(!event.is_propagation_stopped());
    }

    #[test]
    fn test_empty_name_rejected() {
        let manager = EventManager::new();
        let result = Event::new(&manager, "");
        assert!(matches!(result, Err(EventError::InvalidEvent(_))));
    }

    #[test]
    fn test_with_listeners() {
        let manager = lazy_manager();
        manager.handle().set_lazy_loading(true);

        let event = Event::with_listeners(
            &manager,
            EVENT_NAME,
            vec![
                ListenerSpec::callback(|_event, _data| Ok(Outcome::Continue)),
                ListenerEntry::new(5).into(),
                "custom".into(),
            ],
        )
        .unwrap();

        assert!(event.has_listeners());
        assert_eq!(event.listeners().len(), 3);
        assert!(event.listeners()[2].is_pending());
        assert!(event.listeners().iter().all(|slot| slot.priority() == 0));

        manager.handle().set_lazy_loading(false);
        let result = Event::with_listeners(&manager, EVENT_NAME, vec!["custom".into()]);
        assert!(matches!(result, Err(EventError::InvalidListener(_))));
    }

    #[test]
    fn test_add_listener_kinds() {
        let manager = lazy_manager();
        let mut event = make_event(&manager);

        event
            .add_listener(ListenerSpec::callback(|_e, _d| Ok(Outcome::Continue)), 0, None)
            .unwrap();
        event.add_listener(ListenerEntry::new(0), 0, None).unwrap();
        assert_eq!(event.listeners().len(), 2);

        event.manager().unwrap().set_lazy_loading(true);
        event.add_listener("custom", 0, None).unwrap();
        assert_eq!(event.listeners().len(), 3);

        event.manager().unwrap().set_lazy_loading(false);
        let result = event.add_listener("custom", 0, None);
        assert!(matches!(result, Err(EventError::InvalidListener(_))));
        assert_eq!(event.listeners().len(), 3);
    }

    #[test]
    fn test_unknown_identifier_rejected() {
        let manager = EventManager::with_lazy_loading(true);
        let mut event = make_event(&manager);

        let result = event.add_listener("missing", 0, None);
        assert!(matches!(result, Err(EventError::InvalidListener(_))));
        assert!(!event.has_listeners());
    }

    #[test]
    fn test_identifier_after_manager_dropped() {
        let manager = EventManager::with_lazy_loading(true);
        let mut event = make_event(&manager);
        drop(manager);

        assert!(event.manager().is_none());
        let result = event.add_listener("custom", 0, None);
        assert!(matches!(result, Err(EventError::InvalidListener(_))));
    }

    #[test]
    fn test_instance_priority_overwritten() {
        let manager = EventManager::new();
        let mut event = make_event(&manager);

        event.add_listener(ListenerEntry::new(5), 0, None).unwrap();
        assert_eq!(event.listeners()[0].priority(), 0);

        event.add_listener(ListenerEntry::new(5), 12, None).unwrap();
        assert_eq!(event.listeners()[1].priority(), 12);
    }

    #[test]
    fn test_catcher_attached_to_instance() {
        let manager = EventManager::new();
        let mut event = make_event(&manager);
        let failing = ListenerEntry::with_callback(0, |_e, _d| Err("boom".into()));

        event
            .add_listener(
                failing,
                0,
                Some(catcher(|event, _err| {
                    event.set_attribute("recovered", json!(true));
                    Ok(Outcome::Continue)
                })),
            )
            .unwrap();

        let emitted = event.emit(Payload::new()).unwrap();
        assert_eq!(emitted.attribute("recovered"), Some(&json!(true)));
    }

    #[test]
    fn test_manager_back_reference() {
        let manager = EventManager::new();
        let event = make_event(&manager);

        assert!(event.manager().unwrap().ptr_eq(&manager.handle()));
        assert!(!event.manager().unwrap().ptr_eq(&EventManager::new().handle()));
    }

    #[test]
    fn test_attributes() {
        let manager = EventManager::new();
        let mut event = make_event(&manager);

        assert!(event.attribute("non_existing_attribute").is_none());
        event.set_attribute("model", "UserModel");
        assert!(event.has_attribute("model"));
        assert_eq!(event.attribute("model"), Some(&json!("UserModel")));

        let mut attrs = Attributes::new();
        attrs.insert("model".to_string(), json!("UserModel"));
        attrs.insert("post.title".to_string(), json!("lorem ipsum"));
        event.set_attributes(attrs);

        event.remove_attribute("model");
        assert!(!event.has_attribute("model"));

        let mut expected = Attributes::new();
        expected.insert("post.title".to_string(), json!("lorem ipsum"));
        assert_eq!(event.attributes(), &expected);
    }

    #[test]
    fn test_propagation_flag() {
        let manager = EventManager::new();
        let mut event = make_event(&manager);

        assert!(!event.is_propagation_stopped());
        event.set_propagation_stopped(true);
        assert!(event.is_propagation_stopped());
    }

    #[test]
    fn test_emit_runs_all_listeners() {
        let manager = EventManager::new();
        let mut event = make_event(&manager);

        event
            .add_listener(
                ListenerSpec::callback(|e, _d| {
                    e.set_attribute("listener 1", json!("dispatched"));
                    Ok(Outcome::Continue)
                }),
                0,
                None,
            )
            .unwrap()
            .add_listener(
                ListenerSpec::callback(|e, _d| {
                    e.set_attribute("listener 2", json!("dispatched"));
                    Ok(Outcome::Continue)
                }),
                0,
                None,
            )
            .unwrap();

        let emitted = event.emit(Payload::new()).unwrap();
        assert!(!emitted.is_replaced());
        assert_eq!(event.attribute("listener 1"), Some(&json!("dispatched")));
        assert_eq!(event.attribute("listener 2"), Some(&json!("dispatched")));
    }

    #[test]
    fn test_emit_priority_order_and_stability() {
        let manager = EventManager::new();
        let mut event = make_event(&manager);
        let log = Arc::new(Mutex::new(Vec::new()));

        event.add_listener(recorder(&log, "low"), -1, None).unwrap();
        event.add_listener(recorder(&log, "first zero"), 0, None).unwrap();
        event.add_listener(recorder(&log, "high"), 10, None).unwrap();
        event.add_listener(recorder(&log, "second zero"), 0, None).unwrap();

        event.emit(Payload::new()).unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["high", "first zero", "second zero", "low"]
        );
    }

    #[test]
    fn test_halt_stops_before_next_listener() {
        let manager = EventManager::new();
        let mut event = make_event(&manager);
        let log = Arc::new(Mutex::new(Vec::new()));

        event.add_listener(recorder(&log, "first"), 2, None).unwrap();
        event
            .add_listener(ListenerSpec::callback(|_e, _d| Ok(Outcome::Halt)), 1, None)
            .unwrap();
        event.add_listener(recorder(&log, "never"), 0, None).unwrap();

        event.emit(Payload::new()).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["first"]);
    }

    #[test]
    fn test_propagation_stop_ends_emission() {
        let manager = EventManager::new();
        let mut event = make_event(&manager);
        let log = Arc::new(Mutex::new(Vec::new()));

        let stop_log = Arc::clone(&log);
        event
            .add_listener(
                ListenerSpec::callback(move |e, _d| {
                    stop_log.lock().unwrap().push("listener 1".to_string());
                    e.set_propagation_stopped(true);
                    Ok(Outcome::Continue)
                }),
                0,
                None,
            )
            .unwrap();
        event.add_listener(recorder(&log, "listener 2"), 0, None).unwrap();

        event.emit(Payload::new()).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["listener 1"]);
        assert!(event.is_propagation_stopped());
    }

    #[test]
    fn test_uncaught_failure_propagates() {
        let manager = EventManager::new();
        let mut event = make_event(&manager);
        let log = Arc::new(Mutex::new(Vec::new()));

        event
            .add_listener(ListenerSpec::callback(|_e, _d| Err("exploded".into())), 1, None)
            .unwrap();
        event.add_listener(recorder(&log, "after"), 0, None).unwrap();

        let err = event.emit(Payload::new()).unwrap_err();
        assert_eq!(err.listener_error().unwrap().to_string(), "exploded");
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(event.listeners().len(), 2);
    }

    #[test]
    fn test_caught_failure_result_used() {
        let manager = EventManager::new();
        let mut event = make_event(&manager);
        let log = Arc::new(Mutex::new(Vec::new()));

        event
            .add_listener(
                ListenerSpec::callback(|_e, _d| Err("exploded".into())),
                1,
                Some(catcher(|_e, _err| Ok(Outcome::Halt))),
            )
            .unwrap();
        event.add_listener(recorder(&log, "after"), 0, None).unwrap();

        assert!(event.emit(Payload::new()).is_ok());
        assert!(log.lock().unwrap().is_empty());
    }

    #[derive(Default)]
    struct Draft {
        attributes: Attributes,
        stopped: bool,
        listeners: Vec<ListenerSlot>,
    }

    impl EventLike for Draft {
        fn name(&self) -> &str {
            "post.draft"
        }

        fn attributes(&self) -> &Attributes {
            &self.attributes
        }

        fn attributes_mut(&mut self) -> &mut Attributes {
            &mut self.attributes
        }

        fn is_propagation_stopped(&self) -> bool {
            self.stopped
        }

        fn set_propagation_stopped(&mut self, flag: bool) {
            self.stopped = flag;
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    impl Emitter for Draft {
        fn add_listener(
            &mut self,
            spec: ListenerSpec,
            priority: i32,
            catcher: Option<Catcher>,
        ) -> Result<()> {
            let mut listener: Box<dyn Listener> = match spec {
                ListenerSpec::Instance(listener) => listener,
                ListenerSpec::Callback(callback) => {
                    Box::new(ListenerEntry::from_callback(priority, callback))
                }
                ListenerSpec::Identifier(id) => {
                    return Err(EventError::InvalidListener(format!(
                        "drafts do not resolve identifiers, got '{id}'"
                    )))
                }
            };
            listener.set_priority(priority);
            if let Some(catcher) = catcher {
                listener.set_catcher(catcher);
            }
            self.listeners.push(ListenerSlot::Ready(listener));
            Ok(())
        }

        fn listeners(&self) -> &[ListenerSlot] {
            &self.listeners
        }

        fn emit(&mut self, data: Payload) -> Result<Emitted<'_>> {
            let slots = std::mem::take(&mut self.listeners);
            let result = emit_listeners(self, &slots, &data);
            self.listeners = slots;

            Ok(match result? {
                Some(next) => Emitted::Replaced(next),
                None => Emitted::Original(self),
            })
        }
    }

    #[test]
    fn test_replacement_flows_downstream() {
        let manager = EventManager::new();
        let mut event = make_event(&manager);

        event
            .add_listener(
                ListenerSpec::callback(|_e, _d| {
                    Ok(Outcome::Replace(Box::new(Draft::default())))
                }),
                10,
                None,
            )
            .unwrap();
        event
            .add_listener(
                ListenerSpec::callback(|e, _d| {
                    let seen = e.name().to_string();
                    e.set_attribute("seen_by_second", json!(seen));
                    Ok(Outcome::Continue)
                }),
                0,
                None,
            )
            .unwrap();

        let emitted = event.emit(Payload::new()).unwrap();
        assert!(emitted.is_replaced());
        assert_eq!(emitted.name(), "post.draft");
        assert_eq!(emitted.attribute("seen_by_second"), Some(&json!("post.draft")));

        let replacement = emitted.into_replacement().unwrap();
        assert!(replacement.as_any().downcast_ref::<Draft>().is_some());
        assert!(!event.has_attribute("seen_by_second"));
    }

    #[test]
    fn test_replacement_can_be_emitted() {
        let manager = EventManager::new();
        let mut event = make_event(&manager);
        event
            .add_listener(
                ListenerSpec::callback(|_e, _d| Ok(Outcome::Replace(Box::new(Draft::default())))),
                0,
                None,
            )
            .unwrap();

        let mut replacement = event.emit(Payload::new()).unwrap().into_replacement().unwrap();
        assert!(!replacement.has_listeners());

        replacement
            .add_listener(
                ListenerSpec::callback(|e, _d| {
                    e.set_attribute("published", json!(true));
                    Ok(Outcome::Continue)
                }),
                1,
                None,
            )
            .unwrap();
        assert!(replacement.has_listeners());
        assert!(replacement.add_listener("custom".into(), 0, None).is_err());

        let emitted = replacement.emit(Payload::new()).unwrap();
        assert!(!emitted.is_replaced());
        assert_eq!(emitted.attribute("published"), Some(&json!(true)));
    }

    #[test]
    fn test_emit_listeners_on_foreign_event() {
        let mut draft = Draft::default();
        let slots = vec![
            ListenerSlot::Ready(Box::new(ListenerEntry::with_callback(0, |e, _d| {
                e.set_attribute("order", json!("second"));
                Ok(Outcome::Continue)
            }))),
            ListenerSlot::Ready(Box::new(ListenerEntry::with_callback(5, |e, _d| {
                e.set_attribute("order", json!("first"));
                Ok(Outcome::Halt)
            }))),
        ];

        let replaced = emit_listeners(&mut draft, &slots, &Payload::new()).unwrap();

        assert!(replaced.is_none());
        assert_eq!(draft.attribute("order"), Some(&json!("first")));
    }

    #[test]
    fn test_lazy_listener_constructed_per_emit() {
        let mut manager = EventManager::with_lazy_loading(true);
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        manager
            .register_listener_with("custom", move |priority| {
                counter.fetch_add(1, Ordering::SeqCst);
                Box::new(CustomListener::instantiate(priority))
            })
            .unwrap();
        let mut event = make_event(&manager);

        event.add_listener("custom", 3, None).unwrap();
        assert_eq!(built.load(Ordering::SeqCst), 0);
        assert!(event.listeners()[0].is_pending());

        event.emit(Payload::new()).unwrap();
        assert_eq!(
            event.attribute("message"),
            Some(&json!("from custom listener"))
        );
        assert_eq!(built.load(Ordering::SeqCst), 1);

        event.emit(Payload::new()).unwrap();
        assert_eq!(built.load(Ordering::SeqCst), 2);
        assert!(event.listeners()[0].is_pending());
    }

    #[test]
    fn test_listeners_kept_across_emits() {
        let manager = EventManager::new();
        let mut event = make_event(&manager);
        let count = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&count);
        event
            .add_listener(
                ListenerSpec::callback(move |e, _d| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    e.set_attribute("runs", json!(counter.load(Ordering::SeqCst)));
                    Ok(Outcome::Continue)
                }),
                0,
                None,
            )
            .unwrap();

        event.emit(Payload::new()).unwrap();
        event.add_listener(ListenerEntry::new(0), 0, None).unwrap();
        event.emit(Payload::new()).unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(event.listeners().len(), 2);
        assert_eq!(event.attribute("runs"), Some(&json!(2)));
    }

    #[test]
    fn test_listeners_restored_after_failure() {
        let manager = EventManager::new();
        let mut event = make_event(&manager);
        event
            .add_listener(ListenerSpec::callback(|_e, _d| Err("boom".into())), 0, None)
            .unwrap();

        assert!(event.emit(Payload::new()).is_err());
        assert_eq!(event.listeners().len(), 1);
    }
}
