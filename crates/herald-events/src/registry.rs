//! Listener registry for lazily constructed listeners.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::listener::Listener;

/// Builds a listener from its priority.
pub type ListenerFactory = Arc<dyn Fn(i32) -> Box<dyn Listener> + Send + Sync>;

/// Listeners that can be built from a priority alone.
///
/// Implementing this is what makes a type registrable by identifier.
pub trait Instantiate: Listener + Sized + 'static {
    /// Creates a new instance with the given priority.
    fn instantiate(priority: i32) -> Self;
}

/// Registry mapping listener identifiers to factories.
///
/// Events consult the registry when a listener is added by identifier, so an
/// unknown identifier is rejected before anything is constructed. The factory
/// itself only runs when the event is emitted.
///
/// # Example
///
/// ```
/// use herald_events::{Listener, ListenerEntry, ListenerRegistry};
///
/// let mut registry = ListenerRegistry::new();
/// registry.register_with("noop", |priority| Box::new(ListenerEntry::new(priority)));
///
/// let factory = registry.get("noop").unwrap();
/// assert_eq!(factory(7).priority(), 7);
/// ```
#[derive(Clone, Default)]
pub struct ListenerRegistry {
    factories: HashMap<String, ListenerFactory>,
}

impl ListenerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a type under an identifier.
    pub fn register<T: Instantiate>(&mut self, id: impl Into<String>) {
        self.register_with(id, |priority| Box::new(T::instantiate(priority)));
    }

    /// Registers a factory closure under an identifier.
    ///
    /// Registering the same identifier again replaces the previous factory.
    pub fn register_with<F>(&mut self, id: impl Into<String>, factory: F)
    where
        F: Fn(i32) -> Box<dyn Listener> + Send + Sync + 'static,
    {
        self.factories.insert(id.into(), Arc::new(factory));
    }

    /// Removes an identifier. Returns true if it was registered.
    pub fn unregister(&mut self, id: &str) -> bool {
        self.factories.remove(id).is_some()
    }

    /// Gets the factory for an identifier.
    pub fn get(&self, id: &str) -> Option<ListenerFactory> {
        self.factories.get(id).cloned()
    }

    /// Returns true if the identifier is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.factories.contains_key(id)
    }

    /// Lists all registered identifiers.
    pub fn list(&self) -> Vec<&str> {
        self.factories.keys().map(|s| s.as_str()).collect()
    }

    /// Returns the number of registered identifiers.
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("identifiers", &self.list())
            .finish()
    }
}
