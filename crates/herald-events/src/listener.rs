//! Listeners: prioritized units of reaction logic.
//!
//! A [`Listener`] reacts to an event through [`Listener::handle`]. The provided
//! [`Listener::process`] wraps that call with the listener's catcher, which is the
//! single place where listener errors are intercepted.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::{EventError, ListenerError, Result};
use crate::types::{EventLike, Outcome, Payload};

/// Result of a listener's own logic.
pub type ListenerResult = std::result::Result<Outcome, ListenerError>;

/// Callback invoked with the current event and the emission data.
pub type Callback = Arc<dyn Fn(&mut dyn EventLike, &Payload) -> ListenerResult + Send + Sync>;

/// Error interceptor invoked when a listener fails.
pub type Catcher = Arc<dyn Fn(&mut dyn EventLike, &ListenerError) -> ListenerResult + Send + Sync>;

/// Wraps a closure into a [`Callback`].
pub fn callback<F>(f: F) -> Callback
where
    F: Fn(&mut dyn EventLike, &Payload) -> ListenerResult + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wraps a closure into a [`Catcher`].
pub fn catcher<F>(f: F) -> Catcher
where
    F: Fn(&mut dyn EventLike, &ListenerError) -> ListenerResult + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Trait for listeners.
///
/// Implementors provide [`handle`](Listener::handle) and priority storage.
/// Catching is part of the trait: listeners without a catcher slot keep the
/// defaults, which report no catcher and ignore attempts to set one.
///
/// # Example
///
/// ```
/// use herald_events::{EventLike, Listener, ListenerResult, Outcome, Payload};
///
/// #[derive(Clone)]
/// struct Audit {
///     priority: i32,
/// }
///
/// impl Listener for Audit {
///     fn priority(&self) -> i32 {
///         self.priority
///     }
///
///     fn set_priority(&mut self, priority: i32) {
///         self.priority = priority;
///     }
///
///     fn handle(&self, event: &mut dyn EventLike, _data: &Payload) -> ListenerResult {
///         event.set_attribute("audited", true.into());
///         Ok(Outcome::Continue)
///     }
/// }
/// ```
pub trait Listener: ListenerClone + Send + Sync {
    /// Returns the priority. Higher runs first.
    fn priority(&self) -> i32;

    /// Sets the priority.
    fn set_priority(&mut self, priority: i32);

    /// Returns the catcher, if any.
    fn catcher(&self) -> Option<&Catcher> {
        None
    }

    /// Attaches a catcher. Listeners without a catcher slot ignore it.
    fn set_catcher(&mut self, _catcher: Catcher) {}

    /// Reacts to the event.
    fn handle(&self, event: &mut dyn EventLike, data: &Payload) -> ListenerResult;

    /// Runs [`handle`](Listener::handle), routing a failure through the catcher.
    ///
    /// Without a catcher the failure becomes [`EventError::ListenerFailed`].
    fn process(&self, event: &mut dyn EventLike, data: &Payload) -> Result<Outcome> {
        let failure = match self.handle(event, data) {
            Ok(outcome) => return Ok(outcome),
            Err(e) => e,
        };

        let name = event.name().to_string();
        match self.catcher() {
            Some(catcher) => {
                debug!(event = %name, error = %failure, "listener failure intercepted by catcher");
                catcher(event, &failure).map_err(|source| EventError::ListenerFailed {
                    event: name,
                    source,
                })
            }
            None => Err(EventError::ListenerFailed {
                event: name,
                source: failure,
            }),
        }
    }
}

/// Object-safe cloning for boxed listeners.
///
/// Implemented for every `Listener + Clone`, so deriving `Clone` is enough.
pub trait ListenerClone {
    /// Clones the listener into a new box.
    fn clone_box(&self) -> Box<dyn Listener>;
}

impl<T> ListenerClone for T
where
    T: Listener + Clone + 'static,
{
    fn clone_box(&self) -> Box<dyn Listener> {
        Box::new(self.clone())
    }
}

impl Clone for Box<dyn Listener> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

impl fmt::Debug for dyn Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("priority", &self.priority())
            .field("catcher", &self.catcher().is_some())
            .finish()
    }
}

/// A listener built from a callback closure.
///
/// This is what plain closures become when attached to an event.
#[derive(Clone, Default)]
pub struct ListenerEntry {
    priority: i32,
    callback: Option<Callback>,
    catcher: Option<Catcher>,
}

impl ListenerEntry {
    /// Creates a listener with the given priority and no callback.
    pub fn new(priority: i32) -> Self {
        Self {
            priority,
            callback: None,
            catcher: None,
        }
    }

    /// Creates a listener running `f`.
    pub fn with_callback<F>(priority: i32, f: F) -> Self
    where
        F: Fn(&mut dyn EventLike, &Payload) -> ListenerResult + Send + Sync + 'static,
    {
        Self::from_callback(priority, Arc::new(f))
    }

    /// Creates a listener from an existing callback.
    pub fn from_callback(priority: i32, callback: Callback) -> Self {
        Self {
            priority,
            callback: Some(callback),
            catcher: None,
        }
    }

    /// Returns the callback, if set.
    pub fn callback(&self) -> Option<&Callback> {
        self.callback.as_ref()
    }

    /// Replaces the callback.
    pub fn set_callback(&mut self, callback: Callback) -> &mut Self {
        self.callback = Some(callback);
        self
    }

    /// Sets the priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Attaches a catcher, for chaining.
    pub fn catch(&mut self, catcher: Catcher) -> &mut Self {
        self.catcher = Some(catcher);
        self
    }
}

impl Listener for ListenerEntry {
    fn priority(&self) -> i32 {
        self.priority
    }

    fn set_priority(&mut self, priority: i32) {
        self.priority = priority;
    }

    fn catcher(&self) -> Option<&Catcher> {
        self.catcher.as_ref()
    }

    fn set_catcher(&mut self, catcher: Catcher) {
        self.catcher = Some(catcher);
    }

    fn handle(&self, event: &mut dyn EventLike, data: &Payload) -> ListenerResult {
        match &self.callback {
            Some(callback) => callback(event, data),
            None => Ok(Outcome::Continue),
        }
    }
}

impl fmt::Debug for ListenerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerEntry")
            .field("priority", &self.priority)
            .field("callback", &self.callback.is_some())
            .field("catcher", &self.catcher.is_some())
            .finish()
    }
}
