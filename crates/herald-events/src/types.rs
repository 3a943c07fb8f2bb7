//! Shared value types and the event capability.

use std::any::Any;
use std::fmt;

use serde_json::{Map, Value};

use crate::event::Emitter;

/// Key/value bag carried on an event.
pub type Attributes = Map<String, Value>;

/// Data handed to every listener of a single emission.
pub type Payload = Map<String, Value>;

/// The capability listeners see while an event is being emitted.
///
/// [`Event`](crate::Event) implements it, but listeners may hand back any
/// [`Emitter`] through [`Outcome::Replace`], and the remaining listeners then
/// work on that value instead.
pub trait EventLike: Send + Sync {
    /// Returns the event name.
    fn name(&self) -> &str;

    /// Returns all attributes.
    fn attributes(&self) -> &Attributes;

    /// Returns all attributes for modification.
    fn attributes_mut(&mut self) -> &mut Attributes;

    /// Returns true once a listener has asked to stop propagation.
    fn is_propagation_stopped(&self) -> bool;

    /// Sets or clears the propagation stop flag.
    fn set_propagation_stopped(&mut self, flag: bool);

    /// Allows downcasting to the concrete event type.
    fn as_any(&self) -> &dyn Any;

    /// Sets a single attribute.
    fn set_attribute(&mut self, key: &str, value: Value) {
        self.attributes_mut().insert(key.to_string(), value);
    }

    /// Gets an attribute, `None` when absent.
    fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes().get(key)
    }

    /// Returns true if the attribute is present.
    fn has_attribute(&self, key: &str) -> bool {
        self.attributes().contains_key(key)
    }

    /// Removes an attribute.
    fn remove_attribute(&mut self, key: &str) {
        self.attributes_mut().remove(key);
    }

    /// Replaces all attributes.
    fn set_attributes(&mut self, attributes: Attributes) {
        *self.attributes_mut() = attributes;
    }
}

impl fmt::Debug for dyn EventLike {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLike")
            .field("name", &self.name())
            .field("attributes", self.attributes())
            .field("propagation_stopped", &self.is_propagation_stopped())
            .finish()
    }
}

/// What a listener hands back after reacting to an event.
pub enum Outcome {
    /// Pass the current event on to the next listener.
    Continue,
    /// Stop the emission; no further listener runs.
    Halt,
    /// Hand a different event to the remaining listeners and to the caller.
    Replace(Box<dyn Emitter>),
}

impl Outcome {
    /// Returns true if this outcome stops the emission.
    pub fn is_halt(&self) -> bool {
        matches!(self, Outcome::Halt)
    }
}

impl From<bool> for Outcome {
    fn from(proceed: bool) -> Self {
        if proceed {
            Outcome::Continue
        } else {
            Outcome::Halt
        }
    }
}

impl fmt::Debug for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Continue => f.write_str("Continue"),
            Outcome::Halt => f.write_str("Halt"),
            Outcome::Replace(event) => f.debug_tuple("Replace").field(&event.name()).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use crate::manager::EventManager;
    use serde_json::json;

    #[derive(Default)]
    struct Note {
        attributes: Attributes,
        stopped: bool,
    }

    impl EventLike for Note {
        fn name(&self) -> &str {
            "note"
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

    #[test]
    fn test_attribute_defaults() {
        let mut note = Note::default();
        assert!(note.attribute("model").is_none());

        note.set_attribute("model", json!("UserModel"));
        assert!(note.has_attribute("model"));
        assert_eq!(note.attribute("model"), Some(&json!("UserModel")));

        note.remove_attribute("model");
        assert!(!note.has_attribute("model"));
    }

    #[test]
    fn test_set_attributes_replaces_all() {
        let mut note = Note::default();
        note.set_attribute("old", json!(1));

        let mut attrs = Attributes::new();
        attrs.insert("new".to_string(), json!(2));
        note.set_attributes(attrs.clone());

        assert_eq!(note.attributes(), &attrs);
    }

    #[test]
    fn test_outcome_from_bool() {
        assert!(matches!(Outcome::from(true), Outcome::Continue));
        assert!(Outcome::from(false).is_halt());
    }

    #[test]
    fn test_outcome_debug_names_replacement() {
        let manager = EventManager::new();
        let note = Event::new(&manager, "note").unwrap();
        let outcome = Outcome::Replace(Box::new(note));
        assert_eq!(format!("{:?}", outcome), "Replace(\"note\")");
    }
}
