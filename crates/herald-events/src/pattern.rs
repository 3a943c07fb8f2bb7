//! Event name patterns for bulk subscription.
//!
//! A name without `*` is an exact name. A name containing `*` is a wildcard
//! pattern: every `*` matches any sequence of characters. By default a
//! wildcard pattern matches if it occurs anywhere in the candidate name;
//! anchored patterns must cover the whole name.

use regex::Regex;

use crate::error::{EventError, Result};

/// The wildcard marker.
pub const WILDCARD: char = '*';

/// A resolved event name pattern.
#[derive(Debug, Clone)]
pub enum EventPattern {
    /// Matches exactly one name.
    Exact(String),
    /// Matches any name the expression is found in.
    Wildcard {
        /// The pattern as given.
        source: String,
        /// The compiled expression.
        regex: Regex,
    },
}

impl EventPattern {
    /// Parses a name, treating it as a wildcard pattern if it contains `*`.
    pub fn parse(name: &str, anchored: bool) -> Result<Self> {
        if !name.contains(WILDCARD) {
            return Ok(EventPattern::Exact(name.to_string()));
        }

        let body = regex::escape(name).replace(r"\*", "(.*?)");
        let expr = if anchored {
            format!("^{body}$")
        } else {
            body
        };
        let regex = Regex::new(&expr)
            .map_err(|e| EventError::InvalidEvent(format!("bad pattern '{name}': {e}")))?;

        Ok(EventPattern::Wildcard {
            source: name.to_string(),
            regex,
        })
    }

    /// Returns true if this is a wildcard pattern.
    pub fn is_wildcard(&self) -> bool {
        matches!(self, EventPattern::Wildcard { .. })
    }

    /// Returns the pattern as given.
    pub fn as_str(&self) -> &str {
        match self {
            EventPattern::Exact(name) => name,
            EventPattern::Wildcard { source, .. } => source,
        }
    }

    /// Checks a candidate event name against this pattern.
    pub fn matches(&self, name: &str) -> bool {
        match self {
            EventPattern::Exact(exact) => exact == name,
            EventPattern::Wildcard { regex, .. } => regex.is_match(name),
        }
    }
}
