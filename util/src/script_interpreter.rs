//! # Timed script interpreter
//!
//! Scripts are text files of timed JSON items, one per statement:
//!
//! ```text
//! 0.0: {"SetAxes": {"left": 0.5, "right": 0.5}};
//! 2.5: {"SetAxes": {"left": 0.0, "right": 0.0}};
//! ```
//!
//! The number before the colon is the time in seconds, relative to the start of the session, at
//! which the item becomes due. Anything not matching this form (comments for instance) is ignored.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use regex::RegexBuilder;
use serde::de::DeserializeOwned;
use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use thiserror::Error;

// Internal
use crate::session::get_elapsed_seconds;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Matches `<time>: <item>;` at the start of a line.
const STATEMENT_PATTERN: &str = r"^\s*(\d+(\.\d+)?)\s*:\s*([^;]*);";

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// An item which is scripted to occur at a specific time.
#[derive(Debug)]
struct Timed<T> {
    /// The time the item becomes due
    exec_time_s: f64,

    item: T,
}

/// A script interpreter.
///
/// After loading a script use `.get_pending` to acquire the items which are due.
#[derive(Debug)]
pub struct ScriptInterpreter<T> {
    items: VecDeque<Timed<T>>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("Could not load the script: {0}")]
    ScriptLoadError(std::io::Error),

    #[error("The script is empty (or is so bad it can't be read)")]
    ScriptEmpty,

    #[error("Script contains an invalid timestamp: {0}. Should be a float (like 1.0)")]
    InvalidTimestamp(String),

    #[error("Script contains an invalid item at {0} s: {1}")]
    InvalidItem(f64, serde_json::Error),

    #[error("Script items are out of order, {1} s comes after {0} s")]
    OutOfOrder(f64, f64),

    #[error("Could not build the script pattern: {0}")]
    PatternError(regex::Error),
}

/// Items released by the interpreter.
#[derive(Debug, PartialEq)]
pub enum PendingItems<T> {
    /// Nothing is due yet.
    None,

    /// These items are due, in script order.
    Some(Vec<T>),

    /// Every item has been released.
    EndOfScript,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<T> ScriptInterpreter<T>
where
    T: DeserializeOwned,
{
    /// Load a script from the given path.
    pub fn new<P: AsRef<Path>>(script_path: P) -> Result<Self, ScriptError> {
        let script = fs::read_to_string(script_path).map_err(ScriptError::ScriptLoadError)?;

        Self::from_script(&script)
    }

    /// Parse a script held in a string.
    pub fn from_script(script: &str) -> Result<Self, ScriptError> {
        let re = RegexBuilder::new(STATEMENT_PATTERN)
            .multi_line(true)
            .build()
            .map_err(ScriptError::PatternError)?;

        let mut items: VecDeque<Timed<T>> = VecDeque::new();

        for cap in re.captures_iter(script) {
            let (time_str, item_str) = match (cap.get(1), cap.get(3)) {
                (Some(t), Some(i)) => (t.as_str(), i.as_str()),
                _ => continue,
            };

            let exec_time_s: f64 = time_str
                .parse()
                .map_err(|e| ScriptError::InvalidTimestamp(format!("{}", e)))?;

            if let Some(last) = items.back() {
                if exec_time_s < last.exec_time_s {
                    return Err(ScriptError::OutOfOrder(last.exec_time_s, exec_time_s));
                }
            }

            let item = serde_json::from_str(item_str)
                .map_err(|e| ScriptError::InvalidItem(exec_time_s, e))?;

            items.push_back(Timed { exec_time_s, item });
        }

        if items.is_empty() {
            return Err(ScriptError::ScriptEmpty);
        }

        Ok(ScriptInterpreter { items })
    }
}

impl<T> ScriptInterpreter<T> {
    /// Return the items which are due at the current session time.
    pub fn get_pending(&mut self) -> PendingItems<T> {
        self.get_pending_at(get_elapsed_seconds())
    }

    /// Return the items which are due at the given time.
    pub fn get_pending_at(&mut self, current_time_s: f64) -> PendingItems<T> {
        if self.items.is_empty() {
            return PendingItems::EndOfScript;
        }

        let mut due = Vec::new();

        while let Some(front) = self.items.front() {
            if front.exec_time_s > current_time_s {
                break;
            }
            if let Some(t) = self.items.pop_front() {
                due.push(t.item);
            }
        }

        if due.is_empty() {
            PendingItems::None
        } else {
            PendingItems::Some(due)
        }
    }

    /// Get the number of items left in the script
    pub fn get_num_items(&self) -> usize {
        self.items.len()
    }

    /// Get the length of the script in seconds
    pub fn get_duration(&self) -> f64 {
        match self.items.back() {
            Some(c) => c.exec_time_s,
            None => 0f64,
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
