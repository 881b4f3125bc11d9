pub mod errors;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use errors::{Error, Result, ResultExt};

/// Offset of an instruction within a method's code.
pub type Address = u32;

/// Index of a local variable slot in a method's frame.
pub type Slot = u16;

/// An assignment whose scope could be narrowed to the single block that uses it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Finding {
    pub class: Option<String>,
    pub method: String,
    /// Address of the store that could move
    pub address: Address,
    pub slot: Slot,
    /// Source-level name from the local variable table, when present
    pub local: Option<String>,
    /// The narrower block the assignment could move into
    pub scope_start: Address,
    pub scope_finish: Address,
    pub message: String,
}

impl Finding {
    pub fn new(
        method: impl Into<String>,
        address: Address,
        slot: Slot,
        local: Option<String>,
        scope: (Address, Address),
    ) -> Self {
        let (scope_start, scope_finish) = scope;
        let subject = match &local {
            Some(name) => format!("`{name}`"),
            None => format!("slot {slot}"),
        };
        Self {
            class: None,
            method: method.into(),
            address,
            slot,
            message: format!(
                "assignment to {subject} could be moved into the block at [{scope_start}, {scope_finish}) that uses it"
            ),
            local,
            scope_start,
            scope_finish,
        }
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.class {
            Some(class) => write!(f, "{}.{}@{}: {}", class, self.method, self.address, self.message),
            None => write!(f, "{}@{}: {}", self.method, self.address, self.message),
        }
    }
}
