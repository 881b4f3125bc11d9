//! Provenance tags carried by simulated stack values.

use crate::core::Slot;
use serde::{Deserialize, Serialize};

/// Object a value was obtained through.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Caller {
    /// An object held in a local slot
    Slot(Slot),
    /// An object read from a field
    Field(String),
    Unknown,
}

impl Caller {
    pub fn is_known(&self) -> bool {
        !matches!(self, Caller::Unknown)
    }
}

/// Where a stack value came from and whether moving its assignment is unsafe.
///
/// A value fetched from an object (a getter result or a field read) depends on
/// that object's state at the time of the fetch, so the tag remembers the
/// object. A risky value comes from a call whose result changes between
/// invocations (clocks, stream reads, iterators) and must never be moved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OriginTag {
    pub caller: Caller,
    pub risky: bool,
}

impl OriginTag {
    pub fn new(caller: Caller, risky: bool) -> Self {
        Self { caller, risky }
    }

    pub fn from_slot(slot: Slot) -> Self {
        Self::new(Caller::Slot(slot), false)
    }

    pub fn risky() -> Self {
        Self::new(Caller::Unknown, true)
    }
}
