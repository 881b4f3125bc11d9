//! Per-method analysis state.

use super::scope_tree::ScopeTree;
use crate::bytecode::MethodBody;
use crate::core::{Address, Slot};
use std::collections::{BTreeMap, BTreeSet};
use tracing::trace;

/// Everything the forward pass accumulates for one method. A fresh context
/// is built at method entry; nothing survives into the next method.
#[derive(Debug, Clone)]
pub struct MethodContext {
    pub(crate) method: String,
    pub(crate) tree: ScopeTree,
    /// Slots never reported for this method
    pub(crate) ignored: BTreeSet<Slot>,
    /// Addresses of lock acquisitions not yet released, innermost last
    pub(crate) lock_regions: Vec<Address>,
    /// Start of each protected range and the handler of its first entry
    pub(crate) try_starts: BTreeMap<Address, Address>,
    pub(crate) catch_handlers: BTreeSet<Address>,
    pub(crate) switch_targets: BTreeSet<Address>,
    /// The previous instruction duplicated the top of the stack
    pub(crate) saw_dup: bool,
    /// The previous instruction pushed a null constant
    pub(crate) saw_null: bool,
    /// Reporting is off for this method
    pub(crate) suppressed: bool,
}

impl MethodContext {
    pub fn for_method(method: &MethodBody) -> Self {
        let mut try_starts = BTreeMap::new();
        for range in &method.exception_table {
            try_starts.entry(range.start).or_insert(range.handler);
        }
        Self {
            method: method.name.clone(),
            tree: ScopeTree::new(method.code_length),
            ignored: method.parameter_slots().into_iter().collect(),
            lock_regions: Vec::new(),
            try_starts,
            catch_handlers: method.handlers(),
            switch_targets: BTreeSet::new(),
            saw_dup: false,
            saw_null: false,
            suppressed: false,
        }
    }

    pub fn tree(&self) -> &ScopeTree {
        &self.tree
    }

    pub fn ignored(&self) -> &BTreeSet<Slot> {
        &self.ignored
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed
    }

    pub(crate) fn ignore(&mut self, slot: Slot, reason: &'static str) {
        if self.ignored.insert(slot) {
            trace!(method = %self.method, slot, reason, "ignoring slot");
        }
    }

    pub(crate) fn is_ignored(&self, slot: Slot) -> bool {
        self.ignored.contains(&slot)
    }
}
