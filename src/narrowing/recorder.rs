//! Records slot reads and writes against the innermost scope block.

use super::context::MethodContext;
use super::detector::{LocalMetadata, OperandStack};
use super::origin::{Caller, OriginTag};
use super::risk::RiskPolicy;
use super::scope_block::ScopeBlock;
use crate::bytecode::{InvokeKind, MethodDescriptor, StackItem};
use crate::core::{Address, Slot};
use tracing::trace;

impl MethodContext {
    pub(crate) fn on_store(
        &mut self,
        address: Address,
        slot: Slot,
        stack: &dyn OperandStack,
        locals: &dyn LocalMetadata,
        policy: &RiskPolicy,
    ) {
        if self.catch_handlers.contains(&address) {
            self.ignore(slot, "stored in exception handler");
            self.split_at_handler(address);
        } else if !self.lock_regions.is_empty() {
            self.ignore(slot, "stored under lock");
        } else if self.saw_null {
            self.ignore(slot, "stored null");
        } else if locals
            .declared_type(slot, address)
            .is_some_and(|signature| policy.is_dangerous_store_type(signature))
        {
            self.ignore(slot, "dangerous declared type");
        }
        if self.is_ignored(slot) {
            return;
        }

        let Some(id) = self.tree.innermost(address) else {
            self.ignore(slot, "store outside every block");
            return;
        };
        let origin = stack.item(0).and_then(|value| {
            value
                .origin
                .clone()
                .or_else(|| value.slot.map(OriginTag::from_slot))
        });
        if origin.as_ref().is_some_and(|o| o.risky) {
            self.ignore(slot, "risky value");
            return;
        }

        let saw_dup = self.saw_dup;
        let block = self.tree.block_mut(id);
        block.record_write(slot, address, origin);
        if saw_dup {
            // The duplicate is consumed here as well
            block.record_read(slot, address);
        }
    }

    pub(crate) fn on_load(&mut self, address: Address, slot: Slot) {
        if self.is_ignored(slot) {
            return;
        }
        match self.tree.innermost(address) {
            Some(id) => self.tree.block_mut(id).record_read(slot, address),
            None => self.ignore(slot, "load outside every block"),
        }
    }

    /// An in-place increment reads and then writes the slot.
    pub(crate) fn on_increment(&mut self, address: Address, slot: Slot) {
        self.on_load(address, slot);

        if self.catch_handlers.contains(&address) {
            self.ignore(slot, "incremented in exception handler");
        } else if !self.lock_regions.is_empty() {
            self.ignore(slot, "incremented under lock");
        } else if self.saw_null {
            self.ignore(slot, "incremented after null");
        }
        if self.is_ignored(slot) {
            return;
        }
        match self.tree.innermost(address) {
            Some(id) => self.tree.block_mut(id).record_write(slot, address, None),
            None => self.ignore(slot, "increment outside every block"),
        }
    }

    /// Handles a call and returns the tag for its result, if it has one.
    pub(crate) fn on_invoke(
        &mut self,
        address: Address,
        kind: InvokeKind,
        (owner, name, descriptor): (&str, &str, &str),
        stack: &dyn OperandStack,
        policy: &RiskPolicy,
    ) -> Option<OriginTag> {
        if name == "wasNull" && descriptor == "()Z" {
            // The value read before this check is only meaningful where it was read
            self.suppressed = true;
        }
        let parsed = MethodDescriptor::parse(descriptor)?;

        let caller = match kind {
            InvokeKind::Static => Caller::Unknown,
            _ => stack
                .item(parsed.argument_count())
                .map_or(Caller::Unknown, caller_of),
        };
        if caller.is_known() {
            // State read through this object earlier may be stale now
            if let Some(id) = self.tree.innermost(address) {
                self.tree.forget_origin(id, &caller);
            }
        }

        if parsed.returns_void() {
            return None;
        }
        Some(OriginTag::new(
            caller,
            policy.is_risky_call(owner, name, descriptor),
        ))
    }

    pub(crate) fn on_get_field(&self, stack: &dyn OperandStack) -> Option<OriginTag> {
        let base = stack.item(0)?;
        match base.slot {
            Some(slot) => Some(OriginTag::from_slot(slot)),
            None => base.origin.clone(),
        }
    }

    pub(crate) fn on_put_field(&mut self, address: Address, stack: &dyn OperandStack) {
        let Some(base) = stack.item(1) else {
            return;
        };
        let caller = caller_of(base);
        if !caller.is_known() {
            return;
        }
        let Some(id) = self.tree.innermost(address) else {
            return;
        };
        if let Caller::Slot(slot) = caller {
            if self.tree.block_mut(id).writes.remove(&slot).is_some() {
                trace!(slot, address, "field write through slot cleared its store");
            }
        }
        self.tree.forget_origin(id, &caller);
    }

    /// Gives an exception handler that opens mid-block its own block.
    fn split_at_handler(&mut self, address: Address) {
        let Some(id) = self.tree.innermost(address) else {
            return;
        };
        let block = self.tree.block(id);
        if id == self.tree.root() || block.start() >= address {
            return;
        }
        let (start, finish) = (block.start(), block.finish());
        self.tree.reshape(id, start, address);
        self.tree.insert(ScopeBlock::new(address, finish));
    }
}

/// Identity of the object a stack value refers to.
fn caller_of(item: &StackItem) -> Caller {
    if let Some(caller) = item.origin.as_ref().map(|o| &o.caller).filter(|c| c.is_known()) {
        return caller.clone();
    }
    match (&item.slot, &item.field) {
        (Some(slot), _) => Caller::Slot(*slot),
        (None, Some(field)) => Caller::Field(field.clone()),
        (None, None) => Caller::Unknown,
    }
}
