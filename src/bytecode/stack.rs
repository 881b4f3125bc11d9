//! A lenient symbolic operand stack.
//!
//! Tracks, per stack entry, the constant it holds, the slot or field it was
//! loaded from, and the origin tag attached by the detector. It models just
//! enough of the stack discipline for provenance: values are never computed,
//! underflow yields unknown entries, and stacks meeting at a jump target are
//! merged by forgetting whatever the incoming paths disagree on.

use super::{BranchKind, Constant, Instruction, InvokeKind, MethodBody, MethodDescriptor, Op};
use crate::core::{Address, Slot};
use crate::narrowing::{OperandStack, OriginTag};
use std::collections::{BTreeSet, HashMap};
use tracing::trace;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StackItem {
    pub constant: Option<Constant>,
    /// Slot the value was loaded from
    pub slot: Option<Slot>,
    /// Field the value was read from
    pub field: Option<String>,
    pub origin: Option<OriginTag>,
}

impl StackItem {
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn from_slot(slot: Slot) -> Self {
        Self {
            slot: Some(slot),
            ..Self::default()
        }
    }

    pub fn from_field(name: &str) -> Self {
        Self {
            field: Some(name.to_string()),
            ..Self::default()
        }
    }

    pub fn constant(value: Constant) -> Self {
        Self {
            constant: Some(value),
            ..Self::default()
        }
    }
}

#[derive(Debug, Default)]
pub struct SymbolicStack {
    items: Vec<StackItem>,
    handlers: BTreeSet<Address>,
    jump_entries: HashMap<Address, Vec<StackItem>>,
    /// False after an instruction that never falls through
    reachable: bool,
}

impl SymbolicStack {
    pub fn new(handlers: BTreeSet<Address>) -> Self {
        Self {
            items: Vec::new(),
            handlers,
            jump_entries: HashMap::new(),
            reachable: true,
        }
    }

    pub fn for_method(method: &MethodBody) -> Self {
        Self::new(method.handlers())
    }

    /// Prepares the stack for the instruction at `address`.
    pub fn enter(&mut self, address: Address) {
        if self.handlers.contains(&address) {
            self.jump_entries.remove(&address);
            self.items = vec![StackItem::unknown()];
            self.reachable = true;
            return;
        }
        match self.jump_entries.remove(&address) {
            Some(entry) if self.reachable => self.items = merge(&self.items, &entry),
            Some(entry) => self.items = entry,
            None if !self.reachable => self.items.clear(),
            None => {}
        }
        self.reachable = true;
    }

    /// Applies the stack effect of `insn`.
    pub fn apply(&mut self, insn: &Instruction) {
        match &insn.op {
            Op::Load { slot } => self.push(StackItem::from_slot(*slot)),
            Op::Store { .. } | Op::Pop | Op::PutStatic { .. } => self.pop(1),
            Op::Increment { .. } => {}
            Op::Const { value } => self.push(StackItem::constant(value.clone())),
            Op::Dup => {
                let top = self.items.last().cloned().unwrap_or_default();
                self.push(top);
            }
            Op::GetField { name, .. } => {
                self.pop(1);
                self.push(StackItem::from_field(name));
            }
            Op::PutField { .. } => self.pop(2),
            Op::GetStatic { name, .. } => self.push(StackItem::from_field(name)),
            Op::Invoke {
                kind, descriptor, ..
            } => {
                let parsed = MethodDescriptor::parse(descriptor);
                let receiver = usize::from(*kind != InvokeKind::Static);
                let arguments = parsed.as_ref().map_or(0, |d| d.argument_count());
                self.pop(arguments + receiver);
                if !parsed.is_some_and(|d| d.returns_void()) {
                    self.push(StackItem::unknown());
                }
            }
            Op::Branch { kind, target } => {
                match kind {
                    BranchKind::Unary => self.pop(1),
                    BranchKind::Binary => self.pop(2),
                    BranchKind::Goto => {}
                }
                if *target > insn.address {
                    self.record_jump(*target);
                }
                if *kind == BranchKind::Goto {
                    self.reachable = false;
                }
            }
            Op::Switch { default, offsets } => {
                self.pop(1);
                for offset in offsets.iter().chain(std::iter::once(default)) {
                    if let Ok(target) = Address::try_from(i64::from(insn.address) + i64::from(*offset)) {
                        self.record_jump(target);
                    }
                }
                self.reachable = false;
            }
            Op::MonitorEnter | Op::MonitorExit => self.pop(1),
            Op::Return { value } => {
                if *value {
                    self.pop(1);
                }
                self.reachable = false;
            }
            Op::Throw => {
                self.pop(1);
                self.reachable = false;
            }
            Op::Other { pops, pushes } => {
                self.pop(usize::from(*pops));
                for _ in 0..*pushes {
                    self.push(StackItem::unknown());
                }
            }
        }
    }

    /// Attaches an origin tag to the value on top of the stack.
    pub fn tag_top(&mut self, origin: OriginTag) {
        if let Some(top) = self.items.last_mut() {
            top.origin = Some(origin);
        }
    }

    fn push(&mut self, item: StackItem) {
        self.items.push(item);
    }

    fn pop(&mut self, count: usize) {
        if count > self.items.len() {
            trace!(count, depth = self.items.len(), "operand stack underflow");
        }
        let keep = self.items.len().saturating_sub(count);
        self.items.truncate(keep);
    }

    fn record_jump(&mut self, target: Address) {
        let entry = match self.jump_entries.remove(&target) {
            Some(existing) => merge(&existing, &self.items),
            None => self.items.clone(),
        };
        self.jump_entries.insert(target, entry);
    }
}

impl OperandStack for SymbolicStack {
    fn depth(&self) -> usize {
        self.items.len()
    }

    fn item(&self, depth: usize) -> Option<&StackItem> {
        self.items.iter().rev().nth(depth)
    }
}

fn merge(a: &[StackItem], b: &[StackItem]) -> Vec<StackItem> {
    if a.len() != b.len() {
        return a.to_vec();
    }
    a.iter()
        .zip(b)
        .map(|(x, y)| if x == y { x.clone() } else { StackItem::unknown() })
        .collect()
}
