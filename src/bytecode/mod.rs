//! Decoded method listings.
//!
//! A listing is the instruction stream of one or more methods with operands
//! already resolved: branch targets are absolute, switch tables carry offsets
//! relative to the switch instruction, and calls carry their owner, name and
//! descriptor. Listings are read from JSON.

pub mod descriptor;
pub mod stack;

use crate::core::{Address, Error, Result, Slot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub use descriptor::MethodDescriptor;
pub use stack::{StackItem, SymbolicStack};

/// All methods of one class.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassListing {
    pub class: String,
    #[serde(default)]
    pub methods: Vec<MethodBody>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MethodBody {
    pub name: String,
    pub descriptor: String,
    #[serde(default)]
    pub is_static: bool,
    #[serde(default)]
    pub is_synthetic: bool,
    /// Address one past the last instruction
    pub code_length: Address,
    pub instructions: Vec<Instruction>,
    #[serde(default)]
    pub exception_table: Vec<ExceptionRange>,
    /// `None` when the method was compiled without debug information
    #[serde(default)]
    pub local_variables: Option<Vec<LocalVariable>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Instruction {
    pub address: Address,
    #[serde(flatten)]
    pub op: Op,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    Load { slot: Slot },
    Store { slot: Slot },
    Increment { slot: Slot, delta: i32 },
    Const { value: Constant },
    Dup,
    Pop,
    GetField { owner: String, name: String },
    PutField { owner: String, name: String },
    GetStatic { owner: String, name: String },
    PutStatic { owner: String, name: String },
    Invoke {
        kind: InvokeKind,
        owner: String,
        name: String,
        descriptor: String,
    },
    Branch { kind: BranchKind, target: Address },
    /// `offsets` and `default` are relative to the switch's own address
    Switch { default: i32, offsets: Vec<i32> },
    MonitorEnter,
    MonitorExit,
    Return {
        #[serde(default)]
        value: bool,
    },
    Throw,
    /// Anything else, described only by its stack effect
    Other { pops: u8, pushes: u8 },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InvokeKind {
    Static,
    Virtual,
    Interface,
    Special,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BranchKind {
    /// Compares one operand, e.g. against zero or null
    Unary,
    /// Compares two operands
    Binary,
    /// Unconditional jump
    Goto,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Constant {
    Null,
    Int(i64),
    Float(f64),
    Str(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExceptionRange {
    pub start: Address,
    pub end: Address,
    pub handler: Address,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LocalVariable {
    pub slot: Slot,
    pub name: String,
    pub signature: String,
    pub start: Address,
    pub length: Address,
}

impl LocalVariable {
    fn covers(&self, address: Address) -> bool {
        address >= self.start && address < self.start.saturating_add(self.length)
    }
}

impl Op {
    pub fn is_branch(&self) -> bool {
        matches!(self, Op::Branch { .. } | Op::Switch { .. })
    }
}

impl MethodBody {
    /// Address of the instruction following the one at `index`.
    pub fn next_address(&self, index: usize) -> Address {
        self.instructions
            .get(index + 1)
            .map_or(self.code_length, |insn| insn.address)
    }

    pub fn handlers(&self) -> BTreeSet<Address> {
        self.exception_table.iter().map(|r| r.handler).collect()
    }

    /// Receiver and parameter slots, which hold values the method never assigned.
    pub fn parameter_slots(&self) -> Vec<Slot> {
        let mut slots: Vec<Slot> = MethodDescriptor::parse(&self.descriptor)
            .map(|d| d.parameter_slots(!self.is_static))
            .unwrap_or_default();
        if !self.is_static {
            slots.insert(0, 0);
        }
        slots
    }

    pub fn local_variable(&self, slot: Slot, address: Address) -> Option<&LocalVariable> {
        self.local_variables
            .as_deref()?
            .iter()
            .find(|lv| lv.slot == slot && lv.covers(address))
    }

    /// Local variable assigned by a store at `address`. A variable's range
    /// usually opens at the instruction after its first store.
    pub fn stored_variable(&self, slot: Slot, address: Address) -> Option<&LocalVariable> {
        self.local_variable(slot, address).or_else(|| {
            let index = self
                .instructions
                .binary_search_by_key(&address, |insn| insn.address)
                .ok()?;
            self.local_variable(slot, self.next_address(index))
        })
    }

    /// Checks the structural guarantees the analysis relies on.
    pub fn validate(&self) -> Result<()> {
        let fail = |message: String| Err(Error::malformed(&self.name, message));

        if MethodDescriptor::parse(&self.descriptor).is_none() {
            return fail(format!("unparseable descriptor {}", self.descriptor));
        }
        for pair in self.instructions.windows(2) {
            if pair[1].address <= pair[0].address {
                return fail(format!(
                    "instruction at {} does not follow {}",
                    pair[1].address, pair[0].address
                ));
            }
        }
        if let Some(last) = self.instructions.last() {
            if last.address >= self.code_length {
                return fail(format!(
                    "code length {} does not cover instruction at {}",
                    self.code_length, last.address
                ));
            }
        }
        for insn in &self.instructions {
            match &insn.op {
                Op::Branch { target, .. } if *target >= self.code_length => {
                    return fail(format!(
                        "branch at {} targets {} outside the code",
                        insn.address, target
                    ));
                }
                Op::Switch { default, offsets } => {
                    for offset in offsets.iter().chain(std::iter::once(default)) {
                        let target = i64::from(insn.address) + i64::from(*offset);
                        if target < 0 || target >= i64::from(self.code_length) {
                            return fail(format!(
                                "switch at {} targets {} outside the code",
                                insn.address, target
                            ));
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}
