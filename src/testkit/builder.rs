//! Fluent construction of [`MethodBody`] values.

use crate::bytecode::{
    BranchKind, Constant, ExceptionRange, Instruction, InvokeKind, LocalVariable, MethodBody, Op,
};
use crate::core::{Address, Slot};
use std::collections::HashMap;

enum Entry {
    Ready(Op),
    Branch { kind: BranchKind, label: String },
    Switch { default: String, cases: Vec<String> },
}

impl Entry {
    /// Encoded size, close enough to real class files for layout purposes.
    fn width(&self) -> Address {
        match self {
            Entry::Ready(op) => match op {
                Op::Load { slot } | Op::Store { slot } if *slot <= 3 => 1,
                Op::Load { .. } | Op::Store { .. } | Op::Const { .. } => 2,
                Op::Increment { .. } => 3,
                Op::GetField { .. }
                | Op::PutField { .. }
                | Op::GetStatic { .. }
                | Op::PutStatic { .. } => 3,
                Op::Invoke {
                    kind: InvokeKind::Interface,
                    ..
                } => 5,
                Op::Invoke { .. } => 3,
                _ => 1,
            },
            Entry::Branch { .. } => 3,
            Entry::Switch { cases, .. } => 12 + 4 * cases.len() as Address,
        }
    }
}

/// Builds a method instruction by instruction. Labels name the address of
/// the next instruction added (or the end of the code).
///
/// Referring to a label that is never defined panics in [`MethodBuilder::build`].
pub struct MethodBuilder {
    name: String,
    descriptor: String,
    is_static: bool,
    is_synthetic: bool,
    entries: Vec<Entry>,
    labels: HashMap<String, usize>,
    ranges: Vec<(String, String, String)>,
    locals: Vec<(Slot, String, String, String, String)>,
    with_locals: bool,
}

impl MethodBuilder {
    /// A static method; see [`MethodBuilder::instance`].
    pub fn new(name: &str, descriptor: &str) -> Self {
        Self {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            is_static: true,
            is_synthetic: false,
            entries: Vec::new(),
            labels: HashMap::new(),
            ranges: Vec::new(),
            locals: Vec::new(),
            with_locals: false,
        }
    }

    pub fn instance(mut self) -> Self {
        self.is_static = false;
        self
    }

    pub fn synthetic(mut self) -> Self {
        self.is_synthetic = true;
        self
    }

    pub fn label(mut self, name: &str) -> Self {
        self.labels.insert(name.to_string(), self.entries.len());
        self
    }

    pub fn op(mut self, op: Op) -> Self {
        self.entries.push(Entry::Ready(op));
        self
    }

    pub fn load(self, slot: Slot) -> Self {
        self.op(Op::Load { slot })
    }

    pub fn store(self, slot: Slot) -> Self {
        self.op(Op::Store { slot })
    }

    pub fn increment(self, slot: Slot, delta: i32) -> Self {
        self.op(Op::Increment { slot, delta })
    }

    pub fn const_int(self, value: i64) -> Self {
        self.op(Op::Const {
            value: Constant::Int(value),
        })
    }

    pub fn const_null(self) -> Self {
        self.op(Op::Const {
            value: Constant::Null,
        })
    }

    pub fn dup(self) -> Self {
        self.op(Op::Dup)
    }

    pub fn pop(self) -> Self {
        self.op(Op::Pop)
    }

    pub fn get_field(self, owner: &str, name: &str) -> Self {
        self.op(Op::GetField {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }

    pub fn put_field(self, owner: &str, name: &str) -> Self {
        self.op(Op::PutField {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }

    pub fn invoke(self, kind: InvokeKind, owner: &str, name: &str, descriptor: &str) -> Self {
        self.op(Op::Invoke {
            kind,
            owner: owner.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        })
    }

    pub fn invoke_virtual(self, owner: &str, name: &str, descriptor: &str) -> Self {
        self.invoke(InvokeKind::Virtual, owner, name, descriptor)
    }

    pub fn invoke_static(self, owner: &str, name: &str, descriptor: &str) -> Self {
        self.invoke(InvokeKind::Static, owner, name, descriptor)
    }

    pub fn branch(mut self, kind: BranchKind, label: &str) -> Self {
        self.entries.push(Entry::Branch {
            kind,
            label: label.to_string(),
        });
        self
    }

    /// Single-operand conditional branch, the shape of `if (!flag)`.
    pub fn if_false(self, label: &str) -> Self {
        self.branch(BranchKind::Unary, label)
    }

    /// Two-operand comparison branch.
    pub fn if_compare(self, label: &str) -> Self {
        self.branch(BranchKind::Binary, label)
    }

    pub fn goto(self, label: &str) -> Self {
        self.branch(BranchKind::Goto, label)
    }

    pub fn switch(mut self, default: &str, cases: &[&str]) -> Self {
        self.entries.push(Entry::Switch {
            default: default.to_string(),
            cases: cases.iter().map(|c| c.to_string()).collect(),
        });
        self
    }

    pub fn monitor_enter(self) -> Self {
        self.op(Op::MonitorEnter)
    }

    pub fn monitor_exit(self) -> Self {
        self.op(Op::MonitorExit)
    }

    pub fn return_void(self) -> Self {
        self.op(Op::Return { value: false })
    }

    pub fn return_value(self) -> Self {
        self.op(Op::Return { value: true })
    }

    pub fn throw(self) -> Self {
        self.op(Op::Throw)
    }

    /// Any instruction the analysis only needs the stack effect of.
    pub fn other(self, pops: u8, pushes: u8) -> Self {
        self.op(Op::Other { pops, pushes })
    }

    /// Protects `[start, end)` with a handler at `handler`.
    pub fn try_range(mut self, start: &str, end: &str, handler: &str) -> Self {
        self.ranges
            .push((start.to_string(), end.to_string(), handler.to_string()));
        self
    }

    /// Declares a local variable live over `[start, end)`.
    pub fn local(mut self, slot: Slot, name: &str, signature: &str, start: &str, end: &str) -> Self {
        self.with_locals = true;
        self.locals.push((
            slot,
            name.to_string(),
            signature.to_string(),
            start.to_string(),
            end.to_string(),
        ));
        self
    }

    /// Lays out the instructions and resolves every label.
    pub fn build(self) -> MethodBody {
        let mut addresses = Vec::with_capacity(self.entries.len() + 1);
        let mut next: Address = 0;
        for entry in &self.entries {
            addresses.push(next);
            next += entry.width();
        }
        addresses.push(next);
        let code_length = next;

        let resolve = |label: &str| -> Address {
            match self.labels.get(label) {
                Some(&index) => addresses[index],
                None => panic!("method `{}` refers to undefined label `{label}`", self.name),
            }
        };
        let offset = |from: Address, label: &str| -> i32 {
            (i64::from(resolve(label)) - i64::from(from)) as i32
        };

        let instructions = self
            .entries
            .iter()
            .zip(&addresses)
            .map(|(entry, &address)| {
                let op = match entry {
                    Entry::Ready(op) => op.clone(),
                    Entry::Branch { kind, label } => Op::Branch {
                        kind: *kind,
                        target: resolve(label),
                    },
                    Entry::Switch { default, cases } => Op::Switch {
                        default: offset(address, default),
                        offsets: cases.iter().map(|c| offset(address, c)).collect(),
                    },
                };
                Instruction { address, op }
            })
            .collect();

        let exception_table = self
            .ranges
            .iter()
            .map(|(start, end, handler)| ExceptionRange {
                start: resolve(start),
                end: resolve(end),
                handler: resolve(handler),
            })
            .collect();

        let local_variables = self.with_locals.then(|| {
            self.locals
                .iter()
                .map(|(slot, name, signature, start, end)| {
                    let start = resolve(start);
                    LocalVariable {
                        slot: *slot,
                        name: name.clone(),
                        signature: signature.clone(),
                        start,
                        length: resolve(end).saturating_sub(start),
                    }
                })
                .collect()
        });

        MethodBody {
            name: self.name.clone(),
            descriptor: self.descriptor.clone(),
            is_static: self.is_static,
            is_synthetic: self.is_synthetic,
            code_length,
            instructions,
            exception_table,
            local_variables,
        }
    }
}
