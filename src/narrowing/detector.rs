//! The detector and the interfaces it needs from its host.
//!
//! A host walks a method's instructions in address order, keeping its own
//! operand stack. For every instruction it calls
//! [`ScopeNarrowingDetector::observe`] before applying the instruction to the
//! stack, then attaches the returned origin tag (if any) to the value the
//! instruction pushed. [`analyze_method`] is such a host for decoded listings.

use super::analyzer::find_narrowable;
use super::context::MethodContext;
use super::origin::OriginTag;
use super::risk::RiskPolicy;
use super::scope_tree::ScopeTree;
use crate::bytecode::{
    ClassListing, Constant, Instruction, MethodBody, Op, StackItem, SymbolicStack,
};
use crate::core::{Address, Finding, Result, Slot};
use rayon::prelude::*;
use tracing::{debug, debug_span};

/// Read access to the simulated operand stack; depth 0 is the top.
pub trait OperandStack {
    fn depth(&self) -> usize;
    fn item(&self, depth: usize) -> Option<&StackItem>;
}

/// Local variable table lookups.
pub trait LocalMetadata {
    /// Type signature of the variable held in `slot` at `address`.
    fn declared_type(&self, slot: Slot, address: Address) -> Option<&str>;

    fn local_name(&self, slot: Slot, address: Address) -> Option<&str>;

    /// Whether `slot` holds a variable written in source rather than one the
    /// compiler introduced.
    fn is_named_local(&self, slot: Slot, address: Address) -> bool {
        self.local_name(slot, address)
            .is_some_and(|name| !name.contains('$'))
    }
}

impl LocalMetadata for MethodBody {
    fn declared_type(&self, slot: Slot, address: Address) -> Option<&str> {
        self.stored_variable(slot, address)
            .map(|lv| lv.signature.as_str())
    }

    fn local_name(&self, slot: Slot, address: Address) -> Option<&str> {
        self.stored_variable(slot, address).map(|lv| lv.name.as_str())
    }
}

pub struct ScopeNarrowingDetector<'p> {
    policy: &'p RiskPolicy,
    context: Option<MethodContext>,
}

impl<'p> ScopeNarrowingDetector<'p> {
    pub fn new(policy: &'p RiskPolicy) -> Self {
        Self {
            policy,
            context: None,
        }
    }

    /// Resets all per-method state. Returns false when the method can't
    /// contain a narrowable assignment and the walk can be skipped.
    pub fn begin_method(&mut self, method: &MethodBody) -> bool {
        self.context = None;
        if method.is_synthetic {
            debug!(method = %method.name, "skipping synthetic method");
            return false;
        }
        if !method.instructions.iter().any(|insn| insn.op.is_branch()) {
            debug!(method = %method.name, "skipping method without branches");
            return false;
        }
        self.context = Some(MethodContext::for_method(method));
        true
    }

    /// Feeds one instruction, seen before its stack effect is applied.
    /// Returns the origin tag for the value it pushes, if it has one.
    pub fn observe(
        &mut self,
        insn: &Instruction,
        next: Address,
        stack: &dyn OperandStack,
        locals: &dyn LocalMetadata,
    ) -> Option<OriginTag> {
        let policy = self.policy;
        let ctx = self.context.as_mut()?;
        let address = insn.address;
        ctx.on_try_start(address);

        let origin = match &insn.op {
            Op::Store { slot } => {
                ctx.on_store(address, *slot, stack, locals, policy);
                None
            }
            Op::Load { slot } => {
                ctx.on_load(address, *slot);
                None
            }
            Op::Increment { slot, .. } => {
                ctx.on_increment(address, *slot);
                None
            }
            Op::Invoke {
                kind,
                owner,
                name,
                descriptor,
            } => ctx.on_invoke(
                address,
                *kind,
                (owner.as_str(), name.as_str(), descriptor.as_str()),
                stack,
                policy,
            ),
            Op::GetField { .. } => ctx.on_get_field(stack),
            Op::PutField { .. } => {
                ctx.on_put_field(address, stack);
                None
            }
            Op::Branch { kind, target } => {
                ctx.on_branch(address, next, *kind, *target);
                None
            }
            Op::Switch { default, offsets } => {
                ctx.on_switch(address, *default, offsets);
                None
            }
            Op::MonitorEnter => {
                ctx.on_lock_acquire(address);
                None
            }
            Op::MonitorExit => {
                ctx.on_lock_release(address);
                None
            }
            _ => None,
        };

        ctx.saw_dup = matches!(insn.op, Op::Dup);
        ctx.saw_null = matches!(
            insn.op,
            Op::Const {
                value: Constant::Null
            }
        );
        origin
    }

    /// Narrowable assignments in the method walked so far. Doesn't consume
    /// any state, so asking twice gives the same answer.
    pub fn findings(&self, locals: &dyn LocalMetadata) -> Vec<Finding> {
        let Some(ctx) = &self.context else {
            return Vec::new();
        };
        if ctx.is_suppressed() {
            debug!(method = %ctx.method, "reporting suppressed");
            return Vec::new();
        }
        find_narrowable(ctx.tree(), ctx.ignored(), locals)
            .into_iter()
            .map(|n| {
                Finding::new(
                    ctx.method.clone(),
                    n.address,
                    n.slot,
                    locals.local_name(n.slot, n.address).map(str::to_string),
                    (n.scope_start, n.scope_finish),
                )
            })
            .collect()
    }

    /// Reports the method's findings and drops its state.
    pub fn finish_method(&mut self, locals: &dyn LocalMetadata) -> Vec<Finding> {
        let findings = self.findings(locals);
        self.context = None;
        findings
    }

    pub fn context(&self) -> Option<&MethodContext> {
        self.context.as_ref()
    }

    pub fn tree(&self) -> Option<&ScopeTree> {
        self.context.as_ref().map(MethodContext::tree)
    }
}

/// Runs the detector over one decoded method.
pub fn analyze_method(method: &MethodBody, policy: &RiskPolicy) -> Result<Vec<Finding>> {
    let _span = debug_span!("analyze_method", method = %method.name).entered();
    method.validate()?;

    let mut detector = ScopeNarrowingDetector::new(policy);
    if !detector.begin_method(method) {
        return Ok(Vec::new());
    }
    let mut stack = SymbolicStack::for_method(method);
    for (index, insn) in method.instructions.iter().enumerate() {
        stack.enter(insn.address);
        let origin = detector.observe(insn, method.next_address(index), &stack, method);
        stack.apply(insn);
        if let Some(origin) = origin {
            stack.tag_top(origin);
        }
    }
    if let Some(tree) = detector.tree() {
        debug!(blocks = tree.len(), "scope tree built");
    }
    Ok(detector.finish_method(method))
}

/// Analyzes every method of a class in parallel.
pub fn analyze_listing(listing: &ClassListing, policy: &RiskPolicy) -> Result<Vec<Finding>> {
    let per_method = listing
        .methods
        .par_iter()
        .map(|method| analyze_method(method, policy))
        .collect::<Result<Vec<_>>>()?;
    Ok(per_method
        .into_iter()
        .flatten()
        .map(|finding| finding.with_class(&listing.class))
        .collect())
}
