//! Reconstructs block structure from control-flow edges.
//!
//! Blocks are discovered in address order, but their true nesting often only
//! shows later: an `if` body looks like a loop exit until its closing branch
//! is seen, and a goto may end an `if` or enter a loop condition. Each rule
//! below makes the best guess available at the current address and lets later
//! instructions correct it. A goto-derived block stays loop-like, and
//! therefore unreported, until evidence clears it.

use super::context::MethodContext;
use super::scope_block::{BlockFlags, ScopeBlock};
use crate::bytecode::BranchKind;
use crate::core::Address;
use tracing::{debug, trace};

impl MethodContext {
    /// Opens a try block when `address` begins a protected range.
    pub(crate) fn on_try_start(&mut self, address: Address) {
        let Some(&handler) = self.try_starts.get(&address) else {
            return;
        };
        if handler <= address {
            debug!(address, handler, "exception handler precedes its range");
            return;
        }
        let id = self.tree.insert(ScopeBlock::new(address, handler).with_flags(BlockFlags {
            is_try: true,
            ..BlockFlags::default()
        }));
        trace!(block = %self.tree.block(id), "try block");
    }

    pub(crate) fn on_branch(
        &mut self,
        address: Address,
        next: Address,
        kind: BranchKind,
        target: Address,
    ) {
        if target <= address {
            self.on_backward_branch(address, target);
        } else if kind == BranchKind::Goto {
            self.on_forward_jump(address, next, target);
        } else {
            self.on_forward_branch(address, target);
        }
    }

    fn on_forward_branch(&mut self, address: Address, target: Address) {
        if let Some(id) = self.tree.find_exited(address, target) {
            let block = self.tree.block(id);
            let flags = block.flags();
            if !flags.is_loop && !flags.is_case && block.children().is_empty() {
                if flags.is_goto {
                    // An else-part swallowed by a wider condition
                    self.tree.remove(id);
                } else {
                    // A further condition guarding the same body
                    let finish = block.finish();
                    self.tree.reshape(id, address, finish);
                    trace!(block = %self.tree.block(id), "condition moved block start");
                    return;
                }
            }
        }
        let id = self.tree.insert(ScopeBlock::new(address, target));
        trace!(block = %self.tree.block(id), "conditional block");
    }

    fn on_forward_jump(&mut self, address: Address, next: Address, target: Address) {
        if self.switch_targets.contains(&next) {
            // A break out of one case into the next
            return;
        }
        let block = match self.tree.find_exited(address, next) {
            // Skips over an else-part
            Some(_) => ScopeBlock::new(next, target).with_flags(BlockFlags {
                is_goto: true,
                ..BlockFlags::default()
            }),
            // Jumps to a loop condition, or out of an if; assume the loop
            None => ScopeBlock::new(address, target).with_flags(BlockFlags {
                is_loop: true,
                is_goto: true,
                ..BlockFlags::default()
            }),
        };
        let id = self.tree.insert(block);
        trace!(block = %self.tree.block(id), "goto block");
    }

    fn on_backward_branch(&mut self, address: Address, target: Address) {
        let Some(mut id) = self.tree.innermost(address) else {
            debug!(address, target, "backward branch outside every block");
            return;
        };
        while let Some(parent) = self.tree.block(id).parent() {
            if self.tree.block(parent).start() < target {
                break;
            }
            id = parent;
        }
        // The loop head may sit in a block that closed before this branch
        if self.tree.block(id).start() > target {
            if let Some(previous) = self.tree.previous_sibling(id) {
                if self.tree.block(previous).start() >= target {
                    id = previous;
                }
            }
        }
        self.tree.block_mut(id).flags.is_loop = true;
        trace!(block = %self.tree.block(id), "loop");
    }

    pub(crate) fn on_switch(&mut self, address: Address, default: i32, offsets: &[i32]) {
        if offsets.is_empty() {
            debug!(address, "switch without cases");
            return;
        }
        let mut targets: Vec<Address> = offsets
            .iter()
            .chain(std::iter::once(&default))
            .filter_map(|offset| Address::try_from(i64::from(address) + i64::from(*offset)).ok())
            .collect();
        targets.sort_unstable();
        targets.dedup();

        for pair in targets.windows(2) {
            self.tree.insert(ScopeBlock::new(pair[0], pair[1]).with_flags(BlockFlags {
                is_case: true,
                ..BlockFlags::default()
            }));
        }
        trace!(address, cases = targets.len(), "switch");
        self.switch_targets.extend(targets);
    }

    pub(crate) fn on_lock_acquire(&mut self, address: Address) {
        self.lock_regions.push(address);
        self.tree.insert(ScopeBlock::open(address).with_flags(BlockFlags {
            is_sync: true,
            ..BlockFlags::default()
        }));
    }

    pub(crate) fn on_lock_release(&mut self, address: Address) {
        let Some(start) = self.lock_regions.pop() else {
            // Exceptional exit of a region already closed on the normal path
            return;
        };
        if let Some(id) = self.tree.open_sync_block(start) {
            self.tree.block_mut(id).provisional = false;
            self.tree.reshape(id, start, address);
            trace!(block = %self.tree.block(id), "lock region closed");
        }
    }
}
