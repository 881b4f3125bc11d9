//! Post-pass over a finished scope tree.
//!
//! A write is narrowable when its own block never reads the slot, no
//! enclosing block touches it, and exactly one child block (with whatever is
//! nested inside) does. The traversal only reads the tree, so running it
//! twice gives the same answer.

use super::detector::LocalMetadata;
use super::scope_tree::ScopeTree;
use super::scope_block::BlockId;
use crate::core::{Address, Slot};
use im::HashSet;
use std::collections::BTreeSet;

/// A write that could move into a narrower block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Narrowing {
    pub address: Address,
    pub slot: Slot,
    pub scope_start: Address,
    pub scope_finish: Address,
}

pub fn find_narrowable(
    tree: &ScopeTree,
    ignored: &BTreeSet<Slot>,
    locals: &dyn LocalMetadata,
) -> Vec<Narrowing> {
    let mut found = Vec::new();
    visit(tree, tree.root(), &HashSet::new(), ignored, locals, &mut found);
    found.sort();
    found
}

fn visit(
    tree: &ScopeTree,
    id: BlockId,
    used: &HashSet<Slot>,
    ignored: &BTreeSet<Slot>,
    locals: &dyn LocalMetadata,
    found: &mut Vec<Narrowing>,
) {
    let block = tree.block(id);
    let mut used_below = used.clone();
    used_below.extend(block.writes().keys().copied());
    used_below.extend(block.reads().keys().copied());

    if !block.flags().is_loop {
        for (&slot, &address) in block.writes() {
            if block.reads().contains_key(&slot)
                || used.contains(&slot)
                || ignored.contains(&slot)
            {
                continue;
            }
            let Some(user) = sole_user(tree, id, slot) else {
                continue;
            };
            if !locals.is_named_local(slot, address) {
                continue;
            }
            let scope = tree.block(user);
            found.push(Narrowing {
                address,
                slot,
                scope_start: scope.start(),
                scope_finish: scope.finish(),
            });
        }
    }

    for &child in block.children() {
        visit(tree, child, &used_below, ignored, locals, found);
    }
}

/// The one direct child of `id` whose subtree uses `slot`, unless that use
/// sits somewhere an assignment can't move.
fn sole_user(tree: &ScopeTree, id: BlockId, slot: Slot) -> Option<BlockId> {
    let mut users = tree
        .block(id)
        .children()
        .iter()
        .copied()
        .filter(|&child| tree.uses_slot(child, slot));
    let user = users.next()?;
    if users.next().is_some() || tree.block(user).rejects_narrowing() {
        return None;
    }
    Some(user)
}
