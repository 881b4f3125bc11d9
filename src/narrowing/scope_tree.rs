//! Arena of scope blocks.
//!
//! Blocks are addressed by [`BlockId`] and link to their parent by index, so
//! re-parenting and removal never fight the borrow checker. Every edit goes
//! through [`ScopeTree::insert`], [`ScopeTree::reshape`] or
//! [`ScopeTree::remove`], which keep these invariants:
//!
//! - a child's interval lies within its parent's
//! - siblings are sorted by start and never overlap
//! - the root spans the whole method
//!
//! A block that no longer fits after an edit is clamped; a descendant pushed
//! entirely outside its ancestor is evicted and re-inserted from the root.

use super::origin::Caller;
use super::scope_block::{BlockId, ScopeBlock};
use crate::core::{Address, Slot};
use std::fmt::Write as _;

#[derive(Debug, Clone)]
pub struct ScopeTree {
    blocks: Vec<ScopeBlock>,
    root: BlockId,
}

impl ScopeTree {
    pub fn new(code_length: Address) -> Self {
        Self {
            blocks: vec![ScopeBlock::new(0, code_length)],
            root: BlockId(0),
        }
    }

    pub fn root(&self) -> BlockId {
        self.root
    }

    pub fn block(&self, id: BlockId) -> &ScopeBlock {
        &self.blocks[id.0]
    }

    pub(crate) fn block_mut(&mut self, id: BlockId) -> &mut ScopeBlock {
        &mut self.blocks[id.0]
    }

    /// Number of blocks currently in the tree, root included.
    pub fn len(&self) -> usize {
        self.blocks.iter().filter(|b| !b.removed).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts `block` under the deepest existing block containing its start.
    pub fn insert(&mut self, block: ScopeBlock) -> BlockId {
        let id = BlockId(self.blocks.len());
        self.blocks.push(block);
        self.attach(id);
        id
    }

    /// Gives a block a new interval and re-homes it and its children.
    pub fn reshape(&mut self, id: BlockId, start: Address, finish: Address) {
        if id == self.root {
            return;
        }
        self.detach(id);
        let children = std::mem::take(&mut self.block_mut(id).children);
        {
            let block = self.block_mut(id);
            block.start = start;
            block.finish = finish.max(start);
        }
        self.attach(id);
        for child in children {
            self.block_mut(child).parent = None;
            self.attach(child);
        }
    }

    /// Removes a block, handing its reads, writes and children to its parent.
    pub fn remove(&mut self, id: BlockId) {
        let Some(parent) = self.block(id).parent else {
            return;
        };
        let position = self.position_in_parent(id, parent);

        let removed = self.block_mut(id);
        removed.removed = true;
        removed.parent = None;
        let writes = std::mem::take(&mut removed.writes);
        let reads = std::mem::take(&mut removed.reads);
        let origins = std::mem::take(&mut removed.origins);
        let children = std::mem::take(&mut removed.children);

        for &child in &children {
            self.block_mut(child).parent = Some(parent);
        }
        let host = self.block_mut(parent);
        host.writes.extend(writes);
        host.reads.extend(reads);
        host.origins.extend(origins);
        if let Some(position) = position {
            host.children.remove(position);
            for (offset, child) in children.into_iter().enumerate() {
                host.children.insert(position + offset, child);
            }
        }
    }

    /// Innermost block containing `address`.
    pub fn innermost(&self, address: Address) -> Option<BlockId> {
        if !self.block(self.root).contains(address) {
            return None;
        }
        let mut current = self.root;
        while let Some(&child) = self
            .block(current)
            .children
            .iter()
            .find(|&&c| self.block(c).contains(address))
        {
            current = child;
        }
        Some(current)
    }

    /// Deepest non-root block that began before `start` and ends somewhere in
    /// `[start, limit]`, i.e. the block a branch at `start` leaves. A
    /// goto-derived block not known to be a loop matches whatever its end.
    pub fn find_exited(&self, start: Address, limit: Address) -> Option<BlockId> {
        self.find_exited_from(self.root, start, limit)
    }

    fn find_exited_from(&self, id: BlockId, start: Address, limit: Address) -> Option<BlockId> {
        let block = self.block(id);
        if let Some(found) = block
            .children
            .iter()
            .find_map(|&child| self.find_exited_from(child, start, limit))
        {
            return Some(found);
        }
        let loose_goto = block.flags.is_goto && !block.flags.is_loop;
        let matches = id != self.root
            && block.start < start
            && block.finish >= start
            && (block.finish <= limit || loose_goto);
        matches.then_some(id)
    }

    pub fn previous_sibling(&self, id: BlockId) -> Option<BlockId> {
        let parent = self.block(id).parent?;
        let position = self.position_in_parent(id, parent)?;
        position
            .checked_sub(1)
            .map(|p| self.block(parent).children[p])
    }

    /// The still-open lock region that began at `start`.
    pub fn open_sync_block(&self, start: Address) -> Option<BlockId> {
        self.descendants(self.root).into_iter().find(|&id| {
            let block = self.block(id);
            block.flags.is_sync && block.provisional && block.start == start
        })
    }

    /// Whether the block or anything nested in it reads or writes `slot`.
    pub fn uses_slot(&self, id: BlockId, slot: Slot) -> bool {
        let block = self.block(id);
        block.reads.contains_key(&slot)
            || block.writes.contains_key(&slot)
            || block.children.iter().any(|&child| self.uses_slot(child, slot))
    }

    /// Drops every slot fetched through `caller`, from `id` up to the root.
    pub fn forget_origin(&mut self, id: BlockId, caller: &Caller) {
        let mut current = Some(id);
        while let Some(id) = current {
            self.block_mut(id).forget_origin(caller);
            current = self.block(id).parent;
        }
    }

    /// Pre-order list of `id` and every block below it.
    pub fn descendants(&self, id: BlockId) -> Vec<BlockId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.block(id).children.iter().rev());
        }
        out
    }

    /// Indented outline of the tree, one block per line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let mut stack = vec![(self.root, 0usize)];
        while let Some((id, depth)) = stack.pop() {
            let _ = writeln!(out, "{:indent$}{}", "", self.block(id), indent = depth * 2);
            stack.extend(self.block(id).children.iter().rev().map(|&c| (c, depth + 1)));
        }
        out
    }

    /// Verifies the structural invariants, describing the first violation.
    pub fn check_invariants(&self) -> Result<(), String> {
        let root = self.block(self.root);
        if root.parent.is_some() || root.removed {
            return Err("root is not a live top-level block".into());
        }
        let mut reachable = 0usize;
        for id in self.descendants(self.root) {
            reachable += 1;
            let block = self.block(id);
            if block.removed {
                return Err(format!("removed block {block} is still linked"));
            }
            if block.start > block.finish {
                return Err(format!("block {block} ends before it starts"));
            }
            let mut previous: Option<&ScopeBlock> = None;
            for &child_id in &block.children {
                let child = self.block(child_id);
                if child.parent != Some(id) {
                    return Err(format!("{child} does not point back at {block}"));
                }
                if child.start < block.start || child.finish > block.finish {
                    return Err(format!("{child} escapes its parent {block}"));
                }
                if let Some(prev) = previous {
                    if prev.finish > child.start {
                        return Err(format!("siblings {prev} and {child} overlap"));
                    }
                }
                previous = Some(child);
            }
        }
        if reachable != self.len() {
            return Err(format!(
                "{} live blocks but {} reachable from the root",
                self.len(),
                reachable
            ));
        }
        Ok(())
    }

    fn position_in_parent(&self, id: BlockId, parent: BlockId) -> Option<usize> {
        self.block(parent).children.iter().position(|&c| c == id)
    }

    fn detach(&mut self, id: BlockId) {
        if let Some(parent) = self.block_mut(id).parent.take() {
            self.block_mut(parent).children.retain(|&c| c != id);
        }
    }

    fn attach(&mut self, id: BlockId) {
        let mut pending = vec![id];
        while let Some(next) = pending.pop() {
            self.attach_under(self.root, next, &mut pending);
        }
    }

    fn attach_under(&mut self, mut container: BlockId, id: BlockId, pending: &mut Vec<BlockId>) {
        loop {
            let limit = self.block(container).finish;
            self.clamp_finish(id, limit, pending);
            let (start, finish) = (self.block(id).start, self.block(id).finish);
            let host = self.block(container).children.iter().copied().find(|&c| {
                let b = self.block(c);
                b.start <= start && start < b.finish && !(b.start == start && finish > b.finish)
            });
            match host {
                Some(host) => container = host,
                None => break,
            }
        }

        // A later sibling starting inside the new block caps its end.
        let start = self.block(id).start;
        let mut finish = self.block(id).finish;
        for &c in &self.block(container).children {
            let b = self.block(c);
            if b.start > start && b.start < finish && b.finish > finish {
                finish = b.start;
            }
        }
        self.clamp_finish(id, finish, pending);

        let siblings = std::mem::take(&mut self.block_mut(container).children);
        let (adopted, mut kept): (Vec<BlockId>, Vec<BlockId>) =
            siblings.into_iter().partition(|&c| {
                let b = self.block(c);
                b.start >= start && b.finish <= finish
            });
        let position = kept.partition_point(|&c| self.block(c).start < start);
        kept.insert(position, id);
        self.block_mut(container).children = kept;
        self.block_mut(id).parent = Some(container);

        for child in adopted {
            self.block_mut(child).parent = None;
            self.attach_under(id, child, pending);
        }
    }

    /// Pulls `id`'s finish in to `limit`, evicting descendants left outside.
    fn clamp_finish(&mut self, id: BlockId, limit: Address, pending: &mut Vec<BlockId>) {
        if self.block(id).finish <= limit {
            return;
        }
        let block = self.block_mut(id);
        block.finish = limit.max(block.start);
        let children = std::mem::take(&mut self.block_mut(id).children);
        let mut kept = Vec::with_capacity(children.len());
        for child in children {
            if self.block(child).start >= limit {
                self.block_mut(child).parent = None;
                pending.push(child);
            } else {
                self.clamp_finish(child, limit, pending);
                kept.push(child);
            }
        }
        self.block_mut(id).children = kept;
    }
}
