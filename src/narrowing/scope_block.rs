//! A reconstructed lexical block.

use super::origin::{Caller, OriginTag};
use crate::core::{Address, Slot};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Index of a block in its [`ScopeTree`](super::ScopeTree) arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub(crate) usize);

/// How a block came to exist. Flags are not exclusive: a goto-derived block
/// may also be a loop until later evidence says otherwise.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockFlags {
    pub is_loop: bool,
    pub is_goto: bool,
    pub is_sync: bool,
    pub is_try: bool,
    pub is_case: bool,
}

#[derive(Debug, Clone)]
pub struct ScopeBlock {
    pub(crate) start: Address,
    pub(crate) finish: Address,
    /// The finish is a placeholder until the block's real end is seen
    pub(crate) provisional: bool,
    pub(crate) flags: BlockFlags,
    pub(crate) writes: BTreeMap<Slot, Address>,
    pub(crate) reads: BTreeMap<Slot, Address>,
    pub(crate) origins: HashMap<OriginTag, Slot>,
    pub(crate) parent: Option<BlockId>,
    pub(crate) children: Vec<BlockId>,
    pub(crate) removed: bool,
}

impl ScopeBlock {
    pub fn new(start: Address, finish: Address) -> Self {
        Self {
            start,
            finish,
            provisional: false,
            flags: BlockFlags::default(),
            writes: BTreeMap::new(),
            reads: BTreeMap::new(),
            origins: HashMap::new(),
            parent: None,
            children: Vec::new(),
            removed: false,
        }
    }

    pub fn with_flags(mut self, flags: BlockFlags) -> Self {
        self.flags = flags;
        self
    }

    /// A block whose finish is not yet known.
    pub fn open(start: Address) -> Self {
        let mut block = Self::new(start, Address::MAX);
        block.provisional = true;
        block
    }

    pub fn start(&self) -> Address {
        self.start
    }

    pub fn finish(&self) -> Address {
        self.finish
    }

    pub fn is_provisional(&self) -> bool {
        self.provisional
    }

    pub fn flags(&self) -> BlockFlags {
        self.flags
    }

    pub fn parent(&self) -> Option<BlockId> {
        self.parent
    }

    pub fn children(&self) -> &[BlockId] {
        &self.children
    }

    pub fn writes(&self) -> &BTreeMap<Slot, Address> {
        &self.writes
    }

    pub fn reads(&self) -> &BTreeMap<Slot, Address> {
        &self.reads
    }

    pub fn contains(&self, address: Address) -> bool {
        address >= self.start && address < self.finish
    }

    /// Loops, lock regions and try bodies can't take an assignment moved into them.
    pub fn rejects_narrowing(&self) -> bool {
        self.flags.is_loop || self.flags.is_sync || self.flags.is_try
    }

    pub(crate) fn record_write(&mut self, slot: Slot, address: Address, origin: Option<OriginTag>) {
        self.writes.insert(slot, address);
        if let Some(origin) = origin.filter(|o| o.caller.is_known()) {
            self.origins.insert(origin, slot);
        }
    }

    pub(crate) fn record_read(&mut self, slot: Slot, address: Address) {
        self.reads.insert(slot, address);
    }

    /// Forgets every slot whose value was fetched through `caller`.
    pub(crate) fn forget_origin(&mut self, caller: &Caller) {
        let stale: Vec<OriginTag> = self
            .origins
            .keys()
            .filter(|tag| &tag.caller == caller)
            .cloned()
            .collect();
        for tag in stale {
            if let Some(slot) = self.origins.remove(&tag) {
                self.writes.remove(&slot);
                self.reads.remove(&slot);
            }
        }
    }
}

impl fmt::Display for ScopeBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, ", self.start)?;
        if self.provisional {
            write!(f, "?{})", self.finish)?;
        } else {
            write!(f, "{})", self.finish)?;
        }
        let flags = [
            (self.flags.is_loop, " loop"),
            (self.flags.is_goto, " goto"),
            (self.flags.is_sync, " sync"),
            (self.flags.is_try, " try"),
            (self.flags.is_case, " case"),
        ];
        for (set, name) in flags {
            if set {
                f.write_str(name)?;
            }
        }
        Ok(())
    }
}
