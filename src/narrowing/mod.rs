//! Detection of assignments made in a wider scope than their use.
//!
//! Block structure is not available in compiled code, so it is reconstructed
//! from control-flow edges as the instructions stream past: branches open
//! blocks, gotos and backward branches reclassify them, and lock regions and
//! exception ranges add blocks nothing may be moved into. Alongside, every
//! slot read and write is recorded against the innermost block. Once the
//! method ends, [`find_narrowable`] walks the finished tree.

mod analyzer;
mod context;
mod detector;
mod origin;
mod recorder;
mod risk;
mod scope_block;
mod scope_tree;
mod tree_builder;

pub use analyzer::{find_narrowable, Narrowing};
pub use context::MethodContext;
pub use detector::{
    analyze_listing, analyze_method, LocalMetadata, OperandStack, ScopeNarrowingDetector,
};
pub use origin::{Caller, OriginTag};
pub use risk::RiskPolicy;
pub use scope_block::{BlockFlags, BlockId, ScopeBlock};
pub use scope_tree::ScopeTree;
