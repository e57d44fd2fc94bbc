//! # B+Tree Index
//!
//! Ordered row storage over paged disk. All rows live in slotted leaf pages
//! linked for range scans; internal pages hold fixed-size separator cells.
//! Traversal carries an explicit path instead of parent pointers, so splits
//! and rebalances walk upward without extra I/O.
//!
//! ## Module Organization
//!
//! - `leaf`: slotted leaf page views (`LeafNode` / `LeafNodeMut`)
//! - `interior`: internal node views (`InternalNode` / `InternalNodeMut`)
//! - `tree`: the `BTree` itself — find, insert with splits, delete with
//!   borrow/merge rebalancing, scans, visualizers, bloom maintenance
//!
//! The node views are stateless overlays on a borrowed 4096-byte page
//! buffer; they enforce the on-page layout but own nothing.

pub mod interior;
pub mod leaf;
mod tree;

pub use interior::{InternalCell, InternalNode, InternalNodeMut};
pub use leaf::{LeafNode, LeafNodeMut, SearchResult, Slot};
pub use tree::BTree;
