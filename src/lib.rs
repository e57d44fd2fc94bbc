//! # RivetDB - Single-File Ordered Key-Value Engine
//!
//! RivetDB stores fixed-schema rows (`u32` id, two bounded text fields) in
//! one disk file, ordered by id and durable across restarts. It provides
//! point insert, point delete, point lookup, full scan, and range scan.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │      CLI (REPL / script mode)       │
//! ├─────────────────────────────────────┤
//! │  B+Tree: splits, borrow/merge,      │
//! │  linked-leaf scans                  │
//! ├──────────────┬──────────────────────┤
//! │  Node views  │  Bloom filter        │
//! │  (leaf/int.) │  (page-0 resident)   │
//! ├──────────────┴──────────────────────┤
//! │  Pager: LRU buffer pool, free list, │
//! │  CRC32 stamping, file header        │
//! ├─────────────────────────────────────┤
//! │      One file, 4096-byte pages      │
//! └─────────────────────────────────────┘
//! ```
//!
//! Page 0 carries the file header and a 32 608-bit bloom filter that short-
//! circuits negative lookups; page 1 is the tree root and never moves.
//! Every page access goes through the pager, which caches up to 100 frames
//! with LRU eviction and stamps tree pages with a CRC32 on flush.
//!
//! ## Quick Start
//!
//! ```ignore
//! use rivetdb::{BTree, Pager, Row};
//!
//! let mut pager = Pager::open("rivet.db")?;
//! {
//!     let mut tree = BTree::new(&mut pager)?;
//!     tree.insert(&Row::new(1, "alice", "alice@example.com")?)?;
//!     let rows = tree.range_scan(1, 10)?;
//! }
//! pager.close()?;
//! ```
//!
//! ## Scope
//!
//! Single-writer, single-threaded, no write-ahead log: durability is
//! in-order page flushes plus CRC detection. No transactions, secondary
//! indexes, or schema evolution.
//!
//! ## Module Overview
//!
//! - [`storage`]: pager, buffer pool, free list, checksums, file header
//! - [`btree`]: node views and the tree algorithms
//! - [`bloom`]: page-0 resident bloom filter
//! - [`row`]: the row type and its wire codec
//! - [`cli`]: REPL and command dispatcher
//! - [`config`]: layout constants

pub mod bloom;
pub mod btree;
pub mod cli;
pub mod config;
pub mod row;
pub mod storage;

pub use bloom::{BloomFilter, BloomStats};
pub use btree::BTree;
pub use row::Row;
pub use storage::Pager;
