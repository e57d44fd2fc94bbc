//! # RivetDB Configuration Constants
//!
//! This module centralizes every on-disk layout constant and pool sizing knob.
//! Constants that depend on each other are co-located and cross-checked with
//! compile-time assertions to prevent mismatch bugs.
//!
//! ## Dependency Graph
//!
//! ```text
//! PAGE_SIZE (4096 bytes)
//!       │
//!       ├─> NODE_HEADER_SIZE (6 bytes: type, is_root, crc32)
//!       │
//!       ├─> LEAF_HEADER_SIZE (18 bytes) ─> LEAF_USABLE_SPACE
//!       │
//!       ├─> INTERNAL_HEADER_SIZE (14 bytes) ─> INTERNAL_MAX_CELLS
//!       │
//!       └─> FILE_HEADER_SIZE (20 bytes, page 0) ─> BLOOM_SIZE / BLOOM_BITS
//!
//! BUFFER_POOL_SIZE (100 frames)
//!       Must exceed the tree height plus the pages a single operation can
//!       touch at once (split path, new siblings, both grandparents: ~10).
//! ```

/// Size of each database page in bytes. The fundamental unit of I/O and
/// caching; the file is always a whole number of pages.
pub const PAGE_SIZE: usize = 4096;

/// Maximum number of page frames held in RAM. Beyond this, the least
/// recently used unpinned frame is evicted (flushed first).
pub const BUFFER_POOL_SIZE: usize = 100;

// ============================================================================
// COMMON TREE-PAGE HEADER
// [type:1][is_root:1][crc32:4] = 6 bytes. No parent pointer is stored;
// traversal carries the path so splits and merges can walk upward.
// ============================================================================

pub const OFFSET_NODE_KIND: usize = 0;
pub const OFFSET_IS_ROOT: usize = 1;
pub const OFFSET_CHECKSUM: usize = 2;
pub const NODE_HEADER_SIZE: usize = OFFSET_CHECKSUM + 4;

// ============================================================================
// SLOTTED LEAF LAYOUT
// Header: [num_cells:4][data_end:2][total_free:2][next_leaf:4] after the
// common header. The slot directory ([offset:2][length:2] per cell, sorted
// by key) grows toward higher addresses; records grow down from the end of
// the page. Leaves form a singly-linked list through next_leaf.
// ============================================================================

pub const LEAF_HEADER_SIZE: usize = NODE_HEADER_SIZE + 12;
pub const SLOT_SIZE: usize = 4;
pub const LEAF_USABLE_SPACE: usize = PAGE_SIZE - LEAF_HEADER_SIZE;

/// Hard floor for leaf occupancy; with variable-length records the primary
/// underflow rule is byte-based (used bytes below half of usable space).
pub const LEAF_MIN_CELLS: usize = 2;

const _: () = assert!(LEAF_HEADER_SIZE == 18, "leaf header layout drifted");

// ============================================================================
// INTERNAL NODE LAYOUT
// Header: [num_keys:4][right_child:4] after the common header, then
// [child:4][key:4] cells. A child at index i lives in cell i for
// i < num_keys, else in right_child.
// ============================================================================

pub const INTERNAL_HEADER_SIZE: usize = NODE_HEADER_SIZE + 8;
pub const INTERNAL_CELL_SIZE: usize = 8;
pub const INTERNAL_MAX_CELLS: usize = (PAGE_SIZE - INTERNAL_HEADER_SIZE) / INTERNAL_CELL_SIZE;
pub const INTERNAL_MIN_KEYS: usize = INTERNAL_MAX_CELLS / 2;

const _: () = assert!(INTERNAL_MAX_CELLS == 510, "internal cell capacity drifted");

// ============================================================================
// FILE HEADER (page 0)
// ============================================================================

/// Magic number validating the file at open.
pub const DB_MAGIC: u32 = 0xF04DB;

/// Page 0 holds the file header and the bloom filter; it is pinned for the
/// lifetime of the pager and never CRC-stamped.
pub const HEADER_PAGE: u32 = 0;

/// The tree root never moves from page 1.
pub const ROOT_PAGE: u32 = 1;

pub const FILE_HEADER_SIZE: usize = 20;

// ============================================================================
// BLOOM FILTER (page 0, after the file header)
// ============================================================================

pub const BLOOM_OFFSET: usize = FILE_HEADER_SIZE;
pub const BLOOM_SIZE: usize = PAGE_SIZE - BLOOM_OFFSET;
pub const BLOOM_BITS: u32 = (BLOOM_SIZE * 8) as u32;

const _: () = assert!(BLOOM_BITS == 32_608, "bloom bit count drifted");

// ============================================================================
// ROW BOUNDS
// Wire format: [id:4][ulen:2][username][elen:2][email], little-endian.
// ============================================================================

pub const USERNAME_MAX: usize = 31;
pub const EMAIL_MAX: usize = 254;
pub const ROW_MIN_SIZE: usize = 4 + 2 + 2;
pub const ROW_MAX_SIZE: usize = 4 + 2 + USERNAME_MAX + 2 + EMAIL_MAX;

const _: () = assert!(ROW_MAX_SIZE == 293, "row size bound drifted");

// A maximum-size record plus its slot must fit well inside half a leaf so
// splits always succeed.
const _: () = assert!(ROW_MAX_SIZE + SLOT_SIZE < LEAF_USABLE_SPACE / 2);
