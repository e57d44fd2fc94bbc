//! # Internal Node
//!
//! Internal pages hold separator keys and child page numbers in the classic
//! B+Tree shape: `num_keys` fixed-size cells plus one `right_child`.
//!
//! ```text
//! +---------------------------+
//! | Common header (6 bytes)   |
//! +---------------------------+
//! | num_keys:4  right_child:4 |
//! +---------------------------+
//! | Cell 0: [child:4][key:4]  |
//! | Cell 1: [child:4][key:4]  |
//! | ...                       |
//! +---------------------------+
//! ```
//!
//! The child at index `i` lives in cell `i` for `i < num_keys` and in
//! `right_child` for `i == num_keys`. The separator at index `i` is the
//! smallest key reachable through the child at index `i + 1`.
//!
//! `find_child` descends with a strict-greater comparison so equal keys go
//! to the right subtree; inserts reject duplicates before they reach a leaf,
//! keeping the comparator consistent.

use eyre::{ensure, Result};
use zerocopy::little_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::{INTERNAL_CELL_SIZE, INTERNAL_HEADER_SIZE, INTERNAL_MAX_CELLS, NODE_HEADER_SIZE, PAGE_SIZE};
use crate::storage::{NodeHeader, NodeKind};

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned, PartialEq, Eq)]
pub struct InternalCell {
    child: U32,
    key: U32,
}

const _: () = assert!(std::mem::size_of::<InternalCell>() == INTERNAL_CELL_SIZE);

impl InternalCell {
    pub fn child(&self) -> u32 {
        self.child.get()
    }

    pub fn key(&self) -> u32 {
        self.key.get()
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
struct InternalHeader {
    num_keys: U32,
    right_child: U32,
}

const _: () =
    assert!(NODE_HEADER_SIZE + std::mem::size_of::<InternalHeader>() == INTERNAL_HEADER_SIZE);

#[derive(Debug)]
pub struct InternalNode<'a> {
    data: &'a [u8],
}

pub struct InternalNodeMut<'a> {
    data: &'a mut [u8],
}

impl<'a> InternalNode<'a> {
    pub fn from_page(data: &'a [u8]) -> Result<Self> {
        ensure!(
            data.len() == PAGE_SIZE,
            "invalid page size: {} != {}",
            data.len(),
            PAGE_SIZE
        );
        let header = NodeHeader::from_bytes(data)?;
        ensure!(
            header.kind() == NodeKind::Internal,
            "expected internal page, got {:?}",
            header.kind()
        );
        Ok(Self { data })
    }

    fn header(&self) -> &InternalHeader {
        InternalHeader::ref_from_bytes(&self.data[NODE_HEADER_SIZE..INTERNAL_HEADER_SIZE])
            .expect("internal header range is fixed") // INVARIANT: length validated in from_page
    }

    pub fn is_root(&self) -> bool {
        NodeHeader::from_bytes(self.data)
            .expect("node header range is fixed") // INVARIANT: length validated in from_page
            .is_root()
    }

    pub fn num_keys(&self) -> usize {
        self.header().num_keys.get() as usize
    }

    pub fn right_child(&self) -> u32 {
        self.header().right_child.get()
    }

    pub fn cell_at(&self, index: usize) -> Result<&InternalCell> {
        ensure!(
            index < self.num_keys(),
            "cell index {} out of bounds (num_keys={})",
            index,
            self.num_keys()
        );
        let offset = INTERNAL_HEADER_SIZE + index * INTERNAL_CELL_SIZE;
        InternalCell::ref_from_bytes(&self.data[offset..offset + INTERNAL_CELL_SIZE])
            .map_err(|e| eyre::eyre!("failed to read cell at index {}: {:?}", index, e))
    }

    pub fn key_at(&self, index: usize) -> Result<u32> {
        Ok(self.cell_at(index)?.key())
    }

    /// Child at logical index `i`; index `num_keys` resolves to
    /// `right_child`.
    pub fn child_at(&self, index: usize) -> Result<u32> {
        if index == self.num_keys() {
            return Ok(self.right_child());
        }
        Ok(self.cell_at(index)?.child())
    }

    /// Binary search for the child that must contain `key`: the lowest index
    /// whose separator is strictly greater, falling through to
    /// `right_child`. Returns the child page and its logical index.
    pub fn find_child(&self, key: u32) -> Result<(u32, usize)> {
        let mut lo = 0;
        let mut hi = self.num_keys();
        while lo < hi {
            let mid = (lo + hi) / 2;
            if self.key_at(mid)? <= key {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        Ok((self.child_at(lo)?, lo))
    }
}

impl<'a> InternalNodeMut<'a> {
    pub fn from_page(data: &'a mut [u8]) -> Result<Self> {
        ensure!(
            data.len() == PAGE_SIZE,
            "invalid page size: {} != {}",
            data.len(),
            PAGE_SIZE
        );
        let header = NodeHeader::from_bytes(data)?;
        ensure!(
            header.kind() == NodeKind::Internal,
            "expected internal page, got {:?}",
            header.kind()
        );
        Ok(Self { data })
    }

    /// Turns a page buffer into an empty internal node.
    pub fn init(data: &'a mut [u8]) -> Result<Self> {
        ensure!(
            data.len() == PAGE_SIZE,
            "invalid page size: {} != {}",
            data.len(),
            PAGE_SIZE
        );

        {
            let header = NodeHeader::from_bytes_mut(data)?;
            header.set_kind(NodeKind::Internal);
            header.set_root(false);
            header.set_checksum(0);
        }

        let mut node = Self { data };
        {
            let header = node.header_mut();
            header.num_keys = U32::new(0);
            header.right_child = U32::new(0);
        }
        Ok(node)
    }

    pub fn as_ref(&self) -> InternalNode<'_> {
        InternalNode { data: self.data }
    }

    fn header_mut(&mut self) -> &mut InternalHeader {
        InternalHeader::mut_from_bytes(&mut self.data[NODE_HEADER_SIZE..INTERNAL_HEADER_SIZE])
            .expect("internal header range is fixed") // INVARIANT: length validated in from_page/init
    }

    pub fn set_root(&mut self, is_root: bool) {
        NodeHeader::from_bytes_mut(self.data)
            .expect("node header range is fixed") // INVARIANT: length validated in from_page/init
            .set_root(is_root);
    }

    pub fn set_num_keys(&mut self, num_keys: usize) {
        self.header_mut().num_keys = U32::new(num_keys as u32);
    }

    pub fn set_right_child(&mut self, page_num: u32) {
        self.header_mut().right_child = U32::new(page_num);
    }

    fn cell_range(index: usize) -> std::ops::Range<usize> {
        let start = INTERNAL_HEADER_SIZE + index * INTERNAL_CELL_SIZE;
        start..start + INTERNAL_CELL_SIZE
    }

    /// Positional cell write; `num_keys` is managed separately so split and
    /// merge code can lay cells down before publishing the count.
    pub fn set_cell(&mut self, index: usize, child: u32, key: u32) -> Result<()> {
        ensure!(
            index < INTERNAL_MAX_CELLS,
            "cell index {} exceeds node capacity",
            index
        );
        let range = Self::cell_range(index);
        self.data[range.start..range.start + 4].copy_from_slice(&child.to_le_bytes());
        self.data[range.start + 4..range.end].copy_from_slice(&key.to_le_bytes());
        Ok(())
    }

    pub fn set_key(&mut self, index: usize, key: u32) -> Result<()> {
        ensure!(
            index < self.as_ref().num_keys(),
            "key index {} out of bounds (num_keys={})",
            index,
            self.as_ref().num_keys()
        );
        let range = Self::cell_range(index);
        self.data[range.start + 4..range.end].copy_from_slice(&key.to_le_bytes());
        Ok(())
    }

    /// Sets the child at logical index `i`; index `num_keys` targets
    /// `right_child`.
    pub fn set_child(&mut self, index: usize, child: u32) -> Result<()> {
        let num_keys = self.as_ref().num_keys();
        if index == num_keys {
            self.set_right_child(child);
            return Ok(());
        }
        ensure!(
            index < num_keys,
            "child index {} out of bounds (num_keys={})",
            index,
            num_keys
        );
        let range = Self::cell_range(index);
        self.data[range.start..range.start + 4].copy_from_slice(&child.to_le_bytes());
        Ok(())
    }

    pub fn copy_cell(&mut self, dst: usize, src: usize) -> Result<()> {
        ensure!(
            dst < INTERNAL_MAX_CELLS && src < INTERNAL_MAX_CELLS,
            "cell copy {}<-{} exceeds node capacity",
            dst,
            src
        );
        self.data
            .copy_within(Self::cell_range(src), Self::cell_range(dst).start);
        Ok(())
    }

    /// Inserts `(key, new_child)` so that `new_child` sits immediately to
    /// the right of the child at `index` (the child that just split).
    pub fn insert_child(&mut self, index: usize, key: u32, new_child: u32) -> Result<()> {
        let num_keys = self.as_ref().num_keys();
        ensure!(
            num_keys < INTERNAL_MAX_CELLS,
            "internal node is full ({num_keys} keys)"
        );

        if index == num_keys {
            // Right edge: promote the old right_child into the last cell and
            // install the new child as right_child.
            let old_right = self.as_ref().right_child();
            self.set_cell(num_keys, old_right, key)?;
            self.set_right_child(new_child);
        } else {
            // Middle: open a gap at index + 1, keeping the displaced
            // separator to the right of the new child.
            for i in (index + 1..num_keys).rev() {
                self.copy_cell(i + 1, i)?;
            }
            let displaced = self.as_ref().key_at(index)?;
            self.set_key(index, key)?;
            self.set_cell(index + 1, new_child, displaced)?;
        }

        self.set_num_keys(num_keys + 1);
        Ok(())
    }

    /// Removes the key at `index` together with the child to its right
    /// (the page absorbed by a merge).
    pub fn remove_key(&mut self, index: usize) -> Result<()> {
        let num_keys = self.as_ref().num_keys();
        ensure!(
            index < num_keys,
            "key index {} out of bounds (num_keys={})",
            index,
            num_keys
        );

        if index == num_keys - 1 {
            // Dropping the last key: its left child becomes right_child.
            let child = self.as_ref().cell_at(index)?.child();
            self.set_right_child(child);
            self.set_num_keys(num_keys - 1);
            return Ok(());
        }

        let kept_child = self.as_ref().cell_at(index)?.child();
        for i in index..num_keys - 1 {
            self.copy_cell(i, i + 1)?;
        }
        self.set_num_keys(num_keys - 1);
        self.set_child(index, kept_child)?;
        Ok(())
    }
}
