//! # B+Tree
//!
//! Ordered row storage over the pager: point insert, point delete, point
//! lookup, full scan, and range scan. All data lives in leaf pages; internal
//! pages only route. Leaves are linked in key order for scans.
//!
//! ## Traversal
//!
//! Nodes store no parent pointers. `find` records the internal pages it
//! descends through, and splits and rebalances walk that path upward. The
//! path is an explicit value, never shared state.
//!
//! ## Insert
//!
//! ```text
//! 1. Descend to the leaf, recording the path
//! 2. Reject duplicates, mark the bloom filter
//! 3. Insert in place when the row fits, else split the leaf:
//!    collect rows + the new one in order, cut at the first prefix
//!    exceeding half the usable bytes, splice the sibling chain, and
//!    promote the right page's first key
//! 4. A full parent splits recursively; the middle key is pushed up
//! 5. A root split copies the left half out and rebuilds page 1 in place,
//!    so the root never moves
//! ```
//!
//! ## Delete
//!
//! ```text
//! 1. Bloom filter gate: a definite negative skips the tree
//! 2. Remove from the leaf; done if the leaf is the root or still half full
//! 3. Otherwise rebalance: borrow from the left sibling, else the right,
//!    else merge into a sibling and drop the separator from the parent
//! 4. An underflowing parent rebalances recursively; an empty root absorbs
//!    its only child and the tree loses a level
//! ```
//!
//! ## Frame discipline
//!
//! `Pager::get_page` returns a frame reference that the next eviction can
//! invalidate, so every step re-fetches the pages it touches and no node
//! view is held across a pager call.

use eyre::{bail, Result};
use smallvec::SmallVec;
use tracing::debug;

use super::interior::{InternalNode, InternalNodeMut};
use super::leaf::{LeafNode, LeafNodeMut, SearchResult};
use crate::bloom::{BloomFilter, BloomStats};
use crate::config::{
    HEADER_PAGE, INTERNAL_MAX_CELLS, INTERNAL_MIN_KEYS, LEAF_MIN_CELLS, LEAF_USABLE_SPACE,
    PAGE_SIZE, ROOT_PAGE, ROW_MAX_SIZE, SLOT_SIZE,
};
use crate::row::Row;
use crate::storage::{NodeHeader, NodeKind, Pager};

/// Internal pages visited on the way to a leaf, root first. Trees deeper
/// than the inline capacity are possible but never allocate in practice.
type Path = SmallVec<[u32; 8]>;

pub struct BTree<'a> {
    pager: &'a mut Pager,
}

impl<'a> BTree<'a> {
    /// Attaches to the tree rooted at page 1, creating the root leaf on a
    /// fresh file, and rebuilds the bloom filter from a leaf scan.
    pub fn new(pager: &'a mut Pager) -> Result<Self> {
        let mut tree = Self { pager };

        if tree.pager.total_pages() <= ROOT_PAGE {
            let frame = tree.pager.get_page(ROOT_PAGE)?;
            let mut root = LeafNodeMut::init(frame)?;
            root.set_root(true);
            tree.pager.grow_to(ROOT_PAGE + 1)?;
        }

        tree.rebuild_bloom()?;
        Ok(tree)
    }

    /// The pager backing this tree; used by the debug command surface.
    pub fn pager(&mut self) -> &mut Pager {
        self.pager
    }

    // ------------------------------------------------------------------
    // Point operations
    // ------------------------------------------------------------------

    /// Inserts a row keyed by its id. Duplicate ids are rejected without
    /// any state change.
    pub fn insert(&mut self, row: &Row) -> Result<()> {
        let key = row.id;
        let (leaf_page, mut path) = self.find(key)?;

        let mut record = [0u8; ROW_MAX_SIZE];
        let size = row.serialize(&mut record)?;

        let fits = {
            let frame = self.pager.get_page(leaf_page)?;
            let leaf = LeafNode::from_page(frame)?;
            if let SearchResult::Found(_) = leaf.find_key(key)? {
                bail!("Duplicate key {key}");
            }
            leaf.can_fit(size)
        };

        self.bloom_add(key)?;

        if fits {
            let frame = self.pager.get_page(leaf_page)?;
            LeafNodeMut::from_page(frame)?.insert(key, &record[..size])?;
            debug!("inserted key {key} into page {leaf_page} ({size}B record)");
        } else {
            self.split_leaf(leaf_page, &mut path, key, &record[..size])?;
        }
        Ok(())
    }

    /// Removes a row by id. Returns false when the id is absent, whether
    /// the bloom filter short-circuited or the leaf probe missed.
    pub fn remove(&mut self, id: u32) -> Result<bool> {
        if !self.bloom_contains(id)? {
            debug!("bloom: key {id} definitely absent, skipping descent");
            return Ok(false);
        }

        let (leaf_page, mut path) = self.find(id)?;
        let (removed, is_root, underflow) = {
            let frame = self.pager.get_page(leaf_page)?;
            let mut leaf = LeafNodeMut::from_page(frame)?;
            let removed = leaf.remove(id)?;
            let view = leaf.as_ref();
            (removed, view.is_root(), view.is_underflow())
        };

        if !removed {
            debug!("bloom false positive: key {id} not in the tree");
            return Ok(false);
        }
        debug!("deleted key {id} from page {leaf_page}");

        // The root leaf has no minimum occupancy.
        if !is_root && underflow {
            self.rebalance_leaf(leaf_page, &mut path)?;
        }
        Ok(true)
    }

    /// Point lookup gated by the bloom filter: a definite negative answers
    /// without touching the tree.
    pub fn find_row(&mut self, id: u32) -> Result<Option<Row>> {
        if !self.bloom_contains(id)? {
            debug!("bloom: key {id} definitely absent (no page reads)");
            return Ok(None);
        }

        let (leaf_page, _) = self.find(id)?;
        let frame = self.pager.get_page(leaf_page)?;
        let leaf = LeafNode::from_page(frame)?;
        for i in 0..leaf.num_cells() {
            if leaf.key_at(i)? == id {
                return Ok(Some(leaf.row_at(i)?));
            }
        }
        debug!("bloom false positive: key {id} not in the tree");
        Ok(None)
    }

    // ------------------------------------------------------------------
    // Scans
    // ------------------------------------------------------------------

    /// All rows in key order, walking the leaf sibling chain.
    pub fn select_all(&mut self) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        let mut page = self.leftmost_leaf()?;
        while page != 0 {
            let frame = self.pager.get_page(page)?;
            let leaf = LeafNode::from_page(frame)?;
            for i in 0..leaf.num_cells() {
                rows.push(leaf.row_at(i)?);
            }
            page = leaf.next_leaf();
        }
        Ok(rows)
    }

    /// Rows with `start <= id <= end` in key order.
    pub fn range_scan(&mut self, start: u32, end: u32) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        let (mut page, _) = self.find(start)?;
        'pages: while page != 0 {
            let frame = self.pager.get_page(page)?;
            let leaf = LeafNode::from_page(frame)?;
            for i in 0..leaf.num_cells() {
                let key = leaf.key_at(i)?;
                if key > end {
                    break 'pages;
                }
                if key >= start {
                    rows.push(leaf.row_at(i)?);
                }
            }
            page = leaf.next_leaf();
        }
        Ok(rows)
    }

    // ------------------------------------------------------------------
    // Bloom filter maintenance
    // ------------------------------------------------------------------

    /// Clears the filter and re-adds every key via a leaf-chain walk. Run
    /// at open and after bulk deletes to shed stale bits.
    pub fn rebuild_bloom(&mut self) -> Result<()> {
        let mut keys = Vec::new();
        let mut page = self.leftmost_leaf()?;
        while page != 0 {
            let frame = self.pager.get_page(page)?;
            let leaf = LeafNode::from_page(frame)?;
            for i in 0..leaf.num_cells() {
                keys.push(leaf.key_at(i)?);
            }
            page = leaf.next_leaf();
        }

        let frame = self.pager.get_page(HEADER_PAGE)?;
        let mut bloom = BloomFilter::attach(frame);
        bloom.clear();
        let count = keys.len();
        for key in keys {
            bloom.add(key);
        }
        debug!("bloom filter rebuilt from {count} keys");
        Ok(())
    }

    pub fn bloom_stats(&mut self) -> Result<BloomStats> {
        let frame = self.pager.get_page(HEADER_PAGE)?;
        Ok(BloomFilter::attach(frame).stats())
    }

    fn bloom_add(&mut self, key: u32) -> Result<()> {
        let frame = self.pager.get_page(HEADER_PAGE)?;
        BloomFilter::attach(frame).add(key);
        Ok(())
    }

    fn bloom_contains(&mut self, key: u32) -> Result<bool> {
        let frame = self.pager.get_page(HEADER_PAGE)?;
        Ok(BloomFilter::attach(frame).possibly_contains(key))
    }

    // ------------------------------------------------------------------
    // Traversal
    // ------------------------------------------------------------------

    /// Descends from the root to the leaf that owns `key`, recording the
    /// internal pages passed through.
    fn find(&mut self, key: u32) -> Result<(u32, Path)> {
        let mut page = ROOT_PAGE;
        let mut path = Path::new();
        loop {
            let frame = self.pager.get_page(page)?;
            match NodeKind::from_byte(frame[0]) {
                NodeKind::Leaf => return Ok((page, path)),
                NodeKind::Internal => {
                    let (child, _) = InternalNode::from_page(frame)?.find_child(key)?;
                    path.push(page);
                    page = child;
                }
                other => bail!("unexpected {other:?} page {page} during descent"),
            }
        }
    }

    fn leftmost_leaf(&mut self) -> Result<u32> {
        let mut page = ROOT_PAGE;
        loop {
            let frame = self.pager.get_page(page)?;
            match NodeKind::from_byte(frame[0]) {
                NodeKind::Leaf => return Ok(page),
                NodeKind::Internal => page = InternalNode::from_page(frame)?.child_at(0)?,
                other => bail!("unexpected {other:?} page {page} during descent"),
            }
        }
    }

    // ------------------------------------------------------------------
    // Splits
    // ------------------------------------------------------------------

    /// Splits a full leaf around a byte-balanced cut point and promotes the
    /// right page's first key to the parent.
    fn split_leaf(
        &mut self,
        page_num: u32,
        path: &mut Path,
        new_key: u32,
        new_record: &[u8],
    ) -> Result<()> {
        // Collect every record plus the incoming one in key order.
        let (entries, old_next, was_root) = {
            let frame = self.pager.get_page(page_num)?;
            let leaf = LeafNode::from_page(frame)?;
            let count = leaf.num_cells();
            let mut entries: Vec<(u32, Vec<u8>)> = Vec::with_capacity(count + 1);
            let mut placed = false;
            for i in 0..count {
                let key = leaf.key_at(i)?;
                if !placed && new_key < key {
                    entries.push((new_key, new_record.to_vec()));
                    placed = true;
                }
                entries.push((key, leaf.record_at(i)?.to_vec()));
            }
            if !placed {
                entries.push((new_key, new_record.to_vec()));
            }
            (entries, leaf.next_leaf(), leaf.is_root())
        };

        // Cut at the smallest prefix exceeding half the usable bytes, with
        // a floor of one record on the left.
        let half = LEAF_USABLE_SPACE / 2;
        let mut running = 0;
        let mut split = 0;
        for (i, (_, record)) in entries.iter().enumerate() {
            running += record.len() + SLOT_SIZE;
            if running > half {
                split = i.max(1);
                break;
            }
        }
        if split == 0 {
            split = entries.len() / 2;
        }

        let new_page = self.pager.get_unused_page_num()?;
        {
            let frame = self.pager.get_page(new_page)?;
            let mut node = LeafNodeMut::init(frame)?;
            for (key, record) in &entries[split..] {
                node.insert(*key, record)?;
            }
            node.set_next_leaf(old_next);
        }
        let separator = entries[split].0;

        {
            let frame = self.pager.get_page(page_num)?;
            let mut node = LeafNodeMut::init(frame)?;
            node.set_root(was_root);
            for (key, record) in &entries[..split] {
                node.insert(*key, record)?;
            }
            node.set_next_leaf(new_page);
        }
        debug!(
            "split leaf page {page_num}: {} rows left, {} right (new page {new_page}, separator {separator})",
            split,
            entries.len() - split
        );

        if was_root {
            return self.split_root(page_num, separator, new_page);
        }

        let Some(&parent_page) = path.last() else {
            bail!("leaf page {page_num} is not the root but has no parent on the path");
        };
        let (child_index, parent_full) = {
            let frame = self.pager.get_page(parent_page)?;
            let parent = InternalNode::from_page(frame)?;
            (
                find_child_index(&parent, page_num)?,
                parent.num_keys() >= INTERNAL_MAX_CELLS,
            )
        };

        if parent_full {
            path.pop();
            self.split_internal(parent_page, child_index, separator, new_page, path)
        } else {
            let frame = self.pager.get_page(parent_page)?;
            InternalNodeMut::from_page(frame)?.insert_child(child_index, separator, new_page)
        }
    }

    /// Splits a full internal node. The conceptual key/child arrays with
    /// the new pair spliced in are cut in the middle; the middle key is
    /// pushed up, not kept in either half.
    fn split_internal(
        &mut self,
        page_num: u32,
        child_index: usize,
        new_key: u32,
        new_child: u32,
        path: &mut Path,
    ) -> Result<()> {
        let (keys, children, was_root) = {
            let frame = self.pager.get_page(page_num)?;
            let node = InternalNode::from_page(frame)?;
            let count = node.num_keys();

            let mut children = Vec::with_capacity(count + 2);
            for i in 0..=child_index {
                children.push(node.child_at(i)?);
            }
            children.push(new_child);
            for i in child_index + 1..=count {
                children.push(node.child_at(i)?);
            }

            let mut keys = Vec::with_capacity(count + 1);
            for i in 0..child_index {
                keys.push(node.key_at(i)?);
            }
            keys.push(new_key);
            for i in child_index..count {
                keys.push(node.key_at(i)?);
            }

            (keys, children, node.is_root())
        };

        let total = keys.len();
        let mid = total / 2;
        let push_up = keys[mid];

        {
            let frame = self.pager.get_page(page_num)?;
            let mut node = InternalNodeMut::from_page(frame)?;
            for i in 0..mid {
                node.set_cell(i, children[i], keys[i])?;
            }
            node.set_right_child(children[mid]);
            node.set_num_keys(mid);
        }

        let new_internal = self.pager.get_unused_page_num()?;
        {
            let frame = self.pager.get_page(new_internal)?;
            let mut node = InternalNodeMut::init(frame)?;
            let right_count = total - mid - 1;
            for i in 0..right_count {
                node.set_cell(i, children[mid + 1 + i], keys[mid + 1 + i])?;
            }
            node.set_right_child(children[total]);
            node.set_num_keys(right_count);
        }
        debug!("split internal page {page_num}: key {push_up} pushed up (new page {new_internal})");

        if was_root {
            return self.split_root(page_num, push_up, new_internal);
        }

        let Some(parent_page) = path.pop() else {
            bail!("internal page {page_num} is not the root but has no parent on the path");
        };
        let (parent_index, parent_full) = {
            let frame = self.pager.get_page(parent_page)?;
            let parent = InternalNode::from_page(frame)?;
            (
                find_child_index(&parent, page_num)?,
                parent.num_keys() >= INTERNAL_MAX_CELLS,
            )
        };

        if parent_full {
            self.split_internal(parent_page, parent_index, push_up, new_internal, path)
        } else {
            let frame = self.pager.get_page(parent_page)?;
            InternalNodeMut::from_page(frame)?.insert_child(parent_index, push_up, new_internal)
        }
    }

    /// The root never moves: its current content (already holding the left
    /// half of a split) is copied to a fresh page and page 1 is rebuilt as
    /// an internal node over the two halves.
    fn split_root(&mut self, root_page: u32, separator: u32, right_page: u32) -> Result<()> {
        let left_page = self.pager.get_unused_page_num()?;

        let snapshot = {
            let frame = self.pager.get_page(root_page)?;
            let mut buf = [0u8; PAGE_SIZE];
            buf.copy_from_slice(frame);
            buf
        };
        {
            let frame = self.pager.get_page(left_page)?;
            frame.copy_from_slice(&snapshot);
            NodeHeader::from_bytes_mut(frame)?.set_root(false);
        }
        {
            let frame = self.pager.get_page(root_page)?;
            let mut root = InternalNodeMut::init(frame)?;
            root.set_root(true);
            root.set_cell(0, left_page, separator)?;
            root.set_num_keys(1);
            root.set_right_child(right_page);
        }
        debug!("root split: left page {left_page}, separator {separator}, right page {right_page}");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Rebalancing
    // ------------------------------------------------------------------

    /// Restores minimum occupancy of an underflowing leaf: borrow from the
    /// left sibling, else the right, else merge.
    fn rebalance_leaf(&mut self, page_num: u32, path: &mut Path) -> Result<()> {
        let Some(&parent_page) = path.last() else {
            bail!("underflowing leaf {page_num} has no parent on the path");
        };
        let (child_index, left_page, right_page) = {
            let frame = self.pager.get_page(parent_page)?;
            let parent = InternalNode::from_page(frame)?;
            let child_index = find_child_index(&parent, page_num)?;
            let left = if child_index > 0 {
                Some(parent.child_at(child_index - 1)?)
            } else {
                None
            };
            let right = if child_index < parent.num_keys() {
                Some(parent.child_at(child_index + 1)?)
            } else {
                None
            };
            (child_index, left, right)
        };

        if let Some(left_page) = left_page {
            let donor = {
                let frame = self.pager.get_page(left_page)?;
                let left = LeafNode::from_page(frame)?;
                if !left.is_underflow() && left.num_cells() > LEAF_MIN_CELLS {
                    let last = left.num_cells() - 1;
                    Some((left.key_at(last)?, left.record_at(last)?.to_vec(), last))
                } else {
                    None
                }
            };
            if let Some((key, record, donor_index)) = donor {
                {
                    let frame = self.pager.get_page(page_num)?;
                    LeafNodeMut::from_page(frame)?.insert(key, &record)?;
                }
                {
                    let frame = self.pager.get_page(left_page)?;
                    LeafNodeMut::from_page(frame)?.remove_at(donor_index)?;
                }
                let first_key = {
                    let frame = self.pager.get_page(page_num)?;
                    LeafNode::from_page(frame)?.key_at(0)?
                };
                let frame = self.pager.get_page(parent_page)?;
                InternalNodeMut::from_page(frame)?.set_key(child_index - 1, first_key)?;
                debug!("leaf borrow-left: page {page_num} took key {key} from page {left_page}");
                return Ok(());
            }
        }

        if let Some(right_page) = right_page {
            let donor = {
                let frame = self.pager.get_page(right_page)?;
                let right = LeafNode::from_page(frame)?;
                if !right.is_underflow() && right.num_cells() > LEAF_MIN_CELLS {
                    Some((right.key_at(0)?, right.record_at(0)?.to_vec()))
                } else {
                    None
                }
            };
            if let Some((key, record)) = donor {
                {
                    let frame = self.pager.get_page(page_num)?;
                    LeafNodeMut::from_page(frame)?.insert(key, &record)?;
                }
                {
                    let frame = self.pager.get_page(right_page)?;
                    LeafNodeMut::from_page(frame)?.remove_at(0)?;
                }
                let right_first = {
                    let frame = self.pager.get_page(right_page)?;
                    LeafNode::from_page(frame)?.key_at(0)?
                };
                let frame = self.pager.get_page(parent_page)?;
                InternalNodeMut::from_page(frame)?.set_key(child_index, right_first)?;
                debug!("leaf borrow-right: page {page_num} took key {key} from page {right_page}");
                return Ok(());
            }
        }

        if let Some(left_page) = left_page {
            self.merge_leaves(left_page, page_num, parent_page, child_index - 1, path)
        } else if let Some(right_page) = right_page {
            self.merge_leaves(page_num, right_page, parent_page, child_index, path)
        } else {
            bail!("leaf page {page_num} has no siblings to rebalance with");
        }
    }

    /// Merges the right leaf into the left, splices the sibling chain past
    /// the absorbed page, frees it, and drops the separator from the
    /// parent.
    fn merge_leaves(
        &mut self,
        left_page: u32,
        right_page: u32,
        parent_page: u32,
        sep_index: usize,
        path: &mut Path,
    ) -> Result<()> {
        let (entries, right_next) = {
            let frame = self.pager.get_page(right_page)?;
            let right = LeafNode::from_page(frame)?;
            let mut entries = Vec::with_capacity(right.num_cells());
            for i in 0..right.num_cells() {
                entries.push((right.key_at(i)?, right.record_at(i)?.to_vec()));
            }
            (entries, right.next_leaf())
        };
        {
            let frame = self.pager.get_page(left_page)?;
            let mut left = LeafNodeMut::from_page(frame)?;
            for (key, record) in &entries {
                left.insert(*key, record)?;
            }
            left.set_next_leaf(right_next);
        }
        self.pager.free_page(right_page)?;
        debug!("merged leaf page {right_page} into page {left_page} (freed {right_page})");

        self.remove_separator(parent_page, sep_index, path)
    }

    /// Drops a separator after a merge, then handles the parent: an empty
    /// root collapses, an underflowing non-root rebalances recursively.
    fn remove_separator(&mut self, parent_page: u32, sep_index: usize, path: &mut Path) -> Result<()> {
        let (is_root, num_keys) = {
            let frame = self.pager.get_page(parent_page)?;
            let mut parent = InternalNodeMut::from_page(frame)?;
            parent.remove_key(sep_index)?;
            let view = parent.as_ref();
            (view.is_root(), view.num_keys())
        };

        if is_root && num_keys == 0 {
            self.collapse_root(parent_page)
        } else if !is_root && num_keys < INTERNAL_MIN_KEYS {
            path.pop();
            self.rebalance_internal(parent_page, path)
        } else {
            Ok(())
        }
    }

    /// A keyless root has exactly one child left: copy its bytes onto the
    /// root page and free it. The tree loses a level and the root stays at
    /// page 1.
    fn collapse_root(&mut self, root_page: u32) -> Result<()> {
        let only_child = {
            let frame = self.pager.get_page(root_page)?;
            InternalNode::from_page(frame)?.right_child()
        };
        let snapshot = {
            let frame = self.pager.get_page(only_child)?;
            let mut buf = [0u8; PAGE_SIZE];
            buf.copy_from_slice(frame);
            buf
        };
        {
            let frame = self.pager.get_page(root_page)?;
            frame.copy_from_slice(&snapshot);
            NodeHeader::from_bytes_mut(frame)?.set_root(true);
        }
        self.pager.free_page(only_child)?;
        debug!("root collapsed: tree height reduced by one");
        Ok(())
    }

    /// Internal-node counterpart of `rebalance_leaf`. Borrowing rotates the
    /// parent separator down and a sibling key up; merging pulls the
    /// separator down between the two halves.
    fn rebalance_internal(&mut self, page_num: u32, path: &mut Path) -> Result<()> {
        // Reaching an empty path means the node is (or just became) the
        // root; the root has no minimum occupancy.
        let Some(&parent_page) = path.last() else {
            return Ok(());
        };
        let (child_index, left_page, right_page) = {
            let frame = self.pager.get_page(parent_page)?;
            let parent = InternalNode::from_page(frame)?;
            let child_index = find_child_index(&parent, page_num)?;
            let left = if child_index > 0 {
                Some(parent.child_at(child_index - 1)?)
            } else {
                None
            };
            let right = if child_index < parent.num_keys() {
                Some(parent.child_at(child_index + 1)?)
            } else {
                None
            };
            (child_index, left, right)
        };

        if let Some(left_page) = left_page {
            let donor = {
                let frame = self.pager.get_page(left_page)?;
                let left = InternalNode::from_page(frame)?;
                let count = left.num_keys();
                if count > INTERNAL_MIN_KEYS {
                    Some((
                        left.key_at(count - 1)?,
                        left.right_child(),
                        left.child_at(count - 1)?,
                        count,
                    ))
                } else {
                    None
                }
            };
            if let Some((borrowed_key, borrowed_child, left_new_right, left_count)) = donor {
                let sep = child_index - 1;
                let parent_key = {
                    let frame = self.pager.get_page(parent_page)?;
                    InternalNode::from_page(frame)?.key_at(sep)?
                };
                {
                    let frame = self.pager.get_page(left_page)?;
                    let mut left = InternalNodeMut::from_page(frame)?;
                    left.set_right_child(left_new_right);
                    left.set_num_keys(left_count - 1);
                }
                {
                    // Rotate the separator down into position 0; the donated
                    // child becomes the new leftmost child.
                    let frame = self.pager.get_page(page_num)?;
                    let mut node = InternalNodeMut::from_page(frame)?;
                    let count = node.as_ref().num_keys();
                    for i in (0..count).rev() {
                        node.copy_cell(i + 1, i)?;
                    }
                    node.set_cell(0, borrowed_child, parent_key)?;
                    node.set_num_keys(count + 1);
                }
                let frame = self.pager.get_page(parent_page)?;
                InternalNodeMut::from_page(frame)?.set_key(sep, borrowed_key)?;
                debug!("internal borrow-left: page {page_num} took a child from page {left_page}");
                return Ok(());
            }
        }

        if let Some(right_page) = right_page {
            let donor = {
                let frame = self.pager.get_page(right_page)?;
                let right = InternalNode::from_page(frame)?;
                let count = right.num_keys();
                if count > INTERNAL_MIN_KEYS {
                    Some((right.key_at(0)?, right.child_at(0)?, count))
                } else {
                    None
                }
            };
            if let Some((borrowed_key, borrowed_child, right_count)) = donor {
                let sep = child_index;
                let parent_key = {
                    let frame = self.pager.get_page(parent_page)?;
                    InternalNode::from_page(frame)?.key_at(sep)?
                };
                {
                    let frame = self.pager.get_page(right_page)?;
                    let mut right = InternalNodeMut::from_page(frame)?;
                    for i in 0..right_count - 1 {
                        right.copy_cell(i, i + 1)?;
                    }
                    right.set_num_keys(right_count - 1);
                }
                {
                    // The separator comes down as the new last key; the
                    // donated child becomes the new right child.
                    let frame = self.pager.get_page(page_num)?;
                    let mut node = InternalNodeMut::from_page(frame)?;
                    let count = node.as_ref().num_keys();
                    let old_right = node.as_ref().right_child();
                    node.set_cell(count, old_right, parent_key)?;
                    node.set_right_child(borrowed_child);
                    node.set_num_keys(count + 1);
                }
                let frame = self.pager.get_page(parent_page)?;
                InternalNodeMut::from_page(frame)?.set_key(sep, borrowed_key)?;
                debug!("internal borrow-right: page {page_num} took a child from page {right_page}");
                return Ok(());
            }
        }

        if let Some(left_page) = left_page {
            self.merge_internals(left_page, page_num, parent_page, child_index - 1, path)
        } else if let Some(right_page) = right_page {
            self.merge_internals(page_num, right_page, parent_page, child_index, path)
        } else {
            bail!("internal page {page_num} has no siblings to rebalance with");
        }
    }

    /// Merges the right internal node into the left with the parent
    /// separator pulled down between them, then frees the right page.
    fn merge_internals(
        &mut self,
        left_page: u32,
        right_page: u32,
        parent_page: u32,
        sep_index: usize,
        path: &mut Path,
    ) -> Result<()> {
        let separator = {
            let frame = self.pager.get_page(parent_page)?;
            InternalNode::from_page(frame)?.key_at(sep_index)?
        };
        let (right_cells, right_right) = {
            let frame = self.pager.get_page(right_page)?;
            let right = InternalNode::from_page(frame)?;
            let count = right.num_keys();
            let mut cells = Vec::with_capacity(count);
            for i in 0..count {
                cells.push((right.child_at(i)?, right.key_at(i)?));
            }
            (cells, right.right_child())
        };
        {
            let frame = self.pager.get_page(left_page)?;
            let mut left = InternalNodeMut::from_page(frame)?;
            let left_count = left.as_ref().num_keys();
            let old_right = left.as_ref().right_child();
            left.set_cell(left_count, old_right, separator)?;
            for (i, (child, key)) in right_cells.iter().enumerate() {
                left.set_cell(left_count + 1 + i, *child, *key)?;
            }
            left.set_right_child(right_right);
            left.set_num_keys(left_count + 1 + right_cells.len());
        }
        self.pager.free_page(right_page)?;
        debug!("merged internal page {right_page} into page {left_page} (freed {right_page})");

        self.remove_separator(parent_page, sep_index, path)
    }

    // ------------------------------------------------------------------
    // Visualizers
    // ------------------------------------------------------------------

    /// Indented multi-line structure dump backing the .tree command.
    pub fn render_tree(&mut self) -> Result<String> {
        let mut out = String::new();
        self.render_tree_node(ROOT_PAGE, 0, &mut out)?;
        Ok(out)
    }

    fn render_tree_node(&mut self, page_num: u32, depth: usize, out: &mut String) -> Result<()> {
        use std::fmt::Write;

        let indent = "  ".repeat(depth);
        let kind = {
            let frame = self.pager.get_page(page_num)?;
            NodeKind::from_byte(frame[0])
        };
        match kind {
            NodeKind::Leaf => {
                let (num_cells, used, next, cells) = {
                    let frame = self.pager.get_page(page_num)?;
                    let leaf = LeafNode::from_page(frame)?;
                    let mut cells = Vec::with_capacity(leaf.num_cells());
                    for i in 0..leaf.num_cells() {
                        cells.push((leaf.key_at(i)?, leaf.slot_at(i)?.length()));
                    }
                    (leaf.num_cells(), leaf.used_bytes(), leaf.next_leaf(), cells)
                };
                let next = if next != 0 {
                    next.to_string()
                } else {
                    "nil".to_string()
                };
                writeln!(
                    out,
                    "{indent}- LEAF (page {page_num}) | {num_cells} rows, {used}B used | next -> {next}"
                )?;
                for (key, length) in cells {
                    writeln!(out, "{indent}  {key} [{length}B]")?;
                }
            }
            NodeKind::Internal => {
                let (keys, children, right) = {
                    let frame = self.pager.get_page(page_num)?;
                    let node = InternalNode::from_page(frame)?;
                    let mut keys = Vec::with_capacity(node.num_keys());
                    let mut children = Vec::with_capacity(node.num_keys());
                    for i in 0..node.num_keys() {
                        keys.push(node.key_at(i)?);
                        children.push(node.child_at(i)?);
                    }
                    (keys, children, node.right_child())
                };
                writeln!(
                    out,
                    "{indent}- INTERNAL (page {page_num}) | {} keys",
                    keys.len()
                )?;
                for (key, child) in keys.iter().zip(&children) {
                    self.render_tree_node(*child, depth + 1, out)?;
                    writeln!(out, "{indent}  key: {key}")?;
                }
                self.render_tree_node(right, depth + 1, out)?;
            }
            other => bail!("unexpected {other:?} page {page_num} in tree dump"),
        }
        Ok(())
    }

    /// Single-line JSON rendering of the node structure, backing .json.
    pub fn render_json(&mut self) -> Result<String> {
        let mut out = String::new();
        self.render_json_node(ROOT_PAGE, &mut out)?;
        Ok(out)
    }

    fn render_json_node(&mut self, page_num: u32, out: &mut String) -> Result<()> {
        use std::fmt::Write;

        let kind = {
            let frame = self.pager.get_page(page_num)?;
            NodeKind::from_byte(frame[0])
        };
        match kind {
            NodeKind::Leaf => {
                let keys = {
                    let frame = self.pager.get_page(page_num)?;
                    let leaf = LeafNode::from_page(frame)?;
                    let mut keys = Vec::with_capacity(leaf.num_cells());
                    for i in 0..leaf.num_cells() {
                        keys.push(leaf.key_at(i)?.to_string());
                    }
                    keys
                };
                write!(
                    out,
                    "{{\"type\": \"leaf\", \"page\": {page_num}, \"cells\": [{}]}}",
                    keys.join(",")
                )?;
            }
            NodeKind::Internal => {
                let (keys, children, right) = {
                    let frame = self.pager.get_page(page_num)?;
                    let node = InternalNode::from_page(frame)?;
                    let mut keys = Vec::with_capacity(node.num_keys());
                    let mut children = Vec::with_capacity(node.num_keys());
                    for i in 0..node.num_keys() {
                        keys.push(node.key_at(i)?.to_string());
                        children.push(node.child_at(i)?);
                    }
                    (keys, children, node.right_child())
                };
                write!(out, "{{\"type\": \"internal\", \"page\": {page_num}, \"children\": [")?;
                for child in children {
                    self.render_json_node(child, out)?;
                    out.push(',');
                }
                self.render_json_node(right, out)?;
                write!(out, "], \"keys\": [{}]}}", keys.join(","))?;
            }
            other => bail!("unexpected {other:?} page {page_num} in tree dump"),
        }
        Ok(())
    }
}

/// Locates `child_page` among a parent's children. Failure here means the
/// path and the on-page structure disagree, which is an invariant
/// violation, not a recoverable condition.
fn find_child_index(parent: &InternalNode<'_>, child_page: u32) -> Result<usize> {
    let num_keys = parent.num_keys();
    for i in 0..num_keys {
        if parent.child_at(i)? == child_page {
            return Ok(i);
        }
    }
    if parent.right_child() == child_page {
        return Ok(num_keys);
    }
    bail!("child page {child_page} not found in its parent node");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EMAIL_MAX, USERNAME_MAX};

    fn open_pager(path: &std::path::Path) -> Pager {
        Pager::open(path).unwrap()
    }

    fn small_row(id: u32) -> Row {
        Row::new(id, format!("user{id}"), format!("user{id}@example.com")).unwrap()
    }

    fn max_row(id: u32) -> Row {
        Row::new(id, "u".repeat(USERNAME_MAX), "e".repeat(EMAIL_MAX)).unwrap()
    }

    #[test]
    fn fresh_tree_has_root_leaf_at_page_1() {
        let dir = tempfile::tempdir().unwrap();
        let mut pager = open_pager(&dir.path().join("t.db"));

        let mut tree = BTree::new(&mut pager).unwrap();

        assert!(tree.select_all().unwrap().is_empty());
        assert_eq!(tree.pager().total_pages(), 2);
        let frame = tree.pager().get_page(ROOT_PAGE).unwrap();
        let leaf = LeafNode::from_page(frame).unwrap();
        assert!(leaf.is_root());
        assert_eq!(leaf.num_cells(), 0);
    }

    #[test]
    fn insert_then_lookup_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let mut pager = open_pager(&dir.path().join("t.db"));
        let mut tree = BTree::new(&mut pager).unwrap();

        tree.insert(&small_row(5)).unwrap();
        tree.insert(&small_row(3)).unwrap();
        tree.insert(&small_row(9)).unwrap();

        assert_eq!(tree.find_row(3).unwrap(), Some(small_row(3)));
        assert_eq!(tree.find_row(9).unwrap(), Some(small_row(9)));
        assert_eq!(tree.find_row(4).unwrap(), None);

        let ids: Vec<u32> = tree.select_all().unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 5, 9]);
    }

    #[test]
    fn duplicate_insert_reports_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut pager = open_pager(&dir.path().join("t.db"));
        let mut tree = BTree::new(&mut pager).unwrap();

        tree.insert(&Row::new(1, "a", "a@x").unwrap()).unwrap();
        tree.insert(&Row::new(2, "b", "b@x").unwrap()).unwrap();
        let err = tree
            .insert(&Row::new(1, "c", "c@x").unwrap())
            .unwrap_err()
            .to_string();

        assert_eq!(err, "Duplicate key 1");

        let rows = tree.select_all().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].username(), "a");
        assert_eq!(rows[1].username(), "b");
    }

    #[test]
    fn remove_missing_key_is_false() {
        let dir = tempfile::tempdir().unwrap();
        let mut pager = open_pager(&dir.path().join("t.db"));
        let mut tree = BTree::new(&mut pager).unwrap();

        tree.insert(&small_row(1)).unwrap();

        assert!(!tree.remove(2).unwrap());
        assert!(tree.remove(1).unwrap());
        assert!(!tree.remove(1).unwrap());
        assert!(tree.select_all().unwrap().is_empty());
    }

    #[test]
    fn splits_preserve_order_and_content() {
        let dir = tempfile::tempdir().unwrap();
        let mut pager = open_pager(&dir.path().join("t.db"));
        let mut tree = BTree::new(&mut pager).unwrap();

        // Max-size rows overflow a leaf after ~13 inserts.
        for id in (1..=60u32).rev() {
            tree.insert(&max_row(id)).unwrap();
        }

        let ids: Vec<u32> = tree.select_all().unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, (1..=60).collect::<Vec<_>>());
        assert!(tree.render_json().unwrap().starts_with("{\"type\": \"internal\""));

        for id in 1..=60 {
            assert_eq!(tree.find_row(id).unwrap().unwrap().id, id);
        }
    }

    #[test]
    fn range_scan_is_inclusive_and_ordered() {
        let dir = tempfile::tempdir().unwrap();
        let mut pager = open_pager(&dir.path().join("t.db"));
        let mut tree = BTree::new(&mut pager).unwrap();

        for id in 1..=80u32 {
            tree.insert(&max_row(id)).unwrap();
        }

        let ids: Vec<u32> = tree
            .range_scan(25, 40)
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, (25..=40).collect::<Vec<_>>());

        assert!(tree.range_scan(200, 300).unwrap().is_empty());
    }

    #[test]
    fn deleting_every_other_key_rebalances() {
        let dir = tempfile::tempdir().unwrap();
        let mut pager = open_pager(&dir.path().join("t.db"));
        let mut tree = BTree::new(&mut pager).unwrap();

        for id in 1..=120u32 {
            tree.insert(&max_row(id)).unwrap();
        }
        for id in (1..=120u32).step_by(2) {
            assert!(tree.remove(id).unwrap(), "failed to delete {id}");
        }

        let ids: Vec<u32> = tree.select_all().unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, (2..=120).step_by(2).collect::<Vec<_>>());
        // Merges freed pages back to the pager.
        assert!(tree.pager().free_pages() > 0);
    }

    #[test]
    fn tree_collapses_back_to_a_root_leaf() {
        let dir = tempfile::tempdir().unwrap();
        let mut pager = open_pager(&dir.path().join("t.db"));
        let mut tree = BTree::new(&mut pager).unwrap();

        for id in 1..=60u32 {
            tree.insert(&max_row(id)).unwrap();
        }
        assert!(tree.render_json().unwrap().starts_with("{\"type\": \"internal\""));

        for id in 1..=58u32 {
            assert!(tree.remove(id).unwrap());
        }

        assert!(tree.render_json().unwrap().starts_with("{\"type\": \"leaf\""));
        let ids: Vec<u32> = tree.select_all().unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![59, 60]);

        // The root is still page 1 and flagged as root.
        let frame = tree.pager().get_page(ROOT_PAGE).unwrap();
        assert!(LeafNode::from_page(frame).unwrap().is_root());
    }

    #[test]
    fn bloom_rebuild_keeps_live_keys_visible() {
        let dir = tempfile::tempdir().unwrap();
        let mut pager = open_pager(&dir.path().join("t.db"));
        let mut tree = BTree::new(&mut pager).unwrap();

        for id in 1..=50u32 {
            tree.insert(&small_row(id)).unwrap();
        }
        for id in 1..=25u32 {
            tree.remove(id).unwrap();
        }

        let before = tree.bloom_stats().unwrap().set_bits;
        tree.rebuild_bloom().unwrap();
        let after = tree.bloom_stats().unwrap().set_bits;

        assert!(after <= before);
        for id in 26..=50u32 {
            assert_eq!(tree.find_row(id).unwrap().unwrap().id, id);
        }
    }

    #[test]
    fn insert_after_delete_restores_accounting() {
        let dir = tempfile::tempdir().unwrap();
        let mut pager = open_pager(&dir.path().join("t.db"));
        let mut tree = BTree::new(&mut pager).unwrap();

        tree.insert(&small_row(10)).unwrap();
        let snapshot = {
            let frame = tree.pager().get_page(ROOT_PAGE).unwrap();
            let leaf = LeafNode::from_page(frame).unwrap();
            (leaf.num_cells(), leaf.total_free(), leaf.data_end())
        };

        tree.insert(&small_row(20)).unwrap();
        tree.remove(20).unwrap();

        let frame = tree.pager().get_page(ROOT_PAGE).unwrap();
        let leaf = LeafNode::from_page(frame).unwrap();
        assert_eq!(leaf.num_cells(), snapshot.0);
        assert_eq!(leaf.total_free(), snapshot.1);
        assert_eq!(leaf.key_at(0).unwrap(), 10);
    }

    #[test]
    fn tree_dump_names_every_level() {
        let dir = tempfile::tempdir().unwrap();
        let mut pager = open_pager(&dir.path().join("t.db"));
        let mut tree = BTree::new(&mut pager).unwrap();

        for id in 1..=40u32 {
            tree.insert(&max_row(id)).unwrap();
        }

        let dump = tree.render_tree().unwrap();
        assert!(dump.contains("INTERNAL (page 1)"));
        assert!(dump.contains("LEAF"));
        assert!(dump.contains("key:"));
    }
}
