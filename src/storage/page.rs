//! # Page Kinds and the Common Node Header
//!
//! Every tree page begins with a 6-byte header shared by both node shapes:
//!
//! ```text
//! Offset  Size  Field     Description
//! ------  ----  --------  ----------------------------------------
//! 0       1     kind      Internal (0), Leaf (1), or Free (2)
//! 1       1     is_root   1 on the root page, 0 elsewhere
//! 2       4     crc32     Page checksum, stamped at flush time
//! ```
//!
//! Freed pages keep byte 0 set to `Free` so the flush path skips CRC
//! stamping; their free-list next pointer lives at byte 6, just past this
//! header, to avoid overlapping the checksum field.
//!
//! The header is a zerocopy overlay read in place from a page frame; the
//! typed leaf and internal views in `btree` build on top of it.

use eyre::{ensure, Result};
use zerocopy::little_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::NODE_HEADER_SIZE;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Internal = 0,
    Leaf = 1,
    Free = 2,
    Unknown = 0xFF,
}

impl NodeKind {
    pub fn from_byte(b: u8) -> Self {
        match b {
            0 => NodeKind::Internal,
            1 => NodeKind::Leaf,
            2 => NodeKind::Free,
            _ => NodeKind::Unknown,
        }
    }

    /// Tree pages are the only pages that carry a checksum.
    pub fn is_tree(self) -> bool {
        matches!(self, NodeKind::Internal | NodeKind::Leaf)
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct NodeHeader {
    kind: u8,
    is_root: u8,
    checksum: U32,
}

const _: () = assert!(std::mem::size_of::<NodeHeader>() == NODE_HEADER_SIZE);

impl NodeHeader {
    pub fn from_bytes(data: &[u8]) -> Result<&Self> {
        ensure!(
            data.len() >= NODE_HEADER_SIZE,
            "buffer too small for NodeHeader: {} < {}",
            data.len(),
            NODE_HEADER_SIZE
        );

        Self::ref_from_bytes(&data[..NODE_HEADER_SIZE])
            .map_err(|e| eyre::eyre!("failed to read NodeHeader: {:?}", e))
    }

    pub fn from_bytes_mut(data: &mut [u8]) -> Result<&mut Self> {
        ensure!(
            data.len() >= NODE_HEADER_SIZE,
            "buffer too small for NodeHeader: {} < {}",
            data.len(),
            NODE_HEADER_SIZE
        );

        Self::mut_from_bytes(&mut data[..NODE_HEADER_SIZE])
            .map_err(|e| eyre::eyre!("failed to read NodeHeader: {:?}", e))
    }

    pub fn kind(&self) -> NodeKind {
        NodeKind::from_byte(self.kind)
    }

    pub fn set_kind(&mut self, kind: NodeKind) {
        self.kind = kind as u8;
    }

    pub fn is_root(&self) -> bool {
        self.is_root != 0
    }

    pub fn set_root(&mut self, is_root: bool) {
        self.is_root = u8::from(is_root);
    }

    pub fn checksum(&self) -> u32 {
        self.checksum.get()
    }

    pub fn set_checksum(&mut self, crc: u32) {
        self.checksum = U32::new(crc);
    }
}
