//! # File Header
//!
//! The first 20 bytes of page 0 identify the file and anchor the free list:
//!
//! ```text
//! Offset  Size  Field            Description
//! ------  ----  ---------------  --------------------------------------
//! 0       4     magic            0xF04DB, validated at open
//! 4       4     page_size        Page size this file was written with
//! 8       4     total_pages      Pages allocated (header + data + free)
//! 12      4     free_pages       Pages currently on the free list
//! 16      4     first_free_page  Head of the free-page list (0 = empty)
//! ```
//!
//! The remainder of page 0 holds the bloom filter bit array. All fields are
//! little-endian; the struct is read in place from the page-0 frame via
//! zerocopy.

use eyre::{ensure, Result};
use zerocopy::little_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::{DB_MAGIC, FILE_HEADER_SIZE, PAGE_SIZE};

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct DbHeader {
    magic: U32,
    page_size: U32,
    total_pages: U32,
    free_pages: U32,
    first_free_page: U32,
}

const _: () = assert!(std::mem::size_of::<DbHeader>() == FILE_HEADER_SIZE);

impl DbHeader {
    /// Header for a freshly created file: only page 0 exists.
    pub fn new() -> Self {
        Self {
            magic: U32::new(DB_MAGIC),
            page_size: U32::new(PAGE_SIZE as u32),
            total_pages: U32::new(1),
            free_pages: U32::new(0),
            first_free_page: U32::new(0),
        }
    }

    /// Parses and validates a header read from disk. A wrong magic means the
    /// file is not one of ours (or is corrupt) and is fatal to open.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ensure!(
            bytes.len() >= FILE_HEADER_SIZE,
            "buffer too small for DbHeader: {} < {}",
            bytes.len(),
            FILE_HEADER_SIZE
        );

        let header = Self::ref_from_bytes(&bytes[..FILE_HEADER_SIZE])
            .map_err(|e| eyre::eyre!("failed to parse DbHeader: {:?}", e))?;

        ensure!(
            header.magic() == DB_MAGIC,
            "invalid database file (bad magic {:#x})",
            header.magic()
        );
        ensure!(
            header.page_size() == PAGE_SIZE as u32,
            "unsupported page size {} (expected {})",
            header.page_size(),
            PAGE_SIZE
        );

        Ok(*header)
    }

    pub fn magic(&self) -> u32 {
        self.magic.get()
    }

    pub fn page_size(&self) -> u32 {
        self.page_size.get()
    }

    pub fn total_pages(&self) -> u32 {
        self.total_pages.get()
    }

    pub fn set_total_pages(&mut self, pages: u32) {
        self.total_pages = U32::new(pages);
    }

    pub fn free_pages(&self) -> u32 {
        self.free_pages.get()
    }

    pub fn set_free_pages(&mut self, pages: u32) {
        self.free_pages = U32::new(pages);
    }

    pub fn first_free_page(&self) -> u32 {
        self.first_free_page.get()
    }

    pub fn set_first_free_page(&mut self, page: u32) {
        self.first_free_page = U32::new(page);
    }
}

impl Default for DbHeader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_size_is_20_bytes() {
        assert_eq!(std::mem::size_of::<DbHeader>(), 20);
    }

    #[test]
    fn new_header_describes_fresh_file() {
        let header = DbHeader::new();

        assert_eq!(header.magic(), DB_MAGIC);
        assert_eq!(header.page_size(), PAGE_SIZE as u32);
        assert_eq!(header.total_pages(), 1);
        assert_eq!(header.free_pages(), 0);
        assert_eq!(header.first_free_page(), 0);
    }

    #[test]
    fn roundtrip_through_bytes() {
        let mut header = DbHeader::new();
        header.set_total_pages(17);
        header.set_free_pages(3);
        header.set_first_free_page(9);

        let parsed = DbHeader::from_bytes(header.as_bytes()).unwrap();

        assert_eq!(parsed.total_pages(), 17);
        assert_eq!(parsed.free_pages(), 3);
        assert_eq!(parsed.first_free_page(), 9);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = [0u8; FILE_HEADER_SIZE];
        bytes[..4].copy_from_slice(&0xBADC0DEu32.to_le_bytes());
        bytes[4..8].copy_from_slice(&(PAGE_SIZE as u32).to_le_bytes());

        let result = DbHeader::from_bytes(&bytes);

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("magic"));
    }

    #[test]
    fn rejects_mismatched_page_size() {
        let mut bytes = [0u8; FILE_HEADER_SIZE];
        bytes[..4].copy_from_slice(&DB_MAGIC.to_le_bytes());
        bytes[4..8].copy_from_slice(&8192u32.to_le_bytes());

        let result = DbHeader::from_bytes(&bytes);

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("page size"));
    }
}
