//! # Page Checksums
//!
//! Every tree page carries a CRC32 in its common header (bytes 2..6). The
//! checksum is computed over the full 4096-byte page with the checksum field
//! itself treated as zero, so a page can be verified without copying it.
//! ISO 3309 (polynomial 0xEDB88320) is used, matching the `CRC_32_ISO_HDLC`
//! parameter set.
//!
//! Page 0 and free pages are never stamped; a stored value of zero means the
//! page has not been flushed since initialization and is accepted on read.

use crc::{Crc, CRC_32_ISO_HDLC};

use crate::config::{OFFSET_CHECKSUM, PAGE_SIZE};

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// CRC32 over a full page with the 4-byte checksum field taken as zero.
pub fn page_checksum(page: &[u8]) -> u32 {
    debug_assert_eq!(page.len(), PAGE_SIZE);

    let mut digest = CRC32.digest();
    digest.update(&page[..OFFSET_CHECKSUM]);
    digest.update(&[0u8; 4]);
    digest.update(&page[OFFSET_CHECKSUM + 4..]);
    digest.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iso_hdlc_check_value() {
        // The canonical check input for CRC-32/ISO-HDLC.
        assert_eq!(CRC32.checksum(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn checksum_ignores_stored_field() {
        let mut page = vec![0xA5u8; PAGE_SIZE];
        let clean = page_checksum(&page);

        page[OFFSET_CHECKSUM..OFFSET_CHECKSUM + 4].copy_from_slice(&clean.to_le_bytes());

        assert_eq!(page_checksum(&page), clean);
    }

    #[test]
    fn checksum_detects_payload_change() {
        let mut page = vec![0u8; PAGE_SIZE];
        let before = page_checksum(&page);

        page[100] ^= 0xFF;

        assert_ne!(page_checksum(&page), before);
    }
}
