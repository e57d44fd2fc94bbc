//! # Row Codec
//!
//! A row is the fixed-schema record stored in leaf pages: a `u32` primary key
//! plus two variable-length text fields. On the wire a row is encoded as
//!
//! ```text
//! [id:4][ulen:2][username bytes][elen:2][email bytes]
//! ```
//!
//! with little-endian integers. The minimum encoding is 8 bytes (both fields
//! empty) and the maximum is 293 bytes. The key of a record is always its
//! first four bytes, which lets leaf pages compare keys without decoding the
//! full row.

use std::fmt;

use eyre::{ensure, Result};

use crate::config::{EMAIL_MAX, ROW_MIN_SIZE, USERNAME_MAX};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub id: u32,
    username: String,
    email: String,
}

impl Row {
    /// Builds a row, rejecting over-long text fields instead of truncating.
    pub fn new(id: u32, username: impl Into<String>, email: impl Into<String>) -> Result<Self> {
        let username = username.into();
        let email = email.into();

        ensure!(
            username.len() <= USERNAME_MAX,
            "username exceeds {} bytes ({} given)",
            USERNAME_MAX,
            username.len()
        );
        ensure!(
            email.len() <= EMAIL_MAX,
            "email exceeds {} bytes ({} given)",
            EMAIL_MAX,
            email.len()
        );

        Ok(Self {
            id,
            username,
            email,
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn encoded_len(&self) -> usize {
        4 + 2 + self.username.len() + 2 + self.email.len()
    }

    /// Encodes the row into `dst`, returning the number of bytes written.
    pub fn serialize(&self, dst: &mut [u8]) -> Result<usize> {
        let len = self.encoded_len();
        ensure!(
            dst.len() >= len,
            "serialization buffer too small: {} < {}",
            dst.len(),
            len
        );

        let mut off = 0;
        dst[off..off + 4].copy_from_slice(&self.id.to_le_bytes());
        off += 4;

        dst[off..off + 2].copy_from_slice(&(self.username.len() as u16).to_le_bytes());
        off += 2;
        dst[off..off + self.username.len()].copy_from_slice(self.username.as_bytes());
        off += self.username.len();

        dst[off..off + 2].copy_from_slice(&(self.email.len() as u16).to_le_bytes());
        off += 2;
        dst[off..off + self.email.len()].copy_from_slice(self.email.as_bytes());
        off += self.email.len();

        Ok(off)
    }

    /// Decodes a row from the start of `src` with bounds checking on every
    /// field.
    pub fn deserialize(src: &[u8]) -> Result<Self> {
        ensure!(
            src.len() >= ROW_MIN_SIZE,
            "record too short for a row: {} bytes",
            src.len()
        );

        let id = u32::from_le_bytes([src[0], src[1], src[2], src[3]]);
        let mut off = 4;

        let ulen = u16::from_le_bytes([src[off], src[off + 1]]) as usize;
        off += 2;
        ensure!(ulen <= USERNAME_MAX, "username length {} out of bounds", ulen);
        ensure!(
            src.len() >= off + ulen + 2,
            "record truncated inside username"
        );
        let username = std::str::from_utf8(&src[off..off + ulen])?.to_string();
        off += ulen;

        let elen = u16::from_le_bytes([src[off], src[off + 1]]) as usize;
        off += 2;
        ensure!(elen <= EMAIL_MAX, "email length {} out of bounds", elen);
        ensure!(src.len() >= off + elen, "record truncated inside email");
        let email = std::str::from_utf8(&src[off..off + elen])?.to_string();

        Ok(Self {
            id,
            username,
            email,
        })
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.id, self.username, self.email)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ROW_MAX_SIZE;

    #[test]
    fn roundtrip_preserves_fields() {
        let row = Row::new(42, "alice", "alice@example.com").unwrap();
        let mut buf = [0u8; ROW_MAX_SIZE];

        let written = row.serialize(&mut buf).unwrap();
        let decoded = Row::deserialize(&buf[..written]).unwrap();

        assert_eq!(decoded, row);
        assert_eq!(written, row.encoded_len());
    }

    #[test]
    fn empty_fields_encode_to_minimum_size() {
        let row = Row::new(1, "", "").unwrap();
        let mut buf = [0u8; ROW_MAX_SIZE];

        let written = row.serialize(&mut buf).unwrap();

        assert_eq!(written, ROW_MIN_SIZE);
        assert_eq!(Row::deserialize(&buf[..written]).unwrap(), row);
    }

    #[test]
    fn maximum_size_row_roundtrips() {
        let username = "u".repeat(USERNAME_MAX);
        let email = "e".repeat(EMAIL_MAX);
        let row = Row::new(u32::MAX, username, email).unwrap();
        let mut buf = [0u8; ROW_MAX_SIZE];

        let written = row.serialize(&mut buf).unwrap();

        assert_eq!(written, ROW_MAX_SIZE);
        assert_eq!(Row::deserialize(&buf).unwrap(), row);
    }

    #[test]
    fn overlong_username_rejected() {
        let result = Row::new(1, "u".repeat(USERNAME_MAX + 1), "a@b");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("username"));
    }

    #[test]
    fn overlong_email_rejected() {
        let result = Row::new(1, "a", "e".repeat(EMAIL_MAX + 1));
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("email"));
    }

    #[test]
    fn key_is_first_four_bytes() {
        let row = Row::new(0xDEADBEEF, "x", "y@z").unwrap();
        let mut buf = [0u8; ROW_MAX_SIZE];
        row.serialize(&mut buf).unwrap();

        assert_eq!(u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]), 0xDEADBEEF);
    }

    #[test]
    fn truncated_record_rejected() {
        let row = Row::new(7, "user", "user@host").unwrap();
        let mut buf = [0u8; ROW_MAX_SIZE];
        let written = row.serialize(&mut buf).unwrap();

        let result = Row::deserialize(&buf[..written - 3]);
        assert!(result.is_err());
    }

    #[test]
    fn serialize_rejects_small_buffer() {
        let row = Row::new(7, "user", "user@host").unwrap();
        let mut buf = [0u8; 4];

        assert!(row.serialize(&mut buf).is_err());
    }
}
