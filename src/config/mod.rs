//! Configuration constants for page layout, pool sizing, and row bounds.
//!
//! Import constants from this module rather than defining them locally:
//!
//! ```ignore
//! use crate::config::{PAGE_SIZE, BUFFER_POOL_SIZE};
//! ```

mod constants;

pub use constants::*;
