//! Fixed header layout of the random-access container.
//!
//! The magic UTF string occupies bytes 0..7; bytes 7..20 are zero padding.
//! Pointer slots hold zero until the writing session closes, which is how
//! a reader detects an unfinalized container.

/// Container magic, written as a UTF string (u16 length + bytes).
pub const MAGIC: &str = "j3dff";

/// Current writer format version. Readers refuse anything newer.
pub const FORMAT_VERSION: i32 = 1;

pub const OFFSET_VERSION: u64 = 20;
pub const OFFSET_SYMBOL_TABLE_PTR: u64 = 24;
pub const OFFSET_BRANCH_DIR_PTR: u64 = 32;
pub const OFFSET_NAMED_PTR: u64 = 40;
pub const OFFSET_REGISTRY_PTR: u64 = 48;
pub const OFFSET_UNIVERSE_PTR: u64 = 56;
pub const OFFSET_RESERVED: u64 = 64;
pub const OFFSET_BRANCH_COUNT: u64 = 68;
pub const OFFSET_DESCRIPTION: u64 = 72;
