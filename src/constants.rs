//! Process-wide tunables and sentinel values.

/// Size of a single storage chunk, in bytes.
pub const CHUNK_SIZE: usize = 16 * 1024;

/// Capacity of the first group allocated inside a [`crate::hive::Hive`].
pub const INITIAL_HIVE_GROUP_CAPACITY: usize = 64;

/// Fixed seed for [`crate::hash::murmur3_x86_32`] (ASCII `"xecs"`).
pub const MURMUR_SEED: u32 = 0x7865_6373;

/// Sentinel for an invalid 32-bit handle.
pub const INVALID_HANDLE: u32 = 0xFFFF_FFFF;

/// Sentinel for an invalid 32-bit offset, index or size.
pub const INVALID_INDEX: u32 = 0xFFFF_FFFF;
