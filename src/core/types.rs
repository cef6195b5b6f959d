/*!
 * Core Types
 * Common types used across the crate
 */

/// Address type: a byte offset into the managed region
pub type Address = usize;

/// Size type for memory operations
pub type Size = usize;

/// Monotonic tick value stamped on allocations
pub type Tick = u64;

/// The null address. Never handed out by the allocator (the first valid data
/// address sits one header past the region start), so it can safely be used
/// as an empty sentinel by callers. Freeing it is a no-op.
pub const NULL_ADDRESS: Address = 0;
