/*!
 * Heap Types
 * Errors, configuration, flags, statistics, and snapshot records
 */

use crate::core::types::{Address, Size, Tick};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Heap operation result
pub type HeapResult<T> = Result<T, HeapError>;

/// Heap errors
///
/// `OutOfMemory` is the normal, expected failure mode of `alloc`: the request
/// could not be satisfied even after a full eviction scan. It is always
/// returned as a value, never panicked.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeapError {
    #[error("Out of memory: requested {requested} bytes, available {available} bytes ({used} used / {total} total)")]
    OutOfMemory {
        requested: Size,
        available: Size,
        used: Size,
        total: Size,
    },

    #[error("Invalid heap address: 0x{0:x}")]
    InvalidAddress(Address),

    #[error("Reference count exhausted on block at 0x{0:x}")]
    RefCountExhausted(Address),

    #[error("Region too small: {region_size} bytes cannot hold a root block (minimum {minimum})")]
    RegionTooSmall { region_size: Size, minimum: Size },

    #[error("Region size {0} is not a multiple of the block alignment")]
    MisalignedRegion(Size),
}

/// Per-block policy flags
///
/// Only meaningful on ref-counted blocks; cleared on every fresh allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", default)]
pub struct BlockFlags {
    /// Block is reference counted and lives in the ref-count ring
    pub ref_counted: bool,
    /// Never evict this block, even at zero ref count under pressure
    pub prevent_reuse: bool,
    /// Reclaim immediately when the ref count drops to zero
    pub free_on_zero: bool,
}

impl BlockFlags {
    /// Flags stamped on a fresh ref-counted allocation
    #[inline]
    #[must_use]
    pub fn ref_counted() -> Self {
        Self {
            ref_counted: true,
            ..Default::default()
        }
    }
}

/// Heap configuration
///
/// `region_size` must be a multiple of the 16-byte block alignment and large
/// enough to hold the root block header.
#[derive(Debug, Clone)]
pub struct HeapConfig {
    /// Total size of the managed region in bytes
    pub region_size: Size,
    /// Requests strictly below this size use the small allocation path
    pub small_block_threshold: Size,
    /// Fill payloads with the diagnostic byte patterns on alloc/free
    pub fill_patterns: bool,
}

/// Default region: 16MB
pub const DEFAULT_REGION_SIZE: Size = 16 * 1024 * 1024;

/// Default small-block threshold: 2KB
pub const DEFAULT_SMALL_BLOCK_THRESHOLD: Size = 0x800;

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            region_size: DEFAULT_REGION_SIZE,
            small_block_threshold: DEFAULT_SMALL_BLOCK_THRESHOLD,
            fill_patterns: true,
        }
    }
}

impl HeapConfig {
    pub fn new(region_size: Size) -> Self {
        Self {
            region_size,
            ..Default::default()
        }
    }

    pub fn with_small_block_threshold(mut self, threshold: Size) -> Self {
        self.small_block_threshold = threshold;
        self
    }

    pub fn with_fill_patterns(mut self, enabled: bool) -> Self {
        self.fill_patterns = enabled;
        self
    }
}

/// Heap statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeapStats {
    pub region_size: Size,
    pub used_bytes: Size,
    pub available_bytes: Size,
    pub usage_percentage: f64,
    pub block_count: Size,
    pub free_blocks: Size,
    pub ref_counted_blocks: Size,
    pub average_alloc_size: Size,
}

impl HeapStats {
    pub fn pressure(&self) -> HeapPressure {
        if self.usage_percentage >= 95.0 {
            HeapPressure::Critical
        } else if self.usage_percentage >= 80.0 {
            HeapPressure::High
        } else if self.usage_percentage >= 60.0 {
            HeapPressure::Medium
        } else {
            HeapPressure::Low
        }
    }
}

/// Heap pressure levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeapPressure {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for HeapPressure {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            HeapPressure::Low => write!(f, "LOW"),
            HeapPressure::Medium => write!(f, "MEDIUM"),
            HeapPressure::High => write!(f, "HIGH"),
            HeapPressure::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Point-in-time record of one block in the address-ordered ring.
///
/// This is the entire surface a presentation layer needs to render the heap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockSnapshot {
    /// Header address of the block
    pub address: Address,
    /// First payload byte (`address + HEADER_SIZE`)
    pub data_address: Address,
    pub free: bool,
    /// Payload bytes available to the owner (excludes the header)
    pub capacity: Size,
    /// Full span of the block including its header
    pub total_size: Size,
    pub id: u32,
    pub ref_count: u16,
    pub flags: BlockFlags,
    pub tag: Option<String>,
    pub alloc_ticks: Tick,
}
