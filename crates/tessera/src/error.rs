//! Error and Result types for Tessera array operations.

use crate::fragment::Timestamp;
use std::io;
use thiserror::Error;

/// A convenience `Result` type for Tessera operations.
pub type Result<T> = std::result::Result<T, ArrayError>;

/// The error type for array storage operations.
#[derive(Debug, Error)]
pub enum ArrayError {
    /// Buffer shapes or names are inconsistent with the array schema.
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// A write layout is invalid for the array kind, for example a sparse
    /// write without coordinates.
    #[error("Layout error: {0}")]
    LayoutError(String),

    /// A sparse tile would exceed its configured maximum cell count.
    #[error("Tile capacity exceeded: {cells} cells, capacity {capacity}")]
    CapacityExceeded {
        /// Number of cells the tile would hold.
        cells: u64,
        /// Configured maximum cells per tile.
        capacity: u64,
    },

    /// A caller-supplied buffer cannot hold even a single result cell.
    ///
    /// Recoverable: the caller resizes to at least `required` bytes and
    /// resubmits.
    #[error("Buffer too small for '{attribute}': requires {required} bytes, capacity {capacity}")]
    BufferTooSmall {
        /// Attribute (or coordinate) buffer that is too small.
        attribute: String,
        /// Minimum byte count required to make progress.
        required: u64,
        /// Capacity the caller supplied.
        capacity: u64,
    },

    /// A concurrent structural change invalidated a consolidation run.
    ///
    /// Recoverable: re-select the run against a fresh snapshot and retry.
    #[error("Consolidation conflict: fragment at timestamp {timestamp} interleaves the selected run")]
    ConsolidationConflict {
        /// Timestamp of the fragment that invalidated the run.
        timestamp: Timestamp,
    },

    /// Invalid magic bytes in a fragment file.
    #[error("Invalid magic bytes: expected TSRA, got {0:?}")]
    InvalidMagic([u8; 4]),

    /// Unsupported fragment file format version.
    #[error("Unsupported version: {0}")]
    UnsupportedVersion(u16),

    /// Stored checksum does not match the computed value.
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Expected CRC32 checksum.
        expected: u32,
        /// Actual computed CRC32 checksum.
        actual: u32,
    },

    /// A fragment file is structurally invalid beyond checksum failures.
    #[error("Fragment corrupt: {0}")]
    FragmentCorrupt(String),

    /// A merge or result buffer could not be allocated.
    ///
    /// Recoverable: the caller may shrink the request (smaller subarray or
    /// buffer capacities) and retry.
    #[error("Allocation of {0} bytes failed")]
    Allocation(usize),

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
