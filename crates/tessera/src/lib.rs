//! Tessera - Multi-Dimensional Array Storage Engine
//!
//! This crate provides the core storage primitives for the Tessera array
//! engine. Arrays (dense or sparse) are written as immutable, timestamped
//! **fragments**; reads synthesize one consistent logical state from
//! possibly many overlapping fragments.
//!
//! # Components
//!
//! - [`ArraySchema`]: static dimension/attribute/tiling description
//! - [`FragmentWriter`](fragment::FragmentWriter): turns cell buffers into one sealed fragment
//! - [`FragmentIndex`](index::FragmentIndex): timestamp-ordered fragment catalog with snapshot isolation
//! - [`MergeReader`](read::merge::MergeReader): overwrite-resolved, deduplicated merge reads
//! - [`Consolidator`](consolidate): replaces a fragment run with one equivalent fragment
//!
//! # Example
//!
//! ```rust,ignore
//! use tessera::{Array, ArraySchema, Layout};
//! use tessera::storage::DirectoryStorage;
//!
//! let storage = DirectoryStorage::new("/data/my_array");
//! let array = Array::create(storage, schema)?;
//!
//! // Each write seals one immutable fragment at the next timestamp
//! array.write(Layout::RowMajor, write_request)?;
//!
//! // Reads fold all overlapping fragments, last writer wins per cell
//! let result = array.read(read_request)?;
//!
//! // Consolidation replaces a fragment run with one equivalent fragment
//! array.consolidate(&ConsolidationPolicy::default())?;
//! ```

#![deny(missing_docs)]

pub mod array;
pub mod buffer;
pub mod consolidate;
pub mod error;
pub mod fragment;
pub mod index;
pub mod read;
pub mod schema;
pub mod storage;

pub use array::Array;
pub use buffer::{OwnedBuffer, ValidityVector};
pub use consolidate::{ConsolidationPolicy, ConsolidationStats};
pub use error::{ArrayError, Result};
pub use fragment::{FragmentId, Timestamp, TimestampRange};
pub use read::{ReadRequest, ReadResult, ReadStatus, Subarray};
pub use schema::{ArrayKind, ArraySchema, Attribute, CellValNum, Datatype, Dimension, Layout};
