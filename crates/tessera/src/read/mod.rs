//! Read queries: subarrays, caller buffers, and chunked delivery.
//!
//! Results are written into caller-capacity buffers. When the capacities
//! cannot hold the whole result, the engine returns a partial result plus
//! continuation state; a follow-up call resumes exactly after the last
//! fully-delivered cell. A cell's value is never split across two
//! deliveries.

pub mod merge;

use crate::buffer::{OwnedBuffer, ValidityVector};
use crate::error::{ArrayError, Result};
use crate::index::FragmentSet;
use crate::schema::{ArraySchema, Layout};
use std::sync::Arc;

/// The queried region: one inclusive range per dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subarray {
    ranges: Vec<(i64, i64)>,
}

impl Subarray {
    /// Creates a subarray from inclusive per-dimension ranges.
    pub fn new(ranges: Vec<(i64, i64)>) -> Self {
        Self { ranges }
    }

    /// The inclusive per-dimension ranges.
    pub fn ranges(&self) -> &[(i64, i64)] {
        &self.ranges
    }

    /// Validates the subarray against a schema's domain.
    ///
    /// # Errors
    ///
    /// Returns `ArrayError::LayoutError` for a dimension count mismatch,
    /// an inverted range, or a range outside the domain.
    pub fn check(&self, schema: &ArraySchema) -> Result<()> {
        if self.ranges.len() != schema.ndim() {
            return Err(ArrayError::LayoutError(format!(
                "subarray has {} ranges for {} dimensions",
                self.ranges.len(),
                schema.ndim()
            )));
        }
        for (d, (lo, hi)) in self.ranges.iter().enumerate() {
            let dim = schema.domain.dim(d);
            if lo > hi || *lo < dim.domain.0 || *hi > dim.domain.1 {
                return Err(ArrayError::LayoutError(format!(
                    "subarray range [{}, {}] outside dimension '{}'",
                    lo, hi, dim.name
                )));
            }
        }
        Ok(())
    }

    /// Total cell count of the subarray.
    pub fn cell_count(&self) -> u64 {
        self.ranges
            .iter()
            .map(|(lo, hi)| (hi - lo) as u64 + 1)
            .product()
    }

    /// Returns true if `coords` lies inside the subarray.
    pub fn contains(&self, coords: &[i64]) -> bool {
        self.ranges
            .iter()
            .zip(coords)
            .all(|(r, c)| *c >= r.0 && *c <= r.1)
    }
}

/// Caller-supplied capacities, in bytes, for one attribute's result
/// buffers.
#[derive(Debug, Clone, Copy)]
pub struct BufferCapacities {
    /// Capacity of the value buffer.
    pub values: u64,
    /// Capacity of the offsets buffer (variable-length attributes).
    pub offsets: u64,
    /// Capacity of the validity buffer (nullable attributes).
    pub validity: u64,
}

impl BufferCapacities {
    /// Capacities for a fixed-size, non-nullable attribute.
    pub fn values_only(values: u64) -> Self {
        Self {
            values,
            offsets: 0,
            validity: 0,
        }
    }

    /// Sets the offsets capacity.
    pub fn with_offsets(mut self, offsets: u64) -> Self {
        self.offsets = offsets;
        self
    }

    /// Sets the validity capacity.
    pub fn with_validity(mut self, validity: u64) -> Self {
        self.validity = validity;
        self
    }
}

/// Continuation state of an incomplete read.
///
/// Holds the fragment-list snapshot the read pinned at query start, so a
/// resumed read observes exactly the same logical state no matter what
/// writes or consolidations happened in between.
#[derive(Debug, Clone)]
pub struct Continuation {
    pub(crate) next_cell: u64,
    pub(crate) set: Arc<FragmentSet>,
}

impl Continuation {
    /// Index of the first not-yet-delivered cell in the merged result.
    pub fn next_cell(&self) -> u64 {
        self.next_cell
    }
}

/// Completion status of a read.
#[derive(Debug, Clone)]
pub enum ReadStatus {
    /// Every result cell was delivered.
    Completed,
    /// Capacities were exhausted; resubmit with the continuation to resume.
    Incomplete(Continuation),
}

impl ReadStatus {
    /// Returns true for [`ReadStatus::Completed`].
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// One read call: region, requested layout, buffer capacities.
#[derive(Debug)]
pub struct ReadRequest {
    /// The queried region.
    pub subarray: Subarray,
    /// Requested output layout.
    pub layout: Layout,
    /// Requested attributes with their buffer capacities.
    pub attributes: Vec<(String, BufferCapacities)>,
    /// Capacity in bytes for returned coordinates (sparse reads only).
    pub coords_capacity: Option<u64>,
    /// Resume state from a previous incomplete call.
    pub continuation: Option<Continuation>,
}

impl ReadRequest {
    /// Creates a request over `subarray` in the given layout.
    pub fn new(subarray: Subarray, layout: Layout) -> Self {
        Self {
            subarray,
            layout,
            attributes: Vec::new(),
            coords_capacity: None,
            continuation: None,
        }
    }

    /// Requests an attribute with the given capacities.
    pub fn attribute(mut self, name: impl Into<String>, capacities: BufferCapacities) -> Self {
        self.attributes.push((name.into(), capacities));
        self
    }

    /// Requests coordinate output with the given byte capacity.
    pub fn coords(mut self, capacity: u64) -> Self {
        self.coords_capacity = Some(capacity);
        self
    }

    /// Attaches continuation state from a previous incomplete call.
    pub fn resume(mut self, continuation: Continuation) -> Self {
        self.continuation = Some(continuation);
        self
    }
}

/// Result buffers of one attribute.
#[derive(Debug, Default)]
pub struct AttributeReadBuffer {
    /// Delivered value bytes.
    pub values: OwnedBuffer,
    /// Per-cell start offsets into `values` (variable-length attributes).
    pub offsets: Option<Vec<u64>>,
    /// Validity bytemap (nullable attributes).
    pub validity: Option<ValidityVector>,
}

/// Result of one read call.
#[derive(Debug)]
pub struct ReadResult {
    /// Delivered attribute buffers, in request order.
    pub attributes: Vec<(String, AttributeReadBuffer)>,
    /// Delivered coordinate tuples, flattened (sparse reads).
    pub coords: Option<Vec<i64>>,
    /// Number of whole cells delivered into every buffer.
    pub cells: u64,
    /// Whether the result is complete.
    pub status: ReadStatus,
}

impl ReadResult {
    /// The buffer delivered for `name`.
    pub fn attribute(&self, name: &str) -> Option<&AttributeReadBuffer> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, b)| b)
    }
}

/// Upper-bound byte counts for one attribute of a read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SizeEstimate {
    /// Upper bound on value bytes.
    pub values_bytes: u64,
    /// Upper bound on offsets bytes (variable-length attributes).
    pub offsets_bytes: u64,
    /// Upper bound on validity bytes (nullable attributes).
    pub validity_bytes: u64,
}

/// Upper-bound byte counts for a whole read.
#[derive(Debug, Clone, Default)]
pub struct ReadEstimate {
    /// Per-attribute estimates, in request order.
    pub attributes: Vec<(String, SizeEstimate)>,
    /// Upper bound on coordinate bytes (sparse reads).
    pub coords_bytes: u64,
}

impl ReadEstimate {
    /// The estimate for `name`.
    pub fn attribute(&self, name: &str) -> Option<SizeEstimate> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, e)| *e)
    }
}
