//! Fragments: immutable, timestamped units of write output.
//!
//! A fragment is sealed by the [`FragmentWriter`] at a single logical
//! timestamp (or, for a consolidated fragment, a timestamp span) and never
//! mutated afterwards. It holds its tight bounding coordinate range, the
//! per-attribute cell data in global order, per-tile metadata, and, for
//! sparse data, the explicit coordinate tuples.

pub mod file;
pub mod tile;
pub mod writer;

pub use tile::TileMeta;
pub use writer::{FragmentWriter, WriteBuffer, WriteRequest};

use crate::schema::ArraySchema;
use xxhash_rust::xxh64::xxh64;

/// Logical timestamp of a fragment. Strictly increasing per array.
pub type Timestamp = u64;

/// Identifier of a fragment: the upper bound of its timestamp range.
///
/// Unique among live fragments, because a consolidated fragment replaces
/// every constituent sharing its upper bound.
pub type FragmentId = u64;

/// The logical time a fragment covers.
///
/// A plain write covers the point `[t, t]`. A consolidated fragment covers
/// the span `[min_ts, max_ts]` of the run it replaced, so ordering against
/// fragments created between those timestamps stays decidable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimestampRange {
    /// Lower bound (inclusive).
    pub lo: Timestamp,
    /// Upper bound (inclusive). Overwrite priority is decided by this bound.
    pub hi: Timestamp,
}

impl TimestampRange {
    /// A point range for a plain write at `t`.
    pub fn point(t: Timestamp) -> Self {
        Self { lo: t, hi: t }
    }

    /// A span covering `[lo, hi]`.
    pub fn span(lo: Timestamp, hi: Timestamp) -> Self {
        debug_assert!(lo <= hi);
        Self { lo, hi }
    }

    /// Returns true if this range covers a single timestamp.
    pub fn is_point(self) -> bool {
        self.lo == self.hi
    }

    /// Returns true if `t` lies inside the range.
    pub fn contains(self, t: Timestamp) -> bool {
        t >= self.lo && t <= self.hi
    }

    /// Returns true if the two ranges share any timestamp.
    pub fn overlaps(self, other: TimestampRange) -> bool {
        self.lo <= other.hi && other.lo <= self.hi
    }
}

/// The tight bounding coordinate range of a fragment's actual data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonEmptyDomain {
    ranges: Vec<(i64, i64)>,
}

impl NonEmptyDomain {
    /// Creates a non-empty domain from inclusive per-dimension ranges.
    pub fn new(ranges: Vec<(i64, i64)>) -> Self {
        Self { ranges }
    }

    /// Creates a degenerate domain containing exactly `coords`.
    pub fn from_point(coords: &[i64]) -> Self {
        Self {
            ranges: coords.iter().map(|c| (*c, *c)).collect(),
        }
    }

    /// Number of dimensions.
    pub fn ndim(&self) -> usize {
        self.ranges.len()
    }

    /// Inclusive per-dimension ranges.
    pub fn ranges(&self) -> &[(i64, i64)] {
        &self.ranges
    }

    /// Expands the domain to cover `coords`.
    pub fn expand(&mut self, coords: &[i64]) {
        for (r, c) in self.ranges.iter_mut().zip(coords) {
            r.0 = r.0.min(*c);
            r.1 = r.1.max(*c);
        }
    }

    /// Expands the domain to cover `other`.
    pub fn expand_domain(&mut self, other: &NonEmptyDomain) {
        for (r, o) in self.ranges.iter_mut().zip(&other.ranges) {
            r.0 = r.0.min(o.0);
            r.1 = r.1.max(o.1);
        }
    }

    /// Returns true if the domain intersects the given inclusive ranges.
    pub fn intersects(&self, ranges: &[(i64, i64)]) -> bool {
        self.ranges
            .iter()
            .zip(ranges)
            .all(|(a, b)| a.0 <= b.1 && b.0 <= a.1)
    }

    /// Returns true if `coords` lies inside the domain.
    pub fn contains(&self, coords: &[i64]) -> bool {
        self.ranges
            .iter()
            .zip(coords)
            .all(|(r, c)| *c >= r.0 && *c <= r.1)
    }

    /// Total cell count of the bounding box.
    pub fn cell_count(&self) -> u64 {
        self.ranges
            .iter()
            .map(|(lo, hi)| (hi - lo) as u64 + 1)
            .product()
    }
}

/// Number of seeded hashes used by the coordinate prefilter.
const COORD_FILTER_HASH_COUNT: u8 = 3;

/// A Bloom-style prefilter over a sparse fragment's coordinate tuples.
///
/// Uses xxh64 with k seeded hashes: `h_i(x) = xxh64(x, seed=i) % size_bits`.
/// Pruning only: false positives are fine, false negatives never happen.
#[derive(Debug, Clone)]
pub struct CoordFilter {
    bits: Vec<u64>,
    hash_count: u8,
}

impl CoordFilter {
    /// Creates a filter sized for the expected number of coordinates.
    ///
    /// Roughly 10 bits per item for ~1% false positives with k=3.
    pub fn new(expected_items: usize) -> Self {
        let num_bits = (expected_items * 10).max(64);
        let num_words = num_bits.div_ceil(64);
        Self {
            bits: vec![0u64; num_words],
            hash_count: COORD_FILTER_HASH_COUNT,
        }
    }

    /// Creates a filter from raw bits.
    pub fn from_bits(bits: Vec<u64>, hash_count: u8) -> Self {
        Self { bits, hash_count }
    }

    fn key_bytes(coords: &[i64]) -> Vec<u8> {
        let mut key = Vec::with_capacity(coords.len() * 8);
        for c in coords {
            key.extend_from_slice(&c.to_le_bytes());
        }
        key
    }

    /// Adds a coordinate tuple to the filter.
    pub fn insert(&mut self, coords: &[i64]) {
        let num_bits = self.bits.len() as u64 * 64;
        let key = Self::key_bytes(coords);
        for seed in 0..self.hash_count {
            let bit_idx = xxh64(&key, seed as u64) % num_bits;
            self.bits[(bit_idx / 64) as usize] |= 1u64 << (bit_idx % 64);
        }
    }

    /// Returns true if the tuple might be present; false means definitely
    /// absent.
    pub fn maybe_contains(&self, coords: &[i64]) -> bool {
        let num_bits = self.bits.len() as u64 * 64;
        let key = Self::key_bytes(coords);
        for seed in 0..self.hash_count {
            let bit_idx = xxh64(&key, seed as u64) % num_bits;
            if self.bits[(bit_idx / 64) as usize] & (1u64 << (bit_idx % 64)) == 0 {
                return false;
            }
        }
        true
    }

    /// Raw filter words.
    pub fn bits(&self) -> &[u64] {
        &self.bits
    }

    /// Number of seeded hashes.
    pub fn hash_count(&self) -> u8 {
        self.hash_count
    }
}

/// Cell data of one attribute, in the fragment's global cell order.
#[derive(Debug)]
pub struct AttributeColumn {
    /// Raw value bytes. Fixed-size attributes pack `cell_val_num` values
    /// per cell with no padding; variable-length attributes concatenate
    /// cell payloads addressed through `offsets`.
    pub values: Vec<u8>,
    /// Per-cell start offsets into `values` (variable-length only).
    pub offsets: Option<Vec<u64>>,
    /// Validity bytemap, one byte per cell (nullable only).
    pub validity: Option<Vec<u8>>,
}

impl AttributeColumn {
    /// Byte range of cell `cell` within `values` for variable-length data.
    pub fn var_range(&self, cell: u64) -> (u64, u64) {
        let offsets = self.offsets.as_ref().expect("fixed-size attribute");
        let start = offsets[cell as usize];
        let end = offsets
            .get(cell as usize + 1)
            .copied()
            .unwrap_or(self.values.len() as u64);
        (start, end - start)
    }
}

/// An immutable, sealed unit of write output.
#[derive(Debug)]
pub struct Fragment {
    /// Logical time this fragment covers.
    pub timestamps: TimestampRange,
    /// Tight bounding coordinate range of the fragment's data.
    pub non_empty_domain: NonEmptyDomain,
    /// Total number of cells.
    pub cell_count: u64,
    /// Dense region this fragment fully covers, if it was a contiguous
    /// dense write. Scattered dense writes and sparse writes carry explicit
    /// coordinates instead.
    pub subarray: Option<Vec<(i64, i64)>>,
    /// Per-tile metadata in tile order.
    pub tiles: Vec<TileMeta>,
    /// Explicit coordinate tuples, flattened, in global cell order.
    pub coords: Option<Vec<i64>>,
    /// One column per schema attribute, in schema order.
    pub columns: Vec<AttributeColumn>,
    /// Coordinate prefilter for point-lookup pruning (explicit coords only).
    pub filter: Option<CoordFilter>,
}

impl Fragment {
    /// Coordinate tuple of cell `cell`, for fragments carrying explicit
    /// coordinates.
    pub fn cell_coords(&self, cell: u64) -> &[i64] {
        let coords = self.coords.as_ref().expect("implicit-position fragment");
        let ndim = self.non_empty_domain.ndim();
        let start = cell as usize * ndim;
        &coords[start..start + ndim]
    }

    /// Returns true if the fragment has explicit per-cell coordinates.
    pub fn has_coords(&self) -> bool {
        self.coords.is_some()
    }

    /// Returns true if the fragment might contain a cell at `coords`.
    ///
    /// Exact for implicit dense regions; filter-based (false positives
    /// possible) for explicit coordinates.
    pub fn maybe_contains(&self, coords: &[i64]) -> bool {
        if let Some(subarray) = &self.subarray {
            return coords
                .iter()
                .zip(subarray)
                .all(|(c, r)| *c >= r.0 && *c <= r.1);
        }
        if !self.non_empty_domain.contains(coords) {
            return false;
        }
        match &self.filter {
            Some(filter) => filter.maybe_contains(coords),
            None => true,
        }
    }

    /// On-disk name of this fragment's directory.
    pub fn name(&self) -> String {
        fragment_name(self.timestamps)
    }

    /// Validates structural consistency against a schema.
    ///
    /// # Errors
    ///
    /// Returns `ArrayError::FragmentCorrupt` on column/tile mismatches.
    pub fn check(&self, schema: &ArraySchema) -> crate::error::Result<()> {
        use crate::error::ArrayError;
        if self.columns.len() != schema.attributes.len() {
            return Err(ArrayError::FragmentCorrupt(format!(
                "{} columns for {} attributes",
                self.columns.len(),
                schema.attributes.len()
            )));
        }
        let tiled: u64 = self.tiles.iter().map(|t| t.cell_count).sum();
        if tiled != self.cell_count {
            return Err(ArrayError::FragmentCorrupt(format!(
                "tiles cover {} cells, fragment has {}",
                tiled, self.cell_count
            )));
        }
        Ok(())
    }
}

/// Builds the directory name for a fragment covering `timestamps`.
///
/// Format: `frag_{lo:016x}_{hi:016x}`.
pub fn fragment_name(timestamps: TimestampRange) -> String {
    format!("frag_{:016x}_{:016x}", timestamps.lo, timestamps.hi)
}

/// Parses a fragment directory name back into its timestamp range.
pub fn parse_fragment_name(name: &str) -> Option<TimestampRange> {
    let rest = name.strip_prefix("frag_")?;
    let mut parts = rest.split('_');
    let lo_hex = parts.next()?;
    let hi_hex = parts.next()?;
    if parts.next().is_some() || lo_hex.len() != 16 || hi_hex.len() != 16 {
        return None;
    }
    let lo = u64::from_str_radix(lo_hex, 16).ok()?;
    let hi = u64::from_str_radix(hi_hex, 16).ok()?;
    if lo > hi {
        return None;
    }
    Some(TimestampRange::span(lo, hi))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_range_overlap() {
        let a = TimestampRange::span(2, 5);
        assert!(a.overlaps(TimestampRange::point(5)));
        assert!(a.overlaps(TimestampRange::span(4, 9)));
        assert!(!a.overlaps(TimestampRange::point(6)));
        assert!(a.contains(3));
        assert!(!a.contains(1));
    }

    #[test]
    fn test_non_empty_domain_expand_and_intersect() {
        let mut ned = NonEmptyDomain::from_point(&[3, 7]);
        ned.expand(&[5, 2]);
        assert_eq!(ned.ranges(), &[(3, 5), (2, 7)]);
        assert!(ned.intersects(&[(5, 9), (1, 2)]));
        assert!(!ned.intersects(&[(6, 9), (1, 2)]));
        assert_eq!(ned.cell_count(), 18);
    }

    #[test]
    fn test_coord_filter_no_false_negatives() {
        let mut filter = CoordFilter::new(64);
        for i in 0..64i64 {
            filter.insert(&[i, -i]);
        }
        for i in 0..64i64 {
            assert!(filter.maybe_contains(&[i, -i]));
        }
    }

    #[test]
    fn test_fragment_name_roundtrip() {
        let ts = TimestampRange::span(3, 17);
        let name = fragment_name(ts);
        assert_eq!(parse_fragment_name(&name), Some(ts));
        assert_eq!(parse_fragment_name("frag_zz"), None);
        assert_eq!(parse_fragment_name("other"), None);
    }
}
