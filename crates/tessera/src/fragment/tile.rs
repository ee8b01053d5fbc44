//! Per-tile metadata: cell ranges and bounding coordinates.
//!
//! A tile is a fixed-size grouping of cells and the unit of on-disk block
//! storage. Fragments keep cell data column-wise in global order; tile
//! metadata records how that order is cut into tiles and what coordinate
//! range each tile spans, which is what overlap pruning works from.

/// Metadata of one tile within a fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileMeta {
    /// Index of the tile's first cell within the fragment's cell order.
    pub first_cell: u64,
    /// Number of cells in the tile.
    pub cell_count: u64,
    /// Minimum bounding rectangle of the tile's cells, inclusive per
    /// dimension. For dense tiles this is the tile rectangle clipped to the
    /// written region; for sparse tiles the tight bounds of the actual
    /// coordinates.
    pub mbr: Vec<(i64, i64)>,
}

impl TileMeta {
    /// Creates tile metadata.
    pub fn new(first_cell: u64, cell_count: u64, mbr: Vec<(i64, i64)>) -> Self {
        Self {
            first_cell,
            cell_count,
            mbr,
        }
    }

    /// Returns true if the tile's bounds intersect the inclusive ranges.
    pub fn intersects(&self, ranges: &[(i64, i64)]) -> bool {
        self.mbr
            .iter()
            .zip(ranges)
            .all(|(a, b)| a.0 <= b.1 && b.0 <= a.1)
    }

    /// Exclusive end of the tile's cell range.
    pub fn end_cell(&self) -> u64 {
        self.first_cell + self.cell_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_intersects() {
        let tile = TileMeta::new(0, 4, vec![(1, 2), (1, 2)]);
        assert!(tile.intersects(&[(2, 5), (0, 1)]));
        assert!(!tile.intersects(&[(3, 5), (0, 1)]));
        assert_eq!(tile.end_cell(), 4);
    }
}
