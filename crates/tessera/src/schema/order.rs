//! Cell traversal over N-dimensional regions.
//!
//! Two traversals matter to the engine: plain row-/column-major order over
//! a rectangular region, and **global order** — the array's canonical
//! tile-then-cell traversal, which visits the tiles of the schema grid in
//! tile order and the cells of each tile-region intersection in cell order.

use crate::schema::{CellOrder, Domain};

/// Streaming iterator over the cells of an inclusive rectangular region in
/// row- or column-major order.
///
/// Yields coordinate tuples by reference; callers copy what they keep.
#[derive(Debug)]
pub struct RegionIter {
    region: Vec<(i64, i64)>,
    order: CellOrder,
    current: Vec<i64>,
    started: bool,
    done: bool,
}

impl RegionIter {
    /// Creates an iterator over `region` in the given order.
    pub fn new(region: &[(i64, i64)], order: CellOrder) -> Self {
        let done = region.iter().any(|(lo, hi)| lo > hi);
        Self {
            region: region.to_vec(),
            order,
            current: region.iter().map(|(lo, _)| *lo).collect(),
            started: false,
            done,
        }
    }

    /// Advances to the next cell, returning its coordinates.
    pub fn advance(&mut self) -> Option<&[i64]> {
        if self.done {
            return None;
        }
        if !self.started {
            self.started = true;
            return Some(&self.current);
        }
        // Odometer increment: the fastest-varying dimension depends on order.
        let ndim = self.region.len();
        let dims: Vec<usize> = match self.order {
            CellOrder::RowMajor => (0..ndim).rev().collect(),
            CellOrder::ColMajor => (0..ndim).collect(),
        };
        for d in dims {
            if self.current[d] < self.region[d].1 {
                self.current[d] += 1;
                return Some(&self.current);
            }
            self.current[d] = self.region[d].0;
        }
        self.done = true;
        None
    }

    /// Total number of cells in the region.
    pub fn cell_count(region: &[(i64, i64)]) -> u64 {
        region
            .iter()
            .map(|(lo, hi)| if lo > hi { 0 } else { (hi - lo) as u64 + 1 })
            .product()
    }
}

/// Rank of `coords` within `region` under row- or column-major order.
pub fn region_rank(region: &[(i64, i64)], coords: &[i64], order: CellOrder) -> u64 {
    let mut rank = 0u64;
    match order {
        CellOrder::RowMajor => {
            for ((lo, hi), c) in region.iter().zip(coords) {
                rank = rank * ((hi - lo) as u64 + 1) + (c - lo) as u64;
            }
        }
        CellOrder::ColMajor => {
            for ((lo, hi), c) in region.iter().zip(coords).rev() {
                rank = rank * ((hi - lo) as u64 + 1) + (c - lo) as u64;
            }
        }
    }
    rank
}

/// Streaming iterator over the cells of a region in global order.
///
/// Visits the schema-grid tiles intersecting the region in tile order; the
/// cells of each tile-region intersection are visited in cell order. Also
/// reports the linearized tile id of each cell, which is where fragment
/// tiling cuts its boundaries.
#[derive(Debug)]
pub struct GlobalIter {
    domain_ranges: Vec<(i64, i64)>,
    tile_extents: Vec<i64>,
    region: Vec<(i64, i64)>,
    tile_counts: Vec<u64>,
    tile_order: CellOrder,
    cell_order: CellOrder,
    tile_iter: RegionIter,
    cell_iter: Option<(u64, RegionIter)>,
}

impl GlobalIter {
    /// Creates a global-order iterator over `region` under `domain`'s grid.
    pub fn new(
        domain: &Domain,
        region: &[(i64, i64)],
        tile_order: CellOrder,
        cell_order: CellOrder,
    ) -> Self {
        // Iterate tile multi-indexes covering the region as a region itself.
        let tile_region: Vec<(i64, i64)> = region
            .iter()
            .enumerate()
            .map(|(d, (lo, hi))| {
                let dim = domain.dim(d);
                (dim.tile_of(*lo) as i64, dim.tile_of(*hi) as i64)
            })
            .collect();
        Self {
            domain_ranges: domain.dimensions().iter().map(|d| d.domain).collect(),
            tile_extents: domain.dimensions().iter().map(|d| d.tile_extent).collect(),
            region: region.to_vec(),
            tile_counts: domain.dimensions().iter().map(|d| d.tile_count()).collect(),
            tile_order,
            cell_order,
            tile_iter: RegionIter::new(&tile_region, tile_order),
            cell_iter: None,
        }
    }

    /// Advances to the next cell, returning (coordinates, tile id).
    pub fn advance(&mut self) -> Option<(&[i64], u64)> {
        loop {
            if self.cell_iter.is_none() {
                let tile_idx = self.tile_iter.advance()?.to_vec();
                let tile_id = {
                    let idx: Vec<u64> = tile_idx.iter().map(|t| *t as u64).collect();
                    linearize(&idx, &self.tile_counts, self.tile_order)
                };
                // Tile rectangle clipped to the domain, then to the region.
                let clipped: Vec<(i64, i64)> = tile_idx
                    .iter()
                    .enumerate()
                    .map(|(d, t)| {
                        let lo = self.domain_ranges[d].0 + t * self.tile_extents[d];
                        let hi = (lo + self.tile_extents[d] - 1).min(self.domain_ranges[d].1);
                        (lo.max(self.region[d].0), hi.min(self.region[d].1))
                    })
                    .collect();
                if clipped.iter().any(|(lo, hi)| lo > hi) {
                    continue;
                }
                self.cell_iter = Some((tile_id, RegionIter::new(&clipped, self.cell_order)));
            }
            // Borrow dance: pull the next cell out of the current tile or
            // drop the exhausted iterator and move to the next tile.
            let exhausted = {
                let (_, iter) = self.cell_iter.as_mut().unwrap();
                iter.advance().is_none()
            };
            if exhausted {
                self.cell_iter = None;
                continue;
            }
            let (tile_id, iter) = self.cell_iter.as_ref().unwrap();
            return Some((&iter.current, *tile_id));
        }
    }
}

fn linearize(index: &[u64], spans: &[u64], order: CellOrder) -> u64 {
    let mut id = 0u64;
    match order {
        CellOrder::RowMajor => {
            for (i, s) in index.iter().zip(spans) {
                id = id * s + i;
            }
        }
        CellOrder::ColMajor => {
            for (i, s) in index.iter().zip(spans).rev() {
                id = id * s + i;
            }
        }
    }
    id
}
