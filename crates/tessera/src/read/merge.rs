//! Merge reader: folds overlapping fragments into one deduplicated,
//! overwrite-resolved cell stream.
//!
//! Fragments are processed oldest to newest. A later cell overwrites an
//! earlier one sharing the same dedup key — the logical position for dense
//! arrays, the coordinate tuple for sparse arrays. Sparse merging is a
//! fold by coordinate, not a spatial union: cells at distinct coordinates
//! are all retained, and a collision is resolved purely by timestamp,
//! never by memory arrival order.
//!
//! Variable-length output offsets are rebuilt sequentially from the final
//! cell sequence; value bytes are relocated contiguously in that order. A
//! winning cell's validity byte and value always originate from the same
//! fragment.

use crate::buffer::{OwnedBuffer, ValidityVector};
use crate::error::{ArrayError, Result};
use crate::index::FragmentDescriptor;
use crate::read::{
    AttributeReadBuffer, BufferCapacities, ReadEstimate, SizeEstimate, Subarray,
};
use crate::schema::order::{region_rank, GlobalIter, RegionIter};
use crate::schema::{ArraySchema, CellOrder, Layout};
use bitvec::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Destination rank of a dense cell within the result, per the requested
/// layout.
enum DestMap {
    Formula(CellOrder),
    /// Row-major rank to global-order rank, precomputed per read.
    Lookup(Vec<u64>),
}

impl DestMap {
    fn rank(&self, subarray: &[(i64, i64)], coords: &[i64]) -> u64 {
        match self {
            DestMap::Formula(order) => region_rank(subarray, coords, *order),
            DestMap::Lookup(map) => {
                map[region_rank(subarray, coords, CellOrder::RowMajor) as usize]
            }
        }
    }
}

/// A winning cell reference: fragment position in the overlap list plus
/// cell index within that fragment.
type CellRef = (u32, u64);

/// The merge engine for one read or consolidation pass.
///
/// Construction runs the fold; [`MergeReader::deliver`] then streams the
/// final cell sequence into capacity-bounded buffers, resumable at any
/// cell boundary.
pub struct MergeReader<'a> {
    schema: &'a ArraySchema,
    fragments: Vec<Arc<FragmentDescriptor>>,
    /// Winner per result slot, in final output order.
    slots: Vec<CellRef>,
    /// Dense only: which result slots any fragment wrote. Unwritten slots
    /// deliver fill values.
    written: Option<BitVec>,
    /// Sparse only: final coordinate tuples, flattened, in output order.
    coords: Option<Vec<i64>>,
    duplicates: u64,
    cells_scanned: u64,
}

impl<'a> MergeReader<'a> {
    /// Runs the merge fold over `fragments` (ascending timestamp order)
    /// restricted to `subarray`, producing cells in `layout`.
    ///
    /// # Errors
    ///
    /// Returns `ArrayError::Allocation` if a merge buffer cannot be
    /// allocated.
    pub fn new(
        schema: &'a ArraySchema,
        mut fragments: Vec<Arc<FragmentDescriptor>>,
        subarray: Subarray,
        layout: Layout,
    ) -> Result<Self> {
        // Point lookups consult each fragment's coordinate prefilter; a
        // definite miss drops the fragment before any tile is touched.
        if let Some(point) = unit_point(&subarray) {
            fragments.retain(|desc| desc.fragment.maybe_contains(&point));
        }
        match schema.kind {
            crate::schema::ArrayKind::Dense => {
                Self::merge_dense(schema, fragments, subarray, layout)
            }
            crate::schema::ArrayKind::Sparse => {
                Self::merge_sparse(schema, fragments, subarray, layout)
            }
        }
    }

    fn merge_dense(
        schema: &'a ArraySchema,
        fragments: Vec<Arc<FragmentDescriptor>>,
        subarray: Subarray,
        layout: Layout,
    ) -> Result<Self> {
        let ncells = usize::try_from(subarray.cell_count())
            .map_err(|_| ArrayError::Allocation(usize::MAX))?;
        let dest = match layout {
            Layout::RowMajor | Layout::Unordered => DestMap::Formula(CellOrder::RowMajor),
            Layout::ColMajor => DestMap::Formula(CellOrder::ColMajor),
            Layout::GlobalOrder => {
                let mut map = vec![0u64; ncells];
                let mut iter = GlobalIter::new(
                    &schema.domain,
                    subarray.ranges(),
                    schema.tile_order,
                    schema.cell_order,
                );
                let mut rank = 0u64;
                while let Some((c, _)) = iter.advance() {
                    map[region_rank(subarray.ranges(), c, CellOrder::RowMajor) as usize] = rank;
                    rank += 1;
                }
                DestMap::Lookup(map)
            }
        };

        let mut slots = Vec::new();
        slots
            .try_reserve_exact(ncells)
            .map_err(|_| ArrayError::Allocation(ncells * std::mem::size_of::<CellRef>()))?;
        slots.resize(ncells, (0u32, 0u64));
        let mut written = bitvec![0; ncells];
        let mut duplicates = 0u64;
        let mut cells_scanned = 0u64;

        for (fi, desc) in fragments.iter().enumerate() {
            let frag = &desc.fragment;
            for tile in &frag.tiles {
                if !tile.intersects(subarray.ranges()) {
                    continue;
                }
                if frag.subarray.is_some() {
                    // Contiguous dense fragment: the tile's cells sit in
                    // cell order over its MBR rectangle.
                    let mut iter = RegionIter::new(&tile.mbr, schema.cell_order);
                    let mut j = 0u64;
                    while let Some(c) = iter.advance() {
                        if subarray.contains(c) {
                            cells_scanned += 1;
                            let at = dest.rank(subarray.ranges(), c) as usize;
                            if written[at] {
                                duplicates += 1;
                            }
                            slots[at] = (fi as u32, tile.first_cell + j);
                            written.set(at, true);
                        }
                        j += 1;
                    }
                } else {
                    // Scattered dense fragment: explicit coordinates.
                    for j in 0..tile.cell_count {
                        let cell = tile.first_cell + j;
                        let c = frag.cell_coords(cell);
                        if subarray.contains(c) {
                            cells_scanned += 1;
                            let at = dest.rank(subarray.ranges(), c) as usize;
                            if written[at] {
                                duplicates += 1;
                            }
                            slots[at] = (fi as u32, cell);
                            written.set(at, true);
                        }
                    }
                }
            }
        }

        Ok(Self {
            schema,
            fragments,
            slots,
            written: Some(written),
            coords: None,
            duplicates,
            cells_scanned,
        })
    }

    fn merge_sparse(
        schema: &'a ArraySchema,
        fragments: Vec<Arc<FragmentDescriptor>>,
        subarray: Subarray,
        layout: Layout,
    ) -> Result<Self> {
        // Coordinate-keyed accumulation, oldest to newest: each later
        // insertion overwrites any prior entry at the same coordinate, so
        // memory stays bounded by the distinct-coordinate count. The key
        // (tile id, intra-tile position) is unique per coordinate and
        // iterates in global order.
        let mut acc: BTreeMap<(u64, u64), CellRef> = BTreeMap::new();
        let mut duplicates = 0u64;
        let mut cells_scanned = 0u64;
        for (fi, desc) in fragments.iter().enumerate() {
            let frag = &desc.fragment;
            for tile in &frag.tiles {
                if !tile.intersects(subarray.ranges()) {
                    continue;
                }
                for j in 0..tile.cell_count {
                    let cell = tile.first_cell + j;
                    let c = frag.cell_coords(cell);
                    if subarray.contains(c) {
                        cells_scanned += 1;
                        let key = schema.global_key(c);
                        if acc.insert(key, (fi as u32, cell)).is_some() {
                            duplicates += 1;
                        }
                    }
                }
            }
        }

        // The accumulator iterates in global order; other layouts permute.
        let mut order: Vec<CellRef> = acc.into_values().collect();
        match layout {
            Layout::GlobalOrder | Layout::Unordered => {}
            Layout::RowMajor => {
                order.sort_by(|a, b| {
                    let ca = fragments[a.0 as usize].fragment.cell_coords(a.1);
                    let cb = fragments[b.0 as usize].fragment.cell_coords(b.1);
                    ca.cmp(cb)
                });
            }
            Layout::ColMajor => {
                order.sort_by(|a, b| {
                    let ca = fragments[a.0 as usize].fragment.cell_coords(a.1);
                    let cb = fragments[b.0 as usize].fragment.cell_coords(b.1);
                    ca.iter().rev().cmp(cb.iter().rev())
                });
            }
        }

        let ndim = schema.ndim();
        let mut coords = Vec::new();
        coords
            .try_reserve_exact(order.len() * ndim)
            .map_err(|_| ArrayError::Allocation(order.len() * ndim * 8))?;
        for (fi, cell) in &order {
            coords.extend_from_slice(fragments[*fi as usize].fragment.cell_coords(*cell));
        }

        Ok(Self {
            schema,
            fragments,
            slots: order,
            written: None,
            coords: Some(coords),
            duplicates,
            cells_scanned,
        })
    }

    /// Number of cells in the final merged result.
    pub fn cell_count(&self) -> u64 {
        self.slots.len() as u64
    }

    /// Number of exact-key collisions the fold resolved.
    pub fn duplicates(&self) -> u64 {
        self.duplicates
    }

    /// Number of fragment cells inspected across all inputs.
    pub fn cells_scanned(&self) -> u64 {
        self.cells_scanned
    }

    /// Final coordinate tuples, flattened (sparse merges only).
    pub fn coords_flat(&self) -> Option<&[i64]> {
        self.coords.as_deref()
    }

    fn is_written(&self, slot: usize) -> bool {
        match &self.written {
            Some(mask) => mask[slot],
            None => true,
        }
    }

    /// Byte length of the winning payload of `slot` for a variable-length
    /// attribute (0 for fill cells).
    fn var_len(&self, slot: usize, attr_idx: usize) -> u64 {
        if !self.is_written(slot) {
            return 0;
        }
        let (fi, cell) = self.slots[slot];
        let column = &self.fragments[fi as usize].fragment.columns[attr_idx];
        column.var_range(cell).1
    }

    /// Streams cells starting at `from` into buffers bounded by `attrs`
    /// capacities (and `coords_capacity` for sparse coordinates).
    ///
    /// Returns the delivered buffers plus `Some(next_cell)` when capacity
    /// ran out before the last cell. A cell is delivered into either every
    /// buffer or none.
    ///
    /// # Errors
    ///
    /// Returns `BufferTooSmall` when the very next cell cannot fit, naming
    /// the buffer and the byte count it requires.
    pub fn deliver(
        &self,
        attrs: &[(String, BufferCapacities)],
        coords_capacity: Option<u64>,
        from: u64,
    ) -> Result<(Vec<(String, AttributeReadBuffer)>, Option<Vec<i64>>, u64, Option<u64>)> {
        let attr_indices: Vec<usize> = attrs
            .iter()
            .map(|(name, _)| {
                self.schema.attribute_index(name).ok_or_else(|| {
                    ArrayError::SchemaMismatch(format!("unknown attribute '{}'", name))
                })
            })
            .collect::<Result<_>>()?;

        let mut outputs: Vec<AttributeReadBuffer> = attr_indices
            .iter()
            .map(|&idx| {
                let attr = &self.schema.attributes[idx];
                AttributeReadBuffer {
                    values: OwnedBuffer::new(),
                    offsets: attr.cell_size().is_none().then(Vec::new),
                    validity: attr.nullable.then(ValidityVector::new),
                }
            })
            .collect();
        let mut out_coords: Option<Vec<i64>> = coords_capacity.map(|_| Vec::new());
        let ndim = self.schema.ndim();
        let total = self.slots.len() as u64;

        let mut next = from;
        'cells: while next < total {
            let slot = next as usize;
            // Fit check first: a cell's value is never split across calls.
            for ((_, caps), (&attr_idx, out)) in
                attrs.iter().zip(attr_indices.iter().zip(&outputs))
            {
                let attr = &self.schema.attributes[attr_idx];
                let value_need = match attr.cell_size() {
                    Some(size) => size as u64,
                    None => self.var_len(slot, attr_idx),
                };
                if out.values.len() as u64 + value_need > caps.values {
                    if next == from {
                        return Err(ArrayError::BufferTooSmall {
                            attribute: attr.name.clone(),
                            required: value_need,
                            capacity: caps.values,
                        });
                    }
                    break 'cells;
                }
                if let Some(offsets) = &out.offsets {
                    if (offsets.len() as u64 + 1) * 8 > caps.offsets {
                        if next == from {
                            return Err(ArrayError::BufferTooSmall {
                                attribute: attr.name.clone(),
                                required: 8,
                                capacity: caps.offsets,
                            });
                        }
                        break 'cells;
                    }
                }
                if let Some(validity) = &out.validity {
                    if validity.len() as u64 + 1 > caps.validity {
                        if next == from {
                            return Err(ArrayError::BufferTooSmall {
                                attribute: attr.name.clone(),
                                required: 1,
                                capacity: caps.validity,
                            });
                        }
                        break 'cells;
                    }
                }
            }
            if let (Some(cap), Some(out)) = (coords_capacity, &out_coords) {
                let need = (ndim * 8) as u64;
                if (out.len() * 8) as u64 + need > cap {
                    if next == from {
                        return Err(ArrayError::BufferTooSmall {
                            attribute: "__coords".to_string(),
                            required: need,
                            capacity: cap,
                        });
                    }
                    break 'cells;
                }
            }

            // Copy the whole cell.
            for (&attr_idx, out) in attr_indices.iter().zip(outputs.iter_mut()) {
                self.copy_cell(slot, attr_idx, out)?;
            }
            if let Some(out) = &mut out_coords {
                let start = slot * ndim;
                out.extend_from_slice(&self.coords.as_ref().unwrap()[start..start + ndim]);
            }
            next += 1;
        }

        let named: Vec<(String, AttributeReadBuffer)> = attrs
            .iter()
            .map(|(name, _)| name.clone())
            .zip(outputs)
            .collect();
        let cells = next - from;
        let more = (next < total).then_some(next);
        Ok((named, out_coords, cells, more))
    }

    /// Appends the winning value, offsets and validity of `slot` for one
    /// attribute.
    fn copy_cell(
        &self,
        slot: usize,
        attr_idx: usize,
        out: &mut AttributeReadBuffer,
    ) -> Result<()> {
        let attr = &self.schema.attributes[attr_idx];
        if let Some(offsets) = &mut out.offsets {
            offsets.push(out.values.len() as u64);
        }
        if self.is_written(slot) {
            let (fi, cell) = self.slots[slot];
            let column = &self.fragments[fi as usize].fragment.columns[attr_idx];
            match attr.cell_size() {
                Some(size) => {
                    let start = cell as usize * size;
                    out.values
                        .extend_from_slice(&column.values[start..start + size])?;
                }
                None => {
                    let (start, len) = column.var_range(cell);
                    out.values.extend_from_slice(
                        &column.values[start as usize..(start + len) as usize],
                    )?;
                }
            }
            if let Some(validity) = &mut out.validity {
                let valid = column
                    .validity
                    .as_ref()
                    .map(|v| v[cell as usize] != 0)
                    .unwrap_or(true);
                validity.push(valid)?;
            }
        } else {
            // Fill value for a dense cell no fragment has written.
            if let Some(n) = attr.cell_val_num.fixed() {
                let mut fill = Vec::with_capacity(attr.datatype.size() * n as usize);
                for _ in 0..n {
                    attr.datatype.push_fill_value(&mut fill);
                }
                out.values.extend_from_slice(&fill)?;
            }
            if let Some(validity) = &mut out.validity {
                validity.push(false)?;
            }
        }
        Ok(())
    }

    /// Materializes one whole attribute column of the merged result, for
    /// feeding the consolidated fragment writer.
    pub fn column(&self, attr_idx: usize) -> Result<AttributeReadBuffer> {
        let attr = &self.schema.attributes[attr_idx];
        let mut out = AttributeReadBuffer {
            values: OwnedBuffer::new(),
            offsets: attr.cell_size().is_none().then(Vec::new),
            validity: attr.nullable.then(ValidityVector::new),
        };
        for slot in 0..self.slots.len() {
            self.copy_cell(slot, attr_idx, &mut out)?;
        }
        Ok(out)
    }
}

/// Computes per-attribute upper-bound byte counts for a read, ahead of the
/// main merge.
///
/// Bounds sum each overlapping fragment's intersecting cells without
/// deduplication, so the true result never exceeds them.
pub fn estimate(
    schema: &ArraySchema,
    fragments: &[Arc<FragmentDescriptor>],
    subarray: &Subarray,
    attrs: &[String],
) -> Result<ReadEstimate> {
    let attr_indices: Vec<usize> = attrs
        .iter()
        .map(|name| {
            schema
                .attribute_index(name)
                .ok_or_else(|| ArrayError::SchemaMismatch(format!("unknown attribute '{}'", name)))
        })
        .collect::<Result<_>>()?;

    // Upper bound on result cells: the full subarray for dense arrays, the
    // non-deduplicated intersecting-cell sum for sparse arrays.
    let mut cells_ub = 0u64;
    let mut var_bytes = vec![0u64; schema.attributes.len()];
    for desc in fragments {
        let frag = &desc.fragment;
        for tile in &frag.tiles {
            if !tile.intersects(subarray.ranges()) {
                continue;
            }
            if frag.subarray.is_some() {
                let mut iter = RegionIter::new(&tile.mbr, schema.cell_order);
                let mut j = 0u64;
                while let Some(c) = iter.advance() {
                    if subarray.contains(c) {
                        cells_ub += 1;
                        add_var_bytes(schema, frag, tile.first_cell + j, &mut var_bytes);
                    }
                    j += 1;
                }
            } else {
                for j in 0..tile.cell_count {
                    let cell = tile.first_cell + j;
                    if subarray.contains(frag.cell_coords(cell)) {
                        cells_ub += 1;
                        add_var_bytes(schema, frag, cell, &mut var_bytes);
                    }
                }
            }
        }
    }
    if schema.kind == crate::schema::ArrayKind::Dense {
        cells_ub = subarray.cell_count();
    }

    let mut out = ReadEstimate {
        attributes: Vec::with_capacity(attrs.len()),
        coords_bytes: 0,
    };
    for (name, &idx) in attrs.iter().zip(&attr_indices) {
        let attr = &schema.attributes[idx];
        let estimate = match attr.cell_size() {
            Some(size) => SizeEstimate {
                values_bytes: cells_ub * size as u64,
                offsets_bytes: 0,
                validity_bytes: if attr.nullable { cells_ub } else { 0 },
            },
            None => SizeEstimate {
                values_bytes: var_bytes[idx],
                offsets_bytes: cells_ub * 8,
                validity_bytes: if attr.nullable { cells_ub } else { 0 },
            },
        };
        out.attributes.push((name.clone(), estimate));
    }
    if schema.kind == crate::schema::ArrayKind::Sparse {
        out.coords_bytes = cells_ub * (schema.ndim() * 8) as u64;
    }
    Ok(out)
}

/// The single cell a subarray addresses, if it is degenerate.
fn unit_point(subarray: &Subarray) -> Option<Vec<i64>> {
    subarray
        .ranges()
        .iter()
        .map(|(lo, hi)| (lo == hi).then_some(*lo))
        .collect()
}

fn add_var_bytes(schema: &ArraySchema, frag: &crate::fragment::Fragment, cell: u64, out: &mut [u64]) {
    for (idx, attr) in schema.attributes.iter().enumerate() {
        if attr.cell_size().is_none() {
            out[idx] += frag.columns[idx].var_range(cell).1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::writer::{FragmentWriter, WriteBuffer, WriteRequest};
    use crate::fragment::TimestampRange;
    use crate::schema::{ArrayKind, Attribute, Datatype, Dimension, Domain};

    fn dense_schema() -> ArraySchema {
        let domain = Domain::new(vec![
            Dimension::new("rows", (1, 4), 2).unwrap(),
            Dimension::new("cols", (1, 4), 2).unwrap(),
        ])
        .unwrap();
        ArraySchema::new(
            ArrayKind::Dense,
            domain,
            vec![Attribute::new("a", Datatype::Int32)],
        )
        .unwrap()
    }

    fn sparse_schema() -> ArraySchema {
        let domain = Domain::new(vec![
            Dimension::new("rows", (1, 4), 2).unwrap(),
            Dimension::new("cols", (1, 4), 2).unwrap(),
        ])
        .unwrap();
        ArraySchema::new(
            ArrayKind::Sparse,
            domain,
            vec![Attribute::var("s", Datatype::StringAscii)],
        )
        .unwrap()
    }

    fn i32_bytes(values: &[i32]) -> OwnedBuffer {
        let mut buf = OwnedBuffer::new();
        for v in values {
            buf.extend_from_slice(&v.to_le_bytes()).unwrap();
        }
        buf
    }

    fn i32_cells(buffer: &AttributeReadBuffer) -> Vec<i32> {
        buffer
            .values
            .as_slice()
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes(c.try_into().unwrap()))
            .collect()
    }

    fn descriptor(
        schema: &ArraySchema,
        layout: Layout,
        request: WriteRequest,
        ts: u64,
    ) -> Arc<FragmentDescriptor> {
        let frag = FragmentWriter::new(schema)
            .build(layout, request, TimestampRange::point(ts))
            .unwrap();
        Arc::new(FragmentDescriptor::new(frag, 0))
    }

    fn big_caps() -> BufferCapacities {
        BufferCapacities {
            values: u64::MAX,
            offsets: u64::MAX,
            validity: u64::MAX,
        }
    }

    #[test]
    fn test_dense_later_fragment_overwrites() {
        let schema = dense_schema();
        let base: Vec<i32> = (0..16).collect();
        let f1 = descriptor(
            &schema,
            Layout::RowMajor,
            WriteRequest::new().attribute("a", WriteBuffer::fixed(i32_bytes(&base))),
            1,
        );
        // Overwrite the 2x2 corner (rows 1-2, cols 1-2) with 100..104.
        let f2 = descriptor(
            &schema,
            Layout::RowMajor,
            WriteRequest::new()
                .attribute("a", WriteBuffer::fixed(i32_bytes(&[100, 101, 102, 103])))
                .subarray(vec![(1, 2), (1, 2)]),
            2,
        );

        let reader = MergeReader::new(
            &schema,
            vec![f1, f2],
            Subarray::new(vec![(1, 4), (1, 4)]),
            Layout::RowMajor,
        )
        .unwrap();
        assert_eq!(reader.cell_count(), 16);
        assert_eq!(reader.duplicates(), 4);
        let (attrs, _, cells, more) = reader
            .deliver(&[("a".to_string(), big_caps())], None, 0)
            .unwrap();
        assert_eq!(cells, 16);
        assert!(more.is_none());
        let vals = i32_cells(&attrs[0].1);
        assert_eq!(
            vals,
            vec![100, 101, 2, 3, 102, 103, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15]
        );
    }

    #[test]
    fn test_dense_fill_values_for_unwritten_cells() {
        let schema = dense_schema();
        // Only the corner cell (1,1) is ever written.
        let f1 = descriptor(
            &schema,
            Layout::RowMajor,
            WriteRequest::new()
                .attribute("a", WriteBuffer::fixed(i32_bytes(&[42])))
                .subarray(vec![(1, 1), (1, 1)]),
            1,
        );
        let reader = MergeReader::new(
            &schema,
            vec![f1],
            Subarray::new(vec![(1, 2), (1, 2)]),
            Layout::RowMajor,
        )
        .unwrap();
        let (attrs, _, cells, _) = reader
            .deliver(&[("a".to_string(), big_caps())], None, 0)
            .unwrap();
        assert_eq!(cells, 4);
        assert_eq!(i32_cells(&attrs[0].1), vec![42, 0, 0, 0]);
    }

    #[test]
    fn test_sparse_fold_keeps_distinct_resolves_collisions() {
        let schema = sparse_schema();
        let mut v1 = OwnedBuffer::new();
        v1.extend_from_slice(b"oldaloneold2").unwrap();
        let f1 = descriptor(
            &schema,
            Layout::Unordered,
            WriteRequest::new()
                .attribute("s", WriteBuffer::var(v1, vec![0, 3, 8]))
                .coords(vec![1, 1, 2, 3, 4, 4]),
            1,
        );
        let mut v2 = OwnedBuffer::new();
        v2.extend_from_slice(b"newfresh").unwrap();
        let f2 = descriptor(
            &schema,
            Layout::Unordered,
            WriteRequest::new()
                .attribute("s", WriteBuffer::var(v2, vec![0, 3]))
                .coords(vec![1, 1, 3, 2]),
            2,
        );

        let reader = MergeReader::new(
            &schema,
            vec![f1, f2],
            Subarray::new(vec![(1, 4), (1, 4)]),
            Layout::RowMajor,
        )
        .unwrap();
        // 4 distinct coordinates out of 5 input cells.
        assert_eq!(reader.cell_count(), 4);
        assert_eq!(reader.duplicates(), 1);

        let (attrs, coords, cells, _) = reader
            .deliver(&[("s".to_string(), big_caps())], Some(u64::MAX), 0)
            .unwrap();
        assert_eq!(cells, 4);
        assert_eq!(
            coords.as_deref(),
            Some(&[1i64, 1, 2, 3, 3, 2, 4, 4][..])
        );
        let buffer = &attrs[0].1;
        let offsets = buffer.offsets.as_ref().unwrap();
        assert_eq!(offsets, &[0, 3, 8, 13]);
        assert_eq!(buffer.values.as_slice(), b"newalonefreshold2");
    }

    #[test]
    fn test_collision_resolved_by_timestamp_not_input_position() {
        let schema = sparse_schema();
        let mut newer = OwnedBuffer::new();
        newer.extend_from_slice(b"win").unwrap();
        let newer = descriptor(
            &schema,
            Layout::Unordered,
            WriteRequest::new()
                .attribute("s", WriteBuffer::var(newer, vec![0]))
                .coords(vec![2, 2]),
            7,
        );
        let mut older = OwnedBuffer::new();
        older.extend_from_slice(b"lose").unwrap();
        let older = descriptor(
            &schema,
            Layout::Unordered,
            WriteRequest::new()
                .attribute("s", WriteBuffer::var(older, vec![0]))
                .coords(vec![2, 2]),
            3,
        );

        // Ascending timestamp order regardless of construction order.
        let reader = MergeReader::new(
            &schema,
            vec![older, newer],
            Subarray::new(vec![(1, 4), (1, 4)]),
            Layout::GlobalOrder,
        )
        .unwrap();
        let (attrs, _, _, _) = reader
            .deliver(&[("s".to_string(), big_caps())], None, 0)
            .unwrap();
        assert_eq!(attrs[0].1.values.as_slice(), b"win");
    }

    #[test]
    fn test_chunked_delivery_resumes_after_last_whole_cell() {
        let schema = dense_schema();
        let base: Vec<i32> = (0..16).collect();
        let f1 = descriptor(
            &schema,
            Layout::RowMajor,
            WriteRequest::new().attribute("a", WriteBuffer::fixed(i32_bytes(&base))),
            1,
        );
        let reader = MergeReader::new(
            &schema,
            vec![f1],
            Subarray::new(vec![(1, 4), (1, 4)]),
            Layout::RowMajor,
        )
        .unwrap();

        // Room for 6 cells per call.
        let caps = BufferCapacities::values_only(24);
        let mut delivered = Vec::new();
        let mut from = 0u64;
        loop {
            let (attrs, _, cells, more) = reader
                .deliver(&[("a".to_string(), caps)], None, from)
                .unwrap();
            assert!(cells <= 6);
            delivered.extend(i32_cells(&attrs[0].1));
            match more {
                Some(next) => from = next,
                None => break,
            }
        }
        assert_eq!(delivered, base);
    }

    #[test]
    fn test_buffer_too_small_for_single_cell() {
        let schema = dense_schema();
        let f1 = descriptor(
            &schema,
            Layout::RowMajor,
            WriteRequest::new().attribute("a", WriteBuffer::fixed(i32_bytes(&[1, 2, 3, 4])))
                .subarray(vec![(1, 2), (1, 2)]),
            1,
        );
        let reader = MergeReader::new(
            &schema,
            vec![f1],
            Subarray::new(vec![(1, 2), (1, 2)]),
            Layout::RowMajor,
        )
        .unwrap();
        let err = reader
            .deliver(&[("a".to_string(), BufferCapacities::values_only(3))], None, 0)
            .unwrap_err();
        assert!(matches!(
            err,
            ArrayError::BufferTooSmall { required: 4, capacity: 3, .. }
        ));
    }

    #[test]
    fn test_point_lookup_prunes_missing_fragments() {
        let schema = sparse_schema();
        let mut v1 = OwnedBuffer::new();
        v1.extend_from_slice(b"hit").unwrap();
        let f1 = descriptor(
            &schema,
            Layout::Unordered,
            WriteRequest::new()
                .attribute("s", WriteBuffer::var(v1, vec![0]))
                .coords(vec![2, 2]),
            1,
        );
        let mut v2 = OwnedBuffer::new();
        v2.extend_from_slice(b"other").unwrap();
        let f2 = descriptor(
            &schema,
            Layout::Unordered,
            WriteRequest::new()
                .attribute("s", WriteBuffer::var(v2, vec![0]))
                .coords(vec![2, 1]),
            2,
        );

        let reader = MergeReader::new(
            &schema,
            vec![f1, f2],
            Subarray::new(vec![(2, 2), (2, 2)]),
            Layout::GlobalOrder,
        )
        .unwrap();
        assert_eq!(reader.cell_count(), 1);
        let (attrs, _, _, _) = reader
            .deliver(&[("s".to_string(), big_caps())], None, 0)
            .unwrap();
        assert_eq!(attrs[0].1.values.as_slice(), b"hit");
    }

    #[test]
    fn test_estimate_upper_bounds_actual_result() {
        let schema = sparse_schema();
        let mut v1 = OwnedBuffer::new();
        v1.extend_from_slice(b"aabbbb").unwrap();
        let f1 = descriptor(
            &schema,
            Layout::Unordered,
            WriteRequest::new()
                .attribute("s", WriteBuffer::var(v1, vec![0, 2]))
                .coords(vec![1, 1, 2, 2]),
            1,
        );
        let mut v2 = OwnedBuffer::new();
        v2.extend_from_slice(b"cc").unwrap();
        let f2 = descriptor(
            &schema,
            Layout::Unordered,
            WriteRequest::new()
                .attribute("s", WriteBuffer::var(v2, vec![0]))
                .coords(vec![1, 1]),
            2,
        );

        let subarray = Subarray::new(vec![(1, 4), (1, 4)]);
        let est = estimate(&schema, &[f1.clone(), f2.clone()], &subarray, &["s".to_string()])
            .unwrap();
        let e = est.attribute("s").unwrap();
        // 3 input cells, 8 var bytes in total; the merged result (2 cells,
        // 6 bytes) must fit inside the bound.
        assert_eq!(e.offsets_bytes, 24);
        assert_eq!(e.values_bytes, 8);
        assert_eq!(est.coords_bytes, 48);

        let reader =
            MergeReader::new(&schema, vec![f1, f2], subarray, Layout::GlobalOrder).unwrap();
        let (attrs, _, cells, _) = reader
            .deliver(&[("s".to_string(), big_caps())], None, 0)
            .unwrap();
        assert_eq!(cells, 2);
        assert!(attrs[0].1.values.len() as u64 <= e.values_bytes);
    }
}
