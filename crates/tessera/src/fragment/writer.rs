//! Fragment writer: turns input cell buffers plus a layout into one
//! sealed, immutable fragment.
//!
//! Unordered input is permuted into tile-traversal order before tiling, so
//! each tile's coordinate range is contiguous and the per-tile bounding
//! metadata is well-formed. The sort key is (global tile id, intra-tile
//! cell position) under the schema's configured orders.

use crate::buffer::{OwnedBuffer, ValidityVector};
use crate::error::{ArrayError, Result};
use crate::fragment::{
    AttributeColumn, CoordFilter, Fragment, NonEmptyDomain, TileMeta, TimestampRange,
};
use crate::schema::order::{region_rank, GlobalIter, RegionIter};
use crate::schema::{ArrayKind, ArraySchema, Layout};

/// Input cell data for one attribute.
#[derive(Debug, Default)]
pub struct WriteBuffer {
    /// Raw value bytes.
    pub values: OwnedBuffer,
    /// Per-cell start offsets into `values` (variable-length attributes).
    pub offsets: Option<Vec<u64>>,
    /// Validity bytemap (nullable attributes).
    pub validity: Option<ValidityVector>,
}

impl WriteBuffer {
    /// Creates a buffer for a fixed-size attribute.
    pub fn fixed(values: OwnedBuffer) -> Self {
        Self {
            values,
            offsets: None,
            validity: None,
        }
    }

    /// Creates a buffer for a variable-length attribute.
    pub fn var(values: OwnedBuffer, offsets: Vec<u64>) -> Self {
        Self {
            values,
            offsets: Some(offsets),
            validity: None,
        }
    }

    /// Attaches a validity bytemap.
    pub fn with_validity(mut self, validity: ValidityVector) -> Self {
        self.validity = Some(validity);
        self
    }

    /// Byte range of input cell `idx` for variable-length data.
    fn var_range(&self, idx: usize) -> (usize, usize) {
        let offsets = self.offsets.as_ref().expect("fixed-size buffer");
        let start = offsets[idx] as usize;
        let end = offsets
            .get(idx + 1)
            .map(|o| *o as usize)
            .unwrap_or(self.values.len());
        (start, end - start)
    }
}

/// One write call's worth of input: attribute buffers, optional explicit
/// coordinates, optional dense target region.
#[derive(Debug, Default)]
pub struct WriteRequest {
    /// Attribute buffers by name.
    pub attributes: Vec<(String, WriteBuffer)>,
    /// Flattened coordinate tuples, one per cell. Required for sparse
    /// arrays and for unordered dense writes.
    pub coords: Option<Vec<i64>>,
    /// Dense target region (inclusive per dimension). Defaults to the full
    /// domain for ordered dense writes.
    pub subarray: Option<Vec<(i64, i64)>>,
}

impl WriteRequest {
    /// Creates an empty request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an attribute buffer.
    pub fn attribute(mut self, name: impl Into<String>, buffer: WriteBuffer) -> Self {
        self.attributes.push((name.into(), buffer));
        self
    }

    /// Sets the coordinate buffer.
    pub fn coords(mut self, coords: Vec<i64>) -> Self {
        self.coords = Some(coords);
        self
    }

    /// Sets the dense target region.
    pub fn subarray(mut self, ranges: Vec<(i64, i64)>) -> Self {
        self.subarray = Some(ranges);
        self
    }
}

/// Builds sealed fragments from write requests.
pub struct FragmentWriter<'a> {
    schema: &'a ArraySchema,
    capacity_override: bool,
}

impl<'a> FragmentWriter<'a> {
    /// Creates a writer for the given schema.
    pub fn new(schema: &'a ArraySchema) -> Self {
        Self {
            schema,
            capacity_override: false,
        }
    }

    /// Permits sparse tiles to exceed the schema's cell capacity.
    pub fn with_capacity_override(mut self) -> Self {
        self.capacity_override = true;
        self
    }

    /// Builds a sealed fragment covering `timestamps` from `request`.
    ///
    /// # Errors
    ///
    /// - `SchemaMismatch` for buffer shapes inconsistent with the schema
    /// - `LayoutError` for missing coordinates, out-of-region cells, or
    ///   duplicate coordinates within the request
    /// - `CapacityExceeded` when a sparse tile would exceed the schema
    ///   capacity without an explicit override
    pub fn build(
        &self,
        layout: Layout,
        request: WriteRequest,
        timestamps: TimestampRange,
    ) -> Result<Fragment> {
        let ndim = self.schema.ndim();
        if let Some(subarray) = &request.subarray {
            if subarray.len() != ndim {
                return Err(ArrayError::LayoutError(format!(
                    "subarray has {} ranges for {} dimensions",
                    subarray.len(),
                    ndim
                )));
            }
            for (d, (lo, hi)) in subarray.iter().enumerate() {
                let dim = self.schema.domain.dim(d);
                if lo > hi || *lo < dim.domain.0 || *hi > dim.domain.1 {
                    return Err(ArrayError::LayoutError(format!(
                        "subarray range [{}, {}] outside dimension '{}'",
                        lo, hi, dim.name
                    )));
                }
            }
        }

        match self.schema.kind {
            ArrayKind::Sparse => {
                let coords = request.coords.as_deref().ok_or_else(|| {
                    ArrayError::LayoutError(
                        "sparse write requires a coordinate buffer".to_string(),
                    )
                })?;
                self.build_explicit(layout, &request, coords, timestamps)
            }
            ArrayKind::Dense => match layout {
                Layout::Unordered => {
                    let coords = request.coords.as_deref().ok_or_else(|| {
                        ArrayError::LayoutError(
                            "unordered dense write requires explicit coordinates".to_string(),
                        )
                    })?;
                    self.build_explicit(layout, &request, coords, timestamps)
                }
                _ => {
                    if request.coords.is_some() {
                        return Err(ArrayError::LayoutError(
                            "ordered dense write must not carry coordinates".to_string(),
                        ));
                    }
                    self.build_dense_region(layout, &request, timestamps)
                }
            },
        }
    }

    /// Explicit-coordinate path: sparse writes and scattered dense writes.
    fn build_explicit(
        &self,
        layout: Layout,
        request: &WriteRequest,
        coords: &[i64],
        timestamps: TimestampRange,
    ) -> Result<Fragment> {
        let ndim = self.schema.ndim();
        if coords.is_empty() || coords.len() % ndim != 0 {
            return Err(ArrayError::LayoutError(format!(
                "coordinate buffer of {} values is not a positive multiple of {} dimensions",
                coords.len(),
                ndim
            )));
        }
        let ncells = coords.len() / ndim;
        let bound = request.subarray.as_deref();
        for cell in 0..ncells {
            let tuple = &coords[cell * ndim..(cell + 1) * ndim];
            if !self.schema.domain.contains(tuple) {
                return Err(ArrayError::LayoutError(format!(
                    "coordinates {:?} outside the array domain",
                    tuple
                )));
            }
            if let Some(ranges) = bound {
                if !tuple
                    .iter()
                    .zip(ranges)
                    .all(|(c, r)| *c >= r.0 && *c <= r.1)
                {
                    return Err(ArrayError::LayoutError(format!(
                        "coordinates {:?} outside the write subarray",
                        tuple
                    )));
                }
            }
        }
        let columns = self.check_attributes(request, ncells)?;

        // Sort key: (global tile id, intra-tile position). The pair is
        // unique per cell position, so equal adjacent keys after sorting
        // are duplicate coordinates.
        let mut keys: Vec<(u64, u64, u32)> = (0..ncells)
            .map(|cell| {
                let tuple = &coords[cell * ndim..(cell + 1) * ndim];
                let (tile, pos) = self.schema.global_key(tuple);
                (tile, pos, cell as u32)
            })
            .collect();
        if layout == Layout::GlobalOrder {
            if keys.windows(2).any(|w| (w[0].0, w[0].1) > (w[1].0, w[1].1)) {
                return Err(ArrayError::LayoutError(
                    "global-order write is not sorted in global order".to_string(),
                ));
            }
        } else {
            keys.sort_unstable();
        }
        if let Some(w) = keys.windows(2).find(|w| (w[0].0, w[0].1) == (w[1].0, w[1].1)) {
            let tuple = &coords[w[0].2 as usize * ndim..(w[0].2 as usize + 1) * ndim];
            return Err(ArrayError::LayoutError(format!(
                "duplicate coordinates {:?} within one write",
                tuple
            )));
        }

        // Tiles break at space-tile boundaries; sparse tiles additionally
        // honor the schema capacity.
        let mut tiles = Vec::new();
        let mut tile_start = 0usize;
        for i in 1..=ncells {
            if i == ncells || keys[i].0 != keys[tile_start].0 {
                let count = (i - tile_start) as u64;
                if self.schema.kind == ArrayKind::Sparse
                    && count > self.schema.capacity
                    && !self.capacity_override
                {
                    return Err(ArrayError::CapacityExceeded {
                        cells: count,
                        capacity: self.schema.capacity,
                    });
                }
                let mut mbr =
                    NonEmptyDomain::from_point(cell_tuple(coords, ndim, keys[tile_start].2));
                for key in &keys[tile_start + 1..i] {
                    mbr.expand(cell_tuple(coords, ndim, key.2));
                }
                tiles.push(TileMeta::new(
                    tile_start as u64,
                    count,
                    mbr.ranges().to_vec(),
                ));
                tile_start = i;
            }
        }

        let mut ned = NonEmptyDomain::from_point(cell_tuple(coords, ndim, keys[0].2));
        let mut sorted_coords = Vec::with_capacity(coords.len());
        let mut filter = CoordFilter::new(ncells);
        for key in &keys {
            let tuple = cell_tuple(coords, ndim, key.2);
            ned.expand(tuple);
            filter.insert(tuple);
            sorted_coords.extend_from_slice(tuple);
        }

        let perm: Vec<u32> = keys.iter().map(|k| k.2).collect();
        let out_columns = self.permute_columns(&columns, &perm)?;

        Ok(Fragment {
            timestamps,
            non_empty_domain: ned,
            cell_count: ncells as u64,
            subarray: None,
            tiles,
            coords: Some(sorted_coords),
            columns: out_columns,
            filter: Some(filter),
        })
    }

    /// Contiguous dense path: the buffers cover every cell of a region.
    fn build_dense_region(
        &self,
        layout: Layout,
        request: &WriteRequest,
        timestamps: TimestampRange,
    ) -> Result<Fragment> {
        let region: Vec<(i64, i64)> = match &request.subarray {
            Some(ranges) => ranges.clone(),
            None => self
                .schema
                .domain
                .dimensions()
                .iter()
                .map(|d| d.domain)
                .collect(),
        };
        let ncells64 = RegionIter::cell_count(&region);
        if ncells64 == 0 {
            return Err(ArrayError::LayoutError("empty write region".to_string()));
        }
        let ncells = usize::try_from(ncells64)
            .map_err(|_| ArrayError::Allocation(usize::MAX))?;
        let columns = self.check_attributes(request, ncells)?;

        // Enumerate the region in global order; each output position maps
        // back to the input rank under the caller's layout.
        let mut perm = Vec::with_capacity(ncells);
        let mut tiles = Vec::new();
        let mut iter = GlobalIter::new(
            &self.schema.domain,
            &region,
            self.schema.tile_order,
            self.schema.cell_order,
        );
        let mut current_tile: Option<(u64, u64, NonEmptyDomain)> = None;
        let mut out_pos = 0u64;
        while let Some((cell, tile_id)) = iter.advance() {
            let input_idx = match layout {
                Layout::RowMajor => region_rank(&region, cell, crate::schema::CellOrder::RowMajor),
                Layout::ColMajor => region_rank(&region, cell, crate::schema::CellOrder::ColMajor),
                Layout::GlobalOrder => out_pos,
                Layout::Unordered => unreachable!("explicit path handles unordered"),
            };
            perm.push(input_idx as u32);
            match &mut current_tile {
                Some((id, _, mbr)) if *id == tile_id => mbr.expand(cell),
                _ => {
                    if let Some((_, first, mbr)) = current_tile.take() {
                        tiles.push(TileMeta::new(first, out_pos - first, mbr.ranges().to_vec()));
                    }
                    current_tile = Some((tile_id, out_pos, NonEmptyDomain::from_point(cell)));
                }
            }
            out_pos += 1;
        }
        if let Some((_, first, mbr)) = current_tile.take() {
            tiles.push(TileMeta::new(first, out_pos - first, mbr.ranges().to_vec()));
        }

        let out_columns = self.permute_columns(&columns, &perm)?;

        Ok(Fragment {
            timestamps,
            non_empty_domain: NonEmptyDomain::new(region.clone()),
            cell_count: ncells as u64,
            subarray: Some(region),
            tiles,
            coords: None,
            columns: out_columns,
            filter: None,
        })
    }

    /// Validates attribute coverage and buffer shapes; returns buffers in
    /// schema attribute order.
    fn check_attributes<'r>(
        &self,
        request: &'r WriteRequest,
        ncells: usize,
    ) -> Result<Vec<&'r WriteBuffer>> {
        for (name, _) in &request.attributes {
            if self.schema.attribute(name).is_none() {
                return Err(ArrayError::SchemaMismatch(format!(
                    "unknown attribute '{}'",
                    name
                )));
            }
        }
        let mut ordered = Vec::with_capacity(self.schema.attributes.len());
        for attr in &self.schema.attributes {
            let buffer = request
                .attributes
                .iter()
                .find(|(name, _)| *name == attr.name)
                .map(|(_, b)| b)
                .ok_or_else(|| {
                    ArrayError::SchemaMismatch(format!("missing buffer for attribute '{}'", attr.name))
                })?;
            match attr.cell_size() {
                Some(cell_size) => {
                    if buffer.offsets.is_some() {
                        return Err(ArrayError::SchemaMismatch(format!(
                            "fixed-size attribute '{}' must not carry offsets",
                            attr.name
                        )));
                    }
                    if buffer.values.len() != ncells * cell_size {
                        return Err(ArrayError::SchemaMismatch(format!(
                            "attribute '{}' holds {} bytes for {} cells of {} bytes",
                            attr.name,
                            buffer.values.len(),
                            ncells,
                            cell_size
                        )));
                    }
                }
                None => {
                    let offsets = buffer.offsets.as_ref().ok_or_else(|| {
                        ArrayError::SchemaMismatch(format!(
                            "variable-length attribute '{}' requires offsets",
                            attr.name
                        ))
                    })?;
                    if offsets.len() != ncells {
                        return Err(ArrayError::SchemaMismatch(format!(
                            "attribute '{}' has {} offsets for {} cells",
                            attr.name,
                            offsets.len(),
                            ncells
                        )));
                    }
                    if offsets.first().copied().unwrap_or(0) != 0
                        || offsets.windows(2).any(|w| w[0] > w[1])
                        || offsets.last().copied().unwrap_or(0) > buffer.values.len() as u64
                    {
                        return Err(ArrayError::SchemaMismatch(format!(
                            "attribute '{}' offsets are not monotonic within the value buffer",
                            attr.name
                        )));
                    }
                }
            }
            match (&buffer.validity, attr.nullable) {
                (Some(v), true) => {
                    if v.len() != ncells {
                        return Err(ArrayError::SchemaMismatch(format!(
                            "attribute '{}' validity covers {} of {} cells",
                            attr.name,
                            v.len(),
                            ncells
                        )));
                    }
                }
                (None, true) => {
                    return Err(ArrayError::SchemaMismatch(format!(
                        "nullable attribute '{}' requires a validity bytemap",
                        attr.name
                    )));
                }
                (Some(_), false) => {
                    return Err(ArrayError::SchemaMismatch(format!(
                        "attribute '{}' is not nullable but carries validity",
                        attr.name
                    )));
                }
                (None, false) => {}
            }
            ordered.push(buffer);
        }
        Ok(ordered)
    }

    /// Copies input buffers into sealed columns following `perm`, where
    /// `perm[out_pos]` is the input cell index. Variable-length offsets are
    /// rebuilt sequentially in the output order.
    fn permute_columns(
        &self,
        buffers: &[&WriteBuffer],
        perm: &[u32],
    ) -> Result<Vec<AttributeColumn>> {
        let ncells = perm.len();
        let mut columns = Vec::with_capacity(buffers.len());
        for (attr, buffer) in self.schema.attributes.iter().zip(buffers) {
            let (values, offsets) = match attr.cell_size() {
                Some(cell_size) => {
                    let mut values = Vec::new();
                    values
                        .try_reserve_exact(ncells * cell_size)
                        .map_err(|_| ArrayError::Allocation(ncells * cell_size))?;
                    for &input_idx in perm {
                        let start = input_idx as usize * cell_size;
                        values.extend_from_slice(&buffer.values.as_slice()[start..start + cell_size]);
                    }
                    (values, None)
                }
                None => {
                    let mut values = Vec::new();
                    values
                        .try_reserve_exact(buffer.values.len())
                        .map_err(|_| ArrayError::Allocation(buffer.values.len()))?;
                    let mut offsets = Vec::with_capacity(ncells);
                    for &input_idx in perm {
                        offsets.push(values.len() as u64);
                        let (start, len) = buffer.var_range(input_idx as usize);
                        values.extend_from_slice(&buffer.values.as_slice()[start..start + len]);
                    }
                    (values, Some(offsets))
                }
            };
            let validity = buffer.validity.as_ref().map(|v| {
                perm.iter()
                    .map(|&i| v.as_bytemap()[i as usize])
                    .collect::<Vec<u8>>()
            });
            columns.push(AttributeColumn {
                values,
                offsets,
                validity,
            });
        }
        Ok(columns)
    }
}

fn cell_tuple<'c>(coords: &'c [i64], ndim: usize, cell: u32) -> &'c [i64] {
    &coords[cell as usize * ndim..(cell as usize + 1) * ndim]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Attribute, Datatype, Dimension, Domain};

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
            vec![Attribute::new("a", Datatype::Int32)],
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

    #[test]
    fn test_dense_row_major_write_is_permuted_to_global_order() {
        let schema = dense_schema();
        let writer = FragmentWriter::new(&schema);
        // Full 4x4 grid, row-major input 0..16.
        let values: Vec<i32> = (0..16).collect();
        let request = WriteRequest::new().attribute("a", WriteBuffer::fixed(i32_bytes(&values)));
        let frag = writer
            .build(Layout::RowMajor, request, TimestampRange::point(1))
            .unwrap();
        assert_eq!(frag.cell_count, 16);
        assert_eq!(frag.tiles.len(), 4);
        assert!(frag.subarray.is_some());
        // First tile in global order holds rows 1-2, cols 1-2: row-major
        // input ranks 0, 1, 4, 5.
        let vals: Vec<i32> = frag.columns[0]
            .values
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes(c.try_into().unwrap()))
            .collect();
        assert_eq!(&vals[..4], &[0, 1, 4, 5]);
    }

    #[test]
    fn test_dense_requires_coords_only_when_unordered() {
        let schema = dense_schema();
        let writer = FragmentWriter::new(&schema);
        let request = WriteRequest::new().attribute("a", WriteBuffer::fixed(i32_bytes(&[7])));
        let err = writer
            .build(Layout::Unordered, request, TimestampRange::point(1))
            .unwrap_err();
        assert!(matches!(err, ArrayError::LayoutError(_)));
    }

    #[test]
    fn test_scattered_dense_write_carries_coords() {
        let schema = dense_schema();
        let writer = FragmentWriter::new(&schema);
        let request = WriteRequest::new()
            .attribute("a", WriteBuffer::fixed(i32_bytes(&[10, 20])))
            .coords(vec![4, 4, 1, 1]);
        let frag = writer
            .build(Layout::Unordered, request, TimestampRange::point(1))
            .unwrap();
        assert_eq!(frag.cell_count, 2);
        assert!(frag.subarray.is_none());
        // Sorted into global order: (1,1) before (4,4).
        assert_eq!(frag.coords.as_deref(), Some(&[1, 1, 4, 4][..]));
        let vals: Vec<i32> = frag.columns[0]
            .values
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes(c.try_into().unwrap()))
            .collect();
        assert_eq!(vals, vec![20, 10]);
    }

    #[test]
    fn test_sparse_write_sorts_and_builds_mbrs() {
        let schema = sparse_schema();
        let writer = FragmentWriter::new(&schema);
        let request = WriteRequest::new()
            .attribute("a", WriteBuffer::fixed(i32_bytes(&[1, 2, 3])))
            .coords(vec![3, 3, 1, 2, 2, 1]);
        let frag = writer
            .build(Layout::Unordered, request, TimestampRange::point(1))
            .unwrap();
        assert_eq!(frag.cell_count, 3);
        // (1,2) and (2,1) share tile 0; (3,3) is tile 3.
        assert_eq!(frag.tiles.len(), 2);
        assert_eq!(frag.tiles[0].mbr, vec![(1, 2), (1, 2)]);
        assert_eq!(frag.tiles[1].mbr, vec![(3, 3), (3, 3)]);
        assert_eq!(frag.non_empty_domain.ranges(), &[(1, 3), (1, 3)]);
    }

    #[test]
    fn test_sparse_write_requires_coords() {
        let schema = sparse_schema();
        let writer = FragmentWriter::new(&schema);
        let request = WriteRequest::new().attribute("a", WriteBuffer::fixed(i32_bytes(&[1])));
        let err = writer
            .build(Layout::Unordered, request, TimestampRange::point(1))
            .unwrap_err();
        assert!(matches!(err, ArrayError::LayoutError(_)));
    }

    #[test]
    fn test_duplicate_coordinates_rejected() {
        let schema = sparse_schema();
        let writer = FragmentWriter::new(&schema);
        let request = WriteRequest::new()
            .attribute("a", WriteBuffer::fixed(i32_bytes(&[1, 2])))
            .coords(vec![2, 2, 2, 2]);
        let err = writer
            .build(Layout::Unordered, request, TimestampRange::point(1))
            .unwrap_err();
        assert!(matches!(err, ArrayError::LayoutError(_)));
    }

    #[test]
    fn test_capacity_exceeded_and_override() {
        let domain = Domain::new(vec![Dimension::new("d", (1, 8), 8).unwrap()]).unwrap();
        let schema = ArraySchema::new(
            ArrayKind::Sparse,
            domain,
            vec![Attribute::new("a", Datatype::Int32)],
        )
        .unwrap()
        .with_capacity(2)
        .unwrap();

        let build = |writer: FragmentWriter| {
            let request = WriteRequest::new()
                .attribute("a", WriteBuffer::fixed(i32_bytes(&[1, 2, 3])))
                .coords(vec![1, 2, 3]);
            writer.build(Layout::Unordered, request, TimestampRange::point(1))
        };

        let err = build(FragmentWriter::new(&schema)).unwrap_err();
        assert!(matches!(err, ArrayError::CapacityExceeded { cells: 3, capacity: 2 }));
        let frag = build(FragmentWriter::new(&schema).with_capacity_override()).unwrap();
        assert_eq!(frag.cell_count, 3);
    }

    #[test]
    fn test_schema_mismatch_on_bad_buffer_shapes() {
        let schema = dense_schema();
        let writer = FragmentWriter::new(&schema);
        // 15 values for a 16-cell region.
        let values: Vec<i32> = (0..15).collect();
        let request = WriteRequest::new().attribute("a", WriteBuffer::fixed(i32_bytes(&values)));
        let err = writer
            .build(Layout::RowMajor, request, TimestampRange::point(1))
            .unwrap_err();
        assert!(matches!(err, ArrayError::SchemaMismatch(_)));
    }

    #[test]
    fn test_var_length_offsets_rebuilt_in_sorted_order() {
        let domain = Domain::new(vec![Dimension::new("d", (1, 4), 2).unwrap()]).unwrap();
        let schema = ArraySchema::new(
            ArrayKind::Sparse,
            domain,
            vec![Attribute::var("v", Datatype::StringAscii)],
        )
        .unwrap();
        let writer = FragmentWriter::new(&schema);
        let mut values = OwnedBuffer::new();
        values.extend_from_slice(b"ccccbba").unwrap();
        let request = WriteRequest::new()
            .attribute("v", WriteBuffer::var(values, vec![0, 4, 6]))
            .coords(vec![4, 2, 1]);
        let frag = writer
            .build(Layout::Unordered, request, TimestampRange::point(1))
            .unwrap();
        // Sorted coordinate order is 1, 2, 4 -> payloads a, bb, cccc.
        assert_eq!(frag.columns[0].values, b"abbcccc");
        assert_eq!(frag.columns[0].offsets.as_deref(), Some(&[0, 1, 3][..]));
    }
}
