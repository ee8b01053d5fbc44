//! Array schema: dimensions, attributes, tiling, and cell/tile ordering.
//!
//! The schema is a static description consumed read-only by the write and
//! read paths. It also owns the tile-grid arithmetic that defines the
//! array's **global order**: the canonical tile-then-cell traversal order
//! used for fragment layout and consolidation output.

pub mod order;

use crate::error::{ArrayError, Result};

/// Element type of a dimension or attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Datatype {
    /// Signed 8-bit integer.
    Int8 = 0,
    /// Signed 16-bit integer.
    Int16 = 1,
    /// Signed 32-bit integer.
    Int32 = 2,
    /// Signed 64-bit integer.
    Int64 = 3,
    /// Unsigned 8-bit integer.
    UInt8 = 4,
    /// Unsigned 16-bit integer.
    UInt16 = 5,
    /// Unsigned 32-bit integer.
    UInt32 = 6,
    /// Unsigned 64-bit integer.
    UInt64 = 7,
    /// 32-bit IEEE 754 float.
    Float32 = 8,
    /// 64-bit IEEE 754 float.
    Float64 = 9,
    /// ASCII string payload, one byte per element; used with
    /// [`CellValNum::Var`] for variable-length attributes.
    StringAscii = 10,
}

impl Datatype {
    /// Returns the byte width of a single element of this type.
    pub fn size(self) -> usize {
        match self {
            Self::Int8 | Self::UInt8 | Self::StringAscii => 1,
            Self::Int16 | Self::UInt16 => 2,
            Self::Int32 | Self::UInt32 | Self::Float32 => 4,
            Self::Int64 | Self::UInt64 | Self::Float64 => 8,
        }
    }

    /// Creates a Datatype from a u8 value.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Int8),
            1 => Some(Self::Int16),
            2 => Some(Self::Int32),
            3 => Some(Self::Int64),
            4 => Some(Self::UInt8),
            5 => Some(Self::UInt16),
            6 => Some(Self::UInt32),
            7 => Some(Self::UInt64),
            8 => Some(Self::Float32),
            9 => Some(Self::Float64),
            10 => Some(Self::StringAscii),
            _ => None,
        }
    }

    /// Appends the fill value for one element to `out`.
    ///
    /// Integer types fill with zero, float types with NaN. Fill values are
    /// delivered for dense cells no fragment has ever written.
    pub fn push_fill_value(self, out: &mut Vec<u8>) {
        match self {
            Self::Float32 => out.extend_from_slice(&f32::NAN.to_le_bytes()),
            Self::Float64 => out.extend_from_slice(&f64::NAN.to_le_bytes()),
            _ => out.extend(std::iter::repeat(0u8).take(self.size())),
        }
    }
}

/// Kind of an array: dense or sparse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ArrayKind {
    /// Dense: cells addressed by implicit position within the domain.
    Dense = 0,
    /// Sparse: cells addressed by explicit coordinate tuples.
    Sparse = 1,
}

impl ArrayKind {
    /// Creates an ArrayKind from a u8 value.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Dense),
            1 => Some(Self::Sparse),
            _ => None,
        }
    }
}

/// Cell layout of a write buffer or a requested read result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Layout {
    /// Row-major over the subarray (last dimension varies fastest).
    #[default]
    RowMajor = 0,
    /// Column-major over the subarray (first dimension varies fastest).
    ColMajor = 1,
    /// The array's canonical tile-then-cell traversal order.
    GlobalOrder = 2,
    /// Arbitrary order. On write the engine sorts into global order; on
    /// read the engine's internal merge order is delivered as-is.
    Unordered = 3,
}

impl Layout {
    /// Creates a Layout from a u8 value.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::RowMajor),
            1 => Some(Self::ColMajor),
            2 => Some(Self::GlobalOrder),
            3 => Some(Self::Unordered),
            _ => None,
        }
    }
}

/// Traversal order for cells within a tile, or tiles within the domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum CellOrder {
    /// Last dimension varies fastest.
    #[default]
    RowMajor = 0,
    /// First dimension varies fastest.
    ColMajor = 1,
}

impl CellOrder {
    /// Creates a CellOrder from a u8 value.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::RowMajor),
            1 => Some(Self::ColMajor),
            _ => None,
        }
    }
}

/// Number of values per cell for an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellValNum {
    /// Fixed number of values per cell (at least 1).
    Fixed(u32),
    /// Variable number of values per cell, addressed through offsets.
    Var,
}

impl CellValNum {
    /// Returns the fixed value count, or None for variable-length cells.
    pub fn fixed(self) -> Option<u32> {
        match self {
            Self::Fixed(n) => Some(n),
            Self::Var => None,
        }
    }

    /// Returns true for variable-length cells.
    pub fn is_var(self) -> bool {
        matches!(self, Self::Var)
    }
}

/// One array dimension: name, inclusive `i64` domain and tile extent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dimension {
    /// Dimension name, unique within the domain.
    pub name: String,
    /// Inclusive lower and upper domain bounds.
    pub domain: (i64, i64),
    /// Tile extent along this dimension.
    pub tile_extent: i64,
}

impl Dimension {
    /// Creates a dimension, validating bounds and extent.
    ///
    /// # Errors
    ///
    /// Returns `ArrayError::SchemaMismatch` if the domain is empty or the
    /// tile extent is not positive.
    pub fn new(name: impl Into<String>, domain: (i64, i64), tile_extent: i64) -> Result<Self> {
        let name = name.into();
        if domain.0 > domain.1 {
            return Err(ArrayError::SchemaMismatch(format!(
                "dimension '{}' has empty domain [{}, {}]",
                name, domain.0, domain.1
            )));
        }
        if tile_extent <= 0 {
            return Err(ArrayError::SchemaMismatch(format!(
                "dimension '{}' has non-positive tile extent {}",
                name, tile_extent
            )));
        }
        Ok(Self {
            name,
            domain,
            tile_extent,
        })
    }

    /// Number of cells along this dimension.
    pub fn extent(&self) -> u64 {
        (self.domain.1 - self.domain.0) as u64 + 1
    }

    /// Number of tiles along this dimension.
    pub fn tile_count(&self) -> u64 {
        self.extent().div_ceil(self.tile_extent as u64)
    }

    /// Tile index of a coordinate along this dimension.
    pub fn tile_of(&self, coord: i64) -> u64 {
        ((coord - self.domain.0) / self.tile_extent) as u64
    }
}

/// An ordered sequence of dimensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Domain {
    dimensions: Vec<Dimension>,
}

impl Domain {
    /// Creates a domain from an ordered dimension list.
    ///
    /// # Errors
    ///
    /// Returns `ArrayError::SchemaMismatch` if the list is empty or contains
    /// duplicate dimension names.
    pub fn new(dimensions: Vec<Dimension>) -> Result<Self> {
        if dimensions.is_empty() {
            return Err(ArrayError::SchemaMismatch(
                "domain requires at least one dimension".to_string(),
            ));
        }
        for (i, dim) in dimensions.iter().enumerate() {
            if dimensions[..i].iter().any(|d| d.name == dim.name) {
                return Err(ArrayError::SchemaMismatch(format!(
                    "duplicate dimension name '{}'",
                    dim.name
                )));
            }
        }
        Ok(Self { dimensions })
    }

    /// Number of dimensions.
    pub fn ndim(&self) -> usize {
        self.dimensions.len()
    }

    /// Returns the dimension at `idx`.
    pub fn dim(&self, idx: usize) -> &Dimension {
        &self.dimensions[idx]
    }

    /// Returns all dimensions in order.
    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    /// Returns true if `coords` lies inside the domain bounds.
    pub fn contains(&self, coords: &[i64]) -> bool {
        coords.len() == self.ndim()
            && coords
                .iter()
                .zip(&self.dimensions)
                .all(|(c, d)| *c >= d.domain.0 && *c <= d.domain.1)
    }

    /// Linearized tile id of the tile holding `coords`, in `tile_order`.
    pub fn tile_id(&self, coords: &[i64], tile_order: CellOrder) -> u64 {
        let tile_coords: Vec<u64> = coords
            .iter()
            .zip(&self.dimensions)
            .map(|(c, d)| d.tile_of(*c))
            .collect();
        let counts: Vec<u64> = self.dimensions.iter().map(|d| d.tile_count()).collect();
        linearize(&tile_coords, &counts, tile_order)
    }

    /// Position of `coords` within its tile, in `cell_order`.
    pub fn intra_tile_pos(&self, coords: &[i64], cell_order: CellOrder) -> u64 {
        let mut pos = Vec::with_capacity(self.ndim());
        let mut spans = Vec::with_capacity(self.ndim());
        for (c, d) in coords.iter().zip(&self.dimensions) {
            let tile_lo = d.domain.0 + (d.tile_of(*c) as i64) * d.tile_extent;
            // The last tile along a dimension may be clipped by the domain.
            let tile_hi = (tile_lo + d.tile_extent - 1).min(d.domain.1);
            pos.push((*c - tile_lo) as u64);
            spans.push((tile_hi - tile_lo) as u64 + 1);
        }
        linearize(&pos, &spans, cell_order)
    }

    /// Global-order sort key of `coords`: (tile id, intra-tile position).
    ///
    /// The pair uniquely identifies a cell position, so it doubles as the
    /// dedup key for sparse merges.
    pub fn global_key(
        &self,
        coords: &[i64],
        tile_order: CellOrder,
        cell_order: CellOrder,
    ) -> (u64, u64) {
        (
            self.tile_id(coords, tile_order),
            self.intra_tile_pos(coords, cell_order),
        )
    }
}

/// Linearizes a multi-index over per-dimension spans in the given order.
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

/// One array attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Attribute name, unique within the schema.
    pub name: String,
    /// Element type of the attribute values.
    pub datatype: Datatype,
    /// Values per cell: fixed N or variable-length.
    pub cell_val_num: CellValNum,
    /// Whether cells may be null, tracked by a validity bytemap.
    pub nullable: bool,
}

impl Attribute {
    /// Creates a fixed-size, non-nullable attribute with one value per cell.
    pub fn new(name: impl Into<String>, datatype: Datatype) -> Self {
        Self {
            name: name.into(),
            datatype,
            cell_val_num: CellValNum::Fixed(1),
            nullable: false,
        }
    }

    /// Creates a variable-length attribute.
    pub fn var(name: impl Into<String>, datatype: Datatype) -> Self {
        Self {
            name: name.into(),
            datatype,
            cell_val_num: CellValNum::Var,
            nullable: false,
        }
    }

    /// Marks the attribute nullable.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Sets a fixed number of values per cell.
    pub fn with_cell_val_num(mut self, n: u32) -> Self {
        self.cell_val_num = CellValNum::Fixed(n);
        self
    }

    /// Byte width of one cell, or None for variable-length cells.
    pub fn cell_size(&self) -> Option<usize> {
        self.cell_val_num
            .fixed()
            .map(|n| n as usize * self.datatype.size())
    }
}

/// Default maximum number of cells per sparse tile.
pub const DEFAULT_TILE_CAPACITY: u64 = 10_000;

/// Static description of an array: kind, domain, attributes and ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArraySchema {
    /// Dense or sparse.
    pub kind: ArrayKind,
    /// The ordered dimension set.
    pub domain: Domain,
    /// The attribute set.
    pub attributes: Vec<Attribute>,
    /// Maximum cells per sparse tile.
    pub capacity: u64,
    /// Traversal order of cells within a tile.
    pub cell_order: CellOrder,
    /// Traversal order of tiles within the domain.
    pub tile_order: CellOrder,
}

impl ArraySchema {
    /// Creates a schema, validating attribute names and capacity.
    ///
    /// # Errors
    ///
    /// Returns `ArrayError::SchemaMismatch` for an empty attribute set,
    /// duplicate attribute names, a name clashing with a dimension, or a
    /// zero capacity.
    pub fn new(kind: ArrayKind, domain: Domain, attributes: Vec<Attribute>) -> Result<Self> {
        if attributes.is_empty() {
            return Err(ArrayError::SchemaMismatch(
                "schema requires at least one attribute".to_string(),
            ));
        }
        for (i, attr) in attributes.iter().enumerate() {
            if attributes[..i].iter().any(|a| a.name == attr.name) {
                return Err(ArrayError::SchemaMismatch(format!(
                    "duplicate attribute name '{}'",
                    attr.name
                )));
            }
            if domain.dimensions().iter().any(|d| d.name == attr.name) {
                return Err(ArrayError::SchemaMismatch(format!(
                    "attribute name '{}' clashes with a dimension",
                    attr.name
                )));
            }
        }
        Ok(Self {
            kind,
            domain,
            attributes,
            capacity: DEFAULT_TILE_CAPACITY,
            cell_order: CellOrder::RowMajor,
            tile_order: CellOrder::RowMajor,
        })
    }

    /// Sets the maximum cells per sparse tile.
    ///
    /// # Errors
    ///
    /// Returns `ArrayError::SchemaMismatch` for a zero capacity.
    pub fn with_capacity(mut self, capacity: u64) -> Result<Self> {
        if capacity == 0 {
            return Err(ArrayError::SchemaMismatch(
                "tile capacity must be positive".to_string(),
            ));
        }
        self.capacity = capacity;
        Ok(self)
    }

    /// Sets the intra-tile cell order.
    pub fn with_cell_order(mut self, order: CellOrder) -> Self {
        self.cell_order = order;
        self
    }

    /// Sets the tile order.
    pub fn with_tile_order(mut self, order: CellOrder) -> Self {
        self.tile_order = order;
        self
    }

    /// Number of dimensions.
    pub fn ndim(&self) -> usize {
        self.domain.ndim()
    }

    /// Looks up an attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Index of an attribute within the schema.
    pub fn attribute_index(&self, name: &str) -> Option<usize> {
        self.attributes.iter().position(|a| a.name == name)
    }

    /// Global-order sort key for `coords` under this schema's orders.
    pub fn global_key(&self, coords: &[i64]) -> (u64, u64) {
        self.domain
            .global_key(coords, self.tile_order, self.cell_order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_4x4() -> Domain {
        Domain::new(vec![
            Dimension::new("rows", (1, 4), 2).unwrap(),
            Dimension::new("cols", (1, 4), 2).unwrap(),
        ])
        .unwrap()
    }

    #[test]
    fn test_datatype_sizes() {
        assert_eq!(Datatype::Int8.size(), 1);
        assert_eq!(Datatype::UInt16.size(), 2);
        assert_eq!(Datatype::Float32.size(), 4);
        assert_eq!(Datatype::Int64.size(), 8);
        assert_eq!(Datatype::StringAscii.size(), 1);
    }

    #[test]
    fn test_dimension_rejects_bad_shapes() {
        assert!(Dimension::new("d", (5, 4), 2).is_err());
        assert!(Dimension::new("d", (0, 4), 0).is_err());
    }

    #[test]
    fn test_tile_grid_math() {
        let domain = grid_4x4();
        // 2x2 tiles of 2x2 cells, row-major tile order.
        assert_eq!(domain.tile_id(&[1, 1], CellOrder::RowMajor), 0);
        assert_eq!(domain.tile_id(&[1, 3], CellOrder::RowMajor), 1);
        assert_eq!(domain.tile_id(&[3, 1], CellOrder::RowMajor), 2);
        assert_eq!(domain.tile_id(&[4, 4], CellOrder::RowMajor), 3);
        // Intra-tile positions, row-major cell order.
        assert_eq!(domain.intra_tile_pos(&[1, 1], CellOrder::RowMajor), 0);
        assert_eq!(domain.intra_tile_pos(&[1, 2], CellOrder::RowMajor), 1);
        assert_eq!(domain.intra_tile_pos(&[2, 1], CellOrder::RowMajor), 2);
        assert_eq!(domain.intra_tile_pos(&[2, 2], CellOrder::RowMajor), 3);
    }

    #[test]
    fn test_global_key_orders_cells_by_tile_first() {
        let domain = grid_4x4();
        // (1,3) is in tile 1; (2,2) is in tile 0. Global order visits
        // tile 0 entirely before tile 1.
        let a = domain.global_key(&[2, 2], CellOrder::RowMajor, CellOrder::RowMajor);
        let b = domain.global_key(&[1, 3], CellOrder::RowMajor, CellOrder::RowMajor);
        assert!(a < b);
    }

    #[test]
    fn test_clipped_last_tile() {
        // Domain of 5 cells with extent 2: last tile has a single cell.
        let domain = Domain::new(vec![Dimension::new("d", (0, 4), 2).unwrap()]).unwrap();
        assert_eq!(domain.dim(0).tile_count(), 3);
        assert_eq!(domain.intra_tile_pos(&[4], CellOrder::RowMajor), 0);
    }

    #[test]
    fn test_schema_rejects_duplicates() {
        let domain = grid_4x4();
        let attrs = vec![
            Attribute::new("a", Datatype::Int32),
            Attribute::new("a", Datatype::Int64),
        ];
        assert!(ArraySchema::new(ArrayKind::Dense, domain.clone(), attrs).is_err());

        let attrs = vec![Attribute::new("rows", Datatype::Int32)];
        assert!(ArraySchema::new(ArrayKind::Dense, domain, attrs).is_err());
    }

    #[test]
    fn test_attribute_cell_size() {
        let a = Attribute::new("a", Datatype::Int32).with_cell_val_num(3);
        assert_eq!(a.cell_size(), Some(12));
        let v = Attribute::var("v", Datatype::StringAscii);
        assert_eq!(v.cell_size(), None);
    }
}
