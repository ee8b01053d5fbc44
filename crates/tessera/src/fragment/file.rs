//! Fragment file format.
//!
//! A sealed fragment is persisted as a single blob (`fragment.tsr`) inside
//! its fragment directory, plus the array schema blob (`schema.tsr`) at
//! the array root.
//!
//! ## File Structure
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Header (48 bytes)                                           │
//! │  - Magic: "TSRA" (4 bytes)                                   │
//! │  - Version: u16 (2 bytes) = 1                                │
//! │  - Timestamp range lo/hi: u64 × 2                            │
//! │  - Cell count: u64, Tile count: u32                          │
//! │  - Dim count: u16, Attr count: u16                           │
//! │  - Kind, has_coords, has_subarray, has_filter: u8 × 4        │
//! │  - Reserved: 6 bytes                                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Non-empty domain: (i64 lo, i64 hi) per dimension            │
//! │  Dense region: (i64 lo, i64 hi) per dimension (optional)     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Tile data blocks (one per tile, each with block CRC32)      │
//! │  - coordinates, then per attribute: values [+offsets]        │
//! │    [+validity]                                               │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Tile index: cell range, MBR, block offset/size per tile     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Coordinate filter block (optional)                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Footer (56 bytes)                                           │
//! │  - Section offsets/sizes, file CRC32, reverse magic "ARST"   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use crate::error::{ArrayError, Result};
use crate::fragment::{
    AttributeColumn, CoordFilter, Fragment, NonEmptyDomain, TileMeta, TimestampRange,
};
use crate::schema::{
    ArrayKind, ArraySchema, Attribute, CellOrder, CellValNum, Datatype, Dimension, Domain,
};
use crate::storage::StorageBackend;
use std::path::Path;

/// Magic bytes for a fragment file header: "TSRA".
pub const FRAGMENT_MAGIC: [u8; 4] = *b"TSRA";

/// Reverse magic bytes for a fragment file footer: "ARST".
pub const FRAGMENT_MAGIC_REVERSE: [u8; 4] = *b"ARST";

/// Current fragment file format version.
pub const FRAGMENT_VERSION: u16 = 1;

/// Blob name of the fragment payload inside a fragment directory.
pub const FRAGMENT_BLOB: &str = "fragment.tsr";

/// Blob name of the schema at the array root.
pub const SCHEMA_BLOB: &str = "schema.tsr";

/// Header size in bytes.
pub const HEADER_SIZE: usize = 48;

/// Footer size in bytes.
pub const FOOTER_SIZE: usize = 56;

/// Magic bytes for the schema blob: "TSCH".
const SCHEMA_MAGIC: [u8; 4] = *b"TSCH";

struct Header {
    timestamps: TimestampRange,
    cell_count: u64,
    tile_count: u32,
    ndim: u16,
    nattr: u16,
    kind: ArrayKind,
    has_coords: bool,
    has_subarray: bool,
    has_filter: bool,
}

impl Header {
    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&FRAGMENT_MAGIC);
        out.extend_from_slice(&FRAGMENT_VERSION.to_le_bytes());
        out.extend_from_slice(&self.timestamps.lo.to_le_bytes());
        out.extend_from_slice(&self.timestamps.hi.to_le_bytes());
        out.extend_from_slice(&self.cell_count.to_le_bytes());
        out.extend_from_slice(&self.tile_count.to_le_bytes());
        out.extend_from_slice(&self.ndim.to_le_bytes());
        out.extend_from_slice(&self.nattr.to_le_bytes());
        out.push(self.kind as u8);
        out.push(u8::from(self.has_coords));
        out.push(u8::from(self.has_subarray));
        out.push(u8::from(self.has_filter));
        out.extend_from_slice(&[0u8; 6]);
    }

    fn read_from(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(ArrayError::FragmentCorrupt("truncated header".to_string()));
        }
        let magic: [u8; 4] = buf[0..4].try_into().unwrap();
        if magic != FRAGMENT_MAGIC {
            return Err(ArrayError::InvalidMagic(magic));
        }
        let version = u16::from_le_bytes(buf[4..6].try_into().unwrap());
        if version > FRAGMENT_VERSION {
            return Err(ArrayError::UnsupportedVersion(version));
        }
        let lo = u64::from_le_bytes(buf[6..14].try_into().unwrap());
        let hi = u64::from_le_bytes(buf[14..22].try_into().unwrap());
        if lo > hi {
            return Err(ArrayError::FragmentCorrupt(format!(
                "timestamp range [{lo}, {hi}] is inverted"
            )));
        }
        let cell_count = u64::from_le_bytes(buf[22..30].try_into().unwrap());
        let tile_count = u32::from_le_bytes(buf[30..34].try_into().unwrap());
        let ndim = u16::from_le_bytes(buf[34..36].try_into().unwrap());
        let nattr = u16::from_le_bytes(buf[36..38].try_into().unwrap());
        let kind = ArrayKind::from_u8(buf[38])
            .ok_or_else(|| ArrayError::FragmentCorrupt(format!("bad array kind {}", buf[38])))?;
        Ok(Self {
            timestamps: TimestampRange::span(lo, hi),
            cell_count,
            tile_count,
            ndim,
            nattr,
            kind,
            has_coords: buf[39] != 0,
            has_subarray: buf[40] != 0,
            has_filter: buf[41] != 0,
        })
    }
}

struct Footer {
    data_offset: u64,
    data_size: u64,
    index_offset: u64,
    index_size: u64,
    filter_offset: u64,
    filter_size: u64,
    file_crc32: u32,
}

impl Footer {
    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.data_offset.to_le_bytes());
        out.extend_from_slice(&self.data_size.to_le_bytes());
        out.extend_from_slice(&self.index_offset.to_le_bytes());
        out.extend_from_slice(&self.index_size.to_le_bytes());
        out.extend_from_slice(&self.filter_offset.to_le_bytes());
        out.extend_from_slice(&self.filter_size.to_le_bytes());
        out.extend_from_slice(&self.file_crc32.to_le_bytes());
        out.extend_from_slice(&FRAGMENT_MAGIC_REVERSE);
    }

    fn read_from(buf: &[u8]) -> Result<Self> {
        if buf.len() < FOOTER_SIZE {
            return Err(ArrayError::FragmentCorrupt("truncated footer".to_string()));
        }
        let magic: [u8; 4] = buf[52..56].try_into().unwrap();
        if magic != FRAGMENT_MAGIC_REVERSE {
            return Err(ArrayError::InvalidMagic(magic));
        }
        Ok(Self {
            data_offset: u64::from_le_bytes(buf[0..8].try_into().unwrap()),
            data_size: u64::from_le_bytes(buf[8..16].try_into().unwrap()),
            index_offset: u64::from_le_bytes(buf[16..24].try_into().unwrap()),
            index_size: u64::from_le_bytes(buf[24..32].try_into().unwrap()),
            filter_offset: u64::from_le_bytes(buf[32..40].try_into().unwrap()),
            filter_size: u64::from_le_bytes(buf[40..48].try_into().unwrap()),
            file_crc32: u32::from_le_bytes(buf[48..52].try_into().unwrap()),
        })
    }
}

fn write_ranges(out: &mut Vec<u8>, ranges: &[(i64, i64)]) {
    for (lo, hi) in ranges {
        out.extend_from_slice(&lo.to_le_bytes());
        out.extend_from_slice(&hi.to_le_bytes());
    }
}

fn read_ranges(buf: &[u8], ndim: usize) -> Result<Vec<(i64, i64)>> {
    if buf.len() < ndim * 16 {
        return Err(ArrayError::FragmentCorrupt(
            "truncated range block".to_string(),
        ));
    }
    let mut ranges = Vec::with_capacity(ndim);
    for d in 0..ndim {
        let lo = i64::from_le_bytes(buf[d * 16..d * 16 + 8].try_into().unwrap());
        let hi = i64::from_le_bytes(buf[d * 16 + 8..d * 16 + 16].try_into().unwrap());
        ranges.push((lo, hi));
    }
    Ok(ranges)
}

/// Serializes one tile's cell data (coordinates plus every attribute
/// section) and appends a block CRC32.
fn encode_tile_block(
    schema: &ArraySchema,
    fragment: &Fragment,
    tile: &TileMeta,
    out: &mut Vec<u8>,
) {
    let block_start = out.len();
    let first = tile.first_cell as usize;
    let count = tile.cell_count as usize;
    let ndim = schema.ndim();

    if let Some(coords) = &fragment.coords {
        let start = first * ndim;
        for c in &coords[start..start + count * ndim] {
            out.extend_from_slice(&c.to_le_bytes());
        }
    }
    for (attr, column) in schema.attributes.iter().zip(&fragment.columns) {
        match attr.cell_size() {
            Some(cell_size) => {
                let start = first * cell_size;
                out.extend_from_slice(&column.values[start..start + count * cell_size]);
            }
            None => {
                // Offsets are stored relative to the tile's first cell, the
                // payload length prefixed so the section is self-delimiting.
                let base = column.offsets.as_ref().unwrap()[first];
                let end = if first + count
                    == column.offsets.as_ref().unwrap().len()
                {
                    column.values.len() as u64
                } else {
                    column.offsets.as_ref().unwrap()[first + count]
                };
                for cell in 0..count {
                    let rel = column.offsets.as_ref().unwrap()[first + cell] - base;
                    out.extend_from_slice(&rel.to_le_bytes());
                }
                out.extend_from_slice(&(end - base).to_le_bytes());
                out.extend_from_slice(&column.values[base as usize..end as usize]);
            }
        }
        if let Some(validity) = &column.validity {
            out.extend_from_slice(&validity[first..first + count]);
        }
    }
    let crc = crc32fast::hash(&out[block_start..]);
    out.extend_from_slice(&crc.to_le_bytes());
}

/// Parses one tile block into per-column accumulators.
fn decode_tile_block(
    schema: &ArraySchema,
    block: &[u8],
    count: usize,
    has_coords: bool,
    coords: &mut Vec<i64>,
    columns: &mut [AttributeColumn],
) -> Result<()> {
    if block.len() < 4 {
        return Err(ArrayError::FragmentCorrupt("truncated tile block".to_string()));
    }
    let (content, crc_bytes) = block.split_at(block.len() - 4);
    let expected = u32::from_le_bytes(crc_bytes.try_into().unwrap());
    let actual = crc32fast::hash(content);
    if expected != actual {
        return Err(ArrayError::ChecksumMismatch { expected, actual });
    }

    let mut pos = 0usize;
    if has_coords {
        let ndim = schema.ndim();
        let bytes = take_bytes(content, &mut pos, count * ndim * 8)?;
        for chunk in bytes.chunks_exact(8) {
            coords.push(i64::from_le_bytes(chunk.try_into().unwrap()));
        }
    }
    for (attr, column) in schema.attributes.iter().zip(columns.iter_mut()) {
        match attr.cell_size() {
            Some(cell_size) => {
                let bytes = take_bytes(content, &mut pos, count * cell_size)?;
                column.values.extend_from_slice(bytes);
            }
            None => {
                let offset_bytes = take_bytes(content, &mut pos, count * 8)?;
                let base = column.values.len() as u64;
                let offsets = column.offsets.as_mut().unwrap();
                for chunk in offset_bytes.chunks_exact(8) {
                    offsets.push(base + u64::from_le_bytes(chunk.try_into().unwrap()));
                }
                let len_bytes = take_bytes(content, &mut pos, 8)?;
                let payload_len = u64::from_le_bytes(len_bytes.try_into().unwrap()) as usize;
                let payload = take_bytes(content, &mut pos, payload_len)?;
                column.values.extend_from_slice(payload);
            }
        }
        if attr.nullable {
            let bytes = take_bytes(content, &mut pos, count)?;
            column.validity.as_mut().unwrap().extend_from_slice(bytes);
        }
    }
    Ok(())
}

fn take_bytes<'a>(content: &'a [u8], pos: &mut usize, len: usize) -> Result<&'a [u8]> {
    if *pos + len > content.len() {
        return Err(ArrayError::FragmentCorrupt("truncated tile block".to_string()));
    }
    let slice = &content[*pos..*pos + len];
    *pos += len;
    Ok(slice)
}

/// Encodes a sealed fragment into its blob representation.
pub fn encode(schema: &ArraySchema, fragment: &Fragment) -> Result<Vec<u8>> {
    fragment.check(schema)?;
    let mut out = Vec::new();
    let header = Header {
        timestamps: fragment.timestamps,
        cell_count: fragment.cell_count,
        tile_count: fragment.tiles.len() as u32,
        ndim: schema.ndim() as u16,
        nattr: schema.attributes.len() as u16,
        kind: schema.kind,
        has_coords: fragment.coords.is_some(),
        has_subarray: fragment.subarray.is_some(),
        has_filter: fragment.filter.is_some(),
    };
    header.write_to(&mut out);
    write_ranges(&mut out, fragment.non_empty_domain.ranges());
    if let Some(subarray) = &fragment.subarray {
        write_ranges(&mut out, subarray);
    }

    let data_offset = out.len() as u64;
    let mut block_locations = Vec::with_capacity(fragment.tiles.len());
    for tile in &fragment.tiles {
        let start = out.len() as u64;
        encode_tile_block(schema, fragment, tile, &mut out);
        block_locations.push((start, out.len() as u64 - start));
    }
    let data_size = out.len() as u64 - data_offset;

    let index_offset = out.len() as u64;
    for (tile, (offset, size)) in fragment.tiles.iter().zip(&block_locations) {
        out.extend_from_slice(&tile.first_cell.to_le_bytes());
        out.extend_from_slice(&tile.cell_count.to_le_bytes());
        out.extend_from_slice(&offset.to_le_bytes());
        out.extend_from_slice(&size.to_le_bytes());
        write_ranges(&mut out, &tile.mbr);
    }
    let index_size = out.len() as u64 - index_offset;

    let (filter_offset, filter_size) = match &fragment.filter {
        Some(filter) => {
            let start = out.len() as u64;
            out.extend_from_slice(&(filter.bits().len() as u32).to_le_bytes());
            out.extend_from_slice(&[filter.hash_count(), 0, 0, 0]);
            for word in filter.bits() {
                out.extend_from_slice(&word.to_le_bytes());
            }
            (start, out.len() as u64 - start)
        }
        None => (0, 0),
    };

    let footer = Footer {
        data_offset,
        data_size,
        index_offset,
        index_size,
        filter_offset,
        filter_size,
        file_crc32: crc32fast::hash(&out),
    };
    footer.write_to(&mut out);
    Ok(out)
}

/// Reads and verifies a fragment blob from a published fragment directory.
///
/// # Errors
///
/// Returns `InvalidMagic`, `UnsupportedVersion`, `ChecksumMismatch` or
/// `FragmentCorrupt` for damaged files, and `Io` for storage failures.
pub fn read(
    storage: &dyn StorageBackend,
    dir: &Path,
    schema: &ArraySchema,
) -> Result<Fragment> {
    let total = storage.blob_size(dir, FRAGMENT_BLOB)?;
    if (total as usize) < HEADER_SIZE + FOOTER_SIZE {
        return Err(ArrayError::FragmentCorrupt("file too short".to_string()));
    }
    let footer_bytes =
        storage.read_blob_range(dir, FRAGMENT_BLOB, total - FOOTER_SIZE as u64, FOOTER_SIZE)?;
    let footer = Footer::read_from(&footer_bytes)?;
    let body = storage.read_blob_range(dir, FRAGMENT_BLOB, 0, (total as usize) - FOOTER_SIZE)?;
    let actual = crc32fast::hash(&body);
    if actual != footer.file_crc32 {
        return Err(ArrayError::ChecksumMismatch {
            expected: footer.file_crc32,
            actual,
        });
    }
    decode_body(schema, &body, &footer)
}

fn decode_body(schema: &ArraySchema, body: &[u8], footer: &Footer) -> Result<Fragment> {
    let header = Header::read_from(body)?;
    if header.ndim as usize != schema.ndim() || header.nattr as usize != schema.attributes.len() {
        return Err(ArrayError::FragmentCorrupt(format!(
            "fragment shape {}d/{} attrs does not match schema {}d/{}",
            header.ndim,
            header.nattr,
            schema.ndim(),
            schema.attributes.len()
        )));
    }
    if header.kind != schema.kind {
        return Err(ArrayError::FragmentCorrupt(
            "fragment kind does not match schema".to_string(),
        ));
    }
    let ndim = schema.ndim();
    let mut pos = HEADER_SIZE;
    let ned = NonEmptyDomain::new(read_ranges(&body[pos..], ndim)?);
    pos += ndim * 16;
    let subarray = if header.has_subarray {
        let ranges = read_ranges(&body[pos..], ndim)?;
        Some(ranges)
    } else {
        None
    };

    // Tile index.
    let index = &body[footer.index_offset as usize
        ..(footer.index_offset + footer.index_size) as usize];
    let entry_size = 32 + ndim * 16;
    let mut tiles = Vec::with_capacity(header.tile_count as usize);
    let mut blocks = Vec::with_capacity(header.tile_count as usize);
    for t in 0..header.tile_count as usize {
        let e = &index[t * entry_size..(t + 1) * entry_size];
        let first_cell = u64::from_le_bytes(e[0..8].try_into().unwrap());
        let cell_count = u64::from_le_bytes(e[8..16].try_into().unwrap());
        let block_offset = u64::from_le_bytes(e[16..24].try_into().unwrap());
        let block_size = u64::from_le_bytes(e[24..32].try_into().unwrap());
        let mbr = read_ranges(&e[32..], ndim)?;
        tiles.push(TileMeta::new(first_cell, cell_count, mbr));
        blocks.push((block_offset, block_size));
    }

    let mut coords = Vec::new();
    let mut columns: Vec<AttributeColumn> = schema
        .attributes
        .iter()
        .map(|attr| AttributeColumn {
            values: Vec::new(),
            offsets: attr.cell_size().is_none().then(Vec::new),
            validity: attr.nullable.then(Vec::new),
        })
        .collect();
    for (tile, (offset, size)) in tiles.iter().zip(&blocks) {
        let block = &body[*offset as usize..(*offset + *size) as usize];
        decode_tile_block(
            schema,
            block,
            tile.cell_count as usize,
            header.has_coords,
            &mut coords,
            &mut columns,
        )?;
    }

    let filter = if header.has_filter {
        let block = &body[footer.filter_offset as usize
            ..(footer.filter_offset + footer.filter_size) as usize];
        let num_words = u32::from_le_bytes(block[0..4].try_into().unwrap()) as usize;
        let hash_count = block[4];
        let mut bits = Vec::with_capacity(num_words);
        for w in 0..num_words {
            bits.push(u64::from_le_bytes(
                block[8 + w * 8..16 + w * 8].try_into().unwrap(),
            ));
        }
        Some(CoordFilter::from_bits(bits, hash_count))
    } else {
        None
    };

    let fragment = Fragment {
        timestamps: header.timestamps,
        non_empty_domain: ned,
        cell_count: header.cell_count,
        subarray,
        tiles,
        coords: header.has_coords.then_some(coords),
        columns,
        filter,
    };
    fragment.check(schema)?;
    Ok(fragment)
}

/// Serializes the array schema blob.
pub fn encode_schema(schema: &ArraySchema) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&SCHEMA_MAGIC);
    out.extend_from_slice(&FRAGMENT_VERSION.to_le_bytes());
    out.push(schema.kind as u8);
    out.push(schema.cell_order as u8);
    out.push(schema.tile_order as u8);
    out.push(0);
    out.extend_from_slice(&schema.capacity.to_le_bytes());
    out.extend_from_slice(&(schema.ndim() as u16).to_le_bytes());
    out.extend_from_slice(&(schema.attributes.len() as u16).to_le_bytes());
    for dim in schema.domain.dimensions() {
        write_name(&mut out, &dim.name);
        out.extend_from_slice(&dim.domain.0.to_le_bytes());
        out.extend_from_slice(&dim.domain.1.to_le_bytes());
        out.extend_from_slice(&dim.tile_extent.to_le_bytes());
    }
    for attr in &schema.attributes {
        write_name(&mut out, &attr.name);
        out.push(attr.datatype as u8);
        let cvn = match attr.cell_val_num {
            CellValNum::Fixed(n) => n,
            CellValNum::Var => u32::MAX,
        };
        out.extend_from_slice(&cvn.to_le_bytes());
        out.push(u8::from(attr.nullable));
    }
    let crc = crc32fast::hash(&out);
    out.extend_from_slice(&crc.to_le_bytes());
    out
}

/// Parses the array schema blob.
///
/// # Errors
///
/// Returns `InvalidMagic`, `ChecksumMismatch` or `FragmentCorrupt` for a
/// damaged blob.
pub fn decode_schema(bytes: &[u8]) -> Result<ArraySchema> {
    if bytes.len() < 4 {
        return Err(ArrayError::FragmentCorrupt("schema blob too short".to_string()));
    }
    let (content, crc_bytes) = bytes.split_at(bytes.len() - 4);
    let expected = u32::from_le_bytes(crc_bytes.try_into().unwrap());
    let actual = crc32fast::hash(content);
    if expected != actual {
        return Err(ArrayError::ChecksumMismatch { expected, actual });
    }
    let magic: [u8; 4] = content[0..4].try_into().unwrap();
    if magic != SCHEMA_MAGIC {
        return Err(ArrayError::InvalidMagic(magic));
    }
    let version = u16::from_le_bytes(content[4..6].try_into().unwrap());
    if version > FRAGMENT_VERSION {
        return Err(ArrayError::UnsupportedVersion(version));
    }
    let kind = ArrayKind::from_u8(content[6])
        .ok_or_else(|| ArrayError::FragmentCorrupt("bad array kind".to_string()))?;
    let cell_order = CellOrder::from_u8(content[7])
        .ok_or_else(|| ArrayError::FragmentCorrupt("bad cell order".to_string()))?;
    let tile_order = CellOrder::from_u8(content[8])
        .ok_or_else(|| ArrayError::FragmentCorrupt("bad tile order".to_string()))?;
    let capacity = u64::from_le_bytes(content[10..18].try_into().unwrap());
    let ndim = u16::from_le_bytes(content[18..20].try_into().unwrap()) as usize;
    let nattr = u16::from_le_bytes(content[20..22].try_into().unwrap()) as usize;

    let mut pos = 22usize;
    let mut dimensions = Vec::with_capacity(ndim);
    for _ in 0..ndim {
        let name = read_name(content, &mut pos)?;
        let lo = i64::from_le_bytes(slice8(content, pos)?);
        let hi = i64::from_le_bytes(slice8(content, pos + 8)?);
        let extent = i64::from_le_bytes(slice8(content, pos + 16)?);
        pos += 24;
        dimensions.push(Dimension::new(name, (lo, hi), extent)?);
    }
    let mut attributes = Vec::with_capacity(nattr);
    for _ in 0..nattr {
        let name = read_name(content, &mut pos)?;
        if pos + 6 > content.len() {
            return Err(ArrayError::FragmentCorrupt("truncated attribute".to_string()));
        }
        let datatype = Datatype::from_u8(content[pos])
            .ok_or_else(|| ArrayError::FragmentCorrupt("bad datatype".to_string()))?;
        let cvn = u32::from_le_bytes(content[pos + 1..pos + 5].try_into().unwrap());
        let nullable = content[pos + 5] != 0;
        pos += 6;
        let mut attr = Attribute {
            name,
            datatype,
            cell_val_num: if cvn == u32::MAX {
                CellValNum::Var
            } else {
                CellValNum::Fixed(cvn)
            },
            nullable: false,
        };
        if nullable {
            attr = attr.nullable();
        }
        attributes.push(attr);
    }

    let schema = ArraySchema::new(kind, Domain::new(dimensions)?, attributes)?
        .with_capacity(capacity)?
        .with_cell_order(cell_order)
        .with_tile_order(tile_order);
    Ok(schema)
}

fn write_name(out: &mut Vec<u8>, name: &str) {
    let bytes = name.as_bytes();
    out.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
    out.extend_from_slice(bytes);
}

fn read_name(content: &[u8], pos: &mut usize) -> Result<String> {
    if *pos + 2 > content.len() {
        return Err(ArrayError::FragmentCorrupt("truncated name".to_string()));
    }
    let len = u16::from_le_bytes(content[*pos..*pos + 2].try_into().unwrap()) as usize;
    *pos += 2;
    if *pos + len > content.len() {
        return Err(ArrayError::FragmentCorrupt("truncated name".to_string()));
    }
    let name = String::from_utf8(content[*pos..*pos + len].to_vec())
        .map_err(|e| ArrayError::FragmentCorrupt(format!("invalid UTF-8 in name: {e}")))?;
    *pos += len;
    Ok(name)
}

fn slice8(content: &[u8], pos: usize) -> Result<[u8; 8]> {
    content
        .get(pos..pos + 8)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| ArrayError::FragmentCorrupt("truncated field".to_string()))
}
