//! Array facade: the caller-facing write / read / consolidate surface.
//!
//! An [`Array`] owns the schema, the storage backend and the fragment
//! index of one array. Reads pin the fragment-list version in effect at
//! query start (or carried by a continuation) and use only that version
//! for their entire lifetime; writes and consolidations do their
//! computational work outside any lock and serialize only the final
//! structural swap.

use crate::consolidate::{self, ConsolidationPolicy, ConsolidationStats};
use crate::error::{ArrayError, Result};
use crate::fragment::writer::{FragmentWriter, WriteRequest};
use crate::fragment::{file, fragment_name, parse_fragment_name, FragmentId, NonEmptyDomain, TimestampRange};
use crate::index::{FragmentDescriptor, FragmentIndex};
use crate::read::merge::MergeReader;
use crate::read::{
    Continuation, ReadEstimate, ReadRequest, ReadResult, ReadStatus, Subarray,
};
use crate::schema::{ArrayKind, ArraySchema, Layout};
use crate::storage::StorageBackend;
use std::sync::Arc;
use tracing::{debug, error};

/// An opened multi-dimensional array.
pub struct Array {
    schema: Arc<ArraySchema>,
    storage: Arc<dyn StorageBackend>,
    index: FragmentIndex,
}

impl Array {
    /// Creates a new, empty array, persisting its schema.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the schema blob cannot be written.
    pub fn create(storage: impl StorageBackend + 'static, schema: ArraySchema) -> Result<Self> {
        let storage: Arc<dyn StorageBackend> = Arc::new(storage);
        storage.write_meta(file::SCHEMA_BLOB, &file::encode_schema(&schema))?;
        Ok(Self {
            schema: Arc::new(schema),
            storage,
            index: FragmentIndex::new(Vec::new()),
        })
    }

    /// Opens an existing array: reads the schema and loads every published
    /// fragment.
    ///
    /// # Errors
    ///
    /// Returns `Io` for storage failures and the fragment-file error
    /// variants for damaged blobs.
    pub fn open(storage: impl StorageBackend + 'static) -> Result<Self> {
        let storage: Arc<dyn StorageBackend> = Arc::new(storage);
        let schema = file::decode_schema(&storage.read_meta(file::SCHEMA_BLOB)?)?;
        let mut descriptors = Vec::new();
        for (name, path) in storage.list_fragments()? {
            if parse_fragment_name(&name).is_none() {
                continue;
            }
            let size = storage.blob_size(&path, file::FRAGMENT_BLOB)?;
            let fragment = file::read(storage.as_ref(), &path, &schema)?;
            descriptors.push(Arc::new(FragmentDescriptor::new(fragment, size)));
        }
        debug!(fragments = descriptors.len(), "array: opened");
        Ok(Self {
            schema: Arc::new(schema),
            storage,
            index: FragmentIndex::new(descriptors),
        })
    }

    /// The array schema.
    pub fn schema(&self) -> &ArraySchema {
        &self.schema
    }

    /// Number of live fragments.
    pub fn fragment_count(&self) -> usize {
        self.index.snapshot().len()
    }

    /// Number of retired fragments awaiting physical reclamation.
    pub fn retired_count(&self) -> usize {
        self.index.retired_len()
    }

    /// Union of the live fragments' non-empty domains, or None for an
    /// empty array.
    pub fn non_empty_domain(&self) -> Option<NonEmptyDomain> {
        self.index.snapshot().non_empty_domain()
    }

    /// Writes one batch of cells as a new sealed fragment at the next
    /// timestamp, returning its id.
    ///
    /// The fragment is staged, durably written, atomically published and
    /// only then linked; a failure at any step leaves the array unchanged.
    ///
    /// # Errors
    ///
    /// Surfaces the fragment-writer taxonomy (`SchemaMismatch`,
    /// `LayoutError`, `CapacityExceeded`) plus `Io` for storage failures.
    pub fn write(&self, layout: Layout, request: WriteRequest) -> Result<FragmentId> {
        let timestamp = self.index.allocate_timestamp();
        let span = TimestampRange::point(timestamp);
        let fragment = FragmentWriter::new(&self.schema).build(layout, request, span)?;
        let cells = fragment.cell_count;

        let name = fragment_name(span);
        let staging = self.storage.create_staging(&format!("{name}.tmp"))?;
        let staged = (|| -> Result<u64> {
            let blob = file::encode(&self.schema, &fragment)?;
            self.storage.write_blob(&staging, file::FRAGMENT_BLOB, &blob)?;
            Ok(blob.len() as u64)
        })();
        let size_bytes = match staged {
            Ok(bytes) => bytes,
            Err(err) => {
                let _ = self.storage.discard_staging(&staging);
                return Err(err);
            }
        };
        if let Err(err) = self.storage.publish(&staging, &name) {
            let _ = self.storage.discard_staging(&staging);
            return Err(err);
        }

        let descriptor = Arc::new(FragmentDescriptor::new(fragment, size_bytes));
        if let Err(err) = self.index.link(descriptor) {
            self.storage.delete_fragment(&name)?;
            return Err(err);
        }
        debug!(timestamp, cells, "write: sealed fragment");
        Ok(timestamp)
    }

    /// Reads the overwrite-resolved, deduplicated cells of a subarray into
    /// capacity-bounded buffers.
    ///
    /// An [`ReadStatus::Incomplete`] result carries continuation state; a
    /// follow-up call with [`ReadRequest::resume`] continues after the
    /// last fully-delivered cell against the same pinned fragment-list
    /// version, with the same subarray, layout and attributes.
    ///
    /// # Errors
    ///
    /// Returns `LayoutError` for an invalid subarray or coordinate request
    /// on a dense array, `SchemaMismatch` for unknown attributes, and
    /// `BufferTooSmall` when a capacity cannot hold even one cell.
    pub fn read(&self, request: ReadRequest) -> Result<ReadResult> {
        request.subarray.check(&self.schema)?;
        if request.coords_capacity.is_some() && self.schema.kind == ArrayKind::Dense {
            return Err(ArrayError::LayoutError(
                "dense reads do not return coordinates".to_string(),
            ));
        }
        let (set, from) = match &request.continuation {
            Some(continuation) => (Arc::clone(&continuation.set), continuation.next_cell),
            None => (self.index.snapshot(), 0),
        };
        let overlapping = set.fragments_overlapping(request.subarray.ranges());
        let reader = MergeReader::new(
            &self.schema,
            overlapping,
            request.subarray.clone(),
            request.layout,
        )?;
        let (attributes, coords, cells, more) =
            reader.deliver(&request.attributes, request.coords_capacity, from)?;
        let status = match more {
            Some(next_cell) => ReadStatus::Incomplete(Continuation {
                next_cell,
                set,
            }),
            None => ReadStatus::Completed,
        };
        Ok(ReadResult {
            attributes,
            coords,
            cells,
            status,
        })
    }

    /// Computes per-attribute upper-bound byte counts for a read, ahead of
    /// the main merge.
    pub fn estimate_read_buffer_sizes(
        &self,
        subarray: &Subarray,
        attributes: &[String],
    ) -> Result<ReadEstimate> {
        subarray.check(&self.schema)?;
        let set = self.index.snapshot();
        let overlapping = set.fragments_overlapping(subarray.ranges());
        crate::read::merge::estimate(&self.schema, &overlapping, subarray, attributes)
    }

    /// Runs one consolidation pass under `policy`, then reclaims any
    /// retired fragments no snapshot references.
    pub fn consolidate(&self, policy: &ConsolidationPolicy) -> Result<ConsolidationStats> {
        let stats = consolidate::run(&self.schema, self.storage.as_ref(), &self.index, policy)?;
        self.gc_retired();
        Ok(stats)
    }

    /// Physically deletes retired fragments once no outstanding read
    /// snapshot references them. Returns the number reclaimed.
    pub fn gc_retired(&self) -> usize {
        let mut reclaimed = 0;
        for descriptor in self.index.gc_retired() {
            match self.storage.delete_fragment(&descriptor.name) {
                Ok(()) => reclaimed += 1,
                Err(err) => {
                    // The directory stays behind; a later open simply
                    // ignores it because its timestamps are covered.
                    error!(fragment = %descriptor.name, %err, "gc: failed to delete fragment");
                }
            }
        }
        reclaimed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::OwnedBuffer;
    use crate::fragment::writer::WriteBuffer;
    use crate::read::BufferCapacities;
    use crate::schema::{Attribute, Datatype, Dimension, Domain};
    use crate::storage::DirectoryStorage;
    use tempfile::TempDir;

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

    fn i32_bytes(values: &[i32]) -> OwnedBuffer {
        let mut buf = OwnedBuffer::new();
        for v in values {
            buf.extend_from_slice(&v.to_le_bytes()).unwrap();
        }
        buf
    }

    fn i32_result(result: &ReadResult, name: &str) -> Vec<i32> {
        result
            .attribute(name)
            .unwrap()
            .values
            .as_slice()
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes(c.try_into().unwrap()))
            .collect()
    }

    #[test]
    fn test_write_read_roundtrip_and_reopen() {
        let dir = TempDir::new().unwrap();
        let array = Array::create(
            DirectoryStorage::create(dir.path()).unwrap(),
            dense_schema(),
        )
        .unwrap();
        let values: Vec<i32> = (0..16).collect();
        let id = array
            .write(
                Layout::RowMajor,
                WriteRequest::new().attribute("a", WriteBuffer::fixed(i32_bytes(&values))),
            )
            .unwrap();
        assert_eq!(id, 1);
        assert_eq!(array.fragment_count(), 1);

        let request = ReadRequest::new(Subarray::new(vec![(1, 4), (1, 4)]), Layout::RowMajor)
            .attribute("a", BufferCapacities::values_only(64));
        let result = array.read(request).unwrap();
        assert!(result.status.is_completed());
        assert_eq!(i32_result(&result, "a"), values);

        // Reopen from disk and read again.
        drop(array);
        let array = Array::open(DirectoryStorage::open(dir.path()).unwrap()).unwrap();
        assert_eq!(array.fragment_count(), 1);
        let request = ReadRequest::new(Subarray::new(vec![(1, 4), (1, 4)]), Layout::RowMajor)
            .attribute("a", BufferCapacities::values_only(64));
        let result = array.read(request).unwrap();
        assert_eq!(i32_result(&result, "a"), values);
        // The next write continues the timestamp sequence.
        let id = array
            .write(
                Layout::RowMajor,
                WriteRequest::new()
                    .attribute("a", WriteBuffer::fixed(i32_bytes(&[9])))
                    .subarray(vec![(1, 1), (1, 1)]),
            )
            .unwrap();
        assert_eq!(id, 2);
    }

    #[test]
    fn test_failed_write_leaves_array_unchanged() {
        let dir = TempDir::new().unwrap();
        let array = Array::create(
            DirectoryStorage::create(dir.path()).unwrap(),
            dense_schema(),
        )
        .unwrap();
        // Wrong buffer size: rejected before anything is staged.
        let err = array
            .write(
                Layout::RowMajor,
                WriteRequest::new().attribute("a", WriteBuffer::fixed(i32_bytes(&[1, 2]))),
            )
            .unwrap_err();
        assert!(matches!(err, ArrayError::SchemaMismatch(_)));
        assert_eq!(array.fragment_count(), 0);
        // The failed write consumed a timestamp but left no fragment; the
        // next write still succeeds.
        let values: Vec<i32> = (0..16).collect();
        array
            .write(
                Layout::RowMajor,
                WriteRequest::new().attribute("a", WriteBuffer::fixed(i32_bytes(&values))),
            )
            .unwrap();
        assert_eq!(array.fragment_count(), 1);
    }

    #[test]
    fn test_estimate_then_read_with_estimated_capacity() {
        let dir = TempDir::new().unwrap();
        let array = Array::create(
            DirectoryStorage::create(dir.path()).unwrap(),
            dense_schema(),
        )
        .unwrap();
        let values: Vec<i32> = (0..16).collect();
        array
            .write(
                Layout::RowMajor,
                WriteRequest::new().attribute("a", WriteBuffer::fixed(i32_bytes(&values))),
            )
            .unwrap();

        let subarray = Subarray::new(vec![(1, 4), (1, 4)]);
        let estimate = array
            .estimate_read_buffer_sizes(&subarray, &["a".to_string()])
            .unwrap();
        let caps = estimate.attribute("a").unwrap();
        let request = ReadRequest::new(subarray, Layout::RowMajor)
            .attribute("a", BufferCapacities::values_only(caps.values_bytes));
        let result = array.read(request).unwrap();
        assert!(result.status.is_completed());
        assert_eq!(result.cells, 16);
    }
}
