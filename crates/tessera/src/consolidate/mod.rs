//! Consolidation: replacing a fragment run with one equivalent fragment.
//!
//! A contiguous timestamp run is merge-read over the union of its
//! non-empty domains in global order, materialized into one new fragment
//! under a staged identity, durably written, and only then atomically
//! linked into the fragment index via `replace`. Failure at any step
//! before the atomic link leaves the original run untouched; failure
//! after the link means the consolidated state is final. Constituent
//! fragments are retired, not deleted — reclamation waits until no
//! outstanding read snapshot references them.

use crate::error::{ArrayError, Result};
use crate::fragment::writer::{FragmentWriter, WriteBuffer, WriteRequest};
use crate::fragment::{file, fragment_name, Timestamp, TimestampRange};
use crate::index::{FragmentDescriptor, FragmentIndex, FragmentSet};
use crate::read::merge::MergeReader;
use crate::read::Subarray;
use crate::schema::{ArrayKind, ArraySchema, Layout};
use crate::storage::StorageBackend;
use std::sync::Arc;
use tracing::{debug, warn};

/// Default maximum number of fragments consolidated in one run.
pub const DEFAULT_MAX_FRAGMENTS: usize = 16;

/// Default number of automatic retries after a consolidation conflict.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Selects which contiguous fragment run a consolidation pass merges.
///
/// # Examples
/// ```rust,ignore
/// use tessera::consolidate::ConsolidationPolicy;
///
/// let policy = ConsolidationPolicy::default()
///     .with_max_fragments(4)
///     .with_max_total_bytes(64 * 1024 * 1024);
/// ```
#[derive(Debug, Clone)]
pub struct ConsolidationPolicy {
    /// Maximum number of fragments in the run.
    pub max_fragments: usize,
    /// Maximum aggregate on-disk size of the run in bytes.
    pub max_total_bytes: u64,
    /// Restricts the run to fragments whose timestamp range lies inside
    /// this inclusive window.
    pub time_window: Option<(Timestamp, Timestamp)>,
    /// Automatic retries after a `ConsolidationConflict` before the error
    /// surfaces to the caller.
    pub max_retries: u32,
}

impl Default for ConsolidationPolicy {
    fn default() -> Self {
        Self {
            max_fragments: DEFAULT_MAX_FRAGMENTS,
            max_total_bytes: u64::MAX,
            time_window: None,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl ConsolidationPolicy {
    /// Bounds the run by fragment count.
    pub fn with_max_fragments(mut self, max: usize) -> Self {
        self.max_fragments = max;
        self
    }

    /// Bounds the run by aggregate on-disk size.
    pub fn with_max_total_bytes(mut self, max: u64) -> Self {
        self.max_total_bytes = max;
        self
    }

    /// Restricts the run to a timestamp window.
    pub fn with_time_window(mut self, lo: Timestamp, hi: Timestamp) -> Self {
        self.time_window = Some((lo, hi));
        self
    }

    /// Sets the conflict retry bound.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Picks the run this policy would consolidate from `set`, or None if
    /// fewer than two fragments qualify.
    ///
    /// The run is the longest prefix of consecutive qualifying fragments
    /// starting at the oldest one, clipped by the count and size bounds.
    pub fn select_run(&self, set: &FragmentSet) -> Option<Vec<Arc<FragmentDescriptor>>> {
        let in_window = |f: &FragmentDescriptor| match self.time_window {
            Some((lo, hi)) => f.timestamps.lo >= lo && f.timestamps.hi <= hi,
            None => true,
        };
        let fragments = set.fragments();
        let start = fragments.iter().position(|f| in_window(f))?;
        let mut run = Vec::new();
        let mut bytes = 0u64;
        for f in &fragments[start..] {
            if !in_window(f) || run.len() >= self.max_fragments {
                break;
            }
            if bytes.saturating_add(f.size_bytes) > self.max_total_bytes && !run.is_empty() {
                break;
            }
            bytes = bytes.saturating_add(f.size_bytes);
            run.push(Arc::clone(f));
        }
        (run.len() >= 2).then_some(run)
    }
}

/// Outcome metadata of one consolidation pass.
#[derive(Debug, Clone, Default)]
pub struct ConsolidationStats {
    /// Number of fragments replaced. Zero means no run qualified and the
    /// pass was a no-op.
    pub fragments_merged: usize,
    /// Fragment cells inspected across the run.
    pub cells_read: u64,
    /// Cells in the consolidated fragment.
    pub cells_written: u64,
    /// Exact-key collisions resolved by timestamp.
    pub duplicates_resolved: u64,
    /// Size of the consolidated fragment blob in bytes.
    pub bytes_written: u64,
    /// Conflict retries performed.
    pub retries: u32,
}

/// Runs one consolidation pass against `index`, retrying a bounded number
/// of times when a concurrent structural change invalidates the selected
/// run.
pub(crate) fn run(
    schema: &ArraySchema,
    storage: &dyn StorageBackend,
    index: &FragmentIndex,
    policy: &ConsolidationPolicy,
) -> Result<ConsolidationStats> {
    let mut retries = 0u32;
    loop {
        let snapshot = index.snapshot();
        let Some(run) = policy.select_run(&snapshot) else {
            debug!("consolidation: no qualifying run, nothing to do");
            return Ok(ConsolidationStats::default());
        };
        let span = TimestampRange::span(
            run[0].timestamps.lo,
            run[run.len() - 1].timestamps.hi,
        );
        // A consolidated dense fragment materializes fill values for every
        // cell of the union box its run never wrote. If a fragment older
        // than the run holds data inside that box, those fill cells would
        // shadow it, so such a run is not consolidatable.
        if schema.kind == ArrayKind::Dense {
            let mut union = run[0].non_empty_domain.clone();
            for member in &run[1..] {
                union.expand_domain(&member.non_empty_domain);
            }
            let shadowed = snapshot
                .fragments()
                .iter()
                .filter(|f| f.timestamps.hi < run[0].timestamps.lo)
                .any(|f| f.non_empty_domain.intersects(union.ranges()));
            if shadowed {
                debug!(
                    span_lo = span.lo,
                    span_hi = span.hi,
                    "consolidation: run shadows an older fragment, skipping"
                );
                return Ok(ConsolidationStats::default());
            }
        }
        debug!(
            fragments = run.len(),
            span_lo = span.lo,
            span_hi = span.hi,
            "consolidation: merging run"
        );

        let (descriptor, stats) = materialize(schema, storage, &run, span)?;
        let fragment_dir = descriptor.name.clone();
        match index.replace(&run, descriptor) {
            Ok(()) => {
                return Ok(ConsolidationStats {
                    fragments_merged: run.len(),
                    retries,
                    ..stats
                });
            }
            Err(ArrayError::ConsolidationConflict { timestamp }) if retries < policy.max_retries => {
                // The published fragment never got linked; remove it and
                // re-plan against a fresh snapshot.
                warn!(
                    timestamp,
                    retries, "consolidation: conflicting fragment, retrying"
                );
                storage.delete_fragment(&fragment_dir)?;
                retries += 1;
            }
            Err(err) => {
                storage.delete_fragment(&fragment_dir)?;
                return Err(err);
            }
        }
    }
}

/// Merges `run` into one staged-then-published fragment. The staging
/// directory is discarded on any failure before publish.
fn materialize(
    schema: &ArraySchema,
    storage: &dyn StorageBackend,
    run: &[Arc<FragmentDescriptor>],
    span: TimestampRange,
) -> Result<(Arc<FragmentDescriptor>, ConsolidationStats)> {
    let mut union = run[0].non_empty_domain.clone();
    for member in &run[1..] {
        union.expand_domain(&member.non_empty_domain);
    }
    let subarray = Subarray::new(union.ranges().to_vec());
    let reader = MergeReader::new(schema, run.to_vec(), subarray, Layout::GlobalOrder)?;

    let mut request = WriteRequest::new();
    for (idx, attr) in schema.attributes.iter().enumerate() {
        let column = reader.column(idx)?;
        let mut buffer = WriteBuffer {
            values: column.values,
            offsets: column.offsets,
            validity: None,
        };
        if let Some(validity) = column.validity {
            buffer = buffer.with_validity(validity);
        }
        request = request.attribute(attr.name.clone(), buffer);
    }
    let writer = match schema.kind {
        ArrayKind::Sparse => {
            let coords = reader
                .coords_flat()
                .expect("sparse merge produces coordinates");
            request = request.coords(coords.to_vec());
            // Merged space tiles may legitimately exceed the write-path
            // capacity bound.
            FragmentWriter::new(schema).with_capacity_override()
        }
        ArrayKind::Dense => {
            request = request.subarray(union.ranges().to_vec());
            FragmentWriter::new(schema)
        }
    };
    let fragment = writer.build(Layout::GlobalOrder, request, span)?;

    let name = fragment_name(span);
    let staging = storage.create_staging(&format!("{name}.tmp"))?;
    let publish = (|| -> Result<u64> {
        let blob = file::encode(schema, &fragment)?;
        storage.write_blob(&staging, file::FRAGMENT_BLOB, &blob)?;
        Ok(blob.len() as u64)
    })();
    let bytes_written = match publish {
        Ok(bytes) => bytes,
        Err(err) => {
            // Best-effort rollback: the run stays untouched and valid.
            let _ = storage.discard_staging(&staging);
            return Err(err);
        }
    };
    if let Err(err) = storage.publish(&staging, &name) {
        let _ = storage.discard_staging(&staging);
        return Err(err);
    }

    let stats = ConsolidationStats {
        fragments_merged: 0,
        cells_read: reader.cells_scanned(),
        cells_written: reader.cell_count(),
        duplicates_resolved: reader.duplicates(),
        bytes_written,
        retries: 0,
    };
    Ok((Arc::new(FragmentDescriptor::new(fragment, bytes_written)), stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::{AttributeColumn, Fragment, NonEmptyDomain, TileMeta};

    fn descriptor(lo: Timestamp, hi: Timestamp, size_bytes: u64) -> Arc<FragmentDescriptor> {
        let fragment = Fragment {
            timestamps: TimestampRange::span(lo, hi),
            non_empty_domain: NonEmptyDomain::new(vec![(0, 0)]),
            cell_count: 1,
            subarray: None,
            tiles: vec![TileMeta::new(0, 1, vec![(0, 0)])],
            coords: Some(vec![0]),
            columns: vec![AttributeColumn {
                values: vec![0],
                offsets: None,
                validity: None,
            }],
            filter: None,
        };
        Arc::new(FragmentDescriptor::new(fragment, size_bytes))
    }

    fn set_of(descriptors: Vec<Arc<FragmentDescriptor>>) -> Arc<FragmentSet> {
        FragmentIndex::new(descriptors).snapshot()
    }

    #[test]
    fn test_select_run_requires_two_fragments() {
        let policy = ConsolidationPolicy::default();
        let set = set_of(vec![descriptor(1, 1, 10)]);
        assert!(policy.select_run(&set).is_none());
    }

    #[test]
    fn test_select_run_bounded_by_count() {
        let policy = ConsolidationPolicy::default().with_max_fragments(2);
        let set = set_of(vec![
            descriptor(1, 1, 10),
            descriptor(2, 2, 10),
            descriptor(3, 3, 10),
        ]);
        let run = policy.select_run(&set).unwrap();
        assert_eq!(run.len(), 2);
        assert_eq!(run[0].timestamps.lo, 1);
        assert_eq!(run[1].timestamps.hi, 2);
    }

    #[test]
    fn test_select_run_bounded_by_bytes() {
        let policy = ConsolidationPolicy::default().with_max_total_bytes(25);
        let set = set_of(vec![
            descriptor(1, 1, 10),
            descriptor(2, 2, 10),
            descriptor(3, 3, 10),
        ]);
        let run = policy.select_run(&set).unwrap();
        assert_eq!(run.len(), 2);
    }

    #[test]
    fn test_select_run_honors_time_window() {
        let policy = ConsolidationPolicy::default().with_time_window(2, 3);
        let set = set_of(vec![
            descriptor(1, 1, 10),
            descriptor(2, 2, 10),
            descriptor(3, 3, 10),
            descriptor(4, 4, 10),
        ]);
        let run = policy.select_run(&set).unwrap();
        assert_eq!(run.len(), 2);
        assert_eq!(run[0].timestamps.lo, 2);
        assert_eq!(run[1].timestamps.hi, 3);
    }
}
