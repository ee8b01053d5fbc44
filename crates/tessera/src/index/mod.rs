//! Fragment metadata index: the timestamp-ordered fragment catalog.
//!
//! The live fragment list is a copy-on-write [`FragmentSet`] behind an
//! atomically swapped version handle. Readers pin the set in effect at
//! query start by cloning its `Arc` and keep using it for their whole
//! lifetime, unaffected by concurrent links or replacements. Structural
//! changes (linking a fragment, replacing a consolidated run) build a new
//! list and swap it in under a short write lock; fragment contents are
//! never mutated in place.
//!
//! Replaced fragments move to a retire queue and their directories are
//! only deleted once no outstanding snapshot references them.

use crate::error::{ArrayError, Result};
use crate::fragment::{Fragment, NonEmptyDomain, Timestamp, TimestampRange};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Catalog entry for one live fragment.
#[derive(Debug)]
pub struct FragmentDescriptor {
    /// Fragment directory name.
    pub name: String,
    /// Logical time the fragment covers.
    pub timestamps: TimestampRange,
    /// Tight bounding coordinate range of the fragment's data.
    pub non_empty_domain: NonEmptyDomain,
    /// Total cell count.
    pub cell_count: u64,
    /// On-disk size of the fragment blob in bytes.
    pub size_bytes: u64,
    /// The loaded, sealed fragment data.
    pub fragment: Arc<Fragment>,
}

impl FragmentDescriptor {
    /// Builds a descriptor from a loaded fragment.
    pub fn new(fragment: Fragment, size_bytes: u64) -> Self {
        Self {
            name: fragment.name(),
            timestamps: fragment.timestamps,
            non_empty_domain: fragment.non_empty_domain.clone(),
            cell_count: fragment.cell_count,
            size_bytes,
            fragment: Arc::new(fragment),
        }
    }
}

/// One immutable version of the fragment list, ascending by timestamp.
#[derive(Debug, Default)]
pub struct FragmentSet {
    version: u64,
    fragments: Vec<Arc<FragmentDescriptor>>,
}

impl FragmentSet {
    /// Monotonic version number of this list.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// The fragments in ascending timestamp order.
    pub fn fragments(&self) -> &[Arc<FragmentDescriptor>] {
        &self.fragments
    }

    /// Number of live fragments.
    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    /// Returns true if no fragments are live.
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Greatest timestamp any live fragment covers, or 0 for an empty list.
    pub fn max_timestamp(&self) -> Timestamp {
        self.fragments.last().map(|f| f.timestamps.hi).unwrap_or(0)
    }

    /// Fragments whose non-empty domain intersects `ranges`, in timestamp
    /// order.
    ///
    /// Pruning only: false positives are acceptable, false negatives are
    /// not — correctness of a merge never depends on this filter being
    /// tight.
    pub fn fragments_overlapping(&self, ranges: &[(i64, i64)]) -> Vec<Arc<FragmentDescriptor>> {
        self.fragments
            .iter()
            .filter(|f| f.non_empty_domain.intersects(ranges))
            .cloned()
            .collect()
    }

    /// Union of the live fragments' non-empty domains.
    pub fn non_empty_domain(&self) -> Option<NonEmptyDomain> {
        let mut iter = self.fragments.iter();
        let mut union = iter.next()?.non_empty_domain.clone();
        for f in iter {
            union.expand_domain(&f.non_empty_domain);
        }
        Some(union)
    }
}

#[derive(Debug, Default)]
struct IndexState {
    current: Arc<FragmentSet>,
    retired: Vec<Arc<FragmentDescriptor>>,
}

/// The mutable handle owning the fragment list versions of one array.
#[derive(Debug)]
pub struct FragmentIndex {
    inner: RwLock<IndexState>,
    next_timestamp: AtomicU64,
}

impl FragmentIndex {
    /// Creates an index over already-loaded fragments.
    ///
    /// Fragments are sorted by timestamp; the next write timestamp resumes
    /// after the greatest one observed.
    pub fn new(mut fragments: Vec<Arc<FragmentDescriptor>>) -> Self {
        fragments.sort_by_key(|f| (f.timestamps.hi, f.timestamps.lo));
        let max = fragments.last().map(|f| f.timestamps.hi).unwrap_or(0);
        Self {
            inner: RwLock::new(IndexState {
                current: Arc::new(FragmentSet {
                    version: 0,
                    fragments,
                }),
                retired: Vec::new(),
            }),
            next_timestamp: AtomicU64::new(max + 1),
        }
    }

    /// Allocates the next write timestamp.
    pub fn allocate_timestamp(&self) -> Timestamp {
        self.next_timestamp.fetch_add(1, Ordering::SeqCst)
    }

    /// Pins the current fragment list version.
    pub fn snapshot(&self) -> Arc<FragmentSet> {
        let state = self.inner.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&state.current)
    }

    /// Links a newly published fragment into a fresh list version.
    ///
    /// # Errors
    ///
    /// Returns `ConsolidationConflict` if a live fragment already covers
    /// the new fragment's timestamp.
    pub fn link(&self, descriptor: Arc<FragmentDescriptor>) -> Result<()> {
        let mut state = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if let Some(clash) = state
            .current
            .fragments
            .iter()
            .find(|f| f.timestamps.overlaps(descriptor.timestamps))
        {
            return Err(ArrayError::ConsolidationConflict {
                timestamp: clash.timestamps.hi,
            });
        }
        let mut fragments = state.current.fragments.clone();
        let at = fragments
            .partition_point(|f| (f.timestamps.hi, f.timestamps.lo) < (descriptor.timestamps.hi, descriptor.timestamps.lo));
        fragments.insert(at, descriptor);
        state.current = Arc::new(FragmentSet {
            version: state.current.version + 1,
            fragments,
        });
        Ok(())
    }

    /// Atomically replaces a contiguous timestamp run with its consolidated
    /// fragment.
    ///
    /// The consolidated descriptor's timestamp range must equal the span of
    /// the run. The replaced fragments move to the retire queue.
    ///
    /// # Errors
    ///
    /// Returns `ConsolidationConflict` if a run member is no longer live or
    /// a fragment outside the run interleaves the consolidated span.
    pub fn replace(
        &self,
        run: &[Arc<FragmentDescriptor>],
        consolidated: Arc<FragmentDescriptor>,
    ) -> Result<()> {
        let mut state = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let current = &state.current.fragments;

        let mut positions = Vec::with_capacity(run.len());
        for member in run {
            match current.iter().position(|f| f.name == member.name) {
                Some(pos) => positions.push(pos),
                None => {
                    return Err(ArrayError::ConsolidationConflict {
                        timestamp: member.timestamps.hi,
                    })
                }
            }
        }
        // The run must still be contiguous in the ordered list; a fragment
        // sitting between two members was created inside the span and makes
        // the relative ordering of the replacement undecidable.
        for pair in positions.windows(2) {
            if pair[1] != pair[0] + 1 {
                let interloper = &current[pair[0] + 1];
                return Err(ArrayError::ConsolidationConflict {
                    timestamp: interloper.timestamps.hi,
                });
            }
        }

        let first = positions[0];
        let last = positions[positions.len() - 1];
        let mut fragments = Vec::with_capacity(current.len() - run.len() + 1);
        fragments.extend_from_slice(&current[..first]);
        fragments.push(consolidated);
        fragments.extend_from_slice(&current[last + 1..]);

        let mut retired: Vec<Arc<FragmentDescriptor>> =
            current[first..=last].iter().cloned().collect();
        state.retired.append(&mut retired);
        state.current = Arc::new(FragmentSet {
            version: state.current.version + 1,
            fragments,
        });
        Ok(())
    }

    /// Drains retired fragments no outstanding snapshot references.
    ///
    /// A retired descriptor is reclaimable once the retire queue holds its
    /// only remaining reference. The caller deletes the returned fragments'
    /// directories.
    pub fn gc_retired(&self) -> Vec<Arc<FragmentDescriptor>> {
        let mut state = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let mut reclaimable = Vec::new();
        state.retired.retain(|desc| {
            if Arc::strong_count(desc) == 1 {
                // retain sees the queue's own reference; clone it out.
                reclaimable.push(Arc::clone(desc));
                false
            } else {
                true
            }
        });
        reclaimable
    }

    /// Number of retired fragments awaiting reclamation.
    pub fn retired_len(&self) -> usize {
        let state = self.inner.read().unwrap_or_else(|e| e.into_inner());
        state.retired.len()
    }
}
