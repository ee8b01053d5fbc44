//! Benchmarks for the Tessera merge and consolidation paths.
//!
//! Run with: cargo bench --package tessera
//!
//! ## Benchmark Categories
//!
//! - **Dense merge**: overlapping-fragment reads at varying overlap depth
//! - **Sparse merge**: coordinate-keyed fold with collisions
//! - **Consolidation**: end-to-end run replacement

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tempfile::TempDir;
use tessera::fragment::{WriteBuffer, WriteRequest};
use tessera::read::{BufferCapacities, ReadRequest};
use tessera::storage::DirectoryStorage;
use tessera::{
    Array, ArrayKind, ArraySchema, Attribute, ConsolidationPolicy, Datatype, Dimension, Layout,
    OwnedBuffer, Subarray,
};

const SIDE: i64 = 64;

fn dense_schema() -> ArraySchema {
    let domain = tessera::schema::Domain::new(vec![
        Dimension::new("rows", (0, SIDE - 1), 16).unwrap(),
        Dimension::new("cols", (0, SIDE - 1), 16).unwrap(),
    ])
    .unwrap();
    ArraySchema::new(
        ArrayKind::Dense,
        domain,
        vec![Attribute::new("a", Datatype::Int64)],
    )
    .unwrap()
}

fn sparse_schema() -> ArraySchema {
    let domain = tessera::schema::Domain::new(vec![
        Dimension::new("rows", (0, SIDE - 1), 16).unwrap(),
        Dimension::new("cols", (0, SIDE - 1), 16).unwrap(),
    ])
    .unwrap();
    ArraySchema::new(
        ArrayKind::Sparse,
        domain,
        vec![Attribute::new("a", Datatype::Int64)],
    )
    .unwrap()
}

fn i64_bytes(values: &[i64]) -> OwnedBuffer {
    let mut buf = OwnedBuffer::new();
    for v in values {
        buf.extend_from_slice(&v.to_le_bytes()).unwrap();
    }
    buf
}

/// Builds a dense array with one full-grid write plus `overwrites`
/// quarter-grid overwrites.
fn dense_array(dir: &TempDir, overwrites: usize) -> Array {
    let array = Array::create(DirectoryStorage::create(dir.path()).unwrap(), dense_schema())
        .unwrap();
    let full: Vec<i64> = (0..SIDE * SIDE).collect();
    array
        .write(
            Layout::RowMajor,
            WriteRequest::new().attribute("a", WriteBuffer::fixed(i64_bytes(&full))),
        )
        .unwrap();
    let quarter: Vec<i64> = (0..(SIDE / 2) * (SIDE / 2)).collect();
    for _ in 0..overwrites {
        array
            .write(
                Layout::RowMajor,
                WriteRequest::new()
                    .attribute("a", WriteBuffer::fixed(i64_bytes(&quarter)))
                    .subarray(vec![(0, SIDE / 2 - 1), (0, SIDE / 2 - 1)]),
            )
            .unwrap();
    }
    array
}

fn full_read(array: &Array) -> u64 {
    let request = ReadRequest::new(
        Subarray::new(vec![(0, SIDE - 1), (0, SIDE - 1)]),
        Layout::RowMajor,
    )
    .attribute(
        "a",
        BufferCapacities::values_only((SIDE * SIDE * 8) as u64),
    );
    array.read(request).unwrap().cells
}

fn bench_dense_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("dense_merge_read");
    group.throughput(Throughput::Elements((SIDE * SIDE) as u64));
    for overwrites in [1usize, 4, 8] {
        let dir = TempDir::new().unwrap();
        let array = dense_array(&dir, overwrites);
        group.bench_with_input(
            BenchmarkId::from_parameter(overwrites),
            &array,
            |b, array| b.iter(|| black_box(full_read(array))),
        );
    }
    group.finish();
}

fn bench_sparse_merge(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let array = Array::create(DirectoryStorage::create(dir.path()).unwrap(), sparse_schema())
        .unwrap();
    // Four fragments with heavily colliding coordinates.
    for round in 0..4i64 {
        let mut coords = Vec::new();
        let mut values = Vec::new();
        for i in 0..SIDE {
            for j in 0..SIDE / 2 {
                coords.push(i);
                coords.push((j * 2 + round % 2) % SIDE);
                values.push(round * 10_000 + i * SIDE + j);
            }
        }
        array
            .write(
                Layout::Unordered,
                WriteRequest::new()
                    .attribute("a", WriteBuffer::fixed(i64_bytes(&values)))
                    .coords(coords),
            )
            .unwrap();
    }

    c.bench_function("sparse_merge_read_4_fragments", |b| {
        b.iter(|| {
            let request = ReadRequest::new(
                Subarray::new(vec![(0, SIDE - 1), (0, SIDE - 1)]),
                Layout::GlobalOrder,
            )
            .attribute(
                "a",
                BufferCapacities::values_only((SIDE * SIDE * 8) as u64),
            );
            black_box(array.read(request).unwrap().cells)
        })
    });
}

fn bench_consolidation(c: &mut Criterion) {
    c.bench_function("consolidate_8_dense_fragments", |b| {
        b.iter_batched(
            || {
                let dir = TempDir::new().unwrap();
                let array = dense_array(&dir, 7);
                (dir, array)
            },
            |(_dir, array)| {
                let stats = array.consolidate(&ConsolidationPolicy::default()).unwrap();
                black_box(stats.cells_written)
            },
            criterion::BatchSize::PerIteration,
        )
    });
}

criterion_group!(
    benches,
    bench_dense_merge,
    bench_sparse_merge,
    bench_consolidation
);
criterion_main!(benches);
