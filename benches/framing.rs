//! Benchmarks for the frame codec hot paths.
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use wsframe::protocol::{apply_mask, header, OpCode};

fn bench_masking(c: &mut Criterion) {
    let mut group = c.benchmark_group("masking");
    let key = [0x37, 0xfa, 0x21, 0x3d];

    for size in [64usize, 1024, 65536] {
        let mut data = vec![0xabu8; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("aligned_{size}"), |b| {
            b.iter(|| apply_mask(black_box(&mut data), key, 0))
        });
        group.bench_function(format!("offset3_{size}"), |b| {
            b.iter(|| apply_mask(black_box(&mut data), key, 3))
        });
    }
    group.finish();
}

fn bench_header_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("header_parse");

    let small = [0x81u8, 0x05, 0, 0, 0, 0, 0];
    let masked = [0x81u8, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0, 0, 0, 0, 0];
    let mut large = vec![0x82u8, 0x7f];
    large.extend_from_slice(&70000u64.to_be_bytes());

    group.bench_function("small_unmasked", |b| {
        b.iter(|| {
            let (bits, i) = header::parse_header(black_box(&small), 0).unwrap();
            header::parse_length(bits, &small, i).unwrap()
        })
    });
    group.bench_function("small_masked", |b| {
        b.iter(|| {
            let (bits, i) = header::parse_header(black_box(&masked), 0).unwrap();
            let (_, i) = header::parse_length(bits, &masked, i).unwrap().unwrap();
            let mut key = [0u8; 4];
            header::read_mask(&masked, i, &mut key)
        })
    });
    group.bench_function("len64", |b| {
        b.iter(|| {
            let (bits, i) = header::parse_header(black_box(&large), 0).unwrap();
            header::parse_length(bits, &large, i).unwrap()
        })
    });
    group.finish();
}

fn bench_header_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("header_encode");
    let mut out = Vec::with_capacity(16);

    for (name, len) in [("len7", 100usize), ("len16", 2000), ("len64", 70000)] {
        group.bench_function(name, |b| {
            b.iter(|| {
                out.clear();
                header::encode_header(OpCode::Binary, true, None, black_box(len), &mut out)
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_masking, bench_header_parse, bench_header_encode);
criterion_main!(benches);
