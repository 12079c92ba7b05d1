//! Benchmarks for the per-frame publish path
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use depthcast::device::StreamKind;
use depthcast::protocol::Message;
use depthcast::publisher::{depth_to_rgba, rgb_to_rgba};

const RESOLUTIONS: [(usize, usize); 2] = [(320, 240), (640, 480)];

fn bench_transforms(c: &mut Criterion) {
    let mut group = c.benchmark_group("transform");

    for (width, height) in RESOLUTIONS {
        let pixels = width * height;
        group.throughput(Throughput::Elements(pixels as u64));

        let depth: Vec<u16> = (0..pixels).map(|i| (i % 2048) as u16).collect();
        let mut rgba = vec![0u8; pixels * 4];
        group.bench_function(format!("depth_{}x{}", width, height), |b| {
            b.iter(|| depth_to_rgba(black_box(&depth), &mut rgba))
        });

        let rgb: Vec<u8> = (0..pixels * 3).map(|i| i as u8).collect();
        group.bench_function(format!("video_{}x{}", width, height), |b| {
            b.iter(|| rgb_to_rgba(black_box(&rgb), &mut rgba))
        });
    }

    group.finish();
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    for (width, height) in RESOLUTIONS {
        let rgba = vec![128u8; width * height * 4];
        let mut wire = Vec::new();
        group.throughput(Throughput::Bytes(rgba.len() as u64));

        group.bench_function(format!("device_data_{}x{}", width, height), |b| {
            b.iter(|| {
                Message::device_data(StreamKind::Video, black_box(rgba.as_slice()))
                    .encode_into(&mut wire)
                    .unwrap()
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_transforms, bench_encode);
criterion_main!(benches);
