use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use telescan_core::Bitmap;

fn append_throughput(c: &mut Criterion) {
	let mut group = c.benchmark_group("bitmap_append");
	for size in [1_000u64, 100_000, 1_000_000] {
		group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
			b.iter(|| {
				let mut bitmap = Bitmap::new();
				for id in 0..size {
					bitmap.append(id % 7 == 0, 1);
				}
				black_box(bitmap)
			});
		});
	}
	group.finish();
}

fn and_throughput(c: &mut Criterion) {
	let mut group = c.benchmark_group("bitmap_and");
	for size in [1_000u64, 100_000, 1_000_000] {
		let mut a = Bitmap::new();
		let mut b = Bitmap::new();
		for id in 0..size {
			a.append(id % 3 == 0, 1);
			b.append(id % 5 == 0, 1);
		}
		group.bench_with_input(BenchmarkId::from_parameter(size), &(a, b), |bench, (a, b)| {
			bench.iter(|| black_box(a.and(b)));
		});
	}
	group.finish();
}

criterion_group!(benches, append_throughput, and_throughput);
criterion_main!(benches);
