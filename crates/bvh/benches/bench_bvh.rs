use std::hint::black_box;
use std::time::Instant;

use glam::Vec3;
use scenecull_bvh::Bvh;
use scenecull_common::{Aabb, ObjectId};

fn make_prims(count: usize, spacing: f32) -> Vec<(ObjectId, Aabb)> {
    let side = (count as f32).sqrt().ceil() as usize;
    (0..count)
        .map(|i| {
            let p = Vec3::new((i % side) as f32 * spacing, 0.0, (i / side) as f32 * spacing);
            (ObjectId(i as u32), Aabb::new(p, p + Vec3::ONE))
        })
        .collect()
}

fn bench_build(count: usize, iterations: usize) {
    let prims = make_prims(count, 4.0);
    let mut bvh = Bvh::new();

    let start = Instant::now();
    for _ in 0..iterations {
        black_box(bvh.build(black_box(&prims)));
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    println!("  build ({count} objects, {iterations} iters): {per_iter:?}/iter, total {elapsed:?}");
}

fn bench_insert(count: usize, iterations: usize) {
    let prims = make_prims(count, 4.0);

    let start = Instant::now();
    for _ in 0..iterations {
        let mut bvh = Bvh::new();
        for (id, bbox) in &prims {
            black_box(bvh.insert(*id, black_box(bbox)));
        }
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    println!(
        "  incremental insert ({count} objects, {iterations} iters): {per_iter:?}/iter, total {elapsed:?}"
    );
}

fn bench_churn(count: usize, moved: usize, iterations: usize) {
    let prims = make_prims(count, 4.0);
    let mut bvh = Bvh::new();
    let mut leaves = bvh.build(&prims);

    let start = Instant::now();
    for frame in 0..iterations {
        // Move a sliding window of objects far enough to leave their margins.
        for k in 0..moved {
            let i = (frame * moved + k) % count;
            let (id, bbox) = prims[i];
            let offset = Vec3::new(((frame % 3) as f32 - 1.0) * 2.0, 0.0, 0.0);
            let moved_box = Aabb::new(bbox.min + offset, bbox.max + offset);
            if !bvh.fits(leaves[i], &moved_box) {
                bvh.remove(leaves[i]);
                leaves[i] = bvh.insert(id, &moved_box);
            }
        }
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    println!(
        "  churn ({count} objects, {moved} moved/frame, {iterations} frames): {per_iter:?}/frame, total {elapsed:?}"
    );
}

fn main() {
    println!("=== BVH Benchmarks ===\n");

    println!("SAH build:");
    bench_build(100, 1000);
    bench_build(1000, 100);
    bench_build(10000, 10);

    println!("\nIncremental insert:");
    bench_insert(100, 1000);
    bench_insert(1000, 100);
    bench_insert(10000, 5);

    println!("\nRemove + reinsert churn:");
    bench_churn(1000, 10, 1000);
    bench_churn(10000, 100, 100);

    println!("\n=== Done ===");
}
