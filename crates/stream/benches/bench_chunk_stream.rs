use std::hint::black_box;
use std::time::Instant;

use delve_kernel::Terrain;
use delve_persist::MutationLedger;
use delve_stream::{ChunkStore, StreamConfig, StreamState};

fn bench_synthesize(radius: i32, iterations: usize) {
    let terrain = Terrain::default();
    let center = terrain.center();

    let start = Instant::now();
    for _ in 0..iterations {
        for coord in center.square(radius) {
            black_box(terrain.synthesize(black_box(coord)));
        }
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    println!(
        "  synthesize (r={radius}, {iterations} iters): {per_iter:?}/iter, total {elapsed:?}"
    );
}

fn bench_load_around(radius: i32, iterations: usize) {
    let terrain = Terrain::default();
    let center = terrain.center();

    let start = Instant::now();
    for _ in 0..iterations {
        let mut chunks = ChunkStore::new(terrain.tile_size());
        let mut ledger = MutationLedger::new();
        black_box(chunks.load_around(black_box(center), radius, &terrain, &mut ledger));
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    println!(
        "  cold load_around (r={radius}, {iterations} iters): {per_iter:?}/iter, total {elapsed:?}"
    );
}

fn bench_walk(steps: usize) {
    let terrain = Terrain::default();
    let mut chunks = ChunkStore::new(terrain.tile_size());
    let mut ledger = MutationLedger::new();
    let mut stream = StreamState::new(StreamConfig::default());
    let mut viewer = terrain.center();

    let start = Instant::now();
    let mut rescans = 0;
    for _ in 0..steps {
        viewer = viewer.offset(1, 0);
        if stream
            .update(black_box(viewer), &mut chunks, &terrain, &mut ledger)
            .is_some()
        {
            rescans += 1;
        }
        chunks.drain_events();
    }
    let elapsed = start.elapsed();
    let per_step = elapsed / steps as u32;
    let resident = chunks.tile_count() + chunks.hole_count();
    println!("  walk ({steps} steps, {rescans} rescans): {per_step:?}/step, total {elapsed:?}");
    println!("  resident after walk: {resident}");
}

fn main() {
    println!("=== delve-stream benchmarks ===\n");

    println!("[Terrain synthesis]");
    bench_synthesize(20, 50);
    bench_synthesize(40, 20);

    println!("\n[Chunk load]");
    bench_load_around(20, 50);
    bench_load_around(40, 10);

    println!("\n[Streaming walk]");
    bench_walk(500);
    bench_walk(2000);

    println!("\nDone.");
}
