use std::hint::black_box;
use std::time::Instant;

use glam::Vec2;
use liquidgrid_common::PointerState;
use liquidgrid_field::{DisplacementField, FieldConfig, FieldSeed};

fn sweep(frame: usize) -> PointerState {
    let t = (frame % 240) as f32 / 240.0;
    PointerState {
        position: Vec2::new(t, 0.5 + 0.25 * (t * 12.0).sin()),
        velocity: Vec2::new(1.0 / 240.0, 0.01 * (t * 12.0).cos()),
    }
}

fn bench_tick(grid_size: usize, iterations: usize) {
    let config = FieldConfig {
        grid_size,
        seed: FieldSeed::Noise {
            seed: 42,
            amplitude: 125.0,
        },
        ..FieldConfig::default()
    };
    let mut field = match DisplacementField::new(config) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("skipping grid {grid_size}: {e}");
            return;
        }
    };

    let start = Instant::now();
    for frame in 0..iterations {
        field.tick(black_box(&sweep(frame)));
    }
    let elapsed = start.elapsed();
    println!(
        "tick grid={grid_size:>4} iters={iterations:>6}: total={elapsed:?} per_tick={:?}",
        elapsed / iterations as u32
    );
}

fn bench_snapshot(grid_size: usize, iterations: usize) {
    let config = FieldConfig {
        grid_size,
        ..FieldConfig::default()
    };
    let Ok(field) = DisplacementField::new(config) else {
        return;
    };

    let start = Instant::now();
    for _ in 0..iterations {
        black_box(field.read().to_rg32());
    }
    let elapsed = start.elapsed();
    println!(
        "snapshot grid={grid_size:>4} iters={iterations:>6}: total={elapsed:?} per_read={:?}",
        elapsed / iterations as u32
    );
}

fn main() {
    println!("=== Displacement Field Benchmarks ===");
    for size in [15, 64, 256] {
        bench_tick(size, 10_000);
    }
    for size in [15, 64, 256] {
        bench_snapshot(size, 10_000);
    }
}
