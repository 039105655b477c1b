use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use parking_lot::RwLock;

use flowgrid::{CellRect, HeightField, SimulationEngine};

fn main() -> Result<()> {
    env_logger::init();

    println!("Flowgrid - Cellular Fluid Simulation Benchmark");
    println!("==============================================");

    let cells = 256;
    let warmup_frames = 120;
    let bench_frames = 240;

    let terrain = Arc::new(RwLock::new(HeightField::flat(cells + 1, 0.0)));
    let engine = SimulationEngine::with_initial_fluid(Arc::clone(&terrain), 1.0)?;

    println!("Configuration:");
    println!(
        "  Grid: {0}x{0} cells, {1}x{1} blocks",
        engine.cells_per_axis(),
        engine.blocks_per_axis()
    );
    println!("  Workers: {}", engine.worker_count());
    println!("  CPU cores: {}", num_cpus::get());
    println!();

    // Keep one corner disturbed so the cold run has real work everywhere.
    engine.set_source(4, 4, 6.0, 0.2);

    println!("Test 1: Cold Run (all blocks active)");
    println!("------------------------------------");
    let start = Instant::now();
    for _ in 0..warmup_frames {
        engine.start_frame();
        engine.wait_for_frame();
    }
    let cold_time = start.elapsed();
    let stats = engine.last_frame_stats();
    println!("  Time: {:.2}s", cold_time.as_secs_f32());
    println!(
        "  Frames/second: {:.2}",
        warmup_frames as f32 / cold_time.as_secs_f32()
    );
    println!(
        "  Last frame: {} full blocks, {} seam checks",
        stats.blocks_full, stats.blocks_seam
    );
    println!();

    println!("Test 2: Settled Run (dormant regions skipped)");
    println!("---------------------------------------------");
    let start = Instant::now();
    for _ in 0..bench_frames {
        engine.start_frame();
        engine.wait_for_frame();
    }
    let settled_time = start.elapsed();
    let stats = engine.last_frame_stats();
    println!("  Time: {:.2}s", settled_time.as_secs_f32());
    println!(
        "  Frames/second: {:.2}",
        bench_frames as f32 / settled_time.as_secs_f32()
    );
    println!(
        "  Last frame: {} full blocks, {} seam checks ({:.1}% skipped)",
        stats.blocks_full,
        stats.blocks_seam,
        100.0 * stats.blocks_seam as f32 / (stats.blocks_full + stats.blocks_seam).max(1) as f32
    );
    println!();

    println!("Test 3: Terrain Edit Reactivation");
    println!("---------------------------------");
    let rect = CellRect::new(cells / 2, cells / 2, cells / 2 + 32, cells / 2 + 32);
    terrain.write().raise_cells(rect, 10.0);
    engine.terrain_update(rect);
    engine.start_frame();
    let stats = engine.wait_for_frame();
    println!(
        "  Woke {} blocks, frame took {:.2}ms",
        stats.blocks_woken,
        stats.frame_time.as_secs_f64() * 1000.0
    );

    Ok(())
}
