use torus_life::gfx::HeadlessDevice;
use torus_life::simulation::rule::step_reference;
use torus_life::simulation::{Dimensions, LifePattern, TileSize};
use torus_life::{FrameScheduler, LifeConfig};

use rand::{rngs::StdRng, Rng, SeedableRng};

fn config(width: u32, height: u32) -> LifeConfig {
    LifeConfig::default()
        .with_grid_size(width, height)
        .with_stats_interval(0)
}

fn live_set(cells: &[u32], dims: Dimensions) -> Vec<(u32, u32)> {
    let mut live: Vec<(u32, u32)> = cells
        .iter()
        .enumerate()
        .filter(|(_, &cell)| cell == 1)
        .map(|(index, _)| dims.coords(index))
        .collect();
    live.sort_unstable();
    live
}

fn scheduler_with(
    dims: Dimensions,
    cells: &[u32],
    tile: TileSize,
) -> FrameScheduler<HeadlessDevice> {
    FrameScheduler::with_cells(
        HeadlessDevice::new(),
        &config(dims.width, dims.height).with_tile_size(tile),
        cells,
    )
    .unwrap()
}

#[test]
fn glider_translates_diagonally() {
    let dims = Dimensions::new(20, 20).unwrap();
    let start = LifePattern::Glider.stamp(dims, (3, 5));
    let mut scheduler = scheduler_with(dims, &start, TileSize::square(16));

    scheduler.run(4).unwrap();

    let expected = LifePattern::Glider.stamp(dims, (4, 6));
    assert_eq!(scheduler.snapshot().unwrap(), expected);
}

#[test]
fn glider_crosses_the_seam() {
    let dims = Dimensions::new(8, 8).unwrap();
    let start = LifePattern::Glider.stamp(dims, (6, 6));
    let mut scheduler = scheduler_with(dims, &start, TileSize::square(3));

    scheduler.run(4).unwrap();
    assert_eq!(
        scheduler.snapshot().unwrap(),
        LifePattern::Glider.stamp(dims, (7, 7))
    );

    // A full lap of the torus returns the glider to where it started.
    scheduler.run(4 * 7).unwrap();
    assert_eq!(scheduler.snapshot().unwrap(), start);
}

#[test]
fn block_is_still() {
    let dims = Dimensions::new(10, 10).unwrap();
    let block = LifePattern::Block.stamp(dims, (4, 4));
    let mut scheduler = scheduler_with(dims, &block, TileSize::square(16));

    for _ in 0..10 {
        scheduler.tick().unwrap();
        assert_eq!(scheduler.snapshot().unwrap(), block);
    }
}

#[test]
fn block_across_the_corner_is_still() {
    let dims = Dimensions::new(6, 5).unwrap();
    let block = LifePattern::Block.stamp(dims, (5, 4));
    let mut scheduler = scheduler_with(dims, &block, TileSize::new(4, 2));

    scheduler.run(3).unwrap();
    assert_eq!(
        live_set(&scheduler.snapshot().unwrap(), dims),
        vec![(0, 0), (0, 4), (5, 0), (5, 4)]
    );
}

#[test]
fn blinker_has_period_two() {
    let dims = Dimensions::new(5, 5).unwrap();
    let horizontal = LifePattern::Blinker.stamp(dims, (1, 2));
    let mut scheduler = scheduler_with(dims, &horizontal, TileSize::square(16));

    scheduler.tick().unwrap();
    assert_eq!(
        live_set(&scheduler.snapshot().unwrap(), dims),
        vec![(2, 1), (2, 2), (2, 3)]
    );

    scheduler.tick().unwrap();
    assert_eq!(scheduler.snapshot().unwrap(), horizontal);
}

#[test]
fn every_cell_is_drawn_every_frame() {
    let dims = Dimensions::new(33, 17).unwrap();
    let mut scheduler = FrameScheduler::new(
        HeadlessDevice::new(),
        &config(dims.width, dims.height).with_rng_seed(3),
    )
    .unwrap();

    for _ in 0..4 {
        scheduler.tick().unwrap();
        let live = scheduler.live_cells().unwrap();
        let frame = scheduler.device().last_frame().unwrap();
        assert_eq!(frame.instances.len(), dims.cell_count());
        assert_eq!(frame.visible_instances(), live);
    }
    assert_eq!(scheduler.render_stage().instance_count() as usize, dims.cell_count());
}

#[test]
fn tiled_runs_match_sequential_reference() {
    let dims = Dimensions::new(45, 31).unwrap();
    let mut rng = StdRng::seed_from_u64(2024);
    let seed: Vec<u32> = (0..dims.cell_count())
        .map(|_| u32::from(rng.random_bool(0.4)))
        .collect();

    let generations = 12;
    let mut expected = seed.clone();
    let mut scratch = vec![0u32; dims.cell_count()];
    for _ in 0..generations {
        step_reference(&expected, &mut scratch, dims);
        std::mem::swap(&mut expected, &mut scratch);
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(num_cpus::get().max(2))
        .build()
        .unwrap();

    for tile in [
        TileSize::square(1),
        TileSize::square(7),
        TileSize::square(16),
        TileSize::new(45, 1),
        TileSize::new(3, 31),
        TileSize::square(64),
    ] {
        let mut scheduler = scheduler_with(dims, &seed, tile);
        pool.install(|| scheduler.run(generations)).unwrap();
        assert_eq!(scheduler.snapshot().unwrap(), expected, "tile {tile:?}");
    }
}

#[test]
fn seeded_runs_are_reproducible() {
    let run = || {
        let mut scheduler = FrameScheduler::new(
            HeadlessDevice::new(),
            &config(40, 40).with_rng_seed(77),
        )
        .unwrap();
        scheduler.run(6).unwrap();
        scheduler.snapshot().unwrap()
    };
    assert_eq!(run(), run());
}

#[test]
fn gosper_gun_keeps_firing() {
    let dims = Dimensions::new(64, 48).unwrap();
    let mut scheduler = FrameScheduler::new(
        HeadlessDevice::new(),
        &config(dims.width, dims.height).with_pattern(LifePattern::GosperGun),
    )
    .unwrap();
    let initial = scheduler.live_cells().unwrap();

    // Period 30; each cycle adds one five-cell glider.
    scheduler.run(30).unwrap();
    assert_eq!(scheduler.live_cells().unwrap(), initial + 5);
}
