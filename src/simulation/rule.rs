//! B3/S23 update rule on a torus
//!
//! These functions are the host-side definition of the rule. The
//! `life_step.wgsl` kernel implements the same contract on the GPU and the
//! headless device calls [`evolve_cell`] directly.

use super::grid::Dimensions;

/// Relative offsets of the eight Moore neighbors.
pub const NEIGHBOR_OFFSETS: [(i32, i32); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Successor of a cell given its state and live neighbor count.
#[inline]
pub const fn next_state(current: u32, live_neighbors: u32) -> u32 {
    match live_neighbors {
        2 => current,
        3 => 1,
        _ => 0,
    }
}

/// Move `coord` by `delta` along an axis of length `extent`, wrapping at both
/// ends.
#[inline]
pub fn wrap(coord: u32, delta: i32, extent: u32) -> u32 {
    debug_assert!(extent > 0);
    (i64::from(coord) + i64::from(delta)).rem_euclid(i64::from(extent)) as u32
}

/// Number of live neighbors of `(x, y)` in `cells`.
#[inline]
pub fn live_neighbors(cells: &[u32], dims: Dimensions, x: u32, y: u32) -> u32 {
    NEIGHBOR_OFFSETS
        .iter()
        .map(|&(dx, dy)| {
            let nx = wrap(x, dx, dims.width);
            let ny = wrap(y, dy, dims.height);
            cells[dims.index(nx, ny)]
        })
        .sum()
}

/// Next state of `(x, y)`, reading only from `cells`.
#[inline]
pub fn evolve_cell(cells: &[u32], dims: Dimensions, x: u32, y: u32) -> u32 {
    let current = cells[dims.index(x, y)];
    next_state(current, live_neighbors(cells, dims, x, y))
}

/// Sequential whole-grid step. Used as the reference every parallel
/// partitioning must agree with.
pub fn step_reference(read: &[u32], write: &mut [u32], dims: Dimensions) {
    assert_eq!(read.len(), dims.cell_count());
    assert_eq!(write.len(), dims.cell_count());

    for y in 0..dims.height {
        for x in 0..dims.width {
            write[dims.index(x, y)] = evolve_cell(read, dims, x, y);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims(width: u32, height: u32) -> Dimensions {
        Dimensions::new(width, height).unwrap()
    }

    #[test]
    fn test_rule_table() {
        for current in 0..=1u32 {
            for n in 0..=8u32 {
                let expected = match n {
                    0 | 1 => 0,
                    2 => current,
                    3 => 1,
                    _ => 0,
                };
                assert_eq!(
                    next_state(current, n),
                    expected,
                    "state {current} with {n} neighbors"
                );
            }
        }
    }

    #[test]
    fn test_wrap_both_directions() {
        assert_eq!(wrap(0, -1, 10), 9);
        assert_eq!(wrap(9, 1, 10), 0);
        assert_eq!(wrap(5, -1, 10), 4);
        assert_eq!(wrap(5, 1, 10), 6);
        assert_eq!(wrap(0, -1, 1), 0);
        assert_eq!(wrap(u32::MAX - 1, 1, u32::MAX), 0);
    }

    #[test]
    fn test_corner_neighbors_wrap() {
        let dims = dims(7, 5);
        let mut cells = vec![0u32; dims.cell_count()];

        cells[dims.index(6, 4)] = 1;
        assert_eq!(live_neighbors(&cells, dims, 0, 0), 1);

        cells.fill(0);
        cells[dims.index(0, 0)] = 1;
        assert_eq!(live_neighbors(&cells, dims, 6, 4), 1);
    }

    #[test]
    fn test_neighbors_exclude_self() {
        let dims = dims(5, 5);
        let mut cells = vec![0u32; dims.cell_count()];
        cells[dims.index(2, 2)] = 1;
        assert_eq!(live_neighbors(&cells, dims, 2, 2), 0);
        assert_eq!(live_neighbors(&cells, dims, 1, 1), 1);
    }

    #[test]
    fn test_full_grid_dies_of_overcrowding() {
        let dims = dims(6, 6);
        let read = vec![1u32; dims.cell_count()];
        let mut write = vec![7u32; dims.cell_count()];
        step_reference(&read, &mut write, dims);
        assert!(write.iter().all(|&cell| cell == 0));
    }

    #[test]
    fn test_blinker_flips() {
        let dims = dims(5, 5);
        let mut read = vec![0u32; dims.cell_count()];
        for x in 1..4 {
            read[dims.index(x, 2)] = 1;
        }
        let mut write = vec![0u32; dims.cell_count()];
        step_reference(&read, &mut write, dims);

        let live: Vec<(u32, u32)> = (0..dims.cell_count())
            .filter(|&i| write[i] == 1)
            .map(|i| dims.coords(i))
            .collect();
        assert_eq!(live, vec![(2, 1), (2, 2), (2, 3)]);
    }
}
