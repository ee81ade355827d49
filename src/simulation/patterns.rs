//! Classic Game of Life seed patterns

use super::grid::Dimensions;

const GLIDER: &[(u32, u32)] = &[(1, 0), (2, 1), (0, 2), (1, 2), (2, 2)];
const BLINKER: &[(u32, u32)] = &[(0, 0), (1, 0), (2, 0)];
const BLOCK: &[(u32, u32)] = &[(0, 0), (1, 0), (0, 1), (1, 1)];
const GOSPER_GUN: &[(u32, u32)] = &[
    (24, 0),
    (22, 1),
    (24, 1),
    (12, 2),
    (13, 2),
    (20, 2),
    (21, 2),
    (34, 2),
    (35, 2),
    (11, 3),
    (15, 3),
    (20, 3),
    (21, 3),
    (34, 3),
    (35, 3),
    (0, 4),
    (1, 4),
    (10, 4),
    (16, 4),
    (20, 4),
    (21, 4),
    (0, 5),
    (1, 5),
    (10, 5),
    (14, 5),
    (16, 5),
    (17, 5),
    (22, 5),
    (24, 5),
    (10, 6),
    (16, 6),
    (24, 6),
    (11, 7),
    (15, 7),
    (12, 8),
    (13, 8),
];

/// Initial generation written into buffer A.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum LifePattern {
    /// Every cell independently alive with the configured probability.
    #[default]
    Random,
    Glider,
    /// Horizontal period-2 oscillator.
    Blinker,
    /// 2x2 still life.
    Block,
    GosperGun,
    Empty,
}

impl LifePattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifePattern::Random => "Random",
            LifePattern::Glider => "Glider",
            LifePattern::Blinker => "Blinker",
            LifePattern::Block => "Block",
            LifePattern::GosperGun => "Gosper Gun",
            LifePattern::Empty => "Empty",
        }
    }

    /// Live cells of the pattern relative to its top-left corner. Empty for
    /// [`LifePattern::Random`], which has no fixed shape.
    pub fn offsets(&self) -> &'static [(u32, u32)] {
        match self {
            LifePattern::Random | LifePattern::Empty => &[],
            LifePattern::Glider => GLIDER,
            LifePattern::Blinker => BLINKER,
            LifePattern::Block => BLOCK,
            LifePattern::GosperGun => GOSPER_GUN,
        }
    }

    /// Width and height of the pattern's bounding box.
    pub fn extent(&self) -> (u32, u32) {
        self.offsets()
            .iter()
            .fold((0, 0), |(w, h), &(x, y)| (w.max(x + 1), h.max(y + 1)))
    }

    /// Render the pattern into a dead grid with its top-left corner at
    /// `origin`. Cells past an edge wrap around.
    pub fn stamp(&self, dims: Dimensions, origin: (u32, u32)) -> Vec<u32> {
        let mut cells = vec![0u32; dims.cell_count()];
        for &(dx, dy) in self.offsets() {
            let x = ((u64::from(origin.0) + u64::from(dx)) % u64::from(dims.width)) as u32;
            let y = ((u64::from(origin.1) + u64::from(dy)) % u64::from(dims.height)) as u32;
            cells[dims.index(x, y)] = 1;
        }
        cells
    }

    /// Render the pattern centered on the grid.
    pub fn stamp_centered(&self, dims: Dimensions) -> Vec<u32> {
        let (w, h) = self.extent();
        let origin = (
            (dims.width / 2).saturating_sub(w / 2),
            (dims.height / 2).saturating_sub(h / 2),
        );
        self.stamp(dims, origin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_sizes() {
        assert_eq!(LifePattern::Glider.offsets().len(), 5);
        assert_eq!(LifePattern::Glider.extent(), (3, 3));
        assert_eq!(LifePattern::Block.extent(), (2, 2));
        assert_eq!(LifePattern::Blinker.extent(), (3, 1));
        assert_eq!(LifePattern::GosperGun.offsets().len(), 36);
        assert_eq!(LifePattern::GosperGun.extent(), (36, 9));
        assert_eq!(LifePattern::Random.extent(), (0, 0));
    }

    #[test]
    fn test_stamp_wraps_at_edges() {
        let dims = Dimensions::new(4, 4).unwrap();
        let cells = LifePattern::Block.stamp(dims, (3, 3));
        let live: Vec<usize> = (0..cells.len()).filter(|&i| cells[i] == 1).collect();
        assert_eq!(
            live,
            vec![dims.index(0, 0), dims.index(3, 0), dims.index(0, 3), dims.index(3, 3)]
        );
    }

    #[test]
    fn test_stamp_centered() {
        let dims = Dimensions::new(10, 10).unwrap();
        let cells = LifePattern::Blinker.stamp_centered(dims);
        assert_eq!(cells.iter().sum::<u32>(), 3);
        for x in 4..7 {
            assert_eq!(cells[dims.index(x, 5)], 1);
        }
        assert_eq!(LifePattern::Empty.stamp_centered(dims).iter().sum::<u32>(), 0);
    }
}
