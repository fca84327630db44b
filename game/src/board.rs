//! Grid and scoring collaborators.
//!
//! The progression core only talks to the board through [`Grid`] and [`LineScorer`]. `BlockGrid`
//! is the reference board: shapes drop anywhere they fit, and full rows and full columns clear
//! together.

use serde::{Deserialize, Serialize};

pub const GRID_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Vec2i {
    pub x: i32,
    pub y: i32,
}

impl Vec2i {
    pub const ZERO: Vec2i = Vec2i { x: 0, y: 0 };

    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// `None` on overflow.
    pub fn checked_add(self, rhs: Vec2i) -> Option<Vec2i> {
        Some(Vec2i::new(self.x.checked_add(rhs.x)?, self.y.checked_add(rhs.y)?))
    }
}

/// A polyomino given as cell offsets from its anchor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Shape {
    pub cells: Vec<Vec2i>,
}

impl Shape {
    pub fn new(cells: Vec<Vec2i>) -> Self {
        Self { cells }
    }

    pub fn single() -> Self {
        Self::new(vec![Vec2i::ZERO])
    }

    pub fn bar(len: i32) -> Self {
        Self::new((0..len.max(1)).map(|x| Vec2i::new(x, 0)).collect())
    }

    pub fn square(side: i32) -> Self {
        let side = side.max(1);
        Self::new(
            (0..side)
                .flat_map(|y| (0..side).map(move |x| Vec2i::new(x, y)))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Axis-aligned block of cells, inclusive on both corners.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Region {
    pub min: Vec2i,
    pub max: Vec2i,
}

impl Region {
    pub const fn new(min: Vec2i, max: Vec2i) -> Self {
        Self { min, max }
    }

    pub fn cells(self) -> impl Iterator<Item = Vec2i> {
        (self.min.y..=self.max.y)
            .flat_map(move |y| (self.min.x..=self.max.x).map(move |x| Vec2i::new(x, y)))
    }

    /// Every cell occupied. Cells off the board count as empty; an inverted region is never full.
    pub fn is_filled(self, grid: &impl Grid) -> bool {
        if self.min.x > self.max.x || self.min.y > self.max.y {
            return false;
        }
        self.cells().all(|c| {
            c.x >= 0 && c.y >= 0 && grid.is_cell_filled(c.x as usize, c.y as usize)
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", content = "index", rename_all = "camelCase")]
pub enum Line {
    Row(usize),
    Column(usize),
}

impl Line {
    pub fn is_column(self) -> bool {
        matches!(self, Line::Column(_))
    }
}

/// Cell queries and line clearing exposed by the board.
pub trait Grid {
    fn is_cell_filled(&self, x: usize, y: usize) -> bool;

    /// Whether `shape` fits somewhere on the board right now.
    fn can_place_shape(&self, shape: &Shape) -> bool;

    /// Clear every full row and column and report what was cleared.
    fn check_and_clear_lines(&mut self) -> Vec<Line>;

    fn total_lines_cleared(&self) -> u32;
}

/// Points awarded for one placement's cleared lines.
pub trait LineScorer {
    fn points_for(&self, lines: &[Line], combo: u32) -> u32;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StandardScorer;

pub const COMBO_BONUS_PER_STEP: u32 = 50;

impl LineScorer for StandardScorer {
    fn points_for(&self, lines: &[Line], combo: u32) -> u32 {
        if lines.is_empty() {
            return 0;
        }
        let base = line_clear_points(lines.len() as u32);
        let combo_bonus = combo.saturating_sub(1).saturating_mul(COMBO_BONUS_PER_STEP);
        base.saturating_add(combo_bonus)
    }
}

fn line_clear_points(lines: u32) -> u32 {
    // 1/2/3/4 lines: 100/300/500/800; beyond that, groups of four plus the remainder.
    let quads = lines / 4;
    let rem_points = match lines % 4 {
        0 => 0,
        1 => 100,
        2 => 300,
        _ => 500,
    };
    quads.saturating_mul(800).saturating_add(rem_points)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockGrid {
    width: usize,
    height: usize,
    cells: Vec<Vec<u8>>,
    lines_cleared: u32,
}

impl Default for BlockGrid {
    fn default() -> Self {
        Self::new(GRID_SIZE, GRID_SIZE)
    }
}

impl BlockGrid {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![vec![0; width]; height],
            lines_cleared: 0,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn set_cell(&mut self, x: usize, y: usize, value: u8) {
        if let Some(cell) = self.cells.get_mut(y).and_then(|row| row.get_mut(x)) {
            *cell = value;
        }
    }

    /// Board coordinates of `origin + rel`, or `None` when that lands off the board.
    fn cell_at(&self, origin: Vec2i, rel: Vec2i) -> Option<(usize, usize)> {
        let p = origin.checked_add(rel)?;
        let x = usize::try_from(p.x).ok()?;
        let y = usize::try_from(p.y).ok()?;
        (x < self.width && y < self.height).then_some((x, y))
    }

    pub fn fits_at(&self, shape: &Shape, origin: Vec2i) -> bool {
        !shape.is_empty()
            && shape.cells.iter().all(|&rel| {
                self.cell_at(origin, rel)
                    .is_some_and(|(x, y)| self.cells[y][x] == 0)
            })
    }

    /// Stamp `shape` at `origin`. Returns false (and leaves the board untouched) if it doesn't fit.
    pub fn place_shape(&mut self, shape: &Shape, origin: Vec2i, color: u8) -> bool {
        if !self.fits_at(shape, origin) {
            return false;
        }
        let color = color.max(1);
        for &rel in &shape.cells {
            if let Some((x, y)) = self.cell_at(origin, rel) {
                self.cells[y][x] = color;
            }
        }
        true
    }

    fn detect_full_lines(&self) -> Vec<Line> {
        let rows = (0..self.height)
            .filter(|&y| self.cells[y].iter().all(|&c| c != 0))
            .map(Line::Row);
        let cols = (0..self.width)
            .filter(|&x| self.cells.iter().all(|row| row[x] != 0))
            .map(Line::Column);
        rows.chain(cols).collect()
    }
}

impl Grid for BlockGrid {
    fn is_cell_filled(&self, x: usize, y: usize) -> bool {
        self.cells
            .get(y)
            .and_then(|row| row.get(x))
            .is_some_and(|&c| c != 0)
    }

    fn can_place_shape(&self, shape: &Shape) -> bool {
        (0..self.height as i32)
            .any(|y| (0..self.width as i32).any(|x| self.fits_at(shape, Vec2i::new(x, y))))
    }

    fn check_and_clear_lines(&mut self) -> Vec<Line> {
        // Detect everything first so a cell shared by a row and a column counts for both.
        let lines = self.detect_full_lines();
        for line in &lines {
            match *line {
                Line::Row(y) => self.cells[y].iter_mut().for_each(|c| *c = 0),
                Line::Column(x) => self.cells.iter_mut().for_each(|row| row[x] = 0),
            }
        }
        self.lines_cleared = self.lines_cleared.saturating_add(lines.len() as u32);
        lines
    }

    fn total_lines_cleared(&self) -> u32 {
        self.lines_cleared
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placement_rejects_overlap_and_out_of_bounds() {
        let mut grid = BlockGrid::new(4, 4);
        assert!(grid.place_shape(&Shape::square(2), Vec2i::new(0, 0), 1));
        assert!(!grid.place_shape(&Shape::single(), Vec2i::new(1, 1), 1));
        assert!(!grid.place_shape(&Shape::bar(3), Vec2i::new(2, 3), 1));
        assert!(grid.is_cell_filled(1, 1));
        assert!(!grid.is_cell_filled(2, 3));
        assert!(!grid.is_cell_filled(99, 99));
    }

    #[test]
    fn placement_far_off_the_board_does_not_overflow() {
        let mut grid = BlockGrid::new(4, 4);
        assert!(!grid.place_shape(&Shape::bar(2), Vec2i::new(i32::MAX, 0), 1));
        assert!(!grid.place_shape(&Shape::square(2), Vec2i::new(0, i32::MAX), 1));
        assert!(!grid.place_shape(&Shape::single(), Vec2i::new(i32::MIN, -1), 1));
        assert!(!grid.can_place_shape(&Shape::bar(5)));
        assert_eq!(Vec2i::new(i32::MAX, 0).checked_add(Vec2i::new(1, 0)), None);
    }

    #[test]
    fn clears_rows_and_columns_in_one_pass() {
        let mut grid = BlockGrid::new(3, 3);
        for i in 0..3 {
            grid.set_cell(i, 0, 1);
            grid.set_cell(0, i, 1);
        }

        let lines = grid.check_and_clear_lines();
        assert_eq!(lines, vec![Line::Row(0), Line::Column(0)]);
        assert_eq!(grid.total_lines_cleared(), 2);
        for y in 0..3 {
            for x in 0..3 {
                assert!(!grid.is_cell_filled(x, y));
            }
        }
    }

    #[test]
    fn can_place_shape_scans_the_whole_board() {
        let mut grid = BlockGrid::new(3, 3);
        for y in 0..3 {
            for x in 0..3 {
                if (x, y) != (2, 2) {
                    grid.set_cell(x, y, 1);
                }
            }
        }
        assert!(grid.can_place_shape(&Shape::single()));
        assert!(!grid.can_place_shape(&Shape::bar(2)));
    }

    #[test]
    fn region_fill_is_inclusive_on_both_corners() {
        let mut grid = BlockGrid::new(4, 4);
        let region = Region::new(Vec2i::new(1, 1), Vec2i::new(2, 2));
        assert!(grid.place_shape(&Shape::bar(2), Vec2i::new(1, 1), 1));
        assert!(!region.is_filled(&grid));
        assert!(grid.place_shape(&Shape::bar(2), Vec2i::new(1, 2), 1));
        assert!(region.is_filled(&grid));

        let inverted = Region::new(Vec2i::new(2, 2), Vec2i::new(1, 1));
        assert!(!inverted.is_filled(&grid));
    }

    #[test]
    fn scorer_matches_line_table_and_combo_bonus() {
        let scorer = StandardScorer;
        assert_eq!(scorer.points_for(&[], 3), 0);
        assert_eq!(scorer.points_for(&[Line::Row(0)], 1), 100);
        assert_eq!(scorer.points_for(&[Line::Row(0), Line::Column(1)], 1), 300);
        assert_eq!(scorer.points_for(&[Line::Row(0)], 3), 200);
        let five = [Line::Row(0); 5];
        assert_eq!(scorer.points_for(&five, 1), 900);
    }
}
