//! Puzzle packs and the durable per-puzzle / per-pack progress record.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::board::{BlockGrid, GRID_SIZE, Shape, Vec2i};
use crate::objectives::{AttemptOutcome, Objective};
use crate::storage::Document;

/// Move counts at or below which a win earns two or three stars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StarThresholds {
    pub two: u32,
    pub three: u32,
}

impl StarThresholds {
    pub fn rating(self, moves: u32) -> u8 {
        let mut stars = 1;
        if moves <= self.two {
            stars = 2;
        }
        if moves <= self.three {
            stars = 3;
        }
        stars
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PuzzleDef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_grid_size")]
    pub width: usize,
    #[serde(default = "default_grid_size")]
    pub height: usize,
    /// Cells occupied before the first move.
    #[serde(default)]
    pub prefilled: Vec<Vec2i>,
    pub objectives: Vec<Objective>,
    pub target_moves: u32,
    pub stars: StarThresholds,
    pub shapes: Vec<Shape>,
}

fn default_grid_size() -> usize {
    GRID_SIZE
}

impl PuzzleDef {
    pub fn build_grid(&self) -> BlockGrid {
        let mut grid = BlockGrid::new(self.width, self.height);
        for cell in &self.prefilled {
            if cell.x >= 0 && cell.y >= 0 {
                grid.set_cell(cell.x as usize, cell.y as usize, 1);
            }
        }
        grid
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackDef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub puzzles: Vec<PuzzleDef>,
}

/// Immutable, ordered pack list. Pack order is unlock order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PuzzleCatalog {
    pub version: u32,
    pub packs: Vec<PackDef>,
}

impl Default for PuzzleCatalog {
    fn default() -> Self {
        serde_json::from_str(include_str!("../assets/puzzles.json")).unwrap_or_else(|e| {
            tracing::warn!("embedded puzzle catalog is invalid, starting with no packs: {e}");
            PuzzleCatalog {
                version: 1,
                packs: Vec::new(),
            }
        })
    }
}

impl PuzzleCatalog {
    pub fn pack(&self, pack_id: &str) -> Option<&PackDef> {
        self.packs.iter().find(|p| p.id == pack_id)
    }

    pub fn next_pack(&self, pack_id: &str) -> Option<&PackDef> {
        let idx = self.packs.iter().position(|p| p.id == pack_id)?;
        self.packs.get(idx + 1)
    }

    /// The puzzle and the id of the pack holding it.
    pub fn puzzle(&self, puzzle_id: &str) -> Option<(&PackDef, &PuzzleDef)> {
        self.packs.iter().find_map(|pack| {
            pack.puzzles
                .iter()
                .find(|p| p.id == puzzle_id)
                .map(|puzzle| (pack, puzzle))
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PuzzleProgress {
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub stars: u8,
    #[serde(default)]
    pub best_score: u32,
    #[serde(default)]
    pub best_moves: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackProgress {
    #[serde(default)]
    pub unlocked: bool,
    /// Completed puzzles in the pack.
    #[serde(default)]
    pub completed: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PuzzleProgressDoc {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub packs: BTreeMap<String, PackProgress>,
    #[serde(default)]
    pub puzzles: BTreeMap<String, PuzzleProgress>,
}

impl Default for PuzzleProgressDoc {
    fn default() -> Self {
        Self {
            version: Self::VERSION,
            packs: BTreeMap::new(),
            puzzles: BTreeMap::new(),
        }
    }
}

impl Document for PuzzleProgressDoc {
    const KEY: &'static str = "puzzle_progress";
    const VERSION: u32 = 1;

    fn version(&self) -> u32 {
        self.version
    }

    fn migrate(mut self, _from: u32) -> Self {
        self.version = Self::VERSION;
        self
    }

    fn sanitized(mut self) -> Self {
        for progress in self.puzzles.values_mut() {
            progress.stars = progress.stars.min(3);
        }
        self
    }
}

/// Best results per puzzle and unlock state per pack. Stored values never regress.
#[derive(Debug, Clone, Default)]
pub struct PuzzleProgressStore {
    doc: PuzzleProgressDoc,
}

impl PuzzleProgressStore {
    pub fn new(doc: PuzzleProgressDoc) -> Self {
        Self { doc }
    }

    pub fn doc(&self) -> &PuzzleProgressDoc {
        &self.doc
    }

    pub fn puzzle(&self, puzzle_id: &str) -> PuzzleProgress {
        self.doc.puzzles.get(puzzle_id).cloned().unwrap_or_default()
    }

    pub fn pack_progress(&self, pack_id: &str) -> PackProgress {
        self.doc.packs.get(pack_id).copied().unwrap_or_default()
    }

    /// Merge a finished attempt. Failed attempts leave stored results untouched.
    pub fn record_attempt(&mut self, puzzle_id: &str, outcome: &AttemptOutcome) {
        if !outcome.won {
            return;
        }
        let entry = self.doc.puzzles.entry(puzzle_id.to_string()).or_default();
        entry.completed = true;
        entry.stars = entry.stars.max(outcome.stars.min(3));
        entry.best_score = entry.best_score.max(outcome.score);
        entry.best_moves = Some(
            entry
                .best_moves
                .map_or(outcome.moves, |best| best.min(outcome.moves)),
        );
    }

    /// Returns true if the pack went from locked to unlocked.
    pub fn unlock_pack(&mut self, pack_id: &str) -> bool {
        let entry = self.doc.packs.entry(pack_id.to_string()).or_default();
        if entry.unlocked {
            return false;
        }
        entry.unlocked = true;
        tracing::info!(pack = pack_id, "pack unlocked");
        true
    }

    pub fn ensure_first_pack_unlocked(&mut self, catalog: &PuzzleCatalog) -> bool {
        match catalog.packs.first() {
            Some(first) => self.unlock_pack(&first.id),
            None => false,
        }
    }

    /// Recount the pack's completed puzzles and, once all are done, unlock the next pack.
    /// Returns the id of a pack unlocked by this call.
    pub fn refresh_pack(&mut self, catalog: &PuzzleCatalog, pack_id: &str) -> Option<String> {
        let pack = catalog.pack(pack_id)?;
        let (done, total) = self.pack_completion(catalog, pack_id);

        let entry = self.doc.packs.entry(pack_id.to_string()).or_default();
        entry.completed = entry.completed.max(done as u32);

        if total == 0 || done < total {
            return None;
        }
        let next = catalog.next_pack(&pack.id)?;
        self.unlock_pack(&next.id).then(|| next.id.clone())
    }

    /// `(completed, total)` puzzles for the pack.
    pub fn pack_completion(&self, catalog: &PuzzleCatalog, pack_id: &str) -> (usize, usize) {
        let Some(pack) = catalog.pack(pack_id) else {
            return (0, 0);
        };
        let done = pack
            .puzzles
            .iter()
            .filter(|p| self.doc.puzzles.get(&p.id).is_some_and(|pp| pp.completed))
            .count();
        (done, pack.puzzles.len())
    }

    pub fn total_stars(&self) -> u32 {
        self.doc.puzzles.values().map(|p| u32::from(p.stars)).sum()
    }
}
