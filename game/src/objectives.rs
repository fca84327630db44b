//! Puzzle objectives and the per-attempt evaluator.
//!
//! An attempt moves `Pending -> Active -> Completed | Failed`. Every evaluation pass checks every
//! objective that isn't completed yet, and a completed objective stays completed.
//!
//! Two exceptions to "check it on every pass":
//!
//! - `moves` ("finish in at most N moves") is only judged once every other objective is done.
//!   Judged any earlier it would already hold after the first placement.
//! - `perfect`, `efficiency`, `perfection` and `speed` describe how placements went, so they are
//!   not judged before the first move.
//!
//! `mastery` completes once every other objective has. Unknown or malformed objectives become
//! [`ObjectiveKind::Unknown`], never complete, and are left out of every "all complete" check so a
//! bad puzzle definition can't block progress or drop the rest of the catalog.

use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::{Deserialize, Deserializer, Serialize};

use crate::board::{Grid, LineScorer, Region, Shape};
use crate::clock::{Clock, elapsed_between};
use crate::puzzles::{PuzzleDef, StarThresholds};
use crate::records::SessionStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ObjectiveKind {
    Lines { target: u32 },
    Columns { target: u32 },
    Score { target: u32 },
    /// Finish in at most `target` moves.
    Moves { target: u32 },
    Combo { target: u32 },
    Chain { target: u32 },
    /// Percentage of moves that cleared something.
    Efficiency { target: u32 },
    /// No wasted moves at all.
    Perfect,
    Fill {
        #[serde(alias = "target")]
        region: Region,
    },
    /// Use up every shape offered by the puzzle.
    Complete,
    Powerups { target: u32 },
    /// Finish within `seconds` of the attempt starting.
    Speed {
        #[serde(alias = "target")]
        seconds: u32,
    },
    /// Same accuracy measure as `Efficiency`; kept as its own type because puzzle data uses both.
    Perfection { target: u32 },
    Mastery,
    #[serde(other)]
    Unknown,
}

impl ObjectiveKind {
    /// Judged only after every other counted objective is complete.
    pub fn waits_for_others(self) -> bool {
        matches!(self, ObjectiveKind::Moves { .. } | ObjectiveKind::Mastery)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Objective {
    #[serde(flatten)]
    pub kind: ObjectiveKind,
    pub description: String,
    pub completed: bool,
}

impl<'de> Deserialize<'de> for Objective {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Default, Deserialize)]
        #[serde(default)]
        struct Extra {
            description: String,
            completed: bool,
        }

        let raw = serde_json::Value::deserialize(deserializer)?;
        let kind = ObjectiveKind::deserialize(&raw).unwrap_or_else(|e| {
            tracing::warn!(objective = %raw, "unreadable objective, treating as unknown: {e}");
            ObjectiveKind::Unknown
        });
        let extra = Extra::deserialize(&raw).unwrap_or_default();
        Ok(Objective {
            kind,
            description: extra.description,
            completed: extra.completed,
        })
    }
}

impl Objective {
    pub fn new(kind: ObjectiveKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
            completed: false,
        }
    }

    fn counts_toward_completion(&self) -> bool {
        !matches!(self.kind, ObjectiveKind::Unknown)
    }
}

/// Counters for one attempt. Dropped with the evaluator when the attempt ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PuzzleAttemptStats {
    pub moves: u32,
    pub score: u32,
    pub start_time: DateTime<Local>,
    pub hints_used: u32,
    pub current_combo: u32,
    pub max_combo: u32,
    pub lines_cleared: u32,
    pub columns_cleared: u32,
    /// Placements that cleared two or more lines at once.
    pub chain_reactions: u32,
    /// Placements that cleared nothing.
    pub wasted_moves: u32,
    pub powerups_used: u32,
    pub shapes_used: u32,
}

impl PuzzleAttemptStats {
    fn new(start_time: DateTime<Local>) -> Self {
        Self {
            moves: 0,
            score: 0,
            start_time,
            hints_used: 0,
            current_combo: 0,
            max_combo: 0,
            lines_cleared: 0,
            columns_cleared: 0,
            chain_reactions: 0,
            wasted_moves: 0,
            powerups_used: 0,
            shapes_used: 0,
        }
    }

    /// `(moves - wasted) / moves * 100 >= target`, without rounding. False before the first move.
    fn accuracy_at_least(&self, target: u32) -> bool {
        if self.moves == 0 {
            return false;
        }
        let useful = u64::from(self.moves.saturating_sub(self.wasted_moves));
        useful * 100 >= u64::from(target) * u64::from(self.moves)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailReason {
    ExceededMoveLimit,
    NoValidMoves,
    Abandoned,
}

impl fmt::Display for FailReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailReason::ExceededMoveLimit => "exceeded move limit",
            FailReason::NoValidMoves => "no valid moves remaining",
            FailReason::Abandoned => "abandoned",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Pending,
    Active,
    Completed,
    Failed(FailReason),
}

impl AttemptState {
    pub fn is_terminal(self) -> bool {
        matches!(self, AttemptState::Completed | AttemptState::Failed(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptEvent {
    ShapePlaced { shape_index: usize },
    ShapeDiscarded { shape_index: usize },
    HintUsed,
    PowerupUsed,
    MoveLimitCheck,
    ValidMovesCheck,
    Abandon,
}

/// Final result of an attempt, produced once it reaches a terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptOutcome {
    pub puzzle_id: String,
    pub pack_id: String,
    pub won: bool,
    pub stars: u8,
    pub score: u32,
    pub moves: u32,
    pub max_combo: u32,
    pub lines_cleared: u32,
    pub shapes_placed: u32,
    #[serde(with = "crate::serde_duration")]
    pub play_time: Duration,
    pub fail_reason: Option<FailReason>,
}

impl AttemptOutcome {
    /// The attempt as a ledger session report.
    pub fn session_stats(&self) -> SessionStats {
        SessionStats {
            lines_cleared: u64::from(self.lines_cleared),
            shapes_placed: u64::from(self.shapes_placed),
            play_time: self.play_time,
            coins_earned: 0,
            max_combo: u64::from(self.max_combo),
            score: u64::from(self.score),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ObjectiveEvaluator {
    puzzle_id: String,
    pack_id: String,
    /// Zero means no move limit.
    target_moves: u32,
    stars: StarThresholds,
    shapes: Vec<Shape>,
    consumed: Vec<bool>,
    objectives: Vec<Objective>,
    stats: PuzzleAttemptStats,
    state: AttemptState,
    ended_at: Option<DateTime<Local>>,
    clock: Rc<dyn Clock>,
}

impl ObjectiveEvaluator {
    pub fn new(pack_id: &str, puzzle: &PuzzleDef, clock: Rc<dyn Clock>) -> Self {
        let objectives = puzzle
            .objectives
            .iter()
            .map(|o| Objective {
                completed: false,
                ..o.clone()
            })
            .collect();
        let stats = PuzzleAttemptStats::new(clock.now());
        Self {
            puzzle_id: puzzle.id.clone(),
            pack_id: pack_id.to_string(),
            target_moves: puzzle.target_moves,
            stars: puzzle.stars,
            shapes: puzzle.shapes.clone(),
            consumed: vec![false; puzzle.shapes.len()],
            objectives,
            stats,
            state: AttemptState::Pending,
            ended_at: None,
            clock,
        }
    }

    pub fn puzzle_id(&self) -> &str {
        &self.puzzle_id
    }

    pub fn pack_id(&self) -> &str {
        &self.pack_id
    }

    pub fn state(&self) -> AttemptState {
        self.state
    }

    pub fn stats(&self) -> &PuzzleAttemptStats {
        &self.stats
    }

    pub fn objectives(&self) -> &[Objective] {
        &self.objectives
    }

    pub fn remaining_shapes(&self) -> impl Iterator<Item = (usize, &Shape)> {
        self.shapes
            .iter()
            .enumerate()
            .filter(|(i, _)| !self.consumed[*i])
    }

    /// `(completed, total)` over objectives that count toward completion.
    pub fn progress_summary(&self) -> (usize, usize) {
        let counted = self.objectives.iter().filter(|o| o.counts_toward_completion());
        let total = counted.clone().count();
        let done = counted.filter(|o| o.completed).count();
        (done, total)
    }

    pub fn all_completed(&self) -> bool {
        self.objectives
            .iter()
            .filter(|o| o.counts_toward_completion())
            .all(|o| o.completed)
    }

    pub fn start(&mut self) {
        if self.state == AttemptState::Pending {
            self.state = AttemptState::Active;
            self.stats.start_time = self.clock.now();
            tracing::debug!(puzzle = %self.puzzle_id, "attempt started");
        }
    }

    /// Starts a pending attempt; false once the attempt is over.
    fn accepting_events(&mut self) -> bool {
        self.start();
        !self.state.is_terminal()
    }

    pub fn handle(
        &mut self,
        event: AttemptEvent,
        grid: &mut impl Grid,
        scorer: &impl LineScorer,
    ) -> AttemptState {
        match event {
            AttemptEvent::ShapePlaced { shape_index } => {
                self.on_shape_placed(grid, scorer, shape_index)
            }
            AttemptEvent::ShapeDiscarded { shape_index } => {
                self.on_shape_discarded(grid, shape_index)
            }
            AttemptEvent::HintUsed => self.use_hint(),
            AttemptEvent::PowerupUsed => self.use_powerup(grid),
            AttemptEvent::MoveLimitCheck => self.check_move_limit(),
            AttemptEvent::ValidMovesCheck => self.check_valid_moves(grid),
            AttemptEvent::Abandon => self.abandon(),
        }
    }

    /// The shape at `shape_index` has just been stamped onto `grid`.
    pub fn on_shape_placed(
        &mut self,
        grid: &mut impl Grid,
        scorer: &impl LineScorer,
        shape_index: usize,
    ) -> AttemptState {
        if !self.accepting_events() {
            return self.state;
        }
        self.consume_shape(shape_index);
        self.stats.moves = self.stats.moves.saturating_add(1);
        self.stats.shapes_used = self.stats.shapes_used.saturating_add(1);

        let lines = grid.check_and_clear_lines();
        if lines.is_empty() {
            self.stats.current_combo = 0;
            self.stats.wasted_moves = self.stats.wasted_moves.saturating_add(1);
        } else {
            let stats = &mut self.stats;
            stats.current_combo = stats.current_combo.saturating_add(1);
            stats.max_combo = stats.max_combo.max(stats.current_combo);
            stats.score = stats
                .score
                .saturating_add(scorer.points_for(&lines, stats.current_combo));
            stats.lines_cleared = stats.lines_cleared.saturating_add(lines.len() as u32);
            let columns = lines.iter().filter(|l| l.is_column()).count() as u32;
            stats.columns_cleared = stats.columns_cleared.saturating_add(columns);
            if lines.len() >= 2 {
                stats.chain_reactions = stats.chain_reactions.saturating_add(1);
            }
        }

        self.evaluate(grid)
    }

    /// The shape left the tray without being placed (e.g. removed by a power-up).
    pub fn on_shape_discarded(&mut self, grid: &impl Grid, shape_index: usize) -> AttemptState {
        if !self.accepting_events() {
            return self.state;
        }
        self.consume_shape(shape_index);
        self.evaluate(grid)
    }

    pub fn use_hint(&mut self) -> AttemptState {
        if self.accepting_events() {
            self.stats.hints_used = self.stats.hints_used.saturating_add(1);
        }
        self.state
    }

    pub fn use_powerup(&mut self, grid: &impl Grid) -> AttemptState {
        if !self.accepting_events() {
            return self.state;
        }
        self.stats.powerups_used = self.stats.powerups_used.saturating_add(1);
        self.evaluate(grid)
    }

    fn consume_shape(&mut self, shape_index: usize) {
        match self.consumed.get_mut(shape_index) {
            Some(slot) if !*slot => *slot = true,
            Some(_) => tracing::warn!(shape_index, "shape reported used twice"),
            None => tracing::warn!(shape_index, "shape index out of range"),
        }
    }

    /// Mark every objective whose predicate now holds and complete the attempt when all have.
    pub fn evaluate(&mut self, grid: &impl Grid) -> AttemptState {
        if self.state != AttemptState::Active {
            return self.state;
        }
        let now = self.clock.now();
        let elapsed = elapsed_between(self.stats.start_time, now);
        let shapes_left = self.consumed.iter().any(|used| !used);

        for objective in self.objectives.iter_mut().filter(|o| !o.completed) {
            let stats = &self.stats;
            let moved = stats.moves > 0;
            objective.completed = match objective.kind {
                ObjectiveKind::Lines { target } => stats.lines_cleared >= target,
                ObjectiveKind::Columns { target } => stats.columns_cleared >= target,
                ObjectiveKind::Score { target } => stats.score >= target,
                ObjectiveKind::Combo { target } => stats.max_combo >= target,
                ObjectiveKind::Chain { target } => stats.chain_reactions >= target,
                ObjectiveKind::Powerups { target } => stats.powerups_used >= target,
                ObjectiveKind::Fill { region } => region.is_filled(grid),
                ObjectiveKind::Complete => !shapes_left,
                ObjectiveKind::Speed { seconds } => {
                    moved && elapsed <= Duration::from_secs(u64::from(seconds))
                }
                ObjectiveKind::Efficiency { target } | ObjectiveKind::Perfection { target } => {
                    stats.accuracy_at_least(target)
                }
                ObjectiveKind::Perfect => moved && stats.wasted_moves == 0,
                // Judged below, once everything else is in.
                ObjectiveKind::Moves { .. } | ObjectiveKind::Mastery | ObjectiveKind::Unknown => {
                    false
                }
            };
        }

        let others_done = self
            .objectives
            .iter()
            .filter(|o| o.counts_toward_completion() && !o.kind.waits_for_others())
            .all(|o| o.completed);
        if others_done {
            let moves = self.stats.moves;
            for objective in self.objectives.iter_mut().filter(|o| !o.completed) {
                if let ObjectiveKind::Moves { target } = objective.kind {
                    objective.completed = moves <= target;
                }
            }
        }

        let mastered = self
            .objectives
            .iter()
            .filter(|o| o.counts_toward_completion() && o.kind != ObjectiveKind::Mastery)
            .all(|o| o.completed);
        if mastered {
            for objective in &mut self.objectives {
                if objective.kind == ObjectiveKind::Mastery {
                    objective.completed = true;
                }
            }
        }

        if self.all_completed() {
            self.finish(AttemptState::Completed, now);
        }
        self.state
    }

    /// Fail the attempt once the move budget is spent without finishing.
    pub fn check_move_limit(&mut self) -> AttemptState {
        if self.state == AttemptState::Active
            && self.target_moves > 0
            && self.stats.moves > self.target_moves
            && !self.all_completed()
        {
            self.finish(
                AttemptState::Failed(FailReason::ExceededMoveLimit),
                self.clock.now(),
            );
        }
        self.state
    }

    /// Fail the attempt when none of the remaining shapes fits anywhere on `grid`.
    pub fn check_valid_moves(&mut self, grid: &impl Grid) -> AttemptState {
        if self.state != AttemptState::Active || self.all_completed() {
            return self.state;
        }
        let stuck = self
            .remaining_shapes()
            .all(|(_, shape)| !grid.can_place_shape(shape));
        if stuck {
            self.finish(
                AttemptState::Failed(FailReason::NoValidMoves),
                self.clock.now(),
            );
        }
        self.state
    }

    pub fn abandon(&mut self) -> AttemptState {
        if !self.state.is_terminal() {
            self.finish(AttemptState::Failed(FailReason::Abandoned), self.clock.now());
        }
        self.state
    }

    fn finish(&mut self, state: AttemptState, now: DateTime<Local>) {
        self.state = state;
        self.ended_at = Some(now);
        match state {
            AttemptState::Failed(reason) => {
                tracing::info!(puzzle = %self.puzzle_id, moves = self.stats.moves, "attempt failed: {reason}");
            }
            _ => {
                tracing::info!(puzzle = %self.puzzle_id, moves = self.stats.moves, score = self.stats.score, "attempt completed");
            }
        }
    }

    /// Available once the attempt is over.
    pub fn outcome(&self) -> Option<AttemptOutcome> {
        let fail_reason = match self.state {
            AttemptState::Completed => None,
            AttemptState::Failed(reason) => Some(reason),
            AttemptState::Pending | AttemptState::Active => return None,
        };
        let won = fail_reason.is_none();
        let play_time = self
            .ended_at
            .map(|end| elapsed_between(self.stats.start_time, end))
            .unwrap_or_default();
        Some(AttemptOutcome {
            puzzle_id: self.puzzle_id.clone(),
            pack_id: self.pack_id.clone(),
            won,
            stars: if won { self.stars.rating(self.stats.moves) } else { 0 },
            score: self.stats.score,
            moves: self.stats.moves,
            max_combo: self.stats.max_combo,
            lines_cleared: self.stats.lines_cleared,
            shapes_placed: self.stats.shapes_used,
            play_time,
            fail_reason,
        })
    }
}
