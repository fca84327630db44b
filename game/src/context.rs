use std::rc::Rc;

use crate::achievements::{
    AchievementBook, AchievementCatalog, AchievementDisplay, AchievementTracker, UnlockEvent,
};
use crate::clock::Clock;
use crate::objectives::{AttemptOutcome, ObjectiveEvaluator};
use crate::puzzles::{PuzzleCatalog, PuzzleProgressDoc, PuzzleProgressStore};
use crate::records::{Records, SessionStats};
use crate::storage::{Document, KeyValueStore, LoadStatus, StorageError, load_document, save_document};

/// Ledger mode used for finished puzzle attempts. Not a competitive mode, so only the overall
/// aggregate moves.
pub const PUZZLE_MODE: &str = "puzzle";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub records: LoadStatus,
    pub achievements: LoadStatus,
    pub puzzles: LoadStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptReport {
    pub outcome: AttemptOutcome,
    /// Pack unlocked because this attempt finished its pack.
    pub unlocked_pack: Option<String>,
    pub unlocks: Vec<UnlockEvent>,
}

/// All durable progression state, loaded once at startup and handed to whoever needs it.
///
/// Every mutating call persists the documents it touched. Write failures are logged and
/// swallowed; the in-memory state stays authoritative until the next successful write.
#[derive(Debug)]
pub struct ProgressionContext<S: KeyValueStore> {
    store: S,
    clock: Rc<dyn Clock>,
    catalog: PuzzleCatalog,
    records: Records,
    achievements: AchievementTracker,
    puzzles: PuzzleProgressStore,
    load_report: LoadReport,
}

impl<S: KeyValueStore> ProgressionContext<S> {
    pub fn load(store: S, clock: Rc<dyn Clock>) -> Self {
        Self::load_with(
            store,
            clock,
            AchievementCatalog::default(),
            PuzzleCatalog::default(),
        )
    }

    pub fn load_with(
        store: S,
        clock: Rc<dyn Clock>,
        achievement_catalog: AchievementCatalog,
        catalog: PuzzleCatalog,
    ) -> Self {
        let (records, records_status) = load_document::<Records>(&store);
        let (book, book_status) = load_document::<AchievementBook>(&store);
        let (puzzle_doc, puzzles_status) = load_document::<PuzzleProgressDoc>(&store);

        let mut ctx = Self {
            store,
            clock,
            catalog,
            records,
            achievements: AchievementTracker::new(achievement_catalog, book),
            puzzles: PuzzleProgressStore::new(puzzle_doc),
            load_report: LoadReport {
                records: records_status,
                achievements: book_status,
                puzzles: puzzles_status,
            },
        };
        if ctx.puzzles.ensure_first_pack_unlocked(&ctx.catalog) {
            ctx.persist_puzzles();
        }
        tracing::debug!(report = ?ctx.load_report, "progression state loaded");
        ctx
    }

    pub fn load_report(&self) -> &LoadReport {
        &self.load_report
    }

    pub fn records(&self) -> &Records {
        &self.records
    }

    pub fn achievements(&self) -> &AchievementTracker {
        &self.achievements
    }

    pub fn puzzles(&self) -> &PuzzleProgressStore {
        &self.puzzles
    }

    pub fn catalog(&self) -> &PuzzleCatalog {
        &self.catalog
    }

    pub fn clock(&self) -> Rc<dyn Clock> {
        Rc::clone(&self.clock)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Write every document, stopping at the first failure.
    pub fn save(&mut self) -> Result<(), StorageError> {
        save_document(&mut self.store, &self.records)?;
        save_document(&mut self.store, self.achievements.book())?;
        save_document(&mut self.store, self.puzzles.doc())
    }

    /// Merge one finished game session into the ledger.
    pub fn update_records(&mut self, mode: &str, stats: &SessionStats) {
        let now = self.clock.now();
        self.records.update(mode, stats, now);
        persist(&mut self.store, &self.records);
    }

    pub fn recompute_achievements(&mut self) -> Vec<UnlockEvent> {
        let unlocks = self.achievements.recompute(&self.records);
        persist(&mut self.store, self.achievements.book());
        unlocks
    }

    /// Ledger update followed by an achievement pass.
    pub fn record_session(&mut self, mode: &str, stats: &SessionStats) -> Vec<UnlockEvent> {
        self.update_records(mode, stats);
        self.recompute_achievements()
    }

    pub fn achievement_display(&self) -> Vec<AchievementDisplay> {
        self.achievements.display_data()
    }

    /// A fresh attempt at `puzzle_id`, or `None` if the puzzle is unknown or its pack is locked.
    pub fn start_attempt(&self, puzzle_id: &str) -> Option<ObjectiveEvaluator> {
        let Some((pack, puzzle)) = self.catalog.puzzle(puzzle_id) else {
            tracing::warn!(puzzle = puzzle_id, "unknown puzzle");
            return None;
        };
        if !self.puzzles.pack_progress(&pack.id).unlocked {
            tracing::debug!(puzzle = puzzle_id, pack = %pack.id, "pack is locked");
            return None;
        }
        let mut evaluator = ObjectiveEvaluator::new(&pack.id, puzzle, self.clock());
        evaluator.start();
        Some(evaluator)
    }

    /// Apply a finished attempt: merge best results, unlock the next pack when this one is
    /// done, forward the session to the ledger and recompute achievements.
    ///
    /// Hands the evaluator back untouched if the attempt hasn't ended yet.
    pub fn finish_attempt(
        &mut self,
        evaluator: ObjectiveEvaluator,
    ) -> Result<AttemptReport, ObjectiveEvaluator> {
        let Some(outcome) = evaluator.outcome() else {
            return Err(evaluator);
        };
        drop(evaluator);

        let mut unlocked_pack = None;
        if outcome.won {
            self.puzzles.record_attempt(&outcome.puzzle_id, &outcome);
            unlocked_pack = self.puzzles.refresh_pack(&self.catalog, &outcome.pack_id);
            self.persist_puzzles();
        }

        let unlocks = self.record_session(PUZZLE_MODE, &outcome.session_stats());
        Ok(AttemptReport {
            outcome,
            unlocked_pack,
            unlocks,
        })
    }

    fn persist_puzzles(&mut self) {
        persist(&mut self.store, self.puzzles.doc());
    }
}

fn persist<T: Document>(store: &mut impl KeyValueStore, doc: &T) {
    if let Err(e) = save_document(store, doc) {
        tracing::warn!(key = T::KEY, "failed to persist, keeping in-memory state: {e}");
    }
}
