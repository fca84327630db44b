use std::rc::Rc;
use std::time::Duration;

use blockpuzzle::ProgressionContext;
use blockpuzzle::board::{StandardScorer, Vec2i};
use blockpuzzle::clock::ManualClock;
use blockpuzzle::context::AttemptReport;
use blockpuzzle::objectives::{AttemptState, FailReason};
use blockpuzzle::records::SessionStats;
use blockpuzzle::storage::{FileStore, KeyValueStore, LoadStatus, MemoryStore, StorageConfig};
use chrono::{Local, TimeZone};

fn clock() -> Rc<ManualClock> {
    Rc::new(ManualClock::new(
        Local
            .with_ymd_and_hms(2026, 3, 4, 18, 0, 0)
            .single()
            .expect("unambiguous"),
    ))
}

/// Solutions for the beginner pack on the bundled catalog.
fn solution(puzzle_id: &str) -> Vec<(usize, Vec2i)> {
    match puzzle_id {
        "b1" => vec![(0, Vec2i::new(2, 7)), (4, Vec2i::new(6, 7))],
        "b2" => vec![(0, Vec2i::new(0, 0)), (1, Vec2i::new(0, 4))],
        "b3" => vec![
            (0, Vec2i::new(0, 0)),
            (1, Vec2i::new(4, 0)),
            (2, Vec2i::new(0, 2)),
            (3, Vec2i::new(3, 2)),
            (4, Vec2i::new(5, 2)),
            (5, Vec2i::new(7, 2)),
        ],
        other => panic!("no solution for {other}"),
    }
}

fn play<S: KeyValueStore>(
    ctx: &mut ProgressionContext<S>,
    puzzle_id: &str,
    placements: &[(usize, Vec2i)],
) -> AttemptReport {
    let def = ctx
        .catalog()
        .puzzle(puzzle_id)
        .map(|(_, def)| def.clone())
        .expect("known puzzle");
    let mut attempt = ctx.start_attempt(puzzle_id).expect("pack unlocked");
    let mut grid = def.build_grid();
    for &(index, origin) in placements {
        assert!(grid.place_shape(&def.shapes[index], origin, 1), "{puzzle_id}: shape {index} fits");
        attempt.on_shape_placed(&mut grid, &StandardScorer, index);
        attempt.check_move_limit();
    }
    if !attempt.state().is_terminal() {
        attempt.abandon();
    }
    ctx.finish_attempt(attempt).expect("attempt finished")
}

fn session(score: u64, lines: u64) -> SessionStats {
    SessionStats {
        score,
        lines_cleared: lines,
        shapes_placed: 10,
        play_time: Duration::from_secs(120),
        coins_earned: 3,
        max_combo: 2,
    }
}

#[test]
fn fresh_load_unlocks_and_persists_the_first_pack() {
    let ctx = ProgressionContext::load(MemoryStore::new(), clock());

    let report = ctx.load_report();
    assert_eq!(report.records, LoadStatus::Fresh);
    assert_eq!(report.achievements, LoadStatus::Fresh);
    assert_eq!(report.puzzles, LoadStatus::Fresh);

    assert!(ctx.puzzles().pack_progress("beginner").unlocked);
    assert!(!ctx.puzzles().pack_progress("intermediate").unlocked);
    assert!(ctx.store().get("puzzle_progress").is_some());
}

#[test]
fn corrupt_documents_fall_back_to_defaults_and_are_reported() {
    let store = MemoryStore::new()
        .with_entry("records", "{ not json")
        .with_entry("achievements", r#"{"version":1,"achievements":{}}"#);
    let ctx = ProgressionContext::load(store, clock());

    let report = ctx.load_report();
    assert!(matches!(report.records, LoadStatus::Corrupt { .. }));
    assert!(report.records.recovered_to_default());
    assert_eq!(report.achievements, LoadStatus::Loaded);
    assert_eq!(ctx.records().overall.total_games_played, 0);
}

#[test]
fn locked_and_unknown_puzzles_cannot_be_started() {
    let ctx = ProgressionContext::load(MemoryStore::new(), clock());
    assert!(ctx.start_attempt("i1").is_none());
    assert!(ctx.start_attempt("nope").is_none());

    let attempt = ctx.start_attempt("b1").expect("beginner is open");
    assert_eq!(attempt.state(), AttemptState::Active);
}

#[test]
fn finishing_a_pack_unlocks_the_next_one_exactly_once() {
    let mut ctx = ProgressionContext::load(MemoryStore::new(), clock());

    assert_eq!(play(&mut ctx, "b1", &solution("b1")).unlocked_pack, None);
    assert_eq!(play(&mut ctx, "b2", &solution("b2")).unlocked_pack, None);
    let last = play(&mut ctx, "b3", &solution("b3"));
    assert!(last.outcome.won);
    assert_eq!(last.unlocked_pack.as_deref(), Some("intermediate"));
    assert!(ctx.puzzles().pack_progress("intermediate").unlocked);
    assert_eq!(ctx.puzzles().pack_completion(ctx.catalog(), "beginner"), (3, 3));
    assert!(ctx.start_attempt("i1").is_some());

    let replay = play(&mut ctx, "b1", &solution("b1"));
    assert!(replay.outcome.won);
    assert_eq!(replay.unlocked_pack, None);
}

#[test]
fn puzzle_attempts_feed_only_the_overall_ledger() {
    let mut ctx = ProgressionContext::load(MemoryStore::new(), clock());
    let report = play(&mut ctx, "b1", &solution("b1"));

    let records = ctx.records();
    assert_eq!(records.overall.total_games_played, 1);
    assert_eq!(
        records.overall.total_lines_cleared,
        u64::from(report.outcome.lines_cleared)
    );
    assert_eq!(records.normal.games_played, 0);
    assert_eq!(records.endless.games_played, 0);
    assert_eq!(records.daily.mode.games_played, 0);

    let progress = ctx.puzzles().puzzle("b1");
    assert!(progress.completed);
    assert_eq!(progress.best_moves, Some(2));
    assert_eq!(progress.stars, 3);
}

#[test]
fn failed_attempts_count_as_games_but_keep_puzzle_progress() {
    let mut ctx = ProgressionContext::load(MemoryStore::new(), clock());
    play(&mut ctx, "b1", &solution("b1"));
    let before = ctx.puzzles().puzzle("b1");

    let failed = play(&mut ctx, "b1", &[(0, Vec2i::new(0, 0))]);
    assert!(!failed.outcome.won);
    assert_eq!(failed.outcome.fail_reason, Some(FailReason::Abandoned));
    assert_eq!(ctx.puzzles().puzzle("b1"), before);
    assert_eq!(ctx.records().overall.total_games_played, 2);
}

#[test]
fn unfinished_attempts_are_handed_back() {
    let mut ctx = ProgressionContext::load(MemoryStore::new(), clock());
    let attempt = ctx.start_attempt("b1").expect("open");
    let attempt = ctx.finish_attempt(attempt).expect_err("still active");
    assert_eq!(attempt.state(), AttemptState::Active);
    assert_eq!(ctx.records().overall.total_games_played, 0);
}

#[test]
fn write_failures_keep_in_memory_state() {
    let mut ctx = ProgressionContext::load(MemoryStore::new(), clock());
    ctx.store_mut().fail_writes = true;

    let unlocks = ctx.record_session("endless", &session(16_000, 120));
    assert!(unlocks.iter().any(|u| u.achievement_id == "lineMaster"));
    assert_eq!(ctx.records().endless.high_score, 16_000);
    assert!(ctx.store().get("records").is_none());
    assert!(ctx.save().is_err());

    ctx.store_mut().fail_writes = false;
    ctx.save().expect("backend recovered");
    assert!(ctx.store().get("records").is_some());
}

#[test]
fn progress_survives_a_restart_on_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = StorageConfig::new(dir.path(), "player-one");

    let mut ctx = ProgressionContext::load(FileStore::new(&config), clock());
    ctx.record_session("daily", &session(900, 150));
    play(&mut ctx, "b1", &solution("b1"));
    let records = ctx.records().clone();
    let book = ctx.achievements().book().clone();
    drop(ctx);

    assert!(config.root().join("records.json").exists());
    let reloaded = ProgressionContext::load(FileStore::new(&config), clock());
    assert_eq!(reloaded.load_report().records, LoadStatus::Loaded);
    assert_eq!(reloaded.records(), &records);
    assert_eq!(reloaded.achievements().book(), &book);
    assert!(reloaded.puzzles().puzzle("b1").completed);
    assert_eq!(reloaded.records().daily.challenges_completed, 1);

    let other = ProgressionContext::load(
        FileStore::new(&StorageConfig::new(dir.path(), "player-two")),
        clock(),
    );
    assert_eq!(other.records().overall.total_games_played, 0);
}
