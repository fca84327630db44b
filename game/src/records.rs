//! Cumulative records ledger.
//!
//! Each finished game session is merged into durable totals: one `overall` aggregate plus one per
//! game mode. Counters only ever grow; `average_score` is derived from its inputs on every update
//! and on load.

use std::time::Duration;

use chrono::{DateTime, Datelike, Local, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::storage::Document;

pub const PERFECT_GAME_MIN_SCORE: u64 = 15_000;
pub const PERFECT_GAME_MIN_COMBO: u64 = 8;
pub const PERFECT_GAME_MIN_LINES: u64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    Normal,
    Endless,
    Daily,
}

impl GameMode {
    pub const ALL: [GameMode; 3] = [GameMode::Normal, GameMode::Endless, GameMode::Daily];

    /// Case-insensitive. Anything unrecognized (e.g. `"puzzle"`) is `None`.
    pub fn parse(mode: &str) -> Option<Self> {
        match mode.trim().to_ascii_lowercase().as_str() {
            "normal" => Some(GameMode::Normal),
            "endless" => Some(GameMode::Endless),
            "daily" => Some(GameMode::Daily),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GameMode::Normal => "normal",
            GameMode::Endless => "endless",
            GameMode::Daily => "daily",
        }
    }
}

/// Statistics reported at the end of one game session. Absent fields are zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionStats {
    pub lines_cleared: u64,
    pub shapes_placed: u64,
    #[serde(with = "crate::serde_duration")]
    pub play_time: Duration,
    pub coins_earned: u64,
    pub max_combo: u64,
    pub score: u64,
}

pub fn is_perfect_game(stats: &SessionStats) -> bool {
    stats.score >= PERFECT_GAME_MIN_SCORE
        && stats.max_combo >= PERFECT_GAME_MIN_COMBO
        && stats.lines_cleared >= PERFECT_GAME_MIN_LINES
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallRecords {
    #[serde(default)]
    pub total_games_played: u64,
    #[serde(default)]
    pub total_lines_cleared: u64,
    #[serde(default)]
    pub total_shapes_placed: u64,
    /// Seconds.
    #[serde(default)]
    pub total_play_time: u64,
    #[serde(default)]
    pub total_coins_earned: u64,
    #[serde(default)]
    pub max_combo_ever: u64,
    #[serde(default)]
    pub perfect_games: u64,
    #[serde(default)]
    pub daily_challenges_completed: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModeRecords {
    #[serde(default)]
    pub high_score: u64,
    #[serde(default)]
    pub total_score: u64,
    #[serde(default)]
    pub games_played: u64,
    #[serde(default)]
    pub average_score: u64,
    #[serde(default)]
    pub best_combo: u64,
    #[serde(default)]
    pub lines_cleared: u64,
    /// Seconds.
    #[serde(default)]
    pub longest_session: u64,
}

impl ModeRecords {
    fn merge(&mut self, stats: &SessionStats) {
        self.games_played = self.games_played.saturating_add(1);
        self.total_score = self.total_score.saturating_add(stats.score);
        self.high_score = self.high_score.max(stats.score);
        self.best_combo = self.best_combo.max(stats.max_combo);
        self.lines_cleared = self.lines_cleared.saturating_add(stats.lines_cleared);
        self.longest_session = self.longest_session.max(stats.play_time.as_secs());
        self.recompute_average();
    }

    fn recompute_average(&mut self) {
        self.average_score = self
            .total_score
            .checked_div(self.games_played)
            .unwrap_or(0);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyRecords {
    #[serde(flatten)]
    pub mode: ModeRecords,
    #[serde(default)]
    pub challenges_completed: u64,
    /// Index 0 is Monday.
    #[serde(default)]
    pub wins_by_weekday: [u64; 7],
    #[serde(default)]
    pub current_streak: u64,
    #[serde(default)]
    pub best_streak: u64,
    #[serde(default)]
    pub last_completed: Option<NaiveDate>,
}

impl DailyRecords {
    fn record_challenge(&mut self, today: NaiveDate) {
        self.challenges_completed = self.challenges_completed.saturating_add(1);
        let slot = today.weekday().num_days_from_monday() as usize;
        self.wins_by_weekday[slot] = self.wins_by_weekday[slot].saturating_add(1);

        self.current_streak = match self.last_completed {
            // A report stamped on or before the anchor day (clock moved backwards) counts as
            // that same day.
            Some(last) if last >= today => self.current_streak.max(1),
            Some(last) if last.succ_opt() == Some(today) => self.current_streak.saturating_add(1),
            _ => 1,
        };
        self.best_streak = self.best_streak.max(self.current_streak);
        if self.last_completed.is_none_or(|last| last < today) {
            self.last_completed = Some(today);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Records {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub overall: OverallRecords,
    #[serde(default)]
    pub normal: ModeRecords,
    #[serde(default)]
    pub endless: ModeRecords,
    #[serde(default)]
    pub daily: DailyRecords,
}

impl Default for Records {
    fn default() -> Self {
        Self {
            version: Self::VERSION,
            overall: OverallRecords::default(),
            normal: ModeRecords::default(),
            endless: ModeRecords::default(),
            daily: DailyRecords::default(),
        }
    }
}

impl Records {
    pub fn mode(&self, mode: GameMode) -> &ModeRecords {
        match mode {
            GameMode::Normal => &self.normal,
            GameMode::Endless => &self.endless,
            GameMode::Daily => &self.daily.mode,
        }
    }

    fn mode_mut(&mut self, mode: GameMode) -> &mut ModeRecords {
        match mode {
            GameMode::Normal => &mut self.normal,
            GameMode::Endless => &mut self.endless,
            GameMode::Daily => &mut self.daily.mode,
        }
    }

    /// Merge one session into the ledger. `now` is the wall-clock time of the report and picks
    /// the weekday slot for daily challenges.
    ///
    /// The caller guarantees each session is submitted at most once.
    pub fn update(&mut self, mode: &str, stats: &SessionStats, now: DateTime<Local>) {
        let overall = &mut self.overall;
        overall.total_games_played = overall.total_games_played.saturating_add(1);
        overall.total_lines_cleared = overall.total_lines_cleared.saturating_add(stats.lines_cleared);
        overall.total_shapes_placed = overall.total_shapes_placed.saturating_add(stats.shapes_placed);
        overall.total_play_time = overall
            .total_play_time
            .saturating_add(stats.play_time.as_secs());
        overall.total_coins_earned = overall.total_coins_earned.saturating_add(stats.coins_earned);
        overall.max_combo_ever = overall.max_combo_ever.max(stats.max_combo);
        if is_perfect_game(stats) {
            overall.perfect_games = overall.perfect_games.saturating_add(1);
        }

        let Some(mode) = GameMode::parse(mode) else {
            tracing::debug!(mode, "unrecognized game mode, updating overall records only");
            return;
        };
        self.mode_mut(mode).merge(stats);

        if mode == GameMode::Daily {
            self.overall.daily_challenges_completed =
                self.overall.daily_challenges_completed.saturating_add(1);
            self.daily.record_challenge(now.date_naive());
        }
    }

    /// Best score across the competitive modes.
    pub fn best_high_score(&self) -> u64 {
        self.normal.high_score.max(self.endless.high_score)
    }
}

impl Document for Records {
    const KEY: &'static str = "records";
    const VERSION: u32 = 1;

    fn version(&self) -> u32 {
        self.version
    }

    fn migrate(mut self, from: u32) -> Self {
        // Unversioned ledgers had the same shape; missing aggregates were already defaulted.
        if from == 0 {
            self.version = Self::VERSION;
        }
        self
    }

    fn sanitized(mut self) -> Self {
        for mode in GameMode::ALL {
            self.mode_mut(mode).recompute_average();
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Local> {
        Local
            .with_ymd_and_hms(y, m, d, 12, 0, 0)
            .single()
            .expect("unambiguous local noon")
    }

    #[test]
    fn mode_parsing_is_case_insensitive() {
        assert_eq!(GameMode::parse("NORMAL"), Some(GameMode::Normal));
        assert_eq!(GameMode::parse(" Endless "), Some(GameMode::Endless));
        assert_eq!(GameMode::parse("daily"), Some(GameMode::Daily));
        assert_eq!(GameMode::parse("puzzle"), None);
    }

    #[test]
    fn perfect_game_requires_all_thresholds() {
        let mut stats = SessionStats {
            score: 15_000,
            max_combo: 8,
            lines_cleared: 20,
            ..SessionStats::default()
        };
        assert!(is_perfect_game(&stats));
        stats.max_combo = 7;
        assert!(!is_perfect_game(&stats));
    }

    #[test]
    fn average_is_floor_of_total_over_games() {
        let mut records = Records::default();
        let now = at(2026, 3, 2);
        for score in [100, 200, 150] {
            let stats = SessionStats {
                score,
                ..SessionStats::default()
            };
            records.update("normal", &stats, now);
        }
        assert_eq!(records.normal.total_score, 450);
        assert_eq!(records.normal.average_score, 150);

        records.update(
            "normal",
            &SessionStats {
                score: 1,
                ..SessionStats::default()
            },
            now,
        );
        assert_eq!(records.normal.average_score, 451 / 4);
    }

    #[test]
    fn daily_streak_counts_consecutive_days_and_resets_on_gap() {
        let mut records = Records::default();
        let stats = SessionStats::default();

        records.update("daily", &stats, at(2026, 3, 2));
        records.update("daily", &stats, at(2026, 3, 2));
        records.update("daily", &stats, at(2026, 3, 3));
        assert_eq!(records.daily.current_streak, 2);

        records.update("daily", &stats, at(2026, 3, 6));
        assert_eq!(records.daily.current_streak, 1);
        assert_eq!(records.daily.best_streak, 2);
        assert_eq!(records.daily.last_completed, NaiveDate::from_ymd_opt(2026, 3, 6));
    }

    #[test]
    fn backdated_daily_report_keeps_the_streak() {
        let mut records = Records::default();
        let stats = SessionStats::default();

        records.update("daily", &stats, at(2026, 3, 2));
        records.update("daily", &stats, at(2026, 3, 3));
        records.update("daily", &stats, at(2026, 3, 4));
        records.update("daily", &stats, at(2026, 3, 1));
        assert_eq!(records.daily.current_streak, 3);
        assert_eq!(records.daily.last_completed, NaiveDate::from_ymd_opt(2026, 3, 4));

        records.update("daily", &stats, at(2026, 3, 5));
        assert_eq!(records.daily.current_streak, 4);
        assert_eq!(records.daily.best_streak, 4);
        assert_eq!(records.daily.challenges_completed, 5);
    }

    #[test]
    fn sanitized_rederives_average_without_touching_counters() {
        let json = r#"{"version":1,"normal":{"totalScore":1000,"gamesPlayed":3,"averageScore":999}}"#;
        let records: Records = serde_json::from_str(json).expect("records parse");
        let records = records.sanitized();
        assert_eq!(records.normal.average_score, 333);
        assert_eq!(records.normal.total_score, 1000);
        assert_eq!(records.normal.games_played, 3);
    }
}
