pub mod achievements;
pub mod board;
pub mod clock;
pub mod context;
pub mod objectives;
pub mod puzzles;
pub mod records;
pub mod serde_duration;
pub mod storage;

pub use context::ProgressionContext;
