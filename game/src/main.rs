use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use blockpuzzle::ProgressionContext;
use blockpuzzle::board::{StandardScorer, Vec2i};
use blockpuzzle::clock::SystemClock;
use blockpuzzle::objectives::AttemptState;
use blockpuzzle::records::SessionStats;
use blockpuzzle::storage::{FileStore, StorageConfig};
use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "blockpuzzle")]
#[command(about = "Records, achievements and puzzle progress for the block puzzle game")]
#[command(version)]
struct Cli {
    /// Data directory (defaults to BLOCKPUZZLE_DATA_DIR or the XDG data dir)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Storage namespace (defaults to BLOCKPUZZLE_NAMESPACE or "default")
    #[arg(long, global = true)]
    namespace: Option<String>,

    /// Log level used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Merge one finished game session into the records and report new achievement tiers
    Record {
        #[arg(long)]
        mode: String,
        #[arg(long, default_value_t = 0)]
        score: u64,
        #[arg(long, default_value_t = 0)]
        lines: u64,
        #[arg(long, default_value_t = 0)]
        shapes: u64,
        #[arg(long, default_value_t = 0)]
        combo: u64,
        #[arg(long, default_value_t = 0)]
        coins: u64,
        #[arg(long, default_value_t = 0)]
        seconds: u64,
    },
    /// Print the records ledger
    Records,
    /// Print achievement progress
    Achievements,
    /// Print pack and puzzle progress
    Puzzles,
    /// Play a puzzle from a list of placements, each `SHAPE:X,Y`
    Play {
        puzzle: String,
        #[arg(long = "place", value_parser = parse_placement)]
        placements: Vec<(usize, Vec2i)>,
    },
}

fn parse_placement(raw: &str) -> Result<(usize, Vec2i), String> {
    let (index, pos) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected SHAPE:X,Y, got `{raw}`"))?;
    let (x, y) = pos
        .split_once(',')
        .ok_or_else(|| format!("expected X,Y after `:`, got `{pos}`"))?;
    let parse = |s: &str| s.trim().parse::<i32>().map_err(|e| format!("`{s}`: {e}"));
    let index = index
        .trim()
        .parse::<usize>()
        .map_err(|e| format!("`{index}`: {e}"))?;
    Ok((index, Vec2i::new(parse(x)?, parse(y)?)))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = StorageConfig::from_env();
    if let Some(dir) = cli.data_dir {
        config.dir = dir;
    }
    if let Some(ns) = cli.namespace {
        config.namespace = ns;
    }
    let mut ctx = ProgressionContext::load(FileStore::new(&config), Rc::new(SystemClock));

    match cli.command {
        Commands::Record {
            mode,
            score,
            lines,
            shapes,
            combo,
            coins,
            seconds,
        } => {
            let stats = SessionStats {
                lines_cleared: lines,
                shapes_placed: shapes,
                play_time: Duration::from_secs(seconds),
                coins_earned: coins,
                max_combo: combo,
                score,
            };
            let unlocks = ctx.record_session(&mode, &stats);
            if unlocks.is_empty() {
                println!("no new achievement tiers");
            }
            for unlock in unlocks {
                println!(
                    "{} -> {} ({} coins)",
                    unlock.achievement_id, unlock.tier.name, unlock.coins_awarded
                );
            }
        }
        Commands::Records => {
            println!("{}", serde_json::to_string_pretty(ctx.records())?);
        }
        Commands::Achievements => {
            println!("{}", serde_json::to_string_pretty(&ctx.achievement_display())?);
            println!(
                "unlocked {}/{}; {} coins earned",
                ctx.achievements().unlocked_count(),
                ctx.achievements().catalog().achievements.len(),
                ctx.achievements().total_rewards()
            );
        }
        Commands::Puzzles => {
            for pack in &ctx.catalog().packs {
                let progress = ctx.puzzles().pack_progress(&pack.id);
                let (done, total) = ctx.puzzles().pack_completion(ctx.catalog(), &pack.id);
                let lock = if progress.unlocked { " " } else { "x" };
                println!("[{lock}] {} {done}/{total}", pack.name);
                for puzzle in &pack.puzzles {
                    let p = ctx.puzzles().puzzle(&puzzle.id);
                    println!(
                        "      {:<16} stars {} best {} moves {}",
                        puzzle.name,
                        p.stars,
                        p.best_score,
                        p.best_moves.map_or_else(|| "-".to_string(), |m| m.to_string())
                    );
                }
            }
            println!("total stars: {}", ctx.puzzles().total_stars());
        }
        Commands::Play { puzzle, placements } => {
            let Some((_, def)) = ctx.catalog().puzzle(&puzzle) else {
                bail!("unknown puzzle `{puzzle}`");
            };
            let def = def.clone();
            let mut attempt = ctx
                .start_attempt(&puzzle)
                .with_context(|| format!("puzzle `{puzzle}` is locked"))?;
            let mut grid = def.build_grid();

            for (index, origin) in placements {
                let shape = def
                    .shapes
                    .get(index)
                    .with_context(|| format!("puzzle has no shape {index}"))?;
                if !attempt.remaining_shapes().any(|(i, _)| i == index) {
                    bail!("shape {index} was already used");
                }
                if !grid.place_shape(shape, origin, 1) {
                    bail!("shape {index} does not fit at {},{}", origin.x, origin.y);
                }
                attempt.on_shape_placed(&mut grid, &StandardScorer, index);
                attempt.check_move_limit();
                attempt.check_valid_moves(&grid);
                if attempt.state().is_terminal() {
                    break;
                }
            }
            if attempt.state() == AttemptState::Active {
                attempt.abandon();
            }

            let report = match ctx.finish_attempt(attempt) {
                Ok(report) => report,
                Err(_) => bail!("attempt did not finish"),
            };
            println!("{}", serde_json::to_string_pretty(&report.outcome)?);
            if let Some(pack) = report.unlocked_pack {
                println!("unlocked pack {pack}");
            }
            for unlock in report.unlocks {
                println!("{} -> {}", unlock.achievement_id, unlock.tier.name);
            }
        }
    }
    Ok(())
}
