use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::records::Records;
use crate::storage::Document;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TierLevel {
    Bronze,
    Silver,
    Gold,
    Diamond,
}

impl TierLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            TierLevel::Bronze => "bronze",
            TierLevel::Silver => "silver",
            TierLevel::Gold => "gold",
            TierLevel::Diamond => "diamond",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AchievementCategory {
    Lines,
    Games,
    Score,
    Combo,
    Shapes,
    Daily,
    Time,
    Perfect,
}

/// Current value of the ledger statistic an achievement category tracks.
pub fn category_value(category: AchievementCategory, records: &Records) -> u64 {
    let overall = &records.overall;
    match category {
        AchievementCategory::Lines => overall.total_lines_cleared,
        AchievementCategory::Games => overall.total_games_played,
        AchievementCategory::Score => records.best_high_score(),
        AchievementCategory::Combo => overall.max_combo_ever,
        AchievementCategory::Shapes => overall.total_shapes_placed,
        AchievementCategory::Daily => overall.daily_challenges_completed,
        AchievementCategory::Time => overall.total_play_time,
        AchievementCategory::Perfect => overall.perfect_games,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tier {
    pub level: TierLevel,
    pub requirement: u64,
    /// Coins.
    pub reward: u64,
    pub name: String,
    pub icon: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Achievement {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub icon: String,
    pub category: AchievementCategory,
    /// Ascending by requirement and level once the catalog is normalized.
    pub tiers: Vec<Tier>,
}

impl Achievement {
    pub fn tier(&self, level: TierLevel) -> Option<&Tier> {
        self.tiers.iter().find(|t| t.level == level)
    }

    pub fn top_tier(&self) -> Option<&Tier> {
        self.tiers.last()
    }
}

/// Static, designer-authored achievement table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AchievementCatalog {
    pub version: u32,
    pub achievements: Vec<Achievement>,
}

impl Default for AchievementCatalog {
    fn default() -> Self {
        // Keep a compile-time fallback so progression still works if the asset is malformed.
        serde_json::from_str::<AchievementCatalog>(include_str!("../assets/achievements.json"))
            .map(AchievementCatalog::normalized)
            .unwrap_or_else(|e| {
                tracing::warn!("embedded achievement catalog is invalid, using fallback: {e}");
                AchievementCatalog {
                    version: 1,
                    achievements: vec![Achievement {
                        id: "lineMaster".to_string(),
                        name: "Line Master".to_string(),
                        description: "Clear lines across all your games".to_string(),
                        icon: String::new(),
                        category: AchievementCategory::Lines,
                        tiers: vec![
                            Tier {
                                level: TierLevel::Bronze,
                                requirement: 100,
                                reward: 100,
                                name: "Line Apprentice".to_string(),
                                icon: String::new(),
                            },
                            Tier {
                                level: TierLevel::Silver,
                                requirement: 500,
                                reward: 250,
                                name: "Line Expert".to_string(),
                                icon: String::new(),
                            },
                        ],
                    }],
                }
            })
    }
}

impl AchievementCatalog {
    pub fn new(achievements: Vec<Achievement>) -> Self {
        Self {
            version: 1,
            achievements,
        }
        .normalized()
    }

    /// Sort each tier ladder by requirement and drop rungs that break the strict
    /// requirement/level ordering. Duplicate achievement ids keep their first definition.
    pub fn normalized(mut self) -> Self {
        let mut seen = HashSet::new();
        self.achievements.retain(|a| {
            let fresh = seen.insert(a.id.clone());
            if !fresh {
                tracing::warn!(id = %a.id, "duplicate achievement id dropped");
            }
            fresh
        });

        for achievement in &mut self.achievements {
            let id = achievement.id.clone();
            achievement.tiers.sort_by_key(|t| t.requirement);
            let mut last: Option<(u64, TierLevel)> = None;
            achievement.tiers.retain(|tier| {
                let ordered = last.is_none_or(|(req, level)| {
                    tier.requirement > req && tier.level > level
                });
                if ordered {
                    last = Some((tier.requirement, tier.level));
                } else {
                    tracing::warn!(
                        id = %id,
                        level = tier.level.as_str(),
                        requirement = tier.requirement,
                        "tier out of order, dropped"
                    );
                }
                ordered
            });
        }
        self
    }

    pub fn get(&self, id: &str) -> Option<&Achievement> {
        self.achievements.iter().find(|a| a.id == id)
    }
}

/// Persistent per-achievement progress.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementProgress {
    #[serde(default)]
    pub unlocked_tier: Option<TierLevel>,
    #[serde(default)]
    pub progress: u64,
    #[serde(default)]
    pub total_rewards_earned: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AchievementBook {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub achievements: BTreeMap<String, AchievementProgress>,
}

impl Default for AchievementBook {
    fn default() -> Self {
        Self {
            version: Self::VERSION,
            achievements: BTreeMap::new(),
        }
    }
}

impl Document for AchievementBook {
    const KEY: &'static str = "achievements";
    const VERSION: u32 = 1;

    fn version(&self) -> u32 {
        self.version
    }

    fn migrate(mut self, _from: u32) -> Self {
        self.version = Self::VERSION;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockEvent {
    pub achievement_id: String,
    pub tier: Tier,
    pub coins_awarded: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementDisplay {
    pub id: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub category: AchievementCategory,
    pub progress: u64,
    pub unlocked_tier: Option<Tier>,
    /// Lowest tier still ahead; the top tier once everything is unlocked.
    pub next_tier: Option<Tier>,
    pub is_completed: bool,
    pub total_rewards: u64,
}

/// Catalog plus player progress. Recomputes tiers from the records ledger.
#[derive(Debug, Clone)]
pub struct AchievementTracker {
    catalog: AchievementCatalog,
    book: AchievementBook,
}

impl AchievementTracker {
    pub fn new(catalog: AchievementCatalog, book: AchievementBook) -> Self {
        Self { catalog, book }
    }

    pub fn catalog(&self) -> &AchievementCatalog {
        &self.catalog
    }

    pub fn book(&self) -> &AchievementBook {
        &self.book
    }

    pub fn progress(&self, id: &str) -> Option<&AchievementProgress> {
        self.book.achievements.get(id)
    }

    /// Refresh every achievement from `records` and unlock each newly reached tier, lowest first.
    ///
    /// Tiers at or below the stored unlocked level are never awarded again, so calling this
    /// repeatedly without a ledger change yields no events.
    pub fn recompute(&mut self, records: &Records) -> Vec<UnlockEvent> {
        let mut events = Vec::new();
        for achievement in &self.catalog.achievements {
            let value = category_value(achievement.category, records);
            let entry = self
                .book
                .achievements
                .entry(achievement.id.clone())
                .or_default();
            entry.progress = value;

            for tier in &achievement.tiers {
                if tier.requirement > value {
                    break;
                }
                if entry.unlocked_tier.is_some_and(|unlocked| tier.level <= unlocked) {
                    continue;
                }
                debug_assert!(entry.unlocked_tier < Some(tier.level));
                entry.unlocked_tier = Some(tier.level);
                entry.total_rewards_earned = entry.total_rewards_earned.saturating_add(tier.reward);
                tracing::info!(
                    achievement = %achievement.id,
                    tier = tier.level.as_str(),
                    coins = tier.reward,
                    "achievement tier unlocked"
                );
                events.push(UnlockEvent {
                    achievement_id: achievement.id.clone(),
                    tier: tier.clone(),
                    coins_awarded: tier.reward,
                });
            }
        }
        events
    }

    pub fn display_data(&self) -> Vec<AchievementDisplay> {
        self.catalog
            .achievements
            .iter()
            .map(|achievement| {
                let entry = self
                    .book
                    .achievements
                    .get(&achievement.id)
                    .cloned()
                    .unwrap_or_default();
                let unlocked_tier = entry
                    .unlocked_tier
                    .and_then(|level| achievement.tier(level))
                    .cloned();
                let next_tier = achievement
                    .tiers
                    .iter()
                    .find(|t| t.requirement > entry.progress)
                    .or_else(|| achievement.top_tier())
                    .cloned();
                let is_completed = match (entry.unlocked_tier, achievement.top_tier()) {
                    (Some(unlocked), Some(top)) => unlocked >= top.level,
                    _ => false,
                };
                AchievementDisplay {
                    id: achievement.id.clone(),
                    name: achievement.name.clone(),
                    description: achievement.description.clone(),
                    icon: achievement.icon.clone(),
                    category: achievement.category,
                    progress: entry.progress,
                    unlocked_tier,
                    next_tier,
                    is_completed,
                    total_rewards: entry.total_rewards_earned,
                }
            })
            .collect()
    }

    /// Coins earned from every achievement in the catalog.
    pub fn total_rewards(&self) -> u64 {
        self.catalog
            .achievements
            .iter()
            .filter_map(|a| self.book.achievements.get(&a.id))
            .map(|p| p.total_rewards_earned)
            .fold(0u64, u64::saturating_add)
    }

    pub fn unlocked_count(&self) -> usize {
        self.catalog
            .achievements
            .iter()
            .filter(|a| {
                self.book
                    .achievements
                    .get(&a.id)
                    .is_some_and(|p| p.unlocked_tier.is_some())
            })
            .count()
    }
}
