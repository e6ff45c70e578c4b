//! Loot box draw engine with an adaptive pity mechanic.
//!
//! Every reward carries a miss counter that grows while the reward keeps
//! failing to drop. The counter inflates that reward's weight, but the
//! table's implicit empty-outcome probability is held invariant by scaling
//! the inflated weights back into the non-empty budget.
use rand::Rng;
use smallvec::SmallVec;
use std::collections::BTreeMap;

use crate::error::EngineError;
use crate::item::{RewardEntry, RewardTable};
use crate::state::{Document, MissCounters};

/// Sentinel miss-counter key tracking consecutive non-empty outcomes.
pub const EMPTY_OUTCOME_KEY: &str = "__EMPTY__";

/// Pity growth factor: `base * (1 + FACTOR * miss^2)`.
const PITY_FACTOR: f64 = 0.01;

/// A reward slot with its pity-adjusted, renormalized weight.
#[derive(Debug, Clone, Copy)]
pub struct ScaledRate<'a> {
    pub entry: &'a RewardEntry,
    pub scaled_rate: f64,
    pub miss_count: u32,
}

/// Scratch rate list for one table; tables are small in practice.
pub type RateSet<'a> = SmallVec<[ScaledRate<'a>; 8]>;

/// A single draw outcome. `reward == None` is the empty outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawOutcome {
    pub reward: Option<DrawReward>,
    /// Probability the outcome actually had at draw time, post scaling.
    pub effective_rate: f64,
    pub base_rate: f64,
    /// Miss streak of the winning slot before it was reset.
    pub miss_count: u32,
}

/// The item credited by a non-empty outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawReward {
    pub item_name: String,
    pub count: i64,
}

/// Aggregated result of a draw batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrawReport {
    pub outcomes: Vec<DrawOutcome>,
    /// Non-empty rewards summed per item name.
    pub summary: BTreeMap<String, i64>,
}

/// Pity-adjusted weight before renormalization.
#[must_use]
pub fn dynamic_rate(base_rate: f64, miss_count: u32) -> f64 {
    let miss = f64::from(miss_count);
    base_rate * (1.0 + PITY_FACTOR * miss * miss)
}

/// Compute the renormalized rate set for one table together with its
/// invariant empty-outcome probability.
///
/// The scale factor `min(1, (1 - empty) / sum(dynamic))` clamps the pity
/// inflation back into the table's original non-empty budget, so
/// `sum(scaled) + empty` stays at 1 no matter how large the miss streaks
/// have grown.
#[must_use]
pub fn scaled_table_rates<'a>(
    table: &'a [RewardEntry],
    counters: &MissCounters,
) -> (RateSet<'a>, f64) {
    let total_base: f64 = table.iter().map(|e| e.drop_rate).sum();
    let empty_rate = (1.0 - total_base).max(0.0);

    let mut rates: RateSet<'a> = table
        .iter()
        .map(|entry| {
            let miss_count = counters.get(&entry.item_name).copied().unwrap_or(0);
            ScaledRate {
                entry,
                scaled_rate: dynamic_rate(entry.drop_rate, miss_count),
                miss_count,
            }
        })
        .collect();

    let total_dynamic: f64 = rates.iter().map(|r| r.scaled_rate).sum();
    let scale = if total_dynamic > 0.0 {
        ((1.0 - empty_rate) / total_dynamic).min(1.0)
    } else {
        1.0
    };
    for rate in &mut rates {
        rate.scaled_rate *= scale;
    }
    (rates, empty_rate)
}

/// Weighted categorical pick: walk the scaled rates in table order with the
/// empty outcome last; the first slot whose cumulative total reaches the
/// roll wins. Returns `None` for the empty outcome.
#[must_use]
fn pick_slot(rates: &RateSet<'_>, roll: f64) -> Option<usize> {
    let mut cumulative = 0.0;
    for (index, rate) in rates.iter().enumerate() {
        cumulative += rate.scaled_rate;
        if roll <= cumulative {
            return Some(index);
        }
    }
    None
}

/// Drop miss-counter keys no longer present in the item's tables, keeping
/// the sentinel empty key.
pub fn prune_stale_counters(counters: &mut MissCounters, tables: &[RewardTable]) {
    counters.retain(|key, _| {
        key == EMPTY_OUTCOME_KEY
            || tables
                .iter()
                .any(|table| table.iter().any(|entry| entry.item_name == *key))
    });
}

/// Run `draw_count` draws of a loot box item, crediting rewards to the
/// backpack, updating miss streaks and consuming the source item.
///
/// # Errors
///
/// `NotFound` for an unknown item, `Validation` when `draw_count` is zero
/// or the item is not a loot box, `InsufficientResource` when the backpack
/// holds fewer than `draw_count` copies.
#[allow(clippy::cast_precision_loss)]
pub fn draw_from_item(
    doc: &mut Document,
    item_name: &str,
    draw_count: u32,
    rng: &mut impl Rng,
) -> Result<DrawReport, EngineError> {
    if draw_count == 0 {
        return Err(EngineError::Validation(
            "draw count must be greater than zero".to_string(),
        ));
    }
    let item = doc
        .items
        .get(item_name)
        .ok_or_else(|| EngineError::item_not_found(item_name))?;
    let tables: Vec<RewardTable> = item
        .resolution
        .loot_tables()
        .filter(|tables| !tables.is_empty())
        .ok_or_else(|| {
            EngineError::Validation(format!("item '{item_name}' has no loot tables"))
        })?
        .to_vec();

    let owned = doc.backpack_count(item_name);
    if owned < i64::from(draw_count) {
        return Err(EngineError::InsufficientResource {
            resource: item_name.to_string(),
            needed: f64::from(draw_count),
            available: owned as f64,
        });
    }

    let mut counters = doc
        .lootbox_miss_counts
        .remove(item_name)
        .unwrap_or_default();
    prune_stale_counters(&mut counters, &tables);

    let mut report = DrawReport::default();
    for _ in 0..draw_count {
        for table in &tables {
            let roll: f64 = rng.gen_range(0.0..1.0);
            let outcome = draw_one(table, &mut counters, roll);
            if let Some(reward) = &outcome.reward {
                doc.credit_backpack(&reward.item_name, reward.count);
                *report.summary.entry(reward.item_name.clone()).or_insert(0) += reward.count;
            }
            report.outcomes.push(outcome);
        }
    }

    doc.credit_backpack(item_name, -i64::from(draw_count));
    doc.lootbox_miss_counts
        .insert(item_name.to_string(), counters);
    Ok(report)
}

/// One categorical draw over a single table, with miss-streak bookkeeping.
fn draw_one(table: &[RewardEntry], counters: &mut MissCounters, roll: f64) -> DrawOutcome {
    let (rates, empty_rate) = scaled_table_rates(table, counters);
    let selected = pick_slot(&rates, roll);

    let outcome = match selected {
        Some(index) => {
            let winner = &rates[index];
            DrawOutcome {
                reward: Some(DrawReward {
                    item_name: winner.entry.item_name.clone(),
                    count: winner.entry.count,
                }),
                effective_rate: winner.scaled_rate,
                base_rate: winner.entry.drop_rate,
                miss_count: winner.miss_count,
            }
        }
        None => DrawOutcome {
            reward: None,
            effective_rate: empty_rate,
            base_rate: empty_rate,
            miss_count: counters.get(EMPTY_OUTCOME_KEY).copied().unwrap_or(0),
        },
    };

    // Streak bookkeeping: the winner resets, everyone else climbs.
    match selected {
        Some(index) => {
            let winner_name = rates[index].entry.item_name.clone();
            counters.insert(winner_name.clone(), 0);
            for entry in table {
                if entry.item_name != winner_name {
                    *counters.entry(entry.item_name.clone()).or_insert(0) += 1;
                }
            }
            *counters.entry(EMPTY_OUTCOME_KEY.to_string()).or_insert(0) += 1;
        }
        None => {
            counters.insert(EMPTY_OUTCOME_KEY.to_string(), 0);
            for entry in table {
                *counters.entry(entry.item_name.clone()).or_insert(0) += 1;
            }
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::RewardResolution;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn table(entries: &[(&str, i64, f64)]) -> RewardTable {
        entries
            .iter()
            .map(|(name, count, rate)| RewardEntry {
                item_name: (*name).to_string(),
                count: *count,
                drop_rate: *rate,
            })
            .collect()
    }

    fn chest_doc(tables: Vec<RewardTable>, owned: i64) -> Document {
        let mut doc = Document::default();
        let mut chest = crate::item::Item::new(1, "test chest", "consumable");
        chest.resolution = RewardResolution::LootBox(tables);
        doc.items.insert("Chest".to_string(), chest);
        doc.backpack.insert("Chest".to_string(), owned);
        doc
    }

    #[test]
    fn dynamic_rate_is_monotone_and_never_below_base() {
        let base = 0.07;
        let mut previous = 0.0;
        for miss in 0..200 {
            let rate = dynamic_rate(base, miss);
            assert!(rate >= base);
            assert!(rate >= previous);
            previous = rate;
        }
        assert!((dynamic_rate(base, 0) - base).abs() < f64::EPSILON);
    }

    #[test]
    fn scaled_rates_plus_empty_stay_normalized() {
        let table = table(&[("A", 1, 0.1), ("B", 1, 0.25), ("C", 1, 0.05)]);
        for streak in [0u32, 3, 17, 99, 4000] {
            let mut counters = MissCounters::new();
            counters.insert("A".to_string(), streak);
            counters.insert("B".to_string(), streak / 2);
            let (rates, empty) = scaled_table_rates(&table, &counters);
            let total: f64 = rates.iter().map(|r| r.scaled_rate).sum::<f64>() + empty;
            assert!((total - 1.0).abs() < 1e-9, "total {total} at streak {streak}");
        }
    }

    #[test]
    fn pity_clamps_back_toward_base_budget() {
        // Chest/Gem: rate 0.1, nine straight misses.
        let table = table(&[("Gem", 1, 0.1)]);
        let mut counters = MissCounters::new();
        counters.insert("Gem".to_string(), 9);
        assert!((dynamic_rate(0.1, 9) - 0.181).abs() < 1e-12);
        let (rates, empty) = scaled_table_rates(&table, &counters);
        assert!((empty - 0.9).abs() < 1e-12);
        assert!((rates[0].scaled_rate - 0.1).abs() < 1e-12);
    }

    #[test]
    fn fresh_counters_leave_rates_at_base() {
        // With no misses the dynamic sum equals the non-empty budget, so
        // the scale is exactly 1; any positive streak overshoots and gets
        // clamped back.
        let table = table(&[("Gem", 1, 0.1), ("Ore", 1, 0.15)]);
        let (rates, empty) = scaled_table_rates(&table, &MissCounters::new());
        assert!((rates[0].scaled_rate - 0.1).abs() < 1e-12);
        assert!((rates[1].scaled_rate - 0.15).abs() < 1e-12);
        assert!((empty - 0.75).abs() < 1e-12);

        let mut counters = MissCounters::new();
        counters.insert("Gem".to_string(), 5);
        let (rates, _) = scaled_table_rates(&table, &counters);
        assert!(rates[0].scaled_rate < dynamic_rate(0.1, 5));
    }

    #[test]
    fn stale_counter_keys_are_pruned() {
        let tables = vec![table(&[("Gem", 1, 0.1)])];
        let mut counters = MissCounters::new();
        counters.insert("Gem".to_string(), 4);
        counters.insert("Removed Reward".to_string(), 11);
        counters.insert(EMPTY_OUTCOME_KEY.to_string(), 7);
        prune_stale_counters(&mut counters, &tables);
        assert_eq!(counters.len(), 2);
        assert_eq!(counters.get("Gem"), Some(&4));
        assert_eq!(counters.get(EMPTY_OUTCOME_KEY), Some(&7));
    }

    #[test]
    fn guaranteed_drop_credits_and_consumes() {
        let mut doc = chest_doc(vec![table(&[("Gem", 2, 1.0)])], 3);
        let mut rng = SmallRng::seed_from_u64(11);
        let report = draw_from_item(&mut doc, "Chest", 3, &mut rng).unwrap();
        assert_eq!(report.summary.get("Gem"), Some(&6));
        assert_eq!(doc.backpack_count("Gem"), 6);
        assert_eq!(doc.backpack_count("Chest"), 0);
        assert_eq!(doc.lootbox_miss_counts["Chest"]["Gem"], 0);
    }

    #[test]
    fn miss_streaks_climb_on_empty_outcomes() {
        // Zero drop rate: every outcome is empty.
        let mut doc = chest_doc(vec![table(&[("Gem", 1, 0.0)])], 5);
        let mut rng = SmallRng::seed_from_u64(3);
        let report = draw_from_item(&mut doc, "Chest", 5, &mut rng).unwrap();
        assert!(report.summary.is_empty());
        assert_eq!(doc.lootbox_miss_counts["Chest"]["Gem"], 5);
        assert_eq!(doc.lootbox_miss_counts["Chest"][EMPTY_OUTCOME_KEY], 0);
    }

    #[test]
    fn draw_errors_are_reported_without_state_change() {
        let mut doc = chest_doc(vec![table(&[("Gem", 1, 0.5)])], 1);
        let mut rng = SmallRng::seed_from_u64(1);
        assert!(matches!(
            draw_from_item(&mut doc, "Chest", 0, &mut rng),
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            draw_from_item(&mut doc, "Missing", 1, &mut rng),
            Err(EngineError::NotFound { .. })
        ));
        assert!(matches!(
            draw_from_item(&mut doc, "Chest", 2, &mut rng),
            Err(EngineError::InsufficientResource { .. })
        ));
        assert_eq!(doc.backpack_count("Chest"), 1);
        assert!(doc.lootbox_miss_counts.is_empty());
    }

    #[test]
    fn empty_frequency_converges_to_base_empty_rate() {
        // Pity must never inflate the empty probability itself.
        let mut doc = chest_doc(vec![table(&[("Gem", 1, 0.3)])], 20_000);
        let mut rng = SmallRng::seed_from_u64(0xDEC0);
        let report = draw_from_item(&mut doc, "Chest", 20_000, &mut rng).unwrap();
        let empties = report
            .outcomes
            .iter()
            .filter(|o| o.reward.is_none())
            .count();
        #[allow(clippy::cast_precision_loss)]
        let frequency = empties as f64 / report.outcomes.len() as f64;
        assert!(
            (frequency - 0.7).abs() < 0.02,
            "empty frequency drifted: {frequency}"
        );
    }
}
