//! The persisted document: one JSON object owning all player state.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::item::{Item, RewardEntry, RewardResolution};
use crate::task::{Task, TaskStatus};

/// Dates stamped by the daily auto-task orchestrator, `YYYY-MM-DD`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoTaskLog {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_archive_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_recycle_date: Option<String>,
}

/// Per-source-item miss counters, keyed by reward name plus the sentinel
/// empty-outcome key.
pub type MissCounters = BTreeMap<String, u32>;

/// The whole persisted state. Every entity lives inside this document;
/// mutation happens in memory and the document is persisted as a whole.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub stats: BTreeMap<String, f64>,
    #[serde(default)]
    pub properties: BTreeMap<String, f64>,
    #[serde(default)]
    pub credits: BTreeMap<String, f64>,
    #[serde(default)]
    pub items: BTreeMap<String, Item>,
    /// Owned item counts. Entries are independent of the catalog: a key may
    /// sit at 0, or outlive its catalog item.
    #[serde(default)]
    pub backpack: BTreeMap<String, i64>,
    #[serde(default)]
    pub tasks: Vec<Task>,
    /// Keyed by source item name, then by reward name.
    #[serde(default)]
    pub lootbox_miss_counts: BTreeMap<String, MissCounters>,
    /// Exchange rates keyed `"<from>→<to>"`.
    #[serde(default)]
    pub conversion_rates: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_task_log: Option<AutoTaskLog>,
}

impl Document {
    /// A starter document for first launch: a small catalog, one task,
    /// zeroed backpack and default currencies.
    #[must_use]
    pub fn starter() -> Self {
        let mut doc = Self::default();
        for credit in ["gold", "crystal", "ember"] {
            doc.credits.insert(credit.to_string(), 0.0);
        }
        for stat in ["exp", "level"] {
            doc.stats.insert(stat.to_string(), 0.0);
        }
        for prop in ["strength", "vitality", "focus"] {
            doc.properties.insert(prop.to_string(), 0.0);
        }

        let mut tonic = Item::new(1101, "Restores a little vitality", "consumable");
        tonic.price.insert("gold".to_string(), 6.0);
        doc.items.insert("Vitality Tonic".to_string(), tonic);

        let mut scroll = Item::new(1102, "Grants a burst of experience", "consumable");
        scroll.price.insert("crystal".to_string(), 8.0);
        doc.items.insert("Scroll of Insight".to_string(), scroll);

        let mut chest = Item::new(1103, "A chest with a slim chance of treasure", "consumable");
        chest.price.insert("gold".to_string(), 20.0);
        chest.resolution = RewardResolution::LootBox(vec![vec![
            RewardEntry {
                item_name: "Scroll of Insight".to_string(),
                count: 1,
                drop_rate: 0.1,
            },
            RewardEntry {
                item_name: "Vitality Tonic".to_string(),
                count: 2,
                drop_rate: 0.2,
            },
        ]]);
        doc.items.insert("Wooden Chest".to_string(), chest);

        for name in doc.items.keys().cloned().collect::<Vec<_>>() {
            doc.backpack.insert(name, 0);
        }

        doc.conversion_rates.insert("gold→crystal".to_string(), 1.0);
        doc.conversion_rates.insert("crystal→gold".to_string(), 1.0);

        let mut first = Task::new(1, "First steps");
        first.description = "Complete this starter task to claim a reward".to_string();
        first.credits_reward.insert("gold".to_string(), 10.0);
        first.exp_reward = 5.0;
        doc.tasks.push(first);

        doc
    }

    /// Next unique task id, one past the current maximum.
    #[must_use]
    pub fn next_task_id(&self) -> u64 {
        self.tasks.iter().map(|t| t.id).max().unwrap_or(0) + 1
    }

    /// Find a live task by id.
    #[must_use]
    pub fn task(&self, id: u64) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Find a mutable task by id.
    pub fn task_mut(&mut self, id: u64) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    /// Owned count of an item, 0 when absent.
    #[must_use]
    pub fn backpack_count(&self, item_name: &str) -> i64 {
        self.backpack.get(item_name).copied().unwrap_or(0)
    }

    /// Add (or subtract, with a negative delta) an item count in the
    /// backpack, creating the entry when missing.
    pub fn credit_backpack(&mut self, item_name: &str, delta: i64) {
        *self.backpack.entry(item_name.to_string()).or_insert(0) += delta;
    }

    /// Live (unarchived) recurring tasks, the recycle sweep's working set.
    pub fn recurring_tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks
            .iter()
            .filter(|t| t.cycle.is_recurring() && !t.archived)
    }

    /// Tasks completed but not yet archived.
    pub fn unarchived_completed(&self) -> impl Iterator<Item = &Task> {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Complete && !t.archived)
    }
}
