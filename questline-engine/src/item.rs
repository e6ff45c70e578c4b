//! Item catalog model and reward-resolution classification.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Substring in an item category that marks a physical (real world) good.
const PHYSICAL_CATEGORY_MARKER: &str = "physical";

/// One reward slot of a loot table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardEntry {
    pub item_name: String,
    #[serde(default)]
    pub count: i64,
    /// Base probability in `[0, 1]`; the table-wide remainder is the
    /// implicit empty outcome.
    #[serde(default)]
    pub drop_rate: f64,
}

/// An ordered loot table. The sum of base rates must stay at or below 1.
pub type RewardTable = Vec<RewardEntry>;

/// One material requirement of a crafting recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeMaterial {
    pub item_name: String,
    #[serde(default)]
    pub count: i64,
}

/// An ordered list of material requirements.
pub type Recipe = Vec<RecipeMaterial>;

/// How using an item resolves its reward. Exactly one path applies per
/// item; the variant is decided once when the item definition is loaded,
/// never re-derived per use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardResolution {
    /// Probabilistic draw across one or more loot tables.
    LootBox(Vec<RewardTable>),
    /// A real-world good; using it only consumes the backpack entry.
    PhysicalGood,
    /// A GM command template with a count placeholder to substitute.
    Command(String),
    /// No usable effect configured.
    Inert,
}

impl RewardResolution {
    /// Loot tables when this item is a loot box.
    #[must_use]
    pub fn loot_tables(&self) -> Option<&[RewardTable]> {
        match self {
            Self::LootBox(tables) => Some(tables),
            _ => None,
        }
    }
}

/// A catalog item. The owning map key in the document is the item name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ItemWire", into = "ItemWire")]
pub struct Item {
    pub id: u64,
    pub description: String,
    pub category: String,
    pub icon: String,
    /// Unit cost per currency.
    pub price: BTreeMap<String, f64>,
    /// Alternative crafting recipes, outermost list ordered by index.
    pub recipes: Vec<Recipe>,
    pub resolution: RewardResolution,
}

impl Item {
    /// Create an inert catalog item.
    #[must_use]
    pub fn new(id: u64, description: &str, category: &str) -> Self {
        Self {
            id,
            description: description.to_string(),
            category: category.to_string(),
            icon: String::new(),
            price: BTreeMap::new(),
            recipes: Vec::new(),
            resolution: RewardResolution::Inert,
        }
    }

    /// Whether using this item runs the loot box draw engine.
    #[must_use]
    pub const fn is_loot_box(&self) -> bool {
        matches!(self.resolution, RewardResolution::LootBox(_))
    }
}

/// Legacy on-disk shape of an item. Reward mechanics live in three
/// mutually exclusive optional fields; [`Item`] collapses them into the
/// [`RewardResolution`] variant at load time and reconstructs them on save
/// so existing documents keep their layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemWire {
    #[serde(default)]
    id: u64,
    #[serde(default)]
    description: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    icon: String,
    #[serde(default)]
    price: BTreeMap<String, f64>,
    #[serde(default)]
    recipes: Vec<Recipe>,
    #[serde(default)]
    loot_boxes: Vec<RewardTable>,
    #[serde(default)]
    gm_command: String,
}

impl From<ItemWire> for Item {
    fn from(wire: ItemWire) -> Self {
        let resolution = if !wire.loot_boxes.is_empty() {
            RewardResolution::LootBox(wire.loot_boxes)
        } else if wire
            .category
            .to_ascii_lowercase()
            .contains(PHYSICAL_CATEGORY_MARKER)
        {
            RewardResolution::PhysicalGood
        } else if wire.gm_command.len() > 1 {
            RewardResolution::Command(wire.gm_command)
        } else {
            RewardResolution::Inert
        };
        Self {
            id: wire.id,
            description: wire.description,
            category: wire.category,
            icon: wire.icon,
            price: wire.price,
            recipes: wire.recipes,
            resolution,
        }
    }
}

impl From<Item> for ItemWire {
    fn from(item: Item) -> Self {
        let (loot_boxes, gm_command) = match item.resolution {
            RewardResolution::LootBox(tables) => (tables, String::new()),
            RewardResolution::Command(template) => (Vec::new(), template),
            RewardResolution::PhysicalGood | RewardResolution::Inert => {
                (Vec::new(), String::new())
            }
        };
        Self {
            id: item.id,
            description: item.description,
            category: item.category,
            icon: item.icon,
            price: item.price,
            recipes: item.recipes,
            loot_boxes,
            gm_command,
        }
    }
}
