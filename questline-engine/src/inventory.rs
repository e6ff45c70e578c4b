//! Item usage dispatch, crafting and credit conversion.
use rand::Rng;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::error::EngineError;
use crate::item::RewardResolution;
use crate::lootbox::{self, DrawReport};
use crate::state::Document;

static COUNT_PLACEHOLDER: OnceLock<Regex> = OnceLock::new();

/// Matches the first `<...>` placeholder whose text names a quantity.
fn count_placeholder() -> &'static Regex {
    COUNT_PLACEHOLDER.get_or_init(|| {
        Regex::new(r"(?i)<[^>]*(?:count|cnt|num|qty|amount)[^>]*>")
            .expect("placeholder pattern is valid")
    })
}

/// Result of using an item, one variant per reward-resolution path.
#[derive(Debug, Clone, PartialEq)]
pub enum UseOutcome {
    /// The item was a loot box; rewards were drawn and credited.
    LootBox(DrawReport),
    /// A physical good was redeemed; nothing changes beyond consumption.
    Physical { description: String },
    /// A GM command was produced with the count substituted in.
    Command { command: String },
}

/// Use `count` copies of an item, dispatching on its resolution path.
///
/// # Errors
///
/// `Validation` for a zero count or an item with no usable effect,
/// `NotFound` for an unknown item, `InsufficientResource` when the
/// backpack holds fewer than `count` copies.
pub fn use_item(
    doc: &mut Document,
    item_name: &str,
    count: u32,
    rng: &mut impl Rng,
) -> Result<UseOutcome, EngineError> {
    if count == 0 {
        return Err(EngineError::Validation(
            "use count must be greater than zero".to_string(),
        ));
    }
    let (resolution, description) = {
        let item = doc
            .items
            .get(item_name)
            .ok_or_else(|| EngineError::item_not_found(item_name))?;
        (item.resolution.clone(), item.description.clone())
    };

    match resolution {
        RewardResolution::LootBox(_) => {
            let report = lootbox::draw_from_item(doc, item_name, count, rng)?;
            Ok(UseOutcome::LootBox(report))
        }
        RewardResolution::PhysicalGood => {
            consume(doc, item_name, count)?;
            Ok(UseOutcome::Physical { description })
        }
        RewardResolution::Command(template) => {
            let command = count_placeholder()
                .replace(&template, count.to_string().as_str())
                .into_owned();
            consume(doc, item_name, count)?;
            Ok(UseOutcome::Command { command })
        }
        RewardResolution::Inert => Err(EngineError::Validation(format!(
            "item '{item_name}' has no usable effect"
        ))),
    }
}

/// Deduct `count` copies of an item after a sufficiency check.
#[allow(clippy::cast_precision_loss)]
fn consume(doc: &mut Document, item_name: &str, count: u32) -> Result<(), EngineError> {
    let owned = doc.backpack_count(item_name);
    if owned < i64::from(count) {
        return Err(EngineError::InsufficientResource {
            resource: item_name.to_string(),
            needed: f64::from(count),
            available: owned as f64,
        });
    }
    doc.credit_backpack(item_name, -i64::from(count));
    Ok(())
}

/// Craft `count` copies of an item from one of its recipes, deducting the
/// materials and crediting the result.
///
/// # Errors
///
/// `NotFound` for an unknown item, `Validation` for a missing recipe or
/// bad index, `InsufficientResource` naming the first short material.
#[allow(clippy::cast_precision_loss)]
pub fn craft_item(
    doc: &mut Document,
    item_name: &str,
    recipe_index: usize,
    count: u32,
) -> Result<(), EngineError> {
    if count == 0 {
        return Err(EngineError::Validation(
            "craft count must be greater than zero".to_string(),
        ));
    }
    let item = doc
        .items
        .get(item_name)
        .ok_or_else(|| EngineError::item_not_found(item_name))?;
    if item.recipes.is_empty() {
        return Err(EngineError::Validation(format!(
            "item '{item_name}' has no crafting recipes"
        )));
    }
    let recipe = item.recipes.get(recipe_index).cloned().ok_or_else(|| {
        EngineError::Validation(format!(
            "recipe index {recipe_index} out of range for '{item_name}'"
        ))
    })?;

    // Check all materials before deducting any.
    for material in &recipe {
        let required = material.count * i64::from(count);
        let available = doc.backpack_count(&material.item_name);
        if available < required {
            return Err(EngineError::InsufficientResource {
                resource: material.item_name.clone(),
                needed: required as f64,
                available: available as f64,
            });
        }
    }
    for material in &recipe {
        doc.credit_backpack(&material.item_name, -material.count * i64::from(count));
    }
    doc.credit_backpack(item_name, i64::from(count));
    Ok(())
}

/// Buy `count` copies of an item: debit its unit price from every listed
/// currency and credit the backpack. Returns the amounts debited per
/// currency.
///
/// # Errors
///
/// `Validation` for a zero count, `NotFound` for an unknown item,
/// `InsufficientResource` naming the first currency that cannot cover
/// its share.
pub fn buy_item(
    doc: &mut Document,
    item_name: &str,
    count: u32,
) -> Result<BTreeMap<String, f64>, EngineError> {
    if count == 0 {
        return Err(EngineError::Validation(
            "buy count must be greater than zero".to_string(),
        ));
    }
    let price = doc
        .items
        .get(item_name)
        .ok_or_else(|| EngineError::item_not_found(item_name))?
        .price
        .clone();

    // Check every currency before debiting any.
    let mut cost = BTreeMap::new();
    for (currency, unit) in &price {
        let required = unit * f64::from(count);
        let balance = doc.credits.get(currency).copied().unwrap_or(0.0);
        if balance < required {
            return Err(EngineError::InsufficientResource {
                resource: currency.clone(),
                needed: required,
                available: balance,
            });
        }
        cost.insert(currency.clone(), required);
    }
    for (currency, required) in &cost {
        *doc.credits.entry(currency.clone()).or_insert(0.0) -= required;
    }
    doc.credit_backpack(item_name, i64::from(count));
    Ok(cost)
}

/// Convert credits: debit `amount × rate` of the source currency and
/// credit `amount` of the destination. A missing rate defaults to 1.
///
/// # Errors
///
/// `Validation` for a non-positive amount, `InsufficientResource` when the
/// source balance cannot cover the debit.
pub fn convert_credits(
    doc: &mut Document,
    from: &str,
    to: &str,
    amount: f64,
) -> Result<f64, EngineError> {
    if amount <= 0.0 {
        return Err(EngineError::Validation(
            "conversion amount must be greater than zero".to_string(),
        ));
    }
    let rate = doc
        .conversion_rates
        .get(&format!("{from}→{to}"))
        .copied()
        .unwrap_or(1.0);
    let required = amount * rate;
    let balance = doc.credits.get(from).copied().unwrap_or(0.0);
    if balance < required {
        return Err(EngineError::InsufficientResource {
            resource: from.to_string(),
            needed: required,
            available: balance,
        });
    }
    *doc.credits.entry(from.to_string()).or_insert(0.0) -= required;
    *doc.credits.entry(to.to_string()).or_insert(0.0) += amount;
    Ok(required)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{Item, RecipeMaterial, RewardEntry};
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn doc_with_item(name: &str, item: Item, owned: i64) -> Document {
        let mut doc = Document::default();
        doc.items.insert(name.to_string(), item);
        doc.backpack.insert(name.to_string(), owned);
        doc
    }

    #[test]
    fn physical_goods_consume_and_report_description() {
        let mut item = Item::new(1, "A signed poster", "physical goods");
        item.resolution = RewardResolution::PhysicalGood;
        let mut doc = doc_with_item("Poster", item, 2);
        let mut rng = SmallRng::seed_from_u64(1);

        let outcome = use_item(&mut doc, "Poster", 1, &mut rng).unwrap();
        assert_eq!(
            outcome,
            UseOutcome::Physical {
                description: "A signed poster".to_string()
            }
        );
        assert_eq!(doc.backpack_count("Poster"), 1);
    }

    #[test]
    fn command_template_substitutes_first_count_placeholder() {
        let mut item = Item::new(2, "", "misc");
        item.resolution = RewardResolution::Command("give gold <count> to <player>".to_string());
        let mut doc = doc_with_item("Voucher", item, 5);
        let mut rng = SmallRng::seed_from_u64(1);

        let outcome = use_item(&mut doc, "Voucher", 3, &mut rng).unwrap();
        assert_eq!(
            outcome,
            UseOutcome::Command {
                command: "give gold 3 to <player>".to_string()
            }
        );
        assert_eq!(doc.backpack_count("Voucher"), 2);
    }

    #[test]
    fn loot_box_path_routes_through_draw_engine() {
        let mut chest = Item::new(3, "", "consumable");
        chest.resolution = RewardResolution::LootBox(vec![vec![RewardEntry {
            item_name: "Gem".to_string(),
            count: 1,
            drop_rate: 1.0,
        }]]);
        let mut doc = doc_with_item("Chest", chest, 1);
        let mut rng = SmallRng::seed_from_u64(1);

        match use_item(&mut doc, "Chest", 1, &mut rng).unwrap() {
            UseOutcome::LootBox(report) => assert_eq!(report.summary.get("Gem"), Some(&1)),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn inert_items_cannot_be_used() {
        let mut doc = doc_with_item("Rock", Item::new(4, "", "misc"), 1);
        let mut rng = SmallRng::seed_from_u64(1);
        assert!(matches!(
            use_item(&mut doc, "Rock", 1, &mut rng),
            Err(EngineError::Validation(_))
        ));
        assert_eq!(doc.backpack_count("Rock"), 1);
    }

    #[test]
    fn crafting_checks_all_materials_before_deducting() {
        let mut sword = Item::new(5, "", "equipment");
        sword.recipes = vec![vec![
            RecipeMaterial {
                item_name: "Iron".to_string(),
                count: 2,
            },
            RecipeMaterial {
                item_name: "Wood".to_string(),
                count: 1,
            },
        ]];
        let mut doc = doc_with_item("Sword", sword, 0);
        doc.backpack.insert("Iron".to_string(), 4);
        doc.backpack.insert("Wood".to_string(), 0);

        let err = craft_item(&mut doc, "Sword", 0, 1).unwrap_err();
        assert!(matches!(
            err,
            EngineError::InsufficientResource { ref resource, .. } if resource == "Wood"
        ));
        // Nothing deducted on failure.
        assert_eq!(doc.backpack_count("Iron"), 4);

        doc.backpack.insert("Wood".to_string(), 3);
        craft_item(&mut doc, "Sword", 0, 2).unwrap();
        assert_eq!(doc.backpack_count("Sword"), 2);
        assert_eq!(doc.backpack_count("Iron"), 0);
        assert_eq!(doc.backpack_count("Wood"), 1);
    }

    #[test]
    fn buying_debits_every_currency_and_credits_backpack() {
        let mut tonic = Item::new(6, "", "consumable");
        tonic.price.insert("gold".to_string(), 5.0);
        tonic.price.insert("ember".to_string(), 1.0);
        let mut doc = doc_with_item("Tonic", tonic, 0);
        doc.credits.insert("gold".to_string(), 20.0);
        doc.credits.insert("ember".to_string(), 10.0);

        let cost = buy_item(&mut doc, "Tonic", 3).unwrap();
        assert_eq!(cost["gold"], 15.0);
        assert_eq!(cost["ember"], 3.0);
        assert_eq!(doc.credits["gold"], 5.0);
        assert_eq!(doc.credits["ember"], 7.0);
        assert_eq!(doc.backpack_count("Tonic"), 3);
    }

    #[test]
    fn buying_checks_all_currencies_before_debiting() {
        let mut tonic = Item::new(6, "", "consumable");
        tonic.price.insert("ember".to_string(), 100.0);
        tonic.price.insert("gold".to_string(), 1.0);
        let mut doc = doc_with_item("Tonic", tonic, 0);
        doc.credits.insert("gold".to_string(), 20.0);

        let err = buy_item(&mut doc, "Tonic", 1).unwrap_err();
        assert!(matches!(
            err,
            EngineError::InsufficientResource { ref resource, .. } if resource == "ember"
        ));
        // Nothing debited on failure.
        assert_eq!(doc.credits["gold"], 20.0);
        assert_eq!(doc.backpack_count("Tonic"), 0);

        assert!(matches!(
            buy_item(&mut doc, "Tonic", 0),
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            buy_item(&mut doc, "Phantom", 1),
            Err(EngineError::NotFound { .. })
        ));
    }

    #[test]
    fn conversion_debits_rate_scaled_amount() {
        let mut doc = Document::default();
        doc.credits.insert("gold".to_string(), 100.0);
        doc.conversion_rates.insert("gold→crystal".to_string(), 2.0);

        let debited = convert_credits(&mut doc, "gold", "crystal", 10.0).unwrap();
        assert_eq!(debited, 20.0);
        assert_eq!(doc.credits["gold"], 80.0);
        assert_eq!(doc.credits["crystal"], 10.0);

        assert!(matches!(
            convert_credits(&mut doc, "gold", "crystal", 50.0),
            Err(EngineError::InsufficientResource { .. })
        ));
    }
}
