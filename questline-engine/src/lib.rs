//! Questline Engine
//!
//! Core reward and task lifecycle logic for the Questline gamification
//! backend: loot box draws with an adaptive pity mechanic, recurring task
//! rollover and archival, and a guarded single-document persistence layer
//! with rotating backups. The crate has no HTTP surface; request handlers
//! sit on top of [`Engine`] and exchange plain data structures.

pub mod autotask;
pub mod error;
pub mod integrity;
pub mod inventory;
pub mod item;
pub mod lifecycle;
pub mod lootbox;
pub mod state;
pub mod store;
pub mod task;

// Re-export commonly used types
pub use autotask::{AutoTaskOutcome, LoadContext, run_daily_auto_tasks};
pub use error::EngineError;
pub use integrity::{FieldDelta, IntegrityConfig, IntegrityReport};
pub use inventory::{UseOutcome, buy_item, convert_credits, craft_item, use_item};
pub use item::{Item, Recipe, RecipeMaterial, RewardEntry, RewardResolution, RewardTable};
pub use lifecycle::{CompletionReward, complete_task, sweep_archive, sweep_cycle_tasks};
pub use lootbox::{
    DrawOutcome, DrawReport, DrawReward, EMPTY_OUTCOME_KEY, draw_from_item, dynamic_rate,
    scaled_table_rates,
};
pub use state::{AutoTaskLog, Document, MissCounters};
pub use store::{BackupPolicy, DocumentStore, SaveOptions};
pub use task::{Recurrence, Task, TaskStatus, format_time, parse_loose_date};

use chrono::Local;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use std::path::PathBuf;

/// High-level engine over one persisted document.
///
/// Every operation loads the current document, computes the new state in
/// memory and persists it through the store's guarded save, so each call
/// either fully succeeds or leaves the on-disk document untouched. The
/// daily auto-task orchestrator runs transparently on every user-initiated
/// load; internal loads pass [`LoadContext::AutoSweep`] so the sweeps'
/// own persistence can never re-enter it.
pub struct Engine {
    store: DocumentStore,
    rng: ChaCha20Rng,
}

impl Engine {
    /// Engine over the document at `path` with default policies and an
    /// OS-seeded RNG.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::from_store(DocumentStore::new(path))
    }

    /// Engine over a preconfigured store.
    #[must_use]
    pub fn from_store(store: DocumentStore) -> Self {
        let mut seed = [0u8; 32];
        rand::thread_rng().fill(&mut seed);
        Self {
            store,
            rng: ChaCha20Rng::from_seed(seed),
        }
    }

    /// Replace the RNG with a deterministic seed; draws become
    /// reproducible.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = ChaCha20Rng::seed_from_u64(seed);
        self
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    /// Load the current document, first letting the daily orchestrator run
    /// whatever sweeps are due today.
    pub fn load_document(&mut self) -> Document {
        self.load(LoadContext::UserRequest)
    }

    fn load(&mut self, ctx: LoadContext) -> Document {
        let mut doc = self.store.load_or_default();
        if ctx == LoadContext::UserRequest {
            let now = Local::now().naive_local();
            autotask::run_daily_auto_tasks(&mut self.store, &mut doc, now);
        }
        doc
    }

    /// Use an item (loot box draw, physical redemption or GM command) and
    /// persist the result.
    ///
    /// # Errors
    ///
    /// Usage errors from [`inventory::use_item`], persistence errors from
    /// the guarded save.
    pub fn use_item(&mut self, item_name: &str, count: u32) -> Result<UseOutcome, EngineError> {
        let mut doc = self.load(LoadContext::UserRequest);
        let outcome = inventory::use_item(&mut doc, item_name, count, &mut self.rng)?;
        self.store.safe_save(&doc, &SaveOptions::default())?;
        Ok(outcome)
    }

    /// Craft an item from one of its recipes and persist the result.
    ///
    /// # Errors
    ///
    /// Crafting errors from [`inventory::craft_item`], persistence errors
    /// from the guarded save.
    pub fn craft(
        &mut self,
        item_name: &str,
        recipe_index: usize,
        count: u32,
    ) -> Result<(), EngineError> {
        let mut doc = self.load(LoadContext::UserRequest);
        inventory::craft_item(&mut doc, item_name, recipe_index, count)?;
        self.store.safe_save(&doc, &SaveOptions::default())?;
        Ok(())
    }

    /// Buy an item with credits and persist the result; returns the
    /// amounts debited per currency.
    ///
    /// # Errors
    ///
    /// Purchase errors from [`inventory::buy_item`], persistence errors
    /// from the guarded save.
    pub fn buy_item(
        &mut self,
        item_name: &str,
        count: u32,
    ) -> Result<std::collections::BTreeMap<String, f64>, EngineError> {
        let mut doc = self.load(LoadContext::UserRequest);
        let cost = inventory::buy_item(&mut doc, item_name, count)?;
        self.store.safe_save(&doc, &SaveOptions::default())?;
        Ok(cost)
    }

    /// Convert credits between currencies; returns the debited source
    /// amount.
    ///
    /// # Errors
    ///
    /// Conversion errors from [`inventory::convert_credits`], persistence
    /// errors from the guarded save.
    pub fn convert_credits(
        &mut self,
        from: &str,
        to: &str,
        amount: f64,
    ) -> Result<f64, EngineError> {
        let mut doc = self.load(LoadContext::UserRequest);
        let debited = inventory::convert_credits(&mut doc, from, to, amount)?;
        self.store.safe_save(&doc, &SaveOptions::default())?;
        Ok(debited)
    }

    /// Complete a task, granting its rewards unless `grant_rewards` is
    /// off.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id, persistence errors from the guarded
    /// save.
    pub fn complete_task(
        &mut self,
        task_id: u64,
        grant_rewards: bool,
    ) -> Result<CompletionReward, EngineError> {
        let mut doc = self.load(LoadContext::UserRequest);
        let reward =
            lifecycle::complete_task(&mut doc, task_id, grant_rewards, Local::now().naive_local())?;
        self.store.safe_save(&doc, &SaveOptions::default())?;
        Ok(reward)
    }

    /// Manually run the recurring-task recycle sweep.
    ///
    /// # Errors
    ///
    /// Persistence errors when updated tasks fail to save.
    pub fn sweep_cycle_tasks(&mut self) -> Result<usize, EngineError> {
        let mut doc = self.load(LoadContext::AutoSweep);
        let updated = lifecycle::sweep_cycle_tasks(&mut doc, Local::now().naive_local());
        if updated > 0 {
            self.store.safe_save(&doc, &SaveOptions::default())?;
        }
        Ok(updated)
    }

    /// Manually run the completed-task archive sweep.
    ///
    /// # Errors
    ///
    /// Persistence errors when archived tasks fail to save.
    pub fn sweep_archive(&mut self) -> Result<usize, EngineError> {
        let mut doc = self.load(LoadContext::AutoSweep);
        let archived = lifecycle::sweep_archive(&mut doc, Local::now().date_naive());
        if archived > 0 {
            self.store.safe_save(&doc, &SaveOptions::default())?;
        }
        Ok(archived)
    }

    /// Run the daily orchestrator explicitly (idempotent per day).
    pub fn run_daily_auto_tasks_if_due(&mut self) -> AutoTaskOutcome {
        let mut doc = self.load(LoadContext::AutoSweep);
        autotask::run_daily_auto_tasks(&mut self.store, &mut doc, Local::now().naive_local())
    }

    /// Persist a document through the guarded save protocol.
    ///
    /// # Errors
    ///
    /// `Validation`, `IntegrityViolation` or `WriteFailure` per the stage
    /// that failed.
    pub fn save(&mut self, doc: &Document, opts: &SaveOptions) -> Result<(), EngineError> {
        self.store.safe_save(doc, opts)
    }
}
