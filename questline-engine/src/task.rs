//! Task model and permissive timestamp parsing.
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Timestamp format used for every timestamp the engine writes itself.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Period granularity governing when a task's live state resets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Recurrence {
    #[default]
    None,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Recurrence {
    /// Whether tasks of this class ever roll over.
    #[must_use]
    pub const fn is_recurring(self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Incomplete,
    InProgress,
    Recurring,
    Complete,
}

/// A single task in the persisted document.
///
/// `start_time` anchors the current recurrence period for recurring tasks;
/// archived historical snapshots always carry `cycle == None` and
/// `status == Complete`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "task_type")]
    pub cycle: Recurrence,
    #[serde(default)]
    pub max_completions: u32,
    #[serde(default)]
    pub completed_count: u32,
    #[serde(default)]
    pub total_completion_count: u32,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub priority: String,
    #[serde(default)]
    pub status: TaskStatus,
    /// Recurrence anchor. Kept as the raw string the client supplied;
    /// parsed permissively on use.
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub complete_time: Option<String>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub credits_reward: BTreeMap<String, f64>,
    #[serde(default)]
    pub items_reward: BTreeMap<String, i64>,
    #[serde(default)]
    pub properties_reward: BTreeMap<String, f64>,
    #[serde(default)]
    pub exp_reward: f64,
}

impl Task {
    /// Create a minimal live task with the given id and name.
    #[must_use]
    pub fn new(id: u64, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            description: String::new(),
            cycle: Recurrence::None,
            max_completions: 1,
            completed_count: 0,
            total_completion_count: 0,
            category: String::new(),
            domain: String::new(),
            priority: String::new(),
            status: TaskStatus::Incomplete,
            start_time: None,
            complete_time: None,
            archived: false,
            credits_reward: BTreeMap::new(),
            items_reward: BTreeMap::new(),
            properties_reward: BTreeMap::new(),
            exp_reward: 0.0,
        }
    }

    /// The anchor date of the current period, if `start_time` parses.
    #[must_use]
    pub fn anchor_date(&self) -> Option<NaiveDate> {
        self.start_time.as_deref().and_then(parse_loose_date)
    }

    /// The calendar date the task was completed, if `complete_time` parses.
    #[must_use]
    pub fn completion_date(&self) -> Option<NaiveDate> {
        self.complete_time.as_deref().and_then(parse_loose_date)
    }
}

/// Parse the date portion of a loosely formatted timestamp.
///
/// Clients have historically written `2024/01/05`, `2024-01-05 08:00:00`,
/// `2024-01-05T08:00:00` and bare `20240105`; only the date part matters for
/// period comparisons, so everything after the first space or `T` is dropped.
#[must_use]
pub fn parse_loose_date(raw: &str) -> Option<NaiveDate> {
    let date_part = raw.split(' ').next()?.split('T').next()?;
    if date_part.is_empty() {
        return None;
    }
    if date_part.contains('/') {
        NaiveDate::parse_from_str(date_part, "%Y/%m/%d").ok()
    } else if date_part.contains('-') {
        NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
    } else {
        NaiveDate::parse_from_str(date_part, "%Y%m%d").ok()
    }
}

/// Format a datetime the way the engine persists timestamps.
#[must_use]
pub fn format_time(ts: NaiveDateTime) -> String {
    ts.format(TIME_FORMAT).to_string()
}
