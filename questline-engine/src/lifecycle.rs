//! Recurring task lifecycle: period rollover, archival and completion.
use chrono::{Datelike, Days, NaiveDate, NaiveDateTime, NaiveTime};
use log::warn;
use std::collections::BTreeMap;

use crate::error::EngineError;
use crate::state::Document;
use crate::task::{Recurrence, TaskStatus, format_time, parse_loose_date};

/// Rewards granted by a task completion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionReward {
    pub credits: BTreeMap<String, f64>,
    pub items: BTreeMap<String, i64>,
    pub properties: BTreeMap<String, f64>,
    pub exp: f64,
}

/// The anchor of the new period when `today` no longer falls inside the
/// period anchored at `anchor`, else `None`.
fn rollover_anchor(cycle: Recurrence, anchor: NaiveDate, today: NaiveDate) -> Option<NaiveDate> {
    match cycle {
        Recurrence::None => None,
        Recurrence::Daily => (anchor != today).then_some(today),
        Recurrence::Weekly => (anchor.iso_week().week() != today.iso_week().week()
            || anchor.iso_week().year() != today.iso_week().year())
        .then(|| {
            today.checked_sub_days(Days::new(u64::from(today.weekday().num_days_from_monday())))
        })
        .flatten(),
        Recurrence::Monthly => (anchor.month() != today.month() || anchor.year() != today.year())
            .then(|| today.with_day(1))
            .flatten(),
        Recurrence::Yearly => (anchor.year() != today.year())
            .then(|| NaiveDate::from_ymd_opt(today.year(), 1, 1))
            .flatten(),
    }
}

/// Check every recurring task against the current period and reset the
/// ones whose period has rolled over, archiving a completed-period
/// snapshot first. Returns the number of tasks reset.
///
/// Idempotent within a calendar period: a second run finds every anchor
/// already inside the current period and changes nothing.
pub fn sweep_cycle_tasks(doc: &mut Document, now: NaiveDateTime) -> usize {
    let today = now.date();
    let mut updated = 0;
    let mut snapshots = Vec::new();
    let mut next_id = doc.next_task_id();

    for task in &mut doc.tasks {
        if !task.cycle.is_recurring() {
            continue;
        }
        let Some(raw) = task.start_time.as_deref() else {
            continue;
        };
        let Some(anchor) = parse_loose_date(raw) else {
            // Permissive by long-standing behavior: an unparsable anchor is
            // treated as not-yet-anchored and skipped, but loudly.
            warn!(
                "cycle sweep: task {} has unparsable start_time {:?}, skipping",
                task.id, raw
            );
            continue;
        };
        let Some(new_anchor) = rollover_anchor(task.cycle, anchor, today) else {
            continue;
        };

        // Preserve completion history before resetting the live task.
        if task.completed_count > 0 {
            let mut snapshot = task.clone();
            snapshot.id = next_id;
            next_id += 1;
            snapshot.cycle = Recurrence::None;
            snapshot.total_completion_count = snapshot.completed_count;
            if snapshot.complete_time.is_none() {
                snapshot.complete_time = Some(format_time(now));
            }
            snapshot.status = TaskStatus::Complete;
            snapshot.archived = true;
            snapshots.push(snapshot);
        }

        task.start_time = Some(format_time(new_anchor.and_time(NaiveTime::MIN)));
        task.completed_count = 0;
        task.status = TaskStatus::Incomplete;
        task.archived = false;
        task.complete_time = None;
        updated += 1;
    }

    doc.tasks.extend(snapshots);
    updated
}

/// Archive completed tasks whose completion date is not today. Absent or
/// unparsable completion times count as archivable. Returns the number of
/// tasks newly archived; already archived tasks are never revisited.
pub fn sweep_archive(doc: &mut Document, today: NaiveDate) -> usize {
    let mut archived = 0;
    for task in &mut doc.tasks {
        if task.archived || task.status != TaskStatus::Complete {
            continue;
        }
        let stale = match task.complete_time.as_deref() {
            Some(raw) => parse_loose_date(raw).is_none_or(|date| date != today),
            None => true,
        };
        if stale {
            task.archived = true;
            archived += 1;
        }
    }
    archived
}

/// Complete a task once: bump its counters, stamp the completion time,
/// advance its status and (unless `grant_rewards` is off, e.g. for
/// overflow completions) pay out its configured rewards.
///
/// # Errors
///
/// `NotFound` when no task has the given id.
pub fn complete_task(
    doc: &mut Document,
    task_id: u64,
    grant_rewards: bool,
    now: NaiveDateTime,
) -> Result<CompletionReward, EngineError> {
    let task = doc
        .task_mut(task_id)
        .ok_or_else(|| EngineError::task_not_found(task_id))?;

    task.completed_count += 1;
    task.total_completion_count += 1;
    if task.complete_time.is_none() {
        task.complete_time = Some(format_time(now));
    }
    task.status = if task.cycle.is_recurring() && task.completed_count < task.max_completions {
        TaskStatus::Recurring
    } else {
        TaskStatus::Complete
    };

    let reward = if grant_rewards {
        CompletionReward {
            credits: task.credits_reward.clone(),
            items: task.items_reward.clone(),
            properties: task.properties_reward.clone(),
            exp: task.exp_reward,
        }
    } else {
        CompletionReward::default()
    };

    for (credit, amount) in &reward.credits {
        *doc.credits.entry(credit.clone()).or_insert(0.0) += amount;
    }
    for (property, amount) in &reward.properties {
        *doc.properties.entry(property.clone()).or_insert(0.0) += amount;
    }
    for (item, count) in &reward.items {
        doc.credit_backpack(item, *count);
    }
    if reward.exp > 0.0 {
        *doc.stats.entry("exp".to_string()).or_insert(0.0) += reward.exp;
    }
    Ok(reward)
}
