//! Daily auto-task orchestrator: runs the archive and recycle sweeps at
//! most once per calendar day, tracked in the persisted auto-task log.
use chrono::NaiveDateTime;
use log::{info, warn};

use crate::lifecycle;
use crate::state::Document;
use crate::store::{DocumentStore, SaveOptions};

/// Date format stamped into the auto-task log.
const LOG_DATE_FORMAT: &str = "%Y-%m-%d";

/// Who initiated a document load. Sweeps triggered by the orchestrator
/// load with `AutoSweep`, which keeps their own persistence cycle from
/// re-entering the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadContext {
    UserRequest,
    AutoSweep,
}

/// What the orchestrator did on one invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AutoTaskOutcome {
    pub archive_ran: bool,
    pub recycle_ran: bool,
    pub tasks_archived: usize,
    pub tasks_recycled: usize,
}

fn is_due(last_run: Option<&str>, today: &str) -> bool {
    last_run != Some(today)
}

/// Run whichever daily sweeps have not yet run today, stamping each one's
/// date in the log and persisting through `safe_save`. The two sweeps are
/// independent: a persist failure in one is logged and does not block the
/// other, and the unstamped date makes the next load retry it.
pub fn run_daily_auto_tasks(
    store: &mut DocumentStore,
    doc: &mut Document,
    now: NaiveDateTime,
) -> AutoTaskOutcome {
    let today = now.date().format(LOG_DATE_FORMAT).to_string();
    let mut outcome = AutoTaskOutcome::default();

    let archive_due = is_due(
        doc.auto_task_log
            .as_ref()
            .and_then(|log| log.last_archive_date.as_deref()),
        &today,
    );
    if archive_due {
        let archived = lifecycle::sweep_archive(doc, now.date());
        doc.auto_task_log
            .get_or_insert_with(Default::default)
            .last_archive_date = Some(today.clone());
        match store.safe_save(doc, &SaveOptions::default()) {
            Ok(()) => {
                outcome.archive_ran = true;
                outcome.tasks_archived = archived;
                if archived > 0 {
                    info!("daily archive sweep archived {archived} task(s)");
                }
            }
            Err(err) => warn!("daily archive sweep failed to persist: {err}"),
        }
    }

    let recycle_due = is_due(
        doc.auto_task_log
            .as_ref()
            .and_then(|log| log.last_recycle_date.as_deref()),
        &today,
    );
    if recycle_due {
        let recycled = lifecycle::sweep_cycle_tasks(doc, now);
        doc.auto_task_log
            .get_or_insert_with(Default::default)
            .last_recycle_date = Some(today);
        match store.safe_save(doc, &SaveOptions::default()) {
            Ok(()) => {
                outcome.recycle_ran = true;
                outcome.tasks_recycled = recycled;
                if recycled > 0 {
                    info!("daily recycle sweep reset {recycled} task(s)");
                }
            }
            Err(err) => warn!("daily recycle sweep failed to persist: {err}"),
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AutoTaskLog;
    use crate::task::{Recurrence, Task, TaskStatus};
    use chrono::{NaiveDate, NaiveTime};

    fn noon(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_time(NaiveTime::from_hms_opt(12, 0, 0).unwrap())
    }

    fn seeded_doc() -> Document {
        let mut doc = Document::default();
        let mut done = Task::new(1, "finished long ago");
        done.status = TaskStatus::Complete;
        done.complete_time = Some("2024-02-01 10:00:00".to_string());
        doc.tasks.push(done);

        let mut daily = Task::new(2, "stretch");
        daily.cycle = Recurrence::Daily;
        daily.start_time = Some("2024-03-01 00:00:00".to_string());
        daily.completed_count = 1;
        doc.tasks.push(daily);
        doc
    }

    fn store_in(dir: &tempfile::TempDir) -> DocumentStore {
        DocumentStore::new(dir.path().join("data.json"))
    }

    #[test]
    fn first_run_executes_both_sweeps_and_stamps_dates() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        let mut doc = seeded_doc();
        store.save(&doc).unwrap();

        let outcome = run_daily_auto_tasks(&mut store, &mut doc, noon(2024, 3, 9));
        assert!(outcome.archive_ran);
        assert!(outcome.recycle_ran);
        assert_eq!(outcome.tasks_archived, 1);
        assert_eq!(outcome.tasks_recycled, 1);

        let log = doc.auto_task_log.as_ref().unwrap();
        assert_eq!(log.last_archive_date.as_deref(), Some("2024-03-09"));
        assert_eq!(log.last_recycle_date.as_deref(), Some("2024-03-09"));

        // Persisted, so a fresh load sees the stamps.
        let reloaded = store.load_strict().unwrap();
        assert_eq!(reloaded.auto_task_log, doc.auto_task_log);
    }

    #[test]
    fn same_day_rerun_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        let mut doc = seeded_doc();
        store.save(&doc).unwrap();

        let now = noon(2024, 3, 9);
        run_daily_auto_tasks(&mut store, &mut doc, now);
        let second = run_daily_auto_tasks(&mut store, &mut doc, now);
        assert_eq!(second, AutoTaskOutcome::default());
    }

    #[test]
    fn sweeps_are_independently_due() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        let mut doc = seeded_doc();
        doc.auto_task_log = Some(AutoTaskLog {
            last_archive_date: Some("2024-03-09".to_string()),
            last_recycle_date: None,
        });
        store.save(&doc).unwrap();

        let outcome = run_daily_auto_tasks(&mut store, &mut doc, noon(2024, 3, 9));
        assert!(!outcome.archive_ran);
        assert!(outcome.recycle_ran);
    }
}
