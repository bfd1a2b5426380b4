//! Temporal matcher: decides whether a schedule fires at `now`.
//!
//! Due detection and due-time computation are decoupled: the first check of a
//! cron or interval task only records its baseline, the run happens on a
//! later check.

use chrono::{DateTime, Duration, Utc};
use taskclaw_core::task::{RunState, Schedule, ScheduleRule, Task};

pub use taskclaw_core::cron::next_occurrence;

/// Whether `schedule` fires at `now`. Updates `state.next_run` (cron), seeds
/// `state.last_run` (interval) and claims the run on firing so a second check
/// at the same instant does not fire again.
pub fn is_due(schedule: &Schedule, now: DateTime<Utc>, state: &mut RunState) -> bool {
    match &schedule.rule {
        ScheduleRule::Cron(expr) => {
            let offset = schedule.offset();
            match state.next_run {
                None => {
                    state.next_run = expr.next_after_in(now, offset);
                    if state.next_run.is_none() {
                        tracing::debug!("🗓️ '{}' has no occurrence within a year", expr.as_str());
                    }
                    false
                }
                Some(next) if now >= next => {
                    state.next_run = expr.next_after_in(now, offset);
                    true
                }
                Some(_) => false,
            }
        }
        ScheduleRule::Interval(spec) => {
            let Some(period) = interval_period(spec.total_seconds()) else {
                return false;
            };
            match state.last_run {
                None => {
                    state.last_run = Some(now);
                    state.next_run = now.checked_add_signed(period);
                    false
                }
                Some(last) => match last.checked_add_signed(period) {
                    Some(due) if now >= due => {
                        state.last_run = Some(now);
                        state.next_run = now.checked_add_signed(period);
                        true
                    }
                    due => {
                        state.next_run = due;
                        false
                    }
                },
            }
        }
        ScheduleRule::Once(at) => {
            if state.last_run.is_some() || state.run_count > 0 {
                state.next_run = None;
                return false;
            }
            if now >= *at {
                state.last_run = Some(now);
                state.next_run = None;
                true
            } else {
                state.next_run = Some(*at);
                false
            }
        }
        ScheduleRule::Manual => false,
    }
}

/// Positive period that chrono can represent. Zero and out-of-range
/// intervals never fire.
fn interval_period(secs: u64) -> Option<Duration> {
    if secs == 0 {
        return None;
    }
    i64::try_from(secs).ok().and_then(Duration::try_seconds)
}

/// Every dependency exists and has succeeded at least once. `success_count`
/// returns `None` for an unknown task id.
pub fn dependencies_met(task: &Task, success_count: impl Fn(&str) -> Option<u64>) -> bool {
    task.dependencies.iter().all(|dep| match success_count(dep) {
        Some(count) => count > 0,
        None => {
            tracing::warn!(task_id = %task.id, "⚠️ Dependency '{}' does not exist", dep);
            false
        }
    })
}
