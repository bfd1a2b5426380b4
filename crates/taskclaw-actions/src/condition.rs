//! Per-action condition evaluation.

use std::sync::Arc;

use chrono::{Datelike, Local, NaiveDateTime};
use serde_json::Value;
use taskclaw_core::task::Condition;

use crate::template::{RunContext, VariableReplacer, value_to_string};

/// Wall-clock source, local time.
pub type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

#[derive(Clone)]
pub struct ConditionEvaluator {
    replacer: Arc<VariableReplacer>,
    clock: Clock,
}

impl ConditionEvaluator {
    pub fn new(replacer: Arc<VariableReplacer>) -> Self {
        Self {
            replacer,
            clock: Arc::new(|| Local::now().naive_local()),
        }
    }

    /// Replace the clock used by `time_range` and `weekday`.
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> NaiveDateTime + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    /// All conditions hold. An empty list holds.
    pub fn evaluate_all(&self, conditions: &[Condition], ctx: &RunContext) -> bool {
        conditions.iter().all(|c| self.evaluate(c, ctx))
    }

    pub fn evaluate(&self, condition: &Condition, ctx: &RunContext) -> bool {
        match condition {
            Condition::PreviousActionSuccess => ctx
                .get("previous_action_success")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            Condition::PreviousActionFailed => !ctx
                .get("previous_action_success")
                .and_then(Value::as_bool)
                .unwrap_or(true),
            Condition::TimeRange { start, end } => {
                let now = (self.clock)().format("%H:%M").to_string();
                in_time_window(&now, start, end)
            }
            Condition::Weekday { days } => {
                days.is_empty() || days.contains(&(self.clock)().weekday().number_from_monday())
            }
            Condition::VariableEquals { variable, value } => {
                self.lookup(variable, ctx).unwrap_or_default() == value_to_string(value)
            }
            Condition::VariableContains { variable, value } => {
                self.lookup(variable, ctx).unwrap_or_default().contains(&value_to_string(value))
            }
            Condition::VariableGreaterThan { variable, value } => {
                self.compare(variable, value, ctx, |actual, expected| actual > expected)
            }
            Condition::VariableLessThan { variable, value } => {
                self.compare(variable, value, ctx, |actual, expected| actual < expected)
            }
            Condition::Unknown { kind, .. } => {
                tracing::debug!("Unknown condition type '{}' treated as true", kind);
                true
            }
            Condition::Malformed { kind, reason, .. } => {
                tracing::warn!("⚠️ Condition '{}' could not be read ({}), treated as false", kind, reason);
                false
            }
        }
    }

    fn lookup(&self, variable: &str, ctx: &RunContext) -> Option<String> {
        self.replacer.resolve(variable.trim(), ctx)
    }

    /// Numeric comparison. An unresolved variable counts as 0; anything
    /// that does not parse as a number makes the condition false.
    fn compare(&self, variable: &str, expected: &Value, ctx: &RunContext, op: impl Fn(f64, f64) -> bool) -> bool {
        let actual = self.lookup(variable, ctx).unwrap_or_else(|| "0".into());
        let expected = match expected {
            Value::Number(n) => n.as_f64(),
            other => value_to_string(other).trim().parse().ok(),
        };
        match (actual.trim().parse::<f64>(), expected) {
            (Ok(actual), Some(expected)) => op(actual, expected),
            _ => false,
        }
    }
}

/// `HH:MM` window, inclusive. A window whose start is after its end wraps
/// past midnight.
fn in_time_window(now: &str, start: &str, end: &str) -> bool {
    if start <= end {
        start <= now && now <= end
    } else {
        now >= start || now <= end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    // Wednesday 2026-06-03 14:30
    fn evaluator() -> ConditionEvaluator {
        ConditionEvaluator::new(Arc::new(VariableReplacer::new())).with_clock(|| {
            NaiveDate::from_ymd_opt(2026, 6, 3).unwrap().and_hms_opt(14, 30, 0).unwrap()
        })
    }

    fn ctx(value: Value) -> RunContext {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_previous_action_flags() {
        let e = evaluator();
        let empty = RunContext::new();
        assert!(!e.evaluate(&Condition::PreviousActionSuccess, &empty));
        assert!(!e.evaluate(&Condition::PreviousActionFailed, &empty));

        let failed = ctx(json!({"previous_action_success": false}));
        assert!(e.evaluate(&Condition::PreviousActionFailed, &failed));
        assert!(!e.evaluate(&Condition::PreviousActionSuccess, &failed));
    }

    #[test]
    fn test_time_range() {
        let e = evaluator();
        let range = |s: &str, t: &str| Condition::TimeRange { start: s.into(), end: t.into() };
        let c = RunContext::new();
        assert!(e.evaluate(&range("09:00", "18:00"), &c));
        assert!(e.evaluate(&range("14:30", "14:30"), &c));
        assert!(!e.evaluate(&range("15:00", "18:00"), &c));
        assert!(!e.evaluate(&range("22:00", "06:00"), &c));
        assert!(e.evaluate(&range("12:00", "02:00"), &c));
    }

    #[test]
    fn test_time_range_wraps_midnight() {
        let night = Condition::TimeRange { start: "22:00".into(), end: "06:00".into() };
        let at = |h: u32, m: u32| {
            ConditionEvaluator::new(Arc::new(VariableReplacer::new()))
                .with_clock(move || NaiveDate::from_ymd_opt(2026, 6, 3).unwrap().and_hms_opt(h, m, 0).unwrap())
        };
        let c = RunContext::new();
        assert!(at(23, 15).evaluate(&night, &c));
        assert!(at(3, 0).evaluate(&night, &c));
        assert!(at(6, 0).evaluate(&night, &c));
        assert!(!at(6, 1).evaluate(&night, &c));
        assert!(!at(21, 59).evaluate(&night, &c));
    }

    #[test]
    fn test_weekday() {
        let e = evaluator();
        let c = RunContext::new();
        assert!(e.evaluate(&Condition::Weekday { days: vec![1, 3, 5] }, &c));
        assert!(!e.evaluate(&Condition::Weekday { days: vec![6, 7] }, &c));
        assert!(e.evaluate(&Condition::Weekday { days: vec![] }, &c));
    }

    #[test]
    fn test_variable_predicates() {
        let e = evaluator();
        let c = ctx(json!({"status_code": 200, "stdout": "disk 91% used", "load": "0.75"}));
        let eq = |v: &str, val: Value| Condition::VariableEquals { variable: v.into(), value: val };
        assert!(e.evaluate(&eq("status_code", json!(200)), &c));
        assert!(e.evaluate(&eq("status_code", json!("200")), &c));
        assert!(e.evaluate(&eq("missing", json!("")), &c));

        let contains = Condition::VariableContains { variable: "stdout".into(), value: json!("91%") };
        assert!(e.evaluate(&contains, &c));

        let gt = |v: &str, val: Value| Condition::VariableGreaterThan { variable: v.into(), value: val };
        let lt = |v: &str, val: Value| Condition::VariableLessThan { variable: v.into(), value: val };
        assert!(e.evaluate(&gt("load", json!(0.5)), &c));
        assert!(!e.evaluate(&gt("load", json!("0.9")), &c));
        assert!(e.evaluate(&lt("missing", json!(1)), &c));
        assert!(!e.evaluate(&gt("stdout", json!(1)), &c));
        assert!(!e.evaluate(&gt("load", json!("lots")), &c));
    }

    #[test]
    fn test_unknown_and_malformed() {
        let e = evaluator();
        let c = RunContext::new();
        assert!(e.evaluate(&Condition::Unknown { kind: "moon".into(), config: json!({}) }, &c));
        let bad = Condition::Malformed { kind: "weekday".into(), config: json!({}), reason: "bad".into() };
        assert!(!e.evaluate(&bad, &c));
        assert!(!e.evaluate_all(&[Condition::Unknown { kind: "x".into(), config: json!({}) }, bad], &c));
        assert!(e.evaluate_all(&[], &c));
    }
}
