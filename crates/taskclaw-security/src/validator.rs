//! Bulk task import validation.
//!
//! Works on the raw JSON document (`{"tasks": [...]}`) so that malformed
//! input is reported with a precise location before anything is decoded.
//! Every violation in the batch is reported; any one rejects the whole batch.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use taskclaw_core::config::SecurityConfig;
use taskclaw_core::error::{Result, TaskclawError};
use taskclaw_core::task::{HttpMethod, FileOperation, Task};
use taskclaw_core::{cron, timezone};

use crate::guard;

static TASK_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").expect("static regex"));

const MAX_ID_LEN: usize = 100;
const MAX_MESSAGE_LEN: usize = 4000;
const SCHEDULE_TYPES: [&str; 4] = ["cron", "interval", "once", "manual"];
const ACTION_TYPES: [&str; 4] = ["send_message", "api_call", "file_operation", "command"];
const TARGET_TYPES: [&str; 3] = ["group", "private", "channel"];
/// Interval units with their upper bounds.
const INTERVAL_LIMITS: [(&str, f64); 4] = [("seconds", 86_400.0), ("minutes", 1440.0), ("hours", 24.0), ("days", 365.0)];
/// Longest interval in total, however it is spelled.
const MAX_INTERVAL_SECS: f64 = 365.0 * 86_400.0;
/// Upper bound for `cleanup.days_old`.
const MAX_DAYS_OLD: f64 = 36_500.0;

/// Static gate applied to any task batch before registration.
#[derive(Debug, Clone)]
pub struct ConfigValidator {
    limits: SecurityConfig,
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new(&SecurityConfig::default())
    }
}

impl ConfigValidator {
    pub fn new(limits: &SecurityConfig) -> Self {
        Self { limits: limits.clone() }
    }

    /// Parse and validate a JSON document. Returns the parsed document.
    pub fn validate_str(&self, text: &str) -> Result<Value> {
        let doc: Value = serde_json::from_str(text)
            .map_err(|e| TaskclawError::Validation(format!("invalid JSON: {e}")))?;
        self.validate(&doc)?;
        Ok(doc)
    }

    /// Validate a parsed document.
    pub fn validate(&self, doc: &Value) -> Result<()> {
        let root = doc
            .as_object()
            .ok_or_else(|| invalid("config must be a JSON object"))?;
        let tasks = root
            .get("tasks")
            .ok_or_else(|| invalid("config is missing 'tasks'"))?
            .as_array()
            .ok_or_else(|| invalid("'tasks' must be an array"))?;

        let mut problems = Vec::new();
        if tasks.len() > self.limits.max_tasks {
            problems.push(invalid(format!("at most {} tasks are allowed, got {}", self.limits.max_tasks, tasks.len())));
        }

        let mut seen = HashSet::new();
        for (i, task) in tasks.iter().enumerate() {
            if let Err(e) = self.validate_task(task, i) {
                problems.push(e);
            }
            if let Some(id) = task.get("id").and_then(Value::as_str)
                && !seen.insert(id)
            {
                problems.push(invalid(format!("task {i}: duplicate id '{id}'")));
            }
        }

        if let Err(e) = self.check_totals(tasks) {
            problems.push(e);
        }

        if problems.is_empty() {
            tracing::info!("✅ Task config validated: {} task(s)", tasks.len());
            return Ok(());
        }
        tracing::warn!("🛡️ Task config rejected with {} problem(s)", problems.len());
        Err(combine(problems))
    }

    fn validate_task(&self, task: &Value, i: usize) -> Result<()> {
        let task = task
            .as_object()
            .ok_or_else(|| invalid(format!("task {i}: must be an object")))?;

        for field in ["id", "name", "description", "schedule", "actions"] {
            if !task.contains_key(field) {
                return Err(invalid(format!("task {i}: missing required field '{field}'")));
            }
        }

        let id = non_empty_str(task, "id").ok_or_else(|| invalid(format!("task {i}: 'id' must be a non-empty string")))?;
        non_empty_str(task, "name").ok_or_else(|| invalid(format!("task {i}: 'name' must be a non-empty string")))?;

        if id.chars().count() > MAX_ID_LEN {
            return Err(invalid(format!("task {i}: id longer than {MAX_ID_LEN} characters")));
        }
        if !TASK_ID.is_match(id) {
            return Err(invalid(format!("task {i}: id may only contain letters, digits, '_' and '-'")));
        }

        let actions = task["actions"]
            .as_array()
            .filter(|a| !a.is_empty())
            .ok_or_else(|| invalid(format!("task {i}: 'actions' must be a non-empty array")))?;
        if actions.len() > self.limits.max_actions_per_task {
            return Err(invalid(format!(
                "task {i}: at most {} actions are allowed",
                self.limits.max_actions_per_task
            )));
        }

        self.validate_schedule(&task["schedule"], i)?;
        for (j, action) in actions.iter().enumerate() {
            validate_action(action, i, j)?;
        }
        Ok(())
    }

    fn validate_schedule(&self, schedule: &Value, i: usize) -> Result<()> {
        let schedule = schedule
            .as_object()
            .ok_or_else(|| invalid(format!("task {i}: schedule must be an object")))?;
        let kind = schedule
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid(format!("task {i}: schedule is missing 'type'")))?;
        if !SCHEDULE_TYPES.contains(&kind) {
            return Err(invalid(format!("task {i}: schedule.type must be one of {SCHEDULE_TYPES:?}")));
        }
        let config = schedule
            .get("config")
            .ok_or_else(|| invalid(format!("task {i}: schedule is missing 'config'")))?;

        match kind {
            "cron" => {
                let expression = config
                    .get("expression")
                    .and_then(Value::as_str)
                    .ok_or_else(|| invalid(format!("task {i}: cron schedule needs 'expression'")))?;
                if let Err(e) = cron::CronExpr::parse(expression) {
                    return Err(invalid(format!("task {i}: {e}")));
                }
            }
            "interval" => self.validate_interval(config, i)?,
            "once" => {
                let text = config
                    .get("datetime")
                    .and_then(Value::as_str)
                    .ok_or_else(|| invalid(format!("task {i}: once schedule needs 'datetime'")))?;
                let label = schedule.get("timezone").and_then(Value::as_str).unwrap_or(timezone::DEFAULT_TIMEZONE);
                if timezone::parse_datetime(text, timezone::resolve_offset(label)).is_none() {
                    return Err(invalid(format!("task {i}: invalid datetime '{text}'")));
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn validate_interval(&self, config: &Value, i: usize) -> Result<()> {
        let config = config
            .as_object()
            .ok_or_else(|| invalid(format!("task {i}: interval config must be an object")))?;

        if let Some(every) = config.get("every") {
            let secs = every
                .as_str()
                .and_then(cron::parse_interval)
                .ok_or_else(|| invalid(format!("task {i}: invalid interval shorthand {every}")))?;
            return self.check_interval_bounds(secs as f64, i);
        }

        if !INTERVAL_LIMITS.iter().any(|(unit, _)| config.contains_key(*unit)) {
            return Err(invalid(format!("task {i}: interval needs seconds, minutes, hours or days")));
        }

        let mut total = 0.0;
        for (unit, max) in INTERVAL_LIMITS {
            let Some(value) = config.get(unit) else { continue };
            let n = value
                .as_f64()
                .filter(|n| *n > 0.0)
                .ok_or_else(|| invalid(format!("task {i}: {unit} must be a number greater than 0")))?;
            if n > max {
                return Err(invalid(format!("task {i}: {unit} may not exceed {max}")));
            }
            total += n * unit_seconds(unit);
        }
        self.check_interval_bounds(total, i)
    }

    fn check_interval_bounds(&self, secs: f64, i: usize) -> Result<()> {
        if secs < self.limits.min_interval_secs as f64 {
            return Err(security(format!(
                "task {i}: interval shorter than {} seconds",
                self.limits.min_interval_secs
            )));
        }
        if secs > MAX_INTERVAL_SECS {
            return Err(invalid(format!("task {i}: interval longer than {MAX_INTERVAL_SECS} seconds")));
        }
        Ok(())
    }

    /// Batch-wide limits on sensitive and network actions.
    fn check_totals(&self, tasks: &[Value]) -> Result<()> {
        let kinds = tasks
            .iter()
            .filter_map(|t| t.get("actions").and_then(Value::as_array))
            .flatten()
            .filter_map(|a| a.get("type").and_then(Value::as_str));

        let (mut sensitive, mut api_calls) = (0, 0);
        for kind in kinds {
            match kind {
                "command" | "file_operation" => sensitive += 1,
                "api_call" => api_calls += 1,
                _ => {}
            }
        }

        if sensitive > self.limits.max_sensitive_actions {
            return Err(security(format!(
                "too many command/file actions ({sensitive}), at most {} allowed",
                self.limits.max_sensitive_actions
            )));
        }
        if api_calls > self.limits.max_api_calls {
            return Err(security(format!(
                "too many api_call actions ({api_calls}), at most {} allowed",
                self.limits.max_api_calls
            )));
        }
        Ok(())
    }
}

fn validate_action(action: &Value, i: usize, j: usize) -> Result<()> {
    let at = format!("task {i} action {j}");
    let action = action
        .as_object()
        .ok_or_else(|| invalid(format!("{at}: must be an object")))?;
    let kind = action
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid(format!("{at}: missing 'type'")))?;
    if !ACTION_TYPES.contains(&kind) {
        return Err(invalid(format!("{at}: type must be one of {ACTION_TYPES:?}")));
    }
    let config = action
        .get("config")
        .and_then(Value::as_object)
        .ok_or_else(|| invalid(format!("{at}: missing 'config' object")))?;

    match kind {
        "send_message" => validate_send_message(config, &at),
        "api_call" => validate_api_call(config, &at),
        "file_operation" => validate_file_operation(config, &at),
        _ => validate_command(config, &at),
    }
}

fn validate_send_message(config: &Map<String, Value>, at: &str) -> Result<()> {
    for field in ["target_type", "target_id", "message"] {
        if !config.contains_key(field) {
            return Err(invalid(format!("{at}: send_message is missing '{field}'")));
        }
    }
    let target_type = config["target_type"].as_str().unwrap_or_default();
    if !TARGET_TYPES.contains(&target_type) {
        return Err(invalid(format!("{at}: target_type must be group, private or channel")));
    }
    let message = config["message"]
        .as_str()
        .ok_or_else(|| invalid(format!("{at}: message must be a string")))?;
    if message.chars().count() > MAX_MESSAGE_LEN {
        return Err(invalid(format!("{at}: message longer than {MAX_MESSAGE_LEN} characters")));
    }
    Ok(())
}

fn validate_api_call(config: &Map<String, Value>, at: &str) -> Result<()> {
    for field in ["method", "url"] {
        if !config.contains_key(field) {
            return Err(invalid(format!("{at}: api_call is missing '{field}'")));
        }
    }
    let method = config["method"].as_str().unwrap_or_default().to_uppercase();
    if !HttpMethod::ALL.contains(&method.as_str()) {
        return Err(invalid(format!("{at}: unsupported HTTP method '{}'", config["method"])));
    }

    let url = config["url"]
        .as_str()
        .ok_or_else(|| invalid(format!("{at}: url must be a string")))?;
    guard::check_url(url).map_err(|reason| {
        tracing::warn!("🛡️ Rejected api_call URL: {}", reason);
        security(format!("{at}: {reason}"))
    })?;

    number_in_range(config, "timeout", 1.0, 300.0, at)?;
    number_in_range(config, "image_download_timeout", 1.0, 120.0, at)?;

    if let Some(fields) = config.get("image_fields") {
        let fields = fields
            .as_array()
            .ok_or_else(|| invalid(format!("{at}: image_fields must be an array")))?;
        if fields.iter().any(|f| f.as_str().is_none_or(|s| s.trim().is_empty())) {
            return Err(invalid(format!("{at}: image_fields entries must be non-empty strings")));
        }
    }
    for flag in ["send_as_image", "response_is_image"] {
        if config.get(flag).is_some_and(|v| !v.is_boolean()) {
            return Err(invalid(format!("{at}: {flag} must be a boolean")));
        }
    }
    for template in ["message_template", "image_message_template"] {
        if config.get(template).is_some_and(|v| !v.is_string()) {
            return Err(invalid(format!("{at}: {template} must be a string")));
        }
    }
    Ok(())
}

fn validate_file_operation(config: &Map<String, Value>, at: &str) -> Result<()> {
    let operation = config
        .get("operation")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid(format!("{at}: file_operation is missing 'operation'")))?;
    if !FileOperation::ALL.contains(&operation) {
        return Err(invalid(format!("{at}: operation must be one of {:?}", FileOperation::ALL)));
    }
    if !config.contains_key("source_path") {
        return Err(invalid(format!("{at}: file_operation is missing 'source_path'")));
    }
    for field in ["source_path", "target_path"] {
        let Some(value) = config.get(field) else { continue };
        let path = value
            .as_str()
            .ok_or_else(|| invalid(format!("{at}: {field} must be a string")))?;
        guard::check_file_path(path).map_err(|reason| {
            tracing::warn!("🛡️ Rejected file path: {}", reason);
            security(format!("{at}: unsafe {field}: {reason}"))
        })?;
    }
    number_in_range(config, "days_old", 0.0, MAX_DAYS_OLD, at)
}

fn validate_command(config: &Map<String, Value>, at: &str) -> Result<()> {
    let command = config
        .get("command")
        .ok_or_else(|| invalid(format!("{at}: command is missing 'command'")))?
        .as_str()
        .ok_or_else(|| invalid(format!("{at}: command must be a string")))?;
    guard::check_command_text(command).map_err(|reason| {
        tracing::warn!("🛡️ Rejected command: {}", reason);
        security(format!("{at}: {reason}"))
    })
}

fn number_in_range(config: &Map<String, Value>, field: &str, min: f64, max: f64, at: &str) -> Result<()> {
    match config.get(field) {
        None => Ok(()),
        Some(v) => match v.as_f64() {
            Some(n) if n >= min && n <= max => Ok(()),
            _ => Err(invalid(format!("{at}: {field} must be a number between {min} and {max}"))),
        },
    }
}

fn non_empty_str<'a>(obj: &'a Map<String, Value>, field: &str) -> Option<&'a str> {
    obj.get(field).and_then(Value::as_str).filter(|s| !s.trim().is_empty())
}

fn unit_seconds(unit: &str) -> f64 {
    match unit {
        "minutes" => 60.0,
        "hours" => 3600.0,
        "days" => 86_400.0,
        _ => 1.0,
    }
}

/// One error for the whole batch. A single problem keeps its own kind; several
/// are listed in order and count as a security violation if any one is.
fn combine(mut problems: Vec<TaskclawError>) -> TaskclawError {
    if problems.len() == 1 {
        return problems.remove(0);
    }
    let any_security = problems.iter().any(|e| matches!(e, TaskclawError::Security(_)));
    let reasons: Vec<String> = problems
        .iter()
        .map(|e| match e {
            TaskclawError::Validation(m) | TaskclawError::Security(m) => m.clone(),
            other => other.to_string(),
        })
        .collect();
    let message = format!("{} problems: {}", reasons.len(), reasons.join("; "));
    if any_security { security(message) } else { invalid(message) }
}

fn invalid(msg: impl Into<String>) -> TaskclawError {
    TaskclawError::Validation(msg.into())
}

fn security(msg: impl Into<String>) -> TaskclawError {
    TaskclawError::Security(msg.into())
}

/// Validate a `{"tasks": [...]}` document and decode it into tasks.
pub fn import_tasks(text: &str, limits: &SecurityConfig) -> Result<Vec<Task>> {
    let doc = ConfigValidator::new(limits).validate_str(text)?;
    let tasks = doc
        .get("tasks")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    tasks
        .into_iter()
        .enumerate()
        .map(|(i, t)| {
            serde_json::from_value::<Task>(t).map_err(|e| invalid(format!("task {i}: {e}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn task(id: &str) -> Value {
        json!({
            "id": id,
            "name": format!("Task {id}"),
            "description": "test task",
            "schedule": {"type": "interval", "config": {"minutes": 5}},
            "actions": [
                {"type": "send_message", "config": {"target_type": "group", "target_id": "100", "message": "ping"}}
            ]
        })
    }

    fn batch(tasks: Vec<Value>) -> Value {
        json!({ "tasks": tasks })
    }

    fn check(doc: &Value) -> Result<()> {
        ConfigValidator::default().validate(doc)
    }

    #[test]
    fn test_mixed_batch_rejected_then_accepted() {
        let api = |url: &str| {
            let mut t = task("api");
            t["actions"] = json!([{"type": "api_call", "config": {"method": "GET", "url": url}}]);
            t
        };
        let cmd = |command: &str| {
            let mut t = task("cmd");
            t["actions"] = json!([{"type": "command", "config": {"command": command}}]);
            t
        };

        let mut too_many: Vec<Value> = (0..51).map(|i| task(&format!("t{i}"))).collect();
        assert!(check(&batch(too_many.clone())).is_err());
        too_many.truncate(50);
        assert!(check(&batch(too_many)).is_ok());

        let mut missing = task("m");
        missing.as_object_mut().unwrap().remove("schedule");
        assert!(check(&batch(vec![missing])).is_err());
        assert!(check(&batch(vec![task("m")])).is_ok());

        assert!(check(&batch(vec![api("http://localhost/x")])).is_err());
        assert!(check(&batch(vec![api("https://api.example.com/x")])).is_ok());

        assert!(check(&batch(vec![cmd("rm -rf /")])).is_err());
        assert!(check(&batch(vec![cmd("df -h")])).is_ok());
    }

    #[test]
    fn test_every_defect_in_one_batch_is_reported() {
        let mut tasks: Vec<Value> = (0..51).map(|i| task(&format!("t{i}"))).collect();
        tasks[3].as_object_mut().unwrap().remove("schedule");
        tasks[7]["actions"] = json!([{"type": "api_call", "config": {"method": "GET", "url": "http://localhost/x"}}]);
        tasks[9]["actions"] = json!([{"type": "command", "config": {"command": "rm -rf /"}}]);

        let err = check(&batch(tasks.clone())).unwrap_err();
        assert!(matches!(err, TaskclawError::Security(_)), "{err}");
        let text = err.to_string();
        assert!(text.contains("4 problems"), "{text}");
        assert!(text.contains("at most 50 tasks"), "{text}");
        assert!(text.contains("task 3: missing required field 'schedule'"), "{text}");
        assert!(text.contains("task 7 action 0") && text.contains("localhost"), "{text}");
        assert!(text.contains("task 9 action 0") && text.contains("rm -rf"), "{text}");
        assert!(import_tasks(&batch(tasks.clone()).to_string(), &SecurityConfig::default()).is_err());

        tasks.truncate(50);
        tasks[3] = task("t3");
        tasks[7]["actions"] = json!([{"type": "api_call", "config": {"method": "GET", "url": "https://api.example.com/x"}}]);
        tasks[9]["actions"] = json!([{"type": "command", "config": {"command": "df -h"}}]);
        let imported = import_tasks(&batch(tasks).to_string(), &SecurityConfig::default()).unwrap();
        assert_eq!(imported.len(), 50);
    }

    #[test]
    fn test_numeric_bounds_on_large_values() {
        let with_schedule = |schedule: Value| {
            let mut t = task("s");
            t["schedule"] = schedule;
            batch(vec![t])
        };
        assert!(check(&with_schedule(json!({"type": "interval", "config": {"every": "999999999999d"}}))).is_err());
        assert!(check(&with_schedule(json!({"type": "interval", "config": {"every": "366d"}}))).is_err());
        assert!(check(&with_schedule(json!({"type": "interval", "config": {"every": "365d"}}))).is_ok());
        assert!(check(&with_schedule(json!({"type": "interval", "config": {"days": 365, "hours": 24}}))).is_err());

        let cleanup = |days_old: Value| {
            let mut t = task("f");
            t["actions"] = json!([{"type": "file_operation", "config": {"operation": "cleanup", "source_path": "./logs", "days_old": days_old}}]);
            batch(vec![t])
        };
        assert!(check(&cleanup(json!(30))).is_ok());
        assert!(check(&cleanup(json!(u64::MAX))).is_err());
        assert!(check(&cleanup(json!(-1))).is_err());
    }

    #[test]
    fn test_identifier_rules() {
        assert!(check(&batch(vec![task("ok_id-1")])).is_ok());
        assert!(check(&batch(vec![task("bad id")])).is_err());
        assert!(check(&batch(vec![task(&"x".repeat(101))])).is_err());
        assert!(check(&batch(vec![task("   ")])).is_err());
        let err = check(&batch(vec![task("dup"), task("dup")])).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_schedule_rules() {
        let with_schedule = |schedule: Value| {
            let mut t = task("s");
            t["schedule"] = schedule;
            batch(vec![t])
        };
        assert!(check(&with_schedule(json!({"type": "cron", "config": {"expression": "*/5 * * * *"}}))).is_ok());
        assert!(check(&with_schedule(json!({"type": "cron", "config": {"expression": "99 * * * *"}}))).is_err());
        assert!(check(&with_schedule(json!({"type": "interval", "config": {"seconds": 86_401}}))).is_err());
        assert!(check(&with_schedule(json!({"type": "interval", "config": {"seconds": 5}}))).is_err());
        assert!(check(&with_schedule(json!({"type": "interval", "config": {"hours": 0}}))).is_err());
        assert!(check(&with_schedule(json!({"type": "interval", "config": {"days": 366}}))).is_err());
        assert!(check(&with_schedule(json!({"type": "interval", "config": {}}))).is_err());
        assert!(check(&with_schedule(json!({"type": "interval", "config": {"every": "15m"}}))).is_ok());
        assert!(check(&with_schedule(json!({"type": "once", "config": {"datetime": "2026-12-01 10:00:00"}}))).is_ok());
        assert!(check(&with_schedule(json!({"type": "once", "config": {"datetime": "later"}}))).is_err());
        assert!(check(&with_schedule(json!({"type": "manual", "config": {}}))).is_ok());
        assert!(check(&with_schedule(json!({"type": "manual"}))).is_err());
        assert!(check(&with_schedule(json!({"type": "hourly", "config": {}}))).is_err());
    }

    #[test]
    fn test_action_rules() {
        let with_action = |action: Value| {
            let mut t = task("a");
            t["actions"] = json!([action]);
            batch(vec![t])
        };
        assert!(check(&with_action(json!({"type": "send_message", "config": {"target_type": "room", "target_id": "1", "message": "x"}}))).is_err());
        assert!(check(&with_action(json!({"type": "send_message", "config": {"target_type": "group", "target_id": "1", "message": "x".repeat(4001)}}))).is_err());
        assert!(check(&with_action(json!({"type": "api_call", "config": {"method": "TRACE", "url": "https://a.example"}}))).is_err());
        assert!(check(&with_action(json!({"type": "api_call", "config": {"method": "get", "url": "https://a.example", "timeout": 301}}))).is_err());
        assert!(check(&with_action(json!({"type": "api_call", "config": {"method": "GET", "url": "https://a.example", "send_as_image": "yes"}}))).is_err());
        assert!(check(&with_action(json!({"type": "api_call", "config": {"method": "GET", "url": "https://a.example", "image_download_timeout": 121}}))).is_err());
        assert!(check(&with_action(json!({"type": "api_call", "config": {"method": "GET", "url": "https://a.example", "image_fields": ["data.url", ""]}}))).is_err());
        assert!(check(&with_action(json!({"type": "file_operation", "config": {"operation": "shred", "source_path": "./data"}}))).is_err());
        assert!(check(&with_action(json!({"type": "file_operation", "config": {"operation": "copy", "source_path": "./data/../x"}}))).is_err());
        assert!(check(&with_action(json!({"type": "file_operation", "config": {"operation": "backup", "source_path": "./data", "target_path": "/etc/backup"}}))).is_err());
        assert!(check(&with_action(json!({"type": "file_operation", "config": {"operation": "backup", "source_path": "./data", "target_path": "/tmp/backup.zip"}}))).is_ok());
        assert!(check(&with_action(json!({"type": "command", "config": {"command": "ls | wc -l"}}))).is_err());
        assert!(check(&with_action(json!({"type": "teleport", "config": {}}))).is_err());
    }

    #[test]
    fn test_batch_totals() {
        let cmd_task = |i: usize| {
            let mut t = task(&format!("c{i}"));
            t["actions"] = json!([{"type": "command", "config": {"command": "uptime"}}]);
            t
        };
        assert!(check(&batch((0..10).map(cmd_task).collect())).is_ok());
        let err = check(&batch((0..11).map(cmd_task).collect())).unwrap_err();
        assert!(matches!(err, TaskclawError::Security(_)));
    }

    #[test]
    fn test_import_decodes_tasks() {
        let text = batch(vec![task("first"), task("second")]).to_string();
        let tasks = import_tasks(&text, &SecurityConfig::default()).unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].id, "first");
        assert_eq!(tasks[1].schedule.kind(), "interval");

        assert!(import_tasks("{not json", &SecurityConfig::default()).is_err());
        assert!(import_tasks("[]", &SecurityConfig::default()).is_err());
    }
}
