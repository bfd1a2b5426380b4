//! Task definitions: the core data model for scheduled work.
//!
//! Schedules, actions and conditions keep the `{"type": ..., "config": {...}}`
//! document shape on the wire, but are decoded once into closed enums so the
//! rest of the system matches exhaustively.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};

use crate::cron::{self, CronExpr};
use crate::error::{Result, TaskclawError};
use crate::message::TargetType;
use crate::timezone::{self, DEFAULT_TIMEZONE};

/// A scheduled task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique task ID. Immutable once registered.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// When/how to trigger.
    pub schedule: Schedule,
    /// Ordered action pipeline.
    pub actions: Vec<Action>,
    /// Whether the task is enabled.
    #[serde(default = "bool_true")]
    pub enabled: bool,
    /// Timestamps and counters, mutated on every run.
    #[serde(flatten)]
    pub state: RunState,
    /// Tasks that must have succeeded at least once before this one fires.
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default = "default_group")]
    pub group: String,
    /// Higher runs first among tasks due in the same poll.
    #[serde(default)]
    pub priority: i32,
    /// Extra attempts after a failed run.
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    /// Base retry delay in seconds, multiplied by the attempt number.
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,
    #[serde(default)]
    pub on_failure: FailurePolicy,
    #[serde(default = "default_created_by")]
    pub created_by: String,
    #[serde(default = "Utc::now", deserialize_with = "lenient_time::required")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now", deserialize_with = "lenient_time::required")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn bool_true() -> bool { true }
fn default_group() -> String { "default".into() }
fn default_retry_count() -> u32 { 3 }
fn default_retry_delay() -> u64 { 60 }
fn default_created_by() -> String { "system".into() }

impl Task {
    /// Create a task with a generated id and default policies.
    pub fn new(name: &str, schedule: Schedule, actions: Vec<Action>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: String::new(),
            schedule,
            actions,
            enabled: true,
            state: RunState::default(),
            dependencies: Vec::new(),
            group: default_group(),
            priority: 0,
            retry_count: default_retry_count(),
            retry_delay: default_retry_delay(),
            on_failure: FailurePolicy::default(),
            created_by: default_created_by(),
            created_at: now,
            updated_at: now,
            tags: Vec::new(),
        }
    }

    /// Replace the generated id.
    pub fn with_id(mut self, id: &str) -> Self {
        self.id = id.to_string();
        self
    }

    /// Both the task and its schedule are switched on.
    pub fn is_active(&self) -> bool {
        self.enabled && self.schedule.enabled
    }

    /// Record one finished attempt into the run state.
    pub fn record(&mut self, result: &TaskResult) {
        self.state.record(result);
        self.updated_at = Utc::now();
    }
}

/// Mutable run bookkeeping. `run_count == success_count + fail_count`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RunState {
    #[serde(default, deserialize_with = "lenient_time::optional")]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_time::optional")]
    pub next_run: Option<DateTime<Utc>>,
    #[serde(default)]
    pub run_count: u64,
    #[serde(default)]
    pub success_count: u64,
    #[serde(default)]
    pub fail_count: u64,
}

impl RunState {
    pub fn record(&mut self, result: &TaskResult) {
        self.last_run = Some(result.timestamp);
        self.run_count += 1;
        if result.success {
            self.success_count += 1;
        } else {
            self.fail_count += 1;
        }
    }
}

/// What happens once retries are exhausted.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Record and stop.
    #[default]
    Log,
    /// Tell the admin through the notifier.
    Notify,
    /// Switch the task off.
    Disable,
}

/// Immutable record of one execution attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskResult {
    #[serde(default)]
    pub task_id: String,
    pub success: bool,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Seconds.
    #[serde(default)]
    pub duration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// 1 for the first attempt of a run, 2 for the first retry, ...
    #[serde(default = "first_attempt")]
    pub attempt: u32,
}

fn first_attempt() -> u32 { 1 }

// ── Schedule ────────────────────────────────────────────────

/// When a task fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSchedule", into = "RawSchedule")]
pub struct Schedule {
    pub rule: ScheduleRule,
    /// `UTC` or a fixed offset such as `+08:00`.
    pub timezone: String,
    pub enabled: bool,
}

/// The active schedule variant.
#[derive(Debug, Clone, PartialEq)]
pub enum ScheduleRule {
    Cron(CronExpr),
    Interval(IntervalSpec),
    /// Fires once when this instant is reached.
    Once(DateTime<Utc>),
    /// Only runs on explicit request.
    Manual,
}

/// Interval period; the effective length is the sum of all units.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minutes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hours: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days: Option<u64>,
}

impl IntervalSpec {
    pub fn every_secs(seconds: u64) -> Self {
        Self { seconds: Some(seconds), ..Self::default() }
    }

    /// Effective period. Saturates at `u64::MAX` instead of overflowing.
    pub fn total_seconds(&self) -> u64 {
        [(self.seconds, 1), (self.minutes, 60), (self.hours, 3600), (self.days, 86_400)]
            .into_iter()
            .map(|(n, unit): (Option<u64>, u64)| n.unwrap_or(0).saturating_mul(unit))
            .fold(0u64, u64::saturating_add)
    }
}

impl Schedule {
    fn with_rule(rule: ScheduleRule) -> Self {
        Self { rule, timezone: DEFAULT_TIMEZONE.into(), enabled: true }
    }

    pub fn cron(expression: &str) -> Result<Self> {
        Ok(Self::with_rule(ScheduleRule::Cron(CronExpr::parse(expression)?)))
    }

    pub fn interval(seconds: u64) -> Self {
        Self::with_rule(ScheduleRule::Interval(IntervalSpec::every_secs(seconds)))
    }

    pub fn once(at: DateTime<Utc>) -> Self {
        Self::with_rule(ScheduleRule::Once(at))
    }

    pub fn manual() -> Self {
        Self::with_rule(ScheduleRule::Manual)
    }

    pub fn in_timezone(mut self, label: &str) -> Self {
        self.timezone = label.to_string();
        self
    }

    /// Fixed offset for the timezone label (UTC when not understood).
    pub fn offset(&self) -> FixedOffset {
        timezone::resolve_offset(&self.timezone)
    }

    /// The `type` tag of the variant.
    pub fn kind(&self) -> &'static str {
        match self.rule {
            ScheduleRule::Cron(_) => "cron",
            ScheduleRule::Interval(_) => "interval",
            ScheduleRule::Once(_) => "once",
            ScheduleRule::Manual => "manual",
        }
    }

    /// One-line human description.
    pub fn describe(&self) -> String {
        match &self.rule {
            ScheduleRule::Cron(expr) => format!("{} ({})", expr.describe(), self.timezone),
            ScheduleRule::Interval(spec) => cron::describe_interval(spec.total_seconds()),
            ScheduleRule::Once(at) => format!("once at {}", at.with_timezone(&self.offset()).format("%Y-%m-%d %H:%M:%S %:z")),
            ScheduleRule::Manual => "manual only".into(),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct RawSchedule {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    config: Value,
    #[serde(default = "default_timezone")]
    timezone: String,
    #[serde(default = "bool_true")]
    enabled: bool,
}

fn default_timezone() -> String { DEFAULT_TIMEZONE.into() }

impl TryFrom<RawSchedule> for Schedule {
    type Error = TaskclawError;

    fn try_from(raw: RawSchedule) -> Result<Self> {
        let rule = match raw.kind.as_str() {
            "cron" => {
                let expression = raw
                    .config
                    .get("expression")
                    .and_then(Value::as_str)
                    .ok_or_else(|| TaskclawError::Schedule("cron schedule needs config.expression".into()))?;
                ScheduleRule::Cron(CronExpr::parse(expression)?)
            }
            "interval" => {
                let spec = match raw.config.get("every").and_then(Value::as_str) {
                    Some(every) => IntervalSpec::every_secs(cron::parse_interval(every).ok_or_else(|| {
                        TaskclawError::Schedule(format!("invalid interval shorthand '{every}'"))
                    })?),
                    None => serde_json::from_value(raw.config)
                        .map_err(|e| TaskclawError::Schedule(format!("invalid interval config: {e}")))?,
                };
                ScheduleRule::Interval(spec)
            }
            "once" => {
                let text = raw
                    .config
                    .get("datetime")
                    .and_then(Value::as_str)
                    .ok_or_else(|| TaskclawError::Schedule("once schedule needs config.datetime".into()))?;
                let offset = timezone::resolve_offset(&raw.timezone);
                let at = timezone::parse_datetime(text, offset)
                    .ok_or_else(|| TaskclawError::Schedule(format!("invalid datetime '{text}'")))?;
                ScheduleRule::Once(at)
            }
            "manual" => ScheduleRule::Manual,
            other => return Err(TaskclawError::Schedule(format!("unknown schedule type '{other}'"))),
        };

        Ok(Self { rule, timezone: raw.timezone, enabled: raw.enabled })
    }
}

impl From<Schedule> for RawSchedule {
    fn from(schedule: Schedule) -> Self {
        let kind = schedule.kind().to_string();
        let config = match &schedule.rule {
            ScheduleRule::Cron(expr) => json!({ "expression": expr.as_str() }),
            ScheduleRule::Interval(spec) => serde_json::to_value(spec).unwrap_or_default(),
            ScheduleRule::Once(at) => json!({ "datetime": at.to_rfc3339() }),
            ScheduleRule::Manual => json!({}),
        };
        Self { kind, config, timezone: schedule.timezone, enabled: schedule.enabled }
    }
}

// ── Actions ─────────────────────────────────────────────────

/// One step of a task's pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawAction", into = "RawAction")]
pub struct Action {
    pub kind: ActionKind,
    /// All must hold for the action to run.
    pub conditions: Vec<Condition>,
}

impl Action {
    pub fn new(kind: ActionKind) -> Self {
        Self { kind, conditions: Vec::new() }
    }

    pub fn when(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }
}

/// The four action kinds, each with its own config shape.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionKind {
    SendMessage(SendMessageConfig),
    ApiCall(ApiCallConfig),
    FileOperation(FileOperationConfig),
    Command(CommandConfig),
}

impl ActionKind {
    pub const SEND_MESSAGE: &'static str = "send_message";
    pub const API_CALL: &'static str = "api_call";
    pub const FILE_OPERATION: &'static str = "file_operation";
    pub const COMMAND: &'static str = "command";

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::SendMessage(_) => Self::SEND_MESSAGE,
            Self::ApiCall(_) => Self::API_CALL,
            Self::FileOperation(_) => Self::FILE_OPERATION,
            Self::Command(_) => Self::COMMAND,
        }
    }

    /// Decode a config document for the given type tag.
    pub fn decode(kind: &str, config: Value) -> Result<Self> {
        let invalid = |e: serde_json::Error| TaskclawError::Validation(format!("invalid {kind} config: {e}"));
        Ok(match kind {
            Self::SEND_MESSAGE => Self::SendMessage(serde_json::from_value(config).map_err(invalid)?),
            Self::API_CALL => Self::ApiCall(serde_json::from_value(config).map_err(invalid)?),
            Self::FILE_OPERATION => Self::FileOperation(serde_json::from_value(config).map_err(invalid)?),
            Self::COMMAND => Self::Command(serde_json::from_value(config).map_err(invalid)?),
            other => return Err(TaskclawError::Validation(format!("unknown action type '{other}'"))),
        })
    }

    /// The config document for this action.
    pub fn config_value(&self) -> Value {
        let value = match self {
            Self::SendMessage(c) => serde_json::to_value(c),
            Self::ApiCall(c) => serde_json::to_value(c),
            Self::FileOperation(c) => serde_json::to_value(c),
            Self::Command(c) => serde_json::to_value(c),
        };
        value.unwrap_or_default()
    }
}

#[derive(Serialize, Deserialize)]
struct RawAction {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    config: Value,
    #[serde(default)]
    conditions: Vec<Condition>,
}

impl TryFrom<RawAction> for Action {
    type Error = TaskclawError;

    fn try_from(raw: RawAction) -> Result<Self> {
        Ok(Self { kind: ActionKind::decode(&raw.kind, raw.config)?, conditions: raw.conditions })
    }
}

impl From<Action> for RawAction {
    fn from(action: Action) -> Self {
        Self {
            kind: action.kind.type_name().to_string(),
            config: action.kind.config_value(),
            conditions: action.conditions,
        }
    }
}

/// `send_message` config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendMessageConfig {
    /// Falls back to the configured default platform.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default)]
    pub target_type: TargetType,
    #[serde(deserialize_with = "string_or_number")]
    pub target_id: String,
    pub message: String,
}

/// HTTP methods an `api_call` may use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    #[serde(alias = "get")]
    Get,
    #[serde(alias = "post")]
    Post,
    #[serde(alias = "put")]
    Put,
    #[serde(alias = "delete")]
    Delete,
    #[serde(alias = "patch")]
    Patch,
}

impl HttpMethod {
    pub const ALL: [&'static str; 5] = ["GET", "POST", "PUT", "DELETE", "PATCH"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
        }
    }

    /// Whether a JSON body is sent with this method.
    pub fn carries_body(&self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch)
    }
}

/// `api_call` config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiCallConfig {
    #[serde(default)]
    pub method: HttpMethod,
    pub url: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// JSON body for POST/PUT/PATCH.
    #[serde(default, alias = "data", skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// Seconds.
    #[serde(default = "default_api_timeout")]
    pub timeout: u64,
    #[serde(default = "default_expected_status")]
    pub expected_status: u16,
    #[serde(flatten)]
    pub forwarding: ResponseForwarding,
}

fn default_api_timeout() -> u64 { 30 }
fn default_expected_status() -> u16 { 200 }

/// Optional forwarding of an `api_call` response to a chat target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseForwarding {
    /// Dotted/bracketed paths into the JSON body, e.g. `data.items[0].title`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extract_fields: Vec<String>,
    /// Text with `{field}` placeholders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_platform: Option<String>,
    #[serde(default)]
    pub send_target_type: TargetType,
    #[serde(default, deserialize_with = "optional_string_or_number", skip_serializing_if = "Option::is_none")]
    pub send_target_id: Option<String>,
    /// Paths whose values are image URLs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_fields: Vec<String>,
    #[serde(default)]
    pub send_as_image: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_message_template: Option<String>,
    #[serde(default = "default_image_timeout")]
    pub image_download_timeout: u64,
    /// Treat the whole body as one image and forward it.
    #[serde(default)]
    pub response_is_image: bool,
}

fn default_image_timeout() -> u64 { 30 }

impl ResponseForwarding {
    /// Field extraction into a text (or image-URL) message is configured.
    pub fn wants_extraction(&self) -> bool {
        let text = !self.extract_fields.is_empty() && self.message_template.is_some();
        let images = !self.image_fields.is_empty() && self.send_as_image;
        text || images
    }
}

/// File operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileOperation {
    Backup,
    Delete,
    Move,
    Copy,
    Cleanup,
}

impl FileOperation {
    pub const ALL: [&'static str; 5] = ["backup", "delete", "move", "copy", "cleanup"];
}

/// `file_operation` config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileOperationConfig {
    pub operation: FileOperation,
    pub source_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_path: Option<String>,
    /// Backup into a zip archive.
    #[serde(default)]
    pub compress: bool,
    /// Cleanup: files older than this many days are deleted.
    #[serde(default = "default_days_old")]
    pub days_old: u64,
    /// Cleanup: file name glob (`*`, `?`).
    #[serde(default = "default_pattern")]
    pub pattern: String,
}

fn default_days_old() -> u64 { 7 }
fn default_pattern() -> String { "*".into() }

/// `command` config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandConfig {
    pub command: String,
    #[serde(default = "default_working_dir")]
    pub working_dir: String,
    /// Seconds.
    #[serde(default = "default_command_timeout")]
    pub timeout: u64,
    #[serde(default = "bool_true")]
    pub capture_output: bool,
}

fn default_working_dir() -> String { ".".into() }
fn default_command_timeout() -> u64 { 60 }

// ── Conditions ──────────────────────────────────────────────

/// Predicate gating one action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawCondition", into = "RawCondition")]
pub enum Condition {
    PreviousActionSuccess,
    PreviousActionFailed,
    /// Inclusive `HH:MM` window in local time. A start later than the end
    /// wraps past midnight, so `22:00`..`06:00` covers the night.
    TimeRange { start: String, end: String },
    /// ISO weekdays, 1 = Monday .. 7 = Sunday. Empty matches every day.
    Weekday { days: Vec<u32> },
    VariableEquals { variable: String, value: Value },
    VariableContains { variable: String, value: Value },
    VariableGreaterThan { variable: String, value: Value },
    VariableLessThan { variable: String, value: Value },
    /// A kind this build does not know. Always holds.
    Unknown { kind: String, config: Value },
    /// A known kind whose config could not be read. Never holds.
    Malformed { kind: String, config: Value, reason: String },
}

#[derive(Serialize, Deserialize)]
struct RawCondition {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    config: Value,
}

#[derive(Deserialize)]
struct TimeRangeConfig {
    #[serde(default = "default_start_time")]
    start_time: String,
    #[serde(default = "default_end_time")]
    end_time: String,
}

fn default_start_time() -> String { "00:00".into() }
fn default_end_time() -> String { "23:59".into() }

#[derive(Deserialize)]
struct WeekdayConfig {
    #[serde(default)]
    weekdays: Vec<u32>,
}

#[derive(Deserialize)]
struct VariableConfig {
    #[serde(default)]
    variable: String,
    #[serde(default)]
    value: Value,
}

impl From<RawCondition> for Condition {
    fn from(raw: RawCondition) -> Self {
        let RawCondition { kind, config } = raw;
        let config_or_empty = if config.is_null() { json!({}) } else { config.clone() };

        let decoded = match kind.as_str() {
            "previous_action_success" => Ok(Self::PreviousActionSuccess),
            "previous_action_failed" => Ok(Self::PreviousActionFailed),
            "time_range" => serde_json::from_value::<TimeRangeConfig>(config_or_empty)
                .map(|c| Self::TimeRange { start: c.start_time, end: c.end_time }),
            "weekday" => serde_json::from_value::<WeekdayConfig>(config_or_empty)
                .map(|c| Self::Weekday { days: c.weekdays }),
            "variable_equals" | "variable_contains" | "variable_greater_than" | "variable_less_than" => {
                serde_json::from_value::<VariableConfig>(config_or_empty).map(|c| {
                    let (variable, value) = (c.variable, c.value);
                    match kind.as_str() {
                        "variable_equals" => Self::VariableEquals { variable, value },
                        "variable_contains" => Self::VariableContains { variable, value },
                        "variable_greater_than" => Self::VariableGreaterThan { variable, value },
                        _ => Self::VariableLessThan { variable, value },
                    }
                })
            }
            _ => return Self::Unknown { kind, config },
        };

        decoded.unwrap_or_else(|e| Self::Malformed { reason: e.to_string(), kind, config })
    }
}

impl From<Condition> for RawCondition {
    fn from(condition: Condition) -> Self {
        let (kind, config) = match condition {
            Condition::PreviousActionSuccess => ("previous_action_success".to_string(), json!({})),
            Condition::PreviousActionFailed => ("previous_action_failed".to_string(), json!({})),
            Condition::TimeRange { start, end } => {
                ("time_range".to_string(), json!({ "start_time": start, "end_time": end }))
            }
            Condition::Weekday { days } => ("weekday".to_string(), json!({ "weekdays": days })),
            Condition::VariableEquals { variable, value } => {
                ("variable_equals".to_string(), json!({ "variable": variable, "value": value }))
            }
            Condition::VariableContains { variable, value } => {
                ("variable_contains".to_string(), json!({ "variable": variable, "value": value }))
            }
            Condition::VariableGreaterThan { variable, value } => {
                ("variable_greater_than".to_string(), json!({ "variable": variable, "value": value }))
            }
            Condition::VariableLessThan { variable, value } => {
                ("variable_less_than".to_string(), json!({ "variable": variable, "value": value }))
            }
            Condition::Unknown { kind, config } | Condition::Malformed { kind, config, .. } => (kind, config),
        };
        Self { kind, config }
    }
}

// ── serde helpers ───────────────────────────────────────────

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("expected string or number, got {other}"))),
    }
}

fn optional_string_or_number<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<String>, D::Error> {
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!("expected string or number, got {other}"))),
    }
}

/// Timestamps written by older tools may lack an offset; those are read as UTC.
mod lenient_time {
    use chrono::{DateTime, Offset, Utc};
    use serde::{Deserialize, Deserializer};

    fn parse<E: serde::de::Error>(raw: &str) -> Result<DateTime<Utc>, E> {
        crate::timezone::parse_datetime(raw, Utc.fix())
            .ok_or_else(|| E::custom(format!("invalid timestamp '{raw}'")))
    }

    pub fn required<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw)
    }

    pub fn optional<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(raw) if !raw.trim().is_empty() => parse(&raw).map(Some),
            _ => Ok(None),
        }
    }
}
