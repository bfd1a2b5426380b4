//! `{{name}}` variable substitution.
//!
//! Lookup order: run context, custom variables, system variables, then a
//! dotted walk (`a.b.0.c`) through the run context. Names that resolve to
//! nothing are left in place verbatim.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use chrono::{DateTime, Local};
use rand::Rng;
use rand::distributions::Alphanumeric;
use regex::{Captures, Regex};
use serde::Serialize;
use serde_json::{Map, Value};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{\{([^}]+)\}\}").expect("static regex"));

/// Names of the built-in system variables.
pub const SYSTEM_VARIABLES: [&str; 12] = [
    "timestamp", "date", "time", "datetime", "weekday", "random_id", "random_string", "year", "month",
    "day", "hour", "minute",
];

/// Per-run variable environment.
pub type RunContext = Map<String, Value>;

/// A caller-registered variable.
#[derive(Clone)]
pub enum CustomVar {
    Static(Value),
    Producer(Arc<dyn Fn() -> String + Send + Sync>),
}

impl std::fmt::Debug for CustomVar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Static(v) => f.debug_tuple("Static").field(v).finish(),
            Self::Producer(_) => f.write_str("Producer(..)"),
        }
    }
}

/// Result of [`VariableReplacer::preview`].
#[derive(Debug, Clone, Serialize)]
pub struct Preview {
    pub original: String,
    pub replaced: String,
    /// Every placeholder found, with the value it resolved to.
    pub variables: BTreeMap<String, String>,
    pub has_unresolved: bool,
}

/// Result of [`VariableReplacer::check_template`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct TemplateReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct VariableReplacer {
    custom: BTreeMap<String, CustomVar>,
}

impl VariableReplacer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_custom(&mut self, name: &str, value: impl Into<Value>) {
        self.custom.insert(name.to_string(), CustomVar::Static(value.into()));
    }

    /// Register a variable whose value is computed on every lookup.
    pub fn set_producer<F>(&mut self, name: &str, producer: F)
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.custom.insert(name.to_string(), CustomVar::Producer(Arc::new(producer)));
    }

    pub fn remove_custom(&mut self, name: &str) -> bool {
        self.custom.remove(name).is_some()
    }

    pub fn clear_custom(&mut self) {
        self.custom.clear();
    }

    /// Every known placeholder with a short description.
    pub fn available_variables(&self) -> BTreeMap<String, &'static str> {
        let mut vars: BTreeMap<String, &'static str> = SYSTEM_VARIABLES
            .iter()
            .map(|name| (format!("{{{{{name}}}}}"), describe_system(name)))
            .collect();
        for name in self.custom.keys() {
            vars.insert(format!("{{{{{name}}}}}"), "custom variable");
        }
        vars
    }

    /// Resolve one variable name, `None` when nothing knows it.
    pub fn resolve(&self, name: &str, ctx: &RunContext) -> Option<String> {
        if let Some(value) = ctx.get(name) {
            return Some(value_to_string(value));
        }
        if let Some(custom) = self.custom.get(name) {
            return Some(match custom {
                CustomVar::Static(v) => value_to_string(v),
                CustomVar::Producer(f) => f(),
            });
        }
        if let Some(value) = system_variable(name, Local::now()) {
            return Some(value);
        }
        if name.contains('.') {
            return walk_path(ctx, name).map(value_to_string);
        }
        None
    }

    /// Replace every `{{name}}` in `text`.
    pub fn substitute_str(&self, text: &str, ctx: &RunContext) -> String {
        if !text.contains("{{") {
            return text.to_string();
        }
        PLACEHOLDER
            .replace_all(text, |caps: &Captures| {
                let name = caps[1].trim();
                self.resolve(name, ctx).unwrap_or_else(|| format!("{{{{{name}}}}}"))
            })
            .into_owned()
    }

    /// Substitute through nested objects and arrays. Keys and non-string
    /// scalars are left alone.
    pub fn substitute_value(&self, value: &Value, ctx: &RunContext) -> Value {
        match value {
            Value::String(s) => Value::String(self.substitute_str(s, ctx)),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.substitute_value(v, ctx)).collect()),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.substitute_value(v, ctx)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    pub fn preview(&self, text: &str, ctx: &RunContext) -> Preview {
        let replaced = self.substitute_str(text, ctx);
        let variables = PLACEHOLDER
            .captures_iter(text)
            .map(|caps| {
                let name = caps[1].trim().to_string();
                let value = self.resolve(&name, ctx).unwrap_or_else(|| format!("{{{{{name}}}}}"));
                (format!("{{{{{name}}}}}"), value)
            })
            .collect();
        Preview {
            original: text.to_string(),
            has_unresolved: replaced.contains("{{") && replaced.contains("}}"),
            replaced,
            variables,
        }
    }

    /// Static template check: balanced braces, no empty names. Unknown
    /// names are warnings since they may come from the run context.
    pub fn check_template(&self, template: &str) -> TemplateReport {
        let mut report = TemplateReport::default();
        if template.matches("{{").count() != template.matches("}}").count() {
            report.errors.push("unbalanced variable braces".into());
        }
        for caps in PLACEHOLDER.captures_iter(template) {
            let name = caps[1].trim();
            if name.is_empty() {
                report.errors.push("empty variable name".into());
            } else if name.contains('{') {
                report.errors.push(format!("invalid variable name '{name}'"));
            } else if !SYSTEM_VARIABLES.contains(&name) && !self.custom.contains_key(name) {
                report.warnings.push(format!("unknown variable '{name}'"));
            }
        }
        report.valid = report.errors.is_empty();
        report
    }
}

/// Display form of a JSON value: strings unquoted, null empty.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Walk `a.b.0.c` through objects (by key) and arrays (by index).
pub fn walk_path<'a>(root: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = root.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Value of a system variable at `now`.
pub fn system_variable(name: &str, now: DateTime<Local>) -> Option<String> {
    let value = match name {
        "timestamp" => now.timestamp().to_string(),
        "date" => now.format("%Y-%m-%d").to_string(),
        "time" => now.format("%H:%M:%S").to_string(),
        "datetime" => now.format("%Y-%m-%d %H:%M:%S").to_string(),
        "weekday" => now.format("%A").to_string(),
        "random_id" => uuid::Uuid::new_v4().simple().to_string()[..8].to_string(),
        "random_string" => rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(8)
            .map(char::from)
            .collect(),
        "year" => now.format("%Y").to_string(),
        "month" => now.format("%-m").to_string(),
        "day" => now.format("%-d").to_string(),
        "hour" => now.format("%-H").to_string(),
        "minute" => now.format("%-M").to_string(),
        _ => return None,
    };
    Some(value)
}

fn describe_system(name: &str) -> &'static str {
    match name {
        "timestamp" => "unix timestamp in seconds",
        "date" => "current date (YYYY-MM-DD)",
        "time" => "current time (HH:MM:SS)",
        "datetime" => "current date and time",
        "weekday" => "weekday name",
        "random_id" => "random 8-character id",
        "random_string" => "random 8-character alphanumeric string",
        "year" => "current year",
        "month" => "current month",
        "day" => "current day of month",
        "hour" => "current hour",
        "minute" => "current minute",
        _ => "system variable",
    }
}
