//! Field extraction from API responses and `{field}` message templates.

use std::collections::BTreeMap;

use chrono::{DateTime, Local};
use serde_json::Value;

use crate::template::value_to_string;

/// Follow `data.items[0].title` through a JSON document. Numeric parts
/// index arrays, everything else is an object key.
pub fn extract_path<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    let normalized = path.replace('[', ".").replace(']', "");
    let mut current = data;
    for part in normalized.split('.').filter(|p| !p.is_empty()) {
        current = if part.chars().all(|c| c.is_ascii_digit()) {
            current.as_array()?.get(part.parse::<usize>().ok()?)?
        } else {
            current.as_object()?.get(part)?
        };
    }
    Some(current)
}

/// Placeholder name for a path: the last segment without any index.
/// `data.items[0].title` becomes `title`, `list[2]` becomes `list`.
pub fn field_name(path: &str) -> &str {
    let last = path.rsplit('.').next().unwrap_or(path);
    last.split('[').next().unwrap_or(last)
}

/// Extract every path into `field_name -> text`. Missing fields become
/// empty strings.
pub fn extract_fields(data: &Value, paths: &[String]) -> BTreeMap<String, String> {
    paths
        .iter()
        .map(|path| {
            let value = match extract_path(data, path) {
                Some(v) => value_to_string(v),
                None => {
                    tracing::warn!("⚠️ Field '{}' not found in response", path);
                    String::new()
                }
            };
            (field_name(path).to_string(), value)
        })
        .collect()
}

/// `timestamp`, `date` and `time` placeholders.
pub fn time_fields(now: DateTime<Local>) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("timestamp".to_string(), now.timestamp().to_string()),
        ("date".to_string(), now.format("%Y-%m-%d").to_string()),
        ("time".to_string(), now.format("%H:%M:%S").to_string()),
    ])
}

/// Replace each `{key}` in `template`. Unknown placeholders stay as they are.
pub fn fill_template(template: &str, values: &BTreeMap<String, String>) -> String {
    values.iter().fold(template.to_string(), |text, (key, value)| {
        text.replace(&format!("{{{key}}}"), value)
    })
}

/// http(s) URLs found at the given paths.
pub fn image_urls(data: &Value, paths: &[String]) -> Vec<String> {
    paths
        .iter()
        .filter_map(|path| match extract_path(data, path).and_then(Value::as_str) {
            Some(url) if url.starts_with("http://") || url.starts_with("https://") => Some(url.to_string()),
            Some(other) => {
                tracing::warn!("⚠️ Ignoring non-http image URL at '{}': {}", path, other);
                None
            }
            None => {
                tracing::warn!("⚠️ No image URL at '{}'", path);
                None
            }
        })
        .collect()
}

/// File extension for an image content type, `.jpg` when unknown.
pub fn image_extension(content_type: &str) -> &'static str {
    let ct = content_type.to_ascii_lowercase();
    if ct.contains("jpeg") || ct.contains("jpg") {
        ".jpg"
    } else if ct.contains("png") {
        ".png"
    } else if ct.contains("gif") {
        ".gif"
    } else if ct.contains("webp") {
        ".webp"
    } else if ct.contains("bmp") {
        ".bmp"
    } else if ct.contains("svg") {
        ".svg"
    } else {
        ".jpg"
    }
}

/// Response bodies read as raw bytes rather than text.
pub fn is_binary_content_type(content_type: &str) -> bool {
    let ct = content_type.to_ascii_lowercase();
    ct.contains("image/") || ct.contains("application/octet-stream")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "data": {
                "items": [{"title": "Rust 2026", "cover": "https://img.example/1.png"}, {"title": "second"}],
                "count": 2,
                "local": "/tmp/x.png"
            }
        })
    }

    #[test]
    fn test_extract_path() {
        let d = sample();
        assert_eq!(extract_path(&d, "data.items[0].title"), Some(&json!("Rust 2026")));
        assert_eq!(extract_path(&d, "data.items.1.title"), Some(&json!("second")));
        assert_eq!(extract_path(&d, "data.count"), Some(&json!(2)));
        assert!(extract_path(&d, "data.items[7].title").is_none());
        assert!(extract_path(&d, "data.count.value").is_none());
        assert!(extract_path(&d, "missing").is_none());
    }

    #[test]
    fn test_field_name() {
        assert_eq!(field_name("data.items[0].title"), "title");
        assert_eq!(field_name("list[2]"), "list");
        assert_eq!(field_name("plain"), "plain");
    }

    #[test]
    fn test_extract_and_fill() {
        let fields = extract_fields(&sample(), &["data.items[0].title".into(), "data.count".into(), "data.nope".into()]);
        assert_eq!(fields["title"], "Rust 2026");
        assert_eq!(fields["count"], "2");
        assert_eq!(fields["nope"], "");
        assert_eq!(fill_template("{title} ({count}) {other}", &fields), "Rust 2026 (2) {other}");
    }

    #[test]
    fn test_image_urls_keep_only_http() {
        let urls = image_urls(&sample(), &["data.items[0].cover".into(), "data.local".into(), "data.none".into()]);
        assert_eq!(urls, vec!["https://img.example/1.png"]);
    }

    #[test]
    fn test_content_types() {
        assert_eq!(image_extension("image/jpeg"), ".jpg");
        assert_eq!(image_extension("image/png; charset=binary"), ".png");
        assert_eq!(image_extension("image/svg+xml"), ".svg");
        assert_eq!(image_extension("application/octet-stream"), ".jpg");
        assert!(is_binary_content_type("Image/WebP"));
        assert!(is_binary_content_type("application/octet-stream"));
        assert!(!is_binary_content_type("application/json"));
    }
}
