//! `api_call` backend: one HTTP request, optional forwarding of the
//! response to a chat target.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Local;
use serde_json::{Value, json};
use taskclaw_core::config::ActionsConfig;
use taskclaw_core::error::{Result, TaskclawError};
use taskclaw_core::message::{MessageContent, MessageSegment};
use taskclaw_core::outcome::{ActionOutcome, codes};
use taskclaw_core::task::{ActionKind, ApiCallConfig, HttpMethod, ResponseForwarding};
use taskclaw_security::guard;

use super::{ActionBackend, MessageBackend, mismatched};
use crate::extract;

const FALLBACK_TEXT: &str = "API call completed";

/// Response body as read from the wire.
enum Body {
    Json(Value),
    Text(String),
    Bytes(Vec<u8>),
}

impl Body {
    fn size(&self) -> usize {
        match self {
            Self::Json(v) => v.to_string().len(),
            Self::Text(t) => t.len(),
            Self::Bytes(b) => b.len(),
        }
    }

    /// Form published as `response_data`.
    fn to_value(&self, content_type: &str) -> Value {
        match self {
            Self::Json(v) => v.clone(),
            Self::Text(t) => Value::String(t.clone()),
            Self::Bytes(b) => json!({ "content_type": content_type, "size": b.len() }),
        }
    }
}

pub struct HttpBackend {
    client: reqwest::Client,
    messages: MessageBackend,
    image_dir: PathBuf,
}

impl HttpBackend {
    pub fn new(config: &ActionsConfig, messages: MessageBackend) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("TaskClaw/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.default_http_timeout_secs))
            .build()
            .map_err(|e| TaskclawError::Http(format!("Client error: {e}")))?;
        Ok(Self {
            client,
            messages,
            image_dir: config.image_temp_dir.clone(),
        })
    }

    async fn call(&self, config: &ApiCallConfig) -> ActionOutcome {
        if config.url.trim().is_empty() {
            return ActionOutcome::failed_with("missing url", codes::INVALID_CONFIG);
        }
        if guard::is_metadata_host(&config.url) {
            tracing::warn!("🛡️ Blocked api_call to metadata endpoint: {}", config.url);
            return ActionOutcome::failed_with(
                format!("blocked: {} is a cloud metadata endpoint", config.url),
                codes::SECURITY_REJECTED,
            );
        }

        let method = config.method;
        let mut request = match method {
            HttpMethod::Get => self.client.get(&config.url),
            HttpMethod::Post => self.client.post(&config.url),
            HttpMethod::Put => self.client.put(&config.url),
            HttpMethod::Delete => self.client.delete(&config.url),
            HttpMethod::Patch => self.client.patch(&config.url),
        };
        request = request.timeout(Duration::from_secs(config.timeout));
        for (name, value) in &config.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if method.carries_body()
            && let Some(body) = &config.body
        {
            request = request.json(body);
        }

        let started = Instant::now();
        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => return request_failure(e, config.timeout),
        };

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let as_bytes = config.forwarding.response_is_image || extract::is_binary_content_type(&content_type);

        let body = if as_bytes {
            match response.bytes().await {
                Ok(b) => Body::Bytes(b.to_vec()),
                Err(e) => return request_failure(e, config.timeout),
            }
        } else {
            match response.text().await {
                Ok(text) => match serde_json::from_str(&text) {
                    Ok(v) => Body::Json(v),
                    Err(_) => Body::Text(text),
                },
                Err(e) => return request_failure(e, config.timeout),
            }
        };
        let response_time = started.elapsed().as_millis() as u64;
        let success = status == config.expected_status;

        tracing::info!(
            "🌐 {} {} -> {} in {}ms ({} bytes)",
            method.as_str(),
            config.url,
            status,
            response_time,
            body.size()
        );

        let mut message = if success {
            format!("API call succeeded - status {status}")
        } else {
            format!("API call failed - status {status}, expected {}", config.expected_status)
        };
        let mut data = json!({
            "url": config.url,
            "method": method.as_str(),
            "status_code": status,
            "response_time": response_time,
            "response_size": body.size(),
            "content_type": content_type,
            "is_image_response": matches!(body, Body::Bytes(_)),
        });

        if success && let Some(forwarded) = self.forward(&config.forwarding, &body, &content_type).await {
            message = format!("{message} | {}", forwarded.message);
            data["forwarded"] = Value::Bool(forwarded.success);
        }

        let outcome = if success {
            ActionOutcome::ok(message)
        } else {
            ActionOutcome::failed_with(message, codes::HTTP_STATUS)
        };
        outcome
            .with_data(data)
            .export("api_url", config.url.as_str())
            .export("status_code", status)
            .export("response_time", response_time)
            .export("response_data", body.to_value(&content_type))
    }

    /// Send the response on when configured. Direct image mode needs
    /// `response_is_image`; field extraction needs a parsed body.
    async fn forward(&self, fwd: &ResponseForwarding, body: &Body, content_type: &str) -> Option<ActionOutcome> {
        match body {
            Body::Bytes(bytes) if fwd.response_is_image => Some(self.forward_image(fwd, bytes, content_type).await),
            Body::Bytes(_) => {
                if fwd.wants_extraction() {
                    tracing::warn!("⚠️ Binary response ({}) cannot be used for field extraction", content_type);
                }
                None
            }
            Body::Json(value) if fwd.wants_extraction() => Some(self.forward_fields(fwd, value).await),
            Body::Text(text) if fwd.wants_extraction() => {
                Some(self.forward_fields(fwd, &Value::String(text.clone())).await)
            }
            _ => None,
        }
    }

    async fn forward_fields(&self, fwd: &ResponseForwarding, data: &Value) -> ActionOutcome {
        let mut fields = extract::extract_fields(data, &fwd.extract_fields);
        fields.extend(extract::time_fields(Local::now()));

        let target = fwd.send_target_id.as_deref().unwrap_or_default();
        let platform = fwd.send_platform.as_deref();

        if !fwd.image_fields.is_empty() && fwd.send_as_image {
            let urls = extract::image_urls(data, &fwd.image_fields);
            if !urls.is_empty() {
                let mut segments = Vec::with_capacity(urls.len() + 1);
                if let Some(template) = &fwd.image_message_template {
                    let text = extract::fill_template(template, &fields);
                    if !text.trim().is_empty() {
                        segments.push(MessageSegment::Text(text));
                    }
                }
                segments.extend(urls.into_iter().map(MessageSegment::ImageUrl));
                return self
                    .messages
                    .deliver(platform, fwd.send_target_type, target, MessageContent::Chain(segments))
                    .await;
            }
            tracing::warn!("⚠️ No usable image URL in response, sending text instead");
        }

        let template = fwd
            .message_template
            .as_deref()
            .or(fwd.image_message_template.as_deref())
            .unwrap_or(FALLBACK_TEXT);
        let text = extract::fill_template(template, &fields);
        self.messages
            .deliver(platform, fwd.send_target_type, target, MessageContent::Text(text))
            .await
    }

    async fn forward_image(&self, fwd: &ResponseForwarding, bytes: &[u8], content_type: &str) -> ActionOutcome {
        if let Err(e) = tokio::fs::create_dir_all(&self.image_dir).await {
            return ActionOutcome::failed_with(format!("cannot create image directory: {e}"), codes::BACKEND_ERROR);
        }
        let uuid = uuid::Uuid::new_v4().simple().to_string();
        let file_name = format!(
            "api_image_{}_{}{}",
            Local::now().format("%Y%m%d_%H%M%S"),
            &uuid[..8],
            extract::image_extension(content_type)
        );
        let path = self.image_dir.join(file_name);
        if let Err(e) = tokio::fs::write(&path, bytes).await {
            return ActionOutcome::failed_with(format!("cannot write image file: {e}"), codes::BACKEND_ERROR);
        }
        tracing::debug!("💾 Image response staged at {}", path.display());

        let mut fields = extract::time_fields(Local::now());
        fields.insert("image_size".into(), format!("{}KB", bytes.len() / 1024));
        fields.insert("content_type".into(), content_type.to_string());
        let template = fwd
            .image_message_template
            .as_deref()
            .or(fwd.message_template.as_deref())
            .unwrap_or_default();

        let mut segments = Vec::with_capacity(2);
        let text = extract::fill_template(template, &fields);
        if !text.trim().is_empty() {
            segments.push(MessageSegment::Text(text));
        }
        segments.push(MessageSegment::ImagePath(path.clone()));

        let target = fwd.send_target_id.as_deref().unwrap_or_default();
        let outcome = self
            .messages
            .deliver(fwd.send_platform.as_deref(), fwd.send_target_type, target, MessageContent::Chain(segments))
            .await;

        if let Err(e) = tokio::fs::remove_file(&path).await {
            tracing::warn!("⚠️ Failed to remove staged image {}: {}", path.display(), e);
        }
        outcome
    }
}

fn request_failure(e: reqwest::Error, timeout: u64) -> ActionOutcome {
    if e.is_timeout() {
        tracing::warn!("⏰ API call timed out after {}s", timeout);
        ActionOutcome::failed_with(format!("API call timed out ({timeout}s)"), codes::TIMEOUT)
    } else {
        ActionOutcome::failed_with(format!("API call failed: {e}"), codes::BACKEND_ERROR)
    }
}

#[async_trait]
impl ActionBackend for HttpBackend {
    fn kind(&self) -> &'static str {
        ActionKind::API_CALL
    }

    async fn execute(&self, action: &ActionKind) -> ActionOutcome {
        let ActionKind::ApiCall(config) = action else {
            return mismatched("api_call", action);
        };
        self.call(config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingMessenger;
    use std::sync::Arc;
    use taskclaw_core::message::TargetType;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend(messenger: Arc<RecordingMessenger>, image_dir: PathBuf) -> HttpBackend {
        let config = ActionsConfig { image_temp_dir: image_dir, ..ActionsConfig::default() };
        HttpBackend::new(&config, MessageBackend::new(messenger, "chat")).unwrap()
    }

    fn api(config: Value) -> ActionKind {
        ActionKind::decode(ActionKind::API_CALL, config).unwrap()
    }

    #[tokio::test]
    async fn test_get_json_success_exports_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .and(header("x-token", "abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "count": 3})))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let b = backend(Arc::new(RecordingMessenger::default()), dir.path().to_path_buf());
        let outcome = b
            .execute(&api(json!({"url": format!("{}/status", server.uri()), "headers": {"x-token": "abc"}})))
            .await;

        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(outcome.exports["status_code"], 200);
        assert_eq!(outcome.exports["response_data"]["count"], 3);
        assert_eq!(outcome.data.unwrap()["method"], "GET");
    }

    #[tokio::test]
    async fn test_unexpected_status_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let b = backend(Arc::new(RecordingMessenger::default()), dir.path().to_path_buf());
        let outcome = b.execute(&api(json!({"url": server.uri()}))).await;
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some(codes::HTTP_STATUS));
        assert_eq!(outcome.exports["response_data"], "down");
    }

    #[tokio::test]
    async fn test_post_sends_json_body_and_expected_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_json(json!({"name": "nightly"})))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let b = backend(Arc::new(RecordingMessenger::default()), dir.path().to_path_buf());
        let outcome = b
            .execute(&api(json!({
                "method": "POST", "url": server.uri(), "data": {"name": "nightly"}, "expected_status": 201
            })))
            .await;
        assert!(outcome.success, "{}", outcome.message);
    }

    #[tokio::test]
    async fn test_timeout_has_timeout_code() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let b = backend(Arc::new(RecordingMessenger::default()), dir.path().to_path_buf());
        let outcome = b.execute(&api(json!({"url": server.uri(), "timeout": 1}))).await;
        assert!(outcome.is_timeout(), "{:?}", outcome);
    }

    #[tokio::test]
    async fn test_metadata_host_blocked() {
        let dir = tempfile::tempdir().unwrap();
        let b = backend(Arc::new(RecordingMessenger::default()), dir.path().to_path_buf());
        let outcome = b.execute(&api(json!({"url": "http://169.254.169.254/latest/meta-data"}))).await;
        assert_eq!(outcome.error.as_deref(), Some(codes::SECURITY_REJECTED));
    }

    #[tokio::test]
    async fn test_extraction_forwards_text() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"data": {"items": [{"title": "Hello"}], "total": 9}})),
            )
            .mount(&server)
            .await;

        let messenger = Arc::new(RecordingMessenger::default());
        let dir = tempfile::tempdir().unwrap();
        let b = backend(messenger.clone(), dir.path().to_path_buf());
        let outcome = b
            .execute(&api(json!({
                "url": server.uri(),
                "extract_fields": ["data.items[0].title", "data.total"],
                "message_template": "{title} of {total}",
                "send_target_type": "private",
                "send_target_id": 99
            })))
            .await;

        assert!(outcome.success, "{}", outcome.message);
        assert!(outcome.message.contains(" | message sent"));
        let sent = messenger.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].target_id, "99");
        assert_eq!(sent[0].target_type, TargetType::Private);
        assert_eq!(sent[0].content, MessageContent::Text("Hello of 9".into()));
    }

    #[tokio::test]
    async fn test_image_fields_send_chain_or_fall_back() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"url": "https://img.example/cat.png", "name": "Tom"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/none"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"url": "not-a-url", "name": "Tom"})))
            .mount(&server)
            .await;

        let messenger = Arc::new(RecordingMessenger::default());
        let dir = tempfile::tempdir().unwrap();
        let b = backend(messenger.clone(), dir.path().to_path_buf());
        let config = |p: &str| {
            api(json!({
                "url": format!("{}{}", server.uri(), p),
                "extract_fields": ["name"],
                "image_fields": ["url"],
                "send_as_image": true,
                "image_message_template": "Cat: {name}",
                "send_target_id": "1"
            }))
        };

        assert!(b.execute(&config("/cat")).await.success);
        assert!(b.execute(&config("/none")).await.success);

        let sent = messenger.sent();
        assert_eq!(
            sent[0].content,
            MessageContent::Chain(vec![
                MessageSegment::Text("Cat: Tom".into()),
                MessageSegment::ImageUrl("https://img.example/cat.png".into()),
            ])
        );
        assert_eq!(sent[1].content, MessageContent::Text("Cat: Tom".into()));
    }

    #[tokio::test]
    async fn test_direct_image_response_is_staged_and_removed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0u8; 2048], "image/png"))
            .mount(&server)
            .await;

        let messenger = Arc::new(RecordingMessenger::default());
        let dir = tempfile::tempdir().unwrap();
        let b = backend(messenger.clone(), dir.path().to_path_buf());
        let outcome = b
            .execute(&api(json!({
                "url": server.uri(),
                "response_is_image": true,
                "image_message_template": "{image_size} {content_type}",
                "send_target_id": "5"
            })))
            .await;

        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(outcome.data.as_ref().unwrap()["is_image_response"], true);
        let sent = messenger.sent();
        let MessageContent::Chain(segments) = &sent[0].content else {
            panic!("expected a chain");
        };
        assert_eq!(segments[0], MessageSegment::Text("2KB image/png".into()));
        let MessageSegment::ImagePath(staged) = &segments[1] else {
            panic!("expected an image path");
        };
        assert!(staged.to_string_lossy().ends_with(".png"));
        assert!(!staged.exists());
    }

    #[tokio::test]
    async fn test_binary_response_without_flag_is_not_forwarded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(vec![1u8; 10], "application/octet-stream"))
            .mount(&server)
            .await;

        let messenger = Arc::new(RecordingMessenger::default());
        let dir = tempfile::tempdir().unwrap();
        let b = backend(messenger.clone(), dir.path().to_path_buf());
        let outcome = b.execute(&api(json!({"url": server.uri(), "send_target_id": "5"}))).await;
        assert!(outcome.success);
        assert_eq!(outcome.exports["response_data"]["size"], 10);
        assert!(messenger.sent().is_empty());
    }
}
