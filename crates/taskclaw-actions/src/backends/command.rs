//! `command` backend: allowlisted programs in a minimal environment.
//!
//! The command line is split by the guard and executed directly, never
//! through a shell, so metacharacters and line breaks have no meaning.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use taskclaw_core::config::{ActionsConfig, SecurityConfig};
use taskclaw_core::outcome::{ActionOutcome, codes};
use taskclaw_core::task::{ActionKind, CommandConfig};
use taskclaw_security::CommandGuard;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::{ActionBackend, mismatched};

/// The only environment a command sees.
const SAFE_ENV: [(&str, &str); 5] = [
    ("PATH", "/usr/local/bin:/usr/bin:/bin"),
    ("HOME", "/tmp"),
    ("USER", "scheduler"),
    ("SHELL", "/bin/sh"),
    ("LC_ALL", "C"),
];

pub struct CommandBackend {
    enabled: bool,
    guard: CommandGuard,
    output_limit: usize,
}

impl CommandBackend {
    pub fn new(actions: &ActionsConfig, security: &SecurityConfig) -> Self {
        Self {
            enabled: actions.enable_command_execution,
            guard: CommandGuard::new(security),
            output_limit: actions.command_output_limit,
        }
    }

    async fn run(&self, config: &CommandConfig) -> ActionOutcome {
        let command = config.command.trim();
        if command.is_empty() {
            return ActionOutcome::failed_with("missing command", codes::INVALID_CONFIG);
        }
        let argv = match self.guard.argv(command) {
            Ok(argv) => argv,
            Err(reason) => {
                tracing::warn!("🛡️ Command rejected: {:?} ({})", command, reason);
                return ActionOutcome::failed_with(format!("unsafe command rejected: {reason}"), codes::SECURITY_REJECTED);
            }
        };
        let Some((program, args)) = argv.split_first() else {
            return ActionOutcome::failed_with("missing command", codes::INVALID_CONFIG);
        };

        let output = || if config.capture_output { Stdio::piped() } else { Stdio::null() };
        let mut child = match tokio::process::Command::new(program)
            .args(args)
            .current_dir(&config.working_dir)
            .env_clear()
            .envs(SAFE_ENV)
            .stdin(Stdio::null())
            .stdout(output())
            .stderr(output())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                return ActionOutcome::failed_with(format!("failed to start command: {e}"), codes::BACKEND_ERROR);
            }
        };

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let limit = self.output_limit;
        let waited = tokio::time::timeout(Duration::from_secs(config.timeout), async {
            tokio::join!(read_limited(stdout, limit), read_limited(stderr, limit), child.wait())
        })
        .await;

        let (stdout, stderr, status) = match waited {
            Ok((out, err, Ok(status))) => (out, err, status),
            Ok((_, _, Err(e))) => {
                return ActionOutcome::failed_with(format!("command wait failed: {e}"), codes::BACKEND_ERROR);
            }
            Err(_) => {
                if let Err(e) = child.kill().await {
                    tracing::warn!("⚠️ Failed to kill timed-out command: {}", e);
                }
                tracing::warn!("⏰ Command timed out after {}s: {}", config.timeout, command);
                return ActionOutcome::failed_with(format!("command timed out ({}s)", config.timeout), codes::TIMEOUT);
            }
        };

        let code = status.code().unwrap_or(-1);
        let success = status.success();
        tracing::info!("⚙️ Command '{}' exited with {}", command, code);

        let message = format!("command {} (exit code {code})", if success { "succeeded" } else { "failed" });
        let outcome = if success {
            ActionOutcome::ok(message)
        } else {
            ActionOutcome::failed_with(message, codes::EXIT_STATUS)
        };
        outcome
            .with_data(json!({
                "command": command,
                "return_code": code,
                "stdout": stdout.text,
                "stderr": stderr.text,
                "stdout_truncated": stdout.truncated,
                "stderr_truncated": stderr.truncated,
            }))
            .export("return_code", code)
            .export("stdout", stdout.text.clone())
    }
}

#[derive(Default)]
struct Captured {
    text: String,
    truncated: bool,
}

/// Keep at most `limit` bytes, draining the rest so the child never
/// blocks on a full pipe.
async fn read_limited<R: AsyncRead + Unpin>(reader: Option<R>, limit: usize) -> Captured {
    let Some(reader) = reader else {
        return Captured::default();
    };
    let mut buf = Vec::new();
    let mut limited = reader.take(limit as u64);
    let _ = limited.read_to_end(&mut buf).await;
    let mut rest = limited.into_inner();
    let dropped = tokio::io::copy(&mut rest, &mut tokio::io::sink()).await.unwrap_or(0);
    Captured {
        text: String::from_utf8_lossy(&buf).into_owned(),
        truncated: dropped > 0,
    }
}

#[async_trait]
impl ActionBackend for CommandBackend {
    fn kind(&self) -> &'static str {
        ActionKind::COMMAND
    }

    async fn execute(&self, action: &ActionKind) -> ActionOutcome {
        let ActionKind::Command(config) = action else {
            return mismatched("command", action);
        };
        if !self.enabled {
            return ActionOutcome::failed_with("command execution is disabled", codes::DISABLED);
        }
        self.run(config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(limit: usize) -> CommandBackend {
        let actions = ActionsConfig {
            enable_command_execution: true,
            command_output_limit: limit,
            ..ActionsConfig::default()
        };
        let mut security = SecurityConfig::default();
        security.allowed_commands.extend(["sleep".to_string(), "printenv".to_string()]);
        CommandBackend::new(&actions, &security)
    }

    fn command(config: serde_json::Value) -> ActionKind {
        ActionKind::decode(ActionKind::COMMAND, config).unwrap()
    }

    #[tokio::test]
    async fn test_echo_captures_stdout() {
        let outcome = backend(1024).execute(&command(json!({"command": "echo hello"}))).await;
        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(outcome.exports["stdout"], "hello\n");
        assert_eq!(outcome.exports["return_code"], 0);
    }

    #[tokio::test]
    async fn test_minimal_environment() {
        let outcome = backend(1024).execute(&command(json!({"command": "printenv HOME USER LC_ALL"}))).await;
        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(outcome.exports["stdout"], "/tmp\nscheduler\nC\n");
    }

    #[tokio::test]
    async fn test_no_shell_expansion() {
        let outcome = backend(1024).execute(&command(json!({"command": "echo $HOME *"}))).await;
        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(outcome.exports["stdout"], "$HOME *\n");
    }

    #[tokio::test]
    async fn test_second_line_never_runs() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        let line = format!("echo hi\ntouch {}", marker.display());
        let outcome = backend(1024)
            .execute(&command(json!({"command": line, "working_dir": dir.path().to_string_lossy()})))
            .await;
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some(codes::SECURITY_REJECTED));
        assert!(!marker.exists());

        let outcome = backend(1024).execute(&command(json!({"command": "echo hi\nid -u"}))).await;
        assert_eq!(outcome.error.as_deref(), Some(codes::SECURITY_REJECTED));
    }

    #[tokio::test]
    async fn test_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = backend(1024)
            .execute(&command(json!({"command": "pwd", "working_dir": dir.path().to_string_lossy()})))
            .await;
        assert!(outcome.success, "{}", outcome.message);
        let printed = std::path::PathBuf::from(outcome.exports["stdout"].as_str().unwrap().trim());
        assert_eq!(printed.canonicalize().unwrap(), dir.path().canonicalize().unwrap());
    }

    #[tokio::test]
    async fn test_output_is_truncated() {
        let outcome = backend(4).execute(&command(json!({"command": "echo hello world"}))).await;
        assert!(outcome.success);
        assert_eq!(outcome.exports["stdout"], "hell");
        assert_eq!(outcome.data.unwrap()["stdout_truncated"], true);
    }

    #[tokio::test]
    async fn test_non_zero_exit() {
        let outcome = backend(1024)
            .execute(&command(json!({"command": "ls /tmp/taskclaw-definitely-missing"})))
            .await;
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some(codes::EXIT_STATUS));
        assert_ne!(outcome.exports["return_code"], 0);
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let outcome = backend(1024)
            .execute(&command(json!({"command": "sleep 5", "timeout": 1})))
            .await;
        assert!(outcome.is_timeout(), "{:?}", outcome);
    }

    #[tokio::test]
    async fn test_guard_and_switch() {
        let outcome = backend(1024).execute(&command(json!({"command": "rm -rf ./data/"}))).await;
        assert_eq!(outcome.error.as_deref(), Some(codes::SECURITY_REJECTED));

        let outcome = backend(1024).execute(&command(json!({"command": "echo hi; uptime"}))).await;
        assert_eq!(outcome.error.as_deref(), Some(codes::SECURITY_REJECTED));

        let disabled = CommandBackend::new(&ActionsConfig::default(), &SecurityConfig::default());
        let outcome = disabled.execute(&command(json!({"command": "echo hi"}))).await;
        assert_eq!(outcome.error.as_deref(), Some(codes::DISABLED));
    }
}
