//! Command, path and URL safety checks.
//!
//! Every check returns `Err(reason)` with a human-readable reason so callers
//! can wrap it into their own error or outcome type.

use std::collections::HashSet;
use std::net::{Ipv4Addr, Ipv6Addr};

use taskclaw_core::config::SecurityConfig;
use url::{Host, Url};

/// Substrings a command may never contain (matched case-insensitively).
pub const COMMAND_DENY_PATTERNS: &[&str] = &[
    "rm -rf", "shutdown", "reboot", "mkfs", "dd if=", "chmod 777", "chown root", "sudo su",
    "passwd", "&&", "||", ";", "|", "$(", "${", "`", "<", "\n", "\r", "/etc/", "/bin/", "/sbin/",
    "/proc/", "/sys/",
];

/// Maximum command length accepted anywhere.
pub const MAX_COMMAND_LEN: usize = 1000;

/// Absolute file paths must live under one of these.
const SAFE_ABSOLUTE_PATHS: &[&str] = &["/tmp/", "/var/tmp/"];

const SYSTEM_PATHS: &[&str] = &["/etc", "/bin", "/sbin", "/usr/bin", "/proc", "/sys", "/dev"];

/// Arguments that are rejected as whole tokens.
const DANGEROUS_ARGS: &[&str] = &[
    "--delete", "--remove", "--force", "-f", "--recursive", "-r", "-rf", "-R", "sudo", "su",
    "chmod", "chown", "-I", "-TT",
];

/// Argument prefixes that make an allowlisted program run or write something else.
const DANGEROUS_ARG_PREFIXES: &[&str] = &[
    "-exec", "-ok", "-delete", "-fprint", "--to-command", "--checkpoint-action", "--use-compress-program",
    "--unzip-command", "--output", "-o",
];

/// Fragments rejected anywhere in the command line.
const DANGEROUS_FRAGMENTS: &[&str] = &[
    ">", "<", "|", "&", ";", "$(", "${", "`", "\n", "\r", "/etc/", "/bin/", "/sbin/", "/usr/bin/",
    "/proc/", "/sys/", "/dev/",
];

/// Static deny-list check used by the import validator.
pub fn check_command_text(command: &str) -> Result<(), String> {
    if command.trim().is_empty() {
        return Err("command is empty".into());
    }
    if command.chars().count() > MAX_COMMAND_LEN {
        return Err(format!("command longer than {MAX_COMMAND_LEN} characters"));
    }
    let lower = command.to_lowercase();
    match COMMAND_DENY_PATTERNS.iter().find(|p| lower.contains(*p)) {
        Some(pattern) => Err(format!("command contains dangerous pattern '{pattern}'")),
        None => Ok(()),
    }
}

/// File paths: no traversal, no home expansion, no system directories,
/// absolute paths only under the temp directories.
pub fn check_file_path(path: &str) -> Result<(), String> {
    if path.contains("..") || path.contains('~') {
        return Err(format!("path '{path}' contains traversal or home expansion"));
    }
    if let Some(system) = SYSTEM_PATHS.iter().find(|p| path.starts_with(*p)) {
        return Err(format!("path '{path}' points into system directory {system}"));
    }
    if path.starts_with('/') && !SAFE_ABSOLUTE_PATHS.iter().any(|p| path.starts_with(p)) {
        return Err(format!("absolute path '{path}' is outside {}", SAFE_ABSOLUTE_PATHS.join(", ")));
    }
    Ok(())
}

/// URLs: http(s) only, never loopback, private, link-local or unspecified hosts.
pub fn check_url(raw: &str) -> Result<(), String> {
    let url = Url::parse(raw).map_err(|e| format!("invalid URL '{raw}': {e}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("URL scheme '{}' is not allowed", url.scheme()));
    }
    let host = url.host().ok_or_else(|| format!("URL '{raw}' has no host"))?;

    let blocked = match &host {
        Host::Domain(domain) => {
            let domain = domain.to_ascii_lowercase();
            domain == "localhost" || domain.ends_with(".localhost") || domain.starts_with("metadata.")
        }
        Host::Ipv4(ip) => is_internal_v4(ip),
        Host::Ipv6(ip) => is_internal_v6(ip),
    };

    if blocked {
        return Err(format!("URL host '{host}' is a local or private network address"));
    }
    Ok(())
}

/// Addresses never reachable by a scheduled HTTP call, even when the
/// validator was bypassed: cloud metadata and link-local ranges.
pub fn is_metadata_host(raw: &str) -> bool {
    let Ok(url) = Url::parse(raw) else {
        return false;
    };
    match url.host() {
        Some(Host::Ipv4(ip)) => ip.is_link_local(),
        Some(Host::Domain(domain)) => domain.to_ascii_lowercase().starts_with("metadata."),
        _ => false,
    }
}

fn is_internal_v4(ip: &Ipv4Addr) -> bool {
    ip.is_loopback() || ip.is_private() || ip.is_unspecified() || ip.is_link_local()
}

fn is_internal_v6(ip: &Ipv6Addr) -> bool {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_internal_v4(&v4);
    }
    // fc00::/7 unique local, fe80::/10 link local
    let first = ip.segments()[0];
    ip.is_loopback() || ip.is_unspecified() || (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
}

/// Runtime gate for the command backend: allowlisted programs only, no
/// dangerous arguments, absolute paths only under safe prefixes.
#[derive(Debug, Clone)]
pub struct CommandGuard {
    allowed_commands: HashSet<String>,
    safe_prefixes: Vec<String>,
}

impl CommandGuard {
    pub fn new(config: &SecurityConfig) -> Self {
        Self {
            allowed_commands: config.allowed_commands.iter().cloned().collect(),
            safe_prefixes: config.safe_path_prefixes.clone(),
        }
    }

    /// Check if a command line may run.
    pub fn check(&self, command: &str) -> Result<(), String> {
        self.argv(command).map(|_| ())
    }

    /// Check a command line and split it into the argument vector it runs as.
    /// The first element is the program, executed without a shell.
    pub fn argv(&self, command: &str) -> Result<Vec<String>, String> {
        let parts = split_command(command)?;
        let Some(base) = parts.first() else {
            return Err("command is empty".into());
        };

        if !self.allowed_commands.contains(base.as_str()) {
            return Err(format!("command '{base}' is not on the allowlist"));
        }

        if let Some(fragment) = DANGEROUS_FRAGMENTS.iter().find(|f| command.contains(*f)) {
            return Err(format!("command contains dangerous fragment '{fragment}'"));
        }

        for part in &parts[1..] {
            if DANGEROUS_ARGS.contains(&part.as_str())
                || DANGEROUS_ARG_PREFIXES.iter().any(|p| part.starts_with(p))
            {
                return Err(format!("command contains dangerous argument '{part}'"));
            }
            if part.starts_with('/') && !self.safe_prefixes.iter().any(|p| part.starts_with(p.as_str())) {
                return Err(format!("absolute path '{part}' is outside the safe directories"));
            }
        }

        Ok(parts)
    }

    /// Add a program to the allowlist.
    pub fn allow_command(&mut self, command: &str) {
        self.allowed_commands.insert(command.to_string());
    }
}

/// Split a command line on whitespace, honouring single and double quotes.
fn split_command(command: &str) -> Result<Vec<String>, String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut in_token = false;

    for c in command.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => current.push(c),
            (None, '\'' | '"') => {
                quote = Some(c);
                in_token = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_token {
                    parts.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_token = true;
            }
        }
    }
    if let Some(q) = quote {
        return Err(format!("unterminated {q} quote"));
    }
    if in_token {
        parts.push(current);
    }
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> CommandGuard {
        CommandGuard::new(&SecurityConfig::default())
    }

    #[test]
    fn test_deny_patterns() {
        assert!(check_command_text("echo hello").is_ok());
        assert!(check_command_text("rm -rf /").is_err());
        assert!(check_command_text("ls; reboot").is_err());
        assert!(check_command_text("cat /ETC/passwd").is_err());
        assert!(check_command_text(&"a".repeat(1001)).is_err());
        assert!(check_command_text("  ").is_err());
    }

    #[test]
    fn test_file_paths() {
        assert!(check_file_path("./data/report.csv").is_ok());
        assert!(check_file_path("/tmp/backup.zip").is_ok());
        assert!(check_file_path("../secrets").is_err());
        assert!(check_file_path("~/notes").is_err());
        assert!(check_file_path("/etc/hosts").is_err());
        assert!(check_file_path("/home/user/file").is_err());
        assert!(check_file_path("/dev/null").is_err());
    }

    #[test]
    fn test_urls() {
        assert!(check_url("https://api.example.com/v1/items").is_ok());
        assert!(check_url("http://example.org:8080/x").is_ok());
        assert!(check_url("http://localhost/x").is_err());
        assert!(check_url("http://127.0.0.1:9000/").is_err());
        assert!(check_url("http://0.0.0.0/").is_err());
        assert!(check_url("http://192.168.1.20/").is_err());
        assert!(check_url("http://10.0.0.5/").is_err());
        assert!(check_url("http://172.16.3.4/").is_err());
        assert!(check_url("http://[::1]/").is_err());
        assert!(check_url("ftp://example.com/file").is_err());
        assert!(check_url("not a url").is_err());
    }

    #[test]
    fn test_metadata_host() {
        assert!(is_metadata_host("http://169.254.169.254/latest/meta-data"));
        assert!(is_metadata_host("http://metadata.google.internal/"));
        assert!(!is_metadata_host("http://127.0.0.1:8080/"));
    }

    #[test]
    fn test_command_guard_allowlist() {
        let g = guard();
        assert!(g.check("echo hello world").is_ok());
        assert!(g.check("df -h").is_ok());
        assert!(g.check("python3 -c 'print(1)'").is_err());
        assert!(g.check("").is_err());
    }

    #[test]
    fn test_command_guard_arguments() {
        let g = guard();
        assert!(g.check("ls -rf ./data/").is_err());
        assert!(g.check("echo hi > out.txt").is_err());
        assert!(g.check("cat /home/user/.ssh/id_rsa").is_err());
        assert!(g.check("ls /tmp/reports").is_ok());
        assert!(g.check("echo 'summary report'").is_ok());
        assert!(g.check("cat /var/tmp/x.log").is_ok());
    }

    #[test]
    fn test_split_command_quotes() {
        assert_eq!(split_command("echo 'a b' \"c d\" e").unwrap(), vec!["echo", "a b", "c d", "e"]);
        assert_eq!(split_command("  ls   -l ").unwrap(), vec!["ls", "-l"]);
        assert_eq!(split_command("echo ''").unwrap(), vec!["echo", ""]);
        assert!(split_command("echo 'open").is_err());
    }

    #[test]
    fn test_line_breaks_and_expansions_rejected() {
        let g = guard();
        for command in ["echo hi\nid -u", "echo hi\r\nid -u", "cat < secrets.txt", "echo ${HOME}"] {
            assert!(g.check(command).is_err(), "{command:?} passed the guard");
            assert!(check_command_text(command).is_err(), "{command:?} passed the deny-list");
        }
        assert!(g.check("echo 'multi\nline'").is_err());
    }

    #[test]
    fn test_argv_is_program_then_arguments() {
        assert_eq!(guard().argv("ls -l './data/my reports'").unwrap(), vec!["ls", "-l", "./data/my reports"]);
        assert!(guard().argv("id -u").is_err());
    }

    #[test]
    fn test_default_allowlist_has_no_interpreters() {
        let g = guard();
        for command in ["awk '{print}' x.log", "sed -n 1p x.log", "find . -name x", "curl https://example.com", "wget https://example.com"] {
            assert!(g.check(command).is_err(), "{command:?} should not be allowlisted");
        }
    }

    #[test]
    fn test_exec_style_arguments_rejected() {
        let mut g = guard();
        g.allow_command("find");
        assert!(g.check("find ./data -name x.log").is_ok());
        assert!(g.check("find ./data -exec id {} +").is_err());
        assert!(g.check("find ./data -delete").is_err());
        assert!(g.check("tar --to-command=id -xf ./backup/a.tar").is_err());
        assert!(g.check("tar --checkpoint-action=exec=id -cf ./backup/a.tar ./data").is_err());
        assert!(g.check("tar -czf ./backup/a.tar.gz ./data").is_ok());
    }

    #[test]
    fn test_allow_command() {
        let mut g = guard();
        assert!(g.check("jq .").is_err());
        g.allow_command("jq");
        assert!(g.check("jq .").is_ok());
    }
}
