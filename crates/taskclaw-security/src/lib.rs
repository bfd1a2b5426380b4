//! # TaskClaw Security
//!
//! The gate in front of bulk task import, plus the guards action backends
//! consult before touching the network, the filesystem or a shell.

pub mod guard;
pub mod validator;

pub use guard::{CommandGuard, check_command_text, check_file_path, check_url};
pub use validator::{ConfigValidator, import_tasks};
