//! Execution bridge to the privileged shell loader (Shizuku `rish`).
//!
//! The loader cannot be reached through a normal privilege-escalation path:
//! it is a Java class started by `app_process` with a custom class path and a
//! spoofed process name. Every privileged command in the crate goes through
//! [`RishBridge`] so they all share one argument and environment contract.

use crate::core::config::BridgeConfig;
use crate::core::error::AndroshError;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

pub const APP_ID_ENV: &str = "RISH_APPLICATION_ID";

/// Captured result of one privileged command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Exit code 0 and nothing on stderr.
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0 && self.stderr.trim().is_empty()
    }

    /// Turn anything but success into a `PrivilegedCommand` error.
    pub fn into_result(self, command: &str) -> Result<CommandOutput, AndroshError> {
        if self.succeeded() {
            Ok(self)
        } else {
            Err(AndroshError::PrivilegedCommand {
                command: command.to_string(),
                exit_code: self.exit_code,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

/// Something that can run shell commands with elevated capability.
pub trait PrivilegedShell {
    /// Run and capture. A non-zero exit is reported in the output, not as `Err`.
    fn run_captured(&self, command: &str) -> Result<CommandOutput, AndroshError>;

    /// Run attached to the current terminal and return the exit code.
    fn run_interactive(&self, command: &str) -> Result<i32, AndroshError>;
}

/// Split a command string with POSIX shell-word rules.
pub fn tokenize(command: &str) -> Result<Vec<String>, AndroshError> {
    shlex::split(command)
        .ok_or_else(|| AndroshError::Tokenize(format!("unbalanced quoting in {:?}", command)))
}

pub fn quote(word: &str) -> Result<String, AndroshError> {
    shlex::try_quote(word)
        .map(|q| q.into_owned())
        .map_err(|e| AndroshError::Tokenize(e.to_string()))
}

/// Build `-c '<script>'` for the privileged shell, quoting every word of
/// `argv` so paths with spaces or metacharacters reach the command intact.
pub fn sh_c(argv: &[&str]) -> Result<String, AndroshError> {
    let script = shlex::try_join(argv.iter().copied())
        .map_err(|e| AndroshError::Tokenize(e.to_string()))?;
    Ok(format!("-c {}", quote(&script)?))
}

pub struct RishBridge {
    config: BridgeConfig,
    assets_dir: PathBuf,
}

impl RishBridge {
    pub fn new(config: BridgeConfig, assets_dir: &Path) -> Self {
        Self {
            config,
            assets_dir: assets_dir.to_path_buf(),
        }
    }

    pub fn staged_helper_path(&self) -> PathBuf {
        self.config.staging_dir.join(&self.config.dex_name)
    }

    /// Copy the helper archive into the staging directory once, then drop its
    /// write permission. Safe to call before every invocation.
    pub fn ensure_helper_staged(&self) -> Result<PathBuf, AndroshError> {
        let staged = self.staged_helper_path();
        if !staged.exists() {
            let source = self.assets_dir.join(&self.config.dex_name);
            if !source.is_file() {
                return Err(AndroshError::Configuration(format!(
                    "privileged helper not found: {}",
                    source.display()
                )));
            }
            fs::create_dir_all(&self.config.staging_dir)?;
            fs::copy(&source, &staged)?;
            tracing::debug!(from = %source.display(), to = %staged.display(), "staged helper");
        }

        // Best effort: a helper we cannot chmod is still usable.
        if let Ok(meta) = fs::metadata(&staged)
            && !meta.permissions().readonly()
        {
            let _ = fs::set_permissions(&staged, read_only(meta.permissions()));
        }
        Ok(staged)
    }

    /// Full argument vector handed to the loader, without the loader itself.
    pub fn loader_args(&self, helper: &Path, tokens: &[String]) -> Vec<String> {
        let mut args = vec![
            format!("-Djava.class.path={}", helper.display()),
            self.config.loader_dir.clone(),
            format!("--nice-name={}", self.config.nice_name),
            self.config.loader_class.clone(),
        ];
        args.extend(tokens.iter().cloned());
        args
    }

    fn loader_command(&self, command: &str) -> Result<Command, AndroshError> {
        let helper = self.ensure_helper_staged()?;
        let tokens = tokenize(command)?;
        tracing::debug!(command, tokens = tokens.len(), "privileged command");

        let mut cmd = Command::new(&self.config.loader);
        cmd.args(self.loader_args(&helper, &tokens))
            .env(APP_ID_ENV, &self.config.app_id);
        Ok(cmd)
    }
}

#[cfg(unix)]
fn read_only(perms: fs::Permissions) -> fs::Permissions {
    use std::os::unix::fs::PermissionsExt;
    fs::Permissions::from_mode(perms.mode() & !0o222)
}

#[cfg(not(unix))]
fn read_only(mut perms: fs::Permissions) -> fs::Permissions {
    perms.set_readonly(true);
    perms
}

impl PrivilegedShell for RishBridge {
    fn run_captured(&self, command: &str) -> Result<CommandOutput, AndroshError> {
        let output = self
            .loader_command(command)?
            .stdin(Stdio::null())
            .output()?;

        let result = CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        tracing::debug!(command, exit_code = result.exit_code, "privileged command finished");
        Ok(result)
    }

    fn run_interactive(&self, command: &str) -> Result<i32, AndroshError> {
        let status = self.loader_command(command)?.status().map_err(|e| {
            AndroshError::PrivilegedCommand {
                command: command.to_string(),
                exit_code: -1,
                stderr: format!("failed to start {}: {}", self.config.loader.display(), e),
            }
        })?;
        Ok(status.code().unwrap_or(-1))
    }
}
