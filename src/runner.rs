use crate::cancel::CancelToken;
use crate::error::CollectError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Os {
    Linux,
    MacOs,
    Windows,
}

impl Os {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Os::Windows
        } else if cfg!(target_os = "macos") {
            Os::MacOs
        } else {
            Os::Linux
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Os::Linux => "Linux",
            Os::MacOs => "macOS",
            Os::Windows => "Windows",
        }
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A program plus arguments. Its display form doubles as the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Runs `script` under Windows PowerShell with UTF-8 console output.
    pub fn powershell(script: &str) -> Self {
        let wrapped = format!(
            "[Console]::OutputEncoding=[System.Text.UTF8Encoding]::new($false); $OutputEncoding=[System.Text.UTF8Encoding]::new($false); {script}"
        );
        Self::new("powershell").args(["-NoProfile", "-NonInteractive", "-Command"]).arg(wrapped)
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " \"{arg}\"")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutput {
    pub text: String,
    pub duration: Duration,
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(
        &self,
        cmd: &CommandLine,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<CommandOutput, CollectError>;
}

/// Runs commands as real child processes.
#[derive(Debug, Default, Clone)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(
        &self,
        cmd: &CommandLine,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<CommandOutput, CollectError> {
        cancel.check()?;
        let started = Instant::now();

        let mut command = Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let child = command
            .spawn()
            .map_err(|err| CollectError::from_spawn(&cmd.program, err))?;
        let mut guard = TreeGuard(child.id());
        let wait = child.wait_with_output();
        tokio::pin!(wait);

        let output = tokio::select! {
            out = &mut wait => out.map_err(|err| CollectError::Internal(format!("{cmd}: {err}")))?,
            _ = tokio::time::sleep(timeout) => {
                debug!(command = %cmd, "command timed out, killing process tree");
                return Err(CollectError::Timeout(timeout));
            }
            _ = cancel.canceled() => {
                debug!(command = %cmd, "command canceled, killing process tree");
                return Err(CollectError::Canceled);
            }
        };
        guard.disarm();

        let duration = started.elapsed();
        if !output.status.success() {
            let stderr = decode_cmd_stdout(&output.stderr);
            let stdout = decode_cmd_stdout(&output.stdout);
            let message = first_line(&stderr)
                .or_else(|| first_line(&stdout))
                .unwrap_or("no output")
                .to_string();
            return Err(CollectError::Exit {
                command: cmd.to_string(),
                code: output.status.code().unwrap_or(-1),
                message,
            });
        }

        let text = decode_output(cmd, &output.stdout)?;
        Ok(CommandOutput { text, duration })
    }
}

/// Kills the child's whole process tree when dropped while armed, which covers
/// timeouts, cancellation and an aborted collector task alike.
struct TreeGuard(Option<u32>);

impl TreeGuard {
    fn disarm(&mut self) {
        self.0 = None;
    }
}

impl Drop for TreeGuard {
    fn drop(&mut self) {
        if let Some(pid) = self.0.take() {
            kill_tree(pid);
        }
    }
}

#[cfg(unix)]
fn kill_tree(pid: u32) {
    let Ok(pgid) = i32::try_from(pid) else {
        return;
    };
    // The child leads its own process group, so this reaches every descendant.
    unsafe {
        libc::kill(-pgid, libc::SIGKILL);
    }
}

#[cfg(windows)]
fn kill_tree(pid: u32) {
    let _ = std::process::Command::new("taskkill")
        .args(["/T", "/F", "/PID", &pid.to_string()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn();
}

fn first_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).find(|l| !l.is_empty())
}

fn decode_output(cmd: &CommandLine, bytes: &[u8]) -> Result<String, CollectError> {
    let text = decode_cmd_stdout(bytes);
    let total = text.chars().count();
    let replaced = text.chars().filter(|c| *c == char::REPLACEMENT_CHARACTER).count();
    if total > 0 && replaced * 2 > total {
        return Err(CollectError::Decode(cmd.to_string()));
    }
    Ok(text)
}

/// UTF-16LE when the bytes look like it (Windows tools sometimes ignore the
/// console code page), then UTF-8, then lossy UTF-8.
pub fn decode_cmd_stdout(bytes: &[u8]) -> String {
    if looks_like_utf16le(bytes) {
        let body = bytes.strip_prefix(&[0xFF_u8, 0xFE][..]).unwrap_or(bytes);
        let units: Vec<u16> = body
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        if let Ok(s) = String::from_utf16(&units) {
            return s;
        }
    }

    if let Ok(utf8) = std::str::from_utf8(bytes) {
        return utf8.strip_prefix('\u{feff}').unwrap_or(utf8).to_string();
    }

    String::from_utf8_lossy(bytes).into_owned()
}

fn looks_like_utf16le(bytes: &[u8]) -> bool {
    if bytes.len() < 2 || bytes.len() % 2 != 0 {
        return false;
    }
    if bytes.starts_with(&[0xFF, 0xFE]) {
        return true;
    }
    let high_zero = bytes.iter().skip(1).step_by(2).filter(|b| **b == 0).count();
    high_zero * 2 >= bytes.len() / 2
}
