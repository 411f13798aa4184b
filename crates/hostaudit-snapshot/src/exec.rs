//! Subprocess execution under a hard timeout

use hostaudit_core::{Error, Result};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Search path handed to every child process
const SAFE_PATH: &str = "/usr/bin:/bin:/usr/sbin:/sbin";

/// Captured result of a finished command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code; `None` when killed by a signal
    pub code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }
}

/// Runs external programs with a cleared environment and a timeout
///
/// Each call drives its own current-thread runtime, so callers stay fully
/// synchronous. Must not be called from inside an async context.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    timeout: Duration,
}

impl CommandRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run `program` with `args` directly (no shell)
    pub fn run<S: AsRef<str>>(&self, program: &str, args: &[S]) -> Result<CommandOutput> {
        let mut cmd = Command::new(program);
        cmd.args(args.iter().map(|a| a.as_ref()));

        let command_line = std::iter::once(program)
            .chain(args.iter().map(|a| a.as_ref()))
            .collect::<Vec<_>>()
            .join(" ");
        self.execute(cmd, program, command_line)
    }

    /// Run a script through `sh -c`
    pub fn run_shell(&self, script: &str) -> Result<CommandOutput> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        self.execute(cmd, "sh", script.to_string())
    }

    /// Timeout in whole seconds, rounded up
    fn timeout_secs(&self) -> u64 {
        self.timeout.as_secs() + u64::from(self.timeout.subsec_nanos() > 0)
    }

    fn execute(&self, mut cmd: Command, program: &str, command_line: String) -> Result<CommandOutput> {
        // Own process group so a timeout reaches every process of a pipeline
        cmd.env_clear()
            .env("PATH", SAFE_PATH)
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        debug!("Running command: {}", command_line);
        let result: std::io::Result<Option<std::process::Output>> = runtime.block_on(async {
            let child = cmd.spawn()?;
            let group = child.id();
            match timeout(self.timeout, child.wait_with_output()).await {
                Ok(output) => output.map(Some),
                Err(_) => {
                    if let Some(group) = group {
                        kill_group(group).await;
                    }
                    Ok(None)
                }
            }
        });

        match result {
            Ok(None) => {
                warn!(
                    "Command timed out after {:?}: {}",
                    self.timeout, command_line
                );
                Err(Error::CommandTimeout {
                    command: command_line,
                    seconds: self.timeout_secs(),
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::CommandNotFound {
                    command: program.to_string(),
                })
            }
            Err(e) => Err(Error::CommandFailed {
                command: command_line,
                message: e.to_string(),
            }),
            Ok(Some(output)) => Ok(CommandOutput {
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                code: output.status.code(),
            }),
        }
    }
}

/// SIGKILL every process in the group led by `pgid`
async fn kill_group(pgid: u32) {
    // Shell builtin, so no separate kill binary is needed
    let status = Command::new("sh")
        .arg("-c")
        .arg(format!("kill -9 -{}", pgid))
        .env_clear()
        .env("PATH", SAFE_PATH)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    match status {
        Ok(status) if status.success() => debug!("Killed process group {}", pgid),
        Ok(status) => warn!("kill of process group {} exited with {}", pgid, status),
        Err(e) => warn!("Failed to kill process group {}: {}", pgid, e),
    }
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_captures_output() {
        let runner = CommandRunner::new(Duration::from_secs(10));
        let out = runner.run("sort", &["-r", "/dev/null"]).unwrap();
        assert!(out.success());
        assert_eq!(out.stdout_trimmed(), "");

        let out = runner.run_shell("printf 'b\\na\\n' | sort").unwrap();
        assert_eq!(out.stdout, "a\nb\n");
    }

    #[test]
    fn test_missing_binary() {
        let runner = CommandRunner::new(Duration::from_secs(5));
        let err = runner
            .run::<&str>("hostaudit-no-such-binary", &[])
            .unwrap_err();
        assert!(matches!(err, Error::CommandNotFound { .. }));
    }

    #[test]
    fn test_timeout_is_reported() {
        let runner = CommandRunner::new(Duration::from_millis(200));
        let err = runner.run_shell("sleep 5").unwrap_err();
        match err {
            Error::CommandTimeout { command, seconds } => {
                assert_eq!(command, "sleep 5");
                assert_eq!(seconds, 1);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    fn sleepers(marker: &str) -> usize {
        std::fs::read_dir("/proc")
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| std::fs::read(entry.path().join("cmdline")).ok())
            .filter(|cmdline| {
                let args: Vec<&[u8]> = cmdline.split(|b| *b == 0).collect();
                args.first().map_or(false, |a| a.ends_with(b"sleep"))
                    && args.contains(&marker.as_bytes())
            })
            .count()
    }

    #[test]
    fn test_timeout_kills_whole_pipeline() {
        let runner = CommandRunner::new(Duration::from_millis(300));
        let err = runner.run_shell("sleep 7.37 | sort").unwrap_err();
        assert!(matches!(err, Error::CommandTimeout { .. }));

        std::thread::sleep(Duration::from_millis(300));
        assert_eq!(sleepers("7.37"), 0);
    }

    #[test]
    fn test_environment_is_cleared() {
        let runner = CommandRunner::default();
        let out = runner.run_shell("echo \"$HOME\"").unwrap();
        assert_eq!(out.stdout_trimmed(), "");
    }
}
