//! External command execution.
//!
//! Every host tool invocation (`docker buildx ...`) goes through [`Cmd`] and a
//! [`CommandRunner`]. The runner is the seam between the publish workflow and
//! the host: [`SystemRunner`] spawns real processes, [`DryRunRunner`] prints
//! mutating commands instead of running them.
//!
//! # Example
//!
//! ```rust,ignore
//! use image_builder::process::Cmd;
//!
//! let result = Cmd::new("docker")
//!     .args(["buildx", "version"])
//!     .error_msg("docker buildx is not available")
//!     .read_only()
//!     .run()?;
//! println!("{}", result.stdout);
//! ```

use anyhow::{bail, Context, Result};
use std::fmt;
use std::path::Path;
use std::process::{Command, Stdio};

/// A command line to execute, plus how its failure should be treated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cmd {
    program: String,
    args: Vec<String>,
    error_msg: Option<String>,
    allow_fail: bool,
    stream: bool,
    read_only: bool,
}

/// Outcome of an executed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmdResult {
    /// Exit code, `None` when terminated by a signal.
    pub code: Option<i32>,
    /// Captured stdout (empty when output was streamed).
    pub stdout: String,
    /// Captured stderr (empty when output was streamed).
    pub stderr: String,
}

impl CmdResult {
    /// A successful result with no output.
    pub fn succeeded() -> Self {
        Self {
            code: Some(0),
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Executes a [`Cmd`] and reports how it exited.
///
/// Implementations only report; deciding whether a non-zero exit is an
/// error is done by [`Cmd::run_with`].
pub trait CommandRunner {
    fn execute(&self, cmd: &Cmd) -> Result<CmdResult>;
}

impl Cmd {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            error_msg: None,
            allow_fail: false,
            stream: false,
            read_only: false,
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

    /// Append a path argument (lossy UTF-8 conversion).
    pub fn arg_path(mut self, path: &Path) -> Self {
        self.args.push(path.to_string_lossy().into_owned());
        self
    }

    /// Message used as the error headline when the command fails.
    pub fn error_msg(mut self, msg: impl Into<String>) -> Self {
        self.error_msg = Some(msg.into());
        self
    }

    /// Return the result instead of an error on non-zero exit.
    pub fn allow_fail(mut self) -> Self {
        self.allow_fail = true;
        self
    }

    /// Inherit stdout/stderr instead of capturing them.
    pub fn stream(mut self) -> Self {
        self.stream = true;
        self
    }

    /// Mark the command as free of side effects. Dry runs still execute it.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn is_streamed(&self) -> bool {
        self.stream
    }

    /// Program followed by its arguments.
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }

    /// Execute with `runner`, turning a non-zero exit into an error unless
    /// [`Cmd::allow_fail`] was set.
    pub fn run_with(&self, runner: &dyn CommandRunner) -> Result<CmdResult> {
        tracing::debug!(command = %self, "executing");
        let result = runner.execute(self)?;

        if !result.success() && !self.allow_fail {
            let headline = self
                .error_msg
                .clone()
                .unwrap_or_else(|| format!("command failed: {self}"));
            let status = result
                .code
                .map(|code| code.to_string())
                .unwrap_or_else(|| "killed by signal".to_string());
            let stderr = result.stderr.trim();
            if stderr.is_empty() {
                bail!("{headline} (exit status {status})");
            }
            bail!("{headline} (exit status {status})\n{stderr}");
        }

        Ok(result)
    }

    /// Execute on the host.
    pub fn run(&self) -> Result<CmdResult> {
        self.run_with(&SystemRunner)
    }
}

impl fmt::Display for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " '{}'", arg.replace('\'', r"'\''"))?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

impl<R: CommandRunner + ?Sized> CommandRunner for &R {
    fn execute(&self, cmd: &Cmd) -> Result<CmdResult> {
        (**self).execute(cmd)
    }
}

/// Spawns real processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn execute(&self, cmd: &Cmd) -> Result<CmdResult> {
        let mut command = Command::new(&cmd.program);
        command.args(&cmd.args);

        if cmd.stream {
            let status = command
                .stdin(Stdio::null())
                .status()
                .with_context(|| format!("spawning '{cmd}'"))?;
            return Ok(CmdResult {
                code: status.code(),
                stdout: String::new(),
                stderr: String::new(),
            });
        }

        let output = command
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("spawning '{cmd}'"))?;
        Ok(CmdResult {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Runs read-only commands through `inner`; prints everything else.
#[derive(Debug, Clone, Default)]
pub struct DryRunRunner<R> {
    inner: R,
}

impl<R: CommandRunner> DryRunRunner<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }
}

impl<R: CommandRunner> CommandRunner for DryRunRunner<R> {
    fn execute(&self, cmd: &Cmd) -> Result<CmdResult> {
        if cmd.is_read_only() {
            return self.inner.execute(cmd);
        }
        println!("[dry-run] {cmd}");
        Ok(CmdResult::succeeded())
    }
}

/// Records every command instead of running it.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingRunner {
    calls: std::cell::RefCell<Vec<Vec<String>>>,
    failing: Vec<Vec<String>>,
}

#[cfg(test)]
impl RecordingRunner {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Commands whose argv starts with `prefix` exit with status 1.
    pub(crate) fn fail_when(mut self, prefix: &[&str]) -> Self {
        self.failing
            .push(prefix.iter().map(|part| part.to_string()).collect());
        self
    }

    pub(crate) fn calls(&self) -> Vec<Vec<String>> {
        self.calls.borrow().clone()
    }
}

#[cfg(test)]
impl CommandRunner for RecordingRunner {
    fn execute(&self, cmd: &Cmd) -> Result<CmdResult> {
        let argv = cmd.argv();
        self.calls.borrow_mut().push(argv.clone());

        let fails = self.failing.iter().any(|prefix| argv.starts_with(prefix));
        if fails {
            return Ok(CmdResult {
                code: Some(1),
                stdout: String::new(),
                stderr: "simulated failure".to_string(),
            });
        }
        Ok(CmdResult::succeeded())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_quotes_arguments_with_spaces() {
        let cmd = Cmd::new("docker")
            .args(["buildx", "build"])
            .arg("--label")
            .arg("org.opencontainers.image.title=my image");
        assert_eq!(
            cmd.to_string(),
            "docker buildx build --label 'org.opencontainers.image.title=my image'"
        );
    }

    #[test]
    fn failure_uses_error_message_and_stderr() {
        let runner = RecordingRunner::new().fail_when(&["docker", "buildx"]);
        let err = Cmd::new("docker")
            .args(["buildx", "version"])
            .error_msg("docker buildx is not available")
            .run_with(&runner)
            .unwrap_err()
            .to_string();

        assert!(err.contains("docker buildx is not available"));
        assert!(err.contains("exit status 1"));
        assert!(err.contains("simulated failure"));
    }

    #[test]
    fn allow_fail_returns_result() {
        let runner = RecordingRunner::new().fail_when(&["docker"]);
        let result = Cmd::new("docker")
            .arg("info")
            .allow_fail()
            .run_with(&runner)
            .unwrap();
        assert!(!result.success());
    }

    #[test]
    fn dry_run_only_executes_read_only_commands() {
        let dry = DryRunRunner::new(RecordingRunner::new());

        Cmd::new("docker")
            .args(["buildx", "inspect", "multiplatform"])
            .read_only()
            .run_with(&dry)
            .unwrap();
        Cmd::new("docker")
            .args(["buildx", "create", "--name", "multiplatform"])
            .run_with(&dry)
            .unwrap();

        assert_eq!(
            dry.inner.calls(),
            vec![vec!["docker", "buildx", "inspect", "multiplatform"]]
        );
    }

    #[test]
    fn dry_run_wraps_a_borrowed_runner() {
        let recording = RecordingRunner::new();
        let runner: &dyn CommandRunner = &recording;
        let dry = DryRunRunner::new(runner);

        Cmd::new("docker")
            .args(["buildx", "build", "--push", "."])
            .run_with(&dry)
            .unwrap();
        assert!(recording.calls().is_empty());
    }

    #[test]
    fn system_runner_captures_stdout() {
        let result = Cmd::new("sh").args(["-c", "echo hello"]).run().unwrap();
        assert_eq!(result.stdout.trim(), "hello");
    }

    #[test]
    fn system_runner_reports_exit_code() {
        let result = Cmd::new("sh")
            .args(["-c", "exit 3"])
            .allow_fail()
            .run()
            .unwrap();
        assert_eq!(result.code, Some(3));
        assert!(Cmd::new("sh").args(["-c", "exit 3"]).run().is_err());
    }
}
