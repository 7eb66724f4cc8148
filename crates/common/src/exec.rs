//! External command execution
//!
//! Every build toolchain and device utility is driven through a
//! [`CommandExecutor`]. Command lines are complete shell strings and are
//! handed to `sh -c` untouched.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::error::{Error, ExitCode, Result};

/// What happens to the child's standard streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StdioMode {
    /// Share the terminal with the child
    #[default]
    Inherit,
    /// Discard all output
    Ignore,
    /// Collect stdout (and stderr, for error reporting)
    Capture,
}

/// Options for a single command invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOptions {
    pub cwd: Option<PathBuf>,
    /// Layered on top of the inherited environment
    pub env: BTreeMap<String, String>,
    pub stdio: StdioMode,
}

impl ExecOptions {
    pub fn inherit() -> Self {
        Self::default()
    }

    pub fn ignore() -> Self {
        Self {
            stdio: StdioMode::Ignore,
            ..Default::default()
        }
    }

    pub fn capture() -> Self {
        Self {
            stdio: StdioMode::Capture,
            ..Default::default()
        }
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub code: Option<i32>,
    /// Empty unless the command ran with [`StdioMode::Capture`]
    pub stdout: String,
}

/// Runs shell command lines
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run in the foreground. A non-zero exit is returned as
    /// [`Error::CommandFailed`].
    async fn run(&self, command: &str, options: &ExecOptions) -> Result<ExecOutput>;

    /// Start in the background. Launch errors are not reported here; they
    /// surface from [`ProcessHandle::wait`].
    fn spawn(&self, command: &str, options: &ExecOptions) -> ProcessHandle;
}

enum HandleState {
    Running(Child),
    Done(Option<Result<ExecOutput>>),
}

/// Handle to a background command
pub struct ProcessHandle {
    command: String,
    state: HandleState,
}

impl ProcessHandle {
    fn running(command: &str, child: Child) -> Self {
        Self {
            command: command.to_string(),
            state: HandleState::Running(child),
        }
    }

    /// A handle whose outcome is already known
    pub fn completed(command: &str, result: Result<ExecOutput>) -> Self {
        Self {
            command: command.to_string(),
            state: HandleState::Done(Some(result)),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// OS process id, while the process is running
    pub fn id(&self) -> Option<u32> {
        match &self.state {
            HandleState::Running(child) => child.id(),
            HandleState::Done(_) => None,
        }
    }

    /// Wait for the process to exit
    pub async fn wait(&mut self) -> Result<ExecOutput> {
        let result = match &mut self.state {
            HandleState::Running(child) => collect(&self.command, child).await,
            HandleState::Done(result) => {
                return result.take().unwrap_or_else(|| {
                    Err(Error::Io(std::io::Error::other(format!(
                        "process `{}` was already awaited",
                        self.command
                    ))))
                })
            }
        };
        self.state = HandleState::Done(None);
        result
    }

    /// Ask the process to terminate, escalating to SIGKILL if it lingers.
    /// Does nothing if the process already finished.
    pub async fn kill(&mut self) -> Result<()> {
        let HandleState::Running(child) = &mut self.state else {
            return Ok(());
        };

        debug!("Stopping `{}` (pid: {:?})", self.command, child.id());

        #[cfg(unix)]
        if let Some(pid) = child.id() {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok()
                && tokio::time::timeout(Duration::from_millis(500), child.wait())
                    .await
                    .is_ok()
            {
                self.state = HandleState::Done(Some(Err(terminated(&self.command))));
                return Ok(());
            }
        }

        if let Err(e) = child.kill().await {
            warn!("Failed to kill `{}`: {}", self.command, e);
            return Err(e.into());
        }
        self.state = HandleState::Done(Some(Err(terminated(&self.command))));
        Ok(())
    }
}

fn terminated(command: &str) -> Error {
    Error::CommandFailed {
        command: command.to_string(),
        code: ExitCode(None),
        stderr: String::new(),
    }
}

async fn collect(command: &str, child: &mut Child) -> Result<ExecOutput> {
    let mut stdout = String::new();
    let mut stderr = String::new();
    let stdout_pipe = child.stdout.take();
    let stderr_pipe = child.stderr.take();

    let read_stdout = async {
        if let Some(mut pipe) = stdout_pipe {
            pipe.read_to_string(&mut stdout).await?;
        }
        Ok::<_, std::io::Error>(())
    };
    let read_stderr = async {
        if let Some(mut pipe) = stderr_pipe {
            pipe.read_to_string(&mut stderr).await?;
        }
        Ok::<_, std::io::Error>(())
    };
    let (out, err) = tokio::join!(read_stdout, read_stderr);
    out?;
    err?;

    let status = child.wait().await?;
    finish(command, status, stdout, stderr)
}

fn finish(command: &str, status: ExitStatus, stdout: String, stderr: String) -> Result<ExecOutput> {
    if status.success() {
        Ok(ExecOutput {
            code: status.code(),
            stdout,
        })
    } else {
        Err(Error::CommandFailed {
            command: command.to_string(),
            code: ExitCode(status.code()),
            stderr,
        })
    }
}

/// Executor backed by real OS processes
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemExecutor;

impl SystemExecutor {
    fn command(command: &str, options: &ExecOptions) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);

        if let Some(cwd) = &options.cwd {
            cmd.current_dir(cwd);
        }
        cmd.envs(&options.env);

        match options.stdio {
            StdioMode::Inherit => {
                cmd.stdin(Stdio::inherit())
                    .stdout(Stdio::inherit())
                    .stderr(Stdio::inherit());
            }
            StdioMode::Ignore => {
                cmd.stdin(Stdio::null())
                    .stdout(Stdio::null())
                    .stderr(Stdio::null());
            }
            StdioMode::Capture => {
                cmd.stdin(Stdio::null())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::piped());
            }
        }

        cmd.kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl CommandExecutor for SystemExecutor {
    async fn run(&self, command: &str, options: &ExecOptions) -> Result<ExecOutput> {
        self.spawn(command, options).wait().await
    }

    fn spawn(&self, command: &str, options: &ExecOptions) -> ProcessHandle {
        debug!("Spawning `{}` (cwd: {:?})", command, options.cwd);

        match Self::command(command, options).spawn() {
            Ok(child) => ProcessHandle::running(command, child),
            Err(e) => ProcessHandle::completed(command, Err(e.into())),
        }
    }
}

/// Recording executor for tests
pub mod testing {
    use super::*;
    use parking_lot::Mutex;

    /// One observed invocation
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct RecordedCall {
        pub command: String,
        pub options: ExecOptions,
        pub background: bool,
    }

    #[derive(Debug, Clone)]
    enum Reply {
        Stdout(String),
        Fail(i32),
    }

    /// Records every command and answers from a list of rules. The first
    /// rule whose pattern occurs in the command line wins; unmatched
    /// commands succeed with empty output.
    #[derive(Debug, Default)]
    pub struct ScriptedExecutor {
        calls: Mutex<Vec<RecordedCall>>,
        rules: Mutex<Vec<(String, Reply)>>,
    }

    impl ScriptedExecutor {
        pub fn new() -> Self {
            Self::default()
        }

        /// Answer commands containing `pattern` with `stdout`
        pub fn reply(self, pattern: &str, stdout: &str) -> Self {
            self.rules
                .lock()
                .push((pattern.to_string(), Reply::Stdout(stdout.to_string())));
            self
        }

        /// Fail commands containing `pattern` with exit code `code`
        pub fn fail(self, pattern: &str, code: i32) -> Self {
            self.rules
                .lock()
                .push((pattern.to_string(), Reply::Fail(code)));
            self
        }

        pub fn calls(&self) -> Vec<RecordedCall> {
            self.calls.lock().clone()
        }

        pub fn commands(&self) -> Vec<String> {
            self.calls.lock().iter().map(|c| c.command.clone()).collect()
        }

        /// Number of recorded commands containing `pattern`
        pub fn count(&self, pattern: &str) -> usize {
            self.calls
                .lock()
                .iter()
                .filter(|c| c.command.contains(pattern))
                .count()
        }

        fn answer(&self, command: &str, options: &ExecOptions, background: bool) -> Result<ExecOutput> {
            self.calls.lock().push(RecordedCall {
                command: command.to_string(),
                options: options.clone(),
                background,
            });

            let reply = self
                .rules
                .lock()
                .iter()
                .find(|(pattern, _)| command.contains(pattern.as_str()))
                .map(|(_, reply)| reply.clone());

            match reply {
                Some(Reply::Fail(code)) => Err(Error::CommandFailed {
                    command: command.to_string(),
                    code: ExitCode(Some(code)),
                    stderr: String::new(),
                }),
                Some(Reply::Stdout(stdout)) => Ok(ExecOutput {
                    code: Some(0),
                    stdout,
                }),
                None => Ok(ExecOutput {
                    code: Some(0),
                    stdout: String::new(),
                }),
            }
        }
    }

    #[async_trait]
    impl CommandExecutor for ScriptedExecutor {
        async fn run(&self, command: &str, options: &ExecOptions) -> Result<ExecOutput> {
            self.answer(command, options, false)
        }

        fn spawn(&self, command: &str, options: &ExecOptions) -> ProcessHandle {
            let result = self.answer(command, options, true);
            ProcessHandle::completed(command, result)
        }
    }
}
