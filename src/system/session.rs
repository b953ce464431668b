// src/system/session.rs

use crate::{
    core::framing,
    models::{Channel, ChannelSet, Environment},
    system::transport::{self, Transport, TransportError},
};
use nix::{sys::signal, unistd::Pid};
use std::fmt;
use std::io::{self, Write};
use std::num::ParseIntError;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, Scope, ScopedJoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

/// How long to wait for drains to report back between two release attempts.
const RELEASE_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// The error returned by [`Shell`] operations.
#[derive(Error, Debug)]
pub enum SessionError {
    /// `exec` or `stop` was called after `stop`.
    #[error("shell process already stopped")]
    AlreadyStopped,
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("Could not start shell '{shell}': {source}")]
    Spawn {
        shell: String,
        #[source]
        source: io::Error,
    },
    #[error("The shell process was started without a stdin pipe.")]
    MissingStdin,
    #[error("Could not send the command to the shell process: {0}")]
    Stdin(#[source] io::Error),
    /// The exit code pipe carried something other than a number.
    #[error("Expected a numeric exit code from the shell, got '{captured}'")]
    Protocol {
        captured: String,
        #[source]
        source: ParseIntError,
    },
    #[error("The shell process exited abnormally: {0}")]
    AbnormalExit(ExitStatus),
    #[error("Could not wait for the shell process: {0}")]
    Wait(#[source] io::Error),
    #[error("The command did not complete within {0:?}; the shell process was killed.")]
    TimedOut(Duration),
    #[error("The thread draining the {0} pipe panicked.")]
    DrainPanicked(Channel),
}

/// A byte sink commands' output is copied into.
pub type Sink = Box<dyn Write + Send>;

type DrainReport = (Channel, io::Result<u64>);

struct Running {
    child: Child,
    stdin: ChildStdin,
}

/// A persistent shell process.
///
/// Commands passed to [`Shell::exec`] run one at a time in the same shell
/// process, so the state left by one command (working directory, exported
/// variables, functions) is the state the next one starts from. The process
/// is started by the first `exec` and lives until [`Shell::stop`].
///
/// The standard output and error of every command, and its exit code, travel
/// back through named pipes in a private temporary directory; the shell's own
/// stdout and stderr are not connected to anything.
pub struct Shell {
    command: Command,
    shell_path: PathBuf,
    running: Option<Running>,
    stdout: Option<Sink>,
    stderr: Option<Sink>,
    transport: Option<Transport>,
    timeout: Option<Duration>,
}

impl fmt::Debug for Shell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shell")
            .field("shell_path", &self.shell_path)
            .field("pid", &self.pid())
            .field("captures_stdout", &self.stdout.is_some())
            .field("captures_stderr", &self.stderr.is_some())
            .field("transport", &self.transport)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Shell {
    /// Prepares a shell session.
    ///
    /// # Arguments
    /// * `bin` - Path to the shell executable.
    /// * `env` - `KEY=VALUE` entries for the initial environment; `None` inherits the caller's.
    /// * `dir` - The initial working directory.
    /// * `stdout` - Where to copy the standard output of commands; `None` discards it.
    /// * `stderr` - Where to copy the standard error of commands; `None` discards it.
    ///
    /// The pipes are created here, but the shell process is only started by the first `exec`.
    pub fn new(
        bin: impl Into<PathBuf>,
        env: Option<Vec<String>>,
        dir: impl Into<PathBuf>,
        stdout: Option<Sink>,
        stderr: Option<Sink>,
    ) -> Result<Self, SessionError> {
        ShellBuilder {
            shell: bin.into(),
            environment: Environment::from_entries(env),
            dir: Some(dir.into()),
            stdout,
            stderr,
            timeout: None,
        }
        .build()
    }

    /// Starts a [`ShellBuilder`] for the shell executable at `bin`.
    pub fn builder(bin: impl Into<PathBuf>) -> ShellBuilder {
        ShellBuilder::new(bin)
    }

    /// Executes `command` in the shell process and returns its exit code.
    ///
    /// Blocks until the command's stdout, stderr and exit code have all been
    /// copied out. `command` must be a single line.
    pub fn exec(&mut self, command: &str) -> Result<i32, SessionError> {
        self.ensure_alive()?;
        if self.running.is_none() {
            self.running = Some(self.start()?);
        }

        let Self {
            running,
            stdout,
            stderr,
            transport,
            timeout,
            ..
        } = self;
        let (Some(running), Some(transport)) = (running.as_mut(), transport.as_ref()) else {
            return Err(SessionError::AlreadyStopped);
        };

        let framed = transport.fragments().frame(command);
        log::debug!("Sending to shell: {}", framed.trim_end());

        let mut exit_code_buf: Vec<u8> = Vec::new();
        let timeout = *timeout;

        thread::scope(|scope| {
            let (done_tx, done_rx) = mpsc::channel();
            let mut drains = Vec::with_capacity(transport.channels().len());

            if let Some(sink) = stdout.as_mut() {
                drains.push(spawn_drain(scope, transport, Channel::Stdout, sink, &done_tx));
            }
            if let Some(sink) = stderr.as_mut() {
                drains.push(spawn_drain(scope, transport, Channel::Stderr, sink, &done_tx));
            }
            drains.push(spawn_drain(
                scope,
                transport,
                Channel::ExitCode,
                &mut exit_code_buf,
                &done_tx,
            ));
            drop(done_tx);

            let mut pending: Vec<Channel> = transport.channels().iter().collect();
            let outcome = match running.stdin.write_all(framed.as_bytes()) {
                Ok(()) => await_drains(running, transport, &done_rx, &mut pending, timeout),
                Err(e) => {
                    log::debug!("Could not write to shell stdin: {}", e);
                    release_pending(transport, &done_rx, &mut pending);
                    Err(SessionError::Stdin(e))
                }
            };

            for (channel, handle) in drains {
                if handle.join().is_err() {
                    return Err(SessionError::DrainPanicked(channel));
                }
            }
            outcome
        })?;

        let captured = String::from_utf8_lossy(&exit_code_buf);
        framing::parse_exit_code(&captured).map_err(|source| SessionError::Protocol {
            captured: captured.trim().to_string(),
            source,
        })
    }

    /// Stops the shell process and removes the pipes.
    ///
    /// Closes the shell's stdin and, if the process was ever started, waits
    /// for it to exit. Calling it a second time returns
    /// [`SessionError::AlreadyStopped`].
    pub fn stop(&mut self) -> Result<(), SessionError> {
        self.ensure_alive()?;
        let transport = self.transport.take().ok_or(SessionError::AlreadyStopped)?;
        let teardown = transport.close();
        finish_stop(teardown, self.running.take())
    }

    /// Returns `true` once the session can no longer run commands.
    pub fn is_stopped(&self) -> bool {
        self.ensure_alive().is_err()
    }

    /// The id of the shell process, once the first command has started it.
    pub fn pid(&self) -> Option<u32> {
        self.running.as_ref().map(|running| running.child.id())
    }

    /// The private directory holding this session's pipes, while it is alive.
    pub fn transport_dir(&self) -> Option<&Path> {
        self.transport.as_ref().map(Transport::dir)
    }

    fn ensure_alive(&self) -> Result<&Transport, SessionError> {
        match &self.transport {
            Some(transport) if transport.is_present() => Ok(transport),
            _ => Err(SessionError::AlreadyStopped),
        }
    }

    fn start(&mut self) -> Result<Running, SessionError> {
        let mut child = self.command.spawn().map_err(|source| SessionError::Spawn {
            shell: self.shell_path.display().to_string(),
            source,
        })?;
        let Some(stdin) = child.stdin.take() else {
            child.kill().ok();
            child.wait().ok();
            return Err(SessionError::MissingStdin);
        };
        log::debug!(
            "Started shell '{}' (PID: {})",
            self.shell_path.display(),
            child.id()
        );
        Ok(Running { child, stdin })
    }
}

impl Drop for Shell {
    fn drop(&mut self) {
        if let Some(Running { mut child, stdin }) = self.running.take() {
            drop(stdin);
            if !matches!(child.try_wait(), Ok(Some(_))) {
                log::debug!("Killing shell process {} on drop", child.id());
                if let Err(e) = child.kill() {
                    log::warn!("Failed to kill shell process {}: {}", child.id(), e);
                }
                child.wait().ok();
            }
        }
        if let Some(transport) = self.transport.take() {
            if let Err(e) = transport.close() {
                log::warn!("{}", e);
            }
        }
    }
}

/// Closes the shell's stdin and waits for it, whether or not removing the
/// pipes succeeded. A teardown failure is reported first.
fn finish_stop(
    teardown: Result<(), TransportError>,
    running: Option<Running>,
) -> Result<(), SessionError> {
    let reaped = match running {
        None => {
            log::debug!("Shell was never started, nothing to wait for.");
            Ok(())
        }
        Some(Running { mut child, stdin }) => {
            // Most shells only exit once stdin is closed.
            drop(stdin);
            match child.wait() {
                Ok(status) if status.success() => {
                    log::debug!("Shell process {} exited with {}", child.id(), status);
                    Ok(())
                }
                Ok(status) => Err(SessionError::AbnormalExit(status)),
                Err(e) => Err(SessionError::Wait(e)),
            }
        }
    };
    teardown?;
    reaped
}

fn spawn_drain<'scope, 'env, W>(
    scope: &'scope Scope<'scope, 'env>,
    pipes: &Transport,
    channel: Channel,
    sink: &'scope mut W,
    done: &Sender<DrainReport>,
) -> (Channel, ScopedJoinHandle<'scope, ()>)
where
    W: Write + Send + ?Sized,
{
    let path = pipes.pipe_path(channel);
    let done = done.clone();
    let handle = scope.spawn(move || {
        let result = transport::drain(&path, sink);
        log::trace!("Drain of {} finished: {:?}", channel, result);
        done.send((channel, result)).ok();
    });
    (channel, handle)
}

/// Waits until every drain in `pending` has reported. This is the execution barrier.
fn await_drains(
    running: &mut Running,
    transport: &Transport,
    done: &Receiver<DrainReport>,
    pending: &mut Vec<Channel>,
    timeout: Option<Duration>,
) -> Result<(), SessionError> {
    let deadline = timeout.map(|t| Instant::now() + t);
    let mut failure = None;

    while !pending.is_empty() {
        let report = match deadline {
            Some(deadline) => {
                done.recv_timeout(deadline.saturating_duration_since(Instant::now()))
            }
            None => done.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match report {
            Ok((channel, result)) => {
                pending.retain(|c| *c != channel);
                if let Err(source) = result {
                    failure.get_or_insert(SessionError::from(TransportError::Drain {
                        channel,
                        source,
                    }));
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                let elapsed = timeout.unwrap_or_default();
                log::debug!("Command timed out after {:?}, killing the shell.", elapsed);
                kill_process_group(&mut running.child);
                release_pending(transport, done, pending);
                return Err(SessionError::TimedOut(elapsed));
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    failure.map_or(Ok(()), Err)
}

/// Unblocks every drain still waiting for the shell to open its pipe.
///
/// Retries until all of them have reported, since a drain thread may not
/// have reached `open` yet when a release is attempted.
fn release_pending(
    transport: &Transport,
    done: &Receiver<DrainReport>,
    pending: &mut Vec<Channel>,
) {
    while !pending.is_empty() {
        for channel in pending.iter() {
            if let Err(e) = transport.release(*channel) {
                log::warn!("Could not release the {} pipe: {}", channel, e);
            }
        }
        loop {
            match done.recv_timeout(RELEASE_POLL_INTERVAL) {
                Ok((channel, _)) => pending.retain(|c| *c != channel),
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => return,
            }
            if pending.is_empty() {
                return;
            }
        }
    }
}

/// Kills the shell together with whatever it is running in the foreground,
/// so no grandchild keeps a pipe open.
fn kill_process_group(child: &mut Child) {
    let group = i32::try_from(child.id()).map(Pid::from_raw);
    let killed = match group {
        Ok(pid) => signal::killpg(pid, signal::Signal::SIGKILL).map_err(io::Error::from),
        Err(_) => child.kill(),
    };
    if let Err(e) = killed {
        log::warn!("Failed to kill shell process {}: {}", child.id(), e);
    }
}

/// Builder for [`Shell`], for callers that do not need the positional [`Shell::new`].
pub struct ShellBuilder {
    shell: PathBuf,
    environment: Environment,
    dir: Option<PathBuf>,
    stdout: Option<Sink>,
    stderr: Option<Sink>,
    timeout: Option<Duration>,
}

impl fmt::Debug for ShellBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShellBuilder")
            .field("shell", &self.shell)
            .field("environment", &self.environment)
            .field("dir", &self.dir)
            .field("stdout", &self.stdout.is_some())
            .field("stderr", &self.stderr.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ShellBuilder {
    /// A builder for the shell at `shell` that inherits the caller's environment
    /// and working directory and discards all output.
    pub fn new(shell: impl Into<PathBuf>) -> Self {
        Self {
            shell: shell.into(),
            environment: Environment::Inherit,
            dir: None,
            stdout: None,
            stderr: None,
            timeout: None,
        }
    }

    /// Sets the initial environment.
    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Sets the initial environment from `KEY=VALUE` entries, replacing the inherited one.
    pub fn env_entries<I, S>(self, entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.environment(Environment::from_entries(Some(entries)))
    }

    /// Makes the shell inherit the caller's environment (the default).
    pub fn inherit_env(self) -> Self {
        self.environment(Environment::Inherit)
    }

    /// Sets the initial working directory.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    /// Captures the standard output of commands into `sink`.
    pub fn stdout(mut self, sink: impl Write + Send + 'static) -> Self {
        self.stdout = Some(Box::new(sink));
        self
    }

    /// Captures the standard error of commands into `sink`.
    pub fn stderr(mut self, sink: impl Write + Send + 'static) -> Self {
        self.stderr = Some(Box::new(sink));
        self
    }

    /// Gives up on a command after `timeout`, killing the shell.
    ///
    /// Without it, `exec` waits for as long as the command runs.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Creates the pipes and prepares the (not yet started) shell process.
    pub fn build(self) -> Result<Shell, SessionError> {
        let channels = ChannelSet::new(self.stdout.is_some(), self.stderr.is_some());
        let transport = Transport::create(channels)?;

        let mut command = Command::new(&self.shell);
        if let Environment::Exact(vars) = &self.environment {
            command.env_clear().envs(vars.iter().map(|(k, v)| (k, v)));
        }
        if let Some(dir) = &self.dir {
            command.current_dir(dir);
        }
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        // A timeout kills the whole group, so a foreground child cannot keep a pipe open.
        if self.timeout.is_some() {
            command.process_group(0);
        }

        Ok(Shell {
            command,
            shell_path: self.shell,
            running: None,
            stdout: self.stdout,
            stderr: self.stderr,
            transport: Some(transport),
            timeout: self.timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sink::SharedBuffer;

    const BASH: &str = "/bin/bash";

    fn capture(buffer: &SharedBuffer) -> Option<Sink> {
        Some(Box::new(buffer.clone()))
    }

    #[test]
    fn test_echo_to_stdout() {
        let stdout = SharedBuffer::new();
        let mut shell = Shell::new(BASH, None, "/", capture(&stdout), None).unwrap();

        assert_eq!(shell.exec("echo foo").unwrap(), 0);
        shell.stop().unwrap();

        assert_eq!(stdout.to_string_lossy(), "foo\n");
    }

    #[test]
    fn test_cd_persists_between_commands() {
        let stdout = SharedBuffer::new();
        let mut shell = Shell::new(BASH, None, "/", capture(&stdout), None).unwrap();

        shell.exec("cd tmp").unwrap();
        shell.exec("pwd").unwrap();
        shell.stop().unwrap();

        assert_eq!(stdout.to_string_lossy(), "/tmp\n");
    }

    #[test]
    fn test_export_overrides_initial_environment() {
        let stdout = SharedBuffer::new();
        let env = Some(vec!["FOO=0".to_string()]);
        let mut shell = Shell::new(BASH, env, "/", capture(&stdout), None).unwrap();

        shell.exec("export FOO=1").unwrap();
        shell.exec("echo $FOO").unwrap();
        shell.stop().unwrap();

        assert_eq!(stdout.to_string_lossy(), "1\n");
    }

    #[test]
    fn test_builder_env_entries() {
        let stdout = SharedBuffer::new();
        let mut shell = Shell::builder(BASH)
            .env_entries(["FOO=0"])
            .current_dir("/")
            .stdout(stdout.clone())
            .build()
            .unwrap();

        shell.exec("echo \"$FOO-${PERSHELL_SURELY_UNSET:-unset}\"").unwrap();
        shell.stop().unwrap();

        assert_eq!(stdout.to_string_lossy(), "0-unset\n");
    }

    #[test]
    fn test_exit_codes_match_command() {
        let mut shell = Shell::new(BASH, None, "/", None, None).unwrap();

        assert_eq!(shell.exec("test 1 -le 2").unwrap(), 0);
        assert_eq!(shell.exec("test 2 -le 1").unwrap(), 1);
        assert_eq!(shell.exec("(exit 42)").unwrap(), 42);
        assert_eq!(shell.exec("true").unwrap(), 0);
        shell.stop().unwrap();
    }

    #[test]
    fn test_stderr_is_captured_separately() {
        let stdout = SharedBuffer::new();
        let stderr = SharedBuffer::new();
        let mut shell =
            Shell::new(BASH, None, "/", capture(&stdout), capture(&stderr)).unwrap();

        assert_eq!(shell.exec("echo foo").unwrap(), 0);
        assert_eq!(shell.exec("sh -c 'echo oops >&2; exit 3'").unwrap(), 3);
        shell.stop().unwrap();

        assert_eq!(stdout.to_string_lossy(), "foo\n");
        assert_eq!(stderr.to_string_lossy(), "oops\n");
    }

    #[test]
    fn test_stderr_only_session() {
        let stderr = SharedBuffer::new();
        let mut shell = Shell::new(BASH, None, "/", None, capture(&stderr)).unwrap();

        shell.exec("echo discarded").unwrap();
        shell.exec("sh -c 'echo kept >&2'").unwrap();
        shell.stop().unwrap();

        assert_eq!(stderr.to_string_lossy(), "kept\n");
    }

    #[test]
    fn test_many_commands_do_not_interleave() {
        let stdout = SharedBuffer::new();
        let mut shell = Shell::new(BASH, None, "/", capture(&stdout), None).unwrap();

        for i in 0..20 {
            stdout.clear();
            assert_eq!(shell.exec(&format!("echo line-{i}")).unwrap(), 0);
            assert_eq!(stdout.to_string_lossy(), format!("line-{i}\n"));
        }
        shell.stop().unwrap();
    }

    #[test]
    fn test_shell_starts_lazily() {
        let mut shell = Shell::new(BASH, None, "/", None, None).unwrap();
        assert!(shell.pid().is_none());
        assert!(!shell.is_stopped());

        shell.exec("true").unwrap();
        let pid = shell.pid();
        assert!(pid.is_some());
        shell.exec("true").unwrap();
        assert_eq!(shell.pid(), pid);
        shell.stop().unwrap();
    }

    #[test]
    fn test_stop_without_exec() {
        let mut shell = Shell::new(BASH, None, "/", None, None).unwrap();
        let dir = shell.transport_dir().unwrap().to_path_buf();
        assert!(dir.is_dir());

        shell.stop().unwrap();
        assert!(!dir.exists());
        assert!(shell.is_stopped());
        assert!(shell.transport_dir().is_none());
    }

    #[test]
    fn test_stop_twice_is_already_stopped() {
        let mut shell = Shell::new(BASH, None, "/", None, None).unwrap();
        shell.exec("true").unwrap();
        shell.stop().unwrap();

        assert!(matches!(shell.stop(), Err(SessionError::AlreadyStopped)));
        assert!(matches!(shell.stop(), Err(SessionError::AlreadyStopped)));
    }

    #[test]
    fn test_exec_after_stop_is_already_stopped() {
        let mut shell = Shell::new(BASH, None, "/", None, None).unwrap();
        shell.stop().unwrap();

        assert!(matches!(shell.exec("echo foo"), Err(SessionError::AlreadyStopped)));
    }

    #[test]
    fn test_removed_transport_dir_means_stopped() {
        let mut shell = Shell::new(BASH, None, "/", None, None).unwrap();
        std::fs::remove_dir_all(shell.transport_dir().unwrap()).unwrap();

        assert!(shell.is_stopped());
        assert!(matches!(shell.exec("true"), Err(SessionError::AlreadyStopped)));
    }

    #[test]
    fn test_nonzero_shell_exit_is_abnormal() {
        let mut shell = Shell::new(BASH, None, "/", None, None).unwrap();
        shell.exec("trap 'exit 7' EXIT").unwrap();

        let result = shell.stop();
        assert!(
            matches!(&result, Err(SessionError::AbnormalExit(status)) if status.code() == Some(7)),
            "unexpected result: {:?}",
            result
        );
    }

    #[test]
    fn test_missing_shell_fails_on_first_exec() {
        let mut shell =
            Shell::new("/nonexistent/pershell-shell", None, "/", None, None).unwrap();
        assert!(matches!(shell.exec("true"), Err(SessionError::Spawn { .. })));
    }

    struct FailingSink;

    impl Write for FailingSink {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_failing_sink_reports_error_and_keeps_shell() {
        let mut shell =
            Shell::new(BASH, None, "/", Some(Box::new(FailingSink)), None).unwrap();

        // A builtin writing more than the pipe buffer holds.
        let result = shell.exec("printf '%200000s' x");
        assert!(
            matches!(
                &result,
                Err(SessionError::Transport(TransportError::Drain {
                    channel: Channel::Stdout,
                    ..
                }))
            ),
            "unexpected result: {:?}",
            result
        );

        assert_eq!(shell.exec("(exit 3)").unwrap(), 3);
        assert_eq!(shell.exec("true").unwrap(), 0);
        shell.stop().unwrap();
    }

    #[test]
    fn test_shell_shares_caller_process_group_without_timeout() {
        let mut shell = Shell::new(BASH, None, "/", None, None).unwrap();
        shell.exec("true").unwrap();
        let pid = Pid::from_raw(i32::try_from(shell.pid().unwrap()).unwrap());

        assert_eq!(nix::unistd::getpgid(Some(pid)).unwrap(), nix::unistd::getpgrp());
        shell.stop().unwrap();
    }

    #[test]
    fn test_shell_leads_own_process_group_with_timeout() {
        let mut shell = Shell::builder(BASH)
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap();
        shell.exec("true").unwrap();
        let pid = Pid::from_raw(i32::try_from(shell.pid().unwrap()).unwrap());

        assert_eq!(nix::unistd::getpgid(Some(pid)).unwrap(), pid);
        shell.stop().unwrap();
    }

    #[test]
    fn test_teardown_failure_still_reaps_shell() {
        let mut shell = Shell::new(BASH, None, "/", None, None).unwrap();
        shell.exec("true").unwrap();
        let pid = Pid::from_raw(i32::try_from(shell.pid().unwrap()).unwrap());

        let transport = shell.transport.take().unwrap();
        let dir = transport.dir().to_path_buf();
        transport.close().unwrap();
        let teardown = Err(TransportError::Teardown {
            path: dir,
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        });

        let result = finish_stop(teardown, shell.running.take());
        assert!(matches!(
            result,
            Err(SessionError::Transport(TransportError::Teardown { .. }))
        ));
        // Already waited for, so there is nothing left to reap.
        assert_eq!(
            nix::sys::wait::waitpid(pid, Some(nix::sys::wait::WaitPidFlag::WNOHANG)),
            Err(nix::errno::Errno::ECHILD)
        );
    }

    #[test]
    fn test_timeout_kills_hung_command() {
        let stdout = SharedBuffer::new();
        let mut shell = Shell::builder(BASH)
            .current_dir("/")
            .stdout(stdout.clone())
            .timeout(Duration::from_millis(300))
            .build()
            .unwrap();

        assert_eq!(shell.exec("echo before").unwrap(), 0);

        let started = Instant::now();
        let result = shell.exec("sleep 30");
        assert!(matches!(result, Err(SessionError::TimedOut(_))));
        assert!(started.elapsed() < Duration::from_secs(10));

        assert!(shell.exec("echo after").is_err());
        assert!(matches!(shell.stop(), Err(SessionError::AbnormalExit(_))));
        assert_eq!(stdout.to_string_lossy(), "before\n");
    }

    #[test]
    fn test_drop_cleans_up() {
        let mut shell = Shell::new(BASH, None, "/", None, None).unwrap();
        shell.exec("true").unwrap();
        let dir = shell.transport_dir().unwrap().to_path_buf();
        drop(shell);
        assert!(!dir.exists());
    }
}
