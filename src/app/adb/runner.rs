use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::app::error::AppError;
use crate::app::logging::ActivityLog;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: Some(0),
        }
    }

    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code: Some(exit_code),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Text to report when the command did not succeed.
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        match self.exit_code {
            Some(code) => format!("exited with code {code}"),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Keeps a GUI host from flashing a console window for every bridge call.
pub fn hide_console_window(command: &mut Command) -> &mut Command {
    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        command.creation_flags(CREATE_NO_WINDOW);
    }
    command
}

pub fn device_args(serial: &str, rest: &[&str]) -> Vec<String> {
    let mut args = Vec::with_capacity(rest.len() + 2);
    args.push("-s".to_string());
    args.push(serial.to_string());
    args.extend(rest.iter().map(|value| value.to_string()));
    args
}

/// Quotes `value` for the device shell, which re-parses everything after `adb shell`.
/// Plain words are passed through unchanged.
pub fn shell_quote(value: &str) -> String {
    let plain = !value.is_empty()
        && value
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || "/._-+=:,@%".contains(ch));
    if plain {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> std::thread::JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buffer = Vec::<u8>::new();
        let mut temp = [0u8; 4096];
        loop {
            match reader.read(&mut temp) {
                Ok(0) => break,
                Ok(count) => buffer.extend_from_slice(&temp[..count]),
                Err(_) => break,
            }
        }
        buffer
    })
}

/// Spawns `program args`, waits up to `timeout`, and returns whatever the process printed.
/// A non-zero exit is still `Ok`; only spawn, poll and timeout problems are errors.
pub fn run_command_with_timeout(
    program: &str,
    args: &[String],
    timeout: Duration,
    trace_id: &str,
) -> Result<CommandOutput, AppError> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    hide_console_window(&mut command);
    let mut child = command
        .spawn()
        .map_err(|err| AppError::execution(format!("Failed to run {program}: {err}"), trace_id))?;

    // Both pipes are drained concurrently; a chatty child would otherwise block on a full
    // pipe buffer and look like a timeout.
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::system("Failed to capture stdout", trace_id))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| AppError::system("Failed to capture stderr", trace_id))?;
    let stdout_handle = drain(stdout);
    let stderr_handle = drain(stderr);

    let start = Instant::now();
    let exit_code = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status.code(),
            Ok(None) => {
                if start.elapsed() > timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    let _ = stdout_handle.join();
                    let _ = stderr_handle.join();
                    return Err(AppError::execution(
                        format!("Command timed out after {}s", timeout.as_secs()),
                        trace_id,
                    ));
                }
                std::thread::sleep(Duration::from_millis(20));
            }
            Err(err) => {
                let _ = child.kill();
                let _ = stdout_handle.join();
                let _ = stderr_handle.join();
                return Err(AppError::execution(
                    format!("Failed to poll command: {err}"),
                    trace_id,
                ));
            }
        }
    };

    let stdout_bytes = stdout_handle.join().unwrap_or_default();
    let stderr_bytes = stderr_handle.join().unwrap_or_default();

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&stdout_bytes).to_string(),
        stderr: String::from_utf8_lossy(&stderr_bytes).to_string(),
        exit_code,
    })
}

/// Spawns a long-lived bridge child with piped output, for streaming consumers.
pub fn spawn_piped(program: &str, args: &[String]) -> std::io::Result<Child> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    hide_console_window(&mut command);
    command.spawn()
}

/// Raw access to the bridge executable. The bridge itself is a seam so the services can be
/// exercised without a device.
pub trait BridgeExecutor: Send + Sync {
    fn invoke(&self, args: &[String], trace_id: &str) -> Result<CommandOutput, AppError>;

    /// Executable used to spawn interactive children.
    fn program(&self) -> &str;
}

pub struct AdbExecutor {
    program: String,
    timeout: Duration,
}

impl AdbExecutor {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

impl BridgeExecutor for AdbExecutor {
    fn invoke(&self, args: &[String], trace_id: &str) -> Result<CommandOutput, AppError> {
        run_command_with_timeout(&self.program, args, self.timeout, trace_id)
    }

    fn program(&self) -> &str {
        &self.program
    }
}

/// Normalizing front of the bridge: every call comes back as either a successful output or
/// an execution failure carrying the bridge's diagnostic text.
#[derive(Clone)]
pub struct Bridge {
    executor: Arc<dyn BridgeExecutor>,
    log: ActivityLog,
}

impl Bridge {
    pub fn new(executor: Arc<dyn BridgeExecutor>, log: ActivityLog) -> Self {
        Self { executor, log }
    }

    pub fn program(&self) -> &str {
        self.executor.program()
    }

    pub fn log(&self) -> &ActivityLog {
        &self.log
    }

    /// Runs the bridge and reports failures to the activity log.
    pub fn run(&self, args: &[String], trace_id: &str) -> Result<CommandOutput, AppError> {
        self.execute(args, trace_id, false)
    }

    /// Same as [`Bridge::run`] but failures are only traced, for polling calls that expect
    /// to fail regularly.
    pub fn run_quiet(&self, args: &[String], trace_id: &str) -> Result<CommandOutput, AppError> {
        self.execute(args, trace_id, true)
    }

    /// Runs the bridge without turning a non-zero exit into an error.
    pub fn run_unchecked(&self, args: &[String], trace_id: &str) -> Result<CommandOutput, AppError> {
        debug!(trace_id = %trace_id, args = ?args, "bridge call");
        self.executor.invoke(args, trace_id)
    }

    fn execute(
        &self,
        args: &[String],
        trace_id: &str,
        suppress_log: bool,
    ) -> Result<CommandOutput, AppError> {
        let result = self.run_unchecked(args, trace_id).and_then(|output| {
            if output.succeeded() {
                Ok(output)
            } else {
                Err(AppError::execution(output.diagnostic(), trace_id))
            }
        });
        if let Err(err) = &result {
            warn!(trace_id = %trace_id, args = ?args, error = %err, "bridge call failed");
            if !suppress_log {
                self.log.log(format!("Error: {}", err.error));
            }
        }
        result
    }
}
