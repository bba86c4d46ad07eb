use crate::error::{Error, Result};

use std::ffi::OsStr;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// An external program invoked with captured output and an optional deadline.
#[derive(Clone, Debug)]
pub struct Tool {
    program: PathBuf,
    timeout: Option<Duration>,
}

#[derive(Debug)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

impl Tool {
    const POLL_INTERVAL: Duration = Duration::from_millis(50);

    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into(), timeout: None }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn name(&self) -> String {
        self.program
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }

    fn spawn<I, S>(&self, args: I) -> Result<Child>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::process(self.name(), format!("failed to start: {}", e)))
    }

    fn drain<R: Read + Send + 'static>(source: Option<R>) -> JoinHandle<String> {
        thread::spawn(move || {
            let mut buffer = Vec::new();
            if let Some(mut source) = source {
                let _ = source.read_to_end(&mut buffer);
            }
            String::from_utf8_lossy(&buffer).into_owned()
        })
    }

    fn wait(&self, child: &mut Child) -> Result<ExitStatus> {
        let started = Instant::now();
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if let Some(timeout) = self.timeout {
                if started.elapsed() >= timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(Error::process(
                        self.name(),
                        format!("timed out after {}s", timeout.as_secs_f64()),
                    ));
                }
            }
            thread::sleep(Self::POLL_INTERVAL);
        }
    }

    /// Runs the tool to completion; a non-zero exit becomes `ProcessExecution`
    /// carrying the tail of stderr.
    pub fn run<I, S>(&self, args: I) -> Result<ToolOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut child = self.spawn(args)?;
        let stdout = Self::drain(child.stdout.take());
        let stderr = Self::drain(child.stderr.take());
        // On timeout the readers are detached: grandchildren may still hold
        // the pipes open after the child is killed.
        let status = self.wait(&mut child)?;
        let output = ToolOutput {
            stdout: stdout.join().unwrap_or_default(),
            stderr: stderr.join().unwrap_or_default(),
        };

        if status.success() {
            tracing::debug!(tool = %self.name(), "tool finished");
            return Ok(output);
        }

        let code = status
            .code()
            .map(|code| code.to_string())
            .unwrap_or_else(|| "signal".to_string());
        let diagnostic = if output.stderr.trim().is_empty() {
            format!("exit status {}", code)
        } else {
            format!("exit status {}: {}", code, output.stderr.trim())
        };
        Err(Error::process(self.name(), diagnostic))
    }
}
