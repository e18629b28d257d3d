use log::{info, warn};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

/// How the debugger is invoked for each generated script.
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub gdb_binary: PathBuf,
    /// Per-script timeout. One hung or infinite-loop-triggering sample must
    /// not stall the whole batch.
    pub timeout: Duration,
    /// Echo captured debugger output through the logger instead of only
    /// summarizing it.
    pub verbose: bool,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            gdb_binary: PathBuf::from("gdb"),
            timeout: Duration::from_secs(60),
            verbose: false,
        }
    }
}

/// Terminal state of one script execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptStatus {
    Completed { exit_code: Option<i32> },
    Timeout,
}

impl ScriptStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, ScriptStatus::Completed { exit_code: Some(0) })
    }
}

/// Result of running one triage script: its status plus the combined
/// stdout/stderr text, kept opaque for downstream classification parsing.
#[derive(Debug)]
pub struct ScriptOutcome {
    pub script: PathBuf,
    pub status: ScriptStatus,
    pub output: String,
}

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Failed to spawn debugger {gdb:?} for script {script:?}: {reason}")]
    Spawn {
        gdb: PathBuf,
        script: PathBuf,
        reason: String,
    },

    #[error("Runner I/O error: {0}")]
    Io(String),
}

/// Runs generated triage scripts non-interactively under the debugger.
pub struct ScriptRunner {
    settings: RunnerSettings,
}

impl ScriptRunner {
    pub fn new(settings: RunnerSettings) -> Self {
        Self { settings }
    }

    /// Executes one script, capturing combined output.
    ///
    /// A non-zero debugger exit is reported in the outcome, not as an
    /// `Err` — per-sample debugger failures are classification outcomes,
    /// never batch aborts. Exceeding the timeout kills the debugger and
    /// yields [`ScriptStatus::Timeout`].
    pub fn run(&self, script: &Path) -> Result<ScriptOutcome, RunnerError> {
        let mut cmd = Command::new(&self.settings.gdb_binary);
        cmd.args(["--batch", "-nx", "-x"])
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| RunnerError::Spawn {
            gdb: self.settings.gdb_binary.clone(),
            script: script.to_path_buf(),
            reason: e.to_string(),
        })?;

        // Drain both pipes from their own threads so a chatty debugger
        // cannot deadlock the timeout loop on a full pipe buffer.
        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();
        let stdout_reader = thread::spawn(move || read_pipe(stdout_pipe));
        let stderr_reader = thread::spawn(move || read_pipe(stderr_pipe));

        let status = self.wait_with_timeout(&mut child)?;

        let mut output_bytes = stdout_reader.join().unwrap_or_default();
        output_bytes.extend(stderr_reader.join().unwrap_or_default());
        let output = String::from_utf8_lossy(&output_bytes).into_owned();

        if self.settings.verbose {
            for line in output.lines() {
                info!("[debugger] {}", line);
            }
        }
        match &status {
            ScriptStatus::Timeout => {
                warn!("Triage script {:?} timed out", script);
            }
            ScriptStatus::Completed { exit_code } if !status.is_success() => {
                warn!(
                    "Triage script {:?} exited with {:?}",
                    script, exit_code
                );
            }
            _ => {}
        }

        Ok(ScriptOutcome {
            script: script.to_path_buf(),
            status,
            output,
        })
    }

    fn wait_with_timeout(&self, child: &mut Child) -> Result<ScriptStatus, RunnerError> {
        let start = Instant::now();
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    return Ok(ScriptStatus::Completed {
                        exit_code: status.code(),
                    });
                }
                Ok(None) => {
                    if start.elapsed() > self.settings.timeout {
                        if let Err(e) = child.kill() {
                            return Err(RunnerError::Io(format!(
                                "Failed to kill timed-out debugger: {e}"
                            )));
                        }
                        let _ = child.wait();
                        return Ok(ScriptStatus::Timeout);
                    }
                    thread::sleep(Duration::from_millis(50));
                }
                Err(e) => {
                    return Err(RunnerError::Io(format!(
                        "Error waiting for debugger: {e}"
                    )));
                }
            }
        }
    }

    /// Runs a batch of independent per-sample scripts on a bounded worker
    /// pool.
    ///
    /// Results keep script order. Setting `cancel` stops new launches;
    /// already-running debuggers are bounded by their per-script timeout.
    /// Scripts never launched (because of cancellation) contribute no
    /// result.
    pub fn run_batch(
        &self,
        scripts: &[PathBuf],
        jobs: usize,
        cancel: &AtomicBool,
    ) -> Vec<Result<ScriptOutcome, RunnerError>> {
        let workers = jobs.max(1).min(scripts.len().max(1));
        let cursor = AtomicUsize::new(0);
        let results: Mutex<Vec<(usize, Result<ScriptOutcome, RunnerError>)>> =
            Mutex::new(Vec::with_capacity(scripts.len()));

        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| {
                    loop {
                        if cancel.load(Ordering::SeqCst) {
                            break;
                        }
                        let i = cursor.fetch_add(1, Ordering::SeqCst);
                        if i >= scripts.len() {
                            break;
                        }
                        let result = self.run(&scripts[i]);
                        if let Ok(mut guard) = results.lock() {
                            guard.push((i, result));
                        }
                    }
                });
            }
        });

        let mut collected = results
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        collected.sort_by_key(|(i, _)| *i);
        collected.into_iter().map(|(_, result)| result).collect()
    }
}

fn read_pipe<R: Read>(pipe: Option<R>) -> Vec<u8> {
    let mut buffer = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buffer);
    }
    buffer
}
