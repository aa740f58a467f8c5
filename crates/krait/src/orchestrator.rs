//! Driver entry points.
//!
//! [`track_module`] runs discovery in-process. [`track_module_isolated`]
//! fans each queried module out to its own subprocess over a bounded worker
//! pool: every sub-job gets a fresh process (and therefore a fresh module
//! table), prints a JSON blob on stdout, and the parent parses and merges.
//! Merged results are keyed lexically, so the outcome is independent of
//! worker scheduling.
//!
//! Cancellation is cooperative at the sub-module boundary: a [`CancelToken`]
//! is checked before each sub-job spawns and polled while it runs, so an
//! abort kills outstanding subprocesses and discards their pending output.
//! Partial results are never surfaced from a cancelled run.

use anyhow::{Context, Result, anyhow};
use log::{debug, warn};
use rayon::prelude::*;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::config::{Config, MODE_ENV_VAR};
use crate::report::{ModuleEntry, TrackReport, render_report};
use crate::tracker::{TrackOptions, track};

const SUBJOB_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Shared abort flag for an isolated tracking run. Cloning hands the same
/// flag to another thread; cancelling is sticky.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the driver to stop: no further sub-jobs spawn, in-flight
    /// subprocesses are killed, and their pending output is discarded.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Track the dependencies of a single module in-process.
///
/// Returns the mapping from each queried internal module name to its
/// third-party closure, rendered according to the output flags.
pub fn track_module(config: &Config, opts: &TrackOptions) -> Result<TrackReport> {
    let tracked = track(config, opts)?;
    Ok(render_report(&tracked, opts))
}

/// Track with per-module subprocess isolation.
///
/// The queried module set is enumerated in-process first; each member then
/// runs in its own subprocess with `--submodules` stripped from its argument
/// vector. A failed sub-job becomes a typed error entry unless `strict` is
/// set, in which case the whole call fails (cancelling outstanding sub-jobs)
/// and partial results are discarded.
pub fn track_module_isolated(
    config: &Config,
    opts: &TrackOptions,
    config_path: Option<&Path>,
    strict: bool,
    cancel: &CancelToken,
) -> Result<TrackReport> {
    let tracked = track(config, opts)?;
    let jobs: Vec<String> = tracked.closures.keys().cloned().collect();
    debug!("Isolated tracking over {} sub-jobs", jobs.len());

    let exe = subprocess_exe()?;
    let results: Vec<(String, Result<Option<TrackReport>>)> = jobs
        .par_iter()
        .map(|module| {
            if cancel.is_cancelled() {
                return (module.clone(), Ok(None));
            }
            let result = run_subprocess(&exe, module, opts, config_path, cancel);
            if strict && result.is_err() {
                // Stop outstanding sub-jobs before they spawn
                cancel.cancel();
            }
            (module.clone(), result)
        })
        .collect();

    let mut report = TrackReport::default();
    let mut first_error = None;
    for (module, result) in results {
        match result {
            Ok(Some(child_report)) => report.merge(child_report),
            // Cancelled before or during the sub-job; nothing to merge
            Ok(None) => {}
            Err(err) if strict => {
                if first_error.is_none() {
                    first_error = Some(err.context(format!("sub-job for '{module}' failed")));
                }
            }
            Err(err) => {
                warn!("Sub-job for '{module}' failed: {err:#}");
                report
                    .0
                    .insert(module, ModuleEntry::Failed { error: format!("{err:#}") });
            }
        }
    }

    if let Some(err) = first_error {
        return Err(err);
    }
    if cancel.is_cancelled() {
        return Err(anyhow!(
            "isolated tracking was cancelled; partial results discarded"
        ));
    }
    Ok(report)
}

/// The binary to spawn for sub-jobs: `KRAIT_EXE` when set (tests), else the
/// current executable.
fn subprocess_exe() -> Result<PathBuf> {
    if let Ok(exe) = std::env::var("KRAIT_EXE") {
        return Ok(PathBuf::from(exe));
    }
    std::env::current_exe().context("could not determine the current executable for sub-jobs")
}

/// Run one sub-job to completion, polling the cancel token while it is in
/// flight. Returns `Ok(None)` when the job was killed by cancellation.
fn run_subprocess(
    exe: &Path,
    module: &str,
    opts: &TrackOptions,
    config_path: Option<&Path>,
    cancel: &CancelToken,
) -> Result<Option<TrackReport>> {
    let mut cmd = Command::new(exe);
    cmd.arg("--name").arg(module);
    if opts.track_import_stack {
        cmd.arg("--track_import_stack");
    }
    if opts.detect_transitive {
        cmd.arg("--detect_transitive");
    }
    if opts.show_optional {
        cmd.arg("--show_optional");
    }
    if opts.full_depth {
        cmd.arg("--full_depth");
    }
    if let Some(path) = config_path {
        cmd.arg("--config").arg(path);
    }
    // The child must not fan out again
    cmd.env(MODE_ENV_VAR, "BEST_EFFORT");
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    debug!("Spawning sub-job: {:?}", cmd);
    let mut child = cmd
        .spawn()
        .with_context(|| format!("failed to spawn sub-job for '{module}'"))?;
    // Drain the pipes off-thread so a chatty child cannot block on a full
    // pipe while the parent is only polling its exit status.
    let stdout_reader = pipe_reader(child.stdout.take());
    let stderr_reader = pipe_reader(child.stderr.take());

    let status = loop {
        if cancel.is_cancelled() {
            let _ = child.kill();
            let _ = child.wait();
            debug!("Killed sub-job for '{module}'");
            return Ok(None);
        }
        match child.try_wait()? {
            Some(status) => break status,
            None => thread::sleep(SUBJOB_POLL_INTERVAL),
        }
    };

    let stdout = join_reader(stdout_reader);
    let stderr = join_reader(stderr_reader);

    if !status.success() {
        return Err(anyhow!(
            "subprocess exited with {}: {}",
            status,
            stderr.trim()
        ));
    }

    let report: TrackReport = serde_json::from_str(stdout.trim())
        .with_context(|| format!("unparseable sub-job output for '{module}'"))?;
    Ok(Some(report))
}

fn pipe_reader<R: Read + Send + 'static>(pipe: Option<R>) -> Option<thread::JoinHandle<String>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = String::new();
            let _ = pipe.read_to_string(&mut buf);
            buf
        })
    })
}

fn join_reader(handle: Option<thread::JoinHandle<String>>) -> String {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}
