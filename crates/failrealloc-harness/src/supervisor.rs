//! Runs `append-check` under `LD_PRELOAD` and classifies how it ended.

use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::time::Instant;

use serde::{Deserialize, Serialize};

use failrealloc_core::{FAIL_AFTER_ENV, TRACE_ENV};
use failrealloc_subjects::Subject;

use crate::error::HarnessError;
use crate::scenario::{Mode, Transcript};
use crate::structured_log::{LogEmitter, LogEntry, LogLevel, Outcome};

pub const CHECKER_NAME: &str = "append-check";
pub const SHIM_FILE_NAME: &str = "libfailrealloc_abi.so";

/// How a checker process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunVerdict {
    /// Exit 0: every scenario it ran met its expectation.
    Passed,
    /// Exit 1: a scenario saw a result it did not expect.
    ContractViolation,
    /// Exit 2: the checker rejected its arguments.
    UsageError,
    /// Killed by a signal or exited with an unknown code.
    Crashed,
}

impl RunVerdict {
    #[must_use]
    pub fn classify(status: ExitStatus) -> Self {
        match status.code() {
            Some(0) => Self::Passed,
            Some(1) => Self::ContractViolation,
            Some(2) => Self::UsageError,
            _ => Self::Crashed,
        }
    }
}

/// One checker invocation.
#[derive(Debug, Clone)]
pub struct PreloadRun {
    pub shim: PathBuf,
    pub checker: PathBuf,
    pub subject: Subject,
    pub mode: Mode,
    /// `None` leaves `FAIL_REALLOC_AFTER` unset in the child.
    pub fail_after: Option<u64>,
    pub trace: bool,
}

/// Result of a finished [`PreloadRun`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub subject: Subject,
    pub mode: Mode,
    pub fail_after: Option<u64>,
    pub verdict: RunVerdict,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub transcript: Transcript,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl RunRecord {
    /// Number of lines the shim's trace mode wrote to stderr.
    #[must_use]
    pub fn injection_reports(&self) -> usize {
        self.stderr
            .lines()
            .filter(|l| l.starts_with("failrealloc: injected realloc failure"))
            .count()
    }

    /// JSONL record for this run, judged against `expected`.
    pub fn log_entry(&self, emitter: &mut LogEmitter, expected: Option<RunVerdict>) -> LogEntry {
        let outcome = match expected {
            Some(v) if v == self.verdict => Outcome::Pass,
            Some(_) => Outcome::Fail,
            None if self.verdict == RunVerdict::Passed => Outcome::Pass,
            None => Outcome::Fail,
        };
        let level = if outcome == Outcome::Pass {
            LogLevel::Info
        } else {
            LogLevel::Error
        };
        emitter
            .entry(level, "checker_run")
            .with_run(self.subject, self.mode, self.fail_after)
            .with_outcome(outcome)
            .with_exit(self.exit_code, self.signal)
            .with_shim_calls(self.transcript.shim_calls)
            .with_duration_ms(self.duration_ms)
            .with_details(serde_json::json!({
                "verdict": self.verdict,
                "expected": expected,
                "oom_injected": self.transcript.oom_injected,
                "oom_inactive": self.transcript.oom_inactive,
                "stderr": self.stderr,
            }))
    }
}

impl PreloadRun {
    #[must_use]
    pub fn new(shim: impl Into<PathBuf>, checker: impl Into<PathBuf>, subject: Subject) -> Self {
        Self {
            shim: shim.into(),
            checker: checker.into(),
            subject,
            mode: Mode::Full,
            fail_after: None,
            trace: false,
        }
    }

    #[must_use]
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_fail_after(mut self, fail_after: Option<u64>) -> Self {
        self.fail_after = fail_after;
        self
    }

    #[must_use]
    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    /// The child command, with its environment fully determined by `self`.
    #[must_use]
    pub fn command(&self, shim: &Path) -> Command {
        let mut cmd = Command::new(&self.checker);
        cmd.arg(self.subject.name());
        if self.mode == Mode::OomOnly {
            cmd.arg("--oom-only");
        }
        cmd.env("LD_PRELOAD", shim);
        match self.fail_after {
            Some(n) => cmd.env(FAIL_AFTER_ENV, n.to_string()),
            None => cmd.env_remove(FAIL_AFTER_ENV),
        };
        if self.trace {
            cmd.env(TRACE_ENV, "1");
        } else {
            cmd.env_remove(TRACE_ENV);
        }
        cmd
    }

    pub fn execute(&self) -> Result<RunRecord, HarnessError> {
        let shim = std::fs::canonicalize(&self.shim)
            .map_err(|_| HarnessError::MissingShim(self.shim.clone()))?;
        if !self.checker.is_file() {
            return Err(HarnessError::MissingChecker(self.checker.clone()));
        }

        let start = Instant::now();
        let output = self
            .command(&shim)
            .output()
            .map_err(|source| HarnessError::Spawn {
                program: self.checker.clone(),
                source,
            })?;
        let duration_ms = start.elapsed().as_millis() as u64;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        Ok(RunRecord {
            subject: self.subject,
            mode: self.mode,
            fail_after: self.fail_after,
            verdict: RunVerdict::classify(output.status),
            exit_code: output.status.code(),
            signal: output.status.signal(),
            transcript: Transcript::parse(&stdout),
            stdout,
            stderr,
            duration_ms,
        })
    }
}

/// `append-check` next to the running executable.
///
/// Test binaries live one level deeper (`target/<profile>/deps`), so the
/// parent directory is tried as well.
pub fn locate_checker() -> Result<PathBuf, HarnessError> {
    let exe = std::env::current_exe()?;
    let dir = exe.parent().unwrap_or_else(|| Path::new("."));
    let candidates = [Some(dir), dir.parent()];
    let found = candidates
        .into_iter()
        .flatten()
        .map(|d| d.join(CHECKER_NAME))
        .find(|p| p.is_file());
    found.ok_or_else(|| HarnessError::MissingChecker(dir.join(CHECKER_NAME)))
}

/// Default shim location: the cdylib built into the same target directory as
/// `checker`.
#[must_use]
pub fn shim_beside(checker: &Path) -> PathBuf {
    checker
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(SHIM_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;

    fn env_value<'a>(cmd: &'a Command, key: &str) -> Option<Option<&'a OsStr>> {
        cmd.get_envs()
            .find(|(k, _)| *k == OsStr::new(key))
            .map(|(_, v)| v)
    }

    #[test]
    fn command_sets_preload_and_ordinal() {
        let run = PreloadRun::new("shim.so", "/bin/append-check", Subject::Buggy)
            .with_mode(Mode::OomOnly)
            .with_fail_after(Some(1));
        let cmd = run.command(Path::new("/abs/shim.so"));
        let args: Vec<&OsStr> = cmd.get_args().collect();
        assert_eq!(args, vec![OsStr::new("buggy"), OsStr::new("--oom-only")]);
        assert_eq!(
            env_value(&cmd, "LD_PRELOAD"),
            Some(Some(OsStr::new("/abs/shim.so")))
        );
        assert_eq!(
            env_value(&cmd, FAIL_AFTER_ENV),
            Some(Some(OsStr::new("1")))
        );
        assert_eq!(env_value(&cmd, TRACE_ENV), Some(None));
    }

    #[test]
    fn unset_ordinal_is_removed_from_child_env() {
        let run = PreloadRun::new("shim.so", "/bin/append-check", Subject::Fixed).with_trace(true);
        let cmd = run.command(Path::new("/abs/shim.so"));
        assert_eq!(env_value(&cmd, FAIL_AFTER_ENV), Some(None));
        assert_eq!(env_value(&cmd, TRACE_ENV), Some(Some(OsStr::new("1"))));
        assert_eq!(cmd.get_args().count(), 1);
    }

    #[test]
    fn missing_shim_is_reported() {
        let run = PreloadRun::new("/nonexistent/libfailrealloc_abi.so", "/bin/true", Subject::Fixed);
        assert!(matches!(run.execute(), Err(HarnessError::MissingShim(_))));
    }

    #[test]
    fn exit_codes_classify() {
        assert_eq!(
            RunVerdict::classify(ExitStatus::from_raw(0)),
            RunVerdict::Passed
        );
        assert_eq!(
            RunVerdict::classify(ExitStatus::from_raw(1 << 8)),
            RunVerdict::ContractViolation
        );
        assert_eq!(
            RunVerdict::classify(ExitStatus::from_raw(2 << 8)),
            RunVerdict::UsageError
        );
        // SIGSEGV
        assert_eq!(
            RunVerdict::classify(ExitStatus::from_raw(11)),
            RunVerdict::Crashed
        );
    }

    #[test]
    fn log_entry_judges_against_expectation() {
        let record = RunRecord {
            subject: Subject::Fixed,
            mode: Mode::Full,
            fail_after: Some(1),
            verdict: RunVerdict::ContractViolation,
            exit_code: Some(1),
            signal: None,
            transcript: Transcript::default(),
            stdout: String::new(),
            stderr: "failrealloc: injected realloc failure at call #1 (size 11)\n".to_string(),
            duration_ms: 1,
        };
        let mut emitter = LogEmitter::to_sink("preload", "t");
        let entry = record.log_entry(&mut emitter, Some(RunVerdict::ContractViolation));
        assert_eq!(entry.outcome, Some(Outcome::Pass));
        let entry = record.log_entry(&mut emitter, None);
        assert_eq!(entry.outcome, Some(Outcome::Fail));
        assert_eq!(record.injection_reports(), 1);
    }

    #[test]
    fn shim_path_sits_beside_checker() {
        assert_eq!(
            shim_beside(Path::new("/t/debug/append-check")),
            PathBuf::from("/t/debug/libfailrealloc_abi.so")
        );
    }
}
