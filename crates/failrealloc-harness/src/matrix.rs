//! Configuration matrix: both subjects under each interesting fail-after
//! setting, every run checked against the verdict it should produce.

use std::path::Path;

use serde::{Deserialize, Serialize};

use failrealloc_subjects::Subject;

use crate::error::HarnessError;
use crate::scenario::Mode;
use crate::structured_log::{LogEmitter, LogLevel};
use crate::supervisor::{PreloadRun, RunRecord, RunVerdict};

/// What scenario B should report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OomExpectation {
    /// The injected failure lands on scenario B's growth call.
    Injected,
    /// Scenario B runs but no failure reaches it.
    Inactive,
    /// The checker stops before scenario B.
    NotReached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixCase {
    pub mode: Mode,
    pub fail_after: Option<u64>,
    pub verdict: RunVerdict,
    pub oom: OomExpectation,
}

/// Cases run for each subject.
///
/// Ordinals count the checker's `realloc` calls: scenario A's growth is
/// call 1 and scenario B's is call 2 in full mode; in oom-only mode scenario
/// B's growth is call 1. The checker is entered without the Rust runtime's
/// startup, which would otherwise spend the first ordinals on its own
/// buffer growth.
pub const CASES: [MatrixCase; 6] = [
    MatrixCase {
        mode: Mode::Full,
        fail_after: None,
        verdict: RunVerdict::Passed,
        oom: OomExpectation::Injected,
    },
    MatrixCase {
        mode: Mode::Full,
        fail_after: Some(2),
        verdict: RunVerdict::Passed,
        oom: OomExpectation::Injected,
    },
    MatrixCase {
        mode: Mode::Full,
        fail_after: Some(1),
        verdict: RunVerdict::ContractViolation,
        oom: OomExpectation::NotReached,
    },
    MatrixCase {
        mode: Mode::Full,
        fail_after: Some(0),
        verdict: RunVerdict::Passed,
        oom: OomExpectation::Inactive,
    },
    MatrixCase {
        mode: Mode::Full,
        fail_after: Some(3),
        verdict: RunVerdict::Passed,
        oom: OomExpectation::Inactive,
    },
    MatrixCase {
        mode: Mode::OomOnly,
        fail_after: Some(1),
        verdict: RunVerdict::Passed,
        oom: OomExpectation::Injected,
    },
];

impl MatrixCase {
    /// Whether `record` shows what this case expects.
    #[must_use]
    pub fn accepts(&self, record: &RunRecord) -> bool {
        let t = &record.transcript;
        let oom_ok = match self.oom {
            OomExpectation::Injected => t.oom_injected && !t.oom_inactive,
            OomExpectation::Inactive => t.oom_inactive && !t.oom_injected,
            OomExpectation::NotReached => !t.oom_injected && !t.oom_inactive,
        };
        record.verdict == self.verdict && oom_ok
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixRow {
    pub case: MatrixCase,
    pub record: RunRecord,
    pub met: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixSummary {
    pub total: usize,
    pub met: usize,
    pub unmet: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixReport {
    pub shim: String,
    pub rows: Vec<MatrixRow>,
    pub summary: MatrixSummary,
}

impl MatrixReport {
    #[must_use]
    pub fn all_met(&self) -> bool {
        self.summary.unmet == 0
    }

    /// `Err(ExpectationsFailed)` when any row missed its expectation.
    pub fn into_result(self) -> Result<Self, HarnessError> {
        if self.all_met() {
            Ok(self)
        } else {
            Err(HarnessError::ExpectationsFailed {
                failed: self.summary.unmet,
                total: self.summary.total,
            })
        }
    }
}

/// Run every [`CASES`] entry for both subjects.
pub fn run_matrix(
    shim: &Path,
    checker: &Path,
    emitter: &mut LogEmitter,
) -> Result<MatrixReport, HarnessError> {
    emitter.emit(LogLevel::Info, "matrix_start")?;

    let mut rows = Vec::with_capacity(Subject::ALL.len() * CASES.len());
    for subject in Subject::ALL {
        for case in CASES {
            let record = PreloadRun::new(shim, checker, subject)
                .with_mode(case.mode)
                .with_fail_after(case.fail_after)
                .execute()?;
            let met = case.accepts(&record);
            let entry = record.log_entry(emitter, Some(case.verdict));
            emitter.emit_entry(entry)?;
            rows.push(MatrixRow { case, record, met });
        }
    }

    let met = rows.iter().filter(|r| r.met).count();
    let summary = MatrixSummary {
        total: rows.len(),
        met,
        unmet: rows.len() - met,
    };
    let level = if summary.unmet == 0 {
        LogLevel::Info
    } else {
        LogLevel::Error
    };
    let entry = emitter
        .entry(level, "matrix_done")
        .with_details(serde_json::to_value(&summary)?);
    emitter.emit_entry(entry)?;
    emitter.flush()?;

    Ok(MatrixReport {
        shim: shim.display().to_string(),
        rows,
        summary,
    })
}
