//! CLI entrypoint for the failrealloc harness.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};

use failrealloc_core::FaultPolicy;
use failrealloc_harness::HarnessError;
use failrealloc_harness::scenario::Mode;
use failrealloc_harness::seam::run_seam;
use failrealloc_harness::stress::run_stress;
use failrealloc_harness::structured_log::{ArtifactIndex, LogEmitter, validate_log_file};
use failrealloc_harness::supervisor::{PreloadRun, RunVerdict, locate_checker, shim_beside};
use failrealloc_harness::{MatrixReport, run_matrix};
use failrealloc_subjects::Subject;

/// Drive the realloc fault-injection shim against the append subjects.
#[derive(Debug, Parser)]
#[command(name = "failrealloc-harness")]
#[command(about = "Fault-injection harness for the preloaded realloc shim")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the checker once under LD_PRELOAD.
    Run {
        /// Shim shared object (defaults to the one beside the checker).
        #[arg(long)]
        shim: Option<PathBuf>,
        /// Checker binary (defaults to `append-check` beside this executable).
        #[arg(long)]
        checker: Option<PathBuf>,
        /// Subject implementation (`fixed` or `buggy`).
        #[arg(long)]
        subject: Subject,
        /// Value for FAIL_REALLOC_AFTER; left unset when omitted.
        #[arg(long)]
        fail_after: Option<u64>,
        /// Run only the out-of-memory scenario.
        #[arg(long)]
        oom_only: bool,
        /// Ask the shim to report injected failures on stderr.
        #[arg(long)]
        trace: bool,
        /// Verdict the run must produce for the command to succeed.
        #[arg(long, value_enum, default_value = "passed")]
        expect: ExpectArg,
        /// Structured JSONL log path.
        #[arg(long)]
        log: Option<PathBuf>,
    },
    /// Run both subjects across the fail-after configuration matrix.
    Matrix {
        #[arg(long)]
        shim: Option<PathBuf>,
        #[arg(long)]
        checker: Option<PathBuf>,
        /// Structured JSONL log path.
        #[arg(long)]
        log: Option<PathBuf>,
        /// JSON report path (if omitted, prints to stdout).
        #[arg(long)]
        output: Option<PathBuf>,
        /// Artifact index covering the log and report.
        #[arg(long)]
        artifact_index: Option<PathBuf>,
    },
    /// Run the scenarios in-process through the injecting allocator seam.
    Seam {
        /// `fixed`, `buggy` or `both`.
        #[arg(long, default_value = "both")]
        subject: String,
        /// Fail-after ordinal (default 2; 0 disables injection).
        #[arg(long)]
        fail_after: Option<u64>,
        #[arg(long)]
        oom_only: bool,
    },
    /// Hammer one gate from many threads and check ordinal assignment.
    Stress {
        #[arg(long, default_value_t = 8)]
        threads: usize,
        /// Calls per thread.
        #[arg(long, default_value_t = 1000)]
        calls: usize,
        #[arg(long, default_value_t = 2)]
        fail_after: u64,
    },
    /// Validate a structured JSONL log.
    ValidateLog {
        #[arg(long)]
        log: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ExpectArg {
    Passed,
    ContractViolation,
}

impl From<ExpectArg> for RunVerdict {
    fn from(value: ExpectArg) -> Self {
        match value {
            ExpectArg::Passed => Self::Passed,
            ExpectArg::ContractViolation => Self::ContractViolation,
        }
    }
}

fn mode_for(oom_only: bool) -> Mode {
    if oom_only { Mode::OomOnly } else { Mode::Full }
}

fn run_id() -> String {
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format!("{secs}-{}", std::process::id())
}

fn open_emitter(log: Option<&Path>, campaign: &str) -> std::io::Result<LogEmitter> {
    let run_id = run_id();
    match log {
        Some(path) => LogEmitter::to_file(path, campaign, &run_id),
        None => Ok(LogEmitter::to_sink(campaign, &run_id)),
    }
}

/// Resolve checker and shim paths, defaulting to the build output directory.
fn binaries(
    shim: Option<PathBuf>,
    checker: Option<PathBuf>,
) -> Result<(PathBuf, PathBuf), HarnessError> {
    let checker = match checker {
        Some(path) => path,
        None => locate_checker()?,
    };
    let shim = shim.unwrap_or_else(|| shim_beside(&checker));
    Ok((shim, checker))
}

fn write_matrix_outputs(
    report: &MatrixReport,
    log: Option<&Path>,
    output: Option<&Path>,
    artifact_index: Option<&Path>,
) -> Result<(), HarnessError> {
    let body = serde_json::to_string_pretty(report)?;
    match output {
        Some(path) => std::fs::write(path, &body)?,
        None => println!("{body}"),
    }

    if let Some(index_path) = artifact_index {
        let mut index = ArtifactIndex::new(run_id(), "matrix");
        if let Some(path) = log {
            index.add_file(path, "log")?;
        }
        if let Some(path) = output {
            index.add_file(path, "report")?;
        }
        std::fs::write(index_path, index.to_json()?)?;
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            shim,
            checker,
            subject,
            fail_after,
            oom_only,
            trace,
            expect,
            log,
        } => {
            let (shim, checker) = binaries(shim, checker)?;
            let mut emitter = open_emitter(log.as_deref(), "run")?;
            let record = PreloadRun::new(shim, checker, subject)
                .with_mode(mode_for(oom_only))
                .with_fail_after(fail_after)
                .with_trace(trace)
                .execute()?;
            let expected = RunVerdict::from(expect);
            let entry = record.log_entry(&mut emitter, Some(expected));
            emitter.emit_entry(entry)?;
            emitter.flush()?;

            print!("{}", record.stdout);
            eprint!("{}", record.stderr);
            if record.verdict != expected {
                return Err(format!(
                    "run ended with {:?} (exit {:?}, signal {:?}), expected {:?}",
                    record.verdict, record.exit_code, record.signal, expected
                )
                .into());
            }
            eprintln!("OK: {subject} ended with {:?}", record.verdict);
        }
        Command::Matrix {
            shim,
            checker,
            log,
            output,
            artifact_index,
        } => {
            let (shim, checker) = binaries(shim, checker)?;
            let mut emitter = open_emitter(log.as_deref(), "matrix")?;
            let report = run_matrix(&shim, &checker, &mut emitter)?;
            drop(emitter);
            write_matrix_outputs(
                &report,
                log.as_deref(),
                output.as_deref(),
                artifact_index.as_deref(),
            )?;
            let report = report.into_result()?;
            eprintln!(
                "OK: {} matrix runs met expectations",
                report.summary.total
            );
        }
        Command::Seam {
            subject,
            fail_after,
            oom_only,
        } => {
            let subjects = if subject.eq_ignore_ascii_case("both") {
                Subject::ALL.to_vec()
            } else {
                vec![subject.parse::<Subject>()?]
            };
            let policy = fail_after.map_or_else(FaultPolicy::default, FaultPolicy::fail_at);
            let reports: Vec<_> = subjects
                .into_iter()
                .map(|s| run_seam(s, policy, mode_for(oom_only)))
                .collect();
            println!("{}", serde_json::to_string_pretty(&reports)?);

            let unexpected = reports.iter().filter(|r| !r.matches_subject()).count();
            if unexpected != 0 {
                return Err(HarnessError::ExpectationsFailed {
                    failed: unexpected,
                    total: reports.len(),
                }
                .into());
            }
            for r in &reports {
                eprintln!(
                    "{}: {} realloc call(s), {} leaked block(s), {} leaked byte(s)",
                    r.subject, r.realloc_calls, r.leaked_blocks, r.leaked_bytes
                );
            }
        }
        Command::Stress {
            threads,
            calls,
            fail_after,
        } => {
            let report = run_stress(FaultPolicy::fail_at(fail_after), threads, calls)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.passed() {
                return Err(HarnessError::ExpectationsFailed {
                    failed: 1,
                    total: 1,
                }
                .into());
            }
            eprintln!(
                "OK: {} calls across {} threads in {} ms",
                report.total_calls, report.threads, report.elapsed_ms
            );
        }
        Command::ValidateLog { log } => {
            let (lines, errors) = validate_log_file(&log)?;
            for e in &errors {
                eprintln!("{e}");
            }
            if !errors.is_empty() {
                return Err(format!(
                    "{} schema error(s) in {} line(s) of {}",
                    errors.len(),
                    lines,
                    log.display()
                )
                .into());
            }
            eprintln!("OK: {lines} line(s) in {} are valid", log.display());
        }
    }

    Ok(())
}
