//! Scenario checker meant to run under the preloaded shim.
//!
//! Usage: `append-check <fixed|buggy> [--oom-only]`
//!
//! Exit status: 0 when every scenario met its expectation, 1 when scenario A
//! did not produce `"helloworld"`, 2 on bad arguments.
//!
//! The Rust runtime's startup grows buffers with `realloc` (stack-guard setup
//! reads `/proc/self/maps` through `getdelim`), so this binary bypasses it and
//! is entered straight from `__libc_start_main`. Nothing here calls `realloc`
//! before the subject does, so under the shim the subject's growth calls get
//! ordinals 1 (scenario A) and 2 (scenario B).

#![no_main]

use std::ffi::{CStr, c_char, c_int};
use std::io::Write;

use failrealloc_harness::scenario::{self, Mode, NormalOutcome, OomOutcome};
use failrealloc_subjects::{LibcHeap, Subject};

const EXIT_SUCCESS: c_int = 0;
const EXIT_CONTRACT: c_int = 1;
const EXIT_USAGE: c_int = 2;

/// Borrow `argv[1..argc]` as C strings.
///
/// # Safety
///
/// `argv` must hold `argc` valid NUL-terminated pointers, as the C runtime
/// passes them to `main`.
unsafe fn args<'a>(argc: c_int, argv: *const *const c_char) -> impl Iterator<Item = &'a CStr> {
    let argc = usize::try_from(argc).unwrap_or(0);
    // SAFETY: the caller guarantees `argc` entries behind `argv`.
    (1..argc).map(move |i| unsafe { CStr::from_ptr(*argv.add(i)) })
}

fn parse_args<'a>(mut args: impl Iterator<Item = &'a CStr>) -> Option<(Subject, Mode)> {
    let subject: Subject = args.next()?.to_str().ok()?.parse().ok()?;
    let mode = match args.next() {
        None => Mode::Full,
        Some(flag) if flag == c"--oom-only" => Mode::OomOnly,
        Some(_) => return None,
    };
    if args.next().is_some() {
        return None;
    }
    Some((subject, mode))
}

/// Call one of the shim's introspection exports, if the shim is loaded.
fn shim_query(name: &CStr) -> Option<u64> {
    // SAFETY: `name` is NUL-terminated; when present the symbol is one of the
    // shim's `extern "C" fn() -> u64` exports.
    unsafe {
        let sym = libc::dlsym(libc::RTLD_DEFAULT, name.as_ptr());
        if sym.is_null() {
            return None;
        }
        let query: extern "C" fn() -> u64 = std::mem::transmute(sym);
        Some(query())
    }
}

fn run(subject: Subject, mode: Mode) -> c_int {
    if mode.runs_normal() {
        println!("{}", scenario::NORMAL_BANNER);
        match scenario::check_normal(subject, &LibcHeap) {
            NormalOutcome::Passed => println!(
                "{}: '{}'",
                scenario::NORMAL_PASSED,
                scenario::NORMAL_EXPECTED.to_string_lossy()
            ),
            NormalOutcome::ReturnedNull => {
                println!("{}", scenario::NORMAL_NULL);
                return EXIT_CONTRACT;
            }
            NormalOutcome::Mismatch { got } => {
                println!("{}, got '{got}'", scenario::NORMAL_MISMATCH);
                return EXIT_CONTRACT;
            }
        }
        println!();
    }

    println!("{}", scenario::OOM_BANNER);
    match scenario::check_oom(subject, &LibcHeap) {
        OomOutcome::ReturnedNull => {
            println!(
                "{}: append_str correctly returned NULL on realloc failure",
                scenario::OOM_PASSED
            );
            match subject {
                Subject::Fixed => println!("  (No memory leak - original pointer was freed)"),
                Subject::Buggy => println!("  (original buffer was not freed and is now lost)"),
            }
        }
        OomOutcome::Succeeded { got } => {
            println!("{}", scenario::OOM_INACTIVE);
            println!("  Result: '{got}'");
        }
    }

    println!();
    println!("{}", scenario::COMPLETED);

    if let Some(calls) = shim_query(c"__failrealloc_call_count") {
        println!("{}{calls}", scenario::SHIM_CALLS_PREFIX);
    }
    if let Some(ordinal) = shim_query(c"__failrealloc_fail_after") {
        println!("{}{ordinal}", scenario::SHIM_FAIL_AFTER_PREFIX);
    }
    EXIT_SUCCESS
}

#[unsafe(no_mangle)]
pub extern "C" fn main(argc: c_int, argv: *const *const c_char) -> c_int {
    // SAFETY: called by the C runtime with its own argc/argv.
    let parsed = parse_args(unsafe { args(argc, argv) });
    let status = match parsed {
        Some((subject, mode)) => run(subject, mode),
        None => {
            eprintln!("usage: append-check <fixed|buggy> [--oom-only]");
            EXIT_USAGE
        }
    };
    // Returning from C `main` skips the runtime's stdout flush.
    let _ = std::io::stdout().flush();
    status
}
