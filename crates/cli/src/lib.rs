#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `cli` is the command-line front-end of `backup_tool`. It reads the global
//! verbosity flags, looks the operation name up in [`OPERATIONS`], parses the
//! operation's `--key value` pairs into an [`ArgMap`] and runs it against the
//! broker named by a [`ToolConfig`].
//!
//! # Design
//!
//! [`run`] accepts an iterator of arguments together with handles for
//! standard output and error and returns the process status, so the binary
//! stays a two-line `main` and tests drive the whole front-end in memory.
//! Parsing is done with [`clap`](https://docs.rs/clap/) builders: one command
//! for the global flags and one per operation, generated from the operation's
//! [`ParamSpec`] list.
//!
//! # Invariants
//!
//! - `run` never panics; failures surface as negative status codes with a
//!   diagnostic on the error stream.
//! - Missing required keys are reported as `-EPERM` before any session or
//!   broker connection exists.
//! - Unknown operations and unparsable arguments print the `missing operand`
//!   hint and return `-EINVAL`.
//!
//! # Examples
//!
//! ```
//! let mut stdout = Vec::new();
//! let mut stderr = Vec::new();
//! let status = cli::run(["backup_tool", "help"], &mut stdout, &mut stderr);
//!
//! assert_eq!(status, 0);
//! assert!(String::from_utf8(stdout).unwrap().contains("restoreAsync"));
//! ```

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;

use clap::{Arg, ArgAction, Command};
use logging::VerbosityConfig;

mod arguments;
mod config;
mod operations;

pub use arguments::{ArgMap, ParamSpec, UsageError, parse_operation_args};
pub use config::{
    DEFAULT_INCREMENTAL_RECEIVE_DIR, DEFAULT_INSTALL_DIR, DEFAULT_RECEIVE_DIR, DEFAULT_SOCKET,
    INCREMENTAL_RECEIVE_DIR_ENV, INSTALL_DIR_ENV, RECEIVE_DIR_ENV, SOCKET_ENV, ToolConfig,
};
pub use operations::{Completion, OPERATIONS, Operation, OperationFailure, find, render_help};

/// Name used in diagnostics.
pub const PROGRAM_NAME: &str = "backup_tool";

/// Maximum exit code representable by a Unix process.
const MAX_EXIT_CODE: i32 = u8::MAX as i32;

const USAGE_HINT: &str = concat!(
    "backup_tool: missing operand\n",
    "Try 'backup_tool help' for more information.\n",
);

/// A parsed command line.
#[derive(Debug)]
struct Invocation {
    verbose: u8,
    operation: &'static Operation,
    args: ArgMap,
}

fn global_command() -> Command {
    Command::new(PROGRAM_NAME)
        .no_binary_name(true)
        .disable_help_flag(true)
        .disable_version_flag(true)
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .help("Raise log verbosity; repeat for more detail.")
                .action(ArgAction::Count),
        )
        .arg(
            Arg::new("help")
                .long("help")
                .short('h')
                .help("Show the help text and exit.")
                .action(ArgAction::SetTrue),
        )
}

/// Splits the command line into global flags, operation and its arguments.
///
/// Global flags are the leading arguments that start with `-`; the first one
/// that does not names the operation.
fn parse_invocation(mut args: Vec<OsString>) -> Result<Invocation, String> {
    if !args.is_empty() {
        args.remove(0);
    }
    let split = args
        .iter()
        .position(|arg| !arg.to_string_lossy().starts_with('-'))
        .unwrap_or(args.len());
    let rest = args.split_off(split);

    let matches = global_command()
        .try_get_matches_from(args)
        .map_err(|error| clap_summary(&error))?;
    let verbose = matches.get_count("verbose");

    let mut rest = rest.into_iter();
    let operation = if matches.get_flag("help") {
        operations::find("help").ok_or_else(|| "help is unavailable".to_owned())?
    } else {
        let name = rest.next().ok_or_else(|| "no operation given".to_owned())?;
        let name = name.to_string_lossy();
        operations::find(&name).ok_or_else(|| format!("unknown operation '{name}'"))?
    };

    let args = parse_operation_args(operation.name, operation.params, rest)
        .map_err(|error| format!("{}: {}", operation.name, clap_summary(&error)))?;
    Ok(Invocation {
        verbose,
        operation,
        args,
    })
}

/// First line of a `clap` error without its `error: ` prefix.
fn clap_summary(error: &clap::Error) -> String {
    let rendered = error.to_string();
    let line = rendered.lines().next().unwrap_or_default();
    line.strip_prefix("error: ").unwrap_or(line).to_owned()
}

/// Runs the front-end with configuration taken from the environment.
///
/// Returns zero on success and a negated errno or broker code otherwise; see
/// [`exit_code_from`] for the conversion to a process status.
pub fn run<I, S, Out, Err>(arguments: I, stdout: &mut Out, stderr: &mut Err) -> i32
where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
    Out: Write,
    Err: Write,
{
    run_with(arguments, &ToolConfig::from_env(), stdout, stderr)
}

/// Runs the front-end against an explicit configuration.
pub fn run_with<I, S, Out, Err>(arguments: I, config: &ToolConfig, stdout: &mut Out, stderr: &mut Err) -> i32
where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
    Out: Write,
    Err: Write,
{
    let invocation = match parse_invocation(arguments.into_iter().map(Into::into).collect()) {
        Ok(invocation) => invocation,
        Err(detail) => {
            let _ = writeln!(stderr, "{PROGRAM_NAME}: {detail}");
            let _ = stderr.write_all(USAGE_HINT.as_bytes());
            return -libc::EINVAL;
        }
    };

    logging::init(&VerbosityConfig::from_verbose_level(invocation.verbose));

    let name = invocation.operation.name;
    match invocation.operation.execute(&invocation.args, config) {
        Ok(Completion::Printed(text)) => {
            if stdout.write_all(text.as_bytes()).is_err() {
                return -libc::EIO;
            }
            0
        }
        Ok(Completion::Session(outcome)) => {
            let code = outcome.code();
            if code == 0 {
                let _ = writeln!(stdout, "{name}: {outcome}");
            } else {
                let _ = writeln!(stderr, "{PROGRAM_NAME}: {name}: {outcome} (code {code})");
            }
            code
        }
        Err(failure) => {
            let code = failure.code();
            let _ = writeln!(stderr, "{PROGRAM_NAME}: {name}: {failure} (code {code})");
            code
        }
    }
}

/// Converts a status returned by [`run`] into a process exit code.
///
/// The magnitude is used and saturates at 255, so every failure exits
/// nonzero.
#[must_use]
pub fn exit_code_from(status: i32) -> ExitCode {
    let magnitude = status.unsigned_abs().min(MAX_EXIT_CODE as u32);
    ExitCode::from(magnitude as u8)
}

#[cfg(test)]
mod tests;
