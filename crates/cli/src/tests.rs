use super::*;
use std::os::unix::net::UnixListener;
use std::path::Path;

fn run_with_args<I, S>(config: &ToolConfig, args: I) -> (i32, String, String)
where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
{
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let code = run_with(args, config, &mut stdout, &mut stderr);
    (
        code,
        String::from_utf8(stdout).expect("stdout is UTF-8"),
        String::from_utf8(stderr).expect("stderr is UTF-8"),
    )
}

fn config_in(dir: &Path) -> ToolConfig {
    ToolConfig::rooted(dir, dir.join("broker.sock"))
}

#[test]
fn help_operation_prints_every_operation() {
    let dir = tempfile::tempdir().unwrap();
    let (code, stdout, stderr) = run_with_args(&config_in(dir.path()), ["backup_tool", "help"]);

    assert_eq!(code, 0);
    assert!(stderr.is_empty());
    assert_eq!(stdout, render_help());
}

#[test]
fn help_flag_matches_help_operation() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let (code, stdout, _) = run_with_args(&config, ["backup_tool", "-v", "--help"]);

    assert_eq!(code, 0);
    assert_eq!(stdout, render_help());
}

#[test]
fn no_operation_prints_usage_hint() {
    let dir = tempfile::tempdir().unwrap();
    let (code, stdout, stderr) = run_with_args(&config_in(dir.path()), ["backup_tool"]);

    assert_eq!(code, -libc::EINVAL);
    assert!(stdout.is_empty());
    assert!(stderr.ends_with(USAGE_HINT), "{stderr}");
}

#[test]
fn unknown_operation_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (code, _, stderr) = run_with_args(&config_in(dir.path()), ["backup_tool", "simulate"]);

    assert_eq!(code, -libc::EINVAL);
    assert!(stderr.contains("unknown operation 'simulate'"), "{stderr}");
    assert!(stderr.contains("missing operand"));
}

#[test]
fn unknown_global_flag_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (code, _, stderr) = run_with_args(&config_in(dir.path()), ["backup_tool", "--quiet", "help"]);

    assert_eq!(code, -libc::EINVAL);
    assert!(stderr.contains("missing operand"));
}

#[test]
fn repeated_single_key_is_a_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let (code, _, stderr) = run_with_args(
        &config_in(dir.path()),
        [
            "backup_tool",
            "restore",
            "--pathCapFile",
            "/a",
            "--pathCapFile",
            "/b",
            "--bundles",
            "x",
        ],
    );

    assert_eq!(code, -libc::EINVAL);
    assert!(stderr.starts_with("backup_tool: restore: "), "{stderr}");
}

#[test]
fn missing_required_key_returns_eperm() {
    let dir = tempfile::tempdir().unwrap();
    let (code, _, stderr) =
        run_with_args(&config_in(dir.path()), ["backup_tool", "backup", "--bundles", "com.example.app"]);

    assert_eq!(code, -libc::EPERM);
    assert!(stderr.contains("missing required option --pathCapFile"), "{stderr}");
    assert!(!stderr.contains("missing operand"));
}

#[test]
fn unpaired_incremental_times_return_eperm() {
    let dir = tempfile::tempdir().unwrap();
    let caps = dir.path().join("caps.json");
    let (code, _, stderr) = run_with_args(
        &config_in(dir.path()),
        [
            OsString::from("backup_tool"),
            OsString::from("incrementalrestore"),
            OsString::from("--pathCapFile"),
            caps.into_os_string(),
            OsString::from("--bundles"),
            OsString::from("a"),
            OsString::from("--bundles"),
            OsString::from("b"),
            OsString::from("--incrementalTime"),
            OsString::from("1"),
        ],
    );

    assert_eq!(code, -libc::EPERM);
    assert!(stderr.contains("inconsistent amounts"), "{stderr}");
}

#[test]
fn check_succeeds_when_broker_listens() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let _listener = UnixListener::bind(&config.socket).unwrap();

    let (code, stdout, stderr) = run_with_args(&config, ["backup_tool", "check"]);

    assert_eq!(code, 0, "{stderr}");
    assert!(stdout.contains("reachable"));
}

#[test]
fn check_reports_missing_broker() {
    let dir = tempfile::tempdir().unwrap();
    let (code, stdout, stderr) = run_with_args(&config_in(dir.path()), ["backup_tool", "check"]);

    assert_eq!(code, -libc::ENOENT);
    assert!(stdout.is_empty());
    assert!(stderr.starts_with("backup_tool: check: "), "{stderr}");
}

#[test]
fn backup_without_broker_fails_in_setup() {
    let dir = tempfile::tempdir().unwrap();
    let caps = dir.path().join("caps.json");
    let (code, _, stderr) = run_with_args(
        &config_in(dir.path()),
        [
            OsString::from("backup_tool"),
            OsString::from("backup"),
            OsString::from("--pathCapFile"),
            caps.into_os_string(),
            OsString::from("--bundles"),
            OsString::from("com.example.app"),
        ],
    );

    assert_eq!(code, -libc::ENOENT);
    assert!(stderr.contains("(code -2)"), "{stderr}");
}

#[test]
fn exit_codes_saturate() {
    assert_eq!(exit_code_from(0), ExitCode::SUCCESS);
    assert_eq!(exit_code_from(-libc::EINVAL), ExitCode::from(22));
    assert_eq!(exit_code_from(-13_900_001), ExitCode::from(255));
    assert_eq!(exit_code_from(i32::MIN), ExitCode::from(255));
}
