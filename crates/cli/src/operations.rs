//! The table of operations `backup_tool` dispatches to.

use std::fmt;
use std::sync::Arc;

use session::{
    BackupOptions, IncrementalBackupOptions, IncrementalRestoreOptions, OperationError, RestoreAsyncOptions,
    RestoreOptions, SessionEnv, SessionOutcome, SessionRegistry,
};
use transport::{Connector, SocketConnector};

use crate::arguments::{self, ArgMap, ParamSpec, UsageError};
use crate::config::ToolConfig;

/// What a successful operation produced.
#[derive(Debug)]
pub enum Completion {
    /// Text for standard output.
    Printed(String),
    /// A session ran to its end, successfully or not.
    Session(SessionOutcome),
}

/// Why an operation could not run to completion.
#[derive(Debug)]
pub enum OperationFailure {
    /// The arguments were parsed but are unusable.
    Usage(UsageError),
    /// Setting up or driving the session failed.
    Setup(OperationError),
}

impl OperationFailure {
    /// Negated errno or broker code.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            Self::Usage(err) => err.code(),
            Self::Setup(err) => err.code(),
        }
    }
}

impl fmt::Display for OperationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Usage(err) => err.fmt(f),
            Self::Setup(err) => err.fmt(f),
        }
    }
}

impl From<UsageError> for OperationFailure {
    fn from(err: UsageError) -> Self {
        Self::Usage(err)
    }
}

impl From<OperationError> for OperationFailure {
    fn from(err: OperationError) -> Self {
        Self::Setup(err)
    }
}

type Exec = fn(&ArgMap, &ToolConfig) -> Result<Completion, OperationFailure>;

/// One named operation.
#[derive(Clone, Copy)]
pub struct Operation {
    /// Name given on the command line.
    pub name: &'static str,
    /// Keys it accepts.
    pub params: &'static [ParamSpec],
    /// Keys that must be present.
    pub required: &'static [&'static str],
    /// Indented description for `help`.
    pub help: &'static str,
    exec: Exec,
}

impl Operation {
    /// Checks the required keys, then runs the operation.
    pub fn execute(&self, args: &ArgMap, config: &ToolConfig) -> Result<Completion, OperationFailure> {
        for key in self.required {
            arguments::values(args, *key)?;
        }
        tracing::debug!(target: logging::targets::SESSION, operation = self.name, ?args, "executing");
        (self.exec)(args, config)
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("required", &self.required)
            .finish_non_exhaustive()
    }
}

/// Every operation, in the order `help` lists them.
pub static OPERATIONS: &[Operation] = &[
    Operation {
        name: "help",
        params: &[],
        required: &[],
        help: "\t\tThis operation helps to dump the help messages.",
        exec: exec_help,
    },
    Operation {
        name: "check",
        params: &[],
        required: &[],
        help: "\t\tThis operation checks that the backup service is reachable.",
        exec: exec_check,
    },
    Operation {
        name: "backup",
        params: &[
            ParamSpec::single("isLocal"),
            ParamSpec::single("pathCapFile"),
            ParamSpec::repeated("bundles"),
        ],
        required: &["pathCapFile", "bundles"],
        help: concat!(
            "\t\tThis operation helps to backup application data.\n",
            "\t\t--isLocal\t\t true: fetch the local capability file first; anything else skips it.\n",
            "\t\t--pathCapFile\t\t Path of the capability file.\n",
            "\t\t--bundles\t\t Bundle name; repeat for more bundles.",
        ),
        exec: exec_backup,
    },
    Operation {
        name: "incrementalbackup",
        params: &[
            ParamSpec::single("isLocal"),
            ParamSpec::single("pathCapFile"),
            ParamSpec::repeated("bundles"),
            ParamSpec::repeated("incrementalTime"),
        ],
        required: &["pathCapFile", "bundles", "incrementalTime"],
        help: concat!(
            "\t\tThis operation helps to incrementally backup application data.\n",
            "\t\t--isLocal\t\t Accepted for compatibility; capabilities are always fetched.\n",
            "\t\t--pathCapFile\t\t Path of the capability file.\n",
            "\t\t--bundles\t\t Bundle name; repeat for more bundles.\n",
            "\t\t--incrementalTime\t Last incremental time of the bundle at the same position.",
        ),
        exec: exec_incremental_backup,
    },
    Operation {
        name: "restore",
        params: &[ParamSpec::single("pathCapFile"), ParamSpec::repeated("bundles")],
        required: &["pathCapFile", "bundles"],
        help: concat!(
            "\t\tThis operation helps to restore application data.\n",
            "\t\t--pathCapFile\t\t Path of the capability file.\n",
            "\t\t--bundles\t\t Bundle name; repeat for more bundles.",
        ),
        exec: exec_restore,
    },
    Operation {
        name: "restoreAsync",
        params: &[
            ParamSpec::single("pathCapFile"),
            ParamSpec::repeated("bundles"),
            ParamSpec::single("restoreType"),
            ParamSpec::single("userId"),
        ],
        required: &["pathCapFile", "bundles", "restoreType", "userId"],
        help: concat!(
            "\t\tThis operation helps to restore application data asynchronously.\n",
            "\t\t--pathCapFile\t\t Path of the capability file.\n",
            "\t\t--bundles\t\t Bundle name; repeat for more bundles.\n",
            "\t\t--userId\t\t User the data is restored for.\n",
            "\t\t--restoreType\t\t true: the data is already in place (upgrade scenario); ",
            "false: the tool sends the staged files.",
        ),
        exec: exec_restore_async,
    },
    Operation {
        name: "incrementalrestore",
        params: &[
            ParamSpec::single("pathCapFile"),
            ParamSpec::repeated("bundles"),
            ParamSpec::repeated("incrementalTime"),
            ParamSpec::single("depMode"),
        ],
        required: &["pathCapFile", "bundles", "incrementalTime"],
        help: concat!(
            "\t\tThis operation helps to incrementally restore application data.\n",
            "\t\t--pathCapFile\t\t Path of the capability file.\n",
            "\t\t--bundles\t\t Bundle name; repeat for more bundles.\n",
            "\t\t--incrementalTime\t Last incremental time of the bundle at the same position.\n",
            "\t\t--depMode\t\t true: append the bundles one at a time.",
        ),
        exec: exec_incremental_restore,
    },
];

/// Looks an operation up by its exact name.
pub fn find(name: &str) -> Option<&'static Operation> {
    OPERATIONS.iter().find(|operation| operation.name == name)
}

/// Text printed by `help`.
pub fn render_help() -> String {
    let mut out = String::from("Usage: backup_tool [-v]... <operation> [--key value]...\n");
    for (index, operation) in OPERATIONS.iter().enumerate() {
        if index > 0 {
            out.push('\n');
        }
        out.push_str(operation.name);
        out.push('\n');
        out.push_str(operation.help);
        out.push('\n');
    }
    out
}

fn session_env(config: &ToolConfig) -> SessionEnv {
    SessionEnv::new(
        Arc::new(SocketConnector::new(config.socket.clone())),
        Arc::new(SessionRegistry::default()),
        config.layout.clone(),
    )
}

fn exec_help(_: &ArgMap, _: &ToolConfig) -> Result<Completion, OperationFailure> {
    Ok(Completion::Printed(render_help()))
}

fn exec_check(_: &ArgMap, config: &ToolConfig) -> Result<Completion, OperationFailure> {
    SocketConnector::new(config.socket.clone())
        .probe()
        .map_err(OperationError::from)?;
    Ok(Completion::Printed(format!(
        "backup service reachable at {}\n",
        config.socket.display()
    )))
}

fn exec_backup(args: &ArgMap, config: &ToolConfig) -> Result<Completion, OperationFailure> {
    let options = BackupOptions {
        cap_file: arguments::first(args, "pathCapFile")?.into(),
        bundles: arguments::values(args, "bundles")?.to_vec(),
        is_local: arguments::flag(args, "isLocal"),
    };
    let outcome = session::run_backup(&session_env(config), &options)?;
    Ok(Completion::Session(outcome))
}

fn exec_incremental_backup(args: &ArgMap, config: &ToolConfig) -> Result<Completion, OperationFailure> {
    let options = IncrementalBackupOptions {
        cap_file: arguments::first(args, "pathCapFile")?.into(),
        bundles: arguments::incremental_pairs(args)?,
    };
    let outcome = session::run_incremental_backup(&session_env(config), &options)?;
    Ok(Completion::Session(outcome))
}

fn exec_restore(args: &ArgMap, config: &ToolConfig) -> Result<Completion, OperationFailure> {
    let options = RestoreOptions {
        cap_file: arguments::first(args, "pathCapFile")?.into(),
        bundles: arguments::values(args, "bundles")?.to_vec(),
    };
    let outcome = session::run_restore(&session_env(config), &options)?;
    Ok(Completion::Session(outcome))
}

fn exec_restore_async(args: &ArgMap, config: &ToolConfig) -> Result<Completion, OperationFailure> {
    let options = RestoreAsyncOptions {
        cap_file: arguments::first(args, "pathCapFile")?.into(),
        bundles: arguments::values(args, "bundles")?.to_vec(),
        restore_type: arguments::restore_type(args)?,
        user_id: arguments::parsed(args, "userId", |value| value.trim().parse().ok())?,
    };
    let outcome = session::run_restore_async(&session_env(config), &options)?;
    Ok(Completion::Session(outcome))
}

fn exec_incremental_restore(args: &ArgMap, config: &ToolConfig) -> Result<Completion, OperationFailure> {
    let options = IncrementalRestoreOptions {
        cap_file: arguments::first(args, "pathCapFile")?.into(),
        bundles: arguments::incremental_pairs(args)?,
        dep_mode: arguments::flag(args, "depMode"),
    };
    let outcome = session::run_incremental_restore(&session_env(config), &options)?;
    Ok(Completion::Session(outcome))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_unique() {
        for (index, operation) in OPERATIONS.iter().enumerate() {
            assert!(
                OPERATIONS[index + 1..].iter().all(|other| other.name != operation.name),
                "{} listed twice",
                operation.name
            );
        }
    }

    #[test]
    fn required_keys_are_accepted_params() {
        for operation in OPERATIONS {
            for key in operation.required {
                assert!(
                    operation.params.iter().any(|param| param.name == *key),
                    "{} requires undeclared --{key}",
                    operation.name
                );
            }
        }
    }

    #[test]
    fn lookup_is_case_sensitive() {
        assert!(find("restoreAsync").is_some());
        assert!(find("restoreasync").is_none());
        assert!(find("simulate").is_none());
    }

    #[test]
    fn help_lists_every_operation() {
        let help = render_help();
        assert!(help.starts_with("Usage: backup_tool"));
        for operation in OPERATIONS {
            assert!(help.contains(&format!("\n{}\n", operation.name)), "{}", operation.name);
        }
    }

    #[test]
    fn missing_required_key_fails_before_any_session() {
        let dir = tempfile::tempdir().unwrap();
        let config = ToolConfig::rooted(dir.path(), dir.path().join("absent.sock"));
        let args = ArgMap::from([("bundles".to_owned(), vec!["a".to_owned()])]);

        let failure = find("restore").unwrap().execute(&args, &config).unwrap_err();
        assert!(matches!(failure, OperationFailure::Usage(UsageError::Missing("pathCapFile"))));
        assert_eq!(failure.code(), -libc::EPERM);
        assert!(!dir.path().join("received").exists());
    }

    #[test]
    fn bad_user_id_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let config = ToolConfig::rooted(dir.path(), dir.path().join("absent.sock"));
        let args = ArgMap::from([
            ("pathCapFile".to_owned(), vec!["/tmp/caps".to_owned()]),
            ("bundles".to_owned(), vec!["a".to_owned()]),
            ("restoreType".to_owned(), vec!["true".to_owned()]),
            ("userId".to_owned(), vec!["root".to_owned()]),
        ]);

        let failure = find("restoreAsync").unwrap().execute(&args, &config).unwrap_err();
        assert_eq!(failure.code(), -libc::EINVAL);
    }
}
