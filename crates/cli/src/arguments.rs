//! `--key value` parsing and typed access to the resulting map.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fmt;

use clap::{Arg, ArgAction, Command};
use protocol::{IncrementalData, RestoreType};

/// Values given for each key, in command-line order.
pub type ArgMap = BTreeMap<String, Vec<String>>;

/// One `--key` an operation accepts.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ParamSpec {
    /// Key without the leading dashes.
    pub name: &'static str,
    /// Whether the key may be given more than once.
    pub repeatable: bool,
}

impl ParamSpec {
    /// A key that may appear once.
    pub const fn single(name: &'static str) -> Self {
        Self {
            name,
            repeatable: false,
        }
    }

    /// A key whose occurrences accumulate.
    pub const fn repeated(name: &'static str) -> Self {
        Self {
            name,
            repeatable: true,
        }
    }
}

/// Parses the arguments following an operation name.
///
/// Every key takes exactly one value. Unknown keys, bare values and a second
/// occurrence of a non-repeatable key are rejected by `clap`.
pub fn parse_operation_args<I, S>(
    operation: &'static str,
    params: &'static [ParamSpec],
    arguments: I,
) -> Result<ArgMap, clap::Error>
where
    I: IntoIterator<Item = S>,
    S: Into<OsString> + Clone,
{
    let mut matches = operation_command(operation, params).try_get_matches_from(arguments)?;
    let mut map = ArgMap::new();
    for param in params {
        if let Some(values) = matches.remove_many::<String>(param.name) {
            map.insert(param.name.to_owned(), values.collect());
        }
    }
    Ok(map)
}

fn operation_command(operation: &'static str, params: &'static [ParamSpec]) -> Command {
    params.iter().fold(
        Command::new(operation)
            .no_binary_name(true)
            .disable_help_flag(true)
            .disable_version_flag(true),
        |command, param| {
            command.arg(
                Arg::new(param.name)
                    .long(param.name)
                    .value_name("VALUE")
                    .num_args(1)
                    .action(if param.repeatable {
                        ArgAction::Append
                    } else {
                        ArgAction::Set
                    }),
            )
        },
    )
}

/// A usable command line that an operation still cannot act on.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum UsageError {
    /// A required key is absent.
    Missing(&'static str),
    /// A value does not parse for its key.
    Invalid {
        /// Key concerned.
        key: &'static str,
        /// Offending value.
        value: String,
    },
    /// `bundles` and `incrementalTime` differ in length.
    Unpaired {
        /// Number of bundles.
        bundles: usize,
        /// Number of times.
        times: usize,
    },
}

impl UsageError {
    /// Negated errno reported for this failure.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            Self::Missing(_) | Self::Unpaired { .. } => -libc::EPERM,
            Self::Invalid { .. } => -libc::EINVAL,
        }
    }
}

impl fmt::Display for UsageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing(key) => write!(f, "missing required option --{key}"),
            Self::Invalid { key, value } => write!(f, "invalid value {value:?} for --{key}"),
            Self::Unpaired { bundles, times } => write!(
                f,
                "inconsistent amounts of bundles ({bundles}) and incrementalTime ({times})"
            ),
        }
    }
}

impl std::error::Error for UsageError {}

/// Every value of a required key.
pub fn values<'a>(map: &'a ArgMap, key: &'static str) -> Result<&'a [String], UsageError> {
    map.get(key)
        .map(Vec::as_slice)
        .filter(|values| !values.is_empty())
        .ok_or(UsageError::Missing(key))
}

/// First value of a required key.
pub fn first<'a>(map: &'a ArgMap, key: &'static str) -> Result<&'a str, UsageError> {
    values(map, key).map(|values| values[0].as_str())
}

/// Whether an optional boolean key was given as `true`.
///
/// Any other value, and absence, reads as `false`.
pub fn flag(map: &ArgMap, key: &str) -> bool {
    map.get(key)
        .and_then(|values| values.first())
        .is_some_and(|value| value == "true")
}

/// Parses the first value of a required key with `parse`.
pub fn parsed<T>(
    map: &ArgMap,
    key: &'static str,
    parse: impl FnOnce(&str) -> Option<T>,
) -> Result<T, UsageError> {
    let value = first(map, key)?;
    parse(value).ok_or_else(|| UsageError::Invalid {
        key,
        value: value.to_owned(),
    })
}

/// `--restoreType`: `true` for data ready, `false` for wait-send.
pub fn restore_type(map: &ArgMap) -> Result<RestoreType, UsageError> {
    parsed(map, "restoreType", RestoreType::from_flag)
}

/// Zips `--bundles` with `--incrementalTime` position by position.
pub fn incremental_pairs(map: &ArgMap) -> Result<Vec<IncrementalData>, UsageError> {
    let bundles = values(map, "bundles")?;
    let times = values(map, "incrementalTime")?;
    if bundles.len() != times.len() {
        return Err(UsageError::Unpaired {
            bundles: bundles.len(),
            times: times.len(),
        });
    }
    bundles
        .iter()
        .zip(times)
        .map(|(bundle, time)| {
            time.trim()
                .parse::<i64>()
                .map(|time| IncrementalData::new(bundle.clone(), time))
                .map_err(|_| UsageError::Invalid {
                    key: "incrementalTime",
                    value: time.clone(),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARAMS: &[ParamSpec] = &[
        ParamSpec::single("pathCapFile"),
        ParamSpec::repeated("bundles"),
        ParamSpec::repeated("incrementalTime"),
        ParamSpec::single("restoreType"),
    ];

    fn parse(args: &[&str]) -> Result<ArgMap, clap::Error> {
        parse_operation_args("test", PARAMS, args.iter().copied())
    }

    #[test]
    fn repeated_keys_accumulate_in_order() {
        let map = parse(&["--pathCapFile", "/tmp/caps", "--bundles", "b", "--bundles", "a"]).unwrap();
        assert_eq!(first(&map, "pathCapFile").unwrap(), "/tmp/caps");
        assert_eq!(values(&map, "bundles").unwrap(), ["b", "a"]);
    }

    #[test]
    fn single_key_given_twice_is_rejected() {
        assert!(parse(&["--pathCapFile", "/a", "--pathCapFile", "/b"]).is_err());
    }

    #[test]
    fn unknown_key_and_bare_value_are_rejected() {
        assert!(parse(&["--userId", "100"]).is_err());
        assert!(parse(&["--bundles", "a", "b"]).is_err());
    }

    #[test]
    fn missing_key_maps_to_eperm() {
        let map = parse(&["--bundles", "a"]).unwrap();
        let err = first(&map, "pathCapFile").unwrap_err();
        assert_eq!(err, UsageError::Missing("pathCapFile"));
        assert_eq!(err.code(), -libc::EPERM);
    }

    #[test]
    fn flags_only_accept_true() {
        let mut map = ArgMap::new();
        assert!(!flag(&map, "isLocal"));
        map.insert("isLocal".into(), vec!["yes".into()]);
        assert!(!flag(&map, "isLocal"));
        map.insert("isLocal".into(), vec!["true".into()]);
        assert!(flag(&map, "isLocal"));
    }

    #[test]
    fn restore_type_flag() {
        let ready = parse(&["--restoreType", "true"]).unwrap();
        assert_eq!(restore_type(&ready).unwrap(), RestoreType::Ready);
        let wait = parse(&["--restoreType", "false"]).unwrap();
        assert_eq!(restore_type(&wait).unwrap(), RestoreType::WaitSend);
        let bogus = parse(&["--restoreType", "maybe"]).unwrap();
        assert_eq!(restore_type(&bogus).unwrap_err().code(), -libc::EINVAL);
    }

    #[test]
    fn incremental_pairs_zip_by_position() {
        let map = parse(&[
            "--bundles",
            "a",
            "--incrementalTime",
            "10",
            "--bundles",
            "b",
            "--incrementalTime",
            "20",
        ])
        .unwrap();
        let pairs = incremental_pairs(&map).unwrap();
        assert_eq!(pairs, vec![IncrementalData::new("a", 10), IncrementalData::new("b", 20)]);
    }

    #[test]
    fn incremental_pairs_reject_mismatch_and_garbage() {
        let unpaired = parse(&["--bundles", "a", "--bundles", "b", "--incrementalTime", "1"]).unwrap();
        assert_eq!(
            incremental_pairs(&unpaired).unwrap_err(),
            UsageError::Unpaired { bundles: 2, times: 1 }
        );
        assert_eq!(incremental_pairs(&unpaired).unwrap_err().code(), -libc::EPERM);

        let garbage = parse(&["--bundles", "a", "--incrementalTime", "soon"]).unwrap();
        assert_eq!(incremental_pairs(&garbage).unwrap_err().code(), -libc::EINVAL);
    }
}
