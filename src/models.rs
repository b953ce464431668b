// src/models.rs

use crate::constants::{EXIT_CODE_PIPE_NAME, STDERR_PIPE_NAME, STDOUT_PIPE_NAME};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

// --- SIDE CHANNEL MODELS ---

/// One of the side channels a session uses to carry data out of the shell process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Standard output of the executed command.
    Stdout,
    /// Standard error of the executed command.
    Stderr,
    /// Exit code of the executed command. Always active.
    ExitCode,
}

impl Channel {
    /// All channels, in the order their drains are launched.
    pub const ALL: [Self; 3] = [Self::Stdout, Self::Stderr, Self::ExitCode];

    /// File name of the named pipe backing this channel.
    pub fn pipe_name(self) -> &'static str {
        match self {
            Self::Stdout => STDOUT_PIPE_NAME,
            Self::Stderr => STDERR_PIPE_NAME,
            Self::ExitCode => EXIT_CODE_PIPE_NAME,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.pipe_name())
    }
}

/// The set of channels active for a session.
///
/// The exit code channel is always part of the set; stdout and stderr are
/// toggled independently depending on whether a destination was supplied.
/// Its `len()` is the number of drains every command execution waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSet {
    stdout: bool,
    stderr: bool,
}

impl ChannelSet {
    /// Builds the set from the capabilities of a session.
    pub fn new(has_stdout_sink: bool, has_stderr_sink: bool) -> Self {
        Self {
            stdout: has_stdout_sink,
            stderr: has_stderr_sink,
        }
    }

    /// Returns `true` if `channel` is part of the set.
    pub fn contains(&self, channel: Channel) -> bool {
        match channel {
            Channel::Stdout => self.stdout,
            Channel::Stderr => self.stderr,
            Channel::ExitCode => true,
        }
    }

    /// Number of active channels (1, 2 or 3).
    pub fn len(&self) -> usize {
        1 + usize::from(self.stdout) + usize::from(self.stderr)
    }

    /// A channel set is never empty, the exit code is always carried.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Iterates over the active channels.
    pub fn iter(&self) -> impl Iterator<Item = Channel> + '_ {
        Channel::ALL.into_iter().filter(move |c| self.contains(*c))
    }
}

// --- ENVIRONMENT ---

/// The initial environment of the shell process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Environment {
    /// Inherit the environment of the calling process.
    #[default]
    Inherit,
    /// Start from exactly these variables, nothing else.
    Exact(Vec<(String, String)>),
}

impl Environment {
    /// Builds an environment from `KEY=VALUE` entries.
    ///
    /// `None` means inherit. Entries without `=` cannot be passed to a process
    /// and are skipped with a warning.
    pub fn from_entries<I, S>(entries: Option<I>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let Some(entries) = entries else {
            return Self::Inherit;
        };
        let vars = entries
            .into_iter()
            .filter_map(|entry| {
                let entry = entry.as_ref();
                match entry.split_once('=') {
                    Some((key, value)) if !key.is_empty() => {
                        Some((key.to_string(), value.to_string()))
                    }
                    _ => {
                        log::warn!("Skipping malformed environment entry '{}'", entry);
                        None
                    }
                }
            })
            .collect();
        Self::Exact(vars)
    }
}

// --- SHELL PROFILES (FOR TOML) ---

/// A named shell executable, as declared in `shells.toml`.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ShellProfile {
    /// Path to the executable. `~` and `$VAR` are expanded when resolved.
    pub path: PathBuf,
}

/// The contents of `shells.toml`.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ShellsConfig {
    /// Profiles by name, e.g. `bash`.
    #[serde(default)]
    pub shells: HashMap<String, ShellProfile>,
}
