// src/core/framing.rs

use std::num::ParseIntError;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FramingError {
    #[error("Pipe path '{0}' is not valid UTF-8 and cannot be embedded in a shell command.")]
    NonUtf8Path(PathBuf),
    #[error("Pipe path '{path}' cannot be quoted for the shell: {source}")]
    Unquotable {
        path: PathBuf,
        #[source]
        source: shlex::QuoteError,
    },
}

/// The two command fragments attached to every command a session sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragments {
    /// Routes the command's stdout/stderr into the corresponding pipes.
    /// Empty when neither stream is captured.
    pub redirection: String,
    /// Writes `$?` into the exit code pipe.
    pub exit_code: String,
}

impl Fragments {
    /// Precomputes the fragments for a set of pipe paths.
    ///
    /// `stdout` and `stderr` are `None` when the corresponding stream is not captured.
    pub fn new(
        stdout: Option<&Path>,
        stderr: Option<&Path>,
        exit_code: &Path,
    ) -> Result<Self, FramingError> {
        let mut redirection = String::new();
        if let Some(path) = stdout {
            redirection.push_str("1>");
            redirection.push_str(&quote_path(path)?);
        }
        if let Some(path) = stderr {
            redirection.push_str(" 2>");
            redirection.push_str(&quote_path(path)?);
        }

        let exit_code = format!("echo $? 1>{}", quote_path(exit_code)?);

        Ok(Self {
            redirection,
            exit_code,
        })
    }

    /// Builds the line actually written to the shell's stdin.
    ///
    /// The exit code fragment is chained with `;` right after the redirected
    /// command, so `$?` is always the status of `command` itself. The trailing
    /// newline makes the shell execute the line.
    pub fn frame(&self, command: &str) -> String {
        format!("{} {} ; {}\n", command, self.redirection, self.exit_code)
    }
}

fn quote_path(path: &Path) -> Result<String, FramingError> {
    let as_str = path
        .to_str()
        .ok_or_else(|| FramingError::NonUtf8Path(path.to_path_buf()))?;
    shlex::try_quote(as_str)
        .map(|quoted| quoted.into_owned())
        .map_err(|source| FramingError::Unquotable {
            path: path.to_path_buf(),
            source,
        })
}

/// Parses the text captured from the exit code pipe.
pub fn parse_exit_code(captured: &str) -> Result<i32, ParseIntError> {
    captured.trim().parse::<i32>()
}
