// src/cli.rs

use crate::constants::DEFAULT_SHELL_NAME;
use clap::Parser;
use std::path::PathBuf;

/// pershell: run commands in one persistent shell process.
///
/// Every command runs in the same shell, so `cd`, `export` and friends carry
/// over to the next command. The exit code of each command is reported on
/// its own.
///
/// Commands are read one per line from standard input, unless given with `-c`.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Shell profile name from shells.toml, or a path to a shell executable.
    #[arg(long, short, default_value = DEFAULT_SHELL_NAME)]
    pub shell: String,

    /// Initial working directory. Defaults to the current directory.
    #[arg(long, short)]
    pub dir: Option<PathBuf>,

    /// Set an environment variable for the shell (e.g., "KEY=VALUE").
    #[arg(long, short, num_args = 1)]
    pub env: Vec<String>,

    /// Start from an empty environment instead of inheriting this one.
    #[arg(long)]
    pub clean_env: bool,

    /// Discard the standard output of commands.
    #[arg(long)]
    pub no_stdout: bool,

    /// Discard the standard error of commands.
    #[arg(long)]
    pub no_stderr: bool,

    /// Kill the shell if a single command runs longer than this many seconds.
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<f64>,

    /// Run this command instead of reading standard input. Can be repeated.
    #[arg(short = 'c', long = "command", value_name = "COMMAND")]
    pub commands: Vec<String>,
}
