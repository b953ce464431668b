// src/constants.rs

/// Prefix of the private temporary directory that holds a session's named pipes.
pub const TRANSPORT_DIR_PREFIX: &str = "shell-named-pipes";

/// File name of the named pipe carrying the standard output of executed commands.
pub const STDOUT_PIPE_NAME: &str = "stdout";

/// File name of the named pipe carrying the standard error of executed commands.
pub const STDERR_PIPE_NAME: &str = "stderr";

/// File name of the named pipe carrying the exit code of executed commands.
pub const EXIT_CODE_PIPE_NAME: &str = "exit_code";

/// The name of the directory holding pershell configuration (inside the system config dir).
pub const CONFIG_DIR_NAME: &str = "pershell";

/// The name of the file defining the named shell profiles.
pub const SHELLS_CONFIG_FILENAME: &str = "shells.toml";

/// Shell profile used when none is requested.
pub const DEFAULT_SHELL_NAME: &str = "bash";
