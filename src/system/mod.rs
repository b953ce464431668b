//! # System Interaction Layer
//!
//! Everything that touches the operating system: named pipes, the shell
//! process, and the shell profiles file.
//!
//! ## Modules
//!
//! - **`transport`**: The side channels of a session. Creates one named pipe per
//!   active channel inside a private temporary directory, drains them, and tears
//!   them down.
//! - **`session`**: The persistent shell itself (`Shell`). Starts the process lazily,
//!   frames each command, waits for every pipe to be drained, and parses the exit code.
//! - **`shells_config`**: Loads `shells.toml`, which maps profile names to shell
//!   executables.

pub mod session;
pub mod shells_config;
pub mod transport;
