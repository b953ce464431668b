//! Persistent interactive shell processes.
//!
//! A [`Shell`] runs commands one at a time in a single long-lived shell
//! process and reports each command's stdout, stderr and exit code
//! separately, while the shell's own state carries over from one command to
//! the next.
//!
//! ```no_run
//! use pershell::{Shell, SharedBuffer};
//!
//! # fn main() -> Result<(), pershell::SessionError> {
//! let stdout = SharedBuffer::new();
//! let mut shell = Shell::new("/bin/bash", None, "/", Some(Box::new(stdout.clone())), None)?;
//!
//! shell.exec("cd tmp")?;
//! let code = shell.exec("pwd")?;
//! shell.stop()?;
//!
//! assert_eq!(code, 0);
//! assert_eq!(stdout.to_string_lossy(), "/tmp\n");
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod constants;
pub mod core;
pub mod models;
pub mod system;

pub use crate::core::sink::SharedBuffer;
pub use crate::models::{Channel, ChannelSet, Environment};
pub use crate::system::session::{SessionError, Shell, ShellBuilder, Sink};
