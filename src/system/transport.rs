// src/system/transport.rs

use crate::{
    constants::TRANSPORT_DIR_PREFIX,
    core::framing::{FramingError, Fragments},
    models::{Channel, ChannelSet},
};
use nix::{errno::Errno, fcntl::OFlag, sys::stat::Mode, unistd};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Could not allocate a private directory for the shell pipes: {0}")]
    TempDir(#[source] io::Error),
    #[error("Could not create named pipe '{path}': {source}")]
    PipeCreation {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Framing(#[from] FramingError),
    #[error("Failed to drain the {channel} pipe: {source}")]
    Drain {
        channel: Channel,
        #[source]
        source: io::Error,
    },
    #[error("Could not remove the shell pipes directory '{path}': {source}")]
    Teardown {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// The side channels of one session: a private temporary directory holding
/// one named pipe per active [`Channel`], plus the command fragments that
/// route data into them.
///
/// The directory exists for as long as the session is usable. Removing it
/// (see [`Transport::close`]) is what marks the session as stopped.
#[derive(Debug)]
pub struct Transport {
    dir: TempDir,
    channels: ChannelSet,
    fragments: Fragments,
}

impl Transport {
    /// Allocates the directory and creates a named pipe for every channel in
    /// `channels`, readable and writable by the owner only.
    pub fn create(channels: ChannelSet) -> Result<Self, TransportError> {
        let dir = tempfile::Builder::new()
            .prefix(TRANSPORT_DIR_PREFIX)
            .tempdir()
            .map_err(TransportError::TempDir)?;

        for channel in channels.iter() {
            let path = dir.path().join(channel.pipe_name());
            unistd::mkfifo(&path, Mode::S_IRUSR | Mode::S_IWUSR).map_err(|errno| {
                TransportError::PipeCreation {
                    path: path.clone(),
                    source: io::Error::from(errno),
                }
            })?;
        }

        let path_of = |channel: Channel| {
            channels
                .contains(channel)
                .then(|| dir.path().join(channel.pipe_name()))
        };
        let fragments = Fragments::new(
            path_of(Channel::Stdout).as_deref(),
            path_of(Channel::Stderr).as_deref(),
            &dir.path().join(Channel::ExitCode.pipe_name()),
        )?;

        log::debug!(
            "Created {} shell pipe(s) in '{}'",
            channels.len(),
            dir.path().display()
        );

        Ok(Self {
            dir,
            channels,
            fragments,
        })
    }

    /// The private directory holding the pipes.
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// The channels this transport carries.
    pub fn channels(&self) -> ChannelSet {
        self.channels
    }

    /// The precomputed redirection and exit code fragments.
    pub fn fragments(&self) -> &Fragments {
        &self.fragments
    }

    /// Path of the named pipe backing `channel`.
    pub fn pipe_path(&self, channel: Channel) -> PathBuf {
        self.dir.path().join(channel.pipe_name())
    }

    /// Returns `true` while the directory is still on disk.
    pub fn is_present(&self) -> bool {
        self.dir.path().is_dir()
    }

    /// Unblocks a drain of `channel` that is still waiting in `open`.
    ///
    /// Opens the write side without blocking and closes it at once, which the
    /// reader sees as an empty transfer. Returns `false` if nobody was reading.
    pub fn release(&self, channel: Channel) -> io::Result<bool> {
        let path = self.pipe_path(channel);
        match OpenOptions::new()
            .write(true)
            .custom_flags(OFlag::O_NONBLOCK.bits())
            .open(&path)
        {
            Ok(writer) => {
                drop(writer);
                log::trace!("Released pending drain on '{}'", path.display());
                Ok(true)
            }
            Err(e) if e.raw_os_error() == Some(Errno::ENXIO as i32) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Removes the directory and every pipe in it.
    pub fn close(self) -> Result<(), TransportError> {
        let path = self.dir.path().to_path_buf();
        self.dir
            .close()
            .map_err(|source| TransportError::Teardown {
                path: path.clone(),
                source,
            })?;
        log::debug!("Removed shell pipes directory '{}'", path.display());
        Ok(())
    }
}

/// Copies everything written into the named pipe at `path` to `sink`.
///
/// Opening blocks until the shell opens the write side, and the copy ends
/// when the shell closes it, so returning means the transfer is complete.
///
/// If `sink` fails, the rest of the transfer is still read and discarded
/// before the sink's error is returned. The shell must never see a closed
/// read end, or it dies on `SIGPIPE` before reporting the exit code.
pub fn drain<W: Write + ?Sized>(path: &Path, sink: &mut W) -> io::Result<u64> {
    let mut pipe = File::open(path)?;
    match io::copy(&mut pipe, sink).and_then(|copied| sink.flush().map(|()| copied)) {
        Ok(copied) => Ok(copied),
        Err(e) => {
            let discarded = io::copy(&mut pipe, &mut io::sink());
            log::debug!(
                "Sink for '{}' failed ({}), discarded the rest: {:?}",
                path.display(),
                e,
                discarded
            );
            Err(e)
        }
    }
}
