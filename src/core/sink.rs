// src/core/sink.rs

use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard};

/// An in-memory output destination that can be handed to a session and read back later.
///
/// Clones share the same buffer, so the caller keeps one handle while the
/// session writes through another.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of everything written so far.
    pub fn contents(&self) -> Vec<u8> {
        self.lock().clone()
    }

    /// Returns everything written so far as text, replacing invalid UTF-8.
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.lock()).into_owned()
    }

    /// Discards everything written so far.
    pub fn clear(&self) {
        self.lock().clear();
    }

    // A writer that panicked mid-write leaves plain bytes behind; still usable.
    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_contents() {
        let buffer = SharedBuffer::new();
        let mut writer = buffer.clone();
        writer.write_all(b"foo\n").unwrap();
        writer.write_all(b"bar\n").unwrap();
        assert_eq!(buffer.to_string_lossy(), "foo\nbar\n");
        assert_eq!(buffer.contents(), b"foo\nbar\n".to_vec());
    }

    #[test]
    fn test_clear() {
        let buffer = SharedBuffer::new();
        buffer.clone().write_all(b"stale").unwrap();
        buffer.clear();
        assert!(buffer.contents().is_empty());
    }

    #[test]
    fn test_writes_from_another_thread() {
        let buffer = SharedBuffer::new();
        let mut writer = buffer.clone();
        std::thread::spawn(move || writer.write_all(b"from thread").unwrap())
            .join()
            .unwrap();
        assert_eq!(buffer.to_string_lossy(), "from thread");
    }
}
