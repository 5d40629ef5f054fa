use std::io::{Cursor, Read, Result as IoResult, Write};
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};

/// Memory-backed input for embedding and tests.
///
/// External commands handed a `MemReader` get `Stdio::null()`: the buffer lives in
/// this process and cannot be passed on as a file descriptor.
pub struct MemReader {
    cursor: Cursor<Vec<u8>>,
}

impl MemReader {
    /// Create a MemReader that will read from the provided buffer.
    pub fn new(buf: impl Into<Vec<u8>>) -> Self {
        Self {
            cursor: Cursor::new(buf.into()),
        }
    }
}

impl Read for MemReader {
    fn read(&mut self, out: &mut [u8]) -> IoResult<usize> {
        self.cursor.read(out)
    }
}

impl crate::command::Stdin for MemReader {
    fn stdio(self: Box<Self>) -> Stdio {
        Stdio::null()
    }
}

/// Shared buffer a [`MemWriter`] appends to.
pub type MemBuffer = Arc<Mutex<Vec<u8>>>;

/// Memory-backed writer for capturing the output of builtins.
///
/// The buffer is shared, so the caller keeps a handle (see [`MemWriter::with_handle`])
/// while the writer itself moves into a pipeline stage on another thread.
#[derive(Default)]
pub struct MemWriter {
    buf: MemBuffer,
}

impl MemWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create writer and return (writer, handle).
    pub fn with_handle() -> (Self, MemBuffer) {
        let mw = MemWriter::new();
        let handle = Arc::clone(&mw.buf);
        (mw, handle)
    }

    /// Everything written so far, decoded lossily.
    pub fn contents(handle: &MemBuffer) -> String {
        let buf = handle.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

impl Write for MemWriter {
    fn write(&mut self, data: &[u8]) -> IoResult<usize> {
        self.buf
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> IoResult<()> {
        Ok(())
    }
}

impl crate::command::Stdout for MemWriter {
    fn stdio(self: Box<Self>) -> Stdio {
        Stdio::null()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_shares_buffer_with_handle() {
        let (mut w, handle) = MemWriter::with_handle();
        write!(w, "hello ").unwrap();
        std::thread::spawn(move || w.write_all(b"world").unwrap())
            .join()
            .unwrap();
        assert_eq!(MemWriter::contents(&handle), "hello world");
    }

    #[test]
    fn test_reader_yields_buffer() {
        let mut r = MemReader::new("abc");
        let mut s = String::new();
        r.read_to_string(&mut s).unwrap();
        assert_eq!(s, "abc");
    }
}
