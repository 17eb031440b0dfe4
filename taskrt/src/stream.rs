//! Single-producer/single-consumer byte streams with end-of-stream tracking.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Outcome of [`Stream::get`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GetResult {
    Success(u8),
    Empty,
    EndOfStream,
}

/// Outcome of [`Stream::check`], the non-consuming counterpart of `get`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckResult {
    HasData,
    Empty,
    EndOfStream,
}

/// Outcome of [`Stream::read_line`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineResult {
    Success,
    EndOfStream,
}

struct Inner {
    data: Mutex<VecDeque<u8>>,
    /// Set once the producer is done. Observing it through `get` clears it
    /// again so that `EndOfStream` is reported exactly one time; `check`
    /// never clears it and may be polled repeatedly.
    eof: AtomicBool,
    /// Scoped by callers that need several `put`s to land atomically
    /// against a consumer sharing this stream with other writers.
    write_lock: Mutex<()>,
}

/// A cloneable handle to a shared byte stream.
///
/// Cloning a `Stream` shares the underlying buffer — this is how pipeline
/// stages and a process's `in`/`out` handles refer to the *same* stream
/// rather than a copy. The stream's reference count is itself meaningful:
/// once only one handle remains and the buffer is drained, the stream is
/// considered implicitly closed even if `set_eof` was never called
/// explicitly (see [`Stream::is_closed`]).
#[derive(Clone)]
pub struct Stream {
    inner: Arc<Inner>,
}

impl Default for Stream {
    fn default() -> Self {
        Self::new()
    }
}

impl Stream {
    pub fn new() -> Self {
        Stream {
            inner: Arc::new(Inner {
                data: Mutex::new(VecDeque::new()),
                eof: AtomicBool::new(false),
                write_lock: Mutex::new(()),
            }),
        }
    }

    /// Builds a stream pre-loaded with `bytes` and immediately at EOF once
    /// drained. Used for VFS file reads, which hand back a snapshot.
    pub fn from_bytes(bytes: impl IntoIterator<Item = u8>) -> Self {
        let stream = Stream::new();
        {
            let mut data = stream.inner.data.lock().unwrap();
            data.extend(bytes);
        }
        stream.set_eof();
        stream
    }

    /// Acquire the write-side lock for a multi-byte atomic write against
    /// other producers sharing this stream. The runtime never takes this
    /// lock itself; it exists purely for callers to opt into.
    pub fn lock(&self) -> MutexGuard<'_, ()> {
        self.inner.write_lock.lock().unwrap()
    }

    pub fn put(&self, byte: u8) {
        self.inner.data.lock().unwrap().push_back(byte);
    }

    pub fn put_bytes(&self, bytes: &[u8]) {
        self.inner.data.lock().unwrap().extend(bytes.iter().copied());
    }

    pub fn has_data(&self) -> bool {
        !self.inner.data.lock().unwrap().is_empty()
    }

    /// Clones every currently-buffered byte without consuming them. Used
    /// by the VFS to hand out an independent read snapshot of a
    /// live-backing file stream.
    pub fn snapshot_bytes(&self) -> Vec<u8> {
        self.inner.data.lock().unwrap().iter().copied().collect()
    }

    /// True once the buffer is empty and either `set_eof` was called or
    /// this is the last surviving handle to the stream.
    pub fn is_closed(&self) -> bool {
        let empty = self.inner.data.lock().unwrap().is_empty();
        empty && (self.inner.eof.load(Ordering::SeqCst) || Arc::strong_count(&self.inner) == 1)
    }

    /// Non-consuming peek. Unlike [`Stream::get`], repeated calls after
    /// closure keep reporting `EndOfStream`.
    pub fn check(&self) -> CheckResult {
        let data = self.inner.data.lock().unwrap();
        if !data.is_empty() {
            return CheckResult::HasData;
        }
        drop(data);
        if self.eof_visible() {
            CheckResult::EndOfStream
        } else {
            CheckResult::Empty
        }
    }

    fn eof_visible(&self) -> bool {
        self.inner.eof.load(Ordering::SeqCst) || Arc::strong_count(&self.inner) == 1
    }

    /// Pops one byte, or reports `EndOfStream` exactly once: the first call
    /// made against an empty, closed buffer clears the internal flag before
    /// returning, so the *next* call (absent a fresh `put`) sees a plain
    /// empty buffer and returns `Empty`.
    pub fn get(&self) -> GetResult {
        let mut data = self.inner.data.lock().unwrap();
        if let Some(byte) = data.pop_front() {
            return GetResult::Success(byte);
        }
        drop(data);
        if self.inner.eof.swap(false, Ordering::SeqCst) {
            return GetResult::EndOfStream;
        }
        if Arc::strong_count(&self.inner) == 1 {
            return GetResult::EndOfStream;
        }
        GetResult::Empty
    }

    /// Appends bytes (newline stripped) into `buf` until a line is
    /// complete. Never returns a bare "nothing happened" result: if the
    /// stream runs dry before a newline arrives, whatever was gathered is
    /// reported as `Success` so the caller can retry on a later poll.
    pub fn read_line(&self, buf: &mut Vec<u8>) -> LineResult {
        buf.clear();
        loop {
            match self.get() {
                GetResult::Success(b) => {
                    if b == b'\n' {
                        return LineResult::Success;
                    }
                    buf.push(b);
                }
                GetResult::EndOfStream => return LineResult::EndOfStream,
                GetResult::Empty => return LineResult::Success,
            }
        }
    }

    pub fn set_eof(&self) {
        self.inner.eof.store(true, Ordering::SeqCst);
    }

    /// Drains and returns every currently-buffered byte without touching
    /// the EOF flag. Useful for VFS writes that mirror a stream straight
    /// into file storage.
    pub fn drain_available(&self) -> Vec<u8> {
        let mut data = self.inner.data.lock().unwrap();
        data.drain(..).collect()
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("len", &self.inner.data.lock().unwrap().len())
            .field("eof", &self.inner.eof.load(Ordering::SeqCst))
            .field("refs", &Arc::strong_count(&self.inner))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eof_reported_exactly_once_via_get() {
        let s = Stream::new();
        s.put(b'a');
        s.set_eof();
        assert_eq!(s.get(), GetResult::Success(b'a'));
        assert_eq!(s.get(), GetResult::EndOfStream);
        assert_eq!(s.get(), GetResult::Empty);
    }

    #[test]
    fn check_is_idempotent() {
        let s = Stream::new();
        s.set_eof();
        assert_eq!(s.check(), CheckResult::EndOfStream);
        assert_eq!(s.check(), CheckResult::EndOfStream);
    }

    #[test]
    fn read_line_strips_newline() {
        let s = Stream::new();
        s.put_bytes(b"hello\nworld");
        s.set_eof();
        let mut buf = Vec::new();
        assert_eq!(s.read_line(&mut buf), LineResult::Success);
        assert_eq!(buf, b"hello");
        assert_eq!(s.read_line(&mut buf), LineResult::EndOfStream);
    }

    #[test]
    fn closes_implicitly_when_last_handle_remains() {
        let s = Stream::new();
        let clone = s.clone();
        assert!(!s.is_closed());
        drop(clone);
        assert!(s.is_closed());
    }
}
