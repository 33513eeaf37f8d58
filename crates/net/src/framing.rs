//! Sentinel-delimited message framing over a continuous byte stream.
//!
//! A single reserved byte ends each logical message. [`FramingStream`] hands
//! out the bytes of the current message only; once it sees the sentinel it
//! reports end of input until [`FramingStream::enable`] re-arms it for the
//! next message. The underlying stream is never closed by the framing layer.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};

use thiserror::Error;
use tracing::{debug, trace};

/// Sentinel used unless configured otherwise. Markup output escapes every
/// newline, so it never appears inside a message.
pub const DEFAULT_SENTINEL: u8 = b'\n';

/// Read buffer size used unless configured otherwise.
pub const DEFAULT_BUFFER_SIZE: usize = 16 * 1024;

/// Framing failures.
#[derive(Debug, Error)]
pub enum FramingError {
    /// The underlying stream failed (including `WouldBlock` on a
    /// non-blocking source).
    #[error("i/o failure: {0}")]
    Io(#[from] io::Error),
    /// The stream ended partway through a message.
    #[error("stream ended {read} bytes into a message")]
    Truncated {
        /// Bytes of the message received before the end.
        read: usize,
    },
    /// A payload to send contains the sentinel byte.
    #[error("payload contains the sentinel byte {sentinel:#04x} at offset {offset}")]
    SentinelInPayload {
        /// The reserved byte.
        sentinel: u8,
        /// Position of its first occurrence.
        offset: usize,
    },
}

/// Streams that can be torn down for real.
pub trait HardClose {
    /// Release the underlying transport.
    fn hard_close(&mut self) -> io::Result<()>;
}

fn shutdown_both(stream: &TcpStream) -> io::Result<()> {
    match stream.shutdown(Shutdown::Both) {
        Err(err) if err.kind() == io::ErrorKind::NotConnected => Ok(()),
        other => other,
    }
}

impl HardClose for TcpStream {
    fn hard_close(&mut self) -> io::Result<()> {
        shutdown_both(self)
    }
}

impl HardClose for &TcpStream {
    fn hard_close(&mut self) -> io::Result<()> {
        shutdown_both(self)
    }
}

impl<T> HardClose for io::Cursor<T> {
    fn hard_close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl HardClose for &[u8] {
    fn hard_close(&mut self) -> io::Result<()> {
        *self = &[];
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct Mark {
    pos: usize,
    waiting: bool,
}

/// Reader yielding one sentinel-terminated message at a time.
///
/// `read` returns `Ok(0)` both at the end of a message and when the
/// underlying stream is exhausted; [`FramingStream::is_waiting`] and
/// [`FramingStream::is_exhausted`] tell the two apart. A source that would
/// block surfaces as an `Err`, never as an end of message.
#[derive(Debug)]
pub struct FramingStream<R> {
    inner: R,
    sentinel: u8,
    buf: Box<[u8]>,
    pos: usize,
    filled: usize,
    waiting: bool,
    exhausted: bool,
    mark: Option<Mark>,
}

impl<R: Read> FramingStream<R> {
    /// Frame `inner` with the default sentinel and buffer size.
    pub fn new(inner: R) -> Self {
        Self::with_config(inner, DEFAULT_SENTINEL, DEFAULT_BUFFER_SIZE)
    }

    /// Frame `inner` with an explicit sentinel and buffer size.
    pub fn with_config(inner: R, sentinel: u8, buffer_size: usize) -> Self {
        Self {
            inner,
            sentinel,
            buf: vec![0; buffer_size.max(1)].into_boxed_slice(),
            pos: 0,
            filled: 0,
            waiting: false,
            exhausted: false,
            mark: None,
        }
    }

    /// The reserved end-of-message byte.
    pub fn sentinel(&self) -> u8 {
        self.sentinel
    }

    /// Whether the current message has ended and the stream awaits
    /// [`FramingStream::enable`].
    pub fn is_waiting(&self) -> bool {
        self.waiting
    }

    /// Whether the underlying stream reported end of input.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Re-arm for the next message.
    pub fn enable(&mut self) {
        if self.waiting {
            trace!("framing re-armed");
        }
        self.waiting = false;
    }

    /// Bytes read from the source but not yet handed out.
    pub fn buffered(&self) -> &[u8] {
        &self.buf[self.pos..self.filled]
    }

    /// Remember the current position for [`FramingStream::reset`].
    ///
    /// Fills the buffer first if it is empty. The mark survives until the
    /// next fill, so it only covers the currently buffered window.
    pub fn mark(&mut self) -> io::Result<()> {
        if self.pos == self.filled && !self.exhausted {
            self.fill()?;
        }
        self.mark = Some(Mark {
            pos: self.pos,
            waiting: self.waiting,
        });
        Ok(())
    }

    /// Roll back to the last mark, including the waiting state.
    pub fn reset(&mut self) -> io::Result<()> {
        let mark = self.mark.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "reset without a valid mark")
        })?;
        self.pos = mark.pos;
        self.waiting = mark.waiting;
        Ok(())
    }

    /// Whether the underlying stream has ended with nothing left buffered.
    ///
    /// May block to fill the buffer.
    pub fn at_end(&mut self) -> io::Result<bool> {
        if self.pos == self.filled && !self.exhausted && !self.waiting {
            self.fill()?;
        }
        Ok(self.exhausted && self.pos == self.filled)
    }

    /// Read the rest of the current message and re-arm.
    ///
    /// Returns `None` when the stream ended cleanly between messages.
    pub fn read_message(&mut self) -> Result<Option<Vec<u8>>, FramingError> {
        let mut message = Vec::new();
        self.read_to_end(&mut message)?;
        if self.waiting {
            self.enable();
            debug!(bytes = message.len(), "message framed");
            return Ok(Some(message));
        }
        if message.is_empty() {
            Ok(None)
        } else {
            Err(FramingError::Truncated {
                read: message.len(),
            })
        }
    }

    /// Discard the rest of the current message and re-arm; returns how many
    /// bytes were skipped.
    pub fn finish_message(&mut self) -> Result<u64, FramingError> {
        let skipped = io::copy(self, &mut io::sink())?;
        if self.waiting {
            self.enable();
            Ok(skipped)
        } else if skipped == 0 {
            Ok(0)
        } else {
            Err(FramingError::Truncated {
                read: skipped as usize,
            })
        }
    }

    /// Closing the framing layer leaves the connection open; other readers
    /// may still be layered over it. Use [`FramingStream::hard_close`] for
    /// real teardown.
    pub fn close(&mut self) {
        trace!("framing stream closed (connection left open)");
    }

    /// The underlying stream.
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// The underlying stream, mutably. Reading from it directly bypasses the
    /// framing buffer.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Unwrap, discarding buffered bytes.
    pub fn into_inner(self) -> R {
        self.inner
    }

    fn fill(&mut self) -> io::Result<usize> {
        self.mark = None;
        self.pos = 0;
        self.filled = 0;
        loop {
            match self.inner.read(&mut self.buf) {
                Ok(0) => {
                    self.exhausted = true;
                    trace!("source exhausted");
                    return Ok(0);
                }
                Ok(n) => {
                    self.filled = n;
                    trace!(bytes = n, "filled");
                    return Ok(n);
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
    }
}

impl<R: Read + HardClose> FramingStream<R> {
    /// Tear down the underlying transport and drop buffered bytes.
    pub fn hard_close(&mut self) -> io::Result<()> {
        debug!("hard close");
        self.pos = 0;
        self.filled = 0;
        self.mark = None;
        self.exhausted = true;
        self.inner.hard_close()
    }
}

impl<R: Read> Read for FramingStream<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if self.waiting || out.is_empty() {
            return Ok(0);
        }
        if self.pos == self.filled && self.fill()? == 0 {
            return Ok(0);
        }
        let available = &self.buf[self.pos..self.filled];
        let limit = available.len().min(out.len());
        let end = available[..limit]
            .iter()
            .position(|&byte| byte == self.sentinel);
        let count = end.unwrap_or(limit);
        out[..count].copy_from_slice(&available[..count]);
        self.pos += count;
        if end.is_some() {
            self.pos += 1;
            self.waiting = true;
            trace!("sentinel reached");
        }
        Ok(count)
    }
}

/// Write `payload` followed by `sentinel`, then flush.
pub fn write_frame<W: Write + ?Sized>(
    out: &mut W,
    payload: &[u8],
    sentinel: u8,
) -> Result<(), FramingError> {
    if let Some(offset) = payload.iter().position(|&byte| byte == sentinel) {
        return Err(FramingError::SentinelInPayload { sentinel, offset });
    }
    out.write_all(payload)?;
    out.write_all(&[sentinel])?;
    out.flush()?;
    trace!(bytes = payload.len(), "frame written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Yields its chunks one read at a time, with optional errors in between.
    struct Scripted {
        steps: Vec<io::Result<Vec<u8>>>,
    }

    impl Scripted {
        fn new(steps: Vec<io::Result<Vec<u8>>>) -> Self {
            let mut steps = steps;
            steps.reverse();
            Self { steps }
        }
    }

    impl Read for Scripted {
        fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
            match self.steps.pop() {
                None => Ok(0),
                Some(Err(err)) => Err(err),
                Some(Ok(chunk)) => {
                    assert!(chunk.len() <= out.len(), "test chunk larger than buffer");
                    out[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
            }
        }
    }

    #[test]
    fn sentinel_mid_buffer_ends_message_exactly() {
        let mut stream = FramingStream::new(&b"hello\nworld\n"[..]);
        let mut out = [0u8; 64];
        assert_eq!(stream.read(&mut out).unwrap(), 5);
        assert_eq!(&out[..5], b"hello");
        assert!(stream.is_waiting());
        assert_eq!(stream.read(&mut out).unwrap(), 0);
        assert_eq!(stream.buffered(), b"world\n");

        stream.enable();
        assert_eq!(stream.read(&mut out).unwrap(), 5);
        assert_eq!(&out[..5], b"world");
        stream.enable();
        assert_eq!(stream.read(&mut out).unwrap(), 0);
        assert!(stream.is_exhausted());
        assert!(!stream.is_waiting());
    }

    #[test]
    fn small_reads_stop_at_sentinel() {
        let mut stream = FramingStream::with_config(&b"abcdef|rest"[..], b'|', 4);
        let mut message = Vec::new();
        let mut out = [0u8; 3];
        loop {
            let n = stream.read(&mut out).unwrap();
            if n == 0 {
                break;
            }
            message.extend_from_slice(&out[..n]);
        }
        assert_eq!(message, b"abcdef");
        assert!(stream.is_waiting());
    }

    #[test]
    fn read_message_sequence() {
        let mut stream = FramingStream::new(&b"<a/>\n\n<b/>\n"[..]);
        assert_eq!(stream.read_message().unwrap().unwrap(), b"<a/>");
        assert_eq!(stream.read_message().unwrap().unwrap(), b"");
        assert_eq!(stream.read_message().unwrap().unwrap(), b"<b/>");
        assert_eq!(stream.read_message().unwrap(), None);
    }

    #[test]
    fn truncated_message_is_reported() {
        let mut stream = FramingStream::new(&b"<a/>\n<b"[..]);
        assert!(stream.read_message().unwrap().is_some());
        assert!(matches!(
            stream.read_message(),
            Err(FramingError::Truncated { read: 2 })
        ));
    }

    #[test]
    fn would_block_is_not_end_of_message() {
        let source = Scripted::new(vec![
            Ok(b"par".to_vec()),
            Err(io::Error::new(io::ErrorKind::WouldBlock, "slow")),
            Ok(b"tial\n".to_vec()),
        ]);
        let mut stream = FramingStream::with_config(source, b'\n', 16);
        let mut out = [0u8; 16];
        assert_eq!(stream.read(&mut out).unwrap(), 3);
        let err = stream.read(&mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
        assert!(!stream.is_waiting());
        assert!(!stream.is_exhausted());
        assert_eq!(stream.read(&mut out).unwrap(), 4);
        assert_eq!(&out[..4], b"tial");
        assert!(stream.is_waiting());
    }

    #[test]
    fn interrupted_reads_are_retried() {
        let source = Scripted::new(vec![
            Err(io::Error::new(io::ErrorKind::Interrupted, "signal")),
            Ok(b"ok\n".to_vec()),
        ]);
        let mut stream = FramingStream::new(source);
        assert_eq!(stream.read_message().unwrap().unwrap(), b"ok");
    }

    #[test]
    fn mark_and_reset_roll_back_within_window() {
        let mut stream = FramingStream::new(&b"ab\ncd\n"[..]);
        stream.mark().unwrap();
        assert_eq!(stream.buffered(), b"ab\ncd\n");
        let mut out = [0u8; 8];
        assert_eq!(stream.read(&mut out).unwrap(), 2);
        assert!(stream.is_waiting());
        stream.reset().unwrap();
        assert!(!stream.is_waiting());
        assert_eq!(stream.read_message().unwrap().unwrap(), b"ab");
        assert_eq!(stream.read_message().unwrap().unwrap(), b"cd");
    }

    #[test]
    fn fill_invalidates_mark() {
        let source = Scripted::new(vec![Ok(b"ab".to_vec()), Ok(b"c\n".to_vec())]);
        let mut stream = FramingStream::with_config(source, b'\n', 4);
        stream.mark().unwrap();
        let mut out = [0u8; 8];
        assert_eq!(stream.read(&mut out).unwrap(), 2);
        assert_eq!(stream.read(&mut out).unwrap(), 1);
        let err = stream.reset().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn finish_message_skips_remainder() {
        let mut stream = FramingStream::new(&b"skip me\nnext\n"[..]);
        let mut out = [0u8; 4];
        assert_eq!(stream.read(&mut out).unwrap(), 4);
        assert_eq!(stream.finish_message().unwrap(), 3);
        assert_eq!(stream.read_message().unwrap().unwrap(), b"next");
    }

    #[test]
    fn close_is_a_noop_and_hard_close_tears_down() {
        let mut stream = FramingStream::new(&b"one\ntwo\n"[..]);
        stream.close();
        assert_eq!(stream.read_message().unwrap().unwrap(), b"one");
        stream.hard_close().unwrap();
        assert!(stream.is_exhausted());
        assert_eq!(stream.read_message().unwrap(), None);
    }

    #[test]
    fn write_frame_rejects_sentinel() {
        let mut out = Vec::new();
        write_frame(&mut out, b"<a/>", b'\n').unwrap();
        assert_eq!(out, b"<a/>\n");
        assert!(matches!(
            write_frame(&mut out, b"bad\nline", b'\n'),
            Err(FramingError::SentinelInPayload { offset: 3, .. })
        ));
        assert_eq!(out, b"<a/>\n");
    }
}
