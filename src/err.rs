//! Error types and the allocation-free fatal diagnostic path.

use std::error::Error as StdError;
use std::fmt::{self, Write as FmtWrite};
use std::io::Write as IoWrite;
use std::process;

/// Errors returned by coroutine construction and the fallible suspend path.
///
/// All of these are recoverable from the engine's point of view, though a
/// coroutine that reported [`StackOverflow`](Error::StackOverflow) must not
/// be resumed again: its stack is presumed corrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// the stack buffer cannot even hold the reserved canary word
    StackTooSmall,
    /// stack memory could not be allocated
    StackAlloc,
    /// suspend was called while no coroutine is running on this thread
    SuspendFromMain,
    /// the canary or stack pointer check failed before a suspend
    StackOverflow,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Error::StackTooSmall => "stack too small to hold the canary word",
            Error::StackAlloc => "failed to allocate stack memory",
            Error::SuspendFromMain => "suspend called outside of any coroutine",
            Error::StackOverflow => "coroutine stack overflow detected",
        };
        f.write_str(s)
    }
}

impl StdError for Error {}

// Fixed sink for the fatal diagnostics below. The abort path must not
// allocate, so formatting lands here and anything beyond the buffer's
// capacity is truncated.
struct DiagBuf {
    buf: [u8; 256],
    len: usize,
}

impl fmt::Write for DiagBuf {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let n = s.len().min(self.buf.len() - self.len);
        self.buf[self.len..self.len + n].copy_from_slice(&s.as_bytes()[..n]);
        self.len += n;
        Ok(())
    }
}

/// Writes an identity-annotated diagnostic to stderr without allocating,
/// then aborts the process.
pub(crate) fn fatal(args: fmt::Arguments) -> ! {
    let mut out = DiagBuf { buf: [0; 256], len: 0 };
    let _ = out.write_fmt(args);
    let _ = out.write_str("\n");
    let _ = std::io::stderr().write_all(&out.buf[..out.len]);
    process::abort()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt::Write;

    #[test]
    fn diag_buf_truncates() {
        let mut out = DiagBuf { buf: [0; 256], len: 0 };
        for _ in 0..100 {
            out.write_str("0123456789").unwrap();
        }
        assert_eq!(out.len, 256);
    }

    #[test]
    fn error_display() {
        assert_eq!(
            Error::SuspendFromMain.to_string(),
            "suspend called outside of any coroutine"
        );
    }
}
