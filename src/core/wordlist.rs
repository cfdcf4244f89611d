/*!
 * Line-indexed wordlist reading
 *
 * A [`CandidateSource`] yields the passphrase candidates of one line range of
 * a wordlist. Lines are counted from the start of the file once, when the
 * source is opened; after that each candidate costs a single buffered read.
 *
 * `\n`, `\r\n` and a bare `\r` all end a line, and the terminator is
 * stripped. Nothing else is trimmed: spaces are legal in a passphrase.
 */

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use crate::crypto::is_valid_passphrase_len;
use crate::error::{CrackError, Result};
use crate::interrupt::InterruptFlag;

const READ_BUFFER: usize = 64 * 1024;

/// Lines between interrupt checks while counting or seeking
const SCAN_POLL_LINES: u64 = 4096;

/// One wordlist record that passed the passphrase length filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Zero-based line index in the wordlist
    pub line: u64,
    /// Passphrase bytes without the line terminator
    pub passphrase: Vec<u8>,
}

/// Splits a byte stream into lines under any line-ending convention.
struct LineReader<R> {
    inner: R,
}

impl<R: BufRead> LineReader<R> {
    fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Read the next line into `buf` (cleared first). Returns `false` at EOF.
    fn next_line(&mut self, buf: &mut Vec<u8>) -> io::Result<bool> {
        buf.clear();
        let mut read_any = false;
        loop {
            let available = match self.inner.fill_buf() {
                Ok(data) => data,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            if available.is_empty() {
                return Ok(read_any);
            }
            read_any = true;

            match available.iter().position(|&b| b == b'\n' || b == b'\r') {
                Some(pos) => {
                    let terminator = available[pos];
                    buf.extend_from_slice(&available[..pos]);
                    self.inner.consume(pos + 1);
                    if terminator == b'\r' {
                        self.skip_lf()?;
                    }
                    return Ok(true);
                }
                None => {
                    let len = available.len();
                    buf.extend_from_slice(available);
                    self.inner.consume(len);
                }
            }
        }
    }

    /// Swallow the `\n` of a `\r\n` pair, which may sit in the next buffer fill.
    fn skip_lf(&mut self) -> io::Result<()> {
        loop {
            match self.inner.fill_buf() {
                Ok(data) => {
                    if data.first() == Some(&b'\n') {
                        self.inner.consume(1);
                    }
                    return Ok(());
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

fn open(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).map_err(|e| CrackError::not_found(path, e))?;
    Ok(BufReader::with_capacity(READ_BUFFER, file))
}

/// Count the lines of a wordlist with the same rules [`CandidateSource`] uses.
pub fn count_lines(path: &Path) -> Result<u64> {
    // A private flag is never raised, so the count always completes
    Ok(count_lines_until(path, &InterruptFlag::new())?.unwrap_or_default())
}

/// [`count_lines`] that gives up with `None` once `interrupt` is raised.
pub fn count_lines_until(path: &Path, interrupt: &InterruptFlag) -> Result<Option<u64>> {
    let mut lines = LineReader::new(open(path)?);
    let mut buf = Vec::new();
    let mut count = 0u64;
    while lines.next_line(&mut buf)? {
        count += 1;
        if count % SCAN_POLL_LINES == 0 && interrupt.is_raised() {
            return Ok(None);
        }
    }
    Ok(Some(count))
}

/// Lazy sequence of candidates from the line range `[start, end)` of a wordlist.
///
/// Each worker opens its own source; no file position is shared. The
/// iterator yields `Err` once on a read failure and then stops.
pub struct CandidateSource<R = BufReader<File>> {
    lines: LineReader<R>,
    next_line: u64,
    end: u64,
    skipped: u64,
    buf: Vec<u8>,
    done: bool,
}

impl CandidateSource {
    /// Open `path` and position the source on line `start`.
    pub fn open(path: &Path, start: u64, end: u64) -> Result<Self> {
        if start > end {
            return Err(CrackError::InvalidRange { start, end });
        }
        Self::from_reader(open(path)?, start, end)
    }

    /// Like [`open`](Self::open), but the seek to `start` stops early once
    /// `interrupt` is raised, leaving an exhausted source.
    pub fn open_until(path: &Path, start: u64, end: u64, interrupt: &InterruptFlag) -> Result<Self> {
        if start > end {
            return Err(CrackError::InvalidRange { start, end });
        }
        Self::build(open(path)?, start, end, Some(interrupt))
    }
}

impl<R: BufRead> CandidateSource<R> {
    /// Build a source over any buffered reader, skipping to line `start`.
    pub fn from_reader(reader: R, start: u64, end: u64) -> Result<Self> {
        if start > end {
            return Err(CrackError::InvalidRange { start, end });
        }
        Self::build(reader, start, end, None)
    }

    fn build(reader: R, start: u64, end: u64, interrupt: Option<&InterruptFlag>) -> Result<Self> {
        let mut source = Self {
            lines: LineReader::new(reader),
            next_line: 0,
            end,
            skipped: 0,
            buf: Vec::new(),
            done: start == end,
        };

        // Variable-width lines: the only way to line `start` is to count
        while !source.done && source.next_line < start {
            if source.lines.next_line(&mut source.buf)? {
                source.next_line += 1;
            } else {
                source.done = true;
            }
            if source.next_line % SCAN_POLL_LINES == 0 && interrupt.is_some_and(|f| f.is_raised()) {
                tracing::debug!(reached = source.next_line, "Wordlist seek interrupted");
                source.done = true;
            }
        }
        tracing::trace!(start, end, reached = source.next_line, "Wordlist positioned");
        Ok(source)
    }

    /// Index of the next line to be read.
    pub fn position(&self) -> u64 {
        self.next_line
    }

    /// Lines consumed but rejected by the length filter.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

impl<R: BufRead> Iterator for CandidateSource<R> {
    type Item = Result<Candidate>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done && self.next_line < self.end {
            match self.lines.next_line(&mut self.buf) {
                Ok(true) => {
                    let line = self.next_line;
                    self.next_line += 1;
                    if is_valid_passphrase_len(self.buf.len()) {
                        return Some(Ok(Candidate {
                            line,
                            passphrase: self.buf.clone(),
                        }));
                    }
                    self.skipped += 1;
                }
                Ok(false) => self.done = true,
                Err(e) => {
                    self.done = true;
                    return Some(Err(CrackError::Io(e)));
                }
            }
        }
        None
    }
}
