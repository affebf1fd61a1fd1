//! Three-digit token scanner.
//!
//! A token is three consecutive ASCII digits. Digits accumulate until three
//! are buffered, at which point the token's value is added to the running sum
//! and the buffer starts over, so `"123456"` yields `123` and `456`. Any
//! non-digit discards a partially buffered token: `"12a345"` yields only
//! `345`, and the trailing `45` of `"12345"` never completes.
//!
//! Sums use wrapping `u64` addition, which keeps partial sums associative and
//! commutative no matter how the stream is split.
//!
//! ## Range boundaries
//!
//! When a stream is split across workers a token may straddle two ranges.
//! Ownership goes to the range containing the token's first byte:
//!
//! - [`skip_before`] tells a worker how many leading digits at its start
//!   offset finish a token the previous worker owns.
//! - [`scan_range`] drops those digits and, once its range is exhausted,
//!   keeps reading only as long as it has a token half-buffered.

use std::io::{self, Read, Seek, SeekFrom};

/// Number of digits in a token.
pub const TOKEN_WIDTH: usize = 3;

const CHUNK_SIZE: usize = 8 * 1024;

/// Incremental token scanner.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Scanner {
    digits: usize,
    value: u16,
    sum: u64,
    tokens: u64,
}

impl Scanner {
    pub const fn new() -> Self {
        Self {
            digits: 0,
            value: 0,
            sum: 0,
            tokens: 0,
        }
    }

    /// Feeds one byte, returning the token it completes, if any.
    pub fn push(&mut self, byte: u8) -> Option<u16> {
        if !byte.is_ascii_digit() {
            self.digits = 0;
            self.value = 0;
            return None;
        }

        self.value = self.value * 10 + u16::from(byte - b'0');
        self.digits += 1;
        if self.digits < TOKEN_WIDTH {
            return None;
        }

        let token = self.value;
        self.sum = self.sum.wrapping_add(u64::from(token));
        self.tokens += 1;
        self.digits = 0;
        self.value = 0;
        Some(token)
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.push(byte);
        }
    }

    /// Running sum of every completed token.
    pub const fn sum(&self) -> u64 {
        self.sum
    }

    /// Number of completed tokens.
    pub const fn tokens(&self) -> u64 {
        self.tokens
    }

    /// Digits buffered towards the next token.
    pub const fn pending(&self) -> usize {
        self.digits
    }
}

/// Sums every token in `bytes`.
pub fn scan_sum(bytes: &[u8]) -> u64 {
    let mut scanner = Scanner::new();
    scanner.feed(bytes);
    scanner.sum()
}

/// Totals for one scanned range.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RangeScan {
    pub sum: u64,
    pub tokens: u64,
    pub bytes_read: u64,
}

/// Scans a range read from the current position of `reader`.
///
/// - `skip` leading digits are dropped (see [`skip_before`]); a non-digit ends
///   the skip early.
/// - `limit` is the number of bytes in the range, or `None` to read to EOF.
///   Past the limit the scan continues only while a token is half-buffered.
///
/// # Errors
///
/// Propagates any non-[`Interrupted`](io::ErrorKind::Interrupted) read error.
pub fn scan_range<R: Read>(
    mut reader: R,
    mut skip: usize,
    limit: Option<u64>,
) -> io::Result<RangeScan> {
    let mut scanner = Scanner::new();
    let mut remaining = limit;
    let mut bytes_read = 0_u64;
    let mut buf = vec![0_u8; CHUNK_SIZE];

    'read: loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };

        for &byte in &buf[..n] {
            match remaining.as_mut() {
                Some(0) if scanner.pending() == 0 => break 'read,
                Some(0) | None => {}
                Some(left) => *left -= 1,
            }
            bytes_read += 1;

            if skip > 0 && byte.is_ascii_digit() {
                skip -= 1;
                continue;
            }
            skip = 0;
            scanner.push(byte);
        }
    }

    Ok(RangeScan {
        sum: scanner.sum(),
        tokens: scanner.tokens(),
        bytes_read,
    })
}

/// Number of digits at `start` that complete a token begun before `start`.
///
/// Walks backwards from `start` counting the digit run that ends there, then
/// returns how many more digits that run needs to reach a token boundary.
/// Leaves `reader` positioned at `start`.
///
/// # Errors
///
/// Propagates seek and read errors.
pub fn skip_before<R: Read + Seek>(reader: &mut R, start: u64) -> io::Result<usize> {
    let mut run = 0_u64;
    let mut pos = start;
    let mut buf = vec![0_u8; CHUNK_SIZE];

    while pos > 0 {
        let n = pos.min(CHUNK_SIZE as u64);
        pos -= n;
        // Bounded by CHUNK_SIZE.
        let chunk = &mut buf[..n as usize];
        reader.seek(SeekFrom::Start(pos))?;
        reader.read_exact(chunk)?;

        let trailing = chunk
            .iter()
            .rev()
            .take_while(|byte| byte.is_ascii_digit())
            .count();
        run += trailing as u64;
        if trailing < chunk.len() {
            break;
        }
    }

    reader.seek(SeekFrom::Start(start))?;
    let phase = (run % TOKEN_WIDTH as u64) as usize;
    Ok((TOKEN_WIDTH - phase) % TOKEN_WIDTH)
}
