//! Frame extraction from a raw byte stream.
//!
//! The transport delivers bytes in arbitrary chunks. [`FrameExtractor`]
//! accumulates them and yields one candidate frame per terminator byte.
//! Frames are only cut at a terminator, so the sequence of frames produced
//! does not depend on how the stream was chunked.
//!
//! Noise in front of a frame (boot banners, a stray `\n` after `\r`, line
//! garbage after a reset) is discarded up to the first plausible prefix: a
//! class byte and two digits followed by either the delimiter or the
//! terminator. A line with no plausible prefix is dropped entirely.
//!
//! The accumulator is bounded. When it outgrows the bound without a
//! terminator, only bytes that cannot belong to a frame are dropped. A frame
//! whose body is itself longer than the bound is discarded through its
//! terminator, and so is an oversized frame that arrives in one piece. That
//! way the bound never changes which frames are produced for a given stream.

use tracing::{debug, warn};

use crate::codec::{DELIMITER, TERMINATOR};
use crate::types::{MessageClass, MessageKey};

/// Default accumulator bound. Frames are typically well under 100 bytes.
pub const DEFAULT_MAX_BUFFER: usize = 8192;

/// Accumulates transport bytes and splits them into frames.
#[derive(Debug)]
pub struct FrameExtractor {
    buf: Vec<u8>,
    max_buffer: usize,
    discarded: u64,
    /// Inside an oversized frame; drop everything through the next terminator.
    skipping: bool,
}

impl FrameExtractor {
    pub fn new() -> Self {
        Self::with_max_buffer(DEFAULT_MAX_BUFFER)
    }

    /// Create an extractor that holds at most `max_buffer` bytes of an
    /// unterminated frame. Longer frames are dropped.
    pub fn with_max_buffer(max_buffer: usize) -> Self {
        FrameExtractor {
            buf: Vec::new(),
            max_buffer,
            discarded: 0,
            skipping: false,
        }
    }

    /// Append a chunk read from the transport.
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);

        if self.skipping {
            match self.buf.iter().position(|&b| b == TERMINATOR) {
                Some(end) => {
                    self.discarded += end as u64 + 1;
                    self.buf.drain(..=end);
                    self.skipping = false;
                }
                None => {
                    self.discarded += self.buf.len() as u64;
                    self.buf.clear();
                    return;
                }
            }
        }

        if self.buf.len() > self.max_buffer && !self.buf.contains(&TERMINATOR) {
            let start = first_candidate(&self.buf);
            if start > 0 {
                debug!(discarded = start, "accumulator full, dropping noise");
                self.discarded += start as u64;
                self.buf.drain(..start);
            }
            if self.buf.len() > self.max_buffer {
                warn!(
                    len = self.buf.len(),
                    max = self.max_buffer,
                    "frame exceeds accumulator bound, dropping it"
                );
                self.discarded += self.buf.len() as u64;
                self.buf.clear();
                self.skipping = true;
            }
        }
    }

    /// Remove and return the next complete frame, terminator included.
    ///
    /// Returns `None` once no terminator remains in the accumulator; any
    /// partial frame is kept for the next [`push`](Self::push).
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        loop {
            let end = self.buf.iter().position(|&b| b == TERMINATOR)?;
            let mut line: Vec<u8> = self.buf.drain(..=end).collect();

            match find_prefix(&line) {
                Some(start) if line.len() - 1 - start > self.max_buffer => {
                    warn!(
                        len = line.len() - start,
                        max = self.max_buffer,
                        "frame exceeds accumulator bound, dropping it"
                    );
                    self.discarded += line.len() as u64;
                }
                Some(0) => return Some(line),
                Some(start) => {
                    debug!(
                        discarded = start,
                        noise = ?String::from_utf8_lossy(&line[..start]),
                        "discarding noise before frame"
                    );
                    self.discarded += start as u64;
                    line.drain(..start);
                    return Some(line);
                }
                None => {
                    debug!(
                        len = line.len(),
                        noise = ?String::from_utf8_lossy(&line),
                        "discarding line without a frame prefix"
                    );
                    self.discarded += line.len() as u64;
                }
            }
        }
    }

    /// Append `data` and return every frame that is now complete.
    pub fn extract(&mut self, data: &[u8]) -> Vec<Vec<u8>> {
        self.push(data);
        std::iter::from_fn(|| self.next_frame()).collect()
    }

    /// Number of bytes waiting for a terminator.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Total number of noise bytes dropped so far.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.skipping = false;
    }
}

impl Default for FrameExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Position of the first plausible frame prefix in a terminated line.
fn find_prefix(line: &[u8]) -> Option<usize> {
    line.windows(4).position(|w| {
        MessageKey::from_prefix(&w[..3]).is_some() && (w[3] == DELIMITER || w[3] == TERMINATOR)
    })
}

/// Position of the first byte in an unterminated buffer that could still
/// start a frame, or `buf.len()` if none can. A prefix cut short by the end
/// of the buffer counts.
fn first_candidate(buf: &[u8]) -> usize {
    (0..buf.len())
        .find(|&i| could_start_frame(&buf[i..]))
        .unwrap_or(buf.len())
}

fn could_start_frame(rest: &[u8]) -> bool {
    rest.iter().take(4).enumerate().all(|(i, &b)| match i {
        0 => MessageClass::from_byte(b).is_some(),
        1 | 2 => b.is_ascii_digit(),
        _ => b == DELIMITER || b == TERMINATOR,
    })
}
