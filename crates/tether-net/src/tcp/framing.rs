//! Delimiter-based message reassembly across chunk boundaries.

use bytes::Bytes;

/// Reconstructs delimiter-terminated frames from an arbitrarily chunked stream.
///
/// The assembler keeps the bytes after the last delimiter seen (the carry)
/// until a later chunk terminates them. The carry never contains the
/// delimiter byte. There is no escaping: a payload that contains the
/// delimiter is split at that byte.
///
/// # Example
///
/// ```
/// use tether_net::tcp::FrameAssembler;
///
/// let mut assembler = FrameAssembler::new(b'\n');
/// assert!(assembler.push(b"hel").is_empty());
/// let frames = assembler.push(b"lo\nwor");
/// assert_eq!(frames, vec![&b"hello"[..]]);
/// assert_eq!(assembler.carry(), b"wor");
/// ```
#[derive(Debug, Clone)]
pub struct FrameAssembler {
    delimiter: u8,
    carry: Vec<u8>,
}

impl FrameAssembler {
    /// Create an assembler for the given delimiter byte.
    pub fn new(delimiter: u8) -> Self {
        Self {
            delimiter,
            carry: Vec::new(),
        }
    }

    /// The delimiter byte this assembler splits on.
    pub fn delimiter(&self) -> u8 {
        self.delimiter
    }

    /// Feed one chunk and return every frame it completes, in order.
    ///
    /// The first frame is prefixed with the carry from earlier chunks. Two
    /// adjacent delimiters produce an empty frame.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        let mut frames = Vec::new();
        let mut start = 0;

        for (index, &byte) in chunk.iter().enumerate() {
            if byte == self.delimiter {
                let mut frame = std::mem::take(&mut self.carry);
                frame.extend_from_slice(&chunk[start..index]);
                frames.push(Bytes::from(frame));
                start = index + 1;
            }
        }

        // Carry is empty here if any delimiter matched.
        self.carry.extend_from_slice(&chunk[start..]);
        frames
    }

    /// Bytes waiting for a delimiter.
    pub fn carry(&self) -> &[u8] {
        &self.carry
    }

    /// Drain the carry, returning `None` if it is empty.
    pub fn take_carry(&mut self) -> Option<Bytes> {
        if self.carry.is_empty() {
            None
        } else {
            Some(Bytes::from(std::mem::take(&mut self.carry)))
        }
    }

    /// Discard the carry.
    pub fn reset(&mut self) {
        self.carry.clear();
    }
}
