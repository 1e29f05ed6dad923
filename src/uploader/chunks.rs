use bytes::Bytes;
use std::num::NonZeroUsize;

/// One APPEND segment. `bytes` shares the caller's buffer, no copy is made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub bytes: Bytes,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Split `buffer` into `ceil(len / chunk_size)` ordered segments.
pub fn split(buffer: &Bytes, chunk_size: NonZeroUsize) -> Chunks {
    Chunks {
        buffer: buffer.clone(),
        chunk_size: chunk_size.get(),
        next_index: 0,
    }
}

pub fn chunk_count(len: usize, chunk_size: NonZeroUsize) -> usize {
    len.div_ceil(chunk_size.get())
}

#[derive(Debug, Clone)]
pub struct Chunks {
    buffer: Bytes,
    chunk_size: usize,
    next_index: usize,
}

impl Iterator for Chunks {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        let start = self.next_index * self.chunk_size;
        if start >= self.buffer.len() {
            return None;
        }
        let end = std::cmp::min(start + self.chunk_size, self.buffer.len());
        let chunk = Chunk {
            index: self.next_index,
            bytes: self.buffer.slice(start..end),
        };
        self.next_index += 1;
        Some(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let consumed = self.next_index * self.chunk_size;
        let remaining = self
            .buffer
            .len()
            .saturating_sub(consumed)
            .div_ceil(self.chunk_size);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Chunks {}
