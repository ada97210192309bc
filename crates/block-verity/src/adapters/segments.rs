//! Owned scatter list of request buffers.

use crate::ports::outbound::{DataSegments, SegmentCursor};

/// Data segments backed by owned vectors.
///
/// Segment sizes are arbitrary; a block may span several of them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentBuffer {
    segments: Vec<Vec<u8>>,
    cursor: SegmentCursor,
}

impl SegmentBuffer {
    pub fn new(segments: Vec<Vec<u8>>) -> Self {
        Self {
            segments,
            cursor: SegmentCursor::default(),
        }
    }

    /// One contiguous segment.
    pub fn contiguous(data: Vec<u8>) -> Self {
        Self::new(vec![data])
    }

    /// Split `data` into segments of `chunk` bytes (the last may be shorter).
    pub fn chunked(data: &[u8], chunk: usize) -> Self {
        Self::new(data.chunks(chunk.max(1)).map(<[u8]>::to_vec).collect())
    }

    pub fn segments(&self) -> &[Vec<u8>] {
        &self.segments
    }

    /// Concatenate all segments.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.segments.concat()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.segments.concat()
    }
}

impl DataSegments for SegmentBuffer {
    fn len_bytes(&self) -> usize {
        self.segments.iter().map(Vec::len).sum()
    }

    fn position(&self) -> SegmentCursor {
        self.cursor
    }

    fn rewind(&mut self, cursor: SegmentCursor) {
        self.cursor = cursor;
    }

    fn next_segment(&mut self, max: usize) -> Option<&mut [u8]> {
        while self.cursor.index < self.segments.len()
            && self.cursor.offset >= self.segments[self.cursor.index].len()
        {
            self.cursor.index += 1;
            self.cursor.offset = 0;
        }
        if max == 0 || self.cursor.index >= self.segments.len() {
            return None;
        }

        let SegmentCursor { index, offset } = self.cursor;
        let take = max.min(self.segments[index].len() - offset);
        self.cursor.offset += take;
        Some(&mut self.segments[index][offset..offset + take])
    }
}
