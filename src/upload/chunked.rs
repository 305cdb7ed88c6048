//! Splitting a written byte stream into fixed-size upload parts

use bytes::{Bytes, BytesMut};

/// Contiguous slice of a layer, addressed by inclusive byte offsets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerPart {
    pub first_byte: u64,
    pub data: Bytes,
}

impl LayerPart {
    pub fn last_byte(&self) -> u64 {
        self.first_byte + self.data.len() as u64 - 1
    }
}

/// Accumulates writes and hands out parts of exactly `part_size` bytes in
/// offset order. Only the final part may be shorter.
#[derive(Debug)]
pub struct PartBuffer {
    part_size: usize,
    pending: BytesMut,
    next_offset: u64,
}

impl PartBuffer {
    pub fn new(part_size: u64) -> Self {
        let part_size = usize::try_from(part_size).unwrap_or(usize::MAX).max(1);
        Self {
            part_size,
            pending: BytesMut::new(),
            next_offset: 0,
        }
    }

    pub fn extend(&mut self, data: &[u8]) {
        self.pending.extend_from_slice(data);
    }

    /// Next full part, if enough bytes are buffered
    pub fn take_full(&mut self) -> Option<LayerPart> {
        if self.pending.len() < self.part_size {
            return None;
        }
        Some(self.split(self.part_size))
    }

    /// Whatever remains buffered, as a final short part
    pub fn take_rest(&mut self) -> Option<LayerPart> {
        if self.pending.is_empty() {
            return None;
        }
        Some(self.split(self.pending.len()))
    }

    fn split(&mut self, len: usize) -> LayerPart {
        let part = LayerPart {
            first_byte: self.next_offset,
            data: self.pending.split_to(len).freeze(),
        };
        self.next_offset += len as u64;
        part
    }

    /// Bytes accepted so far, flushed or not
    pub fn written(&self) -> u64 {
        self.next_offset + self.pending.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parts_are_contiguous() {
        let mut buffer = PartBuffer::new(4);
        buffer.extend(b"abcdefghij");

        let first = buffer.take_full().unwrap();
        assert_eq!((first.first_byte, first.last_byte()), (0, 3));
        assert_eq!(&first.data[..], b"abcd");

        let second = buffer.take_full().unwrap();
        assert_eq!((second.first_byte, second.last_byte()), (4, 7));
        assert!(buffer.take_full().is_none());
        assert_eq!(buffer.written(), 10);

        let rest = buffer.take_rest().unwrap();
        assert_eq!((rest.first_byte, rest.last_byte()), (8, 9));
        assert_eq!(&rest.data[..], b"ij");
        assert!(buffer.take_rest().is_none());
    }

    #[test]
    fn test_parts_span_writes() {
        let mut buffer = PartBuffer::new(3);
        buffer.extend(b"a");
        assert!(buffer.take_full().is_none());
        buffer.extend(b"bc");
        assert_eq!(&buffer.take_full().unwrap().data[..], b"abc");
    }

    #[test]
    fn test_single_byte_parts() {
        let mut buffer = PartBuffer::new(1);
        buffer.extend(&[7u8; 5]);
        let ranges: Vec<_> = std::iter::from_fn(|| buffer.take_full())
            .map(|p| (p.first_byte, p.last_byte()))
            .collect();
        assert_eq!(ranges, vec![(0, 0), (1, 1), (2, 2), (3, 3), (4, 4)]);
    }

    #[test]
    fn test_zero_part_size_is_clamped() {
        let mut buffer = PartBuffer::new(0);
        buffer.extend(b"ab");
        assert_eq!(&buffer.take_full().unwrap().data[..], b"a");
    }
}
