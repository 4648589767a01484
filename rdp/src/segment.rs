//! Wire-format definitions for protocol segments.
//!
//! Every datagram exchanged between peers is a [`Segment`].  This module is
//! responsible for:
//! - Defining the on-wire binary layout (flags, sequence number, payload).
//! - Serialising a [`Segment`] into a byte buffer ready for transmission.
//! - Deserialising a raw byte slice back into a [`Segment`].
//! - Splitting an application message into data segments.
//!
//! No I/O happens here; this is pure data transformation.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |A|S|L|F|S|     |                                               |
//! |C|Y|S|I|A|     |                Sequence Number                |
//! |K|N|T|N|C|     |                                               |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                          Payload ...                          |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Total header size: [`HEADER_LEN`] = 4 bytes.
//! There is no length field and no checksum: the payload is whatever follows
//! the header in the datagram.

use std::fmt;

use thiserror::Error;

use crate::seq::SeqNum;

/// Bit-flag constants for the flags byte.
pub mod flags {
    /// Acknowledgement; `seq` is the number being acknowledged.
    pub const ACK: u8 = 0b1000_0000;
    /// Connection establishment.
    pub const SYN: u8 = 0b0100_0000;
    /// Last segment of a logical message.
    pub const LST: u8 = 0b0010_0000;
    /// Connection teardown request.
    pub const FIN: u8 = 0b0001_0000;
    /// Selective-ack marker.  Carried on the wire, never required.
    pub const SAC: u8 = 0b0000_1000;
}

/// Byte length of the fixed-size header on the wire.
pub const HEADER_LEN: usize = 4;

/// Largest datagram either peer will ever emit.
pub const MAX_SEGMENT_SIZE: usize = 1028;

/// Payload bytes carried by every full data segment.
pub const DATA_CHUNK_SIZE: usize = MAX_SEGMENT_SIZE - HEADER_LEN;

const OFF_FLAGS: usize = 0;
const OFF_SEQ: usize = 1;

/// One framed unit of the protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Bitmask of [`flags`] constants.
    pub flags: u8,
    pub seq: SeqNum,
    pub payload: Vec<u8>,
}

impl Segment {
    /// A data segment.  `last` marks the final chunk of a message.
    pub fn data(seq: SeqNum, payload: Vec<u8>, last: bool) -> Self {
        Self {
            flags: if last { flags::LST } else { 0 },
            seq,
            payload,
        }
    }

    pub fn ack(seq: SeqNum) -> Self {
        Self::control(flags::ACK, seq)
    }

    pub fn syn() -> Self {
        Self::control(flags::SYN, SeqNum::ZERO)
    }

    pub fn syn_ack() -> Self {
        Self::control(flags::SYN | flags::ACK, SeqNum::ZERO)
    }

    pub fn fin(seq: SeqNum) -> Self {
        Self::control(flags::FIN, seq)
    }

    pub fn sac(seq: SeqNum) -> Self {
        Self::control(flags::SAC, seq)
    }

    fn control(flags: u8, seq: SeqNum) -> Self {
        Self {
            flags,
            seq,
            payload: Vec::new(),
        }
    }

    pub fn is_ack(&self) -> bool {
        self.flags & flags::ACK != 0
    }

    pub fn is_syn(&self) -> bool {
        self.flags & flags::SYN != 0
    }

    pub fn is_lst(&self) -> bool {
        self.flags & flags::LST != 0
    }

    pub fn is_fin(&self) -> bool {
        self.flags & flags::FIN != 0
    }

    pub fn is_sac(&self) -> bool {
        self.flags & flags::SAC != 0
    }

    /// `true` when both `SYN` and `ACK` are set.
    pub fn is_syn_ack(&self) -> bool {
        self.is_syn() && self.is_ack()
    }

    /// `true` for a segment carrying application data: no control bit
    /// other than `LST`.
    pub fn is_data(&self) -> bool {
        !(self.is_ack() || self.is_syn() || self.is_fin() || self.is_sac())
    }

    /// Short human-readable kind used in logs, e.g. `SYNACK`, `FIN`, `SEG`.
    pub fn kind(&self) -> &'static str {
        match (self.is_syn(), self.is_ack(), self.is_fin()) {
            (true, true, _) => "SYNACK",
            (true, false, _) => "SYN",
            (false, true, _) => "ACK",
            (false, false, true) => "FIN",
            (false, false, false) => "SEG",
        }
    }

    /// Serialise this segment into a newly allocated byte vector.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; HEADER_LEN + self.payload.len()];
        buf[OFF_FLAGS] = self.flags;
        // Low three bytes of the big-endian u32.
        buf[OFF_SEQ..HEADER_LEN].copy_from_slice(&self.seq.value().to_be_bytes()[1..]);
        buf[HEADER_LEN..].copy_from_slice(&self.payload);
        buf
    }

    /// Parse a [`Segment`] from a raw datagram.
    ///
    /// Returns [`SegmentError::Malformed`] if `buf` is shorter than
    /// [`HEADER_LEN`].
    pub fn decode(buf: &[u8]) -> Result<Self, SegmentError> {
        if buf.len() < HEADER_LEN {
            return Err(SegmentError::Malformed { len: buf.len() });
        }
        let seq = u32::from_be_bytes([0, buf[OFF_SEQ], buf[OFF_SEQ + 1], buf[OFF_SEQ + 2]]);
        Ok(Self {
            flags: buf[OFF_FLAGS],
            seq: SeqNum::new(seq),
            payload: buf[HEADER_LEN..].to_vec(),
        })
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind(), self.seq)
    }
}

/// Errors that can arise when parsing a raw datagram.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SegmentError {
    #[error("malformed segment: {len} bytes is shorter than the {HEADER_LEN}-byte header")]
    Malformed { len: usize },
}

/// Lazy partition of a byte slice into `size`-byte pieces.
///
/// The final piece may be shorter.  Empty input yields a single empty piece
/// so that every message occupies at least one segment.
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    rest: Option<&'a [u8]>,
    size: usize,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        let rest = self.rest?;
        if rest.len() <= self.size {
            self.rest = None;
            return Some(rest);
        }
        let (head, tail) = rest.split_at(self.size);
        self.rest = Some(tail);
        Some(head)
    }
}

/// Partition `data` into pieces of at most `size` bytes.
pub fn chunks(data: &[u8], size: usize) -> Chunks<'_> {
    Chunks {
        rest: Some(data),
        size: size.max(1),
    }
}

/// Split `data` into data segments numbered `start, start + 1, …`.
///
/// Only the final segment carries [`flags::LST`].
pub fn build_segments(data: &[u8], start: SeqNum) -> impl Iterator<Item = Segment> + '_ {
    let mut pieces = chunks(data, DATA_CHUNK_SIZE).enumerate().peekable();
    std::iter::from_fn(move || {
        let (i, piece) = pieces.next()?;
        let last = pieces.peek().is_none();
        Some(Segment::data(start.advance(i as u32), piece.to_vec(), last))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seq::SEQ_SPACE;

    const ALL_FLAGS: [u8; 5] = [flags::ACK, flags::SYN, flags::LST, flags::FIN, flags::SAC];

    #[test]
    fn roundtrip_every_flag_combination() {
        for mask in 0u8..32 {
            let f = ALL_FLAGS
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .fold(0u8, |acc, (_, bit)| acc | bit);
            let seg = Segment {
                flags: f,
                seq: SeqNum::new(mask as u32 * 1000),
                payload: vec![mask; mask as usize],
            };
            assert_eq!(Segment::decode(&seg.encode()).unwrap(), seg);
        }
    }

    #[test]
    fn roundtrip_edge_sequence_numbers() {
        for seq in [0, 1, 0xff, 0x1_0000, SEQ_SPACE - 1] {
            let seg = Segment::ack(SeqNum::new(seq));
            assert_eq!(Segment::decode(&seg.encode()).unwrap(), seg);
        }
    }

    #[test]
    fn roundtrip_payload_lengths() {
        for len in [0, 1, DATA_CHUNK_SIZE - 1, DATA_CHUNK_SIZE] {
            let seg = Segment::data(SeqNum::new(9), vec![0xab; len], len % 2 == 0);
            let bytes = seg.encode();
            assert_eq!(bytes.len(), HEADER_LEN + len);
            assert!(bytes.len() <= MAX_SEGMENT_SIZE);
            assert_eq!(Segment::decode(&bytes).unwrap(), seg);
        }
    }

    #[test]
    fn decode_short_buffer_is_malformed() {
        assert_eq!(Segment::decode(&[]), Err(SegmentError::Malformed { len: 0 }));
        assert_eq!(
            Segment::decode(&[flags::ACK, 0, 0]),
            Err(SegmentError::Malformed { len: 3 })
        );
    }

    #[test]
    fn header_only_decodes_to_empty_payload() {
        let seg = Segment::decode(&[flags::SYN | flags::ACK, 0, 0, 0]).unwrap();
        assert!(seg.is_syn_ack());
        assert!(seg.payload.is_empty());
    }

    #[test]
    fn flag_bits_are_high_to_low() {
        assert_eq!(Segment::ack(SeqNum::ZERO).encode()[0], 0x80);
        assert_eq!(Segment::syn().encode()[0], 0x40);
        assert_eq!(Segment::data(SeqNum::ZERO, vec![], true).encode()[0], 0x20);
        assert_eq!(Segment::fin(SeqNum::ZERO).encode()[0], 0x10);
        assert_eq!(Segment::sac(SeqNum::ZERO).encode()[0], 0x08);
    }

    #[test]
    fn seq_big_endian_on_wire() {
        let bytes = Segment::ack(SeqNum::new(0x01_02_03)).encode();
        assert_eq!(&bytes[OFF_SEQ..HEADER_LEN], &[0x01, 0x02, 0x03]);
    }

    #[test]
    fn control_segments_are_not_data() {
        assert!(!Segment::ack(SeqNum::ZERO).is_data());
        assert!(!Segment::syn().is_data());
        assert!(!Segment::fin(SeqNum::ZERO).is_data());
        assert!(!Segment::sac(SeqNum::ZERO).is_data());
        assert!(Segment::data(SeqNum::ZERO, b"x".to_vec(), false).is_data());
        assert!(Segment::data(SeqNum::ZERO, b"x".to_vec(), true).is_data());
    }

    #[test]
    fn display_shows_kind_and_seq() {
        assert_eq!(Segment::syn_ack().to_string(), "SYNACK(0)");
        assert_eq!(Segment::ack(SeqNum::new(3)).to_string(), "ACK(3)");
        assert_eq!(Segment::fin(SeqNum::new(8)).to_string(), "FIN(8)");
        assert_eq!(Segment::data(SeqNum::new(2), vec![1], true).to_string(), "SEG(2)");
    }

    #[test]
    fn chunks_partition_with_short_tail() {
        let data = [1u8, 2, 3, 4, 5, 6, 7];
        let pieces: Vec<&[u8]> = chunks(&data, 3).collect();
        assert_eq!(pieces, vec![&[1, 2, 3][..], &[4, 5, 6][..], &[7][..]]);
    }

    #[test]
    fn chunks_of_exact_multiple_have_no_empty_tail() {
        let data = [0u8; 6];
        assert_eq!(chunks(&data, 3).count(), 2);
    }

    #[test]
    fn chunks_of_empty_input_yield_one_empty_piece() {
        let pieces: Vec<&[u8]> = chunks(&[], 3).collect();
        assert_eq!(pieces, vec![&[][..]]);
    }

    #[test]
    fn build_segments_counts_and_reassembles() {
        for n in [0, 1, DATA_CHUNK_SIZE - 1, DATA_CHUNK_SIZE, DATA_CHUNK_SIZE + 1, 5 * DATA_CHUNK_SIZE + 17] {
            let data: Vec<u8> = (0..n).map(|i| (i % 251) as u8).collect();
            let segs: Vec<Segment> = build_segments(&data, SeqNum::new(40)).collect();

            let expected = n.div_ceil(DATA_CHUNK_SIZE).max(1);
            assert_eq!(segs.len(), expected, "n = {n}");
            assert_eq!(segs.iter().filter(|s| s.is_lst()).count(), 1);
            assert!(segs.last().unwrap().is_lst());

            for (i, s) in segs.iter().enumerate() {
                assert_eq!(s.seq, SeqNum::new(40 + i as u32));
                if i + 1 < segs.len() {
                    assert_eq!(s.payload.len(), DATA_CHUNK_SIZE);
                }
            }

            let joined: Vec<u8> = segs.iter().flat_map(|s| s.payload.iter().copied()).collect();
            assert_eq!(joined, data);
        }
    }

    #[test]
    fn build_segments_empty_message_is_single_lst() {
        let segs: Vec<Segment> = build_segments(&[], SeqNum::new(5)).collect();
        assert_eq!(segs, vec![Segment::data(SeqNum::new(5), vec![], true)]);
    }

    #[test]
    fn build_segments_wraps_sequence_numbers() {
        let data = vec![0u8; DATA_CHUNK_SIZE * 2];
        let segs: Vec<Segment> = build_segments(&data, SeqNum::new(SEQ_SPACE - 1)).collect();
        assert_eq!(segs[0].seq.value(), SEQ_SPACE - 1);
        assert_eq!(segs[1].seq, SeqNum::ZERO);
    }
}
