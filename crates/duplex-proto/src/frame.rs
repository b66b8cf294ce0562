use crate::{crc::crc16_arc, error::ProtoError};

/// Leading byte of every encoded-frame header.
pub const FRAME_MAGIC: u8 = 0xFE;

/// `magic(1) + seq_no(4) + timestamp(4) + crc16(2) + frame_size(4)`.
pub const FRAME_HEADER_LEN: usize = 15;

/// `seq_no(4) + timestamp(4)` — the user header carried on each captured
/// YUV frame handed to the encoder.
pub const YUV_HEADER_LEN: usize = 8;

/// Decoded form of the 15-byte wire header that precedes every encoded
/// frame on the data channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub seq_no: u32,
    pub timestamp: u32,
    pub crc16: u16,
    pub frame_size: u32,
}

impl FrameHeader {
    /// Parses a header out of `buf`. `buf` must be at least
    /// [`FRAME_HEADER_LEN`] bytes; a short buffer is [`ProtoError::Truncated`],
    /// a leading byte other than [`FRAME_MAGIC`] is [`ProtoError::BadMagic`]
    /// and must be treated as a protocol-malformed, session-ending error by
    /// the caller.
    pub fn decode(buf: &[u8]) -> Result<Self, ProtoError> {
        if buf.len() < FRAME_HEADER_LEN {
            return Err(ProtoError::Truncated { need: FRAME_HEADER_LEN, got: buf.len() });
        }
        if buf[0] != FRAME_MAGIC {
            return Err(ProtoError::BadMagic(buf[0]));
        }

        let seq_no = u32::from_be_bytes(buf[1..5].try_into().unwrap());
        let timestamp = u32::from_be_bytes(buf[5..9].try_into().unwrap());
        let crc16 = u16::from_be_bytes(buf[9..11].try_into().unwrap());
        let frame_size = u32::from_be_bytes(buf[11..15].try_into().unwrap());

        Ok(Self { seq_no, timestamp, crc16, frame_size })
    }

    /// Appends the 15-byte header for `payload` to `out`, in the same field
    /// order the original writes them: magic, seq_no, timestamp, a CRC slot
    /// filled last, then frame_size. The CRC is computed over `payload` only.
    pub fn encode_into(seq_no: u32, timestamp: u32, payload: &[u8], out: &mut Vec<u8>) {
        out.reserve(FRAME_HEADER_LEN);
        out.push(FRAME_MAGIC);
        out.extend_from_slice(&seq_no.to_be_bytes());
        out.extend_from_slice(&timestamp.to_be_bytes());
        let crc = crc16_arc(payload);
        out.extend_from_slice(&crc.to_be_bytes());
        let frame_size = u32::try_from(payload.len()).expect("frame payload exceeds u32 range");
        out.extend_from_slice(&frame_size.to_be_bytes());
    }

    /// Checks `payload` against the CRC carried in this header. A mismatch
    /// is a soft protocol error per the transport's error taxonomy: callers
    /// log it and keep the session alive, they do not tear it down.
    pub fn crc_matches(&self, payload: &[u8]) -> bool {
        crc16_arc(payload) == self.crc16
    }
}

/// The 8-byte user header carried ahead of raw YUV frame data as it moves
/// from the capture thread to the encoder thread through the ring buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct YuvHeader {
    pub seq_no: u32,
    pub timestamp: u32,
}

impl YuvHeader {
    pub fn encode_into(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.seq_no.to_be_bytes());
        out.extend_from_slice(&self.timestamp.to_be_bytes());
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtoError> {
        if buf.len() < YUV_HEADER_LEN {
            return Err(ProtoError::Truncated { need: YUV_HEADER_LEN, got: buf.len() });
        }
        Ok(Self {
            seq_no: u32::from_be_bytes(buf[0..4].try_into().unwrap()),
            timestamp: u32::from_be_bytes(buf[4..8].try_into().unwrap()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips_and_is_big_endian() {
        let payload = b"some encoded frame bytes";
        let mut buf = Vec::new();
        FrameHeader::encode_into(7, 0x0102_0304, payload, &mut buf);
        buf.extend_from_slice(payload);

        assert_eq!(buf.len(), FRAME_HEADER_LEN + payload.len());
        assert_eq!(buf[0], FRAME_MAGIC);
        // seq_no is big-endian: 7 == 0x00000007
        assert_eq!(&buf[1..5], &[0, 0, 0, 7]);
        // timestamp is big-endian
        assert_eq!(&buf[5..9], &[0x01, 0x02, 0x03, 0x04]);

        let header = FrameHeader::decode(&buf[..FRAME_HEADER_LEN]).unwrap();
        assert_eq!(header.seq_no, 7);
        assert_eq!(header.timestamp, 0x0102_0304);
        assert_eq!(header.frame_size as usize, payload.len());
        assert!(header.crc_matches(payload));
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut buf = vec![0u8; FRAME_HEADER_LEN];
        buf[0] = 0x00;
        assert_eq!(FrameHeader::decode(&buf), Err(ProtoError::BadMagic(0x00)));
    }

    #[test]
    fn truncated_header_is_rejected() {
        let buf = vec![FRAME_MAGIC; FRAME_HEADER_LEN - 1];
        assert_eq!(FrameHeader::decode(&buf), Err(ProtoError::Truncated { need: FRAME_HEADER_LEN, got: FRAME_HEADER_LEN - 1 }));
    }

    #[test]
    fn crc_mismatch_does_not_panic_or_err() {
        let mut buf = Vec::new();
        FrameHeader::encode_into(1, 1, b"hello", &mut buf);
        let mut header = FrameHeader::decode(&buf[..FRAME_HEADER_LEN]).unwrap();
        header.crc16 ^= 0xFFFF;
        assert!(!header.crc_matches(b"hello"));
    }

    #[test]
    fn yuv_header_round_trips() {
        let header = YuvHeader { seq_no: 42, timestamp: 99 };
        let mut buf = Vec::new();
        header.encode_into(&mut buf);
        assert_eq!(buf.len(), YUV_HEADER_LEN);
        assert_eq!(YuvHeader::decode(&buf).unwrap(), header);
    }
}
