//! WebSocket frame codec (RFC 6455 §5.2).
//!
//! Wire format:
//! ```text
//! ┌─────┬─────┬────────┬──────┬─────────────┬──────────────┬────────────┬─────────┐
//! │ FIN │ RSV │ opcode │ MASK │ len (7 bit) │ ext len      │ mask key   │ payload │
//! │ 1 b │ 3 b │ 4 bits │ 1 b  │ 0..=125     │ 0 / 2 / 8 B  │ 0 / 4 B    │ len B   │
//! └─────┴─────┴────────┴──────┴─────────────┴──────────────┴────────────┴─────────┘
//! ```
//!
//! Length marker 126 means a 16-bit big-endian length follows, 127 a 64-bit one.
//! Frames sent by a client are masked, frames sent by a server never are.
//! Continuation frames are decoded but never reassembled.

use crate::error::FrameError;

/// Largest payload length encoded directly in the 7-bit length field.
pub const MAX_DIRECT_LEN: usize = 125;

const LEN_MARKER_16: u8 = 126;
const LEN_MARKER_64: u8 = 127;
const MAX_PAYLOAD_LEN: u64 = i64::MAX as u64;
const FIN_BIT: u8 = 0x80;
const MASK_BIT: u8 = 0x80;

/// Frame opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    Continuation = 0x0,
    Text = 0x1,
    Binary = 0x2,
    Close = 0x8,
    Ping = 0x9,
    Pong = 0xA,
}

impl OpCode {
    /// Close, ping and pong are control frames.
    pub fn is_control(self) -> bool {
        matches!(self, Self::Close | Self::Ping | Self::Pong)
    }
}

impl TryFrom<u8> for OpCode {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x0 => Ok(Self::Continuation),
            0x1 => Ok(Self::Text),
            0x2 => Ok(Self::Binary),
            0x8 => Ok(Self::Close),
            0x9 => Ok(Self::Ping),
            0xA => Ok(Self::Pong),
            other => Err(FrameError::UnknownOpcode(other)),
        }
    }
}

impl From<OpCode> for u8 {
    fn from(value: OpCode) -> Self {
        value as u8
    }
}

/// XOR `payload` in place with the 4-byte mask key.
///
/// Applying the same key twice restores the original bytes.
pub fn apply_mask(payload: &mut [u8], key: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}

/// Parsed frame header, without the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub fin: bool,
    pub opcode: OpCode,
    pub masked: bool,
    pub mask_key: Option<[u8; 4]>,
    /// Announced payload length
    pub payload_len: u64,
    /// Bytes taken by the header (base + extended length + mask key)
    pub header_len: usize,
}

impl FrameHeader {
    /// Parse the header at the start of `buf`.
    pub fn parse(buf: &[u8]) -> Result<Self, FrameError> {
        if buf.len() < 2 {
            return Err(FrameError::InsufficientHeader(buf.len()));
        }

        let fin = buf[0] & FIN_BIT != 0;
        let opcode = OpCode::try_from(buf[0] & 0x0F)?;
        let masked = buf[1] & MASK_BIT != 0;

        let (payload_len, mut offset) = match buf[1] & 0x7F {
            LEN_MARKER_16 => {
                if buf.len() < 4 {
                    return Err(FrameError::TruncatedLength {
                        needed: 2,
                        available: buf.len() - 2,
                    });
                }
                (u64::from(u16::from_be_bytes([buf[2], buf[3]])), 4)
            }
            LEN_MARKER_64 => {
                if buf.len() < 10 {
                    return Err(FrameError::TruncatedLength {
                        needed: 8,
                        available: buf.len() - 2,
                    });
                }
                let mut len = [0u8; 8];
                len.copy_from_slice(&buf[2..10]);
                let len = u64::from_be_bytes(len);
                // Most significant bit must be 0
                if len > MAX_PAYLOAD_LEN {
                    return Err(FrameError::TooLarge {
                        max: usize::try_from(MAX_PAYLOAD_LEN).unwrap_or(usize::MAX),
                        actual: len,
                    });
                }
                (len, 10)
            }
            direct => (u64::from(direct), 2),
        };

        let mask_key = if masked {
            if buf.len() < offset + 4 {
                return Err(FrameError::TruncatedMask {
                    needed: offset + 4,
                    available: buf.len(),
                });
            }
            let key = [buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]];
            offset += 4;
            Some(key)
        } else {
            None
        };

        Ok(Self {
            fin,
            opcode,
            masked,
            mask_key,
            payload_len,
            header_len: offset,
        })
    }

    /// Total encoded length of the frame this header starts.
    pub fn frame_len(&self) -> u64 {
        self.header_len as u64 + self.payload_len
    }
}

/// A single WebSocket frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub fin: bool,
    pub opcode: OpCode,
    pub masked: bool,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Create a final (FIN=1), unmasked frame.
    pub fn new(opcode: OpCode, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            fin: true,
            opcode,
            masked: false,
            payload: payload.into(),
        }
    }

    pub fn text(text: &str) -> Self {
        Self::new(OpCode::Text, text.as_bytes())
    }

    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Self::new(OpCode::Binary, data)
    }

    pub fn close() -> Self {
        Self::new(OpCode::Close, Vec::new())
    }

    pub fn ping(payload: impl Into<Vec<u8>>) -> Self {
        Self::new(OpCode::Ping, payload)
    }

    pub fn pong(payload: impl Into<Vec<u8>>) -> Self {
        Self::new(OpCode::Pong, payload)
    }

    /// Payload as UTF-8 text.
    pub fn text_payload(&self) -> Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(&self.payload)
    }

    /// Encode to wire bytes, masking with a fresh random key when `mask` is set.
    pub fn encode(&self, mask: bool) -> Vec<u8> {
        let key = mask.then(rand::random::<[u8; 4]>);
        self.encode_with_key(key)
    }

    /// Encode to wire bytes with an explicit mask key.
    pub fn encode_with_key(&self, mask_key: Option<[u8; 4]>) -> Vec<u8> {
        let len = self.payload.len();
        let mut out = Vec::with_capacity(len + 14);

        let fin = if self.fin { FIN_BIT } else { 0 };
        out.push(fin | u8::from(self.opcode));

        let mask_bit = if mask_key.is_some() { MASK_BIT } else { 0 };
        if len <= MAX_DIRECT_LEN {
            out.push(mask_bit | len as u8);
        } else if len <= usize::from(u16::MAX) {
            out.push(mask_bit | LEN_MARKER_16);
            out.extend_from_slice(&(len as u16).to_be_bytes());
        } else {
            out.push(mask_bit | LEN_MARKER_64);
            out.extend_from_slice(&(len as u64).to_be_bytes());
        }

        match mask_key {
            Some(key) => {
                out.extend_from_slice(&key);
                let start = out.len();
                out.extend_from_slice(&self.payload);
                apply_mask(&mut out[start..], key);
            }
            None => out.extend_from_slice(&self.payload),
        }

        out
    }

    /// Decode exactly one frame from the start of `buf`, unmasking if needed.
    ///
    /// Bytes after the frame are ignored; use [`Frame::frame_len`] to split a
    /// buffer holding several frames.
    pub fn decode(buf: &[u8]) -> Result<Self, FrameError> {
        let header = FrameHeader::parse(buf)?;

        let available = buf.len() - header.header_len;
        if (available as u64) < header.payload_len {
            return Err(FrameError::TruncatedPayload {
                announced: header.payload_len,
                available,
            });
        }

        let end = header.header_len + header.payload_len as usize;
        let mut payload = buf[header.header_len..end].to_vec();
        if let Some(key) = header.mask_key {
            apply_mask(&mut payload, key);
        }

        Ok(Self {
            fin: header.fin,
            opcode: header.opcode,
            masked: header.masked,
            payload,
        })
    }

    /// Length of the first complete frame in `buf`, or `None` if more bytes are needed.
    pub fn frame_len(buf: &[u8]) -> Result<Option<usize>, FrameError> {
        match FrameHeader::parse(buf) {
            Ok(header) => {
                let total = header.frame_len();
                if buf.len() as u64 >= total {
                    Ok(usize::try_from(total).ok())
                } else {
                    Ok(None)
                }
            }
            Err(e) if e.is_incomplete() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_conversion() {
        assert_eq!(OpCode::try_from(0x0).unwrap(), OpCode::Continuation);
        assert_eq!(OpCode::try_from(0x1).unwrap(), OpCode::Text);
        assert_eq!(OpCode::try_from(0x2).unwrap(), OpCode::Binary);
        assert_eq!(OpCode::try_from(0x8).unwrap(), OpCode::Close);
        assert_eq!(OpCode::try_from(0x9).unwrap(), OpCode::Ping);
        assert_eq!(OpCode::try_from(0xA).unwrap(), OpCode::Pong);
        assert_eq!(OpCode::try_from(0x3), Err(FrameError::UnknownOpcode(0x3)));
        assert_eq!(u8::from(OpCode::Pong), 0xA);
    }

    #[test]
    fn test_opcode_is_control() {
        assert!(OpCode::Close.is_control());
        assert!(OpCode::Ping.is_control());
        assert!(OpCode::Pong.is_control());
        assert!(!OpCode::Text.is_control());
        assert!(!OpCode::Binary.is_control());
        assert!(!OpCode::Continuation.is_control());
    }

    #[test]
    fn test_mask_involution() {
        let payloads: [&[u8]; 4] = [b"", b"a", b"Hello, WebSocket", &[0xFF; 1000]];
        let keys = [[0, 0, 0, 0], [0x37, 0xfa, 0x21, 0x3d], [0xFF, 0x00, 0xAA, 0x55]];

        for payload in payloads {
            for key in keys {
                let mut bytes = payload.to_vec();
                apply_mask(&mut bytes, key);
                apply_mask(&mut bytes, key);
                assert_eq!(bytes, payload);
            }
        }
    }

    #[test]
    fn test_rfc_unmasked_hello() {
        // RFC 6455 §5.7: single-frame unmasked text message
        let wire = [0x81, 0x05, 0x48, 0x65, 0x6c, 0x6c, 0x6f];
        let frame = Frame::decode(&wire).unwrap();
        assert!(frame.fin);
        assert!(!frame.masked);
        assert_eq!(frame.opcode, OpCode::Text);
        assert_eq!(frame.text_payload().unwrap(), "Hello");

        assert_eq!(Frame::text("Hello").encode(false), wire);
    }

    #[test]
    fn test_rfc_masked_hello() {
        // RFC 6455 §5.7: single-frame masked text message
        let wire = [
            0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58,
        ];
        let frame = Frame::decode(&wire).unwrap();
        assert!(frame.masked);
        assert_eq!(frame.text_payload().unwrap(), "Hello");

        let encoded = Frame::text("Hello").encode_with_key(Some([0x37, 0xfa, 0x21, 0x3d]));
        assert_eq!(encoded, wire);
    }

    #[test]
    fn test_length_header_boundaries() {
        // (payload length, expected length byte, expected header length)
        let cases = [
            (0usize, 0u8, 2usize),
            (125, 125, 2),
            (126, 126, 4),
            (65535, 126, 4),
            (65536, 127, 10),
        ];

        for (len, marker, header_len) in cases {
            let payload = vec![0x42; len];
            let encoded = Frame::binary(payload.clone()).encode(false);
            assert_eq!(encoded[1] & 0x7F, marker, "length byte for {len}");
            assert_eq!(encoded.len(), header_len + len);

            let decoded = Frame::decode(&encoded).unwrap();
            assert_eq!(decoded.payload, payload, "payload for {len}");
        }
    }

    #[test]
    fn test_masked_boundaries_roundtrip() {
        for len in [0usize, 125, 126, 65535, 65536] {
            let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let encoded = Frame::binary(payload.clone()).encode(true);
            assert_eq!(encoded[1] & 0x80, 0x80);

            let decoded = Frame::decode(&encoded).unwrap();
            assert!(decoded.masked);
            assert_eq!(decoded.payload, payload);
        }
    }

    #[test]
    fn test_extended_length_is_big_endian() {
        let encoded = Frame::binary(vec![0u8; 300]).encode(false);
        assert_eq!(&encoded[2..4], &[0x01, 0x2C]);

        let encoded = Frame::binary(vec![0u8; 65536]).encode(false);
        assert_eq!(&encoded[2..10], &[0, 0, 0, 0, 0, 1, 0, 0]);
    }

    #[test]
    fn test_first_byte_layout() {
        let encoded = Frame::close().encode(false);
        assert_eq!(encoded, vec![0x88, 0x00]);

        let encoded = Frame::pong(vec![1, 2]).encode(false);
        assert_eq!(encoded[0], 0x8A);
    }

    #[test]
    fn test_decode_insufficient_header() {
        assert_eq!(Frame::decode(&[]), Err(FrameError::InsufficientHeader(0)));
        assert_eq!(Frame::decode(&[0x81]), Err(FrameError::InsufficientHeader(1)));
    }

    #[test]
    fn test_decode_truncated_extended_length() {
        let err = Frame::decode(&[0x82, 126, 0x01]).unwrap_err();
        assert_eq!(err, FrameError::TruncatedLength { needed: 2, available: 1 });

        let err = Frame::decode(&[0x82, 127, 0, 0, 0]).unwrap_err();
        assert_eq!(err, FrameError::TruncatedLength { needed: 8, available: 3 });
    }

    #[test]
    fn test_decode_truncated_mask_and_payload() {
        let err = Frame::decode(&[0x81, 0x85, 0x37, 0xfa]).unwrap_err();
        assert!(matches!(err, FrameError::TruncatedMask { .. }));

        let err = Frame::decode(&[0x81, 0x05, b'H', b'e']).unwrap_err();
        assert_eq!(err, FrameError::TruncatedPayload { announced: 5, available: 2 });
    }

    #[test]
    fn test_decode_unknown_opcode() {
        assert_eq!(Frame::decode(&[0x83, 0x00]), Err(FrameError::UnknownOpcode(0x3)));
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        let mut wire = Frame::text("one").encode(false);
        wire.extend(Frame::text("two").encode(false));

        let frame = Frame::decode(&wire).unwrap();
        assert_eq!(frame.text_payload().unwrap(), "one");
    }

    #[test]
    fn test_frame_len_splits_coalesced_frames() {
        let first = Frame::text("one").encode(true);
        let second = Frame::binary(vec![7u8; 300]).encode(true);
        let mut wire = first.clone();
        wire.extend(&second);

        assert_eq!(Frame::frame_len(&wire).unwrap(), Some(first.len()));
        let rest = &wire[first.len()..];
        assert_eq!(Frame::frame_len(rest).unwrap(), Some(second.len()));
        assert_eq!(Frame::decode(rest).unwrap().payload, vec![7u8; 300]);
    }

    #[test]
    fn test_frame_len_incomplete() {
        let wire = Frame::binary(vec![1u8; 200]).encode(false);
        assert_eq!(Frame::frame_len(&wire[..1]).unwrap(), None);
        assert_eq!(Frame::frame_len(&wire[..3]).unwrap(), None);
        assert_eq!(Frame::frame_len(&wire[..100]).unwrap(), None);
        assert_eq!(Frame::frame_len(&wire).unwrap(), Some(wire.len()));
        assert!(Frame::frame_len(&[0x8F, 0x00]).is_err());
    }

    #[test]
    fn test_frame_len_rejects_length_with_top_bit_set() {
        let wire = [0x82, 127, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];
        assert!(matches!(
            Frame::frame_len(&wire),
            Err(FrameError::TooLarge { actual: u64::MAX, .. })
        ));
        assert!(matches!(FrameHeader::parse(&wire), Err(FrameError::TooLarge { .. })));

        // Largest legal length still parses
        let wire = [0x82, 127, 0x7F, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];
        let header = FrameHeader::parse(&wire).unwrap();
        assert_eq!(header.frame_len(), i64::MAX as u64 + 10);
        assert_eq!(Frame::frame_len(&wire).unwrap(), None);
    }

    #[test]
    fn test_header_parse() {
        let wire = Frame::ping(vec![9u8; 130]).encode_with_key(Some([1, 2, 3, 4]));
        let header = FrameHeader::parse(&wire).unwrap();
        assert_eq!(header.opcode, OpCode::Ping);
        assert!(header.masked);
        assert_eq!(header.mask_key, Some([1, 2, 3, 4]));
        assert_eq!(header.payload_len, 130);
        assert_eq!(header.header_len, 8);
        assert_eq!(header.frame_len(), wire.len() as u64);
    }
}
