//! Wire framing for calls and replies. Runs on top of TCP.
//!
//! Every frame looks like this:
//!
//! 0xAA55<kind u8><seq u32><len u32><body: len bytes><crc16 u16>
//!
//! All integers are big-endian. The crc is calculated over everything excluding the header magic
//! (and excluding the crc of course!).
//!
//! A call body is `Service.Method`, a 0x0 separator, then the JSON encoded arguments. A reply body
//! is the JSON encoded result. An error body is the UTF-8 error text.

use byteorder::{BigEndian, ByteOrder};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use crc::{Crc, CRC_16_IBM_SDLC};
use futures::future::Either;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtocolError;

/// Frame start marker, 0xAA55.
pub const HDR: u16 = 0b1010_1010_0101_0101;

/// Largest call body the server accepts. Larger announcements are treated as garbage.
pub const MAX_CALL_LEN: u32 = 16 * 1024 * 1024;
/// Replies carry the whole history and are only bounded by the length field.
pub const MAX_REPLY_LEN: u32 = u32::MAX;

const HDR_BYTES: [u8; 2] = [0xAA, 0x55];
/// magic + kind + seq + len
const PREAMBLE_LEN: usize = 2 + 1 + 4 + 4;
const CRC_LEN: usize = 2;
const SEPARATOR: u8 = 0x0;

const CHECKSUM: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_SDLC);

/// What a frame carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Call,
    Reply,
    Error,
}

const FRAME_KINDS: [(FrameKind, u8); 3] = [
    (FrameKind::Call, 0),
    (FrameKind::Reply, 1),
    (FrameKind::Error, 2),
];

impl FrameKind {
    pub fn id(self) -> u8 {
        FRAME_KINDS
            .iter()
            .find(|(kind, _)| *kind == self)
            .map(|(_, id)| *id)
            .unwrap_or_default()
    }

    pub fn from_id(id: u8) -> Option<FrameKind> {
        FRAME_KINDS
            .iter()
            .find(|(_, kind_id)| *kind_id == id)
            .map(|(kind, _)| *kind)
    }
}

/// One unit on the wire. Replies and errors echo the `seq` of the call they answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    pub seq: u32,
    pub body: Bytes,
}

impl Frame {
    pub fn call(seq: u32, method: &str, args: &[u8]) -> Frame {
        let mut body = BytesMut::with_capacity(method.len() + 1 + args.len());
        body.put_slice(method.as_bytes());
        body.put_u8(SEPARATOR);
        body.put_slice(args);
        Frame {
            kind: FrameKind::Call,
            seq,
            body: body.freeze(),
        }
    }

    pub fn reply(seq: u32, body: impl Into<Bytes>) -> Frame {
        Frame {
            kind: FrameKind::Reply,
            seq,
            body: body.into(),
        }
    }

    pub fn error(seq: u32, text: &str) -> Frame {
        Frame {
            kind: FrameKind::Error,
            seq,
            body: Bytes::copy_from_slice(text.as_bytes()),
        }
    }

    /// Split a call body into its method name and argument bytes.
    pub fn split_call(&self) -> Result<(&str, &[u8]), ProtocolError> {
        let idx = self
            .body
            .iter()
            .position(|byte| *byte == SEPARATOR)
            .ok_or(ProtocolError::MissingSeparator)?;
        let method =
            std::str::from_utf8(&self.body[..idx]).map_err(|_| ProtocolError::BadMethodName)?;
        Ok((method, &self.body[idx + 1..]))
    }

    /// Error frame text, lossily decoded.
    pub fn error_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// A frame that could be delimited but not trusted. The connection survives it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub seq: u32,
    pub reason: String,
}

#[derive(Debug, Clone, Copy)]
enum ParseState {
    Init,
    Body { kind: u8, seq: u32, len: u32 },
}

fn checksum(kind: u8, seq: u32, body: &[u8]) -> u16 {
    let mut preamble = [0u8; 9];
    preamble[0] = kind;
    BigEndian::write_u32(&mut preamble[1..5], seq);
    BigEndian::write_u32(&mut preamble[5..9], body.len() as u32);
    let mut digest = CHECKSUM.digest();
    digest.update(&preamble);
    digest.update(body);
    digest.finalize()
}

/// Decodes and encodes [`Frame`]s. One codec per connection.
///
/// The size limit only applies to decoding. Outbound frames may use the full length field.
#[derive(Debug)]
pub struct FrameCodec {
    state: ParseState,
    max_inbound: u32,
}

impl FrameCodec {
    /// Server side codec: inbound calls are capped at [`MAX_CALL_LEN`].
    pub fn new() -> FrameCodec {
        FrameCodec::with_max_inbound(MAX_CALL_LEN)
    }

    /// Client side codec: inbound replies are capped at [`MAX_REPLY_LEN`].
    pub fn for_replies() -> FrameCodec {
        FrameCodec::with_max_inbound(MAX_REPLY_LEN)
    }

    pub fn with_max_inbound(max_inbound: u32) -> FrameCodec {
        FrameCodec {
            state: ParseState::Init,
            max_inbound,
        }
    }

    /// Find the start of a frame and read its preamble. `Ok(false)` means more bytes are needed.
    fn parse_init(&mut self, buf: &mut BytesMut) -> Result<bool, ProtocolError> {
        match buf.windows(2).position(|window| window == &HDR_BYTES[..]) {
            None => {
                // keep a trailing 0xAA, it may be the first half of the magic
                let keep = usize::from(buf.last() == Some(&HDR_BYTES[0]));
                let skipped = buf.len() - keep;
                if skipped > 0 {
                    log::debug!("discarding {} bytes with no frame header", skipped);
                    buf.advance(skipped);
                }
                return Ok(false);
            }
            Some(0) => {}
            Some(idx) => {
                log::debug!("discarding {} bytes before frame header", idx);
                buf.advance(idx);
            }
        }

        if buf.len() < PREAMBLE_LEN {
            buf.reserve(PREAMBLE_LEN - buf.len());
            return Ok(false);
        }

        let kind = buf[2];
        let seq = BigEndian::read_u32(&buf[3..7]);
        let len = BigEndian::read_u32(&buf[7..11]);
        if len > self.max_inbound {
            return Err(ProtocolError::FrameTooLarge {
                len,
                max: self.max_inbound,
            });
        }
        buf.advance(PREAMBLE_LEN);
        self.state = ParseState::Body { kind, seq, len };
        Ok(true)
    }

    fn parse_body(
        &mut self,
        buf: &mut BytesMut,
        kind: u8,
        seq: u32,
        len: u32,
    ) -> Option<Either<Frame, Fault>> {
        let needed = len as usize + CRC_LEN;
        if buf.len() < needed {
            buf.reserve(needed - buf.len());
            return None;
        }

        let body = buf.split_to(len as usize).freeze();
        let crc = BigEndian::read_u16(&buf[..CRC_LEN]);
        buf.advance(CRC_LEN);
        self.state = ParseState::Init;

        if checksum(kind, seq, &body) != crc {
            return Some(Either::Right(Fault {
                seq,
                reason: "CRC check failed".to_string(),
            }));
        }
        match FrameKind::from_id(kind) {
            Some(kind) => Some(Either::Left(Frame { kind, seq, body })),
            None => Some(Either::Right(Fault {
                seq,
                reason: format!("unknown frame kind {}", kind),
            })),
        }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        FrameCodec::new()
    }
}

/// Take in a byte encoding of a frame, return the frame, or a fault when the frame was delimited
/// but failed its checks.
impl Decoder for FrameCodec {
    type Item = Either<Frame, Fault>;
    type Error = ProtocolError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                ParseState::Init => {
                    if !self.parse_init(buf)? {
                        return Ok(None);
                    }
                }
                ParseState::Body { kind, seq, len } => {
                    return Ok(self.parse_body(buf, kind, seq, len));
                }
            }
        }
    }
}

/// Takes in a frame, outputs its byte encoding.
impl Encoder<Frame> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let len = u32::try_from(item.body.len()).map_err(|_| ProtocolError::FrameTooLarge {
            len: u32::MAX,
            max: MAX_REPLY_LEN,
        })?;
        let kind = item.kind.id();

        let mut preamble = [0u8; PREAMBLE_LEN];
        BigEndian::write_u16(&mut preamble[0..2], HDR);
        preamble[2] = kind;
        BigEndian::write_u32(&mut preamble[3..7], item.seq);
        BigEndian::write_u32(&mut preamble[7..11], len);

        let mut crc = [0u8; CRC_LEN];
        BigEndian::write_u16(&mut crc, checksum(kind, item.seq, &item.body));

        dst.reserve(PREAMBLE_LEN + item.body.len() + CRC_LEN);
        dst.put_slice(&preamble);
        dst.put_slice(&item.body);
        dst.put_slice(&crc);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(frame: Frame) -> BytesMut {
        let mut buf = BytesMut::new();
        FrameCodec::new().encode(frame, &mut buf).unwrap();
        buf
    }

    fn expect_frame(item: Option<Either<Frame, Fault>>) -> Frame {
        match item {
            Some(Either::Left(frame)) => frame,
            other => panic!("expected a frame, got {:?}", other),
        }
    }

    #[test]
    fn header_is_aa55() {
        assert_eq!(HDR, 0xAA55);
        let buf = encoded(Frame::reply(7, Bytes::from_static(b"{}")));
        assert_eq!(&buf[..2], &HDR_BYTES);
        assert_eq!(buf.len(), PREAMBLE_LEN + 2 + CRC_LEN);
    }

    #[test]
    fn call_frame_survives_the_wire() {
        let frame = Frame::call(3, "ChatService.SendMessage", br#"{"sender":"alice"}"#);
        let mut buf = encoded(frame.clone());
        let decoded = expect_frame(FrameCodec::new().decode(&mut buf).unwrap());
        assert_eq!(decoded, frame);
        assert!(buf.is_empty());

        let (method, args) = decoded.split_call().unwrap();
        assert_eq!(method, "ChatService.SendMessage");
        assert_eq!(args, br#"{"sender":"alice"}"#);
    }

    #[test]
    fn partial_frame_waits_for_more_bytes() {
        let full = encoded(Frame::error(1, "nope"));
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();

        for byte in &full[..full.len() - 1] {
            buf.put_u8(*byte);
            assert!(codec.decode(&mut buf).unwrap().is_none());
        }
        buf.put_u8(full[full.len() - 1]);
        let frame = expect_frame(codec.decode(&mut buf).unwrap());
        assert_eq!(frame.kind, FrameKind::Error);
        assert_eq!(frame.error_text(), "nope");
    }

    #[test]
    fn garbage_before_header_is_skipped() {
        let mut buf = BytesMut::from(&b"hello\xAA"[..]);
        buf.extend_from_slice(&encoded(Frame::reply(9, Bytes::from_static(b"[]"))));
        let frame = expect_frame(FrameCodec::new().decode(&mut buf).unwrap());
        assert_eq!(frame.seq, 9);
    }

    #[test]
    fn bad_crc_is_a_fault_not_an_error() {
        let mut buf = encoded(Frame::reply(5, Bytes::from_static(b"abc")));
        let body_start = PREAMBLE_LEN;
        buf[body_start] ^= 0xFF;
        buf.extend_from_slice(&encoded(Frame::reply(6, Bytes::from_static(b"def"))));

        let mut codec = FrameCodec::new();
        match codec.decode(&mut buf).unwrap() {
            Some(Either::Right(fault)) => {
                assert_eq!(fault.seq, 5);
                assert_eq!(fault.reason, "CRC check failed");
            }
            other => panic!("expected a fault, got {:?}", other),
        }
        // the stream stays aligned on the next frame
        assert_eq!(expect_frame(codec.decode(&mut buf).unwrap()).seq, 6);
    }

    #[test]
    fn unknown_kind_is_a_fault() {
        let body = b"x";
        let mut buf = BytesMut::new();
        buf.put_u16(HDR);
        buf.put_u8(42);
        buf.put_u32(11);
        buf.put_u32(1);
        buf.put_slice(body);
        buf.put_u16(checksum(42, 11, body));

        match FrameCodec::new().decode(&mut buf).unwrap() {
            Some(Either::Right(fault)) => assert_eq!(fault.seq, 11),
            other => panic!("expected a fault, got {:?}", other),
        }
    }

    #[test]
    fn oversized_length_is_an_error() {
        let mut buf = BytesMut::new();
        buf.put_u16(HDR);
        buf.put_u8(FrameKind::Reply.id());
        buf.put_u32(1);
        buf.put_u32(MAX_CALL_LEN + 1);

        let err = FrameCodec::new().decode(&mut buf).unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooLarge { .. }));
    }

    #[test]
    fn replies_may_exceed_the_call_limit() {
        let body = vec![b'x'; MAX_CALL_LEN as usize + 1];
        let mut buf = BytesMut::new();
        FrameCodec::new()
            .encode(Frame::reply(4, body.clone()), &mut buf)
            .unwrap();

        let frame = expect_frame(FrameCodec::for_replies().decode(&mut buf).unwrap());
        assert_eq!(frame.seq, 4);
        assert_eq!(frame.body.len(), body.len());
    }

    #[test]
    fn call_without_separator_is_rejected() {
        let frame = Frame {
            kind: FrameKind::Call,
            seq: 1,
            body: Bytes::from_static(b"ChatService.SendMessage"),
        };
        assert!(matches!(
            frame.split_call(),
            Err(ProtocolError::MissingSeparator)
        ));
    }
}
