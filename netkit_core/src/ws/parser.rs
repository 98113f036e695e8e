//! Incremental RFC 6455 frame parser.
//!
//! [`FrameParser::push`] accepts a chunk of bytes read off the transport
//! and returns every frame that chunk completed — zero, one, or several.
//! [`MessageAssembler`] sits on top to reassemble a fragmented data
//! message from its CONTINUATION frames while passing control frames
//! through immediately, so a PING can interrupt a long fragmented upload
//! and still get a prompt PONG back.

use bytes::BytesMut;

use crate::error::WsError;
use crate::ws::frame::{mask_unmask, Opcode, WebSocketFrame};
use crate::ws::serializer::Role;

/// Attempts to parse exactly one frame from the front of `buf`. Returns
/// `Ok(None)` if `buf` doesn't yet hold a complete frame.
fn try_parse_one(buf: &[u8], role: Role) -> Result<Option<(usize, WebSocketFrame)>, WsError> {
    if buf.len() < 2 {
        return Ok(None);
    }
    let byte0 = buf[0];
    let byte1 = buf[1];

    let fin = byte0 & 0x80 != 0;
    let rsv1 = byte0 & 0x40 != 0;
    let rsv2 = byte0 & 0x20 != 0;
    let rsv3 = byte0 & 0x10 != 0;
    if rsv1 || rsv2 || rsv3 {
        return Err(WsError::ReservedBitSet);
    }
    let opcode = Opcode::from_u8(byte0 & 0x0F).ok_or(WsError::UnknownOpcode(byte0 & 0x0F))?;

    let masked = byte1 & 0x80 != 0;
    // Server must receive masked frames; client must receive unmasked ones.
    let expected_masked = role == Role::Server;
    if masked != expected_masked {
        return Err(WsError::MaskPolicyViolation);
    }

    let len7 = byte1 & 0x7F;
    let mut cursor = 2usize;
    let payload_len: u64 = match len7 {
        126 => {
            if buf.len() < cursor + 2 {
                return Ok(None);
            }
            let n = u16::from_be_bytes([buf[cursor], buf[cursor + 1]]) as u64;
            cursor += 2;
            n
        }
        127 => {
            if buf.len() < cursor + 8 {
                return Ok(None);
            }
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&buf[cursor..cursor + 8]);
            cursor += 8;
            u64::from_be_bytes(raw)
        }
        n => n as u64,
    };

    if opcode.is_control() && (!fin || payload_len > 125) {
        return Err(if !fin {
            WsError::FragmentedControlFrame
        } else {
            WsError::ControlFrameTooLarge
        });
    }

    let mask_key = if masked {
        if buf.len() < cursor + 4 {
            return Ok(None);
        }
        let mut key = [0u8; 4];
        key.copy_from_slice(&buf[cursor..cursor + 4]);
        cursor += 4;
        Some(key)
    } else {
        None
    };

    let payload_len = payload_len as usize;
    if buf.len() < cursor + payload_len {
        return Ok(None);
    }
    let mut payload = buf[cursor..cursor + payload_len].to_vec();
    if let Some(key) = mask_key {
        mask_unmask(&mut payload, key);
    }
    cursor += payload_len;

    Ok(Some((
        cursor,
        WebSocketFrame {
            fin,
            rsv1,
            rsv2,
            rsv3,
            opcode,
            masked,
            mask_key,
            payload,
        },
    )))
}

/// Streaming frame parser bound to one connection.
pub struct FrameParser {
    buf: BytesMut,
    role: Role,
}

impl FrameParser {
    pub fn new(role: Role) -> Self {
        Self {
            buf: BytesMut::new(),
            role,
        }
    }

    /// Feeds a chunk of bytes and drains every frame it completes. A
    /// parse error poisons the buffer — subsequent calls keep failing
    /// until the caller tears the connection down, since a RFC 6455
    /// parse failure always ends the session with a CLOSE.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<WebSocketFrame>, WsError> {
        self.buf.extend_from_slice(bytes);
        let mut frames = Vec::new();
        loop {
            match try_parse_one(&self.buf, self.role)? {
                Some((consumed, frame)) => {
                    self.buf.advance_to(consumed);
                    frames.push(frame);
                }
                None => return Ok(frames),
            }
        }
    }
}

/// `BytesMut` doesn't expose a plain "drop the first N bytes" call under
/// that name; this is the idiomatic spelling via `split_to`.
trait AdvanceTo {
    fn advance_to(&mut self, n: usize);
}

impl AdvanceTo for BytesMut {
    fn advance_to(&mut self, n: usize) {
        let _ = self.split_to(n);
    }
}

/// Reassembles fragmented data messages from individual frames.
/// Control frames interleaved mid-fragmentation are forwarded immediately.
#[derive(Default)]
pub struct MessageAssembler {
    pending_opcode: Option<Opcode>,
    pending_payload: Vec<u8>,
}

/// What a caller sees out of the assembler for one input frame.
pub enum Delivery {
    /// A control frame, delivered as-is ahead of any in-progress fragment.
    Control(WebSocketFrame),
    /// A complete data message (opcode + combined payload).
    Message(Opcode, Vec<u8>),
    /// A fragment was buffered; nothing to deliver yet.
    Pending,
}

impl MessageAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one frame in, returning what (if anything) is now deliverable.
    /// A completed TEXT message whose payload isn't valid UTF-8 is rejected
    /// with [`WsError::InvalidUtf8`] rather than delivered.
    pub fn accept(&mut self, frame: WebSocketFrame) -> Result<Delivery, WsError> {
        if frame.is_control() {
            return Ok(Delivery::Control(frame));
        }
        let delivery = match frame.opcode {
            Opcode::Continuation => {
                self.pending_payload.extend_from_slice(&frame.payload);
                if frame.fin {
                    let opcode = self.pending_opcode.take().unwrap_or(Opcode::Binary);
                    let payload = std::mem::take(&mut self.pending_payload);
                    Delivery::Message(opcode, payload)
                } else {
                    Delivery::Pending
                }
            }
            data_opcode => {
                if frame.fin {
                    Delivery::Message(data_opcode, frame.payload)
                } else {
                    self.pending_opcode = Some(data_opcode);
                    self.pending_payload = frame.payload;
                    Delivery::Pending
                }
            }
        };
        if let Delivery::Message(Opcode::Text, payload) = &delivery {
            if std::str::from_utf8(payload).is_err() {
                return Err(WsError::InvalidUtf8);
            }
        }
        Ok(delivery)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::serializer::write_frame;

    #[test]
    fn masked_text_frame_unmasks_to_expected_payload() {
        // "Hello" masked with key 0x37fa213d.
        let mask = [0x37, 0xfa, 0x21, 0x3d];
        let mut payload = b"Hello".to_vec();
        mask_unmask(&mut payload, mask);
        let mut raw = vec![0x81, 0x85];
        raw.extend_from_slice(&mask);
        raw.extend_from_slice(&payload);

        let mut parser = FrameParser::new(Role::Server);
        let frames = parser.push(&raw).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload, b"Hello");
    }

    #[test]
    fn reserved_bit_is_rejected() {
        let mut parser = FrameParser::new(Role::Server);
        let err = parser.push(&[0xC1, 0x80, 0, 0, 0, 0]).unwrap_err();
        assert_eq!(err, WsError::ReservedBitSet);
    }

    #[test]
    fn server_rejects_unmasked_client_frame() {
        let mut parser = FrameParser::new(Role::Server);
        let err = parser.push(&[0x81, 0x02, b'h', b'i']).unwrap_err();
        assert_eq!(err, WsError::MaskPolicyViolation);
    }

    #[test]
    fn fragmented_control_frame_is_rejected() {
        let mut parser = FrameParser::new(Role::Client);
        // PING (0x9) with fin=0 is illegal.
        let err = parser.push(&[0x09, 0x00]).unwrap_err();
        assert_eq!(err, WsError::FragmentedControlFrame);
    }

    #[test]
    fn oversized_control_frame_is_rejected() {
        let mut parser = FrameParser::new(Role::Client);
        let err = parser.push(&[0x89, 126, 0, 126]).unwrap_err();
        assert_eq!(err, WsError::ControlFrameTooLarge);
    }

    #[test]
    fn streams_across_arbitrary_chunk_boundaries() {
        let frame = WebSocketFrame::text("hello world");
        let bytes = write_frame(&frame, Role::Server);

        let mut whole = FrameParser::new(Role::Client);
        let all_at_once = whole.push(&bytes).unwrap();

        let mut byte_at_a_time = FrameParser::new(Role::Client);
        let mut collected = Vec::new();
        for b in &bytes {
            collected.extend(byte_at_a_time.push(std::slice::from_ref(b)).unwrap());
        }

        assert_eq!(all_at_once, collected);
        assert_eq!(all_at_once[0].payload, b"hello world");
    }

    #[test]
    fn multiple_frames_from_one_push() {
        let a = write_frame(&WebSocketFrame::text("a"), Role::Server);
        let b = write_frame(&WebSocketFrame::text("b"), Role::Server);
        let mut combined = a.clone();
        combined.extend_from_slice(&b);

        let mut parser = FrameParser::new(Role::Client);
        let frames = parser.push(&combined).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].payload, b"a");
        assert_eq!(frames[1].payload, b"b");
    }

    #[test]
    fn control_frame_delivered_before_fragment_continuation() {
        let mut assembler = MessageAssembler::new();
        let first = WebSocketFrame::new(Opcode::Text, b"hel".to_vec()).fragment_marker(false);
        assert!(matches!(assembler.accept(first).unwrap(), Delivery::Pending));

        let ping = WebSocketFrame::ping(vec![]);
        assert!(matches!(assembler.accept(ping).unwrap(), Delivery::Control(_)));

        let rest = WebSocketFrame::new(Opcode::Continuation, b"lo".to_vec());
        match assembler.accept(rest).unwrap() {
            Delivery::Message(Opcode::Text, payload) => assert_eq!(payload, b"hello"),
            _ => panic!("expected reassembled message"),
        }
    }

    #[test]
    fn payload_length_boundaries_125_126_127() {
        for len in [125usize, 126, 127, 65535, 65536] {
            let frame = WebSocketFrame::binary(vec![7u8; len]);
            let bytes = write_frame(&frame, Role::Server);
            let mut parser = FrameParser::new(Role::Client);
            let frames = parser.push(&bytes).unwrap();
            assert_eq!(frames[0].payload.len(), len, "length {len}");
        }
    }
}
