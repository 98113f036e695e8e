//! WebSocket frame serialization.
//!
//! Server-originated frames are always unmasked; client-originated frames
//! are always masked with a fresh, cryptographically-random key, per
//! RFC 6455's client-to-server masking requirement. Length encoding always
//! picks the shortest legal form.

use rand::RngCore;

use crate::ws::frame::WebSocketFrame;

/// Which side of the connection is producing this frame — determines the
/// mask policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}

/// Serializes `frame` for sending as `role`. Server frames are sent
/// unmasked; client frames are masked with a freshly generated key
/// (overriding whatever `frame.masked`/`frame.mask_key` held).
pub fn write_frame(frame: &WebSocketFrame, role: Role) -> Vec<u8> {
    let mut out = Vec::with_capacity(frame.payload.len() + 14);

    let mut byte0 = frame.opcode.as_u8();
    if frame.fin {
        byte0 |= 0x80;
    }
    if frame.rsv1 {
        byte0 |= 0x40;
    }
    if frame.rsv2 {
        byte0 |= 0x20;
    }
    if frame.rsv3 {
        byte0 |= 0x10;
    }
    out.push(byte0);

    let masked = role == Role::Client;
    let len = frame.payload.len();
    let mask_bit = if masked { 0x80 } else { 0x00 };
    if len <= 125 {
        out.push(mask_bit | len as u8);
    } else if len <= 0xFFFF {
        out.push(mask_bit | 126);
        out.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        out.push(mask_bit | 127);
        out.extend_from_slice(&(len as u64).to_be_bytes());
    }

    let mut payload = frame.payload.clone();
    if masked {
        let mut key = [0u8; 4];
        rand::rng().fill_bytes(&mut key);
        out.extend_from_slice(&key);
        super::frame::mask_unmask(&mut payload, key);
    }
    out.extend_from_slice(&payload);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::frame::Opcode;

    #[test]
    fn server_frames_are_never_masked() {
        let frame = WebSocketFrame::text("hi");
        let bytes = write_frame(&frame, Role::Server);
        assert_eq!(bytes[1] & 0x80, 0);
    }

    #[test]
    fn client_frames_are_always_masked() {
        let frame = WebSocketFrame::text("hi");
        let bytes = write_frame(&frame, Role::Client);
        assert_eq!(bytes[1] & 0x80, 0x80);
        assert_eq!(bytes.len(), 2 + 4 + 2); // header + mask key + payload
    }

    #[test]
    fn length_encoding_is_shortest_legal_form() {
        let short = write_frame(&WebSocketFrame::binary(vec![0u8; 125]), Role::Server);
        assert_eq!(short[1] & 0x7F, 125);

        let mid = write_frame(&WebSocketFrame::binary(vec![0u8; 126]), Role::Server);
        assert_eq!(mid[1] & 0x7F, 126);
        assert_eq!(u16::from_be_bytes([mid[2], mid[3]]), 126);

        let wide = write_frame(&WebSocketFrame::binary(vec![0u8; 70_000]), Role::Server);
        assert_eq!(wide[1] & 0x7F, 127);

        let boundary = write_frame(&WebSocketFrame::binary(vec![0u8; 65535]), Role::Server);
        assert_eq!(boundary[1] & 0x7F, 126);
    }

    #[test]
    fn ping_frame_carries_opcode_and_payload() {
        let ping = WebSocketFrame::ping(vec![0xDE, 0xAD, 0xBE, 0xEF]);
        let bytes = write_frame(&ping, Role::Server);
        assert_eq!(bytes[0] & 0x0F, Opcode::Ping.as_u8());
        assert_eq!(&bytes[2..], &[0xDE, 0xAD, 0xBE, 0xEF]);
    }
}
