//! WebSocket framing (RFC 6455).

pub mod frame;
pub mod parser;
pub mod serializer;

pub use frame::{mask_unmask, Opcode, WebSocketFrame};
pub use parser::{Delivery, FrameParser, MessageAssembler};
pub use serializer::{write_frame, Role};
