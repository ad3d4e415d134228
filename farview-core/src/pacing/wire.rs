//! Raw event records the core emits without the general marshaller.
//!
//! ## Wire format (all little-endian)
//!
//! ```text
//! object_id: u32  (offset 0)
//! opcode:    u16  (offset 4)
//! size:      u16  (offset 6)   total record bytes, header included
//! payload:   u32  (offset 8)   absent for buffer release
//! ```
//!
//! | Record          | Object           | Opcode | Size | Payload             |
//! |-----------------|------------------|--------|------|---------------------|
//! | callback done   | callback id      | 0      | 12   | timestamp (ms, u32) |
//! | display delete  | 1 (display)      | 1      | 12   | deleted object id   |
//! | buffer release  | buffer id        | 0      | 8    | none                |

use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::Encoder;

use crate::error::FarviewError;
use crate::native::DISPLAY_OBJECT_ID;

/// Size of the fixed `object_id + opcode + size` header.
pub const HEADER_SIZE: usize = 8;

/// One event record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireEvent {
    /// `wl_callback.done(timestamp)` on a frame callback.
    FrameDone { callback_id: u32, timestamp: u32 },
    /// `wl_display.delete_id(id)` on the root object.
    DeleteId { id: u32 },
    /// `wl_buffer.release` on a buffer.
    BufferRelease { buffer_id: u32 },
}

impl WireEvent {
    /// Encoded size of this record in bytes.
    pub const fn size(&self) -> usize {
        match self {
            WireEvent::FrameDone { .. } | WireEvent::DeleteId { .. } => HEADER_SIZE + 4,
            WireEvent::BufferRelease { .. } => HEADER_SIZE,
        }
    }

    const fn object_id(&self) -> u32 {
        match self {
            WireEvent::FrameDone { callback_id, .. } => *callback_id,
            WireEvent::DeleteId { .. } => DISPLAY_OBJECT_ID,
            WireEvent::BufferRelease { buffer_id } => *buffer_id,
        }
    }

    const fn opcode(&self) -> u16 {
        match self {
            WireEvent::FrameDone { .. } | WireEvent::BufferRelease { .. } => 0,
            WireEvent::DeleteId { .. } => 1,
        }
    }

    /// Append this record to `dst`.
    pub fn encode_into(&self, dst: &mut BytesMut) {
        dst.reserve(self.size());
        dst.put_u32_le(self.object_id());
        dst.put_u16_le(self.opcode());
        dst.put_u16_le(self.size() as u16);
        match self {
            WireEvent::FrameDone { timestamp, .. } => dst.put_u32_le(*timestamp),
            WireEvent::DeleteId { id } => dst.put_u32_le(*id),
            WireEvent::BufferRelease { .. } => {}
        }
    }
}

/// The done + delete-id pair retiring one frame callback, as one send.
pub fn frame_done_records(callback_id: u32, timestamp: u32) -> Bytes {
    let mut buf = BytesMut::with_capacity(24);
    WireEvent::FrameDone {
        callback_id,
        timestamp,
    }
    .encode_into(&mut buf);
    WireEvent::DeleteId { id: callback_id }.encode_into(&mut buf);
    buf.freeze()
}

/// The single buffer-release record for `buffer_id`.
pub fn buffer_release_record(buffer_id: u32) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_SIZE);
    WireEvent::BufferRelease { buffer_id }.encode_into(&mut buf);
    buf.freeze()
}

/// Framed-sink encoder for [`WireEvent`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct EventCodec;

impl Encoder<WireEvent> for EventCodec {
    type Error = FarviewError;

    fn encode(&mut self, item: WireEvent, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.encode_into(dst);
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────
