//! Wire format for the fixed ARDP header (spec.md §6, "Wire framing").
//!
//! Every datagram begins with this header in network byte order, followed by
//! payload. User-data payloads must fit inside one UDP datagram.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{ArdpError, Result};

pub const HEADER_LEN: usize = 28;
pub const VERSION: u8 = 1;

bitflags::bitflags! {
    /// SYN/ACK/EAK/RST/NUL/FIN, as enumerated in spec.md §3 ("ARDP Connection")
    /// and §6 ("Wire framing").
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Flags: u8 {
        const SYN = 0b0000_0001;
        const ACK = 0b0000_0010;
        const EAK = 0b0000_0100;
        const RST = 0b0000_1000;
        const NUL = 0b0001_0000;
        const FIN = 0b0010_0000;
    }
}

/// The fixed ARDP header. `frag_index`/`frag_count` are meaningful only for
/// user-data segments; control segments (bare SYN/ACK/RST/NUL) leave them at
/// `0`/`1`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ArdpHeader {
    pub flags: Flags,
    pub window: u16,
    pub seq: u32,
    pub ack: u32,
    pub src_conn_id: u32,
    pub dst_conn_id: u32,
    pub frag_index: u16,
    pub frag_count: u16,
}

impl ArdpHeader {
    pub fn encode(&self, payload_len: u16, out: &mut BytesMut) {
        out.reserve(HEADER_LEN);
        out.put_u8((VERSION << 4) & 0xf0);
        out.put_u8(self.flags.bits());
        out.put_u8(0); // reserved (header length in the original wire format; fixed here)
        out.put_u8(0); // padding to a 4-byte boundary
        out.put_u16(payload_len);
        out.put_u16(self.window);
        out.put_u32(self.seq);
        out.put_u32(self.ack);
        out.put_u32(self.src_conn_id);
        out.put_u32(self.dst_conn_id);
        out.put_u16(self.frag_index);
        out.put_u16(self.frag_count);
    }

    pub fn decode(mut buf: Bytes) -> Result<(Self, Bytes)> {
        if buf.len() < HEADER_LEN {
            return Err(ArdpError::MalformedHeader);
        }
        let version_byte = buf.get_u8();
        if version_byte >> 4 != VERSION {
            return Err(ArdpError::MalformedHeader);
        }
        let flags = Flags::from_bits_truncate(buf.get_u8());
        let _reserved = buf.get_u8();
        let _padding = buf.get_u8();
        let payload_len = buf.get_u16();
        let window = buf.get_u16();
        let seq = buf.get_u32();
        let ack = buf.get_u32();
        let src_conn_id = buf.get_u32();
        let dst_conn_id = buf.get_u32();
        let frag_index = buf.get_u16();
        let frag_count = buf.get_u16();

        if (buf.len() as u64) < payload_len as u64 {
            return Err(ArdpError::MalformedHeader);
        }
        let payload = buf.split_to(payload_len as usize);
        Ok((
            ArdpHeader {
                flags,
                window,
                seq,
                ack,
                src_conn_id,
                dst_conn_id,
                frag_index,
                frag_count,
            },
            payload,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_the_wire_format() {
        let header = ArdpHeader {
            flags: Flags::SYN | Flags::ACK,
            window: 12,
            seq: 99,
            ack: 98,
            src_conn_id: 0xdead_beef,
            dst_conn_id: 0xcafe_babe,
            frag_index: 1,
            frag_count: 3,
        };
        let payload = Bytes::from_static(b"hello");
        let mut buf = BytesMut::new();
        header.encode(payload.len() as u16, &mut buf);
        buf.extend_from_slice(&payload);

        let (decoded, decoded_payload) = ArdpHeader::decode(buf.freeze()).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(decoded_payload, payload);
    }

    #[test]
    fn rejects_short_buffers() {
        assert!(ArdpHeader::decode(Bytes::from_static(b"short")).is_err());
    }
}
