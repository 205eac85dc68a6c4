//! The wire frame: a fixed head plus an optional opaque body (`spec.md`
//! §4.1, component C1). Head and body are transmitted back-to-back; the
//! head is fixed length so decoding is exactly one short read followed by
//! one body read of the declared length.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use bytes::Bytes;
use std::io::Cursor;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use zway_proto::{Error, Result, StreamId};

/// `id(4) + kind(1) + stream_id(4) + stream_type(1) + parts(4) + part(4) +
/// body_size(4) + flags(1)`.
pub const HEAD_SIZE: usize = 23;

/// Chunk size used by the stream sender (C4) and the ceiling a packet body
/// must not exceed on decode.
pub const MAX_PACKET_BODY: usize = 65536;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[repr(u8)]
pub enum PacketKind {
    Request = 0,
    Response = 1,
    StreamPart = 2,
}

impl PacketKind {
    fn from_u8(value: u8) -> Result<PacketKind> {
        Ok(match value {
            0 => PacketKind::Request,
            1 => PacketKind::Response,
            2 => PacketKind::StreamPart,
            _ => return Err(Error::MalformedHead),
        })
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[repr(u8)]
pub enum StreamType {
    Undefined = 0,
    Request = 1,
    Resource = 2,
}

impl StreamType {
    fn from_u8(value: u8) -> Result<StreamType> {
        Ok(match value {
            0 => StreamType::Undefined,
            1 => StreamType::Request,
            2 => StreamType::Resource,
            _ => return Err(Error::MalformedHead),
        })
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PacketHead {
    pub packet_id: u32,
    pub kind: PacketKind,
    pub stream_id: StreamId,
    pub stream_type: StreamType,
    /// Total parts for stream packets; 0 for non-stream packets.
    pub parts: u32,
    pub part: u32,
    pub body_size: u32,
    /// Reserved for future use; always 0 today.
    pub flags: u8,
}

impl PacketHead {
    pub fn encode(&self) -> [u8; HEAD_SIZE] {
        let mut buf = [0u8; HEAD_SIZE];
        {
            let mut cursor = Cursor::new(&mut buf[..]);
            cursor.write_u32::<BigEndian>(self.packet_id).unwrap();
            cursor.write_u8(self.kind as u8).unwrap();
            cursor.write_u32::<BigEndian>(self.stream_id.0).unwrap();
            cursor.write_u8(self.stream_type as u8).unwrap();
            cursor.write_u32::<BigEndian>(self.parts).unwrap();
            cursor.write_u32::<BigEndian>(self.part).unwrap();
            cursor.write_u32::<BigEndian>(self.body_size).unwrap();
            cursor.write_u8(self.flags).unwrap();
        }
        buf
    }

    pub fn decode(buf: &[u8; HEAD_SIZE]) -> Result<PacketHead> {
        let mut cursor = Cursor::new(&buf[..]);

        let packet_id = cursor.read_u32::<BigEndian>()?;
        let kind = PacketKind::from_u8(cursor.read_u8()?)?;
        let stream_id = StreamId(cursor.read_u32::<BigEndian>()?);
        let stream_type = StreamType::from_u8(cursor.read_u8()?)?;
        let parts = cursor.read_u32::<BigEndian>()?;
        let part = cursor.read_u32::<BigEndian>()?;
        let body_size = cursor.read_u32::<BigEndian>()?;
        let flags = cursor.read_u8()?;

        if stream_id.0 != 0 && parts == 0 {
            return Err(Error::MalformedHead);
        }
        if body_size as usize > MAX_PACKET_BODY {
            return Err(Error::MalformedHead);
        }

        Ok(PacketHead {
            packet_id,
            kind,
            stream_id,
            stream_type,
            parts,
            part,
            body_size,
            flags,
        })
    }
}

/// A fully decoded packet: the fixed head plus its opaque body (empty when
/// `head.body_size == 0`).
#[derive(Debug, Clone)]
pub struct Packet {
    pub head: PacketHead,
    pub body: Bytes,
}

impl Packet {
    pub fn new(head: PacketHead, body: Bytes) -> Packet {
        debug_assert_eq!(head.body_size as usize, body.len());
        Packet { head, body }
    }
}

/// Read one packet: a single `HEAD_SIZE` read, then — if `body_size > 0` —
/// one or more reads to fill the body exactly.
pub async fn read_packet<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Packet> {
    let mut head_buf = [0u8; HEAD_SIZE];
    reader.read_exact(&mut head_buf).await.map_err(classify_read_error)?;
    let head = PacketHead::decode(&head_buf)?;

    let body = if head.body_size > 0 {
        let mut body_buf = vec![0u8; head.body_size as usize];
        reader.read_exact(&mut body_buf).await.map_err(classify_read_error)?;
        Bytes::from(body_buf)
    } else {
        Bytes::new()
    };

    Ok(Packet::new(head, body))
}

/// Write one packet: head then body, back to back.
pub async fn write_packet<W: AsyncWrite + Unpin>(writer: &mut W, packet: &Packet) -> Result<()> {
    writer.write_all(&packet.head.encode()).await?;
    if !packet.body.is_empty() {
        writer.write_all(&packet.body).await?;
    }
    Ok(())
}

/// Surface the terminal-close conditions `spec.md` §4.6/§7 calls out
/// (aborted, reset, EOF, short-read TLS disconnect) as the silent
/// `Disconnected` error rather than a logged `TransportIo`.
fn classify_read_error(err: std::io::Error) -> Error {
    use std::io::ErrorKind::*;
    match err.kind() {
        UnexpectedEof | ConnectionAborted | ConnectionReset | BrokenPipe => Error::Disconnected,
        _ => Error::TransportIo(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn head_round_trips_through_encode_decode() {
        let head = PacketHead {
            packet_id: 42,
            kind: PacketKind::Request,
            stream_id: StreamId(0),
            stream_type: StreamType::Undefined,
            parts: 0,
            part: 0,
            body_size: 11,
            flags: 0,
        };

        let encoded = head.encode();
        let decoded = PacketHead::decode(&encoded).unwrap();
        assert_eq!(head, decoded);
    }

    #[test]
    fn stream_packet_with_zero_parts_is_malformed() {
        let head = PacketHead {
            packet_id: 1,
            kind: PacketKind::StreamPart,
            stream_id: StreamId(7),
            stream_type: StreamType::Resource,
            parts: 0,
            part: 0,
            body_size: 0,
            flags: 0,
        };

        let encoded = head.encode();
        assert!(matches!(PacketHead::decode(&encoded), Err(Error::MalformedHead)));
    }

    #[test]
    fn body_size_over_ceiling_is_malformed() {
        let mut head = PacketHead {
            packet_id: 1,
            kind: PacketKind::Request,
            stream_id: StreamId(0),
            stream_type: StreamType::Undefined,
            parts: 0,
            part: 0,
            body_size: 0,
            flags: 0,
        };
        head.body_size = (MAX_PACKET_BODY + 1) as u32;

        let encoded = head.encode();
        assert!(matches!(PacketHead::decode(&encoded), Err(Error::MalformedHead)));
    }

    #[tokio::test]
    async fn packet_with_empty_body_has_no_body_segment() {
        let head = PacketHead {
            packet_id: 5,
            kind: PacketKind::Response,
            stream_id: StreamId(0),
            stream_type: StreamType::Undefined,
            parts: 0,
            part: 0,
            body_size: 0,
            flags: 0,
        };
        let packet = Packet::new(head, Bytes::new());

        let mut wire = Vec::new();
        write_packet(&mut wire, &packet).await.unwrap();
        assert_eq!(wire.len(), HEAD_SIZE);

        let mut cursor = Cursor::new(wire);
        let decoded = read_packet(&mut cursor).await.unwrap();
        assert_eq!(decoded.body.len(), 0);
    }

    #[tokio::test]
    async fn encode_then_decode_yields_identical_head_and_body() {
        let head = PacketHead {
            packet_id: 99,
            kind: PacketKind::StreamPart,
            stream_id: StreamId(3),
            stream_type: StreamType::Resource,
            parts: 2,
            part: 0,
            body_size: 4,
            flags: 0,
        };
        let packet = Packet::new(head, Bytes::from_static(b"data"));

        let mut wire = Vec::new();
        write_packet(&mut wire, &packet).await.unwrap();

        let mut cursor = Cursor::new(wire);
        let decoded = read_packet(&mut cursor).await.unwrap();

        assert_eq!(decoded.head, packet.head);
        assert_eq!(decoded.body, packet.body);
    }
}
