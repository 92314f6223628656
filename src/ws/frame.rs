//! A hand-rolled RFC 6455 frame parser/emitter, grounded in RFC 6455 §5
//! directly rather than any higher-level WebSocket crate: masking,
//! extended-length decoding, and opcode handling are the bit-layout
//! details this module exists to make explicit.

use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Opcode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl Opcode {
    fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0x0 => Some(Opcode::Continuation),
            0x1 => Some(Opcode::Text),
            0x2 => Some(Opcode::Binary),
            0x8 => Some(Opcode::Close),
            0x9 => Some(Opcode::Ping),
            0xA => Some(Opcode::Pong),
            _ => None,
        }
    }

    fn as_raw(self) -> u8 {
        match self {
            Opcode::Continuation => 0x0,
            Opcode::Text => 0x1,
            Opcode::Binary => 0x2,
            Opcode::Close => 0x8,
            Opcode::Ping => 0x9,
            Opcode::Pong => 0xA,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Frame {
    pub(crate) fin: bool,
    pub(crate) opcode: Opcode,
    pub(crate) payload: Vec<u8>,
}

impl Frame {
    pub(crate) fn text(payload: impl Into<String>) -> Self {
        Frame {
            fin: true,
            opcode: Opcode::Text,
            payload: payload.into().into_bytes(),
        }
    }

    pub(crate) fn binary(payload: Vec<u8>) -> Self {
        Frame {
            fin: true,
            opcode: Opcode::Binary,
            payload,
        }
    }

    pub(crate) fn ping(payload: Vec<u8>) -> Self {
        Frame {
            fin: true,
            opcode: Opcode::Ping,
            payload,
        }
    }

    pub(crate) fn pong(payload: Vec<u8>) -> Self {
        Frame {
            fin: true,
            opcode: Opcode::Pong,
            payload,
        }
    }

    pub(crate) fn close(code: u16, reason: &str) -> Self {
        let mut payload = Vec::with_capacity(2 + reason.len());
        payload.extend_from_slice(&code.to_be_bytes());
        payload.extend_from_slice(reason.as_bytes());
        Frame {
            fin: true,
            opcode: Opcode::Close,
            payload,
        }
    }

    /// Reads one frame from a client, per RFC 6455 §5.2. Client frames are
    /// always masked; `max_message_size` bounds the decoded payload length.
    pub(crate) async fn read_masked<R: AsyncRead + Unpin>(
        reader: &mut R,
        max_message_size: usize,
    ) -> io::Result<Self> {
        let mut head = [0u8; 2];
        reader.read_exact(&mut head).await?;

        let fin = head[0] & 0b1000_0000 != 0;
        let opcode_raw = head[0] & 0b0000_1111;
        let opcode = Opcode::from_raw(opcode_raw)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "unsupported opcode"))?;

        let masked = head[1] & 0b1000_0000 != 0;
        let len7 = head[1] & 0b0111_1111;

        let len = match len7 {
            126 => {
                let mut ext = [0u8; 2];
                reader.read_exact(&mut ext).await?;
                u16::from_be_bytes(ext) as u64
            }
            127 => {
                let mut ext = [0u8; 8];
                reader.read_exact(&mut ext).await?;
                u64::from_be_bytes(ext)
            }
            n => n as u64,
        };

        if len as usize > max_message_size {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "payload too large"));
        }

        let mut mask = [0u8; 4];
        if masked {
            reader.read_exact(&mut mask).await?;
        }

        let mut payload = vec![0u8; len as usize];
        reader.read_exact(&mut payload).await?;

        if masked {
            for (i, byte) in payload.iter_mut().enumerate() {
                *byte ^= mask[i % 4];
            }
        }

        Ok(Frame { fin, opcode, payload })
    }

    /// Writes one frame to the client, unmasked - per RFC 6455 §5.1,
    /// servers never mask outgoing frames.
    pub(crate) async fn write_unmasked<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> io::Result<()> {
        let mut head = vec![0x80 | self.opcode.as_raw()];
        let len = self.payload.len();

        if len < 126 {
            head.push(len as u8);
        } else if len <= u16::MAX as usize {
            head.push(126);
            head.extend_from_slice(&(len as u16).to_be_bytes());
        } else {
            head.push(127);
            head.extend_from_slice(&(len as u64).to_be_bytes());
        }

        writer.write_all(&head).await?;
        writer.write_all(&self.payload).await?;
        writer.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_a_masked_client_frame() {
        let frame = Frame::text("hello");
        // Simulate what a masked client frame looks like on the wire by
        // masking `frame`'s own encoding, then decoding it back.
        let mut encoded = Vec::new();
        frame.write_unmasked(&mut encoded).await.unwrap();
        encoded[1] |= 0b1000_0000; // set the MASK bit
        let mask = [0x12, 0x34, 0x56, 0x78];
        let header_len = if frame.payload.len() < 126 { 2 } else { 4 };
        let mut masked = encoded[..header_len].to_vec();
        masked.extend_from_slice(&mask);
        for (i, byte) in encoded[header_len..].iter().enumerate() {
            masked.push(byte ^ mask[i % 4]);
        }

        let mut cursor = std::io::Cursor::new(masked);
        let decoded = Frame::read_masked(&mut cursor, 1 << 20).await.unwrap();
        assert_eq!(decoded.opcode, Opcode::Text);
        assert_eq!(decoded.payload, b"hello");
        assert!(decoded.fin);
    }

    #[tokio::test]
    async fn rejects_payloads_over_the_limit() {
        let mut head = vec![0x80 | Opcode::Binary.as_raw(), 0b1000_0000 | 126];
        head.extend_from_slice(&10u16.to_be_bytes());
        head.extend_from_slice(&[0, 0, 0, 0]); // mask
        head.extend_from_slice(&[0u8; 10]); // payload
        let mut cursor = std::io::Cursor::new(head);
        let result = Frame::read_masked(&mut cursor, 4).await;
        assert!(result.is_err());
    }
}
