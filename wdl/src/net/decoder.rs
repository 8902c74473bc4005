use bytes::Bytes;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use wdl_protocol::{ByteCursor, MAX_PACKET_SIZE, VarInt};

use super::RawPacket;

#[derive(Error, Debug)]
pub enum PacketDecodeError {
    #[error("failed to read the capture: {0}")]
    Io(#[from] std::io::Error),
    #[error("packet length is not a valid VarInt")]
    MalformedLength,
    #[error("packet length {0} is out of bounds")]
    OutOfBounds(i32),
    #[error("failed to decode packet id")]
    DecodeID,
}

/// Reads `VarInt length, VarInt id, payload` frames from a decrypted, decompressed capture.
pub struct CaptureDecoder<R: AsyncRead + Unpin> {
    reader: R,
}

impl<R: AsyncRead + Unpin> CaptureDecoder<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Reads a VarInt, returning `None` if the stream ends before its first byte.
    async fn read_var_int(&mut self) -> Result<Option<VarInt>, PacketDecodeError> {
        let mut val = 0u32;
        for i in 0..VarInt::MAX_SIZE {
            let byte = match self.reader.read_u8().await {
                Ok(byte) => byte,
                Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof && i == 0 => {
                    return Ok(None);
                }
                Err(err) => return Err(err.into()),
            };
            val |= (u32::from(byte) & 0x7F) << (i * 7);
            if byte & 0x80 == 0 {
                return Ok(Some(VarInt(val as i32)));
            }
        }
        Err(PacketDecodeError::MalformedLength)
    }

    /// The next packet, or `None` at a clean end of the capture.
    pub async fn get_raw_packet(&mut self) -> Result<Option<RawPacket>, PacketDecodeError> {
        let Some(VarInt(packet_len)) = self.read_var_int().await? else {
            return Ok(None);
        };
        if !(1..=MAX_PACKET_SIZE as i32).contains(&packet_len) {
            return Err(PacketDecodeError::OutOfBounds(packet_len));
        }

        let mut frame = vec![0u8; packet_len as usize];
        self.reader.read_exact(&mut frame).await?;

        let mut cursor = ByteCursor::new(&frame);
        let VarInt(id) = cursor
            .get_var_int()
            .map_err(|_| PacketDecodeError::DecodeID)?;
        let offset = cursor.position();

        let payload = Bytes::from(frame).slice(offset..);
        Ok(Some(RawPacket { id, payload }))
    }
}
