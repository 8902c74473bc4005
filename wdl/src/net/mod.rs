use bytes::Bytes;

pub mod decoder;
pub mod dispatch;

/// One framed packet: its id and the payload that follows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPacket {
    pub id: i32,
    pub payload: Bytes,
}
