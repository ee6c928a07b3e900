//! One-frame codec -- unsigned varint length prefix + identify record.
//!
//! A frame whose declared length exceeds the cap is rejected before any of
//! the payload is read into memory. At most one frame is consumed per
//! stream; closing it is the caller's business.

use bytes::{BufMut, BytesMut};
use prost::encoding::encode_varint;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::message::IdentifyMessage;
use crate::ProtocolError;

/// Longest accepted varint prefix; 10 bytes encodes any u64.
const MAX_VARINT_LEN: usize = 10;

/// Encode `msg` as a single length-prefixed frame.
pub fn encode_frame(msg: &IdentifyMessage) -> Vec<u8> {
    let payload = msg.to_bytes();
    let mut buf = BytesMut::with_capacity(payload.len() + MAX_VARINT_LEN);
    encode_varint(payload.len() as u64, &mut buf);
    buf.put_slice(&payload);
    buf.to_vec()
}

/// Write one length-prefixed frame to `stream`.
pub async fn write_message<S>(stream: &mut S, msg: &IdentifyMessage) -> Result<(), ProtocolError>
where
    S: AsyncWrite + Unpin,
{
    let frame = encode_frame(msg);
    stream.write_all(&frame).await?;
    stream.flush().await?;
    Ok(())
}

/// Read exactly one length-prefixed frame from `stream`.
pub async fn read_message<S>(
    stream: &mut S,
    max_len: usize,
) -> Result<IdentifyMessage, ProtocolError>
where
    S: AsyncRead + Unpin,
{
    let len = read_uvarint(stream).await? as usize;
    if len > max_len {
        return Err(ProtocolError::MessageTooLarge {
            size: len,
            max: max_len,
        });
    }

    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await.map_err(map_eof)?;

    IdentifyMessage::from_bytes(&payload)
        .map_err(|e| ProtocolError::InvalidMessage(e.to_string()))
}

/// Read an unsigned LEB128 varint byte-at-a-time.
async fn read_uvarint<S>(stream: &mut S) -> Result<u64, ProtocolError>
where
    S: AsyncRead + Unpin,
{
    let mut value: u64 = 0;
    for i in 0..MAX_VARINT_LEN {
        let mut byte = [0u8; 1];
        stream.read_exact(&mut byte).await.map_err(map_eof)?;
        value |= u64::from(byte[0] & 0x7f) << (7 * i as u32);
        if byte[0] & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(ProtocolError::InvalidMessage(
        "varint prefix longer than 10 bytes".into(),
    ))
}

fn map_eof(err: std::io::Error) -> ProtocolError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        ProtocolError::ConnectionEnded
    } else {
        ProtocolError::Io(err)
    }
}
