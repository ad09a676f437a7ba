//! Length-prefixed message framing
//!
//! Every message on a connection is a 4-byte big-endian length followed by
//! that many bytes of protobuf-encoded [`Message`]. Requests and replies use
//! the same framing.

use chunkmesh_core::error::{MeshError, Result};
use chunkmesh_protocol::Message;
use prost::Message as _;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Default upper bound on a single frame (64 MB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// Encode `message` and write it as one frame
pub async fn write_message<W>(writer: &mut W, message: &Message) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let payload = message.encode_to_vec();
    let len = u32::try_from(payload.len()).map_err(|_| MeshError::FrameTooLarge {
        size: payload.len(),
        max: u32::MAX as usize,
    })?;

    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame and decode it, rejecting frames above `max_frame_size`
pub async fn read_message<R>(reader: &mut R, max_frame_size: usize) -> Result<Message>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;

    if len > max_frame_size {
        return Err(MeshError::FrameTooLarge {
            size: len,
            max: max_frame_size,
        });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Message::decode(payload.as_slice())?)
}
