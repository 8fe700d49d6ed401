//! Frame encoding and decoding over async streams.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{ProtocolError, Result};

/// Length prefix size in bytes.
pub const FRAME_PREFIX_SIZE: usize = 4;

/// Default maximum frame payload size (16 MiB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Reads one length-prefixed frame and returns its payload as a string.
///
/// The prefix is a little-endian u32 payload length. Short reads surface
/// as `UnexpectedEof` I/O errors; payloads larger than `max_size` are
/// rejected without reading them.
pub async fn read_frame<S>(stream: &mut S, max_size: usize) -> Result<String>
where
    S: AsyncRead + Unpin,
{
    let mut prefix = [0u8; FRAME_PREFIX_SIZE];
    stream.read_exact(&mut prefix).await?;

    let len = u32::from_le_bytes(prefix) as usize;
    if len > max_size {
        return Err(ProtocolError::FrameTooLarge {
            size: len,
            max: max_size,
        });
    }

    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await?;

    Ok(String::from_utf8(payload)?)
}

/// Writes one length-prefixed frame and flushes the stream.
pub async fn write_frame<S>(stream: &mut S, payload: &str) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    let len = u32::try_from(payload.len()).map_err(|_| ProtocolError::FrameTooLarge {
        size: payload.len(),
        max: u32::MAX as usize,
    })?;

    stream.write_all(&len.to_le_bytes()).await?;
    stream.write_all(payload.as_bytes()).await?;
    stream.flush().await?;

    Ok(())
}
