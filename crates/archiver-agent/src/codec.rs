//! Native messaging framing: a 4-byte native-endian length prefix followed
//! by that many bytes of UTF-8 JSON.

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::AgentError;

/// Largest message a native host may send back.
pub const MAX_INBOUND_FRAME: usize = 1024 * 1024;

/// Read one frame. Returns `Ok(None)` on a clean EOF before the prefix.
pub async fn read_frame<R>(reader: &mut R, max: usize) -> Result<Option<Vec<u8>>, AgentError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; 4];
    match reader.read_exact(&mut prefix).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_ne_bytes(prefix) as usize;
    if len > max {
        return Err(AgentError::FrameTooLarge { len, max });
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(body))
}

pub async fn write_frame<W>(writer: &mut W, body: &[u8]) -> Result<(), AgentError>
where
    W: AsyncWrite + Unpin,
{
    let len = u32::try_from(body.len()).map_err(|_| AgentError::FrameTooLarge {
        len: body.len(),
        max: u32::MAX as usize,
    })?;
    writer.write_all(&len.to_ne_bytes()).await?;
    writer.write_all(body).await?;
    writer.flush().await?;
    Ok(())
}

/// Serialize `value` and write it as one frame.
pub async fn write_message<W, T>(writer: &mut W, value: &T) -> Result<(), AgentError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let body = serde_json::to_vec(value)?;
    write_frame(writer, &body).await
}

/// Read and deserialize one frame.
pub async fn read_message<R, T>(reader: &mut R, max: usize) -> Result<Option<T>, AgentError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    match read_frame(reader, max).await? {
        Some(body) => Ok(Some(serde_json::from_slice(&body)?)),
        None => Ok(None),
    }
}
