//! Async frame helpers over any `AsyncRead`/`AsyncWrite` byte stream.
//!
//! Reads use `read_exact`, so a connection closed mid-frame surfaces as an
//! `UnexpectedEof` I/O error rather than a partially filled buffer.

use super::types::*;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub async fn read_request_header<R>(reader: &mut R) -> Result<RequestHeader, WireError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; REQUEST_HEADER_LEN];
    reader.read_exact(&mut buf).await?;
    RequestHeader::decode(&buf)
}

/// Sends a request header, followed by `payload` when one is given (`WRITE`).
pub async fn write_request<W>(
    writer: &mut W,
    header: RequestHeader,
    payload: Option<&[u8]>,
) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    let payload = payload.unwrap_or_default();
    let mut frame = Vec::with_capacity(REQUEST_HEADER_LEN + payload.len());
    frame.extend_from_slice(&header.encode());
    frame.extend_from_slice(payload);
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_status<R>(reader: &mut R) -> Result<Status, WireError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; RESPONSE_HEADER_LEN];
    reader.read_exact(&mut buf).await?;
    Ok(ResponseHeader::decode(&buf)?.status)
}

/// Sends one or more status words (e.g. `ERROR` + `INVALID`) and an optional
/// block payload as a single frame.
pub async fn write_response<W>(
    writer: &mut W,
    statuses: &[Status],
    payload: Option<&[u8]>,
) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    let payload = payload.unwrap_or_default();
    let mut frame = Vec::with_capacity(statuses.len() * RESPONSE_HEADER_LEN + payload.len());
    for status in statuses {
        frame.extend_from_slice(&ResponseHeader::new(*status).encode());
    }
    frame.extend_from_slice(payload);
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn write_status<W>(writer: &mut W, status: Status) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    write_response(writer, &[status], None).await
}

/// Reads exactly `size` raw bytes.
pub async fn read_payload<R>(reader: &mut R, size: usize) -> Result<Vec<u8>, WireError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; size];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Reads exactly `buf.len()` raw bytes straight into a caller-owned buffer.
pub async fn read_payload_into<R>(reader: &mut R, buf: &mut [u8]) -> Result<(), WireError>
where
    R: AsyncRead + Unpin,
{
    reader.read_exact(buf).await?;
    Ok(())
}
