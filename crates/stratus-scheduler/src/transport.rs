//! Framed message I/O over TCP.
//!
//! Every exchange is one or more frames (see `stratus_proto`). Outbound
//! exchanges open a fresh connection per request and are bounded by a
//! timeout; inbound connections are read frame by frame until the peer
//! closes.

use std::time::Duration;

use rkyv::api::high::{HighDeserializer, HighSerializer, HighValidator};
use rkyv::bytecheck::CheckBytes;
use rkyv::rancor::Error as RkyvError;
use rkyv::ser::allocator::ArenaHandle;
use rkyv::util::AlignedVec;
use rkyv::{Archive, Deserialize, Serialize};
use stratus_proto::{Codec, Envelope, FrameHeader, MessageType, FRAME_HEADER_SIZE};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::{Result, SchedulerError};

/// Reads one frame of `expected` type.
///
/// Returns `Ok(None)` when the peer closed the connection cleanly between
/// frames.
pub async fn read_frame<S, T>(stream: &mut S, expected: MessageType) -> Result<Option<Envelope<T>>>
where
    S: AsyncRead + Unpin,
    T: Archive,
    Envelope<T>: Archive,
    <Envelope<T> as Archive>::Archived: for<'a> CheckBytes<HighValidator<'a, RkyvError>>
        + Deserialize<Envelope<T>, HighDeserializer<RkyvError>>,
{
    let mut header_buf = [0u8; FRAME_HEADER_SIZE];
    match stream.read_exact(&mut header_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let header = FrameHeader::decode(&header_buf)?;
    if header.message_type != expected {
        return Err(SchedulerError::InvalidRequest(format!(
            "expected {expected:?} frame, got {:?}",
            header.message_type
        )));
    }
    header.validate_payload_len()?;

    #[allow(clippy::as_conversions)]
    let mut payload = vec![0u8; header.payload_len as usize];
    stream.read_exact(&mut payload).await?;

    Ok(Some(Codec::decode(&payload)?))
}

/// Writes one frame and flushes.
pub async fn write_frame<S, T>(
    stream: &mut S,
    codec: &mut Codec,
    envelope: &Envelope<T>,
    message_type: MessageType,
) -> Result<()>
where
    S: AsyncWrite + Unpin,
    T: Archive,
    Envelope<T>: for<'a> Serialize<HighSerializer<AlignedVec, ArenaHandle<'a>, RkyvError>>,
{
    let bytes = codec.encode(envelope, message_type)?;
    stream.write_all(bytes).await?;
    stream.flush().await?;
    Ok(())
}

async fn connect(addr: &str, timeout: Duration) -> Result<TcpStream> {
    tokio::time::timeout(timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| SchedulerError::UpstreamUnavailable(format!("connect to {addr} timed out")))?
        .map_err(|e| SchedulerError::UpstreamUnavailable(format!("connect to {addr}: {e}")))
}

/// Sends one frame to `addr` without waiting for a reply.
pub async fn send<T>(addr: &str, message_type: MessageType, payload: T, timeout: Duration) -> Result<()>
where
    T: Archive,
    Envelope<T>: for<'a> Serialize<HighSerializer<AlignedVec, ArenaHandle<'a>, RkyvError>>,
{
    let mut stream = connect(addr, timeout).await?;
    let mut codec = Codec::new();
    let envelope = Envelope::new(payload);
    tokio::time::timeout(
        timeout,
        write_frame(&mut stream, &mut codec, &envelope, message_type),
    )
    .await
    .map_err(|_| SchedulerError::UpstreamUnavailable(format!("send to {addr} timed out")))?
}

/// Sends one frame to `addr` and waits for the single reply frame.
pub async fn request<T>(addr: &str, message_type: MessageType, payload: T, timeout: Duration) -> Result<T>
where
    T: Archive,
    Envelope<T>: Archive + for<'a> Serialize<HighSerializer<AlignedVec, ArenaHandle<'a>, RkyvError>>,
    <Envelope<T> as Archive>::Archived: for<'a> CheckBytes<HighValidator<'a, RkyvError>>
        + Deserialize<Envelope<T>, HighDeserializer<RkyvError>>,
{
    let exchange = async {
        let mut stream = connect(addr, timeout).await?;
        let mut codec = Codec::new();
        let envelope = Envelope::new(payload);
        write_frame(&mut stream, &mut codec, &envelope, message_type).await?;

        let reply: Envelope<T> = read_frame(&mut stream, message_type)
            .await?
            .ok_or_else(|| SchedulerError::UpstreamUnavailable(format!("{addr} closed before replying")))?;

        if reply.header.correlation_id != envelope.header.correlation_id {
            return Err(SchedulerError::Internal(format!(
                "reply from {addr} has mismatched correlation id"
            )));
        }
        Ok(reply.payload)
    };

    tokio::time::timeout(timeout, exchange)
        .await
        .map_err(|_| SchedulerError::UpstreamUnavailable(format!("request to {addr} timed out")))?
}
