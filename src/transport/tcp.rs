//! TCP request/response transport and echo server
//!
//! A deliberately small protocol so the generator can drive a real network
//! peer. It is not meant to mimic any production RPC wire format.
//!
//! # Message Framing
//!
//! Every message is prefixed with a 4-byte length field (little-endian u32):
//!
//! ```text
//! request:  [4 bytes: len][4 bytes: response size][client payload]
//! response: [4 bytes: len][response size bytes]
//! ```
//!
//! The client opens one connection per call. The server answers frames on a
//! connection until the client closes it.

use super::{completion_runtime, Transport};
use crate::error::TransportError;
use crate::stats::Completion;
use anyhow::Context;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Sanity limit on frame size (100MB)
pub const MAX_FRAME_LEN: usize = 100 * 1024 * 1024;

/// Encode a request frame asking for `response_size` bytes back
///
/// `client_payload + 4` must fit in a frame, which `TcpTransport::connect`
/// checks against [`MAX_FRAME_LEN`].
pub(crate) fn encode_request(client_payload: usize, response_size: u32) -> Vec<u8> {
    let body_len = 4 + client_payload;
    let mut frame = Vec::with_capacity(4 + body_len);
    frame.extend_from_slice(&(body_len as u32).to_le_bytes());
    frame.extend_from_slice(&response_size.to_le_bytes());
    frame.resize(4 + body_len, 0);
    frame
}

/// Read one length-prefixed frame
///
/// Returns `Ok(None)` on a clean EOF before the length field.
pub async fn read_frame<R>(reader: &mut R) -> io::Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame too large: {} bytes (max {})", len, MAX_FRAME_LEN),
        ));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(body))
}

/// Client side: one TCP connection per call
pub struct TcpTransport {
    addr: SocketAddr,
    request: Arc<[u8]>,
    response_size: u32,
    runtime: tokio::runtime::Runtime,
}

impl TcpTransport {
    /// Resolve the peer and prepare the request payload
    ///
    /// No connection is opened here; each call connects on its own.
    pub fn connect(
        host: &str,
        port: u16,
        client_payload: usize,
        server_payload: usize,
        completion_threads: usize,
    ) -> Result<Self, TransportError> {
        let addr = (host, port)
            .to_socket_addrs()
            .map_err(|e| TransportError::Setup(format!("cannot resolve {}:{}: {}", host, port, e)))?
            .next()
            .ok_or_else(|| TransportError::Setup(format!("no address for {}:{}", host, port)))?;

        let response_size = u32::try_from(server_payload)
            .ok()
            .filter(|size| (*size as usize) <= MAX_FRAME_LEN)
            .ok_or_else(|| {
                TransportError::Setup(format!("server payload too large: {} bytes", server_payload))
            })?;
        if client_payload > MAX_FRAME_LEN - 4 {
            return Err(TransportError::Setup(format!(
                "client payload too large: {} bytes",
                client_payload
            )));
        }

        tracing::debug!(peer = %addr, client_payload, server_payload, "tcp transport resolved");
        Ok(Self {
            addr,
            request: encode_request(client_payload, response_size).into(),
            response_size,
            runtime: completion_runtime(completion_threads, "openloop-tcp")?,
        })
    }

}

async fn unary_call(addr: SocketAddr, request: &[u8], response_size: u32) -> io::Result<()> {
    let mut stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;
    stream.write_all(request).await?;
    stream.flush().await?;

    let body = read_frame(&mut stream).await?.ok_or_else(|| {
        io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed before response")
    })?;
    if body.len() != response_size as usize {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("expected {} response bytes, got {}", response_size, body.len()),
        ));
    }
    Ok(())
}

impl Transport for TcpTransport {
    fn issue(&self, completion: Completion) -> Result<(), TransportError> {
        let addr = self.addr;
        let request = Arc::clone(&self.request);
        let response_size = self.response_size;

        self.runtime.spawn(async move {
            match unary_call(addr, &request, response_size).await {
                Ok(()) => completion.succeed(),
                Err(e) => completion.fail(e),
            }
        });
        Ok(())
    }

    fn name(&self) -> &'static str {
        "tcp"
    }
}

/// Answer request frames on every accepted connection
///
/// Runs until the listener fails.
pub async fn serve(listener: TcpListener) -> crate::Result<()> {
    let local = listener.local_addr().context("Failed to read listener address")?;
    tracing::info!(addr = %local, "echo server listening");

    loop {
        let (stream, peer) = listener.accept().await.context("Failed to accept connection")?;
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream).await {
                tracing::debug!(peer = %peer, error = %e, "connection closed with error");
            }
        });
    }
}

async fn handle_connection(mut stream: TcpStream) -> io::Result<()> {
    stream.set_nodelay(true)?;

    while let Some(body) = read_frame(&mut stream).await? {
        if body.len() < 4 {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "request frame too short"));
        }
        let size = u32::from_le_bytes([body[0], body[1], body[2], body[3]]);
        if size as usize > MAX_FRAME_LEN {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "requested response too large"));
        }

        let mut response = Vec::with_capacity(4 + size as usize);
        response.extend_from_slice(&size.to_le_bytes());
        response.resize(4 + size as usize, 0);
        stream.write_all(&response).await?;
    }
    Ok(())
}
