//! Raw fragment transfer from the capture device to the fragment server.
//!
//! Each file travels as a frame: a 15 byte, zero padded, ASCII decimal
//! length followed by exactly that many bytes of file content. A connection
//! carries frames back to back until the sender shuts it down.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{TcpListener, TcpStream, ToSocketAddrs},
};

use crate::error::{NagareError, NagareResult};

pub const HEADER_LEN: usize = 15;

/// Frames larger than this are refused instead of allocated.
pub const MAX_FRAME_LEN: u64 = 512 * 1024 * 1024;

pub async fn write_frame<W>(writer: &mut W, data: &[u8]) -> NagareResult<()>
where
    W: AsyncWrite + Unpin,
{
    let header = format!("{:0width$}", data.len(), width = HEADER_LEN);
    if header.len() != HEADER_LEN {
        return Err(NagareError::FramingError(format!(
            "{} bytes do not fit in a frame header",
            data.len()
        )));
    }

    writer.write_all(header.as_bytes()).await?;
    writer.write_all(data).await?;
    Ok(())
}

/// Reads the next frame, or `None` when the peer closed the connection
/// between frames.
pub async fn read_frame<R>(reader: &mut R) -> NagareResult<Option<Bytes>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    let mut filled = 0;
    while filled < HEADER_LEN {
        let read = reader.read(&mut header[filled..]).await?;
        if read == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(NagareError::FramingError(format!(
                "connection dropped after {filled} header bytes"
            )));
        }
        filled += read;
    }

    let len = std::str::from_utf8(&header)
        .ok()
        .and_then(|h| h.parse::<u64>().ok())
        .ok_or_else(|| {
            NagareError::FramingError(format!(
                "invalid frame header {:?}",
                String::from_utf8_lossy(&header)
            ))
        })?;
    if len > MAX_FRAME_LEN {
        return Err(NagareError::FramingError(format!(
            "frame of {len} bytes exceeds the limit"
        )));
    }

    let mut data = vec![0u8; len as usize];
    match reader.read_exact(&mut data).await {
        Ok(_) => Ok(Some(Bytes::from(data))),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(
            NagareError::FramingError(format!("connection dropped inside a {len} byte frame")),
        ),
        Err(e) => Err(e.into()),
    }
}

/// Receives fragment files from one capture device connection.
pub struct RelayReceiver {
    listener: TcpListener,
    dir: PathBuf,
}

impl RelayReceiver {
    pub async fn bind(addr: impl ToSocketAddrs, dir: impl Into<PathBuf>) -> NagareResult<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            dir: dir.into(),
        })
    }

    pub fn local_addr(&self) -> NagareResult<std::net::SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts a single connection and stores its frames as `raw_{index}.h264`
    /// until the peer disconnects. Returns the written paths in order.
    pub async fn receive(&self) -> NagareResult<Vec<PathBuf>> {
        tracing::info!("Waiting for connection with the capture device...");
        let (mut stream, peer) = self.listener.accept().await?;
        tracing::info!("Connection with {peer} established, receiving...");

        tokio::fs::create_dir_all(&self.dir).await?;
        let mut written = Vec::new();
        while let Some(frame) = read_frame(&mut stream).await? {
            let path = self.dir.join(format!("raw_{}.h264", written.len()));
            tokio::fs::write(&path, &frame).await?;
            tracing::info!("Received file: {}", path.display());
            written.push(path);
        }

        tracing::info!("{peer} disconnected after {} files", written.len());
        Ok(written)
    }
}

/// Sends `files` in order over one connection to `addr`.
pub async fn send_files<P>(addr: impl ToSocketAddrs, files: &[P]) -> NagareResult<()>
where
    P: AsRef<Path>,
{
    let mut stream = TcpStream::connect(addr).await?;
    for file in files {
        let file = file.as_ref();
        let data = tokio::fs::read(file).await?;
        write_frame(&mut stream, &data).await?;
        tracing::info!("Sent file: {} ({} bytes)", file.display(), data.len());
    }
    stream.shutdown().await?;
    Ok(())
}
