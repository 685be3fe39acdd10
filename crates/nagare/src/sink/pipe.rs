use std::path::Path;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::{merge_range, mp4::Mp4Probe, BufferSink, BufferedRange, CodecDescriptor};
use crate::error::{AppendError, NagareResult};

pub type PipeWriter = Box<dyn AsyncWrite + Unpin + Send + 'static>;

/// Writes appended fragments to stdout, a file or any other writer, keeping
/// track of the timeline they cover.
pub struct PipeSink<W = PipeWriter> {
    writer: W,
    codec: CodecDescriptor,
    probe: Mp4Probe,

    offset: f64,
    buffered: Vec<BufferedRange>,

    appending: bool,
    closed: bool,
}

impl PipeSink<PipeWriter> {
    pub fn stdout(codec: CodecDescriptor) -> Self {
        Self::new(Box::new(tokio::io::stdout()), codec)
    }

    pub async fn file(path: impl AsRef<Path>, codec: CodecDescriptor) -> NagareResult<Self> {
        let file = tokio::fs::File::create(path).await?;
        Ok(Self::new(Box::new(file), codec))
    }
}

impl<W> PipeSink<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(writer: W, codec: CodecDescriptor) -> Self {
        tracing::debug!("Opening sink for {codec}");
        Self {
            writer,
            codec,
            probe: Mp4Probe::new(),
            offset: 0.,
            buffered: Vec::new(),
            appending: false,
            closed: false,
        }
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    async fn append_fragment(&mut self, bytes: Bytes) -> Result<(), AppendError> {
        if self.closed {
            return Err(AppendError::Closed);
        }

        let timing = self.probe.probe(&bytes)?;
        if let Some(found) = timing.codecs.iter().find(|c| !self.codec.accepts(c)) {
            return Err(AppendError::CodecMismatch {
                expected: self.codec.to_string(),
                found: found.clone(),
            });
        }

        self.writer.write_all(&bytes).await?;
        self.writer.flush().await?;

        if let (Some(start), Some(duration)) = (timing.start, timing.duration) {
            let start = self.offset + start;
            merge_range(&mut self.buffered, BufferedRange::new(start, start + duration));
        }

        Ok(())
    }
}

impl<W> BufferSink for PipeSink<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    fn buffered(&self) -> &[BufferedRange] {
        &self.buffered
    }

    fn set_offset(&mut self, offset: f64) {
        assert!(
            !self.appending,
            "timestamp offset changed while an append is outstanding"
        );
        self.offset = offset;
    }

    async fn append(&mut self, bytes: Bytes) -> NagareResult<()> {
        assert!(
            !self.appending,
            "append called while a previous append is outstanding"
        );

        self.appending = true;
        let result = self.append_fragment(bytes).await;
        self.appending = false;

        Ok(result?)
    }

    async fn end_of_stream(&mut self) -> NagareResult<()> {
        if self.closed {
            return Ok(());
        }

        self.closed = true;
        self.writer.shutdown().await?;
        Ok(())
    }
}
