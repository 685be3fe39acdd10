mod codec;
pub mod mp4;
mod pipe;

pub use codec::CodecDescriptor;
pub use pipe::PipeSink;

use bytes::Bytes;
use std::future::Future;

use crate::error::NagareResult;

/// Gaps shorter than this are treated as contiguous.
const MERGE_TOLERANCE: f64 = 0.001;

/// A contiguous interval of buffered media, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferedRange {
    pub start: f64,
    pub end: f64,
}

impl BufferedRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }
}

/// Inserts `range` keeping `ranges` sorted and disjoint.
pub fn merge_range(ranges: &mut Vec<BufferedRange>, range: BufferedRange) {
    let mut merged = range;
    ranges.retain(|existing| {
        let overlaps = existing.start <= merged.end + MERGE_TOLERANCE
            && merged.start <= existing.end + MERGE_TOLERANCE;
        if overlaps {
            merged.start = merged.start.min(existing.start);
            merged.end = merged.end.max(existing.end);
        }
        !overlaps
    });

    let position = ranges
        .iter()
        .position(|existing| existing.start > merged.start)
        .unwrap_or(ranges.len());
    ranges.insert(position, merged);
}

/// The playback buffer fragments are appended to.
///
/// A sink accepts one fragment at a time. The future returned by
/// [BufferSink::append] resolving is the completion signal, calling `append`
/// again before that is a programming error and implementations panic.
pub trait BufferSink: Send + 'static {
    /// Buffered time ranges, sorted and disjoint.
    fn buffered(&self) -> &[BufferedRange];

    /// End of the first buffered range.
    fn buffered_end(&self) -> Option<f64> {
        self.buffered().first().map(|range| range.end)
    }

    /// Shifts the timestamps of subsequently appended fragments.
    fn set_offset(&mut self, offset: f64);

    fn append(&mut self, bytes: Bytes) -> impl Future<Output = NagareResult<()>> + Send;

    /// No more fragments will be appended.
    fn end_of_stream(&mut self) -> impl Future<Output = NagareResult<()>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_contiguous_ranges() {
        let mut ranges = Vec::new();
        merge_range(&mut ranges, BufferedRange::new(0., 2.));
        merge_range(&mut ranges, BufferedRange::new(2., 4.));
        assert_eq!(ranges, vec![BufferedRange::new(0., 4.)]);
    }

    #[test]
    fn test_merge_keeps_gaps_sorted() {
        let mut ranges = Vec::new();
        merge_range(&mut ranges, BufferedRange::new(6., 8.));
        merge_range(&mut ranges, BufferedRange::new(0., 2.));
        assert_eq!(
            ranges,
            vec![BufferedRange::new(0., 2.), BufferedRange::new(6., 8.)]
        );

        merge_range(&mut ranges, BufferedRange::new(1.9995, 6.));
        assert_eq!(ranges, vec![BufferedRange::new(0., 8.)]);
    }
}
