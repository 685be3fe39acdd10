//! Just enough ISO-BMFF parsing to know what an appended fragment covers.
//!
//! Init segments (`moov`) provide track timescales, sample entry codecs and
//! `trex` defaults. Media segments (`moof`) are timed from `tfdt` plus the
//! sample durations of every `trun`. A plain mp4 without fragments falls back
//! to the `mvhd` duration.

use std::collections::BTreeMap;

use crate::error::AppendError;

type BoxType = [u8; 4];

struct Mp4Box<'a> {
    kind: BoxType,
    payload: &'a [u8],
}

struct BoxIter<'a> {
    data: &'a [u8],
}

impl<'a> BoxIter<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn next_box(&mut self) -> Result<Mp4Box<'a>, AppendError> {
        let mut reader = Reader::new(self.data);
        let size = reader.u32()? as u64;
        let kind = reader.fourcc()?;
        let (header, size) = match size {
            0 => (8, self.data.len() as u64),
            1 => (16, reader.u64()?),
            size => (8, size),
        };

        if size < header || size > self.data.len() as u64 {
            return Err(invalid(format!(
                "box {} declares {size} bytes, {} available",
                fourcc_str(&kind),
                self.data.len()
            )));
        }

        let (current, rest) = self.data.split_at(size as usize);
        self.data = rest;
        Ok(Mp4Box {
            kind,
            payload: &current[header as usize..],
        })
    }
}

impl<'a> Iterator for BoxIter<'a> {
    type Item = Result<Mp4Box<'a>, AppendError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.is_empty() {
            return None;
        }

        let result = self.next_box();
        if result.is_err() {
            self.data = &[];
        }
        Some(result)
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], AppendError> {
        let end = self.pos + len;
        if end > self.data.len() {
            return Err(invalid("unexpected end of box".to_string()));
        }
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn skip(&mut self, len: usize) -> Result<(), AppendError> {
        self.take(len).map(|_| ())
    }

    fn u32(&mut self) -> Result<u32, AppendError> {
        let mut buf = [0; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(u32::from_be_bytes(buf))
    }

    fn u64(&mut self) -> Result<u64, AppendError> {
        let mut buf = [0; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_be_bytes(buf))
    }

    fn fourcc(&mut self) -> Result<BoxType, AppendError> {
        let mut buf = [0; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(buf)
    }

    /// Version and flags of a full box.
    fn full_box(&mut self) -> Result<(u8, u32), AppendError> {
        let header = self.u32()?;
        Ok(((header >> 24) as u8, header & 0x00ff_ffff))
    }

    fn rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }
}

fn invalid(message: String) -> AppendError {
    AppendError::InvalidData(message)
}

fn fourcc_str(kind: &BoxType) -> String {
    String::from_utf8_lossy(kind).into_owned()
}

fn child<'a>(data: &'a [u8], kind: &BoxType) -> Result<Option<&'a [u8]>, AppendError> {
    for b in BoxIter::new(data) {
        let b = b?;
        if &b.kind == kind {
            return Ok(Some(b.payload));
        }
    }
    Ok(None)
}

/// Timing of one appended fragment in its own timeline, in seconds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FragmentTiming {
    pub start: Option<f64>,
    pub duration: Option<f64>,
    /// Sample entry types found in `stsd`, e.g. `avc1`.
    pub codecs: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default)]
struct Track {
    timescale: u32,
    default_sample_duration: u32,
}

/// Remembers initialization data between fragments of one stream.
#[derive(Debug, Default)]
pub struct Mp4Probe {
    tracks: BTreeMap<u32, Track>,
    movie_timescale: Option<u32>,
}

#[derive(Default)]
struct TrackSpan {
    start: u64,
    end: u64,
    cursor: Option<u64>,
}

impl Mp4Probe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn probe(&mut self, data: &[u8]) -> Result<FragmentTiming, AppendError> {
        let mut timing = FragmentTiming::default();
        let mut movie_duration = None;
        let mut spans: BTreeMap<u32, TrackSpan> = BTreeMap::new();
        let mut has_moof = false;

        for b in BoxIter::new(data) {
            let b = b?;
            match &b.kind {
                b"moov" => movie_duration = self.parse_moov(b.payload, &mut timing.codecs)?,
                b"moof" => {
                    has_moof = true;
                    self.parse_moof(b.payload, &mut spans)?;
                }
                _ => {}
            }
        }

        if has_moof && !spans.is_empty() {
            let mut tracks = Vec::with_capacity(spans.len());
            for (track_id, span) in &spans {
                let timescale = self.timescale(*track_id)?;
                tracks.push((
                    span.start as f64 / timescale,
                    (span.end - span.start) as f64 / timescale,
                ));
            }

            let start = tracks.iter().map(|(s, _)| *s).fold(f64::MAX, f64::min);
            let duration = tracks
                .iter()
                .map(|(s, d)| if *s == start { *d } else { s + d - start })
                .fold(0., f64::max);
            timing.start = Some(start);
            timing.duration = Some(duration);
        } else if let Some(duration) = movie_duration.filter(|d| *d > 0.) {
            timing.start = Some(0.);
            timing.duration = Some(duration);
        }

        Ok(timing)
    }

    fn timescale(&self, track_id: u32) -> Result<f64, AppendError> {
        self.tracks
            .get(&track_id)
            .map(|t| t.timescale)
            .or(self.movie_timescale)
            .filter(|t| *t > 0)
            .map(f64::from)
            .ok_or_else(|| {
                invalid(format!(
                    "media fragment for track {track_id} before its initialization segment"
                ))
            })
    }

    fn parse_moov(
        &mut self,
        moov: &[u8],
        codecs: &mut Vec<String>,
    ) -> Result<Option<f64>, AppendError> {
        let mut duration = None;

        for b in BoxIter::new(moov) {
            let b = b?;
            match &b.kind {
                b"mvhd" => {
                    let mut reader = Reader::new(b.payload);
                    let (version, _) = reader.full_box()?;
                    let (timescale, ticks) = read_header_times(&mut reader, version)?;
                    self.movie_timescale = Some(timescale);
                    if timescale > 0 {
                        duration = Some(ticks as f64 / timescale as f64);
                    }
                }
                b"trak" => self.parse_trak(b.payload, codecs)?,
                b"mvex" => {
                    for trex in BoxIter::new(b.payload) {
                        let trex = trex?;
                        if &trex.kind != b"trex" {
                            continue;
                        }
                        let mut reader = Reader::new(trex.payload);
                        reader.full_box()?;
                        let track_id = reader.u32()?;
                        reader.skip(4)?;
                        let default_sample_duration = reader.u32()?;
                        self.tracks.entry(track_id).or_default().default_sample_duration =
                            default_sample_duration;
                    }
                }
                _ => {}
            }
        }

        Ok(duration)
    }

    fn parse_trak(&mut self, trak: &[u8], codecs: &mut Vec<String>) -> Result<(), AppendError> {
        let Some(tkhd) = child(trak, b"tkhd")? else {
            return Err(invalid("trak without tkhd".to_string()));
        };
        let mut reader = Reader::new(tkhd);
        let (version, _) = reader.full_box()?;
        reader.skip(if version == 1 { 16 } else { 8 })?;
        let track_id = reader.u32()?;

        let Some(mdia) = child(trak, b"mdia")? else {
            return Ok(());
        };
        if let Some(mdhd) = child(mdia, b"mdhd")? {
            let mut reader = Reader::new(mdhd);
            let (version, _) = reader.full_box()?;
            let (timescale, _) = read_header_times(&mut reader, version)?;
            self.tracks.entry(track_id).or_default().timescale = timescale;
        }

        let stsd = match child(mdia, b"minf")? {
            Some(minf) => match child(minf, b"stbl")? {
                Some(stbl) => child(stbl, b"stsd")?,
                None => None,
            },
            None => None,
        };
        if let Some(stsd) = stsd {
            let mut reader = Reader::new(stsd);
            reader.full_box()?;
            let entries = reader.u32()?;
            for entry in BoxIter::new(reader.rest()).take(entries as usize) {
                codecs.push(fourcc_str(&entry?.kind));
            }
        }

        Ok(())
    }

    fn parse_moof(
        &self,
        moof: &[u8],
        spans: &mut BTreeMap<u32, TrackSpan>,
    ) -> Result<(), AppendError> {
        for traf in BoxIter::new(moof) {
            let traf = traf?;
            if &traf.kind != b"traf" {
                continue;
            }

            let mut track_id = None;
            let mut default_duration = None;
            let mut base_decode_time = None;
            let mut ticks = 0u64;

            for b in BoxIter::new(traf.payload) {
                let b = b?;
                match &b.kind {
                    b"tfhd" => {
                        let mut reader = Reader::new(b.payload);
                        let (_, flags) = reader.full_box()?;
                        let id = reader.u32()?;
                        if flags & 0x01 != 0 {
                            reader.skip(8)?;
                        }
                        if flags & 0x02 != 0 {
                            reader.skip(4)?;
                        }
                        if flags & 0x08 != 0 {
                            default_duration = Some(reader.u32()?);
                        }
                        track_id = Some(id);
                    }
                    b"tfdt" => {
                        let mut reader = Reader::new(b.payload);
                        let (version, _) = reader.full_box()?;
                        base_decode_time = Some(if version == 1 {
                            reader.u64()?
                        } else {
                            reader.u32()? as u64
                        });
                    }
                    b"trun" => {
                        let track = track_id
                            .and_then(|id| self.tracks.get(&id))
                            .copied()
                            .unwrap_or_default();
                        let fallback = default_duration.unwrap_or(track.default_sample_duration);
                        ticks = ticks
                            .checked_add(trun_duration(b.payload, fallback)?)
                            .ok_or_else(|| invalid("traf duration overflows".to_string()))?;
                    }
                    _ => {}
                }
            }

            let Some(track_id) = track_id else {
                return Err(invalid("traf without tfhd".to_string()));
            };
            let span = spans.entry(track_id).or_insert_with(|| TrackSpan {
                start: u64::MAX,
                ..Default::default()
            });
            let base = base_decode_time.or(span.cursor).unwrap_or(0);
            let end = base
                .checked_add(ticks)
                .ok_or_else(|| invalid(format!("track {track_id} decode time overflows")))?;
            span.start = span.start.min(base);
            span.end = span.end.max(end);
            span.cursor = Some(end);
        }

        Ok(())
    }
}

/// Timescale and duration of `mvhd` / `mdhd`, which share this layout.
fn read_header_times(reader: &mut Reader, version: u8) -> Result<(u32, u64), AppendError> {
    if version == 1 {
        reader.skip(16)?;
        let timescale = reader.u32()?;
        Ok((timescale, reader.u64()?))
    } else {
        reader.skip(8)?;
        let timescale = reader.u32()?;
        Ok((timescale, reader.u32()? as u64))
    }
}

fn trun_duration(trun: &[u8], default_duration: u32) -> Result<u64, AppendError> {
    let mut reader = Reader::new(trun);
    let (_, flags) = reader.full_box()?;
    let sample_count = reader.u32()?;
    if flags & 0x001 != 0 {
        reader.skip(4)?;
    }
    if flags & 0x004 != 0 {
        reader.skip(4)?;
    }

    if flags & 0x100 == 0 {
        return Ok(sample_count as u64 * default_duration as u64);
    }

    let mut total = 0u64;
    for _ in 0..sample_count {
        // u32::MAX samples of u32::MAX ticks still fit
        total += reader.u32()? as u64;
        for flag in [0x200, 0x400, 0x800] {
            if flags & flag != 0 {
                reader.skip(4)?;
            }
        }
    }
    Ok(total)
}
