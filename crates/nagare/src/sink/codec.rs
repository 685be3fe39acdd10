use std::{fmt, str::FromStr};

use crate::error::{NagareError, NagareResult};

/// A MIME type with its `codecs` parameter, as in
/// `video/mp4; codecs="avc1.640028"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecDescriptor {
    mime: String,
    codecs: Vec<String>,
}

impl CodecDescriptor {
    pub fn parse(descriptor: &str) -> NagareResult<Self> {
        let invalid = || NagareError::InvalidCodec(descriptor.to_string());

        let mut parts = descriptor.split(';');
        let mime = parts.next().map(str::trim).unwrap_or_default();
        let Some((kind, subtype)) = mime.split_once('/') else {
            return Err(invalid());
        };
        if kind.is_empty() || subtype.is_empty() {
            return Err(invalid());
        }

        let mut codecs = Vec::new();
        for parameter in parts {
            let Some((key, value)) = parameter.split_once('=') else {
                return Err(invalid());
            };
            if !key.trim().eq_ignore_ascii_case("codecs") {
                continue;
            }
            codecs.extend(
                value
                    .trim()
                    .trim_matches('"')
                    .split(',')
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(str::to_string),
            );
        }

        Ok(Self {
            mime: mime.to_ascii_lowercase(),
            codecs,
        })
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn codecs(&self) -> &[String] {
        &self.codecs
    }

    /// Whether a sample entry type found in a fragment belongs to one of the
    /// declared codecs. `avc1.640028` accepts `avc1` and `avc3`.
    pub fn accepts(&self, sample_entry: &str) -> bool {
        // a descriptor without codecs leaves the choice to the fragments
        if self.codecs.is_empty() {
            return true;
        }

        let family = codec_family(sample_entry);
        self.codecs.iter().any(|codec| {
            let fourcc = codec.split('.').next().unwrap_or(codec);
            codec_family(fourcc) == family
        })
    }
}

fn codec_family(fourcc: &str) -> &str {
    match fourcc {
        "avc1" | "avc2" | "avc3" | "avc4" => "avc",
        "hvc1" | "hev1" => "hevc",
        "encv" | "enca" => "encrypted",
        other => other,
    }
}

impl FromStr for CodecDescriptor {
    type Err = NagareError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CodecDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.codecs.is_empty() {
            f.write_str(&self.mime)
        } else {
            write!(f, "{}; codecs=\"{}\"", self.mime, self.codecs.join(","))
        }
    }
}
