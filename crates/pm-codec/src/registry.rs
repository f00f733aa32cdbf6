//! Backend registry
//!
//! A fixed compile-time table; every backend registers a name, the format it
//! handles, a score and an opener. `find_best_decoder` picks the
//! highest-scoring entry for a format.

use crate::{CodecResult, DecodeStream, Format, SharedSource};

/// One registered decoder backend.
pub struct DecoderInfo {
    /// Implementation name, for diagnostics and tests.
    pub name: &'static str,
    /// Format this backend handles.
    pub format: Format,
    /// Performance score, 0-10.
    pub score: i32,
    /// Open a stream over an asset's bytes.
    pub open: fn(SharedSource) -> CodecResult<Box<dyn DecodeStream>>,
}

static DECODERS: &[DecoderInfo] = &[
    DecoderInfo {
        name: "WavDecoder",
        format: Format::Wav,
        score: 0,
        open: crate::wav::open_stream,
    },
    DecoderInfo {
        name: "VorbisDecoder",
        format: Format::Vorbis,
        score: 5,
        open: crate::vorbis::open_stream,
    },
    DecoderInfo {
        name: "OpusDecoder",
        format: Format::Opus,
        score: 5,
        open: crate::opus_backend::open_stream,
    },
];

/// Best-scoring backend registered for `format`.
pub fn find_best_decoder(format: Format) -> Option<&'static DecoderInfo> {
    DECODERS
        .iter()
        .filter(|d| d.format == format)
        .max_by_key(|d| d.score)
}

/// Backend by implementation name.
pub fn find_decoder_by_name(name: &str) -> Option<&'static DecoderInfo> {
    DECODERS.iter().find(|d| d.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_format_has_a_backend() {
        for format in [Format::Wav, Format::Vorbis, Format::Opus] {
            assert!(find_best_decoder(format).is_some(), "{:?}", format);
        }
    }

    #[test]
    fn lookup_by_name() {
        assert_eq!(find_decoder_by_name("WavDecoder").unwrap().format, Format::Wav);
        assert!(find_decoder_by_name("NoSuchDecoder").is_none());
    }
}
