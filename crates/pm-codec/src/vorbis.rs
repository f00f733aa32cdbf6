//! Ogg/Vorbis backend
//!
//! Push-mode decoding: the shared Ogg reader assembles packets from a
//! bounded input buffer, the first three packets configure the Vorbis
//! headers, every packet after that decodes to planar float. Output is
//! scaled by 32767 into the mixer's int16-magnitude pipeline.
//!
//! End of stream is detected by data consumption, not by granule position,
//! so it is not sample precise; the trailing block may carry padding.

use lewton::audio::{PreviousWindowRight, read_audio_packet_generic};
use lewton::header::{IdentHeader, SetupHeader, read_header_comment, read_header_ident, read_header_setup};
use log::warn;

use crate::ogg::{OggPacketReader, PagePolicy};
use crate::{CodecError, CodecResult, DecodeStream, SampleSink, SharedSource, StreamInfo};

/// `\x01vorbis`, the identification-header packet prefix.
const VORBIS_IDENT_MAGIC: &[u8] = b"\x01vorbis";

const HEADER_PACKETS: u8 = 3;

pub(crate) struct VorbisStream {
    info: StreamInfo,
    reader: OggPacketReader,
    ident: IdentHeader,
    setup: SetupHeader,
    pwr: PreviousWindowRight,
    /// After a reset the stream replays from byte 0, headers included.
    headers_to_skip: u8,
    /// Planar normalized output of the last packet decode.
    last_output: Vec<Vec<f32>>,
    last_output_offset: usize,
    sample_pos: u64,
}

pub(crate) fn open_stream(source: SharedSource) -> CodecResult<Box<dyn DecodeStream>> {
    let mut reader = OggPacketReader::new(source, PagePolicy::AllPages);

    // Find the first page of a Vorbis logical stream and lock onto its
    // serial; its packets are the three headers.
    loop {
        let Some(header) = reader.read_page_header() else {
            warn!("vorbis: no stream start found");
            return Err(CodecError::InvalidFormat);
        };
        let page_size = header.page_size as usize;
        reader.ensure(page_size);
        if reader.buffered().len() < page_size {
            return Err(CodecError::InvalidFormat);
        }

        if header.flags == 0x02 && reader.buffered().starts_with(VORBIS_IDENT_MAGIC) {
            reader.set_serial(header.serial);
            reader.begin_page();
            break;
        }

        reader.consume(page_size);
        if reader.exhausted() {
            return Err(CodecError::InvalidFormat);
        }
    }

    let mut next_header_packet = |reader: &mut OggPacketReader| -> CodecResult<()> {
        match reader.next_packet() {
            Ok(true) => Ok(()),
            _ => Err(CodecError::InvalidFormat),
        }
    };

    next_header_packet(&mut reader)?;
    let ident = read_header_ident(reader.packet_data()).map_err(|_| CodecError::InvalidFormat)?;
    next_header_packet(&mut reader)?;
    read_header_comment(reader.packet_data()).map_err(|_| CodecError::InvalidFormat)?;
    next_header_packet(&mut reader)?;
    let setup = read_header_setup(
        reader.packet_data(),
        ident.audio_channels,
        (ident.blocksize_0, ident.blocksize_1),
    )
    .map_err(|_| CodecError::InvalidFormat)?;

    Ok(Box::new(VorbisStream {
        info: StreamInfo {
            rate: ident.audio_sample_rate,
            channels: ident.audio_channels,
            bits_per_sample: 32,
            is_interleaved: false,
            size: 0, // unknown
        },
        reader,
        ident,
        setup,
        pwr: PreviousWindowRight::new(),
        headers_to_skip: 0,
        last_output: Vec::new(),
        last_output_offset: 0,
        sample_pos: 0,
    }))
}

impl DecodeStream for VorbisStream {
    fn info(&self) -> StreamInfo {
        self.info
    }

    fn decode(&mut self, sink: SampleSink<'_, '_>) -> CodecResult<usize> {
        let needed_frames = sink.budget() / size_of::<f32>();
        let mut planar = match sink {
            SampleSink::Planar(channels) => Some(channels),
            SampleSink::Null(_) => None,
            SampleSink::Interleaved(_) => return Err(CodecError::Unsupported),
        };

        let nc = self.info.channels as usize;
        let mut done_frames = 0usize;

        while done_frames < needed_frames {
            if self.last_output.is_empty() {
                if !self.reader.next_packet()? {
                    break;
                }
                if self.headers_to_skip > 0 {
                    self.headers_to_skip -= 1;
                    continue;
                }

                let decoded: Vec<Vec<f32>> = read_audio_packet_generic(
                    &self.ident,
                    &self.setup,
                    self.reader.packet_data(),
                    &mut self.pwr,
                )
                .map_err(|e| {
                    warn!("vorbis decoder returned an error: {e:?}");
                    CodecError::DecodeError
                })?;

                // The very first audio packet only primes the overlap
                // window and produces nothing
                if decoded.first().is_some_and(|c| !c.is_empty()) {
                    self.last_output = decoded;
                    self.last_output_offset = 0;
                }
            }

            if !self.last_output.is_empty() {
                let total_frames = self.last_output[0].len();
                let out_frames =
                    (total_frames - self.last_output_offset).min(needed_frames - done_frames);

                if let Some(channels) = planar.as_mut() {
                    for (c, channel) in channels.iter_mut().enumerate().take(nc) {
                        if let Some(dest) = channel {
                            let src = &self.last_output[c][self.last_output_offset..];
                            for (i, &s) in src[..out_frames].iter().enumerate() {
                                dest[done_frames + i] = s * 32767.0;
                            }
                        }
                    }
                }

                done_frames += out_frames;
                self.sample_pos += out_frames as u64;
                self.last_output_offset += out_frames;
                if self.last_output_offset >= total_frames {
                    self.last_output.clear();
                    self.last_output_offset = 0;
                }
            }
        }

        if self.reader.exhausted() && done_frames == 0 {
            return Err(CodecError::EndOfStream);
        }
        Ok(done_frames * size_of::<f32>())
    }

    fn reset(&mut self) -> CodecResult<()> {
        self.reader.reset();
        self.pwr = PreviousWindowRight::new();
        self.headers_to_skip = HEADER_PACKETS;
        self.last_output.clear();
        self.last_output_offset = 0;
        self.sample_pos = 0;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.sample_pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{MemSource, build_page};
    use std::sync::Arc;

    #[test]
    fn rejects_garbage() {
        assert!(open_stream(Arc::new(MemSource(vec![0xAB; 256]))).is_err());
    }

    #[test]
    fn rejects_non_vorbis_ogg() {
        let page = build_page(5, 0x02, 0, &[b"OpusHead\x01..."]);
        assert!(open_stream(Arc::new(MemSource(page))).is_err());
    }

    #[test]
    fn rejects_truncated_headers() {
        // A valid-looking BOS page whose ident packet is cut short
        let page = build_page(5, 0x02, 0, &[b"\x01vorbis"]);
        assert!(open_stream(Arc::new(MemSource(page))).is_err());
    }
}
