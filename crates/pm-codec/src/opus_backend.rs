//! Opus-in-Ogg backend
//!
//! Parses the Ogg containment itself (shared page reader), feeds complete
//! packets to an Opus decoder, applies the OpusHead pre-skip and output
//! gain, and delivers planar f32 at int16 magnitude.

use log::warn;

use crate::ogg::{OggPacketReader, PagePolicy};
use crate::{CodecError, CodecResult, DecodeStream, SampleSink, SharedSource, StreamInfo};

/// Largest Opus frame: 120 ms at 48 kHz, per channel.
const MAX_FRAME_SAMPLES: usize = 5760;

/// Decoder rates the Opus API accepts, ascending.
const DECODER_RATES: [u32; 5] = [8000, 12000, 16000, 24000, 48000];

struct OpusHead {
    channels: u8,
    pre_skip: u16,
    rate: u32,
    sample_scale: f32,
}

fn parse_opus_head(payload: &[u8]) -> CodecResult<OpusHead> {
    // Version byte follows the 8-byte magic
    if payload[8] != 0x01 {
        return Err(CodecError::InvalidFormat);
    }

    let channels = payload[9];
    let pre_skip = u16::from_le_bytes([payload[10], payload[11]]);
    let input_rate = u32::from_le_bytes([payload[12], payload[13], payload[14], payload[15]]);
    let gain = u16::from_le_bytes([payload[16], payload[17]]);
    let mapping_family = payload[18];

    // Mapping family zero covers exactly the mono/stereo layouts we mix
    if mapping_family != 0 || !(1..=2).contains(&channels) {
        warn!("opus: unsupported channel mapping family {mapping_family} ({channels} ch)");
        return Err(CodecError::InvalidFormat);
    }

    // Input rate is advisory (pre-encode); decode at the smallest supported
    // rate covering it, never above 48 kHz. 0 means unspecified.
    let max_rate = *DECODER_RATES.last().unwrap();
    let target = if input_rate > 0 { input_rate.min(max_rate) } else { max_rate };
    let rate = DECODER_RATES.iter().copied().find(|&r| r >= target).unwrap_or(max_rate);

    let sample_scale =
        if gain == 0 { 1.0 } else { 10.0f32.powf(gain as f32 / (20.0 * 256.0)) };

    Ok(OpusHead { channels, pre_skip, rate, sample_scale })
}

pub(crate) struct OpusStream {
    info: StreamInfo,
    reader: OggPacketReader,
    decoder: opus::Decoder,
    pre_skip: u16,
    sample_scale: f32,
    /// Frames delivered to the caller (post pre-skip).
    sample_pos: u32,
    /// Raw frames produced by the decoder, including pre-skip.
    decode_sample_pos: u32,
    /// Interleaved normalized output of the last packet decode.
    last_output: Vec<f32>,
    /// Consumed frames of `last_output`, pre-skip included.
    last_output_offset: usize,
    scratch: Vec<f32>,
}

fn opus_channels(channels: u8) -> opus::Channels {
    if channels == 1 { opus::Channels::Mono } else { opus::Channels::Stereo }
}

pub(crate) fn open_stream(source: SharedSource) -> CodecResult<Box<dyn DecodeStream>> {
    // Stream setup assumes the data needed for initialization is readable
    // up front; a streaming source must be primed that far.
    let mut reader = OggPacketReader::new(source, PagePolicy::SkipOpusHeaderPages);

    let head = loop {
        let Some(header) = reader.read_page_header() else {
            return Err(CodecError::InvalidFormat);
        };
        let page_size = header.page_size as usize;
        reader.ensure(page_size);
        if reader.buffered().len() < page_size {
            return Err(CodecError::InvalidFormat);
        }

        // First page of a logical stream, long enough for an OpusHead?
        if header.flags == 0x02 && page_size >= 19 && reader.buffered().starts_with(b"OpusHead") {
            let head = parse_opus_head(reader.buffered())?;
            reader.set_serial(header.serial);
            reader.consume(page_size);
            break head;
        }

        reader.consume(page_size.min(reader.buffered().len()));
        if reader.exhausted() {
            return Err(CodecError::InvalidFormat);
        }
    };

    let decoder = opus::Decoder::new(head.rate, opus_channels(head.channels))
        .map_err(|_| CodecError::InvalidFormat)?;

    Ok(Box::new(OpusStream {
        info: StreamInfo {
            rate: head.rate,
            channels: head.channels,
            bits_per_sample: 32,
            is_interleaved: false,
            size: 0, // unknown
        },
        reader,
        decoder,
        pre_skip: head.pre_skip,
        sample_scale: head.sample_scale,
        sample_pos: 0,
        decode_sample_pos: 0,
        last_output: Vec::new(),
        last_output_offset: 0,
        scratch: vec![0.0; MAX_FRAME_SAMPLES * head.channels as usize],
    }))
}

impl DecodeStream for OpusStream {
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
            // Pull and decode the next packet once the previous block drains
            if self.last_output.is_empty() {
                if !self.reader.next_packet()? {
                    break;
                }
                let packet = self.reader.packet_data();
                let frames = self
                    .decoder
                    .decode_float(packet, &mut self.scratch, false)
                    .map_err(|_| CodecError::DecodeError)?;
                if frames == 0 {
                    continue;
                }

                // The first pre_skip frames of the logical stream are codec
                // warm-up and never reach the caller
                self.last_output_offset = if self.decode_sample_pos < self.pre_skip as u32 {
                    (self.pre_skip as u32 - self.decode_sample_pos).min(frames as u32) as usize
                } else {
                    0
                };
                self.decode_sample_pos += frames as u32;
                self.last_output.clear();
                self.last_output.extend_from_slice(&self.scratch[..frames * nc]);
            }

            if !self.last_output.is_empty() {
                let total_frames = self.last_output.len() / nc;
                let out_frames =
                    (total_frames - self.last_output_offset).min(needed_frames - done_frames);

                if let Some(channels) = planar.as_mut() {
                    // Opus floats are normalized; scale up to the mixer's
                    // int16-magnitude pipeline along with the header gain
                    let scale = self.sample_scale * 32767.0;
                    for (c, channel) in channels.iter_mut().enumerate().take(nc) {
                        if let Some(dest) = channel {
                            let src = &self.last_output[self.last_output_offset * nc..];
                            for (i, frame) in src.chunks_exact(nc).take(out_frames).enumerate() {
                                dest[done_frames + i] = frame[c] * scale;
                            }
                        }
                    }
                }

                done_frames += out_frames;
                self.sample_pos += out_frames as u32;
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
        // Restart the data stream; the header page is not re-parsed, the
        // packet reader skips it by its `Opus` magic
        self.reader.reset();
        self.last_output.clear();
        self.last_output_offset = 0;
        self.sample_pos = 0;
        self.decode_sample_pos = 0;
        self.decoder = opus::Decoder::new(self.info.rate, opus_channels(self.info.channels))
            .map_err(|_| CodecError::DecodeError)?;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.sample_pos as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{MemSource, build_page};
    use std::sync::Arc;

    fn opus_head_page(serial: u32, channels: u8, pre_skip: u16, rate: u32) -> Vec<u8> {
        let mut head = Vec::new();
        head.extend_from_slice(b"OpusHead");
        head.push(1); // version
        head.push(channels);
        head.extend_from_slice(&pre_skip.to_le_bytes());
        head.extend_from_slice(&rate.to_le_bytes());
        head.extend_from_slice(&0u16.to_le_bytes()); // output gain
        head.push(0); // mapping family
        build_page(serial, 0x02, 0, &[&head])
    }

    fn opus_tags_page(serial: u32) -> Vec<u8> {
        let mut tags = Vec::new();
        tags.extend_from_slice(b"OpusTags");
        tags.extend_from_slice(&4u32.to_le_bytes());
        tags.extend_from_slice(b"test");
        tags.extend_from_slice(&0u32.to_le_bytes());
        build_page(serial, 0, 1, &[&tags])
    }

    /// Encode `frames` of a sine into Ogg/Opus (mono, 48 kHz, 960-frame
    /// packets).
    fn encoded_fixture(frames: usize, pre_skip: u16) -> Vec<u8> {
        let serial = 0x5EED;
        let mut bytes = opus_head_page(serial, 1, pre_skip, 48000);
        bytes.extend(opus_tags_page(serial));

        let mut encoder =
            opus::Encoder::new(48000, opus::Channels::Mono, opus::Application::Audio).unwrap();
        let mut sequence = 2u32;
        let mut produced = 0usize;
        while produced < frames {
            let block: Vec<f32> = (0..960)
                .map(|i| ((produced + i) as f32 * 0.05).sin() * 0.5)
                .collect();
            let packet = encoder.encode_vec_float(&block, 4000).unwrap();
            bytes.extend(build_page(serial, 0, sequence, &[&packet]));
            sequence += 1;
            produced += 960;
        }
        bytes
    }

    fn open(bytes: Vec<u8>) -> Box<dyn DecodeStream> {
        open_stream(Arc::new(MemSource(bytes))).expect("open")
    }

    #[test]
    fn parses_opus_head() {
        let stream = open(encoded_fixture(960, 0));
        let info = stream.info();
        assert_eq!(info.rate, 48000);
        assert_eq!(info.channels, 1);
        assert_eq!(info.bits_per_sample, 32);
        assert!(!info.is_interleaved);
        assert_eq!(info.size, 0);
    }

    #[test]
    fn decoder_rate_ladder() {
        for (input_rate, expect) in
            [(0u32, 48000u32), (8000, 8000), (11025, 12000), (22050, 24000), (44100, 48000), (96000, 48000)]
        {
            let serial = 1;
            let bytes = opus_head_page(serial, 1, 0, input_rate);
            // Header alone is enough to negotiate the rate
            let mut all = bytes;
            all.extend(opus_tags_page(serial));
            let stream = open_stream(Arc::new(MemSource(all))).unwrap();
            assert_eq!(stream.info().rate, expect, "input rate {input_rate}");
        }
    }

    #[test]
    fn rejects_non_opus_streams() {
        assert!(open_stream(Arc::new(MemSource(vec![0u8; 64]))).is_err());
        let alien = build_page(9, 0x02, 0, &[b"\x01vorbis..."]);
        assert!(open_stream(Arc::new(MemSource(alien))).is_err());
    }

    #[test]
    fn rejects_unsupported_mapping_family() {
        let mut head = Vec::new();
        head.extend_from_slice(b"OpusHead");
        head.push(1);
        head.push(6); // 5.1
        head.extend_from_slice(&0u16.to_le_bytes());
        head.extend_from_slice(&48000u32.to_le_bytes());
        head.extend_from_slice(&0u16.to_le_bytes());
        head.push(1); // mapping family 1
        let bytes = build_page(2, 0x02, 0, &[&head]);
        assert!(open_stream(Arc::new(MemSource(bytes))).is_err());
    }

    #[test]
    fn pre_skip_frames_are_discarded() {
        let encoded_frames = 4 * 960;
        let pre_skip = 312u16;
        let mut stream = open(encoded_fixture(encoded_frames, pre_skip));

        let mut total = 0usize;
        let mut buf = vec![0.0f32; 1024];
        loop {
            let mut channels = [Some(buf.as_mut_slice())];
            match stream.decode(SampleSink::Planar(&mut channels)) {
                Ok(bytes) => total += bytes / 4,
                Err(CodecError::EndOfStream) => break,
                Err(e) => panic!("{e}"),
            }
        }
        assert_eq!(total, encoded_frames - pre_skip as usize);
    }

    #[test]
    fn skip_tracks_decode_position() {
        let bytes = encoded_fixture(4 * 960, 0);
        let mut decoded = open(bytes.clone());
        let mut skipped = open(bytes);

        let mut buf = vec![0.0f32; 1000];
        let mut channels = [Some(buf.as_mut_slice())];
        let n = decoded.decode(SampleSink::Planar(&mut channels)).unwrap();
        let m = skipped.skip(1000 * 4).unwrap();
        assert_eq!(n, m);
        assert_eq!(decoded.position(), skipped.position());
    }

    #[test]
    fn reset_replays_identical_output() {
        let mut stream = open(encoded_fixture(2 * 960, 0));
        let mut first = vec![0.0f32; 960];
        let mut second = vec![0.0f32; 960];
        {
            let mut channels = [Some(first.as_mut_slice())];
            stream.decode(SampleSink::Planar(&mut channels)).unwrap();
        }
        stream.reset().unwrap();
        assert_eq!(stream.position(), 0);
        {
            let mut channels = [Some(second.as_mut_slice())];
            stream.decode(SampleSink::Planar(&mut channels)).unwrap();
        }
        assert_eq!(first, second);
    }
}
