//! WAV backend: linear PCM (8/16-bit) and IMA ADPCM (4-bit) streaming
//!
//! The RIFF walk assumes header chunks appear before `data`; a file with
//! `data` first cannot be streamed this way and is rejected.

use log::{error, warn};
use pm_core::ReadStatus;

use crate::{CodecError, CodecResult, DecodeStream, SampleSink, SharedSource, StreamInfo};

const WAVE_FORMAT_PCM: u16 = 0x0001;
const WAVE_FORMAT_IMA_ADPCM: u16 = 0x0011;

static IMA_INDEX_TABLE: [i8; 16] = [-1, -1, -1, -1, 2, 4, 6, 8, -1, -1, -1, -1, 2, 4, 6, 8];

static IMA_STEP_TABLE: [i16; 89] = [
    7, 8, 9, 10, 11, 12, 13, 14, 16, 17, 19, 21, 23, 25, 28, 31, 34, 37, 41, 45, 50, 55, 60, 66,
    73, 80, 88, 97, 107, 118, 130, 143, 157, 173, 190, 209, 230, 253, 279, 307, 337, 371, 408,
    449, 494, 544, 598, 658, 724, 796, 876, 963, 1060, 1166, 1282, 1411, 1552, 1707, 1878, 2066,
    2272, 2499, 2749, 3024, 3327, 3660, 4026, 4428, 4871, 5358, 5894, 6484, 7132, 7845, 8630,
    9493, 10442, 11487, 12635, 13899, 15289, 16818, 18500, 20350, 22385, 24623, 27086, 29794,
    32767,
];

#[inline]
fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

#[inline]
fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

struct AdpcmState {
    block_align: usize,
    block_frames: u32,
    in_buffer: Vec<u8>,
    in_offset: usize,
    /// Frames decoded past what the caller asked for, delivered next call.
    out_buffer: Vec<i16>,
    out_frames_offset: usize,
    /// Scratch for one decode burst before it is copied out or staged.
    decode_buf: Vec<i16>,
    pred: [i32; 2],
    step_index: [i32; 2],
    step: [i32; 2],
}

pub(crate) struct WavStream {
    source: SharedSource,
    info: StreamInfo,
    data_offset: u32,
    cursor: u32,
    adpcm: Option<AdpcmState>,
}

pub(crate) fn open_stream(source: SharedSource) -> CodecResult<Box<dyn DecodeStream>> {
    let mut riff = [0u8; 12];
    let (nread, status) = source.read(0, &mut riff);
    if nread < riff.len() {
        warn!("available data too small for a riff header ({status:?})");
        return Err(CodecError::InvalidFormat);
    }

    if &riff[0..4] != b"RIFF" || &riff[8..12] != b"WAVE" {
        warn!(
            "wav: unknown header: chunk {:02x?} format {:02x?}",
            &riff[0..4],
            &riff[8..12]
        );
        return Err(CodecError::InvalidFormat);
    }

    let mut fmt: Option<(u16, u16, u32, u16, u16)> = None;
    let mut data: Option<(u32, u32)> = None;
    let mut current_offset = 12u32;

    while fmt.is_none() || data.is_none() {
        let mut header = [0u8; 8];
        let (nread, _) = source.read(current_offset, &mut header);
        if nread < header.len() {
            // not enough bytes left for a full chunk header
            break;
        }
        let chunk_id = &header[0..4];
        let chunk_size = read_u32(&header, 4);

        if chunk_id == b"fmt " {
            let mut body = [0u8; 16];
            let (nread, _) = source.read(current_offset + 8, &mut body);
            if nread < body.len() {
                error!("wav sound data seems corrupt or truncated");
                return Err(CodecError::InvalidFormat);
            }
            let audio_format = read_u16(&body, 0);
            let num_channels = read_u16(&body, 2);
            let sample_rate = read_u32(&body, 4);
            let block_align = read_u16(&body, 12);
            let bits_per_sample = read_u16(&body, 14);

            let supported = matches!(audio_format, WAVE_FORMAT_PCM | WAVE_FORMAT_IMA_ADPCM)
                && !(audio_format == WAVE_FORMAT_IMA_ADPCM && bits_per_sample != 4);
            if !supported {
                error!(
                    "only 8/16 bit pcm or ima adpcm supported, got format={audio_format:#04x} bitdepth={bits_per_sample}"
                );
                return Err(CodecError::InvalidFormat);
            }
            fmt = Some((audio_format, num_channels, sample_rate, block_align, bits_per_sample));
        } else if chunk_id == b"data" {
            // Ignored when it precedes fmt; such files would need full
            // buffering to stream and the walk never backtracks.
            if fmt.is_some() {
                data = Some((current_offset + 8, chunk_size));
            }
        }

        current_offset = current_offset
            .checked_add(8 + chunk_size)
            .ok_or(CodecError::InvalidFormat)?;
    }

    let (fmt_found, data_found) = (fmt.is_some(), data.is_some());
    let (Some((audio_format, channels, rate, block_align, bits)), Some((data_offset, data_size))) =
        (fmt, data)
    else {
        warn!("wav: format ({fmt_found}) or data ({data_found}) chunk not found");
        return Err(CodecError::InvalidFormat);
    };

    let is_adpcm = audio_format == WAVE_FORMAT_IMA_ADPCM;
    if is_adpcm && !(1..=2).contains(&channels) {
        error!("ima adpcm supports mono or stereo only, got {channels} channels");
        return Err(CodecError::InvalidFormat);
    }
    if is_adpcm && (block_align as usize) < channels as usize * 4 + 1 {
        error!("ima adpcm block align {block_align} too small for {channels} channels");
        return Err(CodecError::InvalidFormat);
    }

    let adpcm = is_adpcm.then(|| AdpcmState {
        block_align: block_align as usize,
        // Frames per block after the per-channel 4-byte headers
        block_frames: if channels == 1 {
            (block_align as u32 - 4) * 2
        } else {
            block_align as u32 - 8
        },
        in_buffer: Vec::with_capacity(block_align as usize),
        in_offset: 0,
        out_buffer: Vec::with_capacity(channels as usize * 8),
        out_frames_offset: 0,
        decode_buf: Vec::new(),
        pred: [0; 2],
        step_index: [0; 2],
        step: [0; 2],
    });

    Ok(Box::new(WavStream {
        source,
        info: StreamInfo {
            rate,
            channels: channels as u8,
            // ADPCM carries 4-bit nibbles but decodes to 16-bit output
            bits_per_sample: if is_adpcm { 16 } else { bits as u8 },
            is_interleaved: true,
            size: data_size,
        },
        data_offset,
        cursor: 0,
        adpcm,
    }))
}

#[inline]
fn decode_nibble(n: u32, pred: &mut i32, step_index: &mut i32, step: &mut i32) -> i16 {
    *step_index = (*step_index + IMA_INDEX_TABLE[(n & 15) as usize] as i32).clamp(0, 88);
    let mut diff = *step >> 3;
    if n & 1 != 0 {
        diff += *step >> 2;
    }
    if n & 2 != 0 {
        diff += *step >> 1;
    }
    if n & 4 != 0 {
        diff += *step;
    }
    *pred = if n & 8 != 0 {
        (*pred - diff).max(-32768)
    } else {
        (*pred + diff).min(32767)
    };
    *step = IMA_STEP_TABLE[*step_index as usize] as i32;
    *pred as i16
}

impl WavStream {
    fn decode_pcm(&mut self, sink: SampleSink<'_, '_>) -> CodecResult<usize> {
        debug_assert!(self.cursor <= self.info.size);
        let n = sink.budget().min((self.info.size - self.cursor) as usize);

        // Data beyond the declared chunk size is not ours; EOS can trigger
        // before the reader runs out of file bytes.
        if n == 0 {
            return Err(CodecError::EndOfStream);
        }

        match sink {
            SampleSink::Interleaved(buf) => {
                let (read, status) = self.source.read(self.data_offset + self.cursor, &mut buf[..n]);
                match status {
                    ReadStatus::Ok | ReadStatus::Partial => {
                        self.cursor += read as u32;
                        Ok(read)
                    }
                    ReadStatus::EndOfStream => Err(CodecError::EndOfStream),
                    ReadStatus::NoData => Ok(0),
                }
            }
            SampleSink::Null(_) => {
                self.cursor += n as u32;
                Ok(n)
            }
            SampleSink::Planar(_) => Err(CodecError::Unsupported),
        }
    }

    fn decode_adpcm(&mut self, sink: SampleSink<'_, '_>) -> CodecResult<usize> {
        debug_assert!(self.cursor <= self.info.size);

        let (mut out, budget): (Option<&mut [u8]>, usize) = match sink {
            SampleSink::Interleaved(buf) => {
                let len = buf.len();
                (Some(buf), len)
            }
            SampleSink::Null(bytes) => (None, bytes),
            SampleSink::Planar(_) => return Err(CodecError::Unsupported),
        };

        let WavStream { source, info, data_offset, cursor, adpcm } = self;
        let st = adpcm.as_mut().expect("adpcm state");

        let channels = info.channels as usize;
        let stride = 2 * channels;
        let min_frames: usize = if channels == 1 { 2 } else { 8 };
        let mut needed = (budget / stride) as i64;
        let mut out_frames = 0usize;
        let mut hit_eos = false;

        // Deliver frames staged by the previous call first
        if !st.out_buffer.is_empty() {
            let frames_in_buffer = st.out_buffer.len() / channels;
            let num = (frames_in_buffer - st.out_frames_offset).min(needed.max(0) as usize);
            if let Some(buf) = out.as_deref_mut() {
                copy_frames(buf, out_frames, &st.out_buffer[st.out_frames_offset * channels..], num, channels);
            }
            needed -= num as i64;
            out_frames += num;
            st.out_frames_offset += num;
            if st.out_frames_offset >= frames_in_buffer {
                st.out_buffer.clear();
            }
        }

        while needed > 0 {
            // Top up the input block buffer (possibly partially)
            if st.in_buffer.len() < st.block_align {
                if *cursor >= info.size {
                    hit_eos = true;
                    break;
                }
                let old_len = st.in_buffer.len();
                let want = (st.block_align - old_len).min((info.size - *cursor) as usize);
                st.in_buffer.resize(old_len + want, 0);
                let (read, status) = source.read(*data_offset + *cursor, &mut st.in_buffer[old_len..]);
                st.in_buffer.truncate(old_len + read);
                match status {
                    ReadStatus::Ok | ReadStatus::Partial => {}
                    ReadStatus::EndOfStream => {
                        hit_eos = true;
                        break;
                    }
                    ReadStatus::NoData => break,
                }
                *cursor += read as u32;
            }

            // Block header: one 16-bit predictor and a step index per channel
            if st.in_offset == 0 {
                if st.in_buffer.len() < channels * 4 {
                    break;
                }
                for c in 0..channels {
                    let base = c * 4;
                    st.pred[c] =
                        i16::from_le_bytes([st.in_buffer[base], st.in_buffer[base + 1]]) as i32;
                    st.step_index[c] = (st.in_buffer[base + 2] as i32).clamp(0, 88);
                    st.step[c] = IMA_STEP_TABLE[st.step_index[c] as usize] as i32;
                }
                st.in_offset = channels * 4;
            }

            // Frames to decode this burst, honoring the block granularity
            let aligned = if (needed as usize) < min_frames {
                min_frames
            } else {
                needed as usize & !(min_frames - 1)
            };
            let avail = if channels == 1 {
                (st.in_buffer.len() - st.in_offset) * 2
            } else {
                (st.in_buffer.len() & !7).saturating_sub(st.in_offset)
            };
            let num = aligned.min(avail);
            if num == 0 {
                break;
            }

            st.decode_buf.clear();
            st.decode_buf.reserve(num * channels);
            let input = &st.in_buffer[st.in_offset..];
            if channels == 1 {
                let mut pred = st.pred[0];
                let mut step_index = st.step_index[0];
                let mut step = st.step[0];
                for &b in &input[..num / 2] {
                    let b = b as u32;
                    st.decode_buf.push(decode_nibble(b, &mut pred, &mut step_index, &mut step));
                    st.decode_buf.push(decode_nibble(b >> 4, &mut pred, &mut step_index, &mut step));
                }
                st.pred[0] = pred;
                st.step_index[0] = step_index;
                st.step[0] = step;
                st.in_offset += num / 2;
            } else {
                // Stereo: 4-byte sub-blocks per channel, 8 frames per 8 bytes
                let mut pred = st.pred;
                let mut step_index = st.step_index;
                let mut step = st.step;
                for pair in input[..num].chunks_exact(8) {
                    let mut blk0 = u32::from_le_bytes([pair[0], pair[1], pair[2], pair[3]]);
                    let mut blk1 = u32::from_le_bytes([pair[4], pair[5], pair[6], pair[7]]);
                    for _ in 0..8 {
                        st.decode_buf.push(decode_nibble(
                            blk0,
                            &mut pred[0],
                            &mut step_index[0],
                            &mut step[0],
                        ));
                        st.decode_buf.push(decode_nibble(
                            blk1,
                            &mut pred[1],
                            &mut step_index[1],
                            &mut step[1],
                        ));
                        blk0 >>= 4;
                        blk1 >>= 4;
                    }
                }
                st.pred = pred;
                st.step_index = step_index;
                st.step = step;
                st.in_offset += num;
            }

            if (needed as usize) < num {
                // Overshot the request: stage the burst, the head is copied
                // out after the loop and the tail next call
                st.out_buffer.clear();
                st.out_buffer.extend_from_slice(&st.decode_buf);
                st.out_frames_offset = 0;
            } else {
                if let Some(buf) = out.as_deref_mut() {
                    copy_frames(buf, out_frames, &st.decode_buf, num, channels);
                }
                out_frames += num;
            }
            needed -= num as i64;

            // Block exhausted?
            if st.in_offset >= st.block_align {
                st.in_offset = 0;
                st.in_buffer.clear();
            }
        }

        if needed < 0 {
            let deliver = (needed + min_frames as i64) as usize;
            if let Some(buf) = out.as_deref_mut() {
                copy_frames(buf, out_frames, &st.out_buffer, deliver, channels);
            }
            st.out_frames_offset = deliver;
            out_frames += deliver;
        }

        let decoded = out_frames * stride;
        if hit_eos && decoded == 0 {
            return Err(CodecError::EndOfStream);
        }
        Ok(decoded)
    }
}

/// Copy `num` interleaved frames into `buf` starting at frame `frame_offset`.
fn copy_frames(buf: &mut [u8], frame_offset: usize, samples: &[i16], num: usize, channels: usize) {
    let start = frame_offset * channels * 2;
    for (i, &s) in samples[..num * channels].iter().enumerate() {
        let bytes = s.to_le_bytes();
        buf[start + i * 2] = bytes[0];
        buf[start + i * 2 + 1] = bytes[1];
    }
}

impl DecodeStream for WavStream {
    fn info(&self) -> StreamInfo {
        self.info
    }

    fn decode(&mut self, sink: SampleSink<'_, '_>) -> CodecResult<usize> {
        if self.adpcm.is_none() {
            self.decode_pcm(sink)
        } else {
            self.decode_adpcm(sink)
        }
    }

    fn skip(&mut self, bytes: usize) -> CodecResult<usize> {
        if self.adpcm.is_none() {
            if self.cursor >= self.info.size {
                return Err(CodecError::EndOfStream);
            }
            let n = bytes.min((self.info.size - self.cursor) as usize);
            self.cursor += n as u32;
            return Ok(n);
        }

        // ADPCM skip decodes and discards; the predictor state must advance
        // exactly as if the data had been delivered.
        let mut skipped = 0usize;
        let mut remaining = bytes;
        let mut scratch = [0u8; 512];
        while remaining > 0 {
            let n = remaining.min(scratch.len());
            match self.decode_adpcm(SampleSink::Interleaved(&mut scratch[..n])) {
                Ok(0) => break,
                Ok(done) => {
                    skipped += done;
                    remaining -= done.min(remaining);
                }
                Err(CodecError::EndOfStream) if skipped != 0 => return Ok(skipped),
                Err(e) => return Err(e),
            }
        }
        Ok(skipped)
    }

    fn reset(&mut self) -> CodecResult<()> {
        self.cursor = 0;
        if let Some(st) = self.adpcm.as_mut() {
            st.in_buffer.clear();
            st.in_offset = 0;
            st.out_buffer.clear();
            st.out_frames_offset = 0;
        }
        Ok(())
    }

    fn position(&self) -> u64 {
        let Some(st) = self.adpcm.as_ref() else {
            let frame_stride =
                (self.info.channels as u64 * self.info.bits_per_sample as u64) >> 3;
            return self.cursor as u64 / frame_stride;
        };

        // Compressed-stream offset of the next undecoded nibble, converted
        // to a decoded-PCM frame index through the block framing.
        let pos = self.cursor as u64 - st.in_buffer.len() as u64 + st.in_offset as u64;
        let block = pos / st.block_align as u64;
        let block_off = (pos - block * st.block_align as u64) as i64;
        let header = if self.info.channels == 1 { 4i64 } else { 8 };
        let in_block = (block_off - header).max(0) as u64;
        let in_block_frames = if self.info.channels == 1 { in_block * 2 } else { in_block };
        block * st.block_frames as u64 + in_block_frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{MemSource, build_wav};
    use std::sync::Arc;

    fn open(bytes: Vec<u8>) -> Box<dyn DecodeStream> {
        open_stream(Arc::new(MemSource(bytes))).expect("open")
    }

    fn pcm16_fixture(frames: usize) -> (Vec<u8>, Vec<i16>) {
        let samples: Vec<i16> = (0..frames).map(|i| (i as i16).wrapping_mul(321)).collect();
        let data: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        (build_wav(WAVE_FORMAT_PCM, 1, 44100, 16, 2, &data), samples)
    }

    /// One mono ADPCM block: 4-byte header + arbitrary nibble payload.
    fn adpcm_mono_fixture(payload_bytes: usize) -> Vec<u8> {
        let mut data = vec![0u8, 0, 0, 0]; // pred 0, step index 0
        data.extend((0..payload_bytes).map(|i| (i * 37 + 11) as u8));
        let block_align = (4 + payload_bytes) as u16;
        build_wav(WAVE_FORMAT_IMA_ADPCM, 1, 16000, 4, block_align, &data)
    }

    #[test]
    fn rejects_data_before_fmt() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&100u32.to_le_bytes());
        bytes.extend_from_slice(b"WAVE");
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&4u32.to_le_bytes());
        bytes.extend_from_slice(&[0, 0, 0, 0]);
        assert!(open_stream(Arc::new(MemSource(bytes))).is_err());
    }

    #[test]
    fn rejects_unknown_magic() {
        assert!(open_stream(Arc::new(MemSource(b"OggS\0\0\0\0\0\0\0\0\0\0".to_vec()))).is_err());
    }

    #[test]
    fn pcm16_streams_declared_data_only() {
        let (mut bytes, samples) = pcm16_fixture(64);
        // trailing junk after the data chunk must be ignored
        bytes.extend_from_slice(&[0xAA; 32]);
        let mut stream = open(bytes);

        assert_eq!(stream.info().rate, 44100);
        assert_eq!(stream.info().bits_per_sample, 16);

        let mut out = vec![0u8; 128];
        assert_eq!(stream.decode(SampleSink::Interleaved(&mut out)).unwrap(), 128);
        let decoded: Vec<i16> = out
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        assert_eq!(decoded, samples);
        assert!(matches!(
            stream.decode(SampleSink::Interleaved(&mut out)),
            Err(CodecError::EndOfStream)
        ));
    }

    #[test]
    fn pcm_reset_round_trip() {
        let (bytes, _) = pcm16_fixture(32);
        let mut stream = open(bytes);
        let mut first = vec![0u8; 40];
        let mut second = vec![0u8; 40];
        stream.decode(SampleSink::Interleaved(&mut first)).unwrap();
        stream.reset().unwrap();
        stream.decode(SampleSink::Interleaved(&mut second)).unwrap();
        assert_eq!(first, second);
        assert_eq!(stream.position(), 20);
    }

    #[test]
    fn pcm_skip_advances_position() {
        let (bytes, _) = pcm16_fixture(32);
        let mut stream = open(bytes);
        assert_eq!(stream.skip(20).unwrap(), 20);
        assert_eq!(stream.position(), 10);
        // clamped at the end of the data chunk
        assert_eq!(stream.skip(1000).unwrap(), 44);
        assert!(matches!(stream.skip(2), Err(CodecError::EndOfStream)));
    }

    #[test]
    fn adpcm_mid_block_requests_match_single_call() {
        let bytes = adpcm_mono_fixture(12); // 24 frames in one block
        let mut reference = open(bytes.clone());
        let mut chunked = open(bytes);

        let mut single = vec![0u8; 12 * 2];
        assert_eq!(
            reference.decode(SampleSink::Interleaved(&mut single)).unwrap(),
            24
        );

        let mut pieces = Vec::new();
        for want in [5usize, 3, 4] {
            let mut buf = vec![0u8; want * 2];
            assert_eq!(chunked.decode(SampleSink::Interleaved(&mut buf)).unwrap(), want * 2);
            pieces.extend_from_slice(&buf);
        }
        assert_eq!(pieces, single);
    }

    #[test]
    fn adpcm_reset_round_trip() {
        let bytes = adpcm_mono_fixture(16);
        let mut stream = open(bytes);
        let mut first = vec![0u8; 20];
        stream.decode(SampleSink::Interleaved(&mut first)).unwrap();
        stream.reset().unwrap();
        let mut second = vec![0u8; 20];
        stream.decode(SampleSink::Interleaved(&mut second)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn adpcm_skip_tracks_decode_state() {
        let bytes = adpcm_mono_fixture(64);
        let mut skipped = open(bytes.clone());
        let mut decoded = open(bytes);

        // skip 10 frames on one stream, decode 10 on the other
        assert_eq!(skipped.skip(20).unwrap(), 20);
        let mut buf = vec![0u8; 20];
        decoded.decode(SampleSink::Interleaved(&mut buf)).unwrap();
        assert_eq!(skipped.position(), decoded.position());

        // both must now produce identical frames
        let mut a = vec![0u8; 16];
        let mut b = vec![0u8; 16];
        skipped.decode(SampleSink::Interleaved(&mut a)).unwrap();
        decoded.decode(SampleSink::Interleaved(&mut b)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn adpcm_stereo_block_layout() {
        // stereo block: 8-byte header + one 8-byte sub-block pair = 8 frames
        let mut data = vec![0u8; 8]; // both channel headers zeroed
        data.extend_from_slice(&[0x11, 0x22, 0x33, 0x44, 0x99, 0xAA, 0xBB, 0xCC]);
        let bytes = build_wav(WAVE_FORMAT_IMA_ADPCM, 2, 16000, 4, 16, &data);
        let mut stream = open(bytes);

        let mut out = vec![0u8; 8 * 4];
        assert_eq!(stream.decode(SampleSink::Interleaved(&mut out)).unwrap(), 32);
        assert_eq!(stream.position(), 8);

        // channel nibbles must not cross: decode channel 0 by hand
        let mut pred = 0i32;
        let mut step_index = 0i32;
        let mut step = IMA_STEP_TABLE[0] as i32;
        let mut blk = 0x44332211u32;
        let mut expected_l = Vec::new();
        for _ in 0..8 {
            expected_l.push(decode_nibble(blk, &mut pred, &mut step_index, &mut step));
            blk >>= 4;
        }
        let got_l: Vec<i16> = out
            .chunks_exact(4)
            .map(|f| i16::from_le_bytes([f[0], f[1]]))
            .collect();
        assert_eq!(got_l, expected_l);
    }

    #[test]
    fn adpcm_position_is_decoded_frame_index() {
        let bytes = adpcm_mono_fixture(12);
        let mut stream = open(bytes);
        assert_eq!(stream.position(), 0);
        let mut out = vec![0u8; 6 * 2];
        stream.decode(SampleSink::Interleaved(&mut out)).unwrap();
        // staging may hold decoded-but-undelivered frames; position tracks
        // the compressed cursor, which sits on a whole nibble byte
        assert_eq!(stream.position(), 6);
    }
}
