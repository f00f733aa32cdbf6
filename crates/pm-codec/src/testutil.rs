//! Shared decoder test fixtures

use crate::SoundSource;
use pm_core::ReadStatus;

/// In-memory byte source with the engine's clamped-read semantics.
pub(crate) struct MemSource(pub Vec<u8>);

impl SoundSource for MemSource {
    fn read(&self, offset: u32, out: &mut [u8]) -> (usize, ReadStatus) {
        let offset = offset as usize;
        if offset >= self.0.len() || out.is_empty() {
            return (0, if out.is_empty() { ReadStatus::Ok } else { ReadStatus::EndOfStream });
        }
        let n = out.len().min(self.0.len() - offset);
        out[..n].copy_from_slice(&self.0[offset..offset + n]);
        let status = if n < out.len() { ReadStatus::Partial } else { ReadStatus::Ok };
        (n, status)
    }
}

/// Assemble a minimal RIFF/WAVE file around a raw `data` payload.
pub(crate) fn build_wav(
    audio_format: u16,
    channels: u16,
    rate: u32,
    bits: u16,
    block_align: u16,
    data: &[u8],
) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data.len() as u32).to_le_bytes());
    out.extend_from_slice(b"WAVE");

    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&audio_format.to_le_bytes());
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&rate.to_le_bytes());
    let byte_rate = rate * channels as u32 * bits as u32 / 8;
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&bits.to_le_bytes());

    out.extend_from_slice(b"data");
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(data);
    out
}

/// Serialize one Ogg page with a proper lacing table for `packets`.
pub(crate) fn build_page(serial: u32, flags: u8, sequence: u32, packets: &[&[u8]]) -> Vec<u8> {
    let mut lacing = Vec::new();
    for p in packets {
        let mut left = p.len();
        loop {
            let seg = left.min(255);
            lacing.push(seg as u8);
            left -= seg;
            if seg < 255 {
                break;
            }
        }
    }
    assert!(lacing.len() <= 255);

    let mut page = Vec::new();
    page.extend_from_slice(b"OggS");
    page.push(0);
    page.push(flags);
    page.extend_from_slice(&[0u8; 8]); // granule
    page.extend_from_slice(&serial.to_le_bytes());
    page.extend_from_slice(&sequence.to_le_bytes());
    page.extend_from_slice(&[0u8; 4]); // checksum, unchecked
    page.push(lacing.len() as u8);
    page.extend_from_slice(&lacing);
    for p in packets {
        page.extend_from_slice(p);
    }
    page
}
