//! Ogg containment: page headers, lacing tables, packet assembly
//!
//! A small state machine shared by the Opus and Vorbis backends. At any
//! point the reader is either between pages (no active lacing table),
//! inside a page (walking lacing segments into the packet buffer), or
//! skipping an alien page payload byte-wise. Transitions are driven by
//! whatever bytes the [`SoundSource`] can currently serve, so a dry
//! streaming source simply pauses progress.

use log::warn;
use pm_core::ReadStatus;

use crate::{CodecError, CodecResult, SharedSource};

/// Input buffer size; one read block. Large enough to hold any page plus
/// its header.
pub(crate) const STREAM_BLOCK_SIZE: usize = 16 << 10;

/// Sanity cap for one assembled packet.
const MAX_PACKET_SIZE: usize = 64 << 10;

/// Sentinel: no active lacing table.
const NO_PAGE: usize = usize::MAX;

/// Backend-specific page policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PagePolicy {
    /// Deliver every matching-serial page as packet data (Vorbis; its
    /// header packets are ordinary packets).
    AllPages,
    /// Skip matching-serial pages whose payload starts with `Opus`
    /// (`OpusHead`/`OpusTags` pages are parsed at open, never re-decoded).
    SkipOpusHeaderPages,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct PageHeader {
    pub flags: u8,
    pub serial: u32,
    pub page_size: u32,
}

pub(crate) struct OggPacketReader {
    source: SharedSource,
    policy: PagePolicy,
    stream_offset: u32,
    buffer: Vec<u8>,
    eos: bool,
    /// Serial of the logical stream we follow; pages with any other serial
    /// are skipped wholesale.
    serial: Option<u32>,
    lacing_table: [u8; 255],
    lacing_size: usize,
    lacing_index: usize,
    skip_bytes: usize,
    packet: Vec<u8>,
    packet_ready: bool,
}

impl OggPacketReader {
    pub fn new(source: SharedSource, policy: PagePolicy) -> Self {
        Self {
            source,
            policy,
            stream_offset: 0,
            buffer: Vec::with_capacity(STREAM_BLOCK_SIZE),
            eos: false,
            serial: None,
            lacing_table: [0; 255],
            lacing_size: 0,
            lacing_index: NO_PAGE,
            skip_bytes: 0,
            packet: Vec::new(),
            packet_ready: false,
        }
    }

    pub fn set_serial(&mut self, serial: u32) {
        self.serial = Some(serial);
    }

    /// Enter the page whose header [`Self::read_page_header`] just parsed:
    /// subsequent [`Self::next_packet`] calls walk its lacing segments
    /// instead of scanning for a new page.
    pub fn begin_page(&mut self) {
        self.lacing_index = if self.lacing_size == 0 { NO_PAGE } else { 0 };
    }

    /// No more progress possible: source exhausted and buffer drained.
    pub fn exhausted(&self) -> bool {
        self.eos && self.buffer.is_empty()
    }

    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    /// Drop `consumed` bytes off the front, compacting the rest so the
    /// parsers always see one contiguous chunk.
    pub fn consume(&mut self, consumed: usize) {
        if consumed == 0 {
            return;
        }
        debug_assert!(consumed <= self.buffer.len());
        self.buffer.drain(..consumed.min(self.buffer.len()));
    }

    /// Top the buffer up to at least `min_bytes` if the source allows.
    pub fn ensure(&mut self, min_bytes: usize) {
        let have = self.buffer.len();
        if have >= min_bytes {
            return;
        }
        let want = min_bytes - have;
        self.buffer.resize(have + want, 0);
        let (read, status) = self.source.read(self.stream_offset, &mut self.buffer[have..]);
        self.buffer.truncate(have + read);
        match status {
            ReadStatus::Ok | ReadStatus::Partial => {
                self.stream_offset += read as u32;
            }
            ReadStatus::EndOfStream => self.eos = true,
            ReadStatus::NoData => {}
        }
    }

    /// Parse the next page header (sync scan + 27-byte header + lacing
    /// table), leaving the buffer positioned at the page payload.
    ///
    /// `None` means "cannot parse one right now": dry source, end of
    /// stream, or a partial header still waiting for bytes.
    pub fn read_page_header(&mut self) -> Option<PageHeader> {
        loop {
            self.ensure(27 + 255);
            if self.buffer.len() < 4 {
                return None;
            }

            // [0..4]  'OggS'
            // [4]     version (0)
            // [5]     header type flags (0x01 continued, 0x02 BOS, 0x04 EOS)
            // [6..14] absolute granule position
            // [14..18] stream serial
            // [18..22] page sequence
            // [22..26] checksum
            // [26]    lacing table size, then the table itself
            if &self.buffer[0..4] == b"OggS" {
                if self.buffer.len() < 27 {
                    return None;
                }
                let flags = self.buffer[5];
                let serial = u32::from_le_bytes([
                    self.buffer[14],
                    self.buffer[15],
                    self.buffer[16],
                    self.buffer[17],
                ]);
                let segments = self.buffer[26] as usize;
                if self.buffer.len() < 27 + segments {
                    return None;
                }

                let mut page_size = 0u32;
                for i in 0..segments {
                    self.lacing_table[i] = self.buffer[27 + i];
                    page_size += self.lacing_table[i] as u32;
                }
                self.lacing_size = segments;
                self.consume(27 + segments);
                return Some(PageHeader { flags, serial, page_size });
            }

            // Resync: scan forward for the capture pattern. Well-formed
            // streams never get here since we only read from page starts.
            match self.buffer.iter().position(|&b| b == b'O') {
                Some(0) => self.consume(1),
                Some(p) => self.consume(p),
                None => {
                    let drop = self.buffer.len();
                    self.consume(drop);
                }
            }
            if self.exhausted() {
                return None;
            }
        }
    }

    /// Assemble the next complete packet of the followed stream.
    ///
    /// `Ok(true)` leaves the packet in [`Self::packet_data`]. `Ok(false)`
    /// means no complete packet is available right now; retry after more
    /// source data arrives, or give up at [`Self::exhausted`].
    pub fn next_packet(&mut self) -> CodecResult<bool> {
        if self.packet_ready {
            self.packet.clear();
            self.packet_ready = false;
        }

        loop {
            if self.lacing_index == NO_PAGE && self.skip_bytes == 0 {
                let Some(header) = self.read_page_header() else {
                    return Ok(false);
                };

                let mut is_data = false;
                if Some(header.serial) == self.serial {
                    is_data = match self.policy {
                        PagePolicy::AllPages => true,
                        PagePolicy::SkipOpusHeaderPages => {
                            self.ensure(4);
                            !self.buffer.starts_with(b"Opus")
                        }
                    };
                }
                if is_data && self.lacing_size > 0 {
                    self.lacing_index = 0;
                } else if !is_data {
                    self.skip_bytes = header.page_size as usize;
                }
            }

            if self.lacing_index != NO_PAGE {
                let segment_size = self.lacing_table[self.lacing_index] as usize;

                if segment_size > 0 {
                    self.ensure(STREAM_BLOCK_SIZE);
                    if self.buffer.len() < segment_size {
                        return Ok(false);
                    }
                    if self.packet.len() + segment_size > MAX_PACKET_SIZE {
                        warn!("ogg packet exceeds {MAX_PACKET_SIZE} bytes");
                        return Err(CodecError::DecodeError);
                    }
                    self.packet.extend_from_slice(&self.buffer[..segment_size]);
                    self.consume(segment_size);
                }

                self.lacing_index += 1;
                if self.lacing_index == self.lacing_size {
                    self.lacing_index = NO_PAGE;
                }

                // A segment shorter than 255 terminates the packet
                if segment_size < 255 {
                    self.packet_ready = true;
                    return Ok(true);
                }
            } else {
                // Alien or header page: drain its payload
                while self.skip_bytes > 0 {
                    if self.buffer.is_empty() {
                        self.ensure(STREAM_BLOCK_SIZE);
                        if self.buffer.is_empty() {
                            break;
                        }
                    }
                    let chunk = self.buffer.len().min(self.skip_bytes);
                    self.consume(chunk);
                    self.skip_bytes -= chunk;
                }
                if self.skip_bytes > 0 {
                    return Ok(false);
                }
            }

            if self.exhausted() {
                return Ok(false);
            }
        }
    }

    /// The packet produced by the last successful [`Self::next_packet`].
    pub fn packet_data(&self) -> &[u8] {
        debug_assert!(self.packet_ready);
        &self.packet
    }

    /// Rewind to byte 0. Stream selection (serial) survives; all parse
    /// state is dropped.
    pub fn reset(&mut self) {
        self.stream_offset = 0;
        self.buffer.clear();
        self.eos = false;
        self.lacing_index = NO_PAGE;
        self.lacing_size = 0;
        self.skip_bytes = 0;
        self.packet.clear();
        self.packet_ready = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{MemSource, build_page};
    use std::sync::Arc;

    fn reader(bytes: Vec<u8>, policy: PagePolicy) -> OggPacketReader {
        OggPacketReader::new(Arc::new(MemSource(bytes)), policy)
    }

    #[test]
    fn assembles_packets_within_a_page() {
        let page = build_page(7, 0x02, 0, &[b"alpha", b"beta"]);
        let mut r = reader(page, PagePolicy::AllPages);
        r.set_serial(7);

        assert!(r.next_packet().unwrap());
        assert_eq!(r.packet_data(), b"alpha");
        assert!(r.next_packet().unwrap());
        assert_eq!(r.packet_data(), b"beta");
        assert!(!r.next_packet().unwrap());
    }

    #[test]
    fn reassembles_packet_across_lacing_boundary() {
        let big = vec![0x5Au8; 600]; // needs 255+255+90 lacing entries
        let page = build_page(9, 0, 0, &[&big]);
        let mut r = reader(page, PagePolicy::AllPages);
        r.set_serial(9);

        assert!(r.next_packet().unwrap());
        assert_eq!(r.packet_data(), big.as_slice());
    }

    #[test]
    fn skips_alien_serials() {
        let mut bytes = build_page(1, 0, 0, &[b"alien"]);
        bytes.extend(build_page(2, 0, 0, &[b"ours"]));
        let mut r = reader(bytes, PagePolicy::AllPages);
        r.set_serial(2);

        assert!(r.next_packet().unwrap());
        assert_eq!(r.packet_data(), b"ours");
    }

    #[test]
    fn skips_opus_header_pages() {
        let mut bytes = build_page(3, 0x02, 0, &[b"OpusHead-ish"]);
        bytes.extend(build_page(3, 0, 1, &[b"OpusTags-ish"]));
        bytes.extend(build_page(3, 0, 2, &[b"payload"]));
        let mut r = reader(bytes, PagePolicy::SkipOpusHeaderPages);
        r.set_serial(3);

        assert!(r.next_packet().unwrap());
        assert_eq!(r.packet_data(), b"payload");
    }

    #[test]
    fn reset_restarts_from_byte_zero() {
        let page = build_page(4, 0, 0, &[b"first"]);
        let mut r = reader(page, PagePolicy::AllPages);
        r.set_serial(4);
        assert!(r.next_packet().unwrap());
        r.reset();
        assert!(r.next_packet().unwrap());
        assert_eq!(r.packet_data(), b"first");
    }
}
