//! Codec context: a bounded pool of open decode streams

use log::error;

use crate::{
    CodecError, CodecResult, DecodeStream, Format, SampleSink, SharedSource, StreamInfo,
    find_best_decoder,
};

/// Index into a [`CodecContext`]'s decoder pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderHandle(u16);

struct Slot {
    stream: Box<dyn DecodeStream>,
    name: &'static str,
}

/// Owns up to `max_decoders` open streams, one per playing voice.
pub struct CodecContext {
    slots: Vec<Option<Slot>>,
    free: Vec<u16>,
}

impl CodecContext {
    pub fn new(max_decoders: u32) -> Self {
        let max = max_decoders as usize;
        Self {
            slots: (0..max).map(|_| None).collect(),
            free: (0..max as u16).rev().collect(),
        }
    }

    /// Open a stream for `format` over `source` and park it in a pool slot.
    pub fn new_decoder(&mut self, format: Format, source: SharedSource) -> CodecResult<DecoderHandle> {
        let Some(&index) = self.free.last() else {
            return Err(CodecError::OutOfResources);
        };
        let info = find_best_decoder(format).ok_or(CodecError::Unsupported)?;
        let stream = (info.open)(source)?;
        self.free.pop();
        self.slots[index as usize] = Some(Slot { stream, name: info.name });
        Ok(DecoderHandle(index))
    }

    pub fn delete_decoder(&mut self, handle: DecoderHandle) {
        if self.slots[handle.0 as usize].take().is_some() {
            self.free.push(handle.0);
        }
    }

    fn slot(&mut self, handle: DecoderHandle) -> &mut Slot {
        self.slots[handle.0 as usize]
            .as_mut()
            .expect("decoder handle outlived its slot")
    }

    pub fn info(&mut self, handle: DecoderHandle) -> StreamInfo {
        self.slot(handle).stream.info()
    }

    pub fn decode(&mut self, handle: DecoderHandle, sink: SampleSink<'_, '_>) -> CodecResult<usize> {
        self.slot(handle).stream.decode(sink)
    }

    pub fn skip(&mut self, handle: DecoderHandle, bytes: usize) -> CodecResult<usize> {
        self.slot(handle).stream.skip(bytes)
    }

    pub fn reset(&mut self, handle: DecoderHandle) -> CodecResult<()> {
        self.slot(handle).stream.reset()
    }

    pub fn position(&mut self, handle: DecoderHandle) -> u64 {
        self.slot(handle).stream.position()
    }

    pub fn decoder_name(&mut self, handle: DecoderHandle) -> &'static str {
        self.slot(handle).name
    }
}

impl Drop for CodecContext {
    fn drop(&mut self) {
        let dangling = self.slots.iter().filter(|s| s.is_some()).count();
        if dangling > 0 {
            error!("dangling decoders in codec context ({dangling})");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pm_core::ReadStatus;
    use std::sync::Arc;

    struct Empty;
    impl crate::SoundSource for Empty {
        fn read(&self, _offset: u32, _out: &mut [u8]) -> (usize, ReadStatus) {
            (0, ReadStatus::EndOfStream)
        }
    }

    #[test]
    fn pool_exhaustion_is_reported() {
        let mut ctx = CodecContext::new(0);
        let err = ctx.new_decoder(Format::Wav, Arc::new(Empty)).unwrap_err();
        assert_eq!(err, CodecError::OutOfResources);
    }

    #[test]
    fn failed_open_does_not_leak_slot() {
        let mut ctx = CodecContext::new(1);
        // Empty source cannot be a WAV
        assert!(ctx.new_decoder(Format::Wav, Arc::new(Empty)).is_err());
        assert_eq!(ctx.free.len(), 1);
    }
}
