//! Null device: a real-time sink that plays silence
//!
//! Queued buffers are "played" against the wall clock at the mix rate, so
//! the engine paces itself exactly as it would against real hardware.

use std::collections::VecDeque;
use std::time::Instant;

use pm_core::DspImplHint;

use crate::{Device, DeviceInfo, DeviceResult, OpenDeviceParams, QueueBuffer};

const NULL_MIX_RATE: u32 = 44100;

pub struct NullDevice {
    buffer_count: u32,
    /// Frame counts of queued buffers, oldest first.
    pending: VecDeque<u32>,
    started_at: Option<Instant>,
    /// Frames played before the last stop.
    consumed_base: u64,
    queued_total: u64,
}

impl NullDevice {
    pub fn open(params: &OpenDeviceParams) -> Self {
        Self {
            buffer_count: params.buffer_count.max(1),
            pending: VecDeque::new(),
            started_at: None,
            consumed_base: 0,
            queued_total: 0,
        }
    }

    fn drain(&mut self) {
        let Some(started_at) = self.started_at else {
            return;
        };
        let elapsed = started_at.elapsed().as_secs_f64();
        let played = self.consumed_base + (elapsed * NULL_MIX_RATE as f64) as u64;
        let mut consumed = self.queued_total.saturating_sub(
            self.pending.iter().map(|&f| f as u64).sum::<u64>(),
        );
        while let Some(&front) = self.pending.front() {
            if consumed + front as u64 > played {
                break;
            }
            consumed += front as u64;
            self.pending.pop_front();
        }
    }
}

impl Device for NullDevice {
    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            mix_rate: NULL_MIX_RATE,
            frame_count: 0,
            use_floats: false,
            use_normalized: false,
            use_non_interleaved: false,
            dsp_impl: DspImplHint::Default,
        }
    }

    fn queue(&mut self, _frames: QueueBuffer<'_>, frame_count: u32) -> DeviceResult<()> {
        self.pending.push_back(frame_count);
        self.queued_total += frame_count as u64;
        Ok(())
    }

    fn free_buffer_slots(&mut self) -> u32 {
        self.drain();
        self.buffer_count - (self.pending.len() as u32).min(self.buffer_count)
    }

    fn start(&mut self) {
        if self.started_at.is_none() {
            self.started_at = Some(Instant::now());
        }
    }

    fn stop(&mut self) {
        if let Some(started_at) = self.started_at.take() {
            let elapsed = started_at.elapsed().as_secs_f64();
            self.consumed_base += (elapsed * NULL_MIX_RATE as f64) as u64;
        }
    }
}
