//! Loopback device: captures everything the mixer queues
//!
//! Deterministic test transport. A fixed number of buffer slots frees up
//! every `free_buffer_slots` poll, so one engine update mixes a known
//! number of buffers, and every queued sample lands in the shared capture.

use std::sync::Arc;

use parking_lot::Mutex;
use pm_core::DspImplHint;

use crate::{Device, DeviceInfo, DeviceResult, OpenDeviceParams, QueueBuffer};

const LOOPBACK_MIX_RATE: u32 = 44100;

/// Everything queued so far, interleaved stereo i16 (float output is
/// converted on capture).
#[derive(Default)]
pub struct LoopbackCapture {
    pub samples: Vec<i16>,
    pub buffers_queued: u32,
    pub starts: u32,
    pub stops: u32,
}

impl LoopbackCapture {
    pub fn frames(&self) -> usize {
        self.samples.len() / 2
    }
}

pub struct LoopbackDevice {
    slots_per_poll: u32,
    capture: Arc<Mutex<LoopbackCapture>>,
}

impl LoopbackDevice {
    pub fn open(params: &OpenDeviceParams) -> Self {
        Self {
            slots_per_poll: params.buffer_count.max(1),
            capture: Arc::new(Mutex::new(LoopbackCapture::default())),
        }
    }

    /// Handle to the capture; clone before handing the device to the engine.
    pub fn capture(&self) -> Arc<Mutex<LoopbackCapture>> {
        Arc::clone(&self.capture)
    }
}

impl Device for LoopbackDevice {
    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            mix_rate: LOOPBACK_MIX_RATE,
            frame_count: 0,
            use_floats: false,
            use_normalized: false,
            use_non_interleaved: false,
            dsp_impl: DspImplHint::Default,
        }
    }

    fn queue(&mut self, frames: QueueBuffer<'_>, frame_count: u32) -> DeviceResult<()> {
        let mut capture = self.capture.lock();
        match frames {
            QueueBuffer::S16Interleaved(samples) => {
                capture.samples.extend_from_slice(&samples[..frame_count as usize * 2]);
            }
            QueueBuffer::F32Planar(samples) => {
                let n = frame_count as usize;
                for i in 0..n {
                    capture.samples.push(samples[i] as i16);
                    capture.samples.push(samples[n + i] as i16);
                }
            }
        }
        capture.buffers_queued += 1;
        Ok(())
    }

    fn free_buffer_slots(&mut self) -> u32 {
        self.slots_per_poll
    }

    fn start(&mut self) {
        self.capture.lock().starts += 1;
    }

    fn stop(&mut self) {
        self.capture.lock().stops += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_queued_samples() {
        let mut device = LoopbackDevice::open(&OpenDeviceParams { buffer_count: 1, frame_count: 0 });
        let capture = device.capture();

        device.queue(QueueBuffer::S16Interleaved(&[1, 2, 3, 4]), 2).unwrap();
        assert_eq!(capture.lock().samples, vec![1, 2, 3, 4]);
        assert_eq!(capture.lock().frames(), 2);
        assert_eq!(device.free_buffer_slots(), 1);
    }
}
