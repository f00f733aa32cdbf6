//! Default device: cpal output stream behind a lock-free ring
//!
//! `queue` pushes i16 frames into an rtrb ring; a dedicated audio thread
//! owns the cpal stream (cpal streams are not `Send`) and its callback
//! drains the ring, zero-filling on underrun. `start`/`stop` toggle a flag
//! the audio thread applies to the stream.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use cpal::SampleFormat;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{error, warn};
use pm_core::DspImplHint;
use rtrb::{Producer, RingBuffer};

use crate::{Device, DeviceError, DeviceInfo, DeviceResult, OpenDeviceParams, QueueBuffer};

const CHANNELS: usize = 2;

struct Shared {
    started: AtomicBool,
    shutdown: AtomicBool,
    alive: AtomicBool,
}

pub struct CpalDevice {
    info: DeviceInfo,
    frame_count: u32,
    producer: Producer<i16>,
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

fn default_output_rate() -> DeviceResult<u32> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| DeviceError::Init("no output device".to_string()))?;
    let config = device
        .default_output_config()
        .map_err(|e| DeviceError::Init(e.to_string()))?;
    Ok(config.sample_rate())
}

impl CpalDevice {
    pub fn open(params: &OpenDeviceParams) -> DeviceResult<Self> {
        let mix_rate = default_output_rate()?;
        let frame_count = if params.frame_count != 0 {
            params.frame_count
        } else {
            pm_core::default_frame_count(mix_rate)
        };
        let buffer_count = params.buffer_count.max(2);

        let ring_len = frame_count as usize * CHANNELS * buffer_count as usize;
        let (producer, mut consumer) = RingBuffer::<i16>::new(ring_len);

        let shared = Arc::new(Shared {
            started: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            alive: AtomicBool::new(true),
        });

        let thread_shared = Arc::clone(&shared);
        let thread = std::thread::Builder::new()
            .name("pm-audio-out".to_string())
            .spawn(move || {
                let host = cpal::default_host();
                let Some(device) = host.default_output_device() else {
                    error!("audio output device disappeared");
                    thread_shared.alive.store(false, Ordering::Release);
                    return;
                };
                let supported = match device.default_output_config() {
                    Ok(c) => c,
                    Err(e) => {
                        error!("no default output config: {e}");
                        thread_shared.alive.store(false, Ordering::Release);
                        return;
                    }
                };
                if supported.sample_format() != SampleFormat::F32 {
                    warn!("output sample format {:?}, converting from f32", supported.sample_format());
                }
                let config = cpal::StreamConfig {
                    channels: CHANNELS as u16,
                    sample_rate: supported.sample_rate(),
                    buffer_size: cpal::BufferSize::Default,
                };

                let callback_shared = Arc::clone(&thread_shared);
                let stream = device.build_output_stream(
                    &config,
                    move |data: &mut [f32], _| {
                        if !callback_shared.started.load(Ordering::Acquire) {
                            data.fill(0.0);
                            return;
                        }
                        for sample in data.iter_mut() {
                            *sample = match consumer.pop() {
                                Ok(s) => s as f32 / 32768.0,
                                Err(_) => 0.0, // underrun
                            };
                        }
                    },
                    |e| error!("output stream error: {e}"),
                    None,
                );
                let stream = match stream {
                    Ok(s) => s,
                    Err(e) => {
                        error!("failed to build output stream: {e}");
                        thread_shared.alive.store(false, Ordering::Release);
                        return;
                    }
                };

                let mut playing = false;
                while !thread_shared.shutdown.load(Ordering::Acquire) {
                    let want_playing = thread_shared.started.load(Ordering::Acquire);
                    if want_playing != playing {
                        if want_playing {
                            if let Err(e) = stream.play() {
                                error!("stream state change failed: {e}");
                            }
                        } else if let Err(e) = stream.pause() {
                            error!("stream state change failed: {e}");
                        }
                        playing = want_playing;
                    }
                    std::thread::sleep(Duration::from_millis(2));
                }
            })
            .map_err(|e| DeviceError::Init(e.to_string()))?;

        Ok(Self {
            info: DeviceInfo {
                mix_rate,
                frame_count: 0,
                use_floats: false,
                use_normalized: false,
                use_non_interleaved: false,
                dsp_impl: DspImplHint::Default,
            },
            frame_count,
            producer,
            shared,
            thread: Some(thread),
        })
    }
}

impl Device for CpalDevice {
    fn info(&self) -> DeviceInfo {
        self.info
    }

    fn queue(&mut self, frames: QueueBuffer<'_>, frame_count: u32) -> DeviceResult<()> {
        let QueueBuffer::S16Interleaved(samples) = frames else {
            return Err(DeviceError::Stream("device negotiated s16 interleaved output".into()));
        };
        if !self.shared.alive.load(Ordering::Acquire) {
            return Err(DeviceError::Init("audio thread died".to_string()));
        }

        // Block until the ring accepts the whole buffer; the caller mixed it
        // against a free slot so this only waits on the driver
        let mut offset = 0usize;
        let total = frame_count as usize * CHANNELS;
        while offset < total {
            let room = self.producer.slots().min(total - offset);
            if room == 0 {
                if self.shared.shutdown.load(Ordering::Acquire) {
                    break;
                }
                std::thread::sleep(Duration::from_millis(1));
                continue;
            }
            if let Ok(mut chunk) = self.producer.write_chunk(room) {
                let (first, second) = chunk.as_mut_slices();
                let split = first.len();
                first.copy_from_slice(&samples[offset..offset + split]);
                second.copy_from_slice(&samples[offset + split..offset + room]);
                chunk.commit_all();
                offset += room;
            }
        }
        Ok(())
    }

    fn free_buffer_slots(&mut self) -> u32 {
        (self.producer.slots() / (self.frame_count as usize * CHANNELS)) as u32
    }

    fn available_frames(&mut self) -> Option<u32> {
        let free = self.free_buffer_slots();
        if free == 0 {
            return Some(0);
        }
        Some(self.frame_count)
    }

    fn start(&mut self) {
        self.shared.started.store(true, Ordering::Release);
    }

    fn stop(&mut self) {
        self.shared.started.store(false, Ordering::Release);
    }
}

impl Drop for CpalDevice {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
