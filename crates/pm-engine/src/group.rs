//! Mix groups: named buses with ramped gain and power memory
//!
//! Each group carries a stereo mix buffer plus a small ring of per-buffer
//! power statistics (sum of squares and peak squared per channel) so
//! RMS/peak queries can walk backwards over roughly the last second of
//! output.

use std::collections::HashMap;

use pm_core::{GROUP_MEMORY_SLOTS, MAX_GROUPS, NameHash, RampedValue};
use pm_dsp::PowerData;

pub(crate) struct SoundGroup {
    pub name_hash: NameHash,
    pub gain: RampedValue,
    /// The user-facing gain parameter; `gain` holds the derived scale.
    pub gain_parameter: f32,
    pub mix_buffer: [Vec<f32>; 2],
    sum_squared: [[f32; 2]; GROUP_MEMORY_SLOTS],
    peak_squared: [[f32; 2]; GROUP_MEMORY_SLOTS],
    frame_counts: [u16; GROUP_MEMORY_SLOTS],
    next_memory_slot: usize,
}

impl SoundGroup {
    fn new(name_hash: NameHash, frame_count: usize) -> Self {
        Self {
            name_hash,
            gain: RampedValue::new(1.0),
            gain_parameter: 1.0,
            mix_buffer: [vec![0.0; frame_count], vec![0.0; frame_count]],
            sum_squared: [[0.0; 2]; GROUP_MEMORY_SLOTS],
            peak_squared: [[0.0; 2]; GROUP_MEMORY_SLOTS],
            frame_counts: [0; GROUP_MEMORY_SLOTS],
            next_memory_slot: 0,
        }
    }

    /// Record one mixed buffer's power numbers into the ring.
    pub fn push_power(&mut self, power: PowerData, frame_count: u32) {
        let slot = self.next_memory_slot;
        self.frame_counts[slot] = frame_count.min(u16::MAX as u32) as u16;
        self.sum_squared[slot] = [power.sum_sq_left, power.sum_sq_right];
        self.peak_squared[slot] = [power.peak_sq_left, power.peak_sq_right];
        self.next_memory_slot = (slot + 1) % GROUP_MEMORY_SLOTS;
    }

    /// RMS per channel over the last `window_frames`, in [0, 1].
    pub fn rms(&self, window_frames: u32) -> (f32, f32) {
        let mut left = window_frames as i64;
        let mut slot = (self.next_memory_slot + GROUP_MEMORY_SLOTS - 1) % GROUP_MEMORY_SLOTS;
        let mut sum_sq = [0.0f64; 2];
        let mut total_frames = 0u32;
        while left > 0 {
            sum_sq[0] += self.sum_squared[slot][0] as f64;
            sum_sq[1] += self.sum_squared[slot][1] as f64;
            let frames = self.frame_counts[slot];
            if frames == 0 {
                break;
            }
            left -= frames as i64;
            total_frames += frames as u32;
            slot = (slot + GROUP_MEMORY_SLOTS - 1) % GROUP_MEMORY_SLOTS;
        }
        if total_frames == 0 {
            return (0.0, 0.0);
        }
        (
            ((sum_sq[0] / total_frames as f64).sqrt() / 32767.0) as f32,
            ((sum_sq[1] / total_frames as f64).sqrt() / 32767.0) as f32,
        )
    }

    /// Peak per channel over the last `window_frames`, in [0, 1].
    pub fn peak(&self, window_frames: u32) -> (f32, f32) {
        let mut left = window_frames as i64;
        let mut slot = (self.next_memory_slot + GROUP_MEMORY_SLOTS - 1) % GROUP_MEMORY_SLOTS;
        let mut max_sq = [0.0f32; 2];
        while left > 0 {
            max_sq[0] = max_sq[0].max(self.peak_squared[slot][0]);
            max_sq[1] = max_sq[1].max(self.peak_squared[slot][1]);
            let frames = self.frame_counts[slot];
            if frames == 0 {
                break;
            }
            left -= frames as i64;
            slot = (slot + GROUP_MEMORY_SLOTS - 1) % GROUP_MEMORY_SLOTS;
        }
        (max_sq[0].sqrt() / 32767.0, max_sq[1].sqrt() / 32767.0)
    }
}

/// Fixed-size group storage with hash lookup.
pub(crate) struct GroupTable {
    groups: Vec<SoundGroup>,
    map: HashMap<NameHash, usize>,
    frame_count: usize,
}

impl GroupTable {
    pub fn new(frame_count: usize) -> Self {
        Self {
            groups: Vec::with_capacity(MAX_GROUPS),
            map: HashMap::with_capacity(MAX_GROUPS),
            frame_count,
        }
    }

    /// Index of `name`'s group, creating it when there is room.
    pub fn get_or_create(&mut self, name: &str) -> Option<usize> {
        let hash = pm_core::hash_name(name);
        if let Some(&index) = self.map.get(&hash) {
            return Some(index);
        }
        if self.groups.len() >= MAX_GROUPS {
            return None;
        }
        let index = self.groups.len();
        self.groups.push(SoundGroup::new(hash, self.frame_count));
        self.map.insert(hash, index);
        Some(index)
    }

    pub fn index_of(&self, hash: NameHash) -> Option<usize> {
        self.map.get(&hash).copied()
    }

    pub fn get(&self, index: usize) -> &SoundGroup {
        &self.groups[index]
    }

    pub fn get_mut(&mut self, index: usize) -> &mut SoundGroup {
        &mut self.groups[index]
    }

    pub fn by_hash_mut(&mut self, hash: NameHash) -> Option<&mut SoundGroup> {
        let index = self.index_of(hash)?;
        Some(&mut self.groups[index])
    }

    pub fn by_hash(&self, hash: NameHash) -> Option<&SoundGroup> {
        let index = self.index_of(hash)?;
        Some(&self.groups[index])
    }

    pub fn hashes(&self) -> Vec<NameHash> {
        self.groups.iter().map(|g| g.name_hash).collect()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut SoundGroup> {
        self.groups.iter_mut()
    }

    /// The master group is always created first; split it off so the other
    /// buses can be summed into it.
    pub fn split_master_mut(&mut self) -> (&mut SoundGroup, &mut [SoundGroup]) {
        debug_assert_eq!(self.groups[0].name_hash, pm_core::MASTER_GROUP_HASH);
        let (master, others) = self.groups.split_at_mut(1);
        (&mut master[0], others)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_is_bounded() {
        let mut table = GroupTable::new(64);
        for i in 0..MAX_GROUPS {
            assert!(table.get_or_create(&format!("group{i}")).is_some());
        }
        assert!(table.get_or_create("one-too-many").is_none());
        // existing names still resolve
        assert_eq!(table.get_or_create("group0"), Some(0));
        assert_eq!(table.len(), MAX_GROUPS);
    }

    #[test]
    fn rms_window_walk() {
        let mut group = SoundGroup::new(1, 64);
        // two buffers of 100 frames, constant amplitude 32767 on the left
        for _ in 0..2 {
            group.push_power(
                PowerData {
                    sum_sq_left: 32767.0 * 32767.0 * 100.0,
                    sum_sq_right: 0.0,
                    peak_sq_left: 32767.0 * 32767.0,
                    peak_sq_right: 0.0,
                },
                100,
            );
        }
        let (left, right) = group.rms(200);
        assert!((left - 1.0).abs() < 1e-3);
        assert_eq!(right, 0.0);

        let (peak_left, peak_right) = group.peak(200);
        assert!((peak_left - 1.0).abs() < 1e-3);
        assert_eq!(peak_right, 0.0);
    }

    #[test]
    fn rms_stops_at_empty_slots() {
        let mut group = SoundGroup::new(1, 64);
        group.push_power(
            PowerData {
                sum_sq_left: 100.0,
                sum_sq_right: 100.0,
                peak_sq_left: 1.0,
                peak_sq_right: 1.0,
            },
            50,
        );
        // window asks for far more than recorded; the walk must terminate
        let (left, right) = group.rms(44100);
        assert!(left > 0.0 && right > 0.0);
    }
}
