//! SoundData store: immutable asset bytes or a pull callback
//!
//! Entries are pooled and ref-counted: one reference for the creator, one
//! per voice. Decoders read through the shared payload, which satisfies
//! the codec crate's `SoundSource` contract.

use std::sync::Arc;

use parking_lot::RwLock;
use pm_core::{NameHash, ReadStatus, SoundDataType};

/// Pull-style byte provider for streamed sound data.
pub trait SoundDataCallback: Send + Sync {
    fn read(&self, offset: u32, out: &mut [u8]) -> (usize, ReadStatus);
}

impl<F> SoundDataCallback for F
where
    F: Fn(u32, &mut [u8]) -> (usize, ReadStatus) + Send + Sync,
{
    fn read(&self, offset: u32, out: &mut [u8]) -> (usize, ReadStatus) {
        self(offset, out)
    }
}

enum PayloadKind {
    Buffer(Vec<u8>),
    Callback(Box<dyn SoundDataCallback>),
}

/// Shared, readable payload of one sound data entry.
///
/// The lock only guards against `set_sound_data` swapping the bytes while a
/// decoder reads; the contents are never mutated in place.
pub struct DataPayload {
    kind: RwLock<PayloadKind>,
}

impl DataPayload {
    fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { kind: RwLock::new(PayloadKind::Buffer(bytes)) }
    }

    fn from_callback(callback: Box<dyn SoundDataCallback>) -> Self {
        Self { kind: RwLock::new(PayloadKind::Callback(callback)) }
    }

    pub fn is_valid(&self) -> bool {
        match &*self.kind.read() {
            PayloadKind::Buffer(bytes) => !bytes.is_empty(),
            PayloadKind::Callback(_) => true,
        }
    }

    pub fn size(&self) -> u32 {
        match &*self.kind.read() {
            PayloadKind::Buffer(bytes) => bytes.len() as u32,
            PayloadKind::Callback(_) => 0,
        }
    }
}

impl pm_codec::SoundSource for DataPayload {
    fn read(&self, offset: u32, out: &mut [u8]) -> (usize, ReadStatus) {
        match &*self.kind.read() {
            PayloadKind::Callback(callback) => callback.read(offset, out),
            PayloadKind::Buffer(bytes) => {
                let size = bytes.len();
                let offset = offset as usize;
                if offset >= size {
                    return (0, ReadStatus::EndOfStream);
                }
                if out.is_empty() {
                    return (0, ReadStatus::Ok);
                }
                let read_size = out.len().min(size - offset);
                if read_size == 0 {
                    return (0, ReadStatus::EndOfStream);
                }
                out[..read_size].copy_from_slice(&bytes[offset..offset + read_size]);
                let status =
                    if read_size < out.len() { ReadStatus::Partial } else { ReadStatus::Ok };
                (read_size, status)
            }
        }
    }
}

/// One pooled sound data slot.
pub(crate) struct SoundDataEntry {
    pub name: String,
    pub name_hash: NameHash,
    pub data_type: SoundDataType,
    pub payload: Arc<DataPayload>,
    pub ref_count: u16,
}

impl SoundDataEntry {
    pub fn from_bytes(name: &str, data_type: SoundDataType, bytes: &[u8]) -> Self {
        Self {
            name: name.to_string(),
            name_hash: pm_core::hash_name(name),
            data_type,
            payload: Arc::new(DataPayload::from_bytes(bytes.to_vec())),
            ref_count: 1,
        }
    }

    pub fn from_callback(
        name: &str,
        data_type: SoundDataType,
        callback: Box<dyn SoundDataCallback>,
    ) -> Self {
        Self {
            name: name.to_string(),
            name_hash: pm_core::hash_name(name),
            data_type,
            payload: Arc::new(DataPayload::from_callback(callback)),
            ref_count: 1,
        }
    }

    pub fn set_bytes(&mut self, bytes: &[u8]) {
        *self.payload.kind.write() = PayloadKind::Buffer(bytes.to_vec());
    }

    pub fn set_callback(&mut self, callback: Box<dyn SoundDataCallback>) {
        *self.payload.kind.write() = PayloadKind::Callback(callback);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pm_codec::SoundSource;

    #[test]
    fn ranged_reads_clamp_and_report() {
        let entry = SoundDataEntry::from_bytes("clip", SoundDataType::Wav, &[1, 2, 3, 4, 5]);
        let payload = &entry.payload;

        let mut buf = [0u8; 3];
        assert_eq!(payload.read(0, &mut buf), (3, ReadStatus::Ok));
        assert_eq!(buf, [1, 2, 3]);

        // clamped read
        assert_eq!(payload.read(3, &mut buf), (2, ReadStatus::Partial));
        assert_eq!(&buf[..2], &[4, 5]);

        // past the end
        assert_eq!(payload.read(5, &mut buf), (0, ReadStatus::EndOfStream));
        assert_eq!(payload.read(100, &mut buf), (0, ReadStatus::EndOfStream));

        // zero-size read is fine
        assert_eq!(payload.read(0, &mut []), (0, ReadStatus::Ok));
    }

    #[test]
    fn callback_payload_delegates() {
        let entry = SoundDataEntry::from_callback(
            "stream",
            SoundDataType::Opus,
            Box::new(|offset: u32, out: &mut [u8]| {
                out.fill(offset as u8);
                (out.len(), ReadStatus::Ok)
            }),
        );
        let mut buf = [0u8; 2];
        assert_eq!(entry.payload.read(7, &mut buf), (2, ReadStatus::Ok));
        assert_eq!(buf, [7, 7]);
        assert!(entry.payload.is_valid());
        assert_eq!(entry.payload.size(), 0);
    }
}
