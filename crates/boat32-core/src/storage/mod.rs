//! Persistent key/value preferences
//!
//! Small float settings grouped by namespace, e.g. the `aux` calibration
//! record. The whole table is serialized as one postcard record so the
//! firmware can keep it in a single flash sector.

use core::str::FromStr;

use heapless::{String, Vec};
use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

pub const MAX_ENTRIES: usize = 16;
pub const MAX_NAME: usize = 15;

/// Marks a flash sector holding a preference table.
const RECORD_MAGIC: [u8; 4] = *b"B32P";
const RECORD_HEADER: usize = RECORD_MAGIC.len() + 2;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreferencesError {
    #[error("{0} is too long")]
    NameTooLong(&'static str),
    #[error("preference table full")]
    Full,
    #[error("record does not fit in {0} bytes")]
    Encode(usize),
    #[error("stored record is corrupt")]
    Corrupt,
    #[error("storage backend failure")]
    Backend,
}

/// Keyed float store.
pub trait Preferences {
    fn get_f32(&mut self, namespace: &str, key: &str) -> Result<Option<f32>, PreferencesError>;
    fn put_f32(&mut self, namespace: &str, key: &str, value: f32)
    -> Result<(), PreferencesError>;
    /// Set every `(key, value)` pair under `namespace` and persist once.
    /// Either all pairs are stored or none are.
    fn put_all(&mut self, namespace: &str, entries: &[(&str, f32)])
    -> Result<(), PreferencesError>;
}

impl<T: Preferences> Preferences for &mut T {
    fn get_f32(&mut self, namespace: &str, key: &str) -> Result<Option<f32>, PreferencesError> {
        (**self).get_f32(namespace, key)
    }

    fn put_f32(
        &mut self,
        namespace: &str,
        key: &str,
        value: f32,
    ) -> Result<(), PreferencesError> {
        (**self).put_f32(namespace, key, value)
    }

    fn put_all(
        &mut self,
        namespace: &str,
        entries: &[(&str, f32)],
    ) -> Result<(), PreferencesError> {
        (**self).put_all(namespace, entries)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
struct PreferenceEntry {
    namespace: String<MAX_NAME>,
    key: String<MAX_NAME>,
    value: f32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct PreferenceTable {
    entries: Vec<PreferenceEntry, MAX_ENTRIES>,
}

impl PreferenceTable {
    pub fn get(&self, namespace: &str, key: &str) -> Option<f32> {
        self.entries
            .iter()
            .find(|entry| entry.namespace == namespace && entry.key == key)
            .map(|entry| entry.value)
    }

    pub fn set(&mut self, namespace: &str, key: &str, value: f32) -> Result<(), PreferencesError> {
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|entry| entry.namespace == namespace && entry.key == key)
        {
            entry.value = value;
            return Ok(());
        }

        let entry = PreferenceEntry {
            namespace: String::from_str(namespace)
                .map_err(|_| PreferencesError::NameTooLong("namespace"))?,
            key: String::from_str(key).map_err(|_| PreferencesError::NameTooLong("key"))?,
            value,
        };
        self.entries.push(entry).map_err(|_| PreferencesError::Full)
    }

    /// Set several keys at once, leaving the table untouched on failure.
    pub fn set_all(
        &mut self,
        namespace: &str,
        entries: &[(&str, f32)],
    ) -> Result<(), PreferencesError> {
        let mut staged = self.clone();
        for &(key, value) in entries {
            staged.set(namespace, key, value)?;
        }
        *self = staged;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize as `magic, length (LE u16), postcard payload` into `buffer`,
    /// returning the bytes used.
    pub fn to_record(&self, buffer: &mut [u8]) -> Result<usize, PreferencesError> {
        let capacity = buffer.len();
        if capacity < RECORD_HEADER {
            return Err(PreferencesError::Encode(capacity));
        }

        let payload_len = postcard::to_slice(self, &mut buffer[RECORD_HEADER..])
            .map_err(|_| PreferencesError::Encode(capacity))?
            .len();
        buffer[..RECORD_MAGIC.len()].copy_from_slice(&RECORD_MAGIC);
        buffer[RECORD_MAGIC.len()..RECORD_HEADER]
            .copy_from_slice(&(payload_len as u16).to_le_bytes());
        Ok(RECORD_HEADER + payload_len)
    }

    /// Parse a stored record. Erased flash (no magic) yields an empty table.
    pub fn from_record(bytes: &[u8]) -> Result<Self, PreferencesError> {
        if bytes.len() < RECORD_HEADER || bytes[..RECORD_MAGIC.len()] != RECORD_MAGIC {
            return Ok(Self::default());
        }

        let payload_len =
            u16::from_le_bytes([bytes[RECORD_MAGIC.len()], bytes[RECORD_MAGIC.len() + 1]]) as usize;
        let payload = bytes
            .get(RECORD_HEADER..RECORD_HEADER + payload_len)
            .ok_or(PreferencesError::Corrupt)?;
        postcard::from_bytes(payload).map_err(|_| PreferencesError::Corrupt)
    }
}

/// RAM-only preferences for the simulator and tests.
#[derive(Debug, Default)]
pub struct MemoryPreferences {
    table: PreferenceTable,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Preferences for MemoryPreferences {
    fn get_f32(&mut self, namespace: &str, key: &str) -> Result<Option<f32>, PreferencesError> {
        Ok(self.table.get(namespace, key))
    }

    fn put_f32(
        &mut self,
        namespace: &str,
        key: &str,
        value: f32,
    ) -> Result<(), PreferencesError> {
        self.table.set(namespace, key, value)
    }

    fn put_all(
        &mut self,
        namespace: &str,
        entries: &[(&str, f32)],
    ) -> Result<(), PreferencesError> {
        self.table.set_all(namespace, entries)
    }
}
