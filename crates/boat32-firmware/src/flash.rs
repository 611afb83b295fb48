//! Preferences kept in a fixed flash sector
//!
//! The whole [`PreferenceTable`] lives as one record at [`PREFERENCES_OFFSET`],
//! the start of the partition table's NVS region. Every write, single or
//! batched, rewrites the record once.

use embedded_storage::{ReadStorage, Storage};
use esp_storage::FlashStorage;
use log::{info, warn};

use boat32_core::storage::{PreferenceTable, Preferences, PreferencesError};

pub const PREFERENCES_OFFSET: u32 = 0x9000;
const RECORD_CAPACITY: usize = 1024;

pub struct FlashPreferences {
    flash: FlashStorage<'static>,
    table: PreferenceTable,
}

impl FlashPreferences {
    /// Load the stored table. A corrupt record starts an empty table and is
    /// overwritten by the next save.
    pub fn open(mut flash: FlashStorage<'static>) -> Self {
        let mut record = [0u8; RECORD_CAPACITY];
        let table = match flash.read(PREFERENCES_OFFSET, &mut record) {
            Ok(()) => PreferenceTable::from_record(&record).unwrap_or_else(|e| {
                warn!(target: "storage", "Preferences unreadable: {}, starting empty", e);
                PreferenceTable::default()
            }),
            Err(e) => {
                warn!(target: "storage", "Flash read failed: {:?}", e);
                PreferenceTable::default()
            }
        };
        info!(target: "storage", "Loaded {} preferences", table.len());
        Self { flash, table }
    }

    fn persist(&mut self) -> Result<(), PreferencesError> {
        let mut record = [0u8; RECORD_CAPACITY];
        let used = self.table.to_record(&mut record)?;
        self.flash
            .write(PREFERENCES_OFFSET, &record[..used])
            .map_err(|e| {
                warn!(target: "storage", "Flash write failed: {:?}", e);
                PreferencesError::Backend
            })
    }
}

impl Preferences for FlashPreferences {
    fn get_f32(&mut self, namespace: &str, key: &str) -> Result<Option<f32>, PreferencesError> {
        Ok(self.table.get(namespace, key))
    }

    fn put_f32(
        &mut self,
        namespace: &str,
        key: &str,
        value: f32,
    ) -> Result<(), PreferencesError> {
        self.table.set(namespace, key, value)?;
        self.persist()
    }

    fn put_all(
        &mut self,
        namespace: &str,
        entries: &[(&str, f32)],
    ) -> Result<(), PreferencesError> {
        self.table.set_all(namespace, entries)?;
        self.persist()
    }
}
