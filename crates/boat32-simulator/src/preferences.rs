//! Preferences kept in a file, in the same record format as the flash sector.

use std::path::PathBuf;

use log::warn;

use boat32_core::storage::{PreferenceTable, Preferences, PreferencesError};

const RECORD_CAPACITY: usize = 1024;

pub struct FilePreferences {
    path: PathBuf,
    table: PreferenceTable,
}

impl FilePreferences {
    /// Load the table at `path`. A missing file is an empty table.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let table = match std::fs::read(&path) {
            Ok(bytes) => PreferenceTable::from_record(&bytes).unwrap_or_else(|e| {
                warn!(target: "storage", "{}: {}, starting empty", path.display(), e);
                PreferenceTable::default()
            }),
            Err(_) => PreferenceTable::default(),
        };
        Self { path, table }
    }

    fn persist(&self) -> Result<(), PreferencesError> {
        let mut record = [0u8; RECORD_CAPACITY];
        let used = self.table.to_record(&mut record)?;
        std::fs::write(&self.path, &record[..used]).map_err(|_| PreferencesError::Backend)
    }
}

impl Preferences for FilePreferences {
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
