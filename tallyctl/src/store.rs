//! Editor-side persistence: a flat key-value store where every value
//! is an independently settable serialized string. The publisher
//! relays exactly these pairs, so what is stored is what travels.

use crate::pages::{SettingsDoc, SettingsState};
use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tally_ipc::{decode_projects, encode_projects, SettingMessage};

pub const KEY_PROJECTS: &str = "projects";
pub const KEY_NEXT_ID: &str = "nextId";
pub const KEY_SETTINGS_STATE: &str = "settingsState";
pub const KEY_TIME_FORMAT: &str = "timeFormat";
pub const KEY_IS_DARK_MODE: &str = "isDarkMode";
/// Presence-only dirty flag: set when a push could not be delivered.
pub const KEY_NEEDS_SYNC: &str = "needsSync";

pub struct Store {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl Store {
    pub fn default_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "tally", "tallyctl")
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        let data_dir = proj_dirs.data_dir();
        fs::create_dir_all(data_dir)?;
        Ok(data_dir.join("settings.json"))
    }

    /// Opens the store, seeding and saving a default document (one
    /// project, id 0) when the file does not exist yet.
    pub fn open(path: &Path) -> Result<Self> {
        let mut store = Self {
            path: path.to_path_buf(),
            values: BTreeMap::new(),
        };
        if path.exists() {
            let json = fs::read_to_string(path)
                .with_context(|| format!("Failed to read settings store at {:?}", path))?;
            store.values = serde_json::from_str(&json)
                .with_context(|| format!("Failed to parse settings store at {:?}", path))?;
        } else {
            store.put_doc(&SettingsDoc::default())?;
            store.save()?;
        }
        Ok(store)
    }

    pub fn save(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.values)?;
        fs::write(&self.path, json)?;
        Ok(())
    }

    pub fn load_doc(&self) -> Result<SettingsDoc> {
        let defaults = SettingsDoc::default();
        let projects = match self.values.get(KEY_PROJECTS) {
            Some(value) => decode_projects(value)?.into_iter().collect(),
            None => defaults.projects,
        };
        Ok(SettingsDoc {
            next_id: self.decode_or(KEY_NEXT_ID, defaults.next_id)?,
            projects,
            state: self.decode_or(KEY_SETTINGS_STATE, defaults.state)?,
            time_format: self.decode_or(KEY_TIME_FORMAT, defaults.time_format)?,
            is_dark_mode: self.decode_or(KEY_IS_DARK_MODE, defaults.is_dark_mode)?,
        })
    }

    fn decode_or<T: serde::de::DeserializeOwned>(&self, key: &str, default: T) -> Result<T> {
        match self.values.get(key) {
            Some(value) => serde_json::from_str(value)
                .with_context(|| format!("Failed to decode stored key '{key}'")),
            None => Ok(default),
        }
    }

    /// Writes the document back into the store, returning the pairs
    /// whose stored value actually changed. These are the change
    /// notifications the publisher relays.
    pub fn put_doc(&mut self, doc: &SettingsDoc) -> Result<Vec<SettingMessage>> {
        let pairs: Vec<(u32, _)> = doc
            .projects
            .iter()
            .map(|(id, cfg)| (*id, cfg.clone()))
            .collect();
        let encoded = [
            (KEY_PROJECTS, encode_projects(&pairs)?),
            (KEY_NEXT_ID, serde_json::to_string(&doc.next_id)?),
            (KEY_SETTINGS_STATE, serde_json::to_string(&doc.state)?),
            (KEY_TIME_FORMAT, serde_json::to_string(&doc.time_format)?),
            (KEY_IS_DARK_MODE, serde_json::to_string(&doc.is_dark_mode)?),
        ];

        let mut changed = Vec::new();
        for (key, value) in encoded {
            if self.values.get(key).map(String::as_str) != Some(value.as_str()) {
                self.values.insert(key.to_string(), value.clone());
                changed.push(SettingMessage {
                    key: key.to_string(),
                    value,
                });
            }
        }
        Ok(changed)
    }

    pub fn needs_sync(&self) -> bool {
        self.values.contains_key(KEY_NEEDS_SYNC)
    }

    pub fn set_needs_sync(&mut self, dirty: bool) {
        if dirty {
            self.values.insert(KEY_NEEDS_SYNC.to_string(), String::new());
        } else {
            self.values.remove(KEY_NEEDS_SYNC);
        }
    }

    /// Every stored pair, for a full republish.
    pub fn snapshot(&self) -> Vec<SettingMessage> {
        self.values
            .iter()
            .map(|(key, value)| SettingMessage {
                key: key.clone(),
                value: value.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("settings.json")).unwrap();
        (dir, store)
    }

    #[test]
    fn missing_store_is_seeded_and_saved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let store = Store::open(&path).unwrap();
        assert!(path.exists());

        let doc = store.load_doc().unwrap();
        assert_eq!(doc.next_id, 1);
        assert_eq!(doc.projects.len(), 1);
        assert!(doc.projects.contains_key(&0));
        assert_eq!(doc.state, SettingsState::Main);
    }

    #[test]
    fn put_doc_reports_only_changed_keys() {
        let (_dir, mut store) = temp_store();
        let mut doc = store.load_doc().unwrap();
        assert!(store.put_doc(&doc).unwrap().is_empty());

        doc.is_dark_mode = !doc.is_dark_mode;
        let changed = store.put_doc(&doc).unwrap();
        let keys: Vec<&str> = changed.iter().map(|m| m.key.as_str()).collect();
        assert_eq!(keys, vec![KEY_IS_DARK_MODE]);
    }

    #[test]
    fn document_round_trips_through_the_store() {
        let (dir, mut store) = temp_store();
        let mut doc = store.load_doc().unwrap();
        doc.begin_add().unwrap();
        doc.set_name("B").unwrap();
        doc.set_repeat_length(5).unwrap();
        doc.save().unwrap();
        store.put_doc(&doc).unwrap();
        store.save().unwrap();

        let reopened = Store::open(&dir.path().join("settings.json")).unwrap();
        assert_eq!(reopened.load_doc().unwrap(), doc);
    }

    #[test]
    fn needs_sync_is_presence_only() {
        let (dir, mut store) = temp_store();
        assert!(!store.needs_sync());
        store.set_needs_sync(true);
        store.save().unwrap();

        let reopened = Store::open(&dir.path().join("settings.json")).unwrap();
        assert!(reopened.needs_sync());
        assert!(reopened
            .snapshot()
            .iter()
            .any(|m| m.key == KEY_NEEDS_SYNC && m.value.is_empty()));

        store.set_needs_sync(false);
        assert!(!store.needs_sync());
    }

    #[test]
    fn snapshot_covers_every_stored_key() {
        let (_dir, store) = temp_store();
        let snapshot = store.snapshot();
        let keys: Vec<&str> = snapshot.iter().map(|m| m.key.as_str()).collect();
        for key in [
            KEY_PROJECTS,
            KEY_NEXT_ID,
            KEY_SETTINGS_STATE,
            KEY_TIME_FORMAT,
            KEY_IS_DARK_MODE,
        ] {
            assert!(keys.contains(&key), "snapshot missing {key}");
        }
    }
}
