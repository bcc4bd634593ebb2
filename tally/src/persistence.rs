use crate::app::App;
use anyhow::Result;
use directories::ProjectDirs;
use std::fs;
use std::path::{Path, PathBuf};

/// The device document: one JSON blob holding the whole serializable
/// app state, read once at startup and written at the coalescing
/// checkpoints (after an applied message batch, on focus loss, on
/// quit). Interactive counter presses never hit the disk directly.
pub struct Persistence;

impl Persistence {
    fn data_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "tally", "tally")
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;

        let data_dir = proj_dirs.data_dir();
        fs::create_dir_all(data_dir)?;

        Ok(data_dir.join("device.json"))
    }

    pub fn save(app: &App) -> Result<()> {
        Self::save_to(&Self::data_path()?, app)
    }

    pub fn save_to(path: &Path, app: &App) -> Result<()> {
        let json = serde_json::to_string_pretty(app)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn load() -> Result<Option<App>> {
        Self::load_from(&Self::data_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Option<App>> {
        if !path.exists() {
            return Ok(None);
        }

        let json = fs::read_to_string(path)?;
        let app: App = serde_json::from_str(&json)?;
        Ok(Some(app))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn document_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device.json");

        let mut app = App::new(Config::default());
        app.proj_id = 0;
        app.cur_project_mut().unwrap().global_count = 11;
        app.is_dark_mode = false;
        Persistence::save_to(&path, &app).unwrap();

        let loaded = Persistence::load_from(&path).unwrap().unwrap();
        assert_eq!(loaded.proj_id, 0);
        assert_eq!(loaded.cur_project().unwrap().global_count, 11);
        assert!(!loaded.is_dark_mode);
        assert_eq!(loaded.projects, app.projects);
    }

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        assert!(Persistence::load_from(&path).unwrap().is_none());
    }
}
