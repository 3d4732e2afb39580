use std::{
    fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use tracing::info;

use crate::{config::ThermostatConfig, error::StorageError};

pub const CONFIG_FILE_NAME: &str = "config.json";

pub trait ConfigStore {
    /// `Ok(None)` when nothing has been persisted yet.
    fn load(&self) -> Result<Option<ThermostatConfig>, StorageError>;

    /// Full overwrite of the persisted state.
    fn save(&self, config: &ThermostatConfig) -> Result<(), StorageError>;

    fn initialize_if_absent(&self) -> Result<ThermostatConfig, StorageError> {
        if let Some(config) = self.load()? {
            return Ok(config);
        }

        let config = ThermostatConfig::default();
        self.save(&config)?;
        info!("no persisted config found, wrote defaults");
        Ok(config)
    }
}

/// JSON file store. Saves go through a temp file and a rename so a crash
/// mid-write never leaves a truncated config behind.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(CONFIG_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl ConfigStore for JsonFileStore {
    fn load(&self) -> Result<Option<ThermostatConfig>, StorageError> {
        match fs::read(&self.path) {
            Ok(raw) => serde_json::from_slice(&raw)
                .map(Some)
                .map_err(|source| StorageError::Corrupt {
                    path: self.path.clone(),
                    source,
                }),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(self.io_error(err)),
        }
    }

    fn save(&self, config: &ThermostatConfig) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| self.io_error(err))?;
        }
        let payload = serde_json::to_vec_pretty(config).map_err(StorageError::Serialize)?;
        write_atomic(&self.path, &payload).map_err(|err| self.io_error(err))
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(tmp, path)?;
    sync_parent_dir(path)
}

/// Makes the rename itself durable.
#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::File::open(parent)?.sync_all()
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
