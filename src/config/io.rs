use std::env::current_exe;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::str;
use std::sync::{Arc, Mutex};
use directories_next::ProjectDirs;
use fd_lock::{RwLock, RwLockWriteGuard};
use log::{debug, info, warn};
use serde_json;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::config::types::Config;
use crate::error::ConfigError;

// swell.json next to the executable, so the app can run from a usb stick with its own settings
fn portable_config_path() -> Option<PathBuf> {
    let mut path = match current_exe() {
        Ok(path) => path,
        Err(err) => {
            warn!("Failed to get current exe path: {:?}", err);
            return None;
        },
    };

    // F:\swell.exe => F:\swell.json
    if !path.set_extension("json") {
        warn!("Current exe has no filename: {}", path.to_string_lossy());
        return None;
    }

    match std::fs::metadata(&path) {
        Ok(attr) if attr.is_file() => Some(path),
        Ok(_) => None,
        Err(err) => {
            debug!("No portable config at {} ({:?})", path.to_string_lossy(), err);
            None
        },
    }
}

// swell.json in the os dependent config directory, such as %AppData% on windows
fn local_config_path() -> Option<PathBuf> {
    ProjectDirs::from("id", "swell", "swell").map(|dirs| {
        dirs.config_dir().join("swell.json")
    })
}

pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    portable_config_path()
        .or_else(local_config_path)
        .ok_or(ConfigError::NoConfigPath)
}

/// Exclusive lock on the config file; while the guard returned by `lock` lives, no other
/// instance of the application can start.
pub struct ConfigIOLocker {
    rw_lock: RwLock<std::fs::File>,
}

impl ConfigIOLocker {
    pub fn lock(&mut self) -> Result<RwLockWriteGuard<std::fs::File>, ConfigError> {
        self.rw_lock
            .try_write()
            .map_err(|source| ConfigError::CanNotLock { source })
    }
}

#[derive(Clone)]
pub struct ConfigIO {
    path: PathBuf,
    file: Arc<Mutex<std::fs::File>>,
}

impl std::fmt::Debug for ConfigIO {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigIO").field("path", &self.path).finish()
    }
}

impl ConfigIO {
    pub fn new_sync() -> Result<Self, ConfigError> {
        ConfigIO::open(&default_config_path()?)
    }

    pub fn open(path: &Path) -> Result<Self, ConfigError> {
        info!("Using config file {}", path.to_string_lossy());

        if let Some(directory) = path.parent() {
            std::fs::create_dir_all(directory)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .truncate(false)
            .append(false)
            .create(true)
            .open(path)?;

        Ok(ConfigIO {
            path: path.to_path_buf(),
            file: Arc::new(Mutex::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn locker(&self) -> Result<ConfigIOLocker, ConfigError> {
        let file = self.file.lock().expect("Failed to lock ConfigIO file");

        Ok(ConfigIOLocker {
            rw_lock: RwLock::new(file.try_clone()?),
        })
    }

    // The File returned from here should never be closed!
    fn tokio_file(&self) -> Result<File, ConfigError> {
        let file = self.file.lock().expect("Failed to lock ConfigIO file");
        Ok(File::from_std(file.try_clone()?))
    }

    /// Read the config. An empty (freshly created) file yields the defaults.
    pub async fn read(&self) -> Result<Config, ConfigError> {
        let mut file = self.tokio_file()?;
        debug!("Reading config file");

        let mut content = vec![];
        file.rewind().await?;
        file.read_to_end(&mut content).await?;

        if content.iter().all(u8::is_ascii_whitespace) {
            return Ok(Config::default());
        }

        let content = str::from_utf8(&content)?;
        Ok(serde_json::from_str(content)?)
    }

    pub async fn save(&self, config: &Config) -> Result<(), ConfigError> {
        let mut file = self.tokio_file()?;
        info!("Saving config");

        let content = serde_json::to_string_pretty(config)?;
        file.rewind().await?;
        file.set_len(0).await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::process;
    use super::*;

    fn temp_config_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("swell-test-{}-{}", process::id(), name))
            .join("swell.json")
    }

    #[tokio::test]
    async fn empty_file_reads_defaults() {
        let path = temp_config_path("empty");
        let config_io = ConfigIO::open(&path).unwrap();

        assert_eq!(config_io.read().await.unwrap(), Config::default());
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[tokio::test]
    async fn save_then_read() {
        let path = temp_config_path("save");
        let config_io = ConfigIO::open(&path).unwrap();

        let mut config = Config::default();
        config.preferred_device = "ESP32-Bedroom".to_string();
        config.timer.enabled = true;
        config_io.save(&config).await.unwrap();

        // a shorter document must not leave the tail of the previous one behind
        let mut shorter = Config::default();
        shorter.preferred_device = "L".to_string();
        config_io.save(&shorter).await.unwrap();
        config_io.save(&config).await.unwrap();

        let reopened = ConfigIO::open(&path).unwrap();
        assert_eq!(reopened.read().await.unwrap(), config);
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[tokio::test]
    async fn invalid_json_is_an_error() {
        let path = temp_config_path("invalid");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ not json").unwrap();

        let config_io = ConfigIO::open(&path).unwrap();
        let err = config_io.read().await.unwrap_err();
        assert!(matches!(err, ConfigError::JsonError { .. }));
        assert!(!err.is_file_not_found_error());
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
