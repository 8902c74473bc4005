use std::{
    fs,
    path::{Path, PathBuf},
};

use log::warn;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;
use wdl_util::Dimension;

pub mod logging;

pub use logging::LoggingConfig;

const CONFIG_ROOT_FOLDER: &str = "config/";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Couldn't read configuration file at {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Couldn't parse config at {path:?}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Settings for replaying a captured stream into a world save.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct CaptureConfig {
    /// Protocol version the captured stream was recorded with.
    pub protocol_version: i32,
    /// Dimension the capture starts in.
    pub dimension: Dimension,
    /// Flag chunks sent in several partial packets, as non-vanilla servers do.
    pub mark_new_chunks: bool,
    pub capture_file: PathBuf,
    pub output_folder: PathBuf,
    /// `blocks.json` data report naming the global block states, needed to save 1.13+ chunks.
    pub block_report: Option<PathBuf>,
    pub logging: LoggingConfig,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            protocol_version: 578,
            dimension: Dimension::Overworld,
            mark_new_chunks: false,
            capture_file: PathBuf::from("capture.bin"),
            output_folder: PathBuf::from("world"),
            block_report: None,
            logging: LoggingConfig::default(),
        }
    }
}

pub trait LoadConfiguration {
    /// Loads the configuration below `exec_dir`, writing out the default if none exists yet.
    fn load(exec_dir: &Path) -> Result<Self, ConfigError>
    where
        Self: Sized + Default + Serialize + DeserializeOwned,
    {
        let config_dir = exec_dir.join(CONFIG_ROOT_FOLDER);
        if !config_dir.exists() {
            log::debug!("creating new config root folder");
            if let Err(err) = fs::create_dir_all(&config_dir) {
                warn!("Couldn't create config folder {:?}: {}", &config_dir, err);
            }
        }
        let path = config_dir.join(Self::get_path());

        let config = if path.exists() {
            let file_content = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;

            toml::from_str(&file_content).map_err(|err| ConfigError::Parse {
                path: path.clone(),
                message: err.message().to_string(),
            })?
        } else {
            let content = Self::default();

            match toml::to_string(&content) {
                Ok(serialized) => {
                    if let Err(err) = fs::write(&path, serialized) {
                        warn!("Couldn't write default config to {:?}. Reason: {}", &path, err);
                    }
                }
                Err(err) => warn!("Couldn't serialize default config: {}", err),
            }

            content
        };

        config.validate()?;
        Ok(config)
    }

    fn get_path() -> &'static Path;

    fn validate(&self) -> Result<(), ConfigError>;
}

impl LoadConfiguration for CaptureConfig {
    fn get_path() -> &'static Path {
        Path::new("capture.toml")
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol_version <= 0 {
            return Err(ConfigError::Invalid(format!(
                "protocol_version must be positive, got {}",
                self.protocol_version
            )));
        }
        if self.output_folder.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "output_folder must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::fs;

    use wdl_util::Dimension;

    use crate::{CaptureConfig, ConfigError, LoadConfiguration};

    #[test]
    fn test_missing_config_writes_default() {
        let dir = tempfile::tempdir().unwrap();

        let config = CaptureConfig::load(dir.path()).unwrap();

        assert_eq!(config, CaptureConfig::default());
        assert!(dir.path().join("config/capture.toml").exists());
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("config")).unwrap();
        fs::write(
            dir.path().join("config/capture.toml"),
            "protocol_version = 340\ndimension = \"nether\"\n\n[logging]\ncolor = false\n",
        )
        .unwrap();

        let config = CaptureConfig::load(dir.path()).unwrap();

        assert_eq!(config.protocol_version, 340);
        assert_eq!(config.dimension, Dimension::Nether);
        assert!(!config.logging.color);
        assert!(config.logging.enabled);
        assert!(!config.mark_new_chunks);
        assert_eq!(config.block_report, None);
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("config")).unwrap();
        fs::write(
            dir.path().join("config/capture.toml"),
            "protocol_version = -5\n",
        )
        .unwrap();

        assert!(matches!(
            CaptureConfig::load(dir.path()),
            Err(ConfigError::Invalid(_))
        ));

        fs::write(dir.path().join("config/capture.toml"), "protocol_version = [").unwrap();
        assert!(matches!(
            CaptureConfig::load(dir.path()),
            Err(ConfigError::Parse { .. })
        ));
    }
}
