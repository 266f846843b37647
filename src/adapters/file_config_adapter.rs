//! INI session configuration adapter.

use crate::domain::error::PortconError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

pub struct FileConfigAdapter {
    config: Ini,
    source: String,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, PortconError> {
        let source = path.as_ref().display().to_string();
        if !path.as_ref().is_file() {
            return Err(PortconError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("config file not found: {source}"),
            )));
        }
        let mut config = Ini::new();
        config
            .load(path.as_ref())
            .map_err(|reason| PortconError::ConfigParse {
                file: source.clone(),
                reason,
            })?;
        Ok(Self { config, source })
    }

    pub fn from_string(content: &str) -> Result<Self, PortconError> {
        let mut config = Ini::new();
        config
            .read(content.to_string())
            .map_err(|reason| PortconError::ConfigParse {
                file: "<string>".to_string(),
                reason,
            })?;
        Ok(Self {
            config,
            source: "<string>".to_string(),
        })
    }

    /// Where the configuration was read from, for log and error messages.
    pub fn source(&self) -> &str {
        &self.source
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }
}
