use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_ENDPOINT_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL_NAME: &str = "llama3";

/// Where and with which model chat turns are generated.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub endpoint_url: String,
    pub model_name: String,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            endpoint_url: DEFAULT_ENDPOINT_URL.to_string(),
            model_name: DEFAULT_MODEL_NAME.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsError {
    EmptyEndpointUrl,
    EmptyModelName,
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingsError::EmptyEndpointUrl => write!(f, "Endpoint URL is not set"),
            SettingsError::EmptyModelName => write!(f, "Model name is not set"),
        }
    }
}

impl std::error::Error for SettingsError {}

impl ConnectionSettings {
    pub fn new(endpoint_url: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            model_name: model_name.into(),
        }
    }

    /// The only check applied before use: both values must be non-blank.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.endpoint_url.trim().is_empty() {
            return Err(SettingsError::EmptyEndpointUrl);
        }
        if self.model_name.trim().is_empty() {
            return Err(SettingsError::EmptyModelName);
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Base URL of the generation server, e.g. "http://localhost:11434"
    pub endpoint_url: Option<String>,
    pub model_name: Option<String>,
    /// Notes folder opened most recently
    pub last_folder: Option<PathBuf>,
}

impl Config {
    pub fn load() -> Result<Config, Box<dyn std::error::Error>> {
        let config_path = Self::get_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn load_from_path(config_path: &Path) -> Result<Config, Box<dyn std::error::Error>> {
        if config_path.exists() {
            let contents = fs::read_to_string(config_path)?;
            let config: Config = toml::from_str(&contents)?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        let config_path = Self::get_config_path()?;
        self.save_to_path(&config_path)
    }

    pub fn save_to_path(&self, config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        fs::write(config_path, contents)?;
        Ok(())
    }

    pub fn get_config_path() -> Result<PathBuf, Box<dyn std::error::Error>> {
        let proj_dirs = ProjectDirs::from("org", "quillpad", "quillpad")
            .ok_or("Failed to determine config directory")?;
        Ok(proj_dirs.config_dir().join("config.toml"))
    }

    /// Stored connection settings with defaults for anything unset.
    pub fn connection_settings(&self) -> ConnectionSettings {
        let defaults = ConnectionSettings::default();
        ConnectionSettings {
            endpoint_url: self.endpoint_url.clone().unwrap_or(defaults.endpoint_url),
            model_name: self.model_name.clone().unwrap_or(defaults.model_name),
        }
    }

    pub fn set_connection_settings(&mut self, settings: &ConnectionSettings) {
        self.endpoint_url = Some(settings.endpoint_url.clone());
        self.model_name = Some(settings.model_name.clone());
    }

    pub fn print_all(&self) {
        let settings = self.connection_settings();
        println!("Current configuration:");
        match &self.endpoint_url {
            Some(url) => println!("  endpoint-url: {url}"),
            None => println!("  endpoint-url: {} (default)", settings.endpoint_url),
        }
        match &self.model_name {
            Some(model) => println!("  model: {model}"),
            None => println!("  model: {} (default)", settings.model_name),
        }
        match &self.last_folder {
            Some(folder) => println!("  folder: {}", folder.display()),
            None => println!("  folder: (unset)"),
        }
    }
}

/// Read the connection settings for one chat turn.
pub fn load_settings() -> Result<ConnectionSettings, Box<dyn std::error::Error>> {
    Ok(Config::load()?.connection_settings())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_nonexistent_config() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config_path = temp_dir.path().join("nonexistent_config.toml");

        let config = Config::load_from_path(&config_path).expect("Failed to load config");

        assert_eq!(config, Config::default());
        assert_eq!(config.connection_settings(), ConnectionSettings::default());
    }

    #[test]
    fn test_settings_persistence_lifecycle() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config_path = temp_dir.path().join("nested").join("config.toml");

        let mut config = Config {
            last_folder: Some(PathBuf::from("/home/user/notes")),
            ..Default::default()
        };
        config.set_connection_settings(&ConnectionSettings::new(
            "https://models.example.com",
            "mistral",
        ));
        config
            .save_to_path(&config_path)
            .expect("Failed to save config");

        let loaded = Config::load_from_path(&config_path).expect("Failed to load config");
        assert_eq!(loaded, config);
        assert_eq!(
            loaded.connection_settings(),
            ConnectionSettings::new("https://models.example.com", "mistral")
        );

        let mut loaded = loaded;
        loaded.model_name = None;
        loaded
            .save_to_path(&config_path)
            .expect("Failed to save modified config");
        let reloaded = Config::load_from_path(&config_path).expect("Failed to reload config");
        assert_eq!(reloaded.connection_settings().model_name, DEFAULT_MODEL_NAME);
        assert_eq!(reloaded.last_folder, Some(PathBuf::from("/home/user/notes")));
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, "endpoint_url = [").expect("write");

        assert!(Config::load_from_path(&config_path).is_err());
    }

    #[test]
    fn test_validate_requires_non_blank_values() {
        assert_eq!(ConnectionSettings::default().validate(), Ok(()));
        assert_eq!(
            ConnectionSettings::new(" ", "llama3").validate(),
            Err(SettingsError::EmptyEndpointUrl)
        );
        assert_eq!(
            ConnectionSettings::new("http://localhost:11434", "").validate(),
            Err(SettingsError::EmptyModelName)
        );
    }
}
