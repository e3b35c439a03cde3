use std::fs;
use std::path::{Path, PathBuf};

use log::*;
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";
pub const DEFAULT_VALIDATION_LAYER: &str = "VK_LAYER_KHRONOS_validation";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file `{path}`: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file `{path}`: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Settings absorbed once at construction and threaded through the renderer.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub width: u32,
    pub height: u32,
    pub enable_validation: bool,
    pub verbose: bool,
    pub validation_layers: Vec<String>,
    pub shader_compiler: String,
    pub shader_source_dir: PathBuf,
    pub shader_output_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            enable_validation: true,
            verbose: true,
            validation_layers: vec![DEFAULT_VALIDATION_LAYER.to_string()],
            shader_compiler: "glslc".to_string(),
            shader_source_dir: PathBuf::from("shaders"),
            shader_output_dir: PathBuf::from("bin/shaders"),
        }
    }
}

/// On-disk layout; every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct ConfigFile {
    width: Option<u32>,
    height: Option<u32>,
    validation: Option<bool>,
    verbose: Option<bool>,
    validation_layers: Vec<String>,
    shader_compiler: Option<String>,
    shader_source_dir: Option<PathBuf>,
    shader_output_dir: Option<PathBuf>,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Config::parse(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads `path`, falling back to the defaults when it is missing or malformed.
    pub fn load_or_default(path: impl AsRef<Path>) -> Config {
        match Config::load(path) {
            Ok(config) => config,
            Err(error) => {
                warn!("{}. Using default configuration.", error);
                Config::default()
            }
        }
    }

    pub fn parse(text: &str) -> Result<Config, toml::de::Error> {
        let file: ConfigFile = toml::from_str(text)?;
        let defaults = Config::default();

        let mut config = Config {
            width: file.width.unwrap_or(defaults.width),
            height: file.height.unwrap_or(defaults.height),
            enable_validation: file.validation.unwrap_or(defaults.enable_validation),
            verbose: file.verbose.unwrap_or(defaults.verbose),
            validation_layers: defaults.validation_layers,
            shader_compiler: file.shader_compiler.unwrap_or(defaults.shader_compiler),
            shader_source_dir: file.shader_source_dir.unwrap_or(defaults.shader_source_dir),
            shader_output_dir: file.shader_output_dir.unwrap_or(defaults.shader_output_dir),
        };
        // Extra layers are only read when validation is on.
        if config.enable_validation {
            for layer in file.validation_layers {
                config.add_validation_layer(layer);
            }
        }

        Ok(config)
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.enable_validation = enabled;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Appends `layer` unless it is already requested.
    pub fn add_validation_layer(&mut self, layer: impl Into<String>) {
        let layer = layer.into();
        if !self.validation_layers.contains(&layer) {
            self.validation_layers.push(layer);
        }
    }

    pub fn vertex_shader_source(&self) -> PathBuf {
        self.shader_source_dir.join("shader.vert")
    }

    pub fn fragment_shader_source(&self) -> PathBuf {
        self.shader_source_dir.join("shader.frag")
    }

    pub fn vertex_shader_binary(&self) -> PathBuf {
        self.shader_output_dir.join("vert.spv")
    }

    pub fn fragment_shader_binary(&self) -> PathBuf {
        self.shader_output_dir.join("frag.spv")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!((config.width, config.height), (800, 600));
        assert!(config.enable_validation);
        assert!(config.verbose);
        assert_eq!(config.validation_layers, vec![DEFAULT_VALIDATION_LAYER]);
        assert_eq!(config.vertex_shader_binary(), PathBuf::from("bin/shaders/vert.spv"));
    }

    #[test]
    fn test_empty_file_is_default() {
        assert_eq!(Config::parse("").unwrap(), Config::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config = Config::parse("width = 1280\nvalidation = false\n").unwrap();
        assert_eq!(config.width, 1280);
        assert_eq!(config.height, 600);
        assert!(!config.enable_validation);
        assert!(config.verbose);
    }

    #[test]
    fn test_layers_are_appended_without_duplicates() {
        let text = r#"
validation-layers = [
    "VK_LAYER_LUNARG_api_dump",
    "VK_LAYER_KHRONOS_validation",
    "VK_LAYER_LUNARG_api_dump",
]
"#;
        let config = Config::parse(text).unwrap();
        assert_eq!(
            config.validation_layers,
            vec!["VK_LAYER_KHRONOS_validation", "VK_LAYER_LUNARG_api_dump"]
        );
    }

    #[test]
    fn test_layers_ignored_without_validation() {
        let text = r#"
validation = false
validation-layers = ["VK_LAYER_LUNARG_api_dump"]
"#;
        let config = Config::parse(text).unwrap();
        assert!(!config.enable_validation);
        assert_eq!(config.validation_layers, vec![DEFAULT_VALIDATION_LAYER]);
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        assert!(Config::parse("width = \"wide\"").is_err());
    }

    #[test]
    fn test_missing_file() {
        let error = Config::load("does/not/exist.toml").unwrap_err();
        assert!(matches!(error, ConfigError::Io { .. }));
        assert_eq!(Config::load_or_default("does/not/exist.toml"), Config::default());
    }

    #[test]
    fn test_builder() {
        let config = Config::default()
            .with_size(320, 240)
            .with_validation(false)
            .with_verbose(false);
        assert_eq!((config.width, config.height), (320, 240));
        assert!(!config.enable_validation);
        assert!(!config.verbose);
    }
}
