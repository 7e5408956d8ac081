//! Host configuration loader.
//!
//! Grounded directly on `infrastructure::config::loader::ConfigLoader`:
//! merge defaults, then an XDG global config, then a project-level
//! config file, then an explicit path, in ascending priority, via
//! `figment`.

use super::file_config::FileConfig;
use figment::providers::{Format, Serialized, Toml};
use figment::Figment;
use std::path::PathBuf;

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load(config_path: Option<&PathBuf>) -> Result<FileConfig, Box<figment::Error>> {
        let mut figment = Figment::new().merge(Serialized::defaults(FileConfig::default()));

        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                figment = figment.merge(Toml::file(&global_path).nested());
            }
        }

        for filename in &["conductor.toml", ".conductor.toml"] {
            let path = PathBuf::from(filename);
            if path.exists() {
                figment = figment.merge(Toml::file(&path).nested());
                break;
            }
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path).nested());
        }

        figment.extract().map_err(Box::new)
    }

    pub fn load_defaults() -> FileConfig {
        FileConfig::default()
    }

    pub fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("conductor").join("config.toml"))
    }

    pub fn project_config_path() -> Option<PathBuf> {
        let path = PathBuf::from("conductor.toml");
        path.exists().then_some(path)
    }
}
