use std::path::PathBuf;
use std::sync::Arc;

use log::{info, warn};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::state::SearchTuning;

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Config {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_team_name")]
    pub team_name: String,
    #[serde(default = "default_export_dir")]
    pub export_dir: String,
    #[serde(default)]
    pub search: SearchTuning,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Last index directory loaded, offered again on the next start.
    #[serde(default)]
    pub index_dir: Option<String>,
}

fn default_api_base() -> String {
    "http://localhost:8000".to_string()
}

fn default_team_name() -> String {
    "TeamName".to_string()
}

fn default_export_dir() -> String {
    ".".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            team_name: default_team_name(),
            export_dir: default_export_dir(),
            search: SearchTuning::default(),
            log_level: default_log_level(),
            index_dir: None,
        }
    }
}

impl Config {
    pub fn log_filter(&self) -> log::LevelFilter {
        match self.log_level.to_lowercase().as_str() {
            "off" => log::LevelFilter::Off,
            "error" => log::LevelFilter::Error,
            "warn" | "warning" => log::LevelFilter::Warn,
            "debug" => log::LevelFilter::Debug,
            "trace" => log::LevelFilter::Trace,
            "info" => log::LevelFilter::Info,
            other => {
                warn!("Unrecognized log level '{}', falling back to info", other);
                log::LevelFilter::Info
            }
        }
    }
}

pub struct ConfigState {
    pub config: Arc<Mutex<Config>>,
    pub path: PathBuf,
}

impl ConfigState {
    pub fn new(config: Config, path: PathBuf) -> Self {
        Self {
            config: Arc::new(Mutex::new(config)),
            path,
        }
    }

    pub async fn save(&self) -> Result<(), String> {
        let config = self.config.lock().await;
        let content = serde_json::to_string_pretty(&*config).map_err(|e| e.to_string())?;
        std::fs::write(&self.path, content).map_err(|e| e.to_string())?;
        info!("Config saved to {:?}", self.path);
        Ok(())
    }
}

pub fn load_config(config_path: &std::path::Path) -> Config {
    if !config_path.exists() {
        info!("No config found, creating default config");
        let default = Config::default();
        if let Ok(json) = serde_json::to_string_pretty(&default) {
            let _ = std::fs::write(config_path, json);
        }
        return default;
    }
    let content = std::fs::read_to_string(config_path).unwrap_or_default();
    match serde_json::from_str::<Config>(&content) {
        Ok(c) => {
            info!("Config loaded from {:?}", config_path);
            c
        }
        Err(e) => {
            warn!("Config parse failed ({}), rewriting defaults", e);
            let default = Config::default();
            if let Ok(json) = serde_json::to_string_pretty(&default) {
                let _ = std::fs::write(config_path, json);
            }
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_serde_roundtrip() {
        let mut config = Config::default();
        config.team_name = "Orbiters".into();
        config.search.top_k = 25;
        config.index_dir = Some("cache/indexes".into());

        let json = serde_json::to_string(&config).unwrap();
        let restored: Config = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.team_name, "Orbiters");
        assert_eq!(restored.search.top_k, 25);
        assert_eq!(restored.index_dir.as_deref(), Some("cache/indexes"));
    }

    #[test]
    fn test_config_backward_compat() {
        let config: Config = serde_json::from_str(r#"{ "api_base": "http://gpu-box:8000" }"#).unwrap();
        assert_eq!(config.api_base, "http://gpu-box:8000");
        assert_eq!(config.team_name, "TeamName");
        assert_eq!(config.search.top_k, 100);
        assert!((config.search.nms_threshold - 0.5).abs() < 0.01);
        assert_eq!(config.log_filter(), log::LevelFilter::Info);
    }

    #[test]
    fn test_load_config_creates_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = load_config(&path);
        assert_eq!(config.api_base, "http://localhost:8000");
        assert!(path.exists());
    }

    #[test]
    fn test_load_config_recovers_from_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ nope").unwrap();
        let config = load_config(&path);
        assert_eq!(config.team_name, "TeamName");
        let rewritten = std::fs::read_to_string(&path).unwrap();
        assert!(rewritten.contains("api_base"));
    }

    #[tokio::test]
    async fn test_config_state_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let state = ConfigState::new(Config::default(), path.clone());
        state.config.lock().await.index_dir = Some("idx".into());
        state.save().await.unwrap();
        let reloaded = load_config(&path);
        assert_eq!(reloaded.index_dir.as_deref(), Some("idx"));
    }
}
