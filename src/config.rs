use std::{collections::HashMap, env, path::PathBuf};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Source of name/value pairs used to seed the plumbing environment, so
/// rules can refer to `$HOME` and friends without defining them.
pub trait ConfigType: Send + Sync {
    fn keys(&self) -> Vec<String>;
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), String>;
    fn as_map(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        for key in self.keys() {
            if let Some(value) = self.get(&key) {
                map.insert(key, value);
            }
        }
        map
    }
    fn clone_box(&self) -> Box<dyn ConfigType>;
    fn debug_box(&self) -> String;
}

pub struct Config(pub Box<dyn ConfigType>);

impl Config {
    pub fn into_inner(self) -> Box<dyn ConfigType> {
        self.0
    }
}

impl Clone for Config {
    fn clone(&self) -> Self {
        Config(self.0.clone_box())
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.debug_box())
    }
}

/// Process environment, optionally topped up from a `.env` file.
#[derive(Clone, Debug)]
pub struct EnvConfig;

impl EnvConfig {
    pub fn new(env_file: PathBuf) -> Box<Self> {
        if env_file.exists() {
            dotenvy::from_path(&env_file).ok();
            info!("loaded .env from {}", env_file.display());
        } else {
            warn!("no .env at {}", env_file.display());
        }
        Box::new(Self)
    }
}

impl ConfigType for EnvConfig {
    fn keys(&self) -> Vec<String> {
        env::vars().map(|(k, _)| k).collect()
    }

    fn get(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), String> {
        unsafe {
            env::set_var(key, value);
        }
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn ConfigType> {
        Box::new(self.clone())
    }

    fn debug_box(&self) -> String {
        "EnvConfig".to_string()
    }
}

/// Plain in-memory map, handy for tests and for hosts that assemble the
/// seed environment themselves.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct MapConfig {
    map: HashMap<String, String>,
}

impl MapConfig {
    pub fn new() -> Box<Self> {
        Box::new(Self::default())
    }

    pub fn from_map(map: HashMap<String, String>) -> Box<Self> {
        Box::new(Self { map })
    }
}

impl ConfigType for MapConfig {
    fn keys(&self) -> Vec<String> {
        self.map.keys().cloned().collect()
    }

    fn get(&self, key: &str) -> Option<String> {
        self.map.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), String> {
        self.map.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn ConfigType> {
        Box::new(self.clone())
    }

    fn debug_box(&self) -> String {
        format!("MapConfig({} entries)", self.map.len())
    }
}
