use std::path::PathBuf;

use envconfig::Envconfig;
use lazy_static::lazy_static;

#[derive(Debug, Envconfig)]
pub struct Config {
    #[envconfig(from = "LAVENDER_PORT", default = "5002")]
    pub port: u16,
    #[envconfig(from = "LAVENDER_HOST", default = "0.0.0.0")]
    pub host: String,
    #[envconfig(from = "LAVENDER_LOG_LEVEL", default = "info")]
    pub log_level: String,
    /// Index consulted by the rewrite service
    #[envconfig(from = "LAVENDER_INDEX_FILE", default = "./data/lavender.idx")]
    pub index_file: PathBuf,
    /// One CDN node URI per line
    #[envconfig(from = "LAVENDER_NODES_FILE", default = "./data/nodes")]
    pub nodes_file: PathBuf,
    /// Virtual ring positions per CDN node
    #[envconfig(from = "LAVENDER_REPLICAS", default = "200")]
    pub replicas: usize,
    #[envconfig(from = "LAVENDER_CONTEXT_PATH", default = "/")]
    pub context_path: String,
    #[envconfig(from = "LAVENDER_CACHE_DIR", default = "./data/cache")]
    pub cache_dir: PathBuf,
    //Seconds a publish waits for a lock held by someone else
    #[envconfig(from = "LAVENDER_LOCK_WAIT_SECS", default = "0")]
    pub lock_wait_secs: u64,
}

impl Config {
    pub fn init() -> Config {
        Config::init_from_env().expect("Failed to load config")
    }

    /// Tracing filter directive derived from the configured log level.
    pub fn log_filter(&self) -> String {
        match self.log_level.to_ascii_uppercase().as_str() {
            "ERROR" => "error",
            "WARN" => "warn",
            "DEBUG" => "debug",
            "TRACE" => "trace",
            _ => "info",
        }
        .to_string()
    }
}

lazy_static! {
    pub static ref CONFIG: Config = Config::init();
    /// The path to the lock file guarding publishes into the cache directory
    pub static ref LOCK_FILE_PATH: PathBuf = CONFIG.cache_dir.join(".lock");
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn defaults_apply_without_environment() {
        let config = Config::init_from_hashmap(&HashMap::new()).unwrap();
        assert_eq!(config.port, 5002);
        assert_eq!(config.replicas, 200);
        assert_eq!(config.context_path, "/");
        assert_eq!(config.log_filter(), "info");
    }

    #[test]
    fn log_level_is_case_insensitive() {
        let mut env = HashMap::new();
        env.insert("LAVENDER_LOG_LEVEL".to_string(), "Debug".to_string());
        let config = Config::init_from_hashmap(&env).unwrap();
        assert_eq!(config.log_filter(), "debug");
    }
}
