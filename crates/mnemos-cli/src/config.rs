//! Configuration – reads/writes `~/.mnemos/config.toml`.

use mnemos_memory::MemoryConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Persisted user configuration stored in `~/.mnemos/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the Ollama instance used for embeddings.
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    /// Ollama model that produces embeddings.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Set to `false` to skip the Ollama probe and always use the
    /// deterministic fallback embedding.
    #[serde(default = "default_use_ollama")]
    pub use_ollama: bool,

    /// Knowledge graph and session tunables.
    #[serde(default = "default_memory")]
    pub memory: MemoryConfig,
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}
fn default_use_ollama() -> bool {
    true
}

/// Vector length produced by `nomic-embed-text`.
const NOMIC_EMBED_DIMENSION: usize = 768;

fn default_memory() -> MemoryConfig {
    MemoryConfig {
        dimension: NOMIC_EMBED_DIMENSION,
        ..MemoryConfig::default()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ollama_url: default_ollama_url(),
            embedding_model: default_embedding_model(),
            use_ollama: default_use_ollama(),
            memory: default_memory(),
        }
    }
}

impl Config {
    /// Size the engine to the vectors the embedding model actually returns.
    /// Returns the previous dimension when it had to change.
    pub fn adopt_embedding_dimension(&mut self, dimension: usize) -> Option<usize> {
        if dimension == 0 || dimension == self.memory.dimension {
            return None;
        }
        Some(std::mem::replace(&mut self.memory.dimension, dimension))
    }
}

/// Return the path to `~/.mnemos/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".mnemos").join("config.toml")
}

/// Load the config from disk. Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `MNEMOS_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `MNEMOS_OLLAMA_URL` | `ollama_url` |
/// | `MNEMOS_EMBEDDING_MODEL` | `embedding_model` |
/// | `MNEMOS_DIMENSION` | `memory.dimension` |
/// | `MNEMOS_WORKING_CAPACITY` | `memory.working_capacity` |
///
/// Unparseable numbers are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("MNEMOS_OLLAMA_URL") {
        cfg.ollama_url = v;
    }
    if let Ok(v) = std::env::var("MNEMOS_EMBEDDING_MODEL") {
        cfg.embedding_model = v;
    }
    if let Ok(v) = std::env::var("MNEMOS_DIMENSION")
        && let Ok(dim) = v.parse::<usize>()
    {
        cfg.memory.dimension = dim;
    }
    if let Ok(v) = std::env::var("MNEMOS_WORKING_CAPACITY")
        && let Ok(cap) = v.parse::<usize>()
    {
        cfg.memory.working_capacity = cap;
    }
}

/// Save the config to disk, creating `~/.mnemos/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_creates_missing_directory() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(!path.parent().unwrap().exists());

        save_to(&Config::default(), &path).expect("save");
        assert!(path.exists());
    }

    #[test]
    fn default_dimension_matches_default_model() {
        let cfg = Config::default();
        assert_eq!(cfg.embedding_model, "nomic-embed-text");
        assert_eq!(cfg.memory.dimension, 768);
        assert!(cfg.memory.validate().is_ok());
    }

    #[test]
    fn missing_memory_table_uses_model_dimension() {
        let cfg: Config = toml::from_str("use_ollama = true\n").unwrap();
        assert_eq!(cfg.memory.dimension, 768);
    }

    #[test]
    fn adopt_embedding_dimension_reports_changes_only() {
        let mut cfg = Config::default();
        assert_eq!(cfg.adopt_embedding_dimension(768), None);
        assert_eq!(cfg.adopt_embedding_dimension(0), None);
        assert_eq!(cfg.adopt_embedding_dimension(1024), Some(768));
        assert_eq!(cfg.memory.dimension, 1024);
    }

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.embedding_model, "nomic-embed-text");
        assert_eq!(loaded.memory.dimension, 768);
        assert_eq!(loaded.memory.working_capacity, 100);
        assert!(loaded.use_ollama);
    }

    #[test]
    fn partial_memory_table_keeps_other_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "use_ollama = false\n\n[memory]\ndimension = 64\ndecay_rate_per_hour = 0.5\n",
        )
        .unwrap();

        let cfg = load_from(&path).expect("load ok").expect("some");
        assert!(!cfg.use_ollama);
        assert_eq!(cfg.ollama_url, "http://localhost:11434");
        assert_eq!(cfg.memory.dimension, 64);
        assert_eq!(cfg.memory.decay_rate_per_hour, 0.5);
        assert_eq!(cfg.memory.link_threshold, 0.7);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "memory = [not toml").unwrap();
        assert!(load_from(&path).unwrap_err().contains("Failed to parse config"));
    }

    #[test]
    fn config_path_points_to_mnemos_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".mnemos"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn apply_env_overrides_changes_ollama_settings() {
        // SAFETY: env vars are only touched by this test.
        unsafe {
            std::env::set_var("MNEMOS_OLLAMA_URL", "http://gpu-box:11434");
            std::env::set_var("MNEMOS_EMBEDDING_MODEL", "mxbai-embed-large");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.ollama_url, "http://gpu-box:11434");
        assert_eq!(cfg.embedding_model, "mxbai-embed-large");
        unsafe {
            std::env::remove_var("MNEMOS_OLLAMA_URL");
            std::env::remove_var("MNEMOS_EMBEDDING_MODEL");
        }
    }

    #[test]
    fn apply_env_overrides_changes_memory_sizes() {
        // SAFETY: env vars are only touched by this test.
        unsafe {
            std::env::set_var("MNEMOS_DIMENSION", "1024");
            std::env::set_var("MNEMOS_WORKING_CAPACITY", "not-a-number");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.memory.dimension, 1024);
        assert_eq!(cfg.memory.working_capacity, 100);
        unsafe {
            std::env::remove_var("MNEMOS_DIMENSION");
            std::env::remove_var("MNEMOS_WORKING_CAPACITY");
        }
    }
}
