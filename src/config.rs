//! Engine/session configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::Result;

/// Configuration for loading a model and allocating its inference context.
///
/// Loadable from a TOML file with `TOKENPIPE_*` environment overrides; all
/// fields default so an empty source is valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Path to the model weights (GGUF or similar)
    pub model_path: Option<PathBuf>,
    /// Number of layers to offload to the GPU; 0 keeps everything on CPU
    pub gpu_layers: i32,
    /// Context window in tokens; 0 defers to the model's own configuration
    pub context_length: u32,
    /// Decode batch size
    pub batch_count: u32,
    /// Default per-request token budget
    pub max_tokens: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            gpu_layers: 0,
            context_length: 2048,
            batch_count: 512,
            max_tokens: 50,
        }
    }
}

impl EngineConfig {
    /// Loads configuration, layering an optional TOML file under
    /// `TOKENPIPE_`-prefixed environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        let settings = builder
            .add_source(config::Environment::with_prefix("TOKENPIPE"))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.context_length, 2048);
        assert_eq!(cfg.batch_count, 512);
        assert!(cfg.model_path.is_none());
    }

    #[test]
    fn test_load_from_toml() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            "model_path = \"/models/test.q4_0.gguf\"\ngpu_layers = 32\ncontext_length = 4096"
        )
        .unwrap();

        let cfg = EngineConfig::load(Some(file.path())).unwrap();
        assert_eq!(
            cfg.model_path.as_deref(),
            Some(Path::new("/models/test.q4_0.gguf"))
        );
        assert_eq!(cfg.gpu_layers, 32);
        assert_eq!(cfg.context_length, 4096);
        // Unset keys fall back to defaults.
        assert_eq!(cfg.batch_count, 512);
    }
}
