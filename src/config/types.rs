use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunletConfig {
    pub engine: EngineConfig,
    pub runtimes: RuntimesConfig,
}

/// Hard ceilings and defaults the coordinator validates every request
/// against. Fixed at engine construction, never per-request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Wall-clock limit applied when a request does not set its own
    pub default_timeout_ms: u64,
    /// Largest wall-clock limit a request may ask for
    pub max_timeout_ms: u64,
    /// Memory ceiling applied when a request does not set its own
    pub default_memory_limit_mb: u64,
    /// Largest memory ceiling a request may ask for
    pub max_memory_limit_mb: u64,
    /// Largest accepted snippet, in bytes
    pub max_source_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 500,
            max_timeout_ms: 10_000,
            default_memory_limit_mb: 128,
            max_memory_limit_mb: 512,
            max_source_bytes: 64 * 1024,
        }
    }
}

impl EngineConfig {
    pub fn default_memory_limit_bytes(&self) -> u64 {
        self.default_memory_limit_mb * 1024 * 1024
    }

    pub fn max_memory_limit_bytes(&self) -> u64 {
        self.max_memory_limit_mb * 1024 * 1024
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimesConfig {
    pub javascript: RuntimeConfig,
    pub python: RuntimeConfig,
}

/// Configuration for one language runtime binary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Explicit binary path; the standard name is looked up on PATH when unset
    pub binary: Option<PathBuf>,
    /// Extra arguments passed to the runtime before the harness program
    pub args: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_in_bounds() {
        let config = EngineConfig::default();
        assert!(config.default_timeout_ms <= config.max_timeout_ms);
        assert!(config.default_memory_limit_mb <= config.max_memory_limit_mb);
        assert!(config.max_source_bytes > 0);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let raw = r#"
            [engine]
            default_timeout_ms = 250

            [runtimes.javascript]
            binary = "/usr/local/bin/node"
        "#;

        let config: RunletConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.engine.default_timeout_ms, 250);
        assert_eq!(config.engine.max_timeout_ms, 10_000);
        assert_eq!(
            config.runtimes.javascript.binary,
            Some(PathBuf::from("/usr/local/bin/node"))
        );
        assert!(config.runtimes.python.binary.is_none());
    }
}
