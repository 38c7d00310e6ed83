use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunletError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML parse error: {0}")]
    TomlParse(String),

    // Runtime resolution errors
    #[error("Runtime for {language} not available: {reason}")]
    RuntimeUnavailable { language: String, reason: String },

    // Sandbox errors
    #[error("Sandbox setup failed: {0}")]
    SandboxSetup(String),

    #[error("Sandbox execution failed: {0}")]
    SandboxExecution(String),

    // Recorder errors
    #[error("Recorder error: {0}")]
    Recorder(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Generic wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, RunletError>;
