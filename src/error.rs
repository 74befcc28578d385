//! Error types shared across the benchmark library

/// Errors raised by the storage, engine and scoring layers
#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Malformed record at {key}: {source}")]
    MalformedRecord {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("Project already exists: {0}")]
    ProjectExists(String),

    #[error("Unknown engine: {0}")]
    UnknownEngine(String),

    #[error("Engine {engine} failed: {message}")]
    Engine { engine: String, message: String },

    #[error("Invalid setting {name} for engine {engine}: {message}")]
    InvalidSetting {
        engine: String,
        name: String,
        message: String,
    },

    #[error("Image payload missing or unreadable: {0}")]
    Image(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BenchError {
    /// Build an engine failure
    pub fn engine(engine: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Engine {
            engine: engine.into(),
            message: message.into(),
        }
    }
}

/// Library result alias
pub type Result<T> = std::result::Result<T, BenchError>;
