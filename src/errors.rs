/// Error types for pricing, searching and running scenarios.
///
/// `Domain` and `InvalidConfig` are fatal to the single evaluation or search
/// that raised them and are never retried. A search that simply finds no
/// crossing is not an error; it returns `SearchResult::NotFound`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("domain error: {0}")]
    Domain(String),

    #[error("invalid search config: {0}")]
    InvalidConfig(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("channel closed: {0}")]
    ChannelClosed(String),
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Parse(e.to_string())
    }
}

impl From<chrono::ParseError> for EngineError {
    fn from(e: chrono::ParseError) -> Self {
        EngineError::Parse(e.to_string())
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(e: rusqlite::Error) -> Self {
        EngineError::Database(e.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::Io(e.to_string())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
