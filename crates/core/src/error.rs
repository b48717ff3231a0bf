use thiserror::Error;

pub type GameLensResult<T> = Result<T, GameLensError>;

#[derive(Error, Debug)]
pub enum GameLensError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for GameLensError {
    fn from(err: config::ConfigError) -> Self {
        GameLensError::Config(err.to_string())
    }
}
