use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ViewError {
    #[error("failed to open {}: {message}", .path.display())]
    Open { path: PathBuf, message: String },
    #[error("failed to render page {}: {message}", .page + 1)]
    Render { page: usize, message: String },
}

impl ViewError {
    pub fn open(path: impl Into<PathBuf>, err: &anyhow::Error) -> Self {
        ViewError::Open {
            path: path.into(),
            message: format!("{err:#}"),
        }
    }

    pub fn render(page: usize, err: &anyhow::Error) -> Self {
        ViewError::Render {
            page,
            message: format!("{err:#}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}
