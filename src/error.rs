use async_graphql::ErrorExtensions;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Select at least one genre")]
    NoGenreSelected,
    #[error("Source file not found: {0}")]
    SourceNotFound(String),
    #[error("Path is outside the sources directory: {0}")]
    InvalidPath(String),
    #[error("File not found: {0}")]
    NotFound(String),
    #[error("Only CSV files are allowed, got {0}")]
    UnsupportedType(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ImportError {
    pub fn code(&self) -> &'static str {
        match self {
            ImportError::NoGenreSelected => "NO_GENRE_SELECTED",
            ImportError::SourceNotFound(_) => "SOURCE_NOT_FOUND",
            ImportError::InvalidPath(_) => "INVALID_PATH",
            ImportError::NotFound(_) => "NOT_FOUND",
            ImportError::UnsupportedType(_) => "UNSUPPORTED_TYPE",
            ImportError::Io(_) | ImportError::Internal(_) => "INTERNAL",
        }
    }
}

impl ErrorExtensions for ImportError {
    fn extend(&self) -> async_graphql::Error {
        async_graphql::Error::new(self.to_string()).extend_with(|_, e| e.set("code", self.code()))
    }
}
