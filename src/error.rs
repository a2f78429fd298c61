use std::io;
use std::path::PathBuf;

use plotters::drawing::DrawingAreaErrorKind;
use thiserror::Error;

/// Errors produced while configuring, simulating, or rendering a run.
#[derive(Debug, Error)]
pub enum ChainsError {
    /// A parameter is out of range or inconsistent. Raised before any drawing.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Reading a config file or writing the figure failed.
    #[error("I/O error at '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The drawing backend failed part way through a figure.
    #[error("render error: {0}")]
    Render(String),
}

pub type Result<T> = std::result::Result<T, ChainsError>;

impl ChainsError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl<E> From<DrawingAreaErrorKind<E>> for ChainsError
where
    E: std::error::Error + Send + Sync,
{
    fn from(err: DrawingAreaErrorKind<E>) -> Self {
        Self::Render(err.to_string())
    }
}
