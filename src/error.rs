use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Unrecognized log level name '{0}'")]
    InvalidLevel(String),

    #[error("Log level ordinal ({0}) is outside the defined range")]
    InvalidLevelOrdinal(i32),

    #[error("Sink failed to accept the event ({0})")]
    Sink(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error(
        "Encountered an IO error while writing the event ({})",
        .0.kind()
    )]
    Io(#[from] io::Error),
}

impl Error {
    /// Wrap an arbitrary sink-side failure.
    pub fn sink<E>(e: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Error::Sink(e.into())
    }
}
