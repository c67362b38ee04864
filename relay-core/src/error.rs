//! Error kinds for the relay client core.

/// Errors surfaced by `relay-core` components.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("no candidate endpoints provided")]
    NoCandidates,

    #[error("no server validated")]
    NoServerValidated,

    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
