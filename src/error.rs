use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure taxonomy for the indexing and query core.
///
/// Absence (missing note/block/habit by id) is not an error anywhere in the
/// crate; lookups return `Option` and callers treat `None` as valid state.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O failure on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("storage failure: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("filesystem watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("habit type is locked: habit {0} already has logged entries")]
    TypeLocked(i64),

    #[error("no vault is open")]
    VaultClosed,
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}
