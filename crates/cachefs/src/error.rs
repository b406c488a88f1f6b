use std::io;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum CacheFsError {
    #[error("Invalid path: {0:?}")]
    InvalidPath(String),

    #[error("Invalid cache key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Record encode error: {0}")]
    Encode(String),

    #[error("Record decode error: {0}")]
    Decode(String),

    #[error("Unsupported record version {found} (expected {expected})")]
    RecordVersion { found: u32, expected: u32 },

    /// A loader failure, shared by every caller that waited on the same key.
    #[error(transparent)]
    Load(Arc<CacheFsError>),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("End of directory")]
    EndOfDirectory,

    #[error("open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: Box<CacheFsError>,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, CacheFsError>;

impl CacheFsError {
    /// Wraps `self` as a failure to open `path`.
    pub fn open(path: impl Into<String>, source: CacheFsError) -> Self {
        Self::Open {
            path: path.into(),
            source: Box::new(source),
        }
    }

    /// Returns the innermost error, looking through `Open` and `Load`.
    pub fn root_cause(&self) -> &CacheFsError {
        match self {
            Self::Open { source, .. } => source.root_cause(),
            Self::Load(shared) => shared.root_cause(),
            other => other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.root_cause(), Self::Io(err) if err.kind() == io::ErrorKind::NotFound)
    }

    pub fn is_invalid_path(&self) -> bool {
        matches!(self.root_cause(), Self::InvalidPath(_))
    }

    pub fn is_end_of_directory(&self) -> bool {
        matches!(self, Self::EndOfDirectory)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.root_cause(), Self::Cancelled)
    }
}

impl From<postcard::Error> for CacheFsError {
    fn from(error: postcard::Error) -> Self {
        Self::Decode(error.to_string())
    }
}

impl From<serde_json::Error> for CacheFsError {
    fn from(error: serde_json::Error) -> Self {
        Self::Config(error.to_string())
    }
}
