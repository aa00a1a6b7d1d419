use std::io;

/// Central error type for the etude server core.
#[derive(Debug)]
pub enum EtudeError {
    /// Underlying I/O error from the OS or network.
    Io(io::Error),
    /// Credential store failure.
    Store(rusqlite::Error),
    /// The worker pool queue is at capacity.
    QueueFull,
    /// Invalid configuration or command-line value.
    Config(String),
}

impl std::fmt::Display for EtudeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EtudeError::Io(e) => write!(f, "I/O error: {}", e),
            EtudeError::Store(e) => write!(f, "store error: {}", e),
            EtudeError::QueueFull => write!(f, "worker queue is full"),
            EtudeError::Config(msg) => write!(f, "config error: {}", msg),
        }
    }
}

impl std::error::Error for EtudeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EtudeError::Io(e) => Some(e),
            EtudeError::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for EtudeError {
    fn from(e: io::Error) -> Self {
        EtudeError::Io(e)
    }
}

impl From<rusqlite::Error> for EtudeError {
    fn from(e: rusqlite::Error) -> Self {
        EtudeError::Store(e)
    }
}

pub type EtudeResult<T> = Result<T, EtudeError>;
