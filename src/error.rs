use std::path::PathBuf;

/// Errors raised by the relay and the RTK pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Local GNSS receiver could not be opened. Fatal at startup.
    #[error("failed to open receiver \"{port}\": {source}")]
    ReceiverOpen {
        port: String,
        #[source]
        source: std::io::Error,
    },

    /// I/O error on a named file.
    #[error("{}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Link transport I/O error.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Positioning engine cannot run (missing executable or configuration).
    #[error("positioning engine unavailable: {} not found", .0.display())]
    EngineUnavailable(PathBuf),

    /// Positioning engine exited with a failure status.
    #[error("{program} exited with {status}")]
    EngineExit { program: String, status: String },

    /// Positioning engine did not complete in time.
    #[error("{program} timed out after {timeout}")]
    EngineTimeout {
        program: String,
        timeout: hifitime::Duration,
    },

    /// Positioning engine could not be spawned.
    #[error("failed to spawn {program}: {source}")]
    EngineSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Publish sink is unreachable or rejected the fix.
    #[error("publish failure: {0}")]
    Publish(#[from] reqwest::Error),
}

impl Error {
    /// Wraps an I/O error with the file it relates to.
    pub fn file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::File {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
