use std::fmt;
use std::path::PathBuf;

/// Pipeline-level error types.
///
/// Per-record verification faults are never represented here; they travel as
/// `ChannelCheck::Unknown` values and the run continues.
#[derive(Debug)]
pub enum PipelineError {
    /// Invalid configuration or any other failure before verification starts.
    Setup(String),
    /// The candidate dataset does not exist.
    InputNotFound(PathBuf),
    /// The candidate dataset exists but cannot be parsed.
    InvalidInput(String),
    /// The external session could not be established.
    SessionBootstrap(String),
    /// A durable write (checkpoint, output dataset, session file) failed.
    Storage(String),
    /// The verification executor can no longer make progress.
    Executor(String),
    /// Error with context chain for better debugging.
    WithContext {
        /// The underlying source of the error.
        source: Box<PipelineError>,
        /// Additional context message.
        context: String,
    },
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Setup(msg) => write!(f, "Setup error: {}", msg),
            PipelineError::InputNotFound(path) => {
                write!(f, "Input file not found: {}", path.display())
            }
            PipelineError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            PipelineError::SessionBootstrap(msg) => write!(f, "Session bootstrap failed: {}", msg),
            PipelineError::Storage(msg) => write!(f, "Storage error: {}", msg),
            PipelineError::Executor(msg) => write!(f, "Verification halted: {}", msg),
            PipelineError::WithContext { source, context } => {
                write!(f, "{}: {}", context, source)
            }
        }
    }
}

impl std::error::Error for PipelineError {}

impl PipelineError {
    /// Process exit status for this error.
    ///
    /// Setup-class failures (including a missing input or an unusable
    /// session) exit with 2, durable write failures with 3 and a halted
    /// executor with 4.
    pub fn exit_code(&self) -> u8 {
        match self {
            PipelineError::Setup(_)
            | PipelineError::InputNotFound(_)
            | PipelineError::InvalidInput(_)
            | PipelineError::SessionBootstrap(_) => 2,
            PipelineError::Storage(_) => 3,
            PipelineError::Executor(_) => 4,
            PipelineError::WithContext { source, .. } => source.exit_code(),
        }
    }

    /// True for failures that happen before any record is verified.
    pub fn is_setup_failure(&self) -> bool {
        self.exit_code() == 2
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Storage(format!("serialization failed: {}", err))
    }
}

/// Extension trait for adding context to errors.
/// Similar to `anyhow::Context` but for our `PipelineError` type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T, PipelineError>;

    /// Add context lazily (only evaluated on error).
    fn with_context<F>(self, f: F) -> Result<T, PipelineError>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T, PipelineError> {
    fn context(self, context: impl Into<String>) -> Result<T, PipelineError> {
        self.map_err(|e| PipelineError::WithContext {
            source: Box::new(e),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, PipelineError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| PipelineError::WithContext {
            source: Box::new(e),
            context: f(),
        })
    }
}

/// Extension for io::Error to add context
impl<T> ResultExt<T> for Result<T, std::io::Error> {
    fn context(self, context: impl Into<String>) -> Result<T, PipelineError> {
        self.map_err(|e| PipelineError::WithContext {
            source: Box::new(PipelineError::from(e)),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, PipelineError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| PipelineError::WithContext {
            source: Box::new(PipelineError::from(e)),
            context: f(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_keeps_exit_code_of_source() {
        let err: Result<(), PipelineError> = Err(PipelineError::Storage("disk full".into()));
        let err = err.context("flushing checkpoint").unwrap_err();

        assert_eq!(err.exit_code(), 3);
        assert_eq!(
            err.to_string(),
            "flushing checkpoint: Storage error: disk full"
        );
    }

    #[test]
    fn setup_failures_are_classified() {
        assert!(PipelineError::InputNotFound(PathBuf::from("x.json")).is_setup_failure());
        assert!(PipelineError::SessionBootstrap("timeout".into()).is_setup_failure());
        assert!(!PipelineError::Executor("breaker open".into()).is_setup_failure());
    }
}
