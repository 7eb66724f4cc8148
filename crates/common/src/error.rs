//! Error types for owl

use std::fmt;
use thiserror::Error;

/// Result type alias using the owl Error
pub type Result<T> = std::result::Result<T, Error>;

/// owl error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Command `{command}` failed with {code}")]
    CommandFailed {
        command: String,
        code: ExitCode,
        stderr: String,
    },

    #[error("Build failed: `{command}` exited with {code}")]
    BuildFailure { command: String, code: ExitCode },

    #[error("Install/launch failed: {0}")]
    InstallLaunch(String),

    #[error("Bridge connection lost: {0}")]
    BridgeConnectionLost(String),

    #[error("Test run failed with {code}")]
    TestExecution { code: ExitCode },

    #[error("Report generation failed: {0}")]
    ReportGeneration(String),
}

impl Error {
    /// Exit code carried by a failed external process, if any.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Error::CommandFailed { code, .. }
            | Error::BuildFailure { code, .. }
            | Error::TestExecution { code } => code.0,
            _ => None,
        }
    }
}

/// Exit status of an external process. `None` means it was killed by a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(pub Option<i32>);

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(code) => write!(f, "exit code {}", code),
            None => write!(f, "no exit code (terminated by signal)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_is_exposed() {
        let err = Error::TestExecution {
            code: ExitCode(Some(3)),
        };
        assert_eq!(err.exit_code(), Some(3));
        assert_eq!(err.to_string(), "Test run failed with exit code 3");

        let err = Error::Configuration("missing ios section".into());
        assert_eq!(err.exit_code(), None);
    }

    #[test]
    fn test_signal_termination_message() {
        let err = Error::BuildFailure {
            command: "xcodebuild".into(),
            code: ExitCode(None),
        };
        assert!(err.to_string().contains("terminated by signal"));
    }
}
