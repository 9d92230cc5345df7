use std::io;
use thiserror::Error;

/// Failures of an engine session.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("failed to launch engine `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("engine I/O failed during `{command}`: {source}")]
    Io {
        command: &'static str,
        #[source]
        source: io::Error,
    },

    /// The engine answered with the wrong shape: line count, field count or
    /// a non-numeric field where a number was expected.
    #[error("engine protocol violation in `{command}`: {reason}")]
    ProtocolViolation {
        command: &'static str,
        reason: String,
    },

    #[error("engine session already received `exit`; cannot send `{0}`")]
    SessionClosed(&'static str),
}

impl EngineError {
    pub fn protocol(command: &'static str, reason: impl Into<String>) -> Self {
        EngineError::ProtocolViolation {
            command,
            reason: reason.into(),
        }
    }

    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, EngineError::ProtocolViolation { .. })
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
