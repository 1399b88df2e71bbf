// Bad things happen to the DAP client if we panic at the wrong time.
#![warn(clippy::unwrap_used, clippy::panic, clippy::expect_used)]

pub mod adapter;
pub mod gdb;
pub mod server;

/// Failure taxonomy for the adapter.
///
/// Locally recoverable failures (one breakpoint in a batch, a varobj created
/// for a hover) are degraded to per-item `verified = false` entries or a
/// silent `success = false` response by their handlers; everything else
/// propagates as a DAP error response carrying the inner message.
#[derive(Debug, thiserror::Error)]
pub enum DebuggerError {
    /// GDB answered a command with `^error`.
    #[error("{message}")]
    Gdb { message: String },
    /// GDB refused a command because the target is running. Frequently
    /// benign in async all-stop mode, where the session suppresses it.
    #[error("{message}")]
    GdbThreadRunning { message: String },
    /// A result record with a class this adapter does not understand.
    #[error("Unknown GDB response: '{class}'")]
    UnknownResponse { class: String },
    /// The GDB command pipe closed; in-flight and future commands fail.
    #[error("The GDB command pipe is closed")]
    PipeClosed,
    /// A message that is intended to be displayed to the user, and does not
    /// unwind nested errors. Also used for argument validation failures.
    #[error("{0}")]
    UserMessage(String),
    #[error("Serialization error")]
    SerdeError(#[from] serde_json::Error),
    #[error(transparent)]
    StdIO(#[from] std::io::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DebuggerError {
    /// Classify a `^error` message. GDB has a handful of messages that all
    /// mean "you cannot do that while the target runs"; they get their own
    /// variant so callers can decide to swallow them.
    pub fn from_gdb_message(message: String) -> DebuggerError {
        let lowered = message.to_ascii_lowercase();
        if lowered.contains("thread is running")
            || lowered.contains("target is running")
            || lowered.contains("cannot execute this command while the target is running")
        {
            DebuggerError::GdbThreadRunning { message }
        } else {
            DebuggerError::Gdb { message }
        }
    }

    pub fn is_thread_running(&self) -> bool {
        matches!(self, DebuggerError::GdbThreadRunning { .. })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn running_refusals_are_classified() {
        let err = DebuggerError::from_gdb_message(
            "Cannot execute this command while the selected thread is running.".to_string(),
        );
        assert!(err.is_thread_running());

        let err = DebuggerError::from_gdb_message("No symbol table is loaded.".to_string());
        assert!(!err.is_thread_running());
    }
}
