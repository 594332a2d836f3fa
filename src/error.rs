//! Error types for the ASR lowering pipeline

use crate::asr::Location;
use thiserror::Error;

/// Lowering pipeline errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Construct the code generator does not implement
    ///
    /// **Triggered by:** an IR node, operator or kind combination with no
    /// lowering (allocatable arrays, `x ** 3`, string variables in arithmetic)
    /// **Effect:** aborts compilation of the whole module; no bytes are returned
    #[error("Code generation error: {message}")]
    CodeGen {
        /// What could not be lowered
        message: String,
        /// Source span of the offending node, when known
        location: Option<Location>,
    },

    /// Internal consistency failure
    ///
    /// **Triggered by:** a missing slot binding, an unknown runtime helper or
    /// a shape-inference request for a node kind without a rule. Always a bug
    /// in an upstream stage or in this crate.
    #[error("Internal error: {0}")]
    Internal(String),

    /// A rewrite pass rejected its input or produced invalid output
    #[error("Pass '{pass}' failed: {message}")]
    Pass {
        /// Pass name
        pass: &'static str,
        /// Error description
        message: String,
    },

    /// Malformed module bytes
    #[error("Decode error at offset {offset:#x}: {message}")]
    Decode {
        /// Byte offset where decoding stopped
        offset: usize,
        /// Error description
        message: String,
    },

    /// Emitted module failed structural verification
    #[error("Verification failed: {0}")]
    Verification(String),
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// How an error affects the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Indicates a bug; no retry with the same input can succeed
    Fatal,
    /// The input uses something unsupported; a different input may compile
    Recoverable,
}

impl Error {
    /// Unsupported construct without a location
    pub fn codegen(message: impl Into<String>) -> Self {
        Error::CodeGen {
            message: message.into(),
            location: None,
        }
    }

    /// Unsupported construct at a source span
    pub fn codegen_at(message: impl Into<String>, location: Location) -> Self {
        Error::CodeGen {
            message: message.into(),
            location: Some(location),
        }
    }

    /// Internal consistency failure
    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal(message.into())
    }

    /// Pass failure
    pub fn pass(pass: &'static str, message: impl Into<String>) -> Self {
        Error::Pass {
            pass,
            message: message.into(),
        }
    }

    /// Decoder failure at a byte offset
    pub fn decode(offset: usize, message: impl Into<String>) -> Self {
        Error::Decode {
            offset,
            message: message.into(),
        }
    }

    /// Classify error severity
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Error::Internal(_) => ErrorSeverity::Fatal,
            Error::Verification(_) => ErrorSeverity::Fatal,
            Error::Pass { .. } => ErrorSeverity::Fatal,

            Error::CodeGen { .. } => ErrorSeverity::Recoverable,
            Error::Decode { .. } => ErrorSeverity::Recoverable,
        }
    }

    /// Source span attached to the error, if any
    pub fn location(&self) -> Option<Location> {
        match self {
            Error::CodeGen { location, .. } => *location,
            _ => None,
        }
    }
}
