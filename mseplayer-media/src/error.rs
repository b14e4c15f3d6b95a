//! Media decoding error types and handling
//!
//! Errors raised on the decode path. [`MediaError::KeyNotFound`] is special:
//! it means the frame is fine but the key has not arrived yet, and the decode
//! thread retries it instead of failing the session.

use thiserror::Error;

/// Main error type for decode path operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MediaError {
    /// Decoding operation failed
    #[error("Decoding failed: {codec} - {reason}")]
    DecodingFailed {
        /// Codec name
        codec: String,
        /// Failure reason
        reason: String,
    },

    /// The CDM does not (yet) have the key for this frame
    #[error("Key not found: {key_id}")]
    KeyNotFound {
        /// Hex encoded key id
        key_id: String,
    },

    /// Decryption failed for a reason other than a missing key
    #[error("Decryption failed: {reason}")]
    DecryptionFailed {
        /// Failure reason
        reason: String,
    },

    /// Encryption scheme this player cannot handle
    #[error("Unsupported encryption scheme: {scheme}")]
    UnsupportedScheme {
        /// Scheme name or fourcc
        scheme: String,
    },

    /// Subsample layout does not match the frame
    #[error("Invalid subsample: {reason}")]
    InvalidSubsample {
        /// What is wrong with the layout
        reason: String,
    },

    /// No decoder is available for the stream
    #[error("No decoder available for {codec}")]
    NoDecoder {
        /// Codec string of the stream
        codec: String,
    },

    /// Codec initialization failed
    #[error("Codec initialization failed: {codec} - {reason}")]
    CodecInitializationFailed {
        /// Codec name
        codec: String,
        /// Failure reason
        reason: String,
    },

    /// Unsupported format error
    #[error("Unsupported format: {format}")]
    UnsupportedFormat {
        /// Format description
        format: String,
    },
}

/// Result type alias for media operations
pub type MediaResult<T> = Result<T, MediaError>;

impl MediaError {
    /// Only a missing key clears up by itself
    pub fn is_recoverable(&self) -> bool {
        matches!(self, MediaError::KeyNotFound { .. })
    }

    /// Get error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            MediaError::DecodingFailed { .. } => ErrorCategory::Codec,
            MediaError::NoDecoder { .. } => ErrorCategory::Codec,
            MediaError::CodecInitializationFailed { .. } => ErrorCategory::Codec,
            MediaError::KeyNotFound { .. } => ErrorCategory::Encryption,
            MediaError::DecryptionFailed { .. } => ErrorCategory::Encryption,
            MediaError::UnsupportedScheme { .. } => ErrorCategory::Encryption,
            MediaError::InvalidSubsample { .. } => ErrorCategory::Data,
            MediaError::UnsupportedFormat { .. } => ErrorCategory::Format,
        }
    }
}

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Codec-related errors
    Codec,
    /// Key and decryption errors
    Encryption,
    /// Format and data structure errors
    Format,
    /// Data validation errors
    Data,
}
