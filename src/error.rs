//! Error types for delivery conversion.

use thiserror::Error;

/// Why a single delivery could not be converted.
///
/// Every variant describes the delivery itself, so none of them is retryable.
/// Whether the delivery is rejected, dead-lettered or stops the consumer is
/// decided by the caller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConvertError {
    #[error("could not determine the type for header '{header}': unsupported type '{found}'")]
    UnsupportedHeaderType { header: String, found: &'static str },

    #[error("header '{header}' carries a timestamp out of range: {seconds}s")]
    InvalidHeaderTimestamp { header: String, seconds: u64 },

    #[error("timestamp property out of range: {seconds}s")]
    InvalidPropertyTimestamp { seconds: u64 },

    #[error("topic template evaluation failed: {0}")]
    TemplateEvaluation(#[from] TemplateError),

    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),
}

impl ConvertError {
    pub fn is_retryable(&self) -> bool {
        false
    }

    /// Short label for structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ConvertError::UnsupportedHeaderType { .. } => "unsupported_header_type",
            ConvertError::InvalidHeaderTimestamp { .. } => "invalid_header_timestamp",
            ConvertError::InvalidPropertyTimestamp { .. } => "invalid_property_timestamp",
            ConvertError::TemplateEvaluation(_) => "template_evaluation",
            ConvertError::MalformedEnvelope(_) => "malformed_envelope",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("invalid template '{template}': {reason}")]
    Syntax { template: String, reason: String },

    #[error("template references unknown field '{field}'")]
    UnknownField { field: String },

    #[error("template field '{field}' is not a scalar")]
    NotScalar { field: String },

    #[error("template field '{field}' has no value")]
    MissingValue { field: String },

    #[error("'{topic}' is not a valid topic name: {reason}")]
    InvalidTopic { topic: String, reason: &'static str },
}

pub type Result<T> = std::result::Result<T, ConvertError>;
