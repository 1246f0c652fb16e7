//! Error types for address planning

use thiserror::Error;

/// Result type for planning operations
pub type Result<T> = std::result::Result<T, PlanError>;

/// Planning errors
#[derive(Debug, Error)]
pub enum PlanError {
    /// Bad CIDR syntax, non-canonical strings, broken tree shape
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Bit-width overflow, too many siblings, allocation deeper than the plan permits
    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    #[error("Duplicate allocation: {prefix} is claimed by both '{first}' and '{second}'")]
    DuplicateAllocation {
        prefix: String,
        first: String,
        second: String,
    },

    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: i64 },

    /// Opaque failure reported by the store
    #[error("Store failure: {0}")]
    StoreFailure(String),
}

impl PlanError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedInput(msg.into())
    }

    pub fn capacity(msg: impl Into<String>) -> Self {
        Self::CapacityExceeded(msg.into())
    }
}

impl From<anyhow::Error> for PlanError {
    fn from(err: anyhow::Error) -> Self {
        Self::StoreFailure(format!("{:#}", err))
    }
}
