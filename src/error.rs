//! Stable, numeric-coded error types for the control plane.
//!
//! The original source returns bare `int` error codes from every manager
//! function. We keep the codes stable (so any future wire serialization can
//! still expose them) but surface them through a typed `thiserror` enum
//! instead of an untyped integer, so callers match on variants with `?`
//! instead of comparing magic numbers.

use thiserror::Error;

/// Result alias used throughout the control plane.
pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum GatewayError {
    #[error("plugin library '{0}' not found")]
    LibraryNotFound(String),

    #[error("plugin library '{0}' failed to open: {1}")]
    LibraryFailedToOpen(String, String),

    #[error("plugin '{0}' does not allow creating instances")]
    LibraryNotAllowCreateInstance(String),

    #[error("plugin '{0}' cannot be removed while {1} instance(s) are live")]
    LibraryInUse(String, usize),

    #[error("node '{0}' already exists")]
    NodeExist(String),

    #[error("node '{0}' does not exist")]
    NodeNotExist(String),

    #[error("node '{0}' is not allowed to subscribe")]
    NodeNotAllowSubscribe(String),

    #[error("node '{0}' is not allowed to hold ndriver maps")]
    NodeNotAllowMap(String),

    #[error("template '{0}' not found")]
    TemplateNotFound(String),

    #[error("template '{0}' already exists")]
    TemplateExist(String),

    #[error("plugin '{0}' not found")]
    PluginNotFound(String),

    #[error("plugin '{0}' does not support templates")]
    PluginNotSupportTemplate(String),

    #[error("node '{0}' is not a driver, groups are not allowed")]
    GroupNotAllow(String),

    #[error("group interval {interval}ms is below the minimum of {limit}ms")]
    GroupParameterInvalid { interval: u32, limit: u32 },

    #[error("group '{0}' already exists")]
    GroupExist(String),

    #[error("group '{0}' does not exist")]
    GroupNotExist(String),

    #[error("tag '{0}' already exists")]
    TagExist(String),

    #[error("tag '{0}' does not exist")]
    TagNotExist(String),

    #[error("tag validation failed: {0}")]
    TagInvalid(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Stable numeric code, matching the representative set in the spec's
    /// external-interfaces section. `SUCCESS` has no variant here: it is
    /// represented by `Ok(())`/`Ok(T)`.
    pub fn code(&self) -> i32 {
        match self {
            GatewayError::LibraryNotFound(_) => 1001,
            GatewayError::LibraryFailedToOpen(_, _) => 1002,
            GatewayError::LibraryNotAllowCreateInstance(_) => 1003,
            GatewayError::LibraryInUse(_, _) => 1004,
            GatewayError::NodeExist(_) => 2001,
            GatewayError::NodeNotExist(_) => 2002,
            GatewayError::NodeNotAllowSubscribe(_) => 2003,
            GatewayError::NodeNotAllowMap(_) => 2004,
            GatewayError::TemplateNotFound(_) => 3001,
            GatewayError::TemplateExist(_) => 3004,
            GatewayError::PluginNotFound(_) => 3002,
            GatewayError::PluginNotSupportTemplate(_) => 3003,
            GatewayError::GroupNotAllow(_) => 4001,
            GatewayError::GroupParameterInvalid { .. } => 4002,
            GatewayError::GroupExist(_) => 4003,
            GatewayError::GroupNotExist(_) => 4004,
            GatewayError::TagExist(_) => 4005,
            GatewayError::TagNotExist(_) => 4006,
            GatewayError::TagInvalid(_) => 4007,
            GatewayError::Internal(_) => 9000,
        }
    }
}
