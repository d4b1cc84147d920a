//! Framework-wide error taxonomy.
//!
//! Low-level failures (XML lookups, numeric parses, backend calls) are caught
//! at the boundary where they occur and re-raised as one of these variants,
//! carrying enough context (field names, current values, operation) to
//! diagnose without a debugger.

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, FrameworkError>;

#[derive(thiserror::Error, Debug)]
pub enum FrameworkError {
    /// Missing or invalid settings, missing config nodes, broken
    /// trusted-connection setup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Malformed activity XML, invalid field values, invalid state-transition
    /// arguments.
    #[error("validation error: {0}")]
    Validation(String),

    /// Disallowed caller context or impersonation logon failure.
    #[error("access denied: {0}")]
    Access(String),

    /// Backend call failure, wrapped with the failing operation's context.
    #[error("persistence failure: {context}")]
    Persistence {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Obsolete operations that must fail immediately rather than silently
    /// do nothing.
    #[error("not implemented: {0}")]
    NotImplemented(String),
}

impl FrameworkError {
    /// Wrap a lower-level failure with the operation that was underway.
    pub fn persistence(
        context: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        FrameworkError::Persistence {
            context: context.into(),
            source: source.into(),
        }
    }
}
