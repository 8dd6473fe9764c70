//! The [`Log`] trait shared by everything that reports progress.

/// Abstraction over logging backends.
///
/// Orchestration code logs through `&dyn Log` so tests can substitute a
/// recording implementation.
pub trait Log: Send + Sync {
    /// Log a stage header (major section).
    fn stage(&self, msg: &str);
    /// Log an informational message.
    fn info(&self, msg: &str);
    /// Log a debug message (may be suppressed on console).
    fn debug(&self, msg: &str);
    /// Log a warning message.
    fn warn(&self, msg: &str);
    /// Log an error message.
    fn error(&self, msg: &str);
}
