//! Errors shared across the workspace.

/// Storage failures. Backends report through eyre; callers that need to
/// distinguish conditions downcast marker errors out of the report.
pub type StoreError = eyre::Report;
