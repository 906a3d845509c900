//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.

/// Success - operation completed without errors
pub const SUCCESS: i32 = 0;

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Validation error - the configuration document is invalid
pub const VALIDATION_ERROR: i32 = 2;

/// Render error - secret content unresolved or an internal render check failed
pub const RENDER_ERROR: i32 = 3;

/// Config error - the configuration could not be read or parsed
pub const CONFIG_ERROR: i32 = 4;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 5;

/// Rejected - the cluster or an admission controller refused a resource
pub const REJECTED: i32 = 6;

/// Usage error - invalid arguments or options (following sysexits.h convention)
pub const USAGE_ERROR: i32 = 64;
