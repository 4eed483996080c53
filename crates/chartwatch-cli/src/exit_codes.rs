//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Configuration error - unreadable or invalid configuration file
pub const CONFIG_ERROR: i32 = 2;

/// Cluster error - the Kubernetes API could not be reached or refused a request
pub const KUBE_ERROR: i32 = 3;

/// Not found - the requested object or cache entry does not exist
pub const NOT_FOUND: i32 = 4;

/// Data error - a stored record or manifest could not be decoded (sysexits.h EX_DATAERR)
pub const DATA_ERROR: i32 = 65;

/// Usage error - invalid arguments or options (following sysexits.h convention)
pub const USAGE_ERROR: i32 = 64;
