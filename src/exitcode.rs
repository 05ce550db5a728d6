//! Standard exit codes (BSD sysexits.h compatible)

/// Successful termination
pub const OK: i32 = 0;

/// Unclassified failure that escaped the run boundary
pub const FAILURE: i32 = 1;

/// Command line usage error, as reported by the argument parser
pub const USAGE: i32 = 2;

/// Internal software error
pub const SOFTWARE: i32 = 70;

/// Input/output error
pub const IOERR: i32 = 74;

/// Temporary failure; user is invited to retry
pub const TEMPFAIL: i32 = 75;
